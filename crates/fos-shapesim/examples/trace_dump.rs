//! Shape a short hieroglyphic group and print every rule application
//!
//! Run with `RUST_LOG=fos_shapesim=debug` to see per-lookup logging.
//! Pass a model JSON path as the first argument to use your own rules,
//! followed by the input glyph names.

use anyhow::Context;
use fos_shapesim::*;
use tracing_subscriber::EnvFilter;

fn demo_model() -> LayoutModel {
    let mut model = LayoutModel::new();
    model.glyphs.set_class("vj", GlyphClass::Mark);
    model.glyphs.set_class("hj", GlyphClass::Mark);

    // ccmp: split the insertion control into horizontal joiners
    let expand = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::multiple("ins", ["hj", "hj"])));
    // abvs: fuse a vertical group into one glyph
    let fuse = model.gsub.add_lookup(
        SubstLookup::new()
            .ignore_marks()
            .with_rule(SubstRule::ligature(["N35", "N35"], "N35_2")),
    );
    let wide = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::single("A1", "A1.wide")));
    // rlig: widen A1 only when a joiner follows
    let context = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::chain(
        vec![],
        Coverage::seq(&[&["A1"]]),
        Coverage::seq(&[&["hj"]]),
        [(0, wide)],
    )));
    model.gsub.add_feature(Feature::new(Tag::CCMP).with_lookup(expand));
    model.gsub.add_feature(Feature::new(Tag::ABVS).with_lookup(fuse));
    model.gsub.add_feature(Feature::new(Tag::RLIG).with_lookup(context));

    let attach = model.gpos.add_lookup(PosLookup::new().with_rule(PosRule::MarkToBase(
        MarkAttachPos::new()
            .with_mark("vj", 0, Anchor::new(0, 0))
            .with_base("N35_2", vec![Some(Anchor::new(500, -200))]),
    )));
    model.gpos.add_feature(Feature::new(Tag::MARK).with_lookup(attach));
    model
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (model, input) = match args.next() {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading model from {path}"))?;
            let model = LayoutModel::from_json(&json).context("parsing model")?;
            (model, args.collect::<Vec<_>>())
        }
        None => (
            demo_model(),
            ["A1", "ins", "N35", "vj", "N35"].iter().map(|s| s.to_string()).collect(),
        ),
    };

    println!("Font Info:\n{}\n", model.summary());

    let config = SimulatorConfig::default().suppress(Tag::SS01).suppress(Tag::RTLM);
    let mut sim = Simulator::with_config(&model, config);
    sim.set_tokens(input);

    let result = sim.run();
    println!("Input tokens: {}\n", sim.input_tokens_str());
    println!("{}\n", sim.trace());
    result.context("simulation failed")?;

    println!("Final Shaped Result:");
    println!("{}", "=".repeat(30));
    println!("{}", sim.result_str());
    println!("\nRules applied: {}", sim.trace().len());
    Ok(())
}
