//! End-to-end shaping scenarios
//!
//! Capital-letter fonts exercising each lookup kind, filtering by mark
//! attachment class and filter set, positioning, and model/trace I/O.

use std::collections::HashMap;

use fos_shapesim::*;

fn tokens(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn simulate(model: &LayoutModel, input: &[&str]) -> SimulationOutput {
    let mut sim = Simulator::new(model);
    sim.set_tokens(input.iter().copied());
    sim.run().unwrap()
}

fn make_all_mark(model: &mut LayoutModel) {
    for c in 'A'..='Z' {
        model.glyphs.set_class(c.to_string(), GlyphClass::Mark);
    }
}

// ============================================================================
// LOOKUP KINDS
// ============================================================================

#[test]
fn test_single_rules_do_not_chain_within_lookup() {
    let mut model = LayoutModel::new();
    let index = model.gsub.add_lookup(
        SubstLookup::new()
            .with_rule(SubstRule::single("A", "B"))
            .with_rule(SubstRule::single("B", "C")),
    );
    model.gsub.add_feature(Feature::new(Tag::ABVS).with_lookup(index));

    let out = simulate(&model, &["A", "B", "C"]);
    assert_eq!(out.tokens, tokens(&["B", "C", "C"]));
    assert_eq!(out.trace.len(), 2);
}

#[test]
fn test_multiple_outputs_skip_rescan() {
    let mut model = LayoutModel::new();
    let index = model.gsub.add_lookup(
        SubstLookup::new()
            .with_rule(SubstRule::multiple("A", ["B", "C"]))
            .with_rule(SubstRule::multiple("B", ["C", "D"])),
    );
    model.gsub.add_feature(Feature::new(Tag::ABVS).with_lookup(index));

    let out = simulate(&model, &["A", "B", "C"]);
    assert_eq!(out.tokens, tokens(&["B", "C", "C", "D", "C"]));
    assert_eq!(out.trace.entries()[1].consumed, vec![2]);
}

#[test]
fn test_ligatures_by_declaration_order() {
    let mut model = LayoutModel::new();
    let index = model.gsub.add_lookup(
        SubstLookup::new()
            .with_rule(SubstRule::ligature(["A", "B", "C", "D"], "T"))
            .with_rule(SubstRule::ligature(["A", "B"], "R"))
            .with_rule(SubstRule::ligature(["A", "B", "C"], "S"))
            .with_rule(SubstRule::ligature(["A", "B", "C", "D", "E"], "U")),
    );
    model.gsub.add_feature(Feature::new(Tag::LIGA).with_lookup(index));

    assert_eq!(simulate(&model, &["A", "B", "C"]).tokens, tokens(&["R", "C"]));
    assert_eq!(simulate(&model, &["A", "B", "C", "D", "E"]).tokens, tokens(&["T", "E"]));
}

#[test]
fn test_ligature_filtered_by_mark_class() {
    let mut model = LayoutModel::new();
    make_all_mark(&mut model);
    for glyph in ["A", "B", "C"] {
        model.glyphs.set_mark_attach_class(glyph, 2);
    }
    let index = model.gsub.add_lookup(
        SubstLookup::new()
            .mark_attachment_class(2)
            .with_rule(SubstRule::ligature(["A", "B", "C"], "B"))
            .with_rule(SubstRule::ligature(["A", "B"], "S")),
    );
    model.gsub.add_feature(Feature::new(Tag::LIGA).with_lookup(index));

    let out = simulate(
        &model,
        &["A", "X", "B", "Y", "C", "A", "Y", "B", "Y", "A", "B"],
    );
    assert_eq!(out.tokens, tokens(&["B", "X", "Y", "S", "Y", "Y", "S"]));
    assert_eq!(out.trace.entries()[0].consumed, vec![0, 2, 4]);
    assert_eq!(out.trace.entries()[1].consumed, vec![3, 5]);
}

#[test]
fn test_ligature_filtered_by_set() {
    let mut model = LayoutModel::new();
    make_all_mark(&mut model);
    let set = model.glyphs.add_filter_set(["A", "B", "D"]);
    let index = model.gsub.add_lookup(
        SubstLookup::new()
            .filter_set(set)
            .with_rule(SubstRule::ligature(["A", "B", "D"], "B"))
            .with_rule(SubstRule::ligature(["A", "B"], "S")),
    );
    model.gsub.add_feature(Feature::new(Tag::LIGA).with_lookup(index));

    let out = simulate(
        &model,
        &["A", "X", "B", "Y", "D", "A", "Y", "B", "Y", "A", "B", "X", "B"],
    );
    assert_eq!(out.tokens, tokens(&["B", "X", "Y", "S", "Y", "Y", "S", "X", "B"]));
}

/// Chain lookup dispatching into filter-set ligatures, followed by singles
fn chain_model() -> LayoutModel {
    let mut model = LayoutModel::new();
    for glyph in ["A", "B", "C", "D", "E"] {
        model.glyphs.set_class(glyph, GlyphClass::Mark);
    }
    let set_ad = model.glyphs.add_filter_set(["A", "D"]);
    let set_ab = model.glyphs.add_filter_set(["A", "B"]);

    let lig_ad = model.gsub.add_lookup(
        SubstLookup::new()
            .filter_set(set_ad)
            .with_rule(SubstRule::ligature(["A", "D"], "C")),
    );
    let lig_bb = model
        .gsub
        .add_lookup(SubstLookup::new().with_rule(SubstRule::ligature(["B", "B"], "E")));
    let chain = model.gsub.add_lookup(SubstLookup::new().filter_set(set_ab).with_rule(
        SubstRule::chain(vec![], Coverage::seq(&[&["A"], &["B"]]), vec![], [(0, lig_ad), (1, lig_bb)]),
    ));
    let singles = model.gsub.add_lookup(
        SubstLookup::new()
            .with_rule(SubstRule::single("A", "P"))
            .with_rule(SubstRule::single("B", "Q"))
            .with_rule(SubstRule::single("C", "R"))
            .with_rule(SubstRule::single("D", "S"))
            .with_rule(SubstRule::single("E", "T")),
    );
    model
        .gsub
        .add_feature(Feature::new(Tag::LIGA).with_lookup(chain).with_lookup(singles));
    model
}

#[test]
fn test_chain_dispatch_into_filtered_ligatures() {
    let model = chain_model();

    let out = simulate(&model, &["A", "B", "B", "D"]);
    assert_eq!(out.tokens, tokens(&["R", "T"]));
    let lookups: Vec<usize> = out.trace.iter().map(|e| e.lookup_index).collect();
    assert_eq!(lookups, vec![0, 1, 3, 3]);
    assert_eq!(out.trace.entries()[0].consumed, vec![0, 3]);
    assert_eq!(out.trace.entries()[1].consumed, vec![1, 2]);

    let out = simulate(&model, &["A", "B", "B", "F"]);
    assert_eq!(out.tokens, tokens(&["P", "T", "F"]));
    assert_eq!(out.trace.len(), 3);
}

#[test]
fn test_chain_record_on_consumed_position_is_skipped() {
    let mut model = LayoutModel::new();
    make_all_mark(&mut model);
    let lig_aa = model
        .gsub
        .add_lookup(SubstLookup::new().with_rule(SubstRule::ligature(["A", "A"], "C")));
    let lig_bb = model
        .gsub
        .add_lookup(SubstLookup::new().with_rule(SubstRule::ligature(["B", "B"], "D")));
    let chain = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::chain(
        vec![],
        Coverage::seq(&[&["A", "B"], &["A", "B"]]),
        vec![],
        [(0, lig_aa), (1, lig_bb)],
    )));
    model.gsub.add_feature(Feature::new(Tag::LIGA).with_lookup(chain));

    assert_eq!(simulate(&model, &["A", "A", "B", "B"]).tokens, tokens(&["C", "B", "B"]));
    assert_eq!(simulate(&model, &["A", "A", "A", "B", "B"]).tokens, tokens(&["C", "A", "D"]));
}

#[test]
fn test_reverse_with_aligned_substitutes() {
    let mut model = LayoutModel::new();
    let index = model.gsub.add_lookup(SubstLookup::new().reverse().with_rule(SubstRule::reverse(
        Coverage::seq(&[&["A"]]),
        Coverage::new(["A", "B", "C", "D"]),
        vec![],
        ["E", "F", "G", "H"],
    )));
    model.gsub.add_feature(Feature::new(Tag::LIGA).with_lookup(index));

    assert_eq!(simulate(&model, &["A", "A", "A"]).tokens, tokens(&["A", "E", "E"]));
    assert_eq!(simulate(&model, &["A", "C", "A", "D"]).tokens, tokens(&["A", "G", "A", "H"]));
}

// ============================================================================
// FEATURES
// ============================================================================

#[test]
fn test_suppressed_features_are_skipped() {
    let mut model = LayoutModel::new();
    let ss01 = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::single("A", "A.alt")));
    let rtlm = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::single("B", "B.rtl")));
    model.gsub.add_feature(Feature::new(Tag::SS01).with_lookup(ss01));
    model.gsub.add_feature(Feature::new(Tag::RTLM).with_lookup(rtlm));

    assert_eq!(simulate(&model, &["A", "B"]).tokens, tokens(&["A.alt", "B.rtl"]));

    let mut sim = Simulator::new(&model);
    sim.suppress(Tag::SS01);
    sim.suppress(Tag::RTLM);
    sim.set_tokens(["A", "B"]);
    let out = sim.run().unwrap();
    assert_eq!(out.tokens, tokens(&["A", "B"]));
    assert!(out.trace.is_empty());
}

#[test]
fn test_shared_lookup_runs_per_feature() {
    let mut model = LayoutModel::new();
    let shared = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::multiple("A", ["A", "x"])));
    model.gsub.add_feature(Feature::new(Tag::CCMP).with_lookup(shared));
    model.gsub.add_feature(Feature::new(Tag::ABVS).with_lookup(shared));

    let out = simulate(&model, &["A"]);
    assert_eq!(out.tokens, tokens(&["A", "x", "x"]));
    let features: Vec<Tag> = out.trace.iter().map(|e| e.feature).collect();
    assert_eq!(features, vec![Tag::CCMP, Tag::ABVS]);
}

#[test]
fn test_feature_lookups_run_in_index_order() {
    let mut model = LayoutModel::new();
    let first = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::single("A", "B")));
    let second = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::single("B", "C")));
    model
        .gsub
        .add_feature(Feature::new(Tag::RLIG).with_lookup(second).with_lookup(first));

    assert_eq!(simulate(&model, &["A"]).tokens, tokens(&["C"]));
}

// ============================================================================
// POSITIONING
// ============================================================================

fn positioned_model() -> LayoutModel {
    let mut model = LayoutModel::new();
    for mark in ["top", "dot"] {
        model.glyphs.set_class(mark, GlyphClass::Mark);
    }
    let lig = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::ligature(["A1", "A2"], "A12")));
    model.gsub.add_feature(Feature::new(Tag::LIGA).with_lookup(lig));

    let base = model.gpos.add_lookup(PosLookup::new().with_rule(PosRule::MarkToBase(
        MarkAttachPos::new()
            .with_mark("top", 0, Anchor::new(100, 0))
            .with_mark("dot", 1, Anchor::new(0, 50))
            .with_base("A12", vec![Some(Anchor::new(600, 800)), None])
            .with_base("B1", vec![Some(Anchor::new(300, 700)), Some(Anchor::new(300, -100))]),
    )));
    let mkmk = model.gpos.add_lookup(PosLookup::new().with_rule(PosRule::MarkToMark(
        MarkAttachPos::new()
            .with_mark("top", 0, Anchor::new(100, 0))
            .with_base("top", vec![Some(Anchor::new(100, 200))]),
    )));
    model.gpos.add_feature(Feature::new(Tag::MARK).with_lookup(base));
    model.gpos.add_feature(Feature::new(Tag::MKMK).with_lookup(mkmk));
    model
}

#[test]
fn test_marks_attach_after_substitution() {
    let model = positioned_model();
    let out = simulate(&model, &["A1", "A2", "top", "B1", "dot"]);
    assert_eq!(out.tokens, tokens(&["A12", "top", "B1", "dot"]));
    assert_eq!(out.offsets(), vec![(0, 0), (500, 800), (0, 0), (300, -150)]);

    let gpos: Vec<&TraceEntry> = out.trace.iter().filter(|e| e.stage == Stage::Positioning).collect();
    assert_eq!(gpos.len(), 2);
    assert_eq!(gpos[0].consumed, vec![0, 1]);
    assert_eq!(gpos[0].feature, Tag::MARK);
}

#[test]
fn test_stacked_marks_accumulate() {
    let model = positioned_model();
    let out = simulate(&model, &["B1", "top", "top"]);
    // second top attaches to B1 via mark-to-base, then is re-anchored on the first via mark-to-mark
    assert_eq!(out.offsets(), vec![(0, 0), (200, 700), (200, 900)]);
    assert_eq!(out.positions[2].attached_to, Some(1));
}

#[test]
fn test_missing_anchor_resolves_to_zero() {
    let model = positioned_model();
    let out = simulate(&model, &["A1", "A2", "dot"]);
    assert_eq!(out.offsets(), vec![(0, 0), (0, 0)]);

    let entry = out
        .trace
        .iter()
        .find(|e| e.stage == Stage::Positioning)
        .expect("missing anchor is traced");
    assert!(entry.rule.contains("no anchor for class 1 on A12"));
}

#[test]
fn test_positioning_can_be_disabled() {
    let model = positioned_model();
    let mut sim = Simulator::with_config(&model, SimulatorConfig::default().positioning(false));
    sim.set_tokens(["B1", "top"]);
    let out = sim.run().unwrap();
    assert_eq!(out.offsets(), vec![(0, 0), (0, 0)]);
    assert!(out.trace.is_empty());
}

#[test]
fn test_pen_coordinates_from_simulation() {
    let model = positioned_model();
    let mut sim = Simulator::new(&model);
    sim.set_tokens(["B1", "top"]);
    let out = sim.run().unwrap();

    let advances: HashMap<String, (i32, i32)> = [("B1".to_string(), (600, 0))].into_iter().collect();
    let run = ShapedRun::from_simulation(&out.tokens, &out.positions, &advances, 1000.0, 1000);
    let placed: Vec<PositionedGlyph> = run.positioned_glyphs().collect();
    assert_eq!(placed[1].name, "top");
    // top's anchor (100, 0) lands on B1's anchor (300, 700)
    assert_eq!((placed[1].x, placed[1].y), (200.0, 700.0));
    assert_eq!(run.width(), 600.0);
}

// ============================================================================
// MODEL & TRACE I/O
// ============================================================================

#[test]
fn test_model_json_round_trip() {
    let model = positioned_model();
    let json = model.to_json().unwrap();
    let back = LayoutModel::from_json(&json).unwrap();
    assert_eq!(back, model);

    let input = ["A1", "A2", "top", "top"];
    assert_eq!(simulate(&back, &input), simulate(&model, &input));
}

#[test]
fn test_model_from_handwritten_json() {
    let json = r#"{
        "glyphs": { "classes": { "B": "mark" } },
        "gsub": {
            "features": [ { "tag": "liga", "lookup_indices": [0] } ],
            "lookups": [
                {
                    "flags": { "ignore_marks": true },
                    "rules": [ { "kind": "ligature", "components": ["A", "C"], "ligature": "D" } ]
                }
            ]
        }
    }"#;
    let model = LayoutModel::from_json(json).unwrap();
    assert!(model.gpos.lookups.is_empty());
    assert_eq!(simulate(&model, &["A", "B", "C"]).tokens, tokens(&["D", "B"]));
}

#[test]
fn test_bad_json_and_tags_are_errors() {
    assert!(matches!(LayoutModel::from_json("{ not json"), Err(SimError::Json(_))));
    let json = r#"{ "gsub": { "features": [ { "tag": "toolong", "lookup_indices": [] } ] } }"#;
    assert!(LayoutModel::from_json(json).is_err());
    assert!(matches!("ab".parse::<Tag>(), Err(SimError::InvalidTag(_))));
}

#[test]
fn test_malformed_rule_rejected() {
    let mut model = LayoutModel::new();
    let index = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::ligature(["A"], "B")));
    model.gsub.add_feature(Feature::new(Tag::LIGA).with_lookup(index));
    let mut sim = Simulator::new(&model);
    sim.set_tokens(["A"]);
    assert!(matches!(
        sim.run(),
        Err(SimError::MalformedRule { lookup: 0, rule: 0, .. })
    ));
}

#[test]
fn test_trace_rendering_and_export() {
    let mut model = LayoutModel::new();
    let index = model.gsub.add_lookup(SubstLookup::new().with_rule(SubstRule::ligature(["B", "C"], "Z")));
    model.gsub.add_feature(Feature::new(Tag::LIGA).with_lookup(index));

    let mut sim = Simulator::new(&model);
    sim.set_tokens(["A", "B", "C"]);
    sim.run().unwrap();
    assert_eq!(sim.input_tokens_str(), "A B C");
    assert_eq!(sim.tokens_str(), "A Z");

    let text = sim.trace().to_string();
    assert!(text.contains("1. Feature: liga, GSUB Lookup: 0"));
    assert!(text.contains("Positions affected: 1, 2"));
    assert!(text.contains("Rule: B C -> Z"));
    assert!(text.contains("Result: A > Z"));

    let exported = Trace::from_json(&sim.trace().to_json().unwrap()).unwrap();
    assert_eq!(&exported, sim.trace());
}
