//! Negation-as-failure: negative nodes, blocking, and unblocking

use sift_core::{Condition, Production, ReteNetwork, Triple, Value, Variable};

fn v(name: &str) -> Variable {
    Variable::new(name)
}

fn blocks() -> Vec<Triple> {
    vec![
        Triple::new("B1", "on", "B2"),
        Triple::new("B1", "on", "B3"),
        Triple::new("B1", "color", "red"),
        Triple::new("B2", "on", "table"),
        Triple::new("B2", "left-of", "B3"),
        Triple::new("B2", "color", "blue"),
        Triple::new("B3", "left-of", "B4"),
        Triple::new("B3", "on", "table"),
        Triple::new("B3", "color", "red"),
    ]
}

#[test]
fn negated_pattern_blocks_matching_prefixes() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net
        .add_production(Production::new(
            "not red at the end",
            Condition::pattern(v("x"), "on", v("y"))
                & Condition::pattern(v("y"), "left-of", v("z"))
                & Condition::negated(v("z"), "color", "red"),
        ))
        .unwrap();

    let wmes = blocks();
    for wme in &wmes {
        net.add_wme(wme.clone()).unwrap();
    }

    // (B1 on B2)(B2 left-of B3) is blocked by (B3 color red); only the
    // z=B4 chain survives, with a null at the negated level.
    let activations = net.activations(rule);
    assert_eq!(activations.len(), 1);
    assert_eq!(
        activations[0].wmes,
        vec![Some(wmes[1].clone()), Some(wmes[6].clone()), None]
    );
    assert_eq!(activations[0].bindings.get("z"), Some(&Value::from("B4")));
}

#[test]
fn removing_the_blocker_revives_the_match() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net
        .add_production(Production::new(
            "not red at the end",
            Condition::pattern(v("x"), "on", v("y"))
                & Condition::pattern(v("y"), "left-of", v("z"))
                & Condition::negated(v("z"), "color", "red"),
        ))
        .unwrap();

    let wmes = blocks();
    for wme in &wmes {
        net.add_wme(wme.clone()).unwrap();
    }
    assert_eq!(net.activations(rule).len(), 1);

    // Unblocking (B3 color red) revives the z=B3 chain.
    net.remove_wme(&wmes[8]).unwrap();
    assert_eq!(net.activations(rule).len(), 2);

    // Re-blocking dematerializes it again.
    net.add_wme(wmes[8].clone()).unwrap();
    let activations = net.activations(rule);
    assert_eq!(activations.len(), 1);
    assert_eq!(activations[0].bindings.get("z"), Some(&Value::from("B4")));
}

#[test]
fn leaf_not_compiles_to_negation_and_double_not_to_the_pattern() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let c0 = Condition::pattern("x", "id", "1");

    let p_not = net.add_production(Production::new("not", !c0.clone())).unwrap();
    let p_not_not = net.add_production(Production::new("not not", !!c0)).unwrap();

    // Nothing in working memory: the negation holds, the pattern does not.
    assert_eq!(net.activations(p_not).len(), 1);
    assert_eq!(net.activations(p_not_not).len(), 0);

    net.add_wme(Triple::new("x", "id", "1")).unwrap();
    assert_eq!(net.activations(p_not).len(), 0);
    assert_eq!(net.activations(p_not_not).len(), 1);

    net.remove_wme(&Triple::new("x", "id", "1")).unwrap();
    assert_eq!(net.activations(p_not).len(), 1);
    assert_eq!(net.activations(p_not_not).len(), 0);
}

#[test]
fn overlapping_blockers_retract_one_at_a_time() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net
        .add_production(Production::new(
            "no red anywhere",
            Condition::pattern(v("x"), "kind", "box")
                & Condition::negated(v("y"), "color", "red"),
        ))
        .unwrap();

    net.add_wme(Triple::new("b1", "kind", "box")).unwrap();
    assert_eq!(net.activations(rule).len(), 1);

    // Two independent blockers for the same token.
    net.add_wme(Triple::new("B7", "color", "red")).unwrap();
    net.add_wme(Triple::new("B8", "color", "red")).unwrap();
    assert_eq!(net.activations(rule).len(), 0);

    // Dropping one blocker is not enough.
    net.remove_wme(&Triple::new("B7", "color", "red")).unwrap();
    assert_eq!(net.activations(rule).len(), 0);

    net.remove_wme(&Triple::new("B8", "color", "red")).unwrap();
    assert_eq!(net.activations(rule).len(), 1);
}

#[test]
fn negative_first_clause() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net
        .add_production(Production::new(
            "empty shelf",
            Condition::negated(v("x"), "on", "shelf")
                & Condition::pattern(v("y"), "kind", "shelf"),
        ))
        .unwrap();

    net.add_wme(Triple::new("s1", "kind", "shelf")).unwrap();
    assert_eq!(net.activations(rule).len(), 1);

    net.add_wme(Triple::new("box", "on", "shelf")).unwrap();
    assert_eq!(net.activations(rule).len(), 0);

    net.remove_wme(&Triple::new("box", "on", "shelf")).unwrap();
    assert_eq!(net.activations(rule).len(), 1);
}
