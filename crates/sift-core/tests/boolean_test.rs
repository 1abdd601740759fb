//! Boolean composition, filters, binds, and thunk failure modes

use sift_core::{
    Condition, EngineError, Production, ReteNetwork, Triple, Value, Variable,
};

fn v(name: &str) -> Variable {
    Variable::new(name)
}

fn filter(value: bool) -> Condition {
    Condition::filter(vec![], move |_| Ok(Value::Boolean(value)))
}

fn count(condition: Condition) -> usize {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net.add_production(Production::new("under test", condition)).unwrap();
    net.activations(rule).len()
}

#[test]
fn or_of_filters_counts_satisfied_branches() {
    assert_eq!(count(filter(false) | filter(false)), 0);
    assert_eq!(count(filter(false) | filter(true)), 1);
    assert_eq!(count(filter(true) | filter(false)), 1);
    assert_eq!(count(filter(true) | filter(true)), 2);
}

#[test]
fn mixed_and_or_chains() {
    assert_eq!(count(filter(false) | filter(false) & filter(false)), 0);
    assert_eq!(count((filter(true) | filter(false)) & filter(false)), 0);
    assert_eq!(count(filter(true) | (filter(false) & filter(false))), 1);
    assert_eq!(count(filter(false) & filter(false) | filter(false)), 0);
    assert_eq!(count(filter(true) & filter(false) | filter(false)), 0);
    assert_eq!(count(filter(false) & filter(true) | filter(false)), 0);
    assert_eq!(count(filter(false) & filter(false) | filter(true)), 1);
    assert_eq!(count(filter(true) & filter(true) | filter(false)), 1);
    assert_eq!(count(filter(true) & filter(false) | filter(true)), 1);
    assert_eq!(count(filter(false) & filter(true) | filter(true)), 1);
    assert_eq!(count(filter(true) & filter(true) | filter(true)), 2);
}

#[test]
fn longer_chains_with_negation() {
    // true & (false | (true & false))
    assert_eq!(count(filter(true) & (filter(false) | (filter(true) & filter(false)))), 0);
    // true & (false | (true & not-present)); the negation holds in an
    // empty working memory
    assert_eq!(
        count(
            filter(true)
                & (filter(false)
                    | (filter(true) & Condition::negated(v("x"), "is", v("y"))))
        ),
        1
    );
}

#[test]
fn filters_between_and_after_patterns() {
    let mut net: ReteNetwork = ReteNetwork::new();
    net.add_wme(Triple::new("b1", "kind", "box")).unwrap();
    net.add_wme(Triple::new("b2", "kind", "box")).unwrap();

    let pattern = || Condition::pattern(v("x"), "kind", "box");

    let leading = net
        .add_production(Production::new("leading", filter(true) & pattern()))
        .unwrap();
    let trailing = net
        .add_production(Production::new("trailing", pattern() & filter(true)))
        .unwrap();
    let gated_off = net
        .add_production(Production::new("gated off", pattern() & filter(false)))
        .unwrap();

    assert_eq!(net.activations(leading).len(), 2);
    assert_eq!(net.activations(trailing).len(), 2);
    assert_eq!(net.activations(gated_off).len(), 0);

    // Filter levels appear as nulls in the match.
    let activation = &net.activations(trailing)[0];
    assert_eq!(activation.wmes.len(), 2);
    assert!(activation.wmes[0].is_some());
    assert_eq!(activation.wmes[1], None);
}

#[test]
fn filter_reads_pattern_bindings() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net
        .add_production(Production::new(
            "big boxes",
            Condition::pattern(v("x"), "size", v("s"))
                & Condition::filter(vec![v("s")], |scope| {
                    let Value::Integer(size) = scope.get("s")? else {
                        return Ok(Value::Boolean(false));
                    };
                    Ok(Value::Boolean(*size > 2))
                }),
        ))
        .unwrap();

    net.add_wme(Triple::new("crate", "size", 5)).unwrap();
    net.add_wme(Triple::new("thimble", "size", 1)).unwrap();

    let activations = net.activations(rule);
    assert_eq!(activations.len(), 1);
    assert_eq!(activations[0].bindings.get("x"), Some(&Value::from("crate")));
}

#[test]
fn bind_alone_produces_one_extended_match() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net
        .add_production(Production::new(
            "bind first",
            Condition::bind(vec![], "x", |_| Ok(Value::Integer(1 + 1))),
        ))
        .unwrap();

    let activations = net.activations(rule);
    assert_eq!(activations.len(), 1);
    assert_eq!(activations[0].bindings.get("x"), Some(&Value::Integer(2)));
}

#[test]
fn bind_chains_into_filters() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net
        .add_production(Production::new(
            "doubled size",
            Condition::pattern(v("x"), "size", v("s"))
                & Condition::bind(vec![v("s")], "d", |scope| {
                    let Value::Integer(size) = scope.get("s")? else {
                        return Err(EngineError::thunk("size must be an integer"));
                    };
                    Ok(Value::Integer(size * 2))
                })
                & Condition::filter(vec![v("d")], |scope| {
                    let Value::Integer(doubled) = scope.get("d")? else {
                        return Ok(Value::Boolean(false));
                    };
                    Ok(Value::Boolean(*doubled > 4))
                }),
        ))
        .unwrap();

    net.add_wme(Triple::new("box", "size", 3)).unwrap();
    net.add_wme(Triple::new("cup", "size", 1)).unwrap();

    let activations = net.activations(rule);
    assert_eq!(activations.len(), 1);
    assert_eq!(activations[0].bindings.get("x"), Some(&Value::from("box")));
    assert_eq!(activations[0].bindings.get("d"), Some(&Value::Integer(6)));
}

#[test]
fn bind_against_an_already_bound_variable_checks_equality() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net
        .add_production(Production::new(
            "size must be three",
            Condition::pattern(v("x"), "size", v("n"))
                & Condition::bind(vec![], "n", |_| Ok(Value::Integer(3))),
        ))
        .unwrap();

    net.add_wme(Triple::new("a", "size", 3)).unwrap();
    net.add_wme(Triple::new("b", "size", 4)).unwrap();

    let activations = net.activations(rule);
    assert_eq!(activations.len(), 1);
    assert_eq!(activations[0].bindings.get("x"), Some(&Value::from("a")));
}

#[test]
fn computed_variables_join_into_later_patterns() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net
        .add_production(Production::new(
            "computed color",
            Condition::bind(vec![], "c", |_| Ok(Value::from("red")))
                & Condition::pattern(v("x"), "color", v("c")),
        ))
        .unwrap();

    net.add_wme(Triple::new("B1", "color", "red")).unwrap();
    net.add_wme(Triple::new("B2", "color", "blue")).unwrap();

    let activations = net.activations(rule);
    assert_eq!(activations.len(), 1);
    assert_eq!(activations[0].bindings.get("x"), Some(&Value::from("B1")));
    assert_eq!(activations[0].bindings.get("c"), Some(&Value::from("red")));
}

#[test]
fn thunk_failure_escapes_add_production() {
    let mut net: ReteNetwork = ReteNetwork::new();
    net.add_wme(Triple::new("a", "is", "a")).unwrap();
    net.add_wme(Triple::new("b", "is", "b")).unwrap();

    let raises = Condition::filter(vec![], |_| {
        1i64.checked_div(0)
            .map(Value::Integer)
            .ok_or_else(|| EngineError::thunk("division by zero"))
    });
    let result = net.add_production(Production::new(
        "boom",
        Condition::pattern("a", "is", "a")
            | (Condition::pattern("b", "is", "b") & raises),
    ));
    assert!(matches!(result, Err(EngineError::Thunk { .. })));
}

#[test]
fn thunk_failure_escapes_add_wme() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net
        .add_production(Production::new(
            "late boom",
            Condition::pattern(v("x"), "is", v("y"))
                & Condition::filter(vec![], |_| Err(EngineError::thunk("always fails"))),
        ))
        .unwrap();

    // Nothing matched at add time, so compilation succeeded.
    assert_eq!(net.activations(rule).len(), 0);
    // Evaluation happens when data arrives, and the failure surfaces there.
    let result = net.add_wme(Triple::new("a", "is", "a"));
    assert!(matches!(result, Err(EngineError::Thunk { .. })));
}

#[test]
fn statically_unbound_thunk_variables_are_rejected() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let result = net.add_production(Production::new(
        "unbound",
        Condition::filter(vec![v("x")], |scope| Ok(scope.get("x")?.clone())),
    ));
    assert!(matches!(result, Err(EngineError::UnboundVariable { .. })));
    // Nothing was compiled.
    assert_eq!(net.matches().len(), 0);
}

#[test]
fn undeclared_variables_fail_at_evaluation() {
    let mut net: ReteNetwork = ReteNetwork::new();
    net.add_production(Production::new(
        "late unbound",
        Condition::pattern(v("x"), "is", v("y"))
            & Condition::filter(vec![], |scope| Ok(scope.get("zzz")?.clone())),
    ))
    .unwrap();

    let result = net.add_wme(Triple::new("a", "is", "a"));
    assert!(matches!(result, Err(EngineError::UnboundVariable { .. })));
}

#[test]
fn empty_production_matches_once_with_no_bindings() {
    let mut net: ReteNetwork = ReteNetwork::new();
    let rule = net.add_production(Production::new("always", Condition::always())).unwrap();

    let activations = net.activations(rule);
    assert_eq!(activations.len(), 1);
    assert!(activations[0].bindings.is_empty());

    // Working-memory churn leaves it untouched.
    net.add_wme(Triple::new("a", "is", "a")).unwrap();
    net.remove_wme(&Triple::new("a", "is", "a")).unwrap();
    assert_eq!(net.activations(rule).len(), 1);
}
