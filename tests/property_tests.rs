//! Property-based tests for the condition expression compiler.
//!
//! These tests use proptest to verify that compiled expressions follow
//! boolean algebra with `!` binding tighter than `&&`, and `&&` tighter
//! than `||`.

use dynamic_state_machine::core::{compile, CompileError, Expr};
use proptest::prelude::*;
use std::collections::BTreeMap;

const NAMES: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

fn arbitrary_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop::sample::select(NAMES.to_vec()).prop_map(|name| Expr::Condition(name.to_string()));
    leaf.prop_recursive(5, 48, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|expr| match expr {
                Expr::Not(negated) => *negated,
                other => Expr::Not(Box::new(other)),
            }),
            (inner.clone(), inner.clone())
                .prop_map(|(left, right)| Expr::And(Box::new(left), Box::new(right))),
            (inner.clone(), inner).prop_map(|(left, right)| Expr::Or(Box::new(left), Box::new(right))),
        ]
    })
}

prop_compose! {
    fn arbitrary_assignment()(values in prop::array::uniform4(any::<bool>())) -> BTreeMap<String, bool> {
        NAMES.iter().map(|name| name.to_string()).zip(values).collect()
    }
}

/// Render with only the parentheses precedence requires.
fn render(expr: &Expr, parent: u8) -> String {
    match expr {
        Expr::Condition(name) => name.clone(),
        Expr::Not(inner) => match inner.as_ref() {
            Expr::Condition(name) => format!("!{}", name),
            other => format!("!({})", render(other, 0)),
        },
        Expr::And(left, right) => {
            let text = format!("{} && {}", render(left, 1), render(right, 1));
            if parent > 1 {
                format!("({})", text)
            } else {
                text
            }
        }
        Expr::Or(left, right) => {
            let text = format!("{} || {}", render(left, 0), render(right, 0));
            if parent > 0 {
                format!("({})", text)
            } else {
                text
            }
        }
    }
}

fn reference(expr: &Expr, values: &BTreeMap<String, bool>) -> bool {
    match expr {
        Expr::Condition(name) => values[name],
        Expr::Not(inner) => !reference(inner, values),
        Expr::And(left, right) => reference(left, values) && reference(right, values),
        Expr::Or(left, right) => reference(left, values) || reference(right, values),
    }
}

fn known(name: &str) -> bool {
    NAMES.contains(&name)
}

proptest! {
    #[test]
    fn compiled_expressions_follow_boolean_algebra(
        expr in arbitrary_expr(),
        values in arbitrary_assignment(),
    ) {
        let source = render(&expr, 0);
        let compiled = compile("prop", &source, known)
            .map_err(|e| TestCaseError::fail(format!("{}: {}", source, e)))?;

        let result = compiled.evaluate(&mut |name: &str| values[name]);
        prop_assert_eq!(result, reference(&expr, &values), "source: {}", source);
    }

    #[test]
    fn evaluation_visits_every_leaf(expr in arbitrary_expr()) {
        let compiled = compile("prop", &render(&expr, 0), known).unwrap();
        let mut visited = 0;
        compiled.evaluate(&mut |_: &str| {
            visited += 1;
            false
        });
        prop_assert_eq!(visited, compiled.conditions().len());
    }

    #[test]
    fn display_recompiles_to_the_same_tree(expr in arbitrary_expr()) {
        let compiled = compile("prop", &render(&expr, 0), known).unwrap();
        let recompiled = compile("prop", &compiled.to_string(), known).unwrap();
        prop_assert_eq!(recompiled, compiled);
    }

    #[test]
    fn double_negation_is_rejected(name in "[A-Za-z0-9]{1,8}") {
        let source = format!("!!{}", name);
        let result = compile("prop", &source, |_| true);
        prop_assert!(
            matches!(result, Err(CompileError::DanglingNegation { .. })),
            "{:?}",
            result
        );
    }

    #[test]
    fn unknown_identifiers_are_rejected(name in "[a-z]{1,8}") {
        prop_assume!(!known(&name));
        let source = format!("alpha && {}", name);
        let result = compile("prop", &source, known);
        prop_assert!(
            matches!(result, Err(CompileError::UnknownCondition { .. })),
            "{:?}",
            result
        );
    }

    #[test]
    fn single_ampersand_or_pipe_is_rejected(op in prop::sample::select(vec!["&", "|"])) {
        let source = format!("alpha {} beta", op);
        prop_assert!(compile("prop", &source, known).is_err());
    }
}
