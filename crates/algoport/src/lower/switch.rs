//! Grouping of `switch` cases into if/elsif arms.

use crate::input::JsNode;

/// One arm of a desugared switch.
#[derive(Debug)]
pub struct SwitchArm<'a> {
    /// Case labels that select this arm (empty for a bare `default`).
    pub tests: Vec<JsNode<'a>>,
    /// Whether `default` is among the labels.
    pub is_default: bool,
    /// Statements to run, with fallthrough already merged in and the
    /// trailing `break` removed.
    pub body: Vec<JsNode<'a>>,
}

/// Group `cases` (the `SwitchCase` nodes of a switch) into arms.
///
/// Consecutive labels with empty bodies share the following body. A body
/// that does not end in `break`/`return`/`throw`/`continue` falls through:
/// the bodies of the following arms are appended until one terminates.
pub fn switch_arms<'a>(cases: &[JsNode<'a>]) -> Vec<SwitchArm<'a>> {
    let mut groups: Vec<SwitchArm<'a>> = Vec::new();
    let mut tests = Vec::new();
    let mut is_default = false;
    for case in cases {
        match case.child("test") {
            Some(test) => tests.push(test),
            None => is_default = true,
        }
        let body = case.children("consequent");
        if body.is_empty() {
            continue;
        }
        groups.push(SwitchArm {
            tests: std::mem::take(&mut tests),
            is_default: std::mem::take(&mut is_default),
            body,
        });
    }
    if !tests.is_empty() || is_default {
        groups.push(SwitchArm {
            tests,
            is_default,
            body: Vec::new(),
        });
    }

    let own_bodies: Vec<Vec<JsNode<'a>>> = groups.iter().map(|g| g.body.clone()).collect();
    for (i, group) in groups.iter_mut().enumerate() {
        let mut next = i + 1;
        while !terminates(&group.body) && next < own_bodies.len() {
            group.body.extend(own_bodies[next].iter().copied());
            next += 1;
        }
        if group
            .body
            .last()
            .is_some_and(|s| s.js_type() == "BreakStatement" && !s.has("label"))
        {
            group.body.pop();
        }
    }
    groups
}

/// Whether an arm body still contains an unlabeled `break` that exits the
/// switch itself (not one belonging to a nested loop or switch).
pub fn has_own_break(arms: &[SwitchArm<'_>]) -> bool {
    arms.iter().any(|arm| arm.body.iter().any(|s| breaks_out(*s)))
}

fn breaks_out(stmt: JsNode<'_>) -> bool {
    match stmt.js_type() {
        "BreakStatement" => stmt.child("label").is_none(),
        "BlockStatement" => stmt.children("body").into_iter().any(breaks_out),
        "IfStatement" => {
            stmt.child("consequent").is_some_and(breaks_out)
                || stmt.child("alternate").is_some_and(breaks_out)
        }
        "LabeledStatement" => stmt.child("body").is_some_and(breaks_out),
        "TryStatement" => {
            stmt.child("block").is_some_and(breaks_out)
                || stmt
                    .child("handler")
                    .and_then(|h| h.child("body"))
                    .is_some_and(breaks_out)
                || stmt.child("finalizer").is_some_and(breaks_out)
        }
        _ => false,
    }
}

/// Whether control cannot fall off the end of `stmts`.
pub(crate) fn terminates(stmts: &[JsNode<'_>]) -> bool {
    let Some(last) = stmts.last() else {
        return false;
    };
    match last.js_type() {
        "BreakStatement" | "ReturnStatement" | "ThrowStatement" | "ContinueStatement" => true,
        "BlockStatement" => terminates(&last.children("body")),
        "IfStatement" => {
            let then_ends = last
                .child("consequent")
                .is_some_and(|c| terminates(&as_list(c)));
            let else_ends = last
                .child("alternate")
                .is_some_and(|a| terminates(&as_list(a)));
            then_ends && else_ends
        }
        _ => false,
    }
}

fn as_list(stmt: JsNode<'_>) -> Vec<JsNode<'_>> {
    if stmt.js_type() == "BlockStatement" {
        stmt.children("body")
    } else {
        vec![stmt]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn case(test: Option<i64>, body: Vec<Value>) -> Value {
        json!({
            "type": "SwitchCase",
            "test": test.map(|n| json!({"type": "Literal", "value": n})),
            "consequent": body
        })
    }

    fn call(name: &str) -> Value {
        json!({"type": "ExpressionStatement", "expression": {
            "type": "CallExpression", "callee": {"type": "Identifier", "name": name}, "arguments": []}})
    }

    fn brk() -> Value {
        json!({"type": "BreakStatement", "label": null})
    }

    fn arms(cases: &[Value]) -> Vec<(usize, bool, Vec<String>)> {
        let nodes: Vec<JsNode> = cases.iter().filter_map(JsNode::new).collect();
        switch_arms(&nodes)
            .into_iter()
            .map(|arm| {
                let body = arm
                    .body
                    .iter()
                    .map(|s| {
                        s.child("expression")
                            .and_then(|e| e.child("callee"))
                            .and_then(|c| c.name())
                            .unwrap_or(s.js_type())
                            .to_string()
                    })
                    .collect();
                (arm.tests.len(), arm.is_default, body)
            })
            .collect()
    }

    #[test]
    fn test_simple_arms_drop_trailing_break() {
        let cases = [
            case(Some(1), vec![call("a"), brk()]),
            case(Some(2), vec![call("b"), brk()]),
            case(None, vec![call("c")]),
        ];
        assert_eq!(
            arms(&cases),
            vec![
                (1, false, vec!["a".to_string()]),
                (1, false, vec!["b".to_string()]),
                (0, true, vec!["c".to_string()]),
            ]
        );
    }

    #[test]
    fn test_empty_cases_merge() {
        let cases = [
            case(Some(1), vec![]),
            case(Some(2), vec![call("a"), brk()]),
        ];
        assert_eq!(arms(&cases), vec![(2, false, vec!["a".to_string()])]);
    }

    #[test]
    fn test_fallthrough_appends_following_bodies() {
        let cases = [
            case(Some(1), vec![call("a")]),
            case(Some(2), vec![call("b"), brk()]),
            case(Some(3), vec![call("c"), brk()]),
        ];
        let result = arms(&cases);
        assert_eq!(result[0].2, vec!["a", "b"]);
        assert_eq!(result[1].2, vec!["b"]);
        assert_eq!(result[2].2, vec!["c"]);
    }

    #[test]
    fn test_inner_break_is_kept() {
        let cases = [case(
            Some(1),
            vec![
                json!({"type": "IfStatement", "test": {"type": "Identifier", "name": "x"},
                       "consequent": brk(), "alternate": null}),
                call("a"),
                brk(),
            ],
        )];
        assert_eq!(arms(&cases)[0].2, vec!["IfStatement", "a"]);
    }

    #[test]
    fn test_own_break_ignores_nested_loops() {
        let inner_loop = json!({"type": "WhileStatement", "test": {"type": "Identifier", "name": "x"},
                                "body": {"type": "BlockStatement", "body": [brk()]}});
        let plain = [case(Some(1), vec![inner_loop.clone(), call("a"), brk()])];
        let nodes: Vec<JsNode> = plain.iter().filter_map(JsNode::new).collect();
        assert!(!has_own_break(&switch_arms(&nodes)));

        let early = [case(
            Some(1),
            vec![
                json!({"type": "IfStatement", "test": {"type": "Identifier", "name": "x"},
                       "consequent": brk(), "alternate": null}),
                call("a"),
            ],
        )];
        let nodes: Vec<JsNode> = early.iter().filter_map(JsNode::new).collect();
        assert!(has_own_break(&switch_arms(&nodes)));
    }

    #[test]
    fn test_return_terminates() {
        let ret = json!({"type": "ReturnStatement", "argument": null});
        let nodes = [JsNode::new(&ret).unwrap()];
        assert!(terminates(&nodes));
        assert!(!terminates(&[]));
    }
}
