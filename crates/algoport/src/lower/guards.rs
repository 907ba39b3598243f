//! Static evaluation of runtime feature-detection guards.
//!
//! Algorithm sources are written to run both in browsers and under Node,
//! so they are full of `typeof module !== 'undefined'` style checks. Once
//! transpiled, the answer to each of those is known in advance.

use crate::input::JsNode;

/// Globals the generated code always provides.
const ALWAYS_AVAILABLE: &[&str] = &["OpCodes", "AlgorithmFramework"];

/// Host globals that never exist in the generated code.
const NEVER_AVAILABLE: &[&str] = &[
    "module",
    "exports",
    "require",
    "define",
    "window",
    "self",
    "global",
    "globalThis",
    "process",
    "document",
];

/// Whether `name` is one of the globals a guard can be decided on.
pub fn is_framework_name(name: &str) -> bool {
    ALWAYS_AVAILABLE.contains(&name) || NEVER_AVAILABLE.contains(&name)
}

fn availability(name: &str) -> Option<bool> {
    if ALWAYS_AVAILABLE.contains(&name) {
        Some(true)
    } else if NEVER_AVAILABLE.contains(&name) {
        Some(false)
    } else {
        None
    }
}

/// Leftmost identifier of a member chain (`a` in `a.b.c`).
pub(super) fn chain_root(node: JsNode<'_>) -> Option<&str> {
    let node = node.unwrapped();
    match node.js_type() {
        "Identifier" => node.name(),
        "MemberExpression" => chain_root(node.child("object")?),
        _ => None,
    }
}

/// Decide a guard expression, or `None` when it depends on real runtime state.
///
/// Handles `typeof X ==/!=/===/!== '...'`, negation, `&&`/`||`, and bare
/// references to a known global or a member chain rooted at one.
pub fn evaluate_guard(test: JsNode<'_>) -> Option<bool> {
    let test = test.unwrapped();
    match test.js_type() {
        "BinaryExpression" => {
            let negated = match test.str_field("operator")? {
                "===" | "==" => false,
                "!==" | "!=" => true,
                _ => return None,
            };
            let left = test.child("left")?.unwrapped();
            let right = test.child("right")?.unwrapped();
            let (typeof_expr, literal) = if is_typeof(left) {
                (left, right)
            } else if is_typeof(right) {
                (right, left)
            } else {
                return None;
            };
            let expected = literal.string_value()?;
            let available = availability(chain_root(typeof_expr.child("argument")?)?)?;
            let equal = match (available, expected) {
                (false, "undefined") => true,
                (false, _) => false,
                (true, "undefined") => false,
                // Present, but we cannot tell whether it is an object or a function.
                (true, _) => return None,
            };
            Some(equal != negated)
        }
        "UnaryExpression" if test.str_field("operator") == Some("!") => {
            evaluate_guard(test.child("argument")?).map(|b| !b)
        }
        "LogicalExpression" => {
            let left = test.child("left").and_then(evaluate_guard);
            let right = test.child("right").and_then(evaluate_guard);
            match test.str_field("operator")? {
                "&&" => match (left, right) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                },
                "||" => match (left, right) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                },
                _ => None,
            }
        }
        "Identifier" => availability(test.name()?),
        "MemberExpression" => match availability(chain_root(test)?)? {
            false => Some(false),
            true => None,
        },
        _ => None,
    }
}

fn is_typeof(node: JsNode<'_>) -> bool {
    node.js_type() == "UnaryExpression" && node.str_field("operator") == Some("typeof")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn ident(name: &str) -> Value {
        json!({"type": "Identifier", "name": name})
    }

    fn typeof_check(name: &str, op: &str, lit: &str) -> Value {
        json!({
            "type": "BinaryExpression",
            "operator": op,
            "left": {"type": "UnaryExpression", "operator": "typeof", "argument": ident(name)},
            "right": {"type": "Literal", "value": lit}
        })
    }

    fn eval(v: &Value) -> Option<bool> {
        evaluate_guard(JsNode::new(v).unwrap())
    }

    #[test]
    fn test_typeof_checks() {
        assert_eq!(eval(&typeof_check("module", "!==", "undefined")), Some(false));
        assert_eq!(eval(&typeof_check("module", "===", "undefined")), Some(true));
        assert_eq!(eval(&typeof_check("OpCodes", "!==", "undefined")), Some(true));
        assert_eq!(eval(&typeof_check("exports", "==", "object")), Some(false));
        assert_eq!(eval(&typeof_check("OpCodes", "===", "object")), None);
        assert_eq!(eval(&typeof_check("myVar", "!==", "undefined")), None);
    }

    #[test]
    fn test_literal_on_the_left() {
        let v = json!({
            "type": "BinaryExpression",
            "operator": "!=",
            "left": {"type": "Literal", "value": "undefined"},
            "right": {"type": "UnaryExpression", "operator": "typeof", "argument": ident("window")}
        });
        assert_eq!(eval(&v), Some(false));
    }

    #[test]
    fn test_logical_combinations() {
        let amd = json!({
            "type": "LogicalExpression",
            "operator": "&&",
            "left": typeof_check("define", "===", "function"),
            "right": {"type": "MemberExpression", "computed": false,
                      "object": ident("define"), "property": ident("amd")}
        });
        assert_eq!(eval(&amd), Some(false));

        let either = json!({
            "type": "LogicalExpression",
            "operator": "||",
            "left": typeof_check("global", "!==", "undefined"),
            "right": typeof_check("AlgorithmFramework", "!==", "undefined")
        });
        assert_eq!(eval(&either), Some(true));

        let unknown = json!({
            "type": "LogicalExpression",
            "operator": "&&",
            "left": typeof_check("OpCodes", "!==", "undefined"),
            "right": ident("ready")
        });
        assert_eq!(eval(&unknown), None);
    }

    #[test]
    fn test_negation_and_bare_names() {
        let v = json!({"type": "UnaryExpression", "operator": "!", "argument": ident("OpCodes")});
        assert_eq!(eval(&v), Some(false));
        assert_eq!(eval(&ident("process")), Some(false));
        assert_eq!(eval(&ident("counter")), None);
    }
}
