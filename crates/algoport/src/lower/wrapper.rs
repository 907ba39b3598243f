//! Unwrapping of IIFE/UMD module wrappers and removal of module glue.

use super::guards::{chain_root, is_framework_name};
use crate::input::JsNode;

/// Statements that make up the program once module wrappers are peeled off.
///
/// An immediately-invoked function (`(function () { ... })()`, `!function`,
/// `.call(this)`) contributes its body; the UMD form
/// `(function (root, factory) { ... })(this, function (deps) { ... })`
/// contributes the factory's body. Returns at wrapper level, `"use strict"`
/// directives, `module.exports` style assignments, framework imports and
/// algorithm registration calls are dropped.
pub fn top_level_statements<'a>(program: JsNode<'a>) -> Vec<JsNode<'a>> {
    let mut out = Vec::new();
    flatten(&program.children("body"), false, &mut out);
    out
}

fn flatten<'a>(stmts: &[JsNode<'a>], in_wrapper: bool, out: &mut Vec<JsNode<'a>>) {
    for &stmt in stmts {
        if is_directive(stmt) || is_module_glue(stmt) {
            continue;
        }
        if in_wrapper && stmt.js_type() == "ReturnStatement" {
            continue;
        }
        match wrapper_body(stmt) {
            Some(body) => flatten(&body, true, out),
            None => out.push(stmt),
        }
    }
}

fn is_directive(stmt: JsNode<'_>) -> bool {
    stmt.js_type() == "ExpressionStatement"
        && (stmt.has("directive")
            || stmt
                .child("expression")
                .is_some_and(|e| e.string_value().is_some()))
}

/// Body statements of the function a wrapper statement invokes.
fn wrapper_body<'a>(stmt: JsNode<'a>) -> Option<Vec<JsNode<'a>>> {
    if stmt.js_type() != "ExpressionStatement" {
        return None;
    }
    let mut expr = stmt.child("expression")?.unwrapped();
    while expr.js_type() == "UnaryExpression"
        && matches!(expr.str_field("operator"), Some("!" | "void" | "+" | "-"))
    {
        expr = expr.child("argument")?.unwrapped();
    }
    if expr.js_type() != "CallExpression" {
        return None;
    }
    let callee = expr.child("callee")?.unwrapped();
    let invoked = if is_function(callee) {
        // UMD: the factory is the last function argument.
        expr.children("arguments")
            .into_iter()
            .map(JsNode::unwrapped)
            .rev()
            .find(|a| is_function(*a))
            .unwrap_or(callee)
    } else if matches!(callee.static_member_name(), Some("call" | "apply")) {
        let target = callee.child("object")?.unwrapped();
        if !is_function(target) {
            return None;
        }
        target
    } else {
        return None;
    };
    let body = invoked.child("body")?;
    (body.js_type() == "BlockStatement").then(|| body.children("body"))
}

fn is_function(node: JsNode<'_>) -> bool {
    matches!(
        node.js_type(),
        "FunctionExpression" | "ArrowFunctionExpression"
    )
}

/// Statements that only exist to talk to a JS module system or to the
/// algorithm registry.
fn is_module_glue(stmt: JsNode<'_>) -> bool {
    match stmt.js_type() {
        "ExpressionStatement" => {
            let Some(expr) = stmt.child("expression").map(JsNode::unwrapped) else {
                return false;
            };
            match expr.js_type() {
                "AssignmentExpression" => expr
                    .child("left")
                    .and_then(chain_root)
                    .is_some_and(|root| is_framework_name(root) && root != "OpCodes"),
                "CallExpression" => expr.child("callee").is_some_and(|callee| {
                    callee.is_identifier("RegisterAlgorithm")
                        || callee.static_member_name() == Some("RegisterAlgorithm")
                }),
                _ => false,
            }
        }
        "VariableDeclaration" => {
            let decls = stmt.children("declarations");
            !decls.is_empty()
                && decls
                    .iter()
                    .all(|d| d.child("init").is_some_and(is_framework_ref))
        }
        _ => false,
    }
}

/// `require(...)`, a known framework global, or a `||` chain of those.
fn is_framework_ref(node: JsNode<'_>) -> bool {
    let node = node.unwrapped();
    match node.js_type() {
        "CallExpression" => node
            .child("callee")
            .is_some_and(|c| c.is_identifier("require")),
        "LogicalExpression" => {
            node.child("left").is_some_and(is_framework_ref)
                && node.child("right").is_some_and(is_framework_ref)
        }
        "Identifier" | "MemberExpression" => chain_root(node).is_some_and(is_framework_name),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn ident(name: &str) -> Value {
        json!({"type": "Identifier", "name": name})
    }

    fn expr_stmt(expr: Value) -> Value {
        json!({"type": "ExpressionStatement", "expression": expr})
    }

    fn func(params: Vec<Value>, body: Vec<Value>) -> Value {
        json!({"type": "FunctionExpression", "params": params,
               "body": {"type": "BlockStatement", "body": body}})
    }

    fn call_f() -> Value {
        expr_stmt(json!({"type": "CallExpression", "callee": ident("f"), "arguments": []}))
    }

    fn kinds(program: &Value) -> Vec<String> {
        top_level_statements(JsNode::new(program).unwrap())
            .iter()
            .map(|s| {
                s.child("expression")
                    .and_then(|e| e.child("callee"))
                    .and_then(|c| c.name())
                    .unwrap_or(s.kind())
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_unwraps_iife() {
        let program = json!({"type": "Program", "body": [
            expr_stmt(json!({"type": "Literal", "value": "use strict"})),
            expr_stmt(json!({
                "type": "CallExpression",
                "callee": func(vec![], vec![call_f(), json!({"type": "ReturnStatement"})]),
                "arguments": []
            }))
        ]});
        assert_eq!(kinds(&program), vec!["f"]);
    }

    #[test]
    fn test_unwraps_umd_factory() {
        let program = json!({"type": "Program", "body": [
            expr_stmt(json!({
                "type": "CallExpression",
                "callee": func(vec![ident("root"), ident("factory")], vec![
                    expr_stmt(json!({"type": "CallExpression", "callee": ident("factory"), "arguments": []}))
                ]),
                "arguments": [{"type": "ThisExpression"}, func(vec![ident("OpCodes")], vec![call_f()])]
            }))
        ]});
        assert_eq!(kinds(&program), vec!["f"]);
    }

    #[test]
    fn test_drops_module_glue() {
        let program = json!({"type": "Program", "body": [
            expr_stmt(json!({
                "type": "AssignmentExpression", "operator": "=",
                "left": {"type": "MemberExpression", "computed": false,
                         "object": ident("module"), "property": ident("exports")},
                "right": ident("X")
            })),
            {"type": "VariableDeclaration", "kind": "const", "declarations": [{
                "type": "VariableDeclarator", "id": ident("OpCodes"),
                "init": {"type": "LogicalExpression", "operator": "||",
                         "left": {"type": "MemberExpression", "computed": false,
                                  "object": ident("global"), "property": ident("OpCodes")},
                         "right": {"type": "CallExpression", "callee": ident("require"),
                                   "arguments": [{"type": "Literal", "value": "./OpCodes"}]}}
            }]},
            expr_stmt(json!({"type": "CallExpression", "callee": ident("RegisterAlgorithm"), "arguments": []})),
            call_f()
        ]});
        assert_eq!(kinds(&program), vec!["f"]);
    }

    #[test]
    fn test_keeps_ordinary_calls() {
        let program = json!({"type": "Program", "body": [call_f(), call_f()]});
        assert_eq!(kinds(&program).len(), 2);
    }
}
