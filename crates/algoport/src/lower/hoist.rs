//! Pre-scans of statement lists for names that JavaScript hoists.

use super::Shape;
use crate::input::JsNode;

/// Names of function declarations directly in `stmts`.
pub fn declared_functions<'a>(stmts: &[JsNode<'a>]) -> Vec<&'a str> {
    stmts
        .iter()
        .filter(|s| s.js_type() == "FunctionDeclaration")
        .filter_map(|s| s.child("id")?.name())
        .collect()
}

/// Names of class declarations directly in `stmts`.
pub fn declared_classes<'a>(stmts: &[JsNode<'a>]) -> Vec<&'a str> {
    stmts
        .iter()
        .filter_map(|s| {
            let class = if s.js_type() == "ClassDeclaration" {
                *s
            } else {
                // `const Foo = class { ... }`
                let decl = s
                    .children("declarations")
                    .into_iter()
                    .find(|d| d.child("init").is_some_and(|i| i.js_type() == "ClassExpression"))?;
                return decl.child("id")?.name();
            };
            class.child("id")?.name()
        })
        .collect()
}

/// `var` declarations nested inside blocks of a function body (but not
/// inside nested functions or loop headers). JavaScript scopes these to the
/// whole function, so they are declared up front.
pub fn nested_vars<'a>(body: &[JsNode<'a>]) -> Vec<(&'a str, Shape)> {
    let mut out: Vec<(&'a str, Shape)> = Vec::new();
    for stmt in body {
        for nested in nested_statements(*stmt) {
            collect_vars(nested, &mut out);
        }
    }
    out
}

fn collect_vars<'a>(stmt: JsNode<'a>, out: &mut Vec<(&'a str, Shape)>) {
    if stmt.js_type() == "VariableDeclaration" && stmt.str_field("kind") == Some("var") {
        for decl in stmt.children("declarations") {
            if let Some(name) = decl.child("id").and_then(|id| id.name())
                && !out.iter().any(|(n, _)| *n == name)
            {
                out.push((name, Shape::of_initializer(decl.child("init"))));
            }
        }
    }
    for nested in nested_statements(stmt) {
        collect_vars(nested, out);
    }
}

/// Statements one block level below `stmt`.
fn nested_statements(stmt: JsNode<'_>) -> Vec<JsNode<'_>> {
    let mut out = Vec::new();
    match stmt.js_type() {
        "BlockStatement" => push_body(&mut out, Some(stmt)),
        "IfStatement" => {
            push_body(&mut out, stmt.child("consequent"));
            push_body(&mut out, stmt.child("alternate"));
        }
        "ForStatement" | "ForOfStatement" | "ForInStatement" | "WhileStatement"
        | "DoWhileStatement" | "LabeledStatement" => push_body(&mut out, stmt.child("body")),
        "TryStatement" => {
            push_body(&mut out, stmt.child("block"));
            push_body(&mut out, stmt.child("handler").and_then(|h| h.child("body")));
            push_body(&mut out, stmt.child("finalizer"));
        }
        "SwitchStatement" => {
            for case in stmt.children("cases") {
                out.extend(case.children("consequent"));
            }
        }
        _ => {}
    }
    out
}

fn push_body<'a>(out: &mut Vec<JsNode<'a>>, node: Option<JsNode<'a>>) {
    if let Some(node) = node {
        if node.js_type() == "BlockStatement" {
            out.extend(node.children("body"));
        } else {
            out.push(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn var(kind: &str, name: &str, init: Value) -> Value {
        json!({"type": "VariableDeclaration", "kind": kind, "declarations": [
            {"type": "VariableDeclarator", "id": {"type": "Identifier", "name": name}, "init": init}
        ]})
    }

    fn nodes(values: &[Value]) -> Vec<JsNode<'_>> {
        values.iter().filter_map(JsNode::new).collect()
    }

    #[test]
    fn test_declared_functions_and_classes() {
        let body = [
            json!({"type": "FunctionDeclaration", "id": {"type": "Identifier", "name": "f"}}),
            json!({"type": "ClassDeclaration", "id": {"type": "Identifier", "name": "C"}}),
            var("const", "D", json!({"type": "ClassExpression"})),
        ];
        let stmts = nodes(&body);
        assert_eq!(declared_functions(&stmts), vec!["f"]);
        assert_eq!(declared_classes(&stmts), vec!["C", "D"]);
    }

    #[test]
    fn test_nested_vars_found_in_blocks_only() {
        let body = [
            var("var", "top", json!(null)),
            json!({"type": "IfStatement", "test": {"type": "Identifier", "name": "c"},
                   "consequent": {"type": "BlockStatement", "body": [
                       var("var", "inner", json!({"type": "ArrayExpression", "elements": []})),
                       var("let", "scoped", json!(null))
                   ]},
                   "alternate": null}),
        ];
        let stmts = nodes(&body);
        assert_eq!(nested_vars(&stmts), vec![("inner", Shape::List)]);
    }
}
