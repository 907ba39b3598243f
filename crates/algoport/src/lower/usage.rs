//! Which names a subtree reads or writes.
//!
//! Targets without closures over file-level variables (Ruby `def`) or with
//! declared instance attributes need to know this before lowering starts.

use crate::input::JsNode;
use serde_json::Value;
use std::collections::HashSet;

/// Visit every node under `value` in source order. `visit` returns whether
/// to descend into the node's children.
fn walk<'a>(value: &'a Value, visit: &mut impl FnMut(JsNode<'a>) -> bool) {
    match value {
        Value::Object(map) => {
            if map.contains_key("type")
                && let Some(node) = JsNode::new(value)
                && !visit(node)
            {
                return;
            }
            for (key, child) in map {
                if key != "loc" && key != "range" {
                    walk(child, visit);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, visit);
            }
        }
        _ => {}
    }
}

fn is_function(node: JsNode<'_>) -> bool {
    matches!(
        node.js_type(),
        "FunctionDeclaration" | "FunctionExpression" | "ArrowFunctionExpression"
    )
}

/// Whether anything in `nodes` assigns, updates or redeclares `name`.
pub fn assigns_to(nodes: &[JsNode<'_>], name: &str) -> bool {
    let mut found = false;
    for node in nodes {
        walk(node.value(), &mut |n| {
            let target = match n.js_type() {
                "AssignmentExpression" => n.child("left"),
                "UpdateExpression" => n.child("argument"),
                "VariableDeclarator" => n.child("id"),
                _ => None,
            };
            if target.is_some_and(|t| t.unwrapped().is_identifier(name)) {
                found = true;
            }
            !found
        });
    }
    found
}

/// Whether anything in `nodes` calls one of `methods` as `x.method(...)`.
pub fn calls_method(nodes: &[JsNode<'_>], methods: &[&str]) -> bool {
    let mut found = false;
    for node in nodes {
        walk(node.value(), &mut |n| {
            if n.js_type() == "CallExpression"
                && n.child("callee")
                    .and_then(|c| c.unwrapped().static_member_name())
                    .is_some_and(|m| methods.contains(&m))
            {
                found = true;
            }
            !found
        });
    }
    found
}

/// Every identifier mentioned inside the function and class definitions
/// among `stmts`, including `const f = () => ...` and `const C = class {}`.
pub fn names_in_definitions<'a>(stmts: &[JsNode<'a>]) -> HashSet<&'a str> {
    let mut names = HashSet::new();
    for stmt in stmts {
        let definition = match stmt.js_type() {
            "FunctionDeclaration" | "ClassDeclaration" => Some(*stmt),
            "VariableDeclaration" => stmt
                .children("declarations")
                .into_iter()
                .filter_map(|d| d.child("init"))
                .find(|init| {
                    matches!(
                        init.unwrapped().js_type(),
                        "ClassExpression" | "FunctionExpression" | "ArrowFunctionExpression"
                    )
                }),
            _ => None,
        };
        if let Some(definition) = definition {
            walk(definition.value(), &mut |n| {
                if n.js_type() == "Identifier"
                    && let Some(name) = n.name()
                {
                    names.insert(name);
                }
                true
            });
        }
    }
    names
}

/// Names assigned through `this.name = ...` in a class's methods, in order
/// of first appearance. Nested `function`s have their own `this` and are
/// skipped; arrow functions are not.
pub fn this_assignments<'a>(class: JsNode<'a>) -> Vec<&'a str> {
    let mut out: Vec<&'a str> = Vec::new();
    let Some(body) = class.child("body") else {
        return out;
    };
    for member in body.children("body") {
        let Some(method) = member.child("value").filter(|v| is_function(*v)) else {
            continue;
        };
        let Some(method_body) = method.child("body") else {
            continue;
        };
        walk(method_body.value(), &mut |n| {
            if matches!(n.js_type(), "FunctionExpression" | "FunctionDeclaration" | "ClassExpression") {
                return false;
            }
            if n.js_type() == "AssignmentExpression"
                && let Some(left) = n.child("left").map(JsNode::unwrapped)
                && left.js_type() == "MemberExpression"
                && !left.bool_field("computed")
                && left.child("object").is_some_and(|o| o.js_type() == "ThisExpression")
                && let Some(name) = left.child("property").and_then(|p| p.name())
                && !out.contains(&name)
            {
                out.push(name);
            }
            true
        });
    }
    out
}

/// Property names that classes anywhere under `stmts` expose as attributes:
/// fields, accessors, and names assigned through `this`.
pub fn class_member_names<'a>(stmts: &[JsNode<'a>]) -> HashSet<&'a str> {
    let mut names = HashSet::new();
    for stmt in stmts {
        walk(stmt.value(), &mut |n| {
            if matches!(n.js_type(), "ClassDeclaration" | "ClassExpression") {
                names.extend(this_assignments(n));
                for member in n.child("body").map(|b| b.children("body")).unwrap_or_default() {
                    let exposed = match member.js_type() {
                        "PropertyDefinition" => true,
                        "MethodDefinition" => {
                            matches!(member.str_field("kind"), Some("get" | "set"))
                        }
                        _ => false,
                    };
                    if exposed
                        && let Some(key) = member.child("key")
                        && let Some(name) = key.name().or_else(|| key.string_value())
                    {
                        names.insert(name);
                    }
                }
            }
            true
        });
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ident(name: &str) -> Value {
        json!({"type": "Identifier", "name": name})
    }

    fn this_assign(name: &str) -> Value {
        json!({"type": "ExpressionStatement", "expression": {
            "type": "AssignmentExpression", "operator": "=",
            "left": {"type": "MemberExpression", "computed": false,
                     "object": {"type": "ThisExpression"}, "property": ident(name)},
            "right": {"type": "Literal", "value": 0}}})
    }

    fn method(kind: &str, name: &str, body: Vec<Value>) -> Value {
        json!({"type": "MethodDefinition", "kind": kind, "key": ident(name),
               "value": {"type": "FunctionExpression", "params": [],
                         "body": {"type": "BlockStatement", "body": body}}})
    }

    #[test]
    fn test_assigns_to_sees_updates() {
        let body = json!({"type": "ExpressionStatement", "expression":
            {"type": "UpdateExpression", "operator": "++", "prefix": false, "argument": ident("i")}});
        let nodes = [JsNode::new(&body).unwrap()];
        assert!(assigns_to(&nodes, "i"));
        assert!(!assigns_to(&nodes, "j"));
    }

    #[test]
    fn test_calls_method_finds_nested_calls() {
        let body = json!({"type": "IfStatement", "test": ident("x"), "consequent": {
            "type": "ExpressionStatement", "expression": {
                "type": "CallExpression", "arguments": [],
                "callee": {"type": "MemberExpression", "computed": false,
                           "object": ident("xs"), "property": ident("push")}}}});
        let nodes = [JsNode::new(&body).unwrap()];
        assert!(calls_method(&nodes, &["push", "pop"]));
        assert!(!calls_method(&nodes, &["splice"]));
    }

    #[test]
    fn test_names_in_definitions_skip_top_level_code() {
        let stmts = [
            json!({"type": "FunctionDeclaration", "id": ident("f"), "params": [],
                   "body": {"type": "BlockStatement", "body": [
                       {"type": "ReturnStatement", "argument": ident("table")}]}}),
            json!({"type": "ExpressionStatement", "expression": ident("other")}),
            json!({"type": "VariableDeclaration", "kind": "const", "declarations": [
                {"type": "VariableDeclarator", "id": ident("g"),
                 "init": {"type": "ArrowFunctionExpression", "params": [], "body": ident("count")}}]}),
        ];
        let nodes: Vec<JsNode> = stmts.iter().filter_map(JsNode::new).collect();
        let names = names_in_definitions(&nodes);
        assert!(names.contains("table"));
        assert!(names.contains("f"));
        assert!(names.contains("count"));
        assert!(!names.contains("other"));
    }

    #[test]
    fn test_this_assignments_in_order() {
        let class = json!({"type": "ClassDeclaration", "id": ident("P"), "body": {
            "type": "ClassBody", "body": [
                method("constructor", "constructor", vec![this_assign("y"), this_assign("x")]),
                method("method", "reset", vec![this_assign("x"), json!({
                    "type": "ExpressionStatement", "expression": {
                        "type": "FunctionExpression", "params": [],
                        "body": {"type": "BlockStatement", "body": [this_assign("hidden")]}}})]),
            ]}});
        let node = JsNode::new(&class).unwrap();
        assert_eq!(this_assignments(node), vec!["y", "x"]);
    }

    #[test]
    fn test_class_member_names_include_fields_and_accessors() {
        let class = json!({"type": "ClassDeclaration", "id": ident("P"), "body": {
            "type": "ClassBody", "body": [
                {"type": "PropertyDefinition", "key": ident("count"), "value": null, "static": false},
                method("get", "size", vec![]),
                method("method", "run", vec![this_assign("state")]),
            ]}});
        let nodes = [JsNode::new(&class).unwrap()];
        let names = class_member_names(&nodes);
        assert!(names.contains("count"));
        assert!(names.contains("size"));
        assert!(names.contains("state"));
        assert!(!names.contains("run"));
    }
}
