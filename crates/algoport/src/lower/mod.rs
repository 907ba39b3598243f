//! Target-independent analysis shared by the per-language transformers.
//!
//! Everything in here reads the input tree and answers questions about it
//! (which branch of a guard is live, which statements a wrapper hides, how
//! switch cases group). Building target nodes is left to each transformer.

mod bits;
mod callback;
mod guards;
mod hoist;
mod switch;
mod usage;
mod wrapper;

pub use bits::{INT32_SIGN, Rotation, is_int31_literal, rotation_width, shifted_sign};
pub use callback::{Callback, CallbackBody};
pub use guards::{evaluate_guard, is_framework_name};
pub use hoist::{declared_classes, declared_functions, nested_vars};
pub use switch::{SwitchArm, has_own_break, switch_arms};
pub use usage::{
    assigns_to, calls_method, class_member_names, names_in_definitions, this_assignments,
};
pub use wrapper::top_level_statements;

use crate::input::JsNode;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Container category of a variable, fixed at its first declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Shape {
    #[default]
    Scalar,
    List,
    Map,
}

impl Shape {
    /// Shape implied by a declaration's initializer.
    pub fn of_initializer(init: Option<JsNode<'_>>) -> Shape {
        match init.map(|n| n.unwrapped().js_type()) {
            Some("ArrayExpression") => Shape::List,
            Some("ObjectExpression") => Shape::Map,
            _ => Shape::Scalar,
        }
    }
}

/// Lexically scoped name -> shape table.
///
/// The first declaration of a name in a scope wins; later declarations of
/// the same name in that scope keep the original shape.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<HashMap<String, Shape>>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Leave the innermost scope. The outermost scope is never popped.
    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declare `name` in the innermost scope. Returns `false` for a
    /// redeclaration, in which case the recorded shape is unchanged.
    pub fn declare(&mut self, name: &str, shape: Shape) -> bool {
        let Some(scope) = self.scopes.last_mut() else {
            return false;
        };
        if scope.contains_key(name) {
            return false;
        }
        scope.insert(name.to_string(), shape);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<Shape> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    /// Shape of `name`, scalar when it was never declared.
    pub fn shape_of(&self, name: &str) -> Shape {
        self.lookup(name).unwrap_or_default()
    }

    pub fn declared_here(&self, name: &str) -> bool {
        self.scopes.last().is_some_and(|s| s.contains_key(name))
    }

    /// Whether `name` resolves to the outermost scope rather than a
    /// shadowing inner declaration.
    pub fn resolves_outermost(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .rposition(|s| s.contains_key(name))
            .is_some_and(|i| i == 0)
    }
}

/// Modules (and symbols from them) the generated code needs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSet {
    modules: BTreeMap<String, BTreeSet<String>>,
}

impl ImportSet {
    pub fn require(&mut self, module: &str) {
        self.modules.entry(module.to_string()).or_default();
    }

    pub fn import(&mut self, module: &str, symbol: &str) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(symbol.to_string());
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.modules.iter().map(|(m, s)| (m.as_str(), s))
    }

    pub fn modules(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }
}

/// Monotonic source of synthesized names (`__result_1`, `__switch_2`).
#[derive(Debug, Default)]
pub struct NameGen {
    next: u32,
}

impl NameGen {
    pub fn fresh(&mut self, stem: &str) -> String {
        self.next += 1;
        format!("__{stem}_{}", self.next)
    }
}

/// Record of input nodes the transformer could not handle.
#[derive(Debug, Default)]
pub struct DropLog {
    strict: bool,
    warnings: Vec<String>,
}

impl DropLog {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            warnings: Vec::new(),
        }
    }

    /// Note a dropped node. Always logged; kept as a warning only in strict mode.
    pub fn unsupported(&mut self, node: JsNode<'_>) {
        let line = node.location().map(|l| l.line);
        tracing::debug!(node_type = node.kind(), ?line, "dropping unsupported node");
        if self.strict {
            let message = match line {
                Some(line) => format!("unsupported node type '{}' at line {line}", node.kind()),
                None => format!("unsupported node type '{}'", node.kind()),
            };
            self.warnings.push(message);
        }
    }

    /// Note a construct that was translated with reduced fidelity.
    pub fn lossy(&mut self, message: String) {
        tracing::debug!(%message, "lossy translation");
        if self.strict {
            self.warnings.push(message);
        }
    }

    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

/// Methods whose result is a string whatever the receiver.
const STRING_METHODS: &[&str] = &[
    "toString",
    "toUpperCase",
    "toLowerCase",
    "trim",
    "substring",
    "substr",
    "charAt",
    "join",
    "padStart",
    "padEnd",
    "repeat",
    "replace",
    "toFixed",
    "fromCharCode",
];

/// IL kinds whose result is a string.
const STRING_IL_KINDS: &[&str] = &[
    "StringSubstring",
    "StringCharAt",
    "StringToUpperCase",
    "StringToLowerCase",
    "StringTrim",
    "StringRepeat",
    "StringFromCharCode",
    "StringReplace",
    "ArrayJoin",
    "HexEncode",
    "BytesToString",
    "JsonStringify",
];

/// Whether an expression is syntactically string-valued. Drives the
/// choice between string and numeric operators.
pub fn is_string_like(node: JsNode<'_>) -> bool {
    let node = node.unwrapped();
    if node.result_type() == Some("string") {
        return true;
    }
    if STRING_IL_KINDS.contains(&node.kind()) {
        return true;
    }
    match node.js_type() {
        "Literal" => node.string_value().is_some(),
        "TemplateLiteral" => true,
        "BinaryExpression" if node.str_field("operator") == Some("+") => {
            node.child("left").is_some_and(is_string_like)
                || node.child("right").is_some_and(is_string_like)
        }
        "CallExpression" => node.child("callee").is_some_and(|callee| {
            callee.is_identifier("String")
                || callee
                    .static_member_name()
                    .is_some_and(|m| STRING_METHODS.contains(&m))
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shape_of_initializer() {
        let arr = json!({"type": "ArrayExpression", "elements": []});
        let obj = json!({"type": "ObjectExpression", "properties": []});
        let call = json!({"type": "CallExpression"});
        assert_eq!(Shape::of_initializer(JsNode::new(&arr)), Shape::List);
        assert_eq!(Shape::of_initializer(JsNode::new(&obj)), Shape::Map);
        assert_eq!(Shape::of_initializer(JsNode::new(&call)), Shape::Scalar);
        assert_eq!(Shape::of_initializer(None), Shape::Scalar);
    }

    #[test]
    fn test_first_declaration_wins() {
        let mut scopes = ScopeStack::new();
        assert!(scopes.declare("x", Shape::List));
        assert!(!scopes.declare("x", Shape::Scalar));
        assert_eq!(scopes.shape_of("x"), Shape::List);
    }

    #[test]
    fn test_inner_scope_shadows_and_pops() {
        let mut scopes = ScopeStack::new();
        scopes.declare("x", Shape::List);
        scopes.push();
        assert!(!scopes.declared_here("x"));
        assert!(scopes.declare("x", Shape::Map));
        assert_eq!(scopes.shape_of("x"), Shape::Map);
        scopes.pop();
        assert_eq!(scopes.shape_of("x"), Shape::List);
        scopes.pop();
        assert_eq!(scopes.depth(), 1);
        assert_eq!(scopes.shape_of("unknown"), Shape::Scalar);
    }

    #[test]
    fn test_resolves_outermost() {
        let mut scopes = ScopeStack::new();
        scopes.declare("x", Shape::Scalar);
        scopes.push();
        assert!(scopes.resolves_outermost("x"));
        scopes.declare("x", Shape::Scalar);
        assert!(!scopes.resolves_outermost("x"));
        assert!(!scopes.resolves_outermost("missing"));
    }

    #[test]
    fn test_import_set_dedupes() {
        let mut imports = ImportSet::default();
        imports.import("List::Util", "max");
        imports.import("List::Util", "max");
        imports.import("List::Util", "min");
        imports.require("POSIX");
        let all: Vec<_> = imports.iter().map(|(m, s)| (m, s.len())).collect();
        assert_eq!(all, vec![("List::Util", 2), ("POSIX", 0)]);
    }

    #[test]
    fn test_name_gen_is_monotonic() {
        let mut names = NameGen::default();
        assert_eq!(names.fresh("result"), "__result_1");
        assert_eq!(names.fresh("switch"), "__switch_2");
    }

    #[test]
    fn test_drop_log_strict_only_keeps_warnings() {
        let v = json!({"type": "WithStatement", "loc": {"start": {"line": 7, "column": 0}}});
        let node = JsNode::new(&v).unwrap();

        let mut lenient = DropLog::new(false);
        lenient.unsupported(node);
        assert!(lenient.take().is_empty());

        let mut strict = DropLog::new(true);
        strict.unsupported(node);
        assert_eq!(
            strict.take(),
            vec!["unsupported node type 'WithStatement' at line 7"]
        );
    }

    #[test]
    fn test_string_like() {
        let cases = [
            (json!({"type": "Literal", "value": "a"}), true),
            (json!({"type": "Literal", "value": 1}), false),
            (json!({"type": "TemplateLiteral", "quasis": [], "expressions": []}), true),
            (json!({"type": "Identifier", "name": "s", "resultType": "string"}), true),
            (
                json!({"type": "BinaryExpression", "operator": "+",
                       "left": {"type": "Identifier", "name": "a"},
                       "right": {"type": "Literal", "value": "!"}}),
                true,
            ),
            (
                json!({"type": "CallExpression", "callee": {"type": "MemberExpression", "computed": false,
                       "object": {"type": "Identifier", "name": "a"},
                       "property": {"type": "Identifier", "name": "join"}}, "arguments": []}),
                true,
            ),
            (json!({"type": "Identifier", "name": "n"}), false),
        ];
        for (value, expected) in cases {
            let node = JsNode::new(&value).unwrap();
            assert_eq!(is_string_like(node), expected, "{value}");
        }
    }
}
