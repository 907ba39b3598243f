//! Borrowed view over the JSON input tree.
//!
//! The input is an ESTree document, optionally enriched by an upstream
//! type-inference pass that tags nodes with `ilNodeType` (and `resultType`).
//! Nothing here validates node shapes: every accessor returns `None` for a
//! missing or ill-typed field, and callers treat that as "unsupported".

use serde::Serialize;
use serde_json::Value;

/// Error for input that cannot be transformed at all.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a Program node at the root, found {found}")]
    InvalidRoot { found: String },
}

/// Line/column of a node's start in the original JavaScript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// A comment attached to an input node by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputComment<'a> {
    pub text: &'a str,
    pub block: bool,
}

/// Parse a JSON document.
pub fn parse_program(json: &str) -> Result<Value, InputError> {
    Ok(serde_json::from_str(json)?)
}

/// Check that `value` is a `Program` with a `body` array and return a view of it.
pub fn program_root(value: &Value) -> Result<JsNode<'_>, InputError> {
    let found = match value {
        Value::Object(map) => match map.get("type").and_then(Value::as_str) {
            Some("Program") if map.get("body").is_some_and(Value::is_array) => {
                return Ok(JsNode { value });
            }
            Some("Program") => "Program without a body array".to_string(),
            Some(other) => format!("'{other}' node"),
            None => "object without a type".to_string(),
        },
        Value::Array(_) => "array".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Null => "null".to_string(),
    };
    Err(InputError::InvalidRoot { found })
}

/// A node of the input tree. Cheap to copy.
#[derive(Clone, Copy)]
pub struct JsNode<'a> {
    value: &'a Value,
}

impl std::fmt::Debug for JsNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JsNode({})", self.kind())
    }
}

impl<'a> JsNode<'a> {
    /// Wrap a JSON object. Anything else is not a node.
    pub fn new(value: &'a Value) -> Option<Self> {
        value.is_object().then_some(Self { value })
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// IL discriminant when present, else the ESTree `type`.
    pub fn kind(&self) -> &'a str {
        self.str_field("ilNodeType")
            .or_else(|| self.str_field("type"))
            .unwrap_or("")
    }

    /// The ESTree `type`, ignoring any IL tag.
    pub fn js_type(&self) -> &'a str {
        self.str_field("type").unwrap_or("")
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind() == kind
    }

    /// Raw field value.
    pub fn field(&self, name: &str) -> Option<&'a Value> {
        self.value.get(name).filter(|v| !v.is_null())
    }

    pub fn has(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Child node in `name`.
    pub fn child(&self, name: &str) -> Option<JsNode<'a>> {
        self.field(name).and_then(JsNode::new)
    }

    /// Child nodes in array field `name`, skipping holes.
    pub fn children(&self, name: &str) -> Vec<JsNode<'a>> {
        self.field(name)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(JsNode::new).collect())
            .unwrap_or_default()
    }

    /// Child nodes in array field `name`, keeping holes as `None`.
    pub fn children_with_holes(&self, name: &str) -> Vec<Option<JsNode<'a>>> {
        self.field(name)
            .and_then(Value::as_array)
            .map(|items| items.iter().map(JsNode::new).collect())
            .unwrap_or_default()
    }

    pub fn str_field(&self, name: &str) -> Option<&'a str> {
        self.value.get(name).and_then(Value::as_str)
    }

    /// Boolean flag; absent means false.
    pub fn bool_field(&self, name: &str) -> bool {
        self.value.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn number_field(&self, name: &str) -> Option<f64> {
        self.value.get(name).and_then(Value::as_f64)
    }

    /// Name of an `Identifier` (or a private name).
    pub fn name(&self) -> Option<&'a str> {
        match self.js_type() {
            "Identifier" | "PrivateIdentifier" | "PrivateName" => self.str_field("name"),
            _ => None,
        }
    }

    /// Start position, from ESTree `loc.start`.
    pub fn location(&self) -> Option<SourceLocation> {
        let start = self.value.get("loc")?.get("start")?;
        Some(SourceLocation {
            line: start.get("line")?.as_u64()? as u32,
            column: start.get("column").and_then(Value::as_u64).unwrap_or(0) as u32,
        })
    }

    /// IL result type (e.g. `"string"`, `"uint32"`).
    pub fn result_type(&self) -> Option<&'a str> {
        self.str_field("resultType")
    }

    pub fn leading_comments(&self) -> Vec<InputComment<'a>> {
        self.value
            .get("leadingComments")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| {
                        Some(InputComment {
                            text: c.get("value")?.as_str()?,
                            block: c.get("type").and_then(Value::as_str) == Some("Block"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Strip `ParenthesizedExpression`, `ChainExpression` and
    /// `AwaitExpression` wrappers.
    pub fn unwrapped(self) -> JsNode<'a> {
        let mut node = self;
        loop {
            let inner = match node.js_type() {
                "ParenthesizedExpression" | "ChainExpression" => node.child("expression"),
                "AwaitExpression" => node.child("argument"),
                _ => None,
            };
            match inner {
                Some(inner) if node.str_field("ilNodeType").is_none() => node = inner,
                _ => return node,
            }
        }
    }

    /// Value of a string `Literal`.
    pub fn string_value(&self) -> Option<&'a str> {
        if self.js_type() == "Literal" {
            self.str_field("value")
        } else {
            None
        }
    }

    /// Whether this is an identifier named `name`.
    pub fn is_identifier(&self, name: &str) -> bool {
        self.name() == Some(name)
    }

    /// `object.property` with a non-computed property: returns the property name.
    pub fn static_member_name(&self) -> Option<&'a str> {
        if self.js_type() != "MemberExpression" || self.bool_field("computed") {
            return None;
        }
        self.child("property")?.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_program_root_accepts_program() {
        let v = json!({"type": "Program", "body": []});
        assert!(program_root(&v).is_ok());
    }

    #[test]
    fn test_program_root_rejects_other_shapes() {
        let err = program_root(&json!([1, 2])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected a Program node at the root, found array"
        );
        let err = program_root(&json!({"type": "Identifier"})).unwrap_err();
        assert!(err.to_string().contains("'Identifier' node"));
        let err = program_root(&json!({"type": "Program"})).unwrap_err();
        assert!(err.to_string().contains("without a body"));
    }

    #[test]
    fn test_kind_prefers_il_tag() {
        let v = json!({"type": "CallExpression", "ilNodeType": "ArrayMap"});
        let node = JsNode::new(&v).unwrap();
        assert_eq!(node.kind(), "ArrayMap");
        assert_eq!(node.js_type(), "CallExpression");
    }

    #[test]
    fn test_children_skip_holes() {
        let v = json!({"type": "ArrayExpression", "elements": [null, {"type": "Literal", "value": 1}]});
        let node = JsNode::new(&v).unwrap();
        assert_eq!(node.children("elements").len(), 1);
        assert_eq!(node.children_with_holes("elements").len(), 2);
    }

    #[test]
    fn test_location_and_comments() {
        let v = json!({
            "type": "Identifier",
            "name": "x",
            "loc": {"start": {"line": 4, "column": 2}},
            "leadingComments": [{"type": "Line", "value": " note"}]
        });
        let node = JsNode::new(&v).unwrap();
        assert_eq!(node.location(), Some(SourceLocation { line: 4, column: 2 }));
        assert_eq!(node.name(), Some("x"));
        let comments = node.leading_comments();
        assert_eq!(comments[0].text, " note");
        assert!(!comments[0].block);
    }

    #[test]
    fn test_unwrapped_strips_parens() {
        let v = json!({
            "type": "ParenthesizedExpression",
            "expression": {"type": "ChainExpression", "expression": {"type": "Identifier", "name": "a"}}
        });
        assert!(JsNode::new(&v).unwrap().unwrapped().is_identifier("a"));
    }
}
