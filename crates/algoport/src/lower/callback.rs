//! Shape analysis of callbacks passed to array methods.

use crate::input::JsNode;

/// A function literal passed as a callback.
#[derive(Debug, Clone, Copy)]
pub struct Callback<'a> {
    pub node: JsNode<'a>,
    pub body: CallbackBody<'a>,
}

#[derive(Debug, Clone, Copy)]
pub enum CallbackBody<'a> {
    /// Arrow function with an expression body.
    Expr(JsNode<'a>),
    /// Block body (`BlockStatement`).
    Block(JsNode<'a>),
}

impl<'a> Callback<'a> {
    /// Recognize an arrow function or function expression.
    pub fn from_node(node: JsNode<'a>) -> Option<Self> {
        let node = node.unwrapped();
        if !matches!(
            node.js_type(),
            "ArrowFunctionExpression" | "FunctionExpression"
        ) {
            return None;
        }
        let body = node.child("body")?;
        let body = if body.js_type() == "BlockStatement" {
            CallbackBody::Block(body)
        } else {
            CallbackBody::Expr(body)
        };
        Some(Self { node, body })
    }

    pub fn params(&self) -> Vec<JsNode<'a>> {
        self.node.children("params")
    }

    /// Name of the `i`th parameter, when it is a plain identifier.
    pub fn param_name(&self, i: usize) -> Option<&'a str> {
        self.params().get(i).and_then(|p| p.name())
    }

    /// The expression this callback returns, when its body is nothing else:
    /// an expression-bodied arrow or a block holding a single `return`.
    pub fn result_expr(&self) -> Option<JsNode<'a>> {
        match self.body {
            CallbackBody::Expr(expr) => Some(expr),
            CallbackBody::Block(block) => {
                let stmts = block.children("body");
                match stmts.as_slice() {
                    [only] if only.js_type() == "ReturnStatement" => only.child("argument"),
                    _ => None,
                }
            }
        }
    }

    /// Uses at most the element and computes a single expression: suited to
    /// a native `map`/`grep`-style block.
    pub fn is_element_only(&self) -> bool {
        let params = self.params();
        params.len() <= 1
            && params.iter().all(|p| p.name().is_some())
            && self.result_expr().is_some()
    }

    /// Body statements, with an expression body presented as nothing (the
    /// caller uses [`Callback::result_expr`] for it).
    pub fn block_statements(&self) -> Vec<JsNode<'a>> {
        match self.body {
            CallbackBody::Block(block) => block.children("body"),
            CallbackBody::Expr(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arrow_expression_is_element_only() {
        let v = json!({
            "type": "ArrowFunctionExpression",
            "params": [{"type": "Identifier", "name": "x"}],
            "body": {"type": "Identifier", "name": "x"}
        });
        let cb = Callback::from_node(JsNode::new(&v).unwrap()).unwrap();
        assert!(cb.is_element_only());
        assert_eq!(cb.param_name(0), Some("x"));
    }

    #[test]
    fn test_index_callback_is_not_element_only() {
        let v = json!({
            "type": "ArrowFunctionExpression",
            "params": [{"type": "Identifier", "name": "x"}, {"type": "Identifier", "name": "i"}],
            "body": {"type": "Identifier", "name": "i"}
        });
        let cb = Callback::from_node(JsNode::new(&v).unwrap()).unwrap();
        assert!(!cb.is_element_only());
    }

    #[test]
    fn test_single_return_block_counts_as_expression() {
        let v = json!({
            "type": "FunctionExpression",
            "params": [{"type": "Identifier", "name": "b"}],
            "body": {"type": "BlockStatement", "body": [
                {"type": "ReturnStatement", "argument": {"type": "Identifier", "name": "b"}}
            ]}
        });
        let cb = Callback::from_node(JsNode::new(&v).unwrap()).unwrap();
        assert!(cb.result_expr().is_some_and(|e| e.is_identifier("b")));
        assert!(cb.is_element_only());
    }

    #[test]
    fn test_non_function_is_rejected() {
        let v = json!({"type": "Identifier", "name": "f"});
        assert!(Callback::from_node(JsNode::new(&v).unwrap()).is_none());
    }
}
