//! Ruby 3 target.

pub mod ast;
mod builtins;
pub mod emit;
pub mod transform;

pub use emit::RubyEmitter;
pub use transform::RubyTransformer;

use crate::options::GenerationOptions;
use crate::output::EmitterConfig;
use crate::traits::{Generated, LanguagePlugin, PluginInfo, TransformError};
use serde_json::Value;

/// Static Ruby plugin instance for registry.
pub static RUBY_PLUGIN: RubyPlugin = RubyPlugin;

const INFO: PluginInfo = PluginInfo {
    name: "Ruby",
    language: "ruby",
    extension: "rb",
    icon: "💎",
    mime_type: "text/x-ruby",
    version: "3.2",
};

/// Ruby plugin: [`RubyTransformer`] then [`RubyEmitter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RubyPlugin;

impl LanguagePlugin for RubyPlugin {
    fn info(&self) -> &PluginInfo {
        &INFO
    }

    fn generate_code(
        &self,
        ast: &Value,
        options: &GenerationOptions,
    ) -> Result<Generated, TransformError> {
        let mut transformer = RubyTransformer::new(options);
        let module = transformer.transform(ast)?;
        let code = RubyEmitter::emit_module(EmitterConfig::from_options(options, "  "), &module);
        Ok(Generated {
            code,
            warnings: transformer.take_warnings(),
            dependencies: transformer.dependencies(),
        })
    }

    fn install_hint(&self) -> &'static str {
        "Install Ruby 3.2+ from your package manager (apt install ruby, brew install ruby) or https://www.ruby-lang.org/en/downloads/"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expression_program(expression: Value) -> Value {
        json!({
            "type": "Program",
            "body": [{"type": "ExpressionStatement", "expression": expression}]
        })
    }

    #[test]
    fn test_generate_simple_program() {
        let ast = json!({
            "type": "Program",
            "body": [{
                "type": "VariableDeclaration", "kind": "let",
                "declarations": [{
                    "type": "VariableDeclarator",
                    "id": {"type": "Identifier", "name": "x"},
                    "init": {"type": "Literal", "value": 1, "raw": "1"}
                }]
            }]
        });
        let result = RUBY_PLUGIN.generate(&ast, &GenerationOptions::default());
        assert!(result.success, "{:?}", result.error);
        assert!(result.code.contains("x = 1"));
    }

    #[test]
    fn test_json_becomes_dependency() {
        let ast = expression_program(json!({
            "type": "CallExpression",
            "callee": {"type": "MemberExpression", "computed": false,
                       "object": {"type": "Identifier", "name": "JSON"},
                       "property": {"type": "Identifier", "name": "stringify"}},
            "arguments": [{"type": "ArrayExpression", "elements": []}]
        }));
        let result = RUBY_PLUGIN.generate(&ast, &GenerationOptions::default());
        assert!(result.success);
        assert_eq!(result.dependencies, vec!["json".to_string()]);
        assert!(result.code.contains("require 'json'"));
        assert!(result.code.contains("JSON.generate([])"));
    }

    #[test]
    fn test_indent_defaults_to_two_spaces() {
        let ast = json!({
            "type": "Program",
            "body": [{
                "type": "FunctionDeclaration",
                "id": {"type": "Identifier", "name": "f"},
                "params": [],
                "body": {"type": "BlockStatement", "body": [{
                    "type": "ExpressionStatement",
                    "expression": {"type": "CallExpression",
                                   "callee": {"type": "Identifier", "name": "g"},
                                   "arguments": []}
                }, {
                    "type": "ExpressionStatement",
                    "expression": {"type": "CallExpression",
                                   "callee": {"type": "Identifier", "name": "h"},
                                   "arguments": []}
                }]}
            }]
        });
        let result = RUBY_PLUGIN.generate(&ast, &GenerationOptions::default());
        assert!(result.success, "{:?}", result.error);
        assert!(result.code.contains("def f\n  g"), "{}", result.code);
    }

    #[test]
    fn test_invalid_root_fails_without_code() {
        let result = RUBY_PLUGIN.generate(&json!({"type": "Foo"}), &GenerationOptions::default());
        assert!(!result.success);
        assert!(result.code.is_empty());
    }
}
