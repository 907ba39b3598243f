//! Perl 5 target.

pub mod ast;
mod builtins;
pub mod emit;
pub mod transform;

pub use emit::PerlEmitter;
pub use transform::PerlTransformer;

use crate::options::GenerationOptions;
use crate::output::EmitterConfig;
use crate::traits::{Generated, LanguagePlugin, PluginInfo, TransformError};
use serde_json::Value;

/// Static Perl plugin instance for registry.
pub static PERL_PLUGIN: PerlPlugin = PerlPlugin;

const INFO: PluginInfo = PluginInfo {
    name: "Perl",
    language: "perl",
    extension: "pl",
    icon: "🐪",
    mime_type: "text/x-perl",
    version: "5.36",
};

/// Perl plugin: [`PerlTransformer`] then [`PerlEmitter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PerlPlugin;

impl LanguagePlugin for PerlPlugin {
    fn info(&self) -> &PluginInfo {
        &INFO
    }

    fn generate_code(
        &self,
        ast: &Value,
        options: &GenerationOptions,
    ) -> Result<Generated, TransformError> {
        let mut transformer = PerlTransformer::new(options);
        let module = transformer.transform(ast)?;
        let code = PerlEmitter::emit_module(EmitterConfig::from_options(options, "    "), &module);
        Ok(Generated {
            code,
            warnings: transformer.take_warnings(),
            dependencies: transformer.dependencies(),
        })
    }

    fn install_hint(&self) -> &'static str {
        "Install Perl 5.36+ from your package manager (apt install perl, brew install perl) or https://www.perl.org/get.html"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generate_simple_program() {
        let ast = json!({
            "type": "Program",
            "body": [{
                "type": "VariableDeclaration", "kind": "const",
                "declarations": [{
                    "type": "VariableDeclarator",
                    "id": {"type": "Identifier", "name": "x"},
                    "init": {"type": "Literal", "value": 1, "raw": "1"}
                }]
            }]
        });
        let result = PERL_PLUGIN.generate(&ast, &GenerationOptions::default());
        assert!(result.success, "{:?}", result.error);
        assert!(result.code.contains("use strict;"));
        assert!(result.code.contains("my $x = 1;"));
    }

    #[test]
    fn test_library_idioms_become_dependencies() {
        let ast = json!({
            "type": "Program",
            "body": [{
                "type": "ExpressionStatement",
                "expression": {
                    "type": "CallExpression",
                    "callee": {"type": "MemberExpression", "computed": false,
                               "object": {"type": "Identifier", "name": "Math"},
                               "property": {"type": "Identifier", "name": "floor"}},
                    "arguments": [{"type": "Literal", "value": 2.5, "raw": "2.5"}]
                }
            }]
        });
        let result = PERL_PLUGIN.generate(&ast, &GenerationOptions::default());
        assert!(result.success);
        assert_eq!(result.dependencies, vec!["POSIX".to_string()]);
        assert!(result.code.contains("POSIX::floor(2.5)"));
    }

    #[test]
    fn test_invalid_root_fails_without_code() {
        let result = PERL_PLUGIN.generate(&json!({"type": "Foo"}), &GenerationOptions::default());
        assert!(!result.success);
        assert!(result.code.is_empty());
    }
}
