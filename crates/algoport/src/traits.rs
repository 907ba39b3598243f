//! The language plugin contract.

use crate::input::InputError;
use crate::options::GenerationOptions;
use crate::validate::BasicScanner;
use algoport_tools::{SyntaxChecker, ToolError};
use serde::Serialize;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

/// Error that aborts a transform.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error(transparent)]
    Input(#[from] InputError),
}

/// Static metadata about a target language.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PluginInfo {
    /// Human-readable name.
    pub name: &'static str,
    /// Language identifier used for registry lookup (e.g. "perl").
    pub language: &'static str,
    /// File extension of generated code, without the dot.
    pub extension: &'static str,
    pub icon: &'static str,
    pub mime_type: &'static str,
    /// Target language version the output is written for.
    pub version: &'static str,
}

/// Successful output of a plugin's core.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generated {
    pub code: String,
    pub warnings: Vec<String>,
    pub dependencies: Vec<String>,
}

/// Outcome of one generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationResult {
    pub success: bool,
    pub code: String,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub dependencies: Vec<String>,
}

impl GenerationResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

impl From<Generated> for GenerationResult {
    fn from(generated: Generated) -> Self {
        Self {
            success: true,
            code: generated.code,
            error: None,
            warnings: generated.warnings,
            dependencies: generated.dependencies,
        }
    }
}

/// Outcome of a syntax check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub success: bool,
    /// Checker that produced the verdict, or `"basic"` for the local scanner.
    pub method: String,
    pub errors: Vec<String>,
}

/// How to get the target's compiler or interpreter.
#[derive(Debug, Clone, Serialize)]
pub struct CompilerInfo {
    pub name: &'static str,
    pub available: bool,
    pub version: Option<String>,
    pub check_command: String,
    pub install_hint: &'static str,
    pub website: &'static str,
}

/// A target language: transformer + emitter behind a uniform interface.
pub trait LanguagePlugin: Send + Sync {
    /// Static metadata.
    fn info(&self) -> &PluginInfo;

    /// Transform and emit. Errors only for input that is not a program.
    fn generate_code(
        &self,
        ast: &Value,
        options: &GenerationOptions,
    ) -> Result<Generated, TransformError>;

    /// Installation hint shown by [`LanguagePlugin::compiler_info`].
    fn install_hint(&self) -> &'static str;

    /// Generate code, reporting every failure (including panics) in the result.
    ///
    /// A failed generation never carries partial code.
    fn generate(&self, ast: &Value, options: &GenerationOptions) -> GenerationResult {
        let language = self.info().language;
        match catch_unwind(AssertUnwindSafe(|| self.generate_code(ast, options))) {
            Ok(Ok(generated)) => generated.into(),
            Ok(Err(err)) => {
                tracing::debug!(language, error = %err, "generation failed");
                GenerationResult::failure(err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(language, %message, "generator panicked");
                GenerationResult::failure(format!("internal error: {message}"))
            }
        }
    }

    /// Check `code` with the target's own tooling, falling back to the
    /// bracket scanner when no checker is installed or it cannot run.
    fn validate_syntax(&self, code: &str) -> ValidationResult {
        self.validate_syntax_with_timeout(code, algoport_tools::DEFAULT_TIMEOUT)
    }

    fn validate_syntax_with_timeout(&self, code: &str, timeout: Duration) -> ValidationResult {
        let language = self.info().language;
        if let Some(checker) = algoport_tools::checker_for_language(language)
            && checker.is_available()
        {
            match checker.check(code, timeout) {
                Ok(outcome) => {
                    return ValidationResult {
                        success: outcome.success,
                        method: outcome.tool.clone(),
                        errors: outcome.messages(),
                    };
                }
                Err(err) => log_checker_failure(language, &err),
            }
        } else {
            tracing::debug!(language, "no syntax checker available, using basic scanner");
        }
        let errors = BasicScanner::for_language(language).scan(code);
        ValidationResult {
            success: errors.is_empty(),
            method: "basic".to_string(),
            errors,
        }
    }

    /// Compiler/interpreter availability and install instructions.
    fn compiler_info(&self) -> CompilerInfo {
        let checker = algoport_tools::checker_for_language(self.info().language);
        let available = checker.is_some_and(|c| c.is_available());
        CompilerInfo {
            name: checker.map_or(self.info().language, |c| c.info().name),
            available,
            version: checker.filter(|_| available).and_then(|c| c.version()),
            check_command: checker
                .map(|c| c.info().check_cmd.join(" "))
                .unwrap_or_default(),
            install_hint: self.install_hint(),
            website: checker.map_or("", |c| c.info().website),
        }
    }
}

fn log_checker_failure(language: &str, err: &ToolError) {
    tracing::debug!(language, error = %err, "syntax checker failed, using basic scanner");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Panicky;

    const PANICKY_INFO: PluginInfo = PluginInfo {
        name: "Panicky",
        language: "panicky",
        extension: "pnk",
        icon: "",
        mime_type: "text/plain",
        version: "0",
    };

    impl LanguagePlugin for Panicky {
        fn info(&self) -> &PluginInfo {
            &PANICKY_INFO
        }

        fn generate_code(
            &self,
            ast: &Value,
            _options: &GenerationOptions,
        ) -> Result<Generated, TransformError> {
            crate::input::program_root(ast)?;
            panic!("boom");
        }

        fn install_hint(&self) -> &'static str {
            ""
        }
    }

    #[test]
    fn test_generate_catches_panics() {
        let result = Panicky.generate(
            &json!({"type": "Program", "body": []}),
            &GenerationOptions::default(),
        );
        assert!(!result.success);
        assert!(result.code.is_empty());
        assert_eq!(result.error.as_deref(), Some("internal error: boom"));
    }

    #[test]
    fn test_generate_reports_invalid_root() {
        let result = Panicky.generate(&json!(42), &GenerationOptions::default());
        assert!(!result.success);
        assert!(result.error.unwrap().contains("found number"));
    }

    #[test]
    fn test_unknown_language_validates_with_basic_scanner() {
        let result = Panicky.validate_syntax("f(1, [2, 3]);\n");
        assert_eq!(result.method, "basic");
        assert!(result.success);

        let result = Panicky.validate_syntax("f(1, [2, 3);\n");
        assert!(!result.success);
    }

    #[test]
    fn test_compiler_info_without_checker() {
        let info = Panicky.compiler_info();
        assert_eq!(info.name, "panicky");
        assert!(!info.available);
        assert!(info.check_command.is_empty());
    }
}
