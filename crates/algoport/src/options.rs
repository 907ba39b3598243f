//! Generation options.
//!
//! A flat record; every key is optional and unknown keys are ignored.
//! Options can be built in code, or loaded from JSON or TOML:
//!
//! ```toml
//! indent = "  "
//! modern_syntax = true
//! module_name = "Crypto::Blake2b"
//! type_annotations = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors loading options.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON options: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML options: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Where opening braces go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BraceStyle {
    /// `if (...) {`
    #[default]
    SameLine,
    /// `if (...)` then `{` on its own line.
    NextLine,
}

/// Options for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Indentation unit. `None` uses the target's convention.
    #[serde(alias = "indentString")]
    pub indent: Option<String>,
    #[serde(alias = "lineEnding")]
    pub line_ending: String,
    #[serde(alias = "braceStyle")]
    pub brace_style: BraceStyle,
    /// Emit `use strict; use warnings;` (Perl) or the frozen-string-literal
    /// magic comment (Ruby).
    #[serde(alias = "strictPragmas", alias = "useStrict")]
    pub strict_pragmas: bool,
    /// Use newer syntax where the target has several generations of it
    /// (Perl `use v5.36` with native `try`, block packages and `say`).
    #[serde(alias = "modernSyntax", alias = "useModernSyntax")]
    pub modern_syntax: bool,
    /// Package/module wrapping the generated top level.
    #[serde(alias = "moduleName", alias = "packageName")]
    pub module_name: Option<String>,
    /// Emit inferred parameter and return types as comments.
    #[serde(alias = "typeAnnotations", alias = "addTypeAnnotations")]
    pub type_annotations: bool,
    /// Report every dropped input node as a warning.
    #[serde(alias = "strictInput")]
    pub strict_input: bool,
    /// Timeout for external syntax checks.
    #[serde(alias = "validationTimeoutMs")]
    pub validation_timeout_ms: u64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            indent: None,
            line_ending: "\n".to_string(),
            brace_style: BraceStyle::SameLine,
            strict_pragmas: true,
            modern_syntax: false,
            module_name: None,
            type_annotations: false,
            strict_input: false,
            validation_timeout_ms: 5000,
        }
    }
}

impl GenerationOptions {
    pub fn from_json(json: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, OptionsError> {
        Ok(toml::from_str(source)?)
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn load(path: &Path) -> Result<Self, OptionsError> {
        let content = std::fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Indentation unit, falling back to `default`.
    pub fn indent_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.indent.as_deref().unwrap_or(default)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let opts = GenerationOptions::default();
        assert!(opts.strict_pragmas);
        assert!(!opts.modern_syntax);
        assert_eq!(opts.line_ending, "\n");
        assert_eq!(opts.indent_or("    "), "    ");
        assert_eq!(opts.validation_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_json_ignores_unknown_keys() {
        let opts =
            GenerationOptions::from_json(r#"{"indent": "\t", "useModernSyntax": true, "bogus": 1}"#)
                .unwrap();
        assert_eq!(opts.indent.as_deref(), Some("\t"));
        assert!(opts.modern_syntax);
        assert!(opts.strict_pragmas);
    }

    #[test]
    fn test_from_toml() {
        let opts = GenerationOptions::from_toml_str(
            "brace_style = \"next-line\"\nmodule_name = \"Crypto::Test\"\n",
        )
        .unwrap();
        assert_eq!(opts.brace_style, BraceStyle::NextLine);
        assert_eq!(opts.module_name.as_deref(), Some("Crypto::Test"));
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(
            GenerationOptions::from_json("{"),
            Err(OptionsError::Json(_))
        ));
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("algoport.toml");
        std::fs::File::create(&toml_path)
            .unwrap()
            .write_all(b"type_annotations = true\n")
            .unwrap();
        assert!(GenerationOptions::load(&toml_path).unwrap().type_annotations);

        let json_path = dir.path().join("options.json");
        std::fs::write(&json_path, r#"{"strictInput": true}"#).unwrap();
        assert!(GenerationOptions::load(&json_path).unwrap().strict_input);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            GenerationOptions::load(&missing),
            Err(OptionsError::Io { .. })
        ));
    }
}
