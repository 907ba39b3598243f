//! Source-to-source translation of JavaScript algorithm code to Perl and Ruby.
//!
//! `algoport` reads an ESTree JSON document (optionally enriched with `IL`
//! nodes that name higher-level operations such as `ArrayMap` or
//! `RotateLeft`) and writes an equivalent program in a target language.
//!
//! # Architecture
//!
//! ```text
//! ESTree + IL JSON        per target                      text
//! ────────────────    ──────────────────────────────    ───────
//!                  ┌─> PerlTransformer ─> perl::ast ─> PerlEmitter ─> .pl
//! input::JsNode ───┤
//!                  └─> RubyTransformer ─> ruby::ast ─> RubyEmitter ─> .rb
//! ```
//!
//! Each target is wrapped in a [`LanguagePlugin`] and found through the
//! registry:
//!
//! ```ignore
//! use algoport::{GenerationOptions, plugin_for_language};
//!
//! let ast = algoport::input::parse_program(json)?;
//! let perl = plugin_for_language("perl").unwrap();
//! let result = perl.generate(&ast, &GenerationOptions::default());
//! assert!(result.success);
//! ```
//!
//! # Fidelity
//!
//! Translation is best effort. Constructs with no mapping are dropped (and
//! reported in strict input mode); the generated code is meant to be read
//! and checked, with [`LanguagePlugin::validate_syntax`] as a first gate.

pub mod input;
pub mod lower;
pub mod options;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod traits;
pub mod validate;

// Re-exports: options and results
pub use options::{BraceStyle, GenerationOptions, OptionsError};
pub use traits::{
    CompilerInfo, Generated, GenerationResult, LanguagePlugin, PluginInfo, TransformError,
    ValidationResult,
};

// Re-exports: registry
pub use registry::{plugin_for_extension, plugin_for_language, plugins, register_plugin};

// Re-exports: batch generation
pub use pipeline::{Job, JobOutcome, generate_batch, run_batch};

// Re-exports: built-in targets
#[cfg(feature = "target-perl")]
pub use output::perl::{PERL_PLUGIN, PerlEmitter, PerlPlugin, PerlTransformer};
#[cfg(feature = "target-ruby")]
pub use output::ruby::{RUBY_PLUGIN, RubyEmitter, RubyPlugin, RubyTransformer};
