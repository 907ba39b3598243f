//! Batch generation.
//!
//! Each job runs its own transformer and emitter, so jobs share nothing
//! mutable and run on rayon's pool.

use crate::options::GenerationOptions;
use crate::registry;
use crate::traits::{GenerationResult, ValidationResult};
use rayon::prelude::*;
use serde_json::Value;

/// One program to generate for one target.
#[derive(Debug, Clone)]
pub struct Job {
    /// Target language name, as in [`registry::plugin_for_language`].
    pub language: String,
    pub ast: Value,
    pub options: GenerationOptions,
    /// Run the target's syntax check on the generated code.
    pub validate: bool,
}

impl Job {
    pub fn new(language: impl Into<String>, ast: Value) -> Self {
        Self {
            language: language.into(),
            ast,
            options: GenerationOptions::default(),
            validate: false,
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validated(mut self) -> Self {
        self.validate = true;
        self
    }
}

/// Result of one job: the generation, and the syntax check when asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub language: String,
    pub generation: GenerationResult,
    pub validation: Option<ValidationResult>,
}

/// Run one job.
pub fn run(job: &Job) -> JobOutcome {
    let Some(plugin) = registry::plugin_for_language(&job.language) else {
        tracing::debug!(language = %job.language, "no plugin for language");
        return JobOutcome {
            language: job.language.clone(),
            generation: GenerationResult::failure(format!(
                "no plugin for language '{}'",
                job.language
            )),
            validation: None,
        };
    };
    let generation = plugin.generate(&job.ast, &job.options);
    let validation = (job.validate && generation.success).then(|| {
        plugin.validate_syntax_with_timeout(&generation.code, job.options.validation_timeout())
    });
    JobOutcome {
        language: job.language.clone(),
        generation,
        validation,
    }
}

/// Generate every job in parallel. Results keep the order of `jobs`.
pub fn generate_batch(jobs: &[Job]) -> Vec<GenerationResult> {
    run_batch(jobs).into_iter().map(|o| o.generation).collect()
}

/// [`run`] every job in parallel. Results keep the order of `jobs`.
pub fn run_batch(jobs: &[Job]) -> Vec<JobOutcome> {
    tracing::debug!(jobs = jobs.len(), "running generation batch");
    jobs.par_iter().map(run).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn program() -> Value {
        json!({
            "type": "Program",
            "body": [{
                "type": "VariableDeclaration", "kind": "let",
                "declarations": [{
                    "type": "VariableDeclarator",
                    "id": {"type": "Identifier", "name": "total"},
                    "init": {"type": "Literal", "value": 3, "raw": "3"}
                }]
            }]
        })
    }

    #[test]
    fn test_unknown_language_fails() {
        let results = generate_batch(&[Job::new("cobol", program())]);
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].code.is_empty());
    }

    #[test]
    #[cfg(all(feature = "target-perl", feature = "target-ruby"))]
    fn test_batch_keeps_job_order() {
        let jobs: Vec<Job> = (0..8)
            .map(|i| Job::new(if i % 2 == 0 { "perl" } else { "ruby" }, program()))
            .collect();
        let results = generate_batch(&jobs);
        assert_eq!(results.len(), 8);
        for (i, result) in results.iter().enumerate() {
            assert!(result.success, "{:?}", result.error);
            if i % 2 == 0 {
                assert!(result.code.contains("my $total = 3;"), "{}", result.code);
            } else {
                assert!(result.code.contains("total = 3"), "{}", result.code);
                assert!(!result.code.contains("my $total"));
            }
        }
    }

    #[test]
    #[cfg(feature = "target-perl")]
    fn test_validation_runs_only_on_success() {
        let outcomes = run_batch(&[
            Job::new("perl", program()).validated(),
            Job::new("perl", json!({"type": "Foo"})).validated(),
        ]);
        let validation = outcomes[0].validation.as_ref().expect("validated");
        assert!(validation.success, "{:?}", validation.errors);
        assert!(outcomes[1].validation.is_none());
    }
}
