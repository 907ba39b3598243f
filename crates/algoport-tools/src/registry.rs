//! Checker registry.
//!
//! # Extensibility
//!
//! Users can register custom checkers via [`register_checker()`]:
//!
//! ```ignore
//! use algoport_tools::{CheckOutcome, CheckerInfo, SyntaxChecker, ToolError, register_checker};
//! use std::time::Duration;
//!
//! struct PhpLint;
//!
//! impl SyntaxChecker for PhpLint {
//!     fn info(&self) -> &CheckerInfo { /* ... */ }
//!     fn is_available(&self) -> bool { /* ... */ }
//!     fn version(&self) -> Option<String> { /* ... */ }
//!     fn check(&self, code: &str, timeout: Duration) -> Result<CheckOutcome, ToolError> { /* ... */ }
//! }
//!
//! // Register before first use
//! register_checker(&PhpLint);
//! ```

use crate::SyntaxChecker;
use rayon::prelude::*;
use std::sync::{OnceLock, RwLock};

/// Global registry of checkers.
static CHECKERS: RwLock<Vec<&'static dyn SyntaxChecker>> = RwLock::new(Vec::new());
static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Register a custom checker.
///
/// Checkers registered later take precedence for the same language.
pub fn register_checker(checker: &'static dyn SyntaxChecker) {
    init_builtin();
    CHECKERS.write().unwrap().push(checker);
}

/// Initialize built-in checkers (called automatically on first use).
fn init_builtin() {
    INITIALIZED.get_or_init(|| {
        let mut checkers = CHECKERS.write().unwrap();

        #[cfg(feature = "tool-perl")]
        {
            use crate::adapters::PerlCheck;
            static PERL: PerlCheck = PerlCheck;
            checkers.push(&PERL);
        }
        #[cfg(feature = "tool-ruby")]
        {
            use crate::adapters::RubyCheck;
            static RUBY: RubyCheck = RubyCheck;
            checkers.push(&RUBY);
        }
        #[cfg(feature = "tool-tsc")]
        {
            use crate::adapters::TscCheck;
            static TSC: TscCheck = TscCheck;
            checkers.push(&TSC);
        }
    });
}

/// Get the checker for a language (case-insensitive).
pub fn checker_for_language(lang: &str) -> Option<&'static dyn SyntaxChecker> {
    init_builtin();
    CHECKERS
        .read()
        .unwrap()
        .iter()
        .rev()
        .find(|c| c.info().language.eq_ignore_ascii_case(lang))
        .copied()
}

/// All registered checker names.
pub fn checkers() -> Vec<&'static str> {
    init_builtin();
    CHECKERS.read().unwrap().iter().map(|c| c.info().name).collect()
}

/// Checkers whose executables are installed, checked in parallel.
pub fn available_checkers() -> Vec<&'static dyn SyntaxChecker> {
    init_builtin();
    let all: Vec<&'static dyn SyntaxChecker> = CHECKERS.read().unwrap().clone();
    all.into_par_iter().filter(|c| c.is_available()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CheckOutcome, CheckerInfo, ToolError};
    use std::time::Duration;

    struct AlwaysOk;

    const ALWAYS_OK_INFO: CheckerInfo = CheckerInfo {
        name: "always-ok",
        language: "testlang",
        suffix: ".t",
        check_cmd: &[],
        website: "",
    };

    impl SyntaxChecker for AlwaysOk {
        fn info(&self) -> &CheckerInfo {
            &ALWAYS_OK_INFO
        }
        fn is_available(&self) -> bool {
            true
        }
        fn version(&self) -> Option<String> {
            Some("1".to_string())
        }
        fn check(&self, _code: &str, _timeout: Duration) -> Result<CheckOutcome, ToolError> {
            Ok(CheckOutcome::passed("always-ok", String::new()))
        }
    }

    #[test]
    fn test_builtin_checkers_registered() {
        let names = checkers();
        #[cfg(feature = "tool-perl")]
        assert!(names.contains(&"perl"));
        #[cfg(feature = "tool-ruby")]
        assert!(names.contains(&"ruby"));
        #[cfg(feature = "tool-tsc")]
        assert!(names.contains(&"tsc"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        #[cfg(feature = "tool-perl")]
        assert_eq!(checker_for_language("Perl").unwrap().info().name, "perl");
        assert!(checker_for_language("cobol").is_none());
    }

    #[test]
    fn test_register_custom_checker() {
        static CHECKER: AlwaysOk = AlwaysOk;
        register_checker(&CHECKER);
        let found = checker_for_language("testlang").unwrap();
        assert_eq!(found.info().name, "always-ok");
        assert!(available_checkers().iter().any(|c| c.info().name == "always-ok"));
    }
}
