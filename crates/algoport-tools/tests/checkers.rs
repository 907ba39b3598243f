//! End-to-end checks against whatever interpreters are installed.
//!
//! Each test returns early when its executable is missing, so the suite
//! passes on hosts without perl or ruby.

use algoport_tools::{DEFAULT_TIMEOUT, checker_for_language};

fn check(lang: &str, code: &str) -> Option<bool> {
    let checker = checker_for_language(lang)?;
    if !checker.is_available() {
        return None;
    }
    Some(checker.check(code, DEFAULT_TIMEOUT).ok()?.success)
}

#[test]
fn perl_accepts_valid_program() {
    let code = "use strict;\nuse warnings;\n\nsub add {\n    my ($a, $b) = @_;\n    return $a + $b;\n}\n\nprint add(2, 3), \"\\n\";\n";
    if let Some(ok) = check("perl", code) {
        assert!(ok);
    }
}

#[test]
fn perl_rejects_undeclared_variable() {
    let code = "use strict;\n$undeclared = 1;\n";
    if let Some(ok) = check("perl", code) {
        assert!(!ok);
    }
}

#[test]
fn ruby_accepts_valid_program() {
    let code = "def add(a, b)\n  a + b\nend\n\nputs add(2, 3)\n";
    if let Some(ok) = check("ruby", code) {
        assert!(ok);
    }
}

#[test]
fn ruby_rejects_unterminated_method() {
    if let Some(ok) = check("ruby", "def add(a, b)\n  a + b\n") {
        assert!(!ok);
    }
}

#[test]
fn perl_version_is_dotted() {
    let Some(checker) = checker_for_language("perl") else {
        return;
    };
    if let Some(version) = checker.version() {
        assert!(version.starts_with('5'), "unexpected version {version}");
    }
}
