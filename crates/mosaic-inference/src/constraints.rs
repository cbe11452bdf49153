//! Constraint enforcement for generated atoms
//!
//! Candidates are rejected, never repaired: every violation found here goes
//! back into the next attempt's prompt.

use mosaic_core::AtomicTask;
use regex::Regex;
use std::sync::OnceLock;
use syn::visit::Visit;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"todo!\s*\(|unimplemented!\s*\(|\bTODO\b|\bFIXME\b|\bXXX\b|\.\.\.")
            .expect("placeholder regex is valid")
    })
}

fn conjunction_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(and|then|also)\b").expect("conjunction regex is valid"))
}

/// Non-blank lines outside comments
pub fn code_lines(code: &str) -> usize {
    let mut in_block = false;
    code.lines()
        .map(str::trim)
        .filter(|line| {
            if in_block {
                if line.contains("*/") {
                    in_block = false;
                }
                return false;
            }
            if line.starts_with("/*") {
                in_block = !line.contains("*/");
                return false;
            }
            !line.is_empty() && !line.starts_with("//")
        })
        .count()
}

/// Parse as a Rust file, returning the parser's message on failure
pub fn parse(code: &str) -> Result<syn::File, String> {
    syn::parse_file(code).map_err(|e| e.to_string())
}

/// Free functions plus impl methods
pub fn function_count(file: &syn::File) -> usize {
    file.items
        .iter()
        .map(|item| match item {
            syn::Item::Fn(_) => 1,
            syn::Item::Impl(imp) => imp
                .items
                .iter()
                .filter(|i| matches!(i, syn::ImplItem::Fn(_)))
                .count(),
            _ => 0,
        })
        .sum()
}

struct StatementCounter {
    count: usize,
}

impl<'ast> Visit<'ast> for StatementCounter {
    fn visit_stmt(&mut self, stmt: &'ast syn::Stmt) {
        self.count += 1;
        syn::visit::visit_stmt(self, stmt);
    }
}

/// Statements at any nesting depth
pub fn statement_count(file: &syn::File) -> usize {
    let mut counter = StatementCounter { count: 0 };
    counter.visit_file(file);
    counter.count
}

/// Distinct placeholder markers present in the code
pub fn placeholder_markers(code: &str) -> Vec<String> {
    let mut found: Vec<String> = placeholder_regex()
        .find_iter(code)
        .map(|m| {
            m.as_str()
                .trim_end_matches('(')
                .trim_end()
                .to_string()
        })
        .collect();
    found.sort();
    found.dedup();
    found
}

/// Declared inputs whose name never appears, and outputs whose type never appears
pub fn missing_io(code: &str, task: &AtomicTask) -> Vec<String> {
    let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    let mut missing = Vec::new();

    for name in task.signature.inputs.keys() {
        let used = Regex::new(&format!(r"\b{}\b", regex::escape(name)))
            .map(|re| re.is_match(code))
            .unwrap_or_else(|_| code.contains(name.as_str()));
        if !used {
            missing.push(format!("declared input `{}` is not used", name));
        }
    }
    for ty in task.signature.outputs.values() {
        if !compact.contains(ty.as_str()) {
            missing.push(format!("declared output type `{}` does not appear", ty));
        }
    }
    missing
}

/// Conjunctions in a description that suggest more than one responsibility
pub fn conjunctions(description: &str) -> Vec<String> {
    let mut found: Vec<String> = conjunction_regex()
        .find_iter(description)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    found.sort();
    found.dedup();
    found
}

/// Outcome of checking one candidate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintReport {
    pub violations: Vec<String>,
    pub code_lines: usize,
}

impl ConstraintReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintChecker {
    max_statements: usize,
}

impl Default for ConstraintChecker {
    fn default() -> Self {
        Self::new(mosaic_core::config::AtomConfig::default().max_statements)
    }
}

impl ConstraintChecker {
    pub fn new(max_statements: usize) -> Self {
        Self { max_statements }
    }

    /// Check a candidate against its atom's declared constraints
    pub fn check(&self, code: &str, task: &AtomicTask) -> ConstraintReport {
        let mut report = ConstraintReport {
            code_lines: code_lines(code),
            ..ConstraintReport::default()
        };

        if code.trim().is_empty() {
            report.violations.push("candidate is empty".to_string());
            return report;
        }

        if report.code_lines > task.max_lines {
            report.violations.push(format!(
                "{} lines of code exceeds the limit of {}",
                report.code_lines, task.max_lines
            ));
        }

        match parse(code) {
            Ok(file) => {
                let functions = function_count(&file);
                if functions > 1 {
                    report.violations.push(format!(
                        "defines {} functions; an atom implements exactly one",
                        functions
                    ));
                }
                let statements = statement_count(&file);
                if statements > self.max_statements {
                    report.violations.push(format!(
                        "{} statements exceeds the limit of {}",
                        statements, self.max_statements
                    ));
                }
            }
            Err(e) => report
                .violations
                .push(format!("does not parse as Rust: {}", e)),
        }

        for marker in placeholder_markers(code) {
            report
                .violations
                .push(format!("contains placeholder `{}`", marker));
        }

        report.violations.extend(missing_io(code, task));

        for word in conjunctions(&task.description) {
            report.violations.push(format!(
                "description contains '{}'; an atom has a single responsibility",
                word
            ));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{SignatureExtractor, SignatureHints};

    fn task(description: &str, hints: SignatureHints) -> AtomicTask {
        let sig = SignatureExtractor::new()
            .extract_with(description, hints)
            .unwrap();
        AtomicTask::new("atom-1", description, sig)
    }

    fn add_task() -> AtomicTask {
        task(
            "Add two numbers",
            SignatureHints::new()
                .input("a", "i64")
                .input("b", "i64")
                .output("sum", "i64"),
        )
    }

    #[test]
    fn test_clean_candidate_passes() {
        let code = "/// Adds\npub fn add(a: i64, b: i64) -> i64 {\n    a + b\n}\n";
        let report = ConstraintChecker::default().check(code, &add_task());
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.code_lines, 3);
    }

    #[test]
    fn test_line_limit() {
        let body: String = (0..12).map(|i| format!("    let x{} = {};\n", i, i)).collect();
        let code = format!("fn add(a: i64, b: i64) -> i64 {{\n{}    a + b\n}}\n", body);
        let report = ConstraintChecker::new(100).check(&code, &add_task());
        assert!(report.violations.iter().any(|v| v.contains("exceeds the limit of 10")));
    }

    #[test]
    fn test_unparseable_rejected() {
        let report = ConstraintChecker::default().check("fn add(a: i64, b: i64 -> i64 {", &add_task());
        assert!(report.violations.iter().any(|v| v.starts_with("does not parse")));
    }

    #[test]
    fn test_placeholders_rejected() {
        let code = "fn add(a: i64, b: i64) -> i64 {\n    // TODO overflow\n    todo!()\n}";
        let report = ConstraintChecker::default().check(code, &add_task());
        assert!(report.violations.contains(&"contains placeholder `TODO`".to_string()));
        assert!(report.violations.contains(&"contains placeholder `todo!`".to_string()));
    }

    #[test]
    fn test_multiple_functions_rejected() {
        let code = "fn add(a: i64, b: i64) -> i64 { a + b }\nfn sub(a: i64, b: i64) -> i64 { a - b }";
        let report = ConstraintChecker::default().check(code, &add_task());
        assert!(report
            .violations
            .iter()
            .any(|v| v.contains("defines 2 functions")));
    }

    #[test]
    fn test_statement_limit() {
        let code = "fn add(a: i64, b: i64) -> i64 { let c = a; let d = b; let e = c; c + d + e }";
        let report = ConstraintChecker::new(2).check(code, &add_task());
        assert!(report
            .violations
            .iter()
            .any(|v| v.contains("statements exceeds the limit of 2")));
    }

    #[test]
    fn test_missing_io_rejected() {
        let code = "fn add(x: u8, y: u8) -> u8 { 0 }";
        let report = ConstraintChecker::default().check(code, &add_task());
        assert!(report.violations.contains(&"declared input `a` is not used".to_string()));
        assert!(report.violations.contains(&"declared input `b` is not used".to_string()));
        assert!(report
            .violations
            .contains(&"declared output type `i64` does not appear".to_string()));
    }

    #[test]
    fn test_conjunction_in_description_rejected() {
        let code = "fn parse_port(raw: &str) -> Option<u16> { raw.parse::<u16>().ok() }";
        let hints = || SignatureHints::new().input("raw", "&str").output("port", "u16");

        let split = task("Parse a port", hints());
        assert!(ConstraintChecker::default().check(code, &split).is_clean());

        let joined = task("Parse and validate a port", hints());
        let report = ConstraintChecker::default().check(code, &joined);
        assert!(!report.is_clean());
        assert_eq!(
            report.violations,
            vec!["description contains 'and'; an atom has a single responsibility".to_string()]
        );
    }

    #[test]
    fn test_code_lines_skip_block_comments() {
        let code = "/* header\n * more\n */\nfn f() {}\n\n// note\n";
        assert_eq!(code_lines(code), 1);
    }
}
