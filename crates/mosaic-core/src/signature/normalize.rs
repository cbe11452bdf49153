//! Text normalization tables and helpers

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::{PerformanceTier, SecurityLevel};

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "for", "in", "on", "at", "by", "with", "from", "into", "onto",
    "and", "or", "then", "also", "is", "are", "be", "been", "it", "its", "this", "that", "these",
    "those", "as", "per", "each", "every", "all", "any", "given", "using", "via", "should",
    "must", "will", "shall", "can", "so", "which", "who", "whose", "when", "where", "if",
    "function", "method", "helper", "new", "single", "one", "some",
];

const VERBS: &[&str] = &[
    "create", "insert", "add", "read", "get", "fetch", "load", "list", "find", "search",
    "lookup", "update", "delete", "remove", "validate", "check", "verify", "parse", "format",
    "serialize", "deserialize", "compute", "calculate", "transform", "convert", "map",
    "filter", "sort", "merge", "send", "notify", "publish", "store", "save", "persist", "hash",
    "encrypt", "decrypt", "sign", "authenticate", "authorize", "generate", "build", "render",
    "log", "count", "sum", "normalize", "extract", "apply", "register", "handle", "emit",
];

const IDEMPOTENT_INTENTS: &[&str] = &[
    "read", "get", "fetch", "load", "list", "find", "search", "lookup", "validate", "check",
    "verify", "parse", "format", "serialize", "deserialize", "compute", "calculate",
    "transform", "convert", "map", "filter", "sort", "hash", "count", "sum", "normalize",
    "render", "extract",
];

/// Domain keyword table, checked in order
const DOMAINS: &[(&str, &[&str])] = &[
    (
        "auth",
        &[
            "login", "logout", "password", "session", "credential", "authenticate",
            "authorize", "oauth", "jwt", "permission", "role",
        ],
    ),
    (
        "payment",
        &["payment", "invoice", "charge", "refund", "billing", "card", "checkout"],
    ),
    (
        "crud",
        &["record", "crud", "entity", "repository", "database", "table", "row", "model"],
    ),
    (
        "network",
        &["http", "request", "response", "endpoint", "url", "socket", "header"],
    ),
    (
        "parsing",
        &["json", "xml", "csv", "yaml", "toml", "parse", "tokenize"],
    ),
    (
        "math",
        &["compute", "calculate", "sum", "average", "mean", "matrix", "vector"],
    ),
    ("text", &["string", "text", "template", "slug", "format"]),
];

const CRITICAL_SECURITY: &[&str] = &[
    "password", "secret", "credential", "encrypt", "decrypt", "private", "signature", "sign",
];

const HIGH_SECURITY: &[&str] = &[
    "auth", "authenticate", "authorize", "token", "session", "permission", "login", "payment",
    "charge", "refund", "jwt", "oauth",
];

const MEDIUM_SECURITY: &[&str] = &["user", "email", "personal", "pii", "account", "address"];

const CRITICAL_PERFORMANCE: &[&str] = &[
    "realtime", "latency", "fast", "hot", "throughput", "performance", "millisecond", "ms",
];

const RELAXED_PERFORMANCE: &[&str] = &["batch", "background", "offline", "nightly", "eventual"];

const CONSTRAINT_MARKERS: &str = r"(?i)\b(must|without|never|within)\b([^.;,]*)";

fn constraint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CONSTRAINT_MARKERS).expect("constraint regex is valid"))
}

fn fn_signature_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"fn\s+\w+\s*(?:<[^>]*>)?\s*\(([^)]*)\)\s*(?:->\s*([^{;]+))?")
            .expect("fn signature regex is valid")
    })
}

/// Reduce a word to a crude stem (plural and third-person `s`)
pub fn stem(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if word.len() > 5 && word.ends_with("sses") {
        return word[..word.len() - 2].to_string();
    }
    if word.len() > 3
        && word.ends_with('s')
        && !word.ends_with("ss")
        && !word.ends_with("us")
        && !word.ends_with("is")
    {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Lowercase, strip possessives and punctuation, drop stopwords, stem
///
/// Returns tokens in their original order; callers sort when they need a
/// stable form.
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace("'s", " ")
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .filter(|w| !STOPWORDS.contains(w))
        .map(stem)
        .collect()
}

/// Sorted, de-duplicated token string
pub fn canonical(tokens: &[String]) -> String {
    let mut sorted: Vec<&str> = tokens.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.join(" ")
}

/// Split constraint clauses out of a description
///
/// Returns (description with clauses removed, normalized constraints).
pub fn split_constraints(description: &str) -> (String, Vec<String>) {
    let re = constraint_regex();
    let constraints = re
        .captures_iter(description)
        .map(|c| normalize_constraint(&c[0]))
        .filter(|c| !c.is_empty())
        .collect();
    let remainder = re.replace_all(description, " ").into_owned();
    (remainder, constraints)
}

/// Lowercase and collapse a constraint phrase, keeping word order
pub fn normalize_constraint(text: &str) -> String {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Leading known verb, else the first token
pub fn intent(ordered_tokens: &[String]) -> Option<String> {
    ordered_tokens
        .iter()
        .find(|t| VERBS.contains(&t.as_str()))
        .or_else(|| ordered_tokens.first())
        .cloned()
}

pub fn is_idempotent(intent: &str) -> bool {
    IDEMPOTENT_INTENTS.contains(&intent)
}

pub fn infer_domain(all_tokens: &[String]) -> Option<&'static str> {
    DOMAINS
        .iter()
        .find(|(_, keywords)| all_tokens.iter().any(|t| keywords.contains(&t.as_str())))
        .map(|(domain, _)| *domain)
}

pub fn infer_security(all_tokens: &[String]) -> SecurityLevel {
    let any = |table: &[&str]| all_tokens.iter().any(|t| table.contains(&t.as_str()));
    if any(CRITICAL_SECURITY) {
        SecurityLevel::Critical
    } else if any(HIGH_SECURITY) {
        SecurityLevel::High
    } else if any(MEDIUM_SECURITY) {
        SecurityLevel::Medium
    } else {
        SecurityLevel::Low
    }
}

pub fn infer_performance(all_tokens: &[String]) -> PerformanceTier {
    let any = |table: &[&str]| all_tokens.iter().any(|t| table.contains(&t.as_str()));
    if any(CRITICAL_PERFORMANCE) {
        PerformanceTier::Critical
    } else if any(RELAXED_PERFORMANCE) {
        PerformanceTier::Relaxed
    } else {
        PerformanceTier::Standard
    }
}

/// Split on commas that are not nested in `<>`, `()` or `[]`
fn split_top_level(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&params[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&params[start..]);
    parts
}

/// Read inputs and output from the first Rust `fn` signature in a code hint
pub fn io_from_code(code: &str) -> Option<(BTreeMap<String, String>, BTreeMap<String, String>)> {
    let caps = fn_signature_regex().captures(code)?;

    let mut inputs = BTreeMap::new();
    for param in split_top_level(&caps[1]) {
        let Some((name, ty)) = param.split_once(':') else {
            continue;
        };
        let name = name.trim().trim_start_matches("mut ").trim();
        if name.is_empty() || name.contains("self") {
            continue;
        }
        inputs.insert(name.to_string(), compact_type(ty));
    }

    let mut outputs = BTreeMap::new();
    if let Some(ret) = caps.get(2) {
        let ret = compact_type(ret.as_str());
        if !ret.is_empty() && ret != "()" {
            outputs.insert("result".to_string(), ret);
        }
    }

    Some((inputs, outputs))
}

/// Remove whitespace from a type expression
pub fn compact_type(ty: &str) -> String {
    ty.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_strip_stopwords_and_possessives() {
        let t = tokens("Validate the user's email addresses");
        assert_eq!(t, vec!["validate", "user", "email", "address"]);
    }

    #[test]
    fn test_stem_keeps_short_and_double_s() {
        assert_eq!(stem("records"), "record");
        assert_eq!(stem("entries"), "entry");
        assert_eq!(stem("process"), "process");
        assert_eq!(stem("bus"), "bus");
    }

    #[test]
    fn test_split_constraints() {
        let (rest, constraints) =
            split_constraints("Hash a password, must use argon2. Never log the secret");
        assert_eq!(constraints, vec!["must use argon2", "never log the secret"]);
        assert!(rest.contains("Hash a password"));
        assert!(!rest.contains("argon2"));
    }

    #[test]
    fn test_io_from_code_handles_generics() {
        let code = "pub fn merge(left: HashMap<String, u32>, mut right: Vec<u8>) -> Result<(), Error> {}";
        let (inputs, outputs) = io_from_code(code).unwrap();
        assert_eq!(inputs.get("left").unwrap(), "HashMap<String,u32>");
        assert_eq!(inputs.get("right").unwrap(), "Vec<u8>");
        assert_eq!(outputs.get("result").unwrap(), "Result<(),Error>");
    }

    #[test]
    fn test_io_from_code_skips_self_and_unit() {
        let (inputs, outputs) = io_from_code("fn reset(&mut self) { }").unwrap();
        assert!(inputs.is_empty());
        assert!(outputs.is_empty());
    }

    #[test]
    fn test_domain_and_security_inference() {
        let t = tokens("hash the login password");
        assert_eq!(infer_domain(&t), Some("auth"));
        assert_eq!(infer_security(&t), SecurityLevel::Critical);
        assert_eq!(infer_performance(&t), PerformanceTier::Standard);
    }
}
