//! Example specifications for common project types

use crate::spec::{EntityHint, Specification};

/// A small CRUD service
pub fn crud_spec() -> Specification {
    Specification::new(
        "Bookmark Service",
        "A service that stores web bookmarks for registered users.\n\
         \n\
         Users register with an email address and a password. Passwords must be hashed \
         and never stored in plain text. A signed-in user can create, list, rename and \
         delete their own bookmarks. Every bookmark has a URL, a title and optional tags; \
         URLs must be validated before they are stored. Listing must support filtering \
         by tag and must respond within 200ms for 10,000 bookmarks.",
    )
    .with_entity(
        EntityHint::new("User")
            .with_attribute("email")
            .with_attribute("password_hash"),
    )
    .with_entity(
        EntityHint::new("Bookmark")
            .with_attribute("url")
            .with_attribute("title")
            .with_attribute("tags"),
    )
}

/// A command-line tool
pub fn cli_tool_spec() -> Specification {
    Specification::new(
        "Log Summarizer",
        "A command-line tool that reads web server access logs and prints a summary.\n\
         \n\
         It parses each line in Common Log Format, skipping malformed lines without \
         aborting. The summary reports request counts per status class, the ten most \
         requested paths, and the 95th percentile response size. Input comes from a file \
         argument or standard input. Output is plain text by default or JSON with --json.",
    )
    .with_entity(
        EntityHint::new("LogEntry")
            .with_attribute("path")
            .with_attribute("status")
            .with_attribute("bytes"),
    )
    .with_entity(EntityHint::new("Summary"))
}

/// The smallest useful specification
pub fn minimal_spec(title: &str) -> Specification {
    Specification::new(title, format!("Describe what {} should do.", title))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid() {
        for spec in [crud_spec(), cli_tool_spec(), minimal_spec("Widget")] {
            spec.validate().unwrap();
            let json = serde_json::to_string(&spec).unwrap();
            assert_eq!(Specification::from_json(&json).unwrap(), spec);
        }
    }

    #[test]
    fn test_crud_spec_entities() {
        let spec = crud_spec();
        let names: Vec<&str> = spec.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["User", "Bookmark"]);
    }
}
