//! Prompt builders for the two synthesis stages
//!
//! Prompts are stateless: each one carries the atom's signature, its limits,
//! the matched pattern (if any) and every earlier attempt's violations.

use mosaic_core::{AtomicTask, AttemptOutcome, AttemptRecord, SemanticSignature};
use mosaic_patterns::PatternMatch;

fn push_signature(prompt: &mut String, sig: &SemanticSignature) {
    prompt.push_str("## SIGNATURE\n\n");
    prompt.push_str(&format!("- **Purpose:** {}\n", sig.purpose));
    prompt.push_str(&format!("- **Intent:** {}\n", sig.intent));
    prompt.push_str(&format!("- **Domain:** {}\n", sig.domain));

    if sig.inputs.is_empty() {
        prompt.push_str("- **Inputs:** none\n");
    } else {
        prompt.push_str("- **Inputs:**\n");
        for (name, ty) in &sig.inputs {
            prompt.push_str(&format!("  - `{}: {}`\n", name, ty));
        }
    }
    if sig.outputs.is_empty() {
        prompt.push_str("- **Output:** none\n");
    } else {
        prompt.push_str("- **Outputs:**\n");
        for (name, ty) in &sig.outputs {
            prompt.push_str(&format!("  - `{}`: `{}`\n", name, ty));
        }
    }

    prompt.push_str(&format!(
        "- **Security:** {} / **Performance:** {} / **Idempotent:** {}\n",
        sig.security_level, sig.performance_tier, sig.idempotent
    ));
    prompt.push('\n');

    if !sig.constraints.is_empty() {
        prompt.push_str("## CONSTRAINTS\n\n");
        for constraint in &sig.constraints {
            prompt.push_str(&format!("- {}\n", constraint));
        }
        prompt.push('\n');
    }
}

fn push_pattern(prompt: &mut String, pattern: &PatternMatch) {
    prompt.push_str(&format!(
        "## REFERENCE PATTERN (similarity {:.0}%)\n\n",
        pattern.score * 100.0
    ));
    prompt.push_str(&format!(
        "A validated solution for a similar atom (purpose: {}).\n\n",
        pattern.pattern.signature.purpose
    ));
    prompt.push_str("```rust\n");
    prompt.push_str(pattern.pattern.code.trim_end());
    prompt.push_str("\n```\n\n");
}

fn push_history(prompt: &mut String, history: &[AttemptRecord]) {
    let failed: Vec<&AttemptRecord> = history
        .iter()
        .filter(|a| a.outcome != AttemptOutcome::Accepted)
        .collect();
    if failed.is_empty() {
        return;
    }

    prompt.push_str("## PREVIOUS ATTEMPTS\n\n");
    prompt.push_str("These attempts were rejected. You MUST avoid every violation listed:\n\n");
    for attempt in failed {
        prompt.push_str(&format!(
            "### Attempt {} ({:?})\n",
            attempt.number, attempt.outcome
        ));
        if attempt.violations.is_empty() {
            prompt.push_str("- no details recorded\n");
        }
        for violation in &attempt.violations {
            prompt.push_str(&format!("- {}\n", violation));
        }
        prompt.push('\n');
    }
}

fn push_rules(prompt: &mut String, task: &AtomicTask) {
    prompt.push_str("## RULES\n\n");
    prompt.push_str(&format!(
        "1. At most {} lines of code (blank lines and comments excluded)\n",
        task.max_lines
    ));
    prompt.push_str("2. Exactly one function with a single responsibility\n");
    prompt.push_str("3. Use every declared input by name and return the declared output type\n");
    prompt.push_str("4. No placeholders: no todo!, unimplemented!, TODO, FIXME or elided code\n\n");
}

/// Stage one: ask for a short implementation strategy
pub fn build_strategy_prompt(
    task: &AtomicTask,
    pattern: Option<&PatternMatch>,
    history: &[AttemptRecord],
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("# ATOM {} - STRATEGY\n\n", task.id));
    prompt.push_str("## TASK\n\n");
    prompt.push_str(&task.description);
    prompt.push_str("\n\n");

    push_signature(&mut prompt, &task.signature);
    push_history(&mut prompt, history);
    push_rules(&mut prompt, task);

    prompt.push_str("## OBJECTIVE\n\n");
    match pattern {
        Some(pattern) => {
            push_pattern(&mut prompt, pattern);
            prompt.push_str(
                "Describe, in at most five numbered steps, how to adapt the reference pattern \
                 to this signature. Name every change to inputs, outputs and constraints.\n",
            );
        }
        None => {
            prompt.push_str(
                "Describe, in at most five numbered steps, how to implement this atom from first \
                 principles. Mention edge cases the constraints imply.\n",
            );
        }
    }

    prompt
}

/// Stage two: ask for the code implementing a strategy
pub fn build_implementation_prompt(
    task: &AtomicTask,
    strategy: &str,
    pattern: Option<&PatternMatch>,
    history: &[AttemptRecord],
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("# ATOM {} - IMPLEMENTATION\n\n", task.id));
    prompt.push_str("## TASK\n\n");
    prompt.push_str(&task.description);
    prompt.push_str("\n\n");

    push_signature(&mut prompt, &task.signature);
    if let Some(pattern) = pattern {
        push_pattern(&mut prompt, pattern);
    }

    prompt.push_str("## STRATEGY\n\n");
    prompt.push_str(strategy.trim());
    prompt.push_str("\n\n");

    push_history(&mut prompt, history);
    push_rules(&mut prompt, task);

    prompt.push_str("## OUTPUT\n\n");
    prompt.push_str("Respond with one ```rust fenced block containing only the function.\n");

    prompt
}

/// Code from the first fenced block, else the whole response
pub fn extract_code(response: &str) -> String {
    let Some(start) = response.find("```") else {
        return response.trim().to_string();
    };
    let after_fence = &response[start + 3..];
    // Skip the info string (`rust`, `rs`, ...)
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim().to_string(),
        None => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{SignatureExtractor, SignatureHints, Tier};
    use mosaic_patterns::Pattern;

    fn task() -> AtomicTask {
        let sig = SignatureExtractor::new()
            .extract_with(
                "Clamp a percentage, must stay within 0 to 100",
                SignatureHints::new().input("value", "f64").output("clamped", "f64"),
            )
            .unwrap();
        AtomicTask::new("atom-7", "Clamp a percentage", sig)
    }

    #[test]
    fn test_strategy_prompt_first_principles() {
        let prompt = build_strategy_prompt(&task(), None, &[]);
        assert!(prompt.contains("# ATOM atom-7 - STRATEGY"));
        assert!(prompt.contains("`value: f64`"));
        assert!(prompt.contains("## CONSTRAINTS"));
        assert!(prompt.contains("first principles"));
        assert!(!prompt.contains("PREVIOUS ATTEMPTS"));
    }

    #[test]
    fn test_strategy_prompt_with_pattern() {
        let t = task();
        let pattern = PatternMatch {
            pattern: Pattern::new(t.signature.clone(), "fn clamp(value: f64) -> f64 { value }", 1.0),
            score: 0.91,
        };
        let prompt = build_strategy_prompt(&t, Some(&pattern), &[]);
        assert!(prompt.contains("REFERENCE PATTERN (similarity 91%)"));
        assert!(prompt.contains("fn clamp(value: f64)"));
        assert!(prompt.contains("adapt the reference pattern"));
    }

    #[test]
    fn test_history_lists_all_prior_violations() {
        let history = vec![
            AttemptRecord::new(1, AttemptOutcome::Rejected)
                .with_tier(Tier::Light)
                .with_violations(vec!["contains placeholder `todo!`".to_string()]),
            AttemptRecord::new(2, AttemptOutcome::TimedOut),
        ];
        let prompt = build_implementation_prompt(&task(), "1. clamp", None, &history);
        assert!(prompt.contains("### Attempt 1 (Rejected)"));
        assert!(prompt.contains("- contains placeholder `todo!`"));
        assert!(prompt.contains("### Attempt 2 (TimedOut)"));
        assert!(prompt.contains("## STRATEGY\n\n1. clamp"));
    }

    #[test]
    fn test_extract_code_from_fence() {
        let response = "Here you go:\n```rust\nfn a() -> u8 { 1 }\n```\nDone.";
        assert_eq!(extract_code(response), "fn a() -> u8 { 1 }");
    }

    #[test]
    fn test_extract_code_without_fence() {
        assert_eq!(extract_code("  fn a() {}\n"), "fn a() {}");
    }

    #[test]
    fn test_extract_code_unterminated_fence() {
        assert_eq!(extract_code("```\nfn a() {}"), "fn a() {}");
    }
}
