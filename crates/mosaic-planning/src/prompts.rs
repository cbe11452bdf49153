//! Prompt builders for the planning passes
//!
//! Each prompt restates everything the pass needs: the specification and the
//! JSON of every earlier record the pass consumes.

use serde::Serialize;

use crate::decompose::AtomDraft;
use crate::passes::{
    ArchitectureDesign, ContractDefinition, DependencyMatrix, ModuleDesign, RequirementsAnalysis,
};
use crate::spec::Specification;

fn push_spec(prompt: &mut String, spec: &Specification) {
    prompt.push_str(&format!("## SPECIFICATION: {}\n\n", spec.title));
    prompt.push_str(spec.text.trim());
    prompt.push_str("\n\n");
    if !spec.entities.is_empty() {
        prompt.push_str("### Known entities\n\n");
        for entity in &spec.entities {
            if entity.attributes.is_empty() {
                prompt.push_str(&format!("- {}\n", entity.name));
            } else {
                prompt.push_str(&format!("- {} ({})\n", entity.name, entity.attributes.join(", ")));
            }
        }
        prompt.push('\n');
    }
}

fn push_record<T: Serialize>(prompt: &mut String, heading: &str, record: &T) {
    prompt.push_str(&format!("## {}\n\n```json\n", heading));
    prompt.push_str(&serde_json::to_string_pretty(record).unwrap_or_else(|_| "{}".to_string()));
    prompt.push_str("\n```\n\n");
}

fn push_output(prompt: &mut String, schema: &str) {
    prompt.push_str("## OUTPUT\n\n");
    prompt.push_str("Respond with a single JSON object and nothing else, shaped like:\n\n```json\n");
    prompt.push_str(schema.trim());
    prompt.push_str("\n```\n");
}

const ATOM_SCHEMA: &str = r#"
{"atoms": [{
  "id": "kebab-case-id",
  "description": "one verb phrase, one responsibility",
  "inputs": {"name": "RustType"},
  "outputs": {"name": "RustType"},
  "constraints": ["must ..."],
  "depends_on": ["other-atom-id"],
  "estimated_lines": 6,
  "security": "low|medium|high|critical",
  "performance": "relaxed|standard|critical"
}]}
"#;

pub fn requirements_prompt(spec: &Specification) -> String {
    let mut prompt = String::new();
    prompt.push_str("# PASS 1 - REQUIREMENTS ANALYSIS\n\n");
    push_spec(&mut prompt, spec);
    prompt.push_str("## OBJECTIVE\n\n");
    prompt.push_str("Identify every entity with its attributes, the relationships between entities, ");
    prompt.push_str("and the non-functional requirements.\n\n");
    push_output(
        &mut prompt,
        r#"{"entities": [{"name": "User", "attributes": ["email"]}],
 "relationships": [{"from": "Order", "to": "User", "kind": "belongs_to"}],
 "non_functional": ["..."]}"#,
    );
    prompt
}

pub fn architecture_prompt(spec: &Specification, requirements: &RequirementsAnalysis) -> String {
    let mut prompt = String::new();
    prompt.push_str("# PASS 2 - ARCHITECTURE DESIGN\n\n");
    push_spec(&mut prompt, spec);
    push_record(&mut prompt, "REQUIREMENTS", requirements);
    prompt.push_str("## OBJECTIVE\n\n");
    prompt.push_str("Group the system into modules with unique names. Give each a single ");
    prompt.push_str("responsibility and one structural pattern: repository, service, controller, ");
    prompt.push_str("validator, transformer, adapter or utility.\n\n");
    push_output(
        &mut prompt,
        r#"{"modules": [{"name": "users", "responsibility": "...", "pattern": "repository", "entities": ["User"]}]}"#,
    );
    prompt
}

pub fn contracts_prompt(spec: &Specification, architecture: &ArchitectureDesign) -> String {
    let mut prompt = String::new();
    prompt.push_str("# PASS 3 - CONTRACT DEFINITION\n\n");
    push_spec(&mut prompt, spec);
    push_record(&mut prompt, "ARCHITECTURE", architecture);
    prompt.push_str("## OBJECTIVE\n\n");
    prompt.push_str("List the public operations of every module with typed inputs and outputs ");
    prompt.push_str("(Rust types) and the validation rules each operation enforces. ");
    prompt.push_str("Every contract must name a module from the architecture.\n\n");
    push_output(
        &mut prompt,
        r#"{"contracts": [{"module": "users", "operation": "create_user", "description": "...",
  "inputs": {"email": "String"}, "outputs": {"user": "User"}, "validation_rules": ["..."]}]}"#,
    );
    prompt
}

pub fn integration_prompt(architecture: &ArchitectureDesign, contracts: &ContractDefinition) -> String {
    let mut prompt = String::new();
    prompt.push_str("# PASS 4 - INTEGRATION POINTS\n\n");
    push_record(&mut prompt, "ARCHITECTURE", architecture);
    push_record(&mut prompt, "CONTRACTS", contracts);
    prompt.push_str("## OBJECTIVE\n\n");
    prompt.push_str("List which modules depend on which. `from` depends on `to`. ");
    prompt.push_str("Module dependencies must not form a cycle.\n\n");
    push_output(
        &mut prompt,
        r#"{"dependencies": [{"from": "api", "to": "users", "reason": "..."}]}"#,
    );
    prompt
}

/// Pass 5 prompt for one module
pub fn breakdown_prompt(
    module: &ModuleDesign,
    contracts: &ContractDefinition,
    matrix: &DependencyMatrix,
    upstream: &[(&str, &str)],
    max_lines: usize,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("# PASS 5 - ATOMIC BREAKDOWN: {}\n\n", module.name));
    prompt.push_str("## MODULE\n\n");
    prompt.push_str(&format!("- **Name:** {}\n", module.name));
    prompt.push_str(&format!("- **Responsibility:** {}\n", module.responsibility));
    prompt.push_str(&format!("- **Pattern:** {}\n", module.pattern));
    let depends = matrix.dependencies_of(&module.name);
    if !depends.is_empty() {
        prompt.push_str(&format!("- **Depends on modules:** {}\n", depends.join(", ")));
    }
    prompt.push('\n');

    let own: Vec<_> = contracts.for_module(&module.name).collect();
    if !own.is_empty() {
        push_record(&mut prompt, "CONTRACTS", &own);
    }

    if !upstream.is_empty() {
        prompt.push_str("## UPSTREAM ATOMS\n\n");
        prompt.push_str("Atoms in modules this one depends on. Reference them by id in `depends_on`:\n\n");
        for (id, description) in upstream {
            prompt.push_str(&format!("- `{}`: {}\n", id, description));
        }
        prompt.push('\n');
    }

    prompt.push_str("## OBJECTIVE\n\n");
    prompt.push_str(&format!(
        "Break the module into atoms: one function each, at most {} lines, one responsibility \
         (no \"and\"/\"then\"/\"also\" in descriptions). Ids must be unique across the plan; \
         prefix them with the module name.\n\n",
        max_lines
    ));
    push_output(&mut prompt, ATOM_SCHEMA);
    prompt
}

/// Pass 5 prompt asking for one draft to be split
pub fn split_prompt(draft: &AtomDraft, reason: &str, max_lines: usize) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("# PASS 5 - SPLIT ATOM {}\n\n", draft.id));
    push_record(&mut prompt, "ATOM", draft);
    prompt.push_str("## PROBLEM\n\n");
    prompt.push_str(reason);
    prompt.push_str("\n\n## OBJECTIVE\n\n");
    prompt.push_str(&format!(
        "Split the atom into smaller atoms that together do the same work, each at most {} \
         lines with one responsibility. `depends_on` may name sibling ids only; the split atom's \
         own dependencies are inherited automatically.\n\n",
        max_lines
    ));
    push_output(&mut prompt, ATOM_SCHEMA);
    prompt
}

/// Re-ask after a malformed response
pub fn retry_prompt(original: &str, error: &str) -> String {
    let mut prompt = String::from(original);
    prompt.push_str("\n## PREVIOUS RESPONSE REJECTED\n\n");
    prompt.push_str("Your previous response could not be parsed:\n\n");
    prompt.push_str(&format!("    {}\n\n", error));
    prompt.push_str("Respond again with valid JSON only.\n");
    prompt
}
