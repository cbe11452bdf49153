//! Atomic breakdown over an arena of drafts
//!
//! Drafts live in a flat `Vec` and refer to each other by index. A work
//! queue pops drafts in insertion order; the planner asks the model to split
//! any draft that is too large or joins several responsibilities, and the
//! children are pushed back onto the queue one level deeper. Splitting stops
//! at `max_split_depth`.
//!
//! When a draft is split its children inherit the draft's dependencies, and
//! anything that depended on the draft depends on the children's sinks
//! instead (children no sibling depends on).

use mosaic_core::config::AtomConfig;
use mosaic_core::{
    is_valid_id, AtomicTask, MosaicError, PerformanceTier, Result, SecurityLevel, SignatureExtractor,
    SignatureHints,
};
use mosaic_inference::constraints::conjunctions;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::{debug, warn};

use crate::passes::AtomicBreakdown;

/// One atom as proposed by the planning model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomDraft {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub estimated_lines: usize,
    #[serde(default)]
    pub security: Option<SecurityLevel>,
    #[serde(default)]
    pub performance: Option<PerformanceTier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomDrafts {
    pub atoms: Vec<AtomDraft>,
}

#[derive(Debug)]
struct DraftNode {
    draft: AtomDraft,
    module: String,
    depth: usize,
    parent: Option<usize>,
    children: Vec<usize>,
}

pub struct Decomposer {
    arena: Vec<DraftNode>,
    by_id: HashMap<String, usize>,
    queue: VecDeque<usize>,
    config: AtomConfig,
    warnings: Vec<String>,
    splits: usize,
}

impl Decomposer {
    pub fn new(config: &AtomConfig) -> Self {
        Self {
            arena: Vec::new(),
            by_id: HashMap::new(),
            queue: VecDeque::new(),
            config: config.clone(),
            warnings: Vec::new(),
            splits: 0,
        }
    }

    fn insert(&mut self, draft: AtomDraft, module: &str, depth: usize, parent: Option<usize>) -> Result<usize> {
        if draft.id.trim().is_empty() {
            return Err(MosaicError::planning(AtomicBreakdown::PASS, "atom draft without an id"));
        }
        if !is_valid_id(&draft.id) {
            return Err(MosaicError::planning(
                AtomicBreakdown::PASS,
                format!("atom id {:?} must match [A-Za-z0-9_.-]+ without '..'", draft.id),
            ));
        }
        if self.by_id.contains_key(&draft.id) {
            return Err(MosaicError::planning(
                AtomicBreakdown::PASS,
                format!("duplicate atom id {}", draft.id),
            ));
        }
        let idx = self.arena.len();
        self.by_id.insert(draft.id.clone(), idx);
        self.arena.push(DraftNode {
            draft,
            module: module.to_string(),
            depth,
            parent,
            children: Vec::new(),
        });
        self.queue.push_back(idx);
        Ok(idx)
    }

    /// Queue a module's top-level drafts
    pub fn add_module(&mut self, module: &str, drafts: Vec<AtomDraft>) -> Result<()> {
        if drafts.is_empty() {
            return Err(MosaicError::planning(
                AtomicBreakdown::PASS,
                format!("module {} produced no atoms", module),
            ));
        }
        for draft in drafts {
            self.insert(draft, module, 0, None)?;
        }
        Ok(())
    }

    /// Ids and descriptions of a module's top-level drafts
    pub fn module_atoms(&self, module: &str) -> Vec<(&str, &str)> {
        self.arena
            .iter()
            .filter(|n| n.parent.is_none() && n.module == module)
            .map(|n| (n.draft.id.as_str(), n.draft.description.as_str()))
            .collect()
    }

    /// Next draft that needs a split, with the reason
    ///
    /// Drafts that fit are accepted as they are popped; drafts past the depth
    /// limit are accepted with a warning.
    pub fn next_split(&mut self) -> Option<(usize, String)> {
        while let Some(idx) = self.queue.pop_front() {
            let Some(reason) = self.split_reason(idx) else {
                continue;
            };
            let node = &self.arena[idx];
            if node.depth >= self.config.max_split_depth {
                let warning = format!(
                    "{}: kept unsplit at depth {} ({})",
                    node.draft.id, node.depth, reason
                );
                warn!("{}", warning);
                self.warnings.push(warning);
                continue;
            }
            return Some((idx, reason));
        }
        None
    }

    fn split_reason(&self, idx: usize) -> Option<String> {
        let draft = &self.arena[idx].draft;
        if draft.estimated_lines > self.config.max_lines {
            return Some(format!(
                "estimated {} lines exceeds {}",
                draft.estimated_lines, self.config.max_lines
            ));
        }
        let words = conjunctions(&draft.description);
        if !words.is_empty() {
            return Some(format!("description joins responsibilities with '{}'", words.join("', '")));
        }
        None
    }

    pub fn draft(&self, idx: usize) -> &AtomDraft {
        &self.arena[idx].draft
    }

    /// Replace a draft with its children
    ///
    /// Children get ids `<parent>.<n>`; their references to sibling ids are
    /// rewritten to match.
    pub fn split(&mut self, idx: usize, children: Vec<AtomDraft>) -> Result<()> {
        let parent_id = self.arena[idx].draft.id.clone();
        if children.is_empty() {
            let warning = format!("{}: split returned no children, kept as is", parent_id);
            warn!("{}", warning);
            self.warnings.push(warning);
            return Ok(());
        }

        let renamed: HashMap<String, String> = children
            .iter()
            .enumerate()
            .map(|(n, child)| (child.id.clone(), format!("{}.{}", parent_id, n + 1)))
            .collect();

        let module = self.arena[idx].module.clone();
        let depth = self.arena[idx].depth + 1;
        let mut ids = Vec::with_capacity(children.len());
        for (n, mut child) in children.into_iter().enumerate() {
            child.id = format!("{}.{}", parent_id, n + 1);
            child.depends_on = child
                .depends_on
                .iter()
                .map(|d| renamed.get(d).cloned().unwrap_or_else(|| d.clone()))
                .filter(|d| *d != child.id)
                .collect();
            ids.push(self.insert(child, &module, depth, Some(idx))?);
        }

        debug!(atom = %parent_id, children = ids.len(), depth, "Split atom draft");
        self.arena[idx].children = ids;
        self.splits += 1;
        Ok(())
    }

    /// Children of a split draft that no sibling depends on
    fn sinks(&self, idx: usize) -> Vec<usize> {
        let children = &self.arena[idx].children;
        let referenced: BTreeSet<&str> = children
            .iter()
            .flat_map(|&c| self.arena[c].draft.depends_on.iter().map(String::as_str))
            .collect();
        children
            .iter()
            .copied()
            .filter(|&c| !referenced.contains(self.arena[c].draft.id.as_str()))
            .collect()
    }

    /// Leaf ids standing in for `id`
    fn resolve(&self, id: &str, out: &mut BTreeSet<String>) {
        match self.by_id.get(id) {
            Some(&idx) if !self.arena[idx].children.is_empty() => {
                for sink in self.sinks(idx) {
                    self.resolve(&self.arena[sink].draft.id, out);
                }
            }
            _ => {
                out.insert(id.to_string());
            }
        }
    }

    /// Turn the leaf drafts into atoms
    pub fn finish(self, extractor: &SignatureExtractor) -> Result<AtomicBreakdown> {
        let mut atoms = Vec::new();

        for node in self.arena.iter().filter(|n| n.children.is_empty()) {
            let mut dependencies = BTreeSet::new();
            let mut cursor = Some(node);
            while let Some(current) = cursor {
                for dep in &current.draft.depends_on {
                    self.resolve(dep, &mut dependencies);
                }
                cursor = current.parent.map(|p| &self.arena[p]);
            }
            dependencies.remove(&node.draft.id);

            let draft = &node.draft;
            let mut hints = SignatureHints::new();
            for (name, ty) in &draft.inputs {
                hints = hints.input(name, ty);
            }
            for (name, ty) in &draft.outputs {
                hints = hints.output(name, ty);
            }
            for constraint in &draft.constraints {
                hints = hints.constraint(constraint);
            }
            if let Some(level) = draft.security {
                hints = hints.security(level);
            }
            if let Some(tier) = draft.performance {
                hints = hints.performance(tier);
            }

            let signature = extractor.extract_with(&draft.description, hints).map_err(|e| {
                MosaicError::planning(AtomicBreakdown::PASS, format!("{}: {}", draft.id, e))
            })?;

            atoms.push(
                AtomicTask::new(draft.id.clone(), draft.description.clone(), signature)
                    .with_dependencies(dependencies)
                    .with_max_lines(self.config.max_lines)
                    .with_module(node.module.clone()),
            );
        }

        let mut warnings = self.warnings;
        if atoms.len() < self.config.target_min || atoms.len() > self.config.target_max {
            let warning = format!(
                "{} atoms is outside the target range {}-{}",
                atoms.len(),
                self.config.target_min,
                self.config.target_max
            );
            warn!("{}", warning);
            warnings.push(warning);
        }

        Ok(AtomicBreakdown {
            atoms,
            splits: self.splits,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(id: &str, description: &str, lines: usize, deps: &[&str]) -> AtomDraft {
        AtomDraft {
            id: id.to_string(),
            description: description.to_string(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            constraints: Vec::new(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            estimated_lines: lines,
            security: None,
            performance: None,
        }
    }

    fn atom<'a>(breakdown: &'a AtomicBreakdown, id: &str) -> &'a AtomicTask {
        breakdown.atoms.iter().find(|a| a.id == id).unwrap()
    }

    fn deps(task: &AtomicTask) -> Vec<&str> {
        task.dependencies.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_small_drafts_pass_through() {
        let mut d = Decomposer::new(&AtomConfig::default());
        d.add_module(
            "users",
            vec![
                draft("hash", "Hash a password", 4, &[]),
                draft("verify", "Verify a password hash", 5, &["hash"]),
            ],
        )
        .unwrap();
        assert_eq!(d.module_atoms("users")[1], ("verify", "Verify a password hash"));
        assert!(d.module_atoms("billing").is_empty());
        assert!(d.next_split().is_none());

        let breakdown = d.finish(&SignatureExtractor::new()).unwrap();
        assert_eq!(breakdown.atoms.len(), 2);
        assert_eq!(breakdown.splits, 0);
        assert_eq!(deps(atom(&breakdown, "verify")), vec!["hash"]);
        assert_eq!(atom(&breakdown, "hash").module.as_deref(), Some("users"));
        assert_eq!(atom(&breakdown, "hash").max_lines, 10);
        // Two atoms is far below the target range
        assert!(breakdown.warnings.iter().any(|w| w.contains("outside the target range")));
    }

    #[test]
    fn test_split_inherits_and_rewires() {
        let mut d = Decomposer::new(&AtomConfig::default());
        d.add_module(
            "users",
            vec![
                draft("load", "Load a user row", 3, &[]),
                draft("register", "Register a user", 40, &["load"]),
                draft("notify", "Send a welcome email", 6, &["register"]),
            ],
        )
        .unwrap();

        let (idx, reason) = d.next_split().unwrap();
        assert_eq!(d.draft(idx).id, "register");
        assert!(reason.contains("estimated 40 lines"));

        d.split(
            idx,
            vec![
                draft("a", "Validate a registration form", 6, &[]),
                draft("b", "Insert a user row", 6, &["a"]),
                draft("c", "Record a registration audit entry", 5, &["a"]),
            ],
        )
        .unwrap();
        assert!(d.next_split().is_none());

        let breakdown = d.finish(&SignatureExtractor::new()).unwrap();
        let ids: Vec<&str> = breakdown.atoms.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["load", "notify", "register.1", "register.2", "register.3"]);

        assert_eq!(deps(atom(&breakdown, "register.1")), vec!["load"]);
        assert_eq!(deps(atom(&breakdown, "register.2")), vec!["load", "register.1"]);
        // The sinks are .2 and .3
        assert_eq!(deps(atom(&breakdown, "notify")), vec!["register.2", "register.3"]);
        assert_eq!(breakdown.splits, 1);
    }

    #[test]
    fn test_conjunction_triggers_split() {
        let mut d = Decomposer::new(&AtomConfig::default());
        d.add_module("io", vec![draft("rw", "Read and write a config file", 6, &[])])
            .unwrap();
        let (_, reason) = d.next_split().unwrap();
        assert!(reason.contains("'and'"));
    }

    #[test]
    fn test_split_depth_is_bounded() {
        let config = AtomConfig {
            max_split_depth: 1,
            ..AtomConfig::default()
        };
        let mut d = Decomposer::new(&config);
        d.add_module("m", vec![draft("big", "Render a report", 50, &[])])
            .unwrap();

        let (idx, _) = d.next_split().unwrap();
        d.split(idx, vec![draft("x", "Render a report body", 30, &[])])
            .unwrap();
        // The child is still too large but sits at the depth limit
        assert!(d.next_split().is_none());

        let breakdown = d.finish(&SignatureExtractor::new()).unwrap();
        assert_eq!(breakdown.atoms.len(), 1);
        assert_eq!(breakdown.atoms[0].id, "big.1");
        assert!(breakdown.warnings.iter().any(|w| w.contains("kept unsplit at depth 1")));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut d = Decomposer::new(&AtomConfig::default());
        d.add_module("a", vec![draft("x", "Parse a header", 3, &[])]).unwrap();
        let err = d
            .add_module("b", vec![draft("x", "Parse a footer", 3, &[])])
            .unwrap_err();
        assert!(matches!(err, MosaicError::Planning { pass: 5, .. }));
    }

    #[test]
    fn test_path_like_ids_rejected() {
        for id in ["../../../escaped", "nested/atom", "a..b"] {
            let mut d = Decomposer::new(&AtomConfig::default());
            let err = d
                .add_module("m", vec![draft(id, "Parse a header", 3, &[])])
                .unwrap_err();
            assert!(matches!(err, MosaicError::Planning { pass: 5, .. }), "{}", id);
        }
    }

    #[test]
    fn test_empty_module_rejected() {
        let mut d = Decomposer::new(&AtomConfig::default());
        assert!(d.add_module("a", Vec::new()).is_err());
    }
}
