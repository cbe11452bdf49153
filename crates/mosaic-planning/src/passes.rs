//! Typed records for the six planning passes
//!
//! Passes 1-4 are deserialized from model output and checked with
//! `validate`; pass 5 is assembled by the decomposer and pass 6 by
//! [`ValidatedPlan::from_breakdown`].

use mosaic_core::{AtomicTask, MosaicError, Result};
use mosaic_graph::{DependencyGraph, SnapshotNode};
use mosaic_inference::constraints::conjunctions;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::warn;

// ---------------------------------------------------------------------------
// Pass 1

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementsAnalysis {
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub non_functional: Vec<String>,
}

impl RequirementsAnalysis {
    pub const PASS: u8 = 1;

    pub fn validate(&self) -> Result<()> {
        if self.entities.is_empty() {
            return Err(MosaicError::planning(Self::PASS, "no entities identified"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pass 2

/// Structural role of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StructuralPattern {
    Repository,
    Service,
    Controller,
    Validator,
    Transformer,
    Adapter,
    Utility,
}

impl std::fmt::Display for StructuralPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repository => write!(f, "repository"),
            Self::Service => write!(f, "service"),
            Self::Controller => write!(f, "controller"),
            Self::Validator => write!(f, "validator"),
            Self::Transformer => write!(f, "transformer"),
            Self::Adapter => write!(f, "adapter"),
            Self::Utility => write!(f, "utility"),
        }
    }
}

impl std::str::FromStr for StructuralPattern {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "repository" => Ok(Self::Repository),
            "service" => Ok(Self::Service),
            "controller" => Ok(Self::Controller),
            "validator" => Ok(Self::Validator),
            "transformer" => Ok(Self::Transformer),
            "adapter" => Ok(Self::Adapter),
            "utility" => Ok(Self::Utility),
            _ => Err(format!("unknown structural pattern: {}", s)),
        }
    }
}

impl TryFrom<String> for StructuralPattern {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StructuralPattern> for String {
    fn from(pattern: StructuralPattern) -> Self {
        pattern.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDesign {
    pub name: String,
    pub responsibility: String,
    pub pattern: StructuralPattern,
    #[serde(default)]
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureDesign {
    pub modules: Vec<ModuleDesign>,
}

impl ArchitectureDesign {
    pub const PASS: u8 = 2;

    pub fn validate(&self) -> Result<()> {
        if self.modules.is_empty() {
            return Err(MosaicError::planning(Self::PASS, "no modules designed"));
        }
        let mut seen = HashSet::new();
        for module in &self.modules {
            if !seen.insert(module.name.as_str()) {
                return Err(MosaicError::planning(
                    Self::PASS,
                    format!("duplicate module name {}", module.name),
                ));
            }
        }
        Ok(())
    }

    pub fn module(&self, name: &str) -> Option<&ModuleDesign> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Pass 3

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub module: String,
    pub operation: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub validation_rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDefinition {
    pub contracts: Vec<Contract>,
}

impl ContractDefinition {
    pub const PASS: u8 = 3;

    pub fn validate(&self, architecture: &ArchitectureDesign) -> Result<()> {
        for contract in &self.contracts {
            if architecture.module(&contract.module).is_none() {
                return Err(MosaicError::planning(
                    Self::PASS,
                    format!(
                        "contract {} references unknown module {}",
                        contract.operation, contract.module
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn for_module<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a Contract> + 'a {
        self.contracts.iter().filter(move |c| c.module == module)
    }
}

// ---------------------------------------------------------------------------
// Pass 4

/// `from` depends on `to`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDependency {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationPoints {
    #[serde(default)]
    pub dependencies: Vec<ModuleDependency>,
}

/// Module-level depends-on matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyMatrix {
    pub modules: Vec<String>,
    /// `cells[i][j]` is true when module i depends on module j
    pub cells: Vec<Vec<bool>>,
    /// Modules ordered so dependencies come first
    pub order: Vec<String>,
}

impl DependencyMatrix {
    fn position(&self, module: &str) -> Option<usize> {
        self.modules.iter().position(|m| m == module)
    }

    pub fn depends_on(&self, from: &str, to: &str) -> bool {
        match (self.position(from), self.position(to)) {
            (Some(i), Some(j)) => self.cells[i][j],
            _ => false,
        }
    }

    pub fn dependencies_of(&self, module: &str) -> Vec<&str> {
        let Some(i) = self.position(module) else {
            return Vec::new();
        };
        self.cells[i]
            .iter()
            .enumerate()
            .filter(|(_, &set)| set)
            .map(|(j, _)| self.modules[j].as_str())
            .collect()
    }
}

impl IntegrationPoints {
    pub const PASS: u8 = 4;

    /// Check against the architecture and build the matrix
    pub fn matrix(&self, architecture: &ArchitectureDesign) -> Result<DependencyMatrix> {
        let modules: Vec<String> = architecture.modules.iter().map(|m| m.name.clone()).collect();
        let mut deps: BTreeMap<&str, BTreeSet<String>> =
            modules.iter().map(|m| (m.as_str(), BTreeSet::new())).collect();

        for dep in &self.dependencies {
            for name in [&dep.from, &dep.to] {
                if !deps.contains_key(name.as_str()) {
                    return Err(MosaicError::planning(
                        Self::PASS,
                        format!("integration references unknown module {}", name),
                    ));
                }
            }
            if let Some(set) = deps.get_mut(dep.from.as_str()) {
                set.insert(dep.to.clone());
            }
        }

        let nodes: Vec<SnapshotNode> = deps
            .iter()
            .map(|(name, dependencies)| SnapshotNode {
                id: name.to_string(),
                dependencies: dependencies.clone(),
            })
            .collect();
        let graph = DependencyGraph::build(&nodes)
            .map_err(|e| MosaicError::planning(Self::PASS, e.to_string()))?;
        if let Some(cycle) = graph.detect_cycles().first() {
            return Err(MosaicError::planning(
                Self::PASS,
                format!("module dependency cycle: {}", cycle.join(" -> ")),
            ));
        }
        let order = graph
            .compute_levels()
            .map_err(|e| MosaicError::planning(Self::PASS, e.to_string()))?
            .into_iter()
            .flatten()
            .collect();

        let cells = modules
            .iter()
            .map(|from| {
                modules
                    .iter()
                    .map(|to| deps.get(from.as_str()).is_some_and(|d| d.contains(to)))
                    .collect()
            })
            .collect();

        Ok(DependencyMatrix {
            modules,
            cells,
            order,
        })
    }
}

// ---------------------------------------------------------------------------
// Pass 5

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicBreakdown {
    pub atoms: Vec<AtomicTask>,
    /// Drafts that were split into children
    pub splits: usize,
    pub warnings: Vec<String>,
}

impl AtomicBreakdown {
    pub const PASS: u8 = 5;
}

// ---------------------------------------------------------------------------
// Pass 6

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedPlan {
    pub atoms: Vec<AtomicTask>,
    /// Parallelizable groups in execution order
    pub levels: Vec<Vec<String>>,
    pub warnings: Vec<String>,
}

impl ValidatedPlan {
    pub const PASS: u8 = 6;

    /// Check ids and dependencies, reject cycles and compute levels
    pub fn from_breakdown(breakdown: AtomicBreakdown) -> Result<Self> {
        let mut seen = HashSet::new();
        for atom in &breakdown.atoms {
            if !seen.insert(atom.id.as_str()) {
                return Err(MosaicError::planning(
                    Self::PASS,
                    format!("duplicate atom id {}", atom.id),
                ));
            }
        }

        let graph = DependencyGraph::build(&breakdown.atoms)
            .map_err(|e| MosaicError::planning(Self::PASS, e.to_string()))?;
        let cycles = graph.detect_cycles();
        if !cycles.is_empty() {
            let named: Vec<String> = cycles.iter().map(|c| c.join(" -> ")).collect();
            return Err(MosaicError::planning(
                Self::PASS,
                format!("atom dependency cycle: {}", named.join("; ")),
            ));
        }
        let levels = graph
            .compute_levels()
            .map_err(|e| MosaicError::planning(Self::PASS, e.to_string()))?;

        let mut warnings = breakdown.warnings;
        for atom in &breakdown.atoms {
            let words = conjunctions(&atom.description);
            if !words.is_empty() {
                let warning = format!(
                    "{}: description joins responsibilities with '{}'",
                    atom.id,
                    words.join("', '")
                );
                warn!("{}", warning);
                warnings.push(warning);
            }
        }

        Ok(Self {
            atoms: breakdown.atoms,
            levels,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::SignatureExtractor;

    fn architecture(names: &[&str]) -> ArchitectureDesign {
        ArchitectureDesign {
            modules: names
                .iter()
                .map(|n| ModuleDesign {
                    name: n.to_string(),
                    responsibility: format!("{} things", n),
                    pattern: StructuralPattern::Service,
                    entities: Vec::new(),
                })
                .collect(),
        }
    }

    fn dep(from: &str, to: &str) -> ModuleDependency {
        ModuleDependency {
            from: from.to_string(),
            to: to.to_string(),
            reason: String::new(),
        }
    }

    fn atom(id: &str, description: &str, deps: &[&str]) -> AtomicTask {
        let sig = SignatureExtractor::new().extract(description, None).unwrap();
        AtomicTask::new(id, description, sig).with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_structural_pattern_is_case_insensitive() {
        let design: ModuleDesign = serde_json::from_str(
            r#"{"name": "users", "responsibility": "store users", "pattern": "Repository"}"#,
        )
        .unwrap();
        assert_eq!(design.pattern, StructuralPattern::Repository);
        assert!(serde_json::from_str::<ModuleDesign>(
            r#"{"name": "x", "responsibility": "y", "pattern": "singleton"}"#
        )
        .is_err());
    }

    #[test]
    fn test_requirements_need_an_entity() {
        let empty = RequirementsAnalysis {
            entities: Vec::new(),
            relationships: Vec::new(),
            non_functional: Vec::new(),
        };
        assert!(matches!(empty.validate(), Err(MosaicError::Planning { pass: 1, .. })));
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let err = architecture(&["users", "users"]).validate().unwrap_err();
        assert!(err.to_string().contains("duplicate module name users"));
    }

    #[test]
    fn test_contract_unknown_module() {
        let contracts = ContractDefinition {
            contracts: vec![Contract {
                module: "billing".to_string(),
                operation: "charge".to_string(),
                description: String::new(),
                inputs: BTreeMap::new(),
                outputs: BTreeMap::new(),
                validation_rules: Vec::new(),
            }],
        };
        let err = contracts.validate(&architecture(&["users"])).unwrap_err();
        assert!(matches!(err, MosaicError::Planning { pass: 3, .. }));
    }

    #[test]
    fn test_matrix_orders_dependencies_first() {
        let integration = IntegrationPoints {
            dependencies: vec![dep("api", "service"), dep("service", "store")],
        };
        let matrix = integration
            .matrix(&architecture(&["api", "service", "store"]))
            .unwrap();
        assert!(matrix.depends_on("api", "service"));
        assert!(!matrix.depends_on("service", "api"));
        assert_eq!(matrix.dependencies_of("service"), vec!["store"]);
        assert_eq!(matrix.order, vec!["store", "service", "api"]);
    }

    #[test]
    fn test_matrix_rejects_module_cycle() {
        let integration = IntegrationPoints {
            dependencies: vec![dep("a", "b"), dep("b", "a")],
        };
        let err = integration.matrix(&architecture(&["a", "b"])).unwrap_err();
        assert!(matches!(err, MosaicError::Planning { pass: 4, .. }));
        assert!(err.to_string().contains("a -> b"));
    }

    #[test]
    fn test_matrix_rejects_unknown_module() {
        let integration = IntegrationPoints {
            dependencies: vec![dep("a", "ghost")],
        };
        let err = integration.matrix(&architecture(&["a"])).unwrap_err();
        assert!(err.to_string().contains("unknown module ghost"));
    }

    #[test]
    fn test_validated_plan_levels_and_warnings() {
        let breakdown = AtomicBreakdown {
            atoms: vec![
                atom("a1", "Hash a password", &[]),
                atom("a2", "Store and index a user record", &["a1"]),
            ],
            splits: 0,
            warnings: Vec::new(),
        };
        let plan = ValidatedPlan::from_breakdown(breakdown).unwrap();
        assert_eq!(plan.levels, vec![vec!["a1".to_string()], vec!["a2".to_string()]]);
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].starts_with("a2:"));
    }

    #[test]
    fn test_validated_plan_rejects_injected_cycle() {
        let breakdown = AtomicBreakdown {
            atoms: vec![
                atom("a1", "Hash a password", &["a2"]),
                atom("a2", "Verify a password", &["a1"]),
            ],
            splits: 0,
            warnings: Vec::new(),
        };
        let err = ValidatedPlan::from_breakdown(breakdown).unwrap_err();
        assert!(matches!(err, MosaicError::Planning { pass: 6, .. }));
        assert!(err.to_string().contains("a1 -> a2"));
    }

    #[test]
    fn test_validated_plan_rejects_unknown_dependency() {
        let breakdown = AtomicBreakdown {
            atoms: vec![atom("a1", "Hash a password", &["missing"])],
            splits: 0,
            warnings: Vec::new(),
        };
        let err = ValidatedPlan::from_breakdown(breakdown).unwrap_err();
        assert!(err.to_string().contains("unknown node missing"));
    }
}
