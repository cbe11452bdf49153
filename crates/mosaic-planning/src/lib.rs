//! Mosaic Planning - specification to atomic tasks
//!
//! Six sequential passes, each a typed record produced by the planning
//! model and checked before the next pass consumes it:
//!
//! 1. requirements analysis
//! 2. architecture design
//! 3. contract definition
//! 4. integration points
//! 5. atomic breakdown
//! 6. validated plan

mod decompose;
mod json;
pub mod passes;
mod planner;
pub mod prompts;
pub mod spec;
pub mod templates;

pub use decompose::{AtomDraft, AtomDrafts, Decomposer};
pub use json::{extract_json, parse_pass};
pub use passes::{
    ArchitectureDesign, AtomicBreakdown, Contract, ContractDefinition, DependencyMatrix, Entity,
    IntegrationPoints, ModuleDependency, ModuleDesign, Relationship, RequirementsAnalysis,
    StructuralPattern, ValidatedPlan,
};
pub use planner::{MultiPassPlanner, PassObserver, PassReport, Plan, PlanSummary};
pub use spec::{EntityHint, Specification};
pub use templates::{cli_tool_spec, crud_spec, minimal_spec};
