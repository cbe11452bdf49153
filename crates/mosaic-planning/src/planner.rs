//! The six-pass planner

use chrono::{DateTime, Utc};
use mosaic_agent::{InferenceProvider, InferenceRole};
use mosaic_core::config::{AtomConfig, MosaicConfig};
use mosaic_core::{AtomicTask, MosaicError, Result, SignatureExtractor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::decompose::{AtomDrafts, Decomposer};
use crate::json::parse_pass;
use crate::passes::{
    ArchitectureDesign, AtomicBreakdown, ContractDefinition, DependencyMatrix, IntegrationPoints,
    RequirementsAnalysis, ValidatedPlan,
};
use crate::prompts;
use crate::spec::Specification;

/// Completion notice for one pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub pass: u8,
    pub name: String,
    pub duration_ms: u64,
    pub detail: String,
}

/// Called after each pass completes
pub type PassObserver = Arc<dyn Fn(&PassReport) + Send + Sync>;

/// A validated, acyclic plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub requirements: RequirementsAnalysis,
    pub architecture: ArchitectureDesign,
    pub contracts: ContractDefinition,
    pub integration: DependencyMatrix,
    pub atoms: Vec<AtomicTask>,
    pub levels: Vec<Vec<String>>,
    pub splits: usize,
    pub warnings: Vec<String>,
    pub passes: Vec<PassReport>,
}

impl Plan {
    pub fn atom(&self, id: &str) -> Option<&AtomicTask> {
        self.atoms.iter().find(|a| a.id == id)
    }

    pub fn summary(&self) -> PlanSummary {
        let mut atoms_per_module: BTreeMap<String, usize> = BTreeMap::new();
        for atom in &self.atoms {
            let module = atom.module.clone().unwrap_or_else(|| "-".to_string());
            *atoms_per_module.entry(module).or_default() += 1;
        }

        PlanSummary {
            plan_id: self.id.clone(),
            title: self.title.clone(),
            total_passes: self.passes.len(),
            total_entities: self.requirements.entities.len(),
            total_modules: self.architecture.modules.len(),
            total_contracts: self.contracts.contracts.len(),
            total_atoms: self.atoms.len(),
            total_splits: self.splits,
            total_levels: self.levels.len(),
            widest_level: self.levels.iter().map(Vec::len).max().unwrap_or(0),
            warnings: self.warnings.len(),
            atoms_per_module,
        }
    }
}

/// Counts for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub plan_id: String,
    pub title: String,
    pub total_passes: usize,
    pub total_entities: usize,
    pub total_modules: usize,
    pub total_contracts: usize,
    pub total_atoms: usize,
    pub total_splits: usize,
    pub total_levels: usize,
    pub widest_level: usize,
    pub warnings: usize,
    pub atoms_per_module: BTreeMap<String, usize>,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Plan: {} ({})", self.title, self.plan_id)?;
        writeln!(f, "  Passes: {}", self.total_passes)?;
        writeln!(f, "  Entities: {}", self.total_entities)?;
        writeln!(f, "  Modules: {}", self.total_modules)?;
        writeln!(f, "  Contracts: {}", self.total_contracts)?;
        writeln!(f, "  Atoms: {} ({} splits)", self.total_atoms, self.total_splits)?;
        writeln!(
            f,
            "  Levels: {} (widest {})",
            self.total_levels, self.widest_level
        )?;
        writeln!(f, "  Warnings: {}", self.warnings)?;
        writeln!(f)?;
        writeln!(f, "Module Breakdown:")?;
        for (module, count) in &self.atoms_per_module {
            writeln!(f, "  {}: {} atoms", module, count)?;
        }
        Ok(())
    }
}

pub struct MultiPassPlanner {
    provider: Arc<dyn InferenceProvider>,
    atoms: AtomConfig,
    extractor: SignatureExtractor,
    observer: Option<PassObserver>,
}

impl MultiPassPlanner {
    pub fn new(provider: Arc<dyn InferenceProvider>, config: &MosaicConfig) -> Self {
        Self {
            provider,
            atoms: config.atoms.clone(),
            extractor: SignatureExtractor::new(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: PassObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run all six passes
    #[instrument(skip(self, spec), fields(title = %spec.title))]
    pub async fn plan(&self, spec: &Specification) -> Result<Plan> {
        spec.validate()?;
        let mut passes = Vec::with_capacity(6);

        // Pass 1
        let started = Instant::now();
        let requirements: RequirementsAnalysis = self
            .ask(RequirementsAnalysis::PASS, &prompts::requirements_prompt(spec))
            .await?;
        requirements.validate()?;
        passes.push(self.completed(
            RequirementsAnalysis::PASS,
            "requirements_analysis",
            started,
            format!("{} entities", requirements.entities.len()),
        ));

        // Pass 2
        let started = Instant::now();
        let architecture: ArchitectureDesign = self
            .ask(
                ArchitectureDesign::PASS,
                &prompts::architecture_prompt(spec, &requirements),
            )
            .await?;
        architecture.validate()?;
        passes.push(self.completed(
            ArchitectureDesign::PASS,
            "architecture_design",
            started,
            format!("{} modules", architecture.modules.len()),
        ));

        // Pass 3
        let started = Instant::now();
        let contracts: ContractDefinition = self
            .ask(
                ContractDefinition::PASS,
                &prompts::contracts_prompt(spec, &architecture),
            )
            .await?;
        contracts.validate(&architecture)?;
        passes.push(self.completed(
            ContractDefinition::PASS,
            "contract_definition",
            started,
            format!("{} contracts", contracts.contracts.len()),
        ));

        // Pass 4
        let started = Instant::now();
        let integration: IntegrationPoints = self
            .ask(
                IntegrationPoints::PASS,
                &prompts::integration_prompt(&architecture, &contracts),
            )
            .await?;
        let matrix = integration.matrix(&architecture)?;
        passes.push(self.completed(
            IntegrationPoints::PASS,
            "integration_points",
            started,
            format!("{} module dependencies", integration.dependencies.len()),
        ));

        // Pass 5
        let started = Instant::now();
        let breakdown = self.breakdown(&architecture, &contracts, &matrix).await?;
        passes.push(self.completed(
            AtomicBreakdown::PASS,
            "atomic_breakdown",
            started,
            format!("{} atoms, {} splits", breakdown.atoms.len(), breakdown.splits),
        ));
        let splits = breakdown.splits;

        // Pass 6
        let started = Instant::now();
        let validated = ValidatedPlan::from_breakdown(breakdown)?;
        passes.push(self.completed(
            ValidatedPlan::PASS,
            "validated_plan",
            started,
            format!("{} levels", validated.levels.len()),
        ));

        let plan = Plan {
            id: uuid::Uuid::new_v4().to_string(),
            title: spec.title.clone(),
            created_at: Utc::now(),
            requirements,
            architecture,
            contracts,
            integration: matrix,
            atoms: validated.atoms,
            levels: validated.levels,
            splits,
            warnings: validated.warnings,
            passes,
        };
        info!(
            plan = %plan.id,
            atoms = plan.atoms.len(),
            levels = plan.levels.len(),
            warnings = plan.warnings.len(),
            "Plan validated"
        );
        Ok(plan)
    }

    async fn breakdown(
        &self,
        architecture: &ArchitectureDesign,
        contracts: &ContractDefinition,
        matrix: &DependencyMatrix,
    ) -> Result<AtomicBreakdown> {
        let mut decomposer = Decomposer::new(&self.atoms);

        for name in &matrix.order {
            let Some(module) = architecture.module(name) else {
                continue;
            };
            let upstream: Vec<(&str, &str)> = matrix
                .dependencies_of(name)
                .into_iter()
                .flat_map(|dep| decomposer.module_atoms(dep))
                .collect();
            let prompt =
                prompts::breakdown_prompt(module, contracts, matrix, &upstream, self.atoms.max_lines);
            let drafts: AtomDrafts = self.ask(AtomicBreakdown::PASS, &prompt).await?;
            decomposer.add_module(name, drafts.atoms)?;
        }

        while let Some((idx, reason)) = decomposer.next_split() {
            let prompt = prompts::split_prompt(decomposer.draft(idx), &reason, self.atoms.max_lines);
            let children: AtomDrafts = self.ask(AtomicBreakdown::PASS, &prompt).await?;
            decomposer.split(idx, children.atoms)?;
        }

        decomposer.finish(&self.extractor)
    }

    /// One planning call, retried once with the parse error on malformed JSON
    async fn ask<T: DeserializeOwned>(&self, pass: u8, prompt: &str) -> Result<T> {
        let response = self.provider.infer(prompt, InferenceRole::Planning).await?;
        match parse_pass(&response) {
            Ok(record) => Ok(record),
            Err(first) => {
                warn!(pass, error = %first, "Malformed planning response, retrying");
                let retry = prompts::retry_prompt(prompt, &first);
                let response = self.provider.infer(&retry, InferenceRole::Planning).await?;
                parse_pass(&response).map_err(|e| {
                    MosaicError::planning(pass, format!("malformed response after retry: {}", e))
                })
            }
        }
    }

    fn completed(&self, pass: u8, name: &str, started: Instant, detail: String) -> PassReport {
        let report = PassReport {
            pass,
            name: name.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            detail,
        };
        info!(pass, name, detail = %report.detail, "Pass completed");
        if let Some(observer) = &self.observer {
            observer(&report);
        }
        report
    }
}
