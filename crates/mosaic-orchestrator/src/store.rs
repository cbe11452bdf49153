//! Task store boundary
//!
//! Atoms and graph snapshots are saved as a plan runs so a host can inspect
//! or resume it. The orchestrator writes through this trait fail-open.

use async_trait::async_trait;
use mosaic_core::{is_valid_id, AtomicTask, MosaicError, Result};
use mosaic_graph::GraphSnapshot;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save_task(&self, plan_id: &str, task: &AtomicTask) -> Result<()>;

    async fn load_task(&self, plan_id: &str, atom_id: &str) -> Result<Option<AtomicTask>>;

    async fn save_graph(&self, plan_id: &str, graph: &GraphSnapshot) -> Result<()>;

    async fn load_graph(&self, plan_id: &str) -> Result<Option<GraphSnapshot>>;
}

/// Process-local store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<(String, String), AtomicTask>>,
    graphs: RwLock<HashMap<String, GraphSnapshot>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every saved atom of a plan, sorted by id
    pub async fn tasks(&self, plan_id: &str) -> Vec<AtomicTask> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<AtomicTask> = tasks
            .iter()
            .filter(|((plan, _), _)| plan == plan_id)
            .map(|(_, task)| task.clone())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save_task(&self, plan_id: &str, task: &AtomicTask) -> Result<()> {
        self.tasks
            .write()
            .await
            .insert((plan_id.to_string(), task.id.clone()), task.clone());
        Ok(())
    }

    async fn load_task(&self, plan_id: &str, atom_id: &str) -> Result<Option<AtomicTask>> {
        Ok(self
            .tasks
            .read()
            .await
            .get(&(plan_id.to_string(), atom_id.to_string()))
            .cloned())
    }

    async fn save_graph(&self, plan_id: &str, graph: &GraphSnapshot) -> Result<()> {
        self.graphs
            .write()
            .await
            .insert(plan_id.to_string(), graph.clone());
        Ok(())
    }

    async fn load_graph(&self, plan_id: &str) -> Result<Option<GraphSnapshot>> {
        Ok(self.graphs.read().await.get(plan_id).cloned())
    }
}

/// One pretty-printed JSON file per atom under `<root>/<plan_id>/`
///
/// ```text
/// <root>/<plan_id>/graph.json
/// <root>/<plan_id>/atoms/<atom_id>.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileTaskStore {
    root: PathBuf,
}

impl JsonFileTaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ids become path components, so anything that could leave the root is refused
    fn checked(kind: &str, id: &str) -> Result<()> {
        if is_valid_id(id) {
            Ok(())
        } else {
            Err(MosaicError::Other(format!("refusing {} id {:?} as a file name", kind, id)))
        }
    }

    fn plan_dir(&self, plan_id: &str) -> Result<PathBuf> {
        Self::checked("plan", plan_id)?;
        Ok(self.root.join(plan_id))
    }

    fn task_path(&self, plan_id: &str, atom_id: &str) -> Result<PathBuf> {
        Self::checked("atom", atom_id)?;
        Ok(self
            .plan_dir(plan_id)?
            .join("atoms")
            .join(format!("{}.json", atom_id)))
    }

    async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(value)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[async_trait]
impl TaskStore for JsonFileTaskStore {
    async fn save_task(&self, plan_id: &str, task: &AtomicTask) -> Result<()> {
        Self::write_json(&self.task_path(plan_id, &task.id)?, task).await
    }

    async fn load_task(&self, plan_id: &str, atom_id: &str) -> Result<Option<AtomicTask>> {
        Self::read_json(&self.task_path(plan_id, atom_id)?).await
    }

    async fn save_graph(&self, plan_id: &str, graph: &GraphSnapshot) -> Result<()> {
        Self::write_json(&self.plan_dir(plan_id)?.join("graph.json"), graph).await
    }

    async fn load_graph(&self, plan_id: &str) -> Result<Option<GraphSnapshot>> {
        Self::read_json(&self.plan_dir(plan_id)?.join("graph.json")).await
    }
}
