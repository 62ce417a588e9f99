use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use casework_config::ProcessDef;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::Error;

/// Source of process definitions, keyed by process definition key.
#[async_trait]
pub trait ProcessRepository: Send + Sync {
  async fn find_process(&self, process_definition_key: &str) -> Result<Option<ProcessDef>, Error>;

  /// Look up several processes. Unknown keys are skipped; the result is ordered by key.
  async fn find_processes(&self, keys: &BTreeSet<String>) -> Result<Vec<ProcessDef>, Error> {
    let mut processes = Vec::new();
    for key in keys {
      if let Some(process) = self.find_process(key).await? {
        processes.push(process);
      }
    }
    Ok(processes)
  }
}

/// Filesystem-based process repository.
///
/// Definitions are stored one per file:
/// ```text
/// {root}/
/// ├── Demonstration.json
/// └── TimeOff.json
/// ```
pub struct FsProcessRepository {
  root: PathBuf,
}

impl FsProcessRepository {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Keys that could escape the root resolve to nothing.
  fn path_for(&self, key: &str) -> Option<PathBuf> {
    let safe = !key.is_empty()
      && key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
      && !key.starts_with('.');
    safe.then(|| self.root.join(format!("{}.json", key)))
  }
}

#[async_trait]
impl ProcessRepository for FsProcessRepository {
  async fn find_process(&self, process_definition_key: &str) -> Result<Option<ProcessDef>, Error> {
    let Some(path) = self.path_for(process_definition_key) else {
      debug!(key = %process_definition_key, "rejected process key");
      return Ok(None);
    };

    let content = match fs::read_to_string(&path).await {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(Error::Io(e)),
    };

    ProcessDef::from_json(&content)
      .map(Some)
      .map_err(|source| Error::Config {
        key: process_definition_key.to_string(),
        source,
      })
  }
}

/// In-memory process repository.
#[derive(Default)]
pub struct InMemoryProcessRepository {
  processes: RwLock<HashMap<String, ProcessDef>>,
}

impl InMemoryProcessRepository {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn insert(&self, process: ProcessDef) {
    self
      .processes
      .write()
      .await
      .insert(process.process_definition_key.clone(), process);
  }
}

#[async_trait]
impl ProcessRepository for InMemoryProcessRepository {
  async fn find_process(&self, process_definition_key: &str) -> Result<Option<ProcessDef>, Error> {
    Ok(self.processes.read().await.get(process_definition_key).cloned())
  }
}
