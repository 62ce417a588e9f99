use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use casework_config::{DeploymentDef, ProcessDef};
use casework_model::{ProcessInstance, ProcessStatus, User};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{EngineError, ProcessEngineFacade};

/// An engine of record kept in memory.
///
/// It tracks its own status per instance and applies the lifecycle state
/// machine to it, so it disagrees with a stale caller the way a real engine
/// would. Instances without an engine id are adopted with the caller's
/// status. An engine id it never issued is an unknown instance, unless the
/// engine was built with [`adopting`](Self::adopting).
#[derive(Default)]
pub struct InMemoryEngine {
  statuses: Mutex<HashMap<String, ProcessStatus>>,
  assignments: Mutex<HashMap<String, Option<String>>>,
  closed_tasks: Mutex<HashSet<String>>,
  unavailable: AtomicBool,
  adopt_unknown: bool,
}

impl InMemoryEngine {
  pub fn new() -> Self {
    Self::default()
  }

  /// An engine that also adopts engine ids it never issued, for callers
  /// whose engine state does not outlive the process.
  pub fn adopting() -> Self {
    Self {
      adopt_unknown: true,
      ..Self::default()
    }
  }

  /// Force the engine's view of an instance, e.g. to simulate a concurrent transition.
  pub async fn set_status(&self, engine_instance_id: &str, status: ProcessStatus) {
    self
      .statuses
      .lock()
      .await
      .insert(engine_instance_id.to_string(), status);
  }

  /// Fail every call with [`EngineError::Unavailable`] until reset.
  pub fn set_unavailable(&self, unavailable: bool) {
    self.unavailable.store(unavailable, Ordering::SeqCst);
  }

  fn check_available(&self) -> Result<(), EngineError> {
    if self.unavailable.load(Ordering::SeqCst) {
      return Err(EngineError::Unavailable("in-memory engine is offline".to_string()));
    }
    Ok(())
  }

  pub async fn status(&self, engine_instance_id: &str) -> Option<ProcessStatus> {
    self.statuses.lock().await.get(engine_instance_id).copied()
  }

  /// Refuse further assignment of a task.
  pub async fn close_task(&self, task_instance_id: &str) {
    self
      .closed_tasks
      .lock()
      .await
      .insert(task_instance_id.to_string());
  }

  pub async fn assignee(&self, task_instance_id: &str) -> Option<String> {
    self
      .assignments
      .lock()
      .await
      .get(task_instance_id)
      .cloned()
      .flatten()
  }

  async fn transition(
    &self,
    instance: &ProcessInstance,
    target: ProcessStatus,
  ) -> Result<bool, EngineError> {
    self.check_available()?;
    let mut statuses = self.statuses.lock().await;
    let (key, current) = match &instance.engine_process_instance_id {
      Some(id) if !self.adopt_unknown => {
        let current = statuses
          .get(id)
          .copied()
          .ok_or_else(|| EngineError::UnknownInstance(id.clone()))?;
        (id.clone(), current)
      }
      _ => {
        let key = engine_key(instance);
        let current = *statuses.entry(key.clone()).or_insert(instance.process_status);
        (key, current)
      }
    };

    if !current.can_transition_to(target) {
      debug!(engine_instance_id = %key, from = %current, to = %target, "engine refused transition");
      return Ok(false);
    }

    statuses.insert(key, target);
    Ok(true)
  }
}

fn engine_key(instance: &ProcessInstance) -> String {
  instance
    .engine_process_instance_id
    .clone()
    .unwrap_or_else(|| instance.process_instance_id.clone())
}

#[async_trait]
impl ProcessEngineFacade for InMemoryEngine {
  async fn start(
    &self,
    _process: &ProcessDef,
    _deployment: &DeploymentDef,
    _instance: &ProcessInstance,
  ) -> Result<String, EngineError> {
    self.check_available()?;
    let engine_instance_id = uuid::Uuid::new_v4().to_string();
    self
      .statuses
      .lock()
      .await
      .insert(engine_instance_id.clone(), ProcessStatus::Open);
    Ok(engine_instance_id)
  }

  async fn assign(
    &self,
    _process: &ProcessDef,
    _deployment: &DeploymentDef,
    task_instance_id: &str,
    assignee: Option<&User>,
  ) -> Result<bool, EngineError> {
    self.check_available()?;
    if self.closed_tasks.lock().await.contains(task_instance_id) {
      return Ok(false);
    }

    self.assignments.lock().await.insert(
      task_instance_id.to_string(),
      assignee.map(|u| u.user_id.clone()),
    );
    Ok(true)
  }

  async fn activate(
    &self,
    _process: &ProcessDef,
    _deployment: &DeploymentDef,
    instance: &ProcessInstance,
  ) -> Result<bool, EngineError> {
    self.transition(instance, ProcessStatus::Open).await
  }

  async fn suspend(
    &self,
    _process: &ProcessDef,
    _deployment: &DeploymentDef,
    instance: &ProcessInstance,
  ) -> Result<bool, EngineError> {
    self.transition(instance, ProcessStatus::Suspended).await
  }

  async fn cancel(
    &self,
    _process: &ProcessDef,
    _deployment: &DeploymentDef,
    instance: &ProcessInstance,
  ) -> Result<bool, EngineError> {
    self.transition(instance, ProcessStatus::Cancelled).await
  }
}
