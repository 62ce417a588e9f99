//! Casework Engine
//!
//! The boundary to the process engine of record. The engine owns the
//! execution graph; casework only asks it to start, assign, activate,
//! suspend and cancel.
//!
//! Every transition method answers `Ok(true)` when the engine performed the
//! transition and `Ok(false)` when the engine considers it illegal. That
//! boolean is the only legality signal; local state checks are advisory.
//! `Err` is reserved for the engine being unreachable or broken.

mod memory;

pub use memory::InMemoryEngine;

use async_trait::async_trait;
use casework_config::{DeploymentDef, ProcessDef};
use casework_model::{CaseError, ErrorCode, ProcessInstance, User};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("engine unavailable: {0}")]
  Unavailable(String),

  #[error("engine has no instance '{0}'")]
  UnknownInstance(String),
}

impl From<EngineError> for CaseError {
  fn from(error: EngineError) -> Self {
    CaseError::internal(ErrorCode::EngineFailure).with_context(error.to_string())
  }
}

#[async_trait]
pub trait ProcessEngineFacade: Send + Sync {
  /// Start an engine instance for a new case, returning the engine's instance id.
  async fn start(
    &self,
    process: &ProcessDef,
    deployment: &DeploymentDef,
    instance: &ProcessInstance,
  ) -> Result<String, EngineError>;

  /// Assign (or with `None`, unassign) a task.
  async fn assign(
    &self,
    process: &ProcessDef,
    deployment: &DeploymentDef,
    task_instance_id: &str,
    assignee: Option<&User>,
  ) -> Result<bool, EngineError>;

  async fn activate(
    &self,
    process: &ProcessDef,
    deployment: &DeploymentDef,
    instance: &ProcessInstance,
  ) -> Result<bool, EngineError>;

  async fn suspend(
    &self,
    process: &ProcessDef,
    deployment: &DeploymentDef,
    instance: &ProcessInstance,
  ) -> Result<bool, EngineError>;

  async fn cancel(
    &self,
    process: &ProcessDef,
    deployment: &DeploymentDef,
    instance: &ProcessInstance,
  ) -> Result<bool, EngineError>;
}
