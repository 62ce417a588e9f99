use casework_config::DeploymentDef;
use casework_model::{ProcessInstance, ProcessStatus, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::CommandKind;

/// The outcome of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
  pub previous_status: ProcessStatus,
  pub new_status: ProcessStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub application_status: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub explanation: Option<String>,
}

/// The status an operation moves an instance to, if it moves it at all.
pub(crate) fn target_status(kind: CommandKind) -> Option<ProcessStatus> {
  match kind {
    CommandKind::Activation => Some(ProcessStatus::Open),
    CommandKind::Suspension => Some(ProcessStatus::Suspended),
    CommandKind::Cancellation => Some(ProcessStatus::Cancelled),
    CommandKind::Completion => Some(ProcessStatus::Complete),
    _ => None,
  }
}

/// Work out the result of a lifecycle operation the engine has accepted.
///
/// `application_status` only applies to `UpdateStatus`.
pub(crate) fn resolve(
  kind: CommandKind,
  instance: &ProcessInstance,
  deployment: &DeploymentDef,
  application_status: Option<&str>,
  explanation: Option<String>,
) -> OperationResult {
  let previous_status = instance.process_status;
  let new_status = target_status(kind).unwrap_or(previous_status);

  let application_status = match kind {
    CommandKind::Activation => instance
      .previous_application_status
      .clone()
      .or_else(|| Some(deployment.initiation_status.clone())),
    CommandKind::Suspension => Some(deployment.suspension_status.clone()),
    CommandKind::Cancellation => Some(deployment.cancellation_status.clone()),
    CommandKind::Completion => Some(deployment.completion_status.clone()),
    CommandKind::UpdateStatus => application_status.map(str::to_string),
    _ => instance.application_status.clone(),
  };

  OperationResult {
    previous_status,
    new_status,
    application_status,
    explanation,
  }
}

/// Apply an accepted operation to an instance, moving its tasks along with it.
pub(crate) fn apply(instance: &mut ProcessInstance, result: &OperationResult, now: DateTime<Utc>) {
  if result.new_status == ProcessStatus::Suspended
    && result.previous_status != ProcessStatus::Suspended
  {
    instance.previous_application_status = instance.application_status.clone();
  }
  if result.new_status == ProcessStatus::Open && result.previous_status == ProcessStatus::Suspended {
    instance.previous_application_status = None;
  }

  instance.process_status = result.new_status;
  instance.application_status = result.application_status.clone();
  instance.application_status_explanation = result.explanation.clone();

  if result.new_status != result.previous_status {
    for task in &mut instance.tasks {
      task.task_status = match (result.new_status, task.task_status) {
        (ProcessStatus::Open, TaskStatus::Suspended) => TaskStatus::Open,
        (ProcessStatus::Suspended, TaskStatus::Open) => TaskStatus::Suspended,
        (ProcessStatus::Cancelled, TaskStatus::Open | TaskStatus::Suspended) => {
          TaskStatus::Cancelled
        }
        (ProcessStatus::Complete, TaskStatus::Open | TaskStatus::Suspended) => TaskStatus::Complete,
        (_, unchanged) => unchanged,
      };
    }
  }

  if result.new_status.is_terminal() {
    instance.end_time = Some(now);
  }
  instance.last_modified_time = now;
}

#[cfg(test)]
mod tests {
  use casework_config::ProcessDef;
  use casework_model::Task;

  use super::*;

  const DEMONSTRATION: &str = include_str!("../../../test-fixtures/demonstration.json");

  fn fixture() -> (ProcessInstance, DeploymentDef) {
    let process = ProcessDef::from_json(DEMONSTRATION).unwrap();
    let deployment = process.active_deployment().unwrap().clone();
    let mut instance: ProcessInstance = serde_json::from_value(serde_json::json!({
      "process_instance_id": "i",
      "process_definition_key": "Demonstration",
      "process_definition_label": "Demonstration Process",
      "process_instance_label": "Case",
      "deployment_id": "1",
      "process_status": "open",
      "application_status": "In review",
      "start_time": "2024-01-01T00:00:00Z",
      "last_modified_time": "2024-01-01T00:00:00Z"
    }))
    .unwrap();
    instance.tasks.push(Task::new("t1", "review"));
    (instance, deployment)
  }

  #[test]
  fn test_suspend_then_activate_restores_application_status() {
    let (mut instance, deployment) = fixture();
    let now = Utc::now();

    let suspended = resolve(CommandKind::Suspension, &instance, &deployment, None, None);
    apply(&mut instance, &suspended, now);
    assert_eq!(instance.process_status, ProcessStatus::Suspended);
    assert_eq!(instance.application_status.as_deref(), Some("On hold"));
    assert_eq!(instance.tasks[0].task_status, TaskStatus::Suspended);

    let activated = resolve(CommandKind::Activation, &instance, &deployment, None, None);
    apply(&mut instance, &activated, now);
    assert_eq!(instance.process_status, ProcessStatus::Open);
    assert_eq!(instance.application_status.as_deref(), Some("In review"));
    assert_eq!(instance.previous_application_status, None);
    assert_eq!(instance.tasks[0].task_status, TaskStatus::Open);
  }

  #[test]
  fn test_cancellation_uses_deployment_status_and_closes_tasks() {
    let (mut instance, deployment) = fixture();
    let now = Utc::now();

    let result = resolve(
      CommandKind::Cancellation,
      &instance,
      &deployment,
      None,
      Some("Duplicate".to_string()),
    );
    apply(&mut instance, &result, now);

    assert_eq!(result.previous_status, ProcessStatus::Open);
    assert_eq!(instance.process_status, ProcessStatus::Cancelled);
    assert_eq!(instance.application_status.as_deref(), Some("Cancelled by request"));
    assert_eq!(instance.application_status_explanation.as_deref(), Some("Duplicate"));
    assert_eq!(instance.tasks[0].task_status, TaskStatus::Cancelled);
    assert_eq!(instance.end_time, Some(now));
  }

  #[test]
  fn test_update_status_keeps_process_status() {
    let (mut instance, deployment) = fixture();

    let result = resolve(
      CommandKind::UpdateStatus,
      &instance,
      &deployment,
      Some("Waiting on HR"),
      None,
    );
    apply(&mut instance, &result, Utc::now());

    assert_eq!(result.previous_status, result.new_status);
    assert_eq!(instance.application_status.as_deref(), Some("Waiting on HR"));
    assert_eq!(instance.end_time, None);
  }
}
