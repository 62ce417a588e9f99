use std::fmt;

use casework_config::{DeploymentDef, ProcessDef};
use casework_model::{CaseError, ErrorCode, Principal, ProcessInstance, Task, User};
use casework_validation::Validation;
use serde::{Deserialize, Serialize};

/// The kind of a command, for logging, events and policy lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
  CreateInstance,
  Assignment,
  Activation,
  Suspension,
  Cancellation,
  UpdateStatus,
  Completion,
  Attachment,
  Detachment,
  UpdateValue,
  RemoveValue,
}

impl CommandKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::CreateInstance => "create_instance",
      Self::Assignment => "assignment",
      Self::Activation => "activation",
      Self::Suspension => "suspension",
      Self::Cancellation => "cancellation",
      Self::UpdateStatus => "update_status",
      Self::Completion => "completion",
      Self::Attachment => "attachment",
      Self::Detachment => "detachment",
      Self::UpdateValue => "update_value",
      Self::RemoveValue => "remove_value",
    }
  }
}

impl fmt::Display for CommandKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// What a command does, with only the data that transition needs.
#[derive(Debug, Clone)]
pub enum Action {
  CreateInstance {
    validation: Validation,
  },
  Assignment {
    task_instance_id: String,
    /// `None` unassigns.
    assignee: Option<User>,
  },
  Activation,
  Suspension {
    explanation: Option<String>,
  },
  Cancellation {
    explanation: Option<String>,
  },
  UpdateStatus {
    application_status: String,
    explanation: Option<String>,
  },
  Completion,
  Attachment {
    validation: Validation,
  },
  Detachment {
    attachment_id: String,
  },
  UpdateValue {
    validation: Validation,
  },
  RemoveValue {
    field: String,
    value_id: String,
  },
}

impl Action {
  pub fn kind(&self) -> CommandKind {
    match self {
      Self::CreateInstance { .. } => CommandKind::CreateInstance,
      Self::Assignment { .. } => CommandKind::Assignment,
      Self::Activation => CommandKind::Activation,
      Self::Suspension { .. } => CommandKind::Suspension,
      Self::Cancellation { .. } => CommandKind::Cancellation,
      Self::UpdateStatus { .. } => CommandKind::UpdateStatus,
      Self::Completion => CommandKind::Completion,
      Self::Attachment { .. } => CommandKind::Attachment,
      Self::Detachment { .. } => CommandKind::Detachment,
      Self::UpdateValue { .. } => CommandKind::UpdateValue,
      Self::RemoveValue { .. } => CommandKind::RemoveValue,
    }
  }
}

/// One attempted transition. Executed once, then discarded.
///
/// `instance` is `None` only for `CreateInstance`. `task` is the task the
/// principal acts through, when there is one.
#[derive(Debug, Clone)]
pub struct Command {
  pub principal: Principal,
  pub process: ProcessDef,
  pub deployment: DeploymentDef,
  pub instance: Option<ProcessInstance>,
  pub task: Option<Task>,
  pub action: Action,
}

impl Command {
  pub fn kind(&self) -> CommandKind {
    self.action.kind()
  }

  pub fn process_instance_id(&self) -> Option<&str> {
    self.instance.as_ref().map(|i| i.process_instance_id.as_str())
  }
}

/// Builds commands for one principal acting on one process (and instance).
///
/// Commands that carry a [`Validation`] are refused here when it holds
/// errors, so no command ever runs on invalid data.
#[derive(Debug, Clone)]
pub struct CommandFactory {
  principal: Principal,
  process: ProcessDef,
  deployment: DeploymentDef,
  instance: Option<ProcessInstance>,
  task: Option<Task>,
}

impl CommandFactory {
  pub fn new(principal: Principal, process: ProcessDef, deployment: DeploymentDef) -> Self {
    Self {
      principal,
      process,
      deployment,
      instance: None,
      task: None,
    }
  }

  pub fn with_instance(mut self, instance: ProcessInstance) -> Self {
    self.instance = Some(instance);
    self
  }

  pub fn with_task(mut self, task: Option<Task>) -> Self {
    self.task = task;
    self
  }

  pub fn create(self, validation: Validation) -> Result<Command, CaseError> {
    let validation = validation.require_valid()?;
    Ok(self.build(None, Action::CreateInstance { validation }))
  }

  pub fn assignment(
    self,
    task_instance_id: &str,
    assignee: Option<User>,
  ) -> Result<Command, CaseError> {
    self.for_instance(Action::Assignment {
      task_instance_id: task_instance_id.to_string(),
      assignee,
    })
  }

  pub fn activation(self) -> Result<Command, CaseError> {
    self.for_instance(Action::Activation)
  }

  pub fn suspension(self, explanation: Option<String>) -> Result<Command, CaseError> {
    self.for_instance(Action::Suspension { explanation })
  }

  pub fn cancellation(self, explanation: Option<String>) -> Result<Command, CaseError> {
    self.for_instance(Action::Cancellation { explanation })
  }

  pub fn update_status(
    self,
    application_status: String,
    explanation: Option<String>,
  ) -> Result<Command, CaseError> {
    self.for_instance(Action::UpdateStatus {
      application_status,
      explanation,
    })
  }

  pub fn completion(self) -> Result<Command, CaseError> {
    self.for_instance(Action::Completion)
  }

  pub fn attachment(self, validation: Validation) -> Result<Command, CaseError> {
    let validation = validation.require_valid()?;
    self.for_instance(Action::Attachment { validation })
  }

  pub fn detachment(self, attachment_id: &str) -> Result<Command, CaseError> {
    self.for_instance(Action::Detachment {
      attachment_id: attachment_id.to_string(),
    })
  }

  pub fn update_value(self, validation: Validation) -> Result<Command, CaseError> {
    let validation = validation.require_valid()?;
    self.for_instance(Action::UpdateValue { validation })
  }

  pub fn remove_value(self, field: &str, value_id: &str) -> Result<Command, CaseError> {
    self.for_instance(Action::RemoveValue {
      field: field.to_string(),
      value_id: value_id.to_string(),
    })
  }

  fn for_instance(mut self, action: Action) -> Result<Command, CaseError> {
    let instance = self.instance.take().ok_or_else(|| {
      CaseError::internal(ErrorCode::CommandRejected)
        .with_context(format!("{} requires an instance", action.kind()))
    })?;
    Ok(self.build(Some(instance), action))
  }

  fn build(self, instance: Option<ProcessInstance>, action: Action) -> Command {
    Command {
      principal: self.principal,
      process: self.process,
      deployment: self.deployment,
      instance,
      task: self.task,
      action,
    }
  }
}
