//! The single funnel every command runs through.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use casework_config::{DeploymentDef, ProcessDef};
use casework_engine::ProcessEngineFacade;
use casework_model::{
  Attachment, CaseError, ErrorCode, File, Principal, ProcessInstance, ProcessStatus, Value,
};
use casework_store::Store;
use casework_validation::Validation;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::command::{Action, Command, CommandKind};
use crate::events::{CommandEvent, CommandNotifier, NoopNotifier};
use crate::label::render_label;
use crate::mediator::{CommandMediator, Mediation, PolicyMediator};
use crate::operation::{self, OperationResult};

/// What an executed command produced.
#[derive(Debug, Clone)]
pub struct CommandResult {
  pub kind: CommandKind,
  /// The instance as saved. Attachments are not hydrated.
  pub instance: ProcessInstance,
  /// Set for operation commands.
  pub operation: Option<OperationResult>,
}

/// Executes commands against the store and the engine facade.
///
/// Each execution re-reads the instance, runs the mediator on the fresh copy,
/// then performs the transition. Domain errors pass through unchanged.
pub struct CommandExecutor {
  store: Arc<dyn Store>,
  facade: Arc<dyn ProcessEngineFacade>,
  mediator: Arc<dyn CommandMediator>,
  notifier: Arc<dyn CommandNotifier>,
}

impl CommandExecutor {
  /// An executor applying the default policy and discarding events.
  pub fn new(store: Arc<dyn Store>, facade: Arc<dyn ProcessEngineFacade>) -> Self {
    Self {
      store,
      facade,
      mediator: Arc::new(PolicyMediator),
      notifier: Arc::new(NoopNotifier),
    }
  }

  pub fn with_mediator(mut self, mediator: Arc<dyn CommandMediator>) -> Self {
    self.mediator = mediator;
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn CommandNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  #[instrument(
    name = "command_execute",
    skip_all,
    fields(
      kind = %command.kind(),
      process_instance_id = command.process_instance_id().unwrap_or_default(),
    )
  )]
  pub async fn execute(&self, command: Command) -> Result<CommandResult, CaseError> {
    let started = Instant::now();
    let kind = command.kind();
    let process_instance_id = command.process_instance_id().map(str::to_string);

    let result = self.run(command).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match &result {
      Ok(executed) => {
        info!(
          kind = %kind,
          process_instance_id = %executed.instance.process_instance_id,
          elapsed_ms,
          "command_executed"
        );
        self.notifier.notify(CommandEvent::Executed {
          kind,
          process_instance_id: executed.instance.process_instance_id.clone(),
          elapsed_ms,
        });
      }
      Err(e) => {
        warn!(kind = %kind, error = %e, elapsed_ms, "command_failed");
        self.notifier.notify(CommandEvent::Failed {
          kind,
          process_instance_id,
          code: e.code(),
          elapsed_ms,
        });
      }
    }

    result
  }

  async fn run(&self, mut command: Command) -> Result<CommandResult, CaseError> {
    if let Some(stale) = command.instance.take() {
      let current = self.reload(&stale.process_instance_id).await?;
      if current.process_definition_key != command.process.process_definition_key {
        return Err(
          CaseError::not_found(ErrorCode::InstanceDoesNotExist)
            .with_context(stale.process_instance_id),
        );
      }
      command.instance = Some(current);
    }

    let command = match self.mediator.mediate(command) {
      Mediation::Proceed(command) => command,
      Mediation::Reject(rejection) => return Err(rejection.into()),
    };

    let kind = command.kind();
    let Command {
      principal,
      process,
      deployment,
      instance,
      action,
      ..
    } = command;
    let now = Utc::now();

    match (action, instance) {
      (Action::CreateInstance { validation }, _) => {
        self
          .create(&principal, &process, &deployment, validation, now)
          .await
      }
      (action, Some(instance)) => {
        let (instance, operation) = self
          .modify(&principal, &process, &deployment, instance, action, now)
          .await?;
        Ok(CommandResult {
          kind,
          instance,
          operation,
        })
      }
      (_, None) => Err(
        CaseError::internal(ErrorCode::CommandRejected)
          .with_context(format!("{} requires an instance", kind)),
      ),
    }
  }

  async fn reload(&self, process_instance_id: &str) -> Result<ProcessInstance, CaseError> {
    let instance = self
      .store
      .find_instance(process_instance_id)
      .await?
      .ok_or_else(|| {
        CaseError::not_found(ErrorCode::InstanceDoesNotExist)
          .with_context(process_instance_id.to_string())
      })?;
    if instance.deleted {
      return Err(CaseError::gone(ErrorCode::InstanceDeleted).with_context(process_instance_id.to_string()));
    }
    Ok(instance)
  }

  async fn create(
    &self,
    principal: &Principal,
    process: &ProcessDef,
    deployment: &DeploymentDef,
    validation: Validation,
    now: DateTime<Utc>,
  ) -> Result<CommandResult, CaseError> {
    let label = validation
      .process_instance_label
      .clone()
      .filter(|l| !l.trim().is_empty())
      .unwrap_or_else(|| {
        render_label(
          process.process_instance_label_template.as_deref(),
          &validation.data,
          now,
        )
      });

    let mut instance = ProcessInstance {
      process_instance_id: Uuid::new_v4().to_string(),
      process_definition_key: process.process_definition_key.clone(),
      process_definition_label: process.process_definition_label.clone(),
      process_instance_label: label,
      engine_process_instance_id: None,
      deployment_id: deployment.deployment_id.clone(),
      activity_key: Some(deployment.start_activity_key.clone()),
      process_status: ProcessStatus::Open,
      application_status: Some(deployment.initiation_status.clone()),
      application_status_explanation: None,
      previous_application_status: None,
      data: validation.data,
      restricted_data: validation.restricted_data,
      attachment_ids: BTreeSet::new(),
      attachments: Vec::new(),
      tasks: Vec::new(),
      initiator_id: principal
        .entity_id()
        .map(str::to_string)
        .or(validation.submitter_id),
      keywords: BTreeSet::new(),
      start_time: now,
      end_time: None,
      last_modified_time: now,
      deleted: false,
      version: 0,
    };

    let engine_id = self.facade.start(process, deployment, &instance).await?;
    instance.engine_process_instance_id = Some(engine_id);

    let added = self
      .attach_files(principal, &mut instance, &validation.attachments, now)
      .await?;
    instance.refresh_keywords();
    self.save(&mut instance, &added).await?;

    info!(
      process_instance_id = %instance.process_instance_id,
      process_definition_key = %instance.process_definition_key,
      "instance_created"
    );

    Ok(CommandResult {
      kind: CommandKind::CreateInstance,
      instance,
      operation: None,
    })
  }

  async fn modify(
    &self,
    principal: &Principal,
    process: &ProcessDef,
    deployment: &DeploymentDef,
    mut instance: ProcessInstance,
    action: Action,
    now: DateTime<Utc>,
  ) -> Result<(ProcessInstance, Option<OperationResult>), CaseError> {
    let kind = action.kind();
    let mut outcome = None;
    let mut added = Vec::new();
    let mut detached = None;

    match action {
      Action::Assignment {
        task_instance_id,
        assignee,
      } => {
        if instance.task(&task_instance_id).is_none() {
          return Err(CaseError::not_found(ErrorCode::TaskDoesNotExist).with_context(task_instance_id));
        }
        let accepted = self
          .facade
          .assign(process, deployment, &task_instance_id, assignee.as_ref())
          .await?;
        if !accepted {
          return Err(
            CaseError::forbidden(ErrorCode::InvalidAssignment)
              .with_context(format!("engine refused assignment of task {}", task_instance_id)),
          );
        }
        if let Some(task) = instance.task_mut(&task_instance_id) {
          task.assignee_id = assignee.map(|u| u.user_id);
        }
        outcome = Some(operation::resolve(
          kind,
          &instance,
          deployment,
          None,
          instance.application_status_explanation.clone(),
        ));
      }
      Action::Activation | Action::Suspension { .. } | Action::Cancellation { .. } => {
        let explanation = match &action {
          Action::Suspension { explanation } | Action::Cancellation { explanation } => {
            explanation.clone()
          }
          _ => None,
        };
        self.check_transition(kind, &instance)?;

        let accepted = match kind {
          CommandKind::Activation => self.facade.activate(process, deployment, &instance).await?,
          CommandKind::Suspension => self.facade.suspend(process, deployment, &instance).await?,
          _ => self.facade.cancel(process, deployment, &instance).await?,
        };
        if !accepted {
          return Err(
            CaseError::conflict(ErrorCode::InvalidProcessStatus)
              .with_context(format!("engine refused {} from {}", kind, instance.process_status)),
          );
        }

        let result = operation::resolve(kind, &instance, deployment, None, explanation);
        operation::apply(&mut instance, &result, now);
        outcome = Some(result);
      }
      Action::Completion => {
        // the engine has already finished the instance
        self.check_transition(kind, &instance)?;
        let result = operation::resolve(kind, &instance, deployment, None, None);
        operation::apply(&mut instance, &result, now);
        outcome = Some(result);
      }
      Action::UpdateStatus {
        application_status,
        explanation,
      } => {
        let result = operation::resolve(
          kind,
          &instance,
          deployment,
          Some(&application_status),
          explanation,
        );
        operation::apply(&mut instance, &result, now);
        outcome = Some(result);
      }
      Action::Attachment { validation } => {
        added = self
          .attach_files(principal, &mut instance, &validation.attachments, now)
          .await?;
      }
      Action::Detachment { attachment_id } => {
        if !instance.attachment_ids.remove(&attachment_id) {
          return Err(
            CaseError::not_found(ErrorCode::AttachmentDoesNotExist).with_context(attachment_id),
          );
        }
        detached = Some(attachment_id);
      }
      Action::UpdateValue { validation } => {
        instance.data.extend(validation.data);
        instance.restricted_data.extend(validation.restricted_data);
        instance.refresh_keywords();
      }
      Action::RemoveValue { field, value_id } => {
        let removed = remove_file(&mut instance.data, &field, &value_id)
          || remove_file(&mut instance.restricted_data, &field, &value_id);
        if !removed {
          return Err(
            CaseError::not_found(ErrorCode::ValueDoesNotExist)
              .with_context(format!("{}/{}", field, value_id)),
          );
        }
        instance.refresh_keywords();
      }
      Action::CreateInstance { .. } => {
        return Err(
          CaseError::internal(ErrorCode::CommandRejected)
            .with_context("create_instance cannot target an existing instance"),
        );
      }
    }

    instance.last_modified_time = now;
    self.save(&mut instance, &added).await?;
    if let Some(attachment_id) = detached {
      self.store.delete_attachment(&attachment_id).await?;
    }
    Ok((instance, outcome))
  }

  /// Save against the version that was read. On failure the attachment
  /// records written for this command are dropped again.
  async fn save(&self, instance: &mut ProcessInstance, added: &[String]) -> Result<(), CaseError> {
    match self.store.save_instance(instance).await {
      Ok(version) => {
        instance.version = version;
        Ok(())
      }
      Err(e) => {
        for attachment_id in added {
          if let Err(cleanup) = self.store.delete_attachment(attachment_id).await {
            warn!(attachment_id = %attachment_id, error = %cleanup, "attachment_cleanup_failed");
          }
        }
        Err(e.into())
      }
    }
  }

  /// Advisory local check. The engine has the final word.
  fn check_transition(&self, kind: CommandKind, instance: &ProcessInstance) -> Result<(), CaseError> {
    let Some(target) = operation::target_status(kind) else {
      return Ok(());
    };
    if instance.process_status.can_transition_to(target) {
      return Ok(());
    }
    debug!(from = %instance.process_status, to = %target, "illegal transition");
    Err(
      CaseError::conflict(ErrorCode::InvalidProcessStatus)
        .with_context(format!("cannot move from {} to {}", instance.process_status, target)),
    )
  }

  async fn attach_files(
    &self,
    principal: &Principal,
    instance: &mut ProcessInstance,
    files: &[File],
    now: DateTime<Utc>,
  ) -> Result<Vec<String>, CaseError> {
    let mut added = Vec::with_capacity(files.len());
    for file in files {
      let attachment = Attachment {
        attachment_id: Uuid::new_v4().to_string(),
        process_instance_id: instance.process_instance_id.clone(),
        name: file.name.clone(),
        description: file.description.clone(),
        content_type: file.content_type.clone(),
        location: file.location.clone(),
        link: file.link.clone(),
        user_id: principal.entity_id().map(str::to_string),
        created_at: now,
      };
      self.store.save_attachment(&attachment).await?;
      added.push(attachment.attachment_id.clone());
      instance.attachment_ids.insert(attachment.attachment_id);
    }
    Ok(added)
  }
}

/// Remove the file with `value_id` from a field. Empty fields are dropped.
fn remove_file(data: &mut BTreeMap<String, Vec<Value>>, field: &str, value_id: &str) -> bool {
  let Some(values) = data.get_mut(field) else {
    return false;
  };
  let before = values.len();
  values.retain(|v| v.as_file().and_then(|f| f.id.as_deref()) != Some(value_id));
  let removed = values.len() != before;
  if values.is_empty() {
    data.remove(field);
  }
  removed
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;
  use std::sync::atomic::{AtomicBool, Ordering};

  use async_trait::async_trait;
  use casework_engine::InMemoryEngine;
  use casework_model::{
    ActionType, Entity, Page, PageRequest, Role, SearchCriteria, Task, TaskStatus, User,
  };
  use casework_store::InMemoryStore;
  use tokio::sync::mpsc;

  use super::*;
  use crate::command::CommandFactory;
  use crate::events::ChannelNotifier;
  use crate::mediator::Rejection;

  const DEMONSTRATION: &str = include_str!("../../../test-fixtures/demonstration.json");

  struct Harness {
    store: Arc<InMemoryStore>,
    engine: Arc<InMemoryEngine>,
    executor: CommandExecutor,
    process: ProcessDef,
    deployment: DeploymentDef,
  }

  fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let engine = Arc::new(InMemoryEngine::new());
    let executor = CommandExecutor::new(store.clone(), engine.clone());
    let process = ProcessDef::from_json(DEMONSTRATION).unwrap();
    let deployment = process.active_deployment().unwrap().clone();
    Harness {
      store,
      engine,
      executor,
      process,
      deployment,
    }
  }

  impl Harness {
    fn factory(&self, principal: Principal) -> CommandFactory {
      CommandFactory::new(principal, self.process.clone(), self.deployment.clone())
    }

    async fn seed(&self) -> ProcessInstance {
      let mut instance = case();
      instance.version = self.store.save_instance(&instance).await.unwrap();
      instance
    }

    async fn stored(&self) -> ProcessInstance {
      self.store.find_instance("case-1").await.unwrap().unwrap()
    }
  }

  fn case() -> ProcessInstance {
    let now = Utc::now();
    let mut task = Task::new("t1", "review");
    task.candidate_assignee_ids = ["alice", "bob"].iter().map(|s| s.to_string()).collect();
    ProcessInstance {
      process_instance_id: "case-1".to_string(),
      process_definition_key: "Demonstration".to_string(),
      process_definition_label: "Demonstration Process".to_string(),
      process_instance_label: "Jane Doe (100000)".to_string(),
      engine_process_instance_id: None,
      deployment_id: "1".to_string(),
      activity_key: Some("review".to_string()),
      process_status: ProcessStatus::Open,
      application_status: Some("Submitted".to_string()),
      application_status_explanation: None,
      previous_application_status: None,
      data: BTreeMap::new(),
      restricted_data: BTreeMap::new(),
      attachment_ids: BTreeSet::new(),
      attachments: Vec::new(),
      tasks: vec![task],
      initiator_id: Some("ivan".to_string()),
      keywords: BTreeSet::new(),
      start_time: now,
      end_time: None,
      last_modified_time: now,
      deleted: false,
      version: 0,
    }
  }

  fn validation(pairs: &[(&str, &str)]) -> Validation {
    Validation {
      process_definition_key: "Demonstration".to_string(),
      activity_key: "submit".to_string(),
      action: ActionType::Create,
      request_id: None,
      task_id: None,
      process_instance_label: None,
      submitter_id: None,
      data: pairs
        .iter()
        .map(|(k, v)| (k.to_string(), vec![Value::text(*v)]))
        .collect(),
      restricted_data: BTreeMap::new(),
      attachments: Vec::new(),
      messages: Vec::new(),
    }
  }

  fn ivan() -> Principal {
    Principal::from(Entity::user("ivan").with_role("Demonstration", Role::Initiator))
  }

  fn overseer() -> Principal {
    Principal::from(Entity::user("olga").with_role("Demonstration", Role::Overseer))
  }

  #[tokio::test]
  async fn test_create_renders_label_and_starts_engine() {
    let h = harness();
    let command = h
      .factory(ivan())
      .create(validation(&[("employeeName", "Jane Doe"), ("budgetNumber", "100000")]))
      .unwrap();

    let result = h.executor.execute(command).await.unwrap();
    let instance = result.instance;

    assert_eq!(instance.process_instance_label, "Jane Doe (100000)");
    assert_eq!(instance.process_status, ProcessStatus::Open);
    assert_eq!(instance.application_status.as_deref(), Some("Submitted"));
    assert_eq!(instance.activity_key.as_deref(), Some("submit"));
    assert_eq!(instance.initiator_id.as_deref(), Some("ivan"));
    assert!(instance.keywords.contains("jane"));

    let engine_id = instance.engine_process_instance_id.clone().unwrap();
    assert_eq!(h.engine.status(&engine_id).await, Some(ProcessStatus::Open));
    let stored = h
      .store
      .find_instance(&instance.process_instance_id)
      .await
      .unwrap();
    assert_eq!(stored, Some(instance));
  }

  #[tokio::test]
  async fn test_create_without_role_is_forbidden() {
    let h = harness();
    let command = h
      .factory(Principal::from(Entity::user("nobody")))
      .create(validation(&[("employeeName", "Jane")]))
      .unwrap();

    let result = h.executor.execute(command).await;
    assert!(matches!(
      result,
      Err(CaseError::Forbidden { code: ErrorCode::InsufficientPermission, .. })
    ));
  }

  #[tokio::test]
  async fn test_cancel_by_initiator() {
    let h = harness();
    let instance = h.seed().await;
    let command = h
      .factory(ivan())
      .with_instance(instance)
      .cancellation(Some("Duplicate".to_string()))
      .unwrap();

    let result = h.executor.execute(command).await.unwrap();
    let operation = result.operation.unwrap();
    assert_eq!(operation.previous_status, ProcessStatus::Open);
    assert_eq!(operation.new_status, ProcessStatus::Cancelled);

    let stored = h.stored().await;
    assert_eq!(stored.process_status, ProcessStatus::Cancelled);
    assert_eq!(stored.application_status.as_deref(), Some("Cancelled by request"));
    assert_eq!(stored.tasks[0].task_status, TaskStatus::Cancelled);
  }

  #[tokio::test]
  async fn test_cancel_by_stranger_is_forbidden() {
    let h = harness();
    let instance = h.seed().await;

    for principal in [Principal::Anonymous, Principal::from(Entity::user("alice"))] {
      let command = h
        .factory(principal)
        .with_instance(instance.clone())
        .cancellation(None)
        .unwrap();
      let result = h.executor.execute(command).await;
      assert!(matches!(
        result,
        Err(CaseError::Forbidden { code: ErrorCode::InsufficientPermission, .. })
      ));
    }
    assert_eq!(h.stored().await.process_status, ProcessStatus::Open);
  }

  #[tokio::test]
  async fn test_engine_refusal_is_conflict_and_leaves_status() {
    let h = harness();
    let instance = h.seed().await;
    // another worker cancelled the case in the engine first
    h.engine.set_status("case-1", ProcessStatus::Cancelled).await;

    let command = h
      .factory(overseer())
      .with_instance(instance)
      .suspension(None)
      .unwrap();
    let result = h.executor.execute(command).await;

    assert!(matches!(
      result,
      Err(CaseError::Conflict { code: ErrorCode::InvalidProcessStatus, .. })
    ));
    assert_eq!(h.stored().await.process_status, ProcessStatus::Open);
  }

  #[tokio::test]
  async fn test_unavailable_engine_is_internal_failure() {
    let h = harness();
    let instance = h.seed().await;
    h.engine.set_unavailable(true);

    let command = h
      .factory(overseer())
      .with_instance(instance)
      .suspension(None)
      .unwrap();
    assert!(matches!(
      h.executor.execute(command).await,
      Err(CaseError::InternalServerError { code: ErrorCode::EngineFailure, .. })
    ));
    assert_eq!(h.stored().await.process_status, ProcessStatus::Open);
  }

  #[tokio::test]
  async fn test_local_precheck_uses_fresh_state() {
    let h = harness();
    let stale = h.seed().await;
    let mut suspended = stale.clone();
    suspended.process_status = ProcessStatus::Suspended;
    h.store.save_instance(&suspended).await.unwrap();

    let command = h
      .factory(overseer())
      .with_instance(stale)
      .suspension(None)
      .unwrap();
    let result = h.executor.execute(command).await;

    assert!(matches!(result, Err(CaseError::Conflict { .. })));
  }

  #[tokio::test]
  async fn test_deleted_and_missing_instances() {
    let h = harness();
    let mut instance = h.seed().await;
    instance.deleted = true;
    h.store.save_instance(&instance).await.unwrap();

    let command = h
      .factory(ivan())
      .with_instance(instance.clone())
      .cancellation(None)
      .unwrap();
    assert!(matches!(
      h.executor.execute(command).await,
      Err(CaseError::Gone { code: ErrorCode::InstanceDeleted, .. })
    ));

    instance.process_instance_id = "nope".to_string();
    let command = h
      .factory(ivan())
      .with_instance(instance)
      .cancellation(None)
      .unwrap();
    assert!(matches!(
      h.executor.execute(command).await,
      Err(CaseError::NotFound { code: ErrorCode::InstanceDoesNotExist, .. })
    ));
  }

  #[tokio::test]
  async fn test_assignment_to_candidates() {
    let h = harness();
    let instance = h.seed().await;

    let carol = h
      .factory(overseer())
      .with_instance(instance.clone())
      .assignment("t1", Some(User::new("carol", "Carol")))
      .unwrap();
    assert!(matches!(
      h.executor.execute(carol).await,
      Err(CaseError::Forbidden { code: ErrorCode::InvalidAssignment, .. })
    ));

    let alice = h
      .factory(overseer())
      .with_instance(instance)
      .assignment("t1", Some(User::new("alice", "Alice")))
      .unwrap();
    h.executor.execute(alice).await.unwrap();

    assert_eq!(h.stored().await.tasks[0].assignee_id.as_deref(), Some("alice"));
    assert_eq!(h.engine.assignee("t1").await.as_deref(), Some("alice"));
  }

  #[tokio::test]
  async fn test_closed_task_refuses_assignment() {
    let h = harness();
    let instance = h.seed().await;
    h.engine.close_task("t1").await;

    let command = h
      .factory(overseer())
      .with_instance(instance)
      .assignment("t1", Some(User::new("bob", "Bob")))
      .unwrap();
    assert!(matches!(
      h.executor.execute(command).await,
      Err(CaseError::Forbidden { code: ErrorCode::InvalidAssignment, .. })
    ));
  }

  #[tokio::test]
  async fn test_attach_and_detach() {
    let h = harness();
    let instance = h.seed().await;
    let alice = Principal::from(Entity::user("alice"));

    let mut attach = validation(&[]);
    attach.attachments.push(File {
      description: Some("See notes".to_string()),
      ..File::new("comment")
    });
    let command = h
      .factory(alice.clone())
      .with_instance(instance)
      .attachment(attach)
      .unwrap();
    let attached = h.executor.execute(command).await.unwrap().instance;
    assert_eq!(attached.attachment_ids.len(), 1);

    let id = attached.attachment_ids.iter().next().unwrap().clone();
    let stored = h.store.find_attachments(&[id.clone()]).await.unwrap();
    assert_eq!(stored[0].user_id.as_deref(), Some("alice"));

    let command = h
      .factory(alice.clone())
      .with_instance(attached.clone())
      .detachment(&id)
      .unwrap();
    let detached = h.executor.execute(command).await.unwrap().instance;
    assert!(detached.attachment_ids.is_empty());
    assert!(h.store.find_attachments(&[id.clone()]).await.unwrap().is_empty());

    let command = h
      .factory(alice)
      .with_instance(detached)
      .detachment(&id)
      .unwrap();
    assert!(matches!(
      h.executor.execute(command).await,
      Err(CaseError::NotFound { code: ErrorCode::AttachmentDoesNotExist, .. })
    ));
  }

  #[tokio::test]
  async fn test_update_and_remove_value() {
    let h = harness();
    let instance = h.seed().await;
    let system = Principal::from(Entity::system("engine"));

    let mut update = validation(&[]);
    update.data.insert(
      "supportingDocument".to_string(),
      vec![Value::File(File {
        id: Some("f1".to_string()),
        ..File::new("budget.pdf")
      })],
    );
    let command = h
      .factory(system.clone())
      .with_instance(instance)
      .update_value(update)
      .unwrap();
    let updated = h.executor.execute(command).await.unwrap().instance;
    assert_eq!(updated.values("supportingDocument").len(), 1);

    let command = h
      .factory(system.clone())
      .with_instance(updated.clone())
      .remove_value("supportingDocument", "f2")
      .unwrap();
    assert!(matches!(
      h.executor.execute(command).await,
      Err(CaseError::NotFound { code: ErrorCode::ValueDoesNotExist, .. })
    ));

    let command = h
      .factory(system)
      .with_instance(updated)
      .remove_value("supportingDocument", "f1")
      .unwrap();
    let removed = h.executor.execute(command).await.unwrap().instance;
    assert!(!removed.data.contains_key("supportingDocument"));
  }

  #[tokio::test]
  async fn test_completion_is_system_only() {
    let h = harness();
    let instance = h.seed().await;

    let command = h
      .factory(overseer())
      .with_instance(instance.clone())
      .completion()
      .unwrap();
    assert!(h.executor.execute(command).await.is_err());

    let command = h
      .factory(Principal::from(Entity::system("engine")))
      .with_instance(instance)
      .completion()
      .unwrap();
    h.executor.execute(command).await.unwrap();

    let stored = h.stored().await;
    assert_eq!(stored.process_status, ProcessStatus::Complete);
    assert_eq!(stored.application_status.as_deref(), Some("Approved"));
    assert!(stored.end_time.is_some());
  }

  struct RejectAll;

  impl CommandMediator for RejectAll {
    fn mediate(&self, _command: Command) -> Mediation {
      Mediation::Reject(Rejection::new(ErrorCode::CommandRejected).with_reason("maintenance"))
    }
  }

  #[tokio::test]
  async fn test_custom_mediator_and_events() {
    let store = Arc::new(InMemoryStore::new());
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let h = harness();
    let instance = h.seed().await;
    store.save_instance(&instance).await.unwrap();

    let executor = CommandExecutor::new(store, Arc::new(InMemoryEngine::new()))
      .with_mediator(Arc::new(RejectAll))
      .with_notifier(Arc::new(ChannelNotifier::new(sender)));
    let command = h
      .factory(ivan())
      .with_instance(instance)
      .cancellation(None)
      .unwrap();

    let result = executor.execute(command).await;
    assert_eq!(
      result.unwrap_err(),
      CaseError::Forbidden {
        code: ErrorCode::CommandRejected,
        context: Some("maintenance".to_string()),
      }
    );

    match receiver.recv().await.unwrap() {
      CommandEvent::Failed {
        kind,
        process_instance_id,
        code,
        ..
      } => {
        assert_eq!(kind, CommandKind::Cancellation);
        assert_eq!(process_instance_id.as_deref(), Some("case-1"));
        assert_eq!(code, ErrorCode::CommandRejected);
      }
      other => panic!("unexpected event: {:?}", other),
    }
  }

  /// Commits a cancellation right after the first read of an instance, the
  /// way a concurrent worker would.
  #[derive(Default)]
  struct RacingStore {
    inner: InMemoryStore,
    raced: AtomicBool,
    saved_attachments: Mutex<Vec<String>>,
  }

  #[async_trait]
  impl Store for RacingStore {
    async fn find_instance(
      &self,
      process_instance_id: &str,
    ) -> Result<Option<ProcessInstance>, casework_store::Error> {
      let found = self.inner.find_instance(process_instance_id).await?;
      if let Some(current) = &found
        && !self.raced.swap(true, Ordering::SeqCst)
      {
        let mut cancelled = current.clone();
        cancelled.process_status = ProcessStatus::Cancelled;
        self.inner.save_instance(&cancelled).await?;
      }
      Ok(found)
    }

    async fn find_instances(
      &self,
      ids: &[String],
    ) -> Result<Vec<ProcessInstance>, casework_store::Error> {
      self.inner.find_instances(ids).await
    }

    async fn find_instances_by_criteria(
      &self,
      criteria: &SearchCriteria,
      page: PageRequest,
    ) -> Result<Page<ProcessInstance>, casework_store::Error> {
      self.inner.find_instances_by_criteria(criteria, page).await
    }

    async fn find_instance_by_task(
      &self,
      process_definition_key: &str,
      task_instance_id: &str,
    ) -> Result<Option<ProcessInstance>, casework_store::Error> {
      self
        .inner
        .find_instance_by_task(process_definition_key, task_instance_id)
        .await
    }

    async fn save_instance(&self, instance: &ProcessInstance) -> Result<u64, casework_store::Error> {
      self.inner.save_instance(instance).await
    }

    async fn find_attachments(&self, ids: &[String]) -> Result<Vec<Attachment>, casework_store::Error> {
      self.inner.find_attachments(ids).await
    }

    async fn save_attachment(&self, attachment: &Attachment) -> Result<(), casework_store::Error> {
      self
        .saved_attachments
        .lock()
        .unwrap()
        .push(attachment.attachment_id.clone());
      self.inner.save_attachment(attachment).await
    }

    async fn delete_attachment(&self, attachment_id: &str) -> Result<(), casework_store::Error> {
      self.inner.delete_attachment(attachment_id).await
    }
  }

  async fn racing_store() -> Arc<RacingStore> {
    let store = Arc::new(RacingStore::default());
    store.inner.save_instance(&case()).await.unwrap();
    store
  }

  #[tokio::test]
  async fn test_concurrent_cancel_is_not_overwritten_by_field_update() {
    let h = harness();
    let store = racing_store().await;
    let executor = CommandExecutor::new(store.clone(), h.engine.clone());

    let command = h
      .factory(Principal::from(Entity::system("engine")))
      .with_instance(case())
      .update_value(validation(&[("employeeName", "John Roe")]))
      .unwrap();
    let result = executor.execute(command).await;

    assert!(matches!(
      result,
      Err(CaseError::Conflict { code: ErrorCode::ConcurrentModification, .. })
    ));
    let stored = store.inner.find_instance("case-1").await.unwrap().unwrap();
    assert_eq!(stored.process_status, ProcessStatus::Cancelled);
    assert!(stored.values("employeeName").is_empty());
  }

  #[tokio::test]
  async fn test_conflicting_attach_drops_its_attachment_records() {
    let h = harness();
    let store = racing_store().await;
    let executor = CommandExecutor::new(store.clone(), h.engine.clone());

    let mut attach = validation(&[]);
    attach.attachments.push(File::new("comment"));
    let command = h
      .factory(Principal::from(Entity::user("alice")))
      .with_instance(case())
      .attachment(attach)
      .unwrap();
    let result = executor.execute(command).await;

    assert!(matches!(
      result,
      Err(CaseError::Conflict { code: ErrorCode::ConcurrentModification, .. })
    ));
    let stored = store.inner.find_instance("case-1").await.unwrap().unwrap();
    assert!(stored.attachment_ids.is_empty());
    let saved = store.saved_attachments.lock().unwrap().clone();
    assert_eq!(saved.len(), 1);
    assert!(store.inner.find_attachments(&saved).await.unwrap().is_empty());
  }
}
