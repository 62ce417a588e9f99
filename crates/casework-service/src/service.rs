use std::collections::BTreeSet;
use std::sync::Arc;

use casework_command::{Command, CommandExecutor, CommandFactory, CommandNotifier};
use casework_config::{DeploymentDef, ProcessDef};
use casework_content::ContentStore;
use casework_engine::ProcessEngineFacade;
use casework_model::{
  ActionType, CaseError, ErrorCode, Page, PageRequest, Principal, ProcessInstance, ProcessStatus,
  Role, Task, User, Value,
};
use casework_store::{ProcessRepository, Store};
use casework_validation::{
  IdentityService, RawSubmission, Sanitizer, SubmissionDecoder, SubmissionTemplate, Validation,
  Validator,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::{ServiceConfig, SubmissionMode};
use crate::search::parse_criteria;
use crate::tasks::allowed_task;

/// The collaborators a service is wired from.
pub struct Collaborators {
  pub processes: Arc<dyn ProcessRepository>,
  pub store: Arc<dyn Store>,
  pub facade: Arc<dyn ProcessEngineFacade>,
  pub identity: Arc<dyn IdentityService>,
  pub content: Arc<dyn ContentStore>,
  pub sanitizer: Arc<dyn Sanitizer>,
}

/// The outcome of an operation that validates a submission first.
#[derive(Debug, Clone)]
pub enum Submitted<T> {
  Accepted(T),
  /// The validation failed. Only returned in interactive mode.
  Rejected(Validation),
}

impl<T> Submitted<T> {
  pub fn accepted(self) -> Option<T> {
    match self {
      Self::Accepted(value) => Some(value),
      Self::Rejected(_) => None,
    }
  }
}

/// An accepted validation and the uploads it references.
struct Staged {
  validation: Validation,
  uploads: Vec<String>,
}

/// A single-field update. `location` points at the stored file for file fields.
#[derive(Debug, Clone)]
pub struct FieldUpdate {
  pub instance: ProcessInstance,
  pub location: Option<String>,
}

/// A partial instance used by [`ProcessInstanceService::update`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstancePatch {
  #[serde(default, alias = "processStatus")]
  pub process_status: Option<String>,
  #[serde(default, alias = "applicationStatus")]
  pub application_status: Option<String>,
  #[serde(default, alias = "applicationStatusExplanation")]
  pub application_status_explanation: Option<String>,
}

/// Orchestrates reads, lifecycle transitions, attachments and field updates.
pub struct ProcessInstanceService {
  config: ServiceConfig,
  processes: Arc<dyn ProcessRepository>,
  store: Arc<dyn Store>,
  identity: Arc<dyn IdentityService>,
  sanitizer: Arc<dyn Sanitizer>,
  decoder: SubmissionDecoder,
  validator: Validator,
  executor: CommandExecutor,
}

impl ProcessInstanceService {
  pub fn new(config: ServiceConfig, collaborators: Collaborators) -> Self {
    let Collaborators {
      processes,
      store,
      facade,
      identity,
      content,
      sanitizer,
    } = collaborators;

    Self {
      config,
      decoder: SubmissionDecoder::new(content),
      validator: Validator::new(sanitizer.clone(), identity.clone()),
      executor: CommandExecutor::new(store.clone(), facade),
      processes,
      store,
      identity,
      sanitizer,
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn CommandNotifier>) -> Self {
    self.executor = self.executor.with_notifier(notifier);
    self
  }

  pub fn config(&self) -> &ServiceConfig {
    &self.config
  }

  /// A process and its active deployment.
  pub async fn read_process(&self, raw_key: &str) -> Result<(ProcessDef, DeploymentDef), CaseError> {
    let process = self.find_process(raw_key).await?;
    let deployment = process.active_deployment().cloned().ok_or_else(|| {
      CaseError::internal(ErrorCode::ProcessIsMisconfigured)
        .with_context(format!("no active deployment for {}", process.process_definition_key))
    })?;
    Ok((process, deployment))
  }

  /// Processes the principal holds any role on, ordered by key.
  pub async fn read_processes(&self, principal: &Principal) -> Result<Vec<ProcessDef>, CaseError> {
    let keys = principal.process_definition_keys(&[
      Role::Initiator,
      Role::User,
      Role::Overseer,
      Role::Admin,
      Role::Superuser,
    ]);
    Ok(self.processes.find_processes(&keys).await?)
  }

  /// Read one instance of a process.
  ///
  /// `full` hydrates attachment metadata. Restricted data is only shown to
  /// overseers and the system.
  #[instrument(name = "instance_read", skip(self, principal))]
  pub async fn read(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
    full: bool,
  ) -> Result<ProcessInstance, CaseError> {
    let instance = self.find_instance(raw_key, raw_id).await?;
    self.present(principal, instance, full).await
  }

  /// Validate a submission against the create-time template and start a new instance.
  #[instrument(name = "instance_create", skip(self, principal, raw))]
  pub async fn create(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw: RawSubmission,
  ) -> Result<Submitted<ProcessInstance>, CaseError> {
    let (process, deployment) = self.read_process(raw_key).await?;
    let template = SubmissionTemplate::for_activity(&process, &deployment, None)?;
    let staged = match self
      .stage(principal, &template, raw, ActionType::Create)
      .await?
    {
      Submitted::Accepted(staged) => staged,
      Submitted::Rejected(validation) => return Ok(Submitted::Rejected(validation)),
    };

    let factory = CommandFactory::new(principal.clone(), process, deployment);
    let created = self
      .run_staged(principal, staged, |validation| factory.create(validation))
      .await?;
    info!(process_instance_id = %created.process_instance_id, "instance_submitted");
    Ok(Submitted::Accepted(created))
  }

  /// Dry run: validate a submission against the instance's (or the start) activity.
  pub async fn validate(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: Option<&str>,
    raw: RawSubmission,
  ) -> Result<Validation, CaseError> {
    let (process, deployment, instance) = match raw_id {
      Some(raw_id) => {
        let instance = self.find_instance(raw_key, raw_id).await?;
        let (process, deployment) = self.process_of(&instance).await?;
        (process, deployment, Some(instance))
      }
      None => {
        let (process, deployment) = self.read_process(raw_key).await?;
        (process, deployment, None)
      }
    };
    let template = SubmissionTemplate::for_activity(&process, &deployment, instance.as_ref())?;
    let (validation, uploads) = self
      .decode_and_validate(principal, &template, raw, ActionType::Validate)
      .await?;
    self.decoder.discard(&uploads).await;
    Ok(validation)
  }

  #[instrument(name = "instance_activate", skip(self, principal))]
  pub async fn activate(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
  ) -> Result<ProcessInstance, CaseError> {
    let (factory, _) = self.factory_for(principal, raw_key, raw_id).await?;
    self.run(principal, factory.activation()?).await
  }

  #[instrument(name = "instance_suspend", skip(self, principal, reason))]
  pub async fn suspend(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
    reason: Option<&str>,
  ) -> Result<ProcessInstance, CaseError> {
    let (factory, _) = self.factory_for(principal, raw_key, raw_id).await?;
    let reason = self.sanitizer.sanitize_opt(reason);
    self.run(principal, factory.suspension(reason)?).await
  }

  #[instrument(name = "instance_cancel", skip(self, principal, reason))]
  pub async fn cancel(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
    reason: Option<&str>,
  ) -> Result<ProcessInstance, CaseError> {
    let (factory, _) = self.factory_for(principal, raw_key, raw_id).await?;
    let reason = self.sanitizer.sanitize_opt(reason);
    self.run(principal, factory.cancellation(reason)?).await
  }

  /// Apply the transition a partial instance asks for.
  ///
  /// A process status different from the current one asks for that
  /// transition and wins over any application status in the same patch.
  /// Otherwise an application status asks for a status update. A patch
  /// asking for neither is `instance_cannot_be_modified`.
  #[instrument(name = "instance_update", skip(self, principal, patch))]
  pub async fn update(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
    patch: InstancePatch,
  ) -> Result<ProcessInstance, CaseError> {
    let (factory, current) = self.factory_for(principal, raw_key, raw_id).await?;
    let explanation = self
      .sanitizer
      .sanitize_opt(patch.application_status_explanation.as_deref());

    let desired = match self.sanitizer.sanitize_opt(patch.process_status.as_deref()) {
      Some(raw) => {
        let status = raw.parse::<ProcessStatus>().map_err(|e| {
          CaseError::bad_request(ErrorCode::InvalidProcessStatus).with_context(e)
        })?;
        if status == ProcessStatus::Complete {
          return Err(
            CaseError::bad_request(ErrorCode::InvalidProcessStatus)
              .with_context("completion is reserved for the engine"),
          );
        }
        Some(status).filter(|s| *s != current.process_status)
      }
      None => None,
    };
    let application_status = self
      .sanitizer
      .sanitize_opt(patch.application_status.as_deref());

    let command = match (desired, application_status) {
      (Some(ProcessStatus::Open), _) => factory.activation()?,
      (Some(ProcessStatus::Suspended), _) => factory.suspension(explanation)?,
      (Some(ProcessStatus::Cancelled), _) => factory.cancellation(explanation)?,
      (None, Some(status)) => factory.update_status(status, explanation)?,
      (Some(ProcessStatus::Complete), _) | (None, None) => {
        return Err(
          CaseError::bad_request(ErrorCode::InstanceCannotBeModified)
            .with_context("no status change requested"),
        );
      }
    };
    self.run(principal, command).await
  }

  /// Assign a task to a user, or unassign it with `None`.
  #[instrument(name = "instance_assign", skip(self, principal))]
  pub async fn assign(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
    raw_task_id: &str,
    raw_assignee_id: Option<&str>,
  ) -> Result<ProcessInstance, CaseError> {
    let (factory, instance) = self.factory_for(principal, raw_key, raw_id).await?;
    let task_id = self.sanitizer.sanitize(raw_task_id);
    if instance.task(&task_id).is_none() {
      return Err(CaseError::not_found(ErrorCode::TaskDoesNotExist).with_context(task_id));
    }

    let assignee = match self.sanitizer.sanitize_opt(raw_assignee_id) {
      Some(id) => Some(self.find_user(&id).await?),
      None => None,
    };
    self.run(principal, factory.assignment(&task_id, assignee)?).await
  }

  /// Attach comments and files to an instance.
  #[instrument(name = "instance_attach", skip(self, principal, raw))]
  pub async fn attach(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
    raw: RawSubmission,
  ) -> Result<Submitted<ProcessInstance>, CaseError> {
    let (factory, instance) = self.factory_for(principal, raw_key, raw_id).await?;
    let task = self.require_task(principal, &instance, true)?;
    let (process, deployment) = self.process_of(&instance).await?;

    let template = SubmissionTemplate::for_attachments(&process, &deployment, &instance)?;
    let staged = match self
      .stage(principal, &template, raw, ActionType::Attach)
      .await?
    {
      Submitted::Accepted(staged) => staged,
      Submitted::Rejected(validation) => return Ok(Submitted::Rejected(validation)),
    };

    let factory = factory.with_task(task);
    let instance = self
      .run_staged(principal, staged, |validation| factory.attachment(validation))
      .await?;
    Ok(Submitted::Accepted(instance))
  }

  #[instrument(name = "instance_detach", skip(self, principal))]
  pub async fn detach(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
    raw_attachment_id: &str,
  ) -> Result<ProcessInstance, CaseError> {
    let (factory, instance) = self.factory_for(principal, raw_key, raw_id).await?;
    let task = self.require_task(principal, &instance, true)?;
    let attachment_id = self.sanitizer.sanitize(raw_attachment_id);

    let command = factory.with_task(task).detachment(&attachment_id)?;
    self.run(principal, command).await
  }

  /// The stored values of one field.
  pub async fn read_values(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
    raw_field: &str,
  ) -> Result<Vec<Value>, CaseError> {
    let instance = self.find_instance(raw_key, raw_id).await?;
    let oversees = principal.has_role(&instance.process_definition_key, Role::OVERSIGHT);
    if !oversees {
      self.require_task(principal, &instance, false)?;
    }

    let field = self.sanitizer.sanitize(raw_field);
    let (process, deployment) = self.process_of(&instance).await?;
    SubmissionTemplate::for_field(&process, &deployment, &instance, &field)?;

    Ok(
      instance
        .data
        .get(&field)
        .or_else(|| instance.restricted_data.get(&field))
        .cloned()
        .unwrap_or_default(),
    )
  }

  /// Validate and store the values of one field.
  ///
  /// Only the named field is read from the submission.
  #[instrument(name = "instance_update_field", skip(self, principal, raw))]
  pub async fn update_field(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
    raw_field: &str,
    raw: RawSubmission,
  ) -> Result<Submitted<FieldUpdate>, CaseError> {
    let (factory, instance) = self.factory_for(principal, raw_key, raw_id).await?;
    let task = self.require_task(principal, &instance, true)?;
    let field = self.sanitizer.sanitize(raw_field);
    let (process, deployment) = self.process_of(&instance).await?;

    let template = SubmissionTemplate::for_field(&process, &deployment, &instance, &field)?;
    let staged = match self
      .stage(principal, &template, raw, ActionType::Update)
      .await?
    {
      Submitted::Accepted(staged) => staged,
      Submitted::Rejected(validation) => return Ok(Submitted::Rejected(validation)),
    };

    let location = staged
      .validation
      .data
      .get(&field)
      .or_else(|| staged.validation.restricted_data.get(&field))
      .and_then(|values| values.iter().find_map(Value::as_file))
      .and_then(|file| file.location.clone());

    let factory = factory.with_task(task);
    let instance = self
      .run_staged(principal, staged, |validation| factory.update_value(validation))
      .await?;
    Ok(Submitted::Accepted(FieldUpdate { instance, location }))
  }

  /// Remove one file value from a field.
  #[instrument(name = "instance_remove_value", skip(self, principal))]
  pub async fn remove_value(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
    raw_field: &str,
    raw_value_id: &str,
  ) -> Result<ProcessInstance, CaseError> {
    let (factory, instance) = self.factory_for(principal, raw_key, raw_id).await?;
    let task = self.require_task(principal, &instance, true)?;
    let field = self.sanitizer.sanitize(raw_field);
    let (process, deployment) = self.process_of(&instance).await?;
    SubmissionTemplate::for_field(&process, &deployment, &instance, &field)?;

    let value_id = self.sanitizer.sanitize(raw_value_id);
    let command = factory.with_task(task).remove_value(&field, &value_id)?;
    self.run(principal, command).await
  }

  /// The instance of a process holding a task.
  pub async fn find_by_task_id(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_task_id: &str,
  ) -> Result<ProcessInstance, CaseError> {
    let key = self.sanitizer.sanitize(raw_key);
    let task_id = self.sanitizer.sanitize(raw_task_id);
    let instance = self
      .store
      .find_instance_by_task(&key, &task_id)
      .await?
      .ok_or_else(|| CaseError::not_found(ErrorCode::TaskDoesNotExist).with_context(task_id))?;
    if instance.deleted {
      return Err(
        CaseError::gone(ErrorCode::InstanceDeleted).with_context(instance.process_instance_id),
      );
    }
    self.present(principal, instance, false).await
  }

  /// Mark an instance complete once the engine reports it finished. System only.
  #[instrument(name = "instance_complete", skip(self, principal))]
  pub async fn complete(
    &self,
    principal: &Principal,
    raw_id: &str,
  ) -> Result<ProcessInstance, CaseError> {
    let id = self.sanitizer.sanitize(raw_id);
    let instance = self.store.find_instance(&id).await?.ok_or_else(|| {
      CaseError::not_found(ErrorCode::InstanceDoesNotExist).with_context(id.clone())
    })?;
    let (factory, _) = self
      .factory_for(principal, &instance.process_definition_key, &id)
      .await?;
    self.run(principal, factory.completion()?).await
  }

  /// Search instances across the processes the principal oversees.
  ///
  /// A principal overseeing nothing gets an empty page, whatever the filters.
  #[instrument(name = "instance_search", skip_all)]
  pub async fn search(
    &self,
    principal: &Principal,
    params: &[(String, String)],
  ) -> Result<Page<ProcessInstance>, CaseError> {
    let (mut criteria, page) =
      parse_criteria(params, self.sanitizer.as_ref(), self.config.max_results)?;

    let authorized = principal.process_definition_keys(Role::OVERSIGHT);
    let keys = if criteria.process_definition_keys.is_empty() {
      authorized
    } else {
      authorized
        .intersection(&criteria.process_definition_keys)
        .cloned()
        .collect()
    };
    if keys.is_empty() {
      debug!("no authorized process definitions");
      return Ok(Page::empty(page));
    }
    criteria.process_definition_keys = keys;

    let results = self.store.find_instances_by_criteria(&criteria, page).await?;
    Ok(results.map(|i| i.public_view()))
  }

  /// Every instance of exactly one overseen process matching the filters.
  ///
  /// A principal overseeing nothing gets nothing. Otherwise the filters must
  /// narrow the overseen processes to exactly one.
  #[instrument(name = "instance_export", skip_all)]
  pub async fn export(
    &self,
    principal: &Principal,
    params: &[(String, String)],
  ) -> Result<Vec<ProcessInstance>, CaseError> {
    let (mut criteria, _) = parse_criteria(params, self.sanitizer.as_ref(), self.config.max_results)?;

    let authorized = principal.process_definition_keys(Role::OVERSIGHT);
    if authorized.is_empty() {
      return Ok(Vec::new());
    }
    let keys: BTreeSet<String> = if criteria.process_definition_keys.is_empty() {
      authorized
    } else {
      authorized
        .intersection(&criteria.process_definition_keys)
        .cloned()
        .collect()
    };
    if keys.len() != 1 {
      return Err(
        CaseError::bad_request(ErrorCode::InvalidSearchCriteria)
          .with_context("export needs exactly one process definition"),
      );
    }
    criteria.process_definition_keys = keys;

    let max_results = self.config.max_results.max(1);
    let mut exported = Vec::new();
    loop {
      let page = PageRequest::new(exported.len(), max_results);
      let results = self.store.find_instances_by_criteria(&criteria, page).await?;
      let fetched = results.items.len();
      exported.extend(results.items);
      if fetched == 0 || exported.len() >= results.total {
        break;
      }
    }
    debug!(count = exported.len(), "exported instances");
    Ok(exported)
  }

  async fn find_process(&self, raw_key: &str) -> Result<ProcessDef, CaseError> {
    let key = self.sanitizer.sanitize(raw_key);
    self
      .processes
      .find_process(&key)
      .await?
      .ok_or_else(|| CaseError::not_found(ErrorCode::ProcessDoesNotExist).with_context(key))
  }

  /// The process and the deployment an instance was started under.
  async fn process_of(
    &self,
    instance: &ProcessInstance,
  ) -> Result<(ProcessDef, DeploymentDef), CaseError> {
    let process = self.find_process(&instance.process_definition_key).await?;
    let deployment = process
      .deployment(&instance.deployment_id)
      .cloned()
      .ok_or_else(|| {
        CaseError::internal(ErrorCode::ProcessIsMisconfigured).with_context(format!(
          "{} has no deployment {}",
          process.process_definition_key, instance.deployment_id
        ))
      })?;
    Ok((process, deployment))
  }

  /// Fails NotFound when absent or owned by another process, Gone when deleted.
  async fn find_instance(&self, raw_key: &str, raw_id: &str) -> Result<ProcessInstance, CaseError> {
    let key = self.sanitizer.sanitize(raw_key);
    let id = self.sanitizer.sanitize(raw_id);
    let instance = self
      .store
      .find_instance(&id)
      .await?
      .filter(|i| i.process_definition_key == key)
      .ok_or_else(|| CaseError::not_found(ErrorCode::InstanceDoesNotExist).with_context(id.clone()))?;
    if instance.deleted {
      return Err(CaseError::gone(ErrorCode::InstanceDeleted).with_context(id));
    }
    Ok(instance)
  }

  async fn factory_for(
    &self,
    principal: &Principal,
    raw_key: &str,
    raw_id: &str,
  ) -> Result<(CommandFactory, ProcessInstance), CaseError> {
    let instance = self.find_instance(raw_key, raw_id).await?;
    let (process, deployment) = self.process_of(&instance).await?;
    let factory =
      CommandFactory::new(principal.clone(), process, deployment).with_instance(instance.clone());
    Ok((factory, instance))
  }

  /// The principal's task on the instance. The system needs none.
  fn require_task(
    &self,
    principal: &Principal,
    instance: &ProcessInstance,
    limit_to_active: bool,
  ) -> Result<Option<Task>, CaseError> {
    let task = allowed_task(instance, principal, limit_to_active);
    if task.is_none() && !principal.is_system() {
      let code = if limit_to_active {
        ErrorCode::ActiveTaskRequired
      } else {
        ErrorCode::TaskRequired
      };
      return Err(CaseError::forbidden(code));
    }
    Ok(task)
  }

  async fn find_user(&self, user_id: &str) -> Result<User, CaseError> {
    self.identity.get_user(user_id).await.ok_or_else(|| {
      CaseError::forbidden(ErrorCode::InvalidAssignment)
        .with_context(format!("unknown user {}", user_id))
    })
  }

  /// The validation and every upload the decoder stored for it.
  async fn decode_and_validate(
    &self,
    principal: &Principal,
    template: &SubmissionTemplate,
    raw: RawSubmission,
    action: ActionType,
  ) -> Result<(Validation, Vec<String>), CaseError> {
    let submission = self
      .decoder
      .decode(raw, &template.process_definition_key, action, principal)
      .await?;
    let validation = self.validator.validate(&submission, template, principal).await;
    Ok((validation, submission.file_locations()))
  }

  /// Decode, validate and judge a submission.
  ///
  /// Uploads the accepted validation does not reference are discarded here;
  /// a rejected or failed submission discards all of them.
  async fn stage(
    &self,
    principal: &Principal,
    template: &SubmissionTemplate,
    raw: RawSubmission,
    action: ActionType,
  ) -> Result<Submitted<Staged>, CaseError> {
    let (validation, uploads) = self
      .decode_and_validate(principal, template, raw, action)
      .await?;

    let validation = match self.judge(validation) {
      Ok(Submitted::Accepted(validation)) => validation,
      Ok(Submitted::Rejected(validation)) => {
        self.decoder.discard(&uploads).await;
        return Ok(Submitted::Rejected(validation));
      }
      Err(e) => {
        self.decoder.discard(&uploads).await;
        return Err(e);
      }
    };

    let kept = validation.file_locations();
    let (kept_uploads, dropped): (Vec<String>, Vec<String>) =
      uploads.into_iter().partition(|l| kept.contains(l));
    if !dropped.is_empty() {
      debug!(count = dropped.len(), "discarding_undeclared_uploads");
      self.decoder.discard(&dropped).await;
    }
    Ok(Submitted::Accepted(Staged {
      validation,
      uploads: kept_uploads,
    }))
  }

  /// Build and run the command for a staged submission. Its uploads are
  /// discarded when the command fails.
  async fn run_staged(
    &self,
    principal: &Principal,
    staged: Staged,
    build: impl FnOnce(Validation) -> Result<Command, CaseError>,
  ) -> Result<ProcessInstance, CaseError> {
    let Staged { validation, uploads } = staged;
    let result = match build(validation) {
      Ok(command) => self.run(principal, command).await,
      Err(e) => Err(e),
    };
    if result.is_err() {
      self.decoder.discard(&uploads).await;
    }
    result
  }

  /// Interactive callers get a failed validation back; strict callers get an error.
  fn judge(&self, validation: Validation) -> Result<Submitted<Validation>, CaseError> {
    if !validation.has_errors() {
      return Ok(Submitted::Accepted(validation));
    }
    match self.config.submission_mode {
      SubmissionMode::Interactive => Ok(Submitted::Rejected(validation)),
      SubmissionMode::Strict => validation.require_valid().map(Submitted::Accepted),
    }
  }

  /// Execute, then read back the full instance.
  async fn run(
    &self,
    principal: &Principal,
    command: Command,
  ) -> Result<ProcessInstance, CaseError> {
    let instance = self.executor.execute(command).await?.instance;
    self.present(principal, instance, true).await
  }

  async fn present(
    &self,
    principal: &Principal,
    mut instance: ProcessInstance,
    full: bool,
  ) -> Result<ProcessInstance, CaseError> {
    let privileged = principal.is_system()
      || principal.has_role(&instance.process_definition_key, Role::OVERSIGHT);
    if !privileged {
      instance.restricted_data.clear();
    }

    instance.attachments.clear();
    if full && !instance.attachment_ids.is_empty() {
      let ids: Vec<String> = instance.attachment_ids.iter().cloned().collect();
      instance.attachments = self.store.find_attachments(&ids).await?;
    }
    Ok(instance)
  }
}
