//! Authorization policy, one function per command kind.
//!
//! Each function answers for a principal acting on a process (and instance,
//! through an optional task). None of them touch the store or the engine.

use casework_config::ProcessDef;
use casework_model::{ErrorCode, Principal, ProcessInstance, Role, Task, User};

use crate::command::{Action, Command};

const ANY_ROLE: &[Role] = &[
  Role::Initiator,
  Role::User,
  Role::Overseer,
  Role::Admin,
  Role::Superuser,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  Allowed,
  Denied(ErrorCode),
}

impl Decision {
  pub fn is_allowed(self) -> bool {
    matches!(self, Self::Allowed)
  }

  fn allow_if(condition: bool, otherwise: ErrorCode) -> Self {
    if condition {
      Self::Allowed
    } else {
      Self::Denied(otherwise)
    }
  }
}

/// Who is acting, on what.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
  pub principal: &'a Principal,
  pub process: &'a ProcessDef,
  pub instance: Option<&'a ProcessInstance>,
  /// The task the principal acts through. When set, only this task counts.
  pub task: Option<&'a Task>,
}

impl<'a> PolicyContext<'a> {
  pub fn of(command: &'a Command) -> Self {
    Self {
      principal: &command.principal,
      process: &command.process,
      instance: command.instance.as_ref(),
      task: command.task.as_ref(),
    }
  }

  fn oversees(&self) -> bool {
    self
      .principal
      .has_role(&self.process.process_definition_key, Role::OVERSIGHT)
  }

  fn holds_task(&self, active_only: bool) -> bool {
    let (Some(user_id), Some(instance)) = (self.principal.entity_id(), self.instance) else {
      return false;
    };
    instance.tasks.iter().any(|t| {
      t.is_held_by(user_id)
        && (!active_only || t.is_active())
        && self
          .task
          .is_none_or(|chosen| chosen.task_instance_id == t.task_instance_id)
    })
  }
}

/// The decision for a command, dispatched on its kind.
pub fn authorize(command: &Command) -> Decision {
  let ctx = PolicyContext::of(command);
  match &command.action {
    Action::CreateInstance { .. } => may_create(&ctx),
    Action::Assignment {
      task_instance_id,
      assignee,
    } => may_assign(&ctx, task_instance_id, assignee.as_ref()),
    Action::Activation => may_activate(&ctx),
    Action::Suspension { .. } => may_suspend(&ctx),
    Action::Cancellation { .. } => may_cancel(&ctx),
    Action::UpdateStatus { .. } => may_update_status(&ctx),
    Action::Completion => may_complete(&ctx),
    Action::Attachment { .. } | Action::Detachment { .. } => may_attach(&ctx),
    Action::UpdateValue { .. } | Action::RemoveValue { .. } => may_update_value(&ctx),
  }
}

pub fn may_create(ctx: &PolicyContext<'_>) -> Decision {
  if ctx.principal.is_anonymous() {
    return Decision::allow_if(
      ctx.process.allow_anonymous_submission,
      ErrorCode::InsufficientPermission,
    );
  }
  Decision::allow_if(
    ctx.principal.is_system()
      || ctx.process.allow_anonymous_submission
      || ctx
        .principal
        .has_role(&ctx.process.process_definition_key, ANY_ROLE),
    ErrorCode::InsufficientPermission,
  )
}

/// Initiator or elevated role. The system gets no exemption.
pub fn may_cancel(ctx: &PolicyContext<'_>) -> Decision {
  if ctx.principal.is_anonymous() {
    return Decision::Denied(ErrorCode::InsufficientPermission);
  }
  let initiator = ctx.instance.is_some_and(|i| i.is_initiator(ctx.principal));
  Decision::allow_if(
    initiator
      || ctx
        .principal
        .has_role(&ctx.process.process_definition_key, Role::ELEVATED),
    ErrorCode::InsufficientPermission,
  )
}

pub fn may_activate(ctx: &PolicyContext<'_>) -> Decision {
  if ctx.principal.is_anonymous() {
    return Decision::Denied(ErrorCode::InsufficientPermission);
  }
  Decision::allow_if(
    ctx.principal.is_system() || ctx.oversees() || ctx.holds_task(false),
    ErrorCode::TaskRequired,
  )
}

pub fn may_suspend(ctx: &PolicyContext<'_>) -> Decision {
  if ctx.principal.is_anonymous() {
    return Decision::Denied(ErrorCode::InsufficientPermission);
  }
  Decision::allow_if(
    ctx.principal.is_system() || ctx.oversees() || ctx.holds_task(true),
    ErrorCode::ActiveTaskRequired,
  )
}

pub fn may_update_status(ctx: &PolicyContext<'_>) -> Decision {
  Decision::allow_if(
    ctx.principal.is_system() || ctx.oversees(),
    ErrorCode::InsufficientPermission,
  )
}

pub fn may_complete(ctx: &PolicyContext<'_>) -> Decision {
  Decision::allow_if(ctx.principal.is_system(), ErrorCode::InsufficientPermission)
}

/// Permission to assign at all, then the candidate restriction on the assignee.
pub fn may_assign(
  ctx: &PolicyContext<'_>,
  task_instance_id: &str,
  assignee: Option<&User>,
) -> Decision {
  if ctx.principal.is_anonymous() {
    return Decision::Denied(ErrorCode::InsufficientPermission);
  }
  if !(ctx.principal.is_system() || ctx.oversees() || ctx.holds_task(false)) {
    return Decision::Denied(ErrorCode::TaskRequired);
  }

  let (true, Some(assignee)) = (ctx.process.assignment_restricted_to_candidates, assignee) else {
    return Decision::Allowed;
  };
  let candidate = ctx
    .instance
    .and_then(|i| i.task(task_instance_id))
    .is_some_and(|t| t.candidate_assignee_ids.contains(&assignee.user_id));
  Decision::allow_if(candidate, ErrorCode::InvalidAssignment)
}

pub fn may_attach(ctx: &PolicyContext<'_>) -> Decision {
  Decision::allow_if(
    ctx.principal.is_system() || ctx.holds_task(true),
    ErrorCode::ActiveTaskRequired,
  )
}

pub fn may_update_value(ctx: &PolicyContext<'_>) -> Decision {
  Decision::allow_if(
    ctx.principal.is_system() || ctx.holds_task(true),
    ErrorCode::ActiveTaskRequired,
  )
}
