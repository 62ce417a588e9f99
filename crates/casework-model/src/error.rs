use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
  InsufficientPermission,
  TaskRequired,
  ActiveTaskRequired,
  InvalidAssignment,
  InvalidProcessStatus,
  InstanceCannotBeModified,
  InstanceDoesNotExist,
  InstanceDeleted,
  ProcessDoesNotExist,
  ProcessIsMisconfigured,
  TaskDoesNotExist,
  AttachmentDoesNotExist,
  FieldDoesNotExist,
  ValueDoesNotExist,
  InvalidSubmission,
  InvalidSearchCriteria,
  ValidationFailed,
  CommandRejected,
  ConcurrentModification,
  StorageFailure,
  EngineFailure,
}

impl ErrorCode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::InsufficientPermission => "insufficient_permission",
      Self::TaskRequired => "task_required",
      Self::ActiveTaskRequired => "active_task_required",
      Self::InvalidAssignment => "invalid_assignment",
      Self::InvalidProcessStatus => "invalid_process_status",
      Self::InstanceCannotBeModified => "instance_cannot_be_modified",
      Self::InstanceDoesNotExist => "instance_does_not_exist",
      Self::InstanceDeleted => "instance_deleted",
      Self::ProcessDoesNotExist => "process_does_not_exist",
      Self::ProcessIsMisconfigured => "process_is_misconfigured",
      Self::TaskDoesNotExist => "task_does_not_exist",
      Self::AttachmentDoesNotExist => "attachment_does_not_exist",
      Self::FieldDoesNotExist => "field_does_not_exist",
      Self::ValueDoesNotExist => "value_does_not_exist",
      Self::InvalidSubmission => "invalid_submission",
      Self::InvalidSearchCriteria => "invalid_search_criteria",
      Self::ValidationFailed => "validation_failed",
      Self::CommandRejected => "command_rejected",
      Self::ConcurrentModification => "concurrent_modification",
      Self::StorageFailure => "storage_failure",
      Self::EngineFailure => "engine_failure",
    }
  }
}

impl fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Errors surfaced by case operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaseError {
  #[error("bad request: {code}{}", suffix(.context))]
  BadRequest {
    code: ErrorCode,
    context: Option<String>,
  },

  #[error("forbidden: {code}{}", suffix(.context))]
  Forbidden {
    code: ErrorCode,
    context: Option<String>,
  },

  #[error("not found: {code}{}", suffix(.context))]
  NotFound {
    code: ErrorCode,
    context: Option<String>,
  },

  #[error("gone: {code}{}", suffix(.context))]
  Gone {
    code: ErrorCode,
    context: Option<String>,
  },

  #[error("conflict: {code}{}", suffix(.context))]
  Conflict {
    code: ErrorCode,
    context: Option<String>,
  },

  #[error("internal server error: {code}{}", suffix(.context))]
  InternalServerError {
    code: ErrorCode,
    context: Option<String>,
  },
}

fn suffix(context: &Option<String>) -> String {
  match context {
    Some(context) => format!(" ({})", context),
    None => String::new(),
  }
}

impl CaseError {
  pub fn bad_request(code: ErrorCode) -> Self {
    Self::BadRequest {
      code,
      context: None,
    }
  }

  pub fn forbidden(code: ErrorCode) -> Self {
    Self::Forbidden {
      code,
      context: None,
    }
  }

  pub fn not_found(code: ErrorCode) -> Self {
    Self::NotFound {
      code,
      context: None,
    }
  }

  pub fn gone(code: ErrorCode) -> Self {
    Self::Gone {
      code,
      context: None,
    }
  }

  pub fn conflict(code: ErrorCode) -> Self {
    Self::Conflict {
      code,
      context: None,
    }
  }

  pub fn internal(code: ErrorCode) -> Self {
    Self::InternalServerError {
      code,
      context: None,
    }
  }

  /// Attach context, replacing any already present.
  pub fn with_context(mut self, value: impl Into<String>) -> Self {
    match &mut self {
      Self::BadRequest { context, .. }
      | Self::Forbidden { context, .. }
      | Self::NotFound { context, .. }
      | Self::Gone { context, .. }
      | Self::Conflict { context, .. }
      | Self::InternalServerError { context, .. } => *context = Some(value.into()),
    }
    self
  }

  pub fn code(&self) -> ErrorCode {
    match self {
      Self::BadRequest { code, .. }
      | Self::Forbidden { code, .. }
      | Self::NotFound { code, .. }
      | Self::Gone { code, .. }
      | Self::Conflict { code, .. }
      | Self::InternalServerError { code, .. } => *code,
    }
  }

  pub fn context(&self) -> Option<&str> {
    match self {
      Self::BadRequest { context, .. }
      | Self::Forbidden { context, .. }
      | Self::NotFound { context, .. }
      | Self::Gone { context, .. }
      | Self::Conflict { context, .. }
      | Self::InternalServerError { context, .. } => context.as_deref(),
    }
  }

  /// HTTP status a transport should answer with.
  pub fn status(&self) -> u16 {
    match self {
      Self::BadRequest { .. } => 400,
      Self::Forbidden { .. } => 403,
      Self::NotFound { .. } => 404,
      Self::Gone { .. } => 410,
      Self::Conflict { .. } => 409,
      Self::InternalServerError { .. } => 500,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_includes_code_and_context() {
    let error = CaseError::forbidden(ErrorCode::InvalidAssignment).with_context("carol");
    assert_eq!(error.to_string(), "forbidden: invalid_assignment (carol)");
    assert_eq!(error.status(), 403);
    assert_eq!(error.context(), Some("carol"));
  }

  #[test]
  fn test_display_without_context() {
    let error = CaseError::gone(ErrorCode::InstanceDeleted);
    assert_eq!(error.to_string(), "gone: instance_deleted");
    assert_eq!(error.code(), ErrorCode::InstanceDeleted);
    assert_eq!(error.status(), 410);
  }
}
