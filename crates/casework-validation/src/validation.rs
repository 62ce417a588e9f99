use std::collections::BTreeMap;

use casework_model::{ActionType, CaseError, ErrorCode, File, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
  Error,
  Warning,
}

/// A problem found while validating, tied to a field or to the submission as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
  pub severity: Severity,
  pub text: String,
}

impl Message {
  pub fn error(field: &str, text: impl Into<String>) -> Self {
    Self {
      field: Some(field.to_string()),
      severity: Severity::Error,
      text: text.into(),
    }
  }

  pub fn warning(field: &str, text: impl Into<String>) -> Self {
    Self {
      field: Some(field.to_string()),
      severity: Severity::Warning,
      text: text.into(),
    }
  }

  pub fn general(severity: Severity, text: impl Into<String>) -> Self {
    Self {
      field: None,
      severity,
      text: text.into(),
    }
  }
}

/// The result of applying a template to a submission.
///
/// `data` and `restricted_data` only ever hold fields the template declares
/// (or, for pass-through templates, sanitized extras).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
  pub process_definition_key: String,
  pub activity_key: String,
  pub action: ActionType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub request_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub process_instance_label: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub submitter_id: Option<String>,
  pub data: BTreeMap<String, Vec<Value>>,
  pub restricted_data: BTreeMap<String, Vec<Value>>,
  pub attachments: Vec<File>,
  pub messages: Vec<Message>,
}

impl Validation {
  pub fn has_errors(&self) -> bool {
    self.errors().next().is_some()
  }

  pub fn errors(&self) -> impl Iterator<Item = &Message> {
    self
      .messages
      .iter()
      .filter(|m| m.severity == Severity::Error)
  }

  /// Stored locations of every file this validation keeps.
  pub fn file_locations(&self) -> Vec<String> {
    self
      .data
      .values()
      .chain(self.restricted_data.values())
      .flatten()
      .filter_map(Value::as_file)
      .chain(&self.attachments)
      .filter_map(|f| f.location.clone())
      .collect()
  }

  pub fn messages_for(&self, field: &str) -> Vec<&Message> {
    self
      .messages
      .iter()
      .filter(|m| m.field.as_deref() == Some(field))
      .collect()
  }

  /// Fail with `validation_failed` when any error message is present.
  pub fn require_valid(self) -> Result<Self, CaseError> {
    if !self.has_errors() {
      return Ok(self);
    }

    let summary = self
      .errors()
      .map(|m| match &m.field {
        Some(field) => format!("{}: {}", field, m.text),
        None => m.text.clone(),
      })
      .collect::<Vec<_>>()
      .join("; ");

    Err(CaseError::bad_request(ErrorCode::ValidationFailed).with_context(summary))
  }
}
