use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::{File, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
  #[default]
  Create,
  Complete,
  Save,
  Reject,
  Attach,
  Update,
  Validate,
  Assign,
}

/// Asserted new or changed data, decoded but not yet validated.
///
/// Never persisted. A submission only reaches an instance through a command
/// built from its validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub request_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_id: Option<String>,
  #[serde(default)]
  pub action: ActionType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub process_instance_label: Option<String>,
  #[serde(default)]
  pub data: BTreeMap<String, Vec<Value>>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub attachments: Vec<File>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub submitter_id: Option<String>,
  pub submission_date: DateTime<Utc>,
}

impl Submission {
  pub fn new(action: ActionType) -> Self {
    Self {
      request_id: None,
      task_id: None,
      action,
      process_instance_label: None,
      data: BTreeMap::new(),
      attachments: Vec::new(),
      submitter_id: None,
      submission_date: Utc::now(),
    }
  }

  /// Append a value to a field, keeping submission order.
  pub fn push(&mut self, name: &str, value: Value) {
    self.data.entry(name.to_string()).or_default().push(value);
  }

  /// Stored locations of every file value and attachment.
  pub fn file_locations(&self) -> Vec<String> {
    self
      .data
      .values()
      .flatten()
      .filter_map(Value::as_file)
      .chain(&self.attachments)
      .filter_map(|f| f.location.clone())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_file_locations_cover_data_and_attachments() {
    let mut submission = Submission::new(ActionType::Attach);
    submission.push("employeeName", Value::text("Jane Doe"));
    submission.push(
      "supportingDocument",
      Value::File(File {
        location: Some("Demonstration/a".to_string()),
        ..File::new("a.pdf")
      }),
    );
    submission.attachments.push(File::new("comment"));
    submission.attachments.push(File {
      location: Some("Demonstration/b".to_string()),
      ..File::new("b.pdf")
    });

    assert_eq!(
      submission.file_locations(),
      vec!["Demonstration/a".to_string(), "Demonstration/b".to_string()]
    );
  }
}
