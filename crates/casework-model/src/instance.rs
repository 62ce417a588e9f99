use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attachment::Attachment;
use crate::principal::Principal;
use crate::value::Value;

/// Lifecycle status of a process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
  Open,
  Suspended,
  Cancelled,
  Complete,
}

impl ProcessStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Open => "open",
      Self::Suspended => "suspended",
      Self::Cancelled => "cancelled",
      Self::Complete => "complete",
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Cancelled | Self::Complete)
  }

  /// Whether `self -> target` is a legal transition.
  ///
  /// This is an advisory check. The engine of record decides.
  pub fn can_transition_to(self, target: ProcessStatus) -> bool {
    match (self, target) {
      (Self::Open, Self::Suspended) => true,
      (Self::Suspended, Self::Open) => true,
      (Self::Open | Self::Suspended, Self::Cancelled) => true,
      (Self::Open | Self::Suspended, Self::Complete) => true,
      _ => false,
    }
  }
}

impl fmt::Display for ProcessStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ProcessStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "open" => Ok(Self::Open),
      "suspended" => Ok(Self::Suspended),
      "cancelled" | "canceled" => Ok(Self::Cancelled),
      "complete" | "completed" => Ok(Self::Complete),
      other => Err(format!("unknown process status: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
  Open,
  Suspended,
  Cancelled,
  Complete,
}

/// A unit of work within an instance's current activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
  pub task_instance_id: String,
  pub task_definition_key: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_label: Option<String>,
  pub task_status: TaskStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assignee_id: Option<String>,
  #[serde(default)]
  pub candidate_assignee_ids: BTreeSet<String>,
  #[serde(default = "default_active")]
  pub active: bool,
}

fn default_active() -> bool {
  true
}

impl Task {
  pub fn new(task_instance_id: &str, task_definition_key: &str) -> Self {
    Self {
      task_instance_id: task_instance_id.to_string(),
      task_definition_key: task_definition_key.to_string(),
      task_label: None,
      task_status: TaskStatus::Open,
      assignee_id: None,
      candidate_assignee_ids: BTreeSet::new(),
      active: true,
    }
  }

  /// True when the user is the assignee or one of the candidates.
  pub fn is_held_by(&self, user_id: &str) -> bool {
    self.assignee_id.as_deref() == Some(user_id) || self.candidate_assignee_ids.contains(user_id)
  }

  pub fn is_active(&self) -> bool {
    self.active && self.task_status == TaskStatus::Open
  }
}

/// One execution of a process definition. The durable root owned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
  pub process_instance_id: String,
  pub process_definition_key: String,
  pub process_definition_label: String,
  pub process_instance_label: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub engine_process_instance_id: Option<String>,
  pub deployment_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub activity_key: Option<String>,
  pub process_status: ProcessStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub application_status: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub application_status_explanation: Option<String>,
  /// Application status held before a suspension, restored on activation.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub previous_application_status: Option<String>,
  #[serde(default)]
  pub data: BTreeMap<String, Vec<Value>>,
  #[serde(default)]
  pub restricted_data: BTreeMap<String, Vec<Value>>,
  #[serde(default)]
  pub attachment_ids: BTreeSet<String>,
  /// Hydrated on full reads only. Never persisted.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub attachments: Vec<Attachment>,
  #[serde(default)]
  pub tasks: Vec<Task>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub initiator_id: Option<String>,
  #[serde(default)]
  pub keywords: BTreeSet<String>,
  pub start_time: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end_time: Option<DateTime<Utc>>,
  pub last_modified_time: DateTime<Utc>,
  #[serde(default)]
  pub deleted: bool,
  /// Bumped by every save. A save carrying an older version is refused.
  #[serde(default)]
  pub version: u64,
}

impl ProcessInstance {
  pub fn is_initiator(&self, principal: &Principal) -> bool {
    match (principal.entity_id(), self.initiator_id.as_deref()) {
      (Some(id), Some(initiator)) => id == initiator,
      _ => false,
    }
  }

  pub fn task(&self, task_instance_id: &str) -> Option<&Task> {
    self
      .tasks
      .iter()
      .find(|t| t.task_instance_id == task_instance_id)
  }

  pub fn task_mut(&mut self, task_instance_id: &str) -> Option<&mut Task> {
    self
      .tasks
      .iter_mut()
      .find(|t| t.task_instance_id == task_instance_id)
  }

  pub fn values(&self, field: &str) -> &[Value] {
    self.data.get(field).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Rebuild the keyword index from the label and public text values.
  pub fn refresh_keywords(&mut self) {
    let mut keywords = BTreeSet::new();
    let texts = std::iter::once(self.process_instance_label.as_str())
      .chain(self.data.values().flatten().map(Value::display));
    for text in texts {
      for word in text.split_whitespace() {
        let word = word.to_lowercase();
        if !word.is_empty() {
          keywords.insert(word);
        }
      }
    }
    self.keywords = keywords;
  }

  /// The instance as shown in lists: no restricted data, no hydrated attachments.
  pub fn public_view(&self) -> Self {
    let mut view = self.clone();
    view.restricted_data.clear();
    view.attachments.clear();
    view
  }
}
