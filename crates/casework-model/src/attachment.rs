use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File or comment metadata bound to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
  pub attachment_id: String,
  pub process_instance_id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub link: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  pub created_at: DateTime<Utc>,
}
