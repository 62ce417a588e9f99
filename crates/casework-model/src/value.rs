use serde::{Deserialize, Serialize};

/// A single stored value of a field.
///
/// Text values serialize as plain JSON strings and files as objects, so a
/// multi-valued field reads naturally as `["a", "b"]` or `[{"name": ...}]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Text(String),
  File(File),
}

impl Value {
  pub fn text(value: impl Into<String>) -> Self {
    Self::Text(value.into())
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(text) => Some(text),
      Self::File(_) => None,
    }
  }

  pub fn as_file(&self) -> Option<&File> {
    match self {
      Self::File(file) => Some(file),
      Self::Text(_) => None,
    }
  }

  /// The text of a value, or the name of a file.
  pub fn display(&self) -> &str {
    match self {
      Self::Text(text) => text,
      Self::File(file) => &file.name,
    }
  }

  pub fn is_empty(&self) -> bool {
    match self {
      Self::Text(text) => text.trim().is_empty(),
      Self::File(file) => file.name.is_empty() && file.location.is_none(),
    }
  }
}

/// Metadata for a stored file. The bytes live in the content store at `location`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub link: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl File {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      id: None,
      name: name.into(),
      content_type: None,
      location: None,
      link: None,
      description: None,
    }
  }
}
