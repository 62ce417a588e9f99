use serde::{Deserialize, Serialize};

/// The kinds of constraint a field may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintType {
  IsNumeric,
  IsEmailAddress,
  IsValidUser,
  IsConfirmationNumber,
  /// Field is required only while another field's value matches `value`.
  IsOnlyRequiredWhen,
  /// Field is validated and accepted only while another field's value matches `value`.
  IsOnlyVisibleWhen,
}

impl ConstraintType {
  /// Conditional constraints reference another field by `name` and a pattern by `value`.
  pub fn is_conditional(self) -> bool {
    matches!(self, Self::IsOnlyRequiredWhen | Self::IsOnlyVisibleWhen)
  }
}

/// A constraint attached to a field.
///
/// Conditional constraints form a predicate tree: the constraint holds when its
/// own `name`/`value` pair matches and every `and` child holds, or when any of
/// its `or` alternatives holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDef {
  #[serde(rename = "type")]
  pub constraint_type: ConstraintType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub and: Vec<ConstraintDef>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub or: Vec<ConstraintDef>,
}

impl ConstraintDef {
  pub fn new(constraint_type: ConstraintType) -> Self {
    Self {
      constraint_type,
      name: None,
      value: None,
      and: Vec::new(),
      or: Vec::new(),
    }
  }

  /// A conditional constraint on `name` matching `pattern`.
  pub fn when(constraint_type: ConstraintType, name: &str, pattern: &str) -> Self {
    Self {
      name: Some(name.to_string()),
      value: Some(pattern.to_string()),
      ..Self::new(constraint_type)
    }
  }

  pub fn or(mut self, alternative: ConstraintDef) -> Self {
    self.or.push(alternative);
    self
  }
}
