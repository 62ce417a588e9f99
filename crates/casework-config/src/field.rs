use serde::{Deserialize, Serialize};

use crate::constraint::{ConstraintDef, ConstraintType};

/// Input types a field can take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
  #[default]
  Text,
  Textarea,
  Number,
  Email,
  Date,
  Checkbox,
  Radio,
  SelectOne,
  SelectMultiple,
  File,
  Person,
  Html,
  Hidden,
}

impl FieldType {
  pub fn is_file(self) -> bool {
    matches!(self, Self::File)
  }

  /// Values of these types must be one of the field's declared options.
  pub fn is_option_bound(self) -> bool {
    matches!(
      self,
      Self::Checkbox | Self::Radio | Self::SelectOne | Self::SelectMultiple
    )
  }

  /// Types that accept at most one value regardless of `max_inputs`.
  pub fn is_single_choice(self) -> bool {
    matches!(self, Self::Radio | Self::SelectOne)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDef {
  pub value: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
}

/// A single field declared by an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  #[serde(rename = "type", default)]
  pub field_type: FieldType,
  #[serde(default)]
  pub required: bool,
  #[serde(default = "default_editable")]
  pub editable: bool,
  /// Restricted values are stored apart from the instance's public data.
  #[serde(default)]
  pub restricted: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pattern: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub custom_validity: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub min_value_length: Option<usize>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_value_length: Option<usize>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub min_inputs: Option<usize>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_inputs: Option<usize>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<OptionDef>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub constraints: Vec<ConstraintDef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_value: Option<String>,
}

fn default_editable() -> bool {
  true
}

impl FieldDef {
  pub fn new(name: &str, field_type: FieldType) -> Self {
    Self {
      name: name.to_string(),
      label: None,
      field_type,
      required: false,
      editable: true,
      restricted: false,
      pattern: None,
      custom_validity: None,
      min_value_length: None,
      max_value_length: None,
      min_inputs: None,
      max_inputs: None,
      options: Vec::new(),
      constraints: Vec::new(),
      default_value: None,
    }
  }

  pub fn constraints_of(&self, constraint_type: ConstraintType) -> impl Iterator<Item = &ConstraintDef> {
    self
      .constraints
      .iter()
      .filter(move |c| c.constraint_type == constraint_type)
  }

  pub fn has_constraint(&self, constraint_type: ConstraintType) -> bool {
    self.constraints_of(constraint_type).next().is_some()
  }

  pub fn has_option(&self, value: &str) -> bool {
    self.options.iter().any(|o| o.value == value)
  }
}
