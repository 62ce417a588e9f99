use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::field::FieldDef;

/// A process definition as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDef {
  pub process_definition_key: String,
  pub process_definition_label: String,
  /// minijinja template rendered against the first value of each submitted field.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub process_instance_label_template: Option<String>,
  /// When set, tasks may only be assigned to one of their candidate assignees.
  #[serde(default)]
  pub assignment_restricted_to_candidates: bool,
  #[serde(default)]
  pub allow_anonymous_submission: bool,
  pub active_deployment_id: String,
  pub deployments: Vec<DeploymentDef>,
}

/// A versioned configuration of a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentDef {
  pub deployment_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deployment_label: Option<String>,
  pub start_activity_key: String,
  #[serde(default = "default_initiation_status")]
  pub initiation_status: String,
  #[serde(default = "default_cancellation_status")]
  pub cancellation_status: String,
  #[serde(default = "default_suspension_status")]
  pub suspension_status: String,
  #[serde(default = "default_completion_status")]
  pub completion_status: String,
  #[serde(default)]
  pub activities: BTreeMap<String, ActivityDef>,
}

/// The step context of an instance. Its fields are the ones a submission may set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityDef {
  #[serde(default)]
  pub fields: Vec<FieldDef>,
  #[serde(default)]
  pub allow_attachments: bool,
  /// Forward undeclared fields instead of dropping them.
  #[serde(default)]
  pub allow_any: bool,
}

fn default_initiation_status() -> String {
  "Open".to_string()
}

fn default_cancellation_status() -> String {
  "Cancelled".to_string()
}

fn default_suspension_status() -> String {
  "Suspended".to_string()
}

fn default_completion_status() -> String {
  "Complete".to_string()
}

impl ProcessDef {
  /// Parse and check a process definition.
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    let process: ProcessDef = serde_json::from_str(json)?;
    process.validate()?;
    Ok(process)
  }

  pub fn deployment(&self, deployment_id: &str) -> Option<&DeploymentDef> {
    self
      .deployments
      .iter()
      .find(|d| d.deployment_id == deployment_id)
  }

  pub fn active_deployment(&self) -> Option<&DeploymentDef> {
    self.deployment(&self.active_deployment_id)
  }

  /// Check internal references. Run once at load time.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.active_deployment().is_none() {
      return Err(ConfigError::MissingDeployment {
        process: self.process_definition_key.clone(),
        deployment_id: self.active_deployment_id.clone(),
      });
    }

    for deployment in &self.deployments {
      deployment.validate()?;
    }

    Ok(())
  }
}

impl DeploymentDef {
  pub fn activity(&self, activity_key: &str) -> Option<&ActivityDef> {
    self.activities.get(activity_key)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if !self.activities.contains_key(&self.start_activity_key) {
      return Err(ConfigError::MissingActivity {
        deployment_id: self.deployment_id.clone(),
        activity: self.start_activity_key.clone(),
      });
    }

    for (activity_key, activity) in &self.activities {
      let mut seen = HashSet::new();
      for field in &activity.fields {
        if !seen.insert(field.name.as_str()) {
          return Err(ConfigError::DuplicateField {
            activity: activity_key.clone(),
            field: field.name.clone(),
          });
        }

        for constraint in &field.constraints {
          check_constraint(&field.name, constraint)?;
        }
      }
    }

    Ok(())
  }
}

fn check_constraint(field: &str, constraint: &crate::ConstraintDef) -> Result<(), ConfigError> {
  if constraint.constraint_type.is_conditional() {
    if constraint.name.as_deref().is_none_or(str::is_empty) {
      return Err(ConfigError::IncompleteConstraint {
        field: field.to_string(),
        attribute: "name",
      });
    }
    if constraint.value.is_none() {
      return Err(ConfigError::IncompleteConstraint {
        field: field.to_string(),
        attribute: "value",
      });
    }
  }

  for child in constraint.and.iter().chain(constraint.or.iter()) {
    check_constraint(field, child)?;
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ConstraintType, FieldType};

  const DEMONSTRATION: &str = include_str!("../../../test-fixtures/demonstration.json");

  #[test]
  fn test_parse_demonstration() {
    let process = ProcessDef::from_json(DEMONSTRATION).unwrap();
    assert_eq!(process.process_definition_key, "Demonstration");
    assert!(process.assignment_restricted_to_candidates);

    let deployment = process.active_deployment().unwrap();
    assert_eq!(deployment.cancellation_status, "Cancelled by request");

    let submit = deployment.activity("submit").unwrap();
    let supervisor = submit
      .fields
      .iter()
      .find(|f| f.name == "supervisorId")
      .unwrap();
    assert_eq!(supervisor.field_type, FieldType::Text);
    assert!(supervisor.editable);
    assert!(supervisor.has_constraint(ConstraintType::IsOnlyRequiredWhen));
    assert!(!supervisor.has_constraint(ConstraintType::IsNumeric));
  }

  #[test]
  fn test_status_labels_default() {
    let json = r#"{
      "process_definition_key": "p",
      "process_definition_label": "P",
      "active_deployment_id": "d",
      "deployments": [{ "deployment_id": "d", "start_activity_key": "a", "activities": { "a": {} } }]
    }"#;
    let process = ProcessDef::from_json(json).unwrap();
    let deployment = process.active_deployment().unwrap();
    assert_eq!(deployment.initiation_status, "Open");
    assert_eq!(deployment.cancellation_status, "Cancelled");
    assert!(!process.allow_anonymous_submission);
  }

  #[test]
  fn test_missing_active_deployment() {
    let json = r#"{
      "process_definition_key": "p",
      "process_definition_label": "P",
      "active_deployment_id": "missing",
      "deployments": []
    }"#;
    let result = ProcessDef::from_json(json);
    assert!(matches!(
      result,
      Err(ConfigError::MissingDeployment { deployment_id, .. }) if deployment_id == "missing"
    ));
  }

  #[test]
  fn test_missing_start_activity() {
    let json = r#"{
      "process_definition_key": "p",
      "process_definition_label": "P",
      "active_deployment_id": "d",
      "deployments": [{ "deployment_id": "d", "start_activity_key": "a", "activities": {} }]
    }"#;
    assert!(matches!(
      ProcessDef::from_json(json),
      Err(ConfigError::MissingActivity { .. })
    ));
  }

  #[test]
  fn test_duplicate_field() {
    let json = r#"{
      "process_definition_key": "p",
      "process_definition_label": "P",
      "active_deployment_id": "d",
      "deployments": [{
        "deployment_id": "d",
        "start_activity_key": "a",
        "activities": { "a": { "fields": [{ "name": "x" }, { "name": "x" }] } }
      }]
    }"#;
    assert!(matches!(
      ProcessDef::from_json(json),
      Err(ConfigError::DuplicateField { field, .. }) if field == "x"
    ));
  }

  #[test]
  fn test_conditional_constraint_requires_name() {
    let json = r#"{
      "process_definition_key": "p",
      "process_definition_label": "P",
      "active_deployment_id": "d",
      "deployments": [{
        "deployment_id": "d",
        "start_activity_key": "a",
        "activities": { "a": { "fields": [{
          "name": "x",
          "constraints": [{ "type": "IS_ONLY_VISIBLE_WHEN", "value": "^y$" }]
        }] } }
      }]
    }"#;
    assert!(matches!(
      ProcessDef::from_json(json),
      Err(ConfigError::IncompleteConstraint { attribute: "name", .. })
    ));
  }
}
