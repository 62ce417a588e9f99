use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to parse process definition: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("process '{process}' has no deployment '{deployment_id}'")]
  MissingDeployment {
    process: String,
    deployment_id: String,
  },

  #[error("deployment '{deployment_id}' has no activity '{activity}'")]
  MissingActivity {
    deployment_id: String,
    activity: String,
  },

  #[error("activity '{activity}' declares field '{field}' more than once")]
  DuplicateField { activity: String, field: String },

  #[error("constraint on field '{field}' is missing its {attribute}")]
  IncompleteConstraint {
    field: String,
    attribute: &'static str,
  },
}
