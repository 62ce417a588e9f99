use casework_model::PageRequest;
use serde::{Deserialize, Serialize};

/// How a failed validation is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionMode {
  /// The failed [`Validation`](casework_validation::Validation) is returned as a value.
  #[default]
  Interactive,
  /// A failed validation is a `validation_failed` BadRequest.
  Strict,
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
  /// Upper bound on `maxResults` for searches and export pages.
  #[serde(default = "default_max_results")]
  pub max_results: usize,
  #[serde(default)]
  pub submission_mode: SubmissionMode,
}

fn default_max_results() -> usize {
  PageRequest::DEFAULT_MAX_RESULTS
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      max_results: default_max_results(),
      submission_mode: SubmissionMode::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_fill_missing_keys() {
    let config: ServiceConfig = serde_json::from_str(r#"{"submission_mode": "strict"}"#).unwrap();
    assert_eq!(config.max_results, 1000);
    assert_eq!(config.submission_mode, SubmissionMode::Strict);
    assert_eq!(serde_json::from_str::<ServiceConfig>("{}").unwrap(), ServiceConfig::default());
  }
}
