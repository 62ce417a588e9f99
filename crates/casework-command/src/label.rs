//! Instance labels rendered with minijinja.

use std::collections::BTreeMap;

use casework_model::Value;
use chrono::{DateTime, Utc};
use minijinja::Environment;
use tracing::warn;

/// Render an instance label from the process's label template.
///
/// The template sees the first value of every field. A missing template, a
/// template that fails to render, or one that renders blank falls back to
/// `Submission <date>`.
pub fn render_label(
  template: Option<&str>,
  data: &BTreeMap<String, Vec<Value>>,
  now: DateTime<Utc>,
) -> String {
  let fallback = || format!("Submission {}", now.format("%Y-%m-%d"));
  let Some(template) = template.filter(|t| !t.trim().is_empty()) else {
    return fallback();
  };

  let context: BTreeMap<&str, &str> = data
    .iter()
    .filter_map(|(name, values)| values.first().map(|v| (name.as_str(), v.display())))
    .collect();

  let env = Environment::new();
  match env.render_str(template, minijinja::Value::from_serialize(&context)) {
    Ok(label) if !label.trim().is_empty() => label.trim().to_string(),
    Ok(_) => fallback(),
    Err(e) => {
      warn!(error = %e, "label template failed to render");
      fallback()
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, Vec<Value>> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), vec![Value::text(*v), Value::text("ignored")]))
      .collect()
  }

  #[test]
  fn test_renders_first_values() {
    let now = Utc::now();
    let label = render_label(
      Some("{{ employeeName }} ({{ budgetNumber }})"),
      &data(&[("employeeName", "Jane Doe"), ("budgetNumber", "100000")]),
      now,
    );
    assert_eq!(label, "Jane Doe (100000)");
  }

  #[test]
  fn test_falls_back_to_submission_date() {
    let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();

    assert_eq!(render_label(None, &data(&[]), now), "Submission 2024-03-09");
    assert_eq!(
      render_label(Some("{{ missing }}"), &data(&[]), now),
      "Submission 2024-03-09"
    );
    assert_eq!(
      render_label(Some("{{ unclosed"), &data(&[]), now),
      "Submission 2024-03-09"
    );
  }
}
