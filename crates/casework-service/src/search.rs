use casework_model::{CaseError, ErrorCode, PageRequest, ProcessStatus, SearchCriteria};
use casework_validation::Sanitizer;
use tracing::debug;

/// Turn raw `name=value` query pairs into criteria and a page.
///
/// Repeated `processDefinitionKey`, `processStatus` and `keyword` pairs
/// accumulate. `maxResults` is capped at `max_results_cap`.
pub(crate) fn parse_criteria(
  params: &[(String, String)],
  sanitizer: &dyn Sanitizer,
  max_results_cap: usize,
) -> Result<(SearchCriteria, PageRequest), CaseError> {
  let mut criteria = SearchCriteria::default();
  let mut page = PageRequest::new(0, max_results_cap);

  for (name, raw) in params {
    let Some(value) = sanitizer.sanitize_opt(Some(raw.as_str())) else {
      continue;
    };
    match name.as_str() {
      "processDefinitionKey" => {
        criteria.process_definition_keys.insert(value);
      }
      "processStatus" => {
        let status = value
          .parse::<ProcessStatus>()
          .map_err(|e| invalid(name, e))?;
        criteria.process_statuses.insert(status);
      }
      "applicationStatus" => criteria.application_status = Some(value),
      "initiatedBy" => criteria.initiator_id = Some(value),
      "keyword" => criteria
        .keywords
        .extend(value.split_whitespace().map(str::to_lowercase)),
      "firstResult" => {
        page.first_result = value.trim().parse().map_err(|e| invalid(name, e))?;
      }
      "maxResults" => {
        let max: usize = value.trim().parse().map_err(|e| invalid(name, e))?;
        page.max_results = max.min(max_results_cap);
      }
      other => debug!(param = %other, "ignored search parameter"),
    }
  }

  Ok((criteria, page))
}

fn invalid(name: &str, error: impl std::fmt::Display) -> CaseError {
  CaseError::bad_request(ErrorCode::InvalidSearchCriteria).with_context(format!("{}: {}", name, error))
}

#[cfg(test)]
mod tests {
  use casework_validation::HtmlSanitizer;

  use super::*;

  fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn test_parses_every_parameter() {
    let (criteria, page) = parse_criteria(
      &params(&[
        ("processDefinitionKey", "Demonstration"),
        ("processDefinitionKey", "TimeOff"),
        ("processStatus", "OPEN"),
        ("applicationStatus", "Submitted"),
        ("initiatedBy", "ivan"),
        ("keyword", "Jane Doe"),
        ("firstResult", "10"),
        ("maxResults", "5000"),
        ("unknown", "x"),
      ]),
      &HtmlSanitizer,
      1000,
    )
    .unwrap();

    assert_eq!(criteria.process_definition_keys.len(), 2);
    assert!(criteria.process_statuses.contains(&ProcessStatus::Open));
    assert_eq!(criteria.application_status.as_deref(), Some("Submitted"));
    assert_eq!(criteria.initiator_id.as_deref(), Some("ivan"));
    assert_eq!(criteria.keywords, vec!["jane", "doe"]);
    assert_eq!(page, PageRequest::new(10, 1000));
  }

  #[test]
  fn test_defaults() {
    let (criteria, page) = parse_criteria(&[], &HtmlSanitizer, 1000).unwrap();
    assert_eq!(criteria, SearchCriteria::default());
    assert_eq!(page, PageRequest::default());
  }

  #[test]
  fn test_unparseable_values() {
    for pair in [("processStatus", "paused"), ("firstResult", "-1"), ("maxResults", "many")] {
      let result = parse_criteria(&params(&[pair]), &HtmlSanitizer, 1000);
      assert!(matches!(
        result,
        Err(CaseError::BadRequest { code: ErrorCode::InvalidSearchCriteria, .. })
      ));
    }
  }
}
