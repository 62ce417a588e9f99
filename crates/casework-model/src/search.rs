use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::instance::{ProcessInstance, ProcessStatus};

/// Filters applied when listing instances.
///
/// An empty `process_definition_keys` set matches every process. Callers that
/// scope by authorization must fill it in before querying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
  #[serde(default)]
  pub process_definition_keys: BTreeSet<String>,
  #[serde(default)]
  pub process_statuses: BTreeSet<ProcessStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub application_status: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub initiator_id: Option<String>,
  /// Lowercased words, each of which must prefix one of the instance's keywords.
  #[serde(default)]
  pub keywords: Vec<String>,
  #[serde(default)]
  pub include_deleted: bool,
}

impl SearchCriteria {
  pub fn matches(&self, instance: &ProcessInstance) -> bool {
    if instance.deleted && !self.include_deleted {
      return false;
    }
    if !self.process_definition_keys.is_empty()
      && !self
        .process_definition_keys
        .contains(&instance.process_definition_key)
    {
      return false;
    }
    if !self.process_statuses.is_empty() && !self.process_statuses.contains(&instance.process_status)
    {
      return false;
    }
    if let Some(status) = &self.application_status
      && instance.application_status.as_ref() != Some(status)
    {
      return false;
    }
    if let Some(initiator) = &self.initiator_id
      && instance.initiator_id.as_ref() != Some(initiator)
    {
      return false;
    }

    self.keywords.iter().all(|word| {
      instance
        .keywords
        .iter()
        .any(|keyword| keyword.starts_with(word.as_str()))
    })
  }

  /// Filter, order newest first, and cut one page.
  pub fn select(
    &self,
    instances: impl IntoIterator<Item = ProcessInstance>,
    page: PageRequest,
  ) -> Page<ProcessInstance> {
    let mut matching: Vec<ProcessInstance> = instances
      .into_iter()
      .filter(|i| self.matches(i))
      .collect();

    matching.sort_by(|a, b| {
      b.start_time
        .cmp(&a.start_time)
        .then_with(|| a.process_instance_id.cmp(&b.process_instance_id))
    });

    page.slice(matching)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
  pub first_result: usize,
  pub max_results: usize,
}

impl PageRequest {
  pub const DEFAULT_MAX_RESULTS: usize = 1000;

  pub fn new(first_result: usize, max_results: usize) -> Self {
    Self {
      first_result,
      max_results,
    }
  }

  pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
    let total = items.len();
    let items = items
      .into_iter()
      .skip(self.first_result)
      .take(self.max_results)
      .collect();

    Page {
      items,
      total,
      first_result: self.first_result,
      max_results: self.max_results,
    }
  }
}

impl Default for PageRequest {
  fn default() -> Self {
    Self::new(0, Self::DEFAULT_MAX_RESULTS)
  }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: usize,
  pub first_result: usize,
  pub max_results: usize,
}

impl<T> Page<T> {
  pub fn empty(page: PageRequest) -> Self {
    Self {
      items: Vec::new(),
      total: 0,
      first_result: page.first_result,
      max_results: page.max_results,
    }
  }

  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      items: self.items.into_iter().map(f).collect(),
      total: self.total,
      first_result: self.first_result,
      max_results: self.max_results,
    }
  }
}
