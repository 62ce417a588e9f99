//! Casework Store
//!
//! This crate provides the storage traits and implementations for process
//! instances, their attachments, and the process definitions they belong to.
//!
//! The [`Store`] trait is a document-store abstraction: every operation reads
//! or writes whole records. There is no instance cache; callers re-read before
//! every read-modify-write.
//!
//! Implementations:
//! - [`InMemoryStore`] for tests and ephemeral runs
//! - [`SqliteStore`] persisting JSON documents through `sqlx`
//!
//! Process definitions come from a [`ProcessRepository`], either
//! [`FsProcessRepository`] (one JSON file per process) or
//! [`InMemoryProcessRepository`].

mod memory;
mod process;
mod sqlite;

pub use memory::InMemoryStore;
pub use process::{FsProcessRepository, InMemoryProcessRepository, ProcessRepository};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use casework_config::ConfigError;
use casework_model::{
  Attachment, CaseError, ErrorCode, Page, PageRequest, ProcessInstance, SearchCriteria,
};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  /// A stored document could not be encoded or decoded.
  #[error("document error: {0}")]
  Document(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The stored instance moved on since it was read.
  #[error("instance '{process_instance_id}' was modified concurrently")]
  Conflict { process_instance_id: String },

  /// A stored process definition is invalid.
  #[error("invalid process definition '{key}': {source}")]
  Config {
    key: String,
    #[source]
    source: ConfigError,
  },
}

impl From<Error> for CaseError {
  fn from(error: Error) -> Self {
    match error {
      Error::Config { .. } => {
        CaseError::internal(ErrorCode::ProcessIsMisconfigured).with_context(error.to_string())
      }
      Error::Conflict { .. } => {
        CaseError::conflict(ErrorCode::ConcurrentModification).with_context(error.to_string())
      }
      other => CaseError::internal(ErrorCode::StorageFailure).with_context(other.to_string()),
    }
  }
}

/// Storage trait for process instances and attachments.
#[async_trait]
pub trait Store: Send + Sync {
  /// Get an instance by id, including soft-deleted ones.
  async fn find_instance(
    &self,
    process_instance_id: &str,
  ) -> Result<Option<ProcessInstance>, Error>;

  /// Get every instance whose id is listed. Unknown ids are skipped.
  async fn find_instances(&self, ids: &[String]) -> Result<Vec<ProcessInstance>, Error>;

  /// List instances matching the criteria, newest first.
  async fn find_instances_by_criteria(
    &self,
    criteria: &SearchCriteria,
    page: PageRequest,
  ) -> Result<Page<ProcessInstance>, Error>;

  /// Find the instance of a process that holds a task.
  async fn find_instance_by_task(
    &self,
    process_definition_key: &str,
    task_instance_id: &str,
  ) -> Result<Option<ProcessInstance>, Error>;

  /// Insert or replace an instance and return its new version.
  ///
  /// A replace only succeeds while the stored version still equals
  /// `instance.version`; otherwise [`Error::Conflict`]. Hydrated attachments
  /// are not stored.
  async fn save_instance(&self, instance: &ProcessInstance) -> Result<u64, Error>;

  /// Get every attachment whose id is listed, oldest first.
  async fn find_attachments(&self, ids: &[String]) -> Result<Vec<Attachment>, Error>;

  async fn save_attachment(&self, attachment: &Attachment) -> Result<(), Error>;

  /// Delete an attachment. Deleting an unknown id is not an error.
  async fn delete_attachment(&self, attachment_id: &str) -> Result<(), Error>;
}

/// The stored form of an instance, stamped with the next version.
pub(crate) fn dehydrate(instance: &ProcessInstance) -> ProcessInstance {
  let mut stored = instance.clone();
  stored.attachments.clear();
  stored.version = instance.version + 1;
  stored
}

pub(crate) fn sort_attachments(attachments: &mut [Attachment]) {
  attachments.sort_by(|a, b| {
    a.created_at
      .cmp(&b.created_at)
      .then_with(|| a.attachment_id.cmp(&b.attachment_id))
  });
}

#[cfg(test)]
pub(crate) mod fixtures {
  use std::collections::{BTreeMap, BTreeSet};

  use casework_model::{ProcessInstance, ProcessStatus, Task, Value};
  use chrono::Utc;

  pub fn instance(id: &str, key: &str) -> ProcessInstance {
    let now = Utc::now();
    let mut data = BTreeMap::new();
    data.insert("employeeName".to_string(), vec![Value::text("Jane Doe")]);

    let mut instance = ProcessInstance {
      process_instance_id: id.to_string(),
      process_definition_key: key.to_string(),
      process_definition_label: key.to_string(),
      process_instance_label: format!("Case {}", id),
      engine_process_instance_id: None,
      deployment_id: "1".to_string(),
      activity_key: Some("submit".to_string()),
      process_status: ProcessStatus::Open,
      application_status: Some("Submitted".to_string()),
      application_status_explanation: None,
      previous_application_status: None,
      data,
      restricted_data: BTreeMap::new(),
      attachment_ids: BTreeSet::new(),
      attachments: Vec::new(),
      tasks: vec![Task::new(&format!("{}-task", id), "review")],
      initiator_id: Some("ivan".to_string()),
      keywords: BTreeSet::new(),
      start_time: now,
      end_time: None,
      last_modified_time: now,
      deleted: false,
      version: 0,
    };
    instance.refresh_keywords();
    instance
  }
}
