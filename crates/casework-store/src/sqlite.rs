use std::str::FromStr;

use async_trait::async_trait;
use casework_model::{Attachment, Page, PageRequest, ProcessInstance, SearchCriteria};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{Error, Store, dehydrate, sort_attachments};

/// SQLite-based store implementation.
///
/// Instances and attachments are stored as JSON documents next to the few
/// columns queries filter on.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if missing) the database at `url` and run migrations.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// A private in-memory database. One connection, so every query sees the same data.
  pub async fn in_memory() -> Result<Self, Error> {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect("sqlite::memory:")
      .await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), Error> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }
}

fn decode_instances(documents: Vec<String>) -> Result<Vec<ProcessInstance>, Error> {
  documents
    .iter()
    .map(|d| serde_json::from_str(d).map_err(Error::from))
    .collect()
}

#[async_trait]
impl Store for SqliteStore {
  async fn find_instance(
    &self,
    process_instance_id: &str,
  ) -> Result<Option<ProcessInstance>, Error> {
    let document: Option<String> = sqlx::query_scalar(
      r#"
      SELECT document
      FROM process_instances
      WHERE process_instance_id = ?
      "#,
    )
    .bind(process_instance_id)
    .fetch_optional(&self.pool)
    .await?;

    match document {
      Some(document) => Ok(Some(serde_json::from_str(&document)?)),
      None => Ok(None),
    }
  }

  async fn find_instances(&self, ids: &[String]) -> Result<Vec<ProcessInstance>, Error> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
      QueryBuilder::new("SELECT document FROM process_instances WHERE process_instance_id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
      separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let documents: Vec<String> = builder.build_query_scalar().fetch_all(&self.pool).await?;
    decode_instances(documents)
  }

  async fn find_instances_by_criteria(
    &self,
    criteria: &SearchCriteria,
    page: PageRequest,
  ) -> Result<Page<ProcessInstance>, Error> {
    let mut builder: QueryBuilder<Sqlite> =
      QueryBuilder::new("SELECT document FROM process_instances WHERE 1 = 1");

    if !criteria.include_deleted {
      builder.push(" AND deleted = 0");
    }
    if !criteria.process_definition_keys.is_empty() {
      builder.push(" AND process_definition_key IN (");
      let mut separated = builder.separated(", ");
      for key in &criteria.process_definition_keys {
        separated.push_bind(key);
      }
      separated.push_unseparated(")");
    }

    // Remaining filters run over the decoded documents.
    let documents: Vec<String> = builder.build_query_scalar().fetch_all(&self.pool).await?;
    Ok(criteria.select(decode_instances(documents)?, page))
  }

  async fn find_instance_by_task(
    &self,
    process_definition_key: &str,
    task_instance_id: &str,
  ) -> Result<Option<ProcessInstance>, Error> {
    let documents: Vec<String> = sqlx::query_scalar(
      r#"
      SELECT document
      FROM process_instances
      WHERE process_definition_key = ?
      "#,
    )
    .bind(process_definition_key)
    .fetch_all(&self.pool)
    .await?;

    Ok(
      decode_instances(documents)?
        .into_iter()
        .find(|i| i.task(task_instance_id).is_some()),
    )
  }

  async fn save_instance(&self, instance: &ProcessInstance) -> Result<u64, Error> {
    let stored = dehydrate(instance);
    let conflict = || Error::Conflict {
      process_instance_id: instance.process_instance_id.clone(),
    };
    let expected = i64::try_from(instance.version).map_err(|_| conflict())?;
    let next = i64::try_from(stored.version).map_err(|_| conflict())?;
    let document = serde_json::to_string(&stored)?;

    let updated = sqlx::query(
      r#"
      UPDATE process_instances
      SET process_definition_key = ?, deleted = ?, document = ?, version = ?
      WHERE process_instance_id = ? AND version = ?
      "#,
    )
    .bind(&instance.process_definition_key)
    .bind(instance.deleted)
    .bind(&document)
    .bind(next)
    .bind(&instance.process_instance_id)
    .bind(expected)
    .execute(&self.pool)
    .await?;
    if updated.rows_affected() == 1 {
      return Ok(stored.version);
    }

    // No row at the expected version: either a first save or a stale one.
    let inserted = sqlx::query(
      r#"
      INSERT INTO process_instances (process_instance_id, process_definition_key, deleted, document, version)
      VALUES (?, ?, ?, ?, ?)
      ON CONFLICT (process_instance_id) DO NOTHING
      "#,
    )
    .bind(&instance.process_instance_id)
    .bind(&instance.process_definition_key)
    .bind(instance.deleted)
    .bind(&document)
    .bind(next)
    .execute(&self.pool)
    .await?;
    if inserted.rows_affected() == 1 {
      Ok(stored.version)
    } else {
      Err(conflict())
    }
  }

  async fn find_attachments(&self, ids: &[String]) -> Result<Vec<Attachment>, Error> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
      QueryBuilder::new("SELECT document FROM attachments WHERE attachment_id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
      separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let documents: Vec<String> = builder.build_query_scalar().fetch_all(&self.pool).await?;
    let mut attachments = documents
      .iter()
      .map(|d| serde_json::from_str(d).map_err(Error::from))
      .collect::<Result<Vec<Attachment>, Error>>()?;
    sort_attachments(&mut attachments);
    Ok(attachments)
  }

  async fn save_attachment(&self, attachment: &Attachment) -> Result<(), Error> {
    let document = serde_json::to_string(attachment)?;

    sqlx::query(
      r#"
      INSERT INTO attachments (attachment_id, process_instance_id, document)
      VALUES (?, ?, ?)
      ON CONFLICT (attachment_id) DO UPDATE SET
        process_instance_id = excluded.process_instance_id,
        document = excluded.document
      "#,
    )
    .bind(&attachment.attachment_id)
    .bind(&attachment.process_instance_id)
    .bind(document)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn delete_attachment(&self, attachment_id: &str) -> Result<(), Error> {
    sqlx::query("DELETE FROM attachments WHERE attachment_id = ?")
      .bind(attachment_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}
