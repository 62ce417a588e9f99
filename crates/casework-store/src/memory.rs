use std::collections::HashMap;

use async_trait::async_trait;
use casework_model::{Attachment, Page, PageRequest, ProcessInstance, SearchCriteria};
use tokio::sync::RwLock;

use crate::{Error, Store, dehydrate, sort_attachments};

/// In-memory store for tests and ephemeral runs.
///
/// Records are cloned in and out, so callers never share state through it.
#[derive(Default)]
pub struct InMemoryStore {
  instances: RwLock<HashMap<String, ProcessInstance>>,
  attachments: RwLock<HashMap<String, Attachment>>,
}

impl InMemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for InMemoryStore {
  async fn find_instance(
    &self,
    process_instance_id: &str,
  ) -> Result<Option<ProcessInstance>, Error> {
    Ok(self.instances.read().await.get(process_instance_id).cloned())
  }

  async fn find_instances(&self, ids: &[String]) -> Result<Vec<ProcessInstance>, Error> {
    let instances = self.instances.read().await;
    Ok(ids.iter().filter_map(|id| instances.get(id).cloned()).collect())
  }

  async fn find_instances_by_criteria(
    &self,
    criteria: &SearchCriteria,
    page: PageRequest,
  ) -> Result<Page<ProcessInstance>, Error> {
    let instances = self.instances.read().await;
    Ok(criteria.select(instances.values().cloned(), page))
  }

  async fn find_instance_by_task(
    &self,
    process_definition_key: &str,
    task_instance_id: &str,
  ) -> Result<Option<ProcessInstance>, Error> {
    let instances = self.instances.read().await;
    Ok(
      instances
        .values()
        .find(|i| {
          i.process_definition_key == process_definition_key && i.task(task_instance_id).is_some()
        })
        .cloned(),
    )
  }

  async fn save_instance(&self, instance: &ProcessInstance) -> Result<u64, Error> {
    let mut instances = self.instances.write().await;
    if let Some(current) = instances.get(&instance.process_instance_id)
      && current.version != instance.version
    {
      return Err(Error::Conflict {
        process_instance_id: instance.process_instance_id.clone(),
      });
    }

    let stored = dehydrate(instance);
    let version = stored.version;
    instances.insert(stored.process_instance_id.clone(), stored);
    Ok(version)
  }

  async fn find_attachments(&self, ids: &[String]) -> Result<Vec<Attachment>, Error> {
    let attachments = self.attachments.read().await;
    let mut found: Vec<Attachment> = ids
      .iter()
      .filter_map(|id| attachments.get(id).cloned())
      .collect();
    sort_attachments(&mut found);
    Ok(found)
  }

  async fn save_attachment(&self, attachment: &Attachment) -> Result<(), Error> {
    self
      .attachments
      .write()
      .await
      .insert(attachment.attachment_id.clone(), attachment.clone());
    Ok(())
  }

  async fn delete_attachment(&self, attachment_id: &str) -> Result<(), Error> {
    self.attachments.write().await.remove(attachment_id);
    Ok(())
  }
}
