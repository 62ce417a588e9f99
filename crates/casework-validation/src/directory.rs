use std::collections::HashMap;

use async_trait::async_trait;
use casework_model::User;

/// Identity lookup. Read-only.
#[async_trait]
pub trait IdentityService: Send + Sync {
  async fn get_user(&self, user_id: &str) -> Option<User>;
}

/// A fixed set of users held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
  users: HashMap<String, User>,
}

impl InMemoryDirectory {
  pub fn new(users: impl IntoIterator<Item = User>) -> Self {
    Self {
      users: users
        .into_iter()
        .map(|u| (u.user_id.clone(), u))
        .collect(),
    }
  }
}

#[async_trait]
impl IdentityService for InMemoryDirectory {
  async fn get_user(&self, user_id: &str) -> Option<User> {
    self.users.get(user_id).cloned()
  }
}
