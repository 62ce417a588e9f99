use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Roles an entity can hold on a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Initiator,
  User,
  Overseer,
  Admin,
  Superuser,
}

impl Role {
  /// Roles that may act on any instance of a process.
  pub const ELEVATED: &'static [Role] = &[Role::Admin, Role::Superuser];

  /// Roles that may see and manage every instance of a process.
  pub const OVERSIGHT: &'static [Role] = &[Role::Overseer, Role::Admin, Role::Superuser];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
  User,
  System,
}

/// An authenticated caller with process-scoped roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
  pub entity_id: String,
  pub entity_type: EntityType,
  #[serde(default)]
  roles: HashMap<String, BTreeSet<Role>>,
}

impl Entity {
  pub fn user(entity_id: &str) -> Self {
    Self {
      entity_id: entity_id.to_string(),
      entity_type: EntityType::User,
      roles: HashMap::new(),
    }
  }

  pub fn system(entity_id: &str) -> Self {
    Self {
      entity_id: entity_id.to_string(),
      entity_type: EntityType::System,
      roles: HashMap::new(),
    }
  }

  pub fn with_role(mut self, process_definition_key: &str, role: Role) -> Self {
    self
      .roles
      .entry(process_definition_key.to_string())
      .or_default()
      .insert(role);
    self
  }

  pub fn has_role(&self, process_definition_key: &str, roles: &[Role]) -> bool {
    self
      .roles
      .get(process_definition_key)
      .is_some_and(|held| roles.iter().any(|r| held.contains(r)))
  }

  /// Keys of every process on which this entity holds one of `roles`.
  pub fn process_definition_keys(&self, roles: &[Role]) -> BTreeSet<String> {
    self
      .roles
      .iter()
      .filter(|(_, held)| roles.iter().any(|r| held.contains(r)))
      .map(|(key, _)| key.clone())
      .collect()
  }
}

/// The actor making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
  Anonymous,
  Authenticated(Entity),
}

impl Principal {
  pub fn entity(&self) -> Option<&Entity> {
    match self {
      Self::Anonymous => None,
      Self::Authenticated(entity) => Some(entity),
    }
  }

  pub fn entity_id(&self) -> Option<&str> {
    self.entity().map(|e| e.entity_id.as_str())
  }

  pub fn is_anonymous(&self) -> bool {
    matches!(self, Self::Anonymous)
  }

  pub fn is_system(&self) -> bool {
    self
      .entity()
      .is_some_and(|e| e.entity_type == EntityType::System)
  }

  pub fn has_role(&self, process_definition_key: &str, roles: &[Role]) -> bool {
    self
      .entity()
      .is_some_and(|e| e.has_role(process_definition_key, roles))
  }

  pub fn process_definition_keys(&self, roles: &[Role]) -> BTreeSet<String> {
    self
      .entity()
      .map(|e| e.process_definition_keys(roles))
      .unwrap_or_default()
  }
}

impl From<Entity> for Principal {
  fn from(entity: Entity) -> Self {
    Self::Authenticated(entity)
  }
}

/// A user record as returned by identity lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub user_id: String,
  pub display_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email_address: Option<String>,
}

impl User {
  pub fn new(user_id: &str, display_name: &str) -> Self {
    Self {
      user_id: user_id.to_string(),
      display_name: display_name.to_string(),
      email_address: None,
    }
  }
}
