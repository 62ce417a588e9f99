//! Command events for observability.

use casework_model::ErrorCode;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::command::CommandKind;

/// Emitted once per executed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandEvent {
  Executed {
    kind: CommandKind,
    process_instance_id: String,
    elapsed_ms: u64,
  },

  Failed {
    kind: CommandKind,
    process_instance_id: Option<String>,
    code: ErrorCode,
    elapsed_ms: u64,
  },
}

/// Receives command events. Called inline by the executor, so keep it quick.
pub trait CommandNotifier: Send + Sync {
  fn notify(&self, event: CommandEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl CommandNotifier for NoopNotifier {
  fn notify(&self, _event: CommandEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<CommandEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<CommandEvent>) -> Self {
    Self { sender }
  }
}

impl CommandNotifier for ChannelNotifier {
  fn notify(&self, event: CommandEvent) {
    // receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
