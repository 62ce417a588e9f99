use casework_model::{CaseError, ErrorCode};

use crate::command::Command;
use crate::policy::{self, Decision};

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
  pub code: ErrorCode,
  pub reason: Option<String>,
}

impl Rejection {
  pub fn new(code: ErrorCode) -> Self {
    Self { code, reason: None }
  }

  pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
    self.reason = Some(reason.into());
    self
  }
}

impl From<Rejection> for CaseError {
  fn from(rejection: Rejection) -> Self {
    CaseError::Forbidden {
      code: rejection.code,
      context: rejection.reason,
    }
  }
}

/// What to do with a command about to run.
#[derive(Debug)]
pub enum Mediation {
  /// Run this command. It may differ from the one passed in.
  Proceed(Command),
  Reject(Rejection),
}

/// The hook every command passes through before it executes.
///
/// Implementations may veto a command or replace it with another.
pub trait CommandMediator: Send + Sync {
  fn mediate(&self, command: Command) -> Mediation;
}

/// Applies the per-kind authorization policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyMediator;

impl CommandMediator for PolicyMediator {
  fn mediate(&self, command: Command) -> Mediation {
    match policy::authorize(&command) {
      Decision::Allowed => Mediation::Proceed(command),
      Decision::Denied(code) => Mediation::Reject(
        Rejection::new(code).with_reason(format!("{} refused", command.kind())),
      ),
    }
  }
}
