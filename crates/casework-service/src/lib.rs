//! Casework Service
//!
//! [`ProcessInstanceService`] is the surface a transport binds to. Each
//! operation reads what it needs from the store, validates raw input through
//! the submission pipeline, and hands exactly one command to the executor.

mod config;
mod search;
mod service;
mod tasks;

pub use config::{ServiceConfig, SubmissionMode};
pub use service::{Collaborators, FieldUpdate, InstancePatch, ProcessInstanceService, Submitted};
pub use tasks::allowed_task;
