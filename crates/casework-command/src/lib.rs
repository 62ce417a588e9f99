//! Casework Command
//!
//! Every state-changing use case on a process instance is one [`Command`],
//! and every command runs through [`CommandExecutor::execute`]. The executor
//! re-reads the instance, hands the command to a [`CommandMediator`] (the
//! policy insertion point), performs the transition against the engine
//! facade and the store, and reports the outcome to a [`CommandNotifier`].

mod command;
mod events;
mod executor;
mod label;
mod mediator;
mod operation;
pub mod policy;

pub use command::{Action, Command, CommandFactory, CommandKind};
pub use events::{ChannelNotifier, CommandEvent, CommandNotifier, NoopNotifier};
pub use executor::{CommandExecutor, CommandResult};
pub use label::render_label;
pub use mediator::{CommandMediator, Mediation, PolicyMediator, Rejection};
pub use operation::OperationResult;
pub use policy::Decision;
