//! Casework Model
//!
//! Plain data shared by every casework crate: the durable [`ProcessInstance`]
//! and the request-scoped values derived from or applied to it.
//!
//! [`CaseError`] is the single error type surfaced by orchestration. Each
//! variant carries a stable [`ErrorCode`] so transports can report failures
//! without parsing messages.

mod attachment;
mod error;
mod instance;
mod principal;
mod search;
mod submission;
mod value;

pub use attachment::Attachment;
pub use error::{CaseError, ErrorCode};
pub use instance::{ProcessInstance, ProcessStatus, Task, TaskStatus};
pub use principal::{Entity, EntityType, Principal, Role, User};
pub use search::{Page, PageRequest, SearchCriteria};
pub use submission::{ActionType, Submission};
pub use value::{File, Value};
