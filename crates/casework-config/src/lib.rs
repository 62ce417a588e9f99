//! Casework Config
//!
//! This crate contains the serializable process definition types for casework.
//! A process definition describes the fields a case collects, grouped by
//! activity, along with the deployment that labels each lifecycle status.
//!
//! Definitions are loaded from:
//! - JSON files (one `{process_definition_key}.json` per process)
//! - Database storage (as JSON blobs)
//!
//! [`ProcessDef::from_json`] checks the definition for internal consistency so
//! the rest of the system can assume a deployment's start activity exists and
//! that conditional constraints reference a field and a pattern.

mod constraint;
mod error;
mod field;
mod process;

pub use constraint::{ConstraintDef, ConstraintType};
pub use error::ConfigError;
pub use field::{FieldDef, FieldType, OptionDef};
pub use process::{ActivityDef, DeploymentDef, ProcessDef};
