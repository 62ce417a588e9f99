//! Casework Validation
//!
//! Converts raw, untrusted input into validated instance data.
//!
//! The pipeline has three stages:
//! 1. [`SubmissionDecoder`] turns a structured payload, a url-encoded form or
//!    multipart parts into one [`Submission`](casework_model::Submission).
//!    File bodies are streamed to the content store here, so later stages
//!    only see file metadata.
//! 2. [`SubmissionTemplate`] describes the fields the current activity (or a
//!    single field) accepts, with patterns and conditional predicates compiled.
//! 3. [`Validator::validate`] applies the template. Undeclared fields are
//!    dropped, everything kept is sanitized, and problems accumulate as
//!    [`Message`]s on the resulting [`Validation`] instead of failing fast.

mod decode;
mod directory;
mod sanitizer;
mod template;
mod validation;
mod validator;

pub use decode::{MultipartPart, RawSubmission, SubmissionDecoder};
pub use directory::{IdentityService, InMemoryDirectory};
pub use sanitizer::{HtmlSanitizer, PassthroughSanitizer, Sanitizer};
pub use template::{SubmissionTemplate, TemplateField, TemplateKind};
pub use validation::{Message, Severity, Validation};
pub use validator::Validator;
