use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use casework_content::{ContentStore, byte_stream};
use casework_model::{ActionType, CaseError, ErrorCode, File, Principal, Submission, Value};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const LABEL_KEY: &str = "processInstanceLabel";
const TASK_KEY: &str = "taskId";
const REQUEST_KEY: &str = "requestId";

/// One part of a multipart body.
#[derive(Debug, Clone)]
pub struct MultipartPart {
  pub name: String,
  pub filename: Option<String>,
  pub content_type: Option<String>,
  pub body: Bytes,
}

impl MultipartPart {
  pub fn text(name: &str, value: &str) -> Self {
    Self {
      name: name.to_string(),
      filename: None,
      content_type: None,
      body: Bytes::copy_from_slice(value.as_bytes()),
    }
  }

  pub fn file(name: &str, filename: &str, content_type: &str, body: Bytes) -> Self {
    Self {
      name: name.to_string(),
      filename: Some(filename.to_string()),
      content_type: Some(content_type.to_string()),
      body,
    }
  }
}

/// Raw request content in one of the accepted encodings.
#[derive(Debug, Clone)]
pub enum RawSubmission {
  Structured(serde_json::Value),
  FormUrlEncoded(Bytes),
  Multipart(Vec<MultipartPart>),
}

/// The structured encoding's envelope.
#[derive(Debug, Deserialize)]
struct StructuredPayload {
  #[serde(default, alias = "processInstanceLabel")]
  process_instance_label: Option<String>,
  #[serde(default, alias = "taskId")]
  task_id: Option<String>,
  #[serde(default, alias = "requestId")]
  request_id: Option<String>,
  #[serde(default)]
  data: BTreeMap<String, serde_json::Value>,
  #[serde(default)]
  attachments: Vec<File>,
}

/// Decodes raw request content into a [`Submission`].
///
/// Multipart file bodies are written to the content store under
/// `{process_definition_key}/{id}` before the submission is returned. Callers
/// own those uploads from then on and [`discard`](Self::discard) the ones
/// they do not keep. Structured files never carry a stored location.
pub struct SubmissionDecoder {
  content: Arc<dyn ContentStore>,
}

impl SubmissionDecoder {
  pub fn new(content: Arc<dyn ContentStore>) -> Self {
    Self { content }
  }

  #[instrument(
    name = "submission_decode",
    skip_all,
    fields(process_definition_key = %process_definition_key, action = ?action)
  )]
  pub async fn decode(
    &self,
    raw: RawSubmission,
    process_definition_key: &str,
    action: ActionType,
    principal: &Principal,
  ) -> Result<Submission, CaseError> {
    let mut submission = Submission::new(action);
    submission.submitter_id = principal.entity_id().map(str::to_string);

    match raw {
      RawSubmission::Structured(json) => decode_structured(json, &mut submission)?,
      RawSubmission::FormUrlEncoded(body) => {
        for (name, value) in url::form_urlencoded::parse(&body) {
          push_text(&mut submission, &name, &value);
        }
      }
      RawSubmission::Multipart(parts) => {
        for part in parts {
          if let Err(e) = self
            .decode_part(part, process_definition_key, &mut submission)
            .await
          {
            self.discard(&submission.file_locations()).await;
            return Err(e);
          }
        }
      }
    }

    Ok(submission)
  }

  /// Delete uploads nothing will reference. Failures are only logged.
  pub async fn discard(&self, locations: &[String]) {
    for location in locations {
      match self.content.delete(location).await {
        Ok(()) => debug!(location = %location, "discarded_upload"),
        Err(e) => warn!(location = %location, error = %e, "discard_upload_failed"),
      }
    }
  }

  async fn decode_part(
    &self,
    part: MultipartPart,
    process_definition_key: &str,
    submission: &mut Submission,
  ) -> Result<(), CaseError> {
    let Some(filename) = part.filename else {
      let text = String::from_utf8(part.body.to_vec()).map_err(|_| {
        CaseError::bad_request(ErrorCode::InvalidSubmission)
          .with_context(format!("part '{}' is not valid UTF-8", part.name))
      })?;
      push_text(submission, &part.name, &text);
      return Ok(());
    };

    if filename.is_empty() && part.body.is_empty() {
      // an empty file input
      return Ok(());
    }

    let id = Uuid::new_v4().to_string();
    let location = format!("{}/{}", process_definition_key, id);
    let content_type = part
      .content_type
      .unwrap_or_else(|| "application/octet-stream".to_string());

    self
      .content
      .put(&location, byte_stream(part.body), &content_type)
      .await
      .map_err(|e| CaseError::internal(ErrorCode::StorageFailure).with_context(e.to_string()))?;
    debug!(field = %part.name, location = %location, "stored_file_part");

    submission.push(
      &part.name,
      Value::File(File {
        id: Some(id),
        content_type: Some(content_type),
        location: Some(location),
        ..File::new(filename)
      }),
    );
    Ok(())
  }
}

fn decode_structured(json: serde_json::Value, submission: &mut Submission) -> Result<(), CaseError> {
  let payload: StructuredPayload = serde_json::from_value(json)
    .map_err(|e| CaseError::bad_request(ErrorCode::InvalidSubmission).with_context(e.to_string()))?;

  submission.process_instance_label = payload.process_instance_label;
  submission.task_id = payload.task_id;
  submission.request_id = payload.request_id;
  submission.attachments = payload.attachments.into_iter().map(client_file).collect();

  for (name, value) in payload.data {
    match value {
      serde_json::Value::Array(items) => {
        for item in items {
          push_json(submission, &name, item)?;
        }
      }
      other => push_json(submission, &name, other)?,
    }
  }
  Ok(())
}

fn push_json(
  submission: &mut Submission,
  name: &str,
  value: serde_json::Value,
) -> Result<(), CaseError> {
  let value = match value {
    serde_json::Value::Null => return Ok(()),
    serde_json::Value::String(s) => Value::Text(s),
    serde_json::Value::Number(n) => Value::Text(n.to_string()),
    serde_json::Value::Bool(b) => Value::Text(b.to_string()),
    object @ serde_json::Value::Object(_) => {
      let file: File = serde_json::from_value(object).map_err(|e| {
        CaseError::bad_request(ErrorCode::InvalidSubmission)
          .with_context(format!("field '{}': {}", name, e))
      })?;
      Value::File(client_file(file))
    }
    serde_json::Value::Array(_) => {
      return Err(
        CaseError::bad_request(ErrorCode::InvalidSubmission)
          .with_context(format!("field '{}' nests arrays", name)),
      );
    }
  };
  submission.push(name, value);
  Ok(())
}

/// A file described by the client. It gets a fresh id and no stored content.
fn client_file(file: File) -> File {
  File {
    id: Some(Uuid::new_v4().to_string()),
    location: None,
    link: None,
    ..file
  }
}

/// Form fields, with the envelope keys pulled out.
fn push_text(submission: &mut Submission, name: &str, value: &str) {
  match name {
    LABEL_KEY => submission.process_instance_label = Some(value.to_string()),
    TASK_KEY => submission.task_id = Some(value.to_string()),
    REQUEST_KEY => submission.request_id = Some(value.to_string()),
    _ => submission.push(name, Value::text(value)),
  }
}

#[cfg(test)]
mod tests {
  use casework_content::{FsContentStore, collect};
  use casework_model::Entity;
  use tempfile::TempDir;

  use super::*;

  fn decoder() -> (SubmissionDecoder, Arc<FsContentStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let content = Arc::new(FsContentStore::new(dir.path()));
    (SubmissionDecoder::new(content.clone()), content, dir)
  }

  fn principal() -> Principal {
    Principal::Authenticated(Entity::user("ivan"))
  }

  #[tokio::test]
  async fn test_structured_payload() {
    let (decoder, _, _dir) = decoder();
    let raw = RawSubmission::Structured(serde_json::json!({
      "processInstanceLabel": "Jane's request",
      "taskId": "t-1",
      "data": {
        "employeeName": "Jane Doe",
        "budgetNumber": 100000,
        "action": ["bonus", "promote"],
        "comments": null,
        "supportingDocument": { "name": "budget.pdf", "location": "Demonstration/x" }
      }
    }));

    let submission = decoder
      .decode(raw, "Demonstration", ActionType::Create, &principal())
      .await
      .unwrap();

    assert_eq!(submission.process_instance_label.as_deref(), Some("Jane's request"));
    assert_eq!(submission.task_id.as_deref(), Some("t-1"));
    assert_eq!(submission.submitter_id.as_deref(), Some("ivan"));
    assert_eq!(submission.data["budgetNumber"], vec![Value::text("100000")]);
    assert_eq!(submission.data["action"].len(), 2);
    assert!(!submission.data.contains_key("comments"));
    let file = submission.data["supportingDocument"][0].as_file().unwrap();
    assert_eq!(file.name, "budget.pdf");
    assert_eq!(file.location, None);
  }

  #[tokio::test]
  async fn test_structured_files_cannot_point_at_stored_content() {
    let (decoder, _, _dir) = decoder();
    let raw = RawSubmission::Structured(serde_json::json!({
      "data": {
        "supportingDocument": {
          "id": "f-1",
          "name": "theirs.pdf",
          "location": "OtherProcess/0b7c",
          "link": "https://example.test/theirs.pdf"
        }
      },
      "attachments": [
        { "id": "a-1", "name": "notes", "location": "OtherProcess/9f2e", "description": "see" }
      ]
    }));

    let submission = decoder
      .decode(raw, "Demonstration", ActionType::Attach, &principal())
      .await
      .unwrap();

    let file = submission.data["supportingDocument"][0].as_file().unwrap();
    assert_eq!(file.name, "theirs.pdf");
    assert_eq!(file.location, None);
    assert_eq!(file.link, None);
    assert_ne!(file.id.as_deref(), Some("f-1"));

    let attachment = &submission.attachments[0];
    assert_eq!(attachment.location, None);
    assert_eq!(attachment.description.as_deref(), Some("see"));
    assert_ne!(attachment.id.as_deref(), Some("a-1"));
    assert!(submission.file_locations().is_empty());
  }

  #[tokio::test]
  async fn test_nested_arrays_are_rejected() {
    let (decoder, _, _dir) = decoder();
    let raw = RawSubmission::Structured(serde_json::json!({ "data": { "x": [["a"]] } }));

    let result = decoder
      .decode(raw, "Demonstration", ActionType::Create, &principal())
      .await;
    assert!(matches!(
      result,
      Err(CaseError::BadRequest { code: ErrorCode::InvalidSubmission, .. })
    ));
  }

  #[tokio::test]
  async fn test_form_encoded_body() {
    let (decoder, _, _dir) = decoder();
    let body = Bytes::from_static(b"employeeName=Jane+Doe&action=bonus&action=transfer&taskId=t-9");

    let submission = decoder
      .decode(
        RawSubmission::FormUrlEncoded(body),
        "Demonstration",
        ActionType::Complete,
        &principal(),
      )
      .await
      .unwrap();

    assert_eq!(submission.action, ActionType::Complete);
    assert_eq!(submission.task_id.as_deref(), Some("t-9"));
    assert_eq!(submission.data["employeeName"], vec![Value::text("Jane Doe")]);
    assert_eq!(
      submission.data["action"],
      vec![Value::text("bonus"), Value::text("transfer")]
    );
    assert!(!submission.data.contains_key("taskId"));
  }

  #[tokio::test]
  async fn test_multipart_streams_files_to_content_store() {
    let (decoder, content, _dir) = decoder();
    let parts = vec![
      MultipartPart::text("employeeName", "Jane Doe"),
      MultipartPart::file(
        "supportingDocument",
        "budget.pdf",
        "application/pdf",
        Bytes::from_static(b"%PDF-1.4"),
      ),
      MultipartPart::file("empty", "", "application/octet-stream", Bytes::new()),
    ];

    let submission = decoder
      .decode(
        RawSubmission::Multipart(parts),
        "Demonstration",
        ActionType::Create,
        &Principal::Anonymous,
      )
      .await
      .unwrap();

    assert_eq!(submission.submitter_id, None);
    assert!(!submission.data.contains_key("empty"));
    let file = submission.data["supportingDocument"][0].as_file().unwrap();
    assert_eq!(file.name, "budget.pdf");
    let location = file.location.clone().unwrap();
    assert!(location.starts_with("Demonstration/"));

    let stored = collect(content.get(&location).await.unwrap()).await.unwrap();
    assert_eq!(&stored[..], b"%PDF-1.4");
  }

  #[tokio::test]
  async fn test_multipart_rejects_invalid_utf8() {
    let (decoder, _, _dir) = decoder();
    let part = MultipartPart {
      name: "employeeName".to_string(),
      filename: None,
      content_type: None,
      body: Bytes::from_static(&[0xff, 0xfe]),
    };

    let result = decoder
      .decode(
        RawSubmission::Multipart(vec![part]),
        "Demonstration",
        ActionType::Create,
        &principal(),
      )
      .await;
    assert!(matches!(result, Err(CaseError::BadRequest { .. })));
  }

  #[tokio::test]
  async fn test_failed_multipart_leaves_no_uploads() {
    let (decoder, _, dir) = decoder();
    let parts = vec![
      MultipartPart::file(
        "supportingDocument",
        "budget.pdf",
        "application/pdf",
        Bytes::from_static(b"%PDF-1.4"),
      ),
      MultipartPart {
        name: "employeeName".to_string(),
        filename: None,
        content_type: None,
        body: Bytes::from_static(&[0xff, 0xfe]),
      },
    ];

    let result = decoder
      .decode(
        RawSubmission::Multipart(parts),
        "Demonstration",
        ActionType::Create,
        &principal(),
      )
      .await;

    assert!(result.is_err());
    let left = std::fs::read_dir(dir.path().join("Demonstration"))
      .map(|entries| entries.count())
      .unwrap_or(0);
    assert_eq!(left, 0);
  }
}
