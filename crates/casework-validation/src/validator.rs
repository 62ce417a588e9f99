use std::collections::BTreeMap;
use std::sync::Arc;

use casework_config::{ConstraintType, FieldType};
use casework_model::{File, Principal, Submission, Value};
use tracing::{debug, instrument};

use crate::directory::IdentityService;
use crate::sanitizer::Sanitizer;
use crate::template::{SubmissionTemplate, TemplateField, TemplateKind};
use crate::validation::{Message, Severity, Validation};

/// Applies a [`SubmissionTemplate`] to a [`Submission`].
pub struct Validator {
  sanitizer: Arc<dyn Sanitizer>,
  identity: Arc<dyn IdentityService>,
}

impl Validator {
  pub fn new(sanitizer: Arc<dyn Sanitizer>, identity: Arc<dyn IdentityService>) -> Self {
    Self {
      sanitizer,
      identity,
    }
  }

  /// Validate a submission against a template.
  ///
  /// Never fails: every problem becomes a [`Message`]. Only declared fields
  /// (or, for pass-through templates, sanitized extras) reach the accepted data.
  #[instrument(
    name = "submission_validate",
    skip_all,
    fields(
      process_definition_key = %template.process_definition_key,
      activity = %template.activity_key,
    )
  )]
  pub async fn validate(
    &self,
    submission: &Submission,
    template: &SubmissionTemplate,
    principal: &Principal,
  ) -> Validation {
    let mut validation = self.header(submission, template, principal);
    let submitted = self.sanitize_data(&submission.data);

    if template.kind() == TemplateKind::Attachments {
      self.accept_attachments(&submitted, submission, template, &mut validation);
      return validation;
    }

    let current = current_values(template.context(), &submitted);
    for field in template.fields() {
      self
        .validate_field(field, submitted.get(field.name()), &current, &mut validation)
        .await;
    }

    for (name, values) in &submitted {
      if template.field(name).is_some() || values.is_empty() {
        continue;
      }
      if template.allow_any() {
        validation.data.insert(name.clone(), values.clone());
      } else {
        debug!(field = %name, "dropped undeclared field");
      }
    }

    if !submission.attachments.is_empty() {
      if template.allow_attachments() {
        let files = submission.attachments.iter().map(|f| self.sanitize_file(f));
        validation.attachments.extend(files);
      } else {
        validation.messages.push(Message::general(
          Severity::Warning,
          "Attachments are not accepted for this step and were ignored",
        ));
      }
    }

    validation
  }

  fn header(
    &self,
    submission: &Submission,
    template: &SubmissionTemplate,
    principal: &Principal,
  ) -> Validation {
    let submitter_id = self
      .sanitizer
      .sanitize_opt(submission.submitter_id.as_deref())
      .or_else(|| principal.entity_id().map(str::to_string));

    Validation {
      process_definition_key: template.process_definition_key.clone(),
      activity_key: template.activity_key.clone(),
      action: submission.action,
      request_id: self.sanitizer.sanitize_opt(submission.request_id.as_deref()),
      task_id: self.sanitizer.sanitize_opt(submission.task_id.as_deref()),
      process_instance_label: self
        .sanitizer
        .sanitize_opt(submission.process_instance_label.as_deref()),
      submitter_id,
      data: BTreeMap::new(),
      restricted_data: BTreeMap::new(),
      attachments: Vec::new(),
      messages: Vec::new(),
    }
  }

  fn sanitize_data(&self, data: &BTreeMap<String, Vec<Value>>) -> BTreeMap<String, Vec<Value>> {
    data
      .iter()
      .map(|(name, values)| {
        let values = values
          .iter()
          .map(|v| self.sanitize_value(v))
          .filter(|v| !v.is_empty())
          .collect();
        (self.sanitizer.sanitize(name), values)
      })
      .collect()
  }

  fn sanitize_value(&self, value: &Value) -> Value {
    match value {
      Value::Text(text) => Value::Text(self.sanitizer.sanitize(text)),
      Value::File(file) => Value::File(self.sanitize_file(file)),
    }
  }

  /// Files are sanitized attribute by attribute.
  fn sanitize_file(&self, file: &File) -> File {
    let s = &self.sanitizer;
    File {
      id: s.sanitize_opt(file.id.as_deref()),
      name: s.sanitize(&file.name),
      content_type: s.sanitize_opt(file.content_type.as_deref()),
      location: s.sanitize_opt(file.location.as_deref()),
      link: s.sanitize_opt(file.link.as_deref()),
      description: s.sanitize_opt(file.description.as_deref()),
    }
  }

  async fn validate_field(
    &self,
    field: &TemplateField,
    values: Option<&Vec<Value>>,
    current: &BTreeMap<&str, Vec<&str>>,
    validation: &mut Validation,
  ) {
    let name = field.name();
    let values: &[Value] = values.map(Vec::as_slice).unwrap_or(&[]);

    if !field.is_visible(current) {
      return;
    }
    if !field.def.editable {
      if !values.is_empty() {
        debug!(field = %name, "ignored read-only field");
      }
      return;
    }
    if values.is_empty() {
      if field.is_required(current) {
        validation
          .messages
          .push(Message::error(name, "Field is required"));
      }
      return;
    }

    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    self.check_counts(field, values.len(), &mut errors);

    for value in values {
      match (value, field.def.field_type.is_file()) {
        (Value::File(_), true) => {}
        (Value::File(_), false) => push_unique(&mut errors, "Files are not accepted for this field"),
        (Value::Text(_), true) => push_unique(&mut errors, "Expected a file"),
        (Value::Text(text), false) => {
          self
            .check_text(field, text, &mut errors, &mut warnings)
            .await
        }
      }
    }

    validation
      .messages
      .extend(errors.iter().map(|e| Message::error(name, e.clone())));
    validation
      .messages
      .extend(warnings.into_iter().map(|w| Message::warning(name, w)));

    if errors.is_empty() {
      let target = if field.def.restricted {
        &mut validation.restricted_data
      } else {
        &mut validation.data
      };
      target.insert(name.to_string(), values.to_vec());
    }
  }

  fn check_counts(&self, field: &TemplateField, count: usize, errors: &mut Vec<String>) {
    let def = &field.def;
    if def.field_type.is_single_choice() && count > 1 {
      push_unique(errors, "Only one value is allowed");
    }
    if let Some(max) = def.max_inputs
      && count > max
    {
      push_unique(errors, &format!("No more than {} values are allowed", max));
    }
    if let Some(min) = def.min_inputs
      && count < min
    {
      push_unique(errors, &format!("At least {} values are required", min));
    }
  }

  async fn check_text(
    &self,
    field: &TemplateField,
    text: &str,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
  ) {
    let def = &field.def;
    let length = text.chars().count();

    if let Some(max) = def.max_value_length
      && length > max
    {
      push_unique(errors, &format!("Must be no more than {} characters", max));
    }
    if let Some(min) = def.min_value_length
      && length < min
    {
      push_unique(errors, &format!("Must be at least {} characters", min));
    }
    if let Some(pattern) = field.pattern()
      && !pattern.is_match(text)
    {
      let message = def
        .custom_validity
        .as_deref()
        .unwrap_or("Does not match the expected format");
      push_unique(errors, message);
    }

    match def.field_type {
      FieldType::Number if !is_numeric(text) => push_unique(errors, "Must be a number"),
      FieldType::Email if !is_email_address(text) => {
        push_unique(errors, "Must be an email address")
      }
      t if t.is_option_bound() && !def.has_option(text) => {
        push_unique(errors, "Not a valid option")
      }
      _ => {}
    }

    for constraint in &def.constraints {
      match constraint.constraint_type {
        ConstraintType::IsNumeric if !is_numeric(text) => push_unique(errors, "Must be a number"),
        ConstraintType::IsEmailAddress if !is_email_address(text) => {
          push_unique(errors, "Must be an email address")
        }
        ConstraintType::IsValidUser => {
          if self.identity.get_user(text).await.is_none() {
            push_unique(errors, "Not a valid user");
          }
        }
        ConstraintType::IsConfirmationNumber if !is_confirmation_number(text) => {
          push_unique(warnings, "Does not look like a confirmation number")
        }
        _ => {}
      }
    }
  }

  fn accept_attachments(
    &self,
    submitted: &BTreeMap<String, Vec<Value>>,
    submission: &Submission,
    template: &SubmissionTemplate,
    validation: &mut Validation,
  ) {
    let mut files = Vec::new();
    for (name, values) in submitted {
      for value in values {
        match value {
          Value::Text(comment) => files.push(File {
            description: Some(comment.clone()),
            content_type: Some("text/plain".to_string()),
            ..File::new(name.clone())
          }),
          Value::File(file) => files.push(file.clone()),
        }
      }
    }
    files.extend(submission.attachments.iter().map(|f| self.sanitize_file(f)));

    if !template.allow_attachments() {
      validation.messages.push(Message::general(
        Severity::Error,
        "Attachments are not allowed for this step",
      ));
    } else if files.is_empty() {
      validation
        .messages
        .push(Message::general(Severity::Error, "Nothing to attach"));
    } else {
      validation.attachments = files;
    }
  }
}

/// Current values by field name: submitted values override the instance's.
fn current_values<'a>(
  context: &'a BTreeMap<String, Vec<Value>>,
  submitted: &'a BTreeMap<String, Vec<Value>>,
) -> BTreeMap<&'a str, Vec<&'a str>> {
  let mut current: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
  for (name, values) in context.iter().chain(submitted.iter()) {
    if values.is_empty() {
      continue;
    }
    current.insert(name.as_str(), values.iter().map(Value::display).collect());
  }
  current
}

fn push_unique(messages: &mut Vec<String>, message: &str) {
  if !messages.iter().any(|m| m == message) {
    messages.push(message.to_string());
  }
}

fn is_numeric(text: &str) -> bool {
  text.trim().parse::<f64>().is_ok_and(f64::is_finite)
}

fn is_email_address(text: &str) -> bool {
  let Some((local, domain)) = text.split_once('@') else {
    return false;
  };
  !local.is_empty()
    && !domain.contains('@')
    && !text.chars().any(char::is_whitespace)
    && domain.contains('.')
    && !domain.starts_with('.')
    && !domain.ends_with('.')
}

/// Groups of letters and digits joined by single dashes, six or more characters in all.
fn is_confirmation_number(text: &str) -> bool {
  let groups: Vec<&str> = text.split('-').collect();
  let significant: usize = groups.iter().map(|g| g.len()).sum();
  groups
    .iter()
    .all(|g| !g.is_empty() && g.chars().all(|c| c.is_ascii_alphanumeric()))
    && significant >= 6
}
