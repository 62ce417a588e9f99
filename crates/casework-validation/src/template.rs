use std::collections::BTreeMap;

use casework_config::{
  ActivityDef, ConstraintDef, ConstraintType, DeploymentDef, FieldDef, ProcessDef,
};
use casework_model::{CaseError, ErrorCode, ProcessInstance, Value};
use regex::Regex;

/// What a template is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
  /// Every field of the current activity.
  Activity,
  /// One named field of the current activity.
  SingleField,
  /// Free-form comments and files bound to the instance.
  Attachments,
}

/// Compiled conditional constraint.
#[derive(Debug, Clone)]
struct Predicate {
  field: String,
  pattern: Regex,
  and: Vec<Predicate>,
  or: Vec<Predicate>,
}

impl Predicate {
  fn compile(owner: &str, def: &ConstraintDef) -> Result<Self, CaseError> {
    let field = def.name.clone().unwrap_or_default();
    let pattern = anchored(owner, def.value.as_deref().unwrap_or_default())?;
    let children = |defs: &[ConstraintDef]| -> Result<Vec<Predicate>, CaseError> {
      defs.iter().map(|d| Predicate::compile(owner, d)).collect()
    };

    Ok(Self {
      field,
      pattern,
      and: children(&def.and)?,
      or: children(&def.or)?,
    })
  }

  /// Holds when any current value of the referenced field matches and every
  /// `and` child holds, or when any `or` alternative holds. An absent field
  /// never matches.
  fn holds(&self, current: &BTreeMap<&str, Vec<&str>>) -> bool {
    let own = current
      .get(self.field.as_str())
      .is_some_and(|values| values.iter().any(|v| self.pattern.is_match(v)))
      && self.and.iter().all(|p| p.holds(current));

    own || self.or.iter().any(|p| p.holds(current))
  }
}

/// Patterns must match the whole value.
fn anchored(field: &str, pattern: &str) -> Result<Regex, CaseError> {
  Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
    CaseError::internal(ErrorCode::ProcessIsMisconfigured)
      .with_context(format!("field '{}' has an invalid pattern: {}", field, e))
  })
}

/// A declared field with its pattern and predicates compiled.
#[derive(Debug, Clone)]
pub struct TemplateField {
  pub def: FieldDef,
  pattern: Option<Regex>,
  required_when: Vec<Predicate>,
  visible_when: Vec<Predicate>,
}

impl TemplateField {
  fn compile(def: &FieldDef) -> Result<Self, CaseError> {
    let pattern = match &def.pattern {
      Some(p) if !p.is_empty() => Some(anchored(&def.name, p)?),
      _ => None,
    };
    let predicates = |constraint_type| -> Result<Vec<Predicate>, CaseError> {
      def
        .constraints_of(constraint_type)
        .map(|c| Predicate::compile(&def.name, c))
        .collect()
    };

    Ok(Self {
      pattern,
      required_when: predicates(ConstraintType::IsOnlyRequiredWhen)?,
      visible_when: predicates(ConstraintType::IsOnlyVisibleWhen)?,
      def: def.clone(),
    })
  }

  pub fn name(&self) -> &str {
    &self.def.name
  }

  pub(crate) fn pattern(&self) -> Option<&Regex> {
    self.pattern.as_ref()
  }

  /// Visible unless a visible-when constraint fails.
  pub fn is_visible(&self, current: &BTreeMap<&str, Vec<&str>>) -> bool {
    self.visible_when.iter().all(|p| p.holds(current))
  }

  /// Required-when constraints replace the static `required` flag.
  pub fn is_required(&self, current: &BTreeMap<&str, Vec<&str>>) -> bool {
    if self.required_when.is_empty() {
      self.def.required
    } else {
      self.required_when.iter().all(|p| p.holds(current))
    }
  }
}

/// The field schema a submission is validated against.
///
/// Built fresh per request. `context` holds the instance's existing data so
/// conditional constraints can refer to fields the submission does not carry.
#[derive(Debug, Clone)]
pub struct SubmissionTemplate {
  pub process_definition_key: String,
  pub deployment_id: String,
  pub activity_key: String,
  kind: TemplateKind,
  fields: Vec<TemplateField>,
  allow_attachments: bool,
  allow_any: bool,
  context: BTreeMap<String, Vec<Value>>,
}

impl SubmissionTemplate {
  /// All fields of the instance's current activity, or of the start activity
  /// when there is no instance yet.
  pub fn for_activity(
    process: &ProcessDef,
    deployment: &DeploymentDef,
    instance: Option<&ProcessInstance>,
  ) -> Result<Self, CaseError> {
    let (activity_key, activity) = current_activity(deployment, instance)?;
    let fields = activity
      .fields
      .iter()
      .map(TemplateField::compile)
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Self {
      process_definition_key: process.process_definition_key.clone(),
      deployment_id: deployment.deployment_id.clone(),
      activity_key: activity_key.to_string(),
      kind: TemplateKind::Activity,
      fields,
      allow_attachments: activity.allow_attachments,
      allow_any: activity.allow_any,
      context: context_of(instance),
    })
  }

  /// A single field of the instance's current activity.
  ///
  /// Fails `field_does_not_exist` when the activity does not declare it.
  pub fn for_field(
    process: &ProcessDef,
    deployment: &DeploymentDef,
    instance: &ProcessInstance,
    field_name: &str,
  ) -> Result<Self, CaseError> {
    let (activity_key, activity) = current_activity(deployment, Some(instance))?;
    let def = activity
      .fields
      .iter()
      .find(|f| f.name == field_name)
      .ok_or_else(|| {
        CaseError::not_found(ErrorCode::FieldDoesNotExist).with_context(field_name.to_string())
      })?;

    Ok(Self {
      process_definition_key: process.process_definition_key.clone(),
      deployment_id: deployment.deployment_id.clone(),
      activity_key: activity_key.to_string(),
      kind: TemplateKind::SingleField,
      fields: vec![TemplateField::compile(def)?],
      allow_attachments: false,
      allow_any: false,
      context: context_of(Some(instance)),
    })
  }

  /// Attachment-shaped: every text value becomes a comment, every file a file attachment.
  pub fn for_attachments(
    process: &ProcessDef,
    deployment: &DeploymentDef,
    instance: &ProcessInstance,
  ) -> Result<Self, CaseError> {
    let (activity_key, activity) = current_activity(deployment, Some(instance))?;

    Ok(Self {
      process_definition_key: process.process_definition_key.clone(),
      deployment_id: deployment.deployment_id.clone(),
      activity_key: activity_key.to_string(),
      kind: TemplateKind::Attachments,
      fields: Vec::new(),
      allow_attachments: activity.allow_attachments,
      allow_any: false,
      context: BTreeMap::new(),
    })
  }

  pub fn kind(&self) -> TemplateKind {
    self.kind
  }

  pub fn fields(&self) -> &[TemplateField] {
    &self.fields
  }

  pub fn field(&self, name: &str) -> Option<&TemplateField> {
    self.fields.iter().find(|f| f.def.name == name)
  }

  pub fn allow_attachments(&self) -> bool {
    self.allow_attachments
  }

  pub fn allow_any(&self) -> bool {
    self.allow_any
  }

  pub fn context(&self) -> &BTreeMap<String, Vec<Value>> {
    &self.context
  }
}

fn current_activity<'a>(
  deployment: &'a DeploymentDef,
  instance: Option<&ProcessInstance>,
) -> Result<(&'a str, &'a ActivityDef), CaseError> {
  let key = instance
    .and_then(|i| i.activity_key.as_deref())
    .unwrap_or(&deployment.start_activity_key);

  deployment
    .activities
    .get_key_value(key)
    .map(|(k, a)| (k.as_str(), a))
    .ok_or_else(|| {
      CaseError::internal(ErrorCode::ProcessIsMisconfigured).with_context(format!(
        "deployment '{}' has no activity '{}'",
        deployment.deployment_id, key
      ))
    })
}

fn context_of(instance: Option<&ProcessInstance>) -> BTreeMap<String, Vec<Value>> {
  instance.map(|i| i.data.clone()).unwrap_or_default()
}
