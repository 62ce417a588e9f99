use casework_model::{Principal, ProcessInstance, Task};

/// The task a principal acts through on an instance, if any.
///
/// With several candidates the lowest task id wins, so the choice is stable
/// across requests.
pub fn allowed_task(
  instance: &ProcessInstance,
  principal: &Principal,
  limit_to_active: bool,
) -> Option<Task> {
  let user_id = principal.entity_id()?;
  instance
    .tasks
    .iter()
    .filter(|t| t.is_held_by(user_id) && (!limit_to_active || t.is_active()))
    .min_by(|a, b| a.task_instance_id.cmp(&b.task_instance_id))
    .cloned()
}
