//! Filesystem side of the Spec Factory: writing a child's spec directory
//! and updating the parent's plan to record the new child ids.

use std::path::Path;

use crate::domain::{Plan, TaskPriority};

use super::factory::{ChildContext, ChildRequirements, ChildSpecInput, SpecFactoryError};

/// Write `{specs_dir}/{id}/{spec.md,requirements.json,context.json,
/// implementation_plan.json}` for one resolved child.
pub(super) fn write_child_spec_files(
    specs_dir: &Path,
    id: &str,
    parent_spec_id: &str,
    input: &ChildSpecInput,
    depends_on: &[String],
) -> Result<(), SpecFactoryError> {
    let dir = specs_dir.join(id);
    std::fs::create_dir_all(&dir)?;

    std::fs::write(dir.join("spec.md"), format!("# {}\n\n{}\n", id, input.task))?;

    let requirements = ChildRequirements {
        task: input.task.clone(),
        acceptance_criteria: input.acceptance_criteria.clone(),
        files_to_modify: input.files_to_modify.clone(),
    };
    std::fs::write(dir.join("requirements.json"), serde_json::to_vec_pretty(&requirements)?)?;

    let context = ChildContext {
        parent_task: parent_spec_id.to_string(),
    };
    std::fs::write(dir.join("context.json"), serde_json::to_vec_pretty(&context)?)?;

    let mut plan = Plan::new(id, input.kind, input.priority);
    plan.parent_task = Some(parent_spec_id.to_string());
    plan.depends_on = depends_on.to_vec();
    std::fs::write(dir.join("implementation_plan.json"), serde_json::to_vec_pretty(&plan)?)?;

    Ok(())
}

/// Merge `childIds` into the parent's `implementation_plan.json`. The plan
/// schema preserves unknown fields round-trip, so this is done on the raw
/// JSON value rather than through [`Plan`]'s typed (and intentionally
/// closed) shape.
pub(super) fn write_parent_plan_children(
    specs_dir: &Path,
    parent_spec_id: &str,
    new_child_ids: &[String],
) -> Result<(), SpecFactoryError> {
    let parent_plan_path = specs_dir.join(parent_spec_id).join("implementation_plan.json");

    let mut value: serde_json::Value = if parent_plan_path.exists() {
        serde_json::from_str(&std::fs::read_to_string(&parent_plan_path)?)?
    } else {
        serde_json::to_value(Plan::new(parent_spec_id, crate::domain::TaskKind::Design, TaskPriority::default()))?
    };

    let existing = value
        .get("childIds")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut child_ids = existing;
    for id in new_child_ids {
        if !child_ids.contains(id) {
            child_ids.push(id.clone());
        }
    }

    if let Some(obj) = value.as_object_mut() {
        obj.insert("childIds".to_string(), serde_json::json!(child_ids));
    }

    std::fs::create_dir_all(specs_dir.join(parent_spec_id))?;
    std::fs::write(&parent_plan_path, serde_json::to_vec_pretty(&value)?)?;
    Ok(())
}
