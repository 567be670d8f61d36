use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use stridopt_shared::constants::TASKS;
use stridopt_shared::error::Field;
use stridopt_shared::{DocId, Identity, Recurrence, Task, ValidationError};
use stridopt_store::{fields, to_fields};

use super::require_doc;
use crate::error::{ClientError, Result};
use crate::state::Backend;

fn task_text(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::new(Field::Text, "Task cannot be empty").into());
    }
    Ok(text.to_string())
}

async fn owned_task(backend: &Backend, me: &Identity, id: &DocId) -> Result<Task> {
    let doc = backend.docs.get(TASKS, id.as_str()).await?;
    let task: Task = require_doc(doc, "task", id.as_str())?;
    if task.user_id != me.id {
        return Err(ClientError::Forbidden("task belongs to another user"));
    }
    Ok(task)
}

pub async fn add_task(backend: &Backend, me: &Identity, text: &str, recurrence: Recurrence) -> Result<DocId> {
    let task = Task {
        user_id: me.id.clone(),
        text: task_text(text)?,
        completed: false,
        recurrence,
        created_at: Some(Utc::now()),
        ..Default::default()
    };
    let id = backend.docs.create(TASKS, to_fields(&task)?).await?;
    debug!(task = %id, "task added");
    Ok(DocId::new(id))
}

/// Flip completion. Completing stamps `lastCompleted`; un-completing clears it.
pub async fn toggle_task(backend: &Backend, me: &Identity, id: &DocId) -> Result<bool> {
    let task = owned_task(backend, me, id).await?;
    let completed = !task.completed;
    let last_completed = if completed { json!(Utc::now()) } else { Value::Null };
    backend
        .docs
        .update(
            TASKS,
            id.as_str(),
            fields(json!({ "completed": completed, "lastCompleted": last_completed })),
        )
        .await?;
    Ok(completed)
}

pub async fn rename_task(backend: &Backend, me: &Identity, id: &DocId, text: &str) -> Result<()> {
    let text = task_text(text)?;
    owned_task(backend, me, id).await?;
    backend
        .docs
        .update(TASKS, id.as_str(), fields(json!({ "text": text })))
        .await?;
    Ok(())
}

pub async fn delete_task(backend: &Backend, me: &Identity, id: &DocId) -> Result<()> {
    owned_task(backend, me, id).await?;
    backend.docs.delete(TASKS, id.as_str()).await?;
    Ok(())
}
