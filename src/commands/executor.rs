//! Command execution against the task/note/memory interfaces
//!
//! Commands run with per-command failure isolation: one bad payload is logged
//! and skipped, the rest of the batch still executes. MEMORY commands run
//! before TASK_OP / NOTE_OP, and the visible text is only cleaned after every
//! family has been extracted.

use crate::commands::{self, OpAction, PendingCommand};
use crate::db::Database;
use crate::memory::MemoryStore;
use crate::models::job_types;
use crate::stores::{NoteStore, TaskStore, NOTE_FIELDS, TASK_FIELDS};
use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Result of one response-processing pass
#[derive(Debug)]
pub struct ProcessedResponse {
    /// User-visible text with all command spans and the options directive removed
    pub text: String,
    /// Quick-reply options from the trailing directive, possibly empty
    pub options: Vec<String>,
    pub executed: usize,
    pub skipped: usize,
}

pub struct CommandExecutor {
    memory: Arc<MemoryStore>,
    tasks: Arc<dyn TaskStore>,
    notes: Arc<dyn NoteStore>,
    /// Reminder-job scheduling is optional so the executor stays usable
    /// without a database (tests, reminder-only flows)
    db: Option<Arc<Database>>,
}

impl CommandExecutor {
    pub fn new(
        memory: Arc<MemoryStore>,
        tasks: Arc<dyn TaskStore>,
        notes: Arc<dyn NoteStore>,
        db: Option<Arc<Database>>,
    ) -> Self {
        Self {
            memory,
            tasks,
            notes,
            db,
        }
    }

    /// Extract, execute, and strip every command in a model reply
    pub async fn process(&self, user_id: &str, response: &str) -> ProcessedResponse {
        let scanned = commands::scan(response);
        let spans: Vec<_> = scanned.iter().map(|c| c.span.clone()).collect();

        let mut executed = 0;
        let mut skipped = scanned.iter().filter(|c| c.command.is_none()).count();

        let commands: Vec<PendingCommand> =
            scanned.into_iter().filter_map(|c| c.command).collect();

        // Memory first: a memory append must not depend on whether a later
        // task mutation in the same batch succeeds
        for command in &commands {
            if let PendingCommand::Memory { category, content } = command {
                self.memory.append(user_id, *category, content);
                executed += 1;
            }
        }

        for command in &commands {
            let result = match command {
                PendingCommand::Memory { .. } => continue,
                PendingCommand::TaskOp { action, payload } => {
                    self.execute_task_op(user_id, *action, payload).await
                }
                PendingCommand::NoteOp { action, payload } => {
                    self.execute_note_op(user_id, *action, payload).await
                }
            };

            match result {
                Ok(()) => executed += 1,
                Err(e) => {
                    log::warn!("Skipping command for user {}: {}", user_id, e);
                    skipped += 1;
                }
            }
        }

        // Visible-text cleanup happens only after all families were extracted
        let stripped = commands::strip_spans(response, &spans);
        let (text, options) = commands::extract_options(&stripped);

        ProcessedResponse {
            text,
            options,
            executed,
            skipped,
        }
    }

    async fn execute_task_op(
        &self,
        user_id: &str,
        action: OpAction,
        payload: &Value,
    ) -> Result<(), String> {
        let object = payload
            .as_object()
            .ok_or_else(|| "TASK_OP payload is not an object".to_string())?;

        match action {
            OpAction::Create => {
                let fields = filter_fields(object, TASK_FIELDS);
                let task = self.tasks.create(user_id, fields).await?;
                self.maybe_schedule_reminder(user_id, &task);
                Ok(())
            }
            OpAction::Update => {
                let id = require_id(object, "TASK_OP UPDATE")?;
                let fields = filter_fields(object, TASK_FIELDS);
                self.tasks.update(user_id, &id, fields).await
            }
            OpAction::Delete => {
                let id = require_id(object, "TASK_OP DELETE")?;
                self.tasks.remove(user_id, &id).await
            }
        }
    }

    async fn execute_note_op(
        &self,
        user_id: &str,
        action: OpAction,
        payload: &Value,
    ) -> Result<(), String> {
        let object = payload
            .as_object()
            .ok_or_else(|| "NOTE_OP payload is not an object".to_string())?;

        match action {
            OpAction::Create => {
                let fields = filter_fields(object, NOTE_FIELDS);
                self.notes.create(user_id, fields).await.map(|_| ())
            }
            OpAction::Update => {
                let id = require_id(object, "NOTE_OP UPDATE")?;
                let fields = filter_fields(object, NOTE_FIELDS);
                self.notes.update(user_id, &id, fields).await
            }
            OpAction::Delete => {
                let id = require_id(object, "NOTE_OP DELETE")?;
                self.notes.remove(user_id, &id).await
            }
        }
    }

    /// Enqueue a TASK_REMINDER job when a created task is scheduled in the
    /// future. Best-effort: scheduling failures never fail the command.
    fn maybe_schedule_reminder(&self, user_id: &str, task: &Value) {
        let Some(db) = &self.db else { return };

        let Some(scheduled_ms) = task.get("scheduledAt").and_then(|v| v.as_i64()) else {
            return;
        };
        let Some(scheduled_for) = Utc.timestamp_millis_opt(scheduled_ms).single() else {
            log::warn!("Task has out-of-range scheduledAt {}; skipping reminder", scheduled_ms);
            return;
        };
        if scheduled_for <= Utc::now() {
            return;
        }

        let task_id = task.get("id").and_then(|v| v.as_str()).unwrap_or_default();
        let title = task.get("title").and_then(|v| v.as_str()).unwrap_or("(sin título)");

        if let Err(e) = db.schedule_job(
            user_id,
            job_types::TASK_REMINDER,
            scheduled_for,
            Some(task_id),
            Some(title),
        ) {
            log::error!("Failed to schedule reminder for task {}: {}", task_id, e);
        }
    }
}

/// Keep only whitelisted fields. Hallucinated extras (restated date strings,
/// invented flags) must never reach persistence.
fn filter_fields(payload: &Map<String, Value>, allowed: &[&str]) -> Map<String, Value> {
    payload
        .iter()
        .filter(|(key, _)| allowed.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// UPDATE/DELETE must carry an explicit id - the model may hallucinate one,
/// but it may never mutate without one
fn require_id(payload: &Map<String, Value>, context: &str) -> Result<String, String> {
    payload
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|id| !id.trim().is_empty())
        .map(|id| id.to_string())
        .ok_or_else(|| format!("{} is missing a valid 'id' field", context))
}
