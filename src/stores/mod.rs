//! Task and note collaborator contracts
//!
//! The conversation core never owns task/note storage. It reads serialized
//! snapshots for prompt assembly and issues create/update/delete requests
//! through these traits. The JSON-file implementations mirror the per-user
//! `tasks.json` / `notes.json` documents the rest of the product reads.

pub mod notes;
pub mod tasks;

pub use notes::JsonNoteStore;
pub use tasks::JsonTaskStore;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Fields the command executor may pass through to task persistence.
/// Anything else in a model payload is dropped before it gets here.
pub const TASK_FIELDS: &[&str] = &[
    "title",
    "project",
    "category",
    "status",
    "priority",
    "scheduledAt",
];

/// Fields the command executor may pass through to note persistence
pub const NOTE_FIELDS: &[&str] = &["title", "content", "tagColor"];

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a task from whitelisted fields; returns the stored record
    async fn create(&self, user_id: &str, fields: Map<String, Value>) -> Result<Value, String>;

    /// Apply whitelisted field changes to an existing task
    async fn update(&self, user_id: &str, id: &str, fields: Map<String, Value>)
        -> Result<(), String>;

    async fn remove(&self, user_id: &str, id: &str) -> Result<(), String>;

    /// Serialized snapshot for model consumption. Never errors: storage
    /// problems degrade to fallback text.
    async fn find_all_formatted(&self, user_id: &str) -> String;

    /// Single-record lookup, used by the scheduler to drop stale reminders
    async fn find_by_id(&self, user_id: &str, id: &str) -> Option<Value> {
        let _ = (user_id, id);
        None
    }
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn create(&self, user_id: &str, fields: Map<String, Value>) -> Result<Value, String>;

    async fn update(&self, user_id: &str, id: &str, fields: Map<String, Value>)
        -> Result<(), String>;

    async fn remove(&self, user_id: &str, id: &str) -> Result<(), String>;

    async fn find_all_formatted(&self, user_id: &str) -> String;
}
