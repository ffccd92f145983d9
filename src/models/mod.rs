//! Shared data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's Telegram bot registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramIntegration {
    pub id: i64,
    pub user_id: String,
    #[serde(skip_serializing)]
    pub bot_token: String,
    /// Chat to deliver proactive notifications to. Learned from the first
    /// /start the bot receives, absent until then.
    pub chat_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A deferred delivery job picked up by the scheduler loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: i64,
    pub user_id: String,
    pub job_type: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: String,
    pub task_id: Option<String>,
    pub title: Option<String>,
}

pub mod job_types {
    pub const TASK_REMINDER: &str = "TASK_REMINDER";
    pub const DAILY_SUMMARY: &str = "DAILY_SUMMARY";
}

pub mod job_status {
    pub const PENDING: &str = "pending";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}
