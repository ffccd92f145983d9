//! Deferred delivery loop
//!
//! Polls the scheduled_jobs table and pushes reminders and daily summaries
//! through the Telegram manager. Jobs are marked completed even when delivery
//! could not happen (no running bot, no bound chat): delivery is best-effort
//! and a job must never fire twice.

use crate::channels::TelegramManager;
use crate::db::Database;
use crate::dispatcher::MessageDispatcher;
use crate::models::{job_status, job_types, ScheduledJob};
use crate::stores::TaskStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// How often the loop checks for due jobs
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

pub struct Scheduler {
    db: Arc<Database>,
    manager: Arc<TelegramManager>,
    dispatcher: Arc<MessageDispatcher>,
    tasks: Arc<dyn TaskStore>,
}

impl Scheduler {
    pub fn new(
        db: Arc<Database>,
        manager: Arc<TelegramManager>,
        dispatcher: Arc<MessageDispatcher>,
        tasks: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            db,
            manager,
            dispatcher,
            tasks,
        }
    }

    /// Run forever, processing due jobs every poll interval
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            interval.tick().await;
            self.process_due_jobs().await;
        }
    }

    /// One poll pass. Each job is isolated: a failing job is marked failed
    /// and the rest of the batch still runs.
    pub async fn process_due_jobs(&self) {
        let due = match self.db.due_jobs(Utc::now()) {
            Ok(jobs) => jobs,
            Err(e) => {
                log::error!("Failed to query due jobs: {}", e);
                return;
            }
        };

        for job in due {
            let status = match job.job_type.as_str() {
                job_types::TASK_REMINDER => self.deliver_task_reminder(&job).await,
                job_types::DAILY_SUMMARY => self.deliver_daily_summary(&job).await,
                other => {
                    log::warn!("Unknown job type '{}' for job {}", other, job.id);
                    job_status::FAILED
                }
            };

            if let Err(e) = self.db.mark_job_status(job.id, status) {
                log::error!("Failed to mark job {} as {}: {}", job.id, status, e);
            }
        }
    }

    async fn deliver_task_reminder(&self, job: &ScheduledJob) -> &'static str {
        let Some(task_id) = job.task_id.as_deref() else {
            log::warn!("Reminder job {} has no task id", job.id);
            return job_status::FAILED;
        };

        // The task may have been completed or deleted since scheduling
        let task = self.tasks.find_by_id(&job.user_id, task_id).await;
        let still_pending = task
            .as_ref()
            .map(|t| t.get("status").and_then(|s| s.as_str()) != Some("completed"))
            .unwrap_or(false);
        if !still_pending {
            log::info!("Skipping stale reminder for task {} of user {}", task_id, job.user_id);
            return job_status::COMPLETED;
        }

        let title = job
            .title
            .as_deref()
            .or_else(|| task.as_ref().and_then(|t| t.get("title").and_then(|v| v.as_str())))
            .unwrap_or("tu tarea pendiente")
            .to_string();

        let text = self
            .dispatcher
            .generate_reminder_text(&job.user_id, &title)
            .await;
        self.manager.notify(&job.user_id, &text).await;
        job_status::COMPLETED
    }

    async fn deliver_daily_summary(&self, job: &ScheduledJob) -> &'static str {
        let snapshot = self.tasks.find_all_formatted(&job.user_id).await;
        let text = daily_summary_text(&snapshot, Utc::now());
        self.manager.notify(&job.user_id, &text).await;
        job_status::COMPLETED
    }
}

/// Morning summary line. Counts only pending tasks whose scheduledAt falls on
/// the local calendar day containing `now`; undated backlog items stay out.
fn daily_summary_text(snapshot: &str, now: DateTime<Utc>) -> String {
    let (day_start, day_end) = crate::context::local_day_bounds(now);

    let pending = serde_json::from_str::<Vec<serde_json::Value>>(snapshot)
        .map(|tasks| {
            tasks
                .iter()
                .filter(|t| t.get("status").and_then(|s| s.as_str()) == Some("pending"))
                .filter(|t| {
                    t.get("scheduledAt")
                        .and_then(|v| v.as_i64())
                        .map(|ms| ms >= day_start && ms < day_end)
                        .unwrap_or(false)
                })
                .count()
        })
        .unwrap_or(0);

    match pending {
        0 => "Buenos días. No tienes tareas pendientes para hoy.".to_string(),
        1 => "Buenos días. Tienes 1 tarea pendiente para hoy.".to_string(),
        n => format!("Buenos días. Tienes {} tareas pendientes para hoy.", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ModelClient;
    use crate::commands::CommandExecutor;
    use crate::memory::{ConversationCache, ConversationLog, IdentityStore, MemoryStore};
    use crate::search::SearchClient;
    use crate::stores::{JsonNoteStore, JsonTaskStore, NoteStore};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use serde_json::{json, Map, Value};
    use tempfile::TempDir;

    struct OfflineModel;

    #[async_trait]
    impl ModelClient for OfflineModel {
        async fn invoke(&self, _prompt: &str) -> Result<String, String> {
            Err("offline".to_string())
        }
    }

    struct Fixture {
        _dir: TempDir,
        db: Arc<Database>,
        tasks: Arc<JsonTaskStore>,
        scheduler: Scheduler,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = dir.path().to_str().unwrap();
        let db = Arc::new(Database::new(dir.path().join("test.db").to_str().unwrap()).unwrap());
        let memory = Arc::new(MemoryStore::new(storage));
        let identities = Arc::new(IdentityStore::new(storage));
        let tasks = Arc::new(JsonTaskStore::new(storage));
        let tasks_dyn: Arc<dyn TaskStore> = tasks.clone();
        let notes: Arc<dyn NoteStore> = Arc::new(JsonNoteStore::new(storage));
        let executor = CommandExecutor::new(
            memory.clone(),
            tasks_dyn.clone(),
            notes.clone(),
            Some(db.clone()),
        );
        let dispatcher = Arc::new(MessageDispatcher::new(
            Arc::new(OfflineModel),
            identities.clone(),
            memory,
            Arc::new(ConversationLog::new(storage)),
            Arc::new(ConversationCache::new()),
            tasks_dyn.clone(),
            notes,
            Arc::new(SearchClient::new(None)),
            executor,
        ));
        let manager = Arc::new(TelegramManager::new(
            db.clone(),
            dispatcher.clone(),
            identities,
        ));
        let scheduler = Scheduler::new(db.clone(), manager, dispatcher, tasks_dyn);
        Fixture {
            _dir: dir,
            db,
            tasks,
            scheduler,
        }
    }

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn stale_reminder_for_deleted_task_completes_quietly() {
        let f = fixture();
        let due = Utc::now() - ChronoDuration::minutes(1);
        f.db.schedule_job("u1", job_types::TASK_REMINDER, due, Some("gone"), Some("borrada"))
            .unwrap();

        f.scheduler.process_due_jobs().await;
        assert!(f.db.due_jobs(Utc::now()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn completed_task_reminder_is_skipped() {
        let f = fixture();
        let task = f
            .tasks
            .create("u1", fields(&[("title", json!("pagar arriendo"))]))
            .await
            .unwrap();
        let id = task.get("id").unwrap().as_str().unwrap().to_string();
        f.tasks
            .update("u1", &id, fields(&[("status", json!("completed"))]))
            .await
            .unwrap();

        let due = Utc::now() - ChronoDuration::minutes(1);
        f.db.schedule_job("u1", job_types::TASK_REMINDER, due, Some(&id), Some("pagar arriendo"))
            .unwrap();

        f.scheduler.process_due_jobs().await;
        assert!(f.db.due_jobs(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn daily_summary_counts_only_tasks_scheduled_today() {
        let now = Utc::now();
        let (day_start, day_end) = crate::context::local_day_bounds(now);
        let midday = (day_start + day_end) / 2;

        let snapshot = json!([
            {"id": "a", "title": "cita médica", "status": "pending", "scheduledAt": midday},
            {"id": "b", "title": "pagar arriendo", "status": "pending", "scheduledAt": day_end + 3_600_000},
            {"id": "c", "title": "ordenar el taller", "status": "pending"},
            {"id": "d", "title": "ya hecha", "status": "completed", "scheduledAt": midday},
        ])
        .to_string();

        assert_eq!(
            daily_summary_text(&snapshot, now),
            "Buenos días. Tienes 1 tarea pendiente para hoy."
        );
        assert_eq!(
            daily_summary_text("[]", now),
            "Buenos días. No tienes tareas pendientes para hoy."
        );
    }

    #[tokio::test]
    async fn unknown_job_type_is_marked_failed_without_stopping_the_batch() {
        let f = fixture();
        let due = Utc::now() - ChronoDuration::minutes(1);
        f.db.schedule_job("u1", "MYSTERY", due, None, None).unwrap();
        f.db.schedule_job("u1", job_types::DAILY_SUMMARY, due, None, None)
            .unwrap();

        f.scheduler.process_due_jobs().await;
        // Both left the pending state, one failed and one completed
        assert!(f.db.due_jobs(Utc::now()).unwrap().is_empty());
    }
}
