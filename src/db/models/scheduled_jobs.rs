//! Scheduled job database operations

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::ScheduledJob;

impl Database {
    /// Enqueue a job. For jobs tied to a task, any pending job for the same
    /// task is replaced so a rescheduled task fires once, at the new time.
    pub fn schedule_job(
        &self,
        user_id: &str,
        job_type: &str,
        scheduled_for: DateTime<Utc>,
        task_id: Option<&str>,
        title: Option<&str>,
    ) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        if let Some(task_id) = task_id {
            conn.execute(
                "DELETE FROM scheduled_jobs
                 WHERE user_id = ?1 AND task_id = ?2 AND status = 'pending'",
                rusqlite::params![user_id, task_id],
            )?;
        }

        conn.execute(
            "INSERT INTO scheduled_jobs (user_id, job_type, scheduled_for, status, task_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7)",
            rusqlite::params![
                user_id,
                job_type,
                scheduled_for.timestamp_millis(),
                task_id,
                title,
                &now,
                &now
            ],
        )?;
        Ok(())
    }

    /// Pending jobs whose time has come
    pub fn due_jobs(&self, now: DateTime<Utc>) -> SqliteResult<Vec<ScheduledJob>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, user_id, job_type, scheduled_for, status, task_id, title
             FROM scheduled_jobs
             WHERE status = 'pending' AND scheduled_for <= ?1
             ORDER BY scheduled_for",
        )?;

        let jobs = stmt
            .query_map([now.timestamp_millis()], |row| Self::row_to_job(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(jobs)
    }

    pub fn mark_job_status(&self, job_id: i64, status: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE scheduled_jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status, &now, job_id],
        )?;
        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ScheduledJob> {
        let scheduled_ms: i64 = row.get(3)?;

        Ok(ScheduledJob {
            id: row.get(0)?,
            user_id: row.get(1)?,
            job_type: row.get(2)?,
            scheduled_for: Utc
                .timestamp_millis_opt(scheduled_ms)
                .single()
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            status: row.get(4)?,
            task_id: row.get(5)?,
            title: row.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{job_status, job_types};
    use chrono::Duration;
    use tempfile::TempDir;

    fn db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("test.db").to_str().unwrap()).unwrap();
        (dir, db)
    }

    #[test]
    fn future_jobs_are_not_due_yet() {
        let (_dir, db) = db();
        let now = Utc::now();
        db.schedule_job("u1", job_types::TASK_REMINDER, now + Duration::hours(1), Some("t1"), Some("cita"))
            .unwrap();

        assert!(db.due_jobs(now).unwrap().is_empty());
        assert_eq!(db.due_jobs(now + Duration::hours(2)).unwrap().len(), 1);
    }

    #[test]
    fn rescheduling_a_task_replaces_its_pending_job() {
        let (_dir, db) = db();
        let now = Utc::now();
        db.schedule_job("u1", job_types::TASK_REMINDER, now + Duration::hours(1), Some("t1"), Some("cita"))
            .unwrap();
        db.schedule_job("u1", job_types::TASK_REMINDER, now + Duration::hours(3), Some("t1"), Some("cita"))
            .unwrap();

        let due = db.due_jobs(now + Duration::hours(4)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].scheduled_for.timestamp_millis(), (now + Duration::hours(3)).timestamp_millis());
    }

    #[test]
    fn completed_jobs_drop_out_of_the_due_list() {
        let (_dir, db) = db();
        let now = Utc::now();
        db.schedule_job("u1", job_types::DAILY_SUMMARY, now - Duration::minutes(5), None, None)
            .unwrap();

        let due = db.due_jobs(now).unwrap();
        assert_eq!(due.len(), 1);
        db.mark_job_status(due[0].id, job_status::COMPLETED).unwrap();
        assert!(db.due_jobs(now).unwrap().is_empty());
    }
}
