//! Telegram integration database operations

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::TelegramIntegration;

impl Database {
    /// Save a Telegram integration (upsert by user, reactivating it)
    pub fn upsert_telegram_integration(
        &self,
        user_id: &str,
        bot_token: &str,
    ) -> SqliteResult<TelegramIntegration> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM telegram_integrations WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .ok();

        if let Some(id) = existing {
            // Keep the learned chat_id only when the token is unchanged; a new
            // bot means the old chat binding is no longer valid
            conn.execute(
                "UPDATE telegram_integrations
                 SET bot_token = ?1,
                     chat_id = CASE WHEN bot_token = ?1 THEN chat_id ELSE NULL END,
                     active = 1, updated_at = ?2
                 WHERE id = ?3",
                rusqlite::params![bot_token, &now, id],
            )?;
        } else {
            conn.execute(
                "INSERT INTO telegram_integrations (user_id, bot_token, active, created_at, updated_at)
                 VALUES (?1, ?2, 1, ?3, ?4)",
                rusqlite::params![user_id, bot_token, &now, &now],
            )?;
        }

        drop(conn);

        // Return the saved integration
        self.get_telegram_integration(user_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Get a user's Telegram integration regardless of active state
    pub fn get_telegram_integration(
        &self,
        user_id: &str,
    ) -> SqliteResult<Option<TelegramIntegration>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, user_id, bot_token, chat_id, active, created_at, updated_at
             FROM telegram_integrations WHERE user_id = ?1",
        )?;

        let integration = stmt
            .query_row([user_id], |row| Self::row_to_integration(row))
            .ok();

        Ok(integration)
    }

    /// List every active integration, used at startup to relaunch bots
    pub fn list_active_telegram_integrations(&self) -> SqliteResult<Vec<TelegramIntegration>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, user_id, bot_token, chat_id, active, created_at, updated_at
             FROM telegram_integrations WHERE active = 1 ORDER BY user_id",
        )?;

        let integrations = stmt
            .query_map([], |row| Self::row_to_integration(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(integrations)
    }

    /// Remember the chat the user talks to their bot from
    pub fn set_telegram_chat_id(&self, user_id: &str, chat_id: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE telegram_integrations SET chat_id = ?1, updated_at = ?2 WHERE user_id = ?3",
            rusqlite::params![chat_id, &now, user_id],
        )?;
        Ok(())
    }

    /// Deactivate a user's integration; returns whether a row changed
    pub fn deactivate_telegram_integration(&self, user_id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE telegram_integrations SET active = 0, updated_at = ?1 WHERE user_id = ?2",
            rusqlite::params![&now, user_id],
        )?;
        Ok(changed > 0)
    }

    fn row_to_integration(row: &rusqlite::Row) -> rusqlite::Result<TelegramIntegration> {
        let created_at_str: String = row.get(5)?;
        let updated_at_str: String = row.get(6)?;

        Ok(TelegramIntegration {
            id: row.get(0)?,
            user_id: row.get(1)?,
            bot_token: row.get(2)?,
            chat_id: row.get(3)?,
            active: row.get::<_, i32>(4)? != 0,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("test.db").to_str().unwrap()).unwrap();
        (dir, db)
    }

    #[test]
    fn upsert_is_idempotent_per_user() {
        let (_dir, db) = db();
        db.upsert_telegram_integration("u1", "token-a").unwrap();
        db.upsert_telegram_integration("u1", "token-b").unwrap();

        let active = db.list_active_telegram_integrations().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].bot_token, "token-b");
    }

    #[test]
    fn replacing_token_clears_learned_chat_id() {
        let (_dir, db) = db();
        db.upsert_telegram_integration("u1", "token-a").unwrap();
        db.set_telegram_chat_id("u1", "12345").unwrap();

        db.upsert_telegram_integration("u1", "token-b").unwrap();
        let integration = db.get_telegram_integration("u1").unwrap().unwrap();
        assert_eq!(integration.chat_id, None);
    }

    #[test]
    fn deactivation_hides_from_active_list() {
        let (_dir, db) = db();
        db.upsert_telegram_integration("u1", "token-a").unwrap();
        assert!(db.deactivate_telegram_integration("u1").unwrap());

        assert!(db.list_active_telegram_integrations().unwrap().is_empty());
        // The record itself survives for reactivation
        assert!(db.get_telegram_integration("u1").unwrap().is_some());
    }

    #[test]
    fn deactivating_unknown_user_reports_no_change() {
        let (_dir, db) = db();
        assert!(!db.deactivate_telegram_integration("ghost").unwrap());
    }
}
