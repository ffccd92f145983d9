//! Durable conversation transcript
//!
//! One append-only markdown file per (user, conversation). Turns are immutable
//! once written. Like the rest of the memory layer, writes are best-effort.

use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct ConversationLog {
    storage_path: PathBuf,
}

impl ConversationLog {
    pub fn new(storage_dir: &str) -> Self {
        let storage_path = Path::new(storage_dir).join("memory");
        if let Err(e) = fs::create_dir_all(&storage_path) {
            log::error!("Failed to create conversation storage directory: {}", e);
        }
        Self { storage_path }
    }

    fn file_path(&self, user_id: &str, conversation_id: &str) -> PathBuf {
        self.storage_path
            .join(format!("{}_{}.md", user_id, conversation_id))
    }

    /// Append one turn to the transcript. Failures are logged, never surfaced.
    pub fn save_turn(&self, user_id: &str, conversation_id: &str, role: &str, content: &str) {
        let entry = format!(
            "\n### [{}] {}\n{}\n---\n",
            Utc::now().to_rfc3339(),
            role.to_uppercase(),
            content
        );

        let path = self.file_path(user_id, conversation_id);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(entry.as_bytes()));

        if let Err(e) = result {
            log::error!(
                "Failed to save turn for user {} conversation {}: {}",
                user_id,
                conversation_id,
                e
            );
        }
    }

    /// Full transcript, empty when no turn was ever written
    pub fn history(&self, user_id: &str, conversation_id: &str) -> String {
        fs::read_to_string(self.file_path(user_id, conversation_id)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn turns_accumulate_in_order() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path().to_str().unwrap());

        log.save_turn("u1", "main", "user", "hola");
        log.save_turn("u1", "main", "assistant", "buenas!");

        let history = log.history("u1", "main");
        let user_pos = history.find("USER").unwrap();
        let assistant_pos = history.find("ASSISTANT").unwrap();
        assert!(user_pos < assistant_pos);
        assert!(history.contains("hola"));
        assert!(history.contains("buenas!"));
    }

    #[test]
    fn missing_transcript_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path().to_str().unwrap());
        assert_eq!(log.history("u1", "main"), "");
    }
}
