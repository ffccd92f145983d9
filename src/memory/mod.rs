//! Append-only per-user memory logs
//!
//! Each (user, category) pair maps to one markdown file that only ever grows.
//! Writes are best-effort: a failed append is logged and swallowed because
//! memory persistence must never take down the conversation that produced it.

pub mod cache;
pub mod conversation;
pub mod identity;

pub use cache::ConversationCache;
pub use conversation::ConversationLog;
pub use identity::{BotIdentity, IdentityStore};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Memory categories, one log file per category per user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum MemoryCategory {
    #[strum(serialize = "tasks")]
    Task,
    #[strum(serialize = "notes")]
    Note,
    #[strum(serialize = "reminders")]
    Reminder,
    #[strum(serialize = "general")]
    General,
}

/// File-backed dynamic memory store
pub struct MemoryStore {
    storage_path: PathBuf,
}

impl MemoryStore {
    pub fn new(storage_dir: &str) -> Self {
        let storage_path = Path::new(storage_dir).join("memory");
        if let Err(e) = fs::create_dir_all(&storage_path) {
            log::error!("Failed to create memory storage directory: {}", e);
        }
        Self { storage_path }
    }

    fn file_path(&self, user_id: &str, category: MemoryCategory) -> PathBuf {
        self.storage_path.join(format!("{}_{}.md", user_id, category))
    }

    /// Append one entry to the user's category log. Never propagates failures.
    pub fn append(&self, user_id: &str, category: MemoryCategory, content: &str) {
        let timestamp = Utc::now().to_rfc3339();
        let entry = match category {
            MemoryCategory::Task => format!("- [ ] {} _({})_\n", content, timestamp),
            MemoryCategory::Reminder => format!("- \u{1F514} {} _({})_\n", content, timestamp),
            MemoryCategory::Note => {
                format!("### {}\n{}\n\n", Utc::now().format("%d/%m/%Y"), content)
            }
            MemoryCategory::General => format!("\n## [{}]\n{}\n\n---\n", timestamp, content),
        };

        let path = self.file_path(user_id, category);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(entry.as_bytes()));

        if let Err(e) = result {
            log::error!("Failed to append {} memory for user {}: {}", category, user_id, e);
        }
    }

    /// Read the whole log for one category. Missing file reads as empty.
    pub fn read(&self, user_id: &str, category: MemoryCategory) -> String {
        fs::read_to_string(self.file_path(user_id, category)).unwrap_or_default()
    }

    /// Concatenate all non-empty categories with section headers
    pub fn read_all(&self, user_id: &str) -> String {
        let mut all = String::new();
        for category in MemoryCategory::iter() {
            let memory = self.read(user_id, category);
            if !memory.is_empty() {
                all.push_str(&format!("\n# {}\n{}\n", category.to_string().to_uppercase(), memory));
            }
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, MemoryStore) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path().to_str().unwrap());
        (dir, store)
    }

    #[test]
    fn read_missing_category_is_empty() {
        let (_dir, store) = store();
        assert_eq!(store.read("u1", MemoryCategory::Task), "");
    }

    #[test]
    fn append_then_read_preserves_order() {
        let (_dir, store) = store();
        for i in 0..5 {
            store.append("u1", MemoryCategory::Task, &format!("tarea {}", i));
        }
        let log = store.read("u1", MemoryCategory::Task);
        let positions: Vec<usize> = (0..5)
            .map(|i| log.find(&format!("tarea {}", i)).expect("entry missing"))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn read_all_skips_empty_categories() {
        let (_dir, store) = store();
        store.append("u1", MemoryCategory::Note, "apunte");
        let all = store.read_all("u1");
        assert!(all.contains("# NOTES"));
        assert!(!all.contains("# TASKS"));
        assert!(all.contains("apunte"));
    }

    #[test]
    fn categories_are_isolated_per_user() {
        let (_dir, store) = store();
        store.append("u1", MemoryCategory::General, "dato de u1");
        assert_eq!(store.read("u2", MemoryCategory::General), "");
        assert!(store.read("u1", MemoryCategory::General).contains("dato de u1"));
    }
}
