//! JSON-file note store, sibling of the task store

use crate::stores::NoteStore;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct JsonNoteStore {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonNoteStore {
    pub fn new(storage_dir: &str) -> Self {
        Self {
            base_dir: Path::new(storage_dir).join("users"),
            write_lock: Mutex::new(()),
        }
    }

    fn file_path(&self, user_id: &str) -> PathBuf {
        self.base_dir.join(user_id).join("notes.json")
    }

    fn load(&self, user_id: &str) -> Result<Vec<Value>, String> {
        let path = self.file_path(user_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&path).map_err(|e| format!("Failed to read notes: {}", e))?;
        serde_json::from_str(&data).map_err(|e| format!("Failed to parse notes: {}", e))
    }

    fn persist(&self, user_id: &str, notes: &[Value]) -> Result<(), String> {
        let path = self.file_path(user_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create user dir: {}", e))?;
        }
        let data = serde_json::to_string_pretty(notes)
            .map_err(|e| format!("Failed to serialize notes: {}", e))?;
        fs::write(&path, data).map_err(|e| format!("Failed to write notes: {}", e))
    }
}

#[async_trait]
impl NoteStore for JsonNoteStore {
    async fn create(&self, user_id: &str, fields: Map<String, Value>) -> Result<Value, String> {
        let _guard = self.write_lock.lock();
        let mut notes = self.load(user_id)?;

        let mut note = Map::new();
        note.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
        note.insert("createdAt".to_string(), json!(Utc::now().to_rfc3339()));
        for (key, value) in fields {
            note.insert(key, value);
        }

        let record = Value::Object(note);
        notes.push(record.clone());
        self.persist(user_id, &notes)?;
        log::info!("Created note for user {}", user_id);
        Ok(record)
    }

    async fn update(
        &self,
        user_id: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), String> {
        let _guard = self.write_lock.lock();
        let mut notes = self.load(user_id)?;

        let note = notes
            .iter_mut()
            .filter_map(|n| n.as_object_mut())
            .find(|n| n.get("id").and_then(|v| v.as_str()) == Some(id))
            .ok_or_else(|| format!("Note {} not found", id))?;

        for (key, value) in fields {
            note.insert(key, value);
        }
        note.insert("updatedAt".to_string(), json!(Utc::now().to_rfc3339()));

        self.persist(user_id, &notes)
    }

    async fn remove(&self, user_id: &str, id: &str) -> Result<(), String> {
        let _guard = self.write_lock.lock();
        let mut notes = self.load(user_id)?;
        let before = notes.len();
        notes.retain(|n| n.get("id").and_then(|v| v.as_str()) != Some(id));
        if notes.len() == before {
            return Err(format!("Note {} not found", id));
        }
        self.persist(user_id, &notes)
    }

    async fn find_all_formatted(&self, user_id: &str) -> String {
        let notes = match self.load(user_id) {
            Ok(n) => n,
            Err(e) => {
                log::error!("Error reading notes data for AI context: {}", e);
                return "Error al recuperar las notas.".to_string();
            }
        };

        if notes.is_empty() {
            return "No hay notas registradas aún.".to_string();
        }

        let relevant: Vec<Value> = notes
            .iter()
            .map(|note| {
                json!({
                    "id": note.get("id"),
                    "title": note.get("title"),
                    "content": note.get("content"),
                    "tagColor": note.get("tagColor"),
                    "createdAt": note.get("createdAt"),
                })
            })
            .collect();

        serde_json::to_string_pretty(&relevant)
            .unwrap_or_else(|_| "Error al recuperar las notas.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn create_and_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = JsonNoteStore::new(dir.path().to_str().unwrap());

        store
            .create(
                "u1",
                fields(&[("title", json!("ideas")), ("content", json!("escribir blog"))]),
            )
            .await
            .unwrap();

        let snapshot = store.find_all_formatted("u1").await;
        assert!(snapshot.contains("ideas"));
        assert!(snapshot.contains("escribir blog"));
    }

    #[tokio::test]
    async fn remove_unknown_id_fails() {
        let dir = TempDir::new().unwrap();
        let store = JsonNoteStore::new(dir.path().to_str().unwrap());
        assert!(store.remove("u1", "missing").await.is_err());
    }
}
