//! JSON-file task store
//!
//! Tasks live in `storage/users/<user>/tasks.json` as a flat array. The file
//! is shared with the web product, so records keep their camelCase field
//! names. A per-store mutex serializes read-modify-write cycles.

use crate::stores::TaskStore;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct JsonTaskStore {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonTaskStore {
    pub fn new(storage_dir: &str) -> Self {
        Self {
            base_dir: Path::new(storage_dir).join("users"),
            write_lock: Mutex::new(()),
        }
    }

    fn file_path(&self, user_id: &str) -> PathBuf {
        self.base_dir.join(user_id).join("tasks.json")
    }

    fn load(&self, user_id: &str) -> Result<Vec<Value>, String> {
        let path = self.file_path(user_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&path).map_err(|e| format!("Failed to read tasks: {}", e))?;
        serde_json::from_str(&data).map_err(|e| format!("Failed to parse tasks: {}", e))
    }

    fn persist(&self, user_id: &str, tasks: &[Value]) -> Result<(), String> {
        let path = self.file_path(user_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create user dir: {}", e))?;
        }
        let data = serde_json::to_string_pretty(tasks)
            .map_err(|e| format!("Failed to serialize tasks: {}", e))?;
        fs::write(&path, data).map_err(|e| format!("Failed to write tasks: {}", e))
    }
}

#[async_trait]
impl TaskStore for JsonTaskStore {
    async fn create(&self, user_id: &str, fields: Map<String, Value>) -> Result<Value, String> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.load(user_id)?;

        let mut task = Map::new();
        task.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
        task.insert("status".to_string(), json!("pending"));
        task.insert("createdAt".to_string(), json!(Utc::now().to_rfc3339()));
        for (key, value) in fields {
            task.insert(key, value);
        }

        let record = Value::Object(task);
        tasks.push(record.clone());
        self.persist(user_id, &tasks)?;
        log::info!("Created task for user {}", user_id);
        Ok(record)
    }

    async fn update(
        &self,
        user_id: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), String> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.load(user_id)?;

        let task = tasks
            .iter_mut()
            .filter_map(|t| t.as_object_mut())
            .find(|t| t.get("id").and_then(|v| v.as_str()) == Some(id))
            .ok_or_else(|| format!("Task {} not found", id))?;

        for (key, value) in fields {
            task.insert(key, value);
        }
        task.insert("updatedAt".to_string(), json!(Utc::now().to_rfc3339()));

        self.persist(user_id, &tasks)
    }

    async fn remove(&self, user_id: &str, id: &str) -> Result<(), String> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.load(user_id)?;
        let before = tasks.len();
        tasks.retain(|t| t.get("id").and_then(|v| v.as_str()) != Some(id));
        if tasks.len() == before {
            return Err(format!("Task {} not found", id));
        }
        self.persist(user_id, &tasks)
    }

    async fn find_by_id(&self, user_id: &str, id: &str) -> Option<Value> {
        self.load(user_id)
            .ok()?
            .into_iter()
            .find(|t| t.get("id").and_then(|v| v.as_str()) == Some(id))
    }

    async fn find_all_formatted(&self, user_id: &str) -> String {
        let tasks = match self.load(user_id) {
            Ok(t) => t,
            Err(e) => {
                log::error!("Error reading tasks data for AI context: {}", e);
                return "Error al recuperar las tareas.".to_string();
            }
        };

        if tasks.is_empty() {
            return "No hay tareas registradas aún.".to_string();
        }

        // Keep the raw fields plus a human-readable date so the model does not
        // have to decode unix timestamps
        let relevant: Vec<Value> = tasks
            .iter()
            .map(|task| {
                let date_str = task
                    .get("scheduledAt")
                    .and_then(|v| v.as_i64())
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .map(|dt| dt.format("%d/%m/%Y").to_string());
                json!({
                    "id": task.get("id"),
                    "title": task.get("title"),
                    "project": task.get("project"),
                    "category": task.get("category"),
                    "status": task.get("status"),
                    "priority": task.get("priority"),
                    "scheduledAt": task.get("scheduledAt"),
                    "dateStr": date_str,
                })
            })
            .collect();

        serde_json::to_string_pretty(&relevant)
            .unwrap_or_else(|_| "Error al recuperar las tareas.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, JsonTaskStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path().to_str().unwrap());
        (dir, store)
    }

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn create_assigns_id_and_defaults() {
        let (_dir, store) = store();
        let task = store
            .create("u1", fields(&[("title", json!("comprar leche"))]))
            .await
            .unwrap();
        assert!(task.get("id").and_then(|v| v.as_str()).is_some());
        assert_eq!(task.get("status").unwrap(), "pending");
        assert_eq!(task.get("title").unwrap(), "comprar leche");
    }

    #[tokio::test]
    async fn update_unknown_id_fails() {
        let (_dir, store) = store();
        let err = store
            .update("u1", "missing", fields(&[("status", json!("completed"))]))
            .await
            .unwrap_err();
        assert!(err.contains("not found"));
    }

    #[tokio::test]
    async fn update_then_snapshot_reflects_change() {
        let (_dir, store) = store();
        let task = store
            .create("u1", fields(&[("title", json!("llamar al banco"))]))
            .await
            .unwrap();
        let id = task.get("id").unwrap().as_str().unwrap().to_string();

        store
            .update("u1", &id, fields(&[("status", json!("completed"))]))
            .await
            .unwrap();

        let snapshot = store.find_all_formatted("u1").await;
        assert!(snapshot.contains("completed"));
    }

    #[tokio::test]
    async fn remove_deletes_record() {
        let (_dir, store) = store();
        let task = store
            .create("u1", fields(&[("title", json!("borrar"))]))
            .await
            .unwrap();
        let id = task.get("id").unwrap().as_str().unwrap().to_string();

        store.remove("u1", &id).await.unwrap();
        assert_eq!(store.find_all_formatted("u1").await, "No hay tareas registradas aún.");
    }

    #[tokio::test]
    async fn empty_store_has_fallback_text() {
        let (_dir, store) = store();
        assert_eq!(store.find_all_formatted("u1").await, "No hay tareas registradas aún.");
    }
}
