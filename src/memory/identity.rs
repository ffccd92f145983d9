//! Per-user assistant identity
//!
//! One mutable JSON record per user with sensible Spanish defaults when the
//! user never customized anything.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotIdentity {
    pub name: String,
    pub greeting: String,
    pub personality: String,
    #[serde(default)]
    pub interests: String,
}

impl Default for BotIdentity {
    fn default() -> Self {
        Self {
            name: "Lylla Asistent".to_string(),
            greeting: "Hola! Soy tu asistente virtual, ¿en qué puedo ayudarte hoy?".to_string(),
            personality: "Eres un asistente profesional y conciso, con un tono amable y servicial. \
                          Tu objetivo es ayudar al usuario en sus tareas diarias de manera eficiente y precisa."
                .to_string(),
            interests: "Me gusta hablar de tecnologia, programacion, IA, etc.".to_string(),
        }
    }
}

pub struct IdentityStore {
    storage_path: PathBuf,
}

impl IdentityStore {
    pub fn new(storage_dir: &str) -> Self {
        let storage_path = Path::new(storage_dir).join("memory");
        if let Err(e) = fs::create_dir_all(&storage_path) {
            log::error!("Failed to create identity storage directory: {}", e);
        }
        Self { storage_path }
    }

    fn identity_path(&self, user_id: &str) -> PathBuf {
        self.storage_path.join(format!("{}_identity.json", user_id))
    }

    /// Load the identity for a user, falling back to the defaults
    pub fn get(&self, user_id: &str) -> BotIdentity {
        match fs::read_to_string(self.identity_path(user_id)) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("Corrupt identity record for user {}: {}", user_id, e);
                BotIdentity::default()
            }),
            Err(_) => BotIdentity::default(),
        }
    }

    /// Persist the identity record, replacing any previous version
    pub fn save(&self, user_id: &str, identity: &BotIdentity) -> Result<(), String> {
        let path = self.identity_path(user_id);
        let json = serde_json::to_string_pretty(identity)
            .map_err(|e| format!("Failed to serialize identity: {}", e))?;
        fs::write(&path, json).map_err(|e| format!("Failed to save identity: {}", e))?;
        log::info!("Saved identity for user {}", user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_identity_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path().to_str().unwrap());
        let identity = store.get("u1");
        assert_eq!(identity.name, "Lylla Asistent");
        assert!(!identity.greeting.is_empty());
    }

    #[test]
    fn save_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path().to_str().unwrap());

        let identity = BotIdentity {
            name: "Nova".to_string(),
            greeting: "Hey!".to_string(),
            personality: "directa".to_string(),
            interests: String::new(),
        };
        store.save("u1", &identity).unwrap();

        let loaded = store.get("u1");
        assert_eq!(loaded.name, "Nova");
        assert_eq!(loaded.greeting, "Hey!");
    }
}
