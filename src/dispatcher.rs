//! Conversation orchestrator
//!
//! One dispatch call covers a full turn: gather context, invoke the model,
//! execute embedded commands, persist the exchange. Only a model failure is
//! surfaced to the caller; every other collaborator degrades gracefully.

use crate::ai::ModelClient;
use crate::commands::CommandExecutor;
use crate::context::{self, PromptInputs};
use crate::memory::{ConversationCache, ConversationLog, IdentityStore, MemoryStore};
use crate::search::SearchClient;
use crate::stores::{NoteStore, TaskStore};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

const GENERIC_FAILURE: &str =
    "Lo siento, tuve un problema generando la respuesta. Inténtalo de nuevo en un momento.";

/// Result of dispatching a message
#[derive(Debug, Serialize)]
pub struct DispatchResult {
    pub response: String,
    pub options: Vec<String>,
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn success(response: String, options: Vec<String>) -> Self {
        Self {
            response,
            options,
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            response: GENERIC_FAILURE.to_string(),
            options: Vec::new(),
            error: Some(error),
        }
    }
}

/// Dispatcher routes user messages to the model and returns processed replies
pub struct MessageDispatcher {
    model: Arc<dyn ModelClient>,
    identities: Arc<IdentityStore>,
    memory: Arc<MemoryStore>,
    transcript: Arc<ConversationLog>,
    cache: Arc<ConversationCache>,
    tasks: Arc<dyn TaskStore>,
    notes: Arc<dyn NoteStore>,
    search: Arc<SearchClient>,
    executor: CommandExecutor,
}

impl MessageDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: Arc<dyn ModelClient>,
        identities: Arc<IdentityStore>,
        memory: Arc<MemoryStore>,
        transcript: Arc<ConversationLog>,
        cache: Arc<ConversationCache>,
        tasks: Arc<dyn TaskStore>,
        notes: Arc<dyn NoteStore>,
        search: Arc<SearchClient>,
        executor: CommandExecutor,
    ) -> Self {
        Self {
            model,
            identities,
            memory,
            transcript,
            cache,
            tasks,
            notes,
            search,
            executor,
        }
    }

    /// Run one conversation turn for a user
    pub async fn dispatch(
        &self,
        user_id: &str,
        conversation_id: &str,
        prompt: &str,
    ) -> DispatchResult {
        let identity = self.identities.get(user_id);
        let recent_context = self.cache.recent_context(conversation_id);

        let memories = context::detect_list_intent(prompt).and_then(|category| {
            let content = self.memory.read(user_id, category);
            if content.is_empty() {
                None
            } else {
                Some((category, content))
            }
        });

        let search_results = if context::should_search(prompt) {
            self.search.search(prompt).await
        } else {
            String::new()
        };

        let tasks_snapshot = self.tasks.find_all_formatted(user_id).await;
        let notes_snapshot = self.notes.find_all_formatted(user_id).await;

        let full_prompt = context::build_prompt(&PromptInputs {
            identity: &identity,
            now: Utc::now(),
            recent_context: &recent_context,
            tasks_snapshot: &tasks_snapshot,
            notes_snapshot: &notes_snapshot,
            memories: memories
                .as_ref()
                .map(|(category, content)| (*category, content.as_str())),
            search_results: &search_results,
            user_prompt: prompt,
        });

        let raw_response = match self.model.invoke(&full_prompt).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("Model invocation failed for user {}: {}", user_id, e);
                return DispatchResult::error(e);
            }
        };

        let processed = self.executor.process(user_id, &raw_response).await;
        if processed.executed + processed.skipped > 0 {
            log::info!(
                "Processed {} commands for user {} ({} skipped)",
                processed.executed + processed.skipped,
                user_id,
                processed.skipped
            );
        }

        // Persist the exchange, best-effort
        self.transcript
            .save_turn(user_id, conversation_id, "user", prompt);
        self.transcript
            .save_turn(user_id, conversation_id, "assistant", &processed.text);
        self.cache.add(conversation_id, "user", prompt);
        self.cache.add(conversation_id, "assistant", &processed.text);

        DispatchResult::success(processed.text, processed.options)
    }

    /// Short reminder text for a scheduled task, with a static fallback when
    /// the model is unavailable
    pub async fn generate_reminder_text(&self, user_id: &str, task_title: &str) -> String {
        let identity = self.identities.get(user_id);
        let prompt = format!(
            "You are {}. {}\nWrite one short, friendly reminder in Spanish for this pending task: \"{}\". \
             Reply with the reminder text only, no commands and no options.",
            identity.name, identity.personality, task_title
        );

        match self.model.invoke(&prompt).await {
            Ok(text) => {
                // The model sometimes ignores the no-commands instruction
                let processed = self.executor.process(user_id, &text).await;
                if processed.text.is_empty() {
                    format!("Recordatorio: {}", task_title)
                } else {
                    processed.text
                }
            }
            Err(e) => {
                log::warn!("Reminder generation failed for user {}: {}", user_id, e);
                format!("Recordatorio: {}", task_title)
            }
        }
    }
}
