//! Prompt assembly for model calls
//!
//! This module provides:
//! - Stateless intent classifiers (should-search, list intent)
//! - Localized date rendering for the system prompt
//! - The single instruction block handed to the model
//!
//! Assembly performs no mutation and holds no state. Every section is built
//! from inputs the dispatcher gathered for the current request.

use crate::memory::{BotIdentity, MemoryCategory};
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Timelike, Utc};

/// The assistant's home timezone (Colombia, no DST)
const UTC_OFFSET_HOURS: i32 = -5;

/// Basic date/time questions are answered from the system prompt itself
const SEARCH_DENYLIST: &[&str] = &[
    "qué día", "que dia", "qué hora", "que hora", "what day", "what time", "today is", "hoy es",
];

/// Only queries explicitly asking for current/live data trigger a search
const SEARCH_TRIGGERS: &[&str] = &[
    "precio actual",
    "current price",
    "precio de",
    "price of",
    "últimas noticias",
    "latest news",
    "noticias de hoy",
    "news today",
    "clima actual",
    "current weather",
    "temperatura en",
    "temperature in",
    "cotización",
    "exchange rate",
    "tasa de cambio",
    "resultados de",
    "results of",
    "marcador",
    "qué pasó hoy",
    "what happened today",
    "eventos de hoy",
];

const LIST_KEYWORDS: &[&str] = &[
    "listar", "list", "mostrar", "show", "ver", "cuáles", "qué tengo", "mis",
];

const TASK_KEYWORDS: &[&str] = &["tarea", "task", "hacer", "to do", "pendiente", "pending"];
const NOTE_KEYWORDS: &[&str] = &["nota", "note", "apunte", "anotar", "escribir"];
const REMINDER_KEYWORDS: &[&str] = &[
    "recordar",
    "reminder",
    "recordatorio",
    "no olvidar",
    "remember",
];

const WEEKDAYS_ES: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// True when the prompt explicitly asks for current/live data
pub fn should_search(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();

    if SEARCH_DENYLIST.iter().any(|q| lower.contains(q)) {
        return false;
    }

    SEARCH_TRIGGERS.iter().any(|t| lower.contains(t))
}

/// Keyword heuristic for "show me my ..." requests. This only decides which
/// memory file to surface as read context; writes go through the command
/// protocol exclusively.
pub fn detect_list_intent(prompt: &str) -> Option<MemoryCategory> {
    let lower = prompt.to_lowercase();

    if !LIST_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return None;
    }

    if TASK_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Some(MemoryCategory::Task);
    }
    if REMINDER_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Some(MemoryCategory::Reminder);
    }
    if NOTE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Some(MemoryCategory::Note);
    }

    None
}

/// "viernes, 29 de agosto de 2026, 14:05" in the assistant's timezone
pub fn localized_datetime(now: DateTime<Utc>) -> String {
    // east_opt only fails for out-of-range offsets
    let offset = FixedOffset::east_opt(UTC_OFFSET_HOURS * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    let local = now.with_timezone(&offset);

    let weekday = WEEKDAYS_ES[local.weekday().num_days_from_monday() as usize];
    let month = MONTHS_ES[local.month0() as usize];

    format!(
        "{}, {} de {} de {}, {:02}:{:02}",
        weekday,
        local.day(),
        month,
        local.year(),
        local.hour(),
        local.minute()
    )
}

/// Millisecond bounds [start, end) of the local calendar day containing `now`
pub fn local_day_bounds(now: DateTime<Utc>) -> (i64, i64) {
    let offset = FixedOffset::east_opt(UTC_OFFSET_HOURS * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    let midnight = now
        .with_timezone(&offset)
        .date_naive()
        .and_time(NaiveTime::MIN);
    let start = midnight.and_utc().timestamp_millis() - i64::from(UTC_OFFSET_HOURS) * 3_600_000;
    (start, start + 86_400_000)
}

/// Everything the dispatcher gathered for one turn
pub struct PromptInputs<'a> {
    pub identity: &'a BotIdentity,
    pub now: DateTime<Utc>,
    pub recent_context: &'a str,
    pub tasks_snapshot: &'a str,
    pub notes_snapshot: &'a str,
    /// Memory file content matched by the list-intent classifier
    pub memories: Option<(MemoryCategory, &'a str)>,
    /// Formatted search results, empty when no search ran
    pub search_results: &'a str,
    pub user_prompt: &'a str,
}

const COMMAND_INSTRUCTIONS: &str = "\
You can act on the user's data by embedding commands anywhere in your reply. \
They are executed and removed before the user sees the text, so always include \
a natural-language confirmation alongside them.
- [MEMORY:TASK:text], [MEMORY:NOTE:text], [MEMORY:REMINDER:text] append free text to long-term memory.
- [TASK_OP:CREATE:{\"title\":\"...\",\"project\":\"...\",\"category\":\"...\",\"status\":\"...\",\"priority\":\"...\",\"scheduledAt\":unix_ms}] creates a task. Only include fields you know.
- [TASK_OP:UPDATE:{\"id\":\"...\", ...fields}] and [TASK_OP:DELETE:{\"id\":\"...\"}] modify existing tasks; the id is mandatory and must come from the task list below.
- [NOTE_OP:CREATE:{\"title\":\"...\",\"content\":\"...\",\"tagColor\":\"...\"}], [NOTE_OP:UPDATE:{\"id\":\"...\", ...}], [NOTE_OP:DELETE:{\"id\":\"...\"}] manage notes the same way.
To offer the user quick replies, end your message with a line like Options:[Sí, No].";

const SEARCH_INSTRUCTIONS: &str = "\
IMPORTANT: I have provided you with web search results below. Use ONLY the \
information from these search results to answer questions about current \
events, prices, or real-time data. If the search results don't contain the \
answer, simply say you don't have that information. Be natural and \
conversational - don't mention that you're reading from search results unless \
asked. Cite sources naturally when relevant.";

/// Concatenate every section into the single instruction block for the model
pub fn build_prompt(inputs: &PromptInputs) -> String {
    let mut system = format!(
        "You are {}. {}\nToday is {}.\n\n{}",
        inputs.identity.name,
        inputs.identity.personality,
        localized_datetime(inputs.now),
        COMMAND_INSTRUCTIONS
    );

    if !inputs.search_results.is_empty() {
        system.push_str("\n\n");
        system.push_str(SEARCH_INSTRUCTIONS);
    }

    let mut context = String::new();
    if !inputs.search_results.is_empty() {
        context.push_str(&format!("Web Search Results:\n{}\n\n", inputs.search_results));
    }
    context.push_str(&format!(
        "Current tasks:\n{}\n\nCurrent notes:\n{}\n\n",
        inputs.tasks_snapshot, inputs.notes_snapshot
    ));
    context.push_str(&format!(
        "Recent conversation history:\n{}",
        inputs.recent_context
    ));
    if let Some((category, memories)) = &inputs.memories {
        context.push_str(&format!("\n\nYour {}:\n{}", category, memories));
    }

    format!(
        "Below are system instructions and conversation history.\n\nSystem: {}\n\n{}\n\nHuman: {}\n\nAssistant:",
        system, context, inputs.user_prompt
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn live_data_queries_trigger_search() {
        assert!(should_search("¿cuál es el precio actual del dólar?"));
        assert!(should_search("dame las últimas noticias de tecnología"));
        assert!(!should_search("ayúdame a organizar mi semana"));
    }

    #[test]
    fn date_questions_never_search() {
        assert!(!should_search("¿qué día es hoy?"));
        assert!(!should_search("what time is it?"));
        // Denylist wins even when a trigger is also present
        assert!(!should_search("qué hora es según la cotización"));
    }

    #[test]
    fn list_intent_requires_both_keyword_families() {
        assert_eq!(
            detect_list_intent("muéstrame mis tareas pendientes"),
            Some(MemoryCategory::Task)
        );
        assert_eq!(
            detect_list_intent("listar mis recordatorios"),
            Some(MemoryCategory::Reminder)
        );
        assert_eq!(detect_list_intent("ver mis notas"), Some(MemoryCategory::Note));
        assert_eq!(detect_list_intent("crear una tarea nueva"), None);
        assert_eq!(detect_list_intent("muéstrame algo bonito"), None);
    }

    #[test]
    fn datetime_renders_in_spanish_at_utc_minus_5() {
        // 2026-08-29 03:00 UTC is Friday 22:00 on the 28th in Bogotá
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 3, 0, 0).unwrap();
        assert_eq!(localized_datetime(now), "viernes, 28 de agosto de 2026, 22:00");
    }

    #[test]
    fn day_bounds_track_the_local_calendar_day() {
        // 2026-08-29 03:30 UTC is still the 28th in Bogotá
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 3, 30, 0).unwrap();
        let (start, end) = local_day_bounds(now);

        assert_eq!(
            start,
            Utc.with_ymd_and_hms(2026, 8, 28, 5, 0, 0).unwrap().timestamp_millis()
        );
        assert_eq!(end - start, 86_400_000);
        let ms = now.timestamp_millis();
        assert!(start <= ms && ms < end);
    }

    #[test]
    fn prompt_sections_appear_in_order() {
        let identity = BotIdentity::default();
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 15, 0, 0).unwrap();
        let inputs = PromptInputs {
            identity: &identity,
            now,
            recent_context: "user: hola",
            tasks_snapshot: "No hay tareas registradas aún.",
            notes_snapshot: "No hay notas registradas aún.",
            memories: Some((MemoryCategory::Task, "- [ ] comprar leche")),
            search_results: "",
            user_prompt: "muéstrame mis tareas",
        };

        let prompt = build_prompt(&inputs);
        assert!(prompt.contains(&format!("You are {}.", identity.name)));
        assert!(prompt.contains("[TASK_OP:CREATE:"));
        assert!(prompt.contains("Current tasks:\nNo hay tareas registradas aún."));
        assert!(prompt.contains("Your tasks:\n- [ ] comprar leche"));
        assert!(prompt.ends_with("Human: muéstrame mis tareas\n\nAssistant:"));
        // No search ran, so the anti-hallucination block stays out
        assert!(!prompt.contains("Web Search Results"));
    }

    #[test]
    fn search_results_lead_the_context_with_strict_rules() {
        let identity = BotIdentity::default();
        let inputs = PromptInputs {
            identity: &identity,
            now: Utc::now(),
            recent_context: "",
            tasks_snapshot: "No hay tareas registradas aún.",
            notes_snapshot: "No hay notas registradas aún.",
            memories: None,
            search_results: "Summary: el dólar subió.",
            user_prompt: "precio actual del dólar",
        };

        let prompt = build_prompt(&inputs);
        assert!(prompt.contains("Use ONLY the information from these search results"));
        assert!(prompt.contains("Web Search Results:\nSummary: el dólar subió."));
    }
}
