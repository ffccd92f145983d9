//! Model-response command protocol
//!
//! The system prompt asks the model to append bracketed commands to its reply:
//!
//! ```text
//! [MEMORY:<TASK|NOTE|REMINDER>:<content>]
//! [TASK_OP:<CREATE|UPDATE|DELETE>:<json object>]
//! [NOTE_OP:<CREATE|UPDATE|DELETE>:<json object>]
//! ```
//!
//! plus an optional trailing `Options:[a, b, c]` directive for quick-reply
//! buttons. The scanner here is an explicit state machine over the reply text:
//! command openers are matched literally and JSON payloads are consumed with a
//! brace-balanced reader, so a pathological reply can never trigger regex
//! backtracking and malformed payloads are handled deliberately rather than by
//! accident. Every recognized span is stripped from the user-visible text even
//! when its payload turns out to be garbage.

pub mod executor;

pub use executor::{CommandExecutor, ProcessedResponse};

use crate::memory::MemoryCategory;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::ops::Range;

/// Action keyword of a TASK_OP / NOTE_OP command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpAction {
    Create,
    Update,
    Delete,
}

impl OpAction {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "CREATE" => Some(OpAction::Create),
            "UPDATE" => Some(OpAction::Update),
            "DELETE" => Some(OpAction::Delete),
            _ => None,
        }
    }
}

/// One parsed command, never persisted - lives only for a single
/// response-processing pass
#[derive(Debug, Clone)]
pub enum PendingCommand {
    Memory {
        category: MemoryCategory,
        content: String,
    },
    TaskOp {
        action: OpAction,
        payload: Value,
    },
    NoteOp {
        action: OpAction,
        payload: Value,
    },
}

/// A recognized command span in the reply text. `command` is `None` when the
/// opener was recognized but the body was malformed; the span is still
/// stripped so protocol syntax never leaks to the user.
#[derive(Debug)]
pub struct ScannedCommand {
    pub command: Option<PendingCommand>,
    pub span: Range<usize>,
}

/// Trailing options directive, tolerant of the Spanish form and common typos
static OPTIONS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:options|opciones|optiosn|opcions)\s*:\s*\[([^\[\]]*)\]\s*$").unwrap()
});

/// Scan a model reply for bracketed commands.
///
/// The scan walks the whole text: the model may batch several TASK_OP /
/// NOTE_OP commands in one reply and we must not stop at the first match.
pub fn scan(text: &str) -> Vec<ScannedCommand> {
    let bytes = text.as_bytes();
    let mut commands = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'[' {
            i += 1;
            continue;
        }

        let rest = &text[i..];
        let scanned = if let Some(body) = rest.strip_prefix("[MEMORY:") {
            scan_memory(i, body, i + "[MEMORY:".len())
        } else if let Some(body) = rest.strip_prefix("[TASK_OP:") {
            scan_op(i, body, i + "[TASK_OP:".len(), true)
        } else if let Some(body) = rest.strip_prefix("[NOTE_OP:") {
            scan_op(i, body, i + "[NOTE_OP:".len(), false)
        } else {
            None
        };

        match scanned {
            Some(cmd) => {
                i = cmd.span.end;
                commands.push(cmd);
            }
            None => i += 1,
        }
    }

    commands
}

/// `[MEMORY:CATEGORY:free text]` - content runs to the first `]`
fn scan_memory(start: usize, body: &str, body_start: usize) -> Option<ScannedCommand> {
    let close = body.find(']')?;
    let span = start..body_start + close + 1;
    let inner = &body[..close];

    let Some((keyword, content)) = inner.split_once(':') else {
        log::warn!("Skipping malformed MEMORY command (no category separator): [MEMORY:{}]", inner);
        return Some(ScannedCommand { command: None, span });
    };

    let category = match keyword.trim() {
        "TASK" => MemoryCategory::Task,
        "NOTE" => MemoryCategory::Note,
        "REMINDER" => MemoryCategory::Reminder,
        other => {
            log::warn!("Skipping MEMORY command with unknown category '{}'", other);
            return Some(ScannedCommand { command: None, span });
        }
    };

    let content = content.trim();
    if content.is_empty() {
        log::warn!("Skipping MEMORY command with empty content");
        return Some(ScannedCommand { command: None, span });
    }

    Some(ScannedCommand {
        command: Some(PendingCommand::Memory {
            category,
            content: content.to_string(),
        }),
        span,
    })
}

/// `[TASK_OP:ACTION:{...}]` / `[NOTE_OP:ACTION:{...}]`
fn scan_op(start: usize, body: &str, body_start: usize, is_task: bool) -> Option<ScannedCommand> {
    let family = if is_task { "TASK_OP" } else { "NOTE_OP" };

    // Malformed bodies still need a span to strip; fall back to the first `]`
    let fallback_span = || {
        body.find(']')
            .map(|close| start..body_start + close + 1)
    };

    let Some((keyword, payload_text)) = body.split_once(':') else {
        let span = fallback_span()?;
        log::warn!("Skipping malformed {} command (no action separator)", family);
        return Some(ScannedCommand { command: None, span });
    };

    let Some(action) = OpAction::from_keyword(keyword.trim()) else {
        let span = fallback_span()?;
        log::warn!("Skipping {} command with unknown action '{}'", family, keyword.trim());
        return Some(ScannedCommand { command: None, span });
    };

    let payload_start = body_start + keyword.len() + 1;

    match read_balanced_json(payload_text) {
        Some(json_len) => {
            let after = payload_text[json_len..].trim_start();
            if !after.starts_with(']') {
                let span = fallback_span()?;
                log::warn!("Skipping {} command (payload not closed with ']')", family);
                return Some(ScannedCommand { command: None, span });
            }
            // Offset of the closing `]` inside payload_text
            let close_offset = payload_text.len() - after.len();
            let span = start..payload_start + close_offset + 1;

            let json_str = &payload_text[..json_len];
            match serde_json::from_str::<Value>(json_str) {
                Ok(payload) if payload.is_object() => Some(ScannedCommand {
                    command: Some(if is_task {
                        PendingCommand::TaskOp { action, payload }
                    } else {
                        PendingCommand::NoteOp { action, payload }
                    }),
                    span,
                }),
                Ok(_) => {
                    log::warn!("Skipping {} command: payload is not a JSON object", family);
                    Some(ScannedCommand { command: None, span })
                }
                Err(e) => {
                    log::warn!("Skipping {} command with invalid JSON payload: {}", family, e);
                    Some(ScannedCommand { command: None, span })
                }
            }
        }
        None => {
            // Unbalanced payload like `{bad json]` - strip to the first `]`
            let span = fallback_span()?;
            log::warn!("Skipping {} command with unbalanced JSON payload", family);
            Some(ScannedCommand { command: None, span })
        }
    }
}

/// Length in bytes of one balanced JSON object at the start of `text`
/// (leading whitespace included), or `None` when no object closes.
fn read_balanced_json(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut seen_open = false;

    for (i, &b) in bytes.iter().enumerate() {
        if !seen_open {
            match b {
                b' ' | b'\t' | b'\n' | b'\r' => continue,
                b'{' => {
                    seen_open = true;
                    depth = 1;
                }
                _ => return None,
            }
            continue;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// Remove the given spans from the text and tidy the leftover whitespace
pub fn strip_spans(text: &str, spans: &[Range<usize>]) -> String {
    let mut kept = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        if span.start > cursor {
            kept.push_str(&text[cursor..span.start]);
        }
        cursor = span.end.max(cursor);
    }
    if cursor < text.len() {
        kept.push_str(&text[cursor..]);
    }

    // Collapse the double spaces stripping leaves behind, line by line
    let mut lines: Vec<String> = kept
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Extract the trailing options directive from already-stripped text.
/// Absence of the directive is not an error: the option list is just empty.
pub fn extract_options(text: &str) -> (String, Vec<String>) {
    match OPTIONS_PATTERN.captures(text) {
        Some(captures) => {
            let full = captures.get(0).unwrap();
            let options = captures
                .get(1)
                .map(|m| {
                    m.as_str()
                        .split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            let remaining = text[..full.start()].trim_end().to_string();
            (remaining, options)
        }
        None => (text.to_string(), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parsed(text: &str) -> Vec<PendingCommand> {
        scan(text).into_iter().filter_map(|c| c.command).collect()
    }

    #[test]
    fn scans_memory_command() {
        let cmds = parsed("Listo. [MEMORY:TASK:comprar leche]");
        assert_eq!(cmds.len(), 1);
        match &cmds[0] {
            PendingCommand::Memory { category, content } => {
                assert_eq!(*category, MemoryCategory::Task);
                assert_eq!(content, "comprar leche");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn scans_multiple_ops_in_one_reply() {
        let text = r#"Creadas. [TASK_OP:CREATE:{"title":"una"}] y [TASK_OP:CREATE:{"title":"dos"}]"#;
        let cmds = parsed(text);
        assert_eq!(cmds.len(), 2);
        assert!(matches!(
            cmds[0],
            PendingCommand::TaskOp { action: OpAction::Create, .. }
        ));
    }

    #[test]
    fn malformed_json_is_skipped_but_valid_commands_survive() {
        let text = concat!(
            r#"[TASK_OP:CREATE:{"title":"a"}] "#,
            r#"[TASK_OP:UPDATE:{bad json] "#,
            r#"[TASK_OP:CREATE:{"title":"b"}]"#,
        );
        let scanned = scan(text);
        assert_eq!(scanned.len(), 3);
        let valid: Vec<_> = scanned.iter().filter(|c| c.command.is_some()).collect();
        assert_eq!(valid.len(), 2);
    }

    #[test]
    fn nested_json_payload_is_balanced() {
        let text = r#"[NOTE_OP:UPDATE:{"id":"n1","content":"tiene {llaves} y ]corchete"}] ok"#;
        let cmds = parsed(text);
        assert_eq!(cmds.len(), 1);
        match &cmds[0] {
            PendingCommand::NoteOp { action, payload } => {
                assert_eq!(*action, OpAction::Update);
                assert_eq!(payload["content"], json!("tiene {llaves} y ]corchete"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn unknown_action_is_recognized_and_stripped() {
        let scanned = scan("[TASK_OP:UPSERT:{\"id\":\"1\"}]");
        assert_eq!(scanned.len(), 1);
        assert!(scanned[0].command.is_none());
    }

    #[test]
    fn plain_brackets_are_not_commands() {
        assert!(scan("una lista [a, b, c] normal").is_empty());
    }

    #[test]
    fn stripping_removes_all_spans() {
        let text = r#"Listo. [MEMORY:TASK:comprar leche] Hecho. [TASK_OP:CREATE:{"title":"x"}]"#;
        let scanned = scan(text);
        let spans: Vec<_> = scanned.iter().map(|c| c.span.clone()).collect();
        assert_eq!(strip_spans(text, &spans), "Listo. Hecho.");
    }

    #[test]
    fn options_directive_parses_and_is_removed() {
        let (text, options) = extract_options("Listo. Options:[Sí, No]");
        assert_eq!(text, "Listo.");
        assert_eq!(options, vec!["Sí", "No"]);
    }

    #[test]
    fn options_directive_accepts_spanish_and_typos() {
        let (_, options) = extract_options("Claro. Opciones:[Ver tareas, Crear otra]");
        assert_eq!(options, vec!["Ver tareas", "Crear otra"]);

        let (_, options) = extract_options("ok optiosn:[a,b]");
        assert_eq!(options, vec!["a", "b"]);
    }

    #[test]
    fn missing_options_yields_empty_list() {
        let (text, options) = extract_options("Sin opciones aquí.");
        assert_eq!(text, "Sin opciones aquí.");
        assert!(options.is_empty());
    }

    #[test]
    fn options_only_match_at_the_tail() {
        let (text, options) = extract_options("Options:[a, b] y más texto después");
        assert!(options.is_empty());
        assert_eq!(text, "Options:[a, b] y más texto después");
    }
}
