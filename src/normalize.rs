//! Response normalizer: turns a raw provider reply into a canonical
//! [`Decision`] or a controlled [`ParseError`].
//!
//! Providers return free-form text that is supposed to be JSON but in
//! practice arrives fenced in markdown, salted with soft hyphens, or cut
//! off mid-field by token limits. Everything downstream of this module
//! only ever sees a validated Decision.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseError;
use crate::hierarchy::FolderPathMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Assign,
    Create,
    Skip,
}

/// Canonical output of AI analysis for one media item. Never mutated after
/// creation; a remap produces a new Decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub folder_id: Option<i64>,
    pub folder_path: Option<String>,
    pub new_folder_path: Option<String>,
    pub confidence: f32,
    pub reason: String,
}

impl Decision {
    pub fn skip(reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.trim().is_empty() {
            reason = "no reason given".to_string();
        }
        Self {
            action: DecisionAction::Skip,
            folder_id: None,
            folder_path: None,
            new_folder_path: None,
            confidence: 0.0,
            reason,
        }
    }
}

/// Parse a raw provider reply against the authoritative path -> id map.
pub fn parse(raw: &str, folders: &FolderPathMap) -> Result<Decision, ParseError> {
    let unfenced = strip_code_fence(raw);
    let cleaned = scrub_invisible(&unfenced);
    let trimmed = cleaned.trim();

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(first_err) => match salvage_truncated(trimmed) {
            Some(v) => v,
            None => return Err(ParseError::InvalidJson(first_err.to_string())),
        },
    };

    let obj = value.as_object().ok_or(ParseError::NotAnObject)?;

    let action_raw = obj
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingAction)?
        .trim()
        .to_lowercase();

    // "existing" is a historical alias some models keep emitting
    let action = match action_raw.as_str() {
        "assign" | "existing" => DecisionAction::Assign,
        "create" => DecisionAction::Create,
        "skip" => DecisionAction::Skip,
        _ => return Err(ParseError::UnknownAction(action_raw)),
    };

    let confidence = clamp_confidence(obj.get("confidence"));
    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    match action {
        DecisionAction::Skip => Ok(Decision::skip(reason)),
        DecisionAction::Assign => {
            let supplied_id = extract_id(obj.get("folder_id"));
            let folder_path = obj
                .get("folder_path")
                .and_then(Value::as_str)
                .map(strip_id_suffix)
                .filter(|p| !p.is_empty());

            // The map is ground truth: a path hit overrides whatever id the
            // provider invented.
            let resolved = folder_path
                .as_deref()
                .and_then(|p| folders.lookup(p))
                .or_else(|| supplied_id.filter(|id| folders.contains_id(*id)));

            match resolved {
                Some(folder_id) => Ok(Decision {
                    action: DecisionAction::Assign,
                    folder_id: Some(folder_id),
                    folder_path,
                    new_folder_path: None,
                    confidence,
                    reason,
                }),
                None => Ok(Decision::skip(format!(
                    "assignment target {} does not match any known folder",
                    folder_path
                        .as_deref()
                        .map(|p| format!("{p:?}"))
                        .or_else(|| supplied_id.map(|id| format!("id {id}")))
                        .unwrap_or_else(|| "(unspecified)".to_string()),
                ))),
            }
        }
        DecisionAction::Create => {
            let proposed = obj
                .get("new_folder_path")
                .and_then(Value::as_str)
                .unwrap_or("");
            match sanitize_new_path(proposed) {
                Some(new_folder_path) => Ok(Decision {
                    action: DecisionAction::Create,
                    folder_id: None,
                    folder_path: None,
                    new_folder_path: Some(new_folder_path),
                    confidence,
                    reason,
                }),
                None => Ok(Decision::skip(
                    "create action without a usable new folder path",
                )),
            }
        }
    }
}

/// Strip a markdown code fence wrapper, with or without a language tag.
fn strip_code_fence(content: &str) -> String {
    let trimmed = content.trim();

    if trimmed.starts_with("```") {
        if let Some(start) = trimmed.find('\n') {
            let after_first_line = &trimmed[start + 1..];
            if let Some(end) = after_first_line.rfind("```") {
                return after_first_line[..end].trim().to_string();
            }
            // fence opened but never closed (truncated reply)
            return after_first_line.trim().to_string();
        }
    }

    trimmed.to_string()
}

/// Remove control and zero-width characters before structural decode.
/// Observed in the wild: soft hyphens inside folder names.
fn scrub_invisible(content: &str) -> String {
    content
        .chars()
        .filter(|c| {
            !matches!(c, '\u{00AD}' | '\u{200B}' | '\u{200C}' | '\u{FEFF}' | '\u{2060}')
                && (!c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        })
        .collect()
}

/// Best-effort recovery of a reply cut off mid-field: cut back to the last
/// structurally complete value, close unbalanced braces/brackets, retry.
fn salvage_truncated(s: &str) -> Option<Value> {
    // Positions right after a complete value, newest first.
    let mut candidates: Vec<usize> = Vec::new();
    let mut in_str = false;
    let mut escaped = false;
    let mut depth = 0usize;

    for (i, c) in s.char_indices() {
        if in_str {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_str = false;
                candidates.push(i + 1);
            }
            continue;
        }
        match c {
            '"' => in_str = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                candidates.push(i + c.len_utf8());
            }
            ',' => candidates.push(i),
            _ => {}
        }
    }

    if depth == 0 && !in_str {
        // structurally balanced; truncation salvage does not apply
        return None;
    }

    for &pos in candidates.iter().rev().take(16) {
        // A string closing right before a ':' was a key, not a value.
        if s[pos..].trim_start().starts_with(':') {
            continue;
        }

        let mut candidate = s[..pos].trim_end().to_string();
        while candidate.ends_with(',') {
            candidate.pop();
            while candidate.ends_with(char::is_whitespace) {
                candidate.pop();
            }
        }
        if candidate.ends_with(':') {
            continue;
        }

        // Close whatever is still open.
        let mut stack = Vec::new();
        let mut c_in_str = false;
        let mut c_escaped = false;
        for c in candidate.chars() {
            if c_in_str {
                if c_escaped {
                    c_escaped = false;
                } else if c == '\\' {
                    c_escaped = true;
                } else if c == '"' {
                    c_in_str = false;
                }
                continue;
            }
            match c {
                '"' => c_in_str = true,
                '{' => stack.push('}'),
                '[' => stack.push(']'),
                '}' | ']' => {
                    stack.pop();
                }
                _ => {}
            }
        }
        if c_in_str {
            continue;
        }
        while let Some(closer) = stack.pop() {
            candidate.push(closer);
        }

        if let Ok(v) = serde_json::from_str::<Value>(&candidate) {
            return Some(v);
        }
    }

    None
}

/// Strip a trailing `" (ID: N)"` suffix some models append to paths.
fn strip_id_suffix(path: &str) -> String {
    let trimmed = path.trim();
    if let Some(start) = trimmed.rfind(" (ID: ") {
        let tail = &trimmed[start + " (ID: ".len()..];
        if let Some(inner) = tail.strip_suffix(')') {
            if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
                return trimmed[..start].trim_end().to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Accept a numeric id or a numeric string.
fn extract_id(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn clamp_confidence(value: Option<&Value>) -> f32 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0) as f32,
        _ => 0.0,
    }
}

/// Strip emoji from every path segment, dropping segments that end up
/// empty. Returns None when nothing survives.
fn sanitize_new_path(path: &str) -> Option<String> {
    let segments: Vec<String> = path
        .split('/')
        .map(strip_emoji)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

fn strip_emoji(segment: &str) -> String {
    segment.chars().filter(|c| !is_emoji(*c)).collect()
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        // Misc symbols, dingbats, emoticons, transport, supplemental pictographs
        0x2600..=0x27BF
            | 0x2B00..=0x2BFF
            | 0x1F000..=0x1FAFF
            // variation selectors, ZWJ, regional tags
            | 0xFE0E..=0xFE0F
            | 0x200D
            | 0xE0020..=0xE007F
    )
}
