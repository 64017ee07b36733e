//! Directive grammar parser.
//!
//! Assistant replies may embed `##KIND:payload##` directives. The reply is
//! tokenized once into a stream of [`Segment`]s; extraction and display
//! stripping are both folds over that stream.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{ActionKind, ActionRequest, ActionSet};

/// Opening and closing sentinel of a directive.
pub const SENTINEL: &str = "##";

/// A piece of an assistant reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Plain text meant for the reader.
    Text(&'a str),
    /// A complete directive; `payload` excludes the markers.
    Directive { kind: ActionKind, payload: &'a str },
    /// An opening marker with no closing sentinel before the end of input.
    /// `rest` runs from the marker to the end of the reply.
    Unterminated { kind: ActionKind, rest: &'a str },
}

/// Split a reply into text and directive segments.
///
/// A `##` that is not followed by a known `KIND:` is ordinary text. Scanning
/// resumes one byte later, so `###KIND:` still opens a directive.
pub fn tokenize(reply: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(offset) = reply[cursor..].find(SENTINEL) {
        let open = cursor + offset;
        let after_open = open + SENTINEL.len();

        let Some(kind) = ActionKind::ALL.into_iter().find(|k| {
            let rest = &reply[after_open..];
            rest.starts_with(k.marker()) && rest[k.marker().len()..].starts_with(':')
        }) else {
            cursor = open + 1;
            continue;
        };

        if open > text_start {
            segments.push(Segment::Text(&reply[text_start..open]));
        }

        let payload_start = after_open + kind.marker().len() + 1;
        match reply[payload_start..].find(SENTINEL) {
            Some(len) => {
                let close = payload_start + len;
                segments.push(Segment::Directive {
                    kind,
                    payload: &reply[payload_start..close],
                });
                cursor = close + SENTINEL.len();
                text_start = cursor;
            }
            None => {
                segments.push(Segment::Unterminated {
                    kind,
                    rest: &reply[open..],
                });
                return segments;
            }
        }
    }

    if text_start < reply.len() {
        segments.push(Segment::Text(&reply[text_start..]));
    }
    segments
}

/// Extract the action requests embedded in a reply.
///
/// At most one request per kind is kept; a later well-formed directive of
/// the same kind replaces an earlier one. Malformed or unterminated
/// directives are logged and skipped. Pure: no store access.
pub fn extract_actions(reply: &str) -> ActionSet {
    let mut actions = ActionSet::default();
    for segment in tokenize(reply) {
        match segment {
            Segment::Directive { kind, payload } => {
                if let Some(request) = parse_payload(kind, payload) {
                    if actions.insert(request).is_some() {
                        debug!(%kind, "Repeated directive, keeping the last one");
                    }
                }
            }
            Segment::Unterminated { kind, .. } => {
                warn!(%kind, "Directive has no closing sentinel, ignoring");
            }
            Segment::Text(_) => {}
        }
    }
    actions
}

fn parse_payload(kind: ActionKind, payload: &str) -> Option<ActionRequest> {
    let payload = payload.trim();
    if kind == ActionKind::DeleteEvent {
        if payload.is_empty() {
            warn!(%kind, "Directive has an empty identifier, ignoring");
            return None;
        }
        return Some(ActionRequest::DeleteEvent(payload.to_string()));
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => Some(ActionRequest::with_payload(kind, map)),
        Ok(other) => {
            warn!(%kind, found = %json_type(&other), "Directive payload is not a JSON object, ignoring");
            None
        }
        Err(e) => {
            warn!(%kind, error = %e, "Directive payload is not valid JSON, ignoring");
            None
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

static EXTRA_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid blank-line regex"));

/// The reply with every directive removed, for display.
///
/// An unterminated directive swallows the rest of the reply.
pub fn strip_directives(reply: &str) -> String {
    let mut out = String::with_capacity(reply.len());
    for segment in tokenize(reply) {
        let Segment::Text(text) = segment else {
            continue;
        };
        if out.ends_with(char::is_whitespace) {
            out.push_str(text.trim_start_matches([' ', '\t']));
        } else {
            out.push_str(text);
        }
    }
    EXTRA_BLANK_LINES
        .replace_all(out.trim(), "\n\n")
        .into_owned()
}

/// Whether the reply contains any directive marker, complete or not.
pub fn has_directives(reply: &str) -> bool {
    tokenize(reply)
        .iter()
        .any(|s| !matches!(s, Segment::Text(_)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EVENT_REPLY: &str = r#"Đã thêm! ##ADD_EVENT:{"title":"Họp gia đình","date":"ngày mai","time":"19:00"}##"#;

    #[test]
    fn test_tokenize_plain_text() {
        assert_eq!(tokenize("hello"), vec![Segment::Text("hello")]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_tokenize_directive_between_text() {
        let segments = tokenize("a ##DELETE_EVENT:4## b");
        assert_eq!(
            segments,
            vec![
                Segment::Text("a "),
                Segment::Directive {
                    kind: ActionKind::DeleteEvent,
                    payload: "4"
                },
                Segment::Text(" b"),
            ]
        );
    }

    #[test]
    fn test_tokenize_unknown_marker_is_text() {
        let reply = "## Heading\n##NOT_A_KIND:x##";
        assert_eq!(tokenize(reply), vec![Segment::Text(reply)]);
    }

    #[test]
    fn test_directive_after_extra_hash() {
        let reply = r#"Ghi chú:###ADD_NOTE:{"title":"x"}##"#;
        let actions = extract_actions(reply);
        assert_eq!(actions.len(), 1);
        assert!(actions.get(ActionKind::AddNote).is_some());
        assert_eq!(strip_directives(reply), "Ghi chú:#");
    }

    #[test]
    fn test_hash_runs_are_text() {
        assert_eq!(tokenize("#####"), vec![Segment::Text("#####")]);
        assert!(extract_actions("x ####DELETE_EVENT:5##").get(ActionKind::DeleteEvent).is_some());
    }

    #[test]
    fn test_tokenize_unterminated() {
        let segments = tokenize(r#"ok ##ADD_NOTE:{"title":"x""#);
        assert_eq!(segments.len(), 2);
        assert!(matches!(
            segments[1],
            Segment::Unterminated {
                kind: ActionKind::AddNote,
                ..
            }
        ));
    }

    #[test]
    fn test_extract_add_event() {
        let actions = extract_actions(EVENT_REPLY);
        assert_eq!(actions.len(), 1);
        let request = actions.get(ActionKind::AddEvent).unwrap();
        assert_eq!(
            request,
            &ActionRequest::AddEvent(
                json!({"title": "Họp gia đình", "date": "ngày mai", "time": "19:00"})
                    .as_object()
                    .cloned()
                    .unwrap()
            )
        );
    }

    #[test]
    fn test_extract_delete_event_is_raw_identifier() {
        let actions = extract_actions("Xong. ##DELETE_EVENT:42##");
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions.get(ActionKind::DeleteEvent),
            Some(&ActionRequest::DeleteEvent("42".to_string()))
        );
    }

    #[test]
    fn test_extract_delete_event_trims_identifier() {
        let actions = extract_actions("##DELETE_EVENT:  7 ##");
        assert_eq!(
            actions.get(ActionKind::DeleteEvent),
            Some(&ActionRequest::DeleteEvent("7".to_string()))
        );
    }

    #[test]
    fn test_extract_missing_closing_sentinel() {
        let actions = extract_actions(r#"Sure ##ADD_EVENT:{"title":"Picnic","date":"2024-06-01"}"#);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_extract_malformed_json_is_skipped() {
        let reply = r#"##ADD_NOTE:{title: nope}## ##DELETE_EVENT:3##"#;
        let actions = extract_actions(reply);
        assert_eq!(actions.len(), 1);
        assert!(actions.get(ActionKind::AddNote).is_none());
        assert!(actions.get(ActionKind::DeleteEvent).is_some());
    }

    #[test]
    fn test_extract_non_object_json_is_skipped() {
        assert!(extract_actions(r#"##ADD_NOTE:["a","b"]##"#).is_empty());
        assert!(extract_actions(r###"##ADD_EVENT:"text"##"###).is_empty());
    }

    #[test]
    fn test_extract_multiple_kinds_in_fixed_order() {
        let reply = concat!(
            r#"##ADD_NOTE:{"title":"n"}##"#,
            r#"##DELETE_EVENT:9##"#,
            r#"##ADD_FAMILY_MEMBER:{"name":"Lan"}##"#,
            r#"##UPDATE_PREFERENCE:{"id":"1","key":"food","value":"phở"}##"#,
            r#"##UPDATE_EVENT:{"id":"2","time":"08:00"}##"#,
            r#"##ADD_EVENT:{"title":"e"}##"#,
        );
        let kinds: Vec<_> = extract_actions(reply).iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, ActionKind::ALL.to_vec());
    }

    #[test]
    fn test_extract_repeated_kind_last_wins() {
        let reply = r#"##ADD_NOTE:{"title":"first"}## then ##ADD_NOTE:{"title":"second"}##"#;
        let actions = extract_actions(reply);
        assert_eq!(actions.len(), 1);
        let ActionRequest::AddNote(payload) = actions.get(ActionKind::AddNote).unwrap() else {
            panic!("expected AddNote");
        };
        assert_eq!(payload.get("title"), Some(&json!("second")));
    }

    #[test]
    fn test_extract_repeated_kind_malformed_later_keeps_earlier() {
        let reply = r#"##ADD_NOTE:{"title":"first"}## ##ADD_NOTE:{broken##"#;
        let actions = extract_actions(reply);
        let ActionRequest::AddNote(payload) = actions.get(ActionKind::AddNote).unwrap() else {
            panic!("expected AddNote");
        };
        assert_eq!(payload.get("title"), Some(&json!("first")));
    }

    #[test]
    fn test_extract_is_idempotent() {
        let reply = r#"x ##ADD_EVENT:{"title":"a"}## ##DELETE_EVENT:1## y"#;
        assert_eq!(extract_actions(reply), extract_actions(reply));
    }

    #[test]
    fn test_nested_json_braces() {
        let reply = r#"##ADD_FAMILY_MEMBER:{"name":"Lan","age":"30","preferences":{"food":"phở","color":"xanh"}}##"#;
        let actions = extract_actions(reply);
        let ActionRequest::AddMember(payload) = actions.get(ActionKind::AddMember).unwrap() else {
            panic!("expected AddMember");
        };
        assert_eq!(payload["preferences"]["color"], json!("xanh"));
    }

    #[test]
    fn test_strip_removes_markers() {
        let display = strip_directives(EVENT_REPLY);
        assert_eq!(display, "Đã thêm!");
        assert!(!display.contains(SENTINEL));
    }

    #[test]
    fn test_strip_mid_sentence_collapses_space() {
        assert_eq!(
            strip_directives("Done ##DELETE_EVENT:4## and done."),
            "Done and done."
        );
    }

    #[test]
    fn test_strip_directive_on_own_line() {
        let reply = "Line one.\n\n##DELETE_EVENT:4##\n\nLine two.";
        assert_eq!(strip_directives(reply), "Line one.\n\nLine two.");
    }

    #[test]
    fn test_strip_unterminated_swallows_tail() {
        assert_eq!(
            strip_directives(r#"Okay! ##ADD_NOTE:{"title":"x"#),
            "Okay!"
        );
    }

    #[test]
    fn test_strip_keeps_unrelated_hashes() {
        assert_eq!(strip_directives("## Menu\n- phở"), "## Menu\n- phở");
    }

    #[test]
    fn test_has_directives() {
        assert!(has_directives(EVENT_REPLY));
        assert!(has_directives("##ADD_NOTE:{"));
        assert!(!has_directives("## just markdown"));
    }
}
