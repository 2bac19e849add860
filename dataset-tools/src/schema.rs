//! Structural validation of conversation records.
//!
//! Records are parsed to a loose JSON value first and checked against the
//! conversation shape, collecting every violation, before being converted
//! into the typed [`Conversation`]. The analyzer reports all issues; the
//! preprocessor stops at the first one.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::jsonl::NumberedLine;
use crate::types::{Conversation, Role};

/// Optional top-level string fields.
const TAG_FIELDS: &[&str] = &["category", "topic"];

/// One way a record can violate the conversation schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaIssue {
    #[error("Line is not valid UTF-8 (invalid byte at offset {offset})")]
    InvalidUtf8 { offset: usize },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Missing 'messages' key")]
    MissingMessages,

    #[error("'messages' should be a list")]
    MessagesNotArray,

    #[error("Empty messages list")]
    EmptyMessages,

    #[error("Message {index} is not an object")]
    MessageNotObject { index: usize },

    #[error("Message {index} missing 'role' key")]
    MissingRole { index: usize },

    #[error("Message {index} has invalid role: {role}")]
    InvalidRole { index: usize, role: String },

    #[error("Message {index} missing 'content' key")]
    MissingContent { index: usize },

    #[error("Message {index} content is not a string")]
    ContentNotString { index: usize },

    #[error("Message {index} has empty content")]
    EmptyContent { index: usize },

    #[error("'{field}' should be a string")]
    TagNotString { field: &'static str },

    #[error("Conversation has no {0} message")]
    MissingTurn(Role),

    #[error("Message {index} repeats the {role} role of the previous message")]
    RepeatedRole { index: usize, role: Role },

    #[error("Message {index} is an assistant reply without a preceding user message")]
    AssistantWithoutPrompt { index: usize },
}

/// A schema issue tagged with the 1-based line it was found on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineError {
    pub line: usize,
    pub message: String,
}

impl LineError {
    pub fn new(line: usize, issue: &SchemaIssue) -> Self {
        Self {
            line,
            message: issue.to_string(),
        }
    }
}

/// Join a line's issues into one message.
pub fn describe(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a line read from disk; undecodable bytes are a record issue.
pub fn parse_line(line: &NumberedLine) -> Result<Conversation, Vec<SchemaIssue>> {
    match &line.text {
        Ok(text) => parse_record(text),
        Err(e) => Err(vec![SchemaIssue::InvalidUtf8 {
            offset: e.valid_up_to(),
        }]),
    }
}

/// Parse one JSONL line into a conversation, or every reason it is not one.
pub fn parse_record(line: &str) -> Result<Conversation, Vec<SchemaIssue>> {
    let value: Value = serde_json::from_str(line).map_err(invalid_json)?;

    let issues = check_conversation(&value);
    if !issues.is_empty() {
        return Err(issues);
    }

    serde_json::from_value(value).map_err(invalid_json)
}

fn invalid_json(e: serde_json::Error) -> Vec<SchemaIssue> {
    vec![SchemaIssue::InvalidJson(e.to_string())]
}

/// Check a JSON value against the conversation shape.
pub fn check_conversation(value: &Value) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();

    let Some(record) = value.as_object() else {
        issues.push(SchemaIssue::NotAnObject);
        return issues;
    };

    for field in TAG_FIELDS {
        if let Some(tag) = record.get(*field) {
            if !tag.is_string() && !tag.is_null() {
                issues.push(SchemaIssue::TagNotString { field: *field });
            }
        }
    }

    let Some(messages) = record.get("messages") else {
        issues.push(SchemaIssue::MissingMessages);
        return issues;
    };
    let Some(messages) = messages.as_array() else {
        issues.push(SchemaIssue::MessagesNotArray);
        return issues;
    };
    if messages.is_empty() {
        issues.push(SchemaIssue::EmptyMessages);
        return issues;
    }

    let tag_issues = issues.len();
    let mut roles = Vec::with_capacity(messages.len());
    for (index, message) in messages.iter().enumerate() {
        if let Some(role) = check_message(index, message, &mut issues) {
            roles.push(role);
        }
    }

    // Turn order is only meaningful once every message is well-formed.
    if issues.len() == tag_issues {
        check_turn_order(&roles, &mut issues);
    }

    issues
}

/// Check a single message, returning its role when the message is valid.
fn check_message(index: usize, message: &Value, issues: &mut Vec<SchemaIssue>) -> Option<Role> {
    let Some(message) = message.as_object() else {
        issues.push(SchemaIssue::MessageNotObject { index });
        return None;
    };

    let role = match message.get("role") {
        None => {
            issues.push(SchemaIssue::MissingRole { index });
            None
        }
        Some(value) => {
            let role = value.as_str().and_then(Role::parse);
            if role.is_none() {
                let shown = value
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| value.to_string());
                issues.push(SchemaIssue::InvalidRole { index, role: shown });
            }
            role
        }
    };

    let content_ok = match message.get("content") {
        None => {
            issues.push(SchemaIssue::MissingContent { index });
            false
        }
        Some(Value::String(content)) if content.trim().is_empty() => {
            issues.push(SchemaIssue::EmptyContent { index });
            false
        }
        Some(Value::String(_)) => true,
        Some(_) => {
            issues.push(SchemaIssue::ContentNotString { index });
            false
        }
    };

    role.filter(|_| content_ok)
}

fn check_turn_order(roles: &[Role], issues: &mut Vec<SchemaIssue>) {
    for (index, role) in roles.iter().copied().enumerate() {
        let previous = index.checked_sub(1).map(|p| roles[p]);
        if previous == Some(role) {
            issues.push(SchemaIssue::RepeatedRole { index, role });
        } else if role == Role::Assistant && previous != Some(Role::User) {
            issues.push(SchemaIssue::AssistantWithoutPrompt { index });
        }
    }

    for required in [Role::User, Role::Assistant] {
        if !roles.contains(&required) {
            issues.push(SchemaIssue::MissingTurn(required));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_record() {
        let convo = parse_record(
            r#"{"messages":[{"role":"user","content":"Hi"},{"role":"assistant","content":"Hello!"}],"category":"greeting"}"#,
        )
        .unwrap();
        assert_eq!(convo.messages.len(), 2);
        assert_eq!(convo.messages[1].role, Role::Assistant);
        assert_eq!(convo.category.as_deref(), Some("greeting"));
    }

    #[test]
    fn test_system_preamble_is_allowed() {
        let convo = parse_record(
            r#"{"messages":[{"role":"system","content":"Be kind."},{"role":"user","content":"Hi"},{"role":"assistant","content":"Hello!"},{"role":"user","content":"Bye"}]}"#,
        )
        .unwrap();
        assert_eq!(convo.messages.len(), 4);
    }

    #[test]
    fn test_invalid_json() {
        let issues = parse_record("{not json").unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], SchemaIssue::InvalidJson(_)));
    }

    #[test]
    fn test_missing_and_empty_messages() {
        let issues = parse_record(r#"{"data":[]}"#).unwrap_err();
        assert_eq!(issues, vec![SchemaIssue::MissingMessages]);

        let issues = parse_record(r#"{"messages":[]}"#).unwrap_err();
        assert_eq!(issues, vec![SchemaIssue::EmptyMessages]);

        let issues = parse_record(r#"{"messages":"hello"}"#).unwrap_err();
        assert_eq!(issues, vec![SchemaIssue::MessagesNotArray]);

        let issues = parse_record(r#"[1, 2]"#).unwrap_err();
        assert_eq!(issues, vec![SchemaIssue::NotAnObject]);
    }

    #[test]
    fn test_collects_every_message_issue() {
        let issues = parse_record(
            r#"{"messages":[{"role":"human","content":"Hello"},{"content":"   "},{"role":"assistant"},{"role":"user","content":5},"oops"]}"#,
        )
        .unwrap_err();

        assert_eq!(
            issues,
            vec![
                SchemaIssue::InvalidRole {
                    index: 0,
                    role: "human".into()
                },
                SchemaIssue::MissingRole { index: 1 },
                SchemaIssue::EmptyContent { index: 1 },
                SchemaIssue::MissingContent { index: 2 },
                SchemaIssue::ContentNotString { index: 3 },
                SchemaIssue::MessageNotObject { index: 4 },
            ]
        );
        assert_eq!(issues[0].to_string(), "Message 0 has invalid role: human");
    }

    #[test]
    fn test_turn_order() {
        let issues = parse_record(
            r#"{"messages":[{"role":"user","content":"a"},{"role":"user","content":"b"},{"role":"assistant","content":"c"}]}"#,
        )
        .unwrap_err();
        assert_eq!(
            issues,
            vec![SchemaIssue::RepeatedRole {
                index: 1,
                role: Role::User
            }]
        );

        let issues = parse_record(
            r#"{"messages":[{"role":"system","content":"a"},{"role":"assistant","content":"b"}]}"#,
        )
        .unwrap_err();
        assert_eq!(
            issues,
            vec![
                SchemaIssue::AssistantWithoutPrompt { index: 1 },
                SchemaIssue::MissingTurn(Role::User),
            ]
        );

        let issues = parse_record(r#"{"messages":[{"role":"user","content":"a"}]}"#).unwrap_err();
        assert_eq!(issues, vec![SchemaIssue::MissingTurn(Role::Assistant)]);
    }

    #[test]
    fn test_tag_must_be_string() {
        let issues = parse_record(
            r#"{"messages":[{"role":"user","content":"a"},{"role":"assistant","content":"b"}],"topic":3}"#,
        )
        .unwrap_err();
        assert_eq!(issues, vec![SchemaIssue::TagNotString { field: "topic" }]);
    }

    #[test]
    fn test_bad_tag_does_not_hide_turn_order() {
        let issues = parse_record(
            r#"{"messages":[{"role":"assistant","content":"a"}],"topic":3}"#,
        )
        .unwrap_err();
        assert_eq!(
            issues,
            vec![
                SchemaIssue::TagNotString { field: "topic" },
                SchemaIssue::AssistantWithoutPrompt { index: 0 },
                SchemaIssue::MissingTurn(Role::User),
            ]
        );
    }

    #[test]
    fn test_undecodable_line() {
        let bytes = b"{\"messages\":\xff}".to_vec();
        let line = NumberedLine {
            number: 2,
            text: String::from_utf8(bytes).map_err(|e| e.utf8_error()),
        };
        let issues = parse_line(&line).unwrap_err();
        assert_eq!(issues, vec![SchemaIssue::InvalidUtf8 { offset: 12 }]);
        assert_eq!(
            issues[0].to_string(),
            "Line is not valid UTF-8 (invalid byte at offset 12)"
        );
    }

    #[test]
    fn test_line_error_message() {
        let err = LineError::new(4, &SchemaIssue::EmptyMessages);
        assert_eq!(err.line, 4);
        assert_eq!(err.message, "Empty messages list");
    }
}
