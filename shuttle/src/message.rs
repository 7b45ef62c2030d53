//! Message types for the conversation history.
//!
//! Message roles: System, User (request side, carrying [`RequestMeta`]),
//! Assistant, Reasoning, ToolCall (response side, carrying [`ResponseMeta`]),
//! and ToolResult (a request-side echo of a tool's output). All records are
//! immutable; constructors take the timestamp so no wall-clock read happens
//! here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token usage for one LLM call (prompt + completion).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt (input).
    pub prompt_tokens: u32,
    /// Tokens in the completion (output).
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion).
    pub total_tokens: u32,
}

/// Why the model stopped producing output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

/// Meta-info on request-side messages: creation timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub timestamp: DateTime<Utc>,
}

impl RequestMeta {
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp }
    }
}

/// Meta-info on response-side messages: timestamp plus usage and finish reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl ResponseMeta {
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            usage: None,
            finish_reason: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }
}

/// Media attachment on a user message; passed through unchanged to the
/// provider boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    Image { content: AttachmentContent },
    Document { content: AttachmentContent },
    Audio { content: AttachmentContent },
}

/// Attachment payload: a URL or inline base64 data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentContent {
    Url(String),
    Base64(String),
}

/// A single message in the conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// System prompt; typically first in the list.
    System { content: String, meta: RequestMeta },
    /// User input, optionally with media attachments.
    User {
        content: String,
        meta: RequestMeta,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<Attachment>,
    },
    /// Model reply text.
    Assistant { content: String, meta: ResponseMeta },
    /// Model reasoning trace (kept separate from the reply).
    Reasoning { content: String, meta: ResponseMeta },
    /// Model request to invoke a tool.
    ToolCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        tool_name: String,
        arguments: Value,
        meta: ResponseMeta,
    },
    /// Tool output sent back to the model.
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        tool_name: String,
        content: String,
        meta: RequestMeta,
    },
}

impl Message {
    pub fn system(content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::System {
            content: content.into(),
            meta: RequestMeta::at(at),
        }
    }

    pub fn user(content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::User {
            content: content.into(),
            meta: RequestMeta::at(at),
            attachments: Vec::new(),
        }
    }

    pub fn user_with_attachments(
        content: impl Into<String>,
        attachments: Vec<Attachment>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::User {
            content: content.into(),
            meta: RequestMeta::at(at),
            attachments,
        }
    }

    pub fn assistant(content: impl Into<String>, meta: ResponseMeta) -> Self {
        Self::Assistant {
            content: content.into(),
            meta,
        }
    }

    pub fn reasoning(content: impl Into<String>, meta: ResponseMeta) -> Self {
        Self::Reasoning {
            content: content.into(),
            meta,
        }
    }

    pub fn tool_call(
        id: Option<String>,
        tool_name: impl Into<String>,
        arguments: Value,
        meta: ResponseMeta,
    ) -> Self {
        Self::ToolCall {
            id,
            tool_name: tool_name.into(),
            arguments,
            meta,
        }
    }

    pub fn tool_result(
        id: Option<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::ToolResult {
            id,
            tool_name: tool_name.into(),
            content: content.into(),
            meta: RequestMeta::at(at),
        }
    }

    /// True for response-side messages (Assistant, Reasoning, ToolCall).
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Message::Assistant { .. } | Message::Reasoning { .. } | Message::ToolCall { .. }
        )
    }

    /// Text content where the message carries plain text; tool calls yield
    /// their serialized arguments.
    pub fn content(&self) -> String {
        match self {
            Message::System { content, .. }
            | Message::User { content, .. }
            | Message::Assistant { content, .. }
            | Message::Reasoning { content, .. }
            | Message::ToolResult { content, .. } => content.clone(),
            Message::ToolCall { arguments, .. } => arguments.to_string(),
        }
    }

    /// Creation timestamp, regardless of side.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Message::System { meta, .. }
            | Message::User { meta, .. }
            | Message::ToolResult { meta, .. } => meta.timestamp,
            Message::Assistant { meta, .. }
            | Message::Reasoning { meta, .. }
            | Message::ToolCall { meta, .. } => meta.timestamp,
        }
    }

    /// Response meta, mutable; None on request-side messages.
    pub(crate) fn response_meta_mut(&mut self) -> Option<&mut ResponseMeta> {
        match self {
            Message::Assistant { meta, .. }
            | Message::Reasoning { meta, .. }
            | Message::ToolCall { meta, .. } => Some(meta),
            _ => None,
        }
    }

    /// Copy of this message with all meta timestamps cleared to the epoch.
    /// Used for cache key canonicalization.
    pub(crate) fn with_cleared_timestamps(&self) -> Message {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        let mut copy = self.clone();
        match &mut copy {
            Message::System { meta, .. }
            | Message::User { meta, .. }
            | Message::ToolResult { meta, .. } => meta.timestamp = epoch,
            Message::Assistant { meta, .. }
            | Message::Reasoning { meta, .. }
            | Message::ToolCall { meta, .. } => meta.timestamp = epoch,
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    /// **Scenario**: Constructors produce the correct variant with content and timestamp.
    #[test]
    fn message_constructors() {
        let sys = Message::system("s", epoch());
        assert!(matches!(&sys, Message::System { content, .. } if content == "s"));
        let usr = Message::user("u", epoch());
        assert!(matches!(&usr, Message::User { content, .. } if content == "u"));
        let ast = Message::assistant("a", ResponseMeta::at(epoch()));
        assert!(matches!(&ast, Message::Assistant { content, .. } if content == "a"));
        assert_eq!(sys.timestamp(), epoch());
    }

    /// **Scenario**: Each variant round-trips through serde with the role tag.
    #[test]
    fn message_serde_roundtrip() {
        let meta = ResponseMeta::at(epoch())
            .with_usage(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            })
            .with_finish_reason(FinishReason::ToolCalls);
        for msg in [
            Message::system("sys", epoch()),
            Message::user("usr", epoch()),
            Message::assistant("ast", ResponseMeta::at(epoch())),
            Message::reasoning("why", ResponseMeta::at(epoch())),
            Message::tool_call(
                Some("c1".into()),
                "eval",
                serde_json::json!({"expr": "2+2"}),
                meta.clone(),
            ),
            Message::tool_result(Some("c1".into()), "eval", "4", epoch()),
        ] {
            let json = serde_json::to_string(&msg).expect("serialize");
            let back: Message = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(msg, back);
        }
    }

    /// **Scenario**: is_response splits the sum type along the request/response axis.
    #[test]
    fn message_is_response() {
        assert!(!Message::system("s", epoch()).is_response());
        assert!(!Message::user("u", epoch()).is_response());
        assert!(!Message::tool_result(None, "t", "r", epoch()).is_response());
        assert!(Message::assistant("a", ResponseMeta::at(epoch())).is_response());
        assert!(Message::reasoning("r", ResponseMeta::at(epoch())).is_response());
        assert!(
            Message::tool_call(None, "t", serde_json::json!({}), ResponseMeta::at(epoch()))
                .is_response()
        );
    }

    /// **Scenario**: with_cleared_timestamps zeroes meta time but not content or usage.
    #[test]
    fn cleared_timestamps_keep_content() {
        let at = epoch() + chrono::Duration::seconds(120);
        let msg = Message::assistant(
            "hello",
            ResponseMeta::at(at).with_usage(TokenUsage {
                prompt_tokens: 1,
                completion_tokens: 2,
                total_tokens: 3,
            }),
        );
        let cleared = msg.with_cleared_timestamps();
        assert_eq!(cleared.timestamp(), epoch());
        assert_eq!(cleared.content(), "hello");
        match cleared {
            Message::Assistant { meta, .. } => {
                assert_eq!(meta.usage.unwrap().total_tokens, 3);
            }
            _ => panic!("variant changed"),
        }
    }

    /// **Scenario**: User attachments survive serde round-trip unchanged.
    #[test]
    fn user_attachments_pass_through() {
        let msg = Message::user_with_attachments(
            "look",
            vec![Attachment::Image {
                content: AttachmentContent::Url("https://example.com/cat.png".into()),
            }],
            epoch(),
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
