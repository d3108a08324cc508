use crate::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Data exchanged between nodes.
///
/// Every output declares its kind explicitly so consumers match on the tag
/// instead of guessing from which fields happen to be present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Opaque "go" signal handed to every handler by the executor.
    Trigger,
    Text { text: String },
    Chat(ChatReply),
    Video(VideoContent),
    Web(WebContent),
    Document(DocumentContent),
    Combined(CombinedPayload),
    /// Rendezvous sentinel: not every known source has delivered yet.
    Waiting(WaitingStatus),
    Error { error: String },
    Json { value: serde_json::Value },
}

impl Payload {
    pub fn error(message: impl Into<String>) -> Self {
        Payload::Error {
            error: message.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text { text: text.into() }
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Trigger => PayloadKind::Trigger,
            Payload::Text { .. } => PayloadKind::Text,
            Payload::Chat(_) => PayloadKind::Chat,
            Payload::Video(_) => PayloadKind::Video,
            Payload::Web(_) => PayloadKind::Web,
            Payload::Document(_) => PayloadKind::Document,
            Payload::Combined(_) => PayloadKind::Combined,
            Payload::Waiting(_) => PayloadKind::Waiting,
            Payload::Error { .. } => PayloadKind::Error,
            Payload::Json { .. } => PayloadKind::Json,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Payload::Error { .. })
    }

    pub fn as_error(&self) -> Option<&str> {
        match self {
            Payload::Error { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self, Payload::Trigger)
    }

    /// True for payloads that carry producer data worth delivering downstream.
    pub fn carries_data(&self) -> bool {
        !matches!(
            self,
            Payload::Trigger | Payload::Error { .. } | Payload::Waiting(_)
        )
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text { text: s }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text {
            text: s.to_string(),
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json { value }
    }
}

/// Tag-only view of a [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Trigger,
    Text,
    Chat,
    Video,
    Web,
    Document,
    Combined,
    Waiting,
    Error,
    Json,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Trigger => "trigger",
            PayloadKind::Text => "text",
            PayloadKind::Chat => "chat",
            PayloadKind::Video => "video",
            PayloadKind::Web => "web",
            PayloadKind::Document => "document",
            PayloadKind::Combined => "combined",
            PayloadKind::Waiting => "waiting",
            PayloadKind::Error => "error",
            PayloadKind::Json => "json",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub response: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoContent {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub analysis: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WebContent {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentContent {
    pub filename: String,
    pub text: String,
    pub filesize: u64,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaitingStatus {
    pub message: String,
    pub current_source_count: usize,
    pub received_source_count: usize,
}

/// Output of a rendezvous node once every known source has delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombinedPayload {
    pub video: Option<VideoContent>,
    pub web: Option<WebContent>,
    pub document: Option<DocumentContent>,
    /// Everything that did not land in a named bucket, keyed by source id.
    pub passthrough: BTreeMap<String, Payload>,
    pub format: Option<CombinedFormat>,
    pub source_count: usize,
    pub source_ids: Vec<NodeId>,
    pub timestamp: DateTime<Utc>,
}

/// Research pairing recognised when exactly two sources were combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinedFormat {
    YoutubeAndWeb,
    YoutubeAndDocument,
    WebAndDocument,
}

/// A payload together with the id of the node that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub source: Option<NodeId>,
    pub payload: Payload,
}

impl Envelope {
    /// The input the executor hands to every node it visits.
    pub fn trigger() -> Self {
        Self {
            source: None,
            payload: Payload::Trigger,
        }
    }

    pub fn from_source(source: impl Into<NodeId>, payload: Payload) -> Self {
        Self {
            source: Some(source.into()),
            payload,
        }
    }

    pub fn anonymous(payload: Payload) -> Self {
        Self {
            source: None,
            payload,
        }
    }
}
