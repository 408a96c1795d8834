//! Core data models for the dialogue agent

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

//
// ================= Stages =================
//

/// A closed set of dialogue stages.
///
/// Every flow declares its stages as a fieldless enum implementing this
/// trait. Tags are the stable names used in persisted state; decoding an
/// unknown tag yields [`Stage::initial`] rather than an error.
pub trait Stage: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn initial() -> Self;

    fn tag(&self) -> &'static str;

    fn is_terminal(&self) -> bool;

    /// Open stages honour termination phrases.
    fn is_open(&self) -> bool;

    fn from_tag(tag: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.tag() == tag)
            .unwrap_or_else(Self::initial)
    }
}

mod stage_tag {
    use super::Stage;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<St: Stage, S: Serializer>(stage: &St, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(stage.tag())
    }

    pub fn deserialize<'de, St: Stage, D: Deserializer<'de>>(de: D) -> Result<St, D::Error> {
        let tag = String::deserialize(de)?;
        Ok(St::from_tag(&tag))
    }
}

fn initial_stage<S: Stage>() -> S {
    S::initial()
}

//
// ================= History =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One entry of the append-only conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

//
// ================= Conversation =================
//

/// Mutable per-conversation record, owned by exactly one session.
///
/// `D` carries flow-specific scratch data (the order flow keeps its cart
/// there); flows without extra data use `()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "S: Stage, D: Serialize",
    deserialize = "S: Stage, D: DeserializeOwned + Default"
))]
pub struct ConversationState<S, D = ()> {
    pub conversation_id: Uuid,
    #[serde(with = "stage_tag", default = "initial_stage")]
    pub stage: S,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub last_user_message: String,
    #[serde(default)]
    pub last_response: String,
    #[serde(default)]
    history: Vec<Message>,
    #[serde(default)]
    pub terminated: bool,
    #[serde(default)]
    pub data: D,
    pub updated_at: DateTime<Utc>,
}

impl<S: Stage, D: Default> ConversationState<S, D> {
    pub fn new() -> Self {
        Self {
            conversation_id: Uuid::new_v4(),
            stage: S::initial(),
            user_name: None,
            last_user_message: String::new(),
            last_response: String::new(),
            history: Vec::new(),
            terminated: false,
            data: D::default(),
            updated_at: Utc::now(),
        }
    }
}

impl<S: Stage, D: Default> Default for ConversationState<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Stage, D> ConversationState<S, D> {
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Append to history; entries are never removed or reordered.
    pub fn push_history(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Move to `stage`, keeping `terminated` in lockstep with the stage.
    pub fn set_stage(&mut self, stage: S) {
        self.stage = stage;
        self.terminated = stage.is_terminal();
        self.updated_at = Utc::now();
    }

    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or("usuário")
    }
}

impl<S: Stage, D: Serialize + DeserializeOwned + Default> ConversationState<S, D> {
    /// Encode as an opaque blob a caller can persist between turns.
    pub fn to_blob(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_blob(blob: &str) -> crate::Result<Self> {
        let mut state: Self = serde_json::from_str(blob)?;
        state.terminated = state.stage.is_terminal();
        Ok(state)
    }
}

//
// ================= Generation =================
//

/// Normalised output of a text generation collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

//
// ================= Metrics & Ranking =================
//

/// Dividend metrics for one ticker over the trailing twelve months
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TickerMetrics {
    pub dividend_yield: f64,
    pub current_price: f64,
    pub dividends_12m: f64,
    pub payment_count: u32,
}

/// Input row for the ranking helper
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub id: String,
    pub score: f64,
    pub metadata: BTreeMap<String, Value>,
}

impl ScoredItem {
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingEntry {
    pub ticker_id: String,
    pub score: f64,
    pub label: String,
    /// False for placeholder rows whose data could not be obtained
    pub available: bool,
    pub metadata: BTreeMap<String, Value>,
}

impl RankingEntry {
    /// Placeholder row for an item whose data could not be obtained
    pub fn unavailable(ticker_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("error".to_string(), Value::String(reason.into()));
        Self {
            ticker_id: ticker_id.into(),
            score: 0.0,
            label: "INDISPONÍVEL".to_string(),
            available: false,
            metadata,
        }
    }
}

/// Result of a batch ticker analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub period: String,
    pub ranking: Vec<RankingEntry>,
    pub commentary: String,
    pub report_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisReport {
    pub fn best(&self) -> Option<&RankingEntry> {
        self.ranking.iter().find(|entry| entry.available)
    }
}
