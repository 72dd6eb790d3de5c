//! Typed rows for the four telemetry tables.
//!
//! Column names stay camelCase in the stored field bags — the row format
//! predates this crate and readers of the tables depend on it. Timestamps
//! are milliseconds since the epoch throughout.
//!
//! Event and interaction rows are written with every column present
//! (empty-string / zero / false defaults), so downstream aggregation never
//! has to branch on missing columns. The user pointer is the exception: it
//! is built field-by-field because merge semantics decide per interaction
//! which columns may move.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::FieldMap;

/// Partition join rule: one conversation per (page, sender) pair.
#[must_use]
pub fn conversation_id(page_id: &str, sender_id: &str) -> String {
    format!("{page_id}|{sender_id}")
}

/// Serialize a record into a field bag.
pub(crate) fn to_fields<T: Serialize>(record: &T) -> FieldMap {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        // records are plain structs; anything else is a programming error
        _ => FieldMap::new(),
    }
}

// =============================================================================
// User pointer
// =============================================================================

/// The mutable "current session" pointer, one row per (page, sender).
///
/// Owned exclusively by the orchestrator; this struct is the *read* view,
/// decoded from whatever fields the stored row carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPointer {
    pub session_id: Option<String>,
    pub last_interaction_ms: Option<u64>,
    pub session_count: u64,
    pub created_ms: Option<u64>,
}

impl UserPointer {
    /// Decode the pointer fields the windower cares about. Unknown or
    /// oddly-typed columns are ignored rather than failing the read.
    #[must_use]
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            session_id: fields
                .get("sessionId")
                .and_then(Value::as_str)
                .map(String::from),
            last_interaction_ms: fields.get("lastInteraction").and_then(Value::as_u64),
            session_count: fields
                .get("sessionCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            created_ms: fields.get("created").and_then(Value::as_u64),
        }
    }
}

/// Caller-supplied identity and custom dimensions merged into the pointer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cd1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cd2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cd3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cd4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cd5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cd6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cd7: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cd8: Option<String>,
}

// =============================================================================
// Session record
// =============================================================================

/// Client/device context attached to a session, plus per-interaction
/// enrichment carried through the event fan-out.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionMetadata {
    pub session_count: u64,
    pub session_duration: u64,
    pub browser_name: Option<String>,
    pub device_type: Option<String>,
    pub os_name: Option<String>,
    pub response_texts: Vec<String>,
    pub skill: Option<String>,
    pub prev_skill: Option<String>,
    pub did_handover: Option<bool>,
    pub feedback: Option<i64>,
}

/// One row per (conversationId, sessionId). Created once per session,
/// merge-updated on every subsequent interaction within the window; never
/// deleted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub sender_id: String,
    pub page_id: String,
    pub conversation_id: String,
    pub session_started: u64,
    pub last_interaction: u64,
    pub session_count: u64,
    pub interactions: u64,
    pub browser_name: Option<String>,
    pub device_type: Option<String>,
    pub os_name: Option<String>,
}

impl SessionRecord {
    #[must_use]
    pub fn to_fields(&self) -> FieldMap {
        to_fields(self)
    }
}

// =============================================================================
// Event rows
// =============================================================================

/// Tracked-event `type` marking a rendered interaction (fans out to the
/// interactions table).
pub const EVENT_TYPE_PAGE_VIEW: &str = "page_view";

/// Tracked-event `type` for conversation-level events; these carry the
/// bot's response texts.
pub const EVENT_TYPE_CONVERSATION: &str = "conversation";

/// Event category marking a bot interaction view, which receives the
/// session-level enrichment (response texts, skill transition, handover).
pub const CATEGORY_BOT_INTERACTION: &str = "Bot: Interaction";

/// One row in the events table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsEvent {
    pub page_id: String,
    pub sender_id: String,
    pub conversation_id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub category: String,
    pub action: String,
    pub label: String,
    pub value: i64,
    pub skill: String,
    pub last_action: String,
    pub non_interactive: bool,
    pub lang: String,
    pub response_texts: String,
    pub cd1: String,
    pub cd2: String,
    pub cd3: String,
    pub cd4: String,
    pub cd5: String,
    pub cd6: String,
    pub cd7: String,
    pub cd8: String,
}

impl AnalyticsEvent {
    #[must_use]
    pub fn to_fields(&self) -> FieldMap {
        to_fields(self)
    }
}

/// One row in the interactions table — the full rendered-interaction view.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InteractionView {
    pub page_id: String,
    pub sender_id: String,
    pub conversation_id: String,
    pub session_id: String,
    pub category: String,
    pub action: String,
    pub all_actions: String,
    pub request_action: String,
    pub text: String,
    pub intent: String,
    pub intent_score: f64,
    pub entities: String,
    pub winner_intent: String,
    pub winner_action: String,
    pub winner_entities: String,
    pub winner_score: f64,
    pub winner_taken: bool,
    pub expected: String,
    pub expected_taken: bool,
    pub skill: String,
    pub prev_skill: String,
    pub is_text: bool,
    pub is_goto: bool,
    pub is_quick_reply: bool,
    pub is_postback: bool,
    pub is_attachment: bool,
    pub is_context_update: bool,
    pub is_notification: bool,
    pub is_pass_thread: bool,
    pub last_action: String,
    pub prev_action: String,
    pub lang: String,
    pub non_interactive: bool,
    pub response_texts: String,
    pub did_handover: bool,
    pub feedback: Option<i64>,
    pub session_count: u64,
    pub session_duration: u64,
    pub cd1: String,
    pub cd2: String,
    pub cd3: String,
    pub cd4: String,
    pub cd5: String,
    pub cd6: String,
    pub cd7: String,
    pub cd8: String,
}

impl InteractionView {
    #[must_use]
    pub fn to_fields(&self) -> FieldMap {
        to_fields(self)
    }
}

/// An event handed to the fan-out writer by the chatbot framework.
///
/// Page views become interaction-view rows; everything else becomes an
/// analytics-event row.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedEvent {
    PageView(Box<InteractionView>),
    Event(AnalyticsEvent),
}
