//! Record orchestration — keeps the user pointer and session record
//! consistent under partial failure.
//!
//! # Data flow
//!
//! ```text
//! interaction → fetch UserPointer → SessionWindower.decide
//!                                         ↓
//!                     ┌── merge/create UserPointer (always)
//!                     └── SessionRecord: merge on continuation,
//!                         replace on roll, recover on lost create
//! ```
//!
//! Each interaction runs as an independent task; nothing serializes
//! interactions for the same user. Two concurrent first interactions can
//! therefore both roll a session, leaving two session records and the
//! pointer at whichever write landed last. The merge upserts keep that
//! race harmless per field; this component deliberately does not provide
//! linearizability across the read-decide-write sequence.
//!
//! The pointer upsert and the session write are issued concurrently — both
//! are always attempted, and a failure on either is surfaced.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::AnalyticsConfig;
use crate::error::{Error, Result, StoreError};
use crate::records::{
    AnalyticsEvent, CATEGORY_BOT_INTERACTION, EVENT_TYPE_CONVERSATION, InteractionView,
    SessionMetadata, SessionRecord, TrackedEvent, UserMetadata, UserPointer, conversation_id,
};
use crate::row_key::KeyFactory;
use crate::session::{SessionDecision, SessionWindower, WindowState, recover_start_time};
use crate::store::{FieldMap, OrderedStore, TableNames};

/// Current wall clock, milliseconds since the epoch.
fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// One arriving interaction.
#[derive(Debug, Clone, Default)]
pub struct InteractionRequest {
    pub page_id: String,
    pub sender_id: String,
    /// Event time; wall clock when absent.
    pub timestamp_ms: Option<u64>,
    /// System-generated events (campaigns, notifications) must not start or
    /// extend a session window.
    pub non_interactive: bool,
    /// Identity and custom dimensions merged into the user pointer.
    pub user: Option<UserMetadata>,
    /// Session-level context for new session records and event enrichment.
    pub metadata: SessionMetadata,
}

/// Returned to the caller as the foreign key for subsequent event writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    pub conversation_id: String,
}

/// Orchestrates telemetry writes against an [`OrderedStore`].
#[derive(Debug)]
pub struct AnalyticsStore<S> {
    store: S,
    tables: TableNames,
    /// Single mutator path for key generation; held only for the
    /// synchronous generation step, never across an await.
    keys: Mutex<KeyFactory>,
    windower: SessionWindower,
}

impl<S: OrderedStore> AnalyticsStore<S> {
    /// Build with default table names and the default one-hour window.
    pub fn new(store: S) -> Self {
        Self::with_config(store, &AnalyticsConfig::default())
    }

    pub fn with_config(store: S, config: &AnalyticsConfig) -> Self {
        Self {
            store,
            tables: config.table_names(),
            keys: Mutex::new(KeyFactory::new()),
            windower: SessionWindower::new(config.session_duration_ms),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current session idle window in milliseconds.
    pub fn session_window_ms(&self) -> u64 {
        self.windower.window_ms()
    }

    /// Replace the idle window at runtime; effective on the next decision
    /// only — in-flight sessions are never re-evaluated.
    pub fn set_session_window_ms(&self, window_ms: u64) {
        self.windower.set_window_ms(window_ms);
    }

    /// Process one interaction: decide session continuity, upsert the user
    /// pointer, and create/merge/recover the session record.
    ///
    /// The returned handle keys all subsequent event writes for this
    /// interaction.
    pub async fn track_interaction(&self, req: &InteractionRequest) -> Result<SessionHandle> {
        let now = req.timestamp_ms.unwrap_or_else(now_ms);
        let conversation = conversation_id(&req.page_id, &req.sender_id);

        let existing = match self
            .store
            .get_one(&self.tables.users, &req.page_id, &req.sender_id)
            .await
        {
            Ok(fields) => Some(UserPointer::from_fields(&fields)),
            Err(StoreError::NotFound) => None,
            Err(err) => return Err(err.into()),
        };
        let pointer = existing.clone().unwrap_or_default();

        let state = WindowState {
            previous_session_id: pointer.session_id.clone(),
            last_interaction_ms: pointer.last_interaction_ms,
            non_interactive: req.non_interactive,
        };
        let decision = {
            let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
            self.windower.decide(&mut keys, &state, now)
        };
        debug!(
            page_id = %req.page_id,
            sender_id = %req.sender_id,
            session_id = %decision.session_id,
            rolled = decision.rolled(),
            "session decision"
        );

        let session_count = if decision.rolled() {
            pointer.session_count + 1
        } else {
            pointer.session_count
        };

        let user_fields =
            user_pointer_fields(req, &conversation, &decision, existing.is_none(), session_count, now);
        let user_write = async {
            if existing.is_some() {
                self.store
                    .merge_update(&self.tables.users, &req.page_id, &req.sender_id, user_fields)
                    .await
            } else {
                self.store
                    .upsert_replace(&self.tables.users, &req.page_id, &req.sender_id, user_fields)
                    .await
            }
            .map_err(Error::from)
        };

        let session_write = async {
            if let Some(started) = decision.started_at_ms {
                return self
                    .write_session_record(req, &conversation, &decision.session_id, started, now, session_count)
                    .await;
            }
            if req.non_interactive {
                // system traffic neither extends the session nor repairs it
                return Ok(());
            }
            match self
                .store
                .get_one(&self.tables.sessions, &conversation, &decision.session_id)
                .await
            {
                Ok(session) => {
                    let interactions = session
                        .get("interactions")
                        .and_then(serde_json::Value::as_u64)
                        .unwrap_or(0);
                    let mut fields = FieldMap::new();
                    fields.insert("lastInteraction".into(), json!(now));
                    fields.insert("interactions".into(), json!(interactions + 1));
                    self.store
                        .merge_update(&self.tables.sessions, &conversation, &decision.session_id, fields)
                        .await
                        .map_err(Error::from)
                }
                Err(StoreError::NotFound) => {
                    // the pointer references a session whose creation write
                    // was lost; the id itself carries the start time
                    let started = recover_start_time(&decision.session_id)?;
                    warn!(
                        conversation_id = %conversation,
                        session_id = %decision.session_id,
                        session_started = started,
                        "session record missing, re-issuing creation write"
                    );
                    self.write_session_record(req, &conversation, &decision.session_id, started, now, session_count)
                        .await
                }
                Err(err) => Err(err.into()),
            }
        };

        let (user_result, session_result) = tokio::join!(user_write, session_write);
        user_result?;
        session_result?;

        Ok(SessionHandle {
            session_id: decision.session_id,
            conversation_id: conversation,
        })
    }

    /// Write one row into the events table, keyed by a fresh row key.
    pub async fn store_event(
        &self,
        event: &AnalyticsEvent,
        timestamp_ms: Option<u64>,
    ) -> Result<()> {
        let row_key = self.next_row_key();
        let mut fields = event.to_fields();
        fields.insert("ts".into(), json!(timestamp_ms.unwrap_or_else(now_ms)));
        self.store
            .create_if_absent(&self.tables.events, &event.page_id, &row_key, fields)
            .await
            .map_err(Error::from)
    }

    /// Write one row into the interactions table, keyed by a fresh row key.
    pub async fn store_interaction_view(
        &self,
        view: &InteractionView,
        timestamp_ms: Option<u64>,
    ) -> Result<()> {
        let row_key = self.next_row_key();
        let mut fields = view.to_fields();
        fields.insert("ts".into(), json!(timestamp_ms.unwrap_or_else(now_ms)));
        self.store
            .create_if_absent(&self.tables.interactions, &view.page_id, &row_key, fields)
            .await
            .map_err(Error::from)
    }

    /// Fan out a batch of tracked events for one interaction.
    ///
    /// Page views land in the interactions table (bot-interaction views are
    /// enriched with response texts, skill transition, handover and
    /// feedback); everything else lands in the events table (conversation
    /// events carry response texts). Each row is keyed independently.
    pub async fn store_events(
        &self,
        handle: &SessionHandle,
        page_id: &str,
        sender_id: &str,
        events: Vec<TrackedEvent>,
        timestamp_ms: Option<u64>,
        metadata: &SessionMetadata,
    ) -> Result<()> {
        let response_texts = metadata.response_texts.join("\n");
        for event in events {
            match event {
                TrackedEvent::PageView(mut view) => {
                    if view.action.is_empty() {
                        view.action = "*".to_string();
                    }
                    view.page_id = page_id.to_string();
                    view.sender_id = sender_id.to_string();
                    view.conversation_id = handle.conversation_id.clone();
                    view.session_id = handle.session_id.clone();
                    view.session_count = metadata.session_count;
                    view.session_duration = metadata.session_duration;
                    if view.category == CATEGORY_BOT_INTERACTION {
                        view.response_texts = response_texts.clone();
                        if let Some(skill) = &metadata.skill {
                            view.skill = skill.clone();
                        }
                        if let Some(prev_skill) = &metadata.prev_skill {
                            view.prev_skill = prev_skill.clone();
                        }
                        if let Some(did_handover) = metadata.did_handover {
                            view.did_handover = did_handover;
                        }
                        if metadata.feedback.is_some() {
                            view.feedback = metadata.feedback;
                        }
                    }
                    self.store_interaction_view(&view, timestamp_ms).await?;
                }
                TrackedEvent::Event(mut event) => {
                    event.page_id = page_id.to_string();
                    event.sender_id = sender_id.to_string();
                    event.conversation_id = handle.conversation_id.clone();
                    event.session_id = handle.session_id.clone();
                    if event.event_type == EVENT_TYPE_CONVERSATION {
                        event.response_texts = response_texts.clone();
                    }
                    self.store_event(&event, timestamp_ms).await?;
                }
            }
        }
        Ok(())
    }

    fn next_row_key(&self) -> String {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.next_key(now_ms())
    }

    async fn write_session_record(
        &self,
        req: &InteractionRequest,
        conversation: &str,
        session_id: &str,
        started: u64,
        now: u64,
        session_count: u64,
    ) -> Result<()> {
        let record = SessionRecord {
            sender_id: req.sender_id.clone(),
            page_id: req.page_id.clone(),
            conversation_id: conversation.to_string(),
            session_started: started,
            last_interaction: now,
            session_count,
            interactions: u64::from(!req.non_interactive),
            browser_name: req.metadata.browser_name.clone(),
            device_type: req.metadata.device_type.clone(),
            os_name: req.metadata.os_name.clone(),
        };
        self.store
            .upsert_replace(&self.tables.sessions, conversation, session_id, record.to_fields())
            .await
            .map_err(Error::from)
    }
}

fn user_pointer_fields(
    req: &InteractionRequest,
    conversation: &str,
    decision: &SessionDecision,
    is_new_user: bool,
    session_count: u64,
    now: u64,
) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("updated".into(), json!(now_ms()));
    fields.insert("conversationId".into(), json!(conversation));

    let mut user_meta = req
        .user
        .as_ref()
        .map(crate::records::to_fields)
        .unwrap_or_default();
    let user_id = user_meta.remove("id").unwrap_or(json!(null));
    fields.insert("userId".into(), user_id);
    for (key, value) in user_meta {
        fields.insert(key, value);
    }

    if is_new_user {
        // immutable once set
        fields.insert("created".into(), json!(now));
    }
    if !req.non_interactive {
        fields.insert("lastInteraction".into(), json!(now));
    }
    if let Some(started) = decision.started_at_ms {
        fields.insert("sessionId".into(), json!(decision.session_id));
        fields.insert("sessionStarted".into(), json!(started));
        fields.insert("sessionCount".into(), json!(session_count));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use serde_json::Value;

    fn request(page: &str, sender: &str, ts: u64) -> InteractionRequest {
        InteractionRequest {
            page_id: page.to_string(),
            sender_id: sender.to_string(),
            timestamp_ms: Some(ts),
            ..InteractionRequest::default()
        }
    }

    async fn user_row(store: &AnalyticsStore<MemoryStore>, page: &str, sender: &str) -> FieldMap {
        store.store().get_one("users", page, sender).await.unwrap()
    }

    async fn session_row(
        store: &AnalyticsStore<MemoryStore>,
        handle: &SessionHandle,
    ) -> FieldMap {
        store
            .store()
            .get_one("sessions", &handle.conversation_id, &handle.session_id)
            .await
            .unwrap()
    }

    // ── first contact ──

    #[tokio::test]
    async fn first_interaction_creates_pointer_and_session() {
        let store = AnalyticsStore::new(MemoryStore::new());
        let handle = store.track_interaction(&request("p", "s", 1_000)).await.unwrap();
        assert_eq!(handle.conversation_id, "p|s");

        let user = user_row(&store, "p", "s").await;
        assert_eq!(user.get("created"), Some(&json!(1_000)));
        assert_eq!(user.get("lastInteraction"), Some(&json!(1_000)));
        assert_eq!(user.get("sessionId"), Some(&json!(handle.session_id.clone())));
        assert_eq!(user.get("sessionCount"), Some(&json!(1)));

        let session = session_row(&store, &handle).await;
        assert_eq!(session.get("sessionStarted"), Some(&json!(1_000)));
        assert_eq!(session.get("interactions"), Some(&json!(1)));
    }

    // ── continuation ──

    #[tokio::test]
    async fn interaction_inside_window_continues() {
        let store = AnalyticsStore::new(MemoryStore::new());
        store.set_session_window_ms(1_000);

        let first = store.track_interaction(&request("p", "s", 0)).await.unwrap();
        let second = store.track_interaction(&request("p", "s", 999)).await.unwrap();
        assert_eq!(first.session_id, second.session_id);

        let session = session_row(&store, &second).await;
        assert_eq!(session.get("interactions"), Some(&json!(2)));
        assert_eq!(session.get("lastInteraction"), Some(&json!(999)));
        // created is immutable across interactions
        let user = user_row(&store, "p", "s").await;
        assert_eq!(user.get("created"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn interaction_past_window_rolls() {
        let store = AnalyticsStore::new(MemoryStore::new());
        store.set_session_window_ms(1_000);

        let first = store.track_interaction(&request("p", "s", 0)).await.unwrap();
        let second = store.track_interaction(&request("p", "s", 1_001)).await.unwrap();
        assert_ne!(first.session_id, second.session_id);

        let user = user_row(&store, "p", "s").await;
        assert_eq!(user.get("sessionCount"), Some(&json!(2)));
        // both session records exist; nothing is deleted
        assert!(store
            .store()
            .get_one("sessions", &first.conversation_id, &first.session_id)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn boundary_interaction_continues() {
        let store = AnalyticsStore::new(MemoryStore::new());
        store.set_session_window_ms(1_000);
        let first = store.track_interaction(&request("p", "s", 0)).await.unwrap();
        let second = store.track_interaction(&request("p", "s", 1_000)).await.unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    // ── non-interactive traffic ──

    #[tokio::test]
    async fn non_interactive_never_touches_last_interaction() {
        let store = AnalyticsStore::new(MemoryStore::new());
        store.set_session_window_ms(1_000);
        store.track_interaction(&request("p", "s", 0)).await.unwrap();

        let mut campaign = request("p", "s", 50_000);
        campaign.non_interactive = true;
        let handle = store.track_interaction(&campaign).await.unwrap();

        let user = user_row(&store, "p", "s").await;
        assert_eq!(user.get("lastInteraction"), Some(&json!(0)));
        // and the session was not rolled even though the window elapsed
        assert_eq!(user.get("sessionCount"), Some(&json!(1)));
        let session = session_row(&store, &handle).await;
        assert_eq!(session.get("interactions"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn non_interactive_first_contact_creates_empty_session() {
        let store = AnalyticsStore::new(MemoryStore::new());
        let mut campaign = request("p", "s", 500);
        campaign.non_interactive = true;
        let handle = store.track_interaction(&campaign).await.unwrap();

        let session = session_row(&store, &handle).await;
        assert_eq!(session.get("interactions"), Some(&json!(0)));
        let user = user_row(&store, "p", "s").await;
        assert!(user.get("lastInteraction").is_none());
        assert_eq!(user.get("created"), Some(&json!(500)));
    }

    // ── recovery ──

    #[tokio::test]
    async fn lost_session_create_is_recovered_from_the_id() {
        let store = AnalyticsStore::new(MemoryStore::new());
        store.set_session_window_ms(10_000);

        // simulate a pointer whose session-creation write was lost
        let session_id = {
            let mut factory = KeyFactory::new();
            factory.next_session_id(2_000)
        };
        let mut pointer = FieldMap::new();
        pointer.insert("sessionId".into(), json!(session_id.clone()));
        pointer.insert("lastInteraction".into(), json!(2_000));
        pointer.insert("sessionCount".into(), json!(4));
        store
            .store()
            .upsert_replace("users", "p", "s", pointer)
            .await
            .unwrap();

        let handle = store.track_interaction(&request("p", "s", 3_000)).await.unwrap();
        // same id kept for the whole logical session
        assert_eq!(handle.session_id, session_id);

        let session = session_row(&store, &handle).await;
        assert_eq!(session.get("sessionStarted"), Some(&json!(2_000)));
        assert_eq!(session.get("lastInteraction"), Some(&json!(3_000)));
        assert_eq!(session.get("interactions"), Some(&json!(1)));
        assert_eq!(session.get("sessionCount"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn recovery_propagates_malformed_ids() {
        let store = AnalyticsStore::new(MemoryStore::new());
        store.set_session_window_ms(10_000);

        let mut pointer = FieldMap::new();
        pointer.insert("sessionId".into(), json!("definitely-not-a-key!"));
        pointer.insert("lastInteraction".into(), json!(1_000));
        store
            .store()
            .upsert_replace("users", "p", "s", pointer)
            .await
            .unwrap();

        let err = store
            .track_interaction(&request("p", "s", 1_500))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Key(_)));
    }

    // ── idempotence ──

    #[tokio::test]
    async fn sequential_replay_keeps_one_session_id() {
        let store = AnalyticsStore::new(MemoryStore::new());
        let req = request("p", "s", 7_000);
        let first = store.track_interaction(&req).await.unwrap();
        let second = store.track_interaction(&req).await.unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    // ── event fan-out ──

    #[tokio::test]
    async fn fan_out_routes_page_views_and_events() {
        let store = AnalyticsStore::new(MemoryStore::new());
        let handle = store.track_interaction(&request("p", "s", 1_000)).await.unwrap();

        let metadata = SessionMetadata {
            session_count: 1,
            session_duration: 250,
            response_texts: vec!["hello".to_string(), "anything else?".to_string()],
            skill: Some("smalltalk".to_string()),
            ..SessionMetadata::default()
        };
        let events = vec![
            TrackedEvent::PageView(Box::new(InteractionView {
                category: CATEGORY_BOT_INTERACTION.to_string(),
                ..InteractionView::default()
            })),
            TrackedEvent::Event(AnalyticsEvent {
                event_type: EVENT_TYPE_CONVERSATION.to_string(),
                category: "Intent: Detection".to_string(),
                ..AnalyticsEvent::default()
            }),
        ];
        store
            .store_events(&handle, "p", "s", events, Some(1_000), &metadata)
            .await
            .unwrap();

        assert_eq!(store.store().row_count("interactions").await, 1);
        assert_eq!(store.store().row_count("events").await, 1);

        let views = store
            .store()
            .scan_range("interactions", "p", "0", "zzzzzzzzzzzzzzzzzz", 10)
            .await
            .unwrap();
        let (key, view) = &views[0];
        assert_eq!(key.len(), crate::row_key::ROW_KEY_WIDTH);
        assert_eq!(view.get("action"), Some(&json!("*")));
        assert_eq!(view.get("sessionId"), Some(&json!(handle.session_id.clone())));
        assert_eq!(
            view.get("responseTexts"),
            Some(&json!("hello\nanything else?"))
        );
        assert_eq!(view.get("skill"), Some(&json!("smalltalk")));
        assert_eq!(view.get("sessionDuration"), Some(&json!(250)));

        let events = store
            .store()
            .scan_range("events", "p", "0", "zzzzzzzzzzzzzzzzzz", 10)
            .await
            .unwrap();
        let (_, event) = &events[0];
        assert_eq!(event.get("type"), Some(&json!("conversation")));
        assert_eq!(
            event.get("responseTexts"),
            Some(&json!("hello\nanything else?"))
        );
        assert!(event.get("ts").and_then(Value::as_u64).is_some());
    }

    #[tokio::test]
    async fn user_metadata_lands_on_the_pointer() {
        let store = AnalyticsStore::new(MemoryStore::new());
        let mut req = request("p", "s", 1_000);
        req.user = Some(UserMetadata {
            id: Some("u-1".to_string()),
            cd1: Some("sales".to_string()),
            ..UserMetadata::default()
        });
        store.track_interaction(&req).await.unwrap();

        let user = user_row(&store, "p", "s").await;
        assert_eq!(user.get("userId"), Some(&json!("u-1")));
        assert_eq!(user.get("cd1"), Some(&json!("sales")));
    }
}
