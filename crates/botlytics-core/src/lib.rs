//! botlytics-core: Core library for botlytics
//!
//! Persists chatbot interaction telemetry into an ordered, partitioned
//! key-value store and reconstructs user sessions from a stream of events
//! that may be delayed, duplicated, or partially failed.
//!
//! # Architecture
//!
//! ```text
//! interaction → AnalyticsStore ──→ SessionWindower ──→ KeyFactory
//!                     ↓                  (decide)        (row keys /
//!               OrderedStore                              session ids)
//!            (memory / SQLite)
//! ```
//!
//! # Modules
//!
//! - `row_key`: time-ordered row key codec (newest-first string ordering)
//! - `session`: session windowing and lost-create recovery
//! - `store`: the ordered partitioned store contract
//! - `memory_store`: in-memory backend (tests, CLI)
//! - `sqlite_store`: durable SQLite backend
//! - `records`: typed rows for the users/sessions/interactions/events tables
//! - `analytics`: the per-interaction orchestration
//! - `config`: TOML configuration with serde defaults
//! - `logging`: tracing setup
//! - `error`: error taxonomy
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod analytics;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory_store;
pub mod records;
pub mod row_key;
pub mod session;
pub mod sqlite_store;
pub mod store;

pub use analytics::{AnalyticsStore, InteractionRequest, SessionHandle};
pub use config::AnalyticsConfig;
pub use error::{Error, Result};
pub use memory_store::MemoryStore;
pub use row_key::KeyFactory;
pub use session::SessionWindower;
pub use sqlite_store::SqliteStore;
pub use store::OrderedStore;
