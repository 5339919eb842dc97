// Building Catalog - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod collation;  // Locale-aware ordering (SQL + in-memory)
pub mod config;     // CLI/env configuration + tracing setup
pub mod db;         // Record Store + Proposal Store (SQLite)
pub mod entities;   // Building, PendingDeletion
pub mod error;      // Error taxonomy + {param, msg} rendering
pub mod gate;       // Verification Gate
pub mod moderation; // Moderation Engine
pub mod query;      // Query Service
pub mod schema;     // Request validation
pub mod temporal;   // Timestamp encoding + caller timezone

#[cfg(feature = "server")]
pub mod api;        // HTTP routes

// Re-export commonly used types
pub use db::{
    StoredBuilding, CatalogCounts, ModerationEvent, EventKind, SeedRow, SeedReport,
    open_catalog, setup_database, catalog_counts, load_csv, seed_buildings,
    insert_event, get_events_for_subject,
};
pub use entities::{
    Building, BuildingFields, BuildingType, PendingAddition, PendingDeletion, Style, Tile,
};
pub use error::{FieldError, GateRejection, ModerationError, ModerationResult, Operation};
pub use gate::{
    Action, CallerContext, Clock, SystemClock, FixedClock,
    TokenVerifier, RecaptchaVerifier, VerificationOutcome, GateConfig, VerificationGate,
};
pub use moderation::{
    submit_addition, approve_addition, remove_addition,
    submit_deletion, approve_deletion, remove_deletion,
    ADDITION_ACCEPTED, DELETION_ACCEPTED,
};
pub use query::{
    Collection, SortField, SortDir, ListQuery, Listing, BuildingView, PendingDeletionView,
    list, get_building, get_pending_addition,
};
pub use schema::{AdditionSubmission, Proof, RawAddition, RawFields, RawImage};
pub use temporal::CallerTimeZone;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
