//! crates/note_access_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the access-gating core.
//! These traits form the boundary of the hexagonal architecture: the ad SDK,
//! persisted storage, the wall clock, the notes backend and the platform's
//! screen-capture control are all injected from outside.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use crate::domain::{AccessState, Note, NoteAccessGrant, NoteId};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., storage, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Ad SDK
//=========================================================================================

/// Signals emitted by the ad SDK for a single ad unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdEvent {
    Loaded,
    Error(String),
    EarnedReward,
    Opened,
    Closed,
}

/// The load/show primitives of an external ad SDK. Both calls only *request*
/// the operation; completion is reported later through `AdEvent`s.
#[async_trait]
pub trait AdSdk: Send + Sync {
    async fn load(&self) -> PortResult<()>;
    async fn show(&self) -> PortResult<()>;
}

//=========================================================================================
// Persisted state, clock and backend
//=========================================================================================

#[async_trait]
pub trait AccessStateStore: Send + Sync {
    /// Loads the persisted state, or the default state if nothing was saved yet.
    async fn load(&self) -> PortResult<AccessState>;
    async fn save(&self, state: &AccessState) -> PortResult<()>;
}

pub trait Clock: Send + Sync {
    /// The current local calendar day.
    fn today(&self) -> NaiveDate;
    fn now(&self) -> DateTime<Utc>;
}

#[async_trait]
pub trait NoteBackend: Send + Sync {
    async fn get_note(&self, note_id: NoteId) -> PortResult<Note>;
    /// Asks the backend for a fresh signed viewer URL.
    async fn request_access(&self, note_id: NoteId) -> PortResult<NoteAccessGrant>;
}

//=========================================================================================
// Platform surface
//=========================================================================================

/// Best-effort screen-capture prevention offered by the host platform.
pub trait ScreenCapture: Send + Sync {
    fn prevent(&self);
    fn allow(&self);
}
