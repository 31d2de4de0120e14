//! Enrolment and assessment progression core for a learning-management backend.
//!
//! - `ledger`: course and pathway enrolment records
//! - `attempt`: quiz attempts from start to graded submission
//! - `progression`: enrolment status derivation and pathway gating
//! - `store`: Postgres and in-memory persistence behind one trait seam

pub mod attempt;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod progression;
pub mod routes;
pub mod store;

pub use error::{EngineError, EngineResult, StoreError};
pub use routes::{router, AppState};
