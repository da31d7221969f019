//! Storage for the triage pipeline.
//!
//! - [`ContextStore`]: per-run scopes holding stage outputs, discarded when a
//!   run ends, plus a long-lived per-patient decision history
//! - [`AuditLog`]: append-only, hash-linked record of every run
//!
//! Neither surface exposes update or delete operations for persisted data.

#![deny(unsafe_code)]

pub mod audit;
pub mod context;
pub mod error;

pub use audit::{verify_chain, AuditLog, AuditReceipt, ChainedRecord, InMemoryAuditLog};
pub use context::ContextStore;
pub use error::{AuditError, AuditResult, ContextError};
