#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Gridfleet-Integration
//! Low-level channel, snapshot and error plumbing shared by every Gridfleet crate.
//!
//! This crate deliberately knows nothing about trading: it provides the `Tx` abstraction used
//! for every per-agent channel (including the drop-oldest price-update channel), a `Snapshot<T>`
//! wrapper for persisted state, and the `IntegrationError` taxonomy for network/serde failures at
//! the gateway boundary.

/// All [`Error`](std::error::Error)s generated in Gridfleet-Integration.
pub mod error;

/// Defines a trait [`Tx`](channel::Tx) abstraction over different channel kinds, as well as
/// other channel utilities.
///
/// eg/ `UnboundedTx`, `DropOldestTx`, etc.
pub mod channel;

/// A generic wrapper marking a value as a full-state snapshot (as opposed to an incremental
/// update), used for persisted `AgentState` documents.
pub mod snapshot;
