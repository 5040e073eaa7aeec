//! Underworld world-dynamics core.
//!
//! Two coupled engines behind one facade (`engine::WorldEngine`):
//!   - the district ecosystem aggregator (events → metrics → status), and
//!   - the reputation ledger with one-hop propagation through the
//!     faction/district graph.

pub mod clock;
pub mod config;
pub mod district_subsystem;
pub mod engine;
pub mod error;
pub mod event;
pub mod ingest;
pub mod propagation;
pub mod registry;
pub mod reputation_subsystem;
pub mod standing;
pub mod store;
pub mod types;
