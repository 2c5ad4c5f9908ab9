//! Cloud-drive estate analysis pipeline.
//!
//! Inventories a user's drive, runs per-file sub-analyses (embedded links,
//! sharing exposure, migration complexity, graph location), scores risk, and
//! folds per-user and per-drive aggregates. External calls go through a
//! retrying [`gateway::Gateway`]; results are cached in a dual-tier
//! [`cache::DualTierCache`] whose failures only ever degrade to
//! pass-through.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod drive;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod pipeline;
pub mod types;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Call once at startup; respects
/// `RUST_LOG` when set.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,drivescope=info")),
        )
        .init();
}
