//! Metrics for the hublink relay.
//!
//! Uses the `metrics` crate facade. Without a recorder installed every macro
//! call is a no-op; with the `prometheus` feature [`init_metrics`] installs a
//! Prometheus recorder, optionally serving a scrape endpoint.
//!
//! ```rust,ignore
//! use hublink_metrics::{counter, relay, labels};
//!
//! counter!(relay::VETOES_TOTAL, labels::GATE => "antispam").increment(1);
//! ```

mod definitions;
pub mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
