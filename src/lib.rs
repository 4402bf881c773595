#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::private_doc_tests)]
#![deny(missing_docs)]
//! Recurrent pedestrian trajectory prediction.
pub mod cfg;
pub mod chart;
pub mod dataset;
mod error;
pub mod metrics;
pub mod model;
pub mod plot;
pub mod report;
pub mod train;
pub mod trajectory;

pub use error::{Error, Result};

use tracing_subscriber::EnvFilter;

/// Installs the log subscriber, preferring `RUST_LOG` over the given filter.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
