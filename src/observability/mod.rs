//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! wallet session, submitter, registrar produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Whatever metrics recorder the host application installs
//! ```

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
