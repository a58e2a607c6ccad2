//! svnwc core library.
//!
//! The client-side working-copy engine of a centralized version control
//! system: the node metadata store, the status classifier, the conflict
//! store and resolver, and the driver that applies update, switch and merge
//! deltas to a working copy.

pub mod cancel;
pub mod config;
pub mod conflict;
pub mod db;
pub mod delta;
pub mod driver;
pub mod errors;
pub mod filter;
pub mod mergeinfo;
pub mod models;
pub mod notify;
pub mod status;
pub mod target;
pub mod wc;

// Re-exports for convenience.
pub use cancel::CancellationToken;
pub use config::WcConfig;
pub use db::Database;
pub use driver::{DriverOptions, DriverReport, MergeDriver, MergeOptions, PathState};
pub use errors::WcError;
pub use wc::WorkingCopy;
