//! Ugo Observability
//!
//! Console logging setup for processes hosting the cache.
//!
//! # Features
//!
//! - `json`: emit one JSON object per event instead of the compact text format
//!
//! # Examples
//!
//! ```no_run
//! use ugo_observability::init_basic_console_logging;
//!
//! fn main() {
//!     init_basic_console_logging();
//!     // ... application code ...
//! }
//! ```

pub mod logging;

pub use logging::{build_env_filter, init_basic_console_logging};
