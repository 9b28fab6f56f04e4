// Library surface for the monitoring engine. The replay binary in main.rs
// and the integration tests both drive it headlessly.
pub mod analyzer;
pub mod clipboard;
pub mod config;
pub mod grading;
pub mod report;
pub mod runtime;
pub mod script;
pub mod session;
pub mod util;
pub mod violation;
pub mod watchdog;
