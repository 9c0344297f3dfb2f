// Public API - the runner, plus the upstream cleaning rule
pub mod cleaning;
pub mod runner;

// Internal modules - organized by subsystem
mod config;
mod db;
mod error;
mod formats;
mod io;
mod load;
mod normalize;
mod telemetry;
