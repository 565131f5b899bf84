//! Dualmux - remux orchestration engine.
//!
//! Combines a primary video source with externally supplied or extracted
//! audio/subtitle tracks into a single Matroska container without
//! re-encoding. Works on single jobs or large batches of paired episodes
//! (e.g. a Japanese-audio directory and a Latin-audio directory matched
//! by episode number).
//!
//! This crate contains the engine only: domain model, episode matching,
//! plan building, the mkvmerge prober/muxer adapters, the job state
//! machine, and the concurrent batch runner. It has zero UI dependencies
//! and is consumed by a GUI or CLI front-end.

pub mod config;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod mux;
pub mod orchestrator;
pub mod plan;
pub mod probe;
pub mod process;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
