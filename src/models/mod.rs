//! Domain model: tracks, jobs, episodes, and status enums.
//!
//! Pure data with validation at construction. No side effects here;
//! behavior lives in the matcher, plan builder, and orchestrator.

mod enums;
mod episodes;
mod jobs;
mod media;

pub use enums::{JobStatus, MatchConfidence, SourceSide, TrackKind};
pub use episodes::{Episode, UnmatchReason, UnmatchedFile};
pub use jobs::{InvalidJobError, RemuxJob};
pub use media::{Track, TrackKey, TrackOverride};
