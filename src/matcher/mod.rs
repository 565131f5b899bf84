//! Episode matcher: pairs files from two input sets by episode number.
//!
//! Matching is filename based only. Files that yield no number and
//! numbers present on only one side are reported, never silently
//! dropped; duplicate numbers within one set are a hard error because
//! the ambiguity must be surfaced, not guessed away.

mod patterns;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Episode, MatchConfidence, SourceSide, UnmatchReason, UnmatchedFile};
use patterns::{EPISODE_PATTERNS, FORCED_PATTERNS};

/// Matching failed for one input set.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchingError {
    /// Two files in the same set resolve to the same episode number.
    #[error(
        "duplicate episode number {number} in {side} set: {} and {}",
        first.display(),
        second.display()
    )]
    DuplicateEpisodeNumber {
        number: u32,
        side: SourceSide,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Outcome of a matching run: paired episodes plus everything that could
/// not be paired, with reasons.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchReport {
    /// Matched pairs, sorted by episode number ascending.
    pub episodes: Vec<Episode>,
    /// Files excluded from pairing.
    pub unmatched: Vec<UnmatchedFile>,
}

impl MatchReport {
    /// Whether every input file ended up in a pair.
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

/// Extract an episode number from a filename.
///
/// Tries the prioritized pattern list; the first matching pattern wins
/// and explicit markers (`S01E03`, `EP03`) outrank bare numbers.
pub fn extract_episode_number(filename: &str) -> Option<(u32, MatchConfidence)> {
    for pattern in EPISODE_PATTERNS.iter() {
        if let Some(caps) = pattern.regex.captures(filename) {
            if let Some(m) = caps.get(pattern.group) {
                if let Ok(number) = m.as_str().parse::<u32>() {
                    if number > 0 {
                        return Some((number, pattern.confidence));
                    }
                }
            }
        }
    }
    None
}

/// Whether a subtitle filename marks a forced (signs/songs) track.
pub fn is_forced_subtitle_name(filename: &str) -> bool {
    FORCED_PATTERNS.is_match(filename)
}

/// Pair files from a primary and a secondary set by episode number.
///
/// Deterministic and order independent: inputs are sorted before
/// processing and the output is sorted by episode number. A duplicate
/// number within either set fails the whole run before any `Episode`
/// is produced for that set.
pub fn match_episodes(
    primary: &[PathBuf],
    secondary: &[PathBuf],
) -> Result<MatchReport, MatchingError> {
    let mut unmatched = Vec::new();

    let primary_map = index_side(primary, SourceSide::Primary, &mut unmatched)?;
    let secondary_map = index_side(secondary, SourceSide::Secondary, &mut unmatched)?;

    let mut episodes = Vec::new();
    for (number, (primary_file, primary_conf)) in &primary_map {
        match secondary_map.get(number) {
            Some((secondary_file, secondary_conf)) => {
                let confidence = weaker(*primary_conf, *secondary_conf);
                episodes.push(Episode::new(
                    *number,
                    primary_file.clone(),
                    secondary_file.clone(),
                    confidence,
                ));
            }
            None => unmatched.push(UnmatchedFile {
                path: primary_file.clone(),
                side: SourceSide::Primary,
                reason: UnmatchReason::NoCounterpart,
                number: Some(*number),
            }),
        }
    }

    for (number, (secondary_file, _)) in &secondary_map {
        if !primary_map.contains_key(number) {
            unmatched.push(UnmatchedFile {
                path: secondary_file.clone(),
                side: SourceSide::Secondary,
                reason: UnmatchReason::NoCounterpart,
                number: Some(*number),
            });
        }
    }

    tracing::info!(
        matched = episodes.len(),
        unmatched = unmatched.len(),
        "episode matching finished"
    );

    Ok(MatchReport {
        episodes,
        unmatched,
    })
}

/// Build the number → file map for one side, recording files without a
/// number and failing on duplicates.
fn index_side(
    files: &[PathBuf],
    side: SourceSide,
    unmatched: &mut Vec<UnmatchedFile>,
) -> Result<BTreeMap<u32, (PathBuf, MatchConfidence)>, MatchingError> {
    // Sort so duplicate reporting does not depend on input order.
    let mut files: Vec<&PathBuf> = files.iter().collect();
    files.sort();

    let mut map: BTreeMap<u32, (PathBuf, MatchConfidence)> = BTreeMap::new();
    for file in files {
        let name = file_name(file);
        match extract_episode_number(&name) {
            Some((number, confidence)) => {
                if let Some((existing, _)) = map.get(&number) {
                    return Err(MatchingError::DuplicateEpisodeNumber {
                        number,
                        side,
                        first: existing.clone(),
                        second: file.clone(),
                    });
                }
                map.insert(number, (file.clone(), confidence));
            }
            None => {
                tracing::warn!(file = %file.display(), %side, "no episode number in filename");
                unmatched.push(UnmatchedFile {
                    path: file.clone(),
                    side,
                    reason: UnmatchReason::NoEpisodeNumber,
                    number: None,
                });
            }
        }
    }
    Ok(map)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn weaker(a: MatchConfidence, b: MatchConfidence) -> MatchConfidence {
    if a == MatchConfidence::Exact && b == MatchConfidence::Exact {
        MatchConfidence::Exact
    } else {
        MatchConfidence::Fuzzy
    }
}
