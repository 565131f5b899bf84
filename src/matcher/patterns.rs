//! Prioritized episode-number patterns.
//!
//! Explicit markers outrank bare numbers: a filename like
//! "Show_S01E03 - 05.mkv" is episode 3, not 5. Within the list the first
//! matching pattern wins; within a pattern the leftmost occurrence wins.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::MatchConfidence;

/// One pattern in the priority list.
pub(crate) struct EpisodePattern {
    pub regex: Regex,
    /// Capture group holding the episode number.
    pub group: usize,
    pub confidence: MatchConfidence,
}

/// Patterns in priority order.
///
/// Separators accepted around tokens: space, dot, underscore, hyphen,
/// and bracket/parenthesis openers. A word boundary is not enough because
/// `_` counts as a word character ("Show_EP01").
pub(crate) static EPISODE_PATTERNS: Lazy<Vec<EpisodePattern>> = Lazy::new(|| {
    vec![
        // S01E03, s01 e03
        EpisodePattern {
            regex: Regex::new(r"(?i)s(\d{1,2})\s*e(\d{1,3})").unwrap(),
            group: 2,
            confidence: MatchConfidence::Exact,
        },
        // Episode 03, Episodio 3, Ep03, EP_03, E03
        EpisodePattern {
            regex: Regex::new(r"(?i)(?:^|[\s._\-\[\(])(?:episode|episodio|ep|e)[\s._-]*(\d{1,3})")
                .unwrap(),
            group: 1,
            confidence: MatchConfidence::Exact,
        },
        // Leading number: "03 - Title.mkv"
        EpisodePattern {
            regex: Regex::new(r"^(\d{1,3})[\s._-]").unwrap(),
            group: 1,
            confidence: MatchConfidence::Fuzzy,
        },
        // Bare number between separators: " - 03 ", "_03_", " 03["
        EpisodePattern {
            regex: Regex::new(r"(?:^|[\s._\-\[\(])(\d{1,3})(?:[\s._\-\)\]]|$)").unwrap(),
            group: 1,
            confidence: MatchConfidence::Fuzzy,
        },
    ]
});

/// Markers identifying a forced (signs/songs) subtitle file.
pub(crate) static FORCED_PATTERNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)forced|letreros|signs?(\s*&\s*songs?)?").unwrap());

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::extract_episode_number;

    // Conformance table pinning pattern precedence.
    #[test]
    fn precedence_table() {
        let cases: &[(&str, Option<(u32, MatchConfidence)>)] = &[
            ("Anime - S01E03 - Title.mkv", Some((3, MatchConfidence::Exact))),
            ("anime s2 e12.mkv", Some((12, MatchConfidence::Exact))),
            ("Show_EP01.mkv", Some((1, MatchConfidence::Exact))),
            ("Anime Episode 12.mkv", Some((12, MatchConfidence::Exact))),
            ("Anime_Ep_05_subs.ass", Some((5, MatchConfidence::Exact))),
            ("Show - 01.mkv", Some((1, MatchConfidence::Fuzzy))),
            ("[Group] Anime - 03 [1080p].mp4", Some((3, MatchConfidence::Fuzzy))),
            ("03_audio_latino.m4a", Some((3, MatchConfidence::Fuzzy))),
            ("anime-07-forced.ass", Some((7, MatchConfidence::Fuzzy))),
            // Explicit marker beats an earlier bare number.
            ("Show - 05 - E09.mkv", Some((9, MatchConfidence::Exact))),
            // SxxEyy beats a plain E marker.
            ("S02E04_E99.mkv", Some((4, MatchConfidence::Exact))),
            // Resolution tokens and years are not episode numbers.
            ("Movie (2020) 1080p.mkv", None),
            ("Opening Theme.mkv", None),
        ];

        for (name, expected) in cases {
            assert_eq!(extract_episode_number(name), *expected, "{}", name);
        }
    }

    #[test]
    fn forced_markers_detected() {
        assert!(FORCED_PATTERNS.is_match("ep03.FORCED.ass"));
        assert!(FORCED_PATTERNS.is_match("ep03_letreros.ass"));
        assert!(FORCED_PATTERNS.is_match("Signs & Songs 03.ass"));
        assert!(!FORCED_PATTERNS.is_match("ep03_full.ass"));
    }
}
