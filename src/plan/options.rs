//! mkvmerge command-line generation from a `MuxPlan`.
//!
//! Token order per input file: selection flags first, then per-track
//! metadata, then the parenthesized path. The trailing `--track-order`
//! pins the output layout to the plan's instruction order.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::TrackKind;

use super::{MuxInstruction, MuxPlan};

/// Render a plan into mkvmerge argv tokens (without the program name).
pub fn mkvmerge_tokens(plan: &MuxPlan) -> Vec<String> {
    let mut tokens = vec![
        "-o".to_string(),
        plan.output_path.to_string_lossy().into_owned(),
    ];

    // Group instructions by source file, preserving first-occurrence order.
    let mut file_order: Vec<PathBuf> = Vec::new();
    let mut by_file: HashMap<PathBuf, Vec<&MuxInstruction>> = HashMap::new();
    for instruction in &plan.instructions {
        if !by_file.contains_key(&instruction.source_path) {
            file_order.push(instruction.source_path.clone());
        }
        by_file
            .entry(instruction.source_path.clone())
            .or_default()
            .push(instruction);
    }

    for path in &file_order {
        let instructions = &by_file[path];
        tokens.extend(selection_tokens(instructions));

        for instruction in instructions {
            let id = instruction.source_index;

            tokens.push("--language".to_string());
            tokens.push(format!("{}:{}", id, instruction.language));

            if let Some(title) = &instruction.title {
                tokens.push("--track-name".to_string());
                tokens.push(format!("{}:{}", id, title));
            }

            tokens.push("--default-track-flag".to_string());
            tokens.push(format!(
                "{}:{}",
                id,
                if instruction.is_default { "yes" } else { "no" }
            ));

            if instruction.kind == TrackKind::Subtitles {
                tokens.push("--forced-display-flag".to_string());
                tokens.push(format!(
                    "{}:{}",
                    id,
                    if instruction.is_forced { "yes" } else { "no" }
                ));
            }

            if instruction.sync_offset_ms != 0 {
                tokens.push("--sync".to_string());
                tokens.push(format!("{}:{}", id, instruction.sync_offset_ms));
            }
        }

        tokens.push("(".to_string());
        tokens.push(path.to_string_lossy().into_owned());
        tokens.push(")".to_string());
    }

    // Output order: "fileIndex:trackId" per instruction, in plan order.
    let order: Vec<String> = plan
        .instructions
        .iter()
        .map(|i| {
            let file_index = file_order
                .iter()
                .position(|p| p == &i.source_path)
                .unwrap_or(0);
            format!("{}:{}", file_index, i.source_index)
        })
        .collect();
    tokens.push("--track-order".to_string());
    tokens.push(order.join(","));

    tokens
}

/// Per-file track selection flags, one set per kind.
///
/// Kinds with selected tracks get an id list; absent kinds are dropped
/// explicitly so nothing rides along from the source.
fn selection_tokens(instructions: &[&MuxInstruction]) -> Vec<String> {
    let mut tokens = Vec::new();
    for (kind, select_flag, drop_flag) in [
        (TrackKind::Video, "--video-tracks", "--no-video"),
        (TrackKind::Audio, "--audio-tracks", "--no-audio"),
        (TrackKind::Subtitles, "--subtitle-tracks", "--no-subtitles"),
    ] {
        let ids: Vec<String> = instructions
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| i.source_index.to_string())
            .collect();
        if ids.is_empty() {
            tokens.push(drop_flag.to_string());
        } else {
            tokens.push(select_flag.to_string());
            tokens.push(ids.join(","));
        }
    }
    tokens
}
