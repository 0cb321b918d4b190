//! Claim formatting utilities for terminal display.

use alloy_primitives::U256;
use chrono::DateTime;

use crate::fetch::ClaimProof;

const WIDTH: usize = 90;

/// Format a verified claim proof for terminal display
pub fn format_claim(claim: &ClaimProof) -> String {
    let proof = &claim.proof;
    let event = &proof.event;
    let mut output = String::new();

    output.push('\n');
    output.push_str(&format!("┌─ Teleport Claim {}┐\n", "─".repeat(WIDTH - 15)));
    output.push_str(&row(&format!(
        "\x1b[33mASSET:\x1b[0m {}",
        event.source_asset_id
    )));
    output.push_str(&separator());

    output.push_str(&row("\x1b[33mEVENT:\x1b[0m"));
    output.push_str(&row(&format!("Owner: {}", event.owner)));
    output.push_str(&row(&format!(
        "Initiated at: {}",
        format_timestamp(event.occurred_at)
    )));
    output.push_str(&row(&format!("Metadata: {}", event.metadata_digest)));
    output.push_str(&separator());

    output.push_str(&row("\x1b[33mCOMMITMENT:\x1b[0m"));
    output.push_str(&row(&format!("Leaf: {}", proof.leaf)));
    output.push_str(&row(&format!("Root: {}", proof.root)));
    output.push_str(&row(&format!(
        "Position: {} of {} (scheme v{})",
        proof.leaf_index + 1,
        proof.leaf_count,
        proof.scheme.version()
    )));
    let published = if claim.published {
        "\x1b[32mpublished\x1b[0m"
    } else {
        "\x1b[31mnot published yet\x1b[0m"
    };
    output.push_str(&row(&format!("Destination: {}", published)));
    output.push_str(&separator());

    output.push_str(&row(&format!(
        "\x1b[33mPROOF ({} siblings):\x1b[0m",
        proof.proof.len()
    )));
    for sibling in &proof.proof {
        output.push_str(&row(&format!("\x1b[90m  {}\x1b[0m", sibling)));
    }
    output.push_str(&separator());

    output.push_str(&row("\x1b[33mCALLDATA:\x1b[0m"));
    let calldata = claim.calldata.to_string();
    for chunk in calldata.as_bytes().chunks(WIDTH - 2) {
        output.push_str(&row(&String::from_utf8_lossy(chunk)));
    }

    output.push_str(&format!("└{}┘\n", "─".repeat(WIDTH + 2)));
    output
}

fn row(content: &str) -> String {
    format!("│ {} │\n", format_column_content(content, WIDTH))
}

fn separator() -> String {
    format!("├{}┤\n", "─".repeat(WIDTH + 2))
}

/// Format content for a column with proper padding
fn format_column_content(content: &str, width: usize) -> String {
    // Remove ANSI color codes for length calculation
    let visible_len = strip_ansi_codes(content).chars().count();

    if visible_len <= width {
        format!("{}{}", content, " ".repeat(width - visible_len))
    } else {
        content.to_string()
    }
}

/// Remove ANSI color codes from a string for length calculation
fn strip_ansi_codes(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            // Skip the ANSI escape sequence
            for next_c in chars.by_ref() {
                if next_c == 'm' {
                    break;
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Format a source ledger timestamp, falling back to the raw value when out of range
fn format_timestamp(timestamp: U256) -> String {
    u64::try_from(timestamp)
        .ok()
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_codes() {
        assert_eq!(strip_ansi_codes("\x1b[33mASSET:\x1b[0m 7"), "ASSET: 7");
        assert_eq!(strip_ansi_codes("plain"), "plain");
    }

    #[test]
    fn test_column_padding_ignores_colors() {
        let padded = format_column_content("\x1b[90mab\x1b[0m", 5);
        assert_eq!(strip_ansi_codes(&padded), "ab   ");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(U256::from(1_700_000_000u64)),
            "2023-11-14 22:13:20 UTC"
        );
        assert_eq!(format_timestamp(U256::MAX), U256::MAX.to_string());
    }
}
