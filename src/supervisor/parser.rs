// src/supervisor/parser.rs
//! Miner log-line pattern extraction
//!
//! Best-effort parsing of the miner's combined output stream. Recognized
//! lines yield a structured [`StatUpdate`]; everything else is a no-op,
//! never an error. Patterns cover the t-rex/lolMiner/GMiner line shapes.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HASHRATE_RE: Regex =
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(k|m|g)?h/s").expect("valid hashrate regex");
}

/// Outcome of a submitted share as reported in the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    /// The pool accepted the share
    Accepted,
    /// The pool rejected the share
    Rejected,
}

/// Structured update extracted from one output line
///
/// A single line can carry both a share result and a hashrate figure
/// (t-rex prints `[ OK ] 120/121 - 15.43 MH/s`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatUpdate {
    /// Reported hashrate normalized to MH/s
    pub hashrate_mhs: Option<f64>,
    /// Share outcome, if the line reports one
    pub share: Option<ShareOutcome>,
}

/// Extracts a structured update from one miner output line
///
/// # Returns
/// `None` when the line matches no known pattern; such lines are ignored
/// by the consumer.
pub fn parse_line(line: &str) -> Option<StatUpdate> {
    let lower = line.to_lowercase();

    let share = if lower.contains("rejected") {
        Some(ShareOutcome::Rejected)
    } else if lower.contains("accepted") || lower.contains("[ ok ]") || lower.contains("share ok")
    {
        Some(ShareOutcome::Accepted)
    } else {
        None
    };

    let hashrate_mhs = HASHRATE_RE.captures(line).and_then(|caps| {
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        let mhs = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
            Some(unit) if unit == "k" => value / 1e3,
            Some(unit) if unit == "m" => value,
            Some(unit) if unit == "g" => value * 1e3,
            _ => value / 1e6, // bare H/s
        };
        Some(mhs)
    });

    if share.is_none() && hashrate_mhs.is_none() {
        None
    } else {
        Some(StatUpdate {
            hashrate_mhs,
            share,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mhs_hashrate() {
        let update = parse_line("20250101 12:00:00 GPU #0: 15.43 MH/s").unwrap();
        assert_eq!(update.hashrate_mhs, Some(15.43));
        assert_eq!(update.share, None);
    }

    #[test]
    fn normalizes_units_to_mhs() {
        assert_eq!(
            parse_line("total: 420 kH/s").unwrap().hashrate_mhs,
            Some(0.42)
        );
        assert_eq!(
            parse_line("total: 1.2 GH/s").unwrap().hashrate_mhs,
            Some(1200.0)
        );
        assert_eq!(
            parse_line("total: 900000 H/s").unwrap().hashrate_mhs,
            Some(0.9)
        );
    }

    #[test]
    fn trex_ok_line_yields_share_and_hashrate() {
        let update = parse_line("[ OK ] 120/121 - 15.43 MH/s, 312ms").unwrap();
        assert_eq!(update.share, Some(ShareOutcome::Accepted));
        assert_eq!(update.hashrate_mhs, Some(15.43));
    }

    #[test]
    fn rejected_wins_over_accepted_wording() {
        let update = parse_line("share rejected by pool (low difficulty)").unwrap();
        assert_eq!(update.share, Some(ShareOutcome::Rejected));
    }

    #[test]
    fn unrecognized_lines_are_ignored() {
        assert!(parse_line("NVIDIA driver 551.23, CUDA 12.4").is_none());
        assert!(parse_line("").is_none());
    }
}
