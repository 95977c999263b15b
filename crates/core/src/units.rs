// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Byte-size, duration and string helpers shared across the agent.

use std::time::Duration;

use thiserror::Error;

const BYTE_SUFFIXES: &[(char, u64)] = &[
    ('k', 1 << 10),
    ('K', 1 << 10),
    ('M', 1 << 20),
    ('G', 1 << 30),
    ('T', 1 << 40),
    ('P', 1 << 50),
];

/// Parse a byte size like `"15M"` or `"1024"`. Returns `-1` for anything
/// unparsable, including the empty string.
pub fn parse_bytes(s: &str) -> i64 {
    if s.is_empty() {
        return -1;
    }
    let mut chars = s.chars();
    let last = match chars.next_back() {
        Some(c) => c,
        None => return -1,
    };
    if let Some((_, multiplier)) = BYTE_SUFFIXES.iter().find(|(suffix, _)| *suffix == last) {
        let number: &str = chars.as_str();
        match number.parse::<f64>() {
            Ok(value) => (value * *multiplier as f64) as i64,
            Err(_) => {
                tracing::warn!("failed to parse byte value {s}");
                -1
            }
        }
    } else {
        match s.parse::<i64>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("failed to parse byte value {s}");
                -1
            }
        }
    }
}

/// Render a byte count with the largest binary suffix that keeps an integer
/// part, e.g. `15 * 2^20` → `"15M"`.
pub fn format_bytes(value: u64) -> String {
    const SUFFIXES: &[&str] = &["", "K", "M", "G", "T", "P"];
    let mut value = value;
    let mut suffix = 0;
    while value >= 1 << 10 && suffix < SUFFIXES.len() - 1 {
        value >>= 10;
        suffix += 1;
    }
    format!("{value}{}", SUFFIXES[suffix])
}

/// Shorten `s` to at most `max` characters.
///
/// The ellipsis is only inserted when it actually saves space; shortening by
/// fewer than its own three characters degrades to a plain cut.
pub fn truncate_string(s: &str, max: usize, cut_in_middle: bool) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max {
        return s.to_string();
    }
    if chars.len() <= max + 3 || max <= 3 {
        return chars[..max].iter().collect();
    }
    if cut_in_middle {
        let head = max / 2;
        let tail = max - 3 - head;
        let mut out: String = chars[..head].iter().collect();
        out.push_str("...");
        out.extend(&chars[chars.len() - tail..]);
        out
    } else {
        let mut out: String = chars[..max - 3].iter().collect();
        out.push_str("...");
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration {0:?}")]
pub struct DurationParseError(pub String);

/// Parse durations like `"1d15h24m57s600ms154us"`.
///
/// A bare number is taken as seconds. Units: `d`, `h`, `m`, `s`, `ms`,
/// `us`/`µs`. Fractions and clock notation are rejected.
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    if s.is_empty() {
        return Err(DurationParseError(s.to_string()));
    }
    if s.chars().all(|c| c.is_ascii_digit()) {
        let seconds = s
            .parse::<u64>()
            .map_err(|_| DurationParseError(s.to_string()))?;
        return Ok(Duration::from_secs(seconds));
    }

    let mut total_micros: u128 = 0;
    let mut chars = s.chars().peekable();
    while chars.peek().is_some() {
        let mut number = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                number.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        let mut unit = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                break;
            }
            unit.push(*c);
            chars.next();
        }
        let value = number
            .parse::<u128>()
            .map_err(|_| DurationParseError(s.to_string()))?;
        let micros_per_unit: u128 = match unit.as_str() {
            "d" => 86_400_000_000,
            "h" => 3_600_000_000,
            "m" => 60_000_000,
            "s" => 1_000_000,
            "ms" => 1_000,
            "us" | "µs" => 1,
            _ => return Err(DurationParseError(s.to_string())),
        };
        total_micros += value * micros_per_unit;
    }
    let micros = u64::try_from(total_micros).map_err(|_| DurationParseError(s.to_string()))?;
    Ok(Duration::from_micros(micros))
}

#[cfg(test)]
#[path = "units_tests.rs"]
mod tests;
