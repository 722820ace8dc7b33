//! Best-effort bridge from a model's free-form answer to a single cell value.
//!
//! The backend answers in prose, so nothing here is a guaranteed parser. The
//! contract is the priority list in [`ValueExtractor::extract`]: the first rule
//! that matches decides the value, and when no rule matches the whole response
//! is returned as an explicit [`ExtractedValue::Verbatim`] fallback, even for
//! numeric columns. Callers decide what to do with that fallback through
//! [`NumericFallback`].

use std::collections::HashMap;

use regex::Regex;
use tracing::{debug, warn};

use crate::classifier::ColumnType;
use crate::sheet_codec::CellValue;

/// Numeric-looking token captured by every rule.
const NUMBER_TOKEN: &str = r"([0-9.]+)";

/// How responses are turned into values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionStrategy {
    /// Marker phrases, then `column = value` sentences, then verbatim text.
    #[default]
    MarkerRounding,
    /// Last numeric token in the text, rounded. Numeric columns only.
    LastIntegerInText,
    /// The whole response becomes the cell value.
    VerbatimReplacement,
}

impl ExtractionStrategy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "marker_rounding" => Some(Self::MarkerRounding),
            "last_integer" => Some(Self::LastIntegerInText),
            "verbatim" => Some(Self::VerbatimReplacement),
            _ => None,
        }
    }
}

/// What to do when a numeric column would receive the verbatim fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericFallback {
    #[default]
    KeepText,
    LeaveEmpty,
}

impl NumericFallback {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "keep_text" => Some(Self::KeepText),
            "leave_empty" => Some(Self::LeaveEmpty),
            _ => None,
        }
    }
}

/// A value pulled out of a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    /// A number rounded to the nearest integer. Kept as `f64` so large
    /// magnitudes survive.
    Rounded(f64),
    /// A token copied as-is into a text column.
    Literal(String),
    /// No rule matched; the untouched response text.
    Verbatim(String),
}

impl ExtractedValue {
    pub fn into_cell(self, column_type: ColumnType, fallback: NumericFallback) -> CellValue {
        match self {
            ExtractedValue::Rounded(n) => CellValue::Number(n),
            ExtractedValue::Literal(s) => CellValue::Text(s),
            ExtractedValue::Verbatim(_)
                if column_type == ColumnType::Number && fallback == NumericFallback::LeaveEmpty =>
            {
                CellValue::Empty
            }
            ExtractedValue::Verbatim(s) => CellValue::Text(s),
        }
    }
}

/// Pre-compiled extraction rules for one strategy.
pub struct ValueExtractor {
    strategy: ExtractionStrategy,
    markers: Vec<Regex>,
    number: Regex,
}

impl ValueExtractor {
    pub fn new(strategy: ExtractionStrategy) -> Result<Self, regex::Error> {
        let markers = [
            format!(r"(?i)\bapproximately\b[:\s]*{}", NUMBER_TOKEN),
            format!(r"(?i)\bis around\b[:\s]*{}", NUMBER_TOKEN),
            format!(r"≈\s*{}", NUMBER_TOKEN),
        ]
        .iter()
        .map(|p| Regex::new(p))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            strategy,
            markers,
            number: Regex::new(r"[0-9]+(?:\.[0-9]+)?")?,
        })
    }

    pub fn strategy(&self) -> ExtractionStrategy {
        self.strategy
    }

    #[cfg(test)]
    pub fn extract(
        &self,
        response: &str,
        column_name: &str,
        column_type: ColumnType,
    ) -> Option<ExtractedValue> {
        self.extract_with(response, column_name, column_type, &mut ColumnPatterns::new())
    }

    /// Extract a value for `column_name` from `response`, reusing column
    /// patterns compiled earlier in the same request.
    ///
    /// `None` means a rule matched but its number could not be parsed; the
    /// cell is then left empty.
    pub fn extract_with(
        &self,
        response: &str,
        column_name: &str,
        column_type: ColumnType,
        patterns: &mut ColumnPatterns,
    ) -> Option<ExtractedValue> {
        match self.strategy {
            ExtractionStrategy::MarkerRounding => {
                self.marker_rounding(response, column_name, column_type, patterns)
            }
            ExtractionStrategy::LastIntegerInText => Some(self.last_integer(response, column_type)),
            ExtractionStrategy::VerbatimReplacement => {
                Some(ExtractedValue::Verbatim(response.to_string()))
            }
        }
    }

    fn marker_rounding(
        &self,
        response: &str,
        column_name: &str,
        column_type: ColumnType,
        patterns: &mut ColumnPatterns,
    ) -> Option<ExtractedValue> {
        for marker in &self.markers {
            if let Some(cap) = marker.captures(response) {
                debug!("Marker '{}' matched '{}'", marker.as_str(), &cap[0]);
                return parse_leading_decimal(&cap[1]).map(|n| ExtractedValue::Rounded(round_half_up(n)));
            }
        }

        if let Some(pattern) = patterns.get(column_name) {
            for sentence in response.split(['.', '!', '?']) {
                let Some(cap) = pattern.captures(sentence) else {
                    continue;
                };
                let token = &cap[2];
                return match column_type {
                    ColumnType::Number => {
                        parse_leading_decimal(token).map(|n| ExtractedValue::Rounded(round_half_up(n)))
                    }
                    // Only numeric-looking tokens can be captured here
                    ColumnType::Text => Some(ExtractedValue::Literal(token.to_string())),
                };
            }
        }

        Some(ExtractedValue::Verbatim(response.to_string()))
    }

    fn last_integer(&self, response: &str, column_type: ColumnType) -> ExtractedValue {
        if column_type == ColumnType::Number {
            let last = self
                .number
                .find_iter(response)
                .last()
                .and_then(|m| parse_leading_decimal(m.as_str()));
            if let Some(n) = last {
                return ExtractedValue::Rounded(round_half_up(n));
            }
        }
        ExtractedValue::Verbatim(response.to_string())
    }
}

/// Per-request memo of compiled column patterns.
#[derive(Debug, Default)]
pub struct ColumnPatterns {
    patterns: HashMap<String, Option<Regex>>,
}

impl ColumnPatterns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled pattern for `column_name`, compiling it on first use.
    pub fn get(&mut self, column_name: &str) -> Option<&Regex> {
        self.patterns
            .entry(column_name.to_string())
            .or_insert_with(|| column_pattern(column_name))
            .as_ref()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.patterns.len()
    }
}

/// `<column> ... (=|:|is|≈) <number>` within one sentence.
///
/// The column name must stand as a whole word. A `\b` guard is only placed on
/// an edge that is a word character: names like `Price ($)` end in a
/// non-word character, where `\b` would demand a letter right after `)`.
fn column_pattern(column_name: &str) -> Option<Regex> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let lead = if column_name.chars().next().is_some_and(is_word) { r"\b" } else { "" };
    let trail = if column_name.chars().last().is_some_and(is_word) { r"\b" } else { "" };
    let pattern = format!(
        r"(?i){}{}{}.*?\s*(=|:|is|≈)\s*{}",
        lead,
        regex::escape(column_name),
        trail,
        NUMBER_TOKEN
    );
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Skipping column pattern for '{}': {}", column_name, e);
            None
        }
    }
}

/// Parse the longest `digits[.digits]` prefix of a `[0-9.]+` token.
fn parse_leading_decimal(token: &str) -> Option<f64> {
    let int_len = token.bytes().take_while(u8::is_ascii_digit).count();
    let rest = &token[int_len..];
    let frac_len = match rest.strip_prefix('.') {
        Some(after) => 1 + after.bytes().take_while(u8::is_ascii_digit).count(),
        None => 0,
    };
    let prefix = &token[..int_len + frac_len];
    if !prefix.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse::<f64>().ok()
}

fn round_half_up(n: f64) -> f64 {
    (n + 0.5).floor()
}
