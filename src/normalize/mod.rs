//! Heuristic cleanup of OCR Markdown.
//!
//! OCR output has recurring artifacts: squashed heading markers, repeated
//! headings at page breaks, tables without header separators, sentences
//! broken across lines, and so on. We fix these with a fixed pipeline of
//! small [`Rule`]s. Later rules assume earlier ones have already run, so the
//! order in [`standard_rules`] matters.
//!
//! The pipeline is heuristic, so we guard it: if the cleaned text is much
//! longer or shorter than the original, we assume something went wrong and
//! return the original untouched.

use std::borrow::Cow;

use crate::prelude::*;

pub mod rules;

use self::rules::{
    BlankLineAfterHeading, ChapterPromotion, DuplicateHeadingCollapse,
    HeadingMarkerSpacing, ImageReferenceRemoval, NumericRunRemoval, ParagraphRejoin,
    TableRowSpacing, TableSeparatorInsertion,
};

/// Default limit on how much the pipeline may change the length of a text,
/// as a fraction of the original length.
pub const DEFAULT_MAX_LENGTH_CHANGE: f64 = 0.10;

/// Parse a `--max-length-change` value: a finite, non-negative fraction.
pub fn parse_max_length_change(s: &str) -> Result<f64, String> {
    let value = s
        .parse::<f64>()
        .map_err(|err| format!("not a number: {err}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("must be a non-negative number, got {value}"));
    }
    Ok(value)
}

/// A single text-to-text cleanup step.
///
/// Rules must be pure: the same input always produces the same output. A rule
/// with nothing to fix returns its input.
pub trait Rule: Send + Sync {
    /// A short name for logging.
    fn name(&self) -> &'static str;

    /// Apply this rule to `text`.
    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str>;
}

/// The standard cleanup rules, in order.
pub fn standard_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(TableRowSpacing),
        Box::new(NumericRunRemoval),
        Box::new(HeadingMarkerSpacing),
        Box::new(DuplicateHeadingCollapse),
        Box::new(ImageReferenceRemoval),
        Box::new(ChapterPromotion),
        Box::new(BlankLineAfterHeading),
        Box::new(TableSeparatorInsertion),
        Box::new(ParagraphRejoin),
    ]
}

/// A pipeline of [`Rule`]s plus a length-change safety check.
pub struct Normalizer {
    rules: Vec<Box<dyn Rule>>,
    max_length_change: f64,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LENGTH_CHANGE)
    }
}

impl Normalizer {
    /// Create a normalizer using [`standard_rules`].
    pub fn new(max_length_change: f64) -> Self {
        Self::with_rules(standard_rules(), max_length_change)
    }

    /// Create a normalizer with a custom list of rules.
    pub fn with_rules(rules: Vec<Box<dyn Rule>>, max_length_change: f64) -> Self {
        debug_assert!(
            max_length_change >= 0.0,
            "invalid max_length_change {max_length_change}"
        );
        Self {
            rules,
            max_length_change,
        }
    }

    /// Run every rule in order, without the safety check.
    pub fn apply_rules(&self, text: &str) -> String {
        let mut current = text.to_owned();
        for rule in &self.rules {
            let next = rule.apply(&current);
            if next != current.as_str() {
                debug!(rule = rule.name(), "normalization rule changed text");
                current = next.into_owned();
            }
        }
        current
    }

    /// Clean up `text`. Returns `text` unchanged if the cleaned version
    /// differs in length by more than the allowed fraction.
    pub fn normalize(&self, text: &str) -> String {
        let cleaned = self.apply_rules(text);
        let original_len = text.chars().count();
        let cleaned_len = cleaned.chars().count();
        let change = original_len.abs_diff(cleaned_len);
        if change as f64 > original_len as f64 * self.max_length_change {
            warn!(
                original_len,
                cleaned_len,
                "normalization changed text length too much, keeping original"
            );
            return text.to_owned();
        }
        cleaned
    }
}
