//! The individual cleanup rules, in the order the pipeline applies them.
//!
//! Regex-based rules rewrite the whole text at once. Rules that need to look
//! at neighboring lines walk `text.split('\n')`, which keeps any trailing
//! newline as a final empty line.

use std::{borrow::Cow, sync::LazyLock};

use regex::{Captures, Regex};

use super::Rule;

static TABLE_ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\|(.*)\|[ \t]*$").expect("failed to compile regex")
});

static NUMERIC_RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+(?:\.\d+){9,}\b").expect("failed to compile regex")
});

static HEADING_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(#{1,6})[ \t]*([^#\s])").expect("failed to compile regex")
});

static IMAGE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[img-\d+\.jpeg\]\(img-\d+\.jpeg\)").expect("failed to compile regex")
});

static CHAPTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(Chapter[ \t]+\d+.*)$").expect("failed to compile regex")
});

static LIST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:[-*+]|\d+[.)])[ \t]+").expect("failed to compile regex")
});

static SEPARATOR_CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^:?-+:?$").expect("failed to compile regex"));

/// If `line` is an ATX heading, return its level.
fn heading_level(line: &str) -> Option<usize> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if (1..=6).contains(&hashes) && line[hashes..].starts_with([' ', '\t']) {
        Some(hashes)
    } else {
        None
    }
}

/// Is `line` a pipe-delimited table row?
fn is_table_row(line: &str) -> bool {
    let line = line.trim();
    line.len() >= 2 && line.starts_with('|') && line.ends_with('|')
}

/// Split a table row into trimmed cells.
fn table_cells(line: &str) -> Vec<&str> {
    let line = line.trim();
    let inner = line.strip_prefix('|').unwrap_or(line);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(str::trim).collect()
}

/// Is `line` a table header separator like `| --- | :-: |`?
fn is_separator_row(line: &str) -> bool {
    is_table_row(line)
        && table_cells(line)
            .iter()
            .all(|cell| SEPARATOR_CELL_RE.is_match(cell))
}

/// Does `line` open or close a fenced code block?
fn is_code_fence(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("```") || line.starts_with("~~~")
}

/// Is `line` a bulleted or numbered list item?
fn is_list_item(line: &str) -> bool {
    LIST_ITEM_RE.is_match(line)
}

/// Re-space pipe-delimited table rows as `| cell | cell |`.
pub struct TableRowSpacing;

impl Rule for TableRowSpacing {
    fn name(&self) -> &'static str {
        "table-row-spacing"
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        TABLE_ROW_RE.replace_all(text, |caps: &Captures<'_>| {
            let cells = caps[1].split('|').map(str::trim).collect::<Vec<_>>();
            format!("| {} |", cells.join(" | "))
        })
    }
}

/// Remove misread section numbers like `18.1.1.1.1.1.1.1.1.1.1.2`, which
/// have 10 or more dot-separated groups.
pub struct NumericRunRemoval;

impl Rule for NumericRunRemoval {
    fn name(&self) -> &'static str {
        "numeric-run-removal"
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        NUMERIC_RUN_RE.replace_all(text, "")
    }
}

/// Put exactly one space between `#` markers and heading text.
pub struct HeadingMarkerSpacing;

impl Rule for HeadingMarkerSpacing {
    fn name(&self) -> &'static str {
        "heading-marker-spacing"
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        HEADING_MARKER_RE.replace_all(text, "${1} ${2}")
    }
}

/// Drop a heading line that repeats the line right above it.
pub struct DuplicateHeadingCollapse;

impl Rule for DuplicateHeadingCollapse {
    fn name(&self) -> &'static str {
        "duplicate-heading-collapse"
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out: Vec<&str> = vec![];
        let mut prev: Option<&str> = None;
        for line in text.split('\n') {
            if heading_level(line).is_some() && prev == Some(line) {
                continue;
            }
            out.push(line);
            prev = Some(line);
        }
        Cow::Owned(out.join("\n"))
    }
}

/// Remove `![img-0.jpeg](img-0.jpeg)` placeholders left by the OCR service.
pub struct ImageReferenceRemoval;

impl Rule for ImageReferenceRemoval {
    fn name(&self) -> &'static str {
        "image-reference-removal"
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        IMAGE_REF_RE.replace_all(text, "")
    }
}

/// Turn bare `Chapter 3 ...` lines into level-2 headings.
pub struct ChapterPromotion;

impl Rule for ChapterPromotion {
    fn name(&self) -> &'static str {
        "chapter-promotion"
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        CHAPTER_RE.replace_all(text, "## ${1}")
    }
}

/// Make sure level 1-4 headings are followed by a blank line.
pub struct BlankLineAfterHeading;

impl Rule for BlankLineAfterHeading {
    fn name(&self) -> &'static str {
        "blank-line-after-heading"
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let lines = text.split('\n').collect::<Vec<_>>();
        let mut out = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            out.push(*line);
            let is_small_heading = matches!(heading_level(line), Some(1..=4));
            let next_is_text = lines
                .get(i + 1)
                .is_some_and(|next| !next.trim().is_empty());
            if is_small_heading && next_is_text {
                out.push("");
            }
        }
        Cow::Owned(out.join("\n"))
    }
}

/// Insert a `| --- |` row under the header of tables which lack one.
pub struct TableSeparatorInsertion;

impl Rule for TableSeparatorInsertion {
    fn name(&self) -> &'static str {
        "table-separator-insertion"
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let lines = text.split('\n').collect::<Vec<_>>();
        let mut out: Vec<Cow<'_, str>> = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            out.push(Cow::Borrowed(*line));
            let starts_table = is_table_row(line)
                && !is_separator_row(line)
                && (i == 0 || !is_table_row(lines[i - 1]));
            let next = lines.get(i + 1).copied().unwrap_or_default();
            if starts_table && is_table_row(next) && !is_separator_row(next) {
                let columns = table_cells(line).len();
                out.push(Cow::Owned(format!("|{}", " --- |".repeat(columns))));
            }
        }
        Cow::Owned(out.join("\n"))
    }
}

/// Join lines that OCR split in the middle of a sentence.
pub struct ParagraphRejoin;

impl ParagraphRejoin {
    /// Can this line be part of a rejoined paragraph?
    fn is_plain(line: &str) -> bool {
        !line.trim().is_empty()
            && heading_level(line).is_none()
            && !is_table_row(line)
            && !is_code_fence(line)
            && !is_list_item(line)
    }

    /// Does this line end a sentence?
    fn ends_sentence(line: &str) -> bool {
        line.trim_end().ends_with(['.', '?', '!', ':'])
    }
}

impl Rule for ParagraphRejoin {
    fn name(&self) -> &'static str {
        "paragraph-rejoin"
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out: Vec<String> = vec![];
        let mut in_fence = false;
        let mut can_extend = false;
        for line in text.split('\n') {
            if is_code_fence(line) {
                in_fence = !in_fence;
                out.push(line.to_owned());
                can_extend = false;
                continue;
            }
            if in_fence {
                out.push(line.to_owned());
                continue;
            }

            let plain = Self::is_plain(line);
            match out.last_mut() {
                Some(last) if plain && can_extend => {
                    let kept = last.trim_end().len();
                    last.truncate(kept);
                    last.push(' ');
                    last.push_str(line.trim_start());
                }
                _ => out.push(line.to_owned()),
            }
            can_extend = plain && !Self::ends_sentence(line);
        }
        Cow::Owned(out.join("\n"))
    }
}
