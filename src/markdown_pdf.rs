//! Rendering OCR Markdown as a simple PDF.
//!
//! The Markdown is parsed with `pulldown-cmark` (CommonMark plus pipe
//! tables) into a flat list of [`Block`]s, which we then lay out. Inline
//! markup is dropped and only its text is kept. Everything is set in the
//! standard Type 1 fonts, so the output needs no embedded font data. Text is
//! encoded as WinAnsi, and characters outside it are printed as `?`.

use lopdf::{
    Dictionary, Object, ObjectId, Stream,
    content::{Content, Operation},
    dictionary,
};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use crate::prelude::*;

/// A4, in points.
const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;

const BODY_SIZE: f32 = 11.0;
const MONO_SIZE: f32 = 9.0;
const LIST_INDENT: f32 = 14.0;

/// The fonts we use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Mono,
}

impl Font {
    const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Mono];

    fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Mono => "F3",
        }
    }

    fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Mono => "Courier",
        }
    }

    /// Average glyph width, as a fraction of the font size. Exact for
    /// Courier, an estimate for Helvetica.
    fn average_width(self) -> f32 {
        match self {
            Font::Regular => 0.5,
            Font::Bold => 0.55,
            Font::Mono => 0.6,
        }
    }
}

/// Font size for a heading level.
fn heading_size(level: usize) -> f32 {
    match level {
        1 => 20.0,
        2 => 16.0,
        3 => 14.0,
        4 => 12.5,
        _ => BODY_SIZE,
    }
}

/// Encode `text` as WinAnsi, replacing anything we can't represent with
/// `?`.
pub(crate) fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}

/// Greedily wrap `text` into lines of at most `max_chars` characters. Words
/// longer than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = vec![];
    let mut current = String::new();
    let mut current_len = 0;
    for word in text.split_whitespace() {
        let mut word = word.chars().collect::<Vec<char>>();
        while word.len() > max_chars {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        if current_len > 0 && current_len + 1 + word.len() > max_chars {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// A laid-out unit of the document.
#[derive(Clone, Debug, PartialEq)]
enum Block {
    Heading {
        level: usize,
        text: String,
    },
    /// A paragraph or list item. `depth` is the list nesting level, and
    /// `marker` is the bullet or number of a list item's first paragraph.
    Paragraph {
        depth: usize,
        marker: Option<String>,
        text: String,
    },
    /// Code lines, verbatim.
    Code(Vec<String>),
    TableRow(Vec<String>),
    Rule,
}

/// Folds `pulldown-cmark` events into [`Block`]s.
#[derive(Default)]
struct BlockCollector {
    blocks: Vec<Block>,
    /// Inline text of the current paragraph, heading or table cell.
    text: String,
    heading: Option<usize>,
    code: Option<String>,
    /// One entry per open list: the next number, or `None` for bullets.
    lists: Vec<Option<u64>>,
    marker: Option<String>,
    row: Vec<String>,
}

/// Collapse runs of whitespace, including newlines, to single spaces.
fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl BlockCollector {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                self.flush();
                self.heading = Some(level as usize);
            }
            Event::End(TagEnd::Heading(_)) => {
                let text = collapse(&std::mem::take(&mut self.text));
                let level = self.heading.take().unwrap_or(1);
                if !text.is_empty() {
                    self.blocks.push(Block::Heading { level, text });
                }
            }
            Event::Start(Tag::CodeBlock(_)) => {
                self.flush();
                self.code = Some(String::new());
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(code) = self.code.take() {
                    let lines = code
                        .trim_end_matches('\n')
                        .split('\n')
                        .map(|line| line.trim_end().replace('\t', "    "))
                        .collect();
                    self.blocks.push(Block::Code(lines));
                }
            }
            Event::Start(Tag::List(start)) => {
                self.flush();
                self.lists.push(start);
            }
            Event::End(TagEnd::List(_)) => {
                self.flush();
                self.lists.pop();
            }
            Event::Start(Tag::Item) => {
                self.flush();
                self.marker = Some(match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}.");
                        *n += 1;
                        marker
                    }
                    _ => "•".to_owned(),
                });
            }
            Event::End(TagEnd::Item | TagEnd::Paragraph | TagEnd::HtmlBlock) => self.flush(),
            Event::Start(Tag::Table(_)) => self.flush(),
            Event::End(TagEnd::TableCell) => {
                let cell = collapse(&std::mem::take(&mut self.text));
                self.row.push(cell);
            }
            // The header row has no `TableRow` of its own.
            Event::End(TagEnd::TableHead | TagEnd::TableRow) => {
                let row = std::mem::take(&mut self.row);
                self.blocks.push(Block::TableRow(row));
            }
            Event::Text(text)
            | Event::Code(text)
            | Event::Html(text)
            | Event::InlineHtml(text) => match &mut self.code {
                Some(code) => code.push_str(&text),
                None => self.text.push_str(&text),
            },
            Event::SoftBreak | Event::HardBreak => self.text.push(' '),
            Event::Rule => {
                self.flush();
                self.blocks.push(Block::Rule);
            }
            _ => {}
        }
    }

    /// Turn any pending inline text into a paragraph.
    fn flush(&mut self) {
        let text = collapse(&std::mem::take(&mut self.text));
        if !text.is_empty() {
            self.blocks.push(Block::Paragraph {
                depth: self.lists.len(),
                marker: self.marker.take(),
                text,
            });
        }
    }
}

/// Parse Markdown `text` into blocks.
fn blocks(text: &str) -> Vec<Block> {
    let mut collector = BlockCollector::default();
    for event in Parser::new_ext(text, Options::ENABLE_TABLES) {
        collector.event(event);
    }
    collector.flush();
    collector.blocks
}

/// Page-by-page layout state.
struct Layout {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![],
            current: vec![],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    /// Add vertical space, unless we're at the top of a page.
    fn space(&mut self, amount: f32) {
        if self.y < PAGE_HEIGHT - MARGIN {
            self.y = (self.y - amount).max(MARGIN);
        }
    }

    /// Move down to the next baseline, starting a new page if needed.
    fn advance(&mut self, size: f32) {
        let leading = size * 1.3;
        if self.y - leading < MARGIN {
            self.new_page();
        }
        self.y -= leading;
    }

    /// Draw `text` on the current baseline.
    fn show(&mut self, font: Font, size: f32, x: f32, text: &str) {
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource_name().into(), size.into()]),
            Operation::new("Td", vec![(MARGIN + x).into(), self.y.into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    /// Write `text` wrapped to the page width. If `marker` is given, it
    /// hangs in the indent before the first line.
    fn wrapped(
        &mut self,
        font: Font,
        size: f32,
        indent: f32,
        marker: Option<&str>,
        text: &str,
    ) {
        let width = PAGE_WIDTH - 2.0 * MARGIN - indent;
        let max_chars = (width / (font.average_width() * size)) as usize;
        for (i, line) in wrap(text, max_chars).iter().enumerate() {
            self.advance(size);
            if let (0, Some(marker)) = (i, marker) {
                self.show(font, size, indent - LIST_INDENT, marker);
            }
            self.show(font, size, indent, line);
        }
    }

    /// Write one code line, hard-wrapped at the page width.
    fn code_line(&mut self, line: &str) {
        let max_chars =
            ((PAGE_WIDTH - 2.0 * MARGIN) / (Font::Mono.average_width() * MONO_SIZE)) as usize;
        let chars = line.chars().collect::<Vec<_>>();
        if chars.is_empty() {
            self.advance(MONO_SIZE);
        }
        for piece in chars.chunks(max_chars.max(1)) {
            self.advance(MONO_SIZE);
            self.show(Font::Mono, MONO_SIZE, 0.0, &piece.iter().collect::<String>());
        }
    }

    /// Assemble the finished pages into a PDF.
    fn finish(mut self) -> Result<Vec<u8>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.new_page();
        }

        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = Dictionary::new();
        for font in Font::ALL {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource_name(), font_id);
        }
        let resources_id = doc.add_object(dictionary! { "Font" => fonts });

        let mut kids = vec![];
        for operations in self.pages {
            let content = Content { operations }
                .encode()
                .context("failed to encode PDF page content")?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id: ObjectId = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            });
            kids.push(Object::Reference(page_id));
        }
        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut data = Vec::new();
        doc.save_to(&mut data).context("failed to write PDF")?;
        Ok(data)
    }
}

/// Render Markdown `text` as a PDF.
#[instrument(level = "debug", skip_all, fields(len = text.len()))]
pub fn render(text: &str) -> Result<Vec<u8>> {
    let mut layout = Layout::new();
    let mut in_table = false;
    for block in blocks(text) {
        let is_row = matches!(block, Block::TableRow(_));
        if in_table && !is_row {
            layout.space(BODY_SIZE * 0.5);
        }
        in_table = is_row;

        match block {
            Block::Heading { level, text } => {
                let size = heading_size(level);
                layout.space(size * 0.6);
                layout.wrapped(Font::Bold, size, 0.0, None, &text);
                layout.space(size * 0.3);
            }
            Block::Paragraph {
                depth,
                marker,
                text,
            } => {
                let indent = LIST_INDENT * depth as f32;
                layout.wrapped(Font::Regular, BODY_SIZE, indent, marker.as_deref(), &text);
                if depth == 0 {
                    layout.space(BODY_SIZE * 0.5);
                }
            }
            Block::Code(lines) => {
                for line in &lines {
                    layout.code_line(line);
                }
                layout.space(MONO_SIZE * 0.5);
            }
            Block::TableRow(cells) => {
                layout.wrapped(Font::Mono, MONO_SIZE, 0.0, None, &cells.join(" | "));
            }
            Block::Rule => layout.space(BODY_SIZE),
        }
    }
    layout.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker;

    #[test]
    fn short_text_fits_on_one_page() {
        let pdf = render("# Title\n\nSome text.\n\n- one\n- two\n").unwrap();
        assert!(pdf.starts_with(b"%PDF-1.5"));
        assert_eq!(chunker::page_count(&pdf).unwrap(), 1);
    }

    #[test]
    fn empty_text_renders_a_blank_page() {
        assert_eq!(chunker::page_count(&render("").unwrap()).unwrap(), 1);
    }

    #[test]
    fn long_text_overflows_onto_new_pages() {
        let text = "A line of OCR output that goes on for a while.\n\n".repeat(200);
        assert!(chunker::page_count(&render(&text).unwrap()).unwrap() > 1);
    }

    #[test]
    fn tables_and_code_render() {
        let text = "| a | b |\n| --- | --- |\n| 1 | 2 |\n\n```\nfn main() {}\n```\n";
        assert_eq!(chunker::page_count(&render(text).unwrap()).unwrap(), 1);
    }

    fn paragraph(depth: usize, marker: Option<&str>, text: &str) -> Block {
        Block::Paragraph {
            depth,
            marker: marker.map(str::to_owned),
            text: text.to_owned(),
        }
    }

    #[test]
    fn setext_headings_indented_code_and_inline_markup() {
        let text = "Results\n=======\n\n    let x = 1;\n    let y = 2;\n\n* item with **bold** and [link](http://x)\n";
        assert_eq!(
            blocks(text),
            vec![
                Block::Heading {
                    level: 1,
                    text: "Results".to_owned(),
                },
                Block::Code(vec!["let x = 1;".to_owned(), "let y = 2;".to_owned()]),
                paragraph(1, Some("•"), "item with bold and link"),
            ]
        );
        assert_eq!(chunker::page_count(&render(text).unwrap()).unwrap(), 1);
    }

    #[test]
    fn fenced_code_keeps_blank_lines() {
        assert_eq!(
            blocks("```rust\nfn main() {\n\n}\n```\n"),
            vec![Block::Code(vec![
                "fn main() {".to_owned(),
                String::new(),
                "}".to_owned(),
            ])]
        );
    }

    #[test]
    fn table_rows_become_cells() {
        assert_eq!(
            blocks("| a | `b` |\n| --- | --- |\n| 1 | **2** |\n"),
            vec![
                Block::TableRow(vec!["a".to_owned(), "b".to_owned()]),
                Block::TableRow(vec!["1".to_owned(), "2".to_owned()]),
            ]
        );
    }

    #[test]
    fn lists_are_numbered_and_nested() {
        assert_eq!(
            blocks("3. three\n4. four\n   - nested\n\nAfter *the* list.\n"),
            vec![
                paragraph(1, Some("3."), "three"),
                paragraph(1, Some("4."), "four"),
                paragraph(2, Some("•"), "nested"),
                paragraph(0, None, "After the list."),
            ]
        );
    }

    #[test]
    fn soft_breaks_join_paragraph_lines() {
        assert_eq!(
            blocks("## Two\nlines of\ntext\n\n---\n"),
            vec![
                Block::Heading {
                    level: 2,
                    text: "Two".to_owned(),
                },
                paragraph(0, None, "lines of text"),
                Block::Rule,
            ]
        );
    }

    #[test]
    fn unsupported_characters_become_question_marks() {
        assert_eq!(encode_win_ansi("café • 日本"), b"caf\xe9 \x95 ??");
    }

    #[test]
    fn wrapping_respects_line_length() {
        assert_eq!(wrap("aa bb cc", 5), vec!["aa bb", "cc"]);
        assert_eq!(wrap("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert!(wrap("   ", 10).is_empty());
    }
}
