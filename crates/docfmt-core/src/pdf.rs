use std::path::Path;
use std::str::FromStr;

use lopdf::{Document, Object, ObjectId};
use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str};
use serde::{Deserialize, Serialize};

use crate::ConvertError;

/// The line drawn on every output page.
pub const STAMP_TEXT: &str = "Converted to Times New Roman, 12pt, 1.5 spacing";

/// Output page size in points.
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;

const STAMP_X: f32 = 50.0;
/// Distance of the baseline below the top of the *source* page.
const STAMP_OFFSET_FROM_TOP: f32 = 80.0;
const FONT_SIZE: f32 = 12.0;
const LEADING: f32 = 18.0;

/// Lowest baseline used when laying out extracted text.
const BOTTOM_MARGIN: f32 = 50.0;
/// Wrap width for extracted lines, in characters of 12pt Times.
const WRAP_COLUMNS: usize = 90;

/// How far up the page tree to look for an inherited MediaBox.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// What ends up on the output pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfMode {
    /// One page per source page carrying only [`STAMP_TEXT`].
    #[default]
    Stamp,
    /// The source text, one output line per extracted line, flowed onto as
    /// many pages as it needs.
    Text,
}

impl FromStr for PdfMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stamp" => Ok(Self::Stamp),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown PDF mode '{other}' (expected stamp or text)")),
        }
    }
}

/// Convert the PDF at `input` into a fresh PDF at `output`.
pub fn write_pdf(input: &Path, output: &Path, mode: PdfMode) -> Result<(), ConvertError> {
    match mode {
        PdfMode::Stamp => restamp_pdf(input, output),
        PdfMode::Text => reflow_pdf_text(input, output),
    }
}

/// Parse the PDF at `input` and write a fresh PDF to `output` with one
/// stamped page per source page. No source content is carried over.
pub fn restamp_pdf(input: &Path, output: &Path) -> Result<(), ConvertError> {
    let source = Document::load(input)?;

    let pages: Vec<Content> = source
        .get_pages()
        .values()
        .map(|&page_id| {
            let height = media_box_height(&source, page_id).unwrap_or(PAGE_HEIGHT);
            let mut content = text_object();
            content
                .next_line(STAMP_X, height - STAMP_OFFSET_FROM_TOP)
                .show(Str(STAMP_TEXT.as_bytes()))
                .end_text();
            content
        })
        .collect();

    let count = pages.len();
    std::fs::write(output, render(pages))?;
    tracing::debug!(pages = count, "wrote stamped PDF");
    Ok(())
}

/// Parse the PDF at `input` and write its text to `output` in 12pt Times.
///
/// Text that cannot be decoded (unsupported font encodings) is skipped with
/// a warning rather than failing the whole document.
pub fn reflow_pdf_text(input: &Path, output: &Path) -> Result<(), ConvertError> {
    let source = Document::load(input)?;

    let mut lines = Vec::new();
    for page_number in source.get_pages().keys() {
        let mut page_text = String::new();
        for chunk in source.extract_text_chunks(&[*page_number]) {
            match chunk {
                Ok(text) => page_text.push_str(&text),
                Err(e) => {
                    tracing::warn!(page = page_number, error = %e, "skipping undecodable text");
                }
            }
        }
        let mut page_lines: Vec<String> =
            page_text.lines().map(|l| l.trim_end().to_string()).collect();
        while page_lines.last().is_some_and(|l| l.is_empty()) {
            page_lines.pop();
        }
        lines.extend(page_lines.iter().flat_map(|l| wrap(l, WRAP_COLUMNS)));
    }

    let per_page = lines_per_page();
    let mut pages: Vec<Content> = lines
        .chunks(per_page)
        .map(|chunk| {
            let mut content = text_object();
            content.next_line(STAMP_X, PAGE_HEIGHT - STAMP_OFFSET_FROM_TOP);
            for (i, line) in chunk.iter().enumerate() {
                if i > 0 {
                    content.next_line_using_leading();
                }
                content.show(Str(&win_ansi(line)));
            }
            content.end_text();
            content
        })
        .collect();
    if pages.is_empty() {
        pages.push(Content::new());
    }

    std::fs::write(output, render(pages))?;
    tracing::debug!(lines = lines.len(), "wrote reflowed PDF text");
    Ok(())
}

fn text_object() -> Content {
    let mut content = Content::new();
    content
        .begin_text()
        .set_font(Name(b"F1"), FONT_SIZE)
        .set_leading(LEADING);
    content
}

fn lines_per_page() -> usize {
    ((PAGE_HEIGHT - STAMP_OFFSET_FROM_TOP - BOTTOM_MARGIN) / LEADING).floor() as usize + 1
}

/// Break `line` at whitespace so no piece exceeds `columns` characters.
/// Words longer than a line are split hard.
fn wrap(line: &str, columns: usize) -> Vec<String> {
    if line.chars().count() <= columns {
        return vec![line.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > columns {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            pieces.push(word.drain(..columns).collect());
        }
        let word: String = word.into_iter().collect();
        let needed = current.chars().count() + 1 + word.chars().count();
        if !current.is_empty() && needed > columns {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Encode for the WinAnsi-encoded standard font. Characters it cannot show
/// become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

fn render(pages: Vec<Content>) -> Vec<u8> {
    let mut pdf = Pdf::new();

    let catalog_id = Ref::new(1);
    let pages_id = Ref::new(2);
    let font_id = Ref::new(3);
    let page_ids: Vec<Ref> = (0..pages.len()).map(|i| Ref::new(4 + 2 * i as i32)).collect();

    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id)
        .kids(page_ids.iter().copied())
        .count(page_ids.len() as i32);

    for (&page_id, content) in page_ids.iter().zip(pages) {
        let content_id = Ref::new(page_id.get() + 1);
        pdf.stream(content_id, &content.finish());

        pdf.page(page_id)
            .media_box(Rect::new(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT))
            .parent(pages_id)
            .contents(content_id)
            .resources()
            .fonts()
            .pair(Name(b"F1"), font_id);
    }

    pdf.type1_font(font_id)
        .base_font(Name(b"Times-Roman"))
        .encoding_predefined(Name(b"WinAnsiEncoding"));

    pdf.finish()
}

/// Height of a page's MediaBox, following `/Parent` links for inherited boxes.
fn media_box_height(doc: &Document, page_id: ObjectId) -> Option<f32> {
    let mut node = doc.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(obj) = node.get(b"MediaBox") {
            let (_, obj) = doc.dereference(obj).ok()?;
            let rect = obj.as_array().ok()?;
            if rect.len() != 4 {
                return None;
            }
            let lly = number(doc, &rect[1])?;
            let ury = number(doc, &rect[3])?;
            return Some((ury - lly).abs());
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }

    None
}

fn number(doc: &Document, obj: &Object) -> Option<f32> {
    match doc.dereference(obj).ok()?.1 {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}
