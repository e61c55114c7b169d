//! WordprocessingML pieces shared by the DOCX writers.

use std::io;

use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use roxmltree::Node;

pub(crate) const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub(crate) const FONT_FAMILY: &str = "Times New Roman";

/// Escape text for element content.
///
/// Carriage returns are written as character references: a literal CR would
/// be folded into LF by every conforming XML reader.
pub(crate) fn escape_text(text: &str) -> String {
    escape(text).replace('\r', "&#xD;")
}

/// Write a `w:t` element holding `text` verbatim.
pub(crate) fn write_t(writer: &mut Writer<Vec<u8>>, text: &str) -> io::Result<()> {
    writer.write_event(Event::Start(
        BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]),
    ))?;
    writer.write_event(Event::Text(BytesText::from_escaped(escape_text(text))))?;
    writer.write_event(Event::End(BytesEnd::new("w:t")))
}

/// Character formatting for a generated run. Unset fields are omitted.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RunStyle<'a> {
    pub font: Option<&'a str>,
    pub bold: Option<bool>,
    pub italic: bool,
    pub color: Option<&'a str>,
    /// Half-points.
    pub size: Option<&'a str>,
}

impl RunStyle<'_> {
    fn is_plain(&self) -> bool {
        self.font.is_none()
            && self.bold.is_none()
            && !self.italic
            && self.color.is_none()
            && self.size.is_none()
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> io::Result<()> {
        if self.is_plain() {
            return Ok(());
        }
        writer.write_event(Event::Start(BytesStart::new("w:rPr")))?;
        if let Some(font) = self.font {
            writer.write_event(Event::Empty(BytesStart::new("w:rFonts").with_attributes([
                ("w:ascii", font),
                ("w:cs", font),
                ("w:eastAsia", font),
                ("w:hAnsi", font),
            ])))?;
        }
        match self.bold {
            Some(true) => writer.write_event(Event::Empty(BytesStart::new("w:b")))?,
            Some(false) => writer.write_event(Event::Empty(
                BytesStart::new("w:b").with_attributes([("w:val", "0")]),
            ))?,
            None => {}
        }
        if self.italic {
            writer.write_event(Event::Empty(BytesStart::new("w:i")))?;
        }
        if let Some(color) = self.color {
            writer.write_event(Event::Empty(
                BytesStart::new("w:color").with_attributes([("w:val", color)]),
            ))?;
        }
        if let Some(size) = self.size {
            writer.write_event(Event::Empty(
                BytesStart::new("w:sz").with_attributes([("w:val", size)]),
            ))?;
            writer.write_event(Event::Empty(
                BytesStart::new("w:szCs").with_attributes([("w:val", size)]),
            ))?;
        }
        writer.write_event(Event::End(BytesEnd::new("w:rPr")))
    }
}

/// Write one run. Newlines become `w:br` and tabs `w:tab`, the way Word
/// itself stores them.
pub(crate) fn write_run(
    writer: &mut Writer<Vec<u8>>,
    style: &RunStyle<'_>,
    text: &str,
) -> io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new("w:r")))?;
    style.write(writer)?;
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            writer.write_event(Event::Empty(BytesStart::new("w:br")))?;
        }
        for (j, segment) in line.split('\t').enumerate() {
            if j > 0 {
                writer.write_event(Event::Empty(BytesStart::new("w:tab")))?;
            }
            if !segment.is_empty() {
                write_t(writer, segment)?;
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new("w:r")))
}

/// Visible text of a paragraph.
///
/// Paragraphs nested inside this one (text boxes, tables in text boxes) are
/// their own paragraphs; their text is not counted here.
pub(crate) fn paragraph_text(p: Node<'_, '_>) -> String {
    let mut text = String::new();
    for node in p.descendants().filter(|n| n.is_element() && *n != p) {
        let piece = match node.tag_name().name() {
            "t" => node.text().unwrap_or(""),
            "tab" => "\t",
            "br" | "cr" => "\n",
            _ => continue,
        };
        if node.tag_name().namespace() != Some(WML_NS) || owning_paragraph(node) != Some(p) {
            continue;
        }
        text.push_str(piece);
    }
    text
}

fn owning_paragraph<'a, 'input>(node: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    node.ancestors().find(|a| a.has_tag_name((WML_NS, "p")))
}
