//! DOCX output: a single-section WordprocessingML package on A4 paper with
//! every run set in 12pt Times New Roman at 1.5 line spacing.

use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;

use crate::ConvertError;
use crate::wml::{self, FONT_FAMILY, WML_NS};

/// A4 in twips.
const PAGE_WIDTH_TWIPS: &str = "11907";
const PAGE_HEIGHT_TWIPS: &str = "16840";
const PAGE_MARGIN_TWIPS: &str = "1440";

/// 240ths of a line: 360 is 1.5 lines.
const LINE_SPACING: &str = "360";
/// Half-points: 24 is 12pt.
const FONT_SIZE_HALF_POINTS: &str = "24";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// How the uploaded bytes become paragraph text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocxMode {
    /// Decode the whole upload as text into a single run, whatever it contains.
    /// A real DOCX package comes out as its ZIP bytes rendered as text.
    #[default]
    Raw,
    /// Open the upload as a DOCX package and carry over its paragraph text.
    Paragraphs,
}

impl FromStr for DocxMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "paragraphs" => Ok(Self::Paragraphs),
            other => Err(format!("unknown DOCX mode '{other}' (expected raw or paragraphs)")),
        }
    }
}

/// Write a new DOCX package to `output` from the upload at `input`.
pub fn write_docx(input: &Path, output: &Path, mode: DocxMode) -> Result<(), ConvertError> {
    let paragraphs = match mode {
        DocxMode::Raw => {
            let bytes = std::fs::read(input)?;
            vec![xml_safe(&String::from_utf8_lossy(&bytes))]
        }
        DocxMode::Paragraphs => extract_paragraphs(input)?,
    };

    let document_xml = render_document(&paragraphs)?;

    let file = std::fs::File::create(output)?;
    let mut zip = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS_XML.as_bytes())?;
    zip.start_file("word/document.xml", options)?;
    zip.write_all(&document_xml)?;
    zip.finish()?;

    tracing::debug!(paragraphs = paragraphs.len(), ?mode, "wrote DOCX package");
    Ok(())
}

/// Replace characters XML 1.0 cannot carry with U+FFFD.
fn xml_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\t' | '\n' | '\r' => c,
            c if c < ' ' => '\u{FFFD}',
            '\u{FFFE}' | '\u{FFFF}' => '\u{FFFD}',
            c => c,
        })
        .collect()
}

/// Read the text of every non-empty paragraph from a DOCX package.
fn extract_paragraphs(input: &Path) -> Result<Vec<String>, ConvertError> {
    let file = std::fs::File::open(input)?;
    let mut zip = zip::ZipArchive::new(file)?;

    let mut xml_content = String::new();
    zip.by_name("word/document.xml")?
        .read_to_string(&mut xml_content)?;

    let xml = roxmltree::Document::parse(&xml_content)?;

    let mut paragraphs: Vec<String> = xml
        .descendants()
        .filter(|n| n.has_tag_name((WML_NS, "p")))
        .map(|p| wml::paragraph_text(p).trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();

    if paragraphs.is_empty() {
        paragraphs.push(String::new());
    }
    Ok(paragraphs)
}

fn render_document(paragraphs: &[String]) -> Result<Vec<u8>, ConvertError> {
    let mut writer = Writer::new(Vec::new());

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    writer.write_event(Event::Start(
        BytesStart::new("w:document").with_attributes([("xmlns:w", WML_NS)]),
    ))?;
    writer.write_event(Event::Start(BytesStart::new("w:body")))?;

    for text in paragraphs {
        write_paragraph(&mut writer, text)?;
    }

    writer.write_event(Event::Start(BytesStart::new("w:sectPr")))?;
    writer.write_event(Event::Empty(BytesStart::new("w:pgSz").with_attributes([
        ("w:w", PAGE_WIDTH_TWIPS),
        ("w:h", PAGE_HEIGHT_TWIPS),
    ])))?;
    writer.write_event(Event::Empty(BytesStart::new("w:pgMar").with_attributes([
        ("w:top", PAGE_MARGIN_TWIPS),
        ("w:right", PAGE_MARGIN_TWIPS),
        ("w:bottom", PAGE_MARGIN_TWIPS),
        ("w:left", PAGE_MARGIN_TWIPS),
        ("w:header", "708"),
        ("w:footer", "708"),
        ("w:gutter", "0"),
    ])))?;
    writer.write_event(Event::End(BytesEnd::new("w:sectPr")))?;

    writer.write_event(Event::End(BytesEnd::new("w:body")))?;
    writer.write_event(Event::End(BytesEnd::new("w:document")))?;

    Ok(writer.into_inner())
}

fn write_paragraph(writer: &mut Writer<Vec<u8>>, text: &str) -> Result<(), ConvertError> {
    writer.write_event(Event::Start(BytesStart::new("w:p")))?;

    writer.write_event(Event::Start(BytesStart::new("w:pPr")))?;
    writer.write_event(Event::Empty(
        BytesStart::new("w:spacing")
            .with_attributes([("w:line", LINE_SPACING), ("w:lineRule", "auto")]),
    ))?;
    writer.write_event(Event::End(BytesEnd::new("w:pPr")))?;

    writer.write_event(Event::Start(BytesStart::new("w:r")))?;
    writer.write_event(Event::Start(BytesStart::new("w:rPr")))?;
    writer.write_event(Event::Empty(BytesStart::new("w:rFonts").with_attributes([
        ("w:ascii", FONT_FAMILY),
        ("w:cs", FONT_FAMILY),
        ("w:eastAsia", FONT_FAMILY),
        ("w:hAnsi", FONT_FAMILY),
    ])))?;
    writer.write_event(Event::Empty(
        BytesStart::new("w:sz").with_attributes([("w:val", FONT_SIZE_HALF_POINTS)]),
    ))?;
    writer.write_event(Event::Empty(
        BytesStart::new("w:szCs").with_attributes([("w:val", FONT_SIZE_HALF_POINTS)]),
    ))?;
    writer.write_event(Event::End(BytesEnd::new("w:rPr")))?;

    wml::write_t(writer, text)?;
    writer.write_event(Event::End(BytesEnd::new("w:r")))?;

    writer.write_event(Event::End(BytesEnd::new("w:p")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_part(path: &Path, name: &str) -> String {
        let mut zip = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        let mut content = String::new();
        zip.by_name(name).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    fn wml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
        node.children().find(|n| n.has_tag_name((WML_NS, name)))
    }

    fn wml_val<'a>(node: roxmltree::Node<'a, 'a>, attr: &str) -> Option<&'a str> {
        node.attribute((WML_NS, attr))
    }

    /// Build a minimal DOCX package whose body holds the given paragraph XML.
    fn docx_with_body(path: &Path, body: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(CONTENT_TYPES_XML.as_bytes()).unwrap();
        zip.start_file("word/document.xml", options).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0"?><w:document xmlns:w="{WML_NS}"><w:body>{body}</w:body></w:document>"#
        )
        .unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn raw_mode_writes_single_styled_run() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.docx");
        let output = dir.path().join("out.docx");
        let text = "Chapter 1\nIt was a dark & stormy <night>.";
        std::fs::write(&input, text).unwrap();

        write_docx(&input, &output, DocxMode::Raw).unwrap();

        let xml_content = read_part(&output, "word/document.xml");
        let xml = roxmltree::Document::parse(&xml_content).unwrap();
        let body = wml(xml.root_element(), "body").unwrap();

        let paragraphs: Vec<_> = body
            .children()
            .filter(|n| n.has_tag_name((WML_NS, "p")))
            .collect();
        assert_eq!(paragraphs.len(), 1);
        let sections: Vec<_> = body
            .children()
            .filter(|n| n.has_tag_name((WML_NS, "sectPr")))
            .collect();
        assert_eq!(sections.len(), 1);

        let para = paragraphs[0];
        let spacing = wml(wml(para, "pPr").unwrap(), "spacing").unwrap();
        assert_eq!(wml_val(spacing, "line"), Some("360"));

        let runs: Vec<_> = para
            .children()
            .filter(|n| n.has_tag_name((WML_NS, "r")))
            .collect();
        assert_eq!(runs.len(), 1);
        let rpr = wml(runs[0], "rPr").unwrap();
        assert_eq!(wml_val(wml(rpr, "rFonts").unwrap(), "ascii"), Some("Times New Roman"));
        assert_eq!(wml_val(wml(rpr, "sz").unwrap(), "val"), Some("24"));
        assert_eq!(wml(runs[0], "t").unwrap().text(), Some(text));

        let pg_sz = wml(sections[0], "pgSz").unwrap();
        assert_eq!(wml_val(pg_sz, "w"), Some("11907"));
        assert_eq!(wml_val(pg_sz, "h"), Some("16840"));
    }

    #[test]
    fn raw_mode_embeds_docx_package_bytes_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("real.docx");
        let output = dir.path().join("out.docx");
        docx_with_body(&input, "<w:p><w:r><w:t>Hello</w:t></w:r></w:p>");

        write_docx(&input, &output, DocxMode::Raw).unwrap();

        let xml_content = read_part(&output, "word/document.xml");
        let xml = roxmltree::Document::parse(&xml_content).unwrap();
        let t = xml.descendants().find(|n| n.has_tag_name((WML_NS, "t"))).unwrap();
        let text = t.text().unwrap();
        let head: String = text.chars().take(8).collect();
        assert!(text.starts_with("PK"), "expected zip signature, got {head:?}");
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn raw_mode_replaces_control_characters() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bin.docx");
        let output = dir.path().join("out.docx");
        std::fs::write(&input, [b'a', 0x00, 0x07, b'\t', b'b', 0xc3]).unwrap();

        write_docx(&input, &output, DocxMode::Raw).unwrap();

        let xml_content = read_part(&output, "word/document.xml");
        let xml = roxmltree::Document::parse(&xml_content).unwrap();
        let t = xml.descendants().find(|n| n.has_tag_name((WML_NS, "t"))).unwrap();
        assert_eq!(t.text(), Some("a\u{FFFD}\u{FFFD}\tb\u{FFFD}"));
    }

    #[test]
    fn raw_mode_keeps_carriage_returns() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("windows.docx");
        let output = dir.path().join("out.docx");
        std::fs::write(&input, "line one\r\nline two\r").unwrap();

        write_docx(&input, &output, DocxMode::Raw).unwrap();

        let xml_content = read_part(&output, "word/document.xml");
        let xml = roxmltree::Document::parse(&xml_content).unwrap();
        let t = xml.descendants().find(|n| n.has_tag_name((WML_NS, "t"))).unwrap();
        assert_eq!(t.text(), Some("line one\r\nline two\r"));
    }

    #[test]
    fn output_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.docx");
        let output = dir.path().join("out.docx");
        std::fs::write(&output, vec![b'x'; 1 << 16]).unwrap();
        std::fs::write(&input, "short").unwrap();

        write_docx(&input, &output, DocxMode::Raw).unwrap();

        assert!(read_part(&output, "word/document.xml").contains(">short<"));
    }

    #[test]
    fn paragraphs_mode_carries_over_paragraph_text() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("real.docx");
        let output = dir.path().join("out.docx");
        docx_with_body(
            &input,
            "<w:p><w:r><w:t>First </w:t></w:r><w:r><w:t>line</w:t></w:r></w:p>\
             <w:p><w:r><w:t>  </w:t></w:r></w:p>\
             <w:p><w:r><w:t>Second</w:t><w:tab/><w:t>line</w:t></w:r></w:p>",
        );

        write_docx(&input, &output, DocxMode::Paragraphs).unwrap();

        let xml_content = read_part(&output, "word/document.xml");
        let xml = roxmltree::Document::parse(&xml_content).unwrap();
        let texts: Vec<_> = xml
            .descendants()
            .filter(|n| n.has_tag_name((WML_NS, "t")))
            .map(|n| n.text().unwrap_or("").to_string())
            .collect();
        assert_eq!(texts, vec!["First line", "Second\tline"]);
    }

    #[test]
    fn paragraphs_mode_reads_text_boxes_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("boxed.docx");
        let output = dir.path().join("out.docx");
        docx_with_body(
            &input,
            "<w:p><w:r><w:t>Outer</w:t></w:r><w:r><w:pict><w:txbxContent>\
             <w:p><w:r><w:t>Box</w:t></w:r></w:p>\
             </w:txbxContent></w:pict></w:r></w:p>",
        );

        write_docx(&input, &output, DocxMode::Paragraphs).unwrap();

        let xml_content = read_part(&output, "word/document.xml");
        let xml = roxmltree::Document::parse(&xml_content).unwrap();
        let texts: Vec<_> = xml
            .descendants()
            .filter(|n| n.has_tag_name((WML_NS, "t")))
            .map(|n| n.text().unwrap_or("").to_string())
            .collect();
        assert_eq!(texts, vec!["Outer", "Box"]);
    }

    #[test]
    fn paragraphs_mode_rejects_non_package_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("plain.docx");
        std::fs::write(&input, "just text").unwrap();

        let err = write_docx(&input, &dir.path().join("out.docx"), DocxMode::Paragraphs)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Package(_)), "got {err:?}");
    }

    #[test]
    fn docx_mode_parses_from_config_strings() {
        assert_eq!("raw".parse::<DocxMode>(), Ok(DocxMode::Raw));
        assert_eq!(" Paragraphs ".parse::<DocxMode>(), Ok(DocxMode::Paragraphs));
        assert!("markdown".parse::<DocxMode>().is_err());
    }
}
