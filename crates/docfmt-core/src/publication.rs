//! Journal publication formatting for manuscripts that are real DOCX packages.
//!
//! The body is rewritten in place: `{{PLACEHOLDER}}` paragraphs are filled
//! from the submission form, the Abstract/Keywords section is rebuilt as a
//! shaded block at the end of the body, every section gets a bordered italic
//! footer, and the core document properties are set. Parts this does not
//! touch are copied across byte for byte.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::ops::Range;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::ConvertError;
use crate::wml::{self, FONT_FAMILY, RunStyle, WML_NS};

const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const PACKAGE_RELS_PART: &str = "_rels/.rels";
const FOOTER_PART: &str = "word/footer-publication.xml";
const FOOTER_TARGET: &str = "footer-publication.xml";
const FOOTER_REL_ID: &str = "rIdPublicationFooter";
const DEFAULT_CORE_PART: &str = "docProps/core.xml";
const CORE_REL_ID: &str = "rIdPublicationCore";

const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const FOOTER_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
const CORE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
const FOOTER_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml";
const CORE_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.core-properties+xml";

const CP_NS: &str = "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

const EMPTY_RELATIONSHIPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>"#;

const BODY_SIZE: &str = "24";
const FOOTER_SIZE: &str = "20";
const BLACK: &str = "000000";
const ABSTRACT_SHADING: &str = "D9D9D9";
/// 0.3in.
const ABSTRACT_INDENT_TWIPS: &str = "432";
/// 1.15 lines.
const ABSTRACT_LINE_SPACING: &str = "276";
const KEYWORDS_PLACEHOLDER: &str = "Add your keywords here.";

const CORE_SUBJECT: &str = "Academic Research Paper";
const CORE_DESCRIPTION: &str = "Processed and formatted by the docfmt publication formatter";
const CORE_CATEGORY: &str = "Academic";
const CORE_STATUS: &str = "Final";

/// Values submitted alongside the manuscript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicationFields {
    pub journal_name: String,
    pub volume_details: String,
    pub paper_received: String,
    pub paper_accepted: String,
    pub paper_published: String,
    pub author_name: String,
    pub corresponding_author: String,
    pub email: String,
    pub doi: String,
    pub footer_text: String,
}

impl PublicationFields {
    /// Build from form values looked up by field name.
    ///
    /// Every field is required; the error is the name of the first one missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, &'static str>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).ok_or(name);
        Ok(Self {
            journal_name: get("journal_name")?,
            volume_details: get("volume_details")?,
            paper_received: get("paper_received")?,
            paper_accepted: get("paper_accepted")?,
            paper_published: get("paper_published")?,
            author_name: get("author_name")?,
            corresponding_author: get("corresponding_author")?,
            email: get("email")?,
            doi: get("doi")?,
            footer_text: get("footer_text")?,
        })
    }

    fn placeholders(&self) -> [(&'static str, &str); 10] {
        [
            ("{{JOURNAL_NAME}}", self.journal_name.as_str()),
            ("{{VOLUME_DETAILS}}", self.volume_details.as_str()),
            ("{{PAPER_RECEIVED}}", self.paper_received.as_str()),
            ("{{PAPER_ACCEPTED}}", self.paper_accepted.as_str()),
            ("{{PAPER_PUBLISHED}}", self.paper_published.as_str()),
            ("{{AUTHOR_NAME}}", self.author_name.as_str()),
            ("{{CORRESPONDING_AUTHOR}}", self.corresponding_author.as_str()),
            ("{{EMAIL}}", self.email.as_str()),
            ("{{DOI}}", self.doi.as_str()),
            ("{{FOOTER}}", self.footer_text.as_str()),
        ]
    }

    /// Replace every placeholder in `text`, or `None` if there were none.
    fn substitute(&self, text: &str) -> Option<String> {
        let mut replaced: Option<String> = None;
        for (key, value) in self.placeholders() {
            let current = replaced.as_deref().unwrap_or(text);
            if current.contains(key) {
                let next = current.replace(key, value);
                replaced = Some(next);
            }
        }
        replaced
    }
}

/// Format the manuscript at `input` for publication and write the result to
/// `output`.
pub fn format_publication(
    input: &Path,
    output: &Path,
    fields: &PublicationFields,
) -> Result<(), ConvertError> {
    let mut archive = ZipArchive::new(File::open(input)?)?;

    let document = read_part(&mut archive, DOCUMENT_PART)?.ok_or(ZipError::FileNotFound)?;
    let content_types =
        read_part(&mut archive, CONTENT_TYPES_PART)?.ok_or(ZipError::FileNotFound)?;
    let package_rels = read_part(&mut archive, PACKAGE_RELS_PART)?;
    let document_rels = read_part(&mut archive, DOCUMENT_RELS_PART)?;

    let plan = plan_body(&document, fields)?;

    let linked_core = match &package_rels {
        Some(rels) => core_part_name(rels)?,
        None => None,
    };
    let core_part = linked_core
        .clone()
        .unwrap_or_else(|| DEFAULT_CORE_PART.to_string());
    let existing_core = read_part(&mut archive, &core_part)?;
    let properties = [
        ("dc", DC_NS, "title", plan.title()),
        ("dc", DC_NS, "subject", CORE_SUBJECT),
        ("dc", DC_NS, "creator", fields.author_name.as_str()),
        ("cp", CP_NS, "keywords", plan.keywords()),
        ("dc", DC_NS, "description", CORE_DESCRIPTION),
        ("cp", CP_NS, "lastModifiedBy", fields.author_name.as_str()),
        ("cp", CP_NS, "category", CORE_CATEGORY),
        ("cp", CP_NS, "contentStatus", CORE_STATUS),
    ];

    let mut parts: Vec<(String, Vec<u8>)> = vec![
        (
            CONTENT_TYPES_PART.to_string(),
            rewrite_content_types(&content_types, &core_part)?,
        ),
        (DOCUMENT_PART.to_string(), rewrite_document(&document, &plan)?),
        (
            DOCUMENT_RELS_PART.to_string(),
            rewrite_document_rels(document_rels.as_deref())?,
        ),
        (FOOTER_PART.to_string(), footer_part(&fields.footer_text)?),
        (
            core_part.clone(),
            core_properties(existing_core.as_deref(), &properties)?,
        ),
    ];
    if linked_core.is_none() {
        parts.push((
            PACKAGE_RELS_PART.to_string(),
            link_core_part(package_rels.as_deref())?,
        ));
    }

    let mut zip = ZipWriter::new(File::create(output)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in &parts {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(data)?;
    }
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i)?;
        if parts.iter().any(|(name, _)| name == file.name()) {
            continue;
        }
        zip.raw_copy_file(file)?;
    }
    zip.finish()?;

    tracing::debug!(
        paragraphs = plan.texts.len(),
        rewritten = plan.rewritten.iter().filter(|r| **r).count(),
        has_abstract = plan.abstract_block.is_some(),
        "wrote publication package"
    );
    Ok(())
}

/// What happens to the body, decided up front from the paragraph texts.
struct BodyPlan {
    /// Text of each body-level paragraph after placeholder substitution.
    texts: Vec<String>,
    /// Paragraphs whose content is replaced by their substituted text.
    rewritten: Vec<bool>,
    /// Paragraphs dropped because the abstract block replaces them.
    removed: Range<usize>,
    abstract_block: Option<AbstractBlock>,
}

struct AbstractBlock {
    text: String,
    keywords: String,
}

impl BodyPlan {
    /// First non-empty paragraph of the finished body.
    fn title(&self) -> &str {
        self.texts
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.removed.contains(i))
            .map(|(_, text)| text.trim())
            .find(|text| !text.is_empty())
            .or(self.abstract_block.as_ref().map(|_| "Abstract"))
            .unwrap_or("")
    }

    fn keywords(&self) -> &str {
        self.abstract_block
            .as_ref()
            .map(|block| block.keywords.as_str())
            .unwrap_or("")
    }
}

fn plan_body(document: &str, fields: &PublicationFields) -> Result<BodyPlan, ConvertError> {
    let xml = roxmltree::Document::parse(document)?;
    let root = xml.root_element();
    if root.lookup_prefix(WML_NS) != Some("w") {
        return Err(ConvertError::Unsupported(
            "document.xml does not use the w prefix for WordprocessingML",
        ));
    }

    let mut texts = Vec::new();
    let mut rewritten = Vec::new();
    if let Some(body) = root.children().find(|n| n.has_tag_name((WML_NS, "body"))) {
        for p in body.children().filter(|n| n.has_tag_name((WML_NS, "p"))) {
            let text = wml::paragraph_text(p);
            match fields.substitute(&text) {
                Some(replaced) => {
                    texts.push(replaced);
                    rewritten.push(true);
                }
                None => {
                    texts.push(text);
                    rewritten.push(false);
                }
            }
        }
    }

    let (removed, abstract_block) = match locate_abstract(&texts) {
        Some((start, end)) => {
            let text = texts[start + 1..end.unwrap_or(texts.len())]
                .join("\n")
                .trim()
                .to_string();
            let keywords = end
                .map(|i| texts[i].replace("Keywords:", "").trim().to_string())
                .unwrap_or_default();
            (
                start..end.unwrap_or(start + 1),
                Some(AbstractBlock { text, keywords }),
            )
        }
        None => (0..0, None),
    };

    Ok(BodyPlan {
        texts,
        rewritten,
        removed,
        abstract_block,
    })
}

/// Index of the last "Abstract" heading before the first "Keywords" line,
/// and of that line if there is one.
fn locate_abstract(texts: &[String]) -> Option<(usize, Option<usize>)> {
    let mut start = None;
    for (i, text) in texts.iter().enumerate() {
        let lower = text.trim().to_lowercase();
        if lower.starts_with("abstract") {
            start = Some(i);
        } else if lower.starts_with("keywords") {
            if let Some(start) = start {
                return Some((start, Some(i)));
            }
        }
    }
    start.map(|start| (start, None))
}

fn rewrite_document(document: &str, plan: &BodyPlan) -> Result<Vec<u8>, ConvertError> {
    let mut reader = Reader::from_str(document);
    let mut out = Writer::new(Vec::new());

    let mut depth = 0usize;
    let mut body_depth: Option<usize> = None;
    let mut paragraph: Vec<Event<'static>> = Vec::new();
    let mut paragraph_depth: Option<usize> = None;
    let mut index = 0usize;
    let mut pending = plan.abstract_block.as_ref();

    loop {
        let event = reader.read_event()?;

        if let Some(open_depth) = paragraph_depth {
            match &event {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth -= 1,
                Event::Eof => return Err(ConvertError::Unsupported("unterminated paragraph")),
                _ => {}
            }
            paragraph.push(event.into_owned());
            if depth < open_depth {
                paragraph_depth = None;
                write_paragraph(&mut out, std::mem::take(&mut paragraph), index, plan)?;
                index += 1;
            }
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let body_child = body_depth == Some(depth);
                let is_paragraph = e.name().as_ref() == b"w:p";
                let is_section = e.name().as_ref() == b"w:sectPr";
                let is_body = e.name().as_ref() == b"w:body";
                depth += 1;

                if body_child && is_paragraph {
                    paragraph_depth = Some(depth);
                    paragraph.push(Event::Start(e.into_owned()));
                    continue;
                }
                if body_child && is_section {
                    if let Some(block) = pending.take() {
                        write_abstract(&mut out, block)?;
                    }
                }
                if is_body {
                    body_depth = Some(depth);
                }
                emit(&mut out, Event::Start(e))?;
            }
            Event::Empty(e) => {
                let body_child = body_depth == Some(depth);
                if body_child && e.name().as_ref() == b"w:p" {
                    write_paragraph(&mut out, vec![Event::Empty(e.into_owned())], index, plan)?;
                    index += 1;
                    continue;
                }
                if body_child && e.name().as_ref() == b"w:sectPr" {
                    if let Some(block) = pending.take() {
                        write_abstract(&mut out, block)?;
                    }
                }
                emit(&mut out, Event::Empty(e))?;
            }
            Event::End(e) => {
                if body_depth == Some(depth) {
                    if let Some(block) = pending.take() {
                        write_abstract(&mut out, block)?;
                    }
                    body_depth = None;
                }
                depth = depth.saturating_sub(1);
                emit(&mut out, Event::End(e))?;
            }
            other => emit(&mut out, other)?,
        }
    }

    Ok(out.into_inner())
}

/// Write one captured body-level paragraph according to the plan.
fn write_paragraph(
    out: &mut Writer<Vec<u8>>,
    events: Vec<Event<'static>>,
    index: usize,
    plan: &BodyPlan,
) -> Result<(), ConvertError> {
    if plan.removed.contains(&index) {
        return Ok(());
    }
    if !plan.rewritten.get(index).copied().unwrap_or(false) {
        for event in events {
            emit(out, event)?;
        }
        return Ok(());
    }

    let mut events = events.into_iter();
    let start = match events.next() {
        Some(Event::Start(e) | Event::Empty(e)) => e,
        _ => return Ok(()),
    };
    let end = start.to_end().into_owned();
    out.write_event(Event::Start(start))?;

    // Paragraph properties stay; the runs give way to one plain run.
    let mut depth = 0usize;
    let mut in_properties = false;
    for event in events {
        match event {
            Event::Start(e) => {
                if depth == 0 {
                    in_properties = e.name().as_ref() == b"w:pPr";
                }
                depth += 1;
                if in_properties {
                    emit(out, Event::Start(e))?;
                }
            }
            Event::End(e) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if in_properties {
                    emit(out, Event::End(e))?;
                }
                if depth == 0 {
                    in_properties = false;
                }
            }
            Event::Empty(e) => {
                if in_properties || (depth == 0 && e.name().as_ref() == b"w:pPr") {
                    emit(out, Event::Empty(e))?;
                }
            }
            other => {
                if in_properties {
                    emit(out, other)?;
                }
            }
        }
    }

    let text = plan.texts.get(index).map(String::as_str).unwrap_or("");
    wml::write_run(out, &RunStyle::default(), text)?;
    out.write_event(Event::End(end))?;
    Ok(())
}

/// Pass an event through, pointing every section at the publication footer.
fn emit(out: &mut Writer<Vec<u8>>, event: Event<'_>) -> io::Result<()> {
    match event {
        Event::Start(e) if e.name().as_ref() == b"w:sectPr" => {
            out.write_event(Event::Start(e))?;
            write_footer_reference(out)
        }
        Event::Empty(e) if e.name().as_ref() == b"w:sectPr" => {
            let end = e.to_end().into_owned();
            out.write_event(Event::Start(e))?;
            write_footer_reference(out)?;
            out.write_event(Event::End(end))
        }
        Event::Empty(e) if is_default_footer_reference(&e) => Ok(()),
        other => out.write_event(other),
    }
}

fn is_default_footer_reference(e: &BytesStart<'_>) -> bool {
    e.name().as_ref() == b"w:footerReference" && attr(e, "w:type").as_deref() == Some("default")
}

fn write_footer_reference(out: &mut Writer<Vec<u8>>) -> io::Result<()> {
    out.write_event(Event::Empty(
        BytesStart::new("w:footerReference").with_attributes([
            ("xmlns:r", REL_NS),
            ("w:type", "default"),
            ("r:id", FOOTER_REL_ID),
        ]),
    ))
}

fn write_abstract(out: &mut Writer<Vec<u8>>, block: &AbstractBlock) -> io::Result<()> {
    out.write_event(Event::Start(BytesStart::new("w:p")))?;
    out.write_event(Event::Start(BytesStart::new("w:pPr")))?;
    out.write_event(Event::Empty(
        BytesStart::new("w:jc").with_attributes([("w:val", "center")]),
    ))?;
    out.write_event(Event::End(BytesEnd::new("w:pPr")))?;
    let heading = RunStyle {
        font: Some(FONT_FAMILY),
        bold: Some(true),
        size: Some(BODY_SIZE),
        ..Default::default()
    };
    wml::write_run(out, &heading, "Abstract")?;
    out.write_event(Event::End(BytesEnd::new("w:p")))?;

    out.write_event(Event::Start(BytesStart::new("w:p")))?;
    out.write_event(Event::Start(BytesStart::new("w:pPr")))?;
    out.write_event(Event::Empty(BytesStart::new("w:shd").with_attributes([
        ("w:val", "clear"),
        ("w:color", "auto"),
        ("w:fill", ABSTRACT_SHADING),
    ])))?;
    out.write_event(Event::Empty(BytesStart::new("w:spacing").with_attributes([
        ("w:line", ABSTRACT_LINE_SPACING),
        ("w:lineRule", "auto"),
    ])))?;
    out.write_event(Event::Empty(BytesStart::new("w:ind").with_attributes([
        ("w:left", ABSTRACT_INDENT_TWIPS),
        ("w:right", ABSTRACT_INDENT_TWIPS),
    ])))?;
    out.write_event(Event::Empty(
        BytesStart::new("w:jc").with_attributes([("w:val", "both")]),
    ))?;
    out.write_event(Event::End(BytesEnd::new("w:pPr")))?;

    let body = RunStyle {
        font: Some(FONT_FAMILY),
        color: Some(BLACK),
        size: Some(BODY_SIZE),
        ..Default::default()
    };
    wml::write_run(out, &body, &format!("{}\n\nKeywords: ", block.text))?;
    let keywords = if block.keywords.is_empty() {
        KEYWORDS_PLACEHOLDER
    } else {
        block.keywords.as_str()
    };
    let keyword_style = RunStyle {
        bold: Some(false),
        ..body
    };
    wml::write_run(out, &keyword_style, keywords)?;
    out.write_event(Event::End(BytesEnd::new("w:p")))
}

fn footer_part(text: &str) -> Result<Vec<u8>, ConvertError> {
    let mut out = Writer::new(Vec::new());
    out.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    out.write_event(Event::Start(
        BytesStart::new("w:ftr").with_attributes([("xmlns:w", WML_NS), ("xmlns:r", REL_NS)]),
    ))?;
    out.write_event(Event::Start(BytesStart::new("w:p")))?;
    out.write_event(Event::Start(BytesStart::new("w:pPr")))?;
    out.write_event(Event::Start(BytesStart::new("w:pBdr")))?;
    out.write_event(Event::Empty(BytesStart::new("w:top").with_attributes([
        ("w:val", "single"),
        ("w:sz", "8"),
        ("w:space", "1"),
        ("w:color", BLACK),
    ])))?;
    out.write_event(Event::End(BytesEnd::new("w:pBdr")))?;
    out.write_event(Event::Empty(
        BytesStart::new("w:jc").with_attributes([("w:val", "left")]),
    ))?;
    out.write_event(Event::End(BytesEnd::new("w:pPr")))?;
    let style = RunStyle {
        font: Some(FONT_FAMILY),
        italic: true,
        color: Some(BLACK),
        size: Some(FOOTER_SIZE),
        ..Default::default()
    };
    wml::write_run(&mut out, &style, text)?;
    out.write_event(Event::End(BytesEnd::new("w:p")))?;
    out.write_event(Event::End(BytesEnd::new("w:ftr")))?;
    Ok(out.into_inner())
}

fn rewrite_content_types(xml: &str, core_part: &str) -> Result<Vec<u8>, ConvertError> {
    let footer_name = format!("/{FOOTER_PART}");
    let core_name = format!("/{core_part}");
    rewrite_part(
        xml,
        |e| {
            e.local_name().as_ref() == b"Override"
                && attr(e, "PartName").is_some_and(|name| {
                    name.eq_ignore_ascii_case(&footer_name) || name.eq_ignore_ascii_case(&core_name)
                })
        },
        |out| {
            out.write_event(Event::Empty(BytesStart::new("Override").with_attributes([
                ("PartName", footer_name.as_str()),
                ("ContentType", FOOTER_CONTENT_TYPE),
            ])))?;
            out.write_event(Event::Empty(BytesStart::new("Override").with_attributes([
                ("PartName", core_name.as_str()),
                ("ContentType", CORE_CONTENT_TYPE),
            ])))
        },
    )
}

fn rewrite_document_rels(xml: Option<&str>) -> Result<Vec<u8>, ConvertError> {
    add_relationship(xml, FOOTER_REL_ID, FOOTER_REL_TYPE, FOOTER_TARGET)
}

fn link_core_part(xml: Option<&str>) -> Result<Vec<u8>, ConvertError> {
    add_relationship(xml, CORE_REL_ID, CORE_REL_TYPE, DEFAULT_CORE_PART)
}

/// Add (or replace) relationship `id` in a relationships part.
fn add_relationship(
    xml: Option<&str>,
    id: &str,
    kind: &str,
    target: &str,
) -> Result<Vec<u8>, ConvertError> {
    rewrite_part(
        xml.unwrap_or(EMPTY_RELATIONSHIPS),
        |e| e.local_name().as_ref() == b"Relationship" && attr(e, "Id").as_deref() == Some(id),
        |out| {
            out.write_event(Event::Empty(BytesStart::new("Relationship").with_attributes([
                ("Id", id),
                ("Type", kind),
                ("Target", target),
            ])))
        },
    )
}

/// Package path of the core properties part, if the package links one.
fn core_part_name(rels: &str) -> Result<Option<String>, ConvertError> {
    let xml = roxmltree::Document::parse(rels)?;
    Ok(xml
        .root_element()
        .children()
        .filter(|n| n.has_tag_name((PACKAGE_REL_NS, "Relationship")))
        .find(|n| n.attribute("Type") == Some(CORE_REL_TYPE))
        .and_then(|n| n.attribute("Target"))
        .map(|target| target.trim_start_matches('/').to_string()))
}

/// Core properties as `(prefix, namespace, local name, value)`. Existing
/// values for the same names are replaced; everything else is kept.
fn core_properties(
    existing: Option<&str>,
    properties: &[(&str, &str, &str, &str)],
) -> Result<Vec<u8>, ConvertError> {
    let write_properties = |out: &mut Writer<Vec<u8>>| -> io::Result<()> {
        for &(prefix, namespace, name, value) in properties {
            let qname = format!("{prefix}:{name}");
            let xmlns = format!("xmlns:{prefix}");
            out.write_event(Event::Start(
                BytesStart::new(qname.as_str()).with_attributes([(xmlns.as_str(), namespace)]),
            ))?;
            out.write_event(Event::Text(BytesText::new(value)))?;
            out.write_event(Event::End(BytesEnd::new(qname.as_str())))?;
        }
        Ok(())
    };

    match existing {
        Some(xml) => rewrite_part(
            xml,
            |e| {
                properties
                    .iter()
                    .any(|&(_, _, name, _)| e.local_name().as_ref() == name.as_bytes())
            },
            write_properties,
        ),
        None => {
            let mut out = Writer::new(Vec::new());
            out.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
            out.write_event(Event::Start(
                BytesStart::new("cp:coreProperties").with_attributes([
                    ("xmlns:cp", CP_NS),
                    ("xmlns:dc", DC_NS),
                    ("xmlns:dcterms", DCTERMS_NS),
                    ("xmlns:xsi", XSI_NS),
                ]),
            ))?;
            write_properties(&mut out)?;
            out.write_event(Event::End(BytesEnd::new("cp:coreProperties")))?;
            Ok(out.into_inner())
        }
    }
}

/// Copy an XML part, dropping children of the root element that `drop_child`
/// selects and writing `append` just before the root closes.
fn rewrite_part<D, A>(xml: &str, drop_child: D, append: A) -> Result<Vec<u8>, ConvertError>
where
    D: Fn(&BytesStart<'_>) -> bool,
    A: FnOnce(&mut Writer<Vec<u8>>) -> io::Result<()>,
{
    let mut reader = Reader::from_str(xml);
    let mut out = Writer::new(Vec::new());
    let mut append = Some(append);
    let mut depth = 0usize;
    let mut skipping: Option<usize> = None;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                depth += 1;
                if skipping.is_none() && depth == 2 && drop_child(&e) {
                    skipping = Some(depth);
                }
                if skipping.is_none() {
                    out.write_event(Event::Start(e))?;
                }
            }
            Event::End(e) => {
                let closing = depth;
                depth = depth.saturating_sub(1);
                if let Some(level) = skipping {
                    if closing == level {
                        skipping = None;
                    }
                    continue;
                }
                if closing == 1 {
                    if let Some(append) = append.take() {
                        append(&mut out)?;
                    }
                }
                out.write_event(Event::End(e))?;
            }
            Event::Empty(e) if depth == 0 => {
                let end = e.to_end().into_owned();
                out.write_event(Event::Start(e))?;
                if let Some(append) = append.take() {
                    append(&mut out)?;
                }
                out.write_event(Event::End(end))?;
            }
            Event::Empty(e) => {
                if skipping.is_some() || (depth == 1 && drop_child(&e)) {
                    continue;
                }
                out.write_event(Event::Empty(e))?;
            }
            other => {
                if skipping.is_none() {
                    out.write_event(other)?;
                }
            }
        }
    }

    Ok(out.into_inner())
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    let value = e.try_get_attribute(name).ok()??;
    value.unescape_value().ok().map(Cow::into_owned)
}

/// Read a package part as text, or `None` if the package doesn't have it.
fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ConvertError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    if let Some(stripped) = content.strip_prefix('\u{feff}') {
        content = stripped.to_string();
    }
    Ok(Some(content))
}
