use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
/// Prevents stack overflow from maliciously crafted deeply nested documents.
pub const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur during OPML parsing.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),
}

impl From<quick_xml::Error> for OpmlError {
    fn from(err: quick_xml::Error) -> Self {
        OpmlError::XmlParse(err.to_string())
    }
}

/// A single `<outline>` element and everything nested below it.
///
/// Attributes are kept as they appear in the document (unescaped, otherwise
/// raw). Deciding whether an outline is a folder or a feed, and normalizing
/// its URLs, is left to the importer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpmlOutline {
    pub text: Option<String>,
    pub title: Option<String>,
    /// URL of the RSS/Atom feed; present on feed outlines.
    pub xml_url: Option<String>,
    /// URL of the feed's website.
    pub html_url: Option<String>,
    pub children: Vec<OpmlOutline>,
}

impl OpmlOutline {
    /// A feed outline for export.
    pub fn feed(title: &str, xml_url: &str, html_url: Option<&str>) -> Self {
        Self {
            text: Some(title.to_owned()),
            title: Some(title.to_owned()),
            xml_url: Some(xml_url.to_owned()),
            html_url: Some(html_url.unwrap_or_default().to_owned()),
            children: Vec::new(),
        }
    }

    /// A folder outline for export.
    pub fn folder(name: &str, children: Vec<OpmlOutline>) -> Self {
        Self {
            text: Some(name.to_owned()),
            title: Some(name.to_owned()),
            xml_url: None,
            html_url: None,
            children,
        }
    }
}

/// A parsed (or to-be-written) OPML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpmlDocument {
    pub title: Option<String>,
    pub date_created: Option<String>,
    pub date_modified: Option<String>,
    /// Top-level outlines of `<body>`.
    pub outlines: Vec<OpmlOutline>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum HeadField {
    Title,
    DateCreated,
    DateModified,
}

/// Parses OPML content into its outline tree.
///
/// Nesting is preserved: folder outlines keep their children in document
/// order. Outlines left open when the document ends are closed implicitly.
///
/// # Errors
///
/// - [`OpmlError::XmlParse`] if the content is not well-formed XML or uses an
///   entity other than the five XML builtins
/// - [`OpmlError::MaxDepthExceeded`] if outlines nest deeper than
///   [`MAX_OPML_DEPTH`]
///
/// # Security
///
/// XXE (XML External Entity) attacks are mitigated because `quick-xml` (0.37)
/// does not parse `<!ENTITY>` declarations. Custom entities cause
/// `EscapeError::UnrecognizedEntity`.
pub fn parse_opml(content: &str) -> Result<OpmlDocument, OpmlError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations from a
    // DOCTYPE; only the 5 XML builtins resolve. `decode_and_unescape_value()`
    // (not `_with()`) keeps us on that default.
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut doc = OpmlDocument::default();
    // SEC-003: the stack length is the current outline depth
    let mut stack: Vec<OpmlOutline> = Vec::new();
    let mut in_head = false;
    let mut head_field: Option<HeadField> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"outline" => {
                    if stack.len() >= MAX_OPML_DEPTH {
                        return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                    }
                    stack.push(parse_outline_attributes(&e, &reader)?);
                }
                b"head" => in_head = true,
                b"title" if in_head => head_field = Some(HeadField::Title),
                b"dateCreated" if in_head => head_field = Some(HeadField::DateCreated),
                b"dateModified" if in_head => head_field = Some(HeadField::DateModified),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                // Self-closing outline doesn't affect depth
                let outline = parse_outline_attributes(&e, &reader)?;
                attach(&mut stack, &mut doc.outlines, outline);
            }
            Ok(Event::Text(t)) => {
                if let Some(field) = head_field {
                    let value = t.unescape()?.into_owned();
                    match field {
                        HeadField::Title => doc.title = Some(value),
                        HeadField::DateCreated => doc.date_created = Some(value),
                        HeadField::DateModified => doc.date_modified = Some(value),
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"outline" => {
                    if let Some(outline) = stack.pop() {
                        attach(&mut stack, &mut doc.outlines, outline);
                    }
                }
                b"head" => in_head = false,
                b"title" | b"dateCreated" | b"dateModified" => head_field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    while let Some(outline) = stack.pop() {
        attach(&mut stack, &mut doc.outlines, outline);
    }

    Ok(doc)
}

fn attach(stack: &mut [OpmlOutline], roots: &mut Vec<OpmlOutline>, outline: OpmlOutline) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(outline),
        None => roots.push(outline),
    }
}

/// Extracts the attributes of an outline element.
///
/// Attribute names are matched case-insensitively (`xmlUrl`, `xmlURL` and
/// `xmlurl` all appear in the wild). Malformed attributes are skipped.
fn parse_outline_attributes(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<OpmlOutline, OpmlError> {
    let mut outline = OpmlOutline::default();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let key = attr.key.as_ref().to_ascii_lowercase();
        let slot = match key.as_slice() {
            b"text" => &mut outline.text,
            b"title" => &mut outline.title,
            b"xmlurl" => &mut outline.xml_url,
            b"htmlurl" => &mut outline.html_url,
            _ => continue,
        };
        *slot = Some(attr.decode_and_unescape_value(reader.decoder())?.into_owned());
    }

    Ok(outline)
}

/// Renders an OPML 1.1 document.
///
/// Feed outlines (those with `xml_url`) get `type="rss"`, `version="RSS"`,
/// `htmlUrl` and `xmlUrl` attributes; folder outlines get `text` and `title`
/// and wrap their children.
pub fn export_opml(doc: &OpmlDocument) -> Result<String> {
    use quick_xml::events::{BytesDecl, BytesEnd, BytesText};
    use quick_xml::Writer;
    use std::io::Cursor;

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;

    let mut opml = BytesStart::new("opml");
    opml.push_attribute(("version", "1.1"));
    writer
        .write_event(Event::Start(opml))
        .context("Failed to write opml element")?;
    writer
        .write_event(Event::Comment(BytesText::new(" Generated by feedport ")))
        .context("Failed to write generator comment")?;

    writer
        .write_event(Event::Start(BytesStart::new("head")))
        .context("Failed to write head element")?;
    let head_fields = [
        ("title", doc.title.as_deref()),
        ("dateCreated", doc.date_created.as_deref()),
        ("dateModified", doc.date_modified.as_deref()),
    ];
    for (name, value) in head_fields {
        if let Some(value) = value {
            writer
                .create_element(name)
                .write_text_content(BytesText::new(value))
                .with_context(|| format!("Failed to write {} element", name))?;
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new("head")))
        .context("Failed to write head end")?;

    writer
        .write_event(Event::Start(BytesStart::new("body")))
        .context("Failed to write body element")?;
    write_outlines(&mut writer, &doc.outlines)?;
    writer
        .write_event(Event::End(BytesEnd::new("body")))
        .context("Failed to write body end")?;

    writer
        .write_event(Event::End(BytesEnd::new("opml")))
        .context("Failed to write opml end")?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).context("Generated OPML contains invalid UTF-8")
}

fn write_outlines<W: std::io::Write>(
    writer: &mut quick_xml::Writer<W>,
    outlines: &[OpmlOutline],
) -> Result<()> {
    use quick_xml::events::BytesEnd;

    for outline in outlines {
        let mut element = BytesStart::new("outline");
        if let Some(text) = &outline.text {
            element.push_attribute(("text", text.as_str()));
        }
        if let Some(title) = &outline.title {
            element.push_attribute(("title", title.as_str()));
        }
        if let Some(xml_url) = &outline.xml_url {
            element.push_attribute(("type", "rss"));
            element.push_attribute(("version", "RSS"));
            element.push_attribute(("htmlUrl", outline.html_url.as_deref().unwrap_or("")));
            element.push_attribute(("xmlUrl", xml_url.as_str()));
        }

        if outline.children.is_empty() && outline.xml_url.is_some() {
            writer
                .write_event(Event::Empty(element))
                .context("Failed to write outline element")?;
        } else {
            writer
                .write_event(Event::Start(element))
                .context("Failed to write outline element")?;
            write_outlines(writer, &outline.children)?;
            writer
                .write_event(Event::End(BytesEnd::new("outline")))
                .context("Failed to write outline end")?;
        }
    }
    Ok(())
}

/// Exports an OPML document to a file atomically.
///
/// Writes to a temporary file in the same directory, syncs to disk, then
/// renames over the destination, so the destination is never left partial.
pub fn export_to_file(doc: &OpmlDocument, path: &std::path::Path) -> Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let content = export_opml(doc)?;

    // SEC-009: Randomized temp filename to prevent TOCTOU race conditions
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .with_context(|| {
            format!(
                "Failed to create temporary file '{}': check directory permissions",
                temp_path.display()
            )
        })?;

    std::io::Write::write_all(&mut file, content.as_bytes()).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to write OPML to temporary file '{}'", temp_path.display())
    })?;

    file.sync_all().with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to sync temporary file '{}' to disk", temp_path.display())
    })?;

    drop(file);

    std::fs::rename(&temp_path, path).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}'",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}
