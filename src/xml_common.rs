//! Shared XML streaming framework (component E): a thin wrapper around
//! `quick_xml`'s pull reader that the primary/filelists/other parsers drive
//! with their own state-switch `match` arms — the idiomatic Rust rendition
//! of a table-driven state machine, since `match` on `(state, tag)` already
//! is that table, just checked by the compiler instead of walked at runtime.
//!
//! Unknown elements, the warning taxonomy, and the `new-pkg`/`pkg-complete`
//! callback contract all live here so the three format-specific parsers only
//! need to supply their own state enum and field-filling logic.

use std::io::BufRead;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use quick_xml::Writer;

use crate::error::{ErrorKind, MetadataError};
use crate::package::Package;

pub const XML_NS_COMMON: &str = "http://linux.duke.edu/metadata/common";
pub const XML_NS_FILELISTS: &str = "http://linux.duke.edu/metadata/filelists";
pub const XML_NS_OTHER: &str = "http://linux.duke.edu/metadata/other";
pub const XML_NS_REPO: &str = "http://linux.duke.edu/metadata/repo";
pub const XML_NS_RPM: &str = "http://linux.duke.edu/metadata/rpm";

/// Non-fatal parse anomalies, delivered to the caller's warning callback.
/// The callback may turn any of these into a `CallbackInterrupted` abort by
/// returning `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    UnknownTag,
    MissingAttr,
    UnknownVal,
    BadAttrVal,
    MissingVal,
    BadMdType,
}

#[derive(Debug, Clone)]
pub struct ParseWarning {
    pub kind: WarningKind,
    /// Slash-joined element path, e.g. `"metadata/package/format"`.
    pub path: String,
    pub message: String,
}

impl ParseWarning {
    pub fn new(kind: WarningKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        ParseWarning {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// `new-pkg(pkgId, name, arch) -> Option<Package>`. Returning `None` skips
/// the current `<package>` subtree — no parser will record data into it, but
/// a slot is still reserved by the merging iterator to preserve alignment.
pub type NewPkgCallback<'a> =
    dyn FnMut(&str, &str, &str) -> Result<Option<Package>, MetadataError> + 'a;

/// `pkg-complete(pkg) -> ()`. Ownership of `pkg` transfers to the callback.
pub type PkgCompleteCallback<'a> = dyn FnMut(Package) -> Result<(), MetadataError> + 'a;

/// Returning `Err` escalates the warning to a parse-ending
/// `CallbackInterrupted`.
pub type WarningCallback<'a> = dyn FnMut(ParseWarning) -> Result<(), MetadataError> + 'a;

/// Wraps a bare `<package>...</package>` (or similar) snippet in the format's
/// root element so it can be fed through the same state machine as a full
/// document.
pub fn wrap_snippet(root: &str, packages_attr: Option<usize>, body: &str) -> String {
    match packages_attr {
        Some(count) => format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><{root} packages="{count}">{body}</{root}>"#
        ),
        None => format!(r#"<?xml version="1.0" encoding="UTF-8"?><{root}>{body}</{root}>"#),
    }
}

/// A small growable text accumulator, resized in fixed-size chunks, used
/// while the current state has `capture_text = true`.
#[derive(Default)]
pub struct TextAccumulator {
    buf: String,
}

const TEXT_CHUNK: usize = 256;

impl TextAccumulator {
    pub fn push(&mut self, text: &str) {
        if self.buf.capacity() < self.buf.len() + text.len() {
            self.buf.reserve(((text.len() / TEXT_CHUNK) + 1) * TEXT_CHUNK);
        }
        self.buf.push_str(text);
    }

    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Thin wrapper over `quick_xml::Reader` that each format-specific parser
/// drives directly; owns the read buffer so callers don't have to thread one
/// through.
pub struct XmlReader<R: BufRead> {
    pub(crate) reader: Reader<R>,
    buf: Vec<u8>,
    /// Depth of an unknown-element subtree currently being skipped; `0` means
    /// not skipping.
    skip_depth: u32,
}

impl<R: BufRead> XmlReader<R> {
    pub fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.config_mut().trim_text = true;
        XmlReader {
            reader,
            buf: Vec::with_capacity(4096),
            skip_depth: 0,
        }
    }

    /// Reads the next event, borrowing from an internal buffer that is
    /// cleared on every call.
    pub fn next_event(&mut self) -> Result<Event<'_>, MetadataError> {
        self.buf.clear();
        Ok(self.reader.read_event_into(&mut self.buf)?)
    }

    pub fn buffer_position(&self) -> usize {
        self.reader.buffer_position()
    }

    /// Enters "skip until matching end-tag" mode for an unrecognized
    /// element. Call once right after observing the unknown start tag; every
    /// subsequent event should be routed through [`Self::skip_step`] until it
    /// returns `false`.
    pub fn begin_skip(&mut self) {
        self.skip_depth = 1;
    }

    pub fn is_skipping(&self) -> bool {
        self.skip_depth > 0
    }

    /// Feeds one event to the skip tracker. Returns `true` while still
    /// skipping, `false` once the matching end-tag has been consumed.
    pub fn skip_step(&mut self, event: &Event<'_>) -> bool {
        match event {
            Event::Start(_) => {
                self.skip_depth += 1;
                true
            }
            Event::End(_) => {
                self.skip_depth -= 1;
                self.skip_depth > 0
            }
            Event::Eof => false,
            _ => self.skip_depth > 0,
        }
    }
}

/// Decodes an attribute's value as UTF-8, or `None` if not present.
pub fn get_attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, MetadataError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Like [`get_attribute`], but emits a `MissingAttr` warning and returns
/// `Ok(None)` rather than failing outright — the caller decides whether the
/// absence is itself fatal (e.g. an empty `pkgId`).
pub fn get_attribute_warn(
    e: &BytesStart<'_>,
    name: &[u8],
    element: &str,
    path: &str,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<Option<String>, MetadataError> {
    match get_attribute(e, name)? {
        Some(v) => Ok(Some(v)),
        None => {
            warning_cb(ParseWarning::new(
                WarningKind::MissingAttr,
                path,
                format!("<{element}> is missing attribute `{}`", String::from_utf8_lossy(name)),
            ))?;
            Ok(None)
        }
    }
}

pub fn decode_text(e: &BytesText<'_>) -> Result<String, MetadataError> {
    Ok(e.unescape()?.into_owned())
}

/// Reads and concatenates `Text`/`CData` events up to (and consuming) the
/// next matching `End`, for a start tag that has already been consumed by
/// the caller. Used for simple `<tag>text</tag>` elements.
pub fn read_element_text<R: BufRead>(xml: &mut XmlReader<R>) -> Result<String, MetadataError> {
    let mut text = String::new();
    loop {
        match xml.next_event()? {
            Event::Text(t) => text.push_str(&decode_text(&t)?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Event::End(_) => break,
            Event::Eof => {
                return Err(MetadataError::new(
                    ErrorKind::XmlParse,
                    "unexpected EOF while reading element text",
                ))
            }
            _ => (),
        }
    }
    Ok(text)
}

/// Thin wrapper over `quick_xml::Writer` configured the way every wire format
/// in this crate is serialized: `indent=2`, UTF-8, XML declaration on.
pub struct XmlWriter<W: std::io::Write> {
    pub(crate) writer: Writer<W>,
}

impl<W: std::io::Write> XmlWriter<W> {
    pub fn new(inner: W) -> Self {
        XmlWriter {
            writer: Writer::new_with_indent(inner, b' ', 2),
        }
    }

    pub fn write_declaration(&mut self) -> Result<(), MetadataError> {
        self.writer.write_event(Event::Decl(quick_xml::events::BytesDecl::new(
            "1.0",
            Some("UTF-8"),
            None,
        )))?;
        Ok(())
    }

    pub fn write_event(&mut self, event: Event<'_>) -> Result<(), MetadataError> {
        self.writer.write_event(event)?;
        Ok(())
    }

    pub fn write_text_element(&mut self, name: &str, text: &str) -> Result<(), MetadataError> {
        self.writer
            .create_element(name)
            .write_text_content(BytesText::new(text))?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

/// Validates that a completed `<package>`'s pkgId is non-empty, raising the
/// format-specific fatal error kind otherwise.
pub fn require_pkgid(pkgid: &str, kind: ErrorKind) -> Result<(), MetadataError> {
    if pkgid.is_empty() {
        return Err(MetadataError::new(kind, "<package> is missing a pkgid"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn skip_tracks_nested_depth() {
        let xml = b"<a><b><c/></b></a>";
        let mut reader = XmlReader::new(Cursor::new(&xml[..]));
        // consume <a>
        reader.next_event().unwrap();
        // consume <b>, start skipping it
        let ev = reader.next_event().unwrap();
        assert!(matches!(ev, Event::Start(_)));
        reader.begin_skip();
        loop {
            let ev = reader.next_event().unwrap();
            if !reader.skip_step(&ev) {
                break;
            }
        }
        assert!(!reader.is_skipping());
    }

    #[test]
    fn wrap_snippet_adds_root_and_count() {
        let s = wrap_snippet("metadata", Some(1), "<package/>");
        assert!(s.contains(r#"packages="1""#));
        assert!(s.starts_with("<?xml"));
    }
}
