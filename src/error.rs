//! The closed error taxonomy carried through every fallible call in this
//! crate (component A). Every variant names a *kind* of failure rather than
//! wrapping a single upstream type, so that callers matching on `kind()` stay
//! stable even as the underlying codec/XML/SQLite crates change.

use std::fmt;
use std::path::PathBuf;

/// Closed enumeration of the kinds of failure this crate can report.
///
/// Mirrors the `cr_Error` domain from createrepo_c: every fallible operation
/// in this crate returns one of these kinds, optionally wrapping a
/// lower-level cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Memory,
    Stat,
    Database,
    BadArg,
    NoFile,
    NoDir,
    Exists,
    UnknownChecksumType,
    UnknownCompression,
    XmlParse,
    XmlBadData,
    CallbackInterrupted,
    BadPrimaryXml,
    BadFilelistsXml,
    BadOtherXml,
    BadUpdateInfoXml,
    Magic,
    Gz,
    Bz2,
    Xz,
    Zck,
    Crypto,
    Http,
    SpawnExitCode,
    SpawnKilled,
    SpawnStopped,
    SpawnAbnormal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Io => "I/O error",
            ErrorKind::Memory => "memory allocation failure",
            ErrorKind::Stat => "stat() failure",
            ErrorKind::Database => "database error",
            ErrorKind::BadArg => "invalid argument",
            ErrorKind::NoFile => "no such file",
            ErrorKind::NoDir => "no such directory",
            ErrorKind::Exists => "already exists",
            ErrorKind::UnknownChecksumType => "unknown checksum type",
            ErrorKind::UnknownCompression => "unknown compression type",
            ErrorKind::XmlParse => "XML parse error",
            ErrorKind::XmlBadData => "unexpected or malformed XML content",
            ErrorKind::CallbackInterrupted => "callback aborted the operation",
            ErrorKind::BadPrimaryXml => "malformed primary.xml",
            ErrorKind::BadFilelistsXml => "malformed filelists.xml",
            ErrorKind::BadOtherXml => "malformed other.xml",
            ErrorKind::BadUpdateInfoXml => "malformed updateinfo.xml",
            ErrorKind::Magic => "compression format detection failed",
            ErrorKind::Gz => "gzip codec error",
            ErrorKind::Bz2 => "bzip2 codec error",
            ErrorKind::Xz => "xz codec error",
            ErrorKind::Zck => "zchunk codec error",
            ErrorKind::Crypto => "checksum/digest error",
            ErrorKind::Http => "HTTP error",
            ErrorKind::SpawnExitCode => "subprocess exited with non-zero status",
            ErrorKind::SpawnKilled => "subprocess was killed by a signal",
            ErrorKind::SpawnStopped => "subprocess was stopped",
            ErrorKind::SpawnAbnormal => "subprocess terminated abnormally",
        };
        f.write_str(s)
    }
}

/// The error type returned by every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct MetadataError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl MetadataError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        MetadataError {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        kind: ErrorKind,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        MetadataError {
            kind,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Prefixes the message with a `path: element` location so a fatal
    /// parse error reads as "repodata/primary.xml: <package>: ...".
    pub fn at(self, path: &std::path::Path, element: &str) -> Self {
        MetadataError {
            kind: self.kind,
            message: format!("{}: <{}>: {}", path.display(), element, self.message),
            cause: self.cause,
        }
    }
}

pub fn missing_attribute(element: &'static str, attr: &'static str) -> MetadataError {
    MetadataError::new(
        ErrorKind::XmlBadData,
        format!("<{element}> is missing required attribute `{attr}`"),
    )
}

pub fn missing_field(element: &'static str) -> MetadataError {
    MetadataError::new(
        ErrorKind::XmlBadData,
        format!("missing required field `{element}`"),
    )
}

pub fn no_file(path: &std::path::Path) -> MetadataError {
    MetadataError::new(ErrorKind::NoFile, format!("no such file: {}", path.display()))
}

pub fn no_dir(path: &std::path::Path) -> MetadataError {
    MetadataError::new(ErrorKind::NoDir, format!("no such directory: {}", path.display()))
}

pub fn bad_arg(message: impl Into<String>) -> MetadataError {
    MetadataError::new(ErrorKind::BadArg, message)
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        MetadataError::with_cause(ErrorKind::Io, e.to_string(), e)
    }
}

impl From<quick_xml::Error> for MetadataError {
    fn from(e: quick_xml::Error) -> Self {
        MetadataError::with_cause(ErrorKind::XmlParse, e.to_string(), e)
    }
}

impl From<quick_xml::events::attributes::AttrError> for MetadataError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        MetadataError::with_cause(ErrorKind::XmlParse, e.to_string(), e)
    }
}

impl From<std::str::Utf8Error> for MetadataError {
    fn from(e: std::str::Utf8Error) -> Self {
        MetadataError::with_cause(ErrorKind::XmlBadData, e.to_string(), e)
    }
}

impl From<std::num::ParseIntError> for MetadataError {
    fn from(e: std::num::ParseIntError) -> Self {
        MetadataError::with_cause(ErrorKind::XmlBadData, e.to_string(), e)
    }
}

impl From<niffler::Error> for MetadataError {
    fn from(e: niffler::Error) -> Self {
        MetadataError::with_cause(ErrorKind::UnknownCompression, e.to_string(), e)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for MetadataError {
    fn from(e: rusqlite::Error) -> Self {
        MetadataError::with_cause(ErrorKind::Database, e.to_string(), e)
    }
}

#[cfg(feature = "read_rpm")]
impl From<rpm::Error> for MetadataError {
    fn from(e: rpm::Error) -> Self {
        MetadataError::with_cause(ErrorKind::Io, e.to_string(), e)
    }
}

/// Path used when an error couldn't be attributed to a specific file (e.g.
/// in-memory snippet parsing).
pub(crate) fn unknown_path() -> PathBuf {
    PathBuf::from("<memory>")
}
