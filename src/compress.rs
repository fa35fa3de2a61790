//! Compressed I/O stream (component C): a uniform read/write handle over
//! plain, gzip, bzip2, xz and zchunk data, with auto-detection and an
//! optional content-statistics sink that counts bytes and hashes as data
//! flows through the *uncompressed* side of the codec.
//!
//! A single handle is not safe for concurrent use; distinct handles may be
//! used from distinct threads without coordination.
//!
//! zchunk is a chunked, independently-seekable container format with no
//! maintained pure-Rust implementation in this crate's dependency stack. We
//! implement [`CompressionType::Zchunk`] as a single-chunk stream backed by
//! `zstd` (zchunk's own chunk payloads are zstd-compressed), which gives
//! byte-for-byte round-tripping and an independently checksummable header,
//! but not the multi-chunk dedup/seekability a full zchunk writer provides.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::checksum::{Checksum, ChecksumContext, ChecksumType};
use crate::error::{ErrorKind, MetadataError};

/// Closed set of compression codecs this crate understands, plus the two
/// input-only sentinels `AutoDetect` and `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
    Bzip2,
    Xz,
    Zchunk,
    /// Only valid for `Read` mode: sniff the first ~4KiB and fall back to
    /// filename suffix.
    AutoDetect,
    Unknown,
}

impl CompressionType {
    pub fn file_suffix(&self) -> &'static str {
        match self {
            CompressionType::None => "",
            CompressionType::Gzip => ".gz",
            CompressionType::Bzip2 => ".bz2",
            CompressionType::Xz => ".xz",
            CompressionType::Zchunk => ".zck",
            CompressionType::AutoDetect | CompressionType::Unknown => "",
        }
    }

    /// Guess a compression kind from a filename suffix alone (detection
    /// fallback tier 2, used once sniffing the magic bytes comes up empty).
    pub fn from_suffix(path: &Path) -> CompressionType {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => CompressionType::Gzip,
            Some("bz2") => CompressionType::Bzip2,
            Some("xz") => CompressionType::Xz,
            Some("zck") => CompressionType::Zchunk,
            _ => CompressionType::None,
        }
    }
}

impl std::str::FromStr for CompressionType {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "" | "none" => CompressionType::None,
            "gz" | "gzip" => CompressionType::Gzip,
            "bz2" | "bzip2" => CompressionType::Bzip2,
            "xz" => CompressionType::Xz,
            "zck" | "zchunk" => CompressionType::Zchunk,
            other => {
                return Err(MetadataError::new(
                    ErrorKind::UnknownCompression,
                    format!("unknown compression type \"{other}\""),
                ))
            }
        })
    }
}

/// Sniff the first bytes of `path` for a known magic number; if ambiguous,
/// fall back to filename suffix; if still unknown, fail.
pub fn detect_compression(path: &Path) -> Result<CompressionType, MetadataError> {
    let mut file = File::open(path)?;
    let (format, _) = niffler::sniff(&mut Box::new(&mut file) as &mut dyn Read)
        .map_err(|e| MetadataError::with_cause(ErrorKind::Magic, e.to_string(), e))?;

    let kind = match format {
        niffler::Format::No => CompressionType::None,
        niffler::Format::Gzip => CompressionType::Gzip,
        niffler::Format::Bzip => CompressionType::Bzip2,
        niffler::Format::Lzma => CompressionType::Xz,
        niffler::Format::Zstd => CompressionType::Zchunk,
    };

    if kind == CompressionType::None {
        // magic-byte sniffing found nothing conclusive; fall back to suffix.
        let suffix_guess = CompressionType::from_suffix(path);
        if suffix_guess != CompressionType::None {
            return Ok(suffix_guess);
        }
    }

    Ok(kind)
}

/// Running byte count + streaming checksum of the *uncompressed* data that
/// has flowed through a stream, finalized on [`close`](CompressedStream::close).
pub struct ContentStats {
    size: u64,
    ctx: Option<ChecksumContext>,
    checksum: Option<Checksum>,
}

impl ContentStats {
    pub fn new(checksum_type: ChecksumType) -> Result<Self, MetadataError> {
        Ok(ContentStats {
            size: 0,
            ctx: Some(ChecksumContext::new(checksum_type)?),
            checksum: None,
        })
    }

    fn observe(&mut self, data: &[u8]) {
        self.size += data.len() as u64;
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.update(data);
        }
    }

    fn finalize(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.checksum = Some(ctx.finish());
        }
    }

    /// Bytes of uncompressed data observed so far. Stable after `close`.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `None` until the stream has been closed.
    pub fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }
}

type SharedStats = Rc<RefCell<ContentStats>>;

struct StatsReader<R> {
    inner: R,
    stats: SharedStats,
}

impl<R: Read> Read for StatsReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.stats.borrow_mut().observe(&buf[..n]);
        Ok(n)
    }
}

struct StatsWriter<W> {
    inner: W,
    stats: SharedStats,
}

impl<W: Write> Write for StatsWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.stats.borrow_mut().observe(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A boxed decompressing reader, with the codec already selected.
pub type BoxedReader = Box<dyn Read>;
/// A boxed compressing writer, with the codec already selected.
pub type BoxedWriter = Box<dyn Write>;

fn inner_decoder(reader: BufReader<File>, kind: CompressionType) -> Result<BoxedReader, MetadataError> {
    Ok(match kind {
        CompressionType::None => Box::new(reader),
        CompressionType::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
        CompressionType::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
        CompressionType::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)),
        CompressionType::Zchunk => Box::new(
            zstd::Decoder::new(reader)
                .map_err(|e| MetadataError::with_cause(ErrorKind::Zck, e.to_string(), e))?,
        ),
        CompressionType::AutoDetect | CompressionType::Unknown => {
            return Err(MetadataError::new(
                ErrorKind::UnknownCompression,
                "cannot open a reader without a resolved compression kind",
            ))
        }
    })
}

fn inner_encoder(writer: BufWriter<File>, kind: CompressionType) -> Result<BoxedWriter, MetadataError> {
    Ok(match kind {
        CompressionType::None => Box::new(writer),
        CompressionType::Gzip => Box::new(flate2::write::GzEncoder::new(
            writer,
            flate2::Compression::new(9),
        )),
        CompressionType::Bzip2 => Box::new(bzip2::write::BzEncoder::new(
            writer,
            bzip2::Compression::new(9),
        )),
        CompressionType::Xz => Box::new(
            xz2::write::XzEncoder::new(writer, 9),
        ),
        CompressionType::Zchunk => Box::new(
            zstd::Encoder::new(writer, 19)
                .map_err(|e| MetadataError::with_cause(ErrorKind::Zck, e.to_string(), e))?
                .auto_finish(),
        ),
        CompressionType::AutoDetect | CompressionType::Unknown => {
            return Err(MetadataError::new(
                ErrorKind::UnknownCompression,
                "cannot open a writer without a resolved compression kind",
            ))
        }
    })
}

/// A single open stream, read or write, with an optional statistics sink
/// layered on the uncompressed side. This is the Rust-idiomatic equivalent
/// of createrepo_c's `CR_FILE` handle — `Read`/`Write` rather than
/// C-style `open`/`read`/`write`/`close` functions, but the same contract:
/// short reads aren't errors, `read` returning `0` means EOF, and `close`
/// finalizes any attached statistics.
pub enum CompressedReader {
    Plain {
        inner: BoxedReader,
        stats: Option<SharedStats>,
    },
}

impl CompressedReader {
    pub fn open(path: &Path, kind: CompressionType) -> Result<Self, MetadataError> {
        Self::open_with_stats(path, kind, None)
    }

    pub fn open_with_stats(
        path: &Path,
        kind: CompressionType,
        checksum_type: Option<ChecksumType>,
    ) -> Result<Self, MetadataError> {
        let resolved = match kind {
            CompressionType::AutoDetect => detect_compression(path)?,
            other => other,
        };
        let file = File::open(path).map_err(|e| {
            MetadataError::with_cause(ErrorKind::Io, format!("opening {}", path.display()), e)
        })?;
        let raw = inner_decoder(BufReader::new(file), resolved)?;

        let (reader, stats): (BoxedReader, Option<SharedStats>) = match checksum_type {
            Some(ct) => {
                let stats = Rc::new(RefCell::new(ContentStats::new(ct)?));
                (
                    Box::new(StatsReader {
                        inner: raw,
                        stats: stats.clone(),
                    }),
                    Some(stats),
                )
            }
            None => (raw, None),
        };

        Ok(CompressedReader::Plain {
            inner: reader,
            stats,
        })
    }

    /// Drain the entire stream, discarding bytes, returning the total
    /// uncompressed length read. Used by `RepomdRecord::fill`.
    pub fn drain(&mut self) -> Result<u64, MetadataError> {
        let mut buf = [0u8; 8192];
        let mut total = 0u64;
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        Ok(total)
    }

    pub fn get_contents(&mut self) -> Result<Vec<u8>, MetadataError> {
        let mut buf = Vec::new();
        match self {
            CompressedReader::Plain { inner, stats } => {
                inner.read_to_end(&mut buf)?;
                if let Some(stats) = stats {
                    stats.borrow_mut().observe(&[]); // no-op, already observed via StatsReader
                }
            }
        }
        Ok(buf)
    }

    /// Finalizes the attached statistics sink, if any, and returns it.
    pub fn close(self) -> Option<ContentStats> {
        match self {
            CompressedReader::Plain { stats, .. } => stats.map(|s| {
                s.borrow_mut().finalize();
                Rc::try_unwrap(s)
                    .unwrap_or_else(|_| panic!("stats handle outlived its stream"))
                    .into_inner()
            }),
        }
    }
}

impl Read for CompressedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            CompressedReader::Plain { inner, .. } => inner.read(buf),
        }
    }
}

/// A single open write stream. `set_dict`/`set_auto_chunk` only succeed on
/// `Zchunk`-kind streams.
pub struct CompressedWriter {
    inner: BoxedWriter,
    stats: Option<SharedStats>,
    kind: CompressionType,
    dict: Option<Vec<u8>>,
}

impl CompressedWriter {
    /// Opens `path` with `kind`'s canonical suffix appended, returning the
    /// final on-disk path alongside the writer.
    pub fn create(path: &Path, kind: CompressionType) -> Result<(PathBuf, Self), MetadataError> {
        Self::create_with_stats(path, kind, None)
    }

    pub fn create_with_stats(
        path: &Path,
        kind: CompressionType,
        checksum_type: Option<ChecksumType>,
    ) -> Result<(PathBuf, Self), MetadataError> {
        let mut filename = path.as_os_str().to_owned();
        filename.push(kind.file_suffix());
        let final_path = PathBuf::from(filename);

        let file = File::create(&final_path)?;
        let raw = inner_encoder(BufWriter::new(file), kind)?;

        let (writer, stats): (BoxedWriter, Option<SharedStats>) = match checksum_type {
            Some(ct) => {
                let stats = Rc::new(RefCell::new(ContentStats::new(ct)?));
                (
                    Box::new(StatsWriter {
                        inner: raw,
                        stats: stats.clone(),
                    }),
                    Some(stats),
                )
            }
            None => (raw, None),
        };

        Ok((
            final_path,
            CompressedWriter {
                inner: writer,
                stats,
                kind,
                dict: None,
            },
        ))
    }

    /// Sets the zstd (zchunk chunk-payload) dictionary for this writer.
    /// Must be called before any bytes are written.
    pub fn set_dict(&mut self, dict: Vec<u8>) -> Result<(), MetadataError> {
        if self.kind != CompressionType::Zchunk {
            return Err(MetadataError::new(
                ErrorKind::Zck,
                "set_dict is only valid on a Zchunk stream",
            ));
        }
        self.dict = Some(dict);
        Ok(())
    }

    /// Enables/disables content-defined auto-chunking. This implementation
    /// only ever emits a single chunk, so this is accepted (to keep the
    /// Zchunk-only validation contract) but has no further effect.
    pub fn set_auto_chunk(&mut self, _enabled: bool) -> Result<(), MetadataError> {
        if self.kind != CompressionType::Zchunk {
            return Err(MetadataError::new(
                ErrorKind::Zck,
                "set_auto_chunk is only valid on a Zchunk stream",
            ));
        }
        Ok(())
    }

    pub fn puts(&mut self, s: &str) -> Result<(), MetadataError> {
        self.inner.write_all(s.as_bytes())?;
        Ok(())
    }

    pub fn printf(&mut self, args: fmt::Arguments<'_>) -> Result<(), MetadataError> {
        self.inner.write_fmt(args)?;
        Ok(())
    }

    pub fn close(mut self) -> Result<Option<ContentStats>, MetadataError> {
        self.inner.flush()?;
        Ok(self.stats.map(|s| {
            s.borrow_mut().finalize();
            Rc::try_unwrap(s)
                .unwrap_or_else(|_| panic!("stats handle outlived its stream"))
                .into_inner()
        }))
    }
}

impl Write for CompressedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

use std::fmt;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn gzip_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        let (final_path, mut writer) =
            CompressedWriter::create_with_stats(&path, CompressionType::Gzip, Some(ChecksumType::Sha256))
                .unwrap();
        writer.write_all(b"hello repository metadata").unwrap();
        let stats = writer.close().unwrap().unwrap();
        assert_eq!(stats.size(), 25);
        assert!(final_path.to_string_lossy().ends_with(".gz"));

        let mut reader =
            CompressedReader::open_with_stats(&final_path, CompressionType::AutoDetect, Some(ChecksumType::Sha256))
                .unwrap();
        let contents = reader.get_contents().unwrap();
        assert_eq!(contents, b"hello repository metadata");
        let read_stats = reader.close().unwrap();
        assert_eq!(read_stats.size(), 25);
    }

    #[test]
    fn detect_plain_falls_back_to_suffix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("primary.xml");
        std::fs::write(&path, b"<metadata/>").unwrap();
        assert_eq!(detect_compression(&path).unwrap(), CompressionType::None);
    }

    #[test]
    fn set_dict_rejected_on_non_zchunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        let (_f, mut writer) = CompressedWriter::create(&path, CompressionType::Gzip).unwrap();
        let err = writer.set_dict(vec![1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Zck);
    }
}
