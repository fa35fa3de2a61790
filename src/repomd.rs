//! `repomd.xml` model, parser, writer, and record lifecycle (components H
//! and I). A [`RepomdData`] is the manifest of a repository build: a
//! revision string, optional `<tags>`, and one [`RepomdRecord`] per metadata
//! file, keyed by its `type` attribute (`primary`, `filelists_db`, ...).

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, BytesText, Event};

use crate::checksum::{checksum_file, hash_bytes, Checksum, ChecksumType};
use crate::compress::{detect_compression, CompressedReader, CompressedWriter, CompressionType};
use crate::error::{ErrorKind, MetadataError};
use crate::xml_common::{get_attribute, read_element_text, XmlReader, XmlWriter, XML_NS_REPO, XML_NS_RPM};

const TAG_REPOMD: &[u8] = b"repomd";
const TAG_REVISION: &[u8] = b"revision";
const TAG_TAGS: &[u8] = b"tags";
const TAG_DATA: &[u8] = b"data";
const TAG_REPO: &[u8] = b"repo";
const TAG_CONTENT: &[u8] = b"content";
const TAG_DISTRO: &[u8] = b"distro";
const TAG_LOCATION: &[u8] = b"location";
const TAG_CHECKSUM: &[u8] = b"checksum";
const TAG_OPEN_CHECKSUM: &[u8] = b"open-checksum";
const TAG_HEADER_CHECKSUM: &[u8] = b"header-checksum";
const TAG_TIMESTAMP: &[u8] = b"timestamp";
const TAG_SIZE: &[u8] = b"size";
const TAG_OPEN_SIZE: &[u8] = b"open-size";
const TAG_HEADER_SIZE: &[u8] = b"header-size";
const TAG_DATABASE_VERSION: &[u8] = b"database_version";

/// A `<distro cpeid="...">name</distro>` tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistroTag {
    pub name: String,
    pub cpeid: Option<String>,
}

/// The parsed/in-progress manifest of a repository build.
#[derive(Debug, Clone, Default)]
pub struct RepomdData {
    revision: Option<String>,
    repo_tags: Vec<String>,
    content_tags: Vec<String>,
    distro_tags: Vec<DistroTag>,
    records: IndexMap<String, RepomdRecord>,
}

impl RepomdData {
    pub fn new() -> Self {
        RepomdData::default()
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn set_revision(&mut self, revision: impl Into<String>) {
        self.revision = Some(revision.into());
    }

    pub fn repo_tags(&self) -> &[String] {
        &self.repo_tags
    }

    pub fn add_repo_tag(&mut self, repo: impl Into<String>) {
        self.repo_tags.push(repo.into());
    }

    pub fn content_tags(&self) -> &[String] {
        &self.content_tags
    }

    pub fn add_content_tag(&mut self, content: impl Into<String>) {
        self.content_tags.push(content.into());
    }

    pub fn distro_tags(&self) -> &[DistroTag] {
        &self.distro_tags
    }

    pub fn add_distro_tag(&mut self, name: impl Into<String>, cpeid: Option<String>) {
        self.distro_tags.push(DistroTag { name: name.into(), cpeid });
    }

    /// Replaces any previous record of the same type.
    pub fn set_record(&mut self, record: RepomdRecord) {
        self.records.insert(record.metadata_name.clone(), record);
    }

    pub fn remove_record(&mut self, metadata_name: &str) -> Option<RepomdRecord> {
        self.records.shift_remove(metadata_name)
    }

    pub fn get_record(&self, metadata_name: &str) -> Option<&RepomdRecord> {
        self.records.get(metadata_name)
    }

    pub fn records(&self) -> impl Iterator<Item = &RepomdRecord> {
        self.records.values()
    }
}

/// One `<data type="...">` entry: a single metadata file's location,
/// checksums, sizes, and (for SQLite files) schema version.
///
/// Invariants: once published in a repomd, `location_href` and `checksum`
/// are immutable; renaming keeps `location_real` (on disk) and
/// `location_href` (as it appears in the manifest) in lockstep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepomdRecord {
    pub metadata_name: String,
    /// Path to the file on disk, mutated in place by `rename_file` and
    /// `compress_and_fill`. Empty for a record freshly parsed out of an
    /// existing `repomd.xml`, until the repository locator resolves it.
    pub location_real: PathBuf,
    /// Path as it appears (or will appear) in the manifest.
    pub location_href: PathBuf,
    pub location_base: Option<String>,
    pub timestamp: i64,
    pub size: Option<u64>,
    pub checksum: Checksum,
    pub open_size: Option<u64>,
    pub open_checksum: Option<Checksum>,
    pub header_size: Option<u64>,
    pub header_checksum: Option<Checksum>,
    pub database_version: Option<u32>,
}

impl RepomdRecord {
    pub fn new(metadata_name: impl Into<String>, location_real: PathBuf, location_href: PathBuf) -> Self {
        RepomdRecord {
            metadata_name: metadata_name.into(),
            location_real,
            location_href,
            ..Default::default()
        }
    }

    /// Fills in `size`/`timestamp`/`checksum` from `location_real`'s raw
    /// on-disk bytes, then drains it through an auto-detecting decompressing
    /// stream to compute `open_size`/`open_checksum`.
    pub fn fill(&mut self, checksum_type: ChecksumType) -> Result<(), MetadataError> {
        let metadata = fs::metadata(&self.location_real).map_err(|e| {
            MetadataError::with_cause(
                ErrorKind::Stat,
                format!("stat {}", self.location_real.display()),
                e,
            )
        })?;
        self.size = Some(metadata.len());
        self.timestamp = mtime_secs(&metadata);
        self.checksum = checksum_file(&self.location_real, checksum_type)?;

        let mut reader =
            CompressedReader::open_with_stats(&self.location_real, CompressionType::AutoDetect, Some(checksum_type))?;
        reader.drain()?;
        let stats = reader
            .close()
            .expect("a checksum type was passed to open_with_stats, so a stats sink is attached");
        self.open_size = Some(stats.size());
        self.open_checksum = stats.checksum().cloned();

        // Step 5: zchunk header checksum. Our Zchunk codec is a single-chunk
        // zstd stream (see compress.rs), which has no independently
        // seekable header region the way real zchunk does; we checksum the
        // fixed-width zstd frame magic number as a stand-in.
        if detect_compression(&self.location_real)? == CompressionType::Zchunk {
            const ZSTD_MAGIC_LEN: usize = 4;
            let raw = fs::read(&self.location_real)?;
            let header_len = ZSTD_MAGIC_LEN.min(raw.len());
            self.header_checksum = Some(hash_bytes(&raw[..header_len], checksum_type)?);
            self.header_size = Some(header_len as u64);
        }

        Ok(())
    }

    /// Prepends the compressed-bytes checksum and a hyphen to
    /// `location_real`'s basename, renames the file in place, and updates
    /// `location_real`/`location_href` to match. A no-op if the basename is
    /// already prefixed with this record's checksum.
    pub fn rename_file(&mut self) -> Result<(), MetadataError> {
        if self.checksum.value.is_empty() {
            return Err(MetadataError::new(
                ErrorKind::BadArg,
                "rename_file called before fill() computed a checksum",
            ));
        }

        let old_name = self
            .location_real
            .file_name()
            .ok_or_else(|| MetadataError::new(ErrorKind::BadArg, "location_real has no file name"))?
            .to_string_lossy()
            .into_owned();

        let prefix = format!("{}-", self.checksum.value);
        if old_name.starts_with(&prefix) {
            return Ok(());
        }

        let new_name = format!("{prefix}{old_name}");
        let new_real = self.location_real.with_file_name(&new_name);
        fs::rename(&self.location_real, &new_real)?;

        self.location_href = self.location_href.with_file_name(&new_name);
        self.location_real = new_real;
        Ok(())
    }

    /// Fills `self` from the plain file at `location_real`, compresses it
    /// into a new file alongside it with `kind`'s suffix, and fills
    /// `companion` from that output — used for the `group`/`group_gz`
    /// duality.
    pub fn compress_and_fill(
        &mut self,
        companion: &mut RepomdRecord,
        algorithm: ChecksumType,
        kind: CompressionType,
        zck_dict_dir: Option<&Path>,
    ) -> Result<(), MetadataError> {
        self.fill(algorithm)?;

        let dict = match (kind, zck_dict_dir) {
            (CompressionType::Zchunk, Some(dir)) => {
                fs::read(dir.join(format!("{}.zdict", self.metadata_name))).ok()
            }
            _ => None,
        };

        let (compressed_path, mut writer) = CompressedWriter::create(&self.location_real, kind)?;
        if let Some(dict) = dict {
            writer.set_dict(dict)?;
        }
        let raw = fs::read(&self.location_real)?;
        writer.write_all(&raw)?;
        writer.close()?;

        let compressed_name = compressed_path
            .file_name()
            .expect("CompressedWriter::create returns a path with a file name")
            .to_owned();
        companion.location_real = compressed_path;
        companion.location_href = self.location_href.with_file_name(&compressed_name);
        companion.fill(algorithm)?;

        Ok(())
    }
}

fn mtime_secs(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Parses a complete `repomd.xml` document.
pub fn parse_file<R: BufRead>(reader: R) -> Result<RepomdData, MetadataError> {
    let mut xml = XmlReader::new(reader);
    let mut repomd = RepomdData::default();

    loop {
        match xml.next_event()? {
            Event::Start(e) if e.name().as_ref() == TAG_REPOMD => (),
            Event::Start(e) if e.name().as_ref() == TAG_REVISION => {
                let revision = read_element_text(&mut xml)?;
                repomd.set_revision(revision);
            }
            Event::Start(e) if e.name().as_ref() == TAG_DATA => {
                let record = parse_repomdrecord(&mut xml, &e)?;
                repomd.set_record(record);
            }
            Event::Start(e) if e.name().as_ref() == TAG_TAGS => {
                parse_tags(&mut xml, &mut repomd)?;
            }
            Event::Eof => break,
            _ => (),
        }
    }

    Ok(repomd)
}

fn parse_tags<R: BufRead>(xml: &mut XmlReader<R>, repomd: &mut RepomdData) -> Result<(), MetadataError> {
    loop {
        match xml.next_event()? {
            Event::Start(e) if e.name().as_ref() == TAG_DISTRO => {
                let cpeid = get_attribute(&e, b"cpeid")?;
                let name = read_element_text(xml)?;
                repomd.add_distro_tag(name, cpeid);
            }
            Event::Start(e) if e.name().as_ref() == TAG_REPO => {
                let repo = read_element_text(xml)?;
                repomd.add_repo_tag(repo);
            }
            Event::Start(e) if e.name().as_ref() == TAG_CONTENT => {
                let content = read_element_text(xml)?;
                repomd.add_content_tag(content);
            }
            Event::End(e) if e.name().as_ref() == TAG_TAGS => break,
            Event::Eof => {
                return Err(MetadataError::new(ErrorKind::XmlBadData, "unexpected EOF in <tags>"))
            }
            _ => (),
        }
    }
    Ok(())
}

fn parse_checksum<R: BufRead>(xml: &mut XmlReader<R>, open_tag: &BytesStart<'_>) -> Result<Checksum, MetadataError> {
    let checksum_type = get_attribute(open_tag, b"type")?
        .ok_or_else(|| MetadataError::new(ErrorKind::XmlBadData, "<checksum> is missing attribute `type`"))?;
    let value = read_element_text(xml)?;
    Checksum::try_create(checksum_type, value)
}

fn parse_repomdrecord<R: BufRead>(
    xml: &mut XmlReader<R>,
    open_tag: &BytesStart<'_>,
) -> Result<RepomdRecord, MetadataError> {
    let metadata_name = get_attribute(open_tag, b"type")?
        .ok_or_else(|| MetadataError::new(ErrorKind::XmlBadData, "<data> is missing attribute `type`"))?;

    let mut record = RepomdRecord {
        metadata_name,
        ..Default::default()
    };

    loop {
        match xml.next_event()? {
            Event::Start(e) if e.name().as_ref() == TAG_CHECKSUM => {
                record.checksum = parse_checksum(xml, &e)?;
            }
            Event::Start(e) if e.name().as_ref() == TAG_OPEN_CHECKSUM => {
                record.open_checksum = Some(parse_checksum(xml, &e)?);
            }
            Event::Start(e) if e.name().as_ref() == TAG_HEADER_CHECKSUM => {
                record.header_checksum = Some(parse_checksum(xml, &e)?);
            }
            Event::Start(e) if e.name().as_ref() == TAG_LOCATION => {
                let href = get_attribute(&e, b"href")?
                    .ok_or_else(|| MetadataError::new(ErrorKind::XmlBadData, "<location> is missing attribute `href`"))?;
                record.location_base = get_attribute(&e, b"xml:base")?;
                record.location_href = PathBuf::from(href);
            }
            Event::Start(e) if e.name().as_ref() == TAG_TIMESTAMP => {
                record.timestamp = read_element_text(xml)?.parse()?;
            }
            Event::Start(e) if e.name().as_ref() == TAG_SIZE => {
                record.size = Some(read_element_text(xml)?.parse()?);
            }
            Event::Start(e) if e.name().as_ref() == TAG_OPEN_SIZE => {
                record.open_size = Some(read_element_text(xml)?.parse()?);
            }
            Event::Start(e) if e.name().as_ref() == TAG_HEADER_SIZE => {
                record.header_size = Some(read_element_text(xml)?.parse()?);
            }
            Event::Start(e) if e.name().as_ref() == TAG_DATABASE_VERSION => {
                record.database_version = Some(read_element_text(xml)?.parse()?);
            }
            Event::End(e) if e.name().as_ref() == TAG_DATA => break,
            Event::Eof => {
                return Err(MetadataError::new(ErrorKind::XmlBadData, "unexpected EOF in <data>"))
            }
            _ => (),
        }
    }

    if record.checksum.checksum_type == ChecksumType::Unknown && record.checksum.value.is_empty() {
        return Err(MetadataError::new(
            ErrorKind::XmlBadData,
            format!("<data type=\"{}\"> is missing a <checksum>", record.metadata_name),
        ));
    }

    Ok(record)
}

/// Serializes `repomd` as a complete `repomd.xml` document, in a
/// deterministic attribute order.
pub fn write_file<W: Write>(writer: W, repomd: &RepomdData) -> Result<W, MetadataError> {
    let mut xml = XmlWriter::new(writer);
    xml.write_declaration()?;

    let mut repomd_tag = BytesStart::new("repomd");
    repomd_tag.push_attribute(("xmlns", XML_NS_REPO));
    repomd_tag.push_attribute(("xmlns:rpm", XML_NS_RPM));
    xml.write_event(Event::Start(repomd_tag.clone()))?;

    let revision = match repomd.revision() {
        Some(r) => r.to_owned(),
        None => current_unix_time().to_string(),
    };
    xml.write_text_element("revision", &revision)?;

    write_tags(&mut xml, repomd)?;
    for record in repomd.records() {
        write_data(&mut xml, record)?;
    }

    xml.write_event(Event::End(repomd_tag.to_end()))?;
    xml.write_event(Event::Text(BytesText::new("\n")))?;
    Ok(xml.into_inner())
}

fn current_unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn write_tags<W: Write>(xml: &mut XmlWriter<W>, repomd: &RepomdData) -> Result<(), MetadataError> {
    let has_any =
        !repomd.repo_tags().is_empty() || !repomd.content_tags().is_empty() || !repomd.distro_tags().is_empty();
    if !has_any {
        return Ok(());
    }

    let tags_tag = BytesStart::new("tags");
    xml.write_event(Event::Start(tags_tag.clone()))?;

    for item in repomd.content_tags() {
        xml.write_text_element("content", item)?;
    }
    for item in repomd.repo_tags() {
        xml.write_text_element("repo", item)?;
    }
    for item in repomd.distro_tags() {
        let mut distro_tag = BytesStart::new("distro");
        if let Some(cpeid) = &item.cpeid {
            distro_tag.push_attribute(("cpeid", cpeid.as_str()));
        }
        xml.write_event(Event::Start(distro_tag.clone()))?;
        xml.write_event(Event::Text(BytesText::new(&item.name)))?;
        xml.write_event(Event::End(distro_tag.to_end()))?;
    }

    xml.write_event(Event::End(tags_tag.to_end()))?;
    Ok(())
}

fn write_data<W: Write>(xml: &mut XmlWriter<W>, record: &RepomdRecord) -> Result<(), MetadataError> {
    let mut data_tag = BytesStart::new("data");
    data_tag.push_attribute(("type", record.metadata_name.as_str()));
    xml.write_event(Event::Start(data_tag.clone()))?;

    write_checksum(xml, "checksum", &record.checksum)?;
    if let Some(open_checksum) = &record.open_checksum {
        write_checksum(xml, "open-checksum", open_checksum)?;
    }
    if let Some(header_checksum) = &record.header_checksum {
        write_checksum(xml, "header-checksum", header_checksum)?;
    }

    let mut location_tag = BytesStart::new("location");
    if let Some(base) = &record.location_base {
        location_tag.push_attribute(("xml:base", base.as_str()));
    }
    location_tag.push_attribute(("href", record.location_href.to_string_lossy().as_ref()));
    xml.write_event(Event::Empty(location_tag))?;

    xml.write_text_element("timestamp", &record.timestamp.to_string())?;

    if let Some(size) = record.size {
        xml.write_text_element("size", &size.to_string())?;
    }
    if let Some(open_size) = record.open_size {
        xml.write_text_element("open-size", &open_size.to_string())?;
    }
    if let Some(header_size) = record.header_size {
        xml.write_text_element("header-size", &header_size.to_string())?;
    }
    if let Some(database_version) = record.database_version {
        xml.write_text_element("database_version", &database_version.to_string())?;
    }

    xml.write_event(Event::End(data_tag.to_end()))?;
    Ok(())
}

fn write_checksum<W: Write>(xml: &mut XmlWriter<W>, tag: &str, checksum: &Checksum) -> Result<(), MetadataError> {
    let mut checksum_tag = BytesStart::new(tag);
    checksum_tag.push_attribute(("type", checksum.checksum_type.as_str()));
    xml.write_event(Event::Start(checksum_tag.clone()))?;
    xml.write_event(Event::Text(BytesText::new(&checksum.value)))?;
    xml.write_event(Event::End(checksum_tag.to_end()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1614969700</revision>
  <tags>
    <repo>Fedora</repo>
    <content>binary-x86_64</content>
    <distro cpeid="cpe:/o:fedoraproject:fedora:33">Fedora 33</distro>
  </tags>
  <data type="primary">
    <checksum type="sha256">afdc6dc379e58d097ed0b350536812bc6a604bbce50c5c109d8d98e28301dc4</checksum>
    <open-checksum type="sha256">bfdc6dc379e58d097ed0b350536812bc6a604bbce50c5c109d8d98e28301dc4</open-checksum>
    <location href="repodata/primary.xml.gz"/>
    <timestamp>1614969700</timestamp>
    <size>1234</size>
    <open-size>5678</open-size>
  </data>
  <data type="primary_db">
    <checksum type="sha256">cfdc6dc379e58d097ed0b350536812bc6a604bbce50c5c109d8d98e28301dc4</checksum>
    <location href="repodata/primary.sqlite.xz"/>
    <timestamp>1614969700</timestamp>
    <size>2345</size>
    <database_version>10</database_version>
  </data>
</repomd>"#;

    #[test]
    fn parses_tags_and_records() {
        let repomd = parse_file(SAMPLE.as_bytes()).unwrap();
        assert_eq!(repomd.revision(), Some("1614969700"));
        assert_eq!(repomd.repo_tags(), &["Fedora".to_owned()]);
        assert_eq!(repomd.content_tags(), &["binary-x86_64".to_owned()]);
        assert_eq!(repomd.distro_tags().len(), 1);
        assert_eq!(repomd.distro_tags()[0].cpeid.as_deref(), Some("cpe:/o:fedoraproject:fedora:33"));

        let primary = repomd.get_record("primary").unwrap();
        assert_eq!(primary.location_href, PathBuf::from("repodata/primary.xml.gz"));
        assert_eq!(primary.size, Some(1234));
        assert_eq!(primary.open_size, Some(5678));

        let primary_db = repomd.get_record("primary_db").unwrap();
        assert_eq!(primary_db.database_version, Some(10));
    }

    #[test]
    fn missing_checksum_is_fatal() {
        let xml = SAMPLE.replace(
            r#"<checksum type="sha256">afdc6dc379e58d097ed0b350536812bc6a604bbce50c5c109d8d98e28301dc4</checksum>"#,
            "",
        );
        let err = parse_file(xml.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::XmlBadData);
    }

    #[test]
    fn round_trip_through_write_and_parse() {
        let repomd = parse_file(SAMPLE.as_bytes()).unwrap();
        let mut buf = Vec::new();
        buf = write_file(buf, &repomd).unwrap();

        let reparsed = parse_file(buf.as_slice()).unwrap();
        assert_eq!(reparsed.revision(), repomd.revision());
        assert_eq!(reparsed.repo_tags(), repomd.repo_tags());
        assert_eq!(reparsed.records().count(), repomd.records().count());
        assert_eq!(
            reparsed.get_record("primary").unwrap().checksum,
            repomd.get_record("primary").unwrap().checksum
        );
    }

    #[test]
    fn fill_computes_size_and_checksums() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("primary.xml");
        let (final_path, mut writer) =
            CompressedWriter::create(&path, CompressionType::Gzip).unwrap();
        writer.write_all(b"<metadata/>").unwrap();
        writer.close().unwrap();

        let mut record = RepomdRecord::new("primary", final_path, PathBuf::from("repodata/primary.xml.gz"));
        record.fill(ChecksumType::Sha256).unwrap();

        assert!(record.size.unwrap() > 0);
        assert_eq!(record.open_size, Some(11));
        assert_eq!(record.checksum.checksum_type, ChecksumType::Sha256);
        assert_eq!(record.open_checksum.unwrap().checksum_type, ChecksumType::Sha256);
    }

    #[test]
    fn rename_file_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("primary.xml");
        let (final_path, mut writer) =
            CompressedWriter::create(&path, CompressionType::Gzip).unwrap();
        writer.write_all(b"<metadata/>").unwrap();
        writer.close().unwrap();

        let mut record = RepomdRecord::new("primary", final_path, PathBuf::from("repodata/primary.xml.gz"));
        record.fill(ChecksumType::Sha256).unwrap();
        let digest = record.checksum.value.clone();

        record.rename_file().unwrap();
        let expected_name = format!("{digest}-primary.xml.gz");
        assert_eq!(record.location_real.file_name().unwrap().to_str().unwrap(), expected_name);
        assert_eq!(
            record.location_href.file_name().unwrap().to_str().unwrap(),
            expected_name
        );
        assert!(record.location_real.exists());

        let real_before = record.location_real.clone();
        record.rename_file().unwrap();
        assert_eq!(record.location_real, real_before);
    }
}
