//! `primary.xml` parser and writer (component F).

use std::io::{BufRead, Write};

use quick_xml::events::{BytesStart, BytesText, Event};

use crate::checksum::Checksum;
use crate::error::{ErrorKind, MetadataError};
use crate::package::{FileType, HeaderRange, Package, PackageFile, Requirement, RequirementType};
use crate::utils::Evr;
use crate::xml_common::{
    get_attribute, get_attribute_warn, read_element_text, require_pkgid, wrap_snippet,
    NewPkgCallback, ParseWarning, PkgCompleteCallback, WarningCallback, WarningKind, XmlReader,
    XmlWriter, XML_NS_COMMON, XML_NS_RPM,
};

const TAG_METADATA: &[u8] = b"metadata";
const TAG_PACKAGE: &[u8] = b"package";
const TAG_NAME: &[u8] = b"name";
const TAG_ARCH: &[u8] = b"arch";
const TAG_VERSION: &[u8] = b"version";
const TAG_CHECKSUM: &[u8] = b"checksum";
const TAG_SUMMARY: &[u8] = b"summary";
const TAG_DESCRIPTION: &[u8] = b"description";
const TAG_PACKAGER: &[u8] = b"packager";
const TAG_URL: &[u8] = b"url";
const TAG_TIME: &[u8] = b"time";
const TAG_SIZE: &[u8] = b"size";
const TAG_LOCATION: &[u8] = b"location";
const TAG_FORMAT: &[u8] = b"format";
const TAG_RPM_LICENSE: &[u8] = b"rpm:license";
const TAG_RPM_VENDOR: &[u8] = b"rpm:vendor";
const TAG_RPM_GROUP: &[u8] = b"rpm:group";
const TAG_RPM_BUILDHOST: &[u8] = b"rpm:buildhost";
const TAG_RPM_SOURCERPM: &[u8] = b"rpm:sourcerpm";
const TAG_RPM_HEADER_RANGE: &[u8] = b"rpm:header-range";
const TAG_RPM_PROVIDES: &[u8] = b"rpm:provides";
const TAG_RPM_REQUIRES: &[u8] = b"rpm:requires";
const TAG_RPM_CONFLICTS: &[u8] = b"rpm:conflicts";
const TAG_RPM_OBSOLETES: &[u8] = b"rpm:obsoletes";
const TAG_RPM_SUGGESTS: &[u8] = b"rpm:suggests";
const TAG_RPM_ENHANCES: &[u8] = b"rpm:enhances";
const TAG_RPM_RECOMMENDS: &[u8] = b"rpm:recommends";
const TAG_RPM_SUPPLEMENTS: &[u8] = b"rpm:supplements";
const TAG_RPM_ENTRY: &[u8] = b"rpm:entry";
const TAG_FILE: &[u8] = b"file";

/// The predicate primary uses to decide which files it's responsible for
/// when `do_files` is set — matched byte-for-byte against upstream,
/// including its apparent false positives (e.g. `/usr/share/recycle-bin/x`).
/// Do not "fix" this; it's part of the wire contract.
pub fn is_primary(path: &str) -> bool {
    path.starts_with("/etc/") || path == "/usr/lib/sendmail" || path.contains("bin/")
}

#[derive(Debug, Clone, Copy)]
pub struct PrimaryParseOptions {
    /// When false, `<file>` entries are skipped entirely (primary overlaps
    /// with filelists and the caller plans to merge). When true, only files
    /// passing [`is_primary`] are kept.
    pub do_files: bool,
}

impl Default for PrimaryParseOptions {
    fn default() -> Self {
        PrimaryParseOptions { do_files: false }
    }
}

/// Parses a full `primary.xml` document, invoking `new_pkg_cb` once per
/// pkgId and `pkg_cb` once per completed `<package>`. Returns the number of
/// packages the `<metadata packages="N">` header declared.
pub fn parse_file<R: BufRead>(
    reader: R,
    options: PrimaryParseOptions,
    new_pkg_cb: &mut NewPkgCallback<'_>,
    pkg_cb: &mut PkgCompleteCallback<'_>,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<usize, MetadataError> {
    let mut xml = XmlReader::new(reader);
    let mut declared_count = 0usize;

    loop {
        match xml.next_event()? {
            Event::Start(e) if e.name().as_ref() == TAG_METADATA => {
                if let Some(n) = get_attribute(&e, b"packages")? {
                    declared_count = n.parse().unwrap_or(0);
                }
            }
            Event::Start(e) if e.name().as_ref() == TAG_PACKAGE => {
                parse_one_package(&mut xml, &e, options, new_pkg_cb, pkg_cb, warning_cb)?;
            }
            Event::Eof => break,
            _ => (),
        }
    }

    Ok(declared_count)
}

/// Wraps `xml_string` in a `<metadata>` root and parses it the same way.
pub fn parse_snippet(
    xml_string: &str,
    options: PrimaryParseOptions,
    new_pkg_cb: &mut NewPkgCallback<'_>,
    pkg_cb: &mut PkgCompleteCallback<'_>,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<usize, MetadataError> {
    let wrapped = wrap_snippet("metadata", None, xml_string);
    parse_file(wrapped.as_bytes(), options, new_pkg_cb, pkg_cb, warning_cb)
}

/// Enum returned by [`parse_one_event`] distinguishing what the single event
/// (or `<package>` subtree) it consumed amounted to.
pub(crate) enum StepOutcome {
    Eof,
    PackageParsed,
    PackageSkipped,
    Other,
}

/// Consumes exactly one top-level event — a root header, a full `<package>`
/// subtree, or anything else — used by the merging iterator to drive this
/// format one package at a time instead of to completion.
pub(crate) fn parse_one_event<R: BufRead>(
    xml: &mut XmlReader<R>,
    options: PrimaryParseOptions,
    new_pkg_cb: &mut NewPkgCallback<'_>,
    pkg_cb: &mut PkgCompleteCallback<'_>,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<StepOutcome, MetadataError> {
    match xml.next_event()? {
        Event::Start(e) if e.name().as_ref() == TAG_METADATA => Ok(StepOutcome::Other),
        Event::Start(e) if e.name().as_ref() == TAG_PACKAGE => {
            if parse_one_package(xml, &e, options, new_pkg_cb, pkg_cb, warning_cb)? {
                Ok(StepOutcome::PackageParsed)
            } else {
                Ok(StepOutcome::PackageSkipped)
            }
        }
        Event::Eof => Ok(StepOutcome::Eof),
        _ => Ok(StepOutcome::Other),
    }
}

fn parse_one_package<R: BufRead>(
    xml: &mut XmlReader<R>,
    open_tag: &BytesStart<'_>,
    options: PrimaryParseOptions,
    new_pkg_cb: &mut NewPkgCallback<'_>,
    pkg_cb: &mut PkgCompleteCallback<'_>,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<bool, MetadataError> {
    let _ptype = get_attribute(open_tag, b"type")?;
    let mut package = Package::default();
    let mut announced = false;

    loop {
        match xml.next_event()? {
            Event::End(e) if e.name().as_ref() == TAG_PACKAGE => break,
            Event::Start(e) => {
                let name = e.name();
                match name.as_ref() {
                    TAG_NAME => {
                        package.name = read_element_text(xml)?;
                    }
                    TAG_ARCH => {
                        package.arch = read_element_text(xml)?;
                    }
                    TAG_VERSION => {
                        let epoch = get_attribute(&e, b"epoch")?.unwrap_or_default();
                        let version = get_attribute(&e, b"ver")?.unwrap_or_default();
                        let release = get_attribute(&e, b"rel")?.unwrap_or_default();
                        package.evr = Evr::new(epoch, version, release);
                    }
                    TAG_CHECKSUM => {
                        let checksum_type =
                            get_attribute_warn(&e, b"type", "checksum", "metadata/package/checksum", warning_cb)?;
                        let value = read_element_text(xml)?;
                        package.checksum = match checksum_type {
                            Some(t) => Checksum::try_create(t, value)?,
                            None => Checksum::new(crate::checksum::ChecksumType::Unknown, value),
                        };
                        if !announced {
                            announced = true;
                            let pkgid = package.checksum.value.clone();
                            match new_pkg_cb(&pkgid, &package.name, &package.arch)? {
                                Some(replacement) => package = replacement,
                                None => {
                                    skip_remaining_package(xml)?;
                                    return Ok(false);
                                }
                            }
                        }
                    }
                    TAG_SUMMARY => package.summary = read_element_text(xml)?,
                    TAG_DESCRIPTION => package.description = read_element_text(xml)?,
                    TAG_PACKAGER => package.packager = read_element_text(xml)?,
                    TAG_URL => package.url = read_element_text(xml)?,
                    TAG_TIME => {
                        package.time_file = parse_u64_attr(&e, b"file", warning_cb, "metadata/package/time")?;
                        package.time_build = parse_u64_attr(&e, b"build", warning_cb, "metadata/package/time")?;
                    }
                    TAG_SIZE => {
                        package.size_package = parse_u64_attr(&e, b"package", warning_cb, "metadata/package/size")?;
                        package.size_installed =
                            parse_u64_attr(&e, b"installed", warning_cb, "metadata/package/size")?;
                        package.size_archive = parse_u64_attr(&e, b"archive", warning_cb, "metadata/package/size")?;
                    }
                    TAG_LOCATION => {
                        package.location_href = get_attribute_warn(
                            &e,
                            b"href",
                            "location",
                            "metadata/package/location",
                            warning_cb,
                        )?
                        .unwrap_or_default();
                        package.location_base = get_attribute(&e, b"xml:base")?;
                    }
                    TAG_FORMAT => parse_format(xml, &mut package, options, warning_cb)?,
                    _ => {
                        warning_cb(ParseWarning::new(
                            WarningKind::UnknownTag,
                            "metadata/package",
                            String::from_utf8_lossy(name.as_ref()).into_owned(),
                        ))?;
                        xml.begin_skip();
                        loop {
                            let ev = xml.next_event()?;
                            if !xml.skip_step(&ev) {
                                break;
                            }
                        }
                    }
                }
            }
            Event::Eof => {
                return Err(MetadataError::new(ErrorKind::BadPrimaryXml, "unexpected EOF in <package>"))
            }
            _ => (),
        }
    }

    if !announced {
        // no <checksum> seen at all — still must fire new-pkg with what we have.
        let pkgid = package.checksum.value.clone();
        match new_pkg_cb(&pkgid, &package.name, &package.arch)? {
            Some(replacement) => package = replacement,
            None => return Ok(false),
        }
    }

    require_pkgid(package.pkgid(), ErrorKind::BadPrimaryXml)?;
    package.loaded.primary = true;
    pkg_cb(package)?;
    Ok(true)
}

fn skip_remaining_package<R: BufRead>(xml: &mut XmlReader<R>) -> Result<(), MetadataError> {
    let mut depth = 1u32;
    loop {
        match xml.next_event()? {
            Event::Start(_) => depth += 1,
            Event::End(e) if e.name().as_ref() == TAG_PACKAGE && depth == 1 => return Ok(()),
            Event::End(_) => depth -= 1,
            Event::Eof => return Ok(()),
            _ => (),
        }
    }
}

fn parse_u64_attr<R: BufRead>(
    e: &BytesStart<'_>,
    attr: &[u8],
    warning_cb: &mut WarningCallback<'_>,
    path: &str,
) -> Result<u64, MetadataError> {
    match get_attribute(e, attr)? {
        Some(v) => match v.parse() {
            Ok(n) => Ok(n),
            Err(_) => {
                warning_cb(ParseWarning::new(
                    WarningKind::BadAttrVal,
                    path,
                    format!("\"{v}\" is not a valid integer"),
                ))?;
                Ok(0)
            }
        },
        None => {
            warning_cb(ParseWarning::new(
                WarningKind::MissingAttr,
                path,
                format!("missing `{}`", String::from_utf8_lossy(attr)),
            ))?;
            Ok(0)
        }
    }
}

fn parse_format<R: BufRead>(
    xml: &mut XmlReader<R>,
    package: &mut Package,
    options: PrimaryParseOptions,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<(), MetadataError> {
    loop {
        match xml.next_event()? {
            Event::End(e) if e.name().as_ref() == TAG_FORMAT => break,
            Event::Start(e) => match e.name().as_ref() {
                TAG_RPM_LICENSE => package.rpm_license = read_element_text(xml)?,
                TAG_RPM_VENDOR => package.rpm_vendor = read_element_text(xml)?,
                TAG_RPM_GROUP => package.rpm_group = read_element_text(xml)?,
                TAG_RPM_BUILDHOST => package.rpm_buildhost = read_element_text(xml)?,
                TAG_RPM_SOURCERPM => package.rpm_sourcerpm = read_element_text(xml)?,
                TAG_RPM_HEADER_RANGE => {
                    let start = parse_u64_attr(&e, b"start", warning_cb, "metadata/package/format/rpm:header-range")?;
                    let end = parse_u64_attr(&e, b"end", warning_cb, "metadata/package/format/rpm:header-range")?;
                    package.rpm_header_range = HeaderRange { start, end };
                }
                TAG_RPM_PROVIDES => package.rpm_provides = parse_requirement_list(xml, TAG_RPM_PROVIDES)?,
                TAG_RPM_REQUIRES => package.rpm_requires = parse_requirement_list(xml, TAG_RPM_REQUIRES)?,
                TAG_RPM_CONFLICTS => package.rpm_conflicts = parse_requirement_list(xml, TAG_RPM_CONFLICTS)?,
                TAG_RPM_OBSOLETES => package.rpm_obsoletes = parse_requirement_list(xml, TAG_RPM_OBSOLETES)?,
                TAG_RPM_SUGGESTS => package.rpm_suggests = parse_requirement_list(xml, TAG_RPM_SUGGESTS)?,
                TAG_RPM_ENHANCES => package.rpm_enhances = parse_requirement_list(xml, TAG_RPM_ENHANCES)?,
                TAG_RPM_RECOMMENDS => package.rpm_recommends = parse_requirement_list(xml, TAG_RPM_RECOMMENDS)?,
                TAG_RPM_SUPPLEMENTS => package.rpm_supplements = parse_requirement_list(xml, TAG_RPM_SUPPLEMENTS)?,
                TAG_FILE => {
                    let filetype = match get_attribute(&e, b"type")? {
                        Some(t) => FileType::try_from(t.as_str()).unwrap_or_else(|_| {
                            let _ = warning_cb(ParseWarning::new(
                                WarningKind::UnknownVal,
                                "metadata/package/format/file",
                                format!("\"{t}\""),
                            ));
                            FileType::File
                        }),
                        None => FileType::File,
                    };
                    let path = read_element_text(xml)?;
                    if options.do_files {
                        if is_primary(&path) {
                            package.rpm_files.push(PackageFile::from_full_path(&path, filetype));
                        }
                    }
                }
                other => {
                    warning_cb(ParseWarning::new(
                        WarningKind::UnknownTag,
                        "metadata/package/format",
                        String::from_utf8_lossy(other).into_owned(),
                    ))?;
                    xml.begin_skip();
                    loop {
                        let ev = xml.next_event()?;
                        if !xml.skip_step(&ev) {
                            break;
                        }
                    }
                }
            },
            Event::Eof => {
                return Err(MetadataError::new(ErrorKind::BadPrimaryXml, "unexpected EOF in <format>"))
            }
            _ => (),
        }
    }
    Ok(())
}

fn parse_requirement_list<R: BufRead>(
    xml: &mut XmlReader<R>,
    closing_tag: &[u8],
) -> Result<Vec<Requirement>, MetadataError> {
    let mut list = Vec::new();
    loop {
        match xml.next_event()? {
            Event::Empty(e) | Event::Start(e) if e.name().as_ref() == TAG_RPM_ENTRY => {
                let name = get_attribute(&e, b"name")?.unwrap_or_default();
                let flags = get_attribute(&e, b"flags")?
                    .and_then(|f| RequirementType::try_from(f.as_str()).ok());
                let epoch = get_attribute(&e, b"epoch")?;
                let version = get_attribute(&e, b"ver")?;
                let release = get_attribute(&e, b"rel")?;
                let pre = get_attribute(&e, b"pre")?
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
                list.push(Requirement {
                    name,
                    flags,
                    epoch,
                    version,
                    release,
                    pre,
                });
            }
            Event::End(e) if e.name().as_ref() == closing_tag => break,
            Event::Eof => {
                return Err(MetadataError::new(ErrorKind::BadPrimaryXml, "unexpected EOF in requirement list"))
            }
            _ => (),
        }
    }
    Ok(list)
}

/// Serializes `packages` as a complete `primary.xml` document.
pub fn write_file<W: Write>(writer: W, packages: &[&Package]) -> Result<W, MetadataError> {
    let mut xml = XmlWriter::new(writer);
    xml.write_declaration()?;

    let mut metadata_tag = BytesStart::new("metadata");
    metadata_tag.push_attribute(("xmlns", XML_NS_COMMON));
    metadata_tag.push_attribute(("xmlns:rpm", XML_NS_RPM));
    let count = packages.len().to_string();
    metadata_tag.push_attribute(("packages", count.as_str()));
    xml.write_event(Event::Start(metadata_tag.clone()))?;

    for package in packages {
        write_package(&mut xml, package)?;
    }

    xml.write_event(Event::End(metadata_tag.to_end()))?;
    xml.write_event(Event::Text(BytesText::new("\n")))?;

    Ok(xml.into_inner())
}

fn write_package<W: Write>(xml: &mut XmlWriter<W>, package: &Package) -> Result<(), MetadataError> {
    let mut package_tag = BytesStart::new("package");
    package_tag.push_attribute(("type", "rpm"));
    xml.write_event(Event::Start(package_tag.clone()))?;

    xml.write_text_element("name", &package.name)?;
    xml.write_text_element("arch", &package.arch)?;

    let mut version_tag = BytesStart::new("version");
    version_tag.push_attribute(("epoch", package.evr.epoch.as_str()));
    version_tag.push_attribute(("ver", package.evr.version.as_str()));
    version_tag.push_attribute(("rel", package.evr.release.as_str()));
    xml.write_event(Event::Empty(version_tag))?;

    let mut checksum_tag = BytesStart::new("checksum");
    checksum_tag.push_attribute(("type", package.checksum.checksum_type.as_str()));
    checksum_tag.push_attribute(("pkgid", "YES"));
    xml.write_event(Event::Start(checksum_tag.clone()))?;
    xml.write_event(Event::Text(BytesText::new(&package.checksum.value)))?;
    xml.write_event(Event::End(checksum_tag.to_end()))?;

    xml.write_text_element("summary", &package.summary)?;
    xml.write_text_element("description", &package.description)?;
    xml.write_text_element("packager", &package.packager)?;
    xml.write_text_element("url", &package.url)?;

    let time_file = package.time_file.to_string();
    let time_build = package.time_build.to_string();
    let mut time_tag = BytesStart::new("time");
    time_tag.push_attribute(("file", time_file.as_str()));
    time_tag.push_attribute(("build", time_build.as_str()));
    xml.write_event(Event::Empty(time_tag))?;

    let size_package = package.size_package.to_string();
    let size_installed = package.size_installed.to_string();
    let size_archive = package.size_archive.to_string();
    let mut size_tag = BytesStart::new("size");
    size_tag.push_attribute(("package", size_package.as_str()));
    size_tag.push_attribute(("installed", size_installed.as_str()));
    size_tag.push_attribute(("archive", size_archive.as_str()));
    xml.write_event(Event::Empty(size_tag))?;

    let mut location_tag = BytesStart::new("location");
    if let Some(base) = &package.location_base {
        location_tag.push_attribute(("xml:base", base.as_str()));
    }
    location_tag.push_attribute(("href", package.location_href.as_str()));
    xml.write_event(Event::Empty(location_tag))?;

    let format_tag = BytesStart::new("format");
    xml.write_event(Event::Start(format_tag.clone()))?;

    xml.write_text_element("rpm:license", &package.rpm_license)?;
    xml.write_text_element("rpm:vendor", &package.rpm_vendor)?;
    xml.write_text_element("rpm:group", &package.rpm_group)?;
    xml.write_text_element("rpm:buildhost", &package.rpm_buildhost)?;
    xml.write_text_element("rpm:sourcerpm", &package.rpm_sourcerpm)?;

    let range_start = package.rpm_header_range.start.to_string();
    let range_end = package.rpm_header_range.end.to_string();
    let mut range_tag = BytesStart::new("rpm:header-range");
    range_tag.push_attribute(("start", range_start.as_str()));
    range_tag.push_attribute(("end", range_end.as_str()));
    xml.write_event(Event::Empty(range_tag))?;

    write_requirement_section(xml, "rpm:provides", &package.rpm_provides)?;
    write_requirement_section(xml, "rpm:requires", &package.rpm_requires)?;
    write_requirement_section(xml, "rpm:conflicts", &package.rpm_conflicts)?;
    write_requirement_section(xml, "rpm:obsoletes", &package.rpm_obsoletes)?;
    write_requirement_section(xml, "rpm:suggests", &package.rpm_suggests)?;
    write_requirement_section(xml, "rpm:enhances", &package.rpm_enhances)?;
    write_requirement_section(xml, "rpm:recommends", &package.rpm_recommends)?;
    write_requirement_section(xml, "rpm:supplements", &package.rpm_supplements)?;

    for file in &package.rpm_files {
        if !is_primary(&file.full_path()) {
            continue;
        }
        let mut file_tag = BytesStart::new("file");
        if file.filetype != FileType::File {
            file_tag.push_attribute(("type", file.filetype.as_str()));
        }
        xml.write_event(Event::Start(file_tag.clone()))?;
        xml.write_event(Event::Text(BytesText::new(&file.full_path())))?;
        xml.write_event(Event::End(file_tag.to_end()))?;
    }

    xml.write_event(Event::End(format_tag.to_end()))?;
    xml.write_event(Event::End(package_tag.to_end()))?;
    Ok(())
}

fn write_requirement_section<W: Write>(
    xml: &mut XmlWriter<W>,
    tag: &str,
    entries: &[Requirement],
) -> Result<(), MetadataError> {
    if entries.is_empty() {
        return Ok(());
    }

    let section_tag = BytesStart::new(tag);
    xml.write_event(Event::Start(section_tag.clone()))?;

    for entry in entries {
        let mut entry_tag = BytesStart::new("rpm:entry");
        entry_tag.push_attribute(("name", entry.name.as_str()));
        if let Some(flags) = entry.flags {
            entry_tag.push_attribute(("flags", flags.as_str()));
        }
        if let Some(epoch) = &entry.epoch {
            entry_tag.push_attribute(("epoch", epoch.as_str()));
        }
        if let Some(version) = &entry.version {
            entry_tag.push_attribute(("ver", version.as_str()));
        }
        if let Some(release) = &entry.release {
            entry_tag.push_attribute(("rel", release.as_str()));
        }
        if entry.pre {
            entry_tag.push_attribute(("pre", "1"));
        }
        xml.write_event(Event::Empty(entry_tag))?;
    }

    xml.write_event(Event::End(section_tag.to_end()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="1">
<package type="rpm">
  <name>horse</name>
  <arch>noarch</arch>
  <version epoch="0" ver="4.1" rel="1"/>
  <checksum type="sha256" pkgid="YES">6d0fd7f08cef63677726973d327e0b99f819b1983f90c2b656bb27cd2112cb7</checksum>
  <summary>A dummy package of horse</summary>
  <description>A dummy package of horse</description>
  <packager>Bojack Horseman</packager>
  <url>http://arandomaddress.com</url>
  <time file="1615451135" build="1331831374"/>
  <size package="1846" installed="42" archive="296"/>
  <location href="horse-4.1-1.noarch.rpm"/>
  <format>
    <rpm:license>GPLv2</rpm:license>
    <rpm:vendor></rpm:vendor>
    <rpm:group>Internet/Applications</rpm:group>
    <rpm:buildhost>smqe-ws15</rpm:buildhost>
    <rpm:sourcerpm>horse-4.1-1.src.rpm</rpm:sourcerpm>
    <rpm:header-range start="280" end="1697"/>
    <rpm:provides>
      <rpm:entry name="horse" flags="EQ" epoch="0" ver="4.1" rel="1"/>
    </rpm:provides>
    <file type="dir">/etc/fonts/conf.avail</file>
  </format>
</package>
</metadata>"#;

    #[test]
    fn parses_complex_package() {
        let mut packages = Vec::new();
        let count = parse_file(
            SAMPLE.as_bytes(),
            PrimaryParseOptions { do_files: true },
            &mut |_id, _name, _arch| Ok(Some(Package::default())),
            &mut |pkg| {
                packages.push(pkg);
                Ok(())
            },
            &mut |_w| Ok(()),
        )
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(packages.len(), 1);
        let pkg = &packages[0];
        assert_eq!(pkg.name, "horse");
        assert_eq!(pkg.evr.version, "4.1");
        assert_eq!(pkg.rpm_provides.len(), 1);
        assert!(pkg.loaded.primary);
    }

    #[test]
    fn missing_checksum_type_warns_but_completes() {
        let xml = SAMPLE.replace(r#"type="sha256" pkgid="YES""#, "");
        let mut warnings = Vec::new();
        let mut packages = Vec::new();
        parse_file(
            xml.as_bytes(),
            PrimaryParseOptions::default(),
            &mut |_id, _name, _arch| Ok(Some(Package::default())),
            &mut |pkg| {
                packages.push(pkg);
                Ok(())
            },
            &mut |w| {
                warnings.push(w.kind);
                Ok(())
            },
        )
        .unwrap();

        assert!(warnings.contains(&WarningKind::MissingAttr));
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].checksum.checksum_type, crate::checksum::ChecksumType::Unknown);
    }

    #[test]
    fn is_primary_matches_substring_bin() {
        assert!(is_primary("/usr/share/recycle-bin/x"));
        assert!(is_primary("/usr/bin/bash"));
        assert!(is_primary("/etc/passwd"));
        assert!(is_primary("/usr/lib/sendmail"));
        assert!(!is_primary("/usr/share/doc/README"));
    }
}
