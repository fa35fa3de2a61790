//! `other.xml` parser and writer (component F). Populates `rpm_changelogs`
//! in on-disk order onto whatever [`Package`] the `new-pkg` callback hands
//! back.

use std::io::{BufRead, Write};

use quick_xml::events::{BytesStart, BytesText, Event};

use crate::error::{ErrorKind, MetadataError};
use crate::package::{Changelog, Package};
use crate::utils::Evr;
use crate::xml_common::{
    get_attribute, get_attribute_warn, read_element_text, require_pkgid, wrap_snippet,
    NewPkgCallback, ParseWarning, PkgCompleteCallback, WarningCallback, WarningKind, XmlReader,
    XmlWriter, XML_NS_OTHER,
};

const TAG_OTHERDATA: &[u8] = b"otherdata";
const TAG_PACKAGE: &[u8] = b"package";
const TAG_VERSION: &[u8] = b"version";
const TAG_CHANGELOG: &[u8] = b"changelog";

pub fn parse_file<R: BufRead>(
    reader: R,
    new_pkg_cb: &mut NewPkgCallback<'_>,
    pkg_cb: &mut PkgCompleteCallback<'_>,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<usize, MetadataError> {
    let mut xml = XmlReader::new(reader);
    let mut declared_count = 0usize;

    loop {
        match xml.next_event()? {
            Event::Start(e) if e.name().as_ref() == TAG_OTHERDATA => {
                if let Some(n) = get_attribute(&e, b"packages")? {
                    declared_count = n.parse().unwrap_or(0);
                }
            }
            Event::Start(e) if e.name().as_ref() == TAG_PACKAGE => {
                parse_one_package(&mut xml, &e, new_pkg_cb, pkg_cb, warning_cb)?;
            }
            Event::Eof => break,
            _ => (),
        }
    }

    Ok(declared_count)
}

pub fn parse_snippet(
    xml_string: &str,
    new_pkg_cb: &mut NewPkgCallback<'_>,
    pkg_cb: &mut PkgCompleteCallback<'_>,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<usize, MetadataError> {
    let wrapped = wrap_snippet("otherdata", None, xml_string);
    parse_file(wrapped.as_bytes(), new_pkg_cb, pkg_cb, warning_cb)
}

/// Enum returned by [`parse_one_event`]; see the identically-named type in
/// `primary.rs`.
pub(crate) enum StepOutcome {
    Eof,
    PackageParsed,
    PackageSkipped,
    Other,
}

/// Consumes exactly one top-level event, used by the merging iterator to
/// drive this format one package at a time.
pub(crate) fn parse_one_event<R: BufRead>(
    xml: &mut XmlReader<R>,
    new_pkg_cb: &mut NewPkgCallback<'_>,
    pkg_cb: &mut PkgCompleteCallback<'_>,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<StepOutcome, MetadataError> {
    match xml.next_event()? {
        Event::Start(e) if e.name().as_ref() == TAG_OTHERDATA => Ok(StepOutcome::Other),
        Event::Start(e) if e.name().as_ref() == TAG_PACKAGE => {
            if parse_one_package(xml, &e, new_pkg_cb, pkg_cb, warning_cb)? {
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
    new_pkg_cb: &mut NewPkgCallback<'_>,
    pkg_cb: &mut PkgCompleteCallback<'_>,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<bool, MetadataError> {
    let pkgid = get_attribute_warn(open_tag, b"pkgid", "package", "otherdata/package", warning_cb)?
        .unwrap_or_default();
    let name =
        get_attribute_warn(open_tag, b"name", "package", "otherdata/package", warning_cb)?.unwrap_or_default();
    let arch =
        get_attribute_warn(open_tag, b"arch", "package", "otherdata/package", warning_cb)?.unwrap_or_default();

    require_pkgid(&pkgid, ErrorKind::BadOtherXml)?;

    let mut package = match new_pkg_cb(&pkgid, &name, &arch)? {
        Some(p) => p,
        None => {
            skip_remaining_package(xml)?;
            return Ok(false);
        }
    };

    if package.name.is_empty() {
        package.name = name;
    }
    if package.arch.is_empty() {
        package.arch = arch;
    }

    loop {
        match xml.next_event()? {
            Event::End(e) if e.name().as_ref() == TAG_PACKAGE => break,
            Event::Start(e) => match e.name().as_ref() {
                TAG_VERSION => {
                    if package.evr.version.is_empty() && package.evr.release.is_empty() {
                        let epoch = get_attribute(&e, b"epoch")?.unwrap_or_default();
                        let version = get_attribute(&e, b"ver")?.unwrap_or_default();
                        let release = get_attribute(&e, b"rel")?.unwrap_or_default();
                        package.evr = Evr::new(epoch, version, release);
                    }
                }
                TAG_CHANGELOG => {
                    let author = get_attribute(&e, b"author")?.unwrap_or_default();
                    let timestamp = get_attribute(&e, b"date")?
                        .and_then(|d| d.parse().ok())
                        .unwrap_or(0);
                    let description = read_element_text(xml)?;
                    package.rpm_changelogs.push(Changelog {
                        author,
                        timestamp,
                        description,
                    });
                }
                other => {
                    warning_cb(ParseWarning::new(
                        WarningKind::UnknownTag,
                        "otherdata/package",
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
                return Err(MetadataError::new(ErrorKind::BadOtherXml, "unexpected EOF in <package>"))
            }
            _ => (),
        }
    }

    package.loaded.other = true;
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

/// Serializes `packages` as a complete `other.xml` document.
pub fn write_file<W: Write>(writer: W, packages: &[&Package]) -> Result<W, MetadataError> {
    let mut xml = XmlWriter::new(writer);
    xml.write_declaration()?;

    let mut other_tag = BytesStart::new("otherdata");
    other_tag.push_attribute(("xmlns", XML_NS_OTHER));
    let count = packages.len().to_string();
    other_tag.push_attribute(("packages", count.as_str()));
    xml.write_event(Event::Start(other_tag.clone()))?;

    for package in packages {
        write_package(&mut xml, package)?;
    }

    xml.write_event(Event::End(other_tag.to_end()))?;
    Ok(xml.into_inner())
}

fn write_package<W: Write>(xml: &mut XmlWriter<W>, package: &Package) -> Result<(), MetadataError> {
    let mut package_tag = BytesStart::new("package");
    package_tag.push_attribute(("pkgid", package.checksum.value.as_str()));
    package_tag.push_attribute(("name", package.name.as_str()));
    package_tag.push_attribute(("arch", package.arch.as_str()));
    xml.write_event(Event::Start(package_tag.clone()))?;

    let mut version_tag = BytesStart::new("version");
    version_tag.push_attribute(("epoch", package.evr.epoch.as_str()));
    version_tag.push_attribute(("ver", package.evr.version.as_str()));
    version_tag.push_attribute(("rel", package.evr.release.as_str()));
    xml.write_event(Event::Empty(version_tag))?;

    for changelog in &package.rpm_changelogs {
        let timestamp = changelog.timestamp.to_string();
        let mut changelog_tag = BytesStart::new("changelog");
        changelog_tag.push_attribute(("author", changelog.author.as_str()));
        changelog_tag.push_attribute(("date", timestamp.as_str()));
        xml.write_event(Event::Start(changelog_tag.clone()))?;
        xml.write_event(Event::Text(BytesText::new(&changelog.description)))?;
        xml.write_event(Event::End(changelog_tag.to_end()))?;
    }

    xml.write_event(Event::End(package_tag.to_end()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<otherdata xmlns="http://linux.duke.edu/metadata/other" packages="1">
<package pkgid="a2d3bce512f79b0bc840ca7912a86bbc0016cf06d5c363ffbb6fd5e1ef03de1b" name="deadbeef-devel" arch="x86_64">
  <version epoch="0" ver="1.8.4" rel="2.fc33"/>
  <changelog author="A &lt;a@example.com&gt; - 1.8.0-1" date="1554724800">- Update to 1.8.0</changelog>
  <changelog author="A &lt;a@example.com&gt; - 1.8.1-1" date="1561723200">- Update to 1.8.1</changelog>
</package>
</otherdata>"#;

    #[test]
    fn parses_changelogs_in_file_order() {
        let mut packages = Vec::new();
        let count = parse_file(
            SAMPLE.as_bytes(),
            &mut |_id, _name, _arch| Ok(Some(Package::default())),
            &mut |pkg| {
                packages.push(pkg);
                Ok(())
            },
            &mut |_w| Ok(()),
        )
        .unwrap();

        assert_eq!(count, 1);
        let pkg = &packages[0];
        assert_eq!(pkg.rpm_changelogs.len(), 2);
        assert_eq!(pkg.rpm_changelogs[0].timestamp, 1554724800);
        assert_eq!(pkg.rpm_changelogs[1].timestamp, 1561723200);
        assert!(pkg.loaded.other);
    }

    #[test]
    fn missing_pkgid_is_fatal() {
        let xml = SAMPLE.replace(r#"pkgid="a2d3bce512f79b0bc840ca7912a86bbc0016cf06d5c363ffbb6fd5e1ef03de1b" "#, "");
        let err = parse_file(
            xml.as_bytes(),
            &mut |_id, _name, _arch| Ok(Some(Package::default())),
            &mut |_pkg| Ok(()),
            &mut |_w| Ok(()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadOtherXml);
    }
}
