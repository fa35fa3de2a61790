//! `filelists.xml` parser and writer (component F). Populates `rpm_files`
//! (and `evr`/`name`/`arch` if not already set by the time this stream's
//! `<package>` is reached) onto whatever [`Package`] the `new-pkg` callback
//! hands back.

use std::io::{BufRead, Write};

use quick_xml::events::{BytesStart, BytesText, Event};

use crate::error::{ErrorKind, MetadataError};
use crate::package::{FileType, Package, PackageFile};
use crate::utils::Evr;
use crate::xml_common::{
    get_attribute, get_attribute_warn, read_element_text, require_pkgid, wrap_snippet,
    NewPkgCallback, ParseWarning, PkgCompleteCallback, WarningCallback, WarningKind, XmlReader,
    XmlWriter, XML_NS_FILELISTS,
};

const TAG_FILELISTS: &[u8] = b"filelists";
const TAG_PACKAGE: &[u8] = b"package";
const TAG_VERSION: &[u8] = b"version";
const TAG_FILE: &[u8] = b"file";

/// Parses a full `filelists.xml` document. Returns the `packages="N"`
/// count declared on the root element.
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
            Event::Start(e) if e.name().as_ref() == TAG_FILELISTS => {
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
    let wrapped = wrap_snippet("filelists", None, xml_string);
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
        Event::Start(e) if e.name().as_ref() == TAG_FILELISTS => Ok(StepOutcome::Other),
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
    let pkgid = get_attribute_warn(open_tag, b"pkgid", "package", "filelists/package", warning_cb)?
        .unwrap_or_default();
    let name =
        get_attribute_warn(open_tag, b"name", "package", "filelists/package", warning_cb)?.unwrap_or_default();
    let arch =
        get_attribute_warn(open_tag, b"arch", "package", "filelists/package", warning_cb)?.unwrap_or_default();

    require_pkgid(&pkgid, ErrorKind::BadFilelistsXml)?;

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
                TAG_FILE => {
                    let filetype = match get_attribute(&e, b"type")? {
                        Some(t) => FileType::try_from(t.as_str()).unwrap_or_else(|_| {
                            let _ = warning_cb(ParseWarning::new(
                                WarningKind::UnknownVal,
                                "filelists/package/file",
                                format!("\"{t}\""),
                            ));
                            FileType::File
                        }),
                        None => FileType::File,
                    };
                    let path = read_element_text(xml)?;
                    package.rpm_files.push(PackageFile::from_full_path(&path, filetype));
                }
                other => {
                    warning_cb(ParseWarning::new(
                        WarningKind::UnknownTag,
                        "filelists/package",
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
                return Err(MetadataError::new(
                    ErrorKind::BadFilelistsXml,
                    "unexpected EOF in <package>",
                ))
            }
            _ => (),
        }
    }

    package.loaded.filelists = true;
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

/// Serializes `packages` as a complete `filelists.xml` document.
pub fn write_file<W: Write>(writer: W, packages: &[&Package]) -> Result<W, MetadataError> {
    let mut xml = XmlWriter::new(writer);
    xml.write_declaration()?;

    let mut filelists_tag = BytesStart::new("filelists");
    filelists_tag.push_attribute(("xmlns", XML_NS_FILELISTS));
    let count = packages.len().to_string();
    filelists_tag.push_attribute(("packages", count.as_str()));
    xml.write_event(Event::Start(filelists_tag.clone()))?;

    for package in packages {
        write_package(&mut xml, package)?;
    }

    xml.write_event(Event::End(filelists_tag.to_end()))?;
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

    for file in &package.rpm_files {
        let mut file_tag = BytesStart::new("file");
        if file.filetype != FileType::File {
            file_tag.push_attribute(("type", file.filetype.as_str()));
        }
        xml.write_event(Event::Start(file_tag.clone()))?;
        xml.write_event(Event::Text(BytesText::new(&file.full_path())))?;
        xml.write_event(Event::End(file_tag.to_end()))?;
    }

    xml.write_event(Event::End(package_tag.to_end()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<filelists xmlns="http://linux.duke.edu/metadata/filelists" packages="1">
<package pkgid="6a915b6e1ad740994aa9688d70a67ff2b6b72e0ced668794aeb27b2d0f2e237b" name="fontconfig" arch="x86_64">
  <version epoch="0" ver="2.8.0" rel="5.el6"/>
  <file type="dir">/etc/fonts/conf.avail</file>
  <file>/etc/fonts/conf.avail/10-autohint.conf</file>
</package>
</filelists>"#;

    #[test]
    fn parses_files_and_preserves_order() {
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
        assert_eq!(pkg.rpm_files.len(), 2);
        assert_eq!(pkg.rpm_files[0].filetype, FileType::Dir);
        assert_eq!(pkg.rpm_files[0].full_path(), "/etc/fonts/conf.avail");
        assert_eq!(pkg.rpm_files[1].full_path(), "/etc/fonts/conf.avail/10-autohint.conf");
        assert!(pkg.loaded.filelists);
    }

    #[test]
    fn missing_pkgid_is_fatal() {
        let xml = SAMPLE.replace(r#"pkgid="6a915b6e1ad740994aa9688d70a67ff2b6b72e0ced668794aeb27b2d0f2e237b" "#, "");
        let err = parse_file(
            xml.as_bytes(),
            &mut |_id, _name, _arch| Ok(Some(Package::default())),
            &mut |_pkg| Ok(()),
            &mut |_w| Ok(()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadFilelistsXml);
    }
}
