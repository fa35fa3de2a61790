//! `updateinfo.xml` model, parser, and writer. Unlike `primary`/`filelists`/
//! `other`, this format has no merging counterpart and no `new-pkg`
//! callback: it is loaded and dumped as a single [`UpdateInfo`] document.

use std::io::{BufRead, Write};

use quick_xml::events::{BytesStart, BytesText, Event};

use crate::checksum::Checksum;
use crate::error::{ErrorKind, MetadataError};
use crate::xml_common::{get_attribute, read_element_text, XmlReader, XmlWriter};

const TAG_UPDATES: &[u8] = b"updates";
const TAG_UPDATE: &[u8] = b"update";
const TAG_ID: &[u8] = b"id";
const TAG_TITLE: &[u8] = b"title";
const TAG_ISSUED: &[u8] = b"issued";
const TAG_UPDATED: &[u8] = b"updated";
const TAG_RIGHTS: &[u8] = b"rights";
const TAG_RELEASE: &[u8] = b"release";
const TAG_PUSHCOUNT: &[u8] = b"pushcount";
const TAG_SEVERITY: &[u8] = b"severity";
const TAG_SUMMARY: &[u8] = b"summary";
const TAG_DESCRIPTION: &[u8] = b"description";
const TAG_SOLUTION: &[u8] = b"solution";
const TAG_REBOOT_SUGGESTED: &[u8] = b"reboot_suggested";
const TAG_RESTART_SUGGESTED: &[u8] = b"restart_suggested";
const TAG_RELOGIN_SUGGESTED: &[u8] = b"relogin_suggested";
const TAG_REFERENCES: &[u8] = b"references";
const TAG_REFERENCE: &[u8] = b"reference";
const TAG_PKGLIST: &[u8] = b"pkglist";
const TAG_COLLECTION: &[u8] = b"collection";
const TAG_NAME: &[u8] = b"name";
const TAG_MODULE: &[u8] = b"module";
const TAG_PACKAGE: &[u8] = b"package";
const TAG_FILENAME: &[u8] = b"filename";
const TAG_SUM: &[u8] = b"sum";

/// A full `updateinfo.xml` document: an ordered sequence of update records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateInfo {
    pub updates: Vec<UpdateRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRecord {
    pub from: String,
    pub status: String,
    pub update_type: String,
    pub version: String,
    pub id: String,
    pub title: String,
    pub issued: Option<String>,
    pub updated: Option<String>,
    pub rights: String,
    pub release: String,
    pub pushcount: String,
    pub severity: String,
    pub summary: String,
    pub description: String,
    pub solution: String,
    pub reboot_suggested: bool,
    pub references: Vec<UpdateReference>,
    pub collections: Vec<UpdateCollection>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReference {
    pub href: String,
    pub id: String,
    pub reference_type: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateCollection {
    pub shortname: String,
    pub name: String,
    pub module: Option<UpdateCollectionModule>,
    pub packages: Vec<UpdateCollectionPackage>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateCollectionModule {
    pub name: String,
    pub stream: String,
    pub version: u64,
    pub context: String,
    pub arch: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateCollectionPackage {
    pub name: String,
    pub epoch: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub src: String,
    pub filename: String,
    pub checksum: Option<Checksum>,
    pub reboot_suggested: bool,
    pub restart_suggested: bool,
    pub relogin_suggested: bool,
}

/// Parses a full `updateinfo.xml` document.
pub fn parse_file<R: BufRead>(reader: R) -> Result<UpdateInfo, MetadataError> {
    let mut xml = XmlReader::new(reader);
    let mut updateinfo = UpdateInfo::default();

    loop {
        match xml.next_event()? {
            Event::Start(e) if e.name().as_ref() == TAG_UPDATES => (),
            Event::Start(e) if e.name().as_ref() == TAG_UPDATE => {
                updateinfo.updates.push(parse_update(&mut xml, &e)?);
            }
            Event::Eof => break,
            _ => (),
        }
    }

    Ok(updateinfo)
}

fn parse_update<R: BufRead>(
    xml: &mut XmlReader<R>,
    open_tag: &BytesStart<'_>,
) -> Result<UpdateRecord, MetadataError> {
    let mut record = UpdateRecord {
        from: get_attribute(open_tag, b"from")?.unwrap_or_default(),
        status: get_attribute(open_tag, b"status")?.unwrap_or_default(),
        update_type: get_attribute(open_tag, b"type")?.unwrap_or_default(),
        version: get_attribute(open_tag, b"version")?.unwrap_or_default(),
        ..Default::default()
    };

    loop {
        match xml.next_event()? {
            Event::End(e) if e.name().as_ref() == TAG_UPDATE => break,
            Event::Start(e) => match e.name().as_ref() {
                TAG_ID => record.id = read_element_text(xml)?,
                TAG_TITLE => record.title = read_element_text(xml)?,
                TAG_RIGHTS => record.rights = read_element_text(xml)?,
                TAG_RELEASE => record.release = read_element_text(xml)?,
                TAG_PUSHCOUNT => record.pushcount = read_element_text(xml)?,
                TAG_SEVERITY => record.severity = read_element_text(xml)?,
                TAG_SUMMARY => record.summary = read_element_text(xml)?,
                TAG_DESCRIPTION => record.description = read_element_text(xml)?,
                TAG_SOLUTION => record.solution = read_element_text(xml)?,
                TAG_ISSUED => {
                    record.issued = get_attribute(&e, b"date")?;
                    skip_to_end(xml, TAG_ISSUED)?;
                }
                TAG_UPDATED => {
                    record.updated = get_attribute(&e, b"date")?;
                    skip_to_end(xml, TAG_UPDATED)?;
                }
                TAG_REBOOT_SUGGESTED => {
                    record.reboot_suggested = true;
                    skip_to_end(xml, TAG_REBOOT_SUGGESTED)?;
                }
                TAG_REFERENCES => {
                    record.references = parse_references(xml)?;
                }
                TAG_PKGLIST => {
                    record.collections = parse_pkglist(xml)?;
                }
                _ => skip_element(xml)?,
            },
            Event::Empty(e) => match e.name().as_ref() {
                TAG_ISSUED => record.issued = get_attribute(&e, b"date")?,
                TAG_UPDATED => record.updated = get_attribute(&e, b"date")?,
                TAG_REBOOT_SUGGESTED => record.reboot_suggested = true,
                _ => (),
            },
            Event::Eof => {
                return Err(MetadataError::new(
                    ErrorKind::BadUpdateInfoXml,
                    "unexpected EOF in <update>",
                ))
            }
            _ => (),
        }
    }

    Ok(record)
}

fn parse_references<R: BufRead>(xml: &mut XmlReader<R>) -> Result<Vec<UpdateReference>, MetadataError> {
    let mut references = Vec::new();
    loop {
        match xml.next_event()? {
            Event::End(e) if e.name().as_ref() == TAG_REFERENCES => break,
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == TAG_REFERENCE => {
                references.push(UpdateReference {
                    href: get_attribute(&e, b"href")?.unwrap_or_default(),
                    id: get_attribute(&e, b"id")?.unwrap_or_default(),
                    reference_type: get_attribute(&e, b"type")?.unwrap_or_default(),
                    title: get_attribute(&e, b"title")?.unwrap_or_default(),
                });
            }
            Event::Eof => {
                return Err(MetadataError::new(
                    ErrorKind::BadUpdateInfoXml,
                    "unexpected EOF in <references>",
                ))
            }
            _ => (),
        }
    }
    Ok(references)
}

fn parse_pkglist<R: BufRead>(xml: &mut XmlReader<R>) -> Result<Vec<UpdateCollection>, MetadataError> {
    let mut collections = Vec::new();
    loop {
        match xml.next_event()? {
            Event::End(e) if e.name().as_ref() == TAG_PKGLIST => break,
            Event::Start(e) if e.name().as_ref() == TAG_COLLECTION => {
                collections.push(parse_collection(xml, &e)?);
            }
            Event::Eof => {
                return Err(MetadataError::new(
                    ErrorKind::BadUpdateInfoXml,
                    "unexpected EOF in <pkglist>",
                ))
            }
            _ => (),
        }
    }
    Ok(collections)
}

fn parse_collection<R: BufRead>(
    xml: &mut XmlReader<R>,
    open_tag: &BytesStart<'_>,
) -> Result<UpdateCollection, MetadataError> {
    let mut collection = UpdateCollection {
        shortname: get_attribute(open_tag, b"short")?.unwrap_or_default(),
        ..Default::default()
    };

    loop {
        match xml.next_event()? {
            Event::End(e) if e.name().as_ref() == TAG_COLLECTION => break,
            Event::Start(e) => match e.name().as_ref() {
                TAG_NAME => collection.name = read_element_text(xml)?,
                TAG_MODULE => {
                    collection.module = Some(UpdateCollectionModule {
                        name: get_attribute(&e, b"name")?.unwrap_or_default(),
                        stream: get_attribute(&e, b"stream")?.unwrap_or_default(),
                        version: get_attribute(&e, b"version")?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0),
                        context: get_attribute(&e, b"context")?.unwrap_or_default(),
                        arch: get_attribute(&e, b"arch")?.unwrap_or_default(),
                    });
                    skip_to_end(xml, TAG_MODULE)?;
                }
                TAG_PACKAGE => {
                    collection.packages.push(parse_collection_package(xml, &e)?);
                }
                _ => skip_element(xml)?,
            },
            Event::Empty(e) if e.name().as_ref() == TAG_MODULE => {
                collection.module = Some(UpdateCollectionModule {
                    name: get_attribute(&e, b"name")?.unwrap_or_default(),
                    stream: get_attribute(&e, b"stream")?.unwrap_or_default(),
                    version: get_attribute(&e, b"version")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                    context: get_attribute(&e, b"context")?.unwrap_or_default(),
                    arch: get_attribute(&e, b"arch")?.unwrap_or_default(),
                });
            }
            Event::Eof => {
                return Err(MetadataError::new(
                    ErrorKind::BadUpdateInfoXml,
                    "unexpected EOF in <collection>",
                ))
            }
            _ => (),
        }
    }

    Ok(collection)
}

fn parse_collection_package<R: BufRead>(
    xml: &mut XmlReader<R>,
    open_tag: &BytesStart<'_>,
) -> Result<UpdateCollectionPackage, MetadataError> {
    let mut package = UpdateCollectionPackage {
        name: get_attribute(open_tag, b"name")?.unwrap_or_default(),
        version: get_attribute(open_tag, b"version")?.unwrap_or_default(),
        release: get_attribute(open_tag, b"release")?.unwrap_or_default(),
        epoch: get_attribute(open_tag, b"epoch")?.unwrap_or_default(),
        arch: get_attribute(open_tag, b"arch")?.unwrap_or_default(),
        src: get_attribute(open_tag, b"src")?.unwrap_or_default(),
        ..Default::default()
    };

    loop {
        match xml.next_event()? {
            Event::End(e) if e.name().as_ref() == TAG_PACKAGE => break,
            Event::Start(e) => match e.name().as_ref() {
                TAG_FILENAME => package.filename = read_element_text(xml)?,
                TAG_SUM => {
                    let checksum_type = get_attribute(&e, b"type")?.unwrap_or_default();
                    let value = read_element_text(xml)?;
                    package.checksum = Checksum::try_create(checksum_type, value).ok();
                }
                TAG_REBOOT_SUGGESTED => {
                    package.reboot_suggested = true;
                    skip_to_end(xml, TAG_REBOOT_SUGGESTED)?;
                }
                TAG_RESTART_SUGGESTED => {
                    package.restart_suggested = true;
                    skip_to_end(xml, TAG_RESTART_SUGGESTED)?;
                }
                TAG_RELOGIN_SUGGESTED => {
                    package.relogin_suggested = true;
                    skip_to_end(xml, TAG_RELOGIN_SUGGESTED)?;
                }
                _ => skip_element(xml)?,
            },
            Event::Empty(e) => match e.name().as_ref() {
                TAG_REBOOT_SUGGESTED => package.reboot_suggested = true,
                TAG_RESTART_SUGGESTED => package.restart_suggested = true,
                TAG_RELOGIN_SUGGESTED => package.relogin_suggested = true,
                _ => (),
            },
            Event::Eof => {
                return Err(MetadataError::new(
                    ErrorKind::BadUpdateInfoXml,
                    "unexpected EOF in <package>",
                ))
            }
            _ => (),
        }
    }

    Ok(package)
}

/// Consumes events up to and including the next matching end-tag, for an
/// element the caller has already partially handled (e.g. read an attribute
/// off) but whose body it does not care about.
fn skip_to_end<R: BufRead>(xml: &mut XmlReader<R>, tag: &[u8]) -> Result<(), MetadataError> {
    let mut depth = 1u32;
    loop {
        match xml.next_event()? {
            Event::Start(_) => depth += 1,
            Event::End(e) if e.name().as_ref() == tag && depth == 1 => return Ok(()),
            Event::End(_) => depth -= 1,
            Event::Eof => return Ok(()),
            _ => (),
        }
    }
}

fn skip_element<R: BufRead>(xml: &mut XmlReader<R>) -> Result<(), MetadataError> {
    xml.begin_skip();
    loop {
        let ev = xml.next_event()?;
        if !xml.skip_step(&ev) {
            break;
        }
    }
    Ok(())
}

/// Serializes `updateinfo` as a complete `updateinfo.xml` document.
pub fn write_file<W: Write>(writer: W, updateinfo: &UpdateInfo) -> Result<W, MetadataError> {
    let mut xml = XmlWriter::new(writer);
    xml.write_declaration()?;

    let updates_tag = BytesStart::new("updates");
    xml.write_event(Event::Start(updates_tag.clone()))?;

    for record in &updateinfo.updates {
        write_update(&mut xml, record)?;
    }

    xml.write_event(Event::End(updates_tag.to_end()))?;
    Ok(xml.into_inner())
}

fn write_update<W: Write>(xml: &mut XmlWriter<W>, record: &UpdateRecord) -> Result<(), MetadataError> {
    let mut update_tag = BytesStart::new("update");
    update_tag.push_attribute(("from", record.from.as_str()));
    update_tag.push_attribute(("status", record.status.as_str()));
    update_tag.push_attribute(("type", record.update_type.as_str()));
    update_tag.push_attribute(("version", record.version.as_str()));
    xml.write_event(Event::Start(update_tag.clone()))?;

    xml.write_text_element("id", &record.id)?;
    xml.write_text_element("title", &record.title)?;

    if let Some(date) = &record.issued {
        let mut tag = BytesStart::new("issued");
        tag.push_attribute(("date", date.as_str()));
        xml.write_event(Event::Empty(tag))?;
    }
    if let Some(date) = &record.updated {
        let mut tag = BytesStart::new("updated");
        tag.push_attribute(("date", date.as_str()));
        xml.write_event(Event::Empty(tag))?;
    }

    write_if_nonempty(xml, "rights", &record.rights)?;
    write_if_nonempty(xml, "release", &record.release)?;
    write_if_nonempty(xml, "pushcount", &record.pushcount)?;
    write_if_nonempty(xml, "severity", &record.severity)?;
    xml.write_text_element("summary", &record.summary)?;
    xml.write_text_element("description", &record.description)?;
    xml.write_text_element("solution", &record.solution)?;

    if record.reboot_suggested {
        xml.write_event(Event::Empty(BytesStart::new("reboot_suggested")))?;
    }

    write_references(xml, &record.references)?;
    write_pkglist(xml, &record.collections)?;

    xml.write_event(Event::End(update_tag.to_end()))?;
    Ok(())
}

fn write_if_nonempty<W: Write>(xml: &mut XmlWriter<W>, name: &str, value: &str) -> Result<(), MetadataError> {
    if !value.is_empty() {
        xml.write_text_element(name, value)?;
    }
    Ok(())
}

fn write_references<W: Write>(xml: &mut XmlWriter<W>, references: &[UpdateReference]) -> Result<(), MetadataError> {
    let references_tag = BytesStart::new("references");
    xml.write_event(Event::Start(references_tag.clone()))?;
    for reference in references {
        let mut tag = BytesStart::new("reference");
        tag.push_attribute(("href", reference.href.as_str()));
        tag.push_attribute(("id", reference.id.as_str()));
        tag.push_attribute(("type", reference.reference_type.as_str()));
        tag.push_attribute(("title", reference.title.as_str()));
        xml.write_event(Event::Empty(tag))?;
    }
    xml.write_event(Event::End(references_tag.to_end()))?;
    Ok(())
}

fn write_pkglist<W: Write>(xml: &mut XmlWriter<W>, collections: &[UpdateCollection]) -> Result<(), MetadataError> {
    let pkglist_tag = BytesStart::new("pkglist");
    xml.write_event(Event::Start(pkglist_tag.clone()))?;

    for collection in collections {
        let mut collection_tag = BytesStart::new("collection");
        collection_tag.push_attribute(("short", collection.shortname.as_str()));
        xml.write_event(Event::Start(collection_tag.clone()))?;

        xml.write_text_element("name", &collection.name)?;

        if let Some(module) = &collection.module {
            let mut module_tag = BytesStart::new("module");
            module_tag.push_attribute(("name", module.name.as_str()));
            module_tag.push_attribute(("stream", module.stream.as_str()));
            let version = module.version.to_string();
            module_tag.push_attribute(("version", version.as_str()));
            module_tag.push_attribute(("context", module.context.as_str()));
            module_tag.push_attribute(("arch", module.arch.as_str()));
            xml.write_event(Event::Empty(module_tag))?;
        }

        for package in &collection.packages {
            write_collection_package(xml, package)?;
        }

        xml.write_event(Event::End(collection_tag.to_end()))?;
    }

    xml.write_event(Event::End(pkglist_tag.to_end()))?;
    Ok(())
}

fn write_collection_package<W: Write>(
    xml: &mut XmlWriter<W>,
    package: &UpdateCollectionPackage,
) -> Result<(), MetadataError> {
    let mut package_tag = BytesStart::new("package");
    package_tag.push_attribute(("name", package.name.as_str()));
    package_tag.push_attribute(("version", package.version.as_str()));
    package_tag.push_attribute(("release", package.release.as_str()));
    package_tag.push_attribute(("epoch", package.epoch.as_str()));
    package_tag.push_attribute(("arch", package.arch.as_str()));
    package_tag.push_attribute(("src", package.src.as_str()));
    xml.write_event(Event::Start(package_tag.clone()))?;

    xml.write_text_element("filename", &package.filename)?;

    if let Some(checksum) = &package.checksum {
        let mut sum_tag = BytesStart::new("sum");
        sum_tag.push_attribute(("type", checksum.checksum_type.as_str()));
        xml.write_event(Event::Start(sum_tag.clone()))?;
        xml.write_event(Event::Text(BytesText::new(&checksum.value)))?;
        xml.write_event(Event::End(sum_tag.to_end()))?;
    }

    if package.reboot_suggested {
        xml.write_event(Event::Empty(BytesStart::new("reboot_suggested")))?;
    }
    if package.restart_suggested {
        xml.write_event(Event::Empty(BytesStart::new("restart_suggested")))?;
    }
    if package.relogin_suggested {
        xml.write_event(Event::Empty(BytesStart::new("relogin_suggested")))?;
    }

    xml.write_event(Event::End(package_tag.to_end()))?;
    Ok(())
}
