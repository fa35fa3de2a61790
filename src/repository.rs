// Copyright (c) 2022 Daniel Alley
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Repository locator (component J): resolves a local path or remote URL to
//! the concrete set of metadata files a repomd.xml advertises, and the two
//! flavors of stale-metadata cleanup createrepo_c calls "classic" and
//! non-classic.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::TempDir;

use crate::download::fetch_to_file;
use crate::error::{self, ErrorKind, MetadataError};
use crate::repomd;
use crate::utils::prune_by_generation;

/// The nine well-known slots a `repomd.xml` can populate, resolved to
/// filesystem paths, plus anything with an unrecognized `type` attribute.
///
/// For a remote `path_or_url`, the downloaded files live under a temporary
/// directory owned by this struct and removed when it is dropped.
#[derive(Debug, Default)]
pub struct MetadataLocation {
    pub repomd_path: PathBuf,
    pub primary_xml: Option<PathBuf>,
    pub filelists_xml: Option<PathBuf>,
    pub other_xml: Option<PathBuf>,
    pub primary_db: Option<PathBuf>,
    pub filelists_db: Option<PathBuf>,
    pub other_db: Option<PathBuf>,
    pub group: Option<PathBuf>,
    pub group_gz: Option<PathBuf>,
    pub updateinfo: Option<PathBuf>,
    /// `(type, path)` for any `<data type="...">` this crate doesn't assign
    /// a dedicated slot to.
    pub additional_metadata: Vec<(String, PathBuf)>,
    /// Root of the repository on disk: either the directory the caller
    /// passed in, or the temporary directory the remote copy landed in.
    pub local_path: PathBuf,
    /// Set only when `locate` was given a URL rather than a local path.
    pub original_url: Option<String>,
    _tmp_dir: Option<TempDir>,
}

/// Resolves `path_or_url` to a [`MetadataLocation`].
///
/// If it starts with `ftp://`, `http://`, or `https://`, `repodata/repomd.xml`
/// and every file it lists are downloaded into a fresh temporary directory,
/// which is then resolved exactly as a local path would be. Otherwise an
/// optional `file://` prefix is stripped and the path is used in place.
///
/// When `ignore_sqlite` is true, the three `*_db` slots are dropped even if
/// `repomd.xml` lists them.
pub fn locate(path_or_url: &str, ignore_sqlite: bool) -> Result<MetadataLocation, MetadataError> {
    if path_or_url.starts_with("ftp://")
        || path_or_url.starts_with("http://")
        || path_or_url.starts_with("https://")
    {
        locate_remote(path_or_url, ignore_sqlite)
    } else {
        let path = path_or_url.strip_prefix("file://").unwrap_or(path_or_url);
        let mut location = locate_local(Path::new(path), ignore_sqlite)?;
        location.original_url = Some(path_or_url.to_owned());
        Ok(location)
    }
}

fn locate_local(repo_path: &Path, ignore_sqlite: bool) -> Result<MetadataLocation, MetadataError> {
    let repomd_path = repo_path.join("repodata/repomd.xml");
    if !repomd_path.is_file() {
        return Err(error::no_file(&repomd_path));
    }

    let file = fs::File::open(&repomd_path)
        .map_err(|e| MetadataError::with_cause(ErrorKind::Io, format!("open {}", repomd_path.display()), e))?;
    let repomd_data = repomd::parse_file(std::io::BufReader::new(file))?;

    let mut location = MetadataLocation {
        repomd_path,
        local_path: repo_path.to_owned(),
        ..Default::default()
    };

    for record in repomd_data.records() {
        let full_path = repo_path.join(&record.location_href);
        match record.metadata_name.as_str() {
            "primary" => location.primary_xml = Some(full_path),
            "filelists" => location.filelists_xml = Some(full_path),
            "other" => location.other_xml = Some(full_path),
            "primary_db" if !ignore_sqlite => location.primary_db = Some(full_path),
            "filelists_db" if !ignore_sqlite => location.filelists_db = Some(full_path),
            "other_db" if !ignore_sqlite => location.other_db = Some(full_path),
            "primary_db" | "filelists_db" | "other_db" => (),
            "group" => location.group = Some(full_path),
            // createrepo_c's _gz suffix is historical and used even with --xz.
            "group_gz" => location.group_gz = Some(full_path),
            "updateinfo" => location.updateinfo = Some(full_path),
            other => location.additional_metadata.push((other.to_owned(), full_path)),
        }
    }

    Ok(location)
}

fn locate_remote(url: &str, ignore_sqlite: bool) -> Result<MetadataLocation, MetadataError> {
    // A trailing slash matters to `Url::join`'s relative-resolution rules:
    // without one, `repodata/repomd.xml` would resolve against the parent
    // of the last path segment instead of underneath it.
    let base = if url.ends_with('/') { url.to_owned() } else { format!("{url}/") };
    let base_url = url::Url::parse(&base)
        .map_err(|e| MetadataError::with_cause(ErrorKind::BadArg, format!("invalid URL: {url}"), e))?;

    let tmp_dir = TempDir::new()
        .map_err(|e| MetadataError::with_cause(ErrorKind::Io, "create temporary directory", e))?;
    let repodata_dir = tmp_dir.path().join("repodata");
    fs::create_dir_all(&repodata_dir)
        .map_err(|e| MetadataError::with_cause(ErrorKind::Io, format!("create {}", repodata_dir.display()), e))?;

    let repomd_url = join_relative(&base_url, "repodata/repomd.xml")?;
    let tmp_repomd_path = repodata_dir.join("repomd.xml");
    fetch_to_file(repomd_url.as_str(), &tmp_repomd_path)?;

    let file = fs::File::open(&tmp_repomd_path)
        .map_err(|e| MetadataError::with_cause(ErrorKind::Io, format!("open {}", tmp_repomd_path.display()), e))?;
    let repomd_data = repomd::parse_file(std::io::BufReader::new(file))?;

    for record in repomd_data.records() {
        if ignore_sqlite && record.metadata_name.ends_with("_db") {
            continue;
        }
        let href = record.location_href.to_string_lossy().into_owned();
        let file_url = join_relative(&base_url, &href)?;
        let dest = tmp_dir.path().join(&href);
        fetch_to_file(file_url.as_str(), &dest)?;
    }

    let mut location = locate_local(tmp_dir.path(), ignore_sqlite)?;
    location.original_url = Some(url.to_owned());
    location._tmp_dir = Some(tmp_dir);
    Ok(location)
}

fn join_relative(base: &url::Url, href: &str) -> Result<url::Url, MetadataError> {
    base.join(href)
        .map_err(|e| MetadataError::with_cause(ErrorKind::BadArg, format!("invalid location href: {href}"), e))
}

const WELL_KNOWN_SUFFIXES: &[&str] = &[
    "primary.xml.gz",
    "filelists.xml.gz",
    "other.xml.gz",
    "primary.xml.bz2",
    "filelists.xml.bz2",
    "other.xml.bz2",
    "primary.xml.xz",
    "filelists.xml.xz",
    "other.xml.xz",
    "primary.xml",
    "filelists.xml",
    "other.xml",
    "updateinfo.xml",
];

/// Deletes every file `repomd.xml` lists, plus any leftover file in
/// `repodata/` matching one of the well-known metadata names (including
/// `repomd.xml` itself), whether or not it is still referenced. Returns the
/// number of files removed.
pub fn remove_metadata(repo_path: &Path) -> Result<usize, MetadataError> {
    let repodata_dir = repo_path.join("repodata");
    if !repodata_dir.is_dir() {
        return Err(error::no_dir(&repodata_dir));
    }

    let mut removed = 0usize;

    if let Ok(location) = locate_local(repo_path, false) {
        for path in listed_paths(&location) {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
    }

    for entry in fs::read_dir(&repodata_dir)
        .map_err(|e| MetadataError::with_cause(ErrorKind::Io, format!("read {}", repodata_dir.display()), e))?
    {
        let entry = entry.map_err(|e| MetadataError::with_cause(ErrorKind::Io, "read directory entry", e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == "repomd.xml" || WELL_KNOWN_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            if fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
    }

    Ok(removed)
}

fn listed_paths(location: &MetadataLocation) -> Vec<PathBuf> {
    [
        &location.primary_xml,
        &location.filelists_xml,
        &location.other_xml,
        &location.primary_db,
        &location.filelists_db,
        &location.other_db,
        &location.group,
        &location.group_gz,
        &location.updateinfo,
    ]
    .into_iter()
    .flatten()
    .cloned()
    .chain(location.additional_metadata.iter().map(|(_, p)| p.clone()))
    .chain(std::iter::once(location.repomd_path.clone()))
    .collect()
}

/// Groups old `repodata/` files by logical role (primary, primary_db,
/// filelists, filelists_db, other, other_db) ignoring any compression
/// suffix, and deletes every entry past the `retain`-th most recent in each
/// group.
pub fn remove_metadata_classic(repo_path: &Path, retain: usize) -> Result<usize, MetadataError> {
    let repodata_dir = repo_path.join("repodata");
    let entries = fs::read_dir(&repodata_dir)
        .map_err(|e| MetadataError::with_cause(ErrorKind::Io, format!("read {}", repodata_dir.display()), e))?;

    let mut by_role: Vec<(String, PathBuf, SystemTime)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MetadataError::with_cause(ErrorKind::Io, "read directory entry", e))?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();

        let Some(dot) = name.rfind('.') else { continue };
        let without_suffix = &name[..dot];

        let role = ["primary.sqlite", "primary.xml", "filelists.sqlite", "filelists.xml", "other.sqlite", "other.xml"]
            .into_iter()
            .find(|role| without_suffix.ends_with(role));
        let Some(role) = role else { continue };

        let mtime = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        by_role.push((role.to_owned(), path, mtime));
    }

    let to_remove = prune_by_generation(by_role, retain, |(role, _, mtime)| (role.clone(), *mtime));

    let mut removed = 0usize;
    for (_, path, _) in to_remove {
        if fs::remove_file(path).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn join_relative_resolves_under_base() {
        let base = url::Url::parse("https://example.com/repo/").unwrap();
        let joined = join_relative(&base, "repodata/repomd.xml").unwrap();
        assert_eq!(joined.as_str(), "https://example.com/repo/repodata/repomd.xml");
    }

    fn write_sample_repo(dir: &Path) {
        let repodata = dir.join("repodata");
        fs::create_dir_all(&repodata).unwrap();
        fs::write(
            repodata.join("repomd.xml"),
            r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
<revision>1</revision>
<data type="primary">
  <checksum type="sha256">0000000000000000000000000000000000000000000000000000000000000000</checksum>
  <location href="repodata/abc-primary.xml.gz"/>
  <timestamp>1000</timestamp>
  <size>10</size>
</data>
</repomd>"#,
        )
        .unwrap();
        fs::write(repodata.join("abc-primary.xml.gz"), b"stub").unwrap();
    }

    #[test]
    fn locate_resolves_local_repo() {
        let dir = tempfile::tempdir().unwrap();
        write_sample_repo(dir.path());

        let location = locate(dir.path().to_str().unwrap(), false).unwrap();
        assert!(location.primary_xml.is_some());
        assert!(location.primary_xml.unwrap().ends_with("abc-primary.xml.gz"));
        assert_eq!(location.original_url.as_deref(), Some(dir.path().to_str().unwrap()));
    }

    #[test]
    fn locate_strips_file_scheme() {
        let dir = tempfile::tempdir().unwrap();
        write_sample_repo(dir.path());

        let url = format!("file://{}", dir.path().display());
        let location = locate(&url, false).unwrap();
        assert!(location.primary_xml.is_some());
    }

    #[test]
    fn locate_missing_repomd_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate(dir.path().to_str().unwrap(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoFile);
    }

    #[test]
    fn remove_metadata_deletes_listed_and_wellknown_files() {
        let dir = tempfile::tempdir().unwrap();
        write_sample_repo(dir.path());
        fs::write(dir.path().join("repodata/leftover-other.xml"), b"x").unwrap();

        let removed = remove_metadata(dir.path()).unwrap();
        assert!(removed >= 2);
        assert!(!dir.path().join("repodata/repomd.xml").exists());
        assert!(!dir.path().join("repodata/abc-primary.xml.gz").exists());
        assert!(!dir.path().join("repodata/leftover-other.xml").exists());
    }

    #[test]
    fn remove_metadata_classic_retains_newest_per_role() {
        let dir = tempfile::tempdir().unwrap();
        let repodata = dir.path().join("repodata");
        fs::create_dir_all(&repodata).unwrap();

        for (name, age) in [
            ("111-primary.xml.gz", 30),
            ("222-primary.xml.gz", 20),
            ("333-primary.xml.gz", 10),
        ] {
            let path = repodata.join(name);
            fs::write(&path, b"x").unwrap();
            let mtime = SystemTime::now() - Duration::from_secs(age);
            filetime_set(&path, mtime);
        }

        let removed = remove_metadata_classic(dir.path(), 1).unwrap();
        assert_eq!(removed, 2);
        assert!(repodata.join("333-primary.xml.gz").exists());
        assert!(!repodata.join("222-primary.xml.gz").exists());
        assert!(!repodata.join("111-primary.xml.gz").exists());
    }

    fn filetime_set(path: &Path, mtime: SystemTime) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(mtime).unwrap();
    }
}
