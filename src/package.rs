// Copyright (c) 2022 Daniel Alley
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Package data model (component D): the in-memory package, its eight
//! dependency sets, file entries, and changelog, plus the loading flags the
//! three-stream merge ([`crate::merge`]) uses to know when a package is
//! complete.
//!
//! Strings here are plain, per-package owned `String`s rather than a shared
//! interning arena — the arena in the reference implementation is a
//! micro-optimization forced by its manual memory model, not a correctness
//! requirement, and ordinary ownership is the idiomatic choice in a
//! move-semantics language.

use crate::checksum::Checksum;
use crate::error::MetadataError;
use crate::utils::Evr;

/// Which of the three main documents (primary, filelists, other) have
/// contributed to a package. Each bit is set exactly once, by the parser
/// that owns that document, and checked by [`crate::merge`] to know when a
/// package is complete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LoadingFlags {
    pub primary: bool,
    pub filelists: bool,
    pub other: bool,
}

impl LoadingFlags {
    pub fn is_complete(&self) -> bool {
        self.primary && self.filelists && self.other
    }
}

/// An in-memory RPM package record, aggregated from `primary.xml`,
/// `filelists.xml` and `other.xml`.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Package {
    pub(crate) loaded: LoadingFlags,

    pub name: String,
    pub arch: String,
    pub evr: Evr,
    pub checksum: Checksum,
    pub location_href: String,
    pub location_base: Option<String>,
    pub summary: String,
    pub description: String,
    pub packager: String,
    pub url: String,
    pub time_file: u64,
    pub time_build: u64,
    pub size_package: u64,
    pub size_installed: u64,
    pub size_archive: u64,

    pub rpm_license: String,
    pub rpm_vendor: String,
    pub rpm_group: String,
    pub rpm_buildhost: String,
    pub rpm_sourcerpm: String,
    pub rpm_header_range: HeaderRange,

    pub rpm_requires: Vec<Requirement>,
    pub rpm_provides: Vec<Requirement>,
    pub rpm_conflicts: Vec<Requirement>,
    pub rpm_obsoletes: Vec<Requirement>,
    pub rpm_suggests: Vec<Requirement>,
    pub rpm_enhances: Vec<Requirement>,
    pub rpm_recommends: Vec<Requirement>,
    pub rpm_supplements: Vec<Requirement>,

    pub rpm_changelogs: Vec<Changelog>,
    pub rpm_files: Vec<PackageFile>,
}

impl Package {
    pub fn new(name: &str, evr: &Evr, arch: &str, checksum: &Checksum, location_href: &str) -> Package {
        Package {
            name: name.to_owned(),
            arch: arch.to_owned(),
            evr: evr.clone(),
            checksum: checksum.clone(),
            location_href: location_href.to_owned(),
            ..Package::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Which of `primary`/`filelists`/`other` have populated this package so far.
    pub fn loaded(&self) -> LoadingFlags {
        self.loaded
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn set_arch(&mut self, arch: impl Into<String>) -> &mut Self {
        self.arch = arch.into();
        self
    }

    pub fn evr(&self) -> &Evr {
        &self.evr
    }

    pub fn set_evr(&mut self, evr: Evr) -> &mut Self {
        self.evr = evr;
        self
    }

    /// `name-version-release.arch`, omitting a zero epoch.
    pub fn nvra(&self) -> String {
        format!("{}-{}-{}.{}", self.name, self.evr.version, self.evr.release, self.arch)
    }

    /// `nvra()` if epoch is `"0"` or empty, else `nevra()`.
    pub fn nevra_short(&self) -> String {
        if self.evr.epoch.is_empty() || self.evr.epoch == "0" {
            self.nvra()
        } else {
            self.nevra()
        }
    }

    /// `name-epoch:version-release.arch`.
    pub fn nevra(&self) -> String {
        format!(
            "{}-{}:{}-{}.{}",
            self.name, self.evr.epoch, self.evr.version, self.evr.release, self.arch
        )
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    pub fn set_checksum(&mut self, checksum: Checksum) -> &mut Self {
        self.checksum = checksum;
        self
    }

    /// The package's stable identity within a repo: the hex digest half of
    /// its checksum.
    pub fn pkgid(&self) -> &str {
        &self.checksum.value
    }

    pub fn location_href(&self) -> &str {
        &self.location_href
    }

    pub fn set_location_href(&mut self, location_href: impl Into<String>) -> &mut Self {
        self.location_href = location_href.into();
        self
    }

    pub fn location_base(&self) -> Option<&str> {
        self.location_base.as_deref()
    }

    pub fn set_location_base(&mut self, location_base: Option<impl Into<String>>) -> &mut Self {
        self.location_base = location_base.map(Into::into);
        self
    }

    pub fn requires(&self) -> &[Requirement] {
        &self.rpm_requires
    }

    pub fn set_requires(&mut self, requires: Vec<Requirement>) -> &mut Self {
        self.rpm_requires = requires;
        self
    }

    pub fn provides(&self) -> &[Requirement] {
        &self.rpm_provides
    }

    pub fn set_provides(&mut self, provides: Vec<Requirement>) -> &mut Self {
        self.rpm_provides = provides;
        self
    }

    pub fn conflicts(&self) -> &[Requirement] {
        &self.rpm_conflicts
    }

    pub fn set_conflicts(&mut self, conflicts: Vec<Requirement>) -> &mut Self {
        self.rpm_conflicts = conflicts;
        self
    }

    pub fn obsoletes(&self) -> &[Requirement] {
        &self.rpm_obsoletes
    }

    pub fn set_obsoletes(&mut self, obsoletes: Vec<Requirement>) -> &mut Self {
        self.rpm_obsoletes = obsoletes;
        self
    }

    pub fn suggests(&self) -> &[Requirement] {
        &self.rpm_suggests
    }

    pub fn set_suggests(&mut self, suggests: Vec<Requirement>) -> &mut Self {
        self.rpm_suggests = suggests;
        self
    }

    pub fn enhances(&self) -> &[Requirement] {
        &self.rpm_enhances
    }

    pub fn set_enhances(&mut self, enhances: Vec<Requirement>) -> &mut Self {
        self.rpm_enhances = enhances;
        self
    }

    pub fn recommends(&self) -> &[Requirement] {
        &self.rpm_recommends
    }

    pub fn set_recommends(&mut self, recommends: Vec<Requirement>) -> &mut Self {
        self.rpm_recommends = recommends;
        self
    }

    pub fn supplements(&self) -> &[Requirement] {
        &self.rpm_supplements
    }

    pub fn set_supplements(&mut self, supplements: Vec<Requirement>) -> &mut Self {
        self.rpm_supplements = supplements;
        self
    }

    pub fn files(&self) -> &[PackageFile] {
        &self.rpm_files
    }

    pub fn add_file(&mut self, filetype: FileType, full_path: &str) -> &mut Self {
        self.rpm_files.push(PackageFile::from_full_path(full_path, filetype));
        self
    }

    pub fn set_files(&mut self, files: Vec<PackageFile>) -> &mut Self {
        self.rpm_files = files;
        self
    }

    pub fn changelogs(&self) -> &[Changelog] {
        &self.rpm_changelogs
    }

    pub fn add_changelog(&mut self, author: &str, description: &str, date: u64) -> &mut Self {
        self.rpm_changelogs.push(Changelog {
            author: author.to_owned(),
            timestamp: date,
            description: description.to_owned(),
        });
        self
    }

    pub fn set_changelogs(&mut self, changelogs: Vec<Changelog>) -> &mut Self {
        self.rpm_changelogs = changelogs;
        self
    }

    pub fn loading_flags(&self) -> LoadingFlags {
        self.loaded
    }

    pub fn is_complete(&self) -> bool {
        self.loaded.is_complete()
    }
}

#[derive(Clone, Debug, Default, Hash, PartialEq)]
pub struct Changelog {
    pub author: String,
    pub timestamp: u64,
    pub description: String,
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq)]
pub struct HeaderRange {
    pub start: u64,
    pub end: u64,
}

/// A single dependency entry — used for `Requires`, `Provides`,
/// `Conflicts`, `Obsoletes`, `Suggests`, `Enhances`, `Recommends`, and
/// `Supplements` alike; `pre` is only meaningful on `requires`.
#[derive(Clone, Debug, Default, Hash, PartialEq)]
pub struct Requirement {
    pub name: String,
    pub flags: Option<RequirementType>,
    pub epoch: Option<String>,
    pub version: Option<String>,
    pub release: Option<String>,
    pub pre: bool,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum RequirementType {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl RequirementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementType::Lt => "LT",
            RequirementType::Le => "LE",
            RequirementType::Eq => "EQ",
            RequirementType::Ge => "GE",
            RequirementType::Gt => "GT",
        }
    }
}

impl TryFrom<&str> for RequirementType {
    type Error = MetadataError;

    fn try_from(flags: &str) -> Result<Self, Self::Error> {
        Ok(match flags {
            "LT" => RequirementType::Lt,
            "LE" => RequirementType::Le,
            "EQ" => RequirementType::Eq,
            "GE" => RequirementType::Ge,
            "GT" => RequirementType::Gt,
            other => {
                return Err(crate::error::bad_arg(format!(
                    "\"{other}\" is not a valid dependency flag"
                )))
            }
        })
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum FileType {
    #[default]
    File,
    Dir,
    Ghost,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::File => "file",
            FileType::Dir => "dir",
            FileType::Ghost => "ghost",
        }
    }
}

impl TryFrom<&str> for FileType {
    type Error = MetadataError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Ok(match s {
            "dir" => FileType::Dir,
            "ghost" => FileType::Ghost,
            "file" => FileType::File,
            other => {
                return Err(crate::error::bad_arg(format!(
                    "\"{other}\" is not a valid file type"
                )))
            }
        })
    }
}

/// A single file entry, split into directory prefix and basename so that
/// `path` + `name` reconstructs the on-disk path by plain concatenation
/// (`path` carries the trailing slash, if any) — the same split the SQLite
/// projection's per-directory filelist compression relies on.
#[derive(Clone, Debug, Default, Hash, PartialEq)]
pub struct PackageFile {
    pub path: String,
    pub name: String,
    pub filetype: FileType,
}

impl PackageFile {
    pub fn from_full_path(full_path: &str, filetype: FileType) -> Self {
        match full_path.rsplit_once('/') {
            Some((dir, base)) => PackageFile {
                path: format!("{dir}/"),
                name: base.to_owned(),
                filetype,
            },
            None => PackageFile {
                path: String::new(),
                name: full_path.to_owned(),
                filetype,
            },
        }
    }

    pub fn full_path(&self) -> String {
        format!("{}{}", self.path, self.name)
    }
}

#[cfg(feature = "read_rpm")]
mod rpm_parsing {
    use super::*;
    use crate::checksum::ChecksumType;
    use std::fs::File;
    use std::io::BufReader;
    use std::path::Path;
    use std::time::SystemTime;

    impl TryFrom<rpm::Dependency> for Requirement {
        type Error = MetadataError;

        fn try_from(d: rpm::Dependency) -> Result<Self, Self::Error> {
            let flags = if d.flags.contains(rpm::DependencyFlags::GE) {
                Some(RequirementType::Ge)
            } else if d.flags.contains(rpm::DependencyFlags::LE) {
                Some(RequirementType::Le)
            } else if d.flags.contains(rpm::DependencyFlags::EQUAL) {
                Some(RequirementType::Eq)
            } else if d.flags.contains(rpm::DependencyFlags::LESS) {
                Some(RequirementType::Lt)
            } else if d.flags.contains(rpm::DependencyFlags::GREATER) {
                Some(RequirementType::Gt)
            } else {
                None
            };

            let pre_flags = d.flags
                & (rpm::DependencyFlags::SCRIPT_PRE
                    | rpm::DependencyFlags::SCRIPT_POST
                    | rpm::DependencyFlags::PREREQ);

            let evr = Evr::parse(&d.version);

            let epoch = if evr.epoch().is_empty() {
                if d.version.is_empty() { None } else { Some("0".to_owned()) }
            } else {
                Some(evr.epoch.clone())
            };
            let version = if evr.version().is_empty() && d.version.is_empty() {
                None
            } else {
                Some(evr.version.clone())
            };
            let release = if evr.release().is_empty() { None } else { Some(evr.release.clone()) };

            Ok(Requirement {
                name: d.name,
                flags,
                epoch,
                version,
                release,
                pre: !pre_flags.is_empty(),
            })
        }
    }

    impl From<rpm::ChangelogEntry> for Changelog {
        fn from(value: rpm::ChangelogEntry) -> Self {
            Changelog {
                author: value.name,
                timestamp: value.timestamp as u64,
                description: value.description,
            }
        }
    }

    impl From<rpm::FileEntry> for PackageFile {
        fn from(value: rpm::FileEntry) -> Self {
            let filetype = if value.flags.contains(rpm::FileFlags::GHOST) {
                FileType::Ghost
            } else {
                match value.mode {
                    rpm::FileMode::Dir { .. } => FileType::Dir,
                    _ => FileType::File,
                }
            };
            let full_path = value
                .path
                .into_os_string()
                .into_string()
                .unwrap_or_default();
            PackageFile::from_full_path(&full_path, filetype)
        }
    }

    fn convert_deps(deps: Vec<rpm::Dependency>) -> Result<Vec<Requirement>, MetadataError> {
        deps.into_iter()
            .filter(|d| !d.name.starts_with("rpmlib("))
            .map(Requirement::try_from)
            .collect()
    }

    /// Builds a [`Package`] directly from an on-disk `.rpm`, for callers
    /// that want to generate repository metadata without a pre-existing
    /// `primary.xml` to crib from.
    pub fn load_rpm_package(path: &Path) -> Result<Package, MetadataError> {
        let file = File::open(path)?;
        let file_metadata = file.metadata()?;
        let pkg = rpm::PackageMetadata::parse(&mut BufReader::new(&file))?;

        let mut package = Package::default();
        package.set_name(pkg.get_name()?);

        let arch = if pkg.is_source_package() { "src" } else { pkg.get_arch()? };
        package.set_arch(arch);
        package.set_evr(Evr::new(
            pkg.get_epoch().unwrap_or(0).to_string(),
            pkg.get_version()?.to_owned(),
            pkg.get_release()?.to_owned(),
        ));

        package.summary = pkg.get_summary().unwrap_or_default().to_owned();
        package.description = pkg.get_description().unwrap_or_default().to_owned();
        package.packager = pkg.get_packager().unwrap_or_default().to_owned();
        package.url = pkg.get_url().unwrap_or_default().to_owned();
        package.time_build = pkg.get_build_time().unwrap_or(0) as u64;
        package.rpm_license = pkg.get_license().unwrap_or_default().to_owned();
        package.rpm_vendor = pkg.get_vendor().unwrap_or_default().to_owned();
        package.rpm_group = pkg.get_group().unwrap_or_default().to_owned();
        package.rpm_buildhost = pkg.get_build_host().unwrap_or_default().to_owned();
        package.rpm_sourcerpm = pkg.get_source_rpm().unwrap_or_default().to_owned();

        let archive_size = pkg
            .signature
            .get_entry_data_as_u64(rpm::IndexSignatureTag::RPMSIGTAG_LONGARCHIVESIZE)
            .unwrap_or_else(|_| {
                pkg.signature
                    .get_entry_data_as_u32(rpm::IndexSignatureTag::RPMSIGTAG_PAYLOADSIZE)
                    .unwrap_or(0) as u64
            });
        package.size_archive = archive_size;
        package.size_installed = pkg.get_installed_size().unwrap_or(0);

        package.set_requires(convert_deps(pkg.get_requires()?)?);
        package.set_provides(convert_deps(pkg.get_provides()?)?);
        package.set_conflicts(convert_deps(pkg.get_conflicts()?)?);
        package.set_obsoletes(convert_deps(pkg.get_obsoletes()?)?);
        package.set_suggests(convert_deps(pkg.get_suggests().unwrap_or_default())?);
        package.set_enhances(convert_deps(pkg.get_enhances().unwrap_or_default())?);
        package.set_recommends(convert_deps(pkg.get_recommends().unwrap_or_default())?);
        package.set_supplements(convert_deps(pkg.get_supplements().unwrap_or_default())?);

        let mut changelogs: Vec<Changelog> =
            pkg.get_changelog_entries()?.into_iter().map(Changelog::from).collect();
        changelogs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        package.set_changelogs(changelogs);

        let files: Vec<PackageFile> =
            pkg.get_file_entries()?.into_iter().map(PackageFile::from).collect();
        package.set_files(files);

        package.set_checksum(crate::checksum::checksum_file(path, ChecksumType::Sha256)?);
        package.set_location_href(path.to_string_lossy());

        let file_size = file_metadata.len();
        let unix_timestamp = file_metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        package.size_package = file_size;
        package.time_file = unix_timestamp;

        let offsets = pkg.get_package_segment_offsets();
        package.rpm_header_range = HeaderRange {
            start: offsets.header,
            end: offsets.payload,
        };

        Ok(package)
    }
}

#[cfg(feature = "read_rpm")]
pub use rpm_parsing::load_rpm_package;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumType;

    #[test]
    fn nevra_formatting() {
        let checksum = Checksum::new(ChecksumType::Sha256, "a".repeat(64));
        let evr = Evr::new("0", "1.2.3", "1.el9");
        let pkg = Package::new("bash", &evr, "x86_64", &checksum, "bash-1.2.3.rpm");
        assert_eq!(pkg.nvra(), "bash-1.2.3-1.el9.x86_64");
        assert_eq!(pkg.nevra_short(), "bash-1.2.3-1.el9.x86_64");

        let evr = Evr::new("2", "1.2.3", "1.el9");
        let pkg = Package::new("bash", &evr, "x86_64", &checksum, "bash-1.2.3.rpm");
        assert_eq!(pkg.nevra_short(), "bash-2:1.2.3-1.el9.x86_64");
    }

    #[test]
    fn file_path_name_split_reconstructs() {
        let f = PackageFile::from_full_path("/usr/share/doc/bash/README", FileType::File);
        assert_eq!(f.path, "/usr/share/doc/bash/");
        assert_eq!(f.name, "README");
        assert_eq!(f.full_path(), "/usr/share/doc/bash/README");

        let f = PackageFile::from_full_path("README", FileType::File);
        assert_eq!(f.path, "");
        assert_eq!(f.full_path(), "README");
    }

    #[test]
    fn loading_flags_completion() {
        let mut flags = LoadingFlags::default();
        assert!(!flags.is_complete());
        flags.primary = true;
        flags.filelists = true;
        flags.other = true;
        assert!(flags.is_complete());
    }
}
