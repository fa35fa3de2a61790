// Copyright (c) 2022 Daniel Alley
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

mod checksum;
mod compress;
mod download;
mod error;
mod filelist;
mod merge;
mod other;
mod package;
mod primary;
mod repomd;
mod repository;
#[cfg(feature = "sqlite")]
mod sqlite;
mod updateinfo;
pub mod utils;

pub use checksum::{Checksum, ChecksumContext, ChecksumType};
pub use compress::{CompressedReader, CompressedWriter, CompressionType, ContentStats};
pub use download::fetch_to_file;
pub use error::{ErrorKind, MetadataError};
pub use filelist::{parse_file as parse_filelists_file, write_file as write_filelists_file};
pub use merge::MergedPackageParser;
pub use other::{parse_file as parse_other_file, write_file as write_other_file};
pub use package::{
    Changelog, FileType, HeaderRange, LoadingFlags, Package, PackageFile, Requirement,
    RequirementType,
};
pub use primary::{is_primary, parse_file as parse_primary_file, write_file as write_primary_file};
pub use repomd::{parse_file as parse_repomd_file, write_file as write_repomd_file, DistroTag, RepomdData, RepomdRecord};
pub use repository::{locate, remove_metadata, remove_metadata_classic, MetadataLocation};
#[cfg(feature = "sqlite")]
pub use sqlite::{dump_filelists_db, dump_other_db, dump_primary_db};
pub use updateinfo::{
    parse_file as parse_updateinfo_file, write_file as write_updateinfo_file, UpdateCollection,
    UpdateCollectionModule, UpdateCollectionPackage, UpdateInfo, UpdateRecord, UpdateReference,
};
pub use utils::{compare_version_string, parse_nevr, parse_nevra, rpmvercmp, Evr, Nevra, NevraEvr};

pub use xml_common::{ParseWarning, WarningKind};

mod xml_common;
