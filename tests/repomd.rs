// Copyright (c) 2022 Daniel Alley
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `repomd.xml` write-then-parse round trip, covering tags, multiple
//! records, and the SQLite-flavored fields (`database_version`,
//! `open_checksum`, `header_checksum`).

use pretty_assertions::assert_eq;
use std::path::PathBuf;

use rpmrepo_metadata::{parse_repomd_file, write_repomd_file, Checksum, ChecksumType, RepomdData, RepomdRecord};

#[test]
fn repomd_roundtrip_preserves_tags_and_records() {
    let mut repomd = RepomdData::new();
    repomd.set_revision("1624680153");
    repomd.add_repo_tag("binary-x86_64");
    repomd.add_content_tag("rpm");
    repomd.add_distro_tag("cpe:/o:fedoraproject:fedora:35", Some("Fedora 35".to_owned()));

    let mut primary = RepomdRecord::new(
        "primary",
        PathBuf::from("repodata/deadbeef-primary.xml.gz"),
        PathBuf::from("repodata/deadbeef-primary.xml.gz"),
    );
    primary.checksum = Checksum::new(ChecksumType::Sha256, "deadbeef".repeat(8));
    primary.open_checksum = Some(Checksum::new(ChecksumType::Sha256, "cafebabe".repeat(8)));
    primary.size = Some(1234);
    primary.open_size = Some(5678);
    primary.timestamp = 1624680153;
    repomd.set_record(primary);

    let mut primary_db = RepomdRecord::new(
        "primary_db",
        PathBuf::from("repodata/feedface-primary.sqlite.bz2"),
        PathBuf::from("repodata/feedface-primary.sqlite.bz2"),
    );
    primary_db.checksum = Checksum::new(ChecksumType::Sha256, "feedface".repeat(8));
    primary_db.database_version = Some(10);
    repomd.set_record(primary_db);

    let xml = write_repomd_file(Vec::new(), &repomd).unwrap();
    let parsed = parse_repomd_file(xml.as_slice()).unwrap();

    assert_eq!(parsed.revision(), Some("1624680153"));
    assert_eq!(parsed.repo_tags(), &["binary-x86_64".to_owned()]);
    assert_eq!(parsed.content_tags(), &["rpm".to_owned()]);
    assert_eq!(parsed.distro_tags().len(), 1);
    assert_eq!(parsed.distro_tags()[0].name, "cpe:/o:fedoraproject:fedora:35");

    let got_primary = parsed.get_record("primary").unwrap();
    assert_eq!(got_primary.size, Some(1234));
    assert_eq!(got_primary.open_size, Some(5678));
    assert_eq!(got_primary.checksum, Checksum::new(ChecksumType::Sha256, "deadbeef".repeat(8)));

    let got_db = parsed.get_record("primary_db").unwrap();
    assert_eq!(got_db.database_version, Some(10));
}

#[test]
fn set_record_replaces_same_named_record() {
    let mut repomd = RepomdData::new();
    let first = RepomdRecord::new("primary", PathBuf::from("a"), PathBuf::from("a"));
    let second = RepomdRecord::new("primary", PathBuf::from("b"), PathBuf::from("b"));
    repomd.set_record(first);
    repomd.set_record(second);

    assert_eq!(repomd.records().count(), 1);
    assert_eq!(repomd.get_record("primary").unwrap().location_href, PathBuf::from("b"));
}
