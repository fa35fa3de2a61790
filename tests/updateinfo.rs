// Copyright (c) 2022 Daniel Alley
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `updateinfo.xml` write-then-parse round trip across a full advisory:
//! references, a package collection, and a modular collection.

use pretty_assertions::assert_eq;

use rpmrepo_metadata::{
    parse_updateinfo_file, write_updateinfo_file, Checksum, ChecksumType, UpdateCollection,
    UpdateCollectionModule, UpdateCollectionPackage, UpdateInfo, UpdateRecord, UpdateReference,
};

fn sample_update() -> UpdateRecord {
    UpdateRecord {
        from: "updates@fedoraproject.org".to_owned(),
        status: "final".to_owned(),
        update_type: "security".to_owned(),
        version: "2".to_owned(),
        id: "FEDORA-2021-1234".to_owned(),
        title: "complex-package security update".to_owned(),
        issued: Some("2021-06-25 00:00:00".to_owned()),
        updated: Some("2021-06-26 00:00:00".to_owned()),
        rights: "Copyright Fedora Project".to_owned(),
        release: "Fedora 35".to_owned(),
        pushcount: "1".to_owned(),
        severity: "important".to_owned(),
        summary: "Fix a use-after-free in complex-package".to_owned(),
        description: "A maliciously crafted banana stand could trigger a use-after-free.".to_owned(),
        solution: "Update to the latest complex-package".to_owned(),
        reboot_suggested: false,
        references: vec![UpdateReference {
            href: "https://bugzilla.redhat.com/show_bug.cgi?id=1234567".to_owned(),
            id: "1234567".to_owned(),
            reference_type: "bugzilla".to_owned(),
            title: "complex-package: use-after-free in the banana stand".to_owned(),
        }],
        collections: vec![UpdateCollection {
            shortname: "fedora-35".to_owned(),
            name: "Fedora 35".to_owned(),
            module: Some(UpdateCollectionModule {
                name: "complex-package".to_owned(),
                stream: "rolling".to_owned(),
                version: 20210625,
                context: "deadbeef".to_owned(),
                arch: "x86_64".to_owned(),
            }),
            packages: vec![UpdateCollectionPackage {
                name: "complex-package".to_owned(),
                epoch: "1".to_owned(),
                version: "2.3.4".to_owned(),
                release: "5.el8".to_owned(),
                arch: "x86_64".to_owned(),
                src: "complex-package-2.3.4-5.el8.src.rpm".to_owned(),
                filename: "complex-package-2.3.4-5.el8.x86_64.rpm".to_owned(),
                checksum: Some(Checksum::new(ChecksumType::Sha256, "a".repeat(64))),
                reboot_suggested: true,
                restart_suggested: false,
                relogin_suggested: false,
            }],
        }],
    }
}

#[test]
fn updateinfo_roundtrip_preserves_full_advisory() {
    let updateinfo = UpdateInfo { updates: vec![sample_update()] };

    let xml = write_updateinfo_file(Vec::new(), &updateinfo).unwrap();
    let parsed = parse_updateinfo_file(xml.as_slice()).unwrap();

    assert_eq!(parsed.updates.len(), 1);
    assert_eq!(parsed.updates[0], updateinfo.updates[0]);
}

#[test]
fn updateinfo_roundtrip_handles_multiple_records() {
    let mut second = sample_update();
    second.id = "FEDORA-2021-5678".to_owned();
    second.collections.clear();
    second.references.clear();

    let updateinfo = UpdateInfo { updates: vec![sample_update(), second] };
    let xml = write_updateinfo_file(Vec::new(), &updateinfo).unwrap();
    let parsed = parse_updateinfo_file(xml.as_slice()).unwrap();

    assert_eq!(parsed.updates.len(), 2);
    assert_eq!(parsed.updates[1].id, "FEDORA-2021-5678");
    assert!(parsed.updates[1].collections.is_empty());
}
