// Copyright (c) 2022 Daniel Alley
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Shared fixtures for the integration tests in this directory: a
//! `COMPLEX_PACKAGE` that exercises every dependency kind, file type, and
//! changelog field at once, plus a minimal `EMPTY_PACKAGE`.

use once_cell::sync::Lazy;

use rpmrepo_metadata::utils::Evr;
use rpmrepo_metadata::{
    Changelog, Checksum, ChecksumType, FileType, HeaderRange, Package, PackageFile, Requirement,
    RequirementType,
};

pub static COMPLEX_PACKAGE: Lazy<Package> = Lazy::new(|| Package {
    checksum: Checksum::new(
        ChecksumType::Sha256,
        "6e46283a16954c9cecd3799246eb1a426d7d8a8b1bc8d57c55c3da4253e200e5",
    ),
    name: "complex-package".to_owned(),
    arch: "x86_64".to_owned(),
    evr: Evr::new("1", "2.3.4", "5.el8"),
    summary: "A package for exercising many different features of RPM metadata".to_owned(),
    description: "Complex package".to_owned(),
    packager: "Michael Bluth".to_owned(),
    url: "http://bobloblaw.com".to_owned(),
    location_href: "complex-package-2.3.4-5.el8.x86_64.rpm".to_owned(),
    time_build: 1624680153,
    time_file: 1624680154,
    size_package: 8641,
    size_installed: 117,
    size_archive: 932,
    rpm_license: "MPLv2".to_owned(),
    rpm_buildhost: "localhost".to_owned(),
    rpm_sourcerpm: "complex-package-2.3.4-5.el8.src.rpm".to_owned(),
    rpm_group: "Development/Tools".to_owned(),
    rpm_header_range: HeaderRange { start: 4504, end: 8377 },
    rpm_vendor: "Bluth Company".to_owned(),
    rpm_provides: vec![
        Requirement {
            name: "complex-package".to_owned(),
            flags: Some(RequirementType::Eq),
            epoch: Some("1".to_owned()),
            version: Some("2.3.4".to_owned()),
            release: Some("5.el8".to_owned()),
            ..Requirement::default()
        },
        Requirement {
            name: "laughter".to_owned(),
            flags: Some(RequirementType::Eq),
            epoch: Some("0".to_owned()),
            version: Some("33".to_owned()),
            ..Requirement::default()
        },
        Requirement {
            name: "narration(ronhoward)".to_owned(),
            ..Requirement::default()
        },
    ],
    rpm_requires: vec![
        Requirement {
            name: "/usr/sbin/useradd".to_owned(),
            pre: true,
            ..Requirement::default()
        },
        Requirement {
            name: "arson".to_owned(),
            flags: Some(RequirementType::Ge),
            epoch: Some("0".to_owned()),
            version: Some("1.0.0".to_owned()),
            release: Some("1".to_owned()),
            ..Requirement::default()
        },
        Requirement {
            name: "fur".to_owned(),
            flags: Some(RequirementType::Le),
            epoch: Some("0".to_owned()),
            version: Some("2".to_owned()),
            ..Requirement::default()
        },
    ],
    rpm_conflicts: vec![Requirement {
        name: "foxnetwork".to_owned(),
        flags: Some(RequirementType::Gt),
        epoch: Some("0".to_owned()),
        version: Some("5555".to_owned()),
        ..Requirement::default()
    }],
    rpm_obsoletes: vec![Requirement {
        name: "bluemangroup".to_owned(),
        flags: Some(RequirementType::Lt),
        epoch: Some("0".to_owned()),
        version: Some("32.1".to_owned()),
        release: Some("0".to_owned()),
        ..Requirement::default()
    }],
    rpm_suggests: vec![Requirement {
        name: "(bobloblaw >= 1.1 if maritimelaw else anyone < 0.5.1-2)".to_owned(),
        ..Requirement::default()
    }],
    rpm_enhances: vec![Requirement {
        name: "(bananas or magic)".to_owned(),
        ..Requirement::default()
    }],
    rpm_recommends: vec![Requirement {
        name: "GeneParmesan(PI)".to_owned(),
        ..Requirement::default()
    }],
    rpm_supplements: vec![Requirement {
        name: "comedy".to_owned(),
        flags: Some(RequirementType::Eq),
        epoch: Some("0".to_owned()),
        version: Some("11.1".to_owned()),
        release: Some("4".to_owned()),
        ..Requirement::default()
    }],
    rpm_files: vec![
        PackageFile { path: "/etc/complex/".to_owned(), name: "pkg.cfg".to_owned(), filetype: FileType::File },
        PackageFile { path: "/usr/bin/".to_owned(), name: "complex_a".to_owned(), filetype: FileType::File },
        PackageFile {
            path: "/usr/share/doc/".to_owned(),
            name: "complex-package".to_owned(),
            filetype: FileType::Dir,
        },
        PackageFile {
            path: "/usr/share/doc/complex-package/".to_owned(),
            name: "README".to_owned(),
            filetype: FileType::File,
        },
        PackageFile { path: "/var/lib/".to_owned(), name: "complex".to_owned(), filetype: FileType::Dir },
        PackageFile { path: "/var/log/".to_owned(), name: "complex.log".to_owned(), filetype: FileType::Ghost },
    ],
    rpm_changelogs: vec![
        Changelog {
            author: "Lucille Bluth <lucille@bluthcompany.com> - 1.1.1-1".to_owned(),
            timestamp: 1617192000,
            description: "- It's a banana, Michael. How much could it cost, $10?".to_owned(),
        },
        Changelog {
            author: "Job Bluth <job@alliance-of-magicians.com> - 2.2.2-2".to_owned(),
            timestamp: 1619352000,
            description: "- I've made a huge mistake".to_owned(),
        },
        Changelog {
            author: "George Bluth <george@federalprison.gov> - 3.3.3-3".to_owned(),
            timestamp: 1623672000,
            description: "- There's always money in the banana stand".to_owned(),
        },
    ],
    ..Package::default()
});

pub static EMPTY_PACKAGE: Lazy<Package> = Lazy::new(|| Package {
    checksum: Checksum::new(
        ChecksumType::Sha256,
        "90fbba546300f507473547f33e229ee7bad94bbbe6e84b21d485e8e43b5f113",
    ),
    name: "rpm-empty".to_owned(),
    arch: "x86_64".to_owned(),
    evr: Evr::new("0", "0", "0"),
    location_href: "rpm-empty-0-0.x86_64.rpm".to_owned(),
    rpm_files: vec![],
    ..Package::default()
});
