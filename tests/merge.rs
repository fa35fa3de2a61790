// Copyright (c) 2022 Daniel Alley
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Full primary/filelists/other round trip through [`MergedPackageParser`],
//! exercising serialization and merging together rather than each format's
//! parser in isolation.

mod common;

use pretty_assertions::assert_eq;

use rpmrepo_metadata::{
    parse_filelists_file, parse_other_file, parse_primary_file, write_filelists_file,
    write_other_file, write_primary_file, MergedPackageParser, Package,
};

fn roundtrip(packages: &[&Package]) -> Vec<Package> {
    let primary_xml = write_primary_file(Vec::new(), packages).unwrap();
    let filelists_xml = write_filelists_file(Vec::new(), packages).unwrap();
    let other_xml = write_other_file(Vec::new(), packages).unwrap();

    let mut merger = MergedPackageParser::new(
        primary_xml.as_slice(),
        filelists_xml.as_slice(),
        other_xml.as_slice(),
    );

    let mut out = Vec::new();
    while let Some(pkg) = merger.next().unwrap() {
        out.push(pkg);
    }
    out
}

#[test]
fn merge_roundtrip_reassembles_complex_package() {
    let pkg = common::COMPLEX_PACKAGE.clone();
    let merged = roundtrip(&[&pkg]);

    assert_eq!(merged.len(), 1);
    let got = &merged[0];
    assert!(got.loaded().is_complete());
    assert_eq!(got.name, pkg.name);
    assert_eq!(got.evr, pkg.evr);
    assert_eq!(got.rpm_files, pkg.rpm_files);
    assert_eq!(got.rpm_changelogs, pkg.rpm_changelogs);
    assert_eq!(got.rpm_requires, pkg.rpm_requires);
    assert_eq!(got.rpm_provides, pkg.rpm_provides);
}

#[test]
fn merge_roundtrip_preserves_multiple_packages_independently() {
    let complex = common::COMPLEX_PACKAGE.clone();
    let empty = common::EMPTY_PACKAGE.clone();
    let merged = roundtrip(&[&complex, &empty]);

    assert_eq!(merged.len(), 2);
    let names: Vec<&str> = merged.iter().map(|p| p.name.as_str()).collect();
    assert!(names.contains(&"complex-package"));
    assert!(names.contains(&"rpm-empty"));
}

#[test]
fn each_format_can_be_parsed_back_standalone() {
    let pkg = common::COMPLEX_PACKAGE.clone();
    let primary_xml = write_primary_file(Vec::new(), &[&pkg]).unwrap();
    let filelists_xml = write_filelists_file(Vec::new(), &[&pkg]).unwrap();
    let other_xml = write_other_file(Vec::new(), &[&pkg]).unwrap();

    let mut seen_primary = Vec::new();
    let mut new_pkg_cb = |_id: &str, _name: &str, _arch: &str| Ok(Some(Package::default()));
    let mut pkg_cb = |p: Package| {
        seen_primary.push(p);
        Ok(())
    };
    let mut warning_cb = |_w| Ok(());
    parse_primary_file(
        primary_xml.as_slice(),
        Default::default(),
        &mut new_pkg_cb,
        &mut pkg_cb,
        &mut warning_cb,
    )
    .unwrap();
    assert_eq!(seen_primary.len(), 1);
    assert_eq!(seen_primary[0].name, "complex-package");

    let mut seen_filelists = Vec::new();
    let mut new_pkg_cb = |_id: &str, _name: &str, _arch: &str| Ok(Some(Package::default()));
    let mut pkg_cb = |p: Package| {
        seen_filelists.push(p);
        Ok(())
    };
    let mut warning_cb = |_w| Ok(());
    parse_filelists_file(filelists_xml.as_slice(), &mut new_pkg_cb, &mut pkg_cb, &mut warning_cb).unwrap();
    assert_eq!(seen_filelists[0].rpm_files, pkg.rpm_files);

    let mut seen_other = Vec::new();
    let mut new_pkg_cb = |_id: &str, _name: &str, _arch: &str| Ok(Some(Package::default()));
    let mut pkg_cb = |p: Package| {
        seen_other.push(p);
        Ok(())
    };
    let mut warning_cb = |_w| Ok(());
    parse_other_file(other_xml.as_slice(), &mut new_pkg_cb, &mut pkg_cb, &mut warning_cb).unwrap();
    assert_eq!(seen_other[0].rpm_changelogs, pkg.rpm_changelogs);
}
