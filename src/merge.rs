//! Three-stream merging iterator (component G): drives `primary.xml`,
//! `filelists.xml` and `other.xml` in lockstep, one `<package>` at a time,
//! and yields each [`Package`] once all three streams have filled it.
//!
//! `primary.xml` doesn't carry a `pkgId` on its opening `<package>` tag, so a
//! package is always *created* by the primary stream and only *matched
//! against* by filelists/other, which do have `pkgId` up front. Both of the
//! latter validate against the head of an `in_progress` list built by
//! primary, at the index their own per-stream progress counter names —
//! exactly mirroring each other's position only when the three files list
//! packages in the same order, which is the format's contract. A mismatch at
//! that index is out-of-order input and is fatal.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::BufRead;

use crate::error::{ErrorKind, MetadataError};
use crate::filelist;
use crate::other;
use crate::package::Package;
use crate::primary::{self, PrimaryParseOptions};
use crate::xml_common::{NewPkgCallback, ParseWarning, PkgCompleteCallback, WarningCallback};

/// A package still being assembled from one or more of the three streams.
struct Pending {
    pkg: Package,
    /// `false` if the user's new-pkg callback declined this package; it is
    /// still carried through all three streams for alignment, but never
    /// handed back out.
    visible: bool,
    /// How many of the three streams have visited this slot so far (1 after
    /// primary creates it). Declined packages never get their loading flags
    /// set, so readiness to drain is tracked here rather than via
    /// `Package::is_complete`.
    touches: u8,
}

#[derive(Default)]
struct StreamState {
    /// Number of `<package>` end-tags this stream has consumed so far; also
    /// its current head-relative index into `in_progress`.
    progress: usize,
    done: bool,
}

/// Merges `primary.xml`, `filelists.xml` and `other.xml` into a stream of
/// fully-populated [`Package`] values.
///
/// Construct with [`MergedPackageParser::new`], optionally customize with
/// [`MergedPackageParser::with_new_pkg_callback`]/
/// [`MergedPackageParser::with_warning_callback`], then drive it with
/// [`MergedPackageParser::next`] (it does not implement [`Iterator`] directly
/// because `next` needs to return a package-or-none distinct from a parse
/// error without boxing the error into the item type on every call).
pub struct MergedPackageParser<'a, P: BufRead, F: BufRead, O: BufRead> {
    primary: crate::xml_common::XmlReader<P>,
    filelists: crate::xml_common::XmlReader<F>,
    other: crate::xml_common::XmlReader<O>,

    primary_state: StreamState,
    filelists_state: StreamState,
    other_state: StreamState,

    in_progress: RefCell<VecDeque<Pending>>,
    ready: VecDeque<Package>,

    new_pkg_cb: Box<NewPkgCallback<'a>>,
    warning_cb: Box<WarningCallback<'a>>,

    primary_options: PrimaryParseOptions,

    finished: bool,
}

impl<'a, P: BufRead, F: BufRead, O: BufRead> MergedPackageParser<'a, P, F, O> {
    pub fn new(primary: P, filelists: F, other: O) -> Self {
        MergedPackageParser {
            primary: crate::xml_common::XmlReader::new(primary),
            filelists: crate::xml_common::XmlReader::new(filelists),
            other: crate::xml_common::XmlReader::new(other),
            primary_state: StreamState::default(),
            filelists_state: StreamState::default(),
            other_state: StreamState::default(),
            in_progress: RefCell::new(VecDeque::new()),
            ready: VecDeque::new(),
            new_pkg_cb: Box::new(|_id, _name, _arch| Ok(Some(Package::default()))),
            warning_cb: Box::new(|_w| Ok(())),
            primary_options: PrimaryParseOptions::default(),
            finished: false,
        }
    }

    /// Overrides how `primary.xml`'s own `<file>` entries are treated; the
    /// default skips them entirely since filelists already supplies the
    /// full list once merged.
    pub fn with_primary_options(mut self, options: PrimaryParseOptions) -> Self {
        self.primary_options = options;
        self
    }

    /// Installs a callback invoked exactly once per `pkgId`, the moment
    /// primary first learns of it. Returning `None` skips that package on
    /// all three streams (it is never yielded, though its slot is still
    /// reserved to keep the three streams aligned). Returning `Err` aborts
    /// the whole merge.
    pub fn with_new_pkg_callback(
        mut self,
        cb: impl FnMut(&str, &str, &str) -> Result<Option<Package>, MetadataError> + 'a,
    ) -> Self {
        self.new_pkg_cb = Box::new(cb);
        self
    }

    pub fn with_warning_callback(
        mut self,
        cb: impl FnMut(ParseWarning) -> Result<(), MetadataError> + 'a,
    ) -> Self {
        self.warning_cb = Box::new(cb);
        self
    }

    /// Number of packages still being assembled across the three streams.
    pub fn in_progress_count(&self) -> usize {
        self.in_progress.borrow().len()
    }

    /// `true` once every stream has reached EOF and all completed packages
    /// have been drained.
    pub fn is_finished(&self) -> bool {
        self.finished && self.ready.is_empty()
    }

    /// Returns the next fully-merged package, or `Ok(None)` once all three
    /// streams are exhausted.
    pub fn next(&mut self) -> Result<Option<Package>, MetadataError> {
        loop {
            if let Some(pkg) = self.ready.pop_front() {
                return Ok(Some(pkg));
            }

            if self.primary_state.done && self.filelists_state.done && self.other_state.done {
                self.finished = true;
                let remaining = self.in_progress.borrow().len();
                if remaining > 0 {
                    return Err(MetadataError::new(
                        ErrorKind::XmlBadData,
                        format!("{remaining} package(s) never completed across all three metadata streams"),
                    ));
                }
                return Ok(None);
            }

            // Whichever stream has consumed the fewest packages advances
            // next, so all three stay within one package of each other.
            let candidates = [
                (!self.primary_state.done).then_some(self.primary_state.progress),
                (!self.filelists_state.done).then_some(self.filelists_state.progress),
                (!self.other_state.done).then_some(self.other_state.progress),
            ];
            let target = candidates.iter().flatten().copied().min().expect("loop would have exited above");

            let step = if !self.primary_state.done && self.primary_state.progress == target {
                advance_primary(
                    &mut self.primary,
                    &mut self.primary_state,
                    &self.in_progress,
                    self.primary_options,
                    &mut *self.new_pkg_cb,
                    &mut *self.warning_cb,
                )
            } else if !self.filelists_state.done && self.filelists_state.progress == target {
                advance_filelists(
                    &mut self.filelists,
                    &mut self.filelists_state,
                    &self.in_progress,
                    &mut *self.warning_cb,
                )
            } else {
                advance_other(
                    &mut self.other,
                    &mut self.other_state,
                    &self.in_progress,
                    &mut *self.warning_cb,
                )
            };

            // A fatal parse error (e.g. an out-of-order pkgId) ends the merge
            // for good: the streams are no longer aligned, so nothing past
            // this point can be trusted. `is_finished()` must reflect that
            // immediately, not just once all three streams hit EOF.
            if let Err(err) = step {
                self.finished = true;
                return Err(err);
            }

            // Every pop shifts all still-pending entries down by one slot, so
            // each stream's head-relative index must shift down with it —
            // otherwise a stream that hasn't reached the popped entry yet
            // would look up the wrong slot on its next step.
            let mut in_progress = self.in_progress.borrow_mut();
            while let Some(front) = in_progress.front() {
                if front.touches < 3 {
                    break;
                }
                let pending = in_progress.pop_front().expect("front() just succeeded");
                debug_assert!(!pending.visible || pending.pkg.is_complete());
                if pending.visible {
                    self.ready.push_back(pending.pkg);
                }
                self.primary_state.progress = self.primary_state.progress.saturating_sub(1);
                self.filelists_state.progress = self.filelists_state.progress.saturating_sub(1);
                self.other_state.progress = self.other_state.progress.saturating_sub(1);
            }
        }
    }
}

fn advance_primary<R: BufRead>(
    xml: &mut crate::xml_common::XmlReader<R>,
    state: &mut StreamState,
    in_progress: &RefCell<VecDeque<Pending>>,
    options: PrimaryParseOptions,
    new_pkg_cb: &mut NewPkgCallback<'_>,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<(), MetadataError> {
    let pending_visible: Cell<Option<bool>> = Cell::new(None);

    let mut new_pkg_wrapper = |pkgid: &str, name: &str, arch: &str| -> Result<Option<Package>, MetadataError> {
        match new_pkg_cb(pkgid, name, arch)? {
            Some(pkg) => {
                pending_visible.set(Some(true));
                Ok(Some(pkg))
            }
            None => {
                pending_visible.set(Some(false));
                Ok(Some(Package::default()))
            }
        }
    };

    let mut pkg_cb_wrapper = |pkg: Package| -> Result<(), MetadataError> {
        let visible = pending_visible.take().unwrap_or(true);
        in_progress.borrow_mut().push_back(Pending { pkg, visible, touches: 1 });
        Ok(())
    };

    let outcome = primary::parse_one_event(xml, options, &mut new_pkg_wrapper, &mut pkg_cb_wrapper, warning_cb)?;

    match outcome {
        primary::StepOutcome::Eof => state.done = true,
        primary::StepOutcome::PackageParsed | primary::StepOutcome::PackageSkipped => state.progress += 1,
        primary::StepOutcome::Other => (),
    }

    Ok(())
}

/// Shared by `advance_filelists`/`advance_other`: look up `pkgid` at the
/// stream's current head-relative index and record a visit. If the slot is
/// visible it is removed from `in_progress` for the duration of the parse
/// and its [`Package`] (plus its post-increment touch count) handed back;
/// if it was reserved-but-invisible the visit is recorded in place and
/// `None` is returned so the caller's parser skips the subtree untouched.
fn take_matching(
    in_progress: &RefCell<VecDeque<Pending>>,
    idx: usize,
    pkgid: &str,
    format: &str,
) -> Result<Option<(Package, u8)>, MetadataError> {
    let mut guard = in_progress.borrow_mut();
    match guard.get_mut(idx) {
        Some(slot) if slot.pkg.pkgid() == pkgid => {
            if slot.visible {
                let mut pending = guard.remove(idx).expect("get_mut() just succeeded");
                pending.touches += 1;
                Ok(Some((pending.pkg, pending.touches)))
            } else {
                slot.touches += 1;
                Ok(None)
            }
        }
        Some(slot) => Err(MetadataError::new(
            ErrorKind::XmlBadData,
            format!(
                "{format} package order mismatch: expected pkgId `{}`, found `{pkgid}`",
                slot.pkg.pkgid()
            ),
        )),
        None => Err(MetadataError::new(
            ErrorKind::XmlBadData,
            format!("{format} is ahead of primary.xml at pkgId `{pkgid}`"),
        )),
    }
}

fn advance_filelists<R: BufRead>(
    xml: &mut crate::xml_common::XmlReader<R>,
    state: &mut StreamState,
    in_progress: &RefCell<VecDeque<Pending>>,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<(), MetadataError> {
    let idx = state.progress;
    let touches: Cell<Option<u8>> = Cell::new(None);

    let mut new_pkg_wrapper = |pkgid: &str, _name: &str, _arch: &str| -> Result<Option<Package>, MetadataError> {
        match take_matching(in_progress, idx, pkgid, "filelists.xml")? {
            Some((pkg, t)) => {
                touches.set(Some(t));
                Ok(Some(pkg))
            }
            None => Ok(None),
        }
    };

    let mut pkg_cb_wrapper = |pkg: Package| -> Result<(), MetadataError> {
        let t = touches.take().unwrap_or(2);
        in_progress.borrow_mut().insert(idx, Pending { pkg, visible: true, touches: t });
        Ok(())
    };

    let outcome = filelist::parse_one_event(xml, &mut new_pkg_wrapper, &mut pkg_cb_wrapper, warning_cb)?;
    match outcome {
        filelist::StepOutcome::Eof => state.done = true,
        filelist::StepOutcome::PackageParsed | filelist::StepOutcome::PackageSkipped => state.progress += 1,
        filelist::StepOutcome::Other => (),
    }

    Ok(())
}

fn advance_other<R: BufRead>(
    xml: &mut crate::xml_common::XmlReader<R>,
    state: &mut StreamState,
    in_progress: &RefCell<VecDeque<Pending>>,
    warning_cb: &mut WarningCallback<'_>,
) -> Result<(), MetadataError> {
    let idx = state.progress;
    let touches: Cell<Option<u8>> = Cell::new(None);

    let mut new_pkg_wrapper = |pkgid: &str, _name: &str, _arch: &str| -> Result<Option<Package>, MetadataError> {
        match take_matching(in_progress, idx, pkgid, "other.xml")? {
            Some((pkg, t)) => {
                touches.set(Some(t));
                Ok(Some(pkg))
            }
            None => Ok(None),
        }
    };

    let mut pkg_cb_wrapper = |pkg: Package| -> Result<(), MetadataError> {
        let t = touches.take().unwrap_or(2);
        in_progress.borrow_mut().insert(idx, Pending { pkg, visible: true, touches: t });
        Ok(())
    };

    let outcome = other::parse_one_event(xml, &mut new_pkg_wrapper, &mut pkg_cb_wrapper, warning_cb)?;
    match outcome {
        other::StepOutcome::Eof => state.done = true,
        other::StepOutcome::PackageParsed | other::StepOutcome::PackageSkipped => state.progress += 1,
        other::StepOutcome::Other => (),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="2">
<package type="rpm">
  <name>alpha</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="1.0" rel="1"/>
  <checksum type="sha256" pkgid="YES">aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa</checksum>
  <summary>A</summary>
  <description/>
  <packager/>
  <url/>
  <time file="1" build="1"/>
  <size package="1" installed="1" archive="1"/>
  <location href="a.rpm"/>
  <format></format>
</package>
<package type="rpm">
  <name>beta</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="2.0" rel="1"/>
  <checksum type="sha256" pkgid="YES">bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb</checksum>
  <summary>B</summary>
  <description/>
  <packager/>
  <url/>
  <time file="1" build="1"/>
  <size package="1" installed="1" archive="1"/>
  <location href="b.rpm"/>
  <format></format>
</package>
</metadata>"#;

    const FILELISTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<filelists xmlns="http://linux.duke.edu/metadata/filelists" packages="2">
<package pkgid="aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" name="alpha" arch="x86_64">
  <version epoch="0" ver="1.0" rel="1"/>
  <file>/bin/alpha</file>
</package>
<package pkgid="bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb" name="beta" arch="x86_64">
  <version epoch="0" ver="2.0" rel="1"/>
  <file>/bin/beta</file>
</package>
</filelists>"#;

    const OTHER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<otherdata xmlns="http://linux.duke.edu/metadata/other" packages="2">
<package pkgid="aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" name="alpha" arch="x86_64">
  <version epoch="0" ver="1.0" rel="1"/>
</package>
<package pkgid="bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb" name="beta" arch="x86_64">
  <version epoch="0" ver="2.0" rel="1"/>
</package>
</otherdata>"#;

    #[test]
    fn merges_in_primary_order() {
        let mut merger =
            MergedPackageParser::new(PRIMARY.as_bytes(), FILELISTS.as_bytes(), OTHER.as_bytes());

        let first = merger.next().unwrap().unwrap();
        assert_eq!(first.name, "alpha");
        assert!(first.is_complete());
        assert_eq!(first.rpm_files.len(), 1);

        let second = merger.next().unwrap().unwrap();
        assert_eq!(second.name, "beta");
        assert!(second.is_complete());

        assert!(merger.next().unwrap().is_none());
        assert!(merger.is_finished());
    }

    #[test]
    fn out_of_order_pkgid_is_fatal() {
        let mismatched_filelists = FILELISTS.replace(
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc",
        );
        let mut merger =
            MergedPackageParser::new(PRIMARY.as_bytes(), mismatched_filelists.as_bytes(), OTHER.as_bytes());
        let err = loop {
            match merger.next() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected an out-of-order error"),
                Err(e) => break e,
            }
        };
        assert_eq!(err.kind(), ErrorKind::XmlBadData);
        assert!(merger.is_finished());
    }

    #[test]
    fn declined_package_is_not_yielded_but_keeps_alignment() {
        let mut merger = MergedPackageParser::new(PRIMARY.as_bytes(), FILELISTS.as_bytes(), OTHER.as_bytes())
            .with_new_pkg_callback(|_id, name, _arch| {
                if name == "alpha" {
                    Ok(None)
                } else {
                    Ok(Some(Package::default()))
                }
            });

        let only = merger.next().unwrap().unwrap();
        assert_eq!(only.name, "beta");
        assert!(merger.next().unwrap().is_none());
    }
}
