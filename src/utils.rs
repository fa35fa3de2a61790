//! Utilities (component L): EVR comparison, NEVRA/NEVR parsing, temp-path
//! generation, atomic file operations, and generation-retention pruning.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ErrorKind, MetadataError};

/// A full RPM "version" specifier: Epoch, Version, and Release.
///
/// Epoch overrides all other fields and is generally only used as a last
/// resort, in cases where a change to the versioning scheme or a packaging
/// error would otherwise cause newer packages to sort as older.
///
/// Tilde (`~`) sorts before everything, including the empty string, marking
/// pre-releases (`0.5.0` > `0.5.0~rc1`). Caret (`^`) sorts after, marking
/// snapshots not tied to an upstream release (`0.5.0` < `0.5.0^deadbeef`).
#[derive(Clone, Debug, Default, Eq, Hash)]
pub struct Evr {
    pub epoch: String,
    pub version: String,
    pub release: String,
}

impl Evr {
    pub fn new<T: Into<String>>(epoch: T, version: T, release: T) -> Evr {
        Evr {
            epoch: epoch.into(),
            version: version.into(),
            release: release.into(),
        }
    }

    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn values(&self) -> (&str, &str, &str) {
        (&self.epoch, &self.version, &self.release)
    }

    /// Splits `"E:V-R"` into its three components without allocating.
    /// Missing epoch or release is the empty string, not `"0"` — callers
    /// compare with `Evr::cmp`, which treats a missing epoch as zero.
    pub fn parse_values(evr: &str) -> (&str, &str, &str) {
        let (epoch, vr) = evr.split_once(':').unwrap_or(evr.split_at(0));
        let (version, release) = vr.split_once('-').unwrap_or((vr, ""));
        (epoch, version, release)
    }

    pub fn parse(evr: &str) -> Self {
        Evr::parse_values(evr).into()
    }
}

impl From<(&str, &str, &str)> for Evr {
    fn from(val: (&str, &str, &str)) -> Self {
        Evr::new(val.0, val.1, val.2)
    }
}

impl PartialEq for Evr {
    fn eq(&self, other: &Self) -> bool {
        ((self.epoch == other.epoch)
            || (self.epoch.is_empty() && other.epoch == "0")
            || (self.epoch == "0" && other.epoch.is_empty()))
            && self.version == other.version
            && self.release == other.release
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.epoch.is_empty() {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}-{}", self.version, self.release)
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        let epoch_1 = if self.epoch.is_empty() { "0" } else { &self.epoch };
        let epoch_2 = if other.epoch.is_empty() { "0" } else { &other.epoch };

        let epoch_cmp = compare_version_string(epoch_1, epoch_2);
        if epoch_cmp != Ordering::Equal {
            return epoch_cmp;
        }

        let version_cmp = compare_version_string(&self.version, &other.version);
        if version_cmp != Ordering::Equal {
            return version_cmp;
        }

        compare_version_string(&self.release, &other.release)
    }
}

/// `rpmvercmp`: split each string into maximal runs of digits or
/// alphabetics, skipping everything else; compare digit runs numerically
/// (after stripping leading zeros), alphabetic runs lexicographically; a
/// digit run outranks an alphabetic run; `~` sorts before everything
/// (including empty), `^` sorts after.
///
/// Rust's `Ordering` is this crate's rendition of the "-1/0/+1" convention
/// spec'd for `cmp_version_str`; upstream has two such helpers that disagree
/// on which integer means "greater" — `Ordering` sidesteps the ambiguity
/// entirely by naming the three outcomes instead of numbering them.
pub fn compare_version_string(version1: &str, version2: &str) -> Ordering {
    if version1 == version2 {
        return Ordering::Equal;
    }

    let mut version1_part = version1;
    let mut version2_part = version2;

    let not_alphanumeric_tilde_or_caret =
        |c: char| !c.is_ascii_alphanumeric() && c != '~' && c != '^';

    loop {
        version1_part = version1_part.trim_start_matches(not_alphanumeric_tilde_or_caret);
        version2_part = version2_part.trim_start_matches(not_alphanumeric_tilde_or_caret);

        match (
            version1_part.strip_prefix('~'),
            version2_part.strip_prefix('~'),
        ) {
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (Some(a), Some(b)) => {
                version1_part = a;
                version2_part = b;
                continue;
            }
            _ => (),
        }

        match (
            version1_part.strip_prefix('^'),
            version2_part.strip_prefix('^'),
        ) {
            (Some(_), None) => {
                return if version2_part.is_empty() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (None, Some(_)) => {
                return if version1_part.is_empty() {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (Some(a), Some(b)) => {
                version1_part = a;
                version2_part = b;
                continue;
            }
            _ => (),
        }

        if version1_part.is_empty() || version2_part.is_empty() {
            break;
        }

        fn matching_contiguous<F>(string: &str, pat: F) -> Option<(&str, &str)>
        where
            F: Fn(char) -> bool,
        {
            Some(
                string.split_at(
                    string
                        .find(|c| !pat(c))
                        .or(Some(string.len()))
                        .filter(|&x| x > 0)?,
                ),
            )
        }

        if version1_part.starts_with(|c: char| c.is_ascii_digit()) {
            match (
                matching_contiguous(version1_part, |c| c.is_ascii_digit()),
                matching_contiguous(version2_part, |c| c.is_ascii_digit()),
            ) {
                (Some(a), Some(b)) => {
                    let (prefix1, rest1) = a;
                    let (prefix2, rest2) = b;
                    version1_part = rest1;
                    version2_part = rest2;
                    let ordering = prefix1
                        .trim_start_matches('0')
                        .len()
                        .cmp(&prefix2.trim_start_matches('0').len());
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                    let ordering = prefix1.cmp(prefix2);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                (Some(_), None) => return Ordering::Greater,
                _ => unreachable!(),
            }
        } else {
            match (
                matching_contiguous(version1_part, |c| c.is_ascii_alphabetic()),
                matching_contiguous(version2_part, |c| c.is_ascii_alphabetic()),
            ) {
                (Some(a), Some(b)) => {
                    let (prefix1, rest1) = a;
                    let (prefix2, rest2) = b;
                    version1_part = rest1;
                    version2_part = rest2;
                    let ordering = prefix1.cmp(prefix2);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                (Some(_), None) => return Ordering::Less,
                _ => unreachable!(),
            }
        }
    }

    if version1_part.is_empty() && version2_part.is_empty() {
        return Ordering::Equal;
    }

    version1_part.len().cmp(&version2_part.len())
}

/// Compares two full EVR strings (`"E:V-R"`).
pub fn rpmvercmp(evr1: &str, evr2: &str) -> Ordering {
    Evr::parse(evr1).cmp(&Evr::parse(evr2))
}

/// A parsed name-epoch-version-release(-architecture) identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nevra {
    pub name: String,
    pub evr: NevraEvr,
    pub arch: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NevraEvr {
    pub epoch: String,
    pub version: String,
    pub release: String,
}

/// Parses `N-V-R:E`, `E:N-V-R`, or `N-E:V-R` forms; epoch defaults to `"0"`
/// when absent. Arch is split off the end by the *last* `.` only if the
/// remainder still parses as a valid NEVR (has at least name-version-release).
pub fn parse_nevra(input: &str) -> Result<Nevra, MetadataError> {
    // E:N-V-R
    if let Some((epoch, rest)) = input.split_once(':') {
        if let Some((nv, release)) = rsplit_nv_r(rest) {
            return Ok(finish_nevra(nv, epoch, release, None));
        }
    }

    // Try splitting off an architecture suffix and re-parsing as NEVR.
    if let Some((base, arch)) = input.rsplit_once('.') {
        if let Ok(without_arch) = parse_nevr(base) {
            return Ok(Nevra {
                name: without_arch.name,
                evr: without_arch.evr,
                arch: Some(arch.to_owned()),
            });
        }
    }

    let nevr = parse_nevr(input)?;
    Ok(Nevra {
        name: nevr.name,
        evr: nevr.evr,
        arch: None,
    })
}

/// Parses `N-V-R:E` or `N-E:V-R` (no architecture component).
pub fn parse_nevr(input: &str) -> Result<Nevra, MetadataError> {
    if let Some((epoch, rest)) = input.split_once(':') {
        // Could be "N-E:V-R" (epoch embedded after name-) or a bare "E:V-R"
        // with no name at all, the latter is invalid for a NEVR.
        if let Some((name, ev_rest)) = epoch.rsplit_once('-') {
            if let Some((version, release)) = rest.split_once('-') {
                return Ok(finish_nevra(
                    &format!("{name}-{version}"),
                    ev_rest,
                    release,
                    None,
                ));
            }
        }
        if let Some((nv, release)) = rsplit_nv_r(rest) {
            return Ok(finish_nevra(nv, epoch, release, None));
        }
        return Err(MetadataError::new(
            ErrorKind::BadArg,
            format!("\"{input}\" is not a valid N-V-R"),
        ));
    }

    match rsplit_nv_r(input) {
        Some((nv, release)) => Ok(finish_nevra(nv, "0", release, None)),
        None => Err(MetadataError::new(
            ErrorKind::BadArg,
            format!("\"{input}\" is not a valid N-V-R"),
        )),
    }
}

/// Splits `"name-version-release"` at the last two hyphens.
fn rsplit_nv_r(input: &str) -> Option<(&str, &str)> {
    let (nv, release) = input.rsplit_once('-')?;
    // nv must still contain a '-' separating name from version.
    nv.rsplit_once('-')?;
    Some((nv, release))
}

fn finish_nevra(nv: &str, epoch: &str, release: &str, arch: Option<String>) -> Nevra {
    let (name, version) = nv.rsplit_once('-').unwrap_or((nv, ""));
    Nevra {
        name: name.to_owned(),
        evr: NevraEvr {
            epoch: if epoch.is_empty() { "0".to_owned() } else { epoch.to_owned() },
            version: version.to_owned(),
            release: release.to_owned(),
        },
        arch,
    }
}

/// Produces `prefix<pid>.YYYYmmddHHMMSS.<usec><suffix>`, deterministic given
/// the clock and pid. Used to name scratch files that must not collide
/// across concurrent runs touching the same directory.
pub fn append_pid_and_datetime(prefix: &str, suffix: &str) -> String {
    let pid = std::process::id();
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs();
    let usec = now.subsec_micros();

    let (year, month, day, hour, min, sec) = civil_from_unix(secs as i64);

    format!(
        "{prefix}{pid}.{year:04}{month:02}{day:02}{hour:02}{min:02}{sec:02}.{usec}{suffix}"
    )
}

/// Converts a Unix timestamp (UTC) into (year, month, day, hour, min, sec),
/// using Howard Hinnant's civil_from_days algorithm — no `chrono` dependency
/// needed for this one conversion.
fn civil_from_unix(unix: i64) -> (i64, u32, u32, u32, u32, u32) {
    let days = unix.div_euclid(86400);
    let secs_of_day = unix.rem_euclid(86400);
    let hour = (secs_of_day / 3600) as u32;
    let min = ((secs_of_day % 3600) / 60) as u32;
    let sec = (secs_of_day % 60) as u32;

    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };

    (y, m, d, hour, min, sec)
}

/// Copies `src` to a temp file in `dest`'s directory, then renames it into
/// place — partial output is never visible under `dest`'s final name.
pub fn atomic_copy(src: &Path, dest: &Path) -> Result<(), MetadataError> {
    let dest_dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let tmp_name = append_pid_and_datetime(".rpmrepo_metadata.", ".tmp");
    let tmp_path = dest_dir.join(tmp_name);

    let result = (|| -> Result<(), MetadataError> {
        fs::copy(src, &tmp_path)?;
        fs::rename(&tmp_path, dest)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Groups `entries` by `key`, sorts each group by descending mtime, and
/// returns the entries past the `retain`-th in each group — i.e. what
/// `remove_metadata_classic` should delete.
pub fn prune_by_generation<T, K, F>(entries: Vec<T>, retain: usize, mut key: F) -> Vec<T>
where
    K: Eq + std::hash::Hash,
    F: FnMut(&T) -> (K, std::time::SystemTime),
{
    use std::collections::HashMap;

    let mut groups: HashMap<K, Vec<(T, std::time::SystemTime)>> = HashMap::new();
    for entry in entries {
        let (k, mtime) = key(&entry);
        groups.entry(k).or_default().push((entry, mtime));
    }

    let mut to_remove = Vec::new();
    for (_, mut group) in groups {
        group.sort_by(|a, b| b.1.cmp(&a.1));
        to_remove.extend(group.into_iter().skip(retain).map(|(entry, _)| entry));
    }
    to_remove
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evr_tostring() {
        let evr = Evr::new("", "1.2.3", "45");
        assert_eq!("1.2.3-45", evr.to_string());

        let evr = Evr::new("0", "1.2.3", "45");
        assert_eq!("0:1.2.3-45", evr.to_string());
    }

    #[test]
    fn evr_parse() {
        assert_eq!(Evr::parse("1.2.3-45"), Evr::new("", "1.2.3", "45"));
        assert_eq!(Evr::parse("0:1.2.3-45"), Evr::new("0", "1.2.3", "45"));
    }

    #[test]
    fn evr_ord_epoch_dominates() {
        assert!(Evr::parse("1.2.3-45") == Evr::parse("0:1.2.3-45"));
        assert!(Evr::parse("1.2.3-45") < Evr::parse("1:1.2.3-45"));
        assert!(Evr::parse("4.2.3-45") < Evr::parse("1:1.2.3-45"));
    }

    #[test]
    fn evr_ord_tilde_and_caret() {
        assert!(Evr::parse("~1.2.3-45") < Evr::parse("1.2.3-45"));
        assert!(Evr::parse("~12.2.3-45") > Evr::parse("~1.2.3-45"));
        assert!(Evr::parse("~3:12.2.3-45") < Evr::parse("0:1.2.3-45"));
    }

    #[test]
    fn spec_concrete_cases() {
        assert_eq!(compare_version_string("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_version_string("6.3.2azb", "6.3.2abc"), Ordering::Greater);
        assert_eq!(rpmvercmp("1~rc1", "1"), Ordering::Less);
        // An explicit epoch of 0 and a missing epoch are the same EVR — the
        // spec's "`cmp("0", "") == 0`" bullet is about epoch normalization,
        // not about comparing "0" and "" as version strings (which correctly
        // sort as Greater: a non-empty segment outranks an exhausted one).
        assert_eq!(Evr::parse("0:1-1"), Evr::parse("1-1"));
    }

    #[test]
    fn evr_parse_values_edge_cases() {
        assert_eq!(Evr::parse_values("-"), ("", "", ""));
        assert_eq!(Evr::parse_values("."), ("", ".", ""));
        assert_eq!(Evr::parse_values(":"), ("", "", ""));
        assert_eq!(Evr::parse_values(":-"), ("", "", ""));
        assert_eq!(Evr::parse_values(".-"), ("", ".", ""));
        assert_eq!(Evr::parse_values("0"), ("", "0", ""));
        assert_eq!(Evr::parse_values("0-"), ("", "0", ""));
        assert_eq!(Evr::parse_values(":0"), ("", "0", ""));
        assert_eq!(Evr::parse_values("0:"), ("0", "", ""));
        assert_eq!(Evr::parse_values("asdf:"), ("asdf", "", ""));
        assert_eq!(Evr::parse_values("~:"), ("~", "", ""));
    }

    #[test]
    fn nevra_forms() {
        let n = parse_nevra("bash-5.1.8-1.el9.x86_64").unwrap();
        assert_eq!(n.name, "bash");
        assert_eq!(n.evr.epoch, "0");
        assert_eq!(n.evr.version, "5.1.8");
        assert_eq!(n.evr.release, "1.el9");
        assert_eq!(n.arch.as_deref(), Some("x86_64"));

        let n = parse_nevra("1:bash-5.1.8-1.el9.x86_64").unwrap();
        assert_eq!(n.evr.epoch, "1");

        let n = parse_nevr("bash-1:5.1.8-1.el9").unwrap();
        assert_eq!(n.name, "bash");
        assert_eq!(n.evr.epoch, "1");
        assert_eq!(n.evr.version, "5.1.8");
        assert_eq!(n.evr.release, "1.el9");
    }

    #[test]
    fn append_pid_and_datetime_shape() {
        let s = append_pid_and_datetime("primary.xml.", ".tmp");
        assert!(s.starts_with("primary.xml."));
        assert!(s.ends_with(".tmp"));
    }

    #[test]
    fn prune_keeps_most_recent() {
        use std::time::Duration;
        let now = SystemTime::now();
        let entries = vec![
            ("primary", now - Duration::from_secs(30), "oldest"),
            ("primary", now - Duration::from_secs(10), "middle"),
            ("primary", now, "newest"),
        ];
        let removed = prune_by_generation(entries, 1, |e| (e.0, e.1));
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|e| e.2 != "newest"));
    }
}
