//! SQLite projection (component K): populates the three frozen
//! `primary.sqlite`/`filelists.sqlite`/`other.sqlite` schemas from in-memory
//! packages. Table names, column order, and the `db_info` row are a wire
//! contract shared with existing readers and must not drift.

use std::path::Path;

use rusqlite::{Connection, Transaction};

use crate::checksum::Checksum;
use crate::error::{ErrorKind, MetadataError};
use crate::package::{Package, PackageFile, Requirement};
use crate::primary::is_primary;

/// `CR_DB_CACHE_DBVERSION` in the reference implementation; bumped only if
/// the schema below changes.
const DB_VERSION: i64 = 10;

fn open(path: &Path) -> Result<Connection, MetadataError> {
    let conn = Connection::open(path)
        .map_err(|e| MetadataError::with_cause(ErrorKind::Database, format!("open {}", path.display()), e))?;
    conn.execute_batch("PRAGMA synchronous = OFF; PRAGMA journal_mode = MEMORY; PRAGMA temp_store = MEMORY;")
        .map_err(sqlite_err)?;
    Ok(conn)
}

fn sqlite_err(e: rusqlite::Error) -> MetadataError {
    MetadataError::with_cause(ErrorKind::Database, "sqlite operation failed", e)
}

fn write_dbinfo(conn: &Connection, checksum: &str) -> Result<(), MetadataError> {
    conn.execute_batch("CREATE TABLE db_info (dbversion INTEGER, checksum TEXT)")
        .map_err(sqlite_err)?;
    conn.execute(
        "INSERT INTO db_info (dbversion, checksum) VALUES (?1, ?2)",
        rusqlite::params![DB_VERSION, checksum],
    )
    .map_err(sqlite_err)?;
    Ok(())
}

/// Populates `primary.sqlite` at `path` from `packages`, in the given order,
/// within a single transaction, and stamps `db_info` with `open_checksum`
/// (the checksum of the uncompressed `primary.xml`, per the manifest's
/// `open-checksum`).
pub fn dump_primary_db(path: &Path, packages: &[&Package], open_checksum: &Checksum) -> Result<(), MetadataError> {
    let mut conn = open(path)?;
    write_dbinfo(&conn, &open_checksum.value)?;

    conn.execute_batch(
        "CREATE TABLE packages (
            pkgKey INTEGER PRIMARY KEY,
            pkgId TEXT,
            name TEXT,
            arch TEXT,
            version TEXT,
            epoch TEXT,
            release TEXT,
            summary TEXT,
            description TEXT,
            url TEXT,
            time_file INTEGER,
            time_build INTEGER,
            rpm_license TEXT,
            rpm_vendor TEXT,
            rpm_group TEXT,
            rpm_buildhost TEXT,
            rpm_sourcerpm TEXT,
            rpm_header_start INTEGER,
            rpm_header_end INTEGER,
            rpm_packager TEXT,
            size_package INTEGER,
            size_installed INTEGER,
            size_archive INTEGER,
            location_href TEXT,
            location_base TEXT,
            checksum_type TEXT);
        CREATE TABLE files (
            name TEXT,
            type TEXT,
            pkgKey INTEGER);
        CREATE TABLE requires (
            name TEXT,
            flags TEXT,
            epoch TEXT,
            version TEXT,
            release TEXT,
            pkgKey INTEGER,
            pre BOOLEAN DEFAULT FALSE);
        CREATE TABLE provides (
            name TEXT,
            flags TEXT,
            epoch TEXT,
            version TEXT,
            release TEXT,
            pkgKey INTEGER);
        CREATE TABLE conflicts (
            name TEXT,
            flags TEXT,
            epoch TEXT,
            version TEXT,
            release TEXT,
            pkgKey INTEGER);
        CREATE TABLE obsoletes (
            name TEXT,
            flags TEXT,
            epoch TEXT,
            version TEXT,
            release TEXT,
            pkgKey INTEGER);
        CREATE TRIGGER removals AFTER DELETE ON packages
        BEGIN
            DELETE FROM files WHERE pkgKey = old.pkgKey;
            DELETE FROM requires WHERE pkgKey = old.pkgKey;
            DELETE FROM provides WHERE pkgKey = old.pkgKey;
            DELETE FROM conflicts WHERE pkgKey = old.pkgKey;
            DELETE FROM obsoletes WHERE pkgKey = old.pkgKey;
        END;",
    )
    .map_err(sqlite_err)?;

    {
        let txn = conn.transaction().map_err(sqlite_err)?;
        for (pkg_key, package) in packages.iter().enumerate() {
            let pkg_key = pkg_key as i64 + 1;
            insert_primary_package(&txn, pkg_key, package)?;
        }
        txn.commit().map_err(sqlite_err)?;
    }

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS packagename ON packages (name);
        CREATE INDEX IF NOT EXISTS packageId ON packages (pkgId);
        CREATE INDEX IF NOT EXISTS filenames ON files (name);
        CREATE INDEX IF NOT EXISTS pkgfiles ON files (pkgKey);
        CREATE INDEX IF NOT EXISTS pkgrequires on requires (pkgKey);
        CREATE INDEX IF NOT EXISTS requiresname ON requires (name);
        CREATE INDEX IF NOT EXISTS pkgprovides on provides (pkgKey);
        CREATE INDEX IF NOT EXISTS providesname ON provides (name);
        CREATE INDEX IF NOT EXISTS pkgconflicts on conflicts (pkgKey);
        CREATE INDEX IF NOT EXISTS pkgobsoletes on obsoletes (pkgKey);",
    )
    .map_err(sqlite_err)?;

    Ok(())
}

fn insert_primary_package(txn: &Transaction<'_>, pkg_key: i64, package: &Package) -> Result<(), MetadataError> {
    txn.execute(
        "INSERT INTO packages (
            pkgId, name, arch, version, epoch, release, summary, description,
            url, time_file, time_build, rpm_license, rpm_vendor, rpm_group,
            rpm_buildhost, rpm_sourcerpm, rpm_header_start, rpm_header_end,
            rpm_packager, size_package, size_installed, size_archive,
            location_href, location_base, checksum_type)
        VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25)",
        rusqlite::params![
            package.checksum.value,
            package.name,
            package.arch,
            package.evr.version,
            package.evr.epoch,
            package.evr.release,
            package.summary,
            package.description,
            package.url,
            package.time_file as i64,
            package.time_build as i64,
            package.rpm_license,
            package.rpm_vendor,
            package.rpm_group,
            package.rpm_buildhost,
            package.rpm_sourcerpm,
            package.rpm_header_range.start as i64,
            package.rpm_header_range.end as i64,
            package.packager,
            package.size_package as i64,
            package.size_installed as i64,
            package.size_archive as i64,
            package.location_href,
            package.location_base,
            package.checksum.checksum_type.as_str(),
        ],
    )
    .map_err(sqlite_err)?;

    for file in &package.rpm_files {
        insert_file(txn, pkg_key, file)?;
    }
    for req in &package.rpm_requires {
        insert_dep(txn, "requires", pkg_key, req, true)?;
    }
    for req in &package.rpm_provides {
        insert_dep(txn, "provides", pkg_key, req, false)?;
    }
    for req in &package.rpm_conflicts {
        insert_dep(txn, "conflicts", pkg_key, req, false)?;
    }
    for req in &package.rpm_obsoletes {
        insert_dep(txn, "obsoletes", pkg_key, req, false)?;
    }

    Ok(())
}

fn insert_file(txn: &Transaction<'_>, pkg_key: i64, file: &PackageFile) -> Result<(), MetadataError> {
    let full_path = file.full_path();
    if !is_primary(&full_path) {
        return Ok(());
    }
    txn.execute(
        "INSERT INTO files (name, type, pkgKey) VALUES (?1, ?2, ?3)",
        rusqlite::params![full_path, file.filetype.as_str(), pkg_key],
    )
    .map_err(sqlite_err)?;
    Ok(())
}

fn insert_dep(
    txn: &Transaction<'_>,
    table: &str,
    pkg_key: i64,
    req: &Requirement,
    with_pre: bool,
) -> Result<(), MetadataError> {
    let flags = req.flags.map(|f| f.as_str());
    if with_pre {
        txn.execute(
            &format!("INSERT INTO {table} (name, flags, epoch, version, release, pkgKey, pre) VALUES (?1,?2,?3,?4,?5,?6,?7)"),
            rusqlite::params![req.name, flags, req.epoch, req.version, req.release, pkg_key, req.pre],
        )
    } else {
        txn.execute(
            &format!("INSERT INTO {table} (name, flags, epoch, version, release, pkgKey) VALUES (?1,?2,?3,?4,?5,?6)"),
            rusqlite::params![req.name, flags, req.epoch, req.version, req.release, pkg_key],
        )
    }
    .map_err(sqlite_err)?;
    Ok(())
}

/// Populates `filelists.sqlite` at `path`, compressing each package's files
/// into one row per directory (`filenames`/`filetypes` parallel strings).
pub fn dump_filelists_db(path: &Path, packages: &[&Package], open_checksum: &Checksum) -> Result<(), MetadataError> {
    let mut conn = open(path)?;
    write_dbinfo(&conn, &open_checksum.value)?;

    conn.execute_batch(
        "CREATE TABLE packages (pkgKey INTEGER PRIMARY KEY, pkgId TEXT);
        CREATE TABLE filelist (
            pkgKey INTEGER,
            dirname TEXT,
            filenames TEXT,
            filetypes TEXT);
        CREATE TRIGGER remove_filelist AFTER DELETE ON packages
        BEGIN DELETE FROM filelist WHERE pkgKey = old.pkgKey; END;",
    )
    .map_err(sqlite_err)?;

    {
        let txn = conn.transaction().map_err(sqlite_err)?;
        for (pkg_key, package) in packages.iter().enumerate() {
            let pkg_key = pkg_key as i64 + 1;
            txn.execute(
                "INSERT INTO packages (pkgKey, pkgId) VALUES (?1, ?2)",
                rusqlite::params![pkg_key, package.checksum.value],
            )
            .map_err(sqlite_err)?;

            for (dirname, filenames, filetypes) in encode_filelist(&package.rpm_files) {
                txn.execute(
                    "INSERT INTO filelist (pkgKey, dirname, filenames, filetypes) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![pkg_key, dirname, filenames, filetypes],
                )
                .map_err(sqlite_err)?;
            }
        }
        txn.commit().map_err(sqlite_err)?;
    }

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS keyfile ON filelist (pkgKey);
        CREATE INDEX IF NOT EXISTS pkgId ON packages (pkgId);
        CREATE INDEX IF NOT EXISTS dirnames ON filelist (dirname);",
    )
    .map_err(sqlite_err)?;

    Ok(())
}

/// Groups `files` by directory, trimming trailing slashes (an all-slash
/// directory collapses to `/`, no directory at all to `.`), joining
/// basenames with `/` and encoding each entry's type as a single character
/// (`f`/`d`/`g`) in the same position.
fn encode_filelist(files: &[PackageFile]) -> Vec<(String, String, String)> {
    use indexmap::IndexMap;

    let mut by_dir: IndexMap<String, (String, String)> = IndexMap::new();
    for file in files {
        let mut dir = file.path.trim_end_matches('/').to_owned();
        if file.path.starts_with('/') && dir.is_empty() {
            dir = "/".to_owned();
        } else if dir.is_empty() {
            dir = ".".to_owned();
        }

        let entry = by_dir.entry(dir).or_default();
        if !entry.0.is_empty() {
            entry.0.push('/');
        }
        if file.name.is_empty() {
            entry.0.push('/');
        } else {
            entry.0.push_str(&file.name);
        }
        entry.1.push(match file.filetype {
            crate::package::FileType::File => 'f',
            crate::package::FileType::Dir => 'd',
            crate::package::FileType::Ghost => 'g',
        });
    }

    by_dir
        .into_iter()
        .map(|(dir, (names, types))| (dir, names, types))
        .collect()
}

/// Populates `other.sqlite` at `path` with one `changelog` row per entry, in
/// file order.
pub fn dump_other_db(path: &Path, packages: &[&Package], open_checksum: &Checksum) -> Result<(), MetadataError> {
    let mut conn = open(path)?;
    write_dbinfo(&conn, &open_checksum.value)?;

    conn.execute_batch(
        "CREATE TABLE packages (pkgKey INTEGER PRIMARY KEY, pkgId TEXT);
        CREATE TABLE changelog (
            pkgKey INTEGER,
            author TEXT,
            date INTEGER,
            changelog TEXT);
        CREATE TRIGGER remove_changelogs AFTER DELETE ON packages
        BEGIN DELETE FROM changelog WHERE pkgKey = old.pkgKey; END;",
    )
    .map_err(sqlite_err)?;

    {
        let txn = conn.transaction().map_err(sqlite_err)?;
        for (pkg_key, package) in packages.iter().enumerate() {
            let pkg_key = pkg_key as i64 + 1;
            txn.execute(
                "INSERT INTO packages (pkgKey, pkgId) VALUES (?1, ?2)",
                rusqlite::params![pkg_key, package.checksum.value],
            )
            .map_err(sqlite_err)?;

            for changelog in &package.rpm_changelogs {
                txn.execute(
                    "INSERT INTO changelog (pkgKey, author, date, changelog) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![pkg_key, changelog.author, changelog.timestamp as i64, changelog.description],
                )
                .map_err(sqlite_err)?;
            }
        }
        txn.commit().map_err(sqlite_err)?;
    }

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS keychange ON changelog (pkgKey);
        CREATE INDEX IF NOT EXISTS pkgId ON packages (pkgId);",
    )
    .map_err(sqlite_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumType;
    use crate::package::FileType;
    use crate::utils::Evr;

    fn sample_package() -> Package {
        let mut pkg = Package::new(
            "deadbeef",
            &Evr::new("0", "1.8.4", "2.fc33"),
            "x86_64",
            &Checksum::new(
                ChecksumType::Sha256,
                "a2d3bce512f79b0bc840ca7912a86bbc0016cf06d5c363ffbb6fd5e1ef03de1b",
            ),
            "deadbeef-1.8.4-2.fc33.x86_64.rpm",
        );
        pkg.add_file(FileType::Dir, "/etc/fonts/conf.avail");
        pkg.add_file(FileType::File, "/etc/fonts/conf.avail/10-autohint.conf");
        pkg.add_file(FileType::File, "/usr/bin/deadbeef");
        pkg.add_changelog("A <a@example.com>", "- Update", 1554724800);
        pkg
    }

    #[test]
    fn encode_filelist_groups_by_directory() {
        let pkg = sample_package();
        let rows = encode_filelist(&pkg.rpm_files);
        // each file's own directory groups separately, whether or not that
        // file is itself a directory entry: "/etc/fonts" (holding the
        // "conf.avail" dir entry), "/etc/fonts/conf.avail" (holding the file
        // inside it), and "/usr/bin".
        assert_eq!(rows.len(), 3);
        let fonts = rows.iter().find(|(d, _, _)| d == "/etc/fonts").unwrap();
        assert_eq!(fonts.1, "conf.avail");
        assert_eq!(fonts.2, "d");
        let conf_avail = rows.iter().find(|(d, _, _)| d == "/etc/fonts/conf.avail").unwrap();
        assert_eq!(conf_avail.1, "10-autohint.conf");
        assert_eq!(conf_avail.2, "f");
        let usr_bin = rows.iter().find(|(d, _, _)| d == "/usr/bin").unwrap();
        assert_eq!(usr_bin.1, "deadbeef");
    }

    #[test]
    fn dump_primary_db_round_trips_a_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.sqlite");
        let pkg = sample_package();
        let checksum = Checksum::new(ChecksumType::Sha256, "0".repeat(64));
        dump_primary_db(&path, &[&pkg], &checksum).unwrap();

        let conn = Connection::open(&path).unwrap();
        let name: String = conn
            .query_row("SELECT name FROM packages WHERE pkgId = ?1", [&pkg.checksum.value], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "deadbeef");

        let file_count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0)).unwrap();
        // /etc/fonts/conf.avail(/10-autohint.conf) matches is_primary via "/etc/", /usr/bin/deadbeef via "bin/"
        assert_eq!(file_count, 3);

        let dbversion: i64 = conn.query_row("SELECT dbversion FROM db_info", [], |row| row.get(0)).unwrap();
        assert_eq!(dbversion, DB_VERSION);
    }

    #[test]
    fn dump_filelists_db_compresses_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filelists.sqlite");
        let pkg = sample_package();
        let checksum = Checksum::new(ChecksumType::Sha256, "0".repeat(64));
        dump_filelists_db(&path, &[&pkg], &checksum).unwrap();

        let conn = Connection::open(&path).unwrap();
        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM filelist", [], |row| row.get(0)).unwrap();
        assert_eq!(rows, 3);
    }

    #[test]
    fn dump_other_db_writes_changelog_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.sqlite");
        let pkg = sample_package();
        let checksum = Checksum::new(ChecksumType::Sha256, "0".repeat(64));
        dump_other_db(&path, &[&pkg], &checksum).unwrap();

        let conn = Connection::open(&path).unwrap();
        let author: String = conn
            .query_row("SELECT author FROM changelog WHERE pkgKey = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(author, "A <a@example.com>");
    }
}
