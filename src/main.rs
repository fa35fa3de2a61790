//! Thin CLI shell around the library. A full repository-builder tool
//! (worker pools, RPM scanning, Koji merge filtering) is out of scope —
//! this binary only exercises the locator and cleanup entry points so the
//! core can be driven from a shell without writing Rust.

use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;

use rpmrepo_metadata::{locate, remove_metadata, remove_metadata_classic};

#[derive(FromArgs, PartialEq, Debug)]
/// Inspect and maintain RPM repository metadata.
struct RpmRepoExecConfig {
    #[argh(subcommand)]
    subcommand: Subcommands,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum Subcommands {
    Locate(LocateCommand),
    Clean(CleanCommand),
}

#[derive(FromArgs, PartialEq, Debug)]
/// Resolve a repository path or URL and print the files its repomd.xml lists.
#[argh(subcommand, name = "locate")]
struct LocateCommand {
    /// local path or http(s)/ftp URL of the repository root
    #[argh(positional)]
    path_or_url: String,

    /// don't resolve the *_db (SQLite) entries
    #[argh(switch)]
    ignore_sqlite: bool,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Delete stale repodata/ files.
#[argh(subcommand, name = "clean")]
struct CleanCommand {
    /// repository root containing repodata/
    #[argh(positional)]
    path: PathBuf,

    /// keep this many generations per logical file role instead of deleting everything
    #[argh(option)]
    retain: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::init();

    let config: RpmRepoExecConfig = argh::from_env();
    match config.subcommand {
        Subcommands::Locate(cmd) => locate_cmd(cmd),
        Subcommands::Clean(cmd) => clean_cmd(cmd),
    }
}

fn locate_cmd(cmd: LocateCommand) -> Result<()> {
    let location = locate(&cmd.path_or_url, cmd.ignore_sqlite)
        .with_context(|| format!("locating repository metadata at {}", cmd.path_or_url))?;

    println!("repomd.xml: {}", location.repomd_path.display());
    for (label, path) in [
        ("primary", &location.primary_xml),
        ("filelists", &location.filelists_xml),
        ("other", &location.other_xml),
        ("primary_db", &location.primary_db),
        ("filelists_db", &location.filelists_db),
        ("other_db", &location.other_db),
        ("group", &location.group),
        ("group_gz", &location.group_gz),
        ("updateinfo", &location.updateinfo),
    ] {
        if let Some(path) = path {
            println!("{label}: {}", path.display());
        }
    }
    for (kind, path) in &location.additional_metadata {
        println!("{kind} (unrecognized type): {}", path.display());
    }

    Ok(())
}

fn clean_cmd(cmd: CleanCommand) -> Result<()> {
    let removed = match cmd.retain {
        Some(retain) => remove_metadata_classic(&cmd.path, retain)
            .with_context(|| format!("pruning repodata/ under {}", cmd.path.display()))?,
        None => remove_metadata(&cmd.path)
            .with_context(|| format!("removing repodata/ under {}", cmd.path.display()))?,
    };
    log::info!("removed {removed} file(s)");
    Ok(())
}
