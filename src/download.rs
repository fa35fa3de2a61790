// Copyright (c) 2022 Daniel Alley
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A single blocking "fetch this URL to a file" helper backing the remote
//! arm of [`crate::repository::locate`]. Concurrency, retry policy, and TLS
//! configuration are outside this crate's scope (spec Non-goals) and belong
//! to the worker-pool-driving caller.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use crate::error::{ErrorKind, MetadataError};

/// Downloads `url` to `dest`, creating parent directories as needed.
pub fn fetch_to_file(url: &str, dest: &Path) -> Result<(), MetadataError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| MetadataError::with_cause(ErrorKind::Http, format!("GET {url}"), e))?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| MetadataError::with_cause(ErrorKind::Io, format!("create {}", parent.display()), e))?;
    }

    let mut file = File::create(dest)
        .map_err(|e| MetadataError::with_cause(ErrorKind::Io, format!("create {}", dest.display()), e))?;
    io::copy(&mut response.into_reader(), &mut file)
        .map_err(|e| MetadataError::with_cause(ErrorKind::Io, format!("write {}", dest.display()), e))?;

    Ok(())
}
