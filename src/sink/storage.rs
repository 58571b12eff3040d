//! Storage writer: durable, per-recipient message files
//!
//! Layout:
//!
//! ```text
//! <base_dir>/
//!   <recipient>/
//!     <RFC 3339 UTC timestamp>_<sender>.eml
//!     <RFC 3339 UTC timestamp>_<sender>.1.eml   (same sender, same second)
//! ```
//!
//! Each file holds the DATA body exactly as received.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tempfile::NamedTempFile;
use tracing::debug;

/// Write `body` to a new file under `base_dir/recipient/` and return its path.
///
/// The body goes to a temporary file in the target directory first and is
/// then linked into place without replacing anything, so a reader never sees
/// a partial `.eml` file and an existing message is never overwritten.
pub fn commit(
    base_dir: &Path,
    recipient: &str,
    sender: &str,
    timestamp: DateTime<Utc>,
    body: &[u8],
) -> io::Result<PathBuf> {
    let dir = base_dir.join(path_component(recipient));
    fs::create_dir_all(&dir)?;

    let mut file = NamedTempFile::new_in(&dir)?;
    file.write_all(body)?;
    file.as_file().sync_all()?;

    let stem = file_stem(sender, timestamp);
    let mut attempt = 0;
    loop {
        let target = dir.join(file_name(&stem, attempt));
        match file.persist_noclobber(&target) {
            Ok(_) => return Ok(target),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %target.display(), "message file exists, trying next name");
                file = e.file;
                attempt += 1;
            }
            Err(e) => return Err(e.error),
        }
    }
}

/// Copy `body` to `out`, used when no storage directory is configured
pub fn print(out: &mut impl Write, body: &[u8]) -> io::Result<()> {
    out.write_all(body)?;
    if !body.ends_with(b"\n") {
        out.write_all(b"\n")?;
    }
    out.flush()
}

/// `<timestamp>_<sender>` with second resolution and a `Z` suffix
fn file_stem(sender: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        path_component(sender)
    )
}

fn file_name(stem: &str, attempt: u32) -> String {
    match attempt {
        0 => format!("{stem}.eml"),
        n => format!("{stem}.{n}.eml"),
    }
}

/// Keep an address from escaping its directory
fn path_component(addr: &str) -> String {
    addr.replace(['/', '\\'], "_")
}
