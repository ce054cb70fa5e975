// SPDX-License-Identifier: MIT

//! Crash-safe file writes.
//!
//! Every durable file this runtime owns (session history, session state,
//! heartbeat/status files, response envelopes) is written with the same
//! write-to-temp-then-rename idiom, grounded on the breadcrumb writer in
//! `alfredjeanlab-oddjobs::engine::breadcrumb`. `rename` within the same
//! filesystem is atomic, so a reader never observes partial content.

use std::io;
use std::path::Path;

/// Atomically write `contents` to `path`, creating the parent directory if
/// necessary.
///
/// Writes to a sibling `<path>.tmp` file first, then renames it into place.
/// Unlike the breadcrumb writer this returns the `io::Error` instead of
/// swallowing it — callers that must not silently lose session state (the
/// memory store, the heartbeat reporter) decide for themselves whether a
/// failure is fatal.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_sibling(path);
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)
}

/// Atomically append a single line to `path`, creating it if absent.
///
/// History files are append-only, so a full rewrite-and-rename per line
/// would be wasteful; instead this opens in append mode with `O_APPEND`
/// semantics, which POSIX guarantees is atomic for writes below the
/// filesystem's atomic-write limit (our lines are always well under it).
pub fn append_line(path: &Path, line: &str) -> io::Result<()> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp");
    path.with_file_name(format!("{file_name}.tmp"))
}

#[cfg(test)]
#[path = "fsutil_tests.rs"]
mod tests;
