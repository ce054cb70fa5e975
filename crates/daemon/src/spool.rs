// SPDX-License-Identifier: MIT

//! Request Directory Spool (spec.md §4.1): polls `agent_requests/` in
//! ascending filename order, parses each `<requestId>.json` envelope, and
//! publishes `<requestId>.json` into `agent_responses/` with a
//! write-temp-then-rename, grounded on
//! `alfredjeanlab-oddjobs::engine::breadcrumb`'s atomic-write idiom (carried
//! through as `agent_core::atomic_write`) rather than that daemon's own
//! socket-based IPC, since a filesystem spool is what this runtime actually
//! exposes.

use agent_core::{atomic_write, Request, Response};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A request picked off the spool, together with where it was found.
///
/// `file_stem` is the filename-derived id that all file-level operations
/// (cancel marker, response filename) are keyed on; `request.id` may differ
/// from it when the envelope carried its own `id` (spec.md §4.1).
pub struct PickedRequest {
    pub request: Request,
    pub request_path: PathBuf,
    pub file_stem: String,
}

/// A request file that parsed as neither envelope shape.
pub struct MalformedRequest {
    pub id: String,
    pub path: PathBuf,
    pub error: String,
}

/// One entry of a [`poll_once`] batch: either ready to dispatch to a
/// Worker, or malformed and needing an immediate error response instead
/// (spec.md §4.1 "Malformed request JSON -> error response published").
pub enum PollItem {
    Ready(PickedRequest),
    Malformed(MalformedRequest),
}

/// Alternate envelope shape accepted alongside a bare [`Request`]: `{"id":
/// "...", "input": { ...request fields... }}`. The outer `id`, when
/// present, overrides the filename-derived id (spec.md §4.1).
#[derive(Deserialize)]
struct Envelope {
    id: Option<String>,
    input: Request,
}

/// Returns the parsed request plus an optional id override carried by the
/// `{id, input}` envelope shape.
fn parse_request(content: &str) -> Result<(Request, Option<String>), serde_json::Error> {
    match serde_json::from_str::<Request>(content) {
        Ok(request) => Ok((request, None)),
        Err(bare_err) => {
            serde_json::from_str::<Envelope>(content).map(|e| (e.input, e.id)).map_err(|_| bare_err)
        }
    }
}

/// The sibling cancel-marker path for a request file, e.g.
/// `agent_requests/<id>.json` -> `agent_requests/<id>.cancel`.
pub fn cancel_path(request_dir: &Path, request_id: &str) -> PathBuf {
    request_dir.join(format!("{request_id}.cancel"))
}

/// Whether `<requestId>.cancel` exists in `request_dir`.
pub fn is_cancelled(request_dir: &Path, request_id: &str) -> bool {
    cancel_path(request_dir, request_id).exists()
}

/// Removes `<requestId>.cancel` if present. Exposed so callers that discard
/// a request without going through [`publish_response`] (e.g. a mid-run
/// cancellation) can still clean up the marker.
pub fn remove_cancel_marker(request_dir: &Path, request_id: &str) {
    let _ = fs::remove_file(cancel_path(request_dir, request_id));
}

/// One poll of the request directory: every `*.json` file in ascending
/// filename order (oldest request id first, since ids are lexicographically
/// sortable by creation), skipping `*.cancel` markers.
///
/// A request that is already marked cancelled at pickup time is skipped
/// entirely (its request and cancel files are both removed, no response is
/// published) rather than handed to a Worker. A request file whose content
/// doesn't parse as either envelope shape is reported as
/// [`PollItem::Malformed`] so the caller can quarantine it and still
/// publish an error response (spec.md §4.1 "Malformed request JSON -> error
/// response published").
pub fn poll_once(request_dir: &Path) -> io::Result<Vec<PollItem>> {
    fs::create_dir_all(request_dir)?;

    let mut entries: Vec<PathBuf> = fs::read_dir(request_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    entries.sort();

    let mut picked = Vec::with_capacity(entries.len());

    for path in entries {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else { continue };

        if is_cancelled(request_dir, &stem) {
            tracing::info!(request_id = %stem, "request already cancelled at pickup; discarding");
            let _ = fs::remove_file(&path);
            remove_cancel_marker(request_dir, &stem);
            continue;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read request file");
                continue;
            }
        };

        match parse_request(&content) {
            Ok((mut request, id_override)) => {
                // The envelope's own `id` wins when present (spec.md §4.1)
                // for the request's logical identity; file-level operations
                // (cancel marker, response filename) stay keyed on the
                // filename stem regardless, since that's the name the
                // daemon and host both observe on disk.
                request.id = id_override.unwrap_or_else(|| stem.clone());
                picked.push(PollItem::Ready(PickedRequest { request, request_path: path, file_stem: stem }));
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "malformed request envelope");
                picked.push(PollItem::Malformed(MalformedRequest { id: stem, path, error: err.to_string() }));
            }
        }
    }

    Ok(picked)
}

/// Quarantines a malformed request file (renamed to `<name>.malformed` so
/// polling doesn't spin on it forever) and publishes a structured error
/// response for it (spec.md §4.1 "Malformed request JSON -> error response
/// published"; §8 "the response file exists ... if and only if the daemon
/// processed the request (not cancelled)" — a malformed, non-cancelled
/// request is still processed, just straight to an error).
pub fn handle_malformed(response_dir: &Path, malformed: &MalformedRequest) -> io::Result<()> {
    let quarantined = malformed.path.with_extension("malformed");
    fs::rename(&malformed.path, &quarantined)?;

    let response = Response::error(format!("malformed request: {}", malformed.error));
    let body = serde_json::to_vec_pretty(&response).map_err(io::Error::other)?;
    let response_path = response_dir.join(format!("{}.json", malformed.id));
    atomic_write(&response_path, &body)
}

/// Publishes `response` to `response_dir/<requestId>.json` atomically, then
/// removes the request (and any cancel marker) only after the response is
/// durably in place.
pub fn publish_response(
    response_dir: &Path,
    request_dir: &Path,
    request_id: &str,
    request_path: &Path,
    response: &Response,
) -> io::Result<()> {
    let body = serde_json::to_vec_pretty(response).map_err(io::Error::other)?;
    let response_path = response_dir.join(format!("{request_id}.json"));
    atomic_write(&response_path, &body)?;
    let _ = fs::remove_file(request_path);
    remove_cancel_marker(request_dir, request_id);
    Ok(())
}

#[cfg(test)]
#[path = "spool_tests.rs"]
mod tests;
