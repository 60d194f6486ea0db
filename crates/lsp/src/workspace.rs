//! Filesystem helpers: project root discovery and `file://` URI handling.

use std::path::{Path, PathBuf};

use lsp_types::Uri;

/// Walk up from `start` to the nearest directory containing `marker`.
///
/// `start` may be a file or a directory. Returns `None` when the filesystem
/// root is reached without finding the marker.
pub fn find_project_root(start: &Path, marker: &str) -> Option<PathBuf> {
    let mut dir = if start.is_dir() {
        start.to_path_buf()
    } else {
        start.parent()?.to_path_buf()
    };
    loop {
        if dir.join(marker).is_file() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Workspace root from the initialize request, newest field first.
#[allow(deprecated)] // root_path/root_uri are deprecated but still sent by some clients
pub fn workspace_root(params: &lsp_types::InitializeParams) -> Option<PathBuf> {
    if let Some(folder) = params.workspace_folders.as_ref().and_then(|f| f.first()) {
        return Some(uri_to_path(&folder.uri));
    }
    if let Some(root_uri) = &params.root_uri {
        return Some(uri_to_path(root_uri));
    }
    params
        .root_path
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

/// Convert an LSP URI to a file system path.
///
/// Handles `file:///path/to/file` URIs by stripping the scheme and
/// percent-decoding (e.g. `%20` → space). Non-file URIs pass through.
pub fn uri_to_path(uri: &Uri) -> PathBuf {
    uri_str_to_path(uri.as_str())
}

pub fn uri_str_to_path(uri: &str) -> PathBuf {
    match uri.strip_prefix("file://") {
        Some(path) => {
            let decoded = percent_decode(path);
            // file:///C:/foo -> C:/foo
            #[cfg(windows)]
            let decoded = decoded
                .strip_prefix('/')
                .map(str::to_owned)
                .unwrap_or(decoded);
            PathBuf::from(decoded)
        }
        None => PathBuf::from(uri),
    }
}

/// Convert a file system path to a `file://` URI.
pub fn path_to_uri(path: &Path) -> Option<Uri> {
    let display = path.to_string_lossy().replace('\\', "/");
    let text = if display.starts_with('/') {
        format!("file://{}", percent_encode(&display))
    } else {
        format!("file:///{}", percent_encode(&display))
    };
    text.parse().ok()
}

/// Decode `%XX` escapes; malformed escapes pass through unchanged.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'/' | b'-' | b'_' | b'.' | b'~' | b':' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
