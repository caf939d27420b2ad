//! File Transfer profile.
//!
//! Objects are files below the session root; SETPATH navigates folders and
//! a GET of [`FOLDER_LISTING_TYPE`] returns the folder-listing document of
//! the current folder.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use tracing::debug;

use super::{accept_put, object_path, open_destination, start_body};
use crate::codec::{format_iso8601, SetPathFlags};
use crate::error::{ObexError, Result};
use crate::protocol::{CommandCaps, CommandTable, ObexObject, ServiceKind, SessionState};

/// MIME type of folder-listing objects
pub const FOLDER_LISTING_TYPE: &str = "x-obex/folder-listing";

const LISTING_HEADER: &str = concat!(
    "<?xml version=\"1.0\"?>\n",
    "<!DOCTYPE folder-listing SYSTEM \"obex-folder-listing.dtd\">\n",
    "<folder-listing version=\"1.0\">\n",
);

/// File Transfer command table
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransfer;

impl FileTransfer {
    /// Create the table
    pub fn new() -> Self {
        Self
    }
}

impl CommandTable for FileTransfer {
    fn service(&self) -> ServiceKind {
        ServiceKind::FileTransfer
    }

    fn capabilities(&self) -> CommandCaps {
        CommandCaps::all()
    }

    fn get(&self, session: &mut SessionState, obj: &mut ObexObject) -> Result<()> {
        let size = if session.mime_type() == Some(FOLDER_LISTING_TYPE) {
            let folder = match session.name() {
                Some(name) => object_path(session.current_folder(), name)?,
                None => session.current_folder().to_path_buf(),
            };
            let listing = folder_listing(&folder, folder != session.root())?;
            session.prepare_memory(Bytes::from(listing))
        } else {
            let name = session
                .name()
                .ok_or_else(|| ObexError::BadRequest("GET without name".to_string()))?;
            let path = object_path(session.current_folder(), name)?;
            if path.is_dir() {
                return Err(ObexError::Forbidden(format!("{name:?} is a folder")));
            }
            session.prepare_get(&path)?
        };

        start_body(obj, size)
    }

    fn put(&self, session: &mut SessionState, obj: &mut ObexObject) -> Result<()> {
        accept_put(session, obj)
    }

    fn chkput(&self, session: &mut SessionState, _obj: &mut ObexObject) -> Result<()> {
        open_destination(session)
    }

    fn setpath(
        &self,
        session: &mut SessionState,
        name: Option<&str>,
        flags: SetPathFlags,
    ) -> Result<PathBuf> {
        let root = session.root();
        let current = session.current_folder();

        let base = if flags.backup {
            if current == root {
                return Err(ObexError::Forbidden("already at the root folder".to_string()));
            }
            current
                .parent()
                .filter(|parent| parent.starts_with(root))
                .unwrap_or(root)
                .to_path_buf()
        } else {
            current.to_path_buf()
        };

        match name {
            None if flags.backup => Ok(base),
            None => Err(ObexError::BadRequest("SETPATH without name".to_string())),
            Some("") if flags.backup => Ok(base),
            Some("") => Ok(root.to_path_buf()),
            Some(name) => {
                let path = object_path(&base, name)?;
                if path.is_dir() {
                    return Ok(path);
                }
                if path.exists() {
                    return Err(ObexError::Forbidden(format!("{name:?} is not a folder")));
                }
                if flags.no_create {
                    return Err(ObexError::NotFound(format!("no folder {name:?}")));
                }
                fs::create_dir(&path)?;
                debug!("Created folder {}", path.display());
                Ok(path)
            },
        }
    }
}

/// Build the folder-listing document of `folder`.
///
/// Folders are listed before files, each group sorted by name. Entries whose
/// metadata cannot be read are skipped.
pub fn folder_listing(folder: &Path, with_parent: bool) -> Result<String> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        match fs::metadata(&path) {
            Ok(meta) => entries.push((entry.file_name().to_string_lossy().into_owned(), meta)),
            Err(e) => debug!("Skipping {}: {}", path.display(), e),
        }
    }
    entries.sort_by(|(a, ma), (b, mb)| ma.is_file().cmp(&mb.is_file()).then_with(|| a.cmp(b)));

    let mut xml = String::from(LISTING_HEADER);
    if with_parent {
        xml.push_str("  <parent-folder/>\n");
    }

    for (name, meta) in &entries {
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| i64::try_from(d.as_secs()).ok())
            .and_then(format_iso8601);

        let kind = if meta.is_dir() { "folder" } else { "file" };
        let _ = write!(xml, "  <{} name=\"{}\"", kind, escape_xml(name));
        if meta.is_file() {
            let _ = write!(xml, " size=\"{}\"", meta.len());
        }
        if let Some(modified) = modified {
            let _ = write!(xml, " modified=\"{}\"", modified);
        }
        xml.push_str("/>\n");
    }

    xml.push_str("</folder-listing>\n");
    Ok(xml)
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
