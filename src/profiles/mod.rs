//! Profile command tables.
//!
//! - [`ObjectPush`]: connectionless Object Push (business card exchange)
//! - [`FileTransfer`]: connection-oriented File Transfer (folder browsing)

mod ftp;
mod opp;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use ftp::{folder_listing, FileTransfer, FOLDER_LISTING_TYPE};
pub use opp::{ObjectPush, VCARD_TYPE};

use crate::codec::Header;
use crate::error::{ObexError, Result};
use crate::protocol::{CommandTable, ObexObject, ObjectSize, ResponseCode, ServiceKind, SessionState};

/// Command table serving `service`
pub fn command_table(service: ServiceKind, vcard: impl Into<PathBuf>) -> Arc<dyn CommandTable> {
    match service {
        ServiceKind::ObjectPush => Arc::new(ObjectPush::new(vcard)),
        ServiceKind::FileTransfer => Arc::new(FileTransfer::new()),
    }
}

/// Resolve an object `name` inside `folder`.
///
/// Names must address a direct child: empty names, separators and `..` are
/// rejected.
pub fn object_path(folder: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty() {
        return Err(ObexError::BadRequest("empty object name".to_string()));
    }
    if name.contains(['/', '\\']) || name == "." || name.contains("..") {
        return Err(ObexError::BadRequest(format!("invalid object name {name:?}")));
    }
    Ok(folder.join(name))
}

/// Shared PUT admission: reject empty objects, then open the destination
/// and flush whatever arrived before it existed.
fn open_destination(session: &mut SessionState) -> Result<()> {
    if matches!(session.object_size(), ObjectSize::Unset | ObjectSize::Known(0)) {
        return Err(ObexError::Forbidden("object size unknown or zero".to_string()));
    }

    let name = session
        .name()
        .ok_or_else(|| ObexError::BadRequest("PUT without name".to_string()))?;
    let path = object_path(session.current_folder(), name)?;
    session.open_put_destination(&path)
}

/// Shared PUT fulfiller: the body is already flowing into the destination
fn accept_put(session: &SessionState, obj: &mut ObexObject) -> Result<()> {
    if !session.current_folder().is_dir() {
        return Err(ObexError::Forbidden(format!(
            "no folder {}",
            session.current_folder().display()
        )));
    }
    if session.name().is_none() {
        return Err(ObexError::BadRequest("PUT without name".to_string()));
    }
    obj.set_response(ResponseCode::Continue, ResponseCode::Success);
    Ok(())
}

/// Announce an outbound body of `size` bytes prepared on the session
fn start_body(obj: &mut ObexObject, size: u64) -> Result<()> {
    let length = u32::try_from(size)
        .map_err(|_| ObexError::Forbidden(format!("object of {size} bytes too large")))?;
    obj.add_header(Header::length(length));

    if size == 0 {
        obj.push_body(bytes::Bytes::new(), true);
    } else {
        obj.start_body_stream();
    }
    obj.set_response(ResponseCode::Continue, ResponseCode::Success);
    Ok(())
}
