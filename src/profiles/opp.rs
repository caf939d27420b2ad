//! Object Push profile.
//!
//! Pushed objects are stored in the session's folder. The only object that
//! can be pulled is the owner's business card.

use std::path::PathBuf;

use tracing::debug;

use super::{accept_put, open_destination, start_body};
use crate::error::{ObexError, Result};
use crate::protocol::{CommandCaps, CommandTable, ObexObject, ServiceKind, SessionState};

/// MIME type of the default business card
pub const VCARD_TYPE: &str = "text/x-vcard";

/// Object Push command table
#[derive(Debug, Clone)]
pub struct ObjectPush {
    vcard: PathBuf,
}

impl ObjectPush {
    /// Serve the business card stored at `vcard`
    pub fn new(vcard: impl Into<PathBuf>) -> Self {
        Self {
            vcard: vcard.into(),
        }
    }

    /// Business card file
    pub fn vcard(&self) -> &std::path::Path {
        &self.vcard
    }
}

impl CommandTable for ObjectPush {
    fn service(&self) -> ServiceKind {
        ServiceKind::ObjectPush
    }

    fn capabilities(&self) -> CommandCaps {
        CommandCaps::default().with_get().with_put().with_chkput()
    }

    fn get(&self, session: &mut SessionState, obj: &mut ObexObject) -> Result<()> {
        if let Some(name) = session.name() {
            return Err(ObexError::Forbidden(format!("cannot pull {name:?}")));
        }
        if session.mime_type() != Some(VCARD_TYPE) {
            return Err(ObexError::Forbidden(format!(
                "cannot pull type {:?}",
                session.mime_type()
            )));
        }

        let size = session.prepare_get(&self.vcard).map_err(|e| {
            debug!("vCard {}: {}", self.vcard.display(), e);
            ObexError::Forbidden(format!("no business card: {e}"))
        })?;
        start_body(obj, size)
    }

    fn put(&self, session: &mut SessionState, obj: &mut ObexObject) -> Result<()> {
        accept_put(session, obj)
    }

    fn chkput(&self, session: &mut SessionState, _obj: &mut ObexObject) -> Result<()> {
        open_destination(session)
    }
}
