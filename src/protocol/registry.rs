//! Session registry hooks.
//!
//! The engine reports session and transfer lifecycle through
//! [`SessionRegistry`]; the server's session manager is the production
//! implementation, tests plug in recorders.

use super::transfer::ObjectSize;

/// Connection id assigned at CONNECT
pub type ConnectionId = u32;

/// Receiver of session and transfer notifications
pub trait SessionRegistry: Send + Sync {
    /// Allocate a fresh connection id.
    ///
    /// Ids are never zero and never reused while the session holding them is
    /// still registered.
    fn allocate_id(&self) -> ConnectionId;

    /// A transfer slot now exists for `id`
    fn register_transfer(&self, id: ConnectionId);

    /// The transfer slot for `id` is gone (session torn down or reconnected)
    fn unregister_transfer(&self, id: ConnectionId);

    /// A connection-oriented session was established under `id`
    fn register_session(&self, id: ConnectionId);

    /// Session-created notification
    fn session_created(&self, id: ConnectionId);

    /// A transfer began moving bytes
    fn transfer_started(&self, _id: ConnectionId) {}

    /// Bytes moved so far
    fn transfer_progress(&self, id: ConnectionId, size: ObjectSize, offset: u64);

    /// The transfer ended; `success` iff the bytes moved match the declared size
    fn transfer_completed(&self, id: ConnectionId, success: bool);
}
