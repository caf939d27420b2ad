//! Server state and session management.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use super::config::ServerConfig;
use crate::profiles::command_table;
use crate::protocol::{CommandTable, ConnectionId, ObjectSize, Session, SessionRegistry};

/// Application state shared across connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Session registry
    pub sessions: Arc<SessionManager>,
    /// Command table of the served profile
    pub table: Arc<dyn CommandTable>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServerConfig) -> Self {
        let table = command_table(config.service, config.vcard.clone());
        Self {
            config,
            sessions: Arc::new(SessionManager::new()),
            table,
        }
    }

    /// Engine for a newly accepted connection
    pub fn new_session(&self) -> Session {
        let registry: Arc<dyn SessionRegistry> = self.sessions.clone();
        Session::new(Arc::clone(&self.table), registry, self.config.root.clone())
            .with_options(self.config.options)
    }
}

/// Transfer lifecycle as seen by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Slot registered, nothing moving
    Idle,
    /// Bytes are moving
    Active,
    /// Last transfer moved exactly the declared size
    Completed,
    /// Last transfer ended short
    Failed,
}

/// What the registry knows about one connection
#[derive(Debug, Clone)]
pub struct TransferRecord {
    /// Whether CONNECT established a connection-oriented session
    pub session: bool,
    /// Transfer status
    pub status: TransferStatus,
    /// Declared size of the current transfer
    pub size: ObjectSize,
    /// Bytes moved so far
    pub offset: u64,
}

impl TransferRecord {
    fn new() -> Self {
        Self {
            session: false,
            status: TransferStatus::Idle,
            size: ObjectSize::Unset,
            offset: 0,
        }
    }
}

/// Allocates connection ids and tracks the transfer slot of each one
pub struct SessionManager {
    /// Next id to hand out
    next_id: AtomicU32,
    /// Registered slots by id
    records: RwLock<HashMap<ConnectionId, TransferRecord>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Create new session manager
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Get the record of `id`
    pub fn get(&self, id: ConnectionId) -> Option<TransferRecord> {
        self.read().get(&id).cloned()
    }

    /// Number of registered slots
    pub fn count(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ConnectionId, TransferRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, id: ConnectionId, f: impl FnOnce(&mut TransferRecord)) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(&id) {
            Some(record) => f(record),
            None => debug!("No transfer registered for id {}", id),
        }
    }
}

impl SessionRegistry for SessionManager {
    fn allocate_id(&self) -> ConnectionId {
        let records = self.read();
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 && !records.contains_key(&id) {
                return id;
            }
        }
    }

    fn register_transfer(&self, id: ConnectionId) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(id, TransferRecord::new());
        debug!("Registered transfer {}", id);
    }

    fn unregister_transfer(&self, id: ConnectionId) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.remove(&id).is_some() {
            debug!("Unregistered transfer {}", id);
        }
    }

    fn register_session(&self, id: ConnectionId) {
        self.update(id, |record| record.session = true);
    }

    fn session_created(&self, id: ConnectionId) {
        info!("Session created: {}", id);
    }

    fn transfer_started(&self, id: ConnectionId) {
        info!("Transfer started: {}", id);
        self.update(id, |record| {
            record.status = TransferStatus::Active;
            record.offset = 0;
        });
    }

    fn transfer_progress(&self, id: ConnectionId, size: ObjectSize, offset: u64) {
        self.update(id, |record| {
            record.status = TransferStatus::Active;
            record.size = size;
            record.offset = offset;
        });
    }

    fn transfer_completed(&self, id: ConnectionId, success: bool) {
        info!("Transfer {} completed, success: {}", id, success);
        self.update(id, |record| {
            record.status = if success {
                TransferStatus::Completed
            } else {
                TransferStatus::Failed
            };
        });
    }
}
