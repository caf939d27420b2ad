//! OBEX session engine.
//!
//! One [`Session`] serves one accepted connection. The transport driver
//! feeds it [`Event`]s together with the [`ObexObject`] of the request in
//! flight; the engine validates headers, dispatches to the bound
//! [`CommandTable`], streams bodies through the session's [`Transfer`] and
//! leaves the response on the object.
//!
//! Per request the engine moves through
//! `Idle → RequestHinted → HeadersParsed → Dispatched → StreamingOut | StreamingIn → Completed`;
//! an abort returns it to `Idle` from anywhere.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use super::capabilities::{CommandTable, ServiceKind};
use super::message::{ObexObject, Opcode, ResponseCode};
use super::registry::{ConnectionId, SessionRegistry};
use super::transfer::{available_space, ObjectSize, Transfer};
use super::{DEFAULT_HEADER_MARGIN, DEFAULT_RX_MTU, DEFAULT_TX_MTU, MIN_TX_MTU};
use crate::codec::{
    decode_type, decode_unicode, parse_iso8601, ConnectParams, Header, HeaderId, SetPathFlags,
};
use crate::error::Result;

/// Free-space query used by PUT admission
pub type FreeSpaceFn = fn(&Path) -> Result<u64>;

/// Transport events driving the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// First packet of a request arrived
    RequestHint,
    /// Headers of the first packet are available for validation
    RequestCheck,
    /// Final packet arrived, dispatch the command
    Request,
    /// An inbound body chunk was delivered on the object
    StreamAvailable,
    /// The peer wants the next outbound body chunk
    StreamEmpty,
    /// A non-final packet was processed
    Progress,
    /// The peer aborted the request
    Abort,
    /// The response of the request was fully sent
    RequestDone,
    /// Transport reported a link error
    LinkError,
    /// A packet could not be parsed
    ParseError,
    /// Packet out of sequence
    Unexpected,
}

/// What the driver must do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Carry on with the current exchange
    Continue,
    /// Cancel the request in progress and answer with the object's code
    Cancel,
    /// Tear the transport down
    Disconnect,
}

/// Progress of the request in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    /// No request in flight
    #[default]
    Idle,
    /// First packet classified
    RequestHinted,
    /// Headers validated
    HeadersParsed,
    /// Command handed to the profile
    Dispatched,
    /// Sending a body
    StreamingOut,
    /// Receiving a body
    StreamingIn,
    /// Response sent
    Completed,
}

/// MTU settings applied to new sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Largest packet accepted from the peer
    pub rx_mtu: usize,
    /// Chunk size used until CONNECT negotiates one
    pub tx_mtu: usize,
    /// Room kept for headers when deriving the chunk size from the peer MTU
    pub header_margin: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            rx_mtu: DEFAULT_RX_MTU,
            tx_mtu: DEFAULT_TX_MTU,
            header_margin: DEFAULT_HEADER_MARGIN,
        }
    }
}

impl SessionOptions {
    /// Outbound chunk size for a peer advertising `peer_mtu`
    pub fn derive_tx_mtu(&self, peer_mtu: u16) -> usize {
        usize::from(peer_mtu)
            .saturating_sub(self.header_margin)
            .max(MIN_TX_MTU)
    }
}

/// Per-connection state shared with the profile fulfillers
#[derive(Debug)]
pub struct SessionState {
    service: ServiceKind,
    id: Option<ConnectionId>,
    rx_mtu: usize,
    tx_mtu: usize,
    root: PathBuf,
    current_folder: PathBuf,
    name: Option<String>,
    mime_type: Option<String>,
    transfer: Transfer,
    checked: bool,
}

impl SessionState {
    fn new(service: ServiceKind, root: PathBuf, options: &SessionOptions) -> Self {
        Self {
            service,
            id: None,
            rx_mtu: options.rx_mtu,
            tx_mtu: options.tx_mtu,
            current_folder: root.clone(),
            root,
            name: None,
            mime_type: None,
            transfer: Transfer::default(),
            checked: false,
        }
    }

    /// Service bound to the session
    pub fn service(&self) -> ServiceKind {
        self.service
    }

    /// Connection id, once CONNECT succeeded
    pub fn id(&self) -> Option<ConnectionId> {
        self.id
    }

    /// Largest inbound chunk accepted
    pub fn rx_mtu(&self) -> usize {
        self.rx_mtu
    }

    /// Outbound chunk size
    pub fn tx_mtu(&self) -> usize {
        self.tx_mtu
    }

    /// Folder SETPATH cannot leave
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder requests are resolved against
    pub fn current_folder(&self) -> &Path {
        &self.current_folder
    }

    /// NAME of the request in flight
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// TYPE of the request in flight
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Declared size of the object in flight
    pub fn object_size(&self) -> ObjectSize {
        self.transfer.size()
    }

    /// Whether the PUT in flight passed admission
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Transfer of the request in flight
    pub fn transfer(&self) -> &Transfer {
        &self.transfer
    }

    /// Open a file as the GET body source; returns its size
    pub fn prepare_get(&mut self, path: &Path) -> Result<u64> {
        self.transfer.prepare_get(path, self.tx_mtu)
    }

    /// Serve an in-memory object as the GET body; returns its size
    pub fn prepare_memory(&mut self, object: Bytes) -> u64 {
        self.transfer.prepare_memory(object)
    }

    /// Open the PUT destination and flush any chunk held so far
    pub fn open_put_destination(&mut self, path: &Path) -> Result<()> {
        self.transfer.open_destination(path)
    }

    fn reset_request(&mut self) {
        self.name = None;
        self.mime_type = None;
        self.transfer.reset();
        self.checked = false;
    }

    fn accept_name(&mut self, header: &Header) {
        if self.name.is_some() {
            debug!("Ignoring multiple name headers");
            return;
        }
        if header.data_len() == 0 {
            return;
        }
        match decode_unicode(header.data()) {
            Ok(name) => {
                debug!("OBEX_HDR_NAME: {}", name);
                self.name = Some(name);
            },
            Err(e) => debug!("Undecodable name header: {}", e),
        }
    }

    fn accept_type(&mut self, header: &Header) {
        if self.mime_type.is_some() {
            debug!("Ignoring multiple type headers");
            return;
        }
        if header.data_len() == 0 {
            return;
        }
        if let Some(mime) = decode_type(header.data()) {
            debug!("OBEX_HDR_TYPE: {}", mime);
            self.mime_type = Some(mime);
        }
    }
}

/// Event-driven engine of one connection
pub struct Session {
    table: Arc<dyn CommandTable>,
    registry: Arc<dyn SessionRegistry>,
    options: SessionOptions,
    free_space: FreeSpaceFn,
    state: SessionState,
    request: RequestState,
    torn_down: bool,
}

impl Session {
    /// Create an engine serving `table`'s profile from `root`
    pub fn new(
        table: Arc<dyn CommandTable>,
        registry: Arc<dyn SessionRegistry>,
        root: impl Into<PathBuf>,
    ) -> Self {
        let options = SessionOptions::default();
        let state = SessionState::new(table.service(), root.into(), &options);
        Self {
            table,
            registry,
            options,
            free_space: available_space,
            state,
            request: RequestState::Idle,
            torn_down: false,
        }
    }

    /// Apply MTU settings
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.state.rx_mtu = options.rx_mtu;
        self.state.tx_mtu = options.tx_mtu;
        self.options = options;
        self
    }

    /// Replace the free-space query
    pub fn with_free_space(mut self, free_space: FreeSpaceFn) -> Self {
        self.free_space = free_space;
        self
    }

    /// Session state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Progress of the request in flight
    pub fn request_state(&self) -> RequestState {
        self.request
    }

    /// Feed one transport event
    pub fn handle_event(&mut self, event: Event, obj: &mut ObexObject) -> Control {
        debug!("event {:?} cmd {}", event, obj.opcode().name());
        match event {
            Event::RequestHint => self.on_request_hint(obj),
            Event::RequestCheck => self.on_request_check(obj),
            Event::Request => self.on_request(obj),
            Event::StreamAvailable => self.on_stream_available(obj),
            Event::StreamEmpty => self.on_stream_empty(obj),
            Event::Progress => self.on_progress(),
            Event::Abort => self.on_abort(obj),
            Event::RequestDone => self.on_request_done(obj),
            Event::LinkError | Event::ParseError | Event::Unexpected => {
                warn!("{:?} during {}", event, obj.opcode().name());
                Control::Continue
            },
        }
    }

    fn on_request_hint(&mut self, obj: &mut ObexObject) -> Control {
        self.request = RequestState::RequestHinted;
        let caps = self.table.capabilities();

        let supported = match obj.opcode() {
            Opcode::Put => caps.put,
            Opcode::Get => caps.get,
            Opcode::SetPath => caps.setpath,
            Opcode::Connect | Opcode::Disconnect => true,
            Opcode::Abort | Opcode::Unknown(_) => false,
        };

        if !supported {
            obj.respond(ResponseCode::NotImplemented);
            return Control::Continue;
        }

        if obj.opcode() == Opcode::Put {
            self.state.checked = false;
            obj.enable_inbound_stream();
        }
        obj.set_response(ResponseCode::Continue, ResponseCode::Success);
        Control::Continue
    }

    fn on_request_check(&mut self, obj: &mut ObexObject) -> Control {
        let caps = self.table.capabilities();
        if obj.opcode() == Opcode::Put && caps.put && caps.chkput && self.check_put(obj) {
            self.request = RequestState::HeadersParsed;
        }
        Control::Continue
    }

    fn on_request(&mut self, obj: &mut ObexObject) -> Control {
        self.request = RequestState::Dispatched;
        match obj.opcode() {
            Opcode::Disconnect => {},
            Opcode::Connect => self.cmd_connect(obj),
            Opcode::SetPath => self.cmd_setpath(obj),
            Opcode::Get => self.cmd_get(obj),
            Opcode::Put => self.cmd_put(obj),
            Opcode::Abort => return self.on_abort(obj),
            Opcode::Unknown(code) => {
                debug!("Unknown request: 0x{:02X}", code);
                obj.respond(ResponseCode::NotImplemented);
            },
        }

        if obj.is_streaming_out() {
            self.request = RequestState::StreamingOut;
        }
        Control::Continue
    }

    fn on_stream_available(&mut self, obj: &mut ObexObject) -> Control {
        if obj.opcode() != Opcode::Put {
            debug!("Body chunk outside PUT");
            obj.read_stream();
            return Control::Continue;
        }

        if !self.state.checked && (!self.table.capabilities().put || !self.check_put(obj)) {
            obj.read_stream();
            return Control::Cancel;
        }

        self.request = RequestState::StreamingIn;
        let Some(chunk) = obj.read_stream() else {
            return Control::Continue;
        };

        match self.state.transfer.receive_chunk(&chunk, self.state.rx_mtu) {
            Ok(()) => Control::Continue,
            Err(e) => {
                error!("error obex_read(): {}", e);
                obj.respond(e.response_code());
                Control::Cancel
            },
        }
    }

    fn on_stream_empty(&mut self, obj: &mut ObexObject) -> Control {
        if !obj.is_streaming_out() {
            debug!("Stream empty without an outbound body");
            return Control::Continue;
        }

        match self.state.transfer.next_outbound(self.state.tx_mtu) {
            Ok(Some(chunk)) => {
                obj.push_body(chunk, false);
                Control::Continue
            },
            Ok(None) => {
                obj.push_body(Bytes::new(), true);
                Control::Continue
            },
            Err(e) => {
                error!("obex_write(): {}", e);
                obj.respond(e.response_code());
                Control::Cancel
            },
        }
    }

    fn on_progress(&mut self) -> Control {
        if let Some(id) = self.state.id {
            self.registry
                .transfer_progress(id, self.state.transfer.size(), self.state.transfer.offset());
        }
        Control::Continue
    }

    fn on_abort(&mut self, obj: &mut ObexObject) -> Control {
        info!("Request {} aborted by peer", obj.opcode().name());
        self.state.reset_request();
        self.request = RequestState::Idle;
        obj.respond(ResponseCode::Success);
        Control::Continue
    }

    fn on_request_done(&mut self, obj: &mut ObexObject) -> Control {
        self.request = RequestState::Completed;
        let control = match obj.opcode() {
            Opcode::Disconnect => Control::Disconnect,
            Opcode::Put | Opcode::Get => {
                if obj.response().last == ResponseCode::Success {
                    self.state.transfer.finish();
                }
                if let Some(id) = self.state.id {
                    if self.state.transfer.is_active() {
                        self.registry
                            .transfer_completed(id, self.state.transfer.is_complete());
                    }
                }
                self.state.reset_request();
                Control::Continue
            },
            _ => Control::Continue,
        };
        self.request = RequestState::Idle;
        control
    }

    fn cmd_connect(&mut self, obj: &mut ObexObject) {
        let Some(params) = ConnectParams::parse(obj.non_header()) else {
            debug!("Invalid OBEX CONNECT packet");
            obj.respond(ResponseCode::Forbidden);
            return;
        };

        debug!(
            "Version: 0x{:02x}. Flags: 0x{:02x}  OBEX packet length: {}",
            params.version, params.flags, params.mtu
        );
        self.state.tx_mtu = self.options.derive_tx_mtu(params.mtu);
        debug!("Resizing stream chunks to {}", self.state.tx_mtu);

        let target = self.state.service.target();
        if let Some(target) = target {
            let first = obj.next_header();
            obj.rewind_headers();
            let matches = first
                .as_ref()
                .is_some_and(|h| h.id == HeaderId::TARGET && h.data() == &target[..]);
            if !matches {
                debug!("CONNECT target does not address {}", self.state.service);
                obj.respond(ResponseCode::Forbidden);
                return;
            }
        }

        if let Some(previous) = self.state.id.take() {
            self.registry.unregister_transfer(previous);
        }
        let id = self.registry.allocate_id();
        self.state.id = Some(id);
        self.registry.register_transfer(id);

        if let Some(target) = target {
            self.registry.register_session(id);
            self.registry.session_created(id);
            obj.add_header(Header::who(target));
            obj.add_header(Header::connection(id));
        }

        info!("{} session connected, id {}", self.state.service, id);
        obj.set_response(ResponseCode::Continue, ResponseCode::Success);
    }

    fn check_cid(&mut self, obj: &mut ObexObject) -> bool {
        if !self.state.service.uses_connection_id() {
            return true;
        }

        let mut presented = None;
        while let Some(header) = obj.next_header() {
            if header.id == HeaderId::CONNECTION {
                presented = header.as_u32();
                break;
            }
        }
        obj.rewind_headers();

        let valid = presented.is_some() && presented == self.state.id;
        if !valid {
            debug!(
                "Connection id {:?} does not match session {:?}",
                presented, self.state.id
            );
            obj.respond(ResponseCode::ServiceUnavailable);
        }
        valid
    }

    fn cmd_get(&mut self, obj: &mut ObexObject) {
        if !self.table.capabilities().get {
            obj.respond(ResponseCode::NotImplemented);
            return;
        }
        if !self.check_cid(obj) {
            return;
        }

        self.state.reset_request();
        while let Some(header) = obj.next_header() {
            match header.id {
                HeaderId::NAME => self.state.accept_name(&header),
                HeaderId::TYPE => self.state.accept_type(&header),
                _ => {},
            }
        }
        obj.rewind_headers();
        self.request = RequestState::HeadersParsed;

        if let Err(e) = self.table.get(&mut self.state, obj) {
            debug!("GET {:?} failed: {}", self.state.name, e);
            self.state.transfer.reset();
            obj.respond(e.response_code());
        }
    }

    fn cmd_setpath(&mut self, obj: &mut ObexObject) {
        if !self.table.capabilities().setpath {
            obj.respond(ResponseCode::NotImplemented);
            return;
        }
        if !self.check_cid(obj) {
            return;
        }

        self.state.name = None;
        while let Some(header) = obj.next_header() {
            if header.id != HeaderId::NAME {
                continue;
            }
            if header.data_len() == 0 {
                self.state.name = Some(String::new());
            } else {
                match decode_unicode(header.data()) {
                    Ok(name) => self.state.name = Some(name),
                    Err(e) => debug!("Undecodable name header: {}", e),
                }
            }
            debug!("Set path name: {:?}", self.state.name);
            break;
        }
        obj.rewind_headers();
        self.request = RequestState::HeadersParsed;

        let flags = SetPathFlags::parse(obj.non_header());
        let name = self.state.name.clone();
        match self.table.setpath(&mut self.state, name.as_deref(), flags) {
            Ok(folder) => {
                info!("Current folder: {}", folder.display());
                self.state.current_folder = folder;
                obj.set_response(ResponseCode::Continue, ResponseCode::Success);
            },
            Err(e) => {
                debug!("SETPATH {:?} failed: {}", name, e);
                obj.respond(e.response_code());
            },
        }
    }

    fn cmd_put(&mut self, obj: &mut ObexObject) {
        if !self.table.capabilities().put {
            obj.respond(ResponseCode::NotImplemented);
            return;
        }
        if !self.check_cid(obj) {
            return;
        }
        if !self.state.checked && !self.check_put(obj) {
            return;
        }

        if let Err(e) = self.table.put(&mut self.state, obj) {
            debug!("PUT {:?} failed: {}", self.state.name, e);
            obj.respond(e.response_code());
        }
    }

    /// PUT admission control. On failure the response is set on `obj`.
    fn check_put(&mut self, obj: &mut ObexObject) -> bool {
        if !self.check_cid(obj) {
            return false;
        }

        self.state.name = None;
        self.state.mime_type = None;
        let mut size = ObjectSize::Unset;
        let mut time = None;

        while let Some(header) = obj.next_header() {
            match header.id {
                HeaderId::NAME => self.state.accept_name(&header),
                HeaderId::TYPE => self.state.accept_type(&header),
                HeaderId::BODY | HeaderId::END_OF_BODY => {
                    if size == ObjectSize::Unset {
                        size = ObjectSize::Streamed;
                    }
                },
                HeaderId::LENGTH => {
                    if let Some(length) = header.as_u32() {
                        debug!("OBEX_HDR_LENGTH: {}", length);
                        size = ObjectSize::Known(u64::from(length));
                    }
                },
                HeaderId::TIME => time = parse_iso8601(header.data()),
                _ => {},
            }
        }
        obj.rewind_headers();

        self.state.transfer.set_size(size);
        self.state.transfer.set_time(time);

        if self.state.name.is_none() {
            obj.respond(ResponseCode::BadRequest);
            self.state.mime_type = None;
            return false;
        }

        if let ObjectSize::Known(declared) = size {
            match (self.free_space)(&self.state.current_folder) {
                Ok(free) => {
                    debug!("Free space in disk: {}", free);
                    if declared > free {
                        debug!("Free disk space not available");
                        obj.respond(ResponseCode::Forbidden);
                        return false;
                    }
                },
                Err(e) => {
                    error!("statvfs({}): {}", self.state.current_folder.display(), e);
                    obj.respond(ResponseCode::Forbidden);
                    return false;
                },
            }
        }

        if self.table.capabilities().chkput {
            if let Err(e) = self.table.chkput(&mut self.state, obj) {
                debug!("PUT {:?} refused: {}", self.state.name, e);
                obj.respond(ResponseCode::Forbidden);
                return false;
            }
            if let (Some(id), true) = (self.state.id, self.state.transfer.has_file()) {
                self.registry.transfer_started(id);
            }
        }

        self.state.checked = true;
        true
    }

    /// Release every session resource and notify the registry.
    ///
    /// An unfinished transfer is reported as failed. Safe to call more than
    /// once; also runs on drop.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(id) = self.state.id {
            // Request-done resets the transfer, so anything left is unfinished
            if self.state.transfer.is_active() {
                self.registry.transfer_completed(id, false);
            }
            self.registry.unregister_transfer(id);
        }
        self.state.reset_request();
        self.request = RequestState::Idle;
        info!("{} session closed", self.state.service);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("request", &self.request)
            .field("options", &self.options)
            .finish()
    }
}
