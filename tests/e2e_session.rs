//! End-to-end engine tests.
//!
//! These drive a [`Session`] with the real profiles against a temporary
//! folder, raising events in the order the packet driver raises them.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use obex::codec::{parse_iso8601, ConnectParams, Header, HeaderId, SetPathFlags};
use obex::profiles::{FileTransfer, ObjectPush, FOLDER_LISTING_TYPE, VCARD_TYPE};
use obex::protocol::{
    CommandCaps, CommandTable, ConnectionId, Control, Event, ObexObject, ObjectSize, Opcode,
    RequestState, ResponseCode, ServiceKind, Session, SessionRegistry, SessionState, Transfer,
    FTP_TARGET,
};
use obex::server::{SessionManager, TransferStatus};
use proptest::prelude::*;
use tempfile::TempDir;

fn opp_session(dir: &TempDir) -> (Session, Arc<SessionManager>) {
    let manager = Arc::new(SessionManager::new());
    let registry: Arc<dyn SessionRegistry> = manager.clone();
    let table = Arc::new(ObjectPush::new(dir.path().join("card.vcf")));
    (Session::new(table, registry, dir.path()), manager)
}

fn ftp_session(dir: &TempDir) -> (Session, Arc<SessionManager>) {
    let manager = Arc::new(SessionManager::new());
    let registry: Arc<dyn SessionRegistry> = manager.clone();
    (Session::new(Arc::new(FileTransfer::new()), registry, dir.path()), manager)
}

/// Session manager that also keeps every completion outcome
#[derive(Default)]
struct Outcomes {
    manager: SessionManager,
    completed: Mutex<Vec<(ConnectionId, bool)>>,
}

impl Outcomes {
    fn completed(&self) -> Vec<(ConnectionId, bool)> {
        self.completed.lock().unwrap().clone()
    }
}

impl SessionRegistry for Outcomes {
    fn allocate_id(&self) -> ConnectionId {
        self.manager.allocate_id()
    }
    fn register_transfer(&self, id: ConnectionId) {
        self.manager.register_transfer(id);
    }
    fn unregister_transfer(&self, id: ConnectionId) {
        self.manager.unregister_transfer(id);
    }
    fn register_session(&self, id: ConnectionId) {
        self.manager.register_session(id);
    }
    fn session_created(&self, id: ConnectionId) {
        self.manager.session_created(id);
    }
    fn transfer_progress(&self, id: ConnectionId, size: ObjectSize, offset: u64) {
        self.manager.transfer_progress(id, size, offset);
    }
    fn transfer_completed(&self, id: ConnectionId, success: bool) {
        self.completed.lock().unwrap().push((id, success));
        self.manager.transfer_completed(id, success);
    }
}

fn recorded_session(dir: &TempDir, table: Arc<dyn CommandTable>) -> (Session, Arc<Outcomes>) {
    let outcomes = Arc::new(Outcomes::default());
    let registry: Arc<dyn SessionRegistry> = outcomes.clone();
    (Session::new(table, registry, dir.path()), outcomes)
}

/// Opens the destination only when the final packet is dispatched
struct DeferredPut;

impl CommandTable for DeferredPut {
    fn service(&self) -> ServiceKind {
        ServiceKind::ObjectPush
    }

    fn capabilities(&self) -> CommandCaps {
        CommandCaps::default().with_put()
    }

    fn put(&self, session: &mut SessionState, obj: &mut ObexObject) -> obex::Result<()> {
        let path = session.current_folder().join(session.name().unwrap_or("unnamed"));
        session.open_put_destination(&path)?;
        obj.set_response(ResponseCode::Continue, ResponseCode::Success);
        Ok(())
    }
}

fn connect(session: &mut Session, mtu: u16, headers: Vec<Header>) -> ObexObject {
    let params = ConnectParams {
        version: 0x10,
        flags: 0,
        mtu,
    };
    let mut obj = ObexObject::new(Opcode::Connect, params.to_bytes(), headers);
    session.handle_event(Event::RequestHint, &mut obj);
    session.handle_event(Event::Request, &mut obj);
    session.handle_event(Event::RequestDone, &mut obj);
    obj
}

fn connect_ftp(session: &mut Session) -> u32 {
    let obj = connect(session, 4096, vec![Header::target(&FTP_TARGET)]);
    assert_eq!(obj.response().last, ResponseCode::Success);
    session.state().id().unwrap()
}

/// Run a single-packet PUT, delivering `body` as one BODY chunk.
fn put(session: &mut Session, headers: Vec<Header>, body: &[u8]) -> ObexObject {
    let mut obj = ObexObject::new(Opcode::Put, Bytes::new(), headers);
    session.handle_event(Event::RequestHint, &mut obj);
    session.handle_event(Event::RequestCheck, &mut obj);
    if !obj.response().proceeds() {
        return obj;
    }

    obj.deliver_chunk(Bytes::copy_from_slice(body));
    if session.handle_event(Event::StreamAvailable, &mut obj) == Control::Cancel {
        return obj;
    }
    session.handle_event(Event::Request, &mut obj);
    session.handle_event(Event::RequestDone, &mut obj);
    obj
}

/// Run a GET and collect its body, checking every chunk against `tx_mtu`.
fn get(session: &mut Session, headers: Vec<Header>) -> (ObexObject, Vec<u8>) {
    let tx_mtu = session.state().tx_mtu();
    let mut obj = ObexObject::new(Opcode::Get, Bytes::new(), headers);
    session.handle_event(Event::RequestHint, &mut obj);
    session.handle_event(Event::Request, &mut obj);

    let mut body = Vec::new();
    let mut first = true;
    while obj.is_streaming_out() {
        assert_eq!(session.handle_event(Event::StreamEmpty, &mut obj), Control::Continue);
        for header in obj.take_reply_headers() {
            if header.id == HeaderId::LENGTH {
                assert!(first, "LENGTH only on the first reply");
                continue;
            }
            let chunk = header.body_chunk().expect("body header");
            assert!(chunk.len() <= tx_mtu);
            body.extend_from_slice(chunk);
        }
        first = false;
    }
    for header in obj.take_reply_headers() {
        if let Some(chunk) = header.body_chunk() {
            body.extend_from_slice(chunk);
        }
    }
    session.handle_event(Event::RequestDone, &mut obj);
    (obj, body)
}

fn setpath(session: &mut Session, id: u32, flags: SetPathFlags, name: Option<&str>) -> ResponseCode {
    let mut headers = vec![Header::connection(id)];
    match name {
        Some("") => headers.push(Header::empty_name()),
        Some(name) => headers.push(Header::name(name)),
        None => {},
    }
    let mut obj = ObexObject::new(Opcode::SetPath, flags.to_bytes(), headers);
    session.handle_event(Event::RequestHint, &mut obj);
    session.handle_event(Event::Request, &mut obj);
    session.handle_event(Event::RequestDone, &mut obj);
    obj.response().last
}

fn no_space(_path: &Path) -> obex::Result<u64> {
    Ok(4)
}

fn broken_statvfs(_path: &Path) -> obex::Result<u64> {
    Err(obex::ObexError::Sys(nix::Error::EIO))
}

/// Object Push stores a pushed object and reports the transfer
#[test]
fn test_opp_push_stores_object() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, manager) = opp_session(&dir);
    connect(&mut session, 1024, vec![]);
    let id = session.state().id().unwrap();

    let obj = put(
        &mut session,
        vec![Header::name("note.txt"), Header::length(11), Header::body(Bytes::from_static(b"hello world"))],
        b"hello world",
    );

    assert_eq!(obj.response().last, ResponseCode::Success);
    assert_eq!(fs::read(dir.path().join("note.txt")).unwrap(), b"hello world");
    assert_eq!(manager.get(id).unwrap().status, TransferStatus::Completed);
    assert!(!session.state().transfer().is_active());
    assert_eq!(session.request_state(), RequestState::Idle);
}

/// The first NAME header of a request is the one used
#[test]
fn test_put_first_name_wins() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = opp_session(&dir);

    let obj = put(
        &mut session,
        vec![Header::name("first.txt"), Header::name("second.txt"), Header::length(3)],
        b"abc",
    );

    assert_eq!(obj.response().last, ResponseCode::Success);
    assert!(dir.path().join("first.txt").exists());
    assert!(!dir.path().join("second.txt").exists());
}

/// PUT without a NAME is a bad request
#[test]
fn test_put_without_name_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = opp_session(&dir);

    let obj = put(&mut session, vec![Header::length(3)], b"abc");
    assert_eq!(obj.response().last, ResponseCode::BadRequest);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// A declared size larger than the free space is refused before any write
#[test]
fn test_put_refused_without_free_space() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _) = opp_session(&dir);
    let mut session = session.with_free_space(no_space);

    let obj = put(&mut session, vec![Header::name("big.bin"), Header::length(100)], b"x");
    assert_eq!(obj.response().last, ResponseCode::Forbidden);
    assert!(!dir.path().join("big.bin").exists());

    // At the limit is fine
    let obj = put(&mut session, vec![Header::name("small.bin"), Header::length(4)], b"1234");
    assert_eq!(obj.response().last, ResponseCode::Success);
    assert_eq!(fs::read(dir.path().join("small.bin")).unwrap(), b"1234");
}

/// A failing free-space query refuses the PUT
#[test]
fn test_put_refused_when_free_space_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _) = opp_session(&dir);
    let mut session = session.with_free_space(broken_statvfs);

    let obj = put(&mut session, vec![Header::name("a.bin"), Header::length(1)], b"1");
    assert_eq!(obj.response().last, ResponseCode::Forbidden);
    assert!(!dir.path().join("a.bin").exists());
}

/// Object Push refuses objects of unknown or zero size
#[test]
fn test_opp_refuses_unsized_objects() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = opp_session(&dir);

    let obj = put(&mut session, vec![Header::name("zero.bin"), Header::length(0)], b"");
    assert_eq!(obj.response().last, ResponseCode::Forbidden);

    let obj = put(&mut session, vec![Header::name("unknown.bin")], b"");
    assert_eq!(obj.response().last, ResponseCode::Forbidden);
}

/// A BODY without LENGTH marks the object as streamed
#[test]
fn test_body_without_length_is_streamed() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = ftp_session(&dir);
    let id = connect_ftp(&mut session);

    let mut obj = ObexObject::new(
        Opcode::Put,
        Bytes::new(),
        vec![
            Header::connection(id),
            Header::name("s.txt"),
            Header::body(Bytes::from_static(b"xy")),
        ],
    );
    session.handle_event(Event::RequestHint, &mut obj);
    session.handle_event(Event::RequestCheck, &mut obj);
    assert_eq!(session.state().object_size(), ObjectSize::Streamed);
    assert!(session.state().is_checked());
}

/// Aborting mid-stream releases the transfer and the session stays usable
#[test]
fn test_abort_mid_put_then_reuse() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = opp_session(&dir);

    let mut obj = ObexObject::new(
        Opcode::Put,
        Bytes::new(),
        vec![Header::name("part.bin"), Header::length(20)],
    );
    session.handle_event(Event::RequestHint, &mut obj);
    session.handle_event(Event::RequestCheck, &mut obj);
    obj.deliver_chunk(Bytes::from_static(b"12345"));
    session.handle_event(Event::StreamAvailable, &mut obj);
    session.handle_event(Event::Progress, &mut obj);
    assert_eq!(session.request_state(), RequestState::StreamingIn);
    assert_eq!(session.state().transfer().offset(), 5);

    session.handle_event(Event::Abort, &mut obj);
    assert_eq!(obj.response().last, ResponseCode::Success);
    assert!(!session.state().transfer().is_active());
    assert_eq!(session.request_state(), RequestState::Idle);

    let obj = put(&mut session, vec![Header::name("next.bin"), Header::length(2)], b"ok");
    assert_eq!(obj.response().last, ResponseCode::Success);
}

/// An oversized inbound chunk cancels the request
#[test]
fn test_oversized_chunk_cancels_put() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = opp_session(&dir);

    let mut obj = ObexObject::new(
        Opcode::Put,
        Bytes::new(),
        vec![Header::name("huge.bin"), Header::length(40000)],
    );
    session.handle_event(Event::RequestHint, &mut obj);
    session.handle_event(Event::RequestCheck, &mut obj);
    obj.deliver_chunk(Bytes::from(vec![0u8; 40000]));
    assert_eq!(session.handle_event(Event::StreamAvailable, &mut obj), Control::Cancel);
    assert_eq!(obj.response().last, ResponseCode::InternalServerError);
}

/// Object Push serves the owner's card and nothing else
#[test]
fn test_opp_pull_business_card() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("card.vcf"), b"BEGIN:VCARD\r\nEND:VCARD\r\n").unwrap();
    let (mut session, _) = opp_session(&dir);

    let (obj, body) = get(&mut session, vec![Header::mime_type(VCARD_TYPE)]);
    assert_eq!(obj.response().last, ResponseCode::Success);
    assert_eq!(body, b"BEGIN:VCARD\r\nEND:VCARD\r\n");

    let (obj, _) = get(&mut session, vec![Header::name("card.vcf")]);
    assert_eq!(obj.response().last, ResponseCode::Forbidden);

    let (obj, _) = get(&mut session, vec![Header::mime_type("text/plain")]);
    assert_eq!(obj.response().last, ResponseCode::Forbidden);
}

/// File Transfer only accepts CONNECT addressed to its target
#[test]
fn test_ftp_connect_target() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, manager) = ftp_session(&dir);

    let obj = connect(&mut session, 4096, vec![Header::target(&[0u8; 16])]);
    assert_eq!(obj.response().last, ResponseCode::Forbidden);
    assert_eq!(manager.count(), 0);

    let obj = connect(&mut session, 4096, vec![Header::target(&FTP_TARGET)]);
    assert_eq!(obj.response().last, ResponseCode::Success);
    let id = session.state().id().unwrap();
    assert!(manager.get(id).unwrap().session);
    assert!(obj.reply_headers().contains(&Header::connection(id)));

    // Reconnecting replaces the id
    connect(&mut session, 4096, vec![Header::target(&FTP_TARGET)]);
    assert_ne!(session.state().id(), Some(id));
    assert!(manager.get(id).is_none());
    assert_eq!(manager.count(), 1);
}

/// File Transfer requests must present the session's connection id
#[test]
fn test_ftp_connection_id_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"data").unwrap();
    let (mut session, _) = ftp_session(&dir);
    let id = connect_ftp(&mut session);

    let (obj, _) = get(&mut session, vec![Header::connection(id + 1), Header::name("a.txt")]);
    assert_eq!(obj.response().last, ResponseCode::ServiceUnavailable);

    let (obj, _) = get(&mut session, vec![Header::name("a.txt")]);
    assert_eq!(obj.response().last, ResponseCode::ServiceUnavailable);

    let obj = put(&mut session, vec![Header::name("b.txt"), Header::length(1)], b"b");
    assert_eq!(obj.response().last, ResponseCode::ServiceUnavailable);
    assert!(!dir.path().join("b.txt").exists());

    let (obj, body) = get(&mut session, vec![Header::connection(id), Header::name("a.txt")]);
    assert_eq!(obj.response().last, ResponseCode::Success);
    assert_eq!(body, b"data");
}

/// A file larger than the MTU is sent in bounded chunks summing to its size
#[test]
fn test_ftp_get_chunks_to_tx_mtu() {
    let dir = tempfile::tempdir().unwrap();
    let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    fs::write(dir.path().join("data.bin"), &data).unwrap();
    let (mut session, manager) = ftp_session(&dir);

    let obj = connect(&mut session, 1024, vec![Header::target(&FTP_TARGET)]);
    assert_eq!(obj.response().last, ResponseCode::Success);
    assert_eq!(session.state().tx_mtu(), 824);
    let id = session.state().id().unwrap();

    let mut obj = ObexObject::new(
        Opcode::Get,
        Bytes::new(),
        vec![Header::connection(id), Header::name("data.bin")],
    );
    session.handle_event(Event::RequestHint, &mut obj);
    session.handle_event(Event::Request, &mut obj);
    assert_eq!(obj.reply_headers(), &[Header::length(5000)]);
    obj.take_reply_headers();

    let mut sizes = Vec::new();
    let mut received = Vec::new();
    while obj.is_streaming_out() {
        session.handle_event(Event::StreamEmpty, &mut obj);
        for header in obj.take_reply_headers() {
            sizes.push(header.data_len());
            received.extend_from_slice(header.data());
        }
    }

    assert!(sizes.iter().all(|&len| len <= 824));
    assert_eq!(sizes.last(), Some(&0));
    assert_eq!(received, data);

    session.handle_event(Event::RequestDone, &mut obj);
    assert_eq!(manager.get(id).unwrap().status, TransferStatus::Completed);
}

/// Missing files and folders answer NOT FOUND and FORBIDDEN
#[test]
fn test_ftp_get_errors() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    let (mut session, _) = ftp_session(&dir);
    let id = connect_ftp(&mut session);

    let (obj, _) = get(&mut session, vec![Header::connection(id), Header::name("missing")]);
    assert_eq!(obj.response().last, ResponseCode::NotFound);

    let (obj, _) = get(&mut session, vec![Header::connection(id), Header::name("sub")]);
    assert_eq!(obj.response().last, ResponseCode::Forbidden);

    let (obj, _) = get(&mut session, vec![Header::connection(id), Header::name("../etc")]);
    assert_eq!(obj.response().last, ResponseCode::BadRequest);
    assert!(!session.state().transfer().is_active());
}

/// SETPATH navigation and the folder listing of the current folder
#[test]
fn test_ftp_setpath_and_listing() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = ftp_session(&dir);
    let id = connect_ftp(&mut session);
    let create = SetPathFlags::default();
    let backup = SetPathFlags {
        backup: true,
        no_create: false,
    };
    let no_create = SetPathFlags {
        backup: false,
        no_create: true,
    };

    assert_eq!(setpath(&mut session, id, backup, None), ResponseCode::Forbidden);
    assert_eq!(setpath(&mut session, id, no_create, Some("docs")), ResponseCode::NotFound);
    assert_eq!(setpath(&mut session, id, create, None), ResponseCode::BadRequest);

    assert_eq!(setpath(&mut session, id, create, Some("docs")), ResponseCode::Success);
    assert_eq!(session.state().current_folder(), dir.path().join("docs"));
    fs::write(dir.path().join("docs/report.txt"), b"12345").unwrap();

    let (obj, body) = get(
        &mut session,
        vec![Header::connection(id), Header::mime_type(FOLDER_LISTING_TYPE)],
    );
    assert_eq!(obj.response().last, ResponseCode::Success);
    let xml = String::from_utf8(body).unwrap();
    assert!(xml.contains("<parent-folder/>"));
    assert!(xml.contains("<file name=\"report.txt\" size=\"5\""));

    assert_eq!(setpath(&mut session, id, backup, None), ResponseCode::Success);
    assert_eq!(session.state().current_folder(), dir.path());

    let (_, body) = get(
        &mut session,
        vec![Header::connection(id), Header::mime_type(FOLDER_LISTING_TYPE)],
    );
    let xml = String::from_utf8(body).unwrap();
    assert!(!xml.contains("<parent-folder/>"));
    assert!(xml.contains("<folder name=\"docs\""));

    // Empty name returns to the root
    setpath(&mut session, id, create, Some("docs"));
    assert_eq!(setpath(&mut session, id, create, Some("")), ResponseCode::Success);
    assert_eq!(session.state().current_folder(), dir.path());
}

/// File Transfer stores pushed files in the current folder
#[test]
fn test_ftp_put_into_subfolder() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = ftp_session(&dir);
    let id = connect_ftp(&mut session);
    setpath(&mut session, id, SetPathFlags::default(), Some("inbox"));

    let obj = put(
        &mut session,
        vec![Header::connection(id), Header::name("a.txt"), Header::length(3)],
        b"abc",
    );
    assert_eq!(obj.response().last, ResponseCode::Success);
    assert_eq!(fs::read(dir.path().join("inbox/a.txt")).unwrap(), b"abc");
}

/// Dropping a session mid-transfer reports it as failed and releases the id
#[test]
fn test_drop_releases_registry_slot() {
    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(ObjectPush::new(dir.path().join("card.vcf")));
    let (mut session, outcomes) = recorded_session(&dir, table);
    connect(&mut session, 1024, vec![]);
    let id = session.state().id().unwrap();
    assert_eq!(outcomes.manager.count(), 1);

    let mut obj = ObexObject::new(
        Opcode::Put,
        Bytes::new(),
        vec![Header::name("cut.bin"), Header::length(10)],
    );
    session.handle_event(Event::RequestHint, &mut obj);
    session.handle_event(Event::RequestCheck, &mut obj);
    obj.deliver_chunk(Bytes::from_static(b"1234"));
    session.handle_event(Event::StreamAvailable, &mut obj);

    drop(session);
    assert_eq!(outcomes.completed(), vec![(id, false)]);
    assert_eq!(outcomes.manager.count(), 0);
}

/// A streamed PUT cut off before its end is reported as failed
#[test]
fn test_streamed_put_cut_off_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, outcomes) = recorded_session(&dir, Arc::new(FileTransfer::new()));
    let id = connect_ftp(&mut session);

    let mut obj = ObexObject::new(
        Opcode::Put,
        Bytes::new(),
        vec![
            Header::connection(id),
            Header::name("stream.bin"),
            Header::body(Bytes::from_static(b"first")),
        ],
    );
    session.handle_event(Event::RequestHint, &mut obj);
    session.handle_event(Event::RequestCheck, &mut obj);
    obj.deliver_chunk(Bytes::from_static(b"first"));
    assert_eq!(session.handle_event(Event::StreamAvailable, &mut obj), Control::Continue);
    assert_eq!(session.state().object_size(), ObjectSize::Streamed);

    session.teardown();
    assert_eq!(outcomes.completed(), vec![(id, false)]);
}

/// A streamed PUT that reaches its end is reported as successful
#[test]
fn test_streamed_put_completes() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, outcomes) = recorded_session(&dir, Arc::new(FileTransfer::new()));
    let id = connect_ftp(&mut session);

    let obj = put(
        &mut session,
        vec![
            Header::connection(id),
            Header::name("stream.bin"),
            Header::end_of_body(Bytes::from_static(b"all")),
        ],
        b"all",
    );
    assert_eq!(obj.response().last, ResponseCode::Success);
    assert_eq!(fs::read(dir.path().join("stream.bin")).unwrap(), b"all");
    assert_eq!(outcomes.completed(), vec![(id, true)]);

    drop(session);
    assert_eq!(outcomes.completed(), vec![(id, true)]);
}

/// Only one chunk may wait for a destination that does not exist yet
#[test]
fn test_second_chunk_without_destination_cancels() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = recorded_session(&dir, Arc::new(DeferredPut));

    let mut obj = ObexObject::new(
        Opcode::Put,
        Bytes::new(),
        vec![Header::name("late.bin"), Header::length(10)],
    );
    session.handle_event(Event::RequestHint, &mut obj);
    session.handle_event(Event::RequestCheck, &mut obj);

    obj.deliver_chunk(Bytes::from_static(b"12345"));
    assert_eq!(session.handle_event(Event::StreamAvailable, &mut obj), Control::Continue);
    assert!(session.state().transfer().has_pending_buffer());

    obj.deliver_chunk(Bytes::from_static(b"67890"));
    assert_eq!(session.handle_event(Event::StreamAvailable, &mut obj), Control::Cancel);
    assert_eq!(obj.response().last, ResponseCode::InternalServerError);
    assert!(!dir.path().join("late.bin").exists());
}

/// The held chunk is flushed once the final packet opens the destination
#[test]
fn test_pending_chunk_flushed_on_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = recorded_session(&dir, Arc::new(DeferredPut));

    let obj = put(&mut session, vec![Header::name("late.bin"), Header::length(5)], b"12345");
    assert_eq!(obj.response().last, ResponseCode::Success);
    assert_eq!(fs::read(dir.path().join("late.bin")).unwrap(), b"12345");
}

/// The TIME of a pushed object becomes the stored file's modification time
#[test]
fn test_put_time_sets_modification_time() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = opp_session(&dir);

    let obj = put(
        &mut session,
        vec![Header::name("dated.txt"), Header::length(2), Header::time("20200101T000000Z")],
        b"ok",
    );
    assert_eq!(obj.response().last, ResponseCode::Success);

    let modified = fs::metadata(dir.path().join("dated.txt")).unwrap().modified().unwrap();
    let expected = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_577_836_800);
    assert_eq!(modified, expected);
}

/// Invalid TIME values are ignored
#[test]
fn test_time_header_values() {
    assert!(parse_iso8601(b"20240102T030405Z").is_some());
    assert!(parse_iso8601(b"20240102T030405").is_some());
    assert_eq!(parse_iso8601(b"20240102T0304"), None);
    // Out-of-range fields roll over into the next unit
    assert_eq!(parse_iso8601(b"20241302T030405"), parse_iso8601(b"20250102T030405"));
    assert_eq!(parse_iso8601(b""), None);
}

proptest! {
    /// Outbound chunks never exceed the MTU and add up to the object size
    #[test]
    fn prop_outbound_chunks_sum_to_size(size in 0usize..6000, tx_mtu in 55usize..2048) {
        let data: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj.bin");
        fs::write(&path, &data).unwrap();

        let mut from_file = Transfer::default();
        prop_assert_eq!(from_file.prepare_get(&path, tx_mtu).unwrap(), size as u64);
        let mut from_memory = Transfer::default();
        from_memory.prepare_memory(Bytes::from(data.clone()));

        for transfer in [&mut from_file, &mut from_memory] {
            let mut out = Vec::new();
            while let Some(chunk) = transfer.next_outbound(tx_mtu).unwrap() {
                prop_assert!(!chunk.is_empty() && chunk.len() <= tx_mtu);
                out.extend_from_slice(&chunk);
            }
            prop_assert_eq!(&out, &data);
            prop_assert!(transfer.is_complete());
        }
    }
}
