//! Per-device scrcpy sessions.
//!
//! A session owns the two tunnel sockets (video first, then control; the
//! device-side server accepts them in that order and blocks on the second
//! `accept()` before emitting anything), the parsed metadata frame, a
//! writer thread that serializes every outbound control message, and a
//! reader thread that demultiplexes device messages into FIFO clipboard
//! waiters.

use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adb::runner::resolve_serial;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::models::{DeviceMetadata, SessionInfo};
use crate::scrcpy::protocol::{
    decode_device_message, encode_control_message, parse_metadata_frame, ControlMessage,
    DeviceMessage, ProtocolError, METADATA_FRAME_LEN,
};
use crate::scrcpy::server::{
    build_server_command, install_forward, kill_device_server, locate_server_jar, pick_free_port,
    push_server, remove_forward, spawn_server, ServerOptions,
};

/// `adb forward` accepts TCP before the server listens, so a fresh
/// connection proves nothing until the server's dummy byte arrives.
pub const DUMMY_BYTE_BUDGET: Duration = Duration::from_secs(10);
const DUMMY_BYTE_RETRY_DELAY: Duration = Duration::from_millis(250);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
pub const CLIPBOARD_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Ready,
    Closing,
}

type ClipboardWaiter = Sender<Result<String, BridgeError>>;

pub struct Session {
    pub serial: String,
    pub scid: u32,
    pub server_version: String,
    pub local_port: u16,
    pub metadata: DeviceMetadata,
    state: Mutex<SessionState>,
    control: Mutex<Option<TcpStream>>,
    video: Mutex<Option<(TcpStream, Vec<u8>)>>,
    writer_tx: Mutex<Option<Sender<Vec<u8>>>>,
    clipboard_waiters: Mutex<VecDeque<ClipboardWaiter>>,
    clipboard_seq: AtomicU64,
}

impl Session {
    pub fn scid_hex(&self) -> String {
        format!("{:08x}", self.scid)
    }

    pub fn socket_name(&self) -> String {
        format!("scrcpy_{}", self.scid_hex())
    }

    pub fn is_ready(&self) -> bool {
        *self.state.lock().expect("session state poisoned") == SessionState::Ready
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            serial: self.serial.clone(),
            scid: self.scid_hex(),
            server_version: self.server_version.clone(),
            local_port: self.local_port,
            device_name: self.metadata.device_name.clone(),
            codec_id: self.metadata.codec_id,
            width: self.metadata.width,
            height: self.metadata.height,
        }
    }

    /// Monotonic sequence for set-clipboard messages, starting at 1.
    fn next_clipboard_sequence(&self) -> u64 {
        self.clipboard_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Encode and enqueue one control message. Delivery order matches
    /// enqueue order; the write itself happens on the writer thread.
    pub fn send_control(
        &self,
        message: &ControlMessage,
        trace_id: &str,
    ) -> Result<(), BridgeError> {
        let encoded =
            encode_control_message(message).map_err(|err| err.into_bridge_error(trace_id))?;
        let guard = self.writer_tx.lock().expect("writer handle poisoned");
        match guard.as_ref() {
            Some(tx) => tx.send(encoded).map_err(|_| {
                BridgeError::transport_broken("control writer stopped", trace_id)
            }),
            None => Err(BridgeError::transport_broken(
                "control socket closed",
                trace_id,
            )),
        }
    }

    /// Request the device clipboard and wait for the matching reply.
    /// Replies resolve waiters strictly in request order.
    pub fn clipboard_get(&self, copy_key: u8, trace_id: &str) -> Result<String, BridgeError> {
        let (tx, rx) = mpsc::channel();
        self.clipboard_waiters
            .lock()
            .expect("clipboard waiters poisoned")
            .push_back(tx);
        self.send_control(&ControlMessage::GetClipboard { copy_key }, trace_id)?;
        match rx.recv_timeout(CLIPBOARD_REPLY_TIMEOUT) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(err)) => Err(err.with_trace_id(trace_id)),
            Err(_) => Err(BridgeError::clipboard_timeout(trace_id)),
        }
    }

    /// Fire-and-forget set-clipboard; returns the sequence it was sent
    /// with.
    pub fn clipboard_set(
        &self,
        text: &str,
        paste: bool,
        trace_id: &str,
    ) -> Result<u64, BridgeError> {
        let sequence = self.next_clipboard_sequence();
        self.send_control(
            &ControlMessage::SetClipboard {
                sequence,
                paste,
                text: text.to_string(),
            },
            trace_id,
        )?;
        Ok(sequence)
    }

    /// Hand the video stream and any bytes read past the metadata frame
    /// to a downstream consumer. Single-shot.
    pub fn take_video(&self) -> Option<(TcpStream, Vec<u8>)> {
        self.video.lock().expect("video handle poisoned").take()
    }
}

/// Process-wide session table, keyed by serial. Insertions happen only in
/// `start_session`, removals only in `teardown`.
pub struct SessionManager {
    config: BridgeConfig,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    start_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            start_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn get_ready(&self, serial: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .expect("session table poisoned")
            .get(serial)
            .filter(|session| session.is_ready())
            .cloned()
    }

    fn start_lock(&self, serial: &str) -> Arc<Mutex<()>> {
        let mut guard = self.start_locks.lock().expect("start locks poisoned");
        guard
            .entry(serial.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run the start protocol: locate jar, resolve serial, push, reserve a
    /// port, install the forward, spawn the server, verify both tunnel
    /// sockets, read the metadata frame, register. Any failure unwinds
    /// what it set up and leaves the table untouched.
    pub fn start_session(
        self: &Arc<Self>,
        serial: Option<&str>,
        options: &ServerOptions,
        trace_id: &str,
    ) -> Result<SessionInfo, BridgeError> {
        let jar = locate_server_jar(self.config.server_path.as_deref())
            .ok_or_else(|| BridgeError::server_not_found(trace_id))?;
        let serial = resolve_serial(&self.config.adb_path, serial, trace_id)?;

        let lock = self.start_lock(&serial);
        let _guard = lock.lock().expect("start lock poisoned");

        if let Some(existing) = self.get_ready(&serial) {
            debug!(trace_id = %trace_id, serial = %serial, "session already running");
            return Ok(existing.info());
        }

        push_server(&self.config.adb_path, &serial, &jar, trace_id)?;

        let scid = rand::random::<u32>() & 0x7FFF_FFFF;
        let scid_hex = format!("{scid:08x}");
        let socket_name = format!("scrcpy_{scid_hex}");
        let port = pick_free_port(trace_id)?;
        install_forward(&self.config.adb_path, &serial, port, &socket_name, trace_id)?;

        let command = build_server_command(&self.config.server_version, &scid_hex, options);
        info!(
            trace_id = %trace_id,
            serial = %serial,
            scid = %scid_hex,
            port,
            "starting scrcpy session"
        );
        if let Err(err) = spawn_server(&self.config.adb_path, &serial, &command, trace_id) {
            let _ = remove_forward(&self.config.adb_path, &serial, port, trace_id);
            return Err(err);
        }

        let (video, control, metadata, overflow) = match establish_tunnel(port, trace_id) {
            Ok(parts) => parts,
            Err(err) => {
                let _ = remove_forward(&self.config.adb_path, &serial, port, trace_id);
                return Err(err);
            }
        };

        let session = self.register(
            serial, scid, port, video, control, metadata, overflow, trace_id,
        )?;
        Ok(session.info())
    }

    /// Wire up the session threads and publish it in the table.
    #[allow(clippy::too_many_arguments)]
    fn register(
        self: &Arc<Self>,
        serial: String,
        scid: u32,
        port: u16,
        video: TcpStream,
        control: TcpStream,
        metadata: DeviceMetadata,
        overflow: Vec<u8>,
        trace_id: &str,
    ) -> Result<Arc<Session>, BridgeError> {
        let reader_stream = control.try_clone().map_err(|err| {
            BridgeError::transport_broken(format!("failed to clone control socket: {err}"), trace_id)
        })?;
        let writer_stream = control.try_clone().map_err(|err| {
            BridgeError::transport_broken(format!("failed to clone control socket: {err}"), trace_id)
        })?;

        let (writer_tx, writer_rx) = mpsc::channel::<Vec<u8>>();
        let session = Arc::new(Session {
            serial: serial.clone(),
            scid,
            server_version: self.config.server_version.clone(),
            local_port: port,
            metadata,
            state: Mutex::new(SessionState::Connecting),
            control: Mutex::new(Some(control)),
            video: Mutex::new(Some((video, overflow))),
            writer_tx: Mutex::new(Some(writer_tx)),
            clipboard_waiters: Mutex::new(VecDeque::new()),
            clipboard_seq: AtomicU64::new(1),
        });

        {
            let manager = Arc::clone(self);
            let serial = session.serial.clone();
            thread::spawn(move || writer_loop(manager, serial, writer_stream, writer_rx));
        }
        {
            let manager = Arc::clone(self);
            let serial = session.serial.clone();
            thread::spawn(move || reader_loop(manager, serial, reader_stream));
        }

        *session.state.lock().expect("session state poisoned") = SessionState::Ready;
        self.sessions
            .lock()
            .expect("session table poisoned")
            .insert(session.serial.clone(), Arc::clone(&session));
        info!(
            trace_id = %trace_id,
            serial = %session.serial,
            device = %session.metadata.device_name,
            width = session.metadata.width,
            height = session.metadata.height,
            "scrcpy session ready"
        );
        Ok(session)
    }

    pub fn stop_session(&self, serial: &str, trace_id: &str) -> bool {
        self.teardown(serial, None, trace_id)
    }

    /// Remove the session, close both sockets, fail pending waiters and
    /// unwind the device-side state. Idempotent: the first caller wins.
    pub fn teardown(&self, serial: &str, reason: Option<BridgeError>, trace_id: &str) -> bool {
        let session = {
            self.sessions
                .lock()
                .expect("session table poisoned")
                .remove(serial)
        };
        let Some(session) = session else {
            return false;
        };

        *session.state.lock().expect("session state poisoned") = SessionState::Closing;
        // Dropping the sender stops the writer thread once the queue is
        // drained; shutting the socket down unblocks the reader.
        session
            .writer_tx
            .lock()
            .expect("writer handle poisoned")
            .take();
        if let Some(control) = session.control.lock().expect("control handle poisoned").take() {
            let _ = control.shutdown(Shutdown::Both);
        }
        if let Some((video, _)) = session.video.lock().expect("video handle poisoned").take() {
            let _ = video.shutdown(Shutdown::Both);
        }

        let failure = reason
            .unwrap_or_else(|| BridgeError::transport_broken("session closed", trace_id));
        {
            let mut waiters = session
                .clipboard_waiters
                .lock()
                .expect("clipboard waiters poisoned");
            while let Some(waiter) = waiters.pop_front() {
                let _ = waiter.send(Err(failure.clone()));
            }
        }

        let _ = remove_forward(&self.config.adb_path, serial, session.local_port, trace_id);
        kill_device_server(&self.config.adb_path, serial, trace_id);
        info!(trace_id = %trace_id, serial = %serial, "scrcpy session closed");
        true
    }

    /// Resolve the oldest clipboard waiter with an incoming device frame.
    /// With clipboard autosync the device also pushes unsolicited frames;
    /// those are dropped when nobody is waiting.
    fn resolve_clipboard(&self, serial: &str, text: String) {
        let session = {
            self.sessions
                .lock()
                .expect("session table poisoned")
                .get(serial)
                .cloned()
        };
        let Some(session) = session else {
            return;
        };
        let waiter = session
            .clipboard_waiters
            .lock()
            .expect("clipboard waiters poisoned")
            .pop_front();
        match waiter {
            Some(waiter) => {
                if waiter.send(Ok(text)).is_err() {
                    debug!(serial = %serial, "clipboard waiter gave up before the reply");
                }
            }
            None => debug!(serial = %serial, "unsolicited clipboard frame dropped"),
        }
    }
}

/// Open and verify both tunnel sockets in the order the server accepts
/// them, then read the metadata frame off the video socket. Bytes past
/// the frame are the start of the video stream and are carried along.
fn establish_tunnel(
    port: u16,
    trace_id: &str,
) -> Result<(TcpStream, TcpStream, DeviceMetadata, Vec<u8>), BridgeError> {
    let mut video = connect_and_verify(port, DUMMY_BYTE_BUDGET, trace_id)?;
    let control = match connect_and_verify(port, DUMMY_BYTE_BUDGET, trace_id) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = video.shutdown(Shutdown::Both);
            return Err(err);
        }
    };
    match read_metadata_frame(&mut video, trace_id) {
        Ok((metadata, overflow)) => Ok((video, control, metadata, overflow)),
        Err(err) => {
            let _ = video.shutdown(Shutdown::Both);
            let _ = control.shutdown(Shutdown::Both);
            Err(err)
        }
    }
}

/// Connect to the forwarded port until the server's dummy byte arrives.
/// A connection that closes or stalls before delivering it is discarded
/// and retried on a fixed backoff.
fn connect_and_verify(
    port: u16,
    budget: Duration,
    trace_id: &str,
) -> Result<TcpStream, BridgeError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let deadline = Instant::now() + budget;
    loop {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(mut stream) => {
                let _ = stream.set_read_timeout(Some(Duration::from_secs(1)));
                let mut dummy = [0u8; 1];
                match stream.read_exact(&mut dummy) {
                    Ok(()) => {
                        let _ = stream.set_read_timeout(None);
                        let _ = stream.set_nodelay(true);
                        return Ok(stream);
                    }
                    Err(err) => {
                        debug!(
                            trace_id = %trace_id,
                            port,
                            error = %err,
                            "tunnel accepted but no dummy byte yet"
                        );
                        let _ = stream.shutdown(Shutdown::Both);
                    }
                }
            }
            Err(err) => {
                debug!(trace_id = %trace_id, port, error = %err, "tunnel connect failed");
            }
        }
        if Instant::now() >= deadline {
            return Err(BridgeError::dummy_byte_missing(trace_id));
        }
        thread::sleep(DUMMY_BYTE_RETRY_DELAY);
    }
}

/// Accumulate the 76-byte metadata frame across partial reads.
fn read_metadata_frame(
    stream: &mut TcpStream,
    trace_id: &str,
) -> Result<(DeviceMetadata, Vec<u8>), BridgeError> {
    let deadline = Instant::now() + METADATA_TIMEOUT;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(500)));
    let mut buf: Vec<u8> = Vec::with_capacity(METADATA_FRAME_LEN);
    let mut chunk = [0u8; 4096];
    while buf.len() < METADATA_FRAME_LEN {
        if Instant::now() >= deadline {
            return Err(BridgeError::metadata_timeout(trace_id));
        }
        match stream.read(&mut chunk) {
            Ok(0) => return Err(BridgeError::metadata_timeout(trace_id)),
            Ok(read) => buf.extend_from_slice(&chunk[..read]),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue;
            }
            Err(err) => {
                return Err(BridgeError::transport_broken(
                    format!("metadata read failed: {err}"),
                    trace_id,
                ));
            }
        }
    }
    let _ = stream.set_read_timeout(None);
    parse_metadata_frame(&buf).map_err(|err| err.into_bridge_error(trace_id))
}

/// Single writer per session: every control message goes out through this
/// loop, in enqueue order. A failed write tears the session down and the
/// queue dies with the channel.
fn writer_loop(
    manager: Arc<SessionManager>,
    serial: String,
    mut stream: TcpStream,
    rx: Receiver<Vec<u8>>,
) {
    for message in rx.iter() {
        if let Err(err) = stream.write_all(&message) {
            let trace_id = Uuid::new_v4().to_string();
            warn!(trace_id = %trace_id, serial = %serial, error = %err, "control write failed");
            manager.teardown(
                &serial,
                Some(BridgeError::transport_broken(
                    format!("control write failed: {err}"),
                    &trace_id,
                )),
                &trace_id,
            );
            while rx.try_recv().is_ok() {}
            return;
        }
    }
}

/// Single reader per session: frames device messages off the control
/// socket and dispatches them. Any socket error or close ends the
/// session.
fn reader_loop(manager: Arc<SessionManager>, serial: String, mut stream: TcpStream) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => {
                let trace_id = Uuid::new_v4().to_string();
                debug!(trace_id = %trace_id, serial = %serial, "control socket closed by device");
                manager.teardown(
                    &serial,
                    Some(BridgeError::transport_broken(
                        "control socket closed",
                        &trace_id,
                    )),
                    &trace_id,
                );
                return;
            }
            Ok(read) => {
                buf.extend_from_slice(&chunk[..read]);
                loop {
                    match decode_device_message(&buf) {
                        Ok(Some((message, consumed))) => {
                            buf.drain(..consumed);
                            match message {
                                DeviceMessage::Clipboard { text } => {
                                    manager.resolve_clipboard(&serial, text);
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            let trace_id = Uuid::new_v4().to_string();
                            warn!(
                                trace_id = %trace_id,
                                serial = %serial,
                                error = %err,
                                "device message stream corrupt"
                            );
                            let reason = match err {
                                ProtocolError::OversizeClipboardReply { len } => {
                                    BridgeError::oversize_clipboard_reply(len, &trace_id)
                                }
                                other => other.into_bridge_error(&trace_id),
                            };
                            manager.teardown(&serial, Some(reason), &trace_id);
                            return;
                        }
                    }
                }
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                continue;
            }
            Err(err) => {
                let trace_id = Uuid::new_v4().to_string();
                warn!(trace_id = %trace_id, serial = %serial, error = %err, "control read failed");
                manager.teardown(
                    &serial,
                    Some(BridgeError::transport_broken(
                        format!("control read failed: {err}"),
                        &trace_id,
                    )),
                    &trace_id,
                );
                return;
            }
        }
    }
}
