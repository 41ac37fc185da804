//! Session management
//!
//! A session owns a pty, the child process leading it, and the virtual screen
//! its output is drawn into. Pty reads and writes happen on per-session worker
//! threads; the screen itself is only touched by the owner of the
//! [`SessionTable`].

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::pty::{CommandSpec, Pty, PtyError};
use super::screen::VirtualScreen;

/// Number of slots in the session table (one per digit key)
pub const MAX_SESSIONS: usize = 10;

const READ_CHUNK: usize = 4096;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No More Sessions Available")]
    AllocationExhausted,

    #[error("No pseudoterminal available: {0}")]
    PtyExhausted(#[source] PtyError),

    #[error("Failed to start session: {0}")]
    SpawnFailure(#[source] PtyError),

    #[error("PTY I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Session {slot} input queue is full ({queued} bytes pending)")]
    Backpressure { slot: usize, queued: usize },

    #[error("Session has terminated")]
    Closed,

    #[error("Session {0} does not exist")]
    NoSuchSession(usize),
}

impl From<PtyError> for SessionError {
    fn from(err: PtyError) -> Self {
        match err {
            PtyError::Open(_) => SessionError::PtyExhausted(err),
            other => SessionError::SpawnFailure(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Terminated,
}

/// Parameters shared by every session the table creates
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub rows: u16,
    pub cols: u16,
    /// Bytes that may wait for the writer thread before writes are refused
    pub write_queue_limit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            write_queue_limit: 64 * 1024,
        }
    }
}

/// A pty-backed terminal session
pub struct Session {
    /// Slot index in the session table
    pub id: usize,
    command: CommandSpec,
    screen: VirtualScreen,
    state: SessionState,
    pty: Option<Pty>,
    pid: Option<u32>,
    exit_code: Option<u32>,
    /// Cleared to stop the reader thread from forwarding anything more
    running: Arc<AtomicBool>,
    output_rx: Option<Receiver<Vec<u8>>>,
    /// Tail of a chunk that did not fit in the previous read budget
    pending: Vec<u8>,
    input_tx: Option<Sender<Vec<u8>>>,
    queued: Arc<AtomicUsize>,
    write_queue_limit: usize,
    reader_thread: Option<JoinHandle<()>>,
    writer_thread: Option<JoinHandle<()>>,
}

impl Session {
    /// Spawn `command` on a fresh pty and start its I/O workers
    pub fn create(id: usize, command: &CommandSpec, opts: SessionOptions) -> Result<Self> {
        let pty = Pty::spawn(command, opts.rows, opts.cols)?;
        let mut reader = pty.reader().map_err(SessionError::SpawnFailure)?;
        let mut writer = pty.writer().map_err(SessionError::SpawnFailure)?;
        let pid = pty.pid();

        let running = Arc::new(AtomicBool::new(true));
        let queued = Arc::new(AtomicUsize::new(0));

        // Reader: blocking reads forwarded in order over the channel
        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>();
        let reader_running = running.clone();
        let reader_thread = thread::Builder::new()
            .name(format!("pty-reader-{}", id))
            .spawn(move || {
                let mut buffer = vec![0u8; READ_CHUNK];
                loop {
                    match reader.read(&mut buffer) {
                        Ok(0) => break,
                        Ok(n) => {
                            // The session may have been killed while we were blocked
                            if !reader_running.load(Ordering::SeqCst) {
                                break;
                            }
                            if output_tx.send(buffer[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            debug!("pty reader {} stopped: {}", id, e);
                            break;
                        }
                    }
                }
                reader_running.store(false, Ordering::SeqCst);
            })?;

        // Writer: drains queued keyboard input so the caller never blocks
        let (input_tx, input_rx) = mpsc::channel::<Vec<u8>>();
        let writer_queued = queued.clone();
        let writer_thread = thread::Builder::new()
            .name(format!("pty-writer-{}", id))
            .spawn(move || {
                for chunk in input_rx {
                    let result = writer.write_all(&chunk).and_then(|_| writer.flush());
                    writer_queued.fetch_sub(chunk.len(), Ordering::SeqCst);
                    if let Err(e) = result {
                        debug!("pty writer {} stopped: {}", id, e);
                        break;
                    }
                }
            })?;

        info!("session {} started: {} (pid {:?})", id, command.program, pid);

        Ok(Self {
            id,
            command: command.clone(),
            screen: VirtualScreen::new(opts.rows, opts.cols),
            state: SessionState::Active,
            pty: Some(pty),
            pid,
            exit_code: None,
            running,
            output_rx: Some(output_rx),
            pending: Vec::new(),
            input_tx: Some(input_tx),
            queued,
            write_queue_limit: opts.write_queue_limit,
            reader_thread: Some(reader_thread),
            writer_thread: Some(writer_thread),
        })
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    pub fn screen(&self) -> &VirtualScreen {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut VirtualScreen {
        &mut self.screen
    }

    /// Take up to `limit` bytes of pty output that is already available.
    ///
    /// An empty result means nothing is ready yet. `Err(Closed)` means the
    /// child's side is gone and every byte it wrote has been delivered.
    pub fn read(&mut self, limit: usize) -> Result<Vec<u8>> {
        let rx = match &self.output_rx {
            Some(rx) => rx,
            None => return Err(SessionError::Closed),
        };

        let mut out = Vec::new();
        if !self.pending.is_empty() {
            let take = self.pending.len().min(limit);
            out.extend(self.pending.drain(..take));
        }

        while out.len() < limit {
            match rx.try_recv() {
                Ok(chunk) => {
                    let room = limit - out.len();
                    if chunk.len() > room {
                        out.extend_from_slice(&chunk[..room]);
                        self.pending.extend_from_slice(&chunk[room..]);
                    } else {
                        out.extend_from_slice(&chunk);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if out.is_empty() && self.pending.is_empty() {
                        return Err(SessionError::Closed);
                    }
                    break;
                }
            }
        }

        Ok(out)
    }

    /// Whether output is already buffered past the last read budget
    pub fn has_backlog(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Move available output into the virtual screen. Returns the byte count.
    pub fn pump(&mut self, limit: usize) -> Result<usize> {
        let bytes = self.read(limit)?;
        self.screen.feed(&bytes);
        Ok(bytes.len())
    }

    /// Queue one byte for the pty, as if typed on a keyboard
    pub fn write(&mut self, byte: u8) -> Result<usize> {
        self.write_bytes(&[byte])
    }

    /// Queue bytes for the pty without blocking
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<usize> {
        let tx = match (&self.input_tx, self.state) {
            (Some(tx), SessionState::Active) => tx,
            _ => return Err(SessionError::Closed),
        };

        let queued = self.queued.load(Ordering::SeqCst);
        if queued + data.len() > self.write_queue_limit {
            return Err(SessionError::Backpressure {
                slot: self.id,
                queued,
            });
        }

        self.queued.fetch_add(data.len(), Ordering::SeqCst);
        if tx.send(data.to_vec()).is_err() {
            self.queued.fetch_sub(data.len(), Ordering::SeqCst);
            return Err(SessionError::Closed);
        }
        Ok(data.len())
    }

    /// Non-blocking check for child exit. Reaps the child when it has exited.
    pub fn try_wait(&mut self) -> Option<u32> {
        if self.exit_code.is_none() {
            if let Some(pty) = self.pty.as_mut() {
                match pty.try_wait() {
                    Ok(code) => self.exit_code = code,
                    Err(e) => warn!("session {}: {}", self.id, e),
                }
            }
        }
        self.exit_code
    }

    /// Kill the process group, close the pty and drop undelivered output.
    /// Safe to call more than once.
    pub fn kill(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.state = SessionState::Terminated;
        self.running.store(false, Ordering::SeqCst);

        // Nothing queued after this point reaches the screen
        self.output_rx = None;
        self.pending.clear();
        self.input_tx = None;

        if let Some(mut pty) = self.pty.take() {
            if let Err(e) = pty.kill() {
                warn!("session {}: {}", self.id, e);
            }
            if self.exit_code.is_none() {
                self.exit_code = pty.try_wait().ok().flatten();
            }
        }

        // Workers exit once the pty is gone; don't wait on them here
        self.reader_thread.take();
        self.writer_thread.take();

        info!("session {} terminated (exit {:?})", self.id, self.exit_code);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Fixed-capacity table of sessions keyed by slot index
pub struct SessionTable {
    slots: Vec<Option<Session>>,
    foreground: Option<usize>,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_SESSIONS).map(|_| None).collect(),
            foreground: None,
        }
    }

    /// First empty slot
    pub fn allocate(&self) -> Result<usize> {
        self.slots
            .iter()
            .position(Option::is_none)
            .ok_or(SessionError::AllocationExhausted)
    }

    /// Start a session in the first empty slot and make it foreground
    pub fn spawn(&mut self, command: &CommandSpec, opts: SessionOptions) -> Result<usize> {
        let slot = self.allocate()?;
        let session = Session::create(slot, command, opts)?;
        self.slots[slot] = Some(session);
        self.foreground = Some(slot);
        Ok(slot)
    }

    /// Active session at `index`
    pub fn get(&self, index: usize) -> Option<&Session> {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .filter(|s| s.is_active())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Session> {
        self.slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .filter(|s| s.is_active())
    }

    pub fn foreground(&self) -> Option<usize> {
        self.foreground
    }

    pub fn foreground_session_mut(&mut self) -> Option<&mut Session> {
        let index = self.foreground?;
        self.get_mut(index)
    }

    pub fn set_foreground(&mut self, index: usize) -> Result<()> {
        if self.get(index).is_none() {
            return Err(SessionError::NoSuchSession(index));
        }
        self.foreground = Some(index);
        Ok(())
    }

    /// Indices of active sessions in ascending order
    pub fn active_ids(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.as_ref().map_or(false, Session::is_active))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.active_ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free a slot, handing back whatever session was in it. If it was the
    /// foreground, the lowest remaining active slot takes over.
    pub fn release(&mut self, index: usize) -> Option<Session> {
        let session = self.slots.get_mut(index)?.take();
        if self.foreground == Some(index) {
            self.foreground = self.active_ids().first().copied();
        }
        session
    }

    /// Kill and release the session at `index`
    pub fn kill(&mut self, index: usize) -> Result<()> {
        if self.get(index).is_none() {
            return Err(SessionError::NoSuchSession(index));
        }
        if let Some(mut session) = self.release(index) {
            session.kill();
        }
        Ok(())
    }

    /// Kill every session in slot order
    pub fn kill_all(&mut self) {
        for index in 0..self.slots.len() {
            if let Some(mut session) = self.release(index) {
                session.kill();
            }
        }
        self.foreground = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pty::exited;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::with_args("/bin/sh", ["-c", script])
    }

    fn opts() -> SessionOptions {
        SessionOptions {
            rows: 5,
            cols: 20,
            write_queue_limit: 1024,
        }
    }

    fn pump_until<F>(session: &mut Session, mut done: F) -> bool
    where
        F: FnMut(&Session) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let _ = session.pump(4096);
            if done(session) {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_output_reaches_screen() {
        let mut session = Session::create(0, &sh("printf hi; sleep 10"), opts()).unwrap();
        assert!(session.is_active());

        let ok = pump_until(&mut session, |s| {
            s.screen().row_text(0).unwrap().starts_with("hi")
        });
        assert!(ok, "screen: {:?}", session.screen().row_text(0));
        assert_eq!(session.screen().cursor().col, 2);
    }

    #[test]
    fn test_read_respects_limit_and_order() {
        let mut session =
            Session::create(0, &sh("printf abcdefghij; sleep 10"), opts()).unwrap();

        let mut collected = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while collected.len() < 10 && Instant::now() < deadline {
            let chunk = session.read(3).unwrap();
            assert!(chunk.len() <= 3);
            collected.extend(chunk);
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(collected, b"abcdefghij");
    }

    #[test]
    fn test_input_is_echoed_through_pty() {
        let mut session = Session::create(0, &sh("cat"), opts()).unwrap();
        for &b in b"ping" {
            session.write(b).unwrap();
        }

        let ok = pump_until(&mut session, |s| {
            s.screen().row_text(0).unwrap().contains("ping")
        });
        assert!(ok);
    }

    #[test]
    fn test_eof_reports_closed() {
        let mut session = Session::create(0, &sh("printf bye"), opts()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut closed = false;
        while Instant::now() < deadline {
            match session.pump(4096) {
                Err(SessionError::Closed) => {
                    closed = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
                Ok(_) => thread::sleep(Duration::from_millis(20)),
            }
        }
        assert!(closed);
        // Output written before exit still made it in
        assert!(session.screen().row_text(0).unwrap().starts_with("bye"));
    }

    #[test]
    fn test_kill_is_idempotent() {
        let mut session = Session::create(0, &sh("sleep 30"), opts()).unwrap();
        session.kill();
        assert!(!session.is_active());
        assert!(session.exit_code().is_some());

        session.kill();
        assert!(!session.is_active());
        assert!(matches!(session.write(b'x'), Err(SessionError::Closed)));
        assert!(matches!(session.read(10), Err(SessionError::Closed)));
    }

    #[test]
    fn test_kill_after_leader_exit_stops_group() {
        let mut session =
            Session::create(0, &sh("sleep 30 & echo $!; exit 0"), opts()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let _ = session.pump(4096);
            if session.try_wait().is_some() && session.screen().cursor().row > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(session.exit_code(), Some(0));
        // The background sleep still holds the slave open
        assert!(session.is_active());

        let background: u32 = session.screen().row_text(0).unwrap().trim().parse().unwrap();
        session.kill();
        assert!(!session.is_active());
        assert!(exited(background));
    }

    #[test]
    fn test_read_keeps_tail_as_backlog() {
        let mut session =
            Session::create(0, &sh("printf abcdefghij; sleep 10"), opts()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut first = Vec::new();
        while first.is_empty() && Instant::now() < deadline {
            first = session.read(2).unwrap();
            thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(first.len(), 2);
        assert!(session.has_backlog());

        let rest = session.read(4096).unwrap();
        assert!(!session.has_backlog());
        assert!(!rest.is_empty());
    }

    #[test]
    fn test_backpressure_is_surfaced() {
        let small = SessionOptions {
            write_queue_limit: 0,
            ..opts()
        };
        let mut session = Session::create(3, &sh("sleep 30"), small).unwrap();
        match session.write(b'x') {
            Err(SessionError::Backpressure { slot, .. }) => assert_eq!(slot, 3),
            other => panic!("expected backpressure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_spawn_failure() {
        let result = Session::create(0, &CommandSpec::new("/nonexistent/dumbmux"), opts());
        assert!(matches!(result, Err(SessionError::SpawnFailure(_))));
    }

    #[test]
    fn test_table_allocates_first_empty_slot() {
        let mut table = SessionTable::new();
        assert_eq!(table.allocate().unwrap(), 0);

        let a = table.spawn(&sh("sleep 30"), opts()).unwrap();
        let b = table.spawn(&sh("sleep 30"), opts()).unwrap();
        let c = table.spawn(&sh("sleep 30"), opts()).unwrap();
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(table.foreground(), Some(2));

        table.kill(1).unwrap();
        assert_eq!(table.allocate().unwrap(), 1);
        assert_eq!(table.spawn(&sh("sleep 30"), opts()).unwrap(), 1);
        assert_eq!(table.active_ids(), vec![0, 1, 2]);
    }

    #[test]
    fn test_table_full_fails_cleanly() {
        let mut table = SessionTable::new();
        for _ in 0..MAX_SESSIONS {
            table.spawn(&sh("sleep 30"), opts()).unwrap();
        }
        let before: Vec<Option<u32>> = (0..MAX_SESSIONS)
            .map(|i| table.get(i).and_then(Session::pid))
            .collect();

        let result = table.spawn(&sh("sleep 30"), opts());
        assert!(matches!(result, Err(SessionError::AllocationExhausted)));

        let after: Vec<Option<u32>> = (0..MAX_SESSIONS)
            .map(|i| table.get(i).and_then(Session::pid))
            .collect();
        assert_eq!(before, after);
        assert_eq!(table.len(), MAX_SESSIONS);
        assert_eq!(table.foreground(), Some(MAX_SESSIONS - 1));
    }

    #[test]
    fn test_kill_foreground_falls_back_to_lowest() {
        let mut table = SessionTable::new();
        for _ in 0..3 {
            table.spawn(&sh("sleep 30"), opts()).unwrap();
        }
        table.set_foreground(1).unwrap();

        table.kill(1).unwrap();
        assert!(table.get(1).is_none());
        assert_eq!(table.foreground(), Some(0));

        // Killing a background session leaves foreground alone
        table.kill(2).unwrap();
        assert_eq!(table.foreground(), Some(0));

        table.kill(0).unwrap();
        assert_eq!(table.foreground(), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_missing_sessions() {
        let mut table = SessionTable::new();
        assert!(matches!(table.set_foreground(4), Err(SessionError::NoSuchSession(4))));
        assert!(matches!(table.kill(4), Err(SessionError::NoSuchSession(4))));
        assert!(matches!(table.kill(42), Err(SessionError::NoSuchSession(42))));
        assert!(table.get(42).is_none());
    }

    #[test]
    fn test_kill_all() {
        let mut table = SessionTable::new();
        table.spawn(&sh("sleep 30"), opts()).unwrap();
        table.spawn(&sh("sleep 30"), opts()).unwrap();

        table.kill_all();
        assert!(table.is_empty());
        assert_eq!(table.foreground(), None);
    }
}
