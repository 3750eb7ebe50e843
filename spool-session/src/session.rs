//! Session lifecycle driven by a dedicated worker thread.
//!
//! Every request is queued to the worker and answered through a
//! [`Transition`] handle. The worker runs one hook at a time, so no two
//! lifecycle hooks of a session ever overlap, and a `close` queued behind
//! a running hook waits for it.

use crate::state::{SessionEvent, SessionState};
use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use spool_core::{Error, Rational, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Result of one [`SessionHooks::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// More media remains.
    Continue,
    /// Every track has ended.
    Finished,
}

/// Work performed at each lifecycle transition.
///
/// Hooks run on the session's worker thread, never concurrently.
pub trait SessionHooks: Send + 'static {
    /// Acquire resources: open containers, resolve codecs.
    fn realize(&mut self) -> Result<()>;

    /// Prepare to start without delay.
    fn prefetch(&mut self) -> Result<()> {
        Ok(())
    }

    /// Begin media flow.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Pause media flow.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reposition to the nearest keyframe at or before `time` and drop
    /// order-dependent codec state.
    fn seek(&mut self, time: Rational) -> Result<()>;

    /// Move media while started. Called repeatedly between requests.
    fn step(&mut self) -> Result<StepOutcome> {
        Ok(StepOutcome::Finished)
    }

    /// Release everything. Runs once, also after a failed hook.
    fn close(&mut self);
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the worker thread
    pub thread_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            thread_name: "spool-session".to_string(),
        }
    }
}

type Outcome = std::result::Result<SessionState, Arc<Error>>;

enum Command {
    Goto { target: SessionState, reply: Sender<Outcome> },
    Stop { reply: Sender<Outcome> },
    Seek { time: Rational, reply: Sender<Outcome> },
    Close { reply: Sender<Outcome> },
}

impl Command {
    fn reply(self, outcome: Outcome) {
        let reply = match self {
            Command::Goto { reply, .. }
            | Command::Stop { reply }
            | Command::Seek { reply, .. }
            | Command::Close { reply } => reply,
        };
        // The requester may have dropped its handle.
        let _ = reply.send(outcome);
    }
}

/// Pending completion of one request.
#[derive(Debug)]
pub struct Transition {
    rx: Receiver<Outcome>,
    /// Outcome if the worker is gone, for requests that succeed on a closed
    /// session.
    on_disconnect: Option<SessionState>,
}

impl Transition {
    fn resolved(outcome: Outcome) -> Self {
        let (tx, rx) = flume::bounded(1);
        let _ = tx.send(outcome);
        Self {
            rx,
            on_disconnect: None,
        }
    }

    fn convert(&self, received: std::result::Result<Outcome, ()>) -> Result<SessionState> {
        match received {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(e)) => Err(lifecycle(&e)),
            Err(()) => self
                .on_disconnect
                .ok_or_else(|| Error::Lifecycle("session worker has exited".to_string())),
        }
    }

    /// Block until the request completes.
    pub fn wait(self) -> Result<SessionState> {
        let received = self.rx.recv().map_err(|_| ());
        self.convert(received)
    }

    /// Block up to `timeout`; `None` if the request is still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<SessionState>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(self.convert(Ok(outcome))),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.convert(Err(()))),
        }
    }
}

fn lifecycle(e: &Error) -> Error {
    match e {
        Error::Lifecycle(msg) => Error::Lifecycle(msg.clone()),
        other => Error::Lifecycle(other.to_string()),
    }
}

#[derive(Debug)]
struct Cell {
    state: SessionState,
    error: Option<Arc<Error>>,
}

/// A lifecycle state machine with its own worker thread.
pub struct Session {
    cell: Arc<Mutex<Cell>>,
    commands: Sender<Command>,
    events: Receiver<SessionEvent>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Spawn a session worker owning `hooks`.
    pub fn new(hooks: impl SessionHooks, config: SessionConfig) -> Result<Self> {
        let cell = Arc::new(Mutex::new(Cell {
            state: SessionState::Unrealized,
            error: None,
        }));
        let (commands, command_rx) = flume::unbounded();
        let (event_tx, events) = flume::unbounded();
        let worker = Worker {
            hooks: Box::new(hooks),
            cell: cell.clone(),
            events: event_tx,
        };
        let handle = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                trace!("Session worker started.");
                worker.run(command_rx);
                trace!("Session worker finished.");
            })?;
        Ok(Self {
            cell,
            commands,
            events,
            worker: Some(handle),
        })
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.cell.lock().state
    }

    /// Error that closed the session, if any.
    pub fn error(&self) -> Option<Arc<Error>> {
        self.cell.lock().error.clone()
    }

    /// Notifications from the worker. Unread events queue up; none are dropped.
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    fn request(&self, make: impl FnOnce(Sender<Outcome>) -> Command, on_disconnect: Option<SessionState>) -> Transition {
        let (tx, rx) = flume::bounded(1);
        // A failed send drops the reply sender, which resolves the handle.
        let _ = self.commands.send(make(tx));
        Transition { rx, on_disconnect }
    }

    fn closed_error(&self) -> Arc<Error> {
        Arc::new(Error::Lifecycle("session is closed".to_string()))
    }

    fn goto(&self, target: SessionState) -> Transition {
        if self.state() == SessionState::Closed {
            return Transition::resolved(Err(self.closed_error()));
        }
        self.request(|reply| Command::Goto { target, reply }, None)
    }

    /// Request `Realized`.
    pub fn realize(&self) -> Transition {
        self.goto(SessionState::Realized)
    }

    /// Request `Prefetched`, realizing first if needed.
    pub fn prefetch(&self) -> Transition {
        self.goto(SessionState::Prefetched)
    }

    /// Request `Started`, realizing and prefetching first if needed.
    pub fn start(&self) -> Transition {
        self.goto(SessionState::Started)
    }

    /// Return from `Started` to `Prefetched`; a no-op in any other state.
    pub fn stop(&self) -> Transition {
        if self.state() == SessionState::Closed {
            return Transition::resolved(Ok(SessionState::Closed));
        }
        self.request(|reply| Command::Stop { reply }, Some(SessionState::Closed))
    }

    /// Reposition media. Requires a realized session.
    pub fn seek(&self, time: Rational) -> Transition {
        if self.state() == SessionState::Closed {
            return Transition::resolved(Err(self.closed_error()));
        }
        self.request(|reply| Command::Seek { time, reply }, None)
    }

    /// Release everything. Idempotent.
    pub fn close(&self) -> Transition {
        if self.state() == SessionState::Closed {
            return Transition::resolved(Ok(SessionState::Closed));
        }
        self.request(|reply| Command::Close { reply }, Some(SessionState::Closed))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let (reply, _) = flume::bounded(1);
            let _ = self.commands.send(Command::Close { reply });
            if worker.join().is_err() {
                error!("Session worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Realize,
    Prefetch,
    Start,
    Stop,
    Seek(Rational),
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hook::Realize => write!(f, "realize"),
            Hook::Prefetch => write!(f, "prefetch"),
            Hook::Start => write!(f, "start"),
            Hook::Stop => write!(f, "stop"),
            Hook::Seek(time) => write!(f, "seek to {time}"),
        }
    }
}

/// Run a hook, turning a panic into an error.
fn guarded<T>(call: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(Error::Lifecycle(format!("panicked: {}", panic_message(&*payload))))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

/// Publishes `Closed` if the worker loop unwinds before closing.
struct ExitGuard {
    cell: Arc<Mutex<Cell>>,
    events: Sender<SessionEvent>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut cell = self.cell.lock();
        if cell.state == SessionState::Closed {
            return;
        }
        let error = cell
            .error
            .get_or_insert_with(|| {
                Arc::new(Error::Lifecycle("session worker exited unexpectedly".to_string()))
            })
            .clone();
        let from = std::mem::replace(&mut cell.state, SessionState::Closed);
        drop(cell);
        error!(%from, "Session worker exited without closing");
        let _ = self.events.send(SessionEvent::Error(error));
        let _ = self.events.send(SessionEvent::StateChanged {
            from,
            to: SessionState::Closed,
        });
    }
}

struct Worker {
    hooks: Box<dyn SessionHooks>,
    cell: Arc<Mutex<Cell>>,
    events: Sender<SessionEvent>,
}

impl Worker {
    fn run(mut self, commands: Receiver<Command>) {
        let _guard = ExitGuard {
            cell: self.cell.clone(),
            events: self.events.clone(),
        };
        loop {
            let command = if self.state() == SessionState::Started {
                match commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            };

            match command {
                Some(command) => self.handle(command),
                None => self.step(),
            }

            if self.state() == SessionState::Closed {
                // Answer whatever was queued behind the close.
                for command in commands.try_iter() {
                    let outcome = match command {
                        Command::Stop { .. } | Command::Close { .. } => Ok(SessionState::Closed),
                        _ => Err(Arc::new(Error::Lifecycle("session is closed".to_string()))),
                    };
                    command.reply(outcome);
                }
                return;
            }
        }
        // Every handle is gone without an explicit close.
        self.close();
    }

    fn state(&self) -> SessionState {
        self.cell.lock().state
    }

    fn set_state(&self, to: SessionState) {
        let from = std::mem::replace(&mut self.cell.lock().state, to);
        if from != to {
            debug!(%from, %to, "Session state changed");
            self.emit(SessionEvent::StateChanged { from, to });
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session event receiver is gone");
        }
    }

    fn handle(&mut self, command: Command) {
        let outcome = match &command {
            Command::Goto { target, .. } => self.goto(*target),
            Command::Stop { .. } => self.stop(),
            Command::Seek { time, .. } => self.seek(*time),
            Command::Close { .. } => {
                self.close();
                Ok(SessionState::Closed)
            }
        };
        command.reply(outcome);
    }

    /// Run `hook`, passing through `via` and landing in `to`.
    fn run_hook(&mut self, hook: Hook, via: SessionState, to: SessionState) -> Outcome {
        self.set_state(via);
        let hooks = &mut self.hooks;
        let result = guarded(|| match hook {
            Hook::Realize => hooks.realize(),
            Hook::Prefetch => hooks.prefetch(),
            Hook::Start => hooks.start(),
            Hook::Stop => hooks.stop(),
            Hook::Seek(time) => hooks.seek(time),
        });
        match result {
            Ok(()) => {
                self.set_state(to);
                Ok(to)
            }
            Err(e) => Err(self.fail(&hook.to_string(), e)),
        }
    }

    fn goto(&mut self, target: SessionState) -> Outcome {
        loop {
            let state = self.state();
            if state.has_reached(target) {
                return Ok(state);
            }
            match state {
                SessionState::Unrealized => {
                    self.run_hook(Hook::Realize, SessionState::Realizing, SessionState::Realized)?
                }
                SessionState::Realized => {
                    self.run_hook(Hook::Prefetch, SessionState::Prefetching, SessionState::Prefetched)?
                }
                SessionState::Prefetched => {
                    self.run_hook(Hook::Start, SessionState::Prefetched, SessionState::Started)?
                }
                _ => return Err(Arc::new(Error::Lifecycle(format!("cannot leave {state}")))),
            };
        }
    }

    fn stop(&mut self) -> Outcome {
        match self.state() {
            SessionState::Started => {
                self.run_hook(Hook::Stop, SessionState::Started, SessionState::Prefetched)
            }
            state => Ok(state),
        }
    }

    fn seek(&mut self, time: Rational) -> Outcome {
        let state = self.state();
        if !state.has_reached(SessionState::Realized) {
            return Err(Arc::new(Error::Lifecycle(format!("cannot seek while {state}"))));
        }
        if state == SessionState::Started {
            self.run_hook(Hook::Stop, SessionState::Started, SessionState::Prefetched)?;
        }
        let here = self.state();
        self.run_hook(Hook::Seek(time), here, here)?;
        if state.has_reached(SessionState::Prefetched) {
            self.run_hook(Hook::Prefetch, SessionState::Prefetching, SessionState::Prefetched)?;
        }
        if state == SessionState::Started {
            self.run_hook(Hook::Start, SessionState::Prefetched, SessionState::Started)?;
        }
        self.emit(SessionEvent::SeekCompleted { time });
        Ok(state)
    }

    fn step(&mut self) {
        let hooks = &mut self.hooks;
        match guarded(|| hooks.step()) {
            Ok(StepOutcome::Continue) => {}
            Ok(StepOutcome::Finished) => {
                debug!("Session reached end of media");
                self.emit(SessionEvent::EndOfMedia);
                let _ = self.run_hook(Hook::Stop, SessionState::Started, SessionState::Prefetched);
            }
            Err(e) => {
                self.fail("step", e);
            }
        }
    }

    /// Close after a hook failure and report the error.
    fn fail(&mut self, hook: &str, e: Error) -> Arc<Error> {
        let error = Arc::new(Error::Lifecycle(format!("{hook} failed: {e}")));
        error!(hook, error = %e, "Session hook failed");
        self.cell.lock().error = Some(error.clone());
        self.emit(SessionEvent::Error(error.clone()));
        self.close_hooks();
        self.set_state(SessionState::Closed);
        error
    }

    fn close_hooks(&mut self) {
        let hooks = &mut self.hooks;
        if let Err(e) = guarded(|| {
            hooks.close();
            Ok(())
        }) {
            error!(error = %e, "Session close hook failed");
        }
    }

    fn close(&mut self) {
        if self.state() == SessionState::Closed {
            return;
        }
        if self.state() == SessionState::Started {
            let hooks = &mut self.hooks;
            if let Err(e) = guarded(|| hooks.stop()) {
                warn!(error = %e, "Stop before close failed");
            }
        }
        self.close_hooks();
        self.set_state(SessionState::Closed);
    }
}
