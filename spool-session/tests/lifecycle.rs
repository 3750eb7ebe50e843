//! Session lifecycle tests with recording hooks.

use parking_lot::Mutex;
use spool_core::{Error, Rational, Result};
use spool_session::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<&'static str>>>);

impl Log {
    fn push(&self, entry: &'static str) {
        self.0.lock().push(entry);
    }

    fn entries(&self) -> Vec<&'static str> {
        self.0.lock().clone()
    }
}

#[derive(Default)]
struct Recorder {
    log: Log,
    fail_on: Option<&'static str>,
    panic_on: Option<&'static str>,
    realize_delay: Option<Duration>,
}

impl Recorder {
    fn hook(&self, name: &'static str) -> Result<()> {
        self.log.push(name);
        if self.panic_on == Some(name) {
            panic!("{name} exploded");
        }
        if self.fail_on == Some(name) {
            return Err(Error::invalid_param(format!("{name} refused")));
        }
        Ok(())
    }
}

impl SessionHooks for Recorder {
    fn realize(&mut self) -> Result<()> {
        if let Some(delay) = self.realize_delay {
            std::thread::sleep(delay);
        }
        self.hook("realize")
    }

    fn prefetch(&mut self) -> Result<()> {
        self.hook("prefetch")
    }

    fn start(&mut self) -> Result<()> {
        self.hook("start")
    }

    fn stop(&mut self) -> Result<()> {
        self.hook("stop")
    }

    fn seek(&mut self, _time: Rational) -> Result<()> {
        self.hook("seek")
    }

    fn step(&mut self) -> Result<StepOutcome> {
        std::thread::sleep(Duration::from_millis(1));
        if self.panic_on == Some("step") {
            panic!("step exploded");
        }
        Ok(StepOutcome::Continue)
    }

    fn close(&mut self) {
        self.log.push("close");
    }
}

fn session(recorder: Recorder) -> Session {
    Session::new(recorder, SessionConfig::default()).unwrap()
}

fn state_changes(session: &Session) -> Vec<(SessionState, SessionState)> {
    session
        .events()
        .try_iter()
        .filter_map(|event| match event {
            SessionEvent::StateChanged { from, to } => Some((from, to)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_start_walks_every_state() {
    let recorder = Recorder::default();
    let log = recorder.log.clone();
    let session = session(recorder);

    assert_eq!(session.start().wait().unwrap(), SessionState::Started);
    assert_eq!(log.entries(), ["realize", "prefetch", "start"]);

    use SessionState::*;
    assert_eq!(
        state_changes(&session),
        [
            (Unrealized, Realizing),
            (Realizing, Realized),
            (Realized, Prefetching),
            (Prefetching, Prefetched),
            (Prefetched, Started),
        ]
    );
}

#[test]
fn test_hook_failure_closes_session() {
    let recorder = Recorder {
        fail_on: Some("prefetch"),
        ..Recorder::default()
    };
    let log = recorder.log.clone();
    let session = session(recorder);

    let err = session.start().wait().unwrap_err();
    assert!(matches!(&err, Error::Lifecycle(msg) if msg.contains("prefetch refused")));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.error().is_some());
    assert_eq!(log.entries(), ["realize", "prefetch", "close"]);

    let events: Vec<_> = session.events().try_iter().collect();
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Error(_))));
    assert!(matches!(
        events.last(),
        Some(SessionEvent::StateChanged { to: SessionState::Closed, .. })
    ));

    assert!(session.realize().wait().is_err());
    assert_eq!(session.close().wait().unwrap(), SessionState::Closed);
    assert_eq!(log.entries().iter().filter(|e| **e == "close").count(), 1);
}

#[test]
fn test_stop_is_idempotent() {
    let recorder = Recorder::default();
    let log = recorder.log.clone();
    let session = session(recorder);

    assert_eq!(session.stop().wait().unwrap(), SessionState::Unrealized);
    session.start().wait().unwrap();
    assert_eq!(session.stop().wait().unwrap(), SessionState::Prefetched);
    assert_eq!(session.stop().wait().unwrap(), SessionState::Prefetched);
    assert_eq!(log.entries().iter().filter(|e| **e == "stop").count(), 1);
}

#[test]
fn test_seek_while_started_restarts() {
    let recorder = Recorder::default();
    let log = recorder.log.clone();
    let session = session(recorder);
    session.start().wait().unwrap();

    let time = Rational::new(3, 2);
    assert_eq!(session.seek(time).wait().unwrap(), SessionState::Started);
    assert_eq!(
        log.entries(),
        ["realize", "prefetch", "start", "stop", "seek", "prefetch", "start"]
    );
    assert_eq!(session.state(), SessionState::Started);
    assert!(session
        .events()
        .try_iter()
        .any(|e| matches!(e, SessionEvent::SeekCompleted { time: t } if t == time)));
}

#[test]
fn test_seek_before_realize_is_rejected() {
    let session = session(Recorder::default());
    assert!(session.seek(Rational::zero()).wait().is_err());
    assert_eq!(session.state(), SessionState::Unrealized);
    assert!(session.error().is_none());
}

#[test]
fn test_close_waits_for_running_hook() {
    let recorder = Recorder {
        realize_delay: Some(Duration::from_millis(100)),
        ..Recorder::default()
    };
    let log = recorder.log.clone();
    let session = session(recorder);

    let realize = session.realize();
    let close = session.close();
    assert_eq!(close.wait().unwrap(), SessionState::Closed);
    assert_eq!(realize.wait().unwrap(), SessionState::Realized);
    assert_eq!(log.entries(), ["realize", "close"]);
}

#[test]
fn test_pending_transition_times_out() {
    let recorder = Recorder {
        realize_delay: Some(Duration::from_millis(300)),
        ..Recorder::default()
    };
    let session = session(recorder);
    let realize = session.realize();
    assert!(realize.wait_timeout(Duration::from_millis(1)).is_none());
    let done = realize.wait_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(done.unwrap(), SessionState::Realized);
}

#[test]
fn test_drop_closes_hooks() {
    let recorder = Recorder::default();
    let log = recorder.log.clone();
    let session = session(recorder);
    session.start().wait().unwrap();
    drop(session);
    assert_eq!(log.entries().last(), Some(&"close"));
    assert!(log.entries().contains(&"stop"));
}

#[test]
fn test_panicking_hook_closes_session() {
    let recorder = Recorder {
        panic_on: Some("realize"),
        ..Recorder::default()
    };
    let log = recorder.log.clone();
    let session = session(recorder);

    let err = session.start().wait().unwrap_err();
    assert!(matches!(&err, Error::Lifecycle(msg) if msg.contains("realize exploded")));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.error().is_some());
    assert_eq!(log.entries(), ["realize", "close"]);

    let events: Vec<_> = session.events().try_iter().collect();
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Error(_))));
    assert!(matches!(
        events.last(),
        Some(SessionEvent::StateChanged { to: SessionState::Closed, .. })
    ));
    assert_eq!(session.close().wait().unwrap(), SessionState::Closed);
}

#[test]
fn test_panicking_step_closes_session() {
    let recorder = Recorder {
        panic_on: Some("step"),
        ..Recorder::default()
    };
    let log = recorder.log.clone();
    let session = session(recorder);

    session.start().wait().unwrap();
    let error = loop {
        match session.events().recv_timeout(Duration::from_secs(5)).unwrap() {
            SessionEvent::Error(e) => break e,
            _ => {}
        }
    };
    assert!(error.to_string().contains("step exploded"));
    assert_eq!(session.close().wait().unwrap(), SessionState::Closed);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(log.entries().last(), Some(&"close"));
}
