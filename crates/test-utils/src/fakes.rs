use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use devloop::errors::{DevloopError, Result};
use devloop::exec::ProcessControl;
use devloop::watch::ChangeSource;

/// A change source that replays scripted answers, then reports nothing.
#[derive(Default)]
pub struct ScriptedChanges {
    script: Mutex<VecDeque<Result<Vec<String>>>>,
    calls: AtomicUsize,
}

impl ScriptedChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_changes(&self, paths: &[&str]) -> &Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(paths.iter().map(|p| p.to_string()).collect()));
        self
    }

    pub fn push_error(&self, err: DevloopError) -> &Self {
        self.script.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChangeSource for ScriptedChanges {
    fn changes(&self) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// A process control that:
/// - counts `exec` / `stop` calls
/// - fails the builds it was told to fail, in order
#[derive(Default)]
pub struct FakeSupervisor {
    execs: AtomicUsize,
    stops: AtomicUsize,
    failures: Mutex<VecDeque<bool>>,
}

impl FakeSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of upcoming `exec` calls (`true` = build fails).
    pub fn script_failures(&self, outcomes: &[bool]) {
        self.failures.lock().unwrap().extend(outcomes.iter().copied());
    }

    pub fn execs(&self) -> usize {
        self.execs.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl ProcessControl for FakeSupervisor {
    fn exec(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.execs.fetch_add(1, Ordering::SeqCst);
            let fail = self.failures.lock().unwrap().pop_front().unwrap_or(false);
            if fail {
                Err(DevloopError::BuildFailure {
                    command: "fake build".to_string(),
                    status: "exit status: 1".to_string(),
                })
            } else {
                Ok(())
            }
        })
    }

    fn stop(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
