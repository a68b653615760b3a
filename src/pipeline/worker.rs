//! Lifecycle pipeline dan worker thread

use std::panic;
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

/// `NotStarted -> Running -> Draining -> Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotStarted,
    Running,
    /// Sentinel sudah lewat, worker menyelesaikan sisa pekerjaan
    Draining,
    Done,
}

/// Cara worker berhenti
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    /// Pasangan queue di-drop sebelum stream selesai
    Abandoned,
}

/// Background worker untuk satu instance pipeline.
pub(crate) struct Worker {
    name: &'static str,
    handle: Option<JoinHandle<Outcome>>,
}

impl Worker {
    pub fn spawn<F>(name: &'static str, body: F) -> Self
    where
        F: FnOnce() -> Outcome + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .unwrap_or_else(|e| panic!("failed to spawn {name} worker: {e}"));
        debug!(worker = name, "worker started");
        Self {
            name,
            handle: Some(handle),
        }
    }

    /// Block sampai worker selesai.
    ///
    /// Panic di worker (misal parse gagal) diteruskan ke thread pemanggil,
    /// kecuali pemanggil sendiri sedang unwinding.
    pub fn join(&mut self) -> Option<Outcome> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(outcome) => {
                debug!(worker = self.name, ?outcome, "worker finished");
                Some(outcome)
            }
            Err(payload) => {
                if thread::panicking() {
                    error!(worker = self.name, "worker panicked while caller was unwinding");
                    None
                } else {
                    panic::resume_unwind(payload)
                }
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.join();
    }
}
