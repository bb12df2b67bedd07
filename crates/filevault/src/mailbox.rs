//! Per-instance call serialisation.
//!
//! Each component owns one [`Mailbox`]. Calls on the same component queue on
//! a FIFO-fair async mutex and run one at a time in submission order; calls on
//! different components never wait on each other. The blocking OS work of a
//! call runs on tokio's blocking pool so the async executor keeps serving
//! other requests.
//!
//! Cancellation: dropping a call while it waits for its turn has no effect.
//! Once its job is handed to the blocking pool it runs to completion, and the
//! turn is held by the job itself until it returns, so a cancelled caller
//! cannot let the next call overlap a still-running syscall.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::FsResult;

/// FIFO call queue for one component instance.
#[derive(Debug)]
pub struct Mailbox {
    name: &'static str,
    turn: Arc<Mutex<()>>,
}

impl Mailbox {
    /// Create a mailbox; `name` identifies the owning component in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            turn: Arc::new(Mutex::new(())),
        }
    }

    /// Name of the owning component.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for this instance's turn and keep it until the guard is dropped.
    ///
    /// Used by operations made of several awaited steps.
    pub async fn turn(&self) -> OwnedMutexGuard<()> {
        let turn = Arc::clone(&self.turn).lock_owned().await;
        tracing::trace!(component = self.name, "mailbox turn acquired");
        turn
    }

    /// Wait for this instance's turn, then run `job` on the blocking pool.
    pub async fn run<T, F>(&self, job: F) -> FsResult<T>
    where
        F: FnOnce() -> FsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let turn = self.turn().await;

        tokio::task::spawn_blocking(move || {
            let _turn = turn;
            job()
        })
        .await?
    }
}
