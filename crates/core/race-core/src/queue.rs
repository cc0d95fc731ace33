//! Deferred thread resumes
//!
//! Resuming a thread from inside the handler of the very halt that stopped it
//! is not allowed by the debug layer, so handlers only enqueue here and the
//! notification loop drains after the handler has returned.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::control::DebugControl;
use crate::error::RaceResult;
use crate::types::ThreadId;

/// FIFO of pending "resume thread N" actions
#[derive(Debug, Default)]
pub struct DeferredResumeQueue {
    pending: VecDeque<ThreadId>,
}

impl DeferredResumeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, thread: ThreadId) {
        self.pending.push_back(thread);
    }

    /// Issue every queued resume in FIFO order
    ///
    /// Every entry is consumed, even when its resume fails, so one dead
    /// thread cannot hold back the ones queued after it. Returns how many
    /// resumes succeeded, or the first failure once the queue is empty.
    pub fn drain(&mut self, control: &mut dyn DebugControl) -> RaceResult<usize> {
        let mut issued = 0;
        let mut first_error = None;
        while let Some(thread) = self.pending.pop_front() {
            match control.resume_thread(thread) {
                Ok(()) => {
                    debug!(thread = %thread, "resumed");
                    issued += 1;
                }
                Err(e) => {
                    warn!(thread = %thread, error = %e, "resume failed, dropping entry");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(issued),
        }
    }

    /// Drop pending resumes without issuing them
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.pending.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
