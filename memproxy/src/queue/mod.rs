/*!
Deferred work destined for the remote peer.

Host threads push jobs, the worker is the only consumer. Jobs are handed out in
strict insertion order, duplicates are neither merged nor dropped.
*/

use crate::types::Address;

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A single unit of work for the remote peer.
///
/// The target pid is captured when the job is created, a later change of the
/// attached target does not affect already queued jobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub pid: u32,
    pub kind: JobKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobKind {
    Read { address: Address, size: usize },
    Write { address: Address, data: Vec<u8> },
    OpenProcess,
    CloseProcess,
}

impl Job {
    pub fn new(pid: u32, kind: JobKind) -> Self {
        Self { pid, kind }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            JobKind::Read { .. } => "read",
            JobKind::Write { .. } => "write",
            JobKind::OpenProcess => "open_process",
            JobKind::CloseProcess => "close_process",
        }
    }
}

/// FIFO queue shared between many producers and a single consumer.
///
/// A consumer only starts waiting after it checked the queue under the same lock
/// producers push with, so a job pushed before the wait begins is never missed.
#[derive(Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
    available: Condvar,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a job and wakes up the consumer.
    pub fn push(&self, job: Job) {
        self.jobs.lock().push_back(job);
        self.available.notify_one();
    }

    /// Puts a job taken out of the queue back in front of all others.
    pub fn requeue(&self, job: Job) {
        self.jobs.lock().push_front(job);
        self.available.notify_one();
    }

    /// Removes the oldest job without waiting.
    pub fn try_pop(&self) -> Option<Job> {
        self.jobs.lock().pop_front()
    }

    /// Removes the oldest job, waiting up to `timeout` for one to arrive.
    ///
    /// Spurious wake ups are reported as `None`, callers are expected to poll.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Job> {
        let mut jobs = self.jobs.lock();
        if jobs.is_empty() {
            self.available.wait_for(&mut jobs, timeout);
        }
        jobs.pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Removes and returns all queued jobs in order.
    pub fn drain(&self) -> Vec<Job> {
        self.jobs.lock().drain(..).collect()
    }
}
