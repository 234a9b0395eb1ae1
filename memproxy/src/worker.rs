/*!
Background worker draining the job queue.

The worker is the only place where the remote peer is contacted. It takes one job at a
time, sends it with the timeout configured for its kind and, for reads, merges the
returned bytes into the page cache. Remote failures are logged and the job is dropped,
the host already got its answer when the job was queued.
*/

use crate::config::JobTimeouts;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::iter::PageChunks;
use crate::mem::{CacheValidator, DefaultCacheValidator, PageCache};
use crate::queue::{Job, JobKind, JobQueue};
use crate::remote::{decode_read_response, Command, RemoteChannel};
use crate::types::Address;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, trace, warn};
use parking_lot::Mutex;

struct WorkerContext<Q> {
    cache: Arc<PageCache<Q>>,
    queue: Arc<JobQueue>,
    channel: Arc<dyn RemoteChannel>,
    timeouts: JobTimeouts,
    idle_interval: Duration,
    running: AtomicBool,
}

/// Handle to the single worker thread of a proxy.
///
/// The worker can be started and stopped any number of times, but at most one
/// thread is alive at any point.
pub struct Worker<Q: 'static = DefaultCacheValidator> {
    context: Arc<WorkerContext<Q>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<Q: 'static> Worker<Q> {
    /// Signals the worker thread to stop and waits for it to exit.
    ///
    /// A remote call in flight is not interrupted, this blocks for at most the
    /// longest job timeout. Jobs still queued stay queued.
    pub fn stop(&self) -> Result<()> {
        let mut handle = self.handle.lock();

        if self
            .context
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error(ErrorOrigin::Worker, ErrorKind::NotRunning));
        }

        if let Some(thread) = handle.take() {
            if thread.join().is_err() {
                Error(ErrorOrigin::Worker, ErrorKind::Unknown).log_error("worker thread panicked");
            }
        }

        info!(
            "worker stopped, {} job(s) left in queue",
            self.context.queue.len()
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.context.running.load(Ordering::Acquire)
    }
}

impl<Q: CacheValidator + 'static> Worker<Q> {
    pub fn new(
        cache: Arc<PageCache<Q>>,
        queue: Arc<JobQueue>,
        channel: Arc<dyn RemoteChannel>,
        timeouts: JobTimeouts,
        idle_interval: Duration,
    ) -> Self {
        Self {
            context: Arc::new(WorkerContext {
                cache,
                queue,
                channel,
                timeouts,
                idle_interval,
                running: AtomicBool::new(false),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawns the worker thread.
    ///
    /// Fails with `AlreadyRunning` if the thread is already alive.
    pub fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock();

        if self
            .context
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error(ErrorOrigin::Worker, ErrorKind::AlreadyRunning));
        }

        let context = self.context.clone();
        let thread = thread::Builder::new()
            .name("memproxy-worker".to_string())
            .spawn(move || context.run())
            .map_err(|err| {
                self.context.running.store(false, Ordering::Release);
                Error(ErrorOrigin::Worker, ErrorKind::Unknown).log_error(err)
            })?;

        *handle = Some(thread);
        info!("worker started");
        Ok(())
    }

    /// Processes all queued jobs on the calling thread.
    #[cfg(test)]
    pub(crate) fn process_pending(&self) -> usize {
        let mut count = 0;
        while let Some(job) = self.context.queue.try_pop() {
            self.context.process(job);
            count += 1;
        }
        count
    }
}

impl<Q: 'static> Drop for Worker<Q> {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop().ok();
        }
    }
}

impl<Q: CacheValidator> WorkerContext<Q> {
    fn run(&self) {
        debug!("worker thread entered");

        while self.running.load(Ordering::Acquire) {
            let job = match self.queue.pop_timeout(self.idle_interval) {
                Some(job) => job,
                None => continue,
            };

            // shutdown began while waiting, leave the job for the next start
            if !self.running.load(Ordering::Acquire) {
                self.queue.requeue(job);
                break;
            }

            self.process(job);
        }

        debug!("worker thread left");
    }

    fn process(&self, job: Job) {
        let command = match Command::from(&job).encode() {
            Ok(command) => command,
            Err(_) => return,
        };

        let timeout = self.timeouts.for_job(&job.kind);
        trace!("sending {} job for pid {}: {}", job.name(), job.pid, command);

        let response = self.channel.send(&command, timeout);

        match job.kind {
            JobKind::Read { address, size } => {
                let response = match response {
                    Some(response) => response,
                    None => {
                        Error(ErrorOrigin::RemoteChannel, ErrorKind::NoResponse).log_warn(
                            format!(
                                "read of {:#x} bytes at {:x} for pid {} dropped",
                                size, address, job.pid
                            ),
                        );
                        return;
                    }
                };

                match decode_read_response(&response, size) {
                    Ok(bytes) => {
                        let pages = fill_pages(&self.cache, address, &bytes);
                        trace!(
                            "read of {:#x} bytes at {:x} filled {} page(s)",
                            bytes.len(),
                            address,
                            pages
                        );
                    }
                    Err(err) => {
                        err.log_warn(format!(
                            "read response for {:x} dropped: {}",
                            address, response
                        ));
                    }
                }
            }
            _ => {
                if response.is_none() {
                    warn!("{} job for pid {} got no response", job.name(), job.pid);
                }
            }
        }
    }
}

/// Splits `bytes` fetched from `address` at page boundaries and merges every
/// piece into its page. Returns the number of pages filled.
pub(crate) fn fill_pages<Q: CacheValidator>(
    cache: &PageCache<Q>,
    address: Address,
    bytes: &[u8],
) -> usize {
    let page_size = cache.page_size();

    bytes
        .page_chunks(address, page_size)
        .filter(|(addr, chunk)| {
            let page_base = addr.as_page_aligned(page_size);
            let offset = addr.page_offset(page_size);

            match cache.merge_fill(page_base, offset, chunk) {
                Ok(_) => true,
                Err(err) => {
                    err.log_error(format!(
                        "chunk of {:#x} bytes at {:x} not merged",
                        chunk.len(),
                        addr
                    ));
                    false
                }
            }
        })
        .count()
}
