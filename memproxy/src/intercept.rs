/*!
Synchronous entry points called by the host.

None of the functions in this module talk to the remote peer. Reads are answered from
the page cache (zeroes for anything not cached yet) and the remote round trip is
deferred to the worker by queueing a job. Handles given to the host are placeholders
carrying the process or thread id.
*/

use crate::config::WritePolicy;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::iter::PageChunks;
use crate::mem::{CacheValidator, DefaultCacheValidator, PageCache};
use crate::queue::{Job, JobKind, JobQueue};
use crate::types::{AccessIntent, Address, ProbeMasks, TargetHandle};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, info, trace};

/// The host facing side of a proxy.
///
/// Cloning is cheap, all clones share the same cache, queue and target.
pub struct InterceptLayer<Q = DefaultCacheValidator> {
    cache: Arc<PageCache<Q>>,
    queue: Arc<JobQueue>,
    target: Arc<AtomicU32>,
    probe_masks: Arc<ProbeMasks>,
    write_policy: WritePolicy,
}

impl<Q> Clone for InterceptLayer<Q> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            queue: self.queue.clone(),
            target: self.target.clone(),
            probe_masks: self.probe_masks.clone(),
            write_policy: self.write_policy,
        }
    }
}

impl<Q: CacheValidator> InterceptLayer<Q> {
    pub fn new(
        cache: Arc<PageCache<Q>>,
        queue: Arc<JobQueue>,
        probe_masks: ProbeMasks,
        write_policy: WritePolicy,
    ) -> Self {
        Self {
            cache,
            queue,
            target: Arc::new(AtomicU32::new(0)),
            probe_masks: Arc::new(probe_masks),
            write_policy,
        }
    }

    /// Returns the pid of the attached process.
    pub fn target(&self) -> Option<u32> {
        match self.target.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Sets the attached process, 0 detaches.
    ///
    /// Hosts that attach without going through [`open_process`](Self::open_process)
    /// report the pid here.
    pub fn set_target(&self, pid: u32) {
        let previous = self.target.swap(pid, Ordering::AcqRel);
        if previous != pid {
            info!("target changed from {} to {}", previous, pid);
        }
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    fn check_range(address: Address, len: usize) -> Result<()> {
        if address.is_null() || len == 0 {
            return Err(Error(ErrorOrigin::Intercept, ErrorKind::ArgValidation));
        }

        if address.checked_add(len as u64).is_none() {
            return Err(Error(ErrorOrigin::Intercept, ErrorKind::OutOfBounds));
        }

        Ok(())
    }

    fn attached(&self) -> Result<u32> {
        self.target()
            .ok_or(Error(ErrorOrigin::Intercept, ErrorKind::NoTarget))
    }

    /// Fills `out` with the foreign memory at `address`.
    ///
    /// Bytes which are not cached read as zero. If any part of the range is missing or
    /// expired a single read job for the whole range is queued. Returns the number of
    /// bytes written to `out`, which is always its full length.
    ///
    /// Only invalid arguments or a missing target are reported as errors.
    pub fn read(&self, address: Address, out: &mut [u8]) -> Result<usize> {
        Self::check_range(address, out.len())?;
        let pid = self.attached()?;

        let now = self.cache.now();
        let page_size = self.cache.page_size();
        let size = out.len();

        let mut refresh = false;
        for (addr, chunk) in (&mut *out).page_chunks(address, page_size) {
            refresh |= self.cache.read_chunk(addr, chunk, now).needs_refresh();
        }

        if refresh {
            trace!("refreshing {:#x} bytes at {:x}", size, address);
            self.queue
                .push(Job::new(pid, JobKind::Read { address, size }));
        }

        Ok(size)
    }

    /// Queues a write of `data` to `address` and returns immediately.
    ///
    /// The write is not confirmed, the cache is updated according to the write policy.
    pub fn write(&self, address: Address, data: &[u8]) -> Result<usize> {
        Self::check_range(address, data.len())?;
        let pid = self.attached()?;

        self.queue.push(Job::new(
            pid,
            JobKind::Write {
                address,
                data: data.to_vec(),
            },
        ));

        match self.write_policy {
            WritePolicy::Forward => {}
            WritePolicy::Invalidate => {
                self.cache.invalidate(address, data.len());
            }
            WritePolicy::WriteBack => {
                self.cache.write_back(address, data);
            }
        }

        Ok(data.len())
    }

    /// Hands out a placeholder handle for the process `pid`.
    ///
    /// Probe requests (see [`ProbeMasks`]) only get the handle. Every other request
    /// attaches to the process: it becomes the target and an open job is queued.
    pub fn open_process(&self, access: u32, pid: u32) -> Result<TargetHandle> {
        if pid == 0 {
            return Err(Error(ErrorOrigin::Intercept, ErrorKind::ArgValidation));
        }

        match self.probe_masks.classify(access) {
            AccessIntent::Probe => {
                trace!("probe of pid {} with access {:#010x}", pid, access);
            }
            AccessIntent::Attach => {
                debug!("attaching to pid {} with access {:#010x}", pid, access);
                self.set_target(pid);
                self.queue.push(Job::new(pid, JobKind::OpenProcess));
            }
        }

        Ok(TargetHandle::new(pid))
    }

    /// Hands out a placeholder handle for the thread `tid`, nothing is queued.
    pub fn open_thread(&self, access: u32, tid: u32) -> Result<TargetHandle> {
        if tid == 0 {
            return Err(Error(ErrorOrigin::Intercept, ErrorKind::ArgValidation));
        }

        trace!("open of thread {} with access {:#010x}", tid, access);
        Ok(TargetHandle::new(tid))
    }

    /// Queues a close job for `handle`.
    ///
    /// Closing the handle of the current target detaches from it.
    pub fn close_process(&self, handle: TargetHandle) {
        let pid = if handle.is_null() {
            self.target.load(Ordering::Acquire)
        } else {
            handle.id()
        };

        if pid != 0
            && self
                .target
                .compare_exchange(pid, 0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            info!("detached from pid {}", pid);
        }

        self.queue.push(Job::new(pid, JobKind::CloseProcess));
    }

    pub fn cache(&self) -> &PageCache<Q> {
        &self.cache
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }
}
