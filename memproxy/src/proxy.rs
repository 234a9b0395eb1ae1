/*!
The proxy ties the page cache, the job queue and the worker together.

A [`Proxy`] owns all state of a single remote connection. Hosts call into its
[`InterceptLayer`] and toggle the worker with [`enable`](Proxy::enable) and
[`disable`](Proxy::disable).

# Examples

```
use std::time::Duration;
use memproxy::prelude::v1::*;

// a peer that never answers
struct Offline;

impl RemoteChannel for Offline {
    fn send(&self, _command: &str, _timeout: Duration) -> Option<String> {
        None
    }
}

let proxy = Proxy::builder(Offline)
    .freshness(Duration::from_millis(100))
    .build()
    .unwrap();

assert!(proxy.enable());

let intercept = proxy.intercept();
intercept.open_process(ProcessAccess::ALL_ACCESS.bits(), 1234).unwrap();

// nothing is cached yet, the read is answered with zeroes
let mut buf = [0xffu8; 16];
intercept.read(Address::from(0x2000), &mut buf).unwrap();
assert_eq!(buf, [0u8; 16]);

assert!(proxy.disable());
```
*/

use crate::config::{JobTimeouts, ProxyArgs, ProxyConfig, WritePolicy};
use crate::error::Result;
use crate::intercept::InterceptLayer;
use crate::mem::{CacheValidator, DefaultCacheValidator, PageCache, TimedCacheValidator};
use crate::queue::JobQueue;
use crate::remote::RemoteChannel;
use crate::types::ProbeMasks;
use crate::worker::Worker;

use std::sync::Arc;
use std::time::Duration;

use log::info;

/// A paged proxy of the memory of a process owned by a remote peer.
///
/// Dropping the proxy stops its worker.
pub struct Proxy<Q: 'static = DefaultCacheValidator> {
    config: ProxyConfig,
    cache: Arc<PageCache<Q>>,
    queue: Arc<JobQueue>,
    intercept: InterceptLayer<Q>,
    worker: Worker<Q>,
}

impl Proxy<DefaultCacheValidator> {
    /// Returns a new builder for a proxy talking to `channel`.
    pub fn builder<C: RemoteChannel + 'static>(channel: C) -> ProxyBuilder<DefaultCacheValidator> {
        ProxyBuilder::new(channel)
    }

    /// Creates a proxy with the given configuration.
    pub fn with_config<C: RemoteChannel + 'static>(channel: C, config: ProxyConfig) -> Result<Self> {
        Self::builder(channel).config(config).build()
    }
}

impl<Q: CacheValidator + 'static> Proxy<Q> {
    /// Starts the worker. Returns false if it was already running.
    pub fn enable(&self) -> bool {
        self.worker.start().is_ok()
    }

    /// Stops the worker and waits for it to exit. Returns false if it was not running.
    pub fn disable(&self) -> bool {
        self.worker.stop().is_ok()
    }

    pub fn is_enabled(&self) -> bool {
        self.worker.is_running()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn cache(&self) -> &PageCache<Q> {
        &self.cache
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Returns the host facing entry points.
    ///
    /// The layer can be cloned and shared across host threads.
    pub fn intercept(&self) -> &InterceptLayer<Q> {
        &self.intercept
    }

    #[cfg(test)]
    pub(crate) fn worker(&self) -> &Worker<Q> {
        &self.worker
    }
}

/// The builder interface for constructing a `Proxy` object.
pub struct ProxyBuilder<Q> {
    channel: Arc<dyn RemoteChannel>,
    config: ProxyConfig,
    validator: Q,
}

impl ProxyBuilder<DefaultCacheValidator> {
    /// Creates a new `Proxy` builder with the default configuration.
    pub fn new<C: RemoteChannel + 'static>(channel: C) -> Self {
        let config = ProxyConfig::default();
        Self {
            channel: Arc::new(channel),
            validator: TimedCacheValidator::new(config.freshness.into()),
            config,
        }
    }

    /// Replaces the whole configuration.
    ///
    /// Has to be called before a custom validator is set.
    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.validator = TimedCacheValidator::new(config.freshness.into());
        self.config = config;
        self
    }

    /// Replaces the configuration with one parsed from `args`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use memproxy::prelude::v1::*;
    ///
    /// # struct Offline;
    /// # impl RemoteChannel for Offline {
    /// #     fn send(&self, _: &str, _: Duration) -> Option<String> { None }
    /// # }
    /// let args = ProxyArgs::parse("freshness_ms=50,write_policy=invalidate").unwrap();
    /// let proxy = Proxy::builder(Offline)
    ///     .args(&args)
    ///     .unwrap()
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(proxy.config().write_policy, WritePolicy::Invalidate);
    /// ```
    pub fn args(self, args: &ProxyArgs) -> Result<Self> {
        Ok(self.config(ProxyConfig::from_args(args)?))
    }

    /// Changes how long a cached page stays fresh.
    ///
    /// The default setting is 16 milliseconds.
    pub fn freshness(mut self, freshness: Duration) -> Self {
        self.config.freshness = freshness;
        self.validator = TimedCacheValidator::new(freshness.into());
        self
    }
}

impl<Q: CacheValidator + 'static> ProxyBuilder<Q> {
    /// Builds the `Proxy` object or returns an error if the configuration is invalid.
    pub fn build(self) -> Result<Proxy<Q>> {
        self.config.validate()?;

        let cache = Arc::new(PageCache::with_page_size(
            self.config.page_size,
            self.validator,
        )?);
        let queue = Arc::new(JobQueue::new());

        let intercept = InterceptLayer::new(
            cache.clone(),
            queue.clone(),
            self.config.probe_masks.clone(),
            self.config.write_policy,
        );

        let worker = Worker::new(
            cache.clone(),
            queue.clone(),
            self.channel,
            self.config.timeouts,
            self.config.idle_interval,
        );

        info!(
            "proxy created: page size {:#x}, write policy {:?}",
            self.config.page_size, self.config.write_policy
        );

        Ok(Proxy {
            config: self.config,
            cache,
            queue,
            intercept,
            worker,
        })
    }

    /// Sets a custom validator for the cache.
    ///
    /// The freshness setting of the builder does not apply to custom validators.
    pub fn validator<QN: CacheValidator>(self, validator: QN) -> ProxyBuilder<QN> {
        ProxyBuilder {
            channel: self.channel,
            config: self.config,
            validator,
        }
    }

    /// Changes the page size of the cache, it has to be a power of two.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    pub fn timeouts(mut self, timeouts: JobTimeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    /// Changes how long the idle worker waits for new jobs before checking for shutdown.
    pub fn idle_interval(mut self, idle_interval: Duration) -> Self {
        self.config.idle_interval = idle_interval;
        self
    }

    pub fn write_policy(mut self, write_policy: WritePolicy) -> Self {
        self.config.write_policy = write_policy;
        self
    }

    pub fn probe_masks(mut self, probe_masks: ProbeMasks) -> Self {
        self.config.probe_masks = probe_masks;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{DummyChannel, DummyValidator};
    use crate::error::{Error, ErrorKind, ErrorOrigin};
    use crate::mem::ValidRange;
    use crate::queue::{Job, JobKind};
    use crate::remote::Command;
    use crate::types::{Address, ProcessAccess};

    use std::thread;
    use std::time::Instant;

    const PID: u32 = 1234;

    /// Replies to every command with the same canned response.
    struct FixedChannel(&'static str);

    impl RemoteChannel for FixedChannel {
        fn send(&self, _command: &str, _timeout: Duration) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn invalid_page_size() {
        let proxy = Proxy::builder(DummyChannel::new(0x1000))
            .page_size(0x1234)
            .build();
        assert_eq!(
            proxy.err(),
            Some(Error(ErrorOrigin::Args, ErrorKind::Configuration))
        );
    }

    #[test]
    fn enable_disable() {
        let proxy = Proxy::builder(DummyChannel::new(0x1000)).build().unwrap();

        assert!(!proxy.is_enabled());
        assert!(!proxy.disable());
        assert!(proxy.enable());
        assert!(!proxy.enable());
        assert!(proxy.is_enabled());
        assert!(proxy.disable());
        assert!(!proxy.disable());
        assert!(proxy.enable());
    }

    #[test]
    fn end_to_end() {
        let proxy = Proxy::builder(FixedChannel(
            r#"{"data":"AABBCCDDEEFF00112233445566778899"}"#,
        ))
        .validator(DummyValidator::new())
        .build()
        .unwrap();
        let intercept = proxy.intercept();
        intercept.set_target(PID);

        let mut buf = [0xFF_u8; 16];
        assert_eq!(intercept.read(0x2000.into(), &mut buf).unwrap(), 16);
        assert_eq!(buf, [0; 16]);
        assert_eq!(proxy.queue().len(), 1);

        assert_eq!(proxy.worker().process_pending(), 1);

        let view = proxy.cache().lookup(0x2000.into()).unwrap();
        assert_eq!(view.valid, ValidRange::new(0, 16));

        let mut buf = [0_u8; 16];
        intercept.read(0x2000.into(), &mut buf).unwrap();
        assert_eq!(
            buf,
            [
                0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66,
                0x77, 0x88, 0x99
            ]
        );
        assert!(proxy.queue().is_empty());
    }

    #[test]
    fn end_to_end_threaded() {
        let channel = Arc::new(DummyChannel::with_seed(0x10000, 0x7a3c));
        let proxy = Proxy::builder(channel.clone())
            .freshness(Duration::from_secs(100))
            .build()
            .unwrap();
        assert!(proxy.enable());

        let intercept = proxy.intercept().clone();
        intercept
            .open_process(ProcessAccess::ALL_ACCESS.bits(), PID)
            .unwrap();

        let mut expected = [0_u8; 0x30];
        assert!(channel.read_memory(0x2FF0.into(), &mut expected));

        let mut buf = [0_u8; 0x30];
        intercept.read(0x2FF0.into(), &mut buf).unwrap();
        assert!(wait_until(|| {
            intercept.read(0x2FF0.into(), &mut buf).unwrap();
            buf == expected
        }));

        assert!(proxy.disable());
        assert_eq!(channel.attached(), Some(PID));
        assert_eq!(
            channel.commands()[..2],
            [
                Command::OpenProcess { pid: PID },
                Command::Read {
                    pid: PID,
                    address: 0x2FF0,
                    size: 0x30
                }
            ]
        );
    }

    #[test]
    fn writes_reach_the_remote() {
        let channel = Arc::new(DummyChannel::new(0x2000));
        let proxy = Proxy::builder(channel.clone()).build().unwrap();
        proxy.intercept().set_target(PID);

        proxy
            .intercept()
            .write(0x100.into(), &[0xDE, 0xAD, 0xBE, 0xEF])
            .unwrap();
        assert!(proxy.enable());
        assert!(wait_until(|| proxy.queue().is_empty()));
        assert!(proxy.disable());

        let mut out = [0_u8; 4];
        assert!(channel.read_memory(0x100.into(), &mut out));
        assert_eq!(out, [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn no_blocking_on_slow_remote() {
        let channel = DummyChannel::new(0x10000).with_latency(Duration::from_secs(5));
        let proxy = Proxy::builder(channel).build().unwrap();
        assert!(proxy.enable());

        let intercept = proxy.intercept();
        intercept
            .open_process(ProcessAccess::ALL_ACCESS.bits(), PID)
            .unwrap();

        let start = Instant::now();
        for i in 0..100_u64 {
            let mut buf = [0xFF_u8; 64];
            intercept
                .read(Address::from(0x1000 + i * 0x40), &mut buf)
                .unwrap();
            assert_eq!(buf, [0; 64]);
            intercept.write(Address::from(0x8000 + i), &[1]).unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(500));

        // shutdown waits for at most one in-flight timeout
        let start = Instant::now();
        assert!(proxy.disable());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn expiry_triggers_single_refetch() {
        let proxy = Proxy::builder(DummyChannel::with_seed(0x4000, 1))
            .validator(DummyValidator::new())
            .build()
            .unwrap();
        let intercept = proxy.intercept();
        intercept.set_target(PID);

        let mut buf = [0_u8; 8];
        intercept.read(0x1000.into(), &mut buf).unwrap();
        proxy.worker().process_pending();

        intercept.read(0x1000.into(), &mut buf).unwrap();
        let cached = buf;
        assert!(proxy.queue().is_empty());

        proxy.cache().validator().set_expired(true);
        intercept.read(0x1000.into(), &mut buf).unwrap();
        assert_eq!(buf, cached);
        assert_eq!(
            proxy.queue().drain(),
            vec![Job::new(
                PID,
                JobKind::Read {
                    address: 0x1000.into(),
                    size: 8
                }
            )]
        );
    }

    #[test]
    fn drop_stops_worker() {
        let channel = Arc::new(DummyChannel::new(0x1000));
        let proxy = Proxy::builder(channel.clone()).build().unwrap();
        assert!(proxy.enable());
        std::mem::drop(proxy);

        // the channel is only referenced by the test after the worker is gone
        assert_eq!(Arc::strong_count(&channel), 1);
    }
}
