/*!
Runtime configuration of a proxy.

A [`ProxyConfig`] can be built programmatically or from an argument string
(see [`ProxyArgs`]). The following keys are recognized, unknown keys are ignored:

| key | value | default |
|---|---|---|
| `page_size` | hex, power of two | `1000` |
| `freshness_ms` | decimal | `16` |
| `idle_ms` | decimal | `1` |
| `open_timeout_ms` | decimal | `1000` |
| `close_timeout_ms` | decimal | `500` |
| `read_timeout_ms` | decimal | `200` |
| `write_timeout_ms` | decimal | `100` |
| `write_policy` | `forward`, `invalidate` or `writeback` | `forward` |
| `probe_masks` | hex masks separated by `:` | `410:1000` |
*/

pub mod args;

#[doc(hidden)]
pub use args::ProxyArgs;

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::mem::DEFAULT_FRESHNESS_MS;
use crate::queue::JobKind;
use crate::types::{umem, ProbeMasks};

use core::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: usize = 0x1000;
pub const DEFAULT_IDLE_MS: u64 = 1;

/// What happens to the cache when the host writes into the foreign process.
///
/// Writes are always forwarded to the remote peer, the policy only decides
/// how the local copy reacts to it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum WritePolicy {
    /// The cache is left untouched.
    #[default]
    Forward,
    /// Every page whose valid range overlaps the write is dropped from the cache.
    Invalidate,
    /// Written bytes inside of valid ranges are copied into the cache and the touched pages expire.
    WriteBack,
}

impl FromStr for WritePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "forward" => Ok(WritePolicy::Forward),
            "invalidate" => Ok(WritePolicy::Invalidate),
            "writeback" | "write_back" => Ok(WritePolicy::WriteBack),
            _ => Err(Error(ErrorOrigin::Args, ErrorKind::ArgValidation)
                .log_warn(format!("unknown write policy `{}`", s))),
        }
    }
}

/// Upper bounds for a single remote round trip, per job kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JobTimeouts {
    pub open_process: Duration,
    pub close_process: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for JobTimeouts {
    fn default() -> Self {
        Self {
            open_process: Duration::from_millis(1000),
            close_process: Duration::from_millis(500),
            read: Duration::from_millis(200),
            write: Duration::from_millis(100),
        }
    }
}

impl JobTimeouts {
    /// Returns the timeout for the given job kind.
    pub fn for_job(&self, kind: &JobKind) -> Duration {
        match kind {
            JobKind::OpenProcess => self.open_process,
            JobKind::CloseProcess => self.close_process,
            JobKind::Read { .. } => self.read,
            JobKind::Write { .. } => self.write,
        }
    }

    /// Returns the longest configured timeout.
    ///
    /// Stopping the worker takes at most this long.
    pub fn longest(&self) -> Duration {
        self.open_process
            .max(self.close_process)
            .max(self.read)
            .max(self.write)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    pub page_size: usize,
    pub freshness: Duration,
    pub idle_interval: Duration,
    pub timeouts: JobTimeouts,
    pub write_policy: WritePolicy,
    pub probe_masks: ProbeMasks,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            freshness: Duration::from_millis(DEFAULT_FRESHNESS_MS),
            idle_interval: Duration::from_millis(DEFAULT_IDLE_MS),
            timeouts: JobTimeouts::default(),
            write_policy: WritePolicy::default(),
            probe_masks: ProbeMasks::default(),
        }
    }
}

impl ProxyConfig {
    /// Creates a configuration from the given arguments, missing keys keep their defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use memproxy::config::{ProxyArgs, ProxyConfig, WritePolicy};
    ///
    /// let args = ProxyArgs::parse("page_size=0x2000,read_timeout_ms=50,write_policy=writeback").unwrap();
    /// let config = ProxyConfig::from_args(&args).unwrap();
    ///
    /// assert_eq!(config.page_size, 0x2000);
    /// assert_eq!(config.timeouts.read, Duration::from_millis(50));
    /// assert_eq!(config.write_policy, WritePolicy::WriteBack);
    /// ```
    pub fn from_args(args: &ProxyArgs) -> Result<Self> {
        let mut config = Self::default();

        if let Some(page_size) = args.get("page_size") {
            config.page_size = parse_hex(page_size)? as usize;
        }

        if let Some(ms) = parse_ms(args, "freshness_ms")? {
            config.freshness = ms;
        }
        if let Some(ms) = parse_ms(args, "idle_ms")? {
            config.idle_interval = ms;
        }
        if let Some(ms) = parse_ms(args, "open_timeout_ms")? {
            config.timeouts.open_process = ms;
        }
        if let Some(ms) = parse_ms(args, "close_timeout_ms")? {
            config.timeouts.close_process = ms;
        }
        if let Some(ms) = parse_ms(args, "read_timeout_ms")? {
            config.timeouts.read = ms;
        }
        if let Some(ms) = parse_ms(args, "write_timeout_ms")? {
            config.timeouts.write = ms;
        }

        if let Some(policy) = args.get("write_policy") {
            config.write_policy = policy.parse()?;
        }

        if let Some(masks) = args.get("probe_masks") {
            let mut probe_masks = ProbeMasks::empty();
            for mask in masks.split(':').filter(|m| !m.is_empty()) {
                probe_masks.push(parse_hex(mask)? as u32);
            }
            config.probe_masks = probe_masks;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the proxy cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || !self.page_size.is_power_of_two() {
            return Err(Error(ErrorOrigin::Args, ErrorKind::Configuration)
                .log_error(format!("page size {:#x} is not a power of two", self.page_size)));
        }

        if self.idle_interval.is_zero() {
            return Err(Error(ErrorOrigin::Args, ErrorKind::Configuration)
                .log_error("idle interval must not be zero"));
        }

        Ok(())
    }
}

fn parse_hex(value: &str) -> Result<umem> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);

    umem::from_str_radix(digits, 16).map_err(|err| {
        Error(ErrorOrigin::Args, ErrorKind::ArgValidation)
            .log_warn(format!("`{}` is not a hex number ({})", value, err))
    })
}

fn parse_ms(args: &ProxyArgs, key: &str) -> Result<Option<Duration>> {
    args.get(key)
        .map(|value| {
            value.parse::<u64>().map(Duration::from_millis).map_err(|err| {
                Error(ErrorOrigin::Args, ErrorKind::ArgValidation)
                    .log_warn(format!("{}=`{}` is not a number ({})", key, value, err))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccessIntent;

    #[test]
    fn defaults() {
        let config = ProxyConfig::from_args(&ProxyArgs::new()).unwrap();
        assert_eq!(config, ProxyConfig::default());
        assert_eq!(config.page_size, 0x1000);
        assert_eq!(config.freshness, Duration::from_millis(16));
        assert_eq!(config.idle_interval, Duration::from_millis(1));
        assert_eq!(config.timeouts.longest(), Duration::from_millis(1000));
    }

    #[test]
    fn per_kind_timeouts() {
        let timeouts = JobTimeouts::default();
        assert_eq!(
            timeouts.for_job(&JobKind::OpenProcess),
            Duration::from_millis(1000)
        );
        assert_eq!(
            timeouts.for_job(&JobKind::CloseProcess),
            Duration::from_millis(500)
        );
        assert_eq!(
            timeouts.for_job(&JobKind::Read {
                address: 0.into(),
                size: 1
            }),
            Duration::from_millis(200)
        );
        assert_eq!(
            timeouts.for_job(&JobKind::Write {
                address: 0.into(),
                data: vec![]
            }),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn from_args() {
        let args = ProxyArgs::parse(
            "page_size=200,freshness_ms=100,idle_ms=5,open_timeout_ms=1,close_timeout_ms=2,\
             read_timeout_ms=3,write_timeout_ms=4,write_policy=Invalidate,unknown=1",
        )
        .unwrap();
        let config = ProxyConfig::from_args(&args).unwrap();

        assert_eq!(config.page_size, 0x200);
        assert_eq!(config.freshness, Duration::from_millis(100));
        assert_eq!(config.idle_interval, Duration::from_millis(5));
        assert_eq!(
            config.timeouts,
            JobTimeouts {
                open_process: Duration::from_millis(1),
                close_process: Duration::from_millis(2),
                read: Duration::from_millis(3),
                write: Duration::from_millis(4),
            }
        );
        assert_eq!(config.write_policy, WritePolicy::Invalidate);
    }

    #[test]
    fn from_args_probe_masks() {
        let args = ProxyArgs::new().insert("probe_masks", "0x1000:10");
        let config = ProxyConfig::from_args(&args).unwrap();

        assert_eq!(config.probe_masks.masks(), &[0x1000, 0x10]);
        assert_eq!(config.probe_masks.classify(0x10), AccessIntent::Probe);
        assert_eq!(config.probe_masks.classify(0x410), AccessIntent::Attach);
    }

    #[test]
    fn from_args_invalid() {
        for args in &[
            "page_size=0",
            "page_size=1001",
            "page_size=xyz",
            "freshness_ms=-1",
            "idle_ms=0",
            "read_timeout_ms=fast",
            "write_policy=later",
            "probe_masks=10:zz",
        ] {
            let args = ProxyArgs::parse(args).unwrap();
            let err = ProxyConfig::from_args(&args).unwrap_err();
            assert_eq!(err.0, ErrorOrigin::Args, "{:?}", args);
        }
    }
}
