/*!
Proxy argument handler.
*/

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};

use core::convert::TryFrom;
use core::str::FromStr;
use hashbrown::HashMap;

/// Argument wrapper for the proxy configuration
///
/// # Examples
///
/// Construct from a string:
/// ```
/// use memproxy::config::ProxyArgs;
///
/// let argstr = "page_size=1000,freshness_ms=32,write_policy=invalidate";
/// let args = ProxyArgs::parse(argstr).unwrap();
/// assert_eq!(args.get("freshness_ms").unwrap(), "32");
/// ```
///
/// Construct as builder:
/// ```
/// use memproxy::config::ProxyArgs;
///
/// let args = ProxyArgs::new()
///     .insert("read_timeout_ms", "500")
///     .insert("idle_ms", "2");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyArgs {
    map: HashMap<String, String>,
}

impl ProxyArgs {
    /// Creates an empty `ProxyArgs` struct.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to create a `ProxyArgs` structure from an argument string.
    ///
    /// The argument string is a string of comma seperated key-value pairs:
    /// `opt1=val1,opt2=val2,opt3=val3`
    ///
    /// Whitespace around keys and values is ignored, as are empty entries.
    /// An entry without a `=` is rejected.
    pub fn parse(args: &str) -> Result<Self> {
        let mut map = HashMap::new();

        for kv in args.split(',').map(str::trim).filter(|kv| !kv.is_empty()) {
            let (key, value) = kv.split_once('=').ok_or_else(|| {
                Error(ErrorOrigin::Args, ErrorKind::ArgValidation)
                    .log_warn(format!("argument `{}` is not a key=value pair", kv))
            })?;
            map.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self { map })
    }

    /// Consumes self, inserts the given key-value pair and returns the self again.
    ///
    /// This function can be used as a builder pattern when programatically
    /// configuring a proxy.
    pub fn insert(mut self, key: &str, value: &str) -> Self {
        self.map.insert(key.to_string(), value.to_string());
        self
    }

    /// Tries to retrieve an entry from the options map.
    /// If the entry was not found this function returns a `None` value.
    pub fn get(&self, key: &str) -> Option<&String> {
        self.map.get(key)
    }

    /// Tries to retrieve the entry stored under `key`, falling back to `default`.
    pub fn get_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.map.get(key).map(String::as_str).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromStr for ProxyArgs {
    type Err = Error;

    fn from_str(args: &str) -> Result<Self> {
        ProxyArgs::parse(args)
    }
}

impl TryFrom<&str> for ProxyArgs {
    type Error = Error;

    fn try_from(args: &str) -> Result<Self> {
        ProxyArgs::parse(args)
    }
}

impl TryFrom<String> for ProxyArgs {
    type Error = Error;

    fn try_from(args: String) -> Result<Self> {
        ProxyArgs::parse(&args)
    }
}
