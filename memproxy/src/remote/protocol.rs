/*!
Wire format spoken with the remote peer.

Every job is sent as one JSON object tagged by its `cmd` field:

```text
{"cmd":"open_process","pid":1234}
{"cmd":"close_process"}
{"cmd":"read","pid":1234,"address":8192,"size":16}
{"cmd":"write","pid":1234,"address":8192,"data":"AABBCCDD"}
```

Byte runs are hex encoded, two upper case digits per byte in memory order.
Only responses to reads are inspected. They have to carry the fetched bytes in a
`data` field, all other fields are ignored.
*/

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::queue::{Job, JobKind};

use serde::{Deserialize, Serialize};

/// A single request to the remote peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    OpenProcess {
        pid: u32,
    },
    CloseProcess,
    Read {
        pid: u32,
        address: u64,
        size: u64,
    },
    Write {
        pid: u32,
        address: u64,
        #[serde(with = "hex_data")]
        data: Vec<u8>,
    },
}

impl Command {
    /// Serializes the command into its wire representation.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| Error(ErrorOrigin::Protocol, ErrorKind::Encoding).log_error(err))
    }

    /// Parses a wire representation back into a command.
    pub fn decode(command: &str) -> Result<Self> {
        serde_json::from_str(command)
            .map_err(|err| Error(ErrorOrigin::Protocol, ErrorKind::Encoding).log_debug(err))
    }
}

impl From<&Job> for Command {
    fn from(job: &Job) -> Self {
        match &job.kind {
            JobKind::OpenProcess => Command::OpenProcess { pid: job.pid },
            JobKind::CloseProcess => Command::CloseProcess,
            JobKind::Read { address, size } => Command::Read {
                pid: job.pid,
                address: address.to_umem(),
                size: *size as u64,
            },
            JobKind::Write { address, data } => Command::Write {
                pid: job.pid,
                address: address.to_umem(),
                data: data.clone(),
            },
        }
    }
}

#[derive(Deserialize)]
struct ReadResponse {
    #[serde(default)]
    data: Option<String>,
}

/// Extracts the bytes carried by the response to a read command.
///
/// The result is truncated to `size` bytes. A response without a `data` field is
/// `MissingField`, anything that is not valid JSON or valid hex is `Encoding`.
///
/// # Examples
///
/// ```
/// use memproxy::remote::decode_read_response;
///
/// let bytes = decode_read_response(r#"{"data":"AABBCC"}"#, 2).unwrap();
/// assert_eq!(bytes, vec![0xAA, 0xBB]);
/// ```
pub fn decode_read_response(response: &str, size: usize) -> Result<Vec<u8>> {
    let response: ReadResponse = serde_json::from_str(response)
        .map_err(|err| Error(ErrorOrigin::Protocol, ErrorKind::Encoding).log_warn(err))?;

    let data = response
        .data
        .ok_or_else(|| Error(ErrorOrigin::Protocol, ErrorKind::MissingField))?;

    let mut bytes = hex::decode(data.trim())
        .map_err(|err| Error(ErrorOrigin::Protocol, ErrorKind::Encoding).log_warn(err))?;

    bytes.truncate(size);
    Ok(bytes)
}

mod hex_data {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode_upper(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let data = String::deserialize(deserializer)?;
        hex::decode(data).map_err(serde::de::Error::custom)
    }
}
