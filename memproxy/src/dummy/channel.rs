use crate::remote::{Command, RemoteChannel};
use crate::types::{clamp_to_usize, Address};

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use log::trace;
use parking_lot::{Mutex, RwLock};
use rand::{RngCore, SeedableRng};
use rand_xorshift::XorShiftRng;
use serde_json::json;

/// In-memory remote peer.
///
/// The foreign process memory is a flat buffer starting at address 0. Every command
/// sent through the channel is recorded, the peer can be slowed down and told to
/// drop responses.
pub struct DummyChannel {
    mem: RwLock<Vec<u8>>,
    latency: Duration,
    failures: AtomicUsize,
    response: Mutex<Option<String>>,
    log: Mutex<Vec<String>>,
    attached: AtomicU32,
}

impl DummyChannel {
    /// Creates a new peer with `size` bytes of zeroed memory.
    pub fn new(size: usize) -> Self {
        Self::with_memory(vec![0_u8; size])
    }

    /// Creates a new peer with `size` bytes of memory filled from a seeded rng.
    pub fn with_seed(size: usize, seed: u64) -> Self {
        let mut mem = vec![0_u8; size];
        XorShiftRng::seed_from_u64(seed).fill_bytes(&mut mem);
        Self::with_memory(mem)
    }

    pub fn with_memory(mem: Vec<u8>) -> Self {
        Self {
            mem: RwLock::new(mem),
            latency: Duration::ZERO,
            failures: AtomicUsize::new(0),
            response: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            attached: AtomicU32::new(0),
        }
    }

    /// Consumes self and delays every response by `latency`.
    ///
    /// A latency exceeding the timeout of a command makes the command time out.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Drops the responses to the next `count` commands.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Answers every command with `response` instead of executing it.
    pub fn set_response(&self, response: Option<String>) {
        *self.response.lock() = response;
    }

    pub fn read_memory(&self, address: Address, out: &mut [u8]) -> bool {
        let mem = self.mem.read();
        match Self::range(&mem, address, out.len()) {
            Some((start, end)) if end - start == out.len() => {
                out.copy_from_slice(&mem[start..end]);
                true
            }
            _ => false,
        }
    }

    pub fn write_memory(&self, address: Address, data: &[u8]) -> bool {
        let mut mem = self.mem.write();
        match Self::range(&mem, address, data.len()) {
            Some((start, end)) if end - start == data.len() => {
                mem[start..end].copy_from_slice(data);
                true
            }
            _ => false,
        }
    }

    /// Returns all commands sent so far, in order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Returns all commands sent so far, decoded.
    pub fn commands(&self) -> Vec<Command> {
        self.log
            .lock()
            .iter()
            .filter_map(|cmd| Command::decode(cmd).ok())
            .collect()
    }

    /// Returns the pid of the process opened last.
    pub fn attached(&self) -> Option<u32> {
        match self.attached.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    fn range(mem: &[u8], address: Address, len: usize) -> Option<(usize, usize)> {
        let start = clamp_to_usize(address.to_umem());
        if start >= mem.len() {
            return None;
        }
        Some((start, start.saturating_add(len).min(mem.len())))
    }

    fn respond(&self, command: &str) -> String {
        let command = match Command::decode(command) {
            Ok(command) => command,
            Err(_) => return json!({ "error": "unknown command" }).to_string(),
        };

        match command {
            Command::OpenProcess { pid } => {
                self.attached.store(pid, Ordering::SeqCst);
                json!({ "ok": true }).to_string()
            }
            Command::CloseProcess => {
                self.attached.store(0, Ordering::SeqCst);
                json!({ "ok": true }).to_string()
            }
            Command::Read { address, size, .. } => {
                let mem = self.mem.read();
                match Self::range(&mem, address.into(), clamp_to_usize(size)) {
                    Some((start, end)) => {
                        json!({ "data": hex::encode_upper(&mem[start..end]) }).to_string()
                    }
                    None => json!({ "error": "out of bounds" }).to_string(),
                }
            }
            Command::Write { address, data, .. } => {
                let mut mem = self.mem.write();
                match Self::range(&mem, address.into(), data.len()) {
                    Some((start, end)) => {
                        mem[start..end].copy_from_slice(&data[..end - start]);
                        json!({ "ok": true }).to_string()
                    }
                    None => json!({ "error": "out of bounds" }).to_string(),
                }
            }
        }
    }
}

impl RemoteChannel for DummyChannel {
    fn send(&self, command: &str, timeout: Duration) -> Option<String> {
        trace!("dummy channel: {}", command);
        self.log.lock().push(command.to_string());

        if self.latency > timeout {
            thread::sleep(timeout);
            return None;
        }
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return None;
        }

        if let Some(response) = self.response.lock().clone() {
            return Some(response);
        }

        Some(self.respond(command))
    }
}
