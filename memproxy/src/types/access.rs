/*!
Process access masks and the classification of open requests.

Hosts enumerating processes (e.g. to fill a process browser) open every process with a
limited access mask. Those requests must not be forwarded to the remote peer, otherwise a
single refresh of the process list turns into an attach storm. Requests are classified by
comparing the exact requested mask against a table of known probe masks.
*/

use std::fmt;

bitflags! {
    /// Access rights a host may request when opening a process.
    ///
    /// The values follow the Windows process access rights, which is what hosts pass through.
    #[repr(transparent)]
    pub struct ProcessAccess: u32 {
        const TERMINATE = 0x0000_0001;
        const CREATE_THREAD = 0x0000_0002;
        const VM_OPERATION = 0x0000_0008;
        const VM_READ = 0x0000_0010;
        const VM_WRITE = 0x0000_0020;
        const DUP_HANDLE = 0x0000_0040;
        const QUERY_INFORMATION = 0x0000_0400;
        const SUSPEND_RESUME = 0x0000_0800;
        const QUERY_LIMITED_INFORMATION = 0x0000_1000;
        const SYNCHRONIZE = 0x0010_0000;
        const ALL_ACCESS = 0x001F_FFFF;
    }
}

/// What an open request is meant for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessIntent {
    /// Enumeration or inspection only, nothing is attached.
    Probe,
    /// A real attach, the remote peer has to open the process.
    Attach,
}

/// Table of access masks that are recognized as probes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeMasks {
    masks: Vec<u32>,
}

impl ProbeMasks {
    /// Creates an empty table. Every request will be treated as an attach.
    pub fn empty() -> Self {
        Self { masks: Vec::new() }
    }

    /// Consumes self, adds the given mask and returns the self again.
    pub fn with_mask(mut self, mask: ProcessAccess) -> Self {
        self.push(mask.bits());
        self
    }

    /// Adds a raw mask to the table.
    pub fn push(&mut self, mask: u32) {
        if !self.masks.contains(&mask) {
            self.masks.push(mask);
        }
    }

    pub fn masks(&self) -> &[u32] {
        &self.masks
    }

    /// Classifies the raw access mask of an open request.
    ///
    /// Only exact matches are probes, a superset of a probe mask is an attach.
    ///
    /// # Examples
    ///
    /// ```
    /// use memproxy::types::{AccessIntent, ProbeMasks, ProcessAccess};
    ///
    /// let masks = ProbeMasks::default();
    /// assert_eq!(
    ///     masks.classify(ProcessAccess::QUERY_LIMITED_INFORMATION.bits()),
    ///     AccessIntent::Probe
    /// );
    /// assert_eq!(masks.classify(ProcessAccess::ALL_ACCESS.bits()), AccessIntent::Attach);
    /// ```
    pub fn classify(&self, mask: u32) -> AccessIntent {
        if self.masks.iter().any(|&m| m == mask) {
            AccessIntent::Probe
        } else {
            AccessIntent::Attach
        }
    }
}

/// The masks used by process browsers.
impl Default for ProbeMasks {
    fn default() -> Self {
        Self::empty()
            .with_mask(ProcessAccess::QUERY_INFORMATION | ProcessAccess::VM_READ)
            .with_mask(ProcessAccess::QUERY_LIMITED_INFORMATION)
    }
}

/// Placeholder handle handed out to the host instead of a real os handle.
///
/// The handle value is the id of the opened process (or thread), which allows
/// later calls to be correlated with the target without sharing any os resources.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct TargetHandle(u32);

impl TargetHandle {
    pub const NULL: TargetHandle = TargetHandle(0);

    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the process or thread id this handle stands for.
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Converts the handle into the pointer sized value returned to hosts.
    #[inline]
    pub const fn as_raw(self) -> usize {
        self.0 as usize
    }

    /// Recovers a handle from a host value. Values that do not fit an id become `NULL`.
    #[inline]
    pub fn from_raw(raw: usize) -> Self {
        u32::try_from(raw).map(Self).unwrap_or(Self::NULL)
    }
}

impl fmt::Debug for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TargetHandle({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_probe_masks() {
        let masks = ProbeMasks::default();
        assert_eq!(masks.masks(), &[0x0410, 0x1000]);

        assert_eq!(masks.classify(0x0410), AccessIntent::Probe);
        assert_eq!(masks.classify(0x1000), AccessIntent::Probe);

        // subsets and supersets are no probes
        assert_eq!(masks.classify(0x0400), AccessIntent::Attach);
        assert_eq!(masks.classify(0x1410), AccessIntent::Attach);
        assert_eq!(masks.classify(0x001F_FFFF), AccessIntent::Attach);
    }

    #[test]
    fn empty_probe_masks() {
        let masks = ProbeMasks::empty();
        assert_eq!(masks.classify(0x1000), AccessIntent::Attach);
    }

    #[test]
    fn probe_masks_dedup() {
        let mut masks = ProbeMasks::empty().with_mask(ProcessAccess::VM_READ);
        masks.push(ProcessAccess::VM_READ.bits());
        assert_eq!(masks.masks().len(), 1);
    }

    #[test]
    fn handle_raw() {
        let handle = TargetHandle::new(1234);
        assert_eq!(handle.as_raw(), 1234);
        assert_eq!(TargetHandle::from_raw(1234), handle);
        assert!(TargetHandle::from_raw(0).is_null());
    }
}
