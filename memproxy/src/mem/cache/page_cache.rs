/*!
Page granular cache of the foreign process memory.

Every cached page holds a page sized buffer of which only one contiguous
sub-range is known to contain data fetched from the remote peer. New fills are
merged into that range by taking the minimum of the starts and the maximum of
the ends. When two fills are disjoint the bytes in between are reported as
valid although they were never fetched. They read as zero (or whatever an
earlier fill left there) until a fill covering them arrives.

The cache is shared between any number of readers and a single writer.
Buffer contents and the valid range of a page are only ever changed together
under the exclusive lock, readers never observe a partially merged page.
*/

use super::{CacheValidator, DefaultCacheValidator};
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::iter::PageChunks;
use crate::types::Address;

use coarsetime::Instant;
use hashbrown::HashMap;
use log::{debug, trace};
use parking_lot::RwLock;

/// Contiguous range of trustworthy bytes inside of a page.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ValidRange {
    start: usize,
    len: usize,
}

impl ValidRange {
    pub const EMPTY: ValidRange = ValidRange { start: 0, len: 0 };

    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    #[inline]
    pub const fn start(self) -> usize {
        self.start
    }

    #[inline]
    pub const fn len(self) -> usize {
        self.len
    }

    #[inline]
    pub const fn end(self) -> usize {
        self.start + self.len
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Returns true if `[start, end)` lies completely inside of the range.
    ///
    /// A partial overlap is no coverage.
    #[inline]
    pub fn covers(self, start: usize, end: usize) -> bool {
        !self.is_empty() && start >= self.start && end <= self.end()
    }

    /// Returns true if `[start, end)` shares at least one byte with the range.
    #[inline]
    pub fn overlaps(self, start: usize, end: usize) -> bool {
        !self.is_empty() && start < self.end() && end > self.start
    }

    /// Merges `[start, start + len)` into the range, clamped to `limit`.
    ///
    /// # Examples
    ///
    /// ```
    /// use memproxy::mem::ValidRange;
    ///
    /// let range = ValidRange::new(0, 10).merge(20, 10, 0x1000);
    /// assert_eq!(range, ValidRange::new(0, 30));
    /// ```
    pub fn merge(self, start: usize, len: usize, limit: usize) -> Self {
        if len == 0 || start >= limit {
            return self;
        }

        let new_end = core::cmp::min(start.saturating_add(len), limit);

        if self.is_empty() {
            return Self::new(start, new_end - start);
        }

        let merged_start = core::cmp::min(self.start, start);
        let merged_end = core::cmp::min(core::cmp::max(self.end(), new_end), limit);

        Self::new(merged_start, merged_end - merged_start)
    }
}

/// Outcome of serving a single page chunk from the cache.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// The chunk was copied from a fresh page.
    Fresh,
    /// The chunk was copied from an expired page.
    Stale,
    /// The chunk is not covered by the page, the output was zeroed.
    Miss,
}

impl ChunkState {
    #[inline]
    pub fn needs_refresh(self) -> bool {
        self != ChunkState::Fresh
    }
}

/// Consistent snapshot of a cached page.
#[derive(Clone, Debug)]
pub struct PageView {
    pub page_base: Address,
    pub valid: ValidRange,
    pub timestamp: Option<Instant>,
    pub expired: bool,
    data: Box<[u8]>,
}

impl PageView {
    /// Returns the bytes inside of the valid range.
    pub fn valid_bytes(&self) -> &[u8] {
        &self.data[self.valid.start()..self.valid.end()]
    }

    /// Returns `len` bytes at `offset` if they are covered by the valid range.
    pub fn bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        if self.valid.covers(offset, end) {
            Some(&self.data[offset..end])
        } else {
            None
        }
    }
}

struct CachedPage {
    buf: Box<[u8]>,
    valid: ValidRange,
    // None until the first fill, or after the page has been forced stale
    timestamp: Option<Instant>,
}

impl CachedPage {
    fn new(page_size: usize) -> Self {
        Self {
            buf: vec![0_u8; page_size].into_boxed_slice(),
            valid: ValidRange::EMPTY,
            timestamp: None,
        }
    }
}

pub struct PageCache<Q = DefaultCacheValidator> {
    pages: RwLock<HashMap<Address, CachedPage>>,
    page_size: usize,
    validator: Q,
}

impl PageCache<DefaultCacheValidator> {
    /// Creates a new cache with the default freshness window.
    pub fn new(page_size: usize) -> Result<Self> {
        Self::with_page_size(page_size, DefaultCacheValidator::default())
    }
}

impl<Q: CacheValidator> PageCache<Q> {
    /// Creates a new cache with the given page size and validator.
    ///
    /// The page size has to be a power of two.
    pub fn with_page_size(page_size: usize, validator: Q) -> Result<Self> {
        if page_size == 0 || !page_size.is_power_of_two() {
            return Err(Error(ErrorOrigin::PageCache, ErrorKind::Configuration)
                .log_error(format!("invalid page size {:#x}", page_size)));
        }

        Ok(Self {
            pages: RwLock::new(HashMap::new()),
            page_size,
            validator,
        })
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn validator(&self) -> &Q {
        &self.validator
    }

    #[inline]
    pub fn now(&self) -> Instant {
        self.validator.now()
    }

    #[inline]
    pub fn is_expired(&self, timestamp: Instant, now: Instant) -> bool {
        self.validator.is_expired(timestamp, now)
    }

    fn is_page_expired(&self, page: &CachedPage, now: Instant) -> bool {
        match page.timestamp {
            Some(timestamp) => self.validator.is_expired(timestamp, now),
            None => true,
        }
    }

    /// Returns a snapshot of the page containing `page_base`.
    pub fn lookup(&self, page_base: Address) -> Option<PageView> {
        let page_base = page_base.as_page_aligned(self.page_size);
        let now = self.now();

        let pages = self.pages.read();
        pages.get(&page_base).map(|page| PageView {
            page_base,
            valid: page.valid,
            timestamp: page.timestamp,
            expired: self.is_page_expired(page, now),
            data: page.buf.clone(),
        })
    }

    /// Serves a chunk that does not cross a page boundary.
    ///
    /// If the chunk is covered by the valid range of its page it is copied into `out`,
    /// otherwise `out` is zeroed.
    pub fn read_chunk(&self, addr: Address, out: &mut [u8], now: Instant) -> ChunkState {
        let page_base = addr.as_page_aligned(self.page_size);
        let start = addr.page_offset(self.page_size);
        let end = start + out.len();

        if end > self.page_size {
            debug_assert!(false, "chunk at {:x} crosses a page boundary", addr);
            out.fill(0);
            return ChunkState::Miss;
        }

        {
            let pages = self.pages.read();
            if let Some(page) = pages.get(&page_base) {
                if page.valid.covers(start, end) {
                    out.copy_from_slice(&page.buf[start..end]);
                    return if self.is_page_expired(page, now) {
                        ChunkState::Stale
                    } else {
                        ChunkState::Fresh
                    };
                }
            }
        }

        out.fill(0);
        ChunkState::Miss
    }

    /// Copies `bytes` into the page at `offset` and merges the range into its valid range.
    ///
    /// Bytes exceeding the page are dropped. Returns the number of bytes copied.
    pub fn merge_fill(&self, page_base: Address, offset: usize, bytes: &[u8]) -> Result<usize> {
        if page_base.as_page_aligned(self.page_size) != page_base {
            return Err(Error(ErrorOrigin::PageCache, ErrorKind::Unaligned));
        }

        if offset >= self.page_size {
            return Err(Error(ErrorOrigin::PageCache, ErrorKind::OutOfBounds));
        }

        let len = core::cmp::min(bytes.len(), self.page_size - offset);
        if len == 0 {
            return Ok(0);
        }

        let now = self.now();
        let page_size = self.page_size;

        let mut pages = self.pages.write();
        let page = pages
            .entry(page_base)
            .or_insert_with(|| CachedPage::new(page_size));

        page.buf[offset..offset + len].copy_from_slice(&bytes[..len]);
        page.valid = page.valid.merge(offset, len, page_size);
        page.timestamp = Some(now);

        trace!(
            "filled page {:x} at {:#x}+{:#x}, valid {:#x}+{:#x}",
            page_base,
            offset,
            len,
            page.valid.start(),
            page.valid.len()
        );

        Ok(len)
    }

    /// Drops the valid range of every page whose valid range overlaps `[address, address + len)`.
    ///
    /// Returns the number of invalidated pages.
    pub fn invalidate(&self, address: Address, len: usize) -> usize {
        let page_size = self.page_size;
        let mut count = 0;

        let mut pages = self.pages.write();
        for (addr, chunk_len) in (len as u64).page_chunks(address, page_size) {
            let start = addr.page_offset(page_size);
            let end = start + chunk_len as usize;

            if let Some(page) = pages.get_mut(&addr.as_page_aligned(page_size)) {
                if page.valid.overlaps(start, end) {
                    page.valid = ValidRange::EMPTY;
                    page.timestamp = None;
                    count += 1;
                }
            }
        }

        if count > 0 {
            debug!("invalidated {} page(s) at {:x}+{:#x}", count, address, len);
        }

        count
    }

    /// Writes `data` into already valid parts of the cache and marks the touched pages as expired.
    ///
    /// Bytes outside of a page's valid range are not cached, the valid range never grows.
    /// Returns the number of bytes written into the cache.
    pub fn write_back(&self, address: Address, data: &[u8]) -> usize {
        let page_size = self.page_size;
        let mut written = 0;

        let mut pages = self.pages.write();
        for (addr, chunk) in data.page_chunks(address, page_size) {
            let start = addr.page_offset(page_size);
            let end = start + chunk.len();

            if let Some(page) = pages.get_mut(&addr.as_page_aligned(page_size)) {
                if page.valid.overlaps(start, end) {
                    let copy_start = core::cmp::max(start, page.valid.start());
                    let copy_end = core::cmp::min(end, page.valid.end());
                    page.buf[copy_start..copy_end]
                        .copy_from_slice(&chunk[copy_start - start..copy_end - start]);
                    page.timestamp = None;
                    written += copy_end - copy_start;
                }
            }
        }

        written
    }

    /// Returns the number of cached pages.
    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all cached pages.
    pub fn clear(&self) {
        self.pages.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::DummyValidator;
    use crate::mem::TimedCacheValidator;

    use coarsetime::Duration;
    use rand::{thread_rng, Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    use std::sync::Arc;
    use std::thread;

    const PAGE_SIZE: usize = 0x1000;

    fn long_lived_cache() -> PageCache<TimedCacheValidator> {
        PageCache::with_page_size(
            PAGE_SIZE,
            TimedCacheValidator::new(Duration::from_secs(100)),
        )
        .unwrap()
    }

    #[test]
    fn invalid_page_size() {
        assert!(PageCache::new(0).is_err());
        assert!(PageCache::new(0x1001).is_err());
        assert!(PageCache::new(0x10).is_ok());
    }

    #[test]
    fn fill_and_lookup() {
        let cache = long_lived_cache();
        let bytes = (0..16).collect::<Vec<u8>>();

        assert_eq!(cache.merge_fill(0x2000.into(), 0x10, &bytes).unwrap(), 16);

        let view = cache.lookup(0x2000.into()).unwrap();
        assert_eq!(view.valid, ValidRange::new(0x10, 16));
        assert_eq!(view.valid_bytes(), bytes.as_slice());
        assert_eq!(view.bytes(0x14, 4).unwrap(), &bytes[4..8]);
        assert_eq!(view.bytes(0x0f, 4), None);
        assert!(!view.expired);

        // lookups align to the containing page
        assert_eq!(cache.lookup(0x2abc.into()).unwrap().valid, view.valid);
        assert!(cache.lookup(0x3000.into()).is_none());
    }

    #[test]
    fn coverage() {
        let cache = long_lived_cache();
        cache.merge_fill(0x1000.into(), 0x100, &[0xAA; 0x20]).unwrap();
        let now = cache.now();

        let mut out = [0xFF_u8; 0x20];
        assert_eq!(
            cache.read_chunk(0x1100.into(), &mut out, now),
            ChunkState::Fresh
        );
        assert_eq!(out, [0xAA; 0x20]);

        // partial overlaps are misses and zero the output
        let mut out = [0xFF_u8; 0x20];
        assert_eq!(
            cache.read_chunk(0x10F0.into(), &mut out, now),
            ChunkState::Miss
        );
        assert_eq!(out, [0; 0x20]);

        let mut out = [0xFF_u8; 0x20];
        assert_eq!(
            cache.read_chunk(0x1110.into(), &mut out, now),
            ChunkState::Miss
        );
        assert_eq!(out, [0; 0x20]);

        // unknown pages are misses
        let mut out = [0xFF_u8; 4];
        assert_eq!(
            cache.read_chunk(0x5000.into(), &mut out, now),
            ChunkState::Miss
        );
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn stale_pages_are_served() {
        let cache = PageCache::with_page_size(PAGE_SIZE, DummyValidator::new()).unwrap();
        cache.merge_fill(0x1000.into(), 0, &[1, 2, 3, 4]).unwrap();

        let mut out = [0_u8; 4];
        assert_eq!(
            cache.read_chunk(0x1000.into(), &mut out, cache.now()),
            ChunkState::Fresh
        );

        cache.validator().set_expired(true);

        let mut out = [0_u8; 4];
        assert_eq!(
            cache.read_chunk(0x1000.into(), &mut out, cache.now()),
            ChunkState::Stale
        );
        assert_eq!(out, [1, 2, 3, 4]);
        assert!(cache.lookup(0x1000.into()).unwrap().expired);
    }

    #[test]
    fn merge_idempotence() {
        let cache = long_lived_cache();
        let bytes = [0x11_u8; 0x30];

        cache.merge_fill(0x1000.into(), 0x40, &bytes).unwrap();
        let first = cache.lookup(0x1000.into()).unwrap();
        cache.merge_fill(0x1000.into(), 0x40, &bytes).unwrap();
        let second = cache.lookup(0x1000.into()).unwrap();

        assert_eq!(first.valid, second.valid);
        assert_eq!(first.valid_bytes(), second.valid_bytes());
    }

    /// Test merge monotonicity both with a random seed and a predetermined one.
    #[test]
    fn merge_monotonicity() {
        for &seed in &[0x3ffd_235c_5194_dedf, thread_rng().gen::<u64>()] {
            let mut rng = XorShiftRng::seed_from_u64(seed);

            for _ in 0..1000 {
                let o1 = rng.gen_range(0..PAGE_SIZE);
                let l1 = rng.gen_range(1..=PAGE_SIZE - o1);
                let o2 = rng.gen_range(0..PAGE_SIZE);
                let l2 = rng.gen_range(1..=PAGE_SIZE - o2);

                let range = ValidRange::EMPTY
                    .merge(o1, l1, PAGE_SIZE)
                    .merge(o2, l2, PAGE_SIZE);

                assert!(
                    range.covers(o1, o1 + l1) && range.covers(o2, o2 + l2),
                    "seed={:x} ({:#x},{:#x}) ({:#x},{:#x}) -> {:?}",
                    seed,
                    o1,
                    l1,
                    o2,
                    l2,
                    range
                );
                assert!(range.end() <= PAGE_SIZE);
            }
        }
    }

    #[test]
    fn merge_disjoint_overstates() {
        let cache = long_lived_cache();
        cache.merge_fill(0x1000.into(), 0, &[0xAA; 10]).unwrap();
        cache.merge_fill(0x1000.into(), 20, &[0xBB; 10]).unwrap();

        let view = cache.lookup(0x1000.into()).unwrap();
        assert_eq!(view.valid, ValidRange::new(0, 30));
        assert_eq!(view.bytes(10, 10).unwrap(), &[0; 10]);
    }

    #[test]
    fn fill_clamped_to_page() {
        let cache = long_lived_cache();
        assert_eq!(
            cache.merge_fill(0x1000.into(), 0xFF0, &[0xCC; 0x20]).unwrap(),
            0x10
        );
        assert_eq!(
            cache.lookup(0x1000.into()).unwrap().valid,
            ValidRange::new(0xFF0, 0x10)
        );
        assert!(cache.lookup(0x2000.into()).is_none());
    }

    #[test]
    fn fill_rejects_invalid_chunks() {
        let cache = long_lived_cache();
        assert_eq!(
            cache.merge_fill(0x1010.into(), 0, &[0; 4]),
            Err(Error(ErrorOrigin::PageCache, ErrorKind::Unaligned))
        );
        assert_eq!(
            cache.merge_fill(0x1000.into(), PAGE_SIZE, &[0; 4]),
            Err(Error(ErrorOrigin::PageCache, ErrorKind::OutOfBounds))
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_overlapping() {
        let cache = long_lived_cache();
        cache.merge_fill(0x1000.into(), 0x100, &[1; 0x100]).unwrap();
        cache.merge_fill(0x2000.into(), 0x100, &[2; 0x100]).unwrap();

        // the write does not touch the valid range of 0x2000
        assert_eq!(cache.invalidate(0x1FF0.into(), 0x20), 0);
        assert_eq!(cache.invalidate(0x11F0.into(), 0xE20), 1);

        assert!(cache.lookup(0x1000.into()).unwrap().valid.is_empty());
        assert_eq!(
            cache.lookup(0x2000.into()).unwrap().valid,
            ValidRange::new(0x100, 0x100)
        );
    }

    #[test]
    fn write_back_only_valid_bytes() {
        let cache = long_lived_cache();
        cache.merge_fill(0x1000.into(), 0x10, &[0; 0x10]).unwrap();

        assert_eq!(cache.write_back(0x1008.into(), &[0xEE; 0x10]), 8);

        let view = cache.lookup(0x1000.into()).unwrap();
        assert_eq!(view.valid, ValidRange::new(0x10, 0x10));
        assert_eq!(&view.valid_bytes()[..8], &[0xEE; 8]);
        assert_eq!(&view.valid_bytes()[8..], &[0; 8]);
        assert!(view.expired);

        assert_eq!(cache.write_back(0x8000.into(), &[0xEE; 0x10]), 0);
        assert!(cache.lookup(0x8000.into()).is_none());
    }

    #[test]
    fn no_torn_reads() {
        let cache = Arc::new(long_lived_cache());
        cache.merge_fill(0x1000.into(), 0, &[0; 0x100]).unwrap();

        let readers = (0..4)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    let mut out = [0_u8; 0x100];
                    for _ in 0..2000 {
                        let state = cache.read_chunk(0x1000.into(), &mut out, cache.now());
                        assert_ne!(state, ChunkState::Miss);
                        assert!(out.iter().all(|&b| b == out[0]), "torn read: {:?}", &out[..]);
                    }
                })
            })
            .collect::<Vec<_>>();

        for i in 0..2000_u32 {
            cache
                .merge_fill(0x1000.into(), 0, &[(i % 256) as u8; 0x100])
                .unwrap();
        }

        readers.into_iter().for_each(|t| t.join().unwrap());
    }
}
