use crate::types::{clamp_to_usize, umem, Address};

pub trait SplitAtIndex {
    /// Split data at a given index
    ///
    /// This method will split the underlying data at a given index into up to 2 possible values.
    ///
    /// What a split means very much depends on the underlying type. sizes are split literally,
    /// into 2 sizes, one being up to idx, the other being what's left over. Slices are split into
    /// subslices.
    fn split_at(self, idx: umem) -> (Option<Self>, Option<Self>)
    where
        Self: Sized;

    /// Returns the length of the data
    ///
    /// This is the length in terms of how many indexes can be used to split the data.
    fn length(&self) -> umem;
}

impl SplitAtIndex for umem {
    fn split_at(self, idx: umem) -> (Option<Self>, Option<Self>) {
        if idx == 0 {
            (None, Some(self))
        } else if self <= idx {
            (Some(self), None)
        } else {
            (Some(idx), Some(self - idx))
        }
    }

    fn length(&self) -> umem {
        *self
    }
}

impl<T> SplitAtIndex for &[T] {
    fn split_at(self, idx: umem) -> (Option<Self>, Option<Self>) {
        let (left, right) = (*self).split_at(core::cmp::min(self.len(), clamp_to_usize(idx)));
        (
            if left.is_empty() { None } else { Some(left) },
            if right.is_empty() { None } else { Some(right) },
        )
    }

    fn length(&self) -> umem {
        self.len() as umem
    }
}

impl<T> SplitAtIndex for &mut [T] {
    fn split_at(self, idx: umem) -> (Option<Self>, Option<Self>) {
        let mid = core::cmp::min(self.len(), clamp_to_usize(idx));
        let (left, right) = self.split_at_mut(mid);
        (
            if left.is_empty() { None } else { Some(left) },
            if right.is_empty() { None } else { Some(right) },
        )
    }

    fn length(&self) -> umem {
        self.len() as umem
    }
}

pub struct PageChunkIterator<T: SplitAtIndex> {
    v: Option<T>,
    cur_address: Address,
    page_size: umem,
}

impl<T: SplitAtIndex> PageChunkIterator<T> {
    pub fn new(buf: T, start_address: Address, page_size: usize) -> Self {
        Self {
            v: if buf.length() == 0 { None } else { Some(buf) },
            cur_address: start_address,
            page_size: page_size as umem,
        }
    }
}

impl<T: SplitAtIndex> Iterator for PageChunkIterator<T> {
    type Item = (Address, T);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let buf = self.v.take()?;

        // bytes left until the next page boundary
        let page_offset = self.cur_address.to_umem() & (self.page_size - 1);
        let end_len = self.page_size - page_offset;

        let (head, tail) = buf.split_at(end_len);
        let head = head?;

        self.v = tail;
        let ret = (self.cur_address, head);
        self.cur_address = Address::from(self.cur_address.to_umem().wrapping_add(end_len));
        Some(ret)
    }
}

#[cfg(test)]
mod tests {
    use crate::iter::PageChunks;
    use crate::types::{umem, Address};

    const PAGE_SIZE: usize = 0x1000;

    #[test]
    fn chunks_aligned() {
        let buf = vec![0_u8; PAGE_SIZE * 3];
        let chunks = buf
            .as_slice()
            .page_chunks(0x4000.into(), PAGE_SIZE)
            .map(|(addr, chunk)| (addr, chunk.len()))
            .collect::<Vec<_>>();

        assert_eq!(
            chunks,
            vec![
                (Address::from(0x4000), PAGE_SIZE),
                (Address::from(0x5000), PAGE_SIZE),
                (Address::from(0x6000), PAGE_SIZE),
            ]
        );
    }

    #[test]
    fn chunks_page_crossing() {
        let buf = [0_u8; 8];
        let chunks = buf
            .as_slice()
            .page_chunks(0x0FFE.into(), PAGE_SIZE)
            .map(|(addr, chunk)| (addr, chunk.len()))
            .collect::<Vec<_>>();

        assert_eq!(
            chunks,
            vec![(Address::from(0x0FFE), 2), (Address::from(0x1000), 6)]
        );
    }

    #[test]
    fn chunks_misaligned() {
        // Misaligned buffer length and starting address
        let buffer = vec![0; 0x1492];
        let page_count = buffer.as_slice().page_chunks(0x2c4.into(), 0x100).count();

        assert_eq!(buffer.len() / 0x100, 20);
        assert_eq!(page_count, 22);
    }

    #[test]
    fn chunks_len() {
        let chunks = (0x20 as umem)
            .page_chunks(0x1ff0.into(), PAGE_SIZE)
            .collect::<Vec<_>>();
        assert_eq!(
            chunks,
            vec![(Address::from(0x1ff0), 0x10), (Address::from(0x2000), 0x10)]
        );
    }

    #[test]
    fn chunks_mut() {
        let mut buf = [0_u8; 0x20];
        for (addr, chunk) in buf.as_mut_slice().page_chunks(0x10.into(), 0x10) {
            chunk.fill(addr.to_umem() as u8);
        }
        assert!(buf[..0x10].iter().all(|&b| b == 0x10));
        assert!(buf[0x10..].iter().all(|&b| b == 0x20));
    }

    #[test]
    fn chunks_empty() {
        let buf: [u8; 0] = [];
        assert_eq!(buf.as_slice().page_chunks(0x1000.into(), PAGE_SIZE).count(), 0);
    }
}
