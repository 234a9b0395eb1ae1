/*!
Special purpose iterators for memproxy.
*/

mod page_chunks;
use crate::types::Address;
pub use page_chunks::*;

pub trait PageChunks {
    /// Create a page aligned chunk iterator
    ///
    /// This function is useful when there is a need to work with buffers
    /// without crossing page boundaries, while the buffer itself may not
    /// be page aligned
    ///
    /// # Arguments
    ///
    /// * `start_address` - starting address of the remote buffer
    /// * `page_size` - size of a single page, has to be a power of two
    ///
    /// # Examples
    ///
    /// ```
    /// use memproxy::iter::PageChunks;
    ///
    /// // Misaligned buffer length
    /// let buffer = vec![0; 0x1492];
    /// const PAGE_SIZE: usize = 0x100;
    ///
    /// // Misaligned starting address. Get the number of pages the buffer touches
    /// let page_count = buffer
    ///     .as_slice()
    ///     .page_chunks(0x2c4.into(), PAGE_SIZE)
    ///     .count();
    ///
    /// assert_eq!(buffer.len() / PAGE_SIZE, 20);
    /// assert_eq!(page_count, 22);
    /// ```
    fn page_chunks(self, start_address: Address, page_size: usize) -> PageChunkIterator<Self>
    where
        Self: SplitAtIndex + Sized,
    {
        PageChunkIterator::new(self, start_address, page_size)
    }
}

impl<T> PageChunks for T where T: SplitAtIndex {}
