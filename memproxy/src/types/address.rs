/*!
Addresses in the memory of the foreign process.
*/

use std::fmt;

/// Width of addresses and lengths on the wire.
///
/// The remote peer always works with 64 bit values, independent of the host.
#[allow(non_camel_case_types)]
pub type umem = u64;

// every host length has to be representable on the wire
const _: [u8; (std::mem::size_of::<usize>() <= std::mem::size_of::<umem>()) as usize] = [0; 1];

/// Converts a wire length into a host length, saturating on 32 bit hosts.
pub const fn clamp_to_usize(val: umem) -> usize {
    if val > usize::MAX as umem {
        usize::MAX
    } else {
        val as usize
    }
}

/// An address in the foreign process.
///
/// Addresses are plain numbers, the proxy never dereferences them locally.
/// Formatting always produces lower case hex without a prefix.
#[repr(transparent)]
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(umem);

impl Address {
    /// The zero address, rejected by every host facing call.
    pub const NULL: Address = Address(0);

    #[inline]
    pub const fn null() -> Self {
        Address::NULL
    }

    /// # Examples
    ///
    /// ```
    /// use memproxy::types::Address;
    ///
    /// assert!(Address::null().is_null());
    /// assert!(!Address::from(0x1000u64).is_null());
    /// ```
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn to_umem(self) -> umem {
        self.0
    }

    /// Returns the base address of the page containing `self`.
    ///
    /// `page_size` has to be a power of two.
    ///
    /// # Examples
    ///
    /// ```
    /// use memproxy::types::{size, Address};
    ///
    /// let addr = Address::from(0x1234);
    /// assert_eq!(addr.as_page_aligned(size::kb(4) as usize), Address::from(0x1000));
    /// ```
    #[inline]
    pub const fn as_page_aligned(self, page_size: usize) -> Self {
        Address(self.0 & !((page_size as umem) - 1))
    }

    /// Returns the distance of `self` from the base of its page.
    ///
    /// `page_size` has to be a power of two.
    #[inline]
    pub const fn page_offset(self, page_size: usize) -> usize {
        (self.0 & ((page_size as umem) - 1)) as usize
    }

    /// Returns the address `len` bytes further, or `None` if the range wraps around.
    #[inline]
    pub const fn checked_add(self, len: umem) -> Option<Self> {
        match self.0.checked_add(len) {
            Some(end) => Some(Address(end)),
            None => None,
        }
    }
}

macro_rules! address_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Address {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self(value as umem)
                }
            }
        )*
    };
}

// i32 keeps bare integer literals usable with `.into()`
address_from!(u32, u64, usize, i32);

impl From<Address> for umem {
    #[inline]
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}
