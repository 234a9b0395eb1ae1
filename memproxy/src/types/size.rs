//! Byte size helpers for buffer and page sizes.
use super::umem;

/// `kb` kibibytes in bytes.
pub const fn kb(kb: umem) -> umem {
    kb << 10
}

/// `mb` mebibytes in bytes.
pub const fn mb(mb: umem) -> umem {
    mb << 20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(kb(4), 0x1000);
        assert_eq!(mb(2), 0x20_0000);
    }
}
