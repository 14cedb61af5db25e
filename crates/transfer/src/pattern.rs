//! Deterministic test pattern and byte-wise verification.

/// First byte where two buffers differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mismatch {
    /// Offset from the start of the buffers.
    pub offset: usize,
    /// Byte in the reference buffer.
    pub expected: u8,
    /// Byte in the buffer under test.
    pub actual: u8,
}

/// Pattern byte at `offset`: the low byte of `base + offset`.
// truncation to the low byte is the pattern definition
#[allow(clippy::cast_possible_truncation)]
pub fn byte_at(base: u32, offset: usize) -> u8 {
    base.wrapping_add(offset as u32) as u8
}

/// Fill `buf` with the pattern starting at `base`.
pub fn fill(buf: &mut [u8], base: u32) {
    for (offset, byte) in buf.iter_mut().enumerate() {
        *byte = byte_at(base, offset);
    }
}

/// Compare `expected` and `actual` over their common length.
///
/// A length difference counts as a mismatch at the shorter length, with the
/// missing byte reported as zero.
pub fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<Mismatch> {
    let found = expected
        .iter()
        .zip(actual)
        .enumerate()
        .find(|(_, (e, a))| e != a)
        .map(|(offset, (&expected, &actual))| Mismatch {
            offset,
            expected,
            actual,
        });
    if found.is_some() || expected.len() == actual.len() {
        return found;
    }
    let offset = expected.len().min(actual.len());
    Some(Mismatch {
        offset,
        expected: expected.get(offset).copied().unwrap_or(0),
        actual: actual.get(offset).copied().unwrap_or(0),
    })
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_starts_at_low_byte_of_base() {
        let mut buf = [0u8; 16];
        fill(&mut buf, 0xB5F3_A5F3);
        assert_eq!(&buf[..4], &[0xF3, 0xF4, 0xF5, 0xF6]);
        assert_eq!(buf[13], 0x00, "wraps at 256");
    }

    #[test]
    fn test_identical_buffers_match() {
        let mut a = [0u8; 300];
        fill(&mut a, 7);
        let b = a;
        assert_eq!(first_mismatch(&a, &b), None);
    }

    #[test]
    fn test_first_difference_is_reported() {
        let mut a = [0u8; 64];
        fill(&mut a, 0);
        let mut b = a;
        b[40] = 0xEE;
        b[50] = 0xEE;
        assert_eq!(
            first_mismatch(&a, &b),
            Some(Mismatch {
                offset: 40,
                expected: 40,
                actual: 0xEE
            })
        );
    }

    #[test]
    fn test_short_buffer_mismatches_at_its_end() {
        let a = [1u8, 2, 3];
        assert_eq!(
            first_mismatch(&a, &a[..2]),
            Some(Mismatch {
                offset: 2,
                expected: 3,
                actual: 0
            })
        );
    }
}
