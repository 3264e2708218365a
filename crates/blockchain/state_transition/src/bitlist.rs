//! Helper operations over SSZ bitlists.
//!
//! `ssz_types::BitList` carries the wire representation (LSB-first bits
//! with a sentinel bit marking the length; the empty list is the single
//! byte 0x01). It has no append, so growth goes through
//! `with_capacity` + `union`, which preserves existing bits and zeroes
//! the new tail.

use ssz_types::{BitList, typenum::Unsigned};

/// Returns a new bitlist with `bit` appended after the existing bits.
pub fn append<N: Unsigned + Clone>(bl: &BitList<N>, bit: bool) -> BitList<N> {
    let grown = BitList::<N>::with_capacity(bl.len() + 1).expect("bitlist limit exceeded");
    let mut out = bl.union(&grown);
    out.set(bl.len(), bit).expect("index within capacity");
    out
}

/// Returns a bitlist of at least `new_len` bits, padding with zeros.
pub fn extend_to<N: Unsigned + Clone>(bl: &BitList<N>, new_len: usize) -> BitList<N> {
    if new_len <= bl.len() {
        return bl.clone();
    }
    let grown = BitList::<N>::with_capacity(new_len).expect("bitlist limit exceeded");
    bl.union(&grown)
}

/// Reads the bit at `index`; out-of-range reads return `false`.
pub fn get<N: Unsigned + Clone>(bl: &BitList<N>, index: usize) -> bool {
    bl.get(index).unwrap_or(false)
}

/// Sets the bit at `index` in place; out-of-range writes are a no-op.
pub fn set<N: Unsigned + Clone>(bl: &mut BitList<N>, index: usize, value: bool) {
    if index < bl.len() {
        bl.set(index, value).expect("index in range");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rean_types::primitives::ssz::Encode;
    use rean_types::state::JustifiedSlots;

    #[test]
    fn empty_bitlist_is_single_sentinel_byte() {
        let bl = JustifiedSlots::with_capacity(0).unwrap();
        assert_eq!(bl.as_ssz_bytes(), vec![0x01]);
        assert_eq!(bl.len(), 0);
    }

    #[test]
    fn append_roundtrip() {
        // Appending a sequence of bits and reading them back must
        // reproduce the sequence, and length must track the appends.
        let pattern = [true, false, true, true, false, false, true, false, true];
        let mut bl = JustifiedSlots::with_capacity(0).unwrap();
        for bit in pattern {
            bl = append(&bl, bit);
        }
        assert_eq!(bl.len(), pattern.len());
        for (i, bit) in pattern.iter().enumerate() {
            assert_eq!(get(&bl, i), *bit, "bit {i}");
        }
    }

    #[test]
    fn append_keeps_sentinel_encoding() {
        let mut bl = JustifiedSlots::with_capacity(0).unwrap();
        bl = append(&bl, true);
        // data bit 0 set, sentinel at bit 1: 0b0000_0011
        assert_eq!(bl.as_ssz_bytes(), vec![0b0000_0011]);

        for _ in 0..7 {
            bl = append(&bl, false);
        }
        // 8 data bits now; sentinel moves into the second byte.
        assert_eq!(bl.len(), 8);
        assert_eq!(bl.as_ssz_bytes(), vec![0b0000_0001, 0b0000_0001]);
    }

    #[test]
    fn out_of_range_get_is_false() {
        let bl = append(&JustifiedSlots::with_capacity(0).unwrap(), true);
        assert!(!get(&bl, 100));
    }

    #[test]
    fn out_of_range_set_is_noop() {
        let mut bl = append(&JustifiedSlots::with_capacity(0).unwrap(), true);
        set(&mut bl, 100, true);
        assert_eq!(bl.len(), 1);
    }

    #[test]
    fn extend_to_pads_with_zeros() {
        let bl = append(&JustifiedSlots::with_capacity(0).unwrap(), true);
        let extended = extend_to(&bl, 5);
        assert_eq!(extended.len(), 5);
        assert!(get(&extended, 0));
        for i in 1..5 {
            assert!(!get(&extended, i));
        }
        // Extending to a shorter length changes nothing.
        assert_eq!(extend_to(&extended, 3).len(), 5);
    }
}
