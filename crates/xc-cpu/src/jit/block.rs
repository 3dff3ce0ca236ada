//! Compiled blocks

use xc_memory::Bus;

use crate::opcodes::Opcode;

use super::hooks::BlockFn;

/// One instruction of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOp {
    pub word: u32,
    pub op: Opcode,
    /// Lowered to native code rather than a call into the interpreter
    pub native: bool,
}

/// A straight-line run of instructions within one page
pub struct Block {
    pub start_ea: u64,
    pub start_ra: u64,
    pub ops: Vec<BlockOp>,
    /// Checksum of the source words at compile time
    pub checksum: u64,
    /// Generated code; `None` runs every op through its handler
    pub entry: Option<BlockFn>,
}

impl Block {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Byte length of the guest code the block covers
    pub fn byte_len(&self) -> u64 {
        self.ops.len() as u64 * 4
    }

    pub fn native_count(&self) -> usize {
        self.ops.iter().filter(|op| op.native).count()
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over the big-endian bytes of `words`
pub fn checksum(words: impl IntoIterator<Item = u32>) -> u64 {
    words.into_iter().flat_map(u32::to_be_bytes).fold(FNV_OFFSET, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
    })
}

/// Read `count` instruction words starting at real address `ra`
pub fn read_words(bus: &dyn Bus, ra: u64, count: usize) -> impl Iterator<Item = u32> + '_ {
    (0..count as u64).map(move |i| bus.read_be32(ra + i * 4).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_known_values() {
        // FNV-1a of no input is the offset basis
        assert_eq!(checksum([]), FNV_OFFSET);
        assert_eq!(checksum([0x6000_0000]), checksum([0x6000_0000]));
    }

    #[test]
    fn test_checksum_detects_single_word_change() {
        let a = checksum([0x3860_0001, 0x3880_0002, 0x4E80_0020]);
        let b = checksum([0x3860_0001, 0x3880_0003, 0x4E80_0020]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_checksum_is_order_sensitive() {
        assert_ne!(checksum([1, 2]), checksum([2, 1]));
    }

    #[test]
    fn test_native_count() {
        let op = |native| BlockOp { word: 0x6000_0000, op: Opcode::Nop, native };
        let block = Block {
            start_ea: 0x1000,
            start_ra: 0x1000,
            ops: vec![op(true), op(false), op(true)],
            checksum: 0,
            entry: None,
        };
        assert_eq!(block.native_count(), 2);
        assert_eq!(block.byte_len(), 12);
    }
}
