/// Hands out non-overlapping ranges of variable reference ids.
///
/// Every fresh execution context in the target asks for a block; the ids of
/// block `n` are `n * stride ..= n * stride + stride - 1`. Block 0 is never
/// handed out so that a reference of 0 keeps meaning "no children".
#[derive(Debug)]
pub struct RefBlocks {
    next_block: i64,
    stride: i64,
}

impl RefBlocks {
    pub fn new(stride: i64) -> Self {
        Self {
            next_block: 1,
            stride: stride.max(1),
        }
    }

    /// First id of a new block.
    pub fn allocate(&mut self) -> i64 {
        let base = self.next_block.saturating_mul(self.stride);
        self.next_block += 1;
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_never_overlap() {
        let mut refs = RefBlocks::new(65_536);
        assert_eq!(refs.allocate(), 65_536);
        assert_eq!(refs.allocate(), 131_072);
        assert_eq!(refs.allocate(), 196_608);
    }
}
