//! Packet pattern source
//!
//! The collision mask for the masked-encoder path: a fixed 3072-byte
//! sequence `[0]*(1024-p) + [1]*(1024+2p) + [0]*(1024-p)` marking which
//! positions of a nominal 1024-byte packet the attacker controls. The
//! padding `p` widens the ones segment symmetrically; the total length
//! never changes.

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::{DspError, DspResult};

/// Nominal packet length in bytes.
pub const PACKET_LEN: usize = 1024;

/// Total pattern length: three packet slots.
pub const PATTERN_LEN: usize = 3 * PACKET_LEN;

/// The zero/one collision pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketPattern {
    padding: usize,
    data: Vec<u8>,
}

impl PacketPattern {
    /// Build the pattern for a padding value.
    ///
    /// Fails with `InvalidParameter` if `padding > 1024`, which would
    /// make the zero segments negative.
    pub fn new(padding: usize) -> DspResult<Self> {
        if padding > PACKET_LEN {
            return Err(DspError::invalid(format!(
                "packet pattern: padding {padding} exceeds packet length {PACKET_LEN}"
            )));
        }
        let zeros = PACKET_LEN - padding;
        let ones = PACKET_LEN + 2 * padding;
        let mut data = Vec::with_capacity(PATTERN_LEN);
        data.extend(std::iter::repeat(0u8).take(zeros));
        data.extend(std::iter::repeat(1u8).take(ones));
        data.extend(std::iter::repeat(0u8).take(zeros));
        debug_assert_eq!(data.len(), PATTERN_LEN);
        Ok(Self { padding, data })
    }

    /// The pattern bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pattern length (always 3072).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Never true; kept for the conventional pair with `len`.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The padding this pattern was built with.
    pub fn padding(&self) -> usize {
        self.padding
    }
}

/// Repeating source replaying a `PacketPattern` indefinitely.
#[derive(Debug, Clone)]
pub struct PatternSource {
    pattern: PacketPattern,
    pos: usize,
}

impl PatternSource {
    /// Create a source over the given pattern.
    pub fn new(pattern: PacketPattern) -> Self {
        Self { pattern, pos: 0 }
    }

    /// Produce up to `max_count` bytes, wrapping to the start on
    /// exhaustion.
    pub fn next_bytes(&mut self, max_count: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(max_count);
        let data = self.pattern.as_bytes();
        while out.len() < max_count {
            let take = (max_count - out.len()).min(data.len() - self.pos);
            out.extend_from_slice(&data[self.pos..self.pos + take]);
            self.pos = (self.pos + take) % data.len();
        }
        out
    }

    /// Regenerate the pattern for a new padding value.
    ///
    /// Fails with `InvalidParameter` (and leaves the current pattern in
    /// place) if the padding is out of range. Restarts replay from the
    /// pattern head.
    pub fn set_padding(&mut self, padding: usize) -> DspResult<()> {
        self.pattern = PacketPattern::new(padding)?;
        self.pos = 0;
        Ok(())
    }

    /// The active pattern.
    pub fn pattern(&self) -> &PacketPattern {
        &self.pattern
    }

    /// Restart replay from the pattern head.
    pub fn reset(&mut self) {
        self.pos = 0;
    }
}

impl Block for PatternSource {
    fn name(&self) -> &str {
        "pattern_source"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte]
    }

    fn work(
        &mut self,
        _inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let n = outputs[0].free();
        if n == 0 {
            return Ok(WorkState::Starved);
        }
        let bytes = self.next_bytes(n);
        outputs[0].bytes().push_slice(&bytes);
        Ok(WorkState::Progress)
    }
}
