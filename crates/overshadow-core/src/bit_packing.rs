//! Bit packing and unpacking
//!
//! Conversions between packed bytes and K-bit-per-byte streams, MSB first.
//! The whole chain uses one bit-ordering convention: the most significant
//! bits of a byte come out first, and go back in first. The modulator, the
//! decoder and the bit-error reference paths all share these blocks, so a
//! mismatch cannot arise.
//!
//! ## Example
//!
//! ```rust
//! use overshadow_core::bit_packing::{PackKBits, UnpackKBits};
//!
//! let bits = UnpackKBits::new(8).unpack(&[0b1100_0110]);
//! assert_eq!(bits, vec![1, 1, 0, 0, 0, 1, 1, 0]);
//! let packed = PackKBits::new(8).pack(&bits);
//! assert_eq!(packed, vec![0b1100_0110]);
//! ```

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::DspResult;

/// Unpack each input byte into K output bytes holding one field each,
/// MSB first. With K=8 this turns packed bytes into a bit stream; with
/// K=2 it is used on already-unpacked dibit streams.
#[derive(Debug, Clone)]
pub struct UnpackKBits {
    k: usize,
}

impl UnpackKBits {
    /// Create an unpacker emitting K single-bit bytes per input byte.
    pub fn new(k: usize) -> Self {
        assert!(k > 0 && k <= 8, "K must be 1..=8");
        Self { k }
    }

    /// Unpack a buffer of bytes into bits (one bit per output byte).
    pub fn unpack(&self, input: &[u8]) -> Vec<u8> {
        let mut output = Vec::with_capacity(input.len() * self.k);
        for &byte in input {
            for i in 0..self.k {
                output.push((byte >> (self.k - 1 - i)) & 1);
            }
        }
        output
    }

    /// Get K.
    pub fn k(&self) -> usize {
        self.k
    }
}

/// Pack groups of K single-bit bytes into one output byte, MSB first.
///
/// Input length is expected to be a multiple of K; a trailing partial
/// group stays buffered (streaming) or is zero-padded (slice API).
#[derive(Debug, Clone)]
pub struct PackKBits {
    k: usize,
    /// Partial group carried across streaming calls.
    pending: Vec<u8>,
}

impl PackKBits {
    /// Create a packer grouping K bits into each output byte.
    pub fn new(k: usize) -> Self {
        assert!(k > 0 && k <= 8, "K must be 1..=8");
        Self {
            k,
            pending: Vec::new(),
        }
    }

    /// Pack a complete buffer. A trailing partial group is zero-padded.
    pub fn pack(&self, input: &[u8]) -> Vec<u8> {
        let mut output = Vec::with_capacity((input.len() + self.k - 1) / self.k);
        for chunk in input.chunks(self.k) {
            let mut byte = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                byte |= (bit & 1) << (self.k - 1 - i);
            }
            output.push(byte);
        }
        output
    }

    /// Streaming pack: only whole groups are emitted; a trailing partial
    /// group is held for the next call.
    pub fn pack_stream(&mut self, input: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(input);
        let whole = self.pending.len() / self.k * self.k;
        let ready: Vec<u8> = self.pending.drain(..whole).collect();
        self.pack(&ready)
    }

    /// Get K.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Drop any buffered partial group.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Unpack a byte into its four dibits, MSB first.
#[inline]
pub fn byte_to_dibits(byte: u8) -> [u8; 4] {
    [
        (byte >> 6) & 3,
        (byte >> 4) & 3,
        (byte >> 2) & 3,
        byte & 3,
    ]
}

/// Pack four dibits (MSB first) back into a byte.
#[inline]
pub fn dibits_to_byte(dibits: &[u8; 4]) -> u8 {
    ((dibits[0] & 3) << 6) | ((dibits[1] & 3) << 4) | ((dibits[2] & 3) << 2) | (dibits[3] & 3)
}

impl Block for UnpackKBits {
    fn name(&self) -> &str {
        "unpack_k_bits"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let n = inputs[0].available().min(outputs[0].free() / self.k);
        if n == 0 {
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        let bytes = inputs[0].bytes().pop(n);
        let bits = self.unpack(&bytes);
        outputs[0].bytes().push_slice(&bits);
        Ok(WorkState::Progress)
    }
}

impl Block for PackKBits {
    fn name(&self) -> &str {
        "pack_k_bits"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let n = inputs[0].available().min(outputs[0].free() * self.k);
        if n == 0 {
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        let bits = inputs[0].bytes().pop(n);
        let packed = self.pack_stream(&bits);
        outputs[0].bytes().push_slice(&packed);
        // Consuming a partial group is still progress.
        Ok(WorkState::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_pack_roundtrip() {
        let data: Vec<u8> = (0..=255).collect();
        let bits = UnpackKBits::new(8).unpack(&data);
        assert_eq!(bits.len(), 256 * 8);
        let packed = PackKBits::new(8).pack(&bits);
        assert_eq!(packed, data);
    }

    #[test]
    fn test_msb_first_order() {
        let bits = UnpackKBits::new(8).unpack(&[0b1000_0001]);
        assert_eq!(bits[0], 1);
        assert_eq!(bits[7], 1);
        assert!(bits[1..7].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_dibit_helpers() {
        assert_eq!(byte_to_dibits(0b11_01_00_10), [3, 1, 0, 2]);
        assert_eq!(dibits_to_byte(&[3, 1, 0, 2]), 0b11_01_00_10);
        for byte in 0..=255u8 {
            assert_eq!(dibits_to_byte(&byte_to_dibits(byte)), byte);
        }
    }

    #[test]
    fn test_pack_stream_holds_partial_group() {
        let mut packer = PackKBits::new(8);
        let out = packer.pack_stream(&[1, 0, 1]);
        assert!(out.is_empty());
        let out = packer.pack_stream(&[0, 0, 0, 0, 1]);
        assert_eq!(out, vec![0b1010_0001]);
    }

    #[test]
    fn test_unpack_dibits() {
        let dibits = UnpackKBits::new(2).unpack(&[3, 1]);
        assert_eq!(dibits, vec![1, 1, 0, 1]);
    }
}
