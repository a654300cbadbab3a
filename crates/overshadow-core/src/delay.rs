//! Integer sample delay
//!
//! Prepends `delay` zero samples to a stream, shifting it in time. Used
//! on the reference path to line transmitted bits up with the recovered
//! stream, and on a combiner branch to model propagation-time mismatch.

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::{Complex, DspResult};
use std::collections::VecDeque;

/// Byte-stream delay line.
#[derive(Debug, Clone)]
pub struct ByteDelay {
    buffer: VecDeque<u8>,
    delay: usize,
}

impl ByteDelay {
    /// Create a delay of `delay` samples.
    pub fn new(delay: usize) -> Self {
        let mut buffer = VecDeque::with_capacity(delay + 1);
        buffer.extend(std::iter::repeat(0u8).take(delay));
        Self { buffer, delay }
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, input: u8) -> u8 {
        self.buffer.push_back(input);
        self.buffer.pop_front().unwrap_or(0)
    }

    /// Process a block of samples.
    pub fn process_block(&mut self, input: &[u8]) -> Vec<u8> {
        input.iter().map(|&s| self.process(s)).collect()
    }

    /// Current delay in samples.
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Change the delay; resets the line to zeros.
    pub fn set_delay(&mut self, delay: usize) {
        self.delay = delay;
        self.reset();
    }

    /// Refill the line with zeros.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.buffer.extend(std::iter::repeat(0u8).take(self.delay));
    }
}

/// Complex-stream delay line.
#[derive(Debug, Clone)]
pub struct ComplexDelay {
    buffer: VecDeque<Complex>,
    delay: usize,
}

impl ComplexDelay {
    /// Create a delay of `delay` samples.
    pub fn new(delay: usize) -> Self {
        let mut buffer = VecDeque::with_capacity(delay + 1);
        buffer.extend(std::iter::repeat(Complex::new(0.0, 0.0)).take(delay));
        Self { buffer, delay }
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, input: Complex) -> Complex {
        self.buffer.push_back(input);
        self.buffer.pop_front().unwrap_or(Complex::new(0.0, 0.0))
    }

    /// Process a block of samples.
    pub fn process_block(&mut self, input: &[Complex]) -> Vec<Complex> {
        input.iter().map(|&s| self.process(s)).collect()
    }

    /// Current delay in samples.
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Refill the line with zeros.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.buffer
            .extend(std::iter::repeat(Complex::new(0.0, 0.0)).take(self.delay));
    }
}

impl Block for ByteDelay {
    fn name(&self) -> &str {
        "delay_b"
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
        let n = inputs[0].available().min(outputs[0].free());
        if n == 0 {
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        let items = inputs[0].bytes().pop(n);
        let delayed = self.process_block(&items);
        outputs[0].bytes().push_slice(&delayed);
        Ok(WorkState::Progress)
    }
}

impl Block for ComplexDelay {
    fn name(&self) -> &str {
        "delay_c"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Complex]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![PortType::Complex]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let n = inputs[0].available().min(outputs[0].free());
        if n == 0 {
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        let items = inputs[0].complex().pop(n);
        let delayed = self.process_block(&items);
        outputs[0].complex().push_slice(&delayed);
        Ok(WorkState::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_delay_prepends_zeros() {
        let mut d = ByteDelay::new(3);
        let out = d.process_block(&[7, 8, 9, 10]);
        assert_eq!(out, vec![0, 0, 0, 7]);
        let out = d.process_block(&[11]);
        assert_eq!(out, vec![8]);
    }

    #[test]
    fn test_zero_delay_is_passthrough() {
        let mut d = ByteDelay::new(0);
        assert_eq!(d.process_block(&[1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn test_set_delay_resets() {
        let mut d = ByteDelay::new(1);
        d.process_block(&[5, 6]);
        d.set_delay(2);
        assert_eq!(d.process_block(&[7, 8]), vec![0, 0]);
    }

    #[test]
    fn test_complex_delay() {
        let mut d = ComplexDelay::new(2);
        let out = d.process_block(&[Complex::new(1.0, 1.0)]);
        assert_eq!(out[0], Complex::new(0.0, 0.0));
        let out = d.process_block(&[Complex::new(2.0, 0.0), Complex::new(3.0, 0.0)]);
        assert_eq!(out[1], Complex::new(1.0, 1.0));
    }
}
