//! Multiply-by-constant block
//!
//! Applies a fixed complex gain to a sample stream. Gains configured in
//! dB convert through `10^(dB/20)`, so +6.02 dB doubles the linear
//! multiplier.

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::{Complex, DspResult};

/// Convert a dB gain value to a linear voltage multiplier.
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Multiply every complex sample by a fixed constant.
#[derive(Debug, Clone)]
pub struct MultiplyConst {
    constant: Complex,
}

impl MultiplyConst {
    /// Create with a complex constant.
    pub fn new(constant: Complex) -> Self {
        Self { constant }
    }

    /// Create from a real linear gain.
    pub fn from_real(gain: f64) -> Self {
        Self {
            constant: Complex::new(gain, 0.0),
        }
    }

    /// Create from a gain in dB.
    pub fn from_db(gain_db: f64) -> Self {
        Self::from_real(db_to_linear(gain_db))
    }

    /// Process a block of samples.
    pub fn process_block(&self, input: &[Complex]) -> Vec<Complex> {
        input.iter().map(|&s| s * self.constant).collect()
    }

    /// Get the constant.
    pub fn constant(&self) -> Complex {
        self.constant
    }

    /// Set a new constant; takes effect on the next processed sample.
    pub fn set_constant(&mut self, constant: Complex) {
        self.constant = constant;
    }
}

impl Block for MultiplyConst {
    fn name(&self) -> &str {
        "multiply_const"
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
        let samples = inputs[0].complex().pop(n);
        let scaled = self.process_block(&samples);
        outputs[0].complex().push_slice(&scaled);
        Ok(WorkState::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_db_to_linear_zero_is_unity() {
        assert_relative_eq!(db_to_linear(0.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_six_db_doubles_gain() {
        assert_relative_eq!(db_to_linear(6.02), 2.0, epsilon = 1e-3);
        assert_relative_eq!(db_to_linear(20.0), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gain_applies() {
        let mc = MultiplyConst::from_db(6.02);
        let out = mc.process_block(&[Complex::new(1.0, -2.0)]);
        assert_relative_eq!(out[0].re, 2.0, epsilon = 1e-3);
        assert_relative_eq!(out[0].im, -4.0, epsilon = 1e-2);
    }

    #[test]
    fn test_set_constant() {
        let mut mc = MultiplyConst::from_real(1.0);
        mc.set_constant(Complex::new(0.5, 0.0));
        let out = mc.process_block(&[Complex::new(4.0, 0.0)]);
        assert_relative_eq!(out[0].re, 2.0, epsilon = 1e-12);
    }
}
