//! QPSK constellation — mapping and hard decision
//!
//! The four constellation points sit at `±0.707 ± 0.707j` (unit energy),
//! indexed counterclockwise starting in the first quadrant:
//!
//! ```text
//!        im
//!   1 *   |   * 0        0: +0.707 +0.707j
//!  -------+------- re    1: -0.707 +0.707j
//!   2 *   |   * 3        2: -0.707 -0.707j
//!                        3: +0.707 -0.707j
//! ```
//!
//! Because the indices follow angular order, a constellation rotation by
//! 90° maps index `k` to `(k + 1) mod 4` — a constant additive offset
//! that the differential decoder cancels.

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::{Complex, DspResult};
use std::f64::consts::FRAC_1_SQRT_2;

/// QPSK constellation with angular index mapping and hard decision.
#[derive(Debug, Clone)]
pub struct QpskConstellation {
    points: [Complex; 4],
}

impl Default for QpskConstellation {
    fn default() -> Self {
        Self::new()
    }
}

impl QpskConstellation {
    /// The standard unit-energy QPSK constellation.
    pub fn new() -> Self {
        let a = FRAC_1_SQRT_2;
        Self {
            points: [
                Complex::new(a, a),
                Complex::new(-a, a),
                Complex::new(-a, -a),
                Complex::new(a, -a),
            ],
        }
    }

    /// Constellation point for an angular index (0..4).
    #[inline]
    pub fn point(&self, index: u8) -> Complex {
        self.points[(index & 3) as usize]
    }

    /// All four points in index order.
    pub fn points(&self) -> &[Complex; 4] {
        &self.points
    }

    /// Nearest-point hard decision, returning the angular index.
    ///
    /// For QPSK the nearest point is determined by the signs of the two
    /// components, so no distance computation is needed. Ties on an axis
    /// resolve toward the positive half-plane; a zero sample decides to
    /// index 0 rather than failing.
    #[inline]
    pub fn decide(&self, sample: Complex) -> u8 {
        match (sample.re >= 0.0, sample.im >= 0.0) {
            (true, true) => 0,
            (false, true) => 1,
            (false, false) => 2,
            (true, false) => 3,
        }
    }

    /// Decide a block of samples.
    pub fn decide_block(&self, samples: &[Complex]) -> Vec<u8> {
        samples.iter().map(|&s| self.decide(s)).collect()
    }

    /// Constant modulus of the constellation (1.0 for unit-energy QPSK).
    pub fn modulus(&self) -> f64 {
        1.0
    }
}

/// Streaming hard-decision block: complex symbols in, angular indices out.
#[derive(Debug, Clone, Default)]
pub struct ConstellationDecoder {
    constellation: QpskConstellation,
}

impl ConstellationDecoder {
    /// Create a decision block for the standard QPSK constellation.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Block for ConstellationDecoder {
    fn name(&self) -> &str {
        "constellation_decoder"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Complex]
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
        let samples = inputs[0].complex().pop(n);
        let indices = self.constellation.decide_block(&samples);
        outputs[0].bytes().push_slice(&indices);
        Ok(WorkState::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_points_have_unit_energy() {
        let c = QpskConstellation::new();
        for i in 0..4 {
            assert_relative_eq!(c.point(i).norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_decision_recovers_index() {
        let c = QpskConstellation::new();
        for i in 0..4 {
            assert_eq!(c.decide(c.point(i)), i);
        }
    }

    #[test]
    fn test_decision_with_noise_margin() {
        let c = QpskConstellation::new();
        for i in 0..4u8 {
            let noisy = c.point(i) + Complex::new(0.2, -0.15);
            // Small perturbations stay in the same quadrant.
            assert_eq!(c.decide(noisy), i);
        }
    }

    #[test]
    fn test_rotation_by_quarter_turn_shifts_index() {
        let c = QpskConstellation::new();
        let rot = Complex::new(0.0, 1.0); // +90 degrees
        for i in 0..4u8 {
            assert_eq!(c.decide(c.point(i) * rot), (i + 1) % 4);
        }
    }

    #[test]
    fn test_zero_sample_does_not_panic() {
        let c = QpskConstellation::new();
        assert_eq!(c.decide(Complex::new(0.0, 0.0)), 0);
    }
}
