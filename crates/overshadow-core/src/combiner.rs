//! Signal combination — the overshadowing event itself
//!
//! `Adder` sums two complex streams elementwise, modeling simultaneous
//! arrival of victim and attacker at the receiver front end. `Combiner`
//! bundles the usual arrangement: each branch gain-scaled from a dB
//! value, one branch optionally run through an integer delay first.

use crate::delay::ComplexDelay;
use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::multiply::db_to_linear;
use crate::types::{Complex, DspError, DspResult};

/// Elementwise sum of two complex streams.
///
/// Consumes in lock-step: output length per call is bounded by the
/// shorter input, so neither branch can run ahead.
#[derive(Debug, Clone, Default)]
pub struct Adder;

impl Adder {
    /// Create an adder.
    pub fn new() -> Self {
        Self
    }

    /// Sum two equal-length slices.
    pub fn process(a: &[Complex], b: &[Complex]) -> Vec<Complex> {
        a.iter().zip(b.iter()).map(|(&x, &y)| x + y).collect()
    }
}

impl Block for Adder {
    fn name(&self) -> &str {
        "add"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Complex, PortType::Complex]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![PortType::Complex]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let n = inputs[0]
            .available()
            .min(inputs[1].available())
            .min(outputs[0].free());
        if n == 0 {
            // Either branch ending ends the combined stream.
            if inputs[0].is_drained() || inputs[1].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        let a = inputs[0].complex().pop(n);
        let b = inputs[1].complex().pop(n);
        let sum = Self::process(&a, &b);
        outputs[0].complex().push_slice(&sum);
        Ok(WorkState::Progress)
    }
}

/// Two gain-scaled branches summed, with an optional integer delay on
/// the second branch.
///
/// Gains are configured in dB and applied as linear voltage multipliers
/// (`10^(dB/20)`). The delay models propagation-time mismatch between
/// the two transmitters; a negative delay is rejected at construction.
#[derive(Debug, Clone)]
pub struct Combiner {
    gain_a: f64,
    gain_b: f64,
    delay_b: Option<ComplexDelay>,
}

impl Combiner {
    /// Create a combiner from per-branch gains in dB and a delay (in
    /// samples) applied to branch B.
    pub fn new(gain_a_db: f64, gain_b_db: f64, delay_b: i64) -> DspResult<Self> {
        if delay_b < 0 {
            return Err(DspError::invalid(format!(
                "combiner: delay must be non-negative, got {delay_b}"
            )));
        }
        Ok(Self {
            gain_a: db_to_linear(gain_a_db),
            gain_b: db_to_linear(gain_b_db),
            delay_b: if delay_b > 0 {
                Some(ComplexDelay::new(delay_b as usize))
            } else {
                None
            },
        })
    }

    /// Linear gain applied to branch A.
    pub fn gain_a_linear(&self) -> f64 {
        self.gain_a
    }

    /// Linear gain applied to branch B.
    pub fn gain_b_linear(&self) -> f64 {
        self.gain_b
    }

    /// Combine two equal-length sample slices.
    pub fn process(&mut self, a: &[Complex], b: &[Complex]) -> Vec<Complex> {
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| {
                let y = match self.delay_b.as_mut() {
                    Some(d) => d.process(y),
                    None => y,
                };
                x * self.gain_a + y * self.gain_b
            })
            .collect()
    }
}

impl Block for Combiner {
    fn name(&self) -> &str {
        "combiner"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Complex, PortType::Complex]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![PortType::Complex]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let n = inputs[0]
            .available()
            .min(inputs[1].available())
            .min(outputs[0].free());
        if n == 0 {
            if inputs[0].is_drained() || inputs[1].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        let a = inputs[0].complex().pop(n);
        let b = inputs[1].complex().pop(n);
        let sum = self.process(&a, &b);
        outputs[0].complex().push_slice(&sum);
        Ok(WorkState::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_adder_sums() {
        let a = vec![Complex::new(1.0, 2.0), Complex::new(-1.0, 0.0)];
        let b = vec![Complex::new(0.5, -2.0), Complex::new(1.0, 1.0)];
        let sum = Adder::process(&a, &b);
        assert_relative_eq!(sum[0].re, 1.5, epsilon = 1e-12);
        assert_relative_eq!(sum[0].im, 0.0, epsilon = 1e-12);
        assert_relative_eq!(sum[1].re, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_combiner_negative_delay_rejected() {
        let err = Combiner::new(0.0, 0.0, -1).unwrap_err();
        assert!(matches!(err, DspError::InvalidParameter(_)));
    }

    #[test]
    fn test_combiner_gain_scaling() {
        // +6.02 dB on branch B doubles its contribution.
        let mut c = Combiner::new(0.0, 6.02, 0).unwrap();
        let out = c.process(&[Complex::new(1.0, 0.0)], &[Complex::new(1.0, 0.0)]);
        assert_relative_eq!(out[0].re, 3.0, epsilon = 1e-2);
        assert_relative_eq!(c.gain_b_linear() / c.gain_a_linear(), 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_combiner_delay_shifts_branch_b() {
        let mut c = Combiner::new(0.0, 0.0, 1).unwrap();
        let a = vec![Complex::new(10.0, 0.0), Complex::new(20.0, 0.0)];
        let b = vec![Complex::new(1.0, 0.0), Complex::new(2.0, 0.0)];
        let out = c.process(&a, &b);
        // First output sees only branch A (branch B delayed by one).
        assert_relative_eq!(out[0].re, 10.0, epsilon = 1e-12);
        assert_relative_eq!(out[1].re, 21.0, epsilon = 1e-12);
    }
}
