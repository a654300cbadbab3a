//! Costas loop — decision-directed carrier recovery
//!
//! Tracks and removes residual carrier frequency and phase offset from
//! the symbol stream. The order-4 phase detector works on modulated QPSK
//! data, so no pilot is needed; whatever 90°-multiple ambiguity the loop
//! settles into is cancelled later by the differential decoder.
//!
//! ## Example
//!
//! ```rust
//! use overshadow_core::costas_loop::{CostasLoop, CostasConfig};
//! use num_complex::Complex64;
//! use std::f64::consts::PI;
//!
//! let mut costas = CostasLoop::new(CostasConfig::default());
//! for i in 0..400 {
//!     let phase = PI / 4.0 + 0.02 * i as f64;
//!     costas.process_sample(Complex64::new(phase.cos(), phase.sin()));
//! }
//! // The loop converges toward the 0.02 rad/sample offset.
//! assert!((costas.frequency() - 0.02).abs() < 0.01);
//! ```

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::{Complex, DspResult};
use std::f64::consts::PI;

/// Costas loop configuration.
#[derive(Debug, Clone)]
pub struct CostasConfig {
    /// Normalized loop bandwidth. The receiver default mirrors the
    /// classic `2π/100`.
    pub loop_bw: f64,
    /// Damping factor; 0.707 is critically damped.
    pub damping: f64,
    /// Frequency clamp in radians/sample.
    pub max_freq: f64,
}

impl Default for CostasConfig {
    fn default() -> Self {
        Self {
            loop_bw: 2.0 * PI / 100.0,
            damping: 0.707,
            max_freq: 1.0,
        }
    }
}

/// QPSK Costas phase-locked loop.
///
/// ```text
/// input → [×exp(−jθ)] → corrected output
///              ↑               ↓
///        phase/freq ← PI filter ← order-4 detector
/// ```
#[derive(Debug, Clone)]
pub struct CostasLoop {
    phase: f64,
    freq: f64,
    /// Proportional gain.
    alpha: f64,
    /// Integral gain.
    beta: f64,
    max_freq: f64,
    last_error: f64,
}

impl CostasLoop {
    /// Create a loop from the configuration.
    pub fn new(config: CostasConfig) -> Self {
        let omega_n = config.loop_bw / (config.damping + 1.0 / (4.0 * config.damping));
        Self {
            phase: 0.0,
            freq: 0.0,
            alpha: 2.0 * config.damping * omega_n,
            beta: omega_n * omega_n,
            max_freq: config.max_freq,
            last_error: 0.0,
        }
    }

    /// Create with an explicit loop bandwidth, default damping.
    pub fn with_loop_bw(loop_bw: f64) -> Self {
        Self::new(CostasConfig {
            loop_bw,
            ..Default::default()
        })
    }

    /// Process one symbol-rate sample; returns the de-rotated sample.
    #[inline]
    pub fn process_sample(&mut self, input: Complex) -> Complex {
        let correction = Complex::from_polar(1.0, -self.phase);
        let corrected = input * correction;

        // Order-4 detector: error = sgn(re(y))·im(y) − sgn(im(y))·re(y).
        // Zero when the constellation sits on the ±45° family, which is
        // where the quadrant decision wants it.
        let sgn_re = if corrected.re >= 0.0 { 1.0 } else { -1.0 };
        let sgn_im = if corrected.im >= 0.0 { 1.0 } else { -1.0 };
        let error = sgn_re * corrected.im - sgn_im * corrected.re;
        self.last_error = error;

        self.freq += self.beta * error;
        self.freq = self.freq.clamp(-self.max_freq, self.max_freq);
        self.phase += self.freq + self.alpha * error;
        while self.phase > PI {
            self.phase -= 2.0 * PI;
        }
        while self.phase < -PI {
            self.phase += 2.0 * PI;
        }

        corrected
    }

    /// Process a block of samples.
    pub fn process_block(&mut self, input: &[Complex]) -> Vec<Complex> {
        input.iter().map(|&s| self.process_sample(s)).collect()
    }

    /// Current phase estimate in radians.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Current frequency estimate in radians/sample.
    pub fn frequency(&self) -> f64 {
        self.freq
    }

    /// Last phase-detector error.
    pub fn phase_error(&self) -> f64 {
        self.last_error
    }

    /// Seed the frequency estimate.
    pub fn set_frequency(&mut self, freq: f64) {
        self.freq = freq;
    }

    /// Reconfigure the loop bandwidth; takes effect on the next sample.
    pub fn set_loop_bandwidth(&mut self, loop_bw: f64) {
        let damping = 0.707;
        let omega_n = loop_bw / (damping + 1.0 / (4.0 * damping));
        self.alpha = 2.0 * damping * omega_n;
        self.beta = omega_n * omega_n;
    }

    /// Reset phase and frequency estimates.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.freq = 0.0;
        self.last_error = 0.0;
    }
}

impl Block for CostasLoop {
    fn name(&self) -> &str {
        "costas_loop"
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
        let out = self.process_block(&samples);
        outputs[0].complex().push_slice(&out);
        Ok(WorkState::Progress)
    }
}
