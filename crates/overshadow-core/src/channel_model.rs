//! Channel model — unified propagation impairment block
//!
//! Applies, per sample: multipath FIR taps, carrier frequency offset,
//! fractional timing offset (`epsilon`) and additive white Gaussian
//! noise. Victim and attacker each get their own instance with an
//! independent noise seed, so the two noise realizations never
//! correlate. All parameters are live-tunable and take effect on the
//! next processed sample.
//!
//! ## Example
//!
//! ```rust
//! use overshadow_core::channel_model::{ChannelModel, ChannelModelConfig};
//! use num_complex::Complex64;
//!
//! let mut ch = ChannelModel::new(ChannelModelConfig {
//!     noise_voltage: 1e-4,
//!     ..Default::default()
//! });
//! let received = ch.process_block(&vec![Complex64::new(1.0, 0.0); 64]);
//! assert_eq!(received.len(), 64);
//! ```

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::{Complex, DspResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::VecDeque;
use std::f64::consts::PI;

/// Channel model configuration.
#[derive(Debug, Clone)]
pub struct ChannelModelConfig {
    /// Standard deviation of the AWGN (voltage, not power).
    pub noise_voltage: f64,
    /// Carrier frequency offset in radians/sample.
    pub frequency_offset: f64,
    /// Timing / sample-clock offset. 1.0 means no resampling; values
    /// near 1.0 model a small clock drift between transmitter and
    /// receiver.
    pub epsilon: f64,
    /// Multipath channel taps.
    pub taps: Vec<Complex>,
    /// Seed for the noise generator.
    pub noise_seed: u64,
}

impl Default for ChannelModelConfig {
    fn default() -> Self {
        Self {
            noise_voltage: 0.0,
            frequency_offset: 0.0,
            epsilon: 1.0,
            taps: vec![Complex::new(1.0, 1.0)],
            noise_seed: 0,
        }
    }
}

/// Stochastic channel impairment block.
///
/// Processing order per sample: multipath → frequency offset →
/// fractional resampling → noise.
#[derive(Debug, Clone)]
pub struct ChannelModel {
    config: ChannelModelConfig,
    /// Phase accumulator for the frequency-offset rotator.
    phase: f64,
    /// Multipath FIR delay line.
    delay_line: Vec<Complex>,
    delay_idx: usize,
    /// Pending samples for the fractional resampler.
    resamp_queue: VecDeque<Complex>,
    /// Fractional read position into `resamp_queue`.
    resamp_pos: f64,
    rng: StdRng,
}

impl ChannelModel {
    /// Create from a configuration.
    pub fn new(config: ChannelModelConfig) -> Self {
        let delay_len = config.taps.len().max(1);
        let rng = StdRng::seed_from_u64(config.noise_seed);
        Self {
            phase: 0.0,
            delay_line: vec![Complex::new(0.0, 0.0); delay_len],
            delay_idx: 0,
            resamp_queue: VecDeque::new(),
            resamp_pos: 0.0,
            rng,
            config,
        }
    }

    /// AWGN-only channel (single unity tap, no offsets).
    pub fn awgn_only(noise_voltage: f64, seed: u64) -> Self {
        Self::new(ChannelModelConfig {
            noise_voltage,
            taps: vec![Complex::new(1.0, 0.0)],
            noise_seed: seed,
            ..Default::default()
        })
    }

    /// Process a block of samples.
    ///
    /// With `epsilon != 1.0` the output length differs from the input
    /// length by the resampling ratio.
    pub fn process_block(&mut self, input: &[Complex]) -> Vec<Complex> {
        let mut out = Vec::with_capacity(input.len() + 2);
        for &x in input {
            let y = self.impair(x);
            if (self.config.epsilon - 1.0).abs() < 1e-12 {
                out.push(self.add_noise(y));
            } else {
                self.resamp_queue.push_back(y);
                self.drain_resampler(&mut out);
            }
        }
        out
    }

    /// Multipath + frequency offset for one sample.
    #[inline]
    fn impair(&mut self, x: Complex) -> Complex {
        self.delay_line[self.delay_idx] = x;
        let mut filtered = Complex::new(0.0, 0.0);
        let len = self.delay_line.len();
        for (k, &tap) in self.config.taps.iter().enumerate() {
            let idx = (self.delay_idx + len - k % len) % len;
            filtered += tap * self.delay_line[idx];
        }
        self.delay_idx = (self.delay_idx + 1) % len;

        let rotator = Complex::from_polar(1.0, self.phase);
        self.phase += self.config.frequency_offset;
        if self.phase > PI {
            self.phase -= 2.0 * PI;
        } else if self.phase < -PI {
            self.phase += 2.0 * PI;
        }
        filtered * rotator
    }

    /// Linear-interpolation fractional resampler, advancing the read
    /// position by `epsilon` per output sample.
    fn drain_resampler(&mut self, out: &mut Vec<Complex>) {
        loop {
            let i = self.resamp_pos.floor() as usize;
            if i + 1 >= self.resamp_queue.len() {
                break;
            }
            let frac = self.resamp_pos - i as f64;
            let s = self.resamp_queue[i] * (1.0 - frac) + self.resamp_queue[i + 1] * frac;
            out.push(self.add_noise(s));
            self.resamp_pos += self.config.epsilon;
        }
        let consumed = (self.resamp_pos.floor() as usize).min(self.resamp_queue.len());
        if consumed > 0 {
            self.resamp_queue.drain(..consumed);
            self.resamp_pos -= consumed as f64;
        }
    }

    #[inline]
    fn add_noise(&mut self, s: Complex) -> Complex {
        if self.config.noise_voltage <= 0.0 {
            return s;
        }
        let n_re: f64 = self.rng.sample(StandardNormal);
        let n_im: f64 = self.rng.sample(StandardNormal);
        s + Complex::new(n_re, n_im) * self.config.noise_voltage
    }

    /// Set the AWGN standard deviation; effective on the next sample.
    pub fn set_noise_voltage(&mut self, voltage: f64) {
        self.config.noise_voltage = voltage.max(0.0);
    }

    /// Get the AWGN standard deviation.
    pub fn noise_voltage(&self) -> f64 {
        self.config.noise_voltage
    }

    /// Set the frequency offset in radians/sample.
    pub fn set_frequency_offset(&mut self, offset: f64) {
        self.config.frequency_offset = offset;
    }

    /// Get the frequency offset.
    pub fn frequency_offset(&self) -> f64 {
        self.config.frequency_offset
    }

    /// Replace the multipath taps; the delay line restarts from zeros.
    pub fn set_taps(&mut self, taps: Vec<Complex>) {
        let delay_len = taps.len().max(1);
        self.config.taps = taps;
        self.delay_line = vec![Complex::new(0.0, 0.0); delay_len];
        self.delay_idx = 0;
    }

    /// Get the multipath taps.
    pub fn taps(&self) -> &[Complex] {
        &self.config.taps
    }

    /// Set the timing offset.
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.config.epsilon = epsilon.max(1e-6);
    }

    /// Get the timing offset.
    pub fn epsilon(&self) -> f64 {
        self.config.epsilon
    }

    /// Reset filter, rotator and resampler state (the noise generator
    /// keeps advancing; reseed by rebuilding the block).
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.delay_line.fill(Complex::new(0.0, 0.0));
        self.delay_idx = 0;
        self.resamp_queue.clear();
        self.resamp_pos = 0.0;
    }
}

impl Block for ChannelModel {
    fn name(&self) -> &str {
        "channel_model"
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
        // With epsilon < 1 the resampler stretches the stream, so the
        // input budget shrinks accordingly; staged output must never be
        // silently truncated.
        let budget = outputs[0].free();
        let max_in = ((budget.saturating_sub(4)) as f64 * self.config.epsilon.min(1.0)) as usize;
        let n = inputs[0].available().min(max_in);
        if n == 0 {
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        let samples = inputs[0].complex().pop(n);
        let impaired = self.process_block(&samples);
        outputs[0].complex().push_slice(&impaired);
        Ok(WorkState::Progress)
    }
}
