//! Automatic gain control
//!
//! Two variants front the receiver chain:
//!
//! - [`Agc3`] — classic two-phase loop: fast linear acquisition for the
//!   first samples, then slow error-driven tracking.
//! - [`RmsAgc`] — RMS-tracking normalizer: divides by a smoothed RMS
//!   power estimate.
//!
//! Both keep the instantaneous magnitude near a reference level with a
//! bounded adaptation rate and a hard gain ceiling, so deep fades or
//! silence saturate the gain instead of amplifying without bound.
//! Divergence degrades decode quality — measured downstream by the
//! bit-error evaluator — and must never turn into a panic or a division
//! by zero.

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::{Complex, DspResult};

/// Configuration for the two-phase AGC.
#[derive(Debug, Clone)]
pub struct Agc3Config {
    /// Target output amplitude.
    pub reference: f64,
    /// Attack rate during acquisition.
    pub attack_rate: f64,
    /// Decay rate during tracking.
    pub decay_rate: f64,
    /// Initial gain.
    pub initial_gain: f64,
    /// Hard gain ceiling.
    pub max_gain: f64,
    /// Samples spent in the acquisition phase.
    pub acquisition_samples: usize,
}

impl Default for Agc3Config {
    fn default() -> Self {
        Self {
            reference: 1.0,
            attack_rate: 1e-3,
            decay_rate: 1e-4,
            initial_gain: 1.0,
            max_gain: 65536.0,
            acquisition_samples: 100,
        }
    }
}

/// Two-phase fast-acquisition AGC.
///
/// The first above-threshold sample sets the gain outright; the rest of
/// the acquisition window refines it at the attack rate; tracking then
/// follows the magnitude error at the decay rate.
#[derive(Debug, Clone)]
pub struct Agc3 {
    config: Agc3Config,
    gain: f64,
    sample_count: usize,
    acquired: bool,
}

impl Agc3 {
    /// Create from a configuration.
    pub fn new(config: Agc3Config) -> Self {
        let gain = config.initial_gain;
        Self {
            config,
            gain,
            sample_count: 0,
            acquired: false,
        }
    }

    /// Current gain.
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Whether still in the acquisition phase.
    pub fn is_acquiring(&self) -> bool {
        self.sample_count < self.config.acquisition_samples
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, input: Complex) -> Complex {
        if self.sample_count < self.config.acquisition_samples {
            let mag = input.norm();
            if mag > 1e-12 {
                let desired = self.config.reference / mag;
                if self.acquired {
                    self.gain += self.config.attack_rate * (desired - self.gain);
                } else {
                    self.gain = desired;
                    self.acquired = true;
                }
            }
        } else {
            let error = self.config.reference - (input * self.gain).norm();
            self.gain += self.config.decay_rate * error;
        }
        self.gain = self.gain.clamp(0.0, self.config.max_gain);
        self.sample_count = self.sample_count.saturating_add(1);
        input * self.gain
    }

    /// Process a block of samples.
    pub fn process_block(&mut self, input: &[Complex]) -> Vec<Complex> {
        input.iter().map(|&s| self.process(s)).collect()
    }

    /// Reset to the initial gain and the acquisition phase.
    pub fn reset(&mut self) {
        self.gain = self.config.initial_gain;
        self.sample_count = 0;
        self.acquired = false;
    }
}

/// Configuration for the RMS-tracking AGC.
#[derive(Debug, Clone)]
pub struct RmsAgcConfig {
    /// Smoothing factor for the power estimate.
    pub alpha: f64,
    /// Target RMS level.
    pub reference: f64,
    /// Hard gain ceiling.
    pub max_gain: f64,
}

impl Default for RmsAgcConfig {
    fn default() -> Self {
        Self {
            alpha: 1e-2,
            reference: 1.0,
            max_gain: 65536.0,
        }
    }
}

/// RMS-tracking AGC: `y = x * reference / rms`, with
/// `avg = (1-alpha)*avg + alpha*|x|^2`.
#[derive(Debug, Clone)]
pub struct RmsAgc {
    config: RmsAgcConfig,
    avg_power: f64,
}

impl RmsAgc {
    /// Create from a configuration.
    pub fn new(config: RmsAgcConfig) -> Self {
        Self {
            config,
            avg_power: 0.0,
        }
    }

    /// Create with the given smoothing factor and reference level.
    pub fn with_alpha(alpha: f64, reference: f64) -> Self {
        Self::new(RmsAgcConfig {
            alpha,
            reference,
            ..Default::default()
        })
    }

    /// Current smoothed power estimate.
    pub fn average_power(&self) -> f64 {
        self.avg_power
    }

    /// Current effective gain.
    pub fn gain(&self) -> f64 {
        let rms = self.avg_power.sqrt();
        if rms > self.config.reference / self.config.max_gain {
            (self.config.reference / rms).min(self.config.max_gain)
        } else {
            self.config.max_gain
        }
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, input: Complex) -> Complex {
        self.avg_power =
            (1.0 - self.config.alpha) * self.avg_power + self.config.alpha * input.norm_sqr();
        input * self.gain()
    }

    /// Process a block of samples.
    pub fn process_block(&mut self, input: &[Complex]) -> Vec<Complex> {
        input.iter().map(|&s| self.process(s)).collect()
    }

    /// Reset the power estimate.
    pub fn reset(&mut self) {
        self.avg_power = 0.0;
    }
}

impl Block for Agc3 {
    fn name(&self) -> &str {
        "agc3"
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

impl Block for RmsAgc {
    fn name(&self) -> &str {
        "rms_agc"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agc3_acquires_weak_signal() {
        let mut agc = Agc3::new(Agc3Config {
            attack_rate: 0.5,
            acquisition_samples: 50,
            ..Default::default()
        });
        let input = vec![Complex::new(0.01, 0.0); 200];
        let out = agc.process_block(&input);
        let late = out[150].norm();
        assert!(
            (late - 1.0).abs() < 0.5,
            "should be near reference after acquisition: {late}"
        );
    }

    #[test]
    fn test_agc3_gain_ceiling_on_silence() {
        let mut agc = Agc3::new(Agc3Config {
            max_gain: 100.0,
            ..Default::default()
        });
        let input = vec![Complex::new(0.0, 0.0); 10000];
        let out = agc.process_block(&input);
        assert!(agc.gain() <= 100.0);
        assert!(out.iter().all(|c| c.norm().is_finite()));
    }

    #[test]
    fn test_agc3_reset() {
        let mut agc = Agc3::new(Agc3Config::default());
        agc.process_block(&vec![Complex::new(0.001, 0.0); 500]);
        agc.reset();
        assert!(agc.is_acquiring());
        assert!((agc.gain() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rms_agc_normalizes_strong_signal() {
        let mut agc = RmsAgc::with_alpha(1e-2, 1.0);
        let input = vec![Complex::new(160.0, 0.0); 2000];
        let out = agc.process_block(&input);
        let late = out.last().unwrap().norm();
        assert!((late - 1.0).abs() < 0.1, "normalized magnitude: {late}");
    }

    #[test]
    fn test_rms_agc_normalizes_weak_signal() {
        let mut agc = RmsAgc::with_alpha(5e-2, 1.0);
        let input = vec![Complex::new(1e-3, 1e-3); 2000];
        let out = agc.process_block(&input);
        let late = out.last().unwrap().norm();
        assert!((late - 1.0).abs() < 0.1, "normalized magnitude: {late}");
    }

    #[test]
    fn test_rms_agc_silence_is_bounded() {
        let mut agc = RmsAgc::new(RmsAgcConfig {
            max_gain: 1000.0,
            ..Default::default()
        });
        let out = agc.process_block(&vec![Complex::new(0.0, 0.0); 100]);
        assert!(out.iter().all(|c| c.norm().is_finite()));
        assert!(agc.gain() <= 1000.0);
    }
}
