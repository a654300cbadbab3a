//! Root-raised-cosine pulse shaping
//!
//! Closed-form RRC prototype design plus a polyphase interpolating FIR
//! for the transmit side: one symbol in, `sps` band-limited samples out.
//! The same prototype (at a higher oversampling) seeds the receiver's
//! polyphase clock-sync filter bank, so transmit and matched filters pair
//! into a raised cosine with zero ISI at the ideal sampling instants.
//!
//! ## Example
//!
//! ```rust
//! use overshadow_core::rrc_filter::RrcInterpolator;
//! use num_complex::Complex64;
//!
//! let mut shaper = RrcInterpolator::new(4, 0.35, 11).unwrap();
//! let samples = shaper.interpolate_symbol(Complex64::new(1.0, 0.0));
//! assert_eq!(samples.len(), 4);
//! ```

use crate::types::{Complex, DspError, DspResult};
use std::f64::consts::PI;

/// Design a root-raised-cosine prototype.
///
/// `samples_per_symbol` may be fractional (the receiver's filter bank
/// designs at `sps * nfilts`). Taps are normalized to unit energy.
///
/// The impulse response is
///
/// `h(t) = [sin(πt(1−α)) + 4αt·cos(πt(1+α))] / [πt(1−(4αt)²)]`
///
/// with the closed-form limits at `t = 0` and `t = ±1/(4α)`.
pub fn design_rrc(num_taps: usize, samples_per_symbol: f64, rolloff: f64) -> DspResult<Vec<f64>> {
    if num_taps == 0 {
        return Err(DspError::invalid("rrc: num_taps must be positive"));
    }
    if !(rolloff > 0.0 && rolloff <= 1.0) {
        return Err(DspError::invalid(format!(
            "rrc: roll-off must be in (0, 1], got {rolloff}"
        )));
    }
    if samples_per_symbol < 1.0 {
        return Err(DspError::invalid(
            "rrc: samples_per_symbol must be >= 1",
        ));
    }

    let a = rolloff;
    let center = (num_taps as f64 - 1.0) / 2.0;
    let mut h = vec![0.0; num_taps];

    for (i, tap) in h.iter_mut().enumerate() {
        let t = (i as f64 - center) / samples_per_symbol;
        if t.abs() < 1e-12 {
            *tap = 1.0 - a + 4.0 * a / PI;
        } else if (1.0 - (4.0 * a * t).powi(2)).abs() < 1e-12 {
            // t = ±1/(4α) singularity
            *tap = (a / 2.0_f64.sqrt())
                * ((1.0 + 2.0 / PI) * (PI / (4.0 * a)).sin()
                    + (1.0 - 2.0 / PI) * (PI / (4.0 * a)).cos());
        } else {
            let num = (PI * t * (1.0 - a)).sin() + 4.0 * a * t * (PI * t * (1.0 + a)).cos();
            let den = PI * t * (1.0 - (4.0 * a * t).powi(2));
            *tap = num / den;
        }
    }

    let energy = h.iter().map(|x| x * x).sum::<f64>().sqrt();
    if energy > 1e-12 {
        for x in h.iter_mut() {
            *x /= energy;
        }
    }
    Ok(h)
}

/// Polyphase interpolating RRC filter (transmit pulse shaper).
///
/// Decomposes the prototype into `sps` sub-filters so the zero-stuffed
/// convolution never multiplies by the stuffed zeros: each input symbol
/// produces `sps` output samples directly.
#[derive(Debug, Clone)]
pub struct RrcInterpolator {
    sps: usize,
    /// `phases[k][j] = proto[j*sps + k]`
    phases: Vec<Vec<f64>>,
    /// Symbol history, newest first.
    history: Vec<Complex>,
    num_taps: usize,
}

impl RrcInterpolator {
    /// Create a shaper for the given samples-per-symbol, roll-off and
    /// span (in symbols). Fails with `InvalidParameter` for `sps < 2` or
    /// roll-off outside (0, 1].
    pub fn new(sps: usize, rolloff: f64, span_symbols: usize) -> DspResult<Self> {
        if sps < 2 {
            return Err(DspError::invalid(format!(
                "pulse shaper: samples_per_symbol must be >= 2, got {sps}"
            )));
        }
        let num_taps = span_symbols * sps + 1;
        let proto = design_rrc(num_taps, sps as f64, rolloff)?;

        let taps_per_phase = (num_taps + sps - 1) / sps;
        let mut phases = vec![vec![0.0; taps_per_phase]; sps];
        for (i, &tap) in proto.iter().enumerate() {
            phases[i % sps][i / sps] = tap;
        }

        Ok(Self {
            sps,
            phases,
            history: vec![Complex::new(0.0, 0.0); taps_per_phase],
            num_taps,
        })
    }

    /// Samples per symbol.
    pub fn sps(&self) -> usize {
        self.sps
    }

    /// Filter group delay in output samples.
    pub fn group_delay(&self) -> usize {
        (self.num_taps - 1) / 2
    }

    /// Shape one symbol into `sps` output samples.
    pub fn interpolate_symbol(&mut self, symbol: Complex) -> Vec<Complex> {
        self.history.rotate_right(1);
        self.history[0] = symbol;

        let mut out = Vec::with_capacity(self.sps);
        for phase in &self.phases {
            let mut acc = Complex::new(0.0, 0.0);
            for (j, &tap) in phase.iter().enumerate() {
                acc += self.history[j] * tap;
            }
            out.push(acc);
        }
        out
    }

    /// Shape a block of symbols.
    pub fn interpolate(&mut self, symbols: &[Complex]) -> Vec<Complex> {
        let mut out = Vec::with_capacity(symbols.len() * self.sps);
        for &s in symbols {
            out.extend(self.interpolate_symbol(s));
        }
        out
    }

    /// Clear the symbol history.
    pub fn reset(&mut self) {
        self.history.fill(Complex::new(0.0, 0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_prototype_unit_energy_and_symmetry() {
        let h = design_rrc(45, 4.0, 0.35).unwrap();
        let energy: f64 = h.iter().map(|x| x * x).sum();
        assert_relative_eq!(energy, 1.0, epsilon = 1e-9);
        for i in 0..h.len() / 2 {
            assert_relative_eq!(h[i], h[h.len() - 1 - i], epsilon = 1e-9);
        }
        // Peak at the center
        let center = h.len() / 2;
        assert!(h.iter().all(|&x| x <= h[center] + 1e-12));
    }

    #[test]
    fn test_invalid_rolloff_rejected() {
        assert!(design_rrc(45, 4.0, 0.0).is_err());
        assert!(design_rrc(45, 4.0, 1.5).is_err());
        assert!(design_rrc(45, 4.0, 1.0).is_ok());
    }

    #[test]
    fn test_interpolator_rejects_sps_below_two() {
        assert!(RrcInterpolator::new(1, 0.35, 11).is_err());
        assert!(RrcInterpolator::new(2, 0.35, 11).is_ok());
    }

    #[test]
    fn test_impulse_response_matches_prototype() {
        let sps = 4;
        let span = 11;
        let mut fir = RrcInterpolator::new(sps, 0.35, span).unwrap();
        let proto = design_rrc(span * sps + 1, sps as f64, 0.35).unwrap();

        let mut response = Vec::new();
        response.extend(fir.interpolate_symbol(Complex::new(1.0, 0.0)));
        for _ in 0..span {
            response.extend(fir.interpolate_symbol(Complex::new(0.0, 0.0)));
        }

        for (i, &tap) in proto.iter().enumerate() {
            assert_relative_eq!(response[i].re, tap, epsilon = 1e-9);
            assert_relative_eq!(response[i].im, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_matched_pair_has_low_isi() {
        // RRC autocorrelation at nonzero symbol lags must be small
        // relative to the peak (raised-cosine zero-ISI property, limited
        // by truncation).
        let sps = 4;
        let h = design_rrc(11 * sps + 1, sps as f64, 0.35).unwrap();
        let corr = |lag: usize| -> f64 {
            h.iter()
                .zip(h.iter().skip(lag))
                .map(|(a, b)| a * b)
                .sum::<f64>()
        };
        let peak = corr(0);
        for k in 1..=5 {
            assert!(
                corr(k * sps).abs() < 0.02 * peak,
                "ISI at lag {} symbols too high: {}",
                k,
                corr(k * sps)
            );
        }
    }
}
