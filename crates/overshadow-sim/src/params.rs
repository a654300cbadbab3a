//! Parameter sets for overshadowing runs
//!
//! One `OvershadowParams` governs one graph instantiation. Values are
//! validated up front, before a run starts — an out-of-range value is an
//! `InvalidParameter` error, never a silent clamp — and stay immutable
//! for the run's lifetime (live tuning goes through the blocks' own
//! setters).

use overshadow_core::pattern_source::PACKET_LEN;
use overshadow_core::types::{DspError, DspResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which AGC arrangement fronts the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgcMode {
    /// No AGC: combined signal straight into the decoder.
    None,
    /// Classic fast-acquisition loop (agc3 style).
    Classic,
    /// RMS-tracking AGC pair sandwiching a processing-noise channel.
    Rms,
}

/// Full parameter set for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OvershadowParams {
    /// Attacker payload file, replayed repeatedly. `None` uses a seeded
    /// random payload instead.
    pub in_file: Option<PathBuf>,
    /// Output file receiving the recovered byte stream.
    pub out_file: PathBuf,
    /// Attacker branch gain in dB.
    pub attacker_gain_db: f64,
    /// Victim branch gain in dB.
    pub victim_gain_db: f64,
    /// Victim channel AWGN voltage.
    pub noise_voltage_victim: f64,
    /// Attacker channel AWGN voltage.
    pub noise_voltage_attacker: f64,
    /// Receiver-side processing noise voltage (Rms topology only).
    pub processing_noise: f64,
    /// Victim channel frequency offset, radians/sample.
    pub frequency_offset_victim: f64,
    /// Attacker channel frequency offset, radians/sample.
    pub frequency_offset_attacker: f64,
    /// Victim channel timing offset (1.0 = none).
    pub timing_offset_victim: f64,
    /// Attacker channel timing offset (1.0 = none).
    pub timing_offset_attacker: f64,
    /// Multipath taps shared by both channels, as (re, im) pairs.
    pub multipath_taps: Vec<(f64, f64)>,
    /// Number of nominal packets to run (bounds each source at
    /// `3 * 1024 * num_packets` bytes).
    pub num_packets: usize,
    /// Collision-pattern padding bytes.
    pub padding_bytes: usize,
    /// Bit-error alignment delay, in bit positions. Negative is
    /// rejected at validation.
    pub delay: i64,
    /// AGC arrangement.
    pub agc: AgcMode,
    /// Whether to run the bit-error evaluation taps.
    pub evaluate: bool,
    /// Align the evaluator by searching around the measured pipeline
    /// latency instead of trusting `delay` blindly.
    pub auto_align: bool,
    /// Seed for the victim's random payload.
    pub victim_seed: u64,
    /// Seed for the attacker's random payload (used when `in_file` is
    /// `None`).
    pub attacker_seed: u64,
    /// Victim channel noise seed.
    pub noise_seed_victim: u64,
    /// Attacker channel noise seed.
    pub noise_seed_attacker: u64,
    /// Processing-noise channel seed.
    pub noise_seed_processing: u64,
}

impl Default for OvershadowParams {
    fn default() -> Self {
        Self {
            in_file: None,
            out_file: PathBuf::from("OVERSHADOW.raw"),
            attacker_gain_db: 0.0,
            victim_gain_db: 0.0,
            noise_voltage_victim: 1e-4,
            noise_voltage_attacker: 1e-4,
            processing_noise: 0.2,
            frequency_offset_victim: 0.0,
            frequency_offset_attacker: 0.0,
            timing_offset_victim: 1.0,
            timing_offset_attacker: 1.0,
            multipath_taps: vec![(1.0, 1.0)],
            num_packets: 1024,
            padding_bytes: 32,
            delay: 56,
            agc: AgcMode::Rms,
            evaluate: true,
            auto_align: true,
            victim_seed: 1,
            attacker_seed: 2,
            noise_seed_victim: 11,
            noise_seed_attacker: 12,
            noise_seed_processing: 13,
        }
    }
}

impl OvershadowParams {
    /// Bytes each bounded source passes before end-of-stream.
    pub fn total_bytes(&self) -> u64 {
        3 * PACKET_LEN as u64 * self.num_packets as u64
    }

    /// Check every invariant this parameter set must satisfy. Called
    /// before graph construction; a failing set never starts a run.
    pub fn validate(&self) -> DspResult<()> {
        if self.delay < 0 {
            return Err(DspError::invalid(format!(
                "delay must be non-negative, got {}",
                self.delay
            )));
        }
        if self.padding_bytes > PACKET_LEN {
            return Err(DspError::invalid(format!(
                "padding_bytes {} exceeds packet length {}",
                self.padding_bytes, PACKET_LEN
            )));
        }
        if self.num_packets == 0 {
            return Err(DspError::invalid("num_packets must be positive"));
        }
        for (name, v) in [
            ("noise_voltage_victim", self.noise_voltage_victim),
            ("noise_voltage_attacker", self.noise_voltage_attacker),
            ("processing_noise", self.processing_noise),
        ] {
            if v < 0.0 {
                return Err(DspError::invalid(format!("{name} must be non-negative, got {v}")));
            }
        }
        for (name, v) in [
            ("timing_offset_victim", self.timing_offset_victim),
            ("timing_offset_attacker", self.timing_offset_attacker),
        ] {
            if v <= 0.0 {
                return Err(DspError::invalid(format!("{name} must be positive, got {v}")));
            }
        }
        if self.multipath_taps.is_empty() {
            return Err(DspError::invalid("multipath_taps must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(OvershadowParams::default().validate().is_ok());
    }

    #[test]
    fn test_negative_delay_rejected() {
        let params = OvershadowParams {
            delay: -1,
            ..Default::default()
        };
        assert!(matches!(
            params.validate().unwrap_err(),
            DspError::InvalidParameter(_)
        ));
    }

    #[test]
    fn test_oversized_padding_rejected() {
        let params = OvershadowParams {
            padding_bytes: 1025,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_negative_noise_rejected() {
        let params = OvershadowParams {
            noise_voltage_attacker: -0.1,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_total_bytes() {
        let params = OvershadowParams {
            num_packets: 2,
            ..Default::default()
        };
        assert_eq!(params.total_bytes(), 6144);
    }

    #[test]
    fn test_serde_roundtrip() {
        let params = OvershadowParams {
            attacker_gain_db: 14.0,
            agc: AgcMode::Classic,
            ..Default::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: OvershadowParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back.attacker_gain_db, 14.0);
        assert_eq!(back.agc, AgcMode::Classic);
        assert_eq!(back.num_packets, params.num_packets);
    }
}
