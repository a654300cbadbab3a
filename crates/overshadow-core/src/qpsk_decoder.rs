//! QPSK receiver chain
//!
//! Composite block mirroring the receiver's decode path: polyphase
//! clock sync → CMA blind equalizer → Costas carrier recovery →
//! nearest-point decision → differential decode → dibit repacking.
//! Complex baseband in, recovered bytes out.
//!
//! The recovered stream is delayed from the transmitted one by the
//! shaping/matched filter group delays plus the equalizer center tap,
//! and its byte framing is arbitrary — downstream bit-error evaluation
//! aligns with an explicit delay, which is also how the original system
//! treated it.
//!
//! Loop divergence is not an error path here: a chain that fails to
//! converge produces garbage bytes, and the bit-error evaluator reports
//! that as a non-decoding run.

use crate::bit_packing::dibits_to_byte;
use crate::cma_equalizer::{CmaConfig, CmaEqualizer};
use crate::constellation::QpskConstellation;
use crate::costas_loop::{CostasConfig, CostasLoop};
use crate::differential::DiffDecoder;
use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::pfb_clock_sync::{ClockSyncConfig, PfbClockSync};
use crate::types::{Complex, DspResult};
use std::f64::consts::PI;

/// Decoder configuration, exposing the three receiver loop knobs the
/// experiments sweep.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Input samples per symbol.
    pub sps: usize,
    /// CMA equalizer adaptation gain.
    pub eq_gain: f64,
    /// Number of equalizer taps.
    pub eq_taps: usize,
    /// Costas loop bandwidth.
    pub phase_bw: f64,
    /// Timing loop bandwidth.
    pub timing_loop_bw: f64,
    /// Polyphase arms in the clock-sync bank.
    pub nfilts: usize,
    /// RRC roll-off of the matched filter.
    pub rolloff: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sps: 4,
            eq_gain: 0.01,
            eq_taps: 15,
            phase_bw: 2.0 * PI / 100.0,
            timing_loop_bw: 2.0 * PI / 100.0,
            nfilts: 32,
            rolloff: 0.35,
        }
    }
}

/// Full blind QPSK receiver: complex samples to recovered bytes.
#[derive(Debug, Clone)]
pub struct QpskDecoder {
    config: DecoderConfig,
    clock_sync: PfbClockSync,
    equalizer: CmaEqualizer,
    costas: CostasLoop,
    constellation: QpskConstellation,
    diff: DiffDecoder,
    /// Decided dibits awaiting byte packing.
    pending_dibits: Vec<u8>,
}

impl QpskDecoder {
    /// Build the chain. Fails with `InvalidParameter` if the matched
    /// filter configuration is invalid.
    pub fn new(config: DecoderConfig) -> DspResult<Self> {
        let clock_sync = PfbClockSync::new(ClockSyncConfig {
            sps: config.sps,
            loop_bw: config.timing_loop_bw,
            nfilts: config.nfilts,
            rolloff: config.rolloff,
            ..Default::default()
        })?;
        let equalizer = CmaEqualizer::new(CmaConfig {
            num_taps: config.eq_taps,
            step_size: config.eq_gain,
            modulus: 1.0,
            leak_factor: 0.0,
        });
        let costas = CostasLoop::new(CostasConfig {
            loop_bw: config.phase_bw,
            ..Default::default()
        });
        Ok(Self {
            config,
            clock_sync,
            equalizer,
            costas,
            constellation: QpskConstellation::new(),
            diff: DiffDecoder::new(4),
            pending_dibits: Vec::new(),
        })
    }

    /// Process baseband samples, producing at most `max_bytes` recovered
    /// bytes (partial dibit groups stay buffered).
    pub fn process(&mut self, samples: &[Complex], max_bytes: usize) -> Vec<u8> {
        let symbol_budget = max_bytes.saturating_mul(4).saturating_sub(self.pending_dibits.len());
        let symbols = self.clock_sync.process(samples, symbol_budget);
        for symbol in symbols {
            let equalized = self.equalizer.process_sample(symbol);
            let corrected = self.costas.process_sample(equalized);
            let index = self.constellation.decide(corrected);
            self.pending_dibits.push(self.diff.decode(index));
        }

        let whole = self.pending_dibits.len() / 4 * 4;
        let mut out = Vec::with_capacity(whole / 4);
        for chunk in self.pending_dibits.drain(..whole).collect::<Vec<_>>().chunks(4) {
            out.push(dibits_to_byte(&[chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        out
    }

    /// Samples per symbol the chain expects.
    pub fn sps(&self) -> usize {
        self.config.sps
    }

    /// Costas loop frequency estimate, radians/symbol.
    pub fn carrier_frequency(&self) -> f64 {
        self.costas.frequency()
    }

    /// Smoothed equalizer error power (convergence indicator).
    pub fn equalizer_error(&self) -> f64 {
        self.equalizer.error_power()
    }

    /// Last timing-loop error.
    pub fn timing_error(&self) -> f64 {
        self.clock_sync.timing_error()
    }

    /// Live setter for the Costas loop bandwidth.
    pub fn set_phase_bw(&mut self, phase_bw: f64) {
        self.costas.set_loop_bandwidth(phase_bw);
    }

    /// Live setter for the timing loop bandwidth.
    pub fn set_timing_loop_bw(&mut self, loop_bw: f64) {
        self.clock_sync.set_loop_bandwidth(loop_bw);
    }

    /// Reset every stage to fresh acquisition state.
    pub fn reset(&mut self) {
        self.clock_sync.reset();
        self.equalizer.reset();
        self.costas.reset();
        self.diff.reset();
        self.pending_dibits.clear();
    }
}

impl Block for QpskDecoder {
    fn name(&self) -> &str {
        "qpsk_decoder"
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
        let free = outputs[0].free();
        if free == 0 {
            return Ok(WorkState::Starved);
        }
        let want = (free * 4 * self.config.sps + 64 * self.config.sps)
            .saturating_sub(self.clock_sync.buffered());
        let n = inputs[0].available().min(want);
        let samples = if n > 0 {
            inputs[0].complex().pop(n)
        } else {
            Vec::new()
        };
        let bytes = self.process(&samples, free);
        if bytes.is_empty() {
            if inputs[0].is_drained() && n == 0 {
                return Ok(WorkState::Finished);
            }
            return Ok(if n > 0 {
                WorkState::Progress
            } else {
                WorkState::Starved
            });
        }
        outputs[0].bytes().push_slice(&bytes);
        Ok(WorkState::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qpsk_modulator::{ModulatorConfig, QpskModulator};

    /// Best bit-level match rate between two bit streams over a window
    /// of candidate bit delays (the recovered stream's framing depends
    /// on the chain's group delay, so alignment is searched, exactly as
    /// the experiment layer does with its configured delay).
    fn best_bit_match_rate(recovered: &[u8], reference: &[u8], search: usize, window: usize) -> f64 {
        let unpack = crate::bit_packing::UnpackKBits::new(8);
        let rec_bits = unpack.unpack(recovered);
        let ref_bits = unpack.unpack(reference);
        let mut best = 0.0;
        for delay in 0..search {
            if delay + window > rec_bits.len() || window > ref_bits.len() {
                break;
            }
            let matches = rec_bits[delay..delay + window]
                .iter()
                .zip(ref_bits[..window].iter())
                .filter(|(a, b)| a == b)
                .count();
            let rate = matches as f64 / window as f64;
            if rate > best {
                best = rate;
            }
        }
        best
    }

    #[test]
    fn test_clean_chain_recovers_bits() {
        let mut modulator = QpskModulator::new(ModulatorConfig::default()).unwrap();
        let mut decoder = QpskDecoder::new(DecoderConfig::default()).unwrap();

        // Repeating payload so any transient settles within the stream.
        let payload: Vec<u8> = (0..96u16).map(|i| (i * 37 % 256) as u8).collect();
        let mut data = Vec::new();
        for _ in 0..40 {
            data.extend_from_slice(&payload);
        }
        let samples = modulator.modulate(&data);
        let recovered = decoder.process(&samples, usize::MAX);
        assert!(recovered.len() > data.len() / 2);

        // Measure over the second half, where every loop has settled.
        // The payload repeats with a 768-bit period, so searching one
        // period of bit delays finds the true alignment.
        let tail = recovered[recovered.len() / 2..].to_vec();
        let mut reference = payload.clone();
        reference.extend_from_slice(&payload);
        reference.extend_from_slice(&payload);
        let rate = best_bit_match_rate(&tail, &reference, payload.len() * 8, 1500);
        assert!(
            rate > 0.95,
            "clean chain should recover the repeating payload: rate {rate}"
        );
    }

    #[test]
    fn test_divergent_input_never_panics() {
        let mut decoder = QpskDecoder::new(DecoderConfig::default()).unwrap();
        // Pathological input: huge magnitudes and zeros interleaved.
        let samples: Vec<Complex> = (0..5000)
            .map(|i| {
                if i % 3 == 0 {
                    Complex::new(0.0, 0.0)
                } else {
                    Complex::new(1e6, -1e6)
                }
            })
            .collect();
        let out = decoder.process(&samples, usize::MAX);
        // Whatever came out, the chain stayed alive and bounded.
        assert!(out.len() < 5000);
        assert!(decoder.equalizer_error().is_finite());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(QpskDecoder::new(DecoderConfig {
            rolloff: 0.0,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_live_loop_bandwidth_setters() {
        let mut decoder = QpskDecoder::new(DecoderConfig::default()).unwrap();
        decoder.set_phase_bw(2.0 * PI / 50.0);
        decoder.set_timing_loop_bw(2.0 * PI / 200.0);
        // Setters must not disturb stream state.
        let out = decoder.process(&vec![Complex::new(0.5, 0.5); 256], usize::MAX);
        assert!(out.len() <= 16);
    }
}
