//! Differential QPSK modulator
//!
//! Bytes in, shaped complex baseband out:
//!
//! 1. unpack each byte into four dibits, MSB first;
//! 2. differentially encode the dibit as an angular-index step;
//! 3. map the running index to the unit-energy constellation point;
//! 4. upsample by `sps` through the root-raised-cosine interpolator.
//!
//! One input byte becomes `4 * sps` output samples. The bit-ordering
//! convention matches the decoder's repacking stage exactly.
//!
//! ## Example
//!
//! ```rust
//! use overshadow_core::qpsk_modulator::{QpskModulator, ModulatorConfig};
//!
//! let mut modulator = QpskModulator::new(ModulatorConfig::default()).unwrap();
//! let samples = modulator.modulate(&[0xA5, 0x3C]);
//! assert_eq!(samples.len(), 2 * 4 * 4); // 2 bytes * 4 dibits * sps
//! ```

use crate::bit_packing::byte_to_dibits;
use crate::constellation::QpskConstellation;
use crate::differential::DiffEncoder;
use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::rrc_filter::RrcInterpolator;
use crate::types::{Complex, DspResult};

/// Modulator configuration.
#[derive(Debug, Clone)]
pub struct ModulatorConfig {
    /// Samples per symbol.
    pub sps: usize,
    /// RRC roll-off (excess bandwidth).
    pub rolloff: f64,
    /// RRC span in symbols.
    pub span_symbols: usize,
}

impl Default for ModulatorConfig {
    fn default() -> Self {
        Self {
            sps: 4,
            rolloff: 0.35,
            span_symbols: 11,
        }
    }
}

/// Differential QPSK modulator with RRC pulse shaping.
#[derive(Debug, Clone)]
pub struct QpskModulator {
    config: ModulatorConfig,
    constellation: QpskConstellation,
    encoder: DiffEncoder,
    shaper: RrcInterpolator,
}

impl QpskModulator {
    /// Create a modulator. Fails with `InvalidParameter` for `sps < 2`
    /// or roll-off outside (0, 1].
    pub fn new(config: ModulatorConfig) -> DspResult<Self> {
        let shaper = RrcInterpolator::new(config.sps, config.rolloff, config.span_symbols)?;
        Ok(Self {
            config,
            constellation: QpskConstellation::new(),
            encoder: DiffEncoder::new(4),
            shaper,
        })
    }

    /// Samples produced per input byte.
    pub fn samples_per_byte(&self) -> usize {
        4 * self.config.sps
    }

    /// Map bytes to differentially-encoded constellation points, one per
    /// dibit, without pulse shaping. This is the symbol-domain half of
    /// the modulator, useful for symbol-level round-trip checks.
    pub fn map_symbols(&mut self, bytes: &[u8]) -> Vec<Complex> {
        let mut symbols = Vec::with_capacity(bytes.len() * 4);
        for &byte in bytes {
            for dibit in byte_to_dibits(byte) {
                let index = self.encoder.encode(dibit);
                symbols.push(self.constellation.point(index));
            }
        }
        symbols
    }

    /// Full modulation: bytes to shaped baseband samples.
    pub fn modulate(&mut self, bytes: &[u8]) -> Vec<Complex> {
        let symbols = self.map_symbols(bytes);
        self.shaper.interpolate(&symbols)
    }

    /// Shaping filter group delay in output samples.
    pub fn group_delay(&self) -> usize {
        self.shaper.group_delay()
    }

    /// Reset differential state and filter memory.
    pub fn reset(&mut self) {
        self.encoder.reset();
        self.shaper.reset();
    }
}

/// Masked modulator — the attacker's transmit path.
///
/// Port 0 carries the attacker's data bytes, port 1 the packet pattern.
/// The data modulates continuously (differential and filter state keep
/// running), but the shaped output is gated by the pattern: positions
/// whose mask byte is zero emit silence, so the attacker occupies only
/// the symbol positions the collision pattern marks as its own.
#[derive(Debug, Clone)]
pub struct MaskedModulator {
    inner: QpskModulator,
}

impl MaskedModulator {
    /// Create a masked modulator.
    pub fn new(config: ModulatorConfig) -> DspResult<Self> {
        Ok(Self {
            inner: QpskModulator::new(config)?,
        })
    }

    /// Modulate data bytes, blanking the samples of masked-out bytes.
    pub fn modulate(&mut self, data: &[u8], mask: &[u8]) -> Vec<Complex> {
        let per_byte = self.inner.samples_per_byte();
        let mut out = Vec::with_capacity(data.len() * per_byte);
        for (i, &byte) in data.iter().enumerate() {
            let samples = self.inner.modulate(&[byte]);
            let on = mask.get(i).copied().unwrap_or(0) != 0;
            if on {
                out.extend(samples);
            } else {
                out.extend(std::iter::repeat(Complex::new(0.0, 0.0)).take(per_byte));
            }
        }
        out
    }

    /// Samples produced per input byte.
    pub fn samples_per_byte(&self) -> usize {
        self.inner.samples_per_byte()
    }

    /// Reset modulator state.
    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

impl Block for MaskedModulator {
    fn name(&self) -> &str {
        "masked_modulator"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte, PortType::Byte]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![PortType::Complex]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let per_byte = self.inner.samples_per_byte();
        let n = inputs[0]
            .available()
            .min(inputs[1].available())
            .min(outputs[0].free() / per_byte);
        if n == 0 {
            if inputs[0].is_drained() || inputs[1].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        let data = inputs[0].bytes().pop(n);
        let mask = inputs[1].bytes().pop(n);
        let samples = self.modulate(&data, &mask);
        outputs[0].complex().push_slice(&samples);
        Ok(WorkState::Progress)
    }
}

impl Block for QpskModulator {
    fn name(&self) -> &str {
        "qpsk_modulator"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![PortType::Complex]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let per_byte = self.samples_per_byte();
        let n = inputs[0]
            .available()
            .min(outputs[0].free() / per_byte);
        if n == 0 {
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        let bytes = inputs[0].bytes().pop(n);
        let samples = self.modulate(&bytes);
        outputs[0].complex().push_slice(&samples);
        Ok(WorkState::Progress)
    }
}
