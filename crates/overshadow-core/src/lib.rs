//! # Overshadowing Core DSP Library
//!
//! Streaming signal-chain blocks for simulating an RF overshadowing
//! attack against a differential-QPSK downlink: an attacker waveform is
//! superimposed on a victim waveform at the receiver, and a blind
//! receiver chain demodulates the sum to see whose bits survive.
//!
//! ## Signal Flow
//!
//! ```text
//! victim:   bytes → DQPSK mod → channel → gain ─┐
//!                                               ├→ Σ → AGC → clock sync → CMA → Costas
//! attacker: bytes → mask → DQPSK mod → channel ─┘         → decision → diff decode → bytes
//! ```
//!
//! Topologies are wired as data — typed blocks, ports and connections in
//! a [`flowgraph::FlowGraph`] — validated before any sample flows, and
//! executed by a cooperative backpressure-respecting scheduler. Every
//! block also exposes a plain `process`-style API for direct use.
//!
//! ## Example
//!
//! ```rust
//! use overshadow_core::qpsk_modulator::{QpskModulator, ModulatorConfig};
//! use overshadow_core::qpsk_decoder::{QpskDecoder, DecoderConfig};
//!
//! let mut modulator = QpskModulator::new(ModulatorConfig::default()).unwrap();
//! let mut decoder = QpskDecoder::new(DecoderConfig::default()).unwrap();
//!
//! let samples = modulator.modulate(&[0x55; 512]);
//! let recovered = decoder.process(&samples, usize::MAX);
//! assert!(!recovered.is_empty());
//! ```

pub mod agc;
pub mod bit_error;
pub mod bit_packing;
pub mod channel_model;
pub mod combiner;
pub mod constellation;
pub mod costas_loop;
pub mod cma_equalizer;
pub mod delay;
pub mod differential;
pub mod file_source_sink;
pub mod flowgraph;
pub mod head;
pub mod multiply;
pub mod pattern_source;
pub mod pfb_clock_sync;
pub mod qpsk_decoder;
pub mod qpsk_modulator;
pub mod random_source;
pub mod rrc_filter;
pub mod throttle;
pub mod types;
pub mod vector_sink;

// Re-export main types
pub use bit_error::{BitErrorEvaluator, BitErrorResult, BitErrorSink};
pub use flowgraph::{Block, FlowGraph, FlowGraphHandle, GraphStats, PortType, WorkState};
pub use pattern_source::{PacketPattern, PatternSource, PACKET_LEN, PATTERN_LEN};
pub use qpsk_decoder::{DecoderConfig, QpskDecoder};
pub use qpsk_modulator::{ModulatorConfig, QpskModulator};
pub use types::{Complex, DspError, DspResult};

/// Prelude for wiring simulation graphs.
pub mod prelude {
    pub use crate::agc::{Agc3, Agc3Config, RmsAgc, RmsAgcConfig};
    pub use crate::bit_error::{BitErrorEvaluator, BitErrorResult, BitErrorSink};
    pub use crate::bit_packing::{PackKBits, UnpackKBits};
    pub use crate::channel_model::{ChannelModel, ChannelModelConfig};
    pub use crate::combiner::{Adder, Combiner};
    pub use crate::delay::{ByteDelay, ComplexDelay};
    pub use crate::file_source_sink::{FileByteSink, FileByteSource};
    pub use crate::flowgraph::{Block, FlowGraph, FlowGraphHandle, PortType, WorkState};
    pub use crate::head::{Head, SkipHead};
    pub use crate::multiply::MultiplyConst;
    pub use crate::pattern_source::{PacketPattern, PatternSource};
    pub use crate::qpsk_decoder::{DecoderConfig, QpskDecoder};
    pub use crate::qpsk_modulator::{MaskedModulator, ModulatorConfig, QpskModulator};
    pub use crate::random_source::RandomByteSource;
    pub use crate::types::{Complex, DspError, DspResult};
}
