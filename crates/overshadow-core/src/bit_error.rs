//! Bit-error evaluation — who won the overshadowing event?
//!
//! Compares the recovered stream against the victim's and the attacker's
//! transmitted streams after delay alignment, classifying every position
//! as matching the victim, the attacker, or neither. The aggregate
//! counts are the experiment's primary outcome: a receiver chain that
//! never converged simply shows up as a high "neither" rate.
//!
//! Comparisons run on whatever sample granularity the wired streams
//! carry — the standard topology feeds unpacked bit streams, matching
//! the original delay/XOR evaluator arrangement.

use crate::delay::ByteDelay;
use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::DspResult;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Aggregate per-run comparison outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitErrorResult {
    /// Positions equal to the victim's transmitted stream.
    pub victim_match: u64,
    /// Positions equal to the attacker's transmitted stream.
    pub attacker_match: u64,
    /// Positions matching neither stream.
    pub neither: u64,
    /// Positions compared.
    pub total: u64,
}

impl BitErrorResult {
    /// Fraction of positions matching the victim.
    pub fn victim_rate(&self) -> f64 {
        self.rate(self.victim_match)
    }

    /// Fraction of positions matching the attacker.
    pub fn attacker_rate(&self) -> f64 {
        self.rate(self.attacker_match)
    }

    /// Fraction of positions matching neither stream.
    pub fn neither_rate(&self) -> f64 {
        self.rate(self.neither)
    }

    fn rate(&self, count: u64) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64
        }
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: &BitErrorResult) {
        self.victim_match += other.victim_match;
        self.attacker_match += other.attacker_match;
        self.neither += other.neither;
        self.total += other.total;
    }
}

/// Offline evaluator over complete buffers.
#[derive(Debug, Clone, Default)]
pub struct BitErrorEvaluator;

impl BitErrorEvaluator {
    /// Compare `recovered` against both references, with the references
    /// delayed by `delay` positions (position `i` of the recovered
    /// stream lines up with position `i - delay` of each reference).
    /// The first `delay` positions fall outside the alignment window and
    /// are not counted. Deterministic for identical inputs.
    pub fn compare(
        recovered: &[u8],
        victim: &[u8],
        attacker: &[u8],
        delay: usize,
    ) -> BitErrorResult {
        let mut result = BitErrorResult::default();
        for i in delay..recovered.len() {
            let r = i - delay;
            let v = victim.get(r);
            let a = attacker.get(r);
            if v.is_none() && a.is_none() {
                break;
            }
            let v_match = v == Some(&recovered[i]);
            let a_match = a == Some(&recovered[i]);
            if v_match {
                result.victim_match += 1;
            }
            if a_match {
                result.attacker_match += 1;
            }
            if !v_match && !a_match {
                result.neither += 1;
            }
            result.total += 1;
        }
        result
    }

    /// Compare at a signed shift: positive delays the references (as
    /// `compare` does), negative delays the recovered stream instead.
    pub fn compare_at(
        recovered: &[u8],
        victim: &[u8],
        attacker: &[u8],
        shift: i64,
    ) -> BitErrorResult {
        if shift >= 0 {
            Self::compare(recovered, victim, attacker, shift as usize)
        } else {
            let skip = (-shift) as usize;
            Self::compare(
                recovered,
                &victim[skip.min(victim.len())..],
                &attacker[skip.min(attacker.len())..],
                0,
            )
        }
    }

    /// Search a window of signed shifts for the alignment maximizing the
    /// victim match rate. Returns `(shift, result_at_that_shift)`. Used
    /// when the pipeline latency is not known a priori — a receiver
    /// chain whose filters consume their startup window produces a
    /// stream that leads the reference, needing a negative shift.
    pub fn best_alignment(
        recovered: &[u8],
        victim: &[u8],
        attacker: &[u8],
        search: usize,
    ) -> (i64, BitErrorResult) {
        let mut best_shift = 0i64;
        let mut best = BitErrorResult::default();
        let range = search.max(1) as i64;
        for shift in -range..=range {
            let result = Self::compare_at(recovered, victim, attacker, shift);
            if result.total > 0 && result.victim_rate() > best.victim_rate() {
                best = result;
                best_shift = shift;
            }
        }
        (best_shift, best)
    }
}

/// Streaming three-input evaluator sink.
///
/// Port 0: recovered stream; port 1: victim reference; port 2: attacker
/// reference. References pass through an internal delay of `delay`
/// samples; the run's counters accumulate in shared storage readable
/// after the graph completes.
#[derive(Debug)]
pub struct BitErrorSink {
    delay: usize,
    victim_delay: ByteDelay,
    attacker_delay: ByteDelay,
    /// Positions seen so far (for skipping the unaligned prefix).
    position: u64,
    result: Arc<Mutex<BitErrorResult>>,
}

impl BitErrorSink {
    /// Create the sink plus the shared handle to its counters.
    pub fn shared(delay: usize) -> (Self, Arc<Mutex<BitErrorResult>>) {
        let result = Arc::new(Mutex::new(BitErrorResult::default()));
        (
            Self {
                delay,
                victim_delay: ByteDelay::new(delay),
                attacker_delay: ByteDelay::new(delay),
                position: 0,
                result: Arc::clone(&result),
            },
            result,
        )
    }

    /// The configured alignment delay.
    pub fn delay(&self) -> usize {
        self.delay
    }
}

impl Block for BitErrorSink {
    fn name(&self) -> &str {
        "bit_error_sink"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte, PortType::Byte, PortType::Byte]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        _outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let n = inputs[0]
            .available()
            .min(inputs[1].available())
            .min(inputs[2].available());
        if n == 0 {
            // The recovered stream ending ends the evaluation; reference
            // sources are typically unbounded.
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        let recovered = inputs[0].bytes().pop(n);
        let victim = inputs[1].bytes().pop(n);
        let attacker = inputs[2].bytes().pop(n);

        let mut result = self.result.lock().expect("evaluator counters poisoned");
        for i in 0..n {
            let v = self.victim_delay.process(victim[i]);
            let a = self.attacker_delay.process(attacker[i]);
            self.position += 1;
            if self.position <= self.delay as u64 {
                continue;
            }
            let v_match = recovered[i] == v;
            let a_match = recovered[i] == a;
            if v_match {
                result.victim_match += 1;
            }
            if a_match {
                result.attacker_match += 1;
            }
            if !v_match && !a_match {
                result.neither += 1;
            }
            result.total += 1;
        }
        Ok(WorkState::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_victim_match() {
        let victim: Vec<u8> = (0..100).map(|i| (i % 2) as u8).collect();
        let attacker = vec![1u8; 100];
        // Recovered = victim shifted right by 3.
        let mut recovered = vec![0u8; 3];
        recovered.extend_from_slice(&victim);

        let result = BitErrorEvaluator::compare(&recovered, &victim, &attacker, 3);
        assert_eq!(result.total, 100);
        assert_eq!(result.victim_match, 100);
        assert_eq!(result.victim_rate(), 1.0);
        assert_eq!(result.neither, 0);
    }

    #[test]
    fn test_three_way_classification() {
        let victim = vec![0u8, 0, 0, 0];
        let attacker = vec![1u8, 1, 1, 1];
        let recovered = vec![0u8, 1, 7, 0];
        let result = BitErrorEvaluator::compare(&recovered, &victim, &attacker, 0);
        assert_eq!(result.victim_match, 2);
        assert_eq!(result.attacker_match, 1);
        assert_eq!(result.neither, 1);
        assert_eq!(result.total, 4);
    }

    #[test]
    fn test_overlapping_matches_count_both() {
        // Where victim and attacker transmitted the same value, a
        // matching position credits both.
        let victim = vec![5u8, 5];
        let attacker = vec![5u8, 6];
        let recovered = vec![5u8, 5];
        let result = BitErrorEvaluator::compare(&recovered, &victim, &attacker, 0);
        assert_eq!(result.victim_match, 2);
        assert_eq!(result.attacker_match, 1);
    }

    #[test]
    fn test_deterministic() {
        let victim: Vec<u8> = (0..64).map(|i| (i * 3 % 2) as u8).collect();
        let attacker: Vec<u8> = (0..64).map(|i| (i * 5 % 2) as u8).collect();
        let recovered: Vec<u8> = (0..64).map(|i| (i * 7 % 2) as u8).collect();
        let a = BitErrorEvaluator::compare(&recovered, &victim, &attacker, 8);
        let b = BitErrorEvaluator::compare(&recovered, &victim, &attacker, 8);
        assert_eq!(a, b);
    }

    /// Aperiodic pseudo-random bit sequence for alignment tests.
    fn prbs(len: usize) -> Vec<u8> {
        let mut state = 0xACE1u32;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                ((state >> 16) & 1) as u8
            })
            .collect()
    }

    #[test]
    fn test_best_alignment_finds_true_delay() {
        let victim = prbs(200);
        let attacker = vec![0u8; 200];
        let mut recovered = vec![1u8; 17];
        recovered.extend_from_slice(&victim);

        let (delay, result) = BitErrorEvaluator::best_alignment(&recovered, &victim, &attacker, 64);
        assert_eq!(delay, 17);
        assert_eq!(result.victim_rate(), 1.0);
    }

    #[test]
    fn test_best_alignment_negative_shift() {
        // Recovered stream missing its first 9 positions — it leads the
        // reference, as a chain that eats its filter startup does.
        let victim = prbs(200);
        let attacker = vec![0u8; 200];
        let recovered = victim[9..].to_vec();

        let (shift, result) =
            BitErrorEvaluator::best_alignment(&recovered, &victim, &attacker, 64);
        assert_eq!(shift, -9);
        assert_eq!(result.victim_rate(), 1.0);
    }

    #[test]
    fn test_merge() {
        let mut a = BitErrorResult {
            victim_match: 10,
            attacker_match: 5,
            neither: 1,
            total: 16,
        };
        let b = BitErrorResult {
            victim_match: 2,
            attacker_match: 3,
            neither: 4,
            total: 8,
        };
        a.merge(&b);
        assert_eq!(a.victim_match, 12);
        assert_eq!(a.total, 24);
    }

    #[test]
    fn test_sink_in_graph() {
        use crate::flowgraph::FlowGraph;
        use crate::head::Head;
        use crate::pattern_source::{PacketPattern, PatternSource};

        // Recovered == victim == the pattern; attacker all-zero pattern.
        let mut graph = FlowGraph::new();
        let pattern = PacketPattern::new(32).unwrap();
        let recovered = graph.add_block(PatternSource::new(pattern.clone()));
        let rec_head = graph.add_block(Head::bytes(3072));
        let victim = graph.add_block(PatternSource::new(pattern));
        let attacker = graph.add_block(PatternSource::new(PacketPattern::new(0).unwrap()));

        let (sink, result) = BitErrorSink::shared(0);
        let sink = graph.add_block(sink);
        graph.connect(recovered, 0, rec_head, 0).unwrap();
        graph.connect(rec_head, 0, sink, 0).unwrap();
        graph.connect(victim, 0, sink, 1).unwrap();
        graph.connect(attacker, 0, sink, 2).unwrap();
        graph.run().unwrap();

        let result = result.lock().unwrap();
        assert_eq!(result.total, 3072);
        assert_eq!(result.victim_match, 3072);
        // The padding-0 pattern disagrees with the padding-32 pattern
        // only on the 2*32 positions the padding widened.
        assert_eq!(result.attacker_match, 3072 - 64);
    }
}
