//! Throttle — wall-clock rate limiter
//!
//! Paces a stream to a target sample rate for real-time-like behavior in
//! interactive graphs. Purely a pacing device: it never alters samples,
//! and batch sweeps leave it out (or disable it) so bulk experiments run
//! at full speed.

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::DspResult;
use std::time::Instant;

/// Rate-limiting pass-through for byte streams.
#[derive(Debug, Clone)]
pub struct Throttle {
    sample_rate: f64,
    total_samples: u64,
    start_time: Option<Instant>,
    enabled: bool,
}

impl Throttle {
    /// Create a throttle at the given samples-per-second rate.
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate: sample_rate.max(1.0),
            total_samples: 0,
            start_time: None,
            enabled: true,
        }
    }

    /// How many samples the elapsed wall-clock time entitles us to pass.
    fn budget(&mut self) -> u64 {
        if !self.enabled {
            return u64::MAX;
        }
        let now = Instant::now();
        let start = *self.start_time.get_or_insert(now);
        let entitled = (now.duration_since(start).as_secs_f64() * self.sample_rate) as u64;
        entitled.saturating_sub(self.total_samples)
    }

    /// Target sample rate.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Change the target rate.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate.max(1.0);
    }

    /// Enable or disable pacing. Disabled, the block is a plain
    /// pass-through with no timing effect.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Total samples passed.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Reset timing state.
    pub fn reset(&mut self) {
        self.total_samples = 0;
        self.start_time = None;
    }
}

impl Block for Throttle {
    fn name(&self) -> &str {
        "throttle"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let budget = self.budget().min(usize::MAX as u64) as usize;
        let n = inputs[0].available().min(outputs[0].free()).min(budget);
        if n == 0 {
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            if budget == 0 && inputs[0].available() > 0 && outputs[0].free() > 0 {
                // Data is waiting on the clock, not on the graph.
                return Ok(WorkState::Pending);
            }
            return Ok(WorkState::Starved);
        }
        let items = inputs[0].bytes().pop(n);
        outputs[0].bytes().push_slice(&items);
        self.total_samples += n as u64;
        Ok(WorkState::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowgraph::FlowGraph;
    use crate::head::Head;
    use crate::pattern_source::{PacketPattern, PatternSource};
    use crate::vector_sink::ByteVectorSink;

    #[test]
    fn test_disabled_throttle_is_transparent() {
        let mut graph = FlowGraph::new();
        let src = graph.add_block(PatternSource::new(PacketPattern::new(0).unwrap()));
        let head = graph.add_block(Head::bytes(3072));
        let mut throttle = Throttle::new(100.0);
        throttle.set_enabled(false);
        let throttle = graph.add_block(throttle);
        let (sink, data) = ByteVectorSink::shared();
        let sink = graph.add_block(sink);
        graph.connect(src, 0, head, 0).unwrap();
        graph.connect(head, 0, throttle, 0).unwrap();
        graph.connect(throttle, 0, sink, 0).unwrap();

        let start = Instant::now();
        graph.run().unwrap();
        // At 100 samples/s a paced run would need ~30s; disabled, it is
        // effectively instant.
        assert!(start.elapsed().as_secs_f64() < 5.0);
        assert_eq!(data.lock().unwrap().len(), 3072);
    }

    #[test]
    fn test_throttle_paces_stream() {
        let mut graph = FlowGraph::new();
        let src = graph.add_block(PatternSource::new(PacketPattern::new(0).unwrap()));
        let head = graph.add_block(Head::bytes(200));
        let throttle = graph.add_block(Throttle::new(10_000.0));
        let (sink, data) = ByteVectorSink::shared();
        let sink = graph.add_block(sink);
        graph.connect(src, 0, head, 0).unwrap();
        graph.connect(head, 0, throttle, 0).unwrap();
        graph.connect(throttle, 0, sink, 0).unwrap();

        let start = Instant::now();
        graph.run().unwrap();
        // 200 samples at 10k/s is 20ms of pacing.
        assert!(start.elapsed().as_secs_f64() >= 0.015);
        assert_eq!(data.lock().unwrap().len(), 200);
    }

    #[test]
    fn test_budget_grows_with_time() {
        let mut t = Throttle::new(1_000_000.0);
        let first = t.budget();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(t.budget() > first);
    }
}
