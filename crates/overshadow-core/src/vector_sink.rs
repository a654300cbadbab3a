//! Vector sinks — collect a stream into memory
//!
//! Mostly a test and inspection tool: the sink shares its storage through
//! an `Arc<Mutex<Vec<_>>>` handle so the caller can examine everything
//! the graph produced after the run completes.

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::{Complex, DspResult};
use std::sync::{Arc, Mutex};

/// Collects a byte stream.
#[derive(Debug)]
pub struct ByteVectorSink {
    data: Arc<Mutex<Vec<u8>>>,
}

impl ByteVectorSink {
    /// Create a sink plus the shared handle to its storage.
    pub fn shared() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let data = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                data: Arc::clone(&data),
            },
            data,
        )
    }
}

impl Block for ByteVectorSink {
    fn name(&self) -> &str {
        "vector_sink_b"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        _outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let items = inputs[0].bytes().pop_all();
        if items.is_empty() {
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        self.data.lock().expect("sink storage poisoned").extend(items);
        Ok(WorkState::Progress)
    }
}

/// Collects a complex stream.
#[derive(Debug)]
pub struct ComplexVectorSink {
    data: Arc<Mutex<Vec<Complex>>>,
}

impl ComplexVectorSink {
    /// Create a sink plus the shared handle to its storage.
    pub fn shared() -> (Self, Arc<Mutex<Vec<Complex>>>) {
        let data = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                data: Arc::clone(&data),
            },
            data,
        )
    }
}

impl Block for ComplexVectorSink {
    fn name(&self) -> &str {
        "vector_sink_c"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![PortType::Complex]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        _outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        let items = inputs[0].complex().pop_all();
        if items.is_empty() {
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        self.data.lock().expect("sink storage poisoned").extend(items);
        Ok(WorkState::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowgraph::FlowGraph;
    use crate::head::Head;
    use crate::random_source::RandomByteSource;

    #[test]
    fn test_byte_sink_collects() {
        let mut graph = FlowGraph::new();
        let src = graph.add_block(RandomByteSource::full_range(5));
        let head = graph.add_block(Head::bytes(777));
        let (sink, data) = ByteVectorSink::shared();
        let sink = graph.add_block(sink);
        graph.connect(src, 0, head, 0).unwrap();
        graph.connect(head, 0, sink, 0).unwrap();
        graph.run().unwrap();
        assert_eq!(data.lock().unwrap().len(), 777);
    }
}
