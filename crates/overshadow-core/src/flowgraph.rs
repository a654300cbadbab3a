//! Flowgraph — typed block graph with a cooperative streaming scheduler
//!
//! A simulation topology is described as data: blocks with typed input and
//! output ports, plus port-to-port connections. The wiring is validated
//! (port types, fan-in, acyclicity) before any sample flows. Execution is a
//! single-threaded cooperative pull loop over bounded FIFO edges: a block
//! consumes no more input than is available and produces no more output
//! than downstream can currently accept, so backpressure propagates
//! naturally and the run terminates when the graph goes quiescent.
//!
//! ## Example
//!
//! ```rust
//! use overshadow_core::flowgraph::FlowGraph;
//! use overshadow_core::pattern_source::{PacketPattern, PatternSource};
//! use overshadow_core::head::Head;
//! use overshadow_core::vector_sink::ByteVectorSink;
//!
//! let mut graph = FlowGraph::new();
//! let src = graph.add_block(PatternSource::new(PacketPattern::new(32).unwrap()));
//! let head = graph.add_block(Head::bytes(100));
//! let (sink, data) = ByteVectorSink::shared();
//! let sink = graph.add_block(sink);
//!
//! graph.connect(src, 0, head, 0).unwrap();
//! graph.connect(head, 0, sink, 0).unwrap();
//! graph.run().unwrap();
//!
//! assert_eq!(data.lock().unwrap().len(), 100);
//! ```

use crate::types::{Complex, DspError, DspResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default per-edge buffer capacity, in samples.
pub const DEFAULT_EDGE_CAPACITY: usize = 16384;

/// Sample type carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    /// Bytes — packed data or bit streams constrained to {0, 1}.
    Byte,
    /// Complex baseband samples.
    Complex,
}

/// Stream metadata attached to an absolute item offset on an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Absolute item offset (in items written on this edge) the tag
    /// is attached to.
    pub offset: u64,
    /// Tag key, e.g. `"wrap"` for a repeating source restart.
    pub key: String,
}

/// Bounded FIFO carrying one sample type plus stream tags.
#[derive(Debug)]
pub struct Fifo<T> {
    queue: VecDeque<T>,
    capacity: usize,
    closed: bool,
    read_count: u64,
    write_count: u64,
    tags: VecDeque<Tag>,
    crossed_tags: Vec<Tag>,
}

impl<T: Copy> Fifo<T> {
    fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            closed: false,
            read_count: 0,
            write_count: 0,
            tags: VecDeque::new(),
            crossed_tags: Vec::new(),
        }
    }

    /// Items currently buffered.
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    /// Free space. Zero once the edge is closed.
    pub fn free(&self) -> usize {
        if self.closed {
            0
        } else {
            self.capacity - self.queue.len()
        }
    }

    /// Whether the producing side has closed the edge.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closed and fully consumed — true end-of-stream.
    pub fn is_drained(&self) -> bool {
        self.closed && self.queue.is_empty()
    }

    /// Close the edge. Remaining buffered items stay readable.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Push up to `free()` items; returns how many were accepted.
    pub fn push_slice(&mut self, items: &[T]) -> usize {
        let take = items.len().min(self.free());
        self.queue.extend(items[..take].iter().copied());
        self.write_count += take as u64;
        take
    }

    /// Pop up to `max` items.
    pub fn pop(&mut self, max: usize) -> Vec<T> {
        let take = max.min(self.queue.len());
        let out: Vec<T> = self.queue.drain(..take).collect();
        self.read_count += take as u64;
        while let Some(tag) = self.tags.front() {
            if tag.offset < self.read_count {
                self.crossed_tags.push(self.tags.pop_front().unwrap());
            } else {
                break;
            }
        }
        out
    }

    /// Pop everything currently buffered.
    pub fn pop_all(&mut self) -> Vec<T> {
        self.pop(usize::MAX)
    }

    /// Attach a tag at the current write offset.
    pub fn add_tag(&mut self, key: impl Into<String>) {
        self.tags.push_back(Tag {
            offset: self.write_count,
            key: key.into(),
        });
    }

    /// Attach a tag at an explicit absolute offset.
    pub fn add_tag_at(&mut self, offset: u64, key: impl Into<String>) {
        self.tags.push_back(Tag {
            offset,
            key: key.into(),
        });
    }

    /// Total items written since creation.
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// Total items read since creation.
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    fn take_crossed_tags(&mut self) -> Vec<Tag> {
        std::mem::take(&mut self.crossed_tags)
    }

    fn take_pending_tags(&mut self) -> Vec<Tag> {
        self.tags.drain(..).collect()
    }
}

/// A typed stream buffer: either a byte FIFO or a complex FIFO.
///
/// Graph validation guarantees that a block only ever sees the port types
/// it declared, so the typed accessors panic on mismatch instead of
/// returning a `Result`.
#[derive(Debug)]
pub enum StreamBuffer {
    Bytes(Fifo<u8>),
    Complex(Fifo<Complex>),
}

impl StreamBuffer {
    /// Create an empty buffer of the given port type and capacity.
    pub fn new(port: PortType, capacity: usize) -> Self {
        match port {
            PortType::Byte => StreamBuffer::Bytes(Fifo::new(capacity)),
            PortType::Complex => StreamBuffer::Complex(Fifo::new(capacity)),
        }
    }

    /// The sample type this buffer carries.
    pub fn port_type(&self) -> PortType {
        match self {
            StreamBuffer::Bytes(_) => PortType::Byte,
            StreamBuffer::Complex(_) => PortType::Complex,
        }
    }

    /// Access as a byte FIFO. Panics if the buffer carries complex samples.
    pub fn bytes(&mut self) -> &mut Fifo<u8> {
        match self {
            StreamBuffer::Bytes(f) => f,
            StreamBuffer::Complex(_) => panic!("port type mismatch: expected bytes"),
        }
    }

    /// Access as a complex FIFO. Panics if the buffer carries bytes.
    pub fn complex(&mut self) -> &mut Fifo<Complex> {
        match self {
            StreamBuffer::Complex(f) => f,
            StreamBuffer::Bytes(_) => panic!("port type mismatch: expected complex"),
        }
    }

    /// Items currently buffered.
    pub fn available(&self) -> usize {
        match self {
            StreamBuffer::Bytes(f) => f.available(),
            StreamBuffer::Complex(f) => f.available(),
        }
    }

    /// Free space.
    pub fn free(&self) -> usize {
        match self {
            StreamBuffer::Bytes(f) => f.free(),
            StreamBuffer::Complex(f) => f.free(),
        }
    }

    /// Closed and fully consumed.
    pub fn is_drained(&self) -> bool {
        match self {
            StreamBuffer::Bytes(f) => f.is_drained(),
            StreamBuffer::Complex(f) => f.is_drained(),
        }
    }

    fn close(&mut self) {
        match self {
            StreamBuffer::Bytes(f) => f.close(),
            StreamBuffer::Complex(f) => f.close(),
        }
    }

    fn take_crossed_tags(&mut self) -> Vec<Tag> {
        match self {
            StreamBuffer::Bytes(f) => f.take_crossed_tags(),
            StreamBuffer::Complex(f) => f.take_crossed_tags(),
        }
    }

    fn take_pending_tags(&mut self) -> Vec<Tag> {
        match self {
            StreamBuffer::Bytes(f) => f.take_pending_tags(),
            StreamBuffer::Complex(f) => f.take_pending_tags(),
        }
    }
}

/// Outcome of one `work` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    /// The block consumed input and/or produced output.
    Progress,
    /// Nothing to do right now — no input available or no output space.
    Starved,
    /// Waiting on wall-clock time (rate limiter). Keeps the scheduler
    /// alive even when no other block makes progress.
    Pending,
    /// The block will never produce again; its outputs can be closed.
    Finished,
}

/// A processing block in the flowgraph.
///
/// A block declares its typed ports once, and is driven by the scheduler
/// through `work`: `inputs` are the live upstream edges (one per input
/// port), `outputs` are staging buffers whose capacity reflects current
/// downstream space. All adaptive state (filter memory, loop estimates)
/// lives inside the block and is owned exclusively by it; external callers
/// reconfigure only through the block's documented setters before the
/// graph starts.
pub trait Block: Send {
    /// Display name for diagnostics.
    fn name(&self) -> &str;

    /// Sample types of the input ports, in port order.
    fn input_ports(&self) -> Vec<PortType>;

    /// Sample types of the output ports, in port order.
    fn output_ports(&self) -> Vec<PortType>;

    /// Consume available input, produce output into the staging buffers.
    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState>;

    /// Called once when the block reaches end-of-stream or the run is
    /// cancelled. Sinks flush and close their backing resources here.
    fn finalize(&mut self) -> DspResult<()> {
        Ok(())
    }
}

/// Handle to a block inside a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

struct BlockEntry {
    block: Box<dyn Block>,
    name: String,
    inputs: Vec<PortType>,
    outputs: Vec<PortType>,
    /// One upstream edge per input port (fan-in of 1).
    input_edge: Vec<Option<usize>>,
    /// Downstream edges per output port (fan-out allowed).
    output_edges: Vec<Vec<usize>>,
    finished: bool,
    finalized: bool,
}

/// Statistics from a completed (or stopped) graph run.
#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    /// Scheduler passes over the block list.
    pub passes: u64,
    /// True if the run ended because the graph went quiescent rather
    /// than being stopped externally.
    pub finished_naturally: bool,
    /// True if the run was cancelled by `stop()`.
    pub stopped: bool,
}

/// A directed acyclic graph of blocks and typed connections.
pub struct FlowGraph {
    blocks: Vec<BlockEntry>,
    edges: Vec<Option<StreamBuffer>>,
    edge_capacity: usize,
    topo_order: Vec<usize>,
    validated: bool,
}

impl std::fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowGraph")
            .field("blocks", &self.blocks.len())
            .field("edges", &self.edges.len())
            .field("edge_capacity", &self.edge_capacity)
            .field("topo_order", &self.topo_order)
            .field("validated", &self.validated)
            .finish()
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowGraph {
    /// Create an empty graph with the default edge capacity.
    pub fn new() -> Self {
        Self::with_edge_capacity(DEFAULT_EDGE_CAPACITY)
    }

    /// Create an empty graph with a custom per-edge buffer capacity.
    pub fn with_edge_capacity(edge_capacity: usize) -> Self {
        Self {
            blocks: Vec::new(),
            edges: Vec::new(),
            edge_capacity: edge_capacity.max(1),
            topo_order: Vec::new(),
            validated: false,
        }
    }

    /// Add a block and return its id.
    pub fn add_block(&mut self, block: impl Block + 'static) -> BlockId {
        self.add_boxed(Box::new(block))
    }

    /// Add an already-boxed block.
    pub fn add_boxed(&mut self, block: Box<dyn Block>) -> BlockId {
        let name = block.name().to_string();
        let inputs = block.input_ports();
        let outputs = block.output_ports();
        let input_edge = vec![None; inputs.len()];
        let output_edges = vec![Vec::new(); outputs.len()];
        self.blocks.push(BlockEntry {
            block,
            name,
            inputs,
            outputs,
            input_edge,
            output_edges,
            finished: false,
            finalized: false,
        });
        self.validated = false;
        BlockId(self.blocks.len() - 1)
    }

    /// Number of blocks in the graph.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Connect `src` output port to `dst` input port.
    ///
    /// Checked immediately: ports must exist, their sample types must
    /// match, and the destination port must not already be fed (fan-in
    /// of 1). Fan-out from one output port to several consumers is
    /// allowed; each consumer gets its own buffered edge.
    pub fn connect(
        &mut self,
        src: BlockId,
        src_port: usize,
        dst: BlockId,
        dst_port: usize,
    ) -> DspResult<()> {
        let src_ty = self
            .blocks
            .get(src.0)
            .and_then(|b| b.outputs.get(src_port).copied())
            .ok_or_else(|| {
                DspError::Graph(format!("no such output port {}:{}", src.0, src_port))
            })?;
        let dst_ty = self
            .blocks
            .get(dst.0)
            .and_then(|b| b.inputs.get(dst_port).copied())
            .ok_or_else(|| DspError::Graph(format!("no such input port {}:{}", dst.0, dst_port)))?;
        if src_ty != dst_ty {
            return Err(DspError::Graph(format!(
                "port type mismatch: {} out {} is {:?}, {} in {} is {:?}",
                self.blocks[src.0].name, src_port, src_ty, self.blocks[dst.0].name, dst_port, dst_ty
            )));
        }
        if self.blocks[dst.0].input_edge[dst_port].is_some() {
            return Err(DspError::Graph(format!(
                "input port {} of {} already connected",
                dst_port, self.blocks[dst.0].name
            )));
        }

        let edge_idx = self.edges.len();
        self.edges
            .push(Some(StreamBuffer::new(src_ty, self.edge_capacity)));
        self.blocks[src.0].output_edges[src_port].push(edge_idx);
        self.blocks[dst.0].input_edge[dst_port] = Some(edge_idx);
        self.validated = false;
        Ok(())
    }

    /// Validate the wiring: every input port connected, no cycles.
    /// Computes the topological execution order as a side effect.
    pub fn validate(&mut self) -> DspResult<()> {
        for entry in &self.blocks {
            for (port, edge) in entry.input_edge.iter().enumerate() {
                if edge.is_none() {
                    return Err(DspError::Graph(format!(
                        "input port {} of {} is not connected",
                        port, entry.name
                    )));
                }
            }
        }

        // Kahn's algorithm over block-level adjacency.
        let n = self.blocks.len();
        let mut indegree = vec![0usize; n];
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (dst_idx, entry) in self.blocks.iter().enumerate() {
            for edge in entry.input_edge.iter().flatten() {
                let src_idx = self
                    .blocks
                    .iter()
                    .position(|b| b.output_edges.iter().any(|es| es.contains(edge)))
                    .ok_or_else(|| DspError::Graph("edge without producer".into()))?;
                adjacency[src_idx].push(dst_idx);
                indegree[dst_idx] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &next in &adjacency[i] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        if order.len() != n {
            return Err(DspError::Graph("graph contains a cycle".into()));
        }

        self.topo_order = order;
        self.validated = true;
        Ok(())
    }

    /// Run the graph to completion on the calling thread.
    pub fn run(&mut self) -> DspResult<GraphStats> {
        let stop = AtomicBool::new(false);
        self.run_until(&stop)
    }

    /// Run until the graph goes quiescent or `stop` becomes true.
    ///
    /// A stopped run drains nothing further: in-flight samples are
    /// discarded, but every block is finalized so sinks flush and close,
    /// retaining partial output.
    pub fn run_until(&mut self, stop: &AtomicBool) -> DspResult<GraphStats> {
        if !self.validated {
            self.validate()?;
        }
        let mut stats = GraphStats::default();
        let order = self.topo_order.clone();

        loop {
            if stop.load(Ordering::Relaxed) {
                stats.stopped = true;
                break;
            }
            let mut progress = false;
            let mut pending = false;
            let mut all_finished = true;

            for &idx in &order {
                if self.blocks[idx].finished {
                    continue;
                }
                all_finished = false;
                match self.step_block(idx)? {
                    WorkState::Progress => progress = true,
                    WorkState::Pending => pending = true,
                    WorkState::Finished => {
                        self.finish_block(idx)?;
                        progress = true;
                    }
                    WorkState::Starved => {}
                }
            }

            stats.passes += 1;
            if all_finished {
                stats.finished_naturally = true;
                break;
            }
            if !progress {
                if pending {
                    thread::sleep(Duration::from_millis(1));
                } else {
                    // Quiescent: bounded paths are complete and unbounded
                    // sources are stalled on backpressure.
                    stats.finished_naturally = true;
                    break;
                }
            }
        }

        for idx in 0..self.blocks.len() {
            self.finalize_block(idx)?;
        }
        Ok(stats)
    }

    /// Move the graph to a worker thread and return a stop/wait handle.
    pub fn start(mut self) -> FlowGraphHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_inner = Arc::clone(&stop);
        let join = thread::spawn(move || self.run_until(&stop_inner));
        FlowGraphHandle {
            stop,
            join: Some(join),
        }
    }

    /// Drive one block: gather its input edges, stage output space,
    /// invoke `work`, distribute staged output to all consumers, and
    /// propagate tags.
    fn step_block(&mut self, idx: usize) -> DspResult<WorkState> {
        let input_edge_ids: Vec<usize> = self.blocks[idx]
            .input_edge
            .iter()
            .map(|e| e.expect("validated graph"))
            .collect();

        let mut inputs: Vec<StreamBuffer> = input_edge_ids
            .iter()
            .map(|&e| self.edges[e].take().expect("edge in use"))
            .collect();

        let output_ports = self.blocks[idx].outputs.clone();
        let mut had_space = true;
        let mut outputs: Vec<StreamBuffer> = Vec::with_capacity(output_ports.len());
        for (port, &ty) in output_ports.iter().enumerate() {
            let consumers = &self.blocks[idx].output_edges[port];
            let cap = if consumers.is_empty() {
                self.edge_capacity
            } else {
                consumers
                    .iter()
                    .map(|&e| self.edges[e].as_ref().expect("edge present").free())
                    .min()
                    .unwrap_or(0)
            };
            if cap == 0 {
                had_space = false;
            }
            outputs.push(StreamBuffer::new(ty, cap));
        }

        let state = self.blocks[idx].block.work(&mut inputs, &mut outputs)?;

        // Tags consumed from inputs this call propagate to every output,
        // re-attached at the head of the batch emitted by the same call.
        let crossed: Vec<Tag> = inputs
            .iter_mut()
            .flat_map(|b| b.take_crossed_tags())
            .collect();

        let inputs_drained = !inputs.is_empty() && inputs.iter().all(|b| b.is_drained());

        for (buf, &e) in inputs.into_iter().zip(input_edge_ids.iter()) {
            self.edges[e] = Some(buf);
        }

        for (port, mut staged) in outputs.into_iter().enumerate() {
            let new_tags = staged.take_pending_tags();
            let consumers = self.blocks[idx].output_edges[port].clone();
            match staged {
                StreamBuffer::Bytes(mut f) => {
                    let items = f.pop_all();
                    for &e in &consumers {
                        let edge = self.edges[e].as_mut().expect("edge present").bytes();
                        let base = edge.write_count();
                        for tag in &new_tags {
                            edge.add_tag_at(base + tag.offset, tag.key.clone());
                        }
                        for tag in &crossed {
                            edge.add_tag_at(base, tag.key.clone());
                        }
                        edge.push_slice(&items);
                    }
                }
                StreamBuffer::Complex(mut f) => {
                    let items = f.pop_all();
                    for &e in &consumers {
                        let edge = self.edges[e].as_mut().expect("edge present").complex();
                        let base = edge.write_count();
                        for tag in &new_tags {
                            edge.add_tag_at(base + tag.offset, tag.key.clone());
                        }
                        for tag in &crossed {
                            edge.add_tag_at(base, tag.key.clone());
                        }
                        edge.push_slice(&items);
                    }
                }
            }
        }

        // End-of-stream safety net: a block whose inputs are fully drained
        // and which reported Starved with output space open has nothing
        // left to flush.
        if state == WorkState::Starved && inputs_drained && had_space {
            return Ok(WorkState::Finished);
        }
        Ok(state)
    }

    fn finish_block(&mut self, idx: usize) -> DspResult<()> {
        self.blocks[idx].finished = true;
        // Downstream sees end-of-stream; upstream sees a dead consumer.
        let out_edges: Vec<usize> = self.blocks[idx]
            .output_edges
            .iter()
            .flatten()
            .copied()
            .collect();
        let in_edges: Vec<usize> = self.blocks[idx].input_edge.iter().flatten().copied().collect();
        for e in out_edges.into_iter().chain(in_edges) {
            if let Some(edge) = self.edges[e].as_mut() {
                edge.close();
            }
        }
        self.finalize_block(idx)
    }

    fn finalize_block(&mut self, idx: usize) -> DspResult<()> {
        if !self.blocks[idx].finalized {
            self.blocks[idx].finalized = true;
            self.blocks[idx].block.finalize()?;
        }
        Ok(())
    }
}

/// Stop/wait handle for a graph running on a worker thread.
///
/// `stop()` requests cancellation; `wait()` joins the worker and returns
/// the run statistics. Together they satisfy the graceful-shutdown
/// contract: in-flight samples are dropped, sinks are flushed and closed,
/// and partial output is retained.
pub struct FlowGraphHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<DspResult<GraphStats>>>,
}

impl FlowGraphHandle {
    /// Request the running graph to stop after the current pass.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Wait for the graph to finish and return its statistics.
    pub fn wait(mut self) -> DspResult<GraphStats> {
        let join = self.join.take().expect("wait called once");
        join.join()
            .map_err(|_| DspError::Graph("flowgraph worker panicked".into()))?
    }
}
