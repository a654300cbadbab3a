//! Head and SkipHead — stream limiting blocks
//!
//! `Head` passes exactly the first N items and then signals end-of-stream,
//! which is how a run over an otherwise infinite source is bounded to
//! `packets * bytes_per_packet` samples. `SkipHead` discards the first N
//! items and passes the rest.

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::DspResult;

/// Pass only the first N items of a stream, then end it.
#[derive(Debug, Clone)]
pub struct Head {
    limit: u64,
    count: u64,
    port: PortType,
}

impl Head {
    /// Head over a byte stream.
    pub fn bytes(limit: u64) -> Self {
        Self {
            limit,
            count: 0,
            port: PortType::Byte,
        }
    }

    /// Head over a complex stream.
    pub fn complex(limit: u64) -> Self {
        Self {
            limit,
            count: 0,
            port: PortType::Complex,
        }
    }

    /// Items still to pass before end-of-stream.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }

    /// Whether the limit has been reached.
    pub fn is_done(&self) -> bool {
        self.count >= self.limit
    }

    /// Change the limit. Takes effect immediately; lowering it below the
    /// pass count ends the stream on the next scheduler pass.
    pub fn set_length(&mut self, limit: u64) {
        self.limit = limit;
    }

    /// Reset the pass counter.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}

impl Block for Head {
    fn name(&self) -> &str {
        "head"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![self.port]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![self.port]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        if self.is_done() {
            return Ok(WorkState::Finished);
        }
        let budget = self.remaining().min(usize::MAX as u64) as usize;
        let n = inputs[0].available().min(outputs[0].free()).min(budget);
        if n == 0 {
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        match self.port {
            PortType::Byte => {
                let items = inputs[0].bytes().pop(n);
                outputs[0].bytes().push_slice(&items);
            }
            PortType::Complex => {
                let items = inputs[0].complex().pop(n);
                outputs[0].complex().push_slice(&items);
            }
        }
        self.count += n as u64;
        Ok(WorkState::Progress)
    }
}

/// Discard the first N items of a stream, pass the rest.
#[derive(Debug, Clone)]
pub struct SkipHead {
    skip: u64,
    skipped: u64,
    port: PortType,
}

impl SkipHead {
    /// SkipHead over a byte stream.
    pub fn bytes(skip: u64) -> Self {
        Self {
            skip,
            skipped: 0,
            port: PortType::Byte,
        }
    }

    /// SkipHead over a complex stream.
    pub fn complex(skip: u64) -> Self {
        Self {
            skip,
            skipped: 0,
            port: PortType::Complex,
        }
    }

    /// Items still to discard.
    pub fn remaining_skip(&self) -> u64 {
        self.skip.saturating_sub(self.skipped)
    }
}

impl Block for SkipHead {
    fn name(&self) -> &str {
        "skiphead"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![self.port]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![self.port]
    }

    fn work(
        &mut self,
        inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        // Discard phase
        let to_skip = self.remaining_skip().min(inputs[0].available() as u64) as usize;
        if to_skip > 0 {
            match self.port {
                PortType::Byte => {
                    inputs[0].bytes().pop(to_skip);
                }
                PortType::Complex => {
                    inputs[0].complex().pop(to_skip);
                }
            }
            self.skipped += to_skip as u64;
        }

        let n = inputs[0].available().min(outputs[0].free());
        if n == 0 {
            if inputs[0].is_drained() {
                return Ok(WorkState::Finished);
            }
            return Ok(if to_skip > 0 {
                WorkState::Progress
            } else {
                WorkState::Starved
            });
        }
        match self.port {
            PortType::Byte => {
                let items = inputs[0].bytes().pop(n);
                outputs[0].bytes().push_slice(&items);
            }
            PortType::Complex => {
                let items = inputs[0].complex().pop(n);
                outputs[0].complex().push_slice(&items);
            }
        }
        Ok(WorkState::Progress)
    }
}
