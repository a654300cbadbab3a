//! Byte file source and sink
//!
//! `FileByteSource` replays a raw byte file (no header) as a stream,
//! wrapping to the start when `repeat` is on — the usual way recorded
//! downlink captures feed a simulation. `FileByteSink` writes a recovered
//! stream back out, truncating any previous contents; the file is
//! complete only once the producing run reaches a terminal state and the
//! sink is finalized.

use crate::flowgraph::{Block, PortType, StreamBuffer, WorkState};
use crate::types::DspResult;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Repeating raw byte file source.
///
/// The whole backing file is read at open time (capture files here are
/// small multiples of the 3072-byte pattern); `reopen` swaps the backing
/// buffer as a live reconfiguration.
#[derive(Debug)]
pub struct FileByteSource {
    path: PathBuf,
    data: Vec<u8>,
    pos: usize,
    repeat: bool,
    exhausted: bool,
}

impl FileByteSource {
    /// Open a file. Fails with an i/o error if it cannot be read or is
    /// empty — a run must not silently substitute empty data.
    pub fn open(path: impl AsRef<Path>, repeat: bool) -> DspResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = Self::read_all(&path)?;
        Ok(Self {
            path,
            data,
            pos: 0,
            repeat,
            exhausted: false,
        })
    }

    fn read_all(path: &Path) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;
        if data.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("input file {} is empty", path.display()),
            ));
        }
        Ok(data)
    }

    /// Swap the backing file. On failure the current buffer stays active.
    pub fn reopen(&mut self, path: impl AsRef<Path>) -> DspResult<()> {
        let path = path.as_ref().to_path_buf();
        let data = Self::read_all(&path)?;
        self.path = path;
        self.data = data;
        self.pos = 0;
        self.exhausted = false;
        Ok(())
    }

    /// Produce up to `max_count` bytes. With `repeat` off, returns fewer
    /// (eventually zero) once the file is exhausted.
    pub fn next_bytes(&mut self, max_count: usize) -> (Vec<u8>, bool) {
        let mut out = Vec::with_capacity(max_count);
        let mut wrapped = false;
        while out.len() < max_count {
            if self.pos >= self.data.len() {
                if self.repeat {
                    self.pos = 0;
                    wrapped = true;
                } else {
                    self.exhausted = true;
                    break;
                }
            }
            let take = (max_count - out.len()).min(self.data.len() - self.pos);
            out.extend_from_slice(&self.data[self.pos..self.pos + take]);
            self.pos += take;
        }
        (out, wrapped)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the backing buffer.
    pub fn file_len(&self) -> usize {
        self.data.len()
    }

    /// Whether a non-repeating source has run out.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl Block for FileByteSource {
    fn name(&self) -> &str {
        "file_source"
    }

    fn input_ports(&self) -> Vec<PortType> {
        vec![]
    }

    fn output_ports(&self) -> Vec<PortType> {
        vec![PortType::Byte]
    }

    fn work(
        &mut self,
        _inputs: &mut [StreamBuffer],
        outputs: &mut [StreamBuffer],
    ) -> DspResult<WorkState> {
        if self.exhausted {
            return Ok(WorkState::Finished);
        }
        let n = outputs[0].free();
        if n == 0 {
            return Ok(WorkState::Starved);
        }
        let (bytes, wrapped) = self.next_bytes(n);
        if wrapped {
            outputs[0].bytes().add_tag("wrap");
        }
        if bytes.is_empty() {
            return Ok(WorkState::Finished);
        }
        outputs[0].bytes().push_slice(&bytes);
        Ok(WorkState::Progress)
    }
}

/// Truncating buffered byte file sink.
#[derive(Debug)]
pub struct FileByteSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl FileByteSink {
    /// Create (truncate) the output file.
    pub fn create(path: impl AsRef<Path>) -> DspResult<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            writer: Some(writer),
            written: 0,
        })
    }

    /// Write a buffer of bytes.
    pub fn write(&mut self, bytes: &[u8]) -> DspResult<()> {
        if let Some(w) = self.writer.as_mut() {
            w.write_all(bytes)?;
            self.written += bytes.len() as u64;
        }
        Ok(())
    }

    /// Flush and close the file. Idempotent.
    pub fn close(&mut self) -> DspResult<()> {
        if let Some(mut w) = self.writer.take() {
            w.flush()?;
        }
        Ok(())
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Block for FileByteSink {
    fn name(&self) -> &str {
        "file_sink"
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
        let n = inputs[0].available();
        if n == 0 {
            if inputs[0].is_drained() {
                self.close()?;
                return Ok(WorkState::Finished);
            }
            return Ok(WorkState::Starved);
        }
        let bytes = inputs[0].bytes().pop(n);
        self.write(&bytes)?;
        Ok(WorkState::Progress)
    }

    fn finalize(&mut self) -> DspResult<()> {
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowgraph::FlowGraph;
    use crate::head::Head;

    #[test]
    fn test_missing_file_is_io_error() {
        let err = FileByteSource::open("/nonexistent/path/input.raw", true).unwrap_err();
        assert!(matches!(err, crate::types::DspError::Io(_)));
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.raw");
        std::fs::write(&path, b"").unwrap();
        assert!(FileByteSource::open(&path, true).is_err());
    }

    #[test]
    fn test_repeat_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.raw");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let mut src = FileByteSource::open(&path, true).unwrap();
        let (bytes, wrapped) = src.next_bytes(7);
        assert_eq!(bytes, vec![1, 2, 3, 1, 2, 3, 1]);
        assert!(wrapped);
    }

    #[test]
    fn test_no_repeat_exhausts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.raw");
        std::fs::write(&path, [9u8; 5]).unwrap();

        let mut src = FileByteSource::open(&path, false).unwrap();
        let (bytes, _) = src.next_bytes(100);
        assert_eq!(bytes.len(), 5);
        assert!(src.is_exhausted());
        let (bytes, _) = src.next_bytes(100);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_reopen_swaps_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.raw");
        let b = dir.path().join("b.raw");
        std::fs::write(&a, [1u8; 4]).unwrap();
        std::fs::write(&b, [2u8; 4]).unwrap();

        let mut src = FileByteSource::open(&a, true).unwrap();
        src.reopen(&b).unwrap();
        let (bytes, _) = src.next_bytes(4);
        assert_eq!(bytes, vec![2u8; 4]);

        // Failed reopen keeps the current buffer.
        assert!(src.reopen(dir.path().join("missing.raw")).is_err());
        let (bytes, _) = src.next_bytes(2);
        assert_eq!(bytes, vec![2u8, 2]);
    }

    #[test]
    fn test_sink_truncates_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.raw");
        std::fs::write(&path, [0xAAu8; 100]).unwrap();

        let mut sink = FileByteSink::create(&path).unwrap();
        sink.write(&[1, 2, 3]).unwrap();
        sink.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_source_to_sink_graph() {
        let dir = tempfile::tempdir().unwrap();
        let in_path = dir.path().join("in.raw");
        let out_path = dir.path().join("out.raw");
        std::fs::write(&in_path, (0u8..=255).collect::<Vec<u8>>()).unwrap();

        let mut graph = FlowGraph::new();
        let src = graph.add_block(FileByteSource::open(&in_path, true).unwrap());
        let head = graph.add_block(Head::bytes(512));
        let sink = graph.add_block(FileByteSink::create(&out_path).unwrap());
        graph.connect(src, 0, head, 0).unwrap();
        graph.connect(head, 0, sink, 0).unwrap();
        graph.run().unwrap();

        let out = std::fs::read(&out_path).unwrap();
        assert_eq!(out.len(), 512);
        assert_eq!(out[0], 0);
        assert_eq!(out[256], 0);
        assert_eq!(out[511], 255);
    }
}
