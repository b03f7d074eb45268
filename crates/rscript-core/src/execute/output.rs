//! Incremental delivery of printed lines.

use std::io::{self, Write};

use crate::transport::{Endpoint, TransportError, connect_blocking, write_frame_blocking};

/// Receives each printed line as soon as the script prints it.
pub trait OutputSink: Send {
    fn emit(&mut self, line: &str) -> io::Result<()>;
}

/// Streams lines as frames to a client-owned endpoint.
pub struct FrameSink {
    stream: Box<dyn Write + Send>,
}

impl FrameSink {
    /// Connect to the endpoint the request named. Blocking; runs on the UI
    /// thread right before the script starts.
    pub fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let stream = connect_blocking(endpoint)?;
        tracing::debug!(endpoint = %endpoint, "connected output stream");
        Ok(Self { stream })
    }
}

impl OutputSink for FrameSink {
    fn emit(&mut self, line: &str) -> io::Result<()> {
        write_frame_blocking(&mut self.stream, line.as_bytes()).map_err(|err| match err {
            TransportError::Io(err) => err,
            other => io::Error::other(other),
        })
    }
}

/// Collects lines in memory.
impl OutputSink for Vec<String> {
    fn emit(&mut self, line: &str) -> io::Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::transport::{DEFAULT_MAX_FRAME_LEN, read_frame_blocking};
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_frame_sink_writes_one_frame_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let endpoint = Endpoint::new(path.to_string_lossy());

        let mut sink = FrameSink::connect(&endpoint).unwrap();
        let (mut accepted, _) = listener.accept().unwrap();
        sink.emit("one").unwrap();
        sink.emit("two").unwrap();
        drop(sink);

        let first = read_frame_blocking(&mut accepted, DEFAULT_MAX_FRAME_LEN).unwrap();
        let second = read_frame_blocking(&mut accepted, DEFAULT_MAX_FRAME_LEN).unwrap();
        assert_eq!(first, b"one");
        assert_eq!(second, b"two");
        let end = read_frame_blocking(&mut accepted, DEFAULT_MAX_FRAME_LEN).unwrap_err();
        assert!(end.is_clean_close());
    }

    #[test]
    fn test_frame_sink_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::new(dir.path().join("missing.sock").to_string_lossy());
        let err = FrameSink::connect(&endpoint).err().unwrap();
        assert!(err.is_unreachable());
    }
}
