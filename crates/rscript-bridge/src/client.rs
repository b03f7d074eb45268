//! Talks to a running host: one request out, one result back.

use std::time::Duration;

use rscript_core::transport::{
    DEFAULT_MAX_FRAME_LEN, Endpoint, Listener, Request, TransportError, connect, recv_frame,
    send_frame,
};
use rscript_core::ExecutionResult;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long to keep draining the output stream after the result arrived.
const STREAM_DRAIN: Duration = Duration::from_millis(500);

/// Client settings, filled from the command line.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub connect_timeout: Duration,
    /// How long to wait for the result once the request is sent.
    pub response_timeout: Duration,
    /// Ask the host to stream printed lines while the script runs.
    pub stream: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::from_env(),
            connect_timeout: Duration::from_millis(1000),
            response_timeout: Duration::from_secs(60),
            stream: true,
        }
    }
}

pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Send `request` and wait for the result.
    ///
    /// Streamed lines are passed to `on_line` as they arrive, before the
    /// result is returned.
    pub async fn submit(
        &self,
        mut request: Request,
        mut on_line: impl FnMut(&str),
    ) -> Result<ExecutionResult, TransportError> {
        let mut stream = None;
        if self.config.stream {
            match OutputStream::open() {
                Ok(output) => {
                    request = request.with_output(output.endpoint());
                    stream = Some(output);
                }
                Err(e) => tracing::warn!(error = %e, "output streaming unavailable"),
            }
        }

        let payload = request.to_bytes().map_err(invalid_data)?;
        let mut connection = connect(&self.config.endpoint, self.config.connect_timeout).await?;
        tracing::debug!(endpoint = %self.config.endpoint, bytes = payload.len(), "sending request");
        send_frame(&mut connection, &payload).await?;

        let mut response = Box::pin(tokio::time::timeout(
            self.config.response_timeout,
            recv_frame(&mut connection, DEFAULT_MAX_FRAME_LEN),
        ));
        let received = match stream.as_mut() {
            Some(output) => loop {
                tokio::select! {
                    received = &mut response => break received,
                    Some(line) = output.lines.recv() => on_line(&line),
                }
            },
            None => response.await,
        };
        let bytes = received
            .map_err(|_| TransportError::ReadTimeout(self.config.response_timeout))??;

        if let Some(output) = stream {
            output.drain(&mut on_line).await;
        }
        ExecutionResult::from_bytes(&bytes).map_err(invalid_data)
    }
}

/// A listener the host connects back to with printed lines.
struct OutputStream {
    endpoint: Endpoint,
    lines: mpsc::UnboundedReceiver<String>,
    reader: JoinHandle<()>,
}

impl OutputStream {
    fn open() -> std::io::Result<Self> {
        let endpoint = Endpoint::unique("rscript-output");
        let mut listener = Listener::bind(&endpoint)?;
        let (sender, lines) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            let mut connection = match listener.accept().await {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::warn!(error = %e, "output stream accept failed");
                    return;
                }
            };
            loop {
                match recv_frame(&mut connection, DEFAULT_MAX_FRAME_LEN).await {
                    Ok(frame) => {
                        let line = String::from_utf8_lossy(&frame).into_owned();
                        if sender.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.is_clean_close() => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "output stream ended early");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            endpoint,
            lines,
            reader,
        })
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Deliver lines still in flight. The host closes the stream when the
    /// script ends, so this normally returns at once.
    async fn drain(mut self, on_line: &mut impl FnMut(&str)) {
        let deadline = tokio::time::sleep(STREAM_DRAIN);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                line = self.lines.recv() => match line {
                    Some(line) => on_line(&line),
                    None => break,
                },
                _ = &mut deadline => {
                    tracing::debug!("output stream still open, giving up on it");
                    break;
                }
            }
        }
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn invalid_data(err: serde_json::Error) -> TransportError {
    TransportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}
