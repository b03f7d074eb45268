//! The listener: one request frame in, one response frame out.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};

use crate::error::Result;
use crate::queue::{Completion, ExecutionJob, ExecutionQueue, QueueError};
use crate::result::{EMPTY_REQUEST, ExecutionResult};
use crate::transport::{
    Connection, DEFAULT_MAX_FRAME_LEN, Endpoint, Listener, Request, TransportError, recv_frame,
    send_frame,
};

/// Shared stop signal. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Endpoint to listen on.
    pub endpoint: Endpoint,
    /// How long a client waits for the host to finish a job.
    pub execution_timeout: Duration,
    /// How long a connected client may take to send its request.
    pub read_timeout: Duration,
    /// How long a client may take to accept the response.
    pub write_timeout: Duration,
    /// Largest request frame accepted.
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::from_env(),
            execution_timeout: Duration::from_secs(45),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Serves a single connection.
#[derive(Clone)]
pub struct ConnectionHandler {
    queue: Arc<ExecutionQueue>,
    config: ServerConfig,
    cancel: CancelToken,
}

impl ConnectionHandler {
    pub fn new(queue: Arc<ExecutionQueue>, config: ServerConfig, cancel: CancelToken) -> Self {
        Self {
            queue,
            config,
            cancel,
        }
    }

    /// Read the request, run it and write exactly one response frame.
    ///
    /// Returns without writing when the request never fully arrives or the
    /// server is stopped. Every wait gives up as soon as the server stops.
    pub async fn handle<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        let received = tokio::select! {
            received = tokio::time::timeout(
                self.config.read_timeout,
                recv_frame(stream, self.config.max_frame_len),
            ) => received,
            _ = self.cancel.cancelled() => {
                tracing::debug!("server stopping, dropping connection before its request");
                return Ok(());
            }
        };

        let response = match received {
            Ok(Ok(payload)) => {
                tracing::debug!(bytes = payload.len(), "received request");
                self.evaluate(&payload).await
            }
            Ok(Err(err @ TransportError::FrameTooLarge { .. })) => {
                Some(ExecutionResult::rejected(format!("Malformed request: {}", err)))
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(TransportError::ReadTimeout(self.config.read_timeout).into()),
        };

        let Some(response) = response else {
            tracing::info!("server stopping, closing connection without a response");
            return Ok(());
        };
        let bytes = response.to_bytes()?;
        tokio::select! {
            sent = tokio::time::timeout(self.config.write_timeout, send_frame(stream, &bytes)) => {
                match sent {
                    Ok(sent) => sent?,
                    Err(_) => {
                        return Err(TransportError::WriteTimeout(self.config.write_timeout).into());
                    }
                }
            }
            _ = self.cancel.cancelled() => {
                tracing::info!("server stopping, abandoning unsent response");
                return Ok(());
            }
        }
        tracing::debug!(bytes = bytes.len(), success = response.success(), "sent response");
        Ok(())
    }

    async fn evaluate(&self, payload: &[u8]) -> Option<ExecutionResult> {
        let request = match Request::from_bytes(payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request");
                return Some(ExecutionResult::rejected(format!("Malformed request: {}", e)));
            }
        };
        if request.is_empty() {
            return Some(ExecutionResult::rejected(EMPTY_REQUEST));
        }

        let job = ExecutionJob::new(request);
        tracing::info!(job = %job.id, files = job.files.len(), "accepted script");
        let ticket = match self.queue.submit(job) {
            Ok(ticket) => ticket,
            Err(QueueError::Busy) => return Some(ExecutionResult::busy()),
            Err(err) => return Some(ExecutionResult::rejected(err.to_string())),
        };

        match self
            .queue
            .await_completion(ticket, self.config.execution_timeout, &self.cancel)
            .await
        {
            Completion::Finished(result) => Some(result),
            Completion::TimedOut => Some(ExecutionResult::timed_out()),
            Completion::Cancelled => None,
        }
    }
}

/// Accepts connections until stopped, serving each on its own task.
///
/// Connections are concurrent so that a submission arriving while a job
/// runs is refused as busy at once; the queue still runs one job at a time.
pub struct ScriptServer {
    handler: ConnectionHandler,
    cancel: CancelToken,
}

impl ScriptServer {
    pub fn new(config: ServerConfig, queue: Arc<ExecutionQueue>) -> Self {
        let cancel = CancelToken::new();
        Self {
            handler: ConnectionHandler::new(queue, config, cancel.clone()),
            cancel,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.handler.config
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn stop_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Bind the configured endpoint.
    pub fn bind(&self) -> Result<Listener> {
        Ok(Listener::bind(&self.config().endpoint)?)
    }

    /// Bind, then serve until stopped.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Serve connections from `listener` until stopped. Returns once every
    /// open connection has been closed.
    pub async fn serve(&self, mut listener: Listener) -> Result<()> {
        tracing::info!(endpoint = %listener.endpoint(), "listening for scripts");
        let mut connections = JoinSet::new();

        loop {
            let connection = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(connection) => connection,
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
                _ = self.cancel.cancelled() => break,
            };

            while let Some(finished) = connections.try_join_next() {
                log_join(finished);
            }
            let handler = self.handler.clone();
            connections.spawn(serve_connection(handler, connection));
        }

        drop(listener);
        while let Some(finished) = connections.join_next().await {
            log_join(finished);
        }
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn serve_connection(handler: ConnectionHandler, mut connection: Connection) {
    if let Err(e) = handler.handle(&mut connection).await {
        match &e {
            crate::Error::Transport(t) if t.is_clean_close() => {
                tracing::debug!("client closed the connection without a request")
            }
            _ => tracing::warn!(error = %e, "connection failed"),
        }
    }
    let _ = connection.shutdown().await;
}

fn log_join(finished: std::result::Result<(), JoinError>) {
    if let Err(e) = finished {
        tracing::error!(error = %e, "connection task failed");
    }
}
