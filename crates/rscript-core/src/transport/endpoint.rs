//! Local endpoints: Unix domain sockets on Unix, named pipes on Windows.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use super::TransportError;

/// Environment variable overriding the default endpoint.
pub const ENDPOINT_ENV: &str = "RSCRIPT_ENDPOINT";

#[cfg(windows)]
const PIPE_NAME: &str = "RScriptPipe";

/// Address of a local listener.
///
/// On Unix this is a socket path, on Windows a pipe name such as
/// `\\.\pipe\RScriptPipe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Platform default for the main request endpoint.
    pub fn default_main() -> Self {
        #[cfg(windows)]
        {
            Self(format!(r"\\.\pipe\{}", PIPE_NAME))
        }
        #[cfg(not(windows))]
        {
            Self(
                std::env::temp_dir()
                    .join("rscript.sock")
                    .to_string_lossy()
                    .into_owned(),
            )
        }
    }

    /// `RSCRIPT_ENDPOINT` if set, otherwise [`Endpoint::default_main`].
    pub fn from_env() -> Self {
        std::env::var(ENDPOINT_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(Self)
            .unwrap_or_else(Self::default_main)
    }

    /// A fresh endpoint that no other process uses.
    pub fn unique(prefix: &str) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", prefix, &id[..12]);
        #[cfg(windows)]
        {
            Self(format!(r"\\.\pipe\{}", name))
        }
        #[cfg(not(windows))]
        {
            Self(
                std::env::temp_dir()
                    .join(format!("{}.sock", name))
                    .to_string_lossy()
                    .into_owned(),
            )
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::default_main()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Endpoint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Endpoint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Duplex byte stream accepted by a [`Listener`] or opened by [`connect`].
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// A boxed duplex connection.
pub type Connection = Box<dyn AsyncStream>;

/// Accepts connections on an [`Endpoint`].
///
/// Must be created inside a tokio runtime. On Unix the socket file is
/// removed when the listener is dropped.
pub struct Listener {
    endpoint: Endpoint,
    #[cfg(unix)]
    inner: tokio::net::UnixListener,
    #[cfg(windows)]
    next: tokio::net::windows::named_pipe::NamedPipeServer,
}

impl Listener {
    /// Bind to `endpoint`.
    ///
    /// A stale Unix socket file left by a crashed server is replaced; a live
    /// one yields `AddrInUse`.
    #[cfg(unix)]
    pub fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        let path = std::path::Path::new(endpoint.as_str());
        if path.exists() {
            if std::os::unix::net::UnixStream::connect(path).is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("another server is listening on {}", endpoint),
                ));
            }
            std::fs::remove_file(path)?;
        }
        let inner = tokio::net::UnixListener::bind(path)?;
        Ok(Self {
            endpoint: endpoint.clone(),
            inner,
        })
    }

    #[cfg(windows)]
    pub fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let next = ServerOptions::new()
            .first_pipe_instance(true)
            .create(endpoint.as_str())?;
        Ok(Self {
            endpoint: endpoint.clone(),
            next,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Wait for the next client.
    #[cfg(unix)]
    pub async fn accept(&mut self) -> io::Result<Connection> {
        let (stream, _) = self.inner.accept().await?;
        Ok(Box::new(stream))
    }

    #[cfg(windows)]
    pub async fn accept(&mut self) -> io::Result<Connection> {
        use tokio::net::windows::named_pipe::ServerOptions;

        self.next.connect().await?;
        // A new instance must exist before handing out the connected one, or
        // clients arriving in between see "pipe not found".
        let fresh = ServerOptions::new().create(self.endpoint.as_str())?;
        let connected = std::mem::replace(&mut self.next, fresh);
        Ok(Box::new(connected))
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(self.endpoint.as_str());
    }
}

/// Open a connection to `endpoint`, giving up after `timeout`.
pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Connection, TransportError> {
    match tokio::time::timeout(timeout, open(endpoint)).await {
        Ok(Ok(connection)) => Ok(connection),
        Ok(Err(source)) => Err(classify(endpoint, source)),
        Err(_) => Err(TransportError::ConnectTimeout {
            endpoint: endpoint.to_string(),
            timeout,
        }),
    }
}

#[cfg(unix)]
async fn open(endpoint: &Endpoint) -> io::Result<Connection> {
    let stream = tokio::net::UnixStream::connect(endpoint.as_str()).await?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
async fn open(endpoint: &Endpoint) -> io::Result<Connection> {
    use tokio::net::windows::named_pipe::ClientOptions;

    const ERROR_PIPE_BUSY: i32 = 231;

    loop {
        match ClientOptions::new().open(endpoint.as_str()) {
            Ok(client) => return Ok(Box::new(client)),
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Blocking connect used by the print-streaming sink on the UI thread.
pub fn connect_blocking(endpoint: &Endpoint) -> Result<Box<dyn Write + Send>, TransportError> {
    open_blocking(endpoint).map_err(|source| classify(endpoint, source))
}

#[cfg(unix)]
fn open_blocking(endpoint: &Endpoint) -> io::Result<Box<dyn Write + Send>> {
    let stream = std::os::unix::net::UnixStream::connect(endpoint.as_str())?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
fn open_blocking(endpoint: &Endpoint) -> io::Result<Box<dyn Write + Send>> {
    let pipe = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(endpoint.as_str())?;
    Ok(Box::new(pipe))
}

fn classify(endpoint: &Endpoint, source: io::Error) -> TransportError {
    match source.kind() {
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::AddrNotAvailable => TransportError::Unreachable {
            endpoint: endpoint.to_string(),
            source,
        },
        _ => TransportError::Io(source),
    }
}
