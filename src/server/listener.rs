use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::http::session::{Session, SessionLimits, SessionOutcome};
use crate::router::Router;
use crate::server::tracker::SessionTracker;

/// Backlog handed to `listen(2)`.
const BACKLOG: u32 = 1024;

/// Pause after a failed accept so a persistent error such as descriptor
/// exhaustion does not pin a worker.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Address and port the server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenEndpoint {
    pub address: IpAddr,
    pub port: u16,
}

impl ListenEndpoint {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    /// `127.0.0.1:port`
    pub fn localhost(port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl fmt::Display for ListenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Owns the listening socket and turns each accepted connection into a
/// [`Session`].
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    router: Arc<Router>,
    limits: SessionLimits,
    tracker: SessionTracker,
}

impl Listener {
    /// Binds `endpoint` with `SO_REUSEADDR` set and starts listening.
    ///
    /// Must be called from inside the worker pool's runtime.
    pub async fn bind(
        endpoint: ListenEndpoint,
        router: Arc<Router>,
        limits: SessionLimits,
    ) -> Result<Self, ServerError> {
        let addr = endpoint.socket_addr();
        let bind_err = |source| ServerError::Bind { addr, source };

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let inner = socket.listen(BACKLOG).map_err(bind_err)?;
        let local_addr = inner.local_addr().map_err(bind_err)?;

        debug!(address = %local_addr, backlog = BACKLOG, "listener bound");

        Ok(Self {
            inner,
            local_addr,
            router,
            limits,
            tracker: SessionTracker::new(),
        })
    }

    /// The bound address; differs from the endpoint when port 0 was asked for.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for observing live sessions after the listener is moved into
    /// its accept loop.
    pub fn tracker(&self) -> SessionTracker {
        self.tracker.clone()
    }

    /// Accepts connections forever.
    ///
    /// Exactly one accept is pending at a time. Each connection is moved into
    /// its own task, and accept errors are logged and retried.
    pub async fn accept_loop(self) {
        info!(address = %self.local_addr, "accepting connections");

        loop {
            match self.inner.accept().await {
                Ok((stream, peer)) => self.start_session(stream, peer),
                Err(e) => {
                    warn!(error = %ServerError::Accept(e), "accept failed, retrying");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    fn start_session(&self, stream: TcpStream, peer: SocketAddr) {
        let session = Session::new(
            stream,
            Arc::clone(&self.router),
            self.limits,
            self.tracker.track(),
        );
        let id = session.id();
        debug!(session = %id, peer = %peer, "connection accepted");

        tokio::spawn(async move {
            match session.run().await {
                Ok(SessionOutcome::Responded { status, bytes }) => {
                    debug!(session = %id, status = status.as_u16(), bytes, "session done");
                }
                Ok(SessionOutcome::Closed) => {
                    debug!(session = %id, "session closed without a request");
                }
                Err(e) => {
                    warn!(session = %id, peer = %peer, error = %e, "session aborted");
                }
            }
        });
    }
}
