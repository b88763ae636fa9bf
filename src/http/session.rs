use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::http::parser::{parse_with_scanner, HeadScanner, ParseError};
use crate::http::request::Request;
use crate::http::response::StatusCode;
use crate::http::writer::ResponseWriter;
use crate::router::Router;
use crate::server::tracker::{SessionGuard, SessionId};

const READ_CHUNK: usize = 4096;

/// Per-session bounds on input size and time spent waiting on the peer.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub max_request_bytes: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_request_bytes: 64 * 1024,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
        }
    }
}

pub enum SessionState {
    Reading,
    Routing(Request),
    Writing(ResponseWriter),
    Closing,
    Done,
}

/// How a session ended when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A complete response was flushed before the half-close.
    Responded { status: StatusCode, bytes: usize },
    /// The peer closed without sending a single byte.
    Closed,
}

/// One accepted connection, driven from the first read to the half-close.
///
/// A session is a single sequential future, so at most one read or write is
/// ever pending against its stream and its state needs no lock. Whoever polls
/// `run` owns the session; it is dropped as soon as `run` returns.
pub struct Session<S = TcpStream> {
    stream: S,
    buffer: BytesMut,
    head: HeadScanner,
    state: SessionState,
    router: Arc<Router>,
    limits: SessionLimits,
    guard: SessionGuard,
    failure: Option<ServerError>,
    responded: Option<(StatusCode, usize)>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, router: Arc<Router>, limits: SessionLimits, guard: SessionGuard) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            head: HeadScanner::new(),
            state: SessionState::Reading,
            router,
            limits,
            guard,
            failure: None,
            responded: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.guard.id()
    }

    /// Drives the session to `Done`.
    ///
    /// Returns the error that cut the exchange short, if any. Either way the
    /// send direction has been shut down by the time this returns.
    pub async fn run(mut self) -> Result<SessionOutcome, ServerError> {
        let id = self.id();

        loop {
            match &mut self.state {
                SessionState::Reading => {
                    let read = timeout(self.limits.read_timeout, self.read_request()).await;
                    self.state = match read {
                        Ok(Ok(Some(request))) => SessionState::Routing(request),
                        Ok(Ok(None)) => {
                            debug!(session = %id, "peer closed before sending a request");
                            SessionState::Closing
                        }
                        Ok(Err(e)) => {
                            self.failure = Some(e);
                            SessionState::Closing
                        }
                        Err(_) => {
                            self.failure = Some(ServerError::Timeout {
                                phase: "read",
                                after: self.limits.read_timeout,
                            });
                            SessionState::Closing
                        }
                    };
                }

                SessionState::Routing(request) => {
                    let response = self.router.route(request);

                    info!(
                        session = %id,
                        method = %request.method,
                        path = %request.path,
                        status = response.status.as_u16(),
                        "request routed"
                    );

                    let writer = ResponseWriter::new(&response);
                    self.responded = Some((response.status, writer.len()));
                    self.state = SessionState::Writing(writer);
                }

                SessionState::Writing(writer) => {
                    let written = timeout(
                        self.limits.write_timeout,
                        writer.write_to_stream(&mut self.stream),
                    )
                    .await;

                    let failure = match written {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(e),
                        Err(_) => Some(ServerError::Timeout {
                            phase: "write",
                            after: self.limits.write_timeout,
                        }),
                    };
                    if failure.is_some() {
                        debug!(
                            session = %id,
                            written = writer.written(),
                            total = writer.len(),
                            "response cut short"
                        );
                    }
                    self.failure = failure;
                    self.state = SessionState::Closing;
                }

                SessionState::Closing => {
                    // Only the send side is shut; the receive side is left
                    // for the transport to reclaim when the socket drops.
                    if let Err(e) = self.stream.shutdown().await {
                        debug!(session = %id, error = %e, "half-close failed");
                    }
                    self.state = SessionState::Done;
                }

                SessionState::Done => {
                    break;
                }
            }
        }

        match (self.failure.take(), self.responded) {
            (Some(e), _) => Err(e),
            (None, Some((status, bytes))) => Ok(SessionOutcome::Responded { status, bytes }),
            (None, None) => Ok(SessionOutcome::Closed),
        }
    }

    async fn read_request(&mut self) -> Result<Option<Request>, ServerError> {
        loop {
            // Try parsing whatever we already have
            match parse_with_scanner(&mut self.head, &self.buffer, self.limits.max_request_bytes) {
                Ok((request, consumed)) => {
                    self.buffer.advance(consumed);
                    self.head = HeadScanner::new();
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {}

                Err(ParseError::TooLarge) => {
                    return Err(ServerError::TooLarge {
                        limit: self.limits.max_request_bytes,
                    });
                }

                Err(e) => return Err(e.into()),
            }

            // The parser runs after every read; `head` keeps that from
            // searching the buffer from byte 0 each time.
            self.buffer.reserve(READ_CHUNK);
            let n = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(ServerError::Read)?;

            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ServerError::Read(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed mid-request",
                )));
            }
        }
    }
}
