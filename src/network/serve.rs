//! Request/serve loop: send one request and wait for its answer while serving
//! header requests and pings the peer sends in the meantime.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::chain::types::{BlockBody, BlockHeader, H256};
use crate::chain::ChainOracle;
use crate::config::ServeTimeouts;
use crate::network::connection::Connection;
use crate::network::message::{GetBlockHeaders, LocalError, Message};
use crate::network::transport::SecureChannel;
use crate::utils::{ConformanceError, Result};

/// Wire generation used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// eth/65 and older: no request ids
    Legacy,
    /// eth/66: the request carries this id and only the matching answer counts
    Correlated(u64),
}

pub struct ServeLoop<'a, C: SecureChannel> {
    conn: &'a mut Connection<C>,
    chain: &'a dyn ChainOracle,
    timeouts: ServeTimeouts,
}

impl<'a, C: SecureChannel> ServeLoop<'a, C> {
    pub fn new(conn: &'a mut Connection<C>, chain: &'a dyn ChainOracle, timeouts: ServeTimeouts) -> Self {
        Self { conn, chain, timeouts }
    }

    /// Write `request` and return the answer.
    pub async fn request(&mut self, request: &Message, mode: RequestMode) -> Result<Message> {
        let budget_end = Instant::now() + self.timeouts.budget();
        {
            let mut conn = self.conn.with_deadline_at(budget_end);
            match mode {
                RequestMode::Legacy => conn.write(request).await?,
                RequestMode::Correlated(id) => conn.write_correlated(id, request).await?,
            };
        }
        match mode {
            RequestMode::Legacy => self.serve_until(budget_end).await,
            RequestMode::Correlated(id) => self.serve_correlated_until(id, budget_end).await,
        }
    }

    /// Legacy loop: return the first message that is neither a header request nor
    /// a ping.
    pub async fn read_and_serve(&mut self) -> Result<Message> {
        let budget_end = Instant::now() + self.timeouts.budget();
        self.serve_until(budget_end).await
    }

    /// Correlated loop: return the first message carrying `request_id`, discarding
    /// other unsolicited messages.
    pub async fn read_and_serve_correlated(&mut self, request_id: u64) -> Result<Message> {
        let budget_end = Instant::now() + self.timeouts.budget();
        self.serve_correlated_until(request_id, budget_end).await
    }

    fn read_deadline(&self, per_read: Duration, budget_end: Instant) -> Result<Instant> {
        let now = Instant::now();
        if now >= budget_end {
            return Err(budget_exceeded(self.timeouts.budget()));
        }
        Ok((now + per_read).min(budget_end))
    }

    async fn serve_until(&mut self, budget_end: Instant) -> Result<Message> {
        loop {
            let at = self.read_deadline(self.timeouts.legacy_read(), budget_end)?;
            let mut conn = self.conn.with_deadline_at(at);
            match conn.read().await {
                Ok(Message::GetBlockHeaders(req)) => {
                    let headers = self.chain.get_headers(&req)?;
                    debug!("serving {} headers for inbound request {:?}", headers.len(), req.origin);
                    conn.write(&Message::BlockHeaders(headers)).await?;
                }
                Ok(Message::Ping) => {
                    conn.write(&Message::Pong).await?;
                }
                Ok(msg) => return Ok(msg),
                Err(LocalError::DeadlineExceeded) => {
                    return Err(read_timeout(self.timeouts.budget(), at, budget_end));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn serve_correlated_until(&mut self, request_id: u64, budget_end: Instant) -> Result<Message> {
        loop {
            let at = self.read_deadline(self.timeouts.correlated_read(), budget_end)?;
            let mut conn = self.conn.with_deadline_at(at);
            match conn.read_correlated().await {
                Ok((id, Message::GetBlockHeaders(req))) => {
                    let headers = self.chain.get_headers(&req)?;
                    debug!("serving {} headers for inbound request {id}", headers.len());
                    conn.write_correlated(id, &Message::BlockHeaders(headers)).await?;
                }
                Ok((_, Message::Ping)) => {
                    conn.write(&Message::Pong).await?;
                }
                Ok((id, msg)) if id == request_id => return Ok(msg),
                Ok((id, msg)) => {
                    debug!("discarding {} with request id {id}, waiting for {request_id}", msg.name());
                }
                Err(LocalError::DeadlineExceeded) => {
                    return Err(read_timeout(self.timeouts.budget(), at, budget_end));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn read_timeout(budget: Duration, at: Instant, budget_end: Instant) -> ConformanceError {
    if at >= budget_end {
        budget_exceeded(budget)
    } else {
        warn!("peer went quiet");
        ConformanceError::Timeout("no message before the read deadline".into())
    }
}

fn budget_exceeded(budget: Duration) -> ConformanceError {
    ConformanceError::Timeout(format!("no answer within {budget:?}"))
}

fn unexpected(msg: Message) -> ConformanceError {
    ConformanceError::ProtocolViolation(format!("unexpected message received: {msg:?}"))
}

impl<C: SecureChannel> Connection<C> {
    /// Serve loop using this connection's configured timeouts.
    pub fn serve_loop<'a>(&'a mut self, chain: &'a dyn ChainOracle) -> ServeLoop<'a, C> {
        let timeouts = self.config().serve;
        ServeLoop::new(self, chain, timeouts)
    }

    /// Request headers and return the peer's answer.
    pub async fn headers_request(
        &mut self,
        request: &GetBlockHeaders,
        chain: &dyn ChainOracle,
        mode: RequestMode,
    ) -> Result<Vec<BlockHeader>> {
        match self.serve_loop(chain).request(&Message::GetBlockHeaders(*request), mode).await? {
            Message::BlockHeaders(headers) => Ok(headers),
            other => Err(unexpected(other)),
        }
    }

    /// Request block bodies and return the peer's answer.
    pub async fn bodies_request(
        &mut self,
        hashes: &[H256],
        chain: &dyn ChainOracle,
        mode: RequestMode,
    ) -> Result<Vec<BlockBody>> {
        match self.serve_loop(chain).request(&Message::GetBlockBodies(hashes.to_vec()), mode).await? {
            Message::BlockBodies(bodies) => Ok(bodies),
            other => Err(unexpected(other)),
        }
    }
}
