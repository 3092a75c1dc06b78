//! Async Client
//!
//! A minimal tokio client speaking the block protocol. One request is in
//! flight at a time, matching how the server processes a connection.
//!
//! ```no_run
//! use catchdb::client::Client;
//!
//! # async fn demo() -> Result<(), catchdb::client::ClientError> {
//! let mut client = Client::connect("127.0.0.1:7777").await?;
//! let reply = client.request(&["set", "foo", "bar"]).await?;
//! assert!(reply.is_ok());
//! # Ok(())
//! # }
//! ```

use crate::protocol::{encode_request, Frame, ParseError, Reply, ReplyStatus};
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::trace;

const READ_BUFFER_SIZE: usize = 4096;

/// Errors raised by [`Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("server replied {0}")]
    Server(Reply),
}

/// A connection to a CatchDB server.
pub struct Client {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Client {
    /// Opens a connection.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
        })
    }

    /// Sends one request and waits for its reply.
    pub async fn request<B: AsRef<[u8]>>(&mut self, blocks: &[B]) -> Result<Reply, ClientError> {
        let request = encode_request(blocks);
        self.stream.write_all(&request).await?;
        trace!(bytes = request.len(), "sent request");

        let mut frame = Frame::new();
        loop {
            let consumed = frame.parse(&self.buffer)?;
            self.buffer.advance(consumed);
            if frame.is_complete() {
                return Ok(Reply::from_blocks(frame.take_blocks())?);
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(ClientError::ConnectionClosed);
            }
        }
    }

    /// `get key`, returning `None` on `not_found`.
    ///
    /// Any other non-`ok` status is returned as [`ClientError::Server`].
    pub async fn get(&mut self, key: &str) -> Result<Option<Bytes>, ClientError> {
        let reply = self.request(&["get", key]).await?;
        match reply.status {
            ReplyStatus::Ok => Ok(reply.first().cloned()),
            ReplyStatus::NotFound => Ok(None),
            _ => Err(ClientError::Server(reply)),
        }
    }

    /// `set key value`.
    pub async fn set(&mut self, key: &str, value: &str) -> Result<Reply, ClientError> {
        self.request(&["set", key, value]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accepts one connection and answers its first request with `reply`.
    async fn answer_once(reply: Reply) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(&reply.serialize()).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_get_not_found_is_none() {
        let addr = answer_once(Reply::not_found()).await;
        let mut client = Client::connect(addr).await.unwrap();
        assert_eq!(client.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_error_status_is_err() {
        let addr = answer_once(Reply::client_error("Wrong number of arguments")).await;
        let mut client = Client::connect(addr).await.unwrap();
        match client.get("k").await {
            Err(ClientError::Server(reply)) => {
                assert_eq!(reply.status, ReplyStatus::ClientError);
                assert_eq!(reply.first().unwrap(), "Wrong number of arguments");
            }
            other => panic!("expected a server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_ok_returns_value() {
        let addr = answer_once(Reply::ok(vec![Bytes::from("bar")])).await;
        let mut client = Client::connect(addr).await.unwrap();
        assert_eq!(client.get("foo").await.unwrap().as_deref(), Some(&b"bar"[..]));
    }
}
