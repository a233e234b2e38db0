//! A thin HTTP/1.1 serving adapter.
//!
//! The core of the framework is transport-agnostic: it consumes request
//! heads and writes through a [`ResponseSink`]. This module supplies the
//! minimal listener glue on top of tokio: decode a request head with
//! `httparse`, drain the body, run the application, serialize the buffered
//! response, and keep the connection alive when the protocol allows it.
//!
//! Anything beyond that (TLS, upgrades, streaming bodies) is deliberately
//! out of scope; embed the application behind a full HTTP server through
//! [`Ember::handle`] instead.

use crate::app::Ember;
use crate::response_writer::ResponseRecorder;
use bytes::{Buf, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH};
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const MAX_HEAD_SIZE: usize = 16 * 1024;
const MAX_HEADERS: usize = 64;

/// An error terminating one connection.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("invalid request head: {reason}")]
    InvalidHead { reason: String },

    #[error("request head exceeds {limit} bytes")]
    TooLargeHead { limit: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ServeError {
    fn invalid_head(reason: impl ToString) -> Self {
        Self::InvalidHead { reason: reason.to_string() }
    }
}

/// Accepts connections forever, one task per connection.
pub(crate) async fn serve(app: Arc<Ember>, listener: TcpListener) -> io::Result<()> {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let app = app.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(app, stream, remote_addr).await {
                debug!(cause = %e, "connection closed");
            }
        });
    }
}

async fn handle_connection(app: Arc<Ember>, mut stream: TcpStream, remote_addr: SocketAddr) -> Result<(), ServeError> {
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let cancellation = CancellationToken::new();
    // Handlers observe the cancellation once this task ends.
    let _guard = cancellation.clone().drop_guard();

    loop {
        let Some(head) = read_head(&mut stream, &mut buffer).await? else {
            return Ok(());
        };
        let Head { parts, body_length, keep_alive } = head;
        drain_body(&mut stream, &mut buffer, body_length).await?;

        let method = parts.method.clone();
        let recorder = ResponseRecorder::new();
        app.handle_parts(parts, Some(remote_addr), cancellation.clone(), Box::new(recorder.clone()))
            .await;

        write_response(&mut stream, &recorder, &method, keep_alive).await?;
        if !keep_alive {
            return Ok(());
        }
    }
}

struct Head {
    parts: http::request::Parts,
    body_length: usize,
    keep_alive: bool,
}

/// Reads and parses one request head. Returns `None` on a clean EOF between
/// requests.
async fn read_head(stream: &mut TcpStream, buffer: &mut BytesMut) -> Result<Option<Head>, ServeError> {
    loop {
        if !buffer.is_empty() {
            let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut parsed = httparse::Request::new(&mut header_storage);

            let consumed = match parsed.parse(buffer.as_ref()) {
                Ok(httparse::Status::Complete(consumed)) => consumed,
                Ok(httparse::Status::Partial) => {
                    if buffer.len() > MAX_HEAD_SIZE {
                        return Err(ServeError::TooLargeHead { limit: MAX_HEAD_SIZE });
                    }
                    0
                }
                Err(e) => return Err(ServeError::invalid_head(e)),
            };

            if consumed > 0 {
                let head = build_head(&parsed)?;
                buffer.advance(consumed);
                return Ok(Some(head));
            }
        }

        if stream.read_buf(buffer).await? == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(ServeError::invalid_head("connection closed mid-request"));
        }
    }
}

fn build_head(parsed: &httparse::Request<'_, '_>) -> Result<Head, ServeError> {
    let method = parsed
        .method
        .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
        .ok_or_else(|| ServeError::invalid_head("missing or invalid method"))?;
    let uri: Uri = parsed
        .path
        .ok_or_else(|| ServeError::invalid_head("missing request target"))?
        .parse()
        .map_err(ServeError::invalid_head)?;
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        v => return Err(ServeError::invalid_head(format!("unsupported version {v:?}"))),
    };

    let mut builder = http::Request::builder().method(method).uri(uri).version(version);
    for header in parsed.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    let request = builder.body(()).map_err(ServeError::invalid_head)?;
    let (parts, ()) = request.into_parts();

    let body_length = content_length(&parts.headers)?;
    let keep_alive = keep_alive(version, &parts.headers);
    Ok(Head { parts, body_length, keep_alive })
}

fn content_length(headers: &HeaderMap) -> Result<usize, ServeError> {
    let Some(value) = headers.get(CONTENT_LENGTH) else {
        return Ok(0);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ServeError::invalid_head("invalid content-length header"))
}

fn keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let connection = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    match version {
        Version::HTTP_11 => !connection.eq_ignore_ascii_case("close"),
        _ => connection.eq_ignore_ascii_case("keep-alive"),
    }
}

/// Reads and discards the request body; the core never interprets it.
async fn drain_body(stream: &mut TcpStream, buffer: &mut BytesMut, length: usize) -> Result<(), ServeError> {
    let mut remaining = length;
    loop {
        let buffered = remaining.min(buffer.len());
        buffer.advance(buffered);
        remaining -= buffered;
        if remaining == 0 {
            return Ok(());
        }
        if stream.read_buf(buffer).await? == 0 {
            return Err(ServeError::invalid_head("connection closed mid-body"));
        }
    }
}

async fn write_response(
    stream: &mut TcpStream,
    recorder: &ResponseRecorder,
    method: &Method,
    keep_alive: bool,
) -> io::Result<()> {
    // An untouched response means the chain finished without writing.
    let status = recorder.status().unwrap_or(StatusCode::OK);
    let body = recorder.body();

    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    for (name, value) in recorder.headers().iter() {
        if *name == CONTENT_LENGTH || *name == CONNECTION {
            continue;
        }
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(&String::from_utf8_lossy(value.as_bytes()));
        head.push_str("\r\n");
    }
    if *method != Method::HEAD {
        head.push_str(&format!("content-length: {}\r\n", body.len()));
    }
    if !keep_alive {
        head.push_str("connection: close\r\n");
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes()).await?;
    if !body.is_empty() {
        stream.write_all(&body).await?;
    }
    stream.flush().await
}
