use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail, ensure};
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::Instant;

use crate::router::{Response, is_hop_by_hop};
use crate::util::timeout_with_context;

/// Request line plus headers of one HTTP/1.1 request.
#[derive(Debug)]
pub(crate) struct RequestHead {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    pub content_length: usize,
    pub head_bytes: usize,
}

pub(crate) async fn read_request_head<S>(
    reader: &mut BufReader<S>,
    peer: SocketAddr,
    timeout: Duration,
    max_header_bytes: usize,
) -> Result<Option<RequestHead>>
where
    S: AsyncRead + Unpin,
{
    let deadline = Instant::now() + timeout;
    let mut line = String::new();
    let request_line_bytes =
        read_line_with_deadline(reader, &mut line, deadline, peer, max_header_bytes).await?;
    if request_line_bytes == 0 {
        return Ok(None);
    }

    let request_line = line.trim_end_matches(['\r', '\n']);
    ensure!(!request_line.is_empty(), "empty request line from {peer}");
    let mut parts = request_line.split_whitespace();
    let method_str = parts
        .next()
        .ok_or_else(|| anyhow!("malformed request line: missing method"))?;
    let target = parts
        .next()
        .ok_or_else(|| anyhow!("malformed request line: missing target"))?
        .to_string();
    let version = parts
        .next()
        .ok_or_else(|| anyhow!("malformed request line: missing version"))?;
    if parts.next().is_some() {
        bail!("malformed request line: unexpected data");
    }
    match version {
        "HTTP/1.1" | "HTTP/1.0" => {}
        other => bail!("invalid HTTP version '{other}'"),
    }
    let method = Method::from_bytes(method_str.as_bytes())
        .with_context(|| format!("invalid method '{method_str}'"))?;

    let mut remaining = max_header_bytes
        .checked_sub(request_line_bytes)
        .ok_or_else(|| anyhow!("request headers exceed configured limit"))?;
    let mut headers = HeaderMap::new();
    loop {
        ensure!(remaining > 0, "request headers exceed configured limit");
        let read = read_line_with_deadline(reader, &mut line, deadline, peer, remaining).await?;
        if read == 0 {
            bail!("connection closed before end of headers from {peer}");
        }
        remaining -= read;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        let (name, value) = trimmed
            .split_once(':')
            .ok_or_else(|| anyhow!("header missing ':' separator"))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| anyhow!("invalid header name '{}'", name.trim()))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| anyhow!("invalid value for header '{name}'"))?;
        headers.append(name, value);
    }

    if let Some(encoding) = headers.get(header::TRANSFER_ENCODING) {
        bail!(
            "unsupported transfer-encoding '{}'",
            encoding.to_str().unwrap_or("<binary>")
        );
    }
    let content_length = content_length(&headers)?;

    Ok(Some(RequestHead {
        method,
        target,
        headers,
        content_length,
        head_bytes: max_header_bytes - remaining,
    }))
}

fn content_length(headers: &HeaderMap) -> Result<usize> {
    let mut length: Option<usize> = None;
    for value in headers.get_all(header::CONTENT_LENGTH) {
        let parsed = value
            .to_str()
            .ok()
            .and_then(|text| text.trim().parse::<usize>().ok())
            .ok_or_else(|| anyhow!("invalid content-length"))?;
        if let Some(existing) = length
            && existing != parsed
        {
            bail!("conflicting content-length headers");
        }
        length = Some(parsed);
    }
    Ok(length.unwrap_or(0))
}

pub(crate) async fn read_body<S>(
    reader: &mut BufReader<S>,
    length: usize,
    max_len: usize,
    timeout: Duration,
) -> Result<Bytes>
where
    S: AsyncRead + Unpin,
{
    ensure!(
        length <= max_len,
        "request body of {length} bytes exceeds limit of {max_len}"
    );
    let mut body = vec![0u8; length];
    if length > 0 {
        timeout_with_context(timeout, reader.read_exact(&mut body), "reading request body").await?;
    }
    Ok(Bytes::from(body))
}

async fn read_line_with_deadline<S>(
    reader: &mut BufReader<S>,
    buf: &mut String,
    deadline: Instant,
    peer: SocketAddr,
    max_len: usize,
) -> Result<usize>
where
    S: AsyncRead + Unpin,
{
    buf.clear();
    let mut collected = Vec::new();
    let context = format!("reading line from {peer}");

    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or_else(|| anyhow!("timed out {context}"))?;
        let available =
            timeout_with_context(remaining, reader.fill_buf(), context.as_str()).await?;

        if available.is_empty() {
            if collected.is_empty() {
                return Ok(0);
            }
            bail!("connection closed while reading line from {peer}");
        }

        let newline_pos = available.iter().position(|byte| *byte == b'\n');
        let consume = newline_pos.map(|idx| idx + 1).unwrap_or(available.len());
        if collected.len() + consume > max_len {
            bail!("line from {peer} exceeds configured limit of {max_len} bytes");
        }

        collected.extend_from_slice(&available[..consume]);
        reader.consume(consume);

        if newline_pos.is_some() {
            break;
        }
    }

    *buf = String::from_utf8(collected)
        .map_err(|_| anyhow!("line from {peer} contained invalid bytes"))?;
    Ok(buf.len())
}

/// Writes `response` and returns the number of body bytes sent. The
/// connection is always closed after one exchange.
pub(crate) async fn write_response<W>(
    writer: &mut W,
    response: &Response,
    include_body: bool,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let status = response.status;
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    for (name, value) in response.headers.iter() {
        if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
            continue;
        }
        let Ok(value) = value.to_str() else {
            continue;
        };
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str(&format!("content-length: {}\r\n", response.body.len()));
    head.push_str("connection: close\r\n\r\n");

    writer.write_all(head.as_bytes()).await?;
    let mut sent = 0;
    if include_body && allows_body(status) {
        writer.write_all(&response.body).await?;
        sent = response.content_length();
    }
    writer.flush().await?;
    Ok(sent)
}

fn allows_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}
