//! Line-framed JSON connection handling (spec §4.6): read exactly one
//! request line, dispatch it, write one or more response lines.
//!
//! Grounded on the teacher's `pw-cli/src/commands/daemon.rs::send_request_stream`
//! (`BufReader` + newline-delimited JSON), generalized from a unary
//! request/response into a streamed `run_chunk*`/`run_end` response.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use surfwright_protocol::{ErrResponse, MAX_CHUNK_BYTES, MAX_LINE_BYTES, RequestKind, StreamKind, WireRequest, WireResponse};

use crate::transport::worker::{DaemonWorker, RunOutcome};

/// What the caller should do once a connection has been fully served.
pub enum ConnectionEvent {
	/// Nothing notable; keep accepting.
	Served,
	/// The client sent a well-authenticated `shutdown` request.
	ShutdownRequested,
}

/// Serves exactly one request on `stream`, per the one-request-per-connection
/// rule (§4.6). Any bytes after the terminating newline are ignored because
/// the connection is closed as soon as the response is written.
pub async fn serve_connection(stream: TcpStream, worker: &DaemonWorker) -> ConnectionEvent {
	let (read_half, mut write_half) = stream.into_split();
	let mut reader = BufReader::new(read_half);

	let mut line = String::new();
	let read_result = reader.read_line(&mut line).await;

	let line = match read_result {
		Ok(0) => return ConnectionEvent::Served, // client closed without sending anything
		Ok(_) if line.len() > MAX_LINE_BYTES => {
			// Oversized line: destroy the connection without responding (§4.6,
			// §8 scenario 5 — the client is expected to treat this as
			// unreachable and fall back locally).
			return ConnectionEvent::Served;
		}
		Ok(_) => line,
		Err(_) => return ConnectionEvent::Served,
	};

	let request: WireRequest = match serde_json::from_str(line.trim_end()) {
		Ok(request) => request,
		Err(_) => {
			let response = WireResponse::error(surfwright_protocol::DaemonErrorCode::RequestInvalid.as_str(), "malformed request frame");
			let _ = write_line(&mut write_half, &response).await;
			return ConnectionEvent::Served;
		}
	};

	if request.token != worker.token() {
		// Deliberately minimal shape: exactly {ok, code, message}, no other
		// fields, regardless of what ErrResponse could otherwise carry.
		let response = ErrResponse::new(surfwright_protocol::DaemonErrorCode::TokenInvalid.as_str(), "token mismatch");
		let _ = write_line(&mut write_half, &WireResponse::Err(response)).await;
		return ConnectionEvent::Served;
	}

	match request.kind {
		RequestKind::Ping => {
			let _ = write_line(&mut write_half, &WireResponse::pong()).await;
			ConnectionEvent::Served
		}
		RequestKind::Shutdown => {
			let _ = write_line(&mut write_half, &WireResponse::shutdown()).await;
			ConnectionEvent::ShutdownRequested
		}
		RequestKind::Run { argv } => {
			match worker.run(argv).await {
				RunOutcome::Completed { stdout, stderr, exit_code } => {
					for (stream_kind, bytes) in [(StreamKind::Stdout, stdout), (StreamKind::Stderr, stderr)] {
						for chunk in chunk_utf8_safe(&bytes, MAX_CHUNK_BYTES) {
							if write_line(&mut write_half, &WireResponse::run_chunk(stream_kind, chunk)).await.is_err() {
								return ConnectionEvent::Served;
							}
						}
					}
					let _ = write_line(&mut write_half, &WireResponse::run_end(exit_code)).await;
				}
				RunOutcome::Failed(err) => {
					let response = ErrResponse::new(err.code().as_str(), err.to_string()).retryable(err.retryable());
					let _ = write_line(&mut write_half, &WireResponse::Err(response)).await;
				}
			}
			ConnectionEvent::Served
		}
	}
}

async fn write_line<W: tokio::io::AsyncWrite + Unpin>(writer: &mut W, response: &WireResponse) -> std::io::Result<()> {
	let mut body = serde_json::to_vec(response)?;
	body.push(b'\n');
	writer.write_all(&body).await?;
	writer.flush().await
}

/// Splits `bytes` into chunks of at most `max_len` bytes, never cutting a
/// UTF-8 code point in half, and returns them as owned `String`s.
fn chunk_utf8_safe(bytes: &str, max_len: usize) -> Vec<String> {
	if bytes.is_empty() {
		return Vec::new();
	}

	let mut chunks = Vec::new();
	let mut start = 0;
	while start < bytes.len() {
		let mut end = (start + max_len).min(bytes.len());
		while end > start && !bytes.is_char_boundary(end) {
			end -= 1;
		}
		if end == start {
			// A single code point longer than max_len; take it whole rather
			// than producing an empty chunk and looping forever.
			end = bytes[start..].chars().next().map(|c| start + c.len_utf8()).unwrap_or(bytes.len());
		}
		chunks.push(bytes[start..end].to_string());
		start = end;
	}
	chunks
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chunking_respects_max_len_and_utf8_boundaries() {
		let text = "a".repeat(10) + "\u{1F600}" + &"b".repeat(10);
		let chunks = chunk_utf8_safe(&text, 8);
		assert!(chunks.iter().all(|c| c.len() <= 8 && c.is_char_boundary(c.len())));
		assert_eq!(chunks.join(""), text);
	}

	#[test]
	fn empty_input_yields_no_chunks() {
		assert!(chunk_utf8_safe("", 64).is_empty());
	}

	#[test]
	fn small_input_is_a_single_chunk() {
		assert_eq!(chunk_utf8_safe("hello", 64), vec!["hello".to_string()]);
	}
}
