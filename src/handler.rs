//! TCP connection handler
//!
//! Accepts connections, splits each stream into a line reader driven by a
//! `Session` and a writer task that drains the session's outbound queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::server::ServerContext;
use crate::session::Session;

/// Outbound lines buffered per connection before new ones are dropped
pub const OUTBOUND_BUFFER_SIZE: usize = 64;

/// How long queued lines may take to flush after the session ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Accept connections until shutdown is signalled
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>) {
    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => {
                info!("Accept loop stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let ctx = Arc::clone(&ctx);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ctx).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
        }
    }
}

/// Handle a new TCP connection
pub async fn handle_connection(stream: TcpStream, ctx: Arc<ServerContext>) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    debug!("New TCP connection from {}", peer_addr);

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", peer_addr, e);
    }

    let result = handle_stream(stream, ctx).await;
    debug!("Connection from {} closed", peer_addr);
    result
}

/// Run a session over any byte stream
pub async fn handle_stream<S>(stream: S, ctx: Arc<ServerContext>) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (line_tx, line_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER_SIZE);
    let mut write_task = tokio::spawn(write_lines(writer, line_rx));

    let session = Session::new(reader, line_tx, ctx);
    let session_id = session.id();
    let result = session.run().await;

    // The writer ends once the session and the server have both let go of
    // the queue.
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut write_task)
        .await
        .is_err()
    {
        warn!(session = %session_id, "Writer did not drain in time");
        write_task.abort();
    }

    result
}

/// Write queued lines, newline-terminated, then close the write half
async fn write_lines<W>(mut writer: W, mut lines: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        let mut buf = line.into_bytes();
        buf.push(b'\n');
        if let Err(e) = writer.write_all(&buf).await {
            debug!("Write failed, ending write task: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
    debug!("Write task ended");
}
