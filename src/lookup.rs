//! Lookup service announcement
//!
//! On startup the server may register itself with an external directory by
//! sending a single `register <chat_name> <port>` line and reading one line
//! back. Failure here is never fatal.

use std::io;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, LinesCodec};

use crate::error::AppError;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_REPLY_LENGTH: usize = 1024;

/// Register `chat_name` at `port` with the lookup service at `addr`
///
/// Returns the service's one-line reply.
pub async fn announce(addr: &str, chat_name: &str, port: u16) -> Result<String, AppError> {
    match tokio::time::timeout(LOOKUP_TIMEOUT, exchange(addr, chat_name, port)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "lookup service timed out").into()),
    }
}

async fn exchange(addr: &str, chat_name: &str, port: u16) -> Result<String, AppError> {
    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();

    writer
        .write_all(format!("register {} {}\n", chat_name, port).as_bytes())
        .await?;

    let mut replies = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_REPLY_LENGTH));
    match replies.next().await {
        Some(reply) => Ok(reply?),
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "lookup service closed the connection",
        )
        .into()),
    }
}
