//! Bidirectional copier.
//!
//! [`pipe`] runs one task per direction. Whichever direction ends first, for
//! any reason, tears the whole pair down: it cancels the other direction and
//! both tasks shut down their write side. The call returns only once both
//! tasks are done, so no direction outlives the session.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::common::READ_BUFFER_SIZE;

/// Upper bound on a write-side shutdown once the pair is being torn down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Bytes moved in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeStats {
    pub a_to_b: u64,
    pub b_to_a: u64,
}

/// Copies `a` to `b` and `b` to `a` until either side ends, then closes both.
pub async fn pipe<A, B>(a: A, b: B) -> PipeStats
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    let closed = CancellationToken::new();

    let forward = tokio::spawn(copy_half("a->b", a_read, b_write, closed.clone()));
    let backward = tokio::spawn(copy_half("b->a", b_read, a_write, closed));

    let (forward, backward) = tokio::join!(forward, backward);
    PipeStats {
        a_to_b: joined_count("a->b", forward),
        b_to_a: joined_count("b->a", backward),
    }
}

fn joined_count(direction: &str, joined: Result<u64, tokio::task::JoinError>) -> u64 {
    joined.unwrap_or_else(|e| {
        tracing::warn!(direction, error = %e, "copy task failed");
        0
    })
}

async fn copy_half<R, W>(
    direction: &'static str,
    mut reader: R,
    mut writer: W,
    closed: CancellationToken,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut copied = 0u64;
    let outcome = tokio::select! {
        result = copy_until_eof(&mut reader, &mut writer, &mut copied) => Some(result),
        _ = closed.cancelled() => None,
    };

    match outcome {
        Some(Ok(())) => tracing::debug!(direction, copied, "source reached end of stream"),
        Some(Err(e)) => tracing::debug!(direction, copied, error = %e, "copy ended with error"),
        None => tracing::debug!(direction, copied, "copy stopped by peer direction"),
    }

    closed.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, writer.shutdown())
        .await
        .is_err()
    {
        tracing::debug!(direction, "write side shutdown timed out");
    }

    copied
}

async fn copy_until_eof<R, W>(reader: &mut R, writer: &mut W, copied: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *copied += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::time::timeout;

    const BOUND: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_pipe_copies_both_directions() {
        let (mut client, relay_a) = duplex(1024);
        let (relay_b, mut server) = duplex(1024);
        let session = tokio::spawn(pipe(relay_a, relay_b));

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        server.write_all(b"world!").await.unwrap();
        let mut buf = [0u8; 6];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world!");

        drop(client);
        let stats = timeout(BOUND, session).await.unwrap().unwrap();
        assert_eq!(stats, PipeStats { a_to_b: 5, b_to_a: 6 });
    }

    #[tokio::test]
    async fn test_closing_a_closes_b() {
        let (client, relay_a) = duplex(1024);
        let (relay_b, mut server) = duplex(1024);
        let session = tokio::spawn(pipe(relay_a, relay_b));

        drop(client);

        let mut buf = Vec::new();
        let n = timeout(BOUND, server.read_to_end(&mut buf)).await.unwrap().unwrap();
        assert_eq!(n, 0);
        timeout(BOUND, session).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_closing_b_closes_a_while_a_is_idle() {
        let (mut client, relay_a) = duplex(1024);
        let (relay_b, server) = duplex(1024);
        let session = tokio::spawn(pipe(relay_a, relay_b));

        // The client never writes; only the server side goes away.
        drop(server);

        let mut buf = Vec::new();
        let n = timeout(BOUND, client.read_to_end(&mut buf)).await.unwrap().unwrap();
        assert_eq!(n, 0);
        timeout(BOUND, session).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pipe_returns_only_after_both_directions_finish() {
        let (client, relay_a) = duplex(1024);
        let (relay_b, _server) = duplex(1024);
        let session = tokio::spawn(pipe(relay_a, relay_b));

        assert!(timeout(Duration::from_millis(100), async {
            while !session.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .is_err());

        drop(client);
        timeout(BOUND, session).await.unwrap().unwrap();
    }
}
