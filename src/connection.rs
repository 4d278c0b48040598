use crate::processor;
use crate::registry::Registry;
use crate::tracker::ConnectionGuard;
use crate::{race, CancelToken, Winner};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
    BufReader,
};

/// Longest request line accepted, not counting the line terminator. A peer sending a longer line
/// is disconnected.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// How long a reply may keep trying to reach a peer that is not reading once the connection has
/// been cancelled.
pub const CANCELLED_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

enum Frame {
    Line(String),
    TooLong,
    Eof,
}

/// Serve one connection until the peer hangs up, an I/O error occurs, or the connection is
/// cancelled.
///
/// Requests are handled strictly one at a time, in the order they arrive. A line read after the
/// connection was cancelled is dropped without a reply, and a connection idle on read is closed
/// as soon as it is cancelled. Lines that are not valid UTF-8 are answered like any other
/// malformed request.
///
/// The connection is registered in `registry` for as long as this runs, and `guard` is released
/// when it returns, whatever the reason.
pub async fn serve<S>(stream: S, registry: Arc<Registry>, guard: ConnectionGuard)
where
    S: AsyncRead + AsyncWrite,
{
    let registration = registry.register();
    let id = registration.id();
    let token = registration.token();
    debug!("connection {} registered", id);

    let (reader, mut writer) = io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        let line = match race(read_frame(&mut reader, &mut buf), token.cancelled()).await {
            Winner::First(Ok(Frame::Line(line))) => line,
            Winner::First(Ok(Frame::TooLong)) => {
                warn!(
                    "connection {}: request longer than {} bytes",
                    id, MAX_LINE_LENGTH
                );
                break;
            }
            Winner::First(Ok(Frame::Eof)) => {
                debug!("connection {} closed by peer", id);
                break;
            }
            Winner::First(Err(e)) => {
                warn!("connection {}: read failed; err = {:?}", id, e);
                break;
            }
            Winner::Second(()) => {
                debug!("connection {} cancelled while idle", id);
                break;
            }
        };

        if token.is_cancelled() {
            debug!("connection {} cancelled; discarding queued request", id);
            break;
        }

        let response = processor::process(&line, token).await;
        debug!("connection {}: {:?} -> {}", id, line, response);

        let mut reply = String::with_capacity(response.as_str().len() + 1);
        reply.push_str(response.as_str());
        reply.push('\n');
        match race(
            write_reply(&mut writer, reply.as_bytes()),
            cancelled_write_deadline(token),
        )
        .await
        {
            Winner::First(Ok(())) => {}
            Winner::First(Err(e)) => {
                warn!("connection {}: write failed; err = {:?}", id, e);
                break;
            }
            Winner::Second(()) => {
                debug!("connection {} cancelled while the peer was not reading", id);
                break;
            }
        }
    }

    drop(registration);
    drop(guard);
    debug!("connection {} finished", id);
}

/// Read the next `\n`-terminated line into `buf`, without its `\n` or `\r\n` terminator.
///
/// A final line without a terminator is still returned before end of stream is reported.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Frame>
where
    R: AsyncBufRead + AsyncRead + Unpin,
{
    buf.clear();
    let limit = MAX_LINE_LENGTH as u64 + 1;
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > MAX_LINE_LENGTH {
        return Ok(Frame::TooLong);
    }
    Ok(Frame::Line(String::from_utf8_lossy(buf).into_owned()))
}

/// Completes [`CANCELLED_WRITE_TIMEOUT`] after `token` is cancelled.
async fn cancelled_write_deadline(token: &CancelToken) {
    token.cancelled().await;
    tokio::time::sleep(CANCELLED_WRITE_TIMEOUT).await;
}

async fn write_reply<W: AsyncWrite + Unpin>(writer: &mut W, reply: &[u8]) -> io::Result<()> {
    writer.write_all(reply).await?;
    writer.flush().await
}
