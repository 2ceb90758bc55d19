//! Timeout enforcement.
//!
//! Upstream calls get a fixed deadline for the connection attempt and the
//! response headers. The response body is then held to the same limit
//! between frames by [`IdleTimeout`], so a stalled upstream cannot pin the
//! client connection open. The server-level deadline sits slightly above
//! the upstream one so a slow upstream is reported as a 502 by the
//! forwarder instead of the listener cutting the request first.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use hyper::body::{Body, Frame, SizeHint};
use tokio::time::{Instant, Sleep};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Deadline for connecting to the upstream and for its response headers.
/// Also the longest gap allowed between upstream body frames.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline applied to each request by the listener.
pub const SERVER_TIMEOUT: Duration = Duration::from_secs(35);

/// How long in-flight requests may run after a termination signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Deadline for the test-connection probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Elapsed deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Run `fut` with a deadline.
pub async fn with_deadline<F: Future>(limit: Duration, fut: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Elapsed(limit))
}

/// Body wrapper that fails with [`Elapsed`] when the inner body produces
/// no frame for `idle`.
pub struct IdleTimeout<B> {
    inner: B,
    idle: Duration,
    sleep: Pin<Box<Sleep>>,
}

impl<B> IdleTimeout<B> {
    pub fn new(inner: B, idle: Duration) -> Self {
        Self {
            inner,
            idle,
            sleep: Box::pin(tokio::time::sleep(idle)),
        }
    }
}

impl<B> Body for IdleTimeout<B>
where
    B: Body + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = B::Data;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                this.sleep.as_mut().reset(Instant::now() + this.idle);
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e.into()))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => match this.sleep.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    let err: BoxError = Box::new(Elapsed(this.idle));
                    Poll::Ready(Some(Err(err)))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
