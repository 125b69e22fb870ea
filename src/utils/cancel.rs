//! Cancellation utilities
//!
//! Provides cancellation handles for streams and long-running capability calls.

use futures::StreamExt;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, Result};
use crate::types::TextStream;

/// A handle that can be used to request cancellation.
///
/// Clones share the same signal.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Wrapped futures resolve to [`HubError::Cancelled`]
    /// and wrapped streams end; the downstream call is dropped.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A handle cancelled together with this one, which can also be cancelled
    /// on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Race `fut` against `handle`. The future is dropped on cancellation.
pub async fn run_cancellable<T, F>(handle: &CancelHandle, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if handle.is_cancelled() {
        return Err(HubError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = handle.cancelled() => Err(HubError::Cancelled),
        out = fut => out,
    }
}

/// Make a text stream cancellable and return its cancel handle.
pub fn make_cancellable_stream(stream: TextStream) -> (TextStream, CancelHandle) {
    let handle = CancelHandle::new();
    let token = handle.token.clone();
    let mut inner = stream;
    let s = async_stream::stream! {
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                item = inner.next() => item,
            };
            match next {
                Some(item) => yield item,
                None => break,
            }
        }
    };
    (Box::pin(s), handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_future_reports_cancelled() {
        let handle = CancelHandle::new();
        let trigger = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let out: Result<()> = run_cancellable(&handle, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        assert!(matches!(out, Err(HubError::Cancelled)));
    }

    #[tokio::test]
    async fn completed_future_passes_through() {
        let handle = CancelHandle::new();
        let out = run_cancellable(&handle, async { Ok(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn stream_stops_after_cancel() {
        let source: TextStream = Box::pin(futures::stream::iter(
            (0..10).map(|i| Ok::<_, HubError>(i.to_string())),
        ));
        let (mut stream, handle) = make_cancellable_stream(source);

        assert_eq!(stream.next().await.unwrap().unwrap(), "0");
        handle.cancel();
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn child_follows_parent() {
        let parent = CancelHandle::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
