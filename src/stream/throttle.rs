//! Latest-wins rate limiting

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait adding [`Throttle`] to any stream.
pub trait ThrottleExt: Stream {
    /// Emit at most one item per `period`.
    ///
    /// Items arriving between emissions replace each other; only the newest is
    /// emitted. The first item goes out immediately. When the upstream ends, a
    /// held item is still emitted on the next tick before the stream ends.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream returned by [`ThrottleExt::throttle`].
    #[must_use = "streams do nothing unless polled"]
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        latest: Option<S::Item>,
        upstream_done: bool,
    }
}

impl<S: Stream> Throttle<S> {
    /// Must be called from within a Tokio runtime.
    pub fn new(stream: S, period: Duration) -> Self {
        let mut interval = interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { stream, interval, latest: None, upstream_done: false }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.upstream_done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.latest = Some(item),
                Poll::Ready(None) => *this.upstream_done = true,
                Poll::Pending => break,
            }
        }

        if this.latest.is_none() {
            return if *this.upstream_done { Poll::Ready(None) } else { Poll::Pending };
        }

        match this.interval.poll_tick(cx) {
            Poll::Ready(_) => Poll::Ready(this.latest.take()),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    #[tokio::test(start_paused = true)]
    async fn keeps_only_the_newest_item_per_period() {
        let (tx, rx) = mpsc::channel(16);
        let mut throttled = ReceiverStream::new(rx).throttle(Duration::from_millis(100));

        for v in 1..=3 {
            tx.send(v).await.unwrap();
        }
        assert_eq!(throttled.next().await, Some(3));

        let start = tokio::time::Instant::now();
        tx.send(4).await.unwrap();
        tx.send(5).await.unwrap();
        assert_eq!(throttled.next().await, Some(5));
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_upstream_does_not_end_the_stream() {
        let (tx, rx) = mpsc::channel(4);
        let mut throttled = ReceiverStream::new(rx).throttle(Duration::from_millis(50));

        let sender = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(42).await.unwrap();
        });

        assert_eq!(throttled.next().await, Some(42));
        sender.await.unwrap();
        assert_eq!(throttled.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn held_item_is_emitted_before_end() {
        let (tx, rx) = mpsc::channel(4);
        let mut throttled = ReceiverStream::new(rx).throttle(Duration::from_millis(100));

        tx.send(1).await.unwrap();
        assert_eq!(throttled.next().await, Some(1));
        tx.send(2).await.unwrap();
        drop(tx);

        assert_eq!(throttled.next().await, Some(2));
        assert_eq!(throttled.next().await, None);
    }
}
