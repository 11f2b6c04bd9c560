//! Single cancellable deadline for a negotiation.
//!
//! The deadline is polled from the same `select!` loop as every other
//! negotiation event, so disarming it is just dropping the timer.

use futures::FutureExt;
use futures::future::Fuse;
use futures_timer::Delay;
use std::time::Duration;

/// An optional timer that can be armed, disarmed and awaited.
///
/// While disarmed, [`expired`](Self::expired) never resolves.
#[derive(Default)]
pub(crate) struct Deadline {
    timer: Option<Fuse<Delay>>,
}

impl Deadline {
    /// A deadline that is not running.
    pub(crate) fn disarmed() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the timer.
    pub(crate) fn arm(&mut self, after: Duration) {
        self.timer = Some(Delay::new(after).fuse());
    }

    /// Stops the timer. Has no effect if it is not running.
    pub(crate) fn disarm(&mut self) {
        self.timer = None;
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Resolves once the armed timer fires, then disarms itself.
    pub(crate) async fn expired(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.await;
                self.timer = None;
            }
            None => futures::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::select;
    use std::pin::pin;

    #[tokio::test]
    async fn fires_when_armed() {
        let mut deadline = Deadline::disarmed();
        deadline.arm(Duration::from_millis(10));
        assert!(deadline.is_armed());

        deadline.expired().await;
        assert!(!deadline.is_armed());
    }

    #[tokio::test]
    async fn disarmed_never_fires() {
        let mut deadline = Deadline::disarmed();
        deadline.arm(Duration::from_millis(10));
        deadline.disarm();

        let mut guard = pin!(Delay::new(Duration::from_millis(50)).fuse());
        let fired = select! {
            _ = deadline.expired().fuse() => true,
            _ = guard => false,
        };
        assert!(!fired);
    }
}
