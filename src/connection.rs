//! Lifecycle of the single BLE link to a kettle.
use crate::error::{Error, Result};
use crate::transport::{Connector, Link, NotifyFn};
use log::*;
use std::time::Duration;

/// Connection attempts made before giving up.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
/// Pause after the first failed attempt, the n-th failure waits n times as long.
pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub enum Connection<L> {
    Absent,
    Connecting,
    Connected(L),
}

/// Owns the link and enforces "at most one live link" for a client.
#[derive(Debug)]
pub struct ConnectionManager<L> {
    state: Connection<L>,
    attempts: u32,
    backoff: Duration,
}

impl<L: Link> ConnectionManager<L> {
    /// Starts absent. `attempts` is at least 1, the n-th failure waits `backoff * n`.
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            state: Connection::Absent,
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &Connection<L> {
        &self.state
    }

    /// Whether a link is up and subscribed.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, Connection::Connected(_))
    }

    /// The live link, for issuing reads and writes.
    pub fn link(&self) -> Result<&L> {
        match &self.state {
            Connection::Connected(link) => Ok(link),
            _ => Err(Error::NotConnected),
        }
    }

    /// Makes sure a live, subscribed link exists.
    ///
    /// Returns `true` when a new link had to be established, in which case
    /// anything cached from a previous link is stale.
    pub async fn ensure_connected<C>(
        &mut self,
        connector: &C,
        device: &C::Device,
        on_notify: NotifyFn,
    ) -> Result<bool>
    where
        C: Connector<Link = L>,
    {
        if let Connection::Connected(link) = &self.state {
            if link.is_connected().await {
                return Ok(false);
            }
            debug!("Link reports disconnected, reconnecting");
            self.teardown().await;
        }

        self.state = Connection::Connecting;
        let mut attempt = 0;
        let link = loop {
            attempt += 1;
            match connector.connect(device).await {
                Ok(link) => break link,
                Err(source) if attempt >= self.attempts => {
                    self.state = Connection::Absent;
                    return Err(Error::ConnectionFailed {
                        attempts: attempt,
                        source,
                    });
                }
                Err(err) => {
                    let delay = self.backoff * attempt;
                    warn!(
                        "Connection attempt {attempt}/{} failed: {err}, retrying in {delay:?}",
                        self.attempts
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        if let Err(err) = link.subscribe(on_notify).await {
            if let Err(err) = link.disconnect().await {
                debug!("Disconnect after failed subscribe: {err}");
            }
            self.state = Connection::Absent;
            return Err(err.into());
        }
        info!("Connected to kettle after {attempt} attempt(s)");
        self.state = Connection::Connected(link);
        Ok(true)
    }

    /// Drops the link, unsubscribing and disconnecting on a best-effort basis.
    /// Calling this without a link is a no-op.
    pub async fn teardown(&mut self) {
        if let Connection::Connected(link) = std::mem::replace(&mut self.state, Connection::Absent) {
            if let Err(err) = link.unsubscribe().await {
                warn!("Cannot unsubscribe from notifications: {err}");
            }
            if let Err(err) = link.disconnect().await {
                warn!("Cannot disconnect from kettle: {err}");
            }
            debug!("Link torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockKettle, MockLink, BASE};
    use crate::transport::TransportError;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn noop() -> NotifyFn {
        Arc::new(|_: &[u8]| {})
    }

    fn new_manager(attempts: u32) -> ConnectionManager<MockLink> {
        ConnectionManager::new(attempts, DEFAULT_CONNECT_BACKOFF)
    }

    #[tokio::test(start_paused = true)]
    async fn connects_once_and_reuses_live_link() {
        let kettle = MockKettle::new(BASE);
        let mut manager = new_manager(DEFAULT_CONNECT_ATTEMPTS);
        assert_matches!(manager.link(), Err(Error::NotConnected));

        assert!(manager.ensure_connected(&kettle, &(), noop()).await.unwrap());
        assert!(!manager.ensure_connected(&kettle, &(), noop()).await.unwrap());
        assert!(manager.is_connected());

        let state = kettle.state.lock();
        assert_eq!(state.connects, 1);
        assert_eq!(state.subscribes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_link_is_replaced() {
        let kettle = MockKettle::new(BASE);
        let mut manager = new_manager(DEFAULT_CONNECT_ATTEMPTS);
        manager.ensure_connected(&kettle, &(), noop()).await.unwrap();

        kettle.drop_link();
        assert!(manager.ensure_connected(&kettle, &(), noop()).await.unwrap());

        let state = kettle.state.lock();
        assert_eq!(state.connects, 2);
        assert_eq!(state.unsubscribes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_attempts_are_exhausted() {
        let kettle = MockKettle::new(BASE);
        kettle.with(|s| s.connect_failures = 2);
        let mut manager = new_manager(3);
        assert!(manager.ensure_connected(&kettle, &(), noop()).await.unwrap());
        assert_eq!(kettle.state.lock().connects, 3);

        let kettle = MockKettle::new(BASE);
        kettle.with(|s| s.connect_failures = 3);
        let mut manager = new_manager(3);
        assert_matches!(
            manager.ensure_connected(&kettle, &(), noop()).await,
            Err(Error::ConnectionFailed {
                attempts: 3,
                source: TransportError::Backend(_)
            })
        );
        assert_matches!(manager.state(), Connection::Absent);
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_between_attempts() {
        let kettle = MockKettle::new(BASE);
        kettle.with(|s| s.connect_failures = 2);
        let mut manager = ConnectionManager::<MockLink>::new(3, Duration::from_millis(100));

        let start = Instant::now();
        manager.ensure_connected(&kettle, &(), noop()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(300));

        // No pause after the final failure.
        let kettle = MockKettle::new(BASE);
        kettle.with(|s| s.connect_failures = 3);
        let mut manager = ConnectionManager::<MockLink>::new(3, Duration::from_millis(100));
        let start = Instant::now();
        assert!(manager.ensure_connected(&kettle, &(), noop()).await.is_err());
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_subscribe_leaves_no_link() {
        let kettle = MockKettle::new(BASE);
        kettle.with(|s| s.fail_subscribe = true);
        let mut manager = new_manager(DEFAULT_CONNECT_ATTEMPTS);
        assert_matches!(
            manager.ensure_connected(&kettle, &(), noop()).await,
            Err(Error::Transport(_))
        );
        assert!(!manager.is_connected());
        assert_eq!(kettle.state.lock().disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_is_idempotent() {
        let kettle = MockKettle::new(BASE);
        let mut manager = new_manager(DEFAULT_CONNECT_ATTEMPTS);
        manager.ensure_connected(&kettle, &(), noop()).await.unwrap();

        manager.teardown().await;
        manager.teardown().await;

        let state = kettle.state.lock();
        assert_eq!(state.unsubscribes, 1);
        assert_eq!(state.disconnects, 1);
        assert!(!state.connected);
    }
}
