use std::time::Duration;

use tokio::time::Instant;

/// Keep-alive timers of one socket.
///
/// The ping timer is armed when the socket opens and rearmed by any inbound traffic, when it
/// fires a `ping` is sent. If a pong timeout is configured, the first unanswered ping also arms
/// a deadline, cleared by any inbound traffic.
#[derive(Debug)]
pub(crate) struct KeepAlive {
    interval: Option<Duration>,
    pong_timeout: Option<Duration>,
    ping_at: Option<Instant>,
    pong_deadline: Option<Instant>,
}

impl KeepAlive {
    pub fn new(interval: Option<Duration>, pong_timeout: Option<Duration>) -> Self {
        Self {
            interval,
            pong_timeout,
            ping_at: interval.map(|i| Instant::now() + i),
            pong_deadline: None,
        }
    }

    pub fn traffic(&mut self) {
        self.rearm();
        self.pong_deadline = None;
    }

    pub fn ping_sent(&mut self) {
        self.rearm();
        if self.pong_deadline.is_none() {
            self.pong_deadline = self.pong_timeout.map(|t| Instant::now() + t);
        }
    }

    pub fn ping_at(&self) -> Option<Instant> {
        self.ping_at
    }

    pub fn pong_deadline(&self) -> Option<Instant> {
        self.pong_deadline
    }

    fn rearm(&mut self) {
        self.ping_at = self.interval.map(|i| Instant::now() + i);
    }
}

/// Sleep until the deadline, forever if there is none
pub(crate) async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_traffic_rearms_ping() {
        let mut keep_alive = KeepAlive::new(Some(Duration::from_secs(10)), None);
        let first = keep_alive.ping_at().unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        keep_alive.traffic();

        assert_eq!(
            keep_alive.ping_at().unwrap(),
            first + Duration::from_secs(4)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_deadline_set_by_first_ping_only() {
        let mut keep_alive = KeepAlive::new(
            Some(Duration::from_secs(10)),
            Some(Duration::from_secs(30)),
        );
        assert!(keep_alive.pong_deadline().is_none());

        keep_alive.ping_sent();
        let deadline = keep_alive.pong_deadline().unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        keep_alive.ping_sent();
        assert_eq!(keep_alive.pong_deadline().unwrap(), deadline);

        keep_alive.traffic();
        assert!(keep_alive.pong_deadline().is_none());
    }

    #[test]
    fn test_disabled() {
        let mut keep_alive = KeepAlive::new(None, Some(Duration::from_secs(1)));
        keep_alive.ping_sent();
        assert!(keep_alive.ping_at().is_none());
    }
}
