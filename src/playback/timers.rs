use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Which periodic checkpoint fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Local,
    Remote,
}

/// The two checkpoint timers of one playing session
///
/// Both timers are created together by `start` and dropped together by
/// `stop`, so a session can never leave one of them behind.
pub struct SessionTimers {
    local_period: Duration,
    remote_period: Duration,
    active: Option<(Interval, Interval)>,
}

impl SessionTimers {
    pub fn new(local_period: Duration, remote_period: Duration) -> Self {
        SessionTimers {
            local_period,
            remote_period,
            active: None,
        }
    }

    /// (Re)start both timers. The first ticks fire one period from now.
    pub fn start(&mut self) {
        let now = Instant::now();
        let mut local = interval_at(now + self.local_period, self.local_period);
        let mut remote = interval_at(now + self.remote_period, self.remote_period);
        local.set_missed_tick_behavior(MissedTickBehavior::Delay);
        remote.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.active = Some((local, remote));
    }

    pub fn stop(&mut self) {
        self.active = None;
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Wait for the next checkpoint. Pends forever while stopped.
    pub async fn next(&mut self) -> Checkpoint {
        match &mut self.active {
            Some((local, remote)) => {
                tokio::select! {
                    biased;
                    _ = local.tick() => Checkpoint::Local,
                    _ = remote.tick() => Checkpoint::Remote,
                }
            }
            None => std::future::pending().await,
        }
    }
}
