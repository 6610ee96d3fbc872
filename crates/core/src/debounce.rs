use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// A single restartable countdown.
///
/// Every call to [`Debounce::reset`] pushes the deadline out to `now + period`.
/// [`Debounce::fired`] resolves once the deadline passes without another reset,
/// and disarms the countdown. While disarmed it never resolves, which makes it
/// safe to use as an always-present branch of a `tokio::select!`.
#[derive(Debug, Clone)]
pub struct Debounce {
    period: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arms the countdown, or restarts it if already armed.
    pub fn reset(&mut self) {
        self.deadline = Some(Instant::now() + self.period);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel-safe: dropping the future before it resolves leaves the
    /// countdown armed.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
