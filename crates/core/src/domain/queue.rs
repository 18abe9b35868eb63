// Queue configuration

use std::time::Duration;

pub type QueueId = String;

/// `{name, limit, paused?, pollInterval?}` per the queue configuration contract.
/// `limit` bounds concurrent executions of this queue in this process; it has
/// no bearing on other processes running dispatchers for the same name.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: QueueId,
    pub limit: usize,
    pub paused: bool,
    pub poll_interval: Duration,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, limit: usize) -> Self {
        Self {
            name: name.into(),
            limit,
            paused: false,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
