use std::time::Duration;

use tokio::{sync::mpsc, task::AbortHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firing {
    pub investment_id: String,
    pub session: SessionKey,
}

// Not Clone: whoever holds the handle owns the cancel.
#[derive(Debug)]
pub struct TimerHandle {
    task: AbortHandle,
    cancelled: bool,
}

impl TimerHandle {
    pub fn cancel(&mut self) -> bool {
        if self.cancelled {
            return false;
        }

        self.cancelled = true;
        self.task.abort();
        true
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    firings: mpsc::UnboundedSender<Firing>,
}

impl Scheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Firing>) {
        let (firings, receiver) = mpsc::unbounded_channel();
        (Self { firings }, receiver)
    }

    pub fn arm(&self, investment_id: &str, session: SessionKey, delay: Duration) -> TimerHandle {
        let firings = self.firings.clone();
        let firing = Firing {
            investment_id: investment_id.to_owned(),
            session,
        };

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = firings.send(firing);
        });

        TimerHandle {
            task: task.abort_handle(),
            cancelled: false,
        }
    }
}
