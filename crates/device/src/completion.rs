//! One-shot completion channel.
//!
//! Each accepted asynchronous operation gets a fresh channel: the producer
//! side is consumed by [`CompletionSender::send`], so it can be written at
//! most once, and a new operation never sees a stale value.

use tokio::sync::oneshot;
use tracing::warn;

/// Final result of an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Whether the operation succeeded
    pub success: bool,

    /// Device name on failure
    pub failing_device: Option<String>,
}

impl Completion {
    fn new(success: bool, device: &str) -> Self {
        Self {
            success,
            failing_device: (!success).then(|| device.to_string()),
        }
    }
}

/// Producer half, owned by the thread that finishes the operation.
#[derive(Debug)]
pub struct CompletionSender {
    device: String,
    tx: oneshot::Sender<Completion>,
}

impl CompletionSender {
    /// Publish the final result. Consumes the sender.
    pub fn send(self, success: bool) {
        let completion = Completion::new(success, &self.device);
        // Non-blocking callers drop their receiver; nobody is waiting then.
        let _ = self.tx.send(completion);
    }
}

/// Consumer half, held by whoever waits for the operation.
#[derive(Debug)]
pub struct CompletionReceiver {
    device: String,
    rx: oneshot::Receiver<Completion>,
}

impl CompletionReceiver {
    /// Block the calling thread until the result arrives.
    ///
    /// A producer that vanished without reporting counts as a failure.
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> Completion {
        match self.rx.blocking_recv() {
            Ok(completion) => completion,
            Err(_) => {
                warn!("Device {} dropped its completion channel", self.device);
                Completion::new(false, &self.device)
            }
        }
    }

    /// Non-blocking check for a result.
    pub fn try_result(&mut self) -> Option<Completion> {
        self.rx.try_recv().ok()
    }

    /// Device this channel belongs to.
    pub fn device(&self) -> &str {
        &self.device
    }
}

/// Create a completion channel for one operation on `device`.
pub fn completion_channel(device: &str) -> (CompletionSender, CompletionReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        CompletionSender {
            device: device.to_string(),
            tx,
        },
        CompletionReceiver {
            device: device.to_string(),
            rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_delivered() {
        let (tx, rx) = completion_channel("Z1");
        std::thread::spawn(move || tx.send(true));
        let completion = rx.wait();
        assert!(completion.success);
        assert_eq!(completion.failing_device, None);
    }

    #[test]
    fn test_failure_names_device() {
        let (tx, rx) = completion_channel("G2");
        tx.send(false);
        assert_eq!(rx.wait().failing_device.as_deref(), Some("G2"));
    }

    #[test]
    fn test_dropped_sender_is_failure() {
        let (tx, rx) = completion_channel("Z1");
        drop(tx);
        let completion = rx.wait();
        assert!(!completion.success);
        assert_eq!(completion.failing_device.as_deref(), Some("Z1"));
    }

    #[test]
    fn test_try_result_before_and_after() {
        let (tx, mut rx) = completion_channel("Z1");
        assert!(rx.try_result().is_none());
        tx.send(true);
        assert_eq!(rx.try_result().map(|c| c.success), Some(true));
    }
}
