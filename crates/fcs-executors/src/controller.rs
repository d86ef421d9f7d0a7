//! The run's link to its owner: stop flag, result sink, completion signal.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::results::TestResult;

/// Collaborator observed and fed by a running suite.
#[async_trait]
pub trait DaemonController: Send + Sync {
    /// Checked before every test case.
    fn should_stop(&self) -> bool;

    /// Request a cooperative stop.
    fn stop(&self);

    fn add_result(&self, result: TestResult);

    /// Results so far, in completion order.
    fn results(&self) -> Vec<TestResult>;

    fn set_completed(&self);

    fn is_completed(&self) -> bool;

    /// Resolve once [`Self::set_completed`] has been called.
    async fn wait_completed(&self);
}

/// In-memory [`DaemonController`], optionally streaming each result as it lands.
#[derive(Debug)]
pub struct BufferedDaemonController {
    stop: AtomicBool,
    results: Mutex<Vec<TestResult>>,
    completed: watch::Sender<bool>,
    forward: Option<mpsc::UnboundedSender<TestResult>>,
}

impl Default for BufferedDaemonController {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferedDaemonController {
    #[must_use]
    pub fn new() -> Self {
        let (completed, _) = watch::channel(false);
        Self {
            stop: AtomicBool::new(false),
            results: Mutex::new(Vec::new()),
            completed,
            forward: None,
        }
    }

    /// A controller that also forwards every result to the returned receiver.
    #[must_use]
    pub fn with_stream() -> (Self, mpsc::UnboundedReceiver<TestResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut controller = Self::new();
        controller.forward = Some(tx);
        (controller, rx)
    }
}

#[async_trait]
impl DaemonController for BufferedDaemonController {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        tracing::info!("stop requested");
        self.stop.store(true, Ordering::SeqCst);
    }

    fn add_result(&self, result: TestResult) {
        if let Some(forward) = &self.forward {
            if forward.send(result.clone()).is_err() {
                tracing::debug!(test_case_id = %result.id, "result stream closed");
            }
        }
        self.results.lock().push(result);
    }

    fn results(&self) -> Vec<TestResult> {
        self.results.lock().clone()
    }

    fn set_completed(&self) {
        self.completed.send_replace(true);
    }

    fn is_completed(&self) -> bool {
        *self.completed.borrow()
    }

    async fn wait_completed(&self) {
        let mut rx = self.completed.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|done| *done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Metrics;
    use fcs_model::TestCase;
    use std::sync::Arc;
    use std::time::Duration;

    fn result(id: &str) -> TestResult {
        let tc = TestCase {
            id: id.to_string(),
            ..TestCase::default()
        };
        TestResult::passed(&tc, Metrics::default())
    }

    #[test]
    fn stop_flag() {
        let controller = BufferedDaemonController::new();
        assert!(!controller.should_stop());
        controller.stop();
        assert!(controller.should_stop());
    }

    #[tokio::test]
    async fn results_are_buffered_and_streamed() {
        let (controller, mut rx) = BufferedDaemonController::with_stream();
        controller.add_result(result("#t1"));
        controller.add_result(result("#t2"));

        let ids: Vec<String> = controller.results().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["#t1", "#t2"]);
        assert_eq!(rx.recv().await.unwrap().id, "#t1");
        assert_eq!(rx.recv().await.unwrap().id, "#t2");
    }

    #[tokio::test]
    async fn dropped_stream_does_not_lose_results() {
        let (controller, rx) = BufferedDaemonController::with_stream();
        drop(rx);
        controller.add_result(result("#t1"));
        assert_eq!(controller.results().len(), 1);
    }

    #[tokio::test]
    async fn wait_completed_resolves() {
        let controller = Arc::new(BufferedDaemonController::new());
        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.wait_completed().await })
        };
        assert!(!controller.is_completed());
        controller.set_completed();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(controller.is_completed());
    }
}
