use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to one spawned loop.
/// - `stop()` でループに停止を要求（処理中の 1 件は最後まで終わらせる）。寝ているループは即座に起きる
/// - `join()` で終了を待つ
pub struct LoopHandle {
    name: &'static str,
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl LoopHandle {
    /// Spawn `body` with a fresh shutdown receiver.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, rx) = watch::channel(false);
        let join = tokio::spawn(body(rx));
        Self { name, stop, join }
    }

    pub fn stop(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) {
        if let Err(e) = self.join.await {
            tracing::error!(loop_name = self.name, error = %e, "loop task ended abnormally");
        }
    }
}
