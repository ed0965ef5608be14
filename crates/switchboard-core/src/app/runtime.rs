//! Runtime - 2 本のバックグラウンドループ（dispatcher / consumer）
//!
//! 2 つのループはメモリ上の状態を共有しない。共有するのは RecordStore だけ。

use super::handle::LoopHandle;

pub struct Runtime {
    dispatcher: LoopHandle,
    consumer: LoopHandle,
}

impl Runtime {
    pub(crate) fn new(dispatcher: LoopHandle, consumer: LoopHandle) -> Self {
        Self {
            dispatcher,
            consumer,
        }
    }

    /// Ask both loops to stop after their current unit of work.
    pub fn stop(&self) {
        self.dispatcher.stop();
        self.consumer.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.dispatcher.is_finished() && self.consumer.is_finished()
    }

    /// Stop both loops and wait for them.
    pub async fn shutdown(self) {
        self.stop();
        self.dispatcher.join().await;
        self.consumer.join().await;
        tracing::info!("runtime stopped");
    }
}
