//! Spawning a pipeline as an independent task.

use crate::progress::{Progress, ProgressLine};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A running pipeline: its progress lines and its eventual result.
pub struct RunHandle {
    pub lines: mpsc::Receiver<ProgressLine>,
    pub task: JoinHandle<anyhow::Result<()>>,
}

impl RunHandle {
    /// Hand every line to `on_line` as it arrives, then return the run's
    /// result.
    pub async fn follow(mut self, mut on_line: impl FnMut(&ProgressLine)) -> anyhow::Result<()> {
        while let Some(line) = self.lines.recv().await {
            on_line(&line);
        }
        self.task.await?
    }
}

/// Spawn `pipeline` on the runtime with a fresh progress channel.
pub fn spawn_run<F, Fut>(capacity: usize, verbose: bool, pipeline: F) -> RunHandle
where
    F: FnOnce(Progress) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (progress, lines) = Progress::channel(capacity, verbose);
    let task = tokio::spawn(pipeline(progress));
    RunHandle { lines, task }
}
