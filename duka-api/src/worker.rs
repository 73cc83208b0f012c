use duka_order::{FollowUpJob, OutboxWorker};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Runs the outbox worker until every `Outbox` handle is dropped.
pub fn start_outbox_worker(worker: OutboxWorker, jobs: mpsc::Receiver<FollowUpJob>) -> JoinHandle<()> {
    tokio::spawn(worker.run(jobs))
}
