use std::sync::Arc;

use exam_core::model::{AssessmentId, RecoverySnapshot};
use storage::repository::StorageError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::store::RecoveryStore;

enum WriterCommand {
    Save(Box<RecoverySnapshot>),
    Clear(AssessmentId, oneshot::Sender<Result<bool, StorageError>>),
    Flush(oneshot::Sender<()>),
}

/// Sequential background writer in front of a `RecoveryStore`.
///
/// Saves are queued without waiting, and every command runs in the order it
/// was sent, so the last queued snapshot is the one left in the store.
#[derive(Clone)]
pub struct RecoveryWriter {
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl RecoveryWriter {
    /// Spawns the writer task on the current tokio runtime. The task exits
    /// once every handle has been dropped and the queue is drained.
    #[must_use]
    pub fn spawn(store: Arc<RecoveryStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, rx));
        Self { tx }
    }

    /// Queues a snapshot write. Failures are logged by the writer task.
    pub fn save(&self, snapshot: RecoverySnapshot) {
        if self.tx.send(WriterCommand::Save(Box::new(snapshot))).is_err() {
            warn!("recovery writer stopped; snapshot dropped");
        }
    }

    /// Waits until every command queued before this call has run.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(done)).is_err() {
            return;
        }
        let _ = wait.await;
    }

    /// Deletes the snapshot after any queued saves have landed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails or the writer has stopped.
    pub async fn clear(&self, assessment_id: &AssessmentId) -> Result<bool, StorageError> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(WriterCommand::Clear(assessment_id.clone(), done))
            .map_err(|_| StorageError::Connection("recovery writer stopped".into()))?;
        wait.await
            .map_err(|_| StorageError::Connection("recovery writer stopped".into()))?
    }
}

async fn run(store: Arc<RecoveryStore>, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Save(snapshot) => {
                if let Err(err) = store.save(&snapshot).await {
                    warn!(
                        assessment_id = %snapshot.assessment_id,
                        error = %err,
                        "recovery snapshot save failed"
                    );
                }
            }
            WriterCommand::Clear(assessment_id, done) => {
                let result = store.clear(&assessment_id).await;
                if let Err(err) = &result {
                    warn!(assessment_id = %assessment_id, error = %err, "recovery snapshot clear failed");
                }
                let _ = done.send(result);
            }
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("recovery writer finished");
}
