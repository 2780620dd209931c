use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::backend::SnapshotBackend;
use crate::event::Event;
use crate::types::IdxTerm;
use crate::types::Meta;
use crate::types::WorkerId;

/// Spawn the background snapshot write worker.
///
/// A detached task with no shared mutable state: it owns `r` outright and communicates
/// exclusively by pushing [`Event::SnapshotWritten`] onto `inbox` on success. On failure
/// it simply returns without sending anything — the task ending without a matching event
/// is itself the failure signal an external monitor turns into `WorkerDown`, which the
/// manager handles via `handle_down`. There is no retry inside the worker: a failed write
/// is surfaced as the worker's silent death, not as an error value.
pub(crate) fn spawn_write_worker<B: SnapshotBackend>(
    worker_id: WorkerId,
    backend: Arc<B>,
    dir: PathBuf,
    meta: Meta,
    r: B::Ref,
    inbox: UnboundedSender<Event>,
) {
    let idxterm = IdxTerm::new(meta.index, meta.term);

    tokio::spawn(async move {
        match backend.write(&dir, &meta, r).await {
            Ok(()) => {
                tracing::debug!(%worker_id, %idxterm, "snapshot write worker finished");
                // The participant may already be gone (e.g. mid-shutdown); dropping the
                // event is fine, `handle_down` will reclaim the directory instead.
                let _ = inbox.send(Event::SnapshotWritten(idxterm));
            }
            Err(e) => {
                tracing::error!(%worker_id, %idxterm, error = %e, "snapshot write worker failed");
                // No SnapshotWritten is sent; the monitoring effect drives handle_down.
            }
        }
    });
}
