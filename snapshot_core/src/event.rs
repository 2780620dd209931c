use crate::types::IdxTerm;
use crate::types::WorkerId;

/// Events delivered to the participant's inbox that drive the manager's state machine.
///
/// The manager exposes one handler per variant (`complete_snapshot`, `accept_chunk`,
/// `handle_down`); routing an `Event` to its handler is the caller's job, not the
/// manager's — the manager has no inbox of its own.
#[derive(Debug, Clone)]
pub enum Event {
    /// A background write worker finished serializing `idxterm` to disk.
    SnapshotWritten(IdxTerm),

    /// The transport delivered chunk `n` of an in-flight accept.
    ChunkReceived { data: Vec<u8>, n: u64 },

    /// The monitoring substrate observed `worker_id` terminate.
    WorkerDown { worker_id: WorkerId, reason: String },
}
