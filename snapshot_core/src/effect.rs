use crate::types::WorkerId;

/// A description of a side effect the manager wants realized by an external dispatcher.
///
/// The manager never performs process supervision itself: `begin_snapshot` returns this
/// descriptor alongside the updated state, and the participant's own event loop is
/// responsible for actually installing a monitor. This keeps the state machine pure and
/// testable without a live scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Watch `worker_id` for termination and deliver a `WorkerDown` event on exit.
    MonitorWorker(WorkerId),
}
