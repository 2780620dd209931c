//! Snapshot lifecycle management for one Raft consensus participant.
//!
//! Coordinates persisting machine state to stable storage at a committed log index,
//! receiving a snapshot from a peer leader in chunks, recovering machine state from a
//! previously persisted snapshot at startup, and publishing the participant's latest
//! snapshot index to observers on the same host. See [`manager::Manager`] for the state
//! machine itself and [`backend::SnapshotBackend`] for the pluggable storage strategy.
//!
//! This crate does not implement the Raft log, server loop, message transport, or CLI —
//! those are external collaborators. It also does not perform process supervision: the
//! manager only emits [`effect::Effect`] descriptors for an external dispatcher to
//! realize.

pub mod backend;
pub mod config;
pub mod effect;
pub mod error;
pub mod event;
pub mod manager;
pub mod registry;
pub mod types;

pub use backend::SnapshotBackend;
pub use config::Config;
pub use effect::Effect;
pub use error::SnapshotError;
pub use event::Event;
pub use manager::Manager;
pub use registry::last_snapshot_index;
pub use types::dir_name;
pub use types::parse_dir_name;
pub use types::IdxTerm;
pub use types::Index;
pub use types::Meta;
pub use types::Term;
pub use types::Uid;
pub use types::WorkerId;
