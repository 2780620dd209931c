use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Meta;

/// Pluggable side-effecting operations over a snapshot directory.
///
/// This is the one collaborator this crate treats as out of scope in the sense that its
/// concrete implementation is not prescribed: any storage medium, serialization format,
/// or compression scheme may sit behind it. `snapshot_fsbackend` is the reference
/// implementation this crate ships and tests against.
///
/// All methods except `prepare` run behind `async_trait` because a real implementation
/// will issue file or network I/O; `prepare` is deliberately a plain, synchronous
/// function so it cannot yield across an await point on the caller's task.
#[async_trait]
pub trait SnapshotBackend: Send + Sync + 'static {
    /// An immutable machine-state reference captured by `prepare`, safe to hand to a
    /// worker task for serialization.
    type Ref: Send + 'static;

    /// The live, possibly-mutable machine state `prepare` reads from. Out of scope for
    /// this crate — the participant collaborator owns its shape.
    type Cursor: Send + Sync + ?Sized;

    /// Opaque state threaded through successive `accept_chunk` calls.
    type AcceptState: Send + 'static;

    /// Opaque state threaded through successive outbound `next_chunk` calls.
    type ChunkState: Send + 'static;

    /// Capture a serializable reference to `release_cursor` at `meta`. Must run
    /// synchronously on the caller's task since it is the one point at which
    /// potentially mutable machine state is read.
    fn prepare(&self, meta: &Meta, release_cursor: &Self::Cursor) -> Self::Ref;

    /// Serialize `r` and `meta` into `dir`, atomically from the caller's perspective:
    /// afterward `dir` either holds a complete snapshot or can be safely deleted. Runs on
    /// a worker task.
    async fn write(&self, dir: &Path, meta: &Meta, r: Self::Ref) -> Result<()>;

    /// Open `dir` for outbound streaming, returning the snapshot's checksum, metadata,
    /// and the initial chunk state for `next_chunk`.
    async fn read(&self, dir: &Path) -> Result<(u32, Meta, Self::ChunkState)>;

    /// Given the current chunk state, produce the next chunk of bytes of at most
    /// `chunk_size` and the updated state, or `None` once the snapshot has been fully
    /// read.
    async fn next_chunk(
        &self,
        dir: &Path,
        chunk_size: usize,
        state: Self::ChunkState,
    ) -> Result<Option<(Vec<u8>, Self::ChunkState)>>;

    /// Initialize inbound streaming into `dir`; typically opens a file for append.
    async fn begin_accept(&self, dir: &Path, crc: u32, meta: &Meta) -> Result<Self::AcceptState>;

    /// Append a non-terminal chunk.
    async fn accept_chunk(&self, data: Vec<u8>, state: Self::AcceptState) -> Result<Self::AcceptState>;

    /// Append the final chunk and finalize: verify the declared checksum, close, fsync.
    async fn complete_accept(&self, data: Vec<u8>, state: Self::AcceptState) -> Result<()>;

    /// Reconstruct machine state from a complete snapshot directory.
    async fn recover(&self, dir: &Path) -> Result<(Meta, serde_json::Value)>;

    /// Parse only the metadata header of `dir`, without reconstructing machine state.
    async fn read_meta(&self, dir: &Path) -> Result<Meta>;
}
