mod accept;
mod worker;

use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

pub use accept::AcceptCtx;
pub(crate) use worker::spawn_write_worker;

use crate::backend::SnapshotBackend;
use crate::config::Config;
use crate::error::ErrorSubject;
use crate::error::ErrorVerb;
use crate::error::Result;
use crate::error::SnapshotError;
use crate::error::StorageIOError;
use crate::effect::Effect;
use crate::event::Event;
use crate::registry;
use crate::types::dir_name;
use crate::types::parse_dir_name;
use crate::types::IdxTerm;
use crate::types::Meta;
use crate::types::Uid;
use crate::types::WorkerId;

/// Per-participant snapshot lifecycle state.
///
/// Exclusively owned and mutated by the participant's own task. `Manager` itself spawns
/// the background write worker and delivers its completion by pushing a
/// [`Event::SnapshotWritten`] onto the `inbox` handed to [`Manager::init`] — the same
/// single linearization point every other inbound event (`ChunkReceived`, `WorkerDown`)
/// arrives through.
pub struct Manager<B: SnapshotBackend> {
    uid: Uid,
    backend: Arc<B>,
    directory: PathBuf,
    config: Config,
    inbox: UnboundedSender<Event>,
    next_worker_id: AtomicU64,

    current: Option<IdxTerm>,
    pending: Option<(WorkerId, IdxTerm)>,
    accepting: Option<AcceptCtx<B>>,
}

impl<B: SnapshotBackend> Manager<B> {
    /// Scan `dir` for existing snapshot subdirectories and adopt the youngest valid one.
    /// Every other subdirectory, including a corrupt youngest one that a fallback walk
    /// skipped past, is recursively deleted.
    #[tracing::instrument(level = "debug", skip(backend, inbox), fields(uid = %uid))]
    pub async fn init(
        uid: Uid,
        backend: Arc<B>,
        dir: impl Into<PathBuf>,
        config: Config,
        inbox: UnboundedSender<Event>,
    ) -> Result<Self> {
        let directory = dir.into();
        tokio::fs::create_dir_all(&directory).await.map_err(|e| {
            StorageIOError::from_io_error(ErrorSubject::SnapshotMeta, ErrorVerb::Create, e)
        })?;

        let mut children = read_sorted_children(&directory).await?;
        // Highest-ordered (newest) candidate first.
        children.reverse();

        let mut current = None;

        for (path, idxterm) in children {
            if current.is_some() {
                remove_dir(&path).await?;
                continue;
            }

            match backend.read_meta(&path).await {
                Ok(meta) if meta.idxterm() == idxterm => {
                    current = Some(idxterm);
                }
                Ok(_) | Err(_) => {
                    tracing::warn!(dir = %path.display(), "corrupt snapshot directory, falling back to next oldest");
                    remove_dir(&path).await?;
                }
            }
        }

        if let Some(idxterm) = current {
            registry::registry().publish(&uid, idxterm.index);
        }

        tracing::info!(current = ?current, "snapshot manager initialized");

        Ok(Manager {
            uid,
            backend,
            directory,
            config,
            inbox,
            next_worker_id: AtomicU64::new(0),
            current,
            pending: None,
            accepting: None,
        })
    }

    pub fn current(&self) -> Option<IdxTerm> {
        self.current
    }

    pub fn pending(&self) -> Option<IdxTerm> {
        self.pending.map(|(_, it)| it)
    }

    pub fn accepting(&self) -> bool {
        self.accepting.is_some()
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    fn dir_for(&self, idxterm: IdxTerm) -> PathBuf {
        self.directory.join(dir_name(idxterm))
    }

    /// Begin a background snapshot write. Fails loudly if a write or accept is already
    /// in flight.
    #[tracing::instrument(level = "debug", skip(self, release_cursor), fields(uid = %self.uid))]
    pub async fn begin_snapshot(
        &mut self,
        meta: Meta,
        release_cursor: &B::Cursor,
    ) -> Result<Effect> {
        if self.pending.is_some() {
            return Err(SnapshotError::precondition("begin_snapshot: a write is already pending"));
        }
        if self.accepting.is_some() {
            return Err(SnapshotError::precondition("begin_snapshot: an accept is in progress"));
        }

        let idxterm = meta.idxterm();
        let dir = self.dir_for(idxterm);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageIOError::from_io_error(ErrorSubject::Snapshot(idxterm), ErrorVerb::Create, e))?;

        // Synchronous on this task: this is the one point at which mutable machine state
        // is captured.
        let r = self.backend.prepare(&meta, release_cursor);

        let worker_id = WorkerId(self.next_worker_id.fetch_add(1, Ordering::Relaxed));
        spawn_write_worker(worker_id, self.backend.clone(), dir, meta, r, self.inbox.clone());

        self.pending = Some((worker_id, idxterm));
        tracing::info!(%worker_id, %idxterm, "snapshot write started");

        Ok(Effect::MonitorWorker(worker_id))
    }

    /// Dequeue of a [`Event::SnapshotWritten`] matching `pending`.
    #[tracing::instrument(level = "debug", skip(self), fields(uid = %self.uid))]
    pub async fn complete_snapshot(&mut self, idxterm: IdxTerm) -> Result<()> {
        match self.pending {
            Some((_, pending_idxterm)) if pending_idxterm == idxterm => {}
            Some((_, pending_idxterm)) => {
                return Err(SnapshotError::precondition(format!(
                    "complete_snapshot: expected {}, got {}",
                    pending_idxterm, idxterm
                )))
            }
            None => return Err(SnapshotError::precondition("complete_snapshot: no write is pending")),
        }

        self.retire_current(idxterm).await?;
        self.pending = None;
        registry::registry().publish(&self.uid, idxterm.index);
        self.current = Some(idxterm);

        tracing::info!(%idxterm, "snapshot write complete");
        Ok(())
    }

    /// Recovery path for a crashed background write. A no-op if `worker_id` does not
    /// match the current `pending` worker.
    #[tracing::instrument(level = "debug", skip(self, reason), fields(uid = %self.uid))]
    pub async fn handle_down(&mut self, worker_id: WorkerId, reason: &str) -> Result<()> {
        match self.pending {
            Some((pending_worker, idxterm)) if pending_worker == worker_id => {
                tracing::warn!(%worker_id, reason, %idxterm, "snapshot write worker died, reclaiming partial directory");
                remove_dir(&self.dir_for(idxterm)).await?;
                self.pending = None;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Open the current snapshot for outbound streaming.
    pub async fn read(&self) -> Result<(u32, Meta, B::ChunkState)> {
        let idxterm = self
            .current
            .ok_or_else(|| SnapshotError::precondition("read: no current snapshot"))?;
        self.backend.read(&self.dir_for(idxterm)).await
    }

    /// Produce the next outbound chunk for a stream opened by [`Manager::read`].
    pub async fn next_chunk(
        &self,
        state: B::ChunkState,
    ) -> Result<Option<(Vec<u8>, B::ChunkState)>> {
        let idxterm = self
            .current
            .ok_or_else(|| SnapshotError::precondition("next_chunk: no current snapshot"))?;
        self.backend
            .next_chunk(&self.dir_for(idxterm), self.config.chunk_size, state)
            .await
    }

    /// Reconstruct machine state from the current snapshot.
    pub async fn recover(&self) -> Result<(Meta, serde_json::Value)> {
        let idxterm = self
            .current
            .ok_or_else(|| SnapshotError::precondition("recover: no current snapshot"))?;
        self.backend.recover(&self.dir_for(idxterm)).await
    }

    /// Remove the previous `current` directory if it differs from `next`, keeping
    /// garbage collection uniform across both the write-complete and accept-complete
    /// paths.
    async fn retire_current(&self, next: IdxTerm) -> Result<()> {
        if let Some(prev) = self.current {
            if prev != next {
                remove_dir(&self.dir_for(prev)).await?;
            }
        }
        Ok(())
    }
}

async fn remove_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageIOError::from_io_error(ErrorSubject::SnapshotMeta, ErrorVerb::Delete, e).into()),
    }
}

/// List immediate children of `dir`, parsed as `(path, idxterm)` and sorted so index 0
/// is the oldest and the last element is the youngest.
async fn read_sorted_children(dir: &Path) -> Result<Vec<(PathBuf, IdxTerm)>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| StorageIOError::from_io_error(ErrorSubject::SnapshotMeta, ErrorVerb::Read, e))?;

    let mut out = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageIOError::from_io_error(ErrorSubject::SnapshotMeta, ErrorVerb::Read, e))?
    {
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => continue,
        };
        if let Some(idxterm) = parse_dir_name(name) {
            out.push((entry.path(), idxterm));
        }
    }

    out.sort_by_key(|(_, it)| (it.term, it.index));
    Ok(out)
}
