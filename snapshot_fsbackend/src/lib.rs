//! Reference filesystem implementation of [`snapshot_core::SnapshotBackend`].
//!
//! Serializes `Meta` plus an opaque JSON machine-state payload into a single
//! `snapshot.bin` file per directory (see [`format`]). This is the concrete backend
//! `snapshot_core`'s own test suite runs against.

mod format;

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use snapshot_core::error::ErrorSubject;
use snapshot_core::error::ErrorVerb;
use snapshot_core::error::Result;
use snapshot_core::error::StorageIOError;
use snapshot_core::Meta;
use snapshot_core::SnapshotBackend;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;

/// Opaque file handle kept open across `begin_accept`/`accept_chunk`/`complete_accept`.
pub struct AcceptState {
    file: tokio::fs::File,
    path: PathBuf,
    hasher: crc32fast::Hasher,
    declared_crc: u32,
}

/// In-memory cursor over a snapshot file already read in full by `read`.
#[derive(Clone)]
pub struct ChunkState {
    bytes: Arc<Vec<u8>>,
    offset: usize,
}

/// A filesystem-backed [`SnapshotBackend`] storing one `snapshot.bin` per directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsBackend;

impl FsBackend {
    pub fn new() -> Self {
        FsBackend
    }

    fn file_path(dir: &Path) -> PathBuf {
        dir.join(format::FILE_NAME)
    }
}

#[async_trait]
impl SnapshotBackend for FsBackend {
    /// The serialized body is captured synchronously in `prepare`; `write` only has to
    /// serialize `Meta` and persist.
    type Ref = serde_json::Value;
    type Cursor = serde_json::Value;
    type AcceptState = AcceptState;
    type ChunkState = ChunkState;

    fn prepare(&self, _meta: &Meta, release_cursor: &Self::Cursor) -> Self::Ref {
        release_cursor.clone()
    }

    #[tracing::instrument(level = "trace", skip(self, r), fields(dir = %dir.display()))]
    async fn write(&self, dir: &Path, meta: &Meta, r: Self::Ref) -> Result<()> {
        let bytes = format::encode(meta, &r)
            .map_err(|e| StorageIOError::new(ErrorSubject::Snapshot(meta.idxterm()), ErrorVerb::Write, anyerror::AnyError::new(&e)))?;

        let final_path = Self::file_path(dir);
        let tmp_path = dir.join(format!("{}.tmp", format::FILE_NAME));

        let mut f = tokio::fs::File::create(&tmp_path).await.map_err(|e| {
            StorageIOError::from_io_error(ErrorSubject::Snapshot(meta.idxterm()), ErrorVerb::Write, e)
        })?;
        f.write_all(&bytes).await.map_err(|e| {
            StorageIOError::from_io_error(ErrorSubject::Snapshot(meta.idxterm()), ErrorVerb::Write, e)
        })?;
        f.sync_all().await.map_err(|e| {
            StorageIOError::from_io_error(ErrorSubject::Snapshot(meta.idxterm()), ErrorVerb::Write, e)
        })?;
        drop(f);

        tokio::fs::rename(&tmp_path, &final_path).await.map_err(|e| {
            StorageIOError::from_io_error(ErrorSubject::Snapshot(meta.idxterm()), ErrorVerb::Write, e)
        })?;

        tracing::debug!(bytes = bytes.len(), "snapshot written");
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self), fields(dir = %dir.display()))]
    async fn read(&self, dir: &Path) -> Result<(u32, Meta, Self::ChunkState)> {
        let bytes = read_file(&Self::file_path(dir), ErrorVerb::Read).await?;
        let header = format::decode_header(&bytes)?;
        let crc = crc32fast::hash(&bytes);

        Ok((
            crc,
            header.meta,
            ChunkState {
                bytes: Arc::new(bytes),
                offset: 0,
            },
        ))
    }

    async fn next_chunk(
        &self,
        _dir: &Path,
        chunk_size: usize,
        state: Self::ChunkState,
    ) -> Result<Option<(Vec<u8>, Self::ChunkState)>> {
        if state.offset >= state.bytes.len() {
            return Ok(None);
        }
        let end = (state.offset + chunk_size).min(state.bytes.len());
        let chunk = state.bytes[state.offset..end].to_vec();
        Ok(Some((
            chunk,
            ChunkState {
                bytes: state.bytes,
                offset: end,
            },
        )))
    }

    #[tracing::instrument(level = "trace", skip(self, meta), fields(dir = %dir.display()))]
    async fn begin_accept(&self, dir: &Path, crc: u32, meta: &Meta) -> Result<Self::AcceptState> {
        let path = dir.join(format!("{}.partial", format::FILE_NAME));
        let file = tokio::fs::File::create(&path).await.map_err(|e| {
            StorageIOError::from_io_error(ErrorSubject::Snapshot(meta.idxterm()), ErrorVerb::Create, e)
        })?;
        Ok(AcceptState {
            file,
            path,
            hasher: crc32fast::Hasher::new(),
            declared_crc: crc,
        })
    }

    async fn accept_chunk(&self, data: Vec<u8>, mut state: Self::AcceptState) -> Result<Self::AcceptState> {
        state
            .file
            .write_all(&data)
            .await
            .map_err(|e| StorageIOError::from_io_error(ErrorSubject::AcceptStream, ErrorVerb::Write, e))?;
        state.hasher.update(&data);
        Ok(state)
    }

    #[tracing::instrument(level = "trace", skip(self, data, state))]
    async fn complete_accept(&self, data: Vec<u8>, mut state: Self::AcceptState) -> Result<()> {
        state
            .file
            .write_all(&data)
            .await
            .map_err(|e| StorageIOError::from_io_error(ErrorSubject::AcceptStream, ErrorVerb::Write, e))?;
        state.hasher.update(&data);

        let actual_crc = state.hasher.finalize();
        if actual_crc != state.declared_crc {
            return Err(snapshot_core::error::MetaError::ChecksumError.into());
        }

        state
            .file
            .sync_all()
            .await
            .map_err(|e| StorageIOError::from_io_error(ErrorSubject::AcceptStream, ErrorVerb::Write, e))?;
        drop(state.file);

        // The accepted byte stream is whatever the sender transferred, not necessarily a
        // `snapshot.bin` envelope; the transfer crc above is the only validation this
        // contract calls for.
        let final_path = state.path.with_file_name(format::FILE_NAME);
        tokio::fs::rename(&state.path, &final_path)
            .await
            .map_err(|e| StorageIOError::from_io_error(ErrorSubject::AcceptStream, ErrorVerb::Write, e))?;

        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self), fields(dir = %dir.display()))]
    async fn recover(&self, dir: &Path) -> Result<(Meta, serde_json::Value)> {
        let bytes = read_file(&Self::file_path(dir), ErrorVerb::Read).await?;
        let envelope = format::decode_envelope(&bytes)?;
        Ok((envelope.meta, envelope.data))
    }

    #[tracing::instrument(level = "trace", skip(self), fields(dir = %dir.display()))]
    async fn read_meta(&self, dir: &Path) -> Result<Meta> {
        let bytes = read_file(&Self::file_path(dir), ErrorVerb::Read).await?;
        let header = format::decode_header(&bytes)?;
        Ok(header.meta)
    }
}

async fn read_file(path: &Path, verb: ErrorVerb) -> Result<Vec<u8>> {
    let mut f = tokio::fs::File::open(path)
        .await
        .map_err(|e| StorageIOError::from_io_error(ErrorSubject::SnapshotMeta, verb, e))?;
    let mut bytes = Vec::new();
    f.read_to_end(&mut bytes)
        .await
        .map_err(|e| StorageIOError::from_io_error(ErrorSubject::SnapshotMeta, verb, e))?;
    Ok(bytes)
}
