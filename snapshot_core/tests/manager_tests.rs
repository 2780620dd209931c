use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use snapshot_core::backend::SnapshotBackend;
use snapshot_core::config::Config;
use snapshot_core::effect::Effect;
use snapshot_core::error::Result;
use snapshot_core::error::SnapshotError;
use snapshot_core::registry;
use snapshot_core::types::IdxTerm;
use snapshot_core::types::Meta;
use snapshot_core::types::Uid;
use snapshot_core::Manager;
use snapshot_fsbackend::FsBackend;
use tempfile::TempDir;

fn uid(name: &str) -> Uid {
    Uid::from_str(name)
}

fn empty_cluster() -> serde_json::Value {
    serde_json::json!([])
}

async fn init_manager(
    name: &str,
    dir: &Path,
) -> (Manager<FsBackend>, tokio::sync::mpsc::UnboundedReceiver<snapshot_core::Event>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let manager = Manager::init(uid(name), Arc::new(FsBackend::new()), dir.to_path_buf(), Config::default(), tx)
        .await
        .expect("init should succeed");
    (manager, rx)
}

/// Cold start against an empty directory leaves no current snapshot.
#[tokio::test]
async fn cold_start_empty() {
    let dir = TempDir::new().unwrap();
    let (manager, _rx) = init_manager("s1", dir.path()).await;

    assert_eq!(manager.current(), None);
    assert_eq!(registry::last_snapshot_index(&uid("s1")), None);
}

/// Cold start adopts a single pre-existing on-disk snapshot.
#[tokio::test]
async fn cold_start_one_snapshot() {
    let dir = TempDir::new().unwrap();
    let backend = FsBackend::new();
    let meta = Meta::new(100, 3, empty_cluster());
    let snap_dir = dir.path().join(snapshot_core::dir_name(IdxTerm::new(100, 3)));
    tokio::fs::create_dir_all(&snap_dir).await.unwrap();
    backend.write(&snap_dir, &meta, empty_cluster()).await.unwrap();

    let (manager, _rx) = init_manager("s2", dir.path()).await;

    assert_eq!(manager.current(), Some(IdxTerm::new(100, 3)));
    assert_eq!(registry::last_snapshot_index(&uid("s2")), Some(100));
}

/// Cold start with two on-disk snapshots keeps only the youngest.
#[tokio::test]
async fn cold_start_two_snapshots_keeps_youngest() {
    let dir = TempDir::new().unwrap();
    let backend = FsBackend::new();

    for (index, term) in [(10u64, 1u64), (20, 2)] {
        let meta = Meta::new(index, term, empty_cluster());
        let snap_dir = dir.path().join(snapshot_core::dir_name(IdxTerm::new(index, term)));
        tokio::fs::create_dir_all(&snap_dir).await.unwrap();
        backend.write(&snap_dir, &meta, empty_cluster()).await.unwrap();
    }

    let (manager, _rx) = init_manager("s3", dir.path()).await;

    assert_eq!(manager.current(), Some(IdxTerm::new(20, 2)));
    let old_dir = dir.path().join(snapshot_core::dir_name(IdxTerm::new(10, 1)));
    assert!(!old_dir.exists());
}

/// Background write happy path, from `begin_snapshot` to `complete_snapshot`.
#[tokio::test]
async fn write_happy_path() {
    let dir = TempDir::new().unwrap();
    let (mut manager, mut rx) = init_manager("s4", dir.path()).await;

    let meta = Meta::new(5, 1, empty_cluster());
    let effect = manager.begin_snapshot(meta, &empty_cluster()).await.unwrap();
    assert!(matches!(effect, Effect::MonitorWorker(_)));
    assert_eq!(manager.pending(), Some(IdxTerm::new(5, 1)));

    let event = rx.recv().await.expect("worker should report completion");
    match event {
        snapshot_core::Event::SnapshotWritten(idxterm) => {
            manager.complete_snapshot(idxterm).await.unwrap();
        }
        other => panic!("unexpected event: {:?}", other),
    }

    assert_eq!(manager.current(), Some(IdxTerm::new(5, 1)));
    assert_eq!(manager.pending(), None);
    assert_eq!(registry::last_snapshot_index(&uid("s4")), Some(5));
}

/// Background write failure, recovered via `handle_down`.
#[tokio::test]
async fn write_failure_reclaims_directory() {
    let dir = TempDir::new().unwrap();
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let backend = Arc::new(FlakyBackend::new());
    let manager_uid = uid("s5");
    let mut manager = Manager::init(manager_uid.clone(), backend, dir.path().to_path_buf(), Config::default(), tx)
        .await
        .unwrap();

    let meta = Meta::new(5, 1, empty_cluster());
    let effect = manager.begin_snapshot(meta, &empty_cluster()).await.unwrap();
    let worker_id = match effect {
        Effect::MonitorWorker(id) => id,
    };

    // Give the background worker a chance to run and fail.
    tokio::time::sleep(Duration::from_millis(50)).await;

    manager.handle_down(worker_id, "simulated failure").await.unwrap();

    assert_eq!(manager.pending(), None);
    assert_eq!(manager.current(), None);
    let target_dir = dir.path().join(snapshot_core::dir_name(IdxTerm::new(5, 1)));
    assert!(!target_dir.exists());
}

/// Chunked accept tolerates a duplicate resend and completes once the declared crc
/// over the full byte stream matches what was actually transferred.
#[tokio::test]
async fn accept_with_resend() {
    let dir = TempDir::new().unwrap();
    let (mut manager, _rx) = init_manager("s6", dir.path()).await;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(b"c1");
    hasher.update(b"c2");
    hasher.update(b"c3");
    let crc = hasher.finalize();

    let meta = Meta::new(7, 2, empty_cluster());
    manager.begin_accept(crc, meta, 3).await.unwrap();

    manager.accept_chunk(b"c1".to_vec(), 1).await.unwrap();
    manager.accept_chunk(b"c1".to_vec(), 1).await.unwrap(); // duplicate, ignored
    manager.accept_chunk(b"c2".to_vec(), 2).await.unwrap();
    manager.accept_chunk(b"c3".to_vec(), 3).await.unwrap();

    assert_eq!(manager.current(), Some(IdxTerm::new(7, 2)));
    assert!(!manager.accepting());
    assert_eq!(registry::last_snapshot_index(&uid("s6")), Some(7));
}

/// Repeated delivery of an already-accepted chunk is a no-op.
#[tokio::test]
async fn accept_chunk_duplicate_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (mut manager, _rx) = init_manager("s-idempotent", dir.path()).await;

    let meta = Meta::new(1, 1, empty_cluster());
    manager.begin_accept(0, meta, 2).await.unwrap();
    manager.accept_chunk(b"a".to_vec(), 1).await.unwrap();

    for _ in 0..3 {
        manager.accept_chunk(b"a".to_vec(), 1).await.unwrap();
    }

    assert!(manager.accepting());
}

/// An out-of-order chunk (a gap) is a protocol violation.
#[tokio::test]
async fn accept_chunk_rejects_gap() {
    let dir = TempDir::new().unwrap();
    let (mut manager, _rx) = init_manager("s-gap", dir.path()).await;

    let meta = Meta::new(1, 1, empty_cluster());
    manager.begin_accept(0, meta, 3).await.unwrap();

    let err = manager.accept_chunk(b"skip".to_vec(), 3).await.unwrap_err();
    assert!(matches!(err, SnapshotError::OutOfOrderChunk { expected: 1, got: 3 }));
}

/// A write and an accept cannot be in flight at the same time.
#[tokio::test]
async fn pending_and_accepting_are_mutually_exclusive() {
    let dir = TempDir::new().unwrap();
    let (mut manager, _rx) = init_manager("s-mutex", dir.path()).await;

    let meta = Meta::new(1, 1, empty_cluster());
    manager.begin_snapshot(meta.clone(), &empty_cluster()).await.unwrap();

    let err = manager.begin_accept(0, meta, 1).await.unwrap_err();
    assert!(matches!(err, SnapshotError::Precondition(_)));
}

/// Round trip: write then recover returns semantically equal machine state.
#[tokio::test]
async fn write_then_recover_round_trips() {
    let dir = TempDir::new().unwrap();
    let (mut manager, mut rx) = init_manager("s-roundtrip", dir.path()).await;

    let payload = serde_json::json!({"clients": {"a": 1, "b": 2}});
    let meta = Meta::new(9, 4, empty_cluster());
    manager.begin_snapshot(meta, &payload).await.unwrap();

    let event = rx.recv().await.unwrap();
    if let snapshot_core::Event::SnapshotWritten(idxterm) = event {
        manager.complete_snapshot(idxterm).await.unwrap();
    }

    let (recovered_meta, recovered_state) = manager.recover().await.unwrap();
    assert_eq!(recovered_meta.idxterm(), IdxTerm::new(9, 4));
    assert_eq!(recovered_state, payload);
}

/// A backend whose `write` always fails, used to exercise the `handle_down` recovery path.
struct FlakyBackend {
    inner: FsBackend,
    fail: AtomicBool,
}

impl FlakyBackend {
    fn new() -> Self {
        FlakyBackend {
            inner: FsBackend::new(),
            fail: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl SnapshotBackend for FlakyBackend {
    type Ref = serde_json::Value;
    type Cursor = serde_json::Value;
    type AcceptState = <FsBackend as SnapshotBackend>::AcceptState;
    type ChunkState = <FsBackend as SnapshotBackend>::ChunkState;

    fn prepare(&self, meta: &Meta, release_cursor: &Self::Cursor) -> Self::Ref {
        self.inner.prepare(meta, release_cursor)
    }

    async fn write(&self, dir: &Path, meta: &Meta, r: Self::Ref) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SnapshotError::precondition("simulated write failure"));
        }
        self.inner.write(dir, meta, r).await
    }

    async fn read(&self, dir: &Path) -> Result<(u32, Meta, Self::ChunkState)> {
        self.inner.read(dir).await
    }

    async fn next_chunk(
        &self,
        dir: &Path,
        chunk_size: usize,
        state: Self::ChunkState,
    ) -> Result<Option<(Vec<u8>, Self::ChunkState)>> {
        self.inner.next_chunk(dir, chunk_size, state).await
    }

    async fn begin_accept(&self, dir: &Path, crc: u32, meta: &Meta) -> Result<Self::AcceptState> {
        self.inner.begin_accept(dir, crc, meta).await
    }

    async fn accept_chunk(&self, data: Vec<u8>, state: Self::AcceptState) -> Result<Self::AcceptState> {
        self.inner.accept_chunk(data, state).await
    }

    async fn complete_accept(&self, data: Vec<u8>, state: Self::AcceptState) -> Result<()> {
        self.inner.complete_accept(data, state).await
    }

    async fn recover(&self, dir: &Path) -> Result<(Meta, serde_json::Value)> {
        self.inner.recover(dir).await
    }

    async fn read_meta(&self, dir: &Path) -> Result<Meta> {
        self.inner.read_meta(dir).await
    }
}
