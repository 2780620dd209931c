use crate::backend::SnapshotBackend;
use crate::error::ErrorSubject;
use crate::error::ErrorVerb;
use crate::error::Result;
use crate::error::SnapshotError;
use crate::error::StorageIOError;
use crate::manager::Manager;
use crate::registry;
use crate::types::IdxTerm;
use crate::types::Meta;

/// State of an in-flight inbound snapshot transfer.
pub struct AcceptCtx<B: SnapshotBackend> {
    num_chunks: u64,
    next: u64,
    idxterm: IdxTerm,
    backend_state: Option<B::AcceptState>,
}

impl<B: SnapshotBackend> Manager<B> {
    /// Start receiving a snapshot from a peer leader. Fails loudly if a write or a
    /// prior accept is already in flight.
    #[tracing::instrument(level = "debug", skip(self, meta), fields(uid = %self.uid()))]
    pub async fn begin_accept(&mut self, crc: u32, meta: Meta, num_chunks: u64) -> Result<()> {
        if self.pending.is_some() {
            return Err(SnapshotError::precondition("begin_accept: a write is already pending"));
        }
        if self.accepting.is_some() {
            return Err(SnapshotError::precondition("begin_accept: an accept is already in progress"));
        }
        if num_chunks == 0 {
            return Err(SnapshotError::precondition("begin_accept: num_chunks must be >= 1"));
        }

        let idxterm = meta.idxterm();
        let dir = self.dir_for(idxterm);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageIOError::from_io_error(ErrorSubject::Snapshot(idxterm), ErrorVerb::Create, e))?;

        let backend_state = self.backend.begin_accept(&dir, crc, &meta).await?;

        self.accepting = Some(AcceptCtx {
            num_chunks,
            next: 1,
            idxterm,
            backend_state: Some(backend_state),
        });

        tracing::info!(%idxterm, num_chunks, "snapshot accept started");
        Ok(())
    }

    /// Sequence one inbound chunk. Gaps (`n > next`) are a protocol violation;
    /// duplicates of an already-accepted chunk (`n < next`) are silently ignored.
    #[tracing::instrument(level = "debug", skip(self, data), fields(uid = %self.uid()))]
    pub async fn accept_chunk(&mut self, data: Vec<u8>, n: u64) -> Result<()> {
        let ctx = self
            .accepting
            .as_mut()
            .ok_or_else(|| SnapshotError::precondition("accept_chunk: no accept in progress"))?;

        if n < ctx.next {
            tracing::debug!(n, next = ctx.next, "ignoring duplicate chunk resend");
            return Ok(());
        }
        if n > ctx.next {
            return Err(SnapshotError::OutOfOrderChunk {
                expected: ctx.next,
                got: n,
            });
        }

        let idxterm = ctx.idxterm;
        let backend_state = ctx.backend_state.take().expect("backend_state populated while accepting");

        if n == ctx.num_chunks {
            self.backend.complete_accept(data, backend_state).await?;
            self.retire_current(idxterm).await?;
            registry::registry().publish(&self.uid, idxterm.index);
            self.current = Some(idxterm);
            self.accepting = None;
            tracing::info!(%idxterm, "snapshot accept complete");
        } else {
            let new_state = self.backend.accept_chunk(data, backend_state).await?;
            let ctx = self.accepting.as_mut().expect("accept still in progress");
            ctx.backend_state = Some(new_state);
            ctx.next += 1;
        }

        Ok(())
    }

    /// Discard an in-flight accept, e.g. after the transport declares the peer dead or
    /// after `OutOfOrderChunk` forces the caller to reset the transfer. The partial
    /// directory is left for startup cleanup to reclaim on the next `init`.
    pub fn discard_accept(&mut self) {
        self.accepting = None;
    }
}
