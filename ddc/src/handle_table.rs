//! The handle table (§4.7): `handle → async_build_task`, protected by a
//! mutex via [`dashmap`]. Every async operation the top-level cache
//! exposes, and every rollup-owned handle, resolves through this one
//! table, so `poll`/`wait`/`get_async_result` need no special-casing for
//! where the handle actually came from.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use ddc_core::{HandleAllocator, Payload, RequestHandle};
use tokio::sync::OnceCell;

/// The slot a dispatched task resolves once it completes. `None` means
/// the task ran to completion but produced no payload (a miss); the
/// slot itself only ever transitions from unset to set, once.
pub type ResultSlot = Arc<OnceCell<Option<Payload>>>;

/// Maps outstanding [`RequestHandle`]s to the slot their result will
/// land in. Entries are removed by `get_async_result`, which is the
/// only operation that consumes a handle.
pub struct HandleTable {
    allocator: HandleAllocator,
    tasks: DashMap<RequestHandle, ResultSlot>,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable {
            allocator: HandleAllocator::new(),
            tasks: DashMap::new(),
        }
    }

    /// Allocate a handle and its result slot without dispatching
    /// anything. Used by rollups, which resolve a member's slot from
    /// their own state machine rather than from a spawned task.
    pub fn reserve(&self) -> (RequestHandle, ResultSlot) {
        let handle = self.allocator.next();
        let slot: ResultSlot = Arc::new(OnceCell::new());
        self.tasks.insert(handle, slot.clone());
        (handle, slot)
    }

    /// Allocate a handle and spawn `task` on the runtime's worker pool,
    /// resolving the handle's slot with its result.
    pub fn dispatch<F>(&self, task: F) -> RequestHandle
    where
        F: Future<Output = Option<Payload>> + Send + 'static,
    {
        let (handle, slot) = self.reserve();
        tokio::spawn(async move {
            let result = task.await;
            // Only this task ever sets this slot; an error here would
            // mean the handle was double-dispatched, which callers
            // cannot do through the public API.
            let _ = slot.set(result);
        });
        handle
    }

    /// Dispatch `task` synchronously on the calling thread instead of
    /// the worker pool, for derivers that declare themselves not
    /// build-thread-safe, or for `get_sync`'s synchronous entry point.
    pub async fn dispatch_inline(&self, task: impl Future<Output = Option<Payload>>) -> RequestHandle {
        let (handle, slot) = self.reserve();
        let result = task.await;
        let _ = slot.set(result);
        handle
    }

    pub fn poll(&self, handle: RequestHandle) -> bool {
        self.tasks
            .get(&handle)
            .map(|slot| slot.get().is_some())
            .unwrap_or(false)
    }

    pub async fn wait(&self, handle: RequestHandle) {
        let Some(slot) = self.tasks.get(&handle).map(|entry| entry.clone()) else {
            return;
        };
        slot.wait().await;
    }

    /// Remove `handle` from the table, blocking until its task has
    /// completed if it hasn't already, and hand back its payload.
    pub async fn get_async_result(&self, handle: RequestHandle) -> Option<Payload> {
        let (_, slot) = self.tasks.remove(&handle)?;
        slot.wait().await;
        slot.get().cloned().flatten()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn poll_is_false_until_dispatch_completes_then_result_is_returned() {
        let table = HandleTable::new();
        let handle = table.dispatch(async { Some(Bytes::from_static(&[1, 2, 3])) });

        table.wait(handle).await;
        assert!(table.poll(handle));
        assert_eq!(
            table.get_async_result(handle).await.as_deref(),
            Some(&[1, 2, 3][..])
        );
    }

    #[tokio::test]
    async fn get_async_result_removes_the_handle() {
        let table = HandleTable::new();
        let handle = table.dispatch_inline(async { Some(Bytes::from_static(&[9])) }).await;
        assert_eq!(table.get_async_result(handle).await.as_deref(), Some(&[9][..]));
        assert!(!table.poll(handle));
        assert_eq!(table.get_async_result(handle).await, None);
    }

    #[tokio::test]
    async fn a_task_that_misses_resolves_to_none_not_pending_forever() {
        let table = HandleTable::new();
        let handle = table.dispatch(async { None });
        table.wait(handle).await;
        assert_eq!(table.get_async_result(handle).await, None);
    }
}
