//! Per-path serialization: at most one of {upload, download,
//! write-to-disk, delete} is in progress for a given path at a time.
//! One `tokio::sync::Mutex` per vault-relative path, created lazily.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A map of per-path async mutexes. Entries are created lazily and never
/// removed — the number of distinct paths ever touched in a process
/// lifetime is small enough that this is not worth the complexity of
/// reference-counted eviction.
#[derive(Default)]
pub struct PathLocks {
	locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PathLocks {
	pub fn new() -> Self {
		PathLocks { locks: Mutex::new(HashMap::new()) }
	}

	/// Acquire the lock for `path`, blocking until any other in-flight
	/// operation on the same path completes. The returned guard releases
	/// the lock on drop.
	pub async fn acquire(&self, path: &str) -> OwnedMutexGuard<()> {
		let entry = {
			let mut map = self.locks.lock().await;
			map.entry(path.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
		};
		entry.lock_owned().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::time::Duration;

	#[tokio::test]
	async fn serializes_operations_on_the_same_path() {
		let locks = Arc::new(PathLocks::new());
		let counter = Arc::new(AtomicU32::new(0));
		let max_concurrent = Arc::new(AtomicU32::new(0));

		let mut handles = Vec::new();
		for _ in 0..8 {
			let locks = locks.clone();
			let counter = counter.clone();
			let max_concurrent = max_concurrent.clone();
			handles.push(tokio::spawn(async move {
				let _guard = locks.acquire("a.md").await;
				let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
				max_concurrent.fetch_max(now, Ordering::SeqCst);
				tokio::time::sleep(Duration::from_millis(5)).await;
				counter.fetch_sub(1, Ordering::SeqCst);
			}));
		}
		for h in handles {
			h.await.unwrap();
		}
		assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn distinct_paths_do_not_block_each_other() {
		let locks = PathLocks::new();
		let g1 = locks.acquire("a.md").await;
		let g2_fut = locks.acquire("b.md");
		let g2 = tokio::time::timeout(Duration::from_millis(50), g2_fut).await;
		assert!(g2.is_ok());
		drop(g1);
	}
}

// vim: ts=4
