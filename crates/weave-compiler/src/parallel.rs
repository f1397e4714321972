//! Bounded fork-join over a slice.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use weave_types::Result;

/// Worker count: the available hardware threads, at most one per item.
fn workers(items: usize) -> usize {
    let cores = thread::available_parallelism().map_or(1, |n| n.get());
    cores.min(items).max(1)
}

/// Run `task` on every item with at most one thread per hardware thread.
/// Every item is processed; when tasks fail, the error of the lowest item
/// index is returned.
pub fn for_each<T, F>(items: &[T], task: F) -> Result<()>
where
    T: Sync,
    F: Fn(&T) -> Result<()> + Sync,
{
    if items.is_empty() {
        return Ok(());
    }
    let next = AtomicUsize::new(0);
    let failures: Vec<(usize, weave_types::WeaveError)> = thread::scope(|s| {
        let handles: Vec<_> = (0..workers(items.len()))
            .map(|_| {
                s.spawn(|| {
                    let mut failed = Vec::new();
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(item) = items.get(i) else {
                            break;
                        };
                        if let Err(err) = task(item) {
                            failed.push((i, err));
                        }
                    }
                    failed
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(failed) => failed,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });
    match failures.into_iter().min_by_key(|(i, _)| *i) {
        Some((_, err)) => Err(err),
        None => Ok(()),
    }
}
