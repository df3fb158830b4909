//! Bounded-concurrency fan-out for per-account chain lookups.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Run `f` over all items with at most `concurrency` outstanding at a
/// time. Results come back in input order.
///
/// Fail-fast: the first error aborts the remaining work and is
/// returned - callers must never persist a partially fetched batch.
pub async fn try_map<I, T, E, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    f: F,
) -> Result<Vec<T>, E>
where
    I: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    if items.is_empty() {
        return Ok(vec![]);
    }
    let n_items = items.len();
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let f = Arc::new(f);

    let mut join_set = JoinSet::new();
    for (idx, item) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let f = f.clone();
        join_set.spawn(async move {
            // Acquired inside the task so spawning never blocks.
            let _permit = semaphore.acquire_owned().await.expect("semaphore open");
            (idx, f(item).await)
        });
    }

    let mut indexed: Vec<(usize, T)> = Vec::with_capacity(n_items);
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, Ok(value))) => indexed.push((idx, value)),
            Ok((_, Err(e))) => {
                join_set.abort_all();
                return Err(e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => panic!("fan-out worker panicked: {e}"),
        }
    }
    indexed.sort_by_key(|(idx, _)| *idx);
    Ok(indexed.into_iter().map(|(_, value)| value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn results_keep_input_order() {
        let doubled: Vec<i64> = try_map(vec![1i64, 2, 3, 4], 2, |x| async move {
            // Later items finish first.
            tokio::time::sleep(tokio::time::Duration::from_millis(10 - x as u64)).await;
            Ok::<_, ()>(x * 2)
        })
        .await
        .unwrap();
        assert_eq!(doubled, vec![2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn first_error_aborts_the_batch() {
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = completed.clone();
        let result: Result<Vec<i64>, String> = try_map(
            (0..100i64).collect(),
            4,
            move |x| {
                let counter = counter.clone();
                async move {
                    if x == 3 {
                        return Err(format!("item {x} failed"));
                    }
                    tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(x)
                }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "item 3 failed");
        // Abort kept most of the batch from running.
        assert!(completed.load(Ordering::Relaxed) < 100);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (running_, peak_) = (running.clone(), peak.clone());
        try_map(vec![(); 20], 5, move |_| {
            let running = running_.clone();
            let peak = peak_.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ()>(())
            }
        })
        .await
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 5);
    }
}
