use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// Runs `f` over every item on the tokio runtime with at most `limit` tasks in
/// flight, returning results in input order.
pub async fn map_bounded<I, T, F, Fut>(
    items: Vec<I>,
    limit: usize,
    f: F,
) -> Result<Vec<T>, JoinError>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let sem = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = Vec::with_capacity(items.len());

    for item in items {
        let sem = sem.clone();
        let work = f(item);
        tasks.push(tokio::spawn(async move {
            // The semaphore is never closed, so acquisition only fails on shutdown.
            let _permit = sem.acquire_owned().await.ok();
            work.await
        }));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        results.push(task.await?);
    }
    Ok(results)
}
