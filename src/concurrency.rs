//! A failure-short-circuiting group primitive: runs a batch of fallible
//! futures with bounded parallelism; the first error cancels all
//! siblings and is returned.

use std::future::Future;

use tokio::task::JoinSet;

/// Runs `items` through `f` with at most `parallelism` in flight at once.
/// If any invocation returns `Err`, the remaining in-flight tasks are
/// aborted and the first error is returned; otherwise returns all outputs
/// in input order.
pub async fn try_for_each_bounded<I, F, Fut, T, E>(items: Vec<I>, parallelism: usize, f: F) -> Result<Vec<T>, E>
where
    I: Send + 'static,
    F: Fn(I) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let parallelism = parallelism.max(1);
    let mut results: Vec<Option<T>> = (0..items.len()).map(|_| None).collect();
    let mut pending: Vec<(usize, I)> = items.into_iter().enumerate().collect();
    pending.reverse(); // pop() takes from the front in original order

    let mut set: JoinSet<(usize, Result<T, E>)> = JoinSet::new();

    let spawn_next = |set: &mut JoinSet<(usize, Result<T, E>)>, pending: &mut Vec<(usize, I)>, f: &F| {
        if let Some((idx, item)) = pending.pop() {
            let fut = f(item);
            set.spawn(async move { (idx, fut.await) });
        }
    };

    for _ in 0..parallelism {
        spawn_next(&mut set, &mut pending, &f);
    }

    while let Some(joined) = set.join_next().await {
        let (idx, result) = joined.expect("task panicked");
        match result {
            Ok(value) => {
                results[idx] = Some(value);
                spawn_next(&mut set, &mut pending, &f);
            }
            Err(e) => {
                set.abort_all();
                return Err(e);
            }
        }
    }

    Ok(results.into_iter().map(|r| r.expect("every index completed")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_all_to_completion_in_order() {
        let items = vec![1, 2, 3, 4, 5];
        let out = try_for_each_bounded(items, 2, |i| async move { Ok::<_, ()>(i * 2) })
            .await
            .unwrap();
        assert_eq!(out, vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn first_error_short_circuits() {
        let items = vec![1, 2, 3];
        let err = try_for_each_bounded(items, 3, |i| async move {
            if i == 2 {
                Err("boom")
            } else {
                Ok(i)
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err, "boom");
    }
}
