//! Order-preserving parallel map over a [`Consumer`].
//!
//! Refer to the [crate] docs for more info.

use std::{collections::BTreeMap, future::Future, sync::Arc};

use confluence_core::{BufferPolicy, Consumer, ConsumerItem, Flow, Source};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{config::OperatorConfig, error::OperatorError, worker::run_delegate};

/// Applies `delegate` to every item of `upstream` with up to
/// `config`'s concurrency in flight, emitting results in the same
/// order they arrived in `upstream`.
///
/// A delegate error or timeout either drops the offending item
/// (`config.continue_on_error(true)`) or faults the returned
/// consumer, matching [`confluence_core::Source::fault`]'s
/// terminal-and-exclusive semantics.
pub fn map_ordered<T, U, F, Fut>(
    upstream: Consumer<T>,
    config: OperatorConfig,
    delegate: F,
) -> Consumer<U>
where
    T: Send + Sync + Clone + 'static,
    U: Send + Sync + Clone + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, String>> + Send + 'static,
{
    let output = Source::new("map-ordered");
    let flow = Flow::new("map-ordered");
    flow.attach(output.clone(), None, BufferPolicy::unbounded())
        .expect("a freshly-created flow is never disposed");
    let downstream = flow.consumer();

    tokio::spawn(drive_ordered(upstream, output, config, delegate));

    downstream
}

async fn drive_ordered<T, U, F, Fut>(
    upstream: Consumer<T>,
    output: Source<U>,
    config: OperatorConfig,
    delegate: F,
) where
    T: Send + Sync + Clone + 'static,
    U: Send + Sync + Clone + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, String>> + Send + 'static,
{
    let delegate = Arc::new(delegate);
    let semaphore = Arc::new(Semaphore::new(config.concurrency.get()));
    let mut tasks: JoinSet<(usize, Result<U, OperatorError>)> = JoinSet::new();
    let mut reorder: BTreeMap<usize, Result<U, OperatorError>> = BTreeMap::new();

    let mut pending: Option<T> = None;
    let mut next_index = 0usize;
    let mut next_emit = 0usize;
    let mut upstream_done = false;

    loop {
        tokio::select! {
            biased;
            item = upstream.next(), if pending.is_none() && !upstream_done => {
                match item {
                    ConsumerItem::Value(value) => pending = Some(value),
                    ConsumerItem::Done => upstream_done = true,
                    ConsumerItem::Error(source) => {
                        upstream_done = true;
                        reorder.insert(next_index, Err(OperatorError::Upstream { source }));
                        next_index += 1;
                    }
                }
            }
            permit = semaphore.clone().acquire_owned(), if pending.is_some() => {
                let permit = permit.expect("semaphore is never closed");
                let item = pending.take().expect("guarded by pending.is_some()");
                let index = next_index;
                next_index += 1;
                let delegate = delegate.clone();
                let timeout = config.timeout;
                tasks.spawn(async move {
                    let _permit = permit;
                    (index, run_delegate(delegate(item), timeout).await)
                });
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                let (index, result) = joined.expect("worker task panicked");
                reorder.insert(index, result);
            }
            else => break,
        }

        while let Some(result) = reorder.remove(&next_emit) {
            next_emit += 1;
            match result {
                Ok(value) => output.publish(value).await,
                Err(error) if config.continue_on_error => {
                    let _ = error;
                }
                Err(error) => {
                    tracing::warn!(%error, "map_ordered delegate failed, faulting output");
                    output.fault(error.to_string());
                    return;
                }
            }
        }

        if upstream_done && pending.is_none() && tasks.is_empty() && reorder.is_empty() {
            break;
        }
    }

    output.complete();
}

#[cfg(test)]
mod tests {
    use super::*;
    use confluence_core::Source as UpstreamSource;

    async fn drain<T: Send + Sync + Clone + 'static>(consumer: &Consumer<T>) -> Vec<T> {
        let mut items = Vec::new();
        loop {
            match consumer.next().await {
                ConsumerItem::Value(v) => items.push(v),
                ConsumerItem::Done => break,
                ConsumerItem::Error(e) => panic!("unexpected error: {e:?}"),
            }
        }
        items
    }

    #[tokio::test]
    async fn output_order_matches_input_order() {
        let flow = Flow::new("in");
        let source = UpstreamSource::new("a");
        flow.attach(source.clone(), None, BufferPolicy::unbounded())
            .unwrap();

        let mapped = map_ordered(
            flow.consumer(),
            OperatorConfig::default().with_concurrency(4),
            |x: u32| async move {
                // Reverse-order completion: later items finish first.
                tokio::time::sleep(std::time::Duration::from_millis((5 - x as u64) * 3)).await;
                Ok::<u32, String>(x * 10)
            },
        );

        for i in 1..=5u32 {
            source.publish(i).await;
        }
        source.complete();

        assert_eq!(vec![10, 20, 30, 40, 50], drain(&mapped).await);
    }

    #[tokio::test]
    async fn delegate_error_faults_output_by_default() {
        let flow = Flow::new("in");
        let source = UpstreamSource::new("a");
        flow.attach(source.clone(), None, BufferPolicy::unbounded())
            .unwrap();

        let mapped = map_ordered(flow.consumer(), OperatorConfig::default(), |x: u32| async move {
            if x == 2 {
                Err("boom".to_string())
            } else {
                Ok(x)
            }
        });

        for i in 1..=3u32 {
            source.publish(i).await;
        }
        source.complete();

        assert!(matches!(mapped.next().await, ConsumerItem::Value(1)));
        assert!(matches!(mapped.next().await, ConsumerItem::Error(_)));
    }

    #[tokio::test]
    async fn continue_on_error_drops_only_offending_item() {
        let flow = Flow::new("in");
        let source = UpstreamSource::new("a");
        flow.attach(source.clone(), None, BufferPolicy::unbounded())
            .unwrap();

        let mapped = map_ordered(
            flow.consumer(),
            OperatorConfig::default().continue_on_error(true),
            |x: u32| async move {
                if x == 2 {
                    Err("boom".to_string())
                } else {
                    Ok(x)
                }
            },
        );

        for i in 1..=3u32 {
            source.publish(i).await;
        }
        source.complete();

        assert_eq!(vec![1, 3], drain(&mapped).await);
    }
}
