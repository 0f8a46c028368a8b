//! Parallel map over a [`Consumer`] with no ordering guarantee.
//!
//! Refer to the [crate] docs for more info.

use std::{future::Future, sync::Arc};

use confluence_core::{BufferPolicy, Consumer, ConsumerItem, Flow, Source};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{config::OperatorConfig, error::OperatorError, worker::run_delegate};

/// Applies `delegate` to every item of `upstream` with up to
/// `config`'s concurrency in flight, emitting each result as soon
/// as its invocation completes.
///
/// The output is a permutation of the successfully mapped items;
/// callers that need input order preserved want
/// [`crate::ordered::map_ordered`] instead.
pub fn map_unordered<T, U, F, Fut>(
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
    let output = Source::new("map-unordered");
    let flow = Flow::new("map-unordered");
    flow.attach(output.clone(), None, BufferPolicy::unbounded())
        .expect("a freshly-created flow is never disposed");
    let downstream = flow.consumer();

    tokio::spawn(drive_unordered(upstream, output, config, delegate));

    downstream
}

async fn drive_unordered<T, U, F, Fut>(
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
    let mut tasks: JoinSet<Result<U, OperatorError>> = JoinSet::new();

    let mut pending: Option<T> = None;
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
                        if !config.continue_on_error {
                            output.fault(OperatorError::Upstream { source }.to_string());
                            return;
                        }
                    }
                }
            }
            permit = semaphore.clone().acquire_owned(), if pending.is_some() => {
                let permit = permit.expect("semaphore is never closed");
                let item = pending.take().expect("guarded by pending.is_some()");
                let delegate = delegate.clone();
                let timeout = config.timeout;
                tasks.spawn(async move {
                    let _permit = permit;
                    run_delegate(delegate(item), timeout).await
                });
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                match joined.expect("worker task panicked") {
                    Ok(value) => output.publish(value).await,
                    Err(_) if config.continue_on_error => {}
                    Err(error) => {
                        tracing::warn!(%error, "map_unordered delegate failed, faulting output");
                        output.fault(error.to_string());
                        return;
                    }
                }
            }
            else => break,
        }

        if upstream_done && pending.is_none() && tasks.is_empty() {
            break;
        }
    }

    output.complete();
}

#[cfg(test)]
mod tests {
    use super::*;
    use confluence_core::Source as UpstreamSource;
    use std::collections::HashSet;

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
    async fn output_is_a_permutation_of_successfully_mapped_items() {
        let flow = Flow::new("in");
        let source = UpstreamSource::new("a");
        flow.attach(source.clone(), None, BufferPolicy::unbounded())
            .unwrap();

        let mapped = map_unordered(
            flow.consumer(),
            OperatorConfig::default().with_concurrency(4),
            |x: u32| async move { Ok::<u32, String>(x * 10) },
        );

        let expected: HashSet<u32> = (1..=8u32).map(|x| x * 10).collect();
        for i in 1..=8u32 {
            source.publish(i).await;
        }
        source.complete();

        let got: HashSet<u32> = drain(&mapped).await.into_iter().collect();
        assert_eq!(expected, got);
    }

    #[tokio::test]
    async fn continue_on_error_keeps_draining() {
        let flow = Flow::new("in");
        let source = UpstreamSource::new("a");
        flow.attach(source.clone(), None, BufferPolicy::unbounded())
            .unwrap();

        let mapped = map_unordered(
            flow.consumer(),
            OperatorConfig::default().continue_on_error(true),
            |x: u32| async move {
                if x == 3 {
                    Err("boom".to_string())
                } else {
                    Ok(x)
                }
            },
        );

        for i in 1..=5u32 {
            source.publish(i).await;
        }
        source.complete();

        let got: HashSet<u32> = drain(&mapped).await.into_iter().collect();
        assert_eq!(HashSet::from([1, 2, 4, 5]), got);
    }
}
