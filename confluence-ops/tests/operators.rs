use confluence_core::{BufferPolicy, ConsumerItem, Flow, Source};
use confluence_ops::{for_each, map_ordered, Filter, OperatorConfig};

/// Chains an ordered map with a filter: values computed out of
/// completion order still surface filtered and in input order.
#[tokio::test]
async fn ordered_map_into_filter_preserves_order() {
    let flow = Flow::new("in");
    let source = Source::new("a");
    flow.attach(source.clone(), None, BufferPolicy::unbounded())
        .unwrap();

    let doubled = map_ordered(
        flow.consumer(),
        OperatorConfig::default().with_concurrency(3),
        |x: u32| async move {
            tokio::time::sleep(std::time::Duration::from_millis((5 - x as u64) * 2)).await;
            Ok::<u32, String>(x * 2)
        },
    );
    let evens_only = Filter::new(doubled, |x: &u32| x % 4 == 0);

    for i in 1..=5u32 {
        source.publish(i).await;
    }
    source.complete();

    let mut seen = Vec::new();
    loop {
        match evens_only.next().await {
            ConsumerItem::Value(v) => seen.push(v),
            ConsumerItem::Done => break,
            ConsumerItem::Error(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(vec![4, 8], seen);
}

/// `for_each` surfaces the upstream's error instead of swallowing it.
#[tokio::test]
async fn for_each_surfaces_upstream_error() {
    let flow = Flow::new("in");
    let source = Source::new("a");
    flow.attach(source.clone(), None, BufferPolicy::unbounded())
        .unwrap();

    source.publish(1u32).await;
    source.fault("boom");

    let mut seen = Vec::new();
    let result = for_each(flow.consumer(), |v| seen.push(v)).await;
    assert_eq!(vec![1], seen);
    assert!(result.is_err());
}

/// With a bounded concurrency of 1, an ordered map behaves like a
/// strictly sequential pipeline: no two delegate invocations
/// overlap.
#[tokio::test]
async fn concurrency_one_serializes_delegate_invocations() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let flow = Flow::new("in");
    let source = Source::new("a");
    flow.attach(source.clone(), None, BufferPolicy::unbounded())
        .unwrap();

    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));

    let mapped = {
        let in_flight = in_flight.clone();
        let max_in_flight = max_in_flight.clone();
        map_ordered(
            flow.consumer(),
            OperatorConfig::default().with_concurrency(1),
            move |x: u32| {
                let in_flight = in_flight.clone();
                let max_in_flight = max_in_flight.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<u32, String>(x)
                }
            },
        )
    };

    for i in 1..=4u32 {
        source.publish(i).await;
    }
    source.complete();

    let mut seen = Vec::new();
    loop {
        match mapped.next().await {
            ConsumerItem::Value(v) => seen.push(v),
            ConsumerItem::Done => break,
            ConsumerItem::Error(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(vec![1, 2, 3, 4], seen);
    assert_eq!(1, max_in_flight.load(Ordering::SeqCst));
}
