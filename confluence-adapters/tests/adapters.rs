use std::time::Duration;

use confluence_adapters::{CallbackSource, PollingAdapter, ThrottleAdapter};
use confluence_core::{BufferPolicy, ConsumerItem, Flow, Source};

/// A polling adapter feeding a `Flow` alongside a second,
/// independently-publishing `Source` interleaves both into one
/// unified sequence, same as any two hand-written producers would.
#[tokio::test]
async fn polling_adapter_coexists_with_a_manual_source() {
    let flow = Flow::new("f");

    let ticks = Source::new("ticks");
    flow.attach(ticks.clone(), None, BufferPolicy::unbounded())
        .unwrap();
    PollingAdapter::new(Duration::from_millis(1))
        .with_stop_predicate(|last: &u32, _elapsed| *last >= 3)
        .spawn(ticks, || async {
            static NEXT: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(1);
            Some(NEXT.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
        });

    let manual = Source::new("manual");
    flow.attach(manual.clone(), None, BufferPolicy::unbounded())
        .unwrap();
    manual.publish(100u32).await;
    manual.complete();

    let consumer = flow.consumer();
    let mut seen = Vec::new();
    loop {
        match consumer.next().await {
            ConsumerItem::Value(v) => seen.push(v),
            ConsumerItem::Done => break,
            ConsumerItem::Error(e) => panic!("unexpected error: {e:?}"),
        }
    }
    seen.sort();
    assert_eq!(vec![1, 2, 3, 100], seen);
}

/// A throttle adapter wrapping a callback-sourced `Source`: items
/// pushed synchronously still end up rate-limited on publish.
#[tokio::test]
async fn throttle_wraps_a_callback_source() {
    let (callback, source) = CallbackSource::<u32>::new("events");
    let throttle = ThrottleAdapter::new(source, Duration::from_millis(5));

    for i in 0..3u32 {
        callback.push(i);
    }
    drop(callback);

    // The adapter's own publish path is throttled; this test only
    // exercises that a throttle can sit directly in front of a
    // `Source` built by another adapter, not the pump task inside
    // `CallbackSource` (which is unthrottled by design).
    assert_eq!(
        confluence_adapters::ThrottleOutcome::Published,
        throttle.publish(99u32).await
    );
    throttle.complete();
}
