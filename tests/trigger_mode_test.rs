//! Flush trigger behaviour seen through the public API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use next_batch::config::{EnvConfig, TriggerEnvConfig};
use next_batch::telemetry::LogConfig;
use next_batch::{BatchError, BatchRegistry, ResolverError, Trigger, TriggerMode};

type Calls = Arc<Mutex<Vec<Vec<u32>>>>;

fn registry_with(trigger: Trigger, calls: &Calls) -> next_batch::Batch<u32, u32> {
    let registry = BatchRegistry::with_trigger(trigger);
    let calls = calls.clone();
    registry.open_batch("numbers", move |ids: Vec<u32>| {
        calls.lock().push(ids.clone());
        async move {
            Ok::<_, ResolverError>(ids.into_iter().map(|id| (id, id + 100)).collect::<HashMap<_, _>>())
        }
    })
}

#[tokio::test]
async fn next_tick_splits_adds_across_yields() {
    let calls = Calls::default();
    let batch = registry_with(Trigger::new(TriggerMode::NextTick), &calls);

    let first = batch.add(1);
    assert_eq!(first.await.unwrap(), 101);
    let second = batch.add(2);
    assert_eq!(second.await.unwrap(), 102);
    assert_eq!(*calls.lock(), vec![vec![1], vec![2]]);
}

#[tokio::test]
async fn immediate_mode_still_coalesces_one_turn() {
    let calls = Calls::default();
    let batch = registry_with(Trigger::new(TriggerMode::Immediate), &calls);

    let a = batch.add(1);
    let b = batch.add(2);
    assert_eq!(a.await.unwrap(), 101);
    assert_eq!(b.await.unwrap(), 102);
    assert_eq!(*calls.lock(), vec![vec![1, 2]]);
}

#[tokio::test]
async fn timer_mode_coalesces_across_yields() {
    let calls = Calls::default();
    let trigger = Trigger::new(TriggerMode::Timer).with_delay(Duration::from_millis(200));
    let batch = registry_with(trigger, &calls);

    let a = batch.add(1);
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    let b = batch.add(2);

    assert_eq!(a.await.unwrap(), 101);
    assert_eq!(b.await.unwrap(), 102);
    assert_eq!(*calls.lock(), vec![vec![1, 2]]);
}

#[tokio::test]
async fn registry_from_config_uses_configured_trigger() {
    let config = EnvConfig {
        trigger: TriggerEnvConfig { mode: TriggerMode::Timer, timer: Duration::from_millis(5) },
        log: LogConfig::default(),
    };
    let registry: BatchRegistry<u32, u32> = BatchRegistry::from_config(&config);
    assert_eq!(registry.trigger().mode(), TriggerMode::Timer);
    assert_eq!(registry.trigger().delay(), Duration::from_millis(5));

    let batch = registry.open_batch("cfg", |ids: Vec<u32>| async move {
        Ok::<_, ResolverError>(ids.into_iter().map(|id| (id, id)).collect::<HashMap<_, _>>())
    });
    assert_eq!(batch.add(9).await.unwrap(), 9);
}

#[test]
fn fallback_runtime_serves_plain_threads() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let calls = Calls::default();
    let batch = registry_with(Trigger::default().with_fallback(rt.handle().clone()), &calls);

    let results = std::thread::spawn(move || {
        let a = batch.add(1);
        let b = batch.add(2);
        futures::executor::block_on(async { (a.await, b.await) })
    })
    .join()
    .unwrap();

    assert_eq!(results, (Ok(101), Ok(102)));
    assert_eq!(*calls.lock(), vec![vec![1, 2]]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn next_tick_on_worker_task_collects_the_whole_turn() {
    let calls = Calls::default();
    let batch = Arc::new(registry_with(Trigger::new(TriggerMode::NextTick), &calls));

    let worker_batch = batch.clone();
    let values = tokio::spawn(async move {
        let handles: Vec<_> = (0..5_000).map(|k| worker_batch.add(k)).collect();
        let mut values = Vec::with_capacity(handles.len());
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values
    })
    .await
    .unwrap();

    assert_eq!(values.len(), 5_000);
    assert_eq!(values[42], 142);
    assert_eq!(calls.lock().len(), 1);
}

#[test]
fn add_outside_any_runtime_is_rejected() {
    let calls = Calls::default();
    let batch = registry_with(Trigger::default(), &calls);

    let handle = batch.add(1);
    assert_eq!(
        futures::executor::block_on(handle),
        Err(BatchError::NoRuntime { batch: "numbers".into() })
    );
    assert!(calls.lock().is_empty());
}
