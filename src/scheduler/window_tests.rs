//! Tests for standalone batch windows.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio_test::{assert_pending, task};

    use crate::scheduler::{
        BatchError, BatchResolver, BatchWindow, FnResolver, ResolverError, Trigger, WindowState,
    };

    type Values = HashMap<u32, String>;

    fn echo(keys: Vec<u32>) -> Values {
        keys.into_iter().map(|k| (k, format!("val_{k}"))).collect()
    }

    fn echo_resolver() -> Arc<dyn BatchResolver<u32, String>> {
        Arc::new(FnResolver::new(|keys: Vec<u32>| async move {
            Ok::<Values, ResolverError>(echo(keys))
        }))
    }

    #[tokio::test]
    async fn window_walks_through_its_states() {
        let window = BatchWindow::<u32, String>::new("states", Trigger::default());
        window.set_resolver(echo_resolver());
        assert_eq!(window.state(), WindowState::Empty);
        assert!(window.is_empty());

        let handle = window.add(1);
        assert_eq!(window.state(), WindowState::Accumulating);
        assert_eq!(window.len(), 1);

        assert_eq!(handle.await.unwrap(), "val_1");
        assert_eq!(window.state(), WindowState::Completed);
        assert!(!window.is_open());
    }

    #[tokio::test]
    async fn handle_stays_pending_until_flush() {
        let window = BatchWindow::<u32, String>::new("pending", Trigger::default());
        window.set_resolver(echo_resolver());
        let mut handle = task::spawn(window.add(1));
        assert_pending!(handle.poll());
        assert_eq!(handle.await.unwrap(), "val_1");
    }

    #[tokio::test]
    async fn first_resolver_wins() {
        let window = BatchWindow::<u32, String>::new("first", Trigger::default());
        assert!(!window.has_resolver());
        assert!(window.set_resolver(echo_resolver()));
        let late: Arc<dyn BatchResolver<u32, String>> =
            Arc::new(FnResolver::new(|_keys: Vec<u32>| async move {
                Ok::<Values, ResolverError>(HashMap::new())
            }));
        assert!(!window.set_resolver(late));
        assert_eq!(window.add(5).await.unwrap(), "val_5");
    }

    #[tokio::test]
    async fn missing_resolver_rejects_every_task() {
        let window = BatchWindow::<u32, String>::new("unconfigured", Trigger::default());
        let a = window.add(1);
        let b = window.add(2);
        let expected = BatchError::ResolverMissing { batch: "unconfigured".into() };
        assert_eq!(a.await, Err(expected.clone()));
        assert_eq!(b.await, Err(expected));
    }

    #[tokio::test]
    async fn cleanup_runs_once_after_flush() {
        let runs = Arc::new(AtomicUsize::new(0));
        let window = BatchWindow::<u32, String>::new("cleanup", Trigger::default());
        window.set_resolver(echo_resolver());
        let counter = runs.clone();
        assert!(window.set_cleanup(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(!window.set_cleanup(|| {}));

        window.add(1).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!window.set_cleanup(|| {}));
    }

    #[tokio::test]
    async fn completed_window_rejects_new_keys() {
        let window = BatchWindow::<u32, String>::new("closed", Trigger::default());
        window.set_resolver(echo_resolver());
        window.add(1).await.unwrap();

        let late = window.add(2).await;
        assert_eq!(late, Err(BatchError::WindowClosed { batch: "closed".into() }));
    }

    #[tokio::test]
    async fn duplicate_key_supersedes_earlier_task() {
        let seen: Arc<parking_lot::Mutex<Vec<Vec<u32>>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = seen.clone();
        let resolver: Arc<dyn BatchResolver<u32, String>> =
            Arc::new(FnResolver::new(move |keys: Vec<u32>| {
                log.lock().push(keys.clone());
                async move { Ok::<Values, ResolverError>(echo(keys)) }
            }));
        let window = BatchWindow::<u32, String>::new("dupes", Trigger::default());
        window.set_resolver(resolver);

        let first = window.add(7);
        let second = window.add(7);
        let other = window.add(8);
        assert_eq!(window.len(), 2);

        assert_eq!(
            first.await,
            Err(BatchError::Superseded { batch: "dupes".into(), key: "7".into() })
        );
        assert_eq!(second.await.unwrap(), "val_7");
        assert_eq!(other.await.unwrap(), "val_8");
        assert_eq!(*seen.lock(), vec![vec![7, 8]]);
    }

    #[test]
    fn add_without_runtime_rejects_and_completes() {
        let runs = Arc::new(AtomicUsize::new(0));
        let window = BatchWindow::<u32, String>::new("no-rt", Trigger::default());
        window.set_resolver(echo_resolver());
        let counter = runs.clone();
        window.set_cleanup(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let handle = window.add(1);
        assert_eq!(window.state(), WindowState::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            futures::executor::block_on(handle),
            Err(BatchError::NoRuntime { batch: "no-rt".into() })
        );
    }

    #[test]
    fn runtime_shutdown_abandons_pending_flush() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let resolver: Arc<dyn BatchResolver<u32, String>> =
            Arc::new(FnResolver::new(|_keys: Vec<u32>| async move {
                futures::future::pending::<()>().await;
                Ok::<Values, ResolverError>(HashMap::new())
            }));
        let window = BatchWindow::<u32, String>::new(
            "shutdown",
            Trigger::default().with_fallback(rt.handle().clone()),
        );
        window.set_resolver(resolver);
        let handle = window.add(1);

        rt.shutdown_timeout(std::time::Duration::from_secs(1));
        assert_eq!(
            futures::executor::block_on(handle),
            Err(BatchError::Abandoned { batch: "shutdown".into() })
        );
        assert_eq!(window.state(), WindowState::Completed);
    }
}
