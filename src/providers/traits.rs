use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Base trait for providers that can create components asynchronously.
///
/// Enables dependency injection pattern with async initialization support.
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// Trait for services that can be started through TaskManager.
///
/// Provides service lifecycle management with prioritization and
/// criticality classification for graceful degradation.
///
/// # Example
///
/// ```no_run
/// use ddcbrightnessd::providers::traits::ServiceProvider;
/// use ddcbrightnessd::task_manager::TaskManager;
/// use anyhow::Result;
///
/// struct ExampleService;
///
/// #[async_trait::async_trait]
/// impl ServiceProvider for ExampleService {
///     async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
///         task_manager.spawn_task("example".to_string(), |_token| async {
///             // Service implementation
///             Ok(())
///         }).await
///     }
///
///     fn name(&self) -> &'static str { "ExampleService" }
///     fn priority(&self) -> i32 { 5 }
///     fn is_critical(&self) -> bool { false }
/// }
/// ```
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Starts the service in TaskManager.
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    /// Returns service name for logging and management.
    fn name(&self) -> &'static str;

    /// Returns startup priority (higher numbers start first).
    fn priority(&self) -> i32 {
        0
    }

    /// Indicates if service is critical for system operation.
    fn is_critical(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    struct MockService {
        name: &'static str,
        priority: i32,
        is_critical: bool,
        task_spawned: Arc<Mutex<bool>>,
    }

    impl MockService {
        fn new(name: &'static str, priority: i32, is_critical: bool) -> Self {
            Self {
                name,
                priority,
                is_critical,
                task_spawned: Arc::new(Mutex::new(false)),
            }
        }
    }

    #[async_trait]
    impl ServiceProvider for MockService {
        async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
            let task_spawned = self.task_spawned.clone();
            task_manager
                .spawn_task(self.name.to_string(), move |_token: CancellationToken| {
                    let task_spawned = task_spawned.clone();
                    async move {
                        *task_spawned.lock().unwrap() = true;
                        Ok(())
                    }
                })
                .await
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn is_critical(&self) -> bool {
            self.is_critical
        }
    }

    struct FailingService;

    #[async_trait]
    impl ServiceProvider for FailingService {
        async fn start(&self, _task_manager: &mut TaskManager) -> Result<()> {
            Err(anyhow!("refused to start"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct StringProvider;

    #[async_trait]
    impl AsyncProvider<String> for StringProvider {
        async fn provide(&self) -> Result<String> {
            Ok("provided".to_string())
        }
    }

    #[tokio::test]
    async fn service_start_spawns_its_task() {
        let mut task_manager = TaskManager::new();
        let service = MockService::new("discovery", 10, true);

        service.start(&mut task_manager).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(*service.task_spawned.lock().unwrap());
        let _ = task_manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn default_priority_and_criticality() {
        let service = FailingService;
        assert_eq!(service.priority(), 0);
        assert!(!service.is_critical());
    }

    #[tokio::test]
    async fn failing_start_propagates_error() {
        let mut task_manager = TaskManager::new();
        let result = FailingService.start(&mut task_manager).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn providers_sort_by_priority() {
        let services: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(MockService::new("watcher", 6, false)),
            Box::new(MockService::new("discovery", 10, true)),
            Box::new(MockService::new("dbus", 8, false)),
        ];

        let mut sorted = services;
        sorted.sort_by_key(|s| std::cmp::Reverse(s.priority()));

        let names: Vec<_> = sorted.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["discovery", "dbus", "watcher"]);
    }

    #[tokio::test]
    async fn async_provider_yields_its_value() {
        let provider = StringProvider;
        assert_eq!(provider.provide().await.unwrap(), "provided");
    }
}
