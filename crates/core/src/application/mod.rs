// Application Layer - Coordination and background tasks

pub mod constants;
pub mod coordinator;
pub mod notifier;
pub mod shutdown;
pub mod store_watcher;
pub mod sweeper;

// Re-exports
pub use coordinator::{CoordinatorConfig, JoinRequest, QueueCoordinator};
pub use notifier::{ChangeNotifier, SnapshotSubscription};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use store_watcher::StoreWatcher;
pub use sweeper::RegistrySweeper;
