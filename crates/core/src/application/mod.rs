// Application Layer - Use Cases and Business Logic

pub mod dispatcher;
pub mod handlers;
pub mod health;
pub mod maintenance;
pub mod recovery;
pub mod registry;
pub mod retry;
pub mod worker;

// Re-exports
pub use dispatcher::{Dispatcher, EnqueueOptions, JobHandle};
pub use handlers::{DomainServices, HandlerError, HandlerRegistry, JobHandler};
pub use health::{HealthReporter, HealthSnapshot, QueueHealth};
pub use maintenance::RetentionScheduler;
pub use recovery::RecoveryService;
pub use registry::{JobRegistry, JobRegistryBuilder};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerPool, WorkerRuntime};
