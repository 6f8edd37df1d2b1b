// Process module - Target lifecycle and OS-level inspection

mod handle;
pub mod inspector;
pub mod lifecycle;
pub mod restart;
pub mod spawner;

pub use handle::ProcessHandle;
pub use inspector::{ResourceInspector, ResourceResult};
pub use lifecycle::{ProcessLifecycle, StopOutcome};
pub use restart::{BackoffStrategy, StartRetryPolicy};
pub use spawner::spawn_target;
