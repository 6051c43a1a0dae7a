//! Task graph configuration.

use std::time::Duration;

/// Configuration shared by a [`TaskGraph`](crate::TaskGraph) and the
/// [`CompiledGraph`](crate::CompiledGraph) built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskGraphConfig {
    /// Name used in log output.
    pub label: String,
    /// Default timeout for acquiring a surface image. `None` waits forever.
    pub acquire_timeout: Option<Duration>,
    /// Timeout used by fence tasks. `None` waits forever.
    pub fence_timeout: Option<Duration>,
}

impl Default for TaskGraphConfig {
    fn default() -> Self {
        Self {
            label: "task_graph".to_string(),
            acquire_timeout: None,
            fence_timeout: None,
        }
    }
}

impl TaskGraphConfig {
    /// Default configuration with the given log label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Set the default acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Set the fence wait timeout.
    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = Some(timeout);
        self
    }
}
