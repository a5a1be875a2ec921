//! Worker configuration.

use aisatsu_core::ActivityOptions;
use std::time::Duration;

/// Default task queue of workflow executions.
pub const DEFAULT_WORKFLOW_TASK_QUEUE: &str = "hello-workflow-task-queue";
/// Default task queue of translation attempts.
pub const DEFAULT_ACTIVITY_TASK_QUEUE: &str = "hello-translation-task-queue";

/// Options of a worker hosting hello executions.
///
/// Task queue names identify the worker in logs; executions and activity
/// attempts all run on the local tokio runtime.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Task queue reported for workflow executions.
    pub workflow_task_queue: String,
    /// Task queue reported for activity attempts.
    pub activity_task_queue: String,
    /// Timeout and retry policy of the translation activity.
    pub activity_options: ActivityOptions,
    /// Upper bound on a single status projection write.
    pub projection_timeout: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            workflow_task_queue: DEFAULT_WORKFLOW_TASK_QUEUE.to_string(),
            activity_task_queue: DEFAULT_ACTIVITY_TASK_QUEUE.to_string(),
            activity_options: ActivityOptions::default(),
            projection_timeout: Duration::from_secs(5),
        }
    }
}

impl WorkerOptions {
    /// Sets the workflow task queue.
    pub fn with_workflow_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.workflow_task_queue = task_queue.into();
        self
    }

    /// Sets the activity task queue.
    pub fn with_activity_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.activity_task_queue = task_queue.into();
        self
    }

    /// Sets the activity options.
    pub fn with_activity_options(mut self, activity_options: ActivityOptions) -> Self {
        self.activity_options = activity_options;
        self
    }

    /// Sets the bound of a status projection write.
    pub fn with_projection_timeout(mut self, projection_timeout: Duration) -> Self {
        self.projection_timeout = projection_timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = WorkerOptions::default();
        assert_eq!(options.workflow_task_queue, "hello-workflow-task-queue");
        assert_eq!(options.activity_task_queue, "hello-translation-task-queue");
        assert_eq!(
            options.activity_options.start_to_close_timeout,
            Duration::from_secs(30)
        );
        assert_eq!(options.projection_timeout, Duration::from_secs(5));
    }
}
