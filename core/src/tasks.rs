use crate::AutomountError;
use std::future::Future;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A set of long-lived tasks that stand or fall together.
///
/// The first task to fail cancels the group token, which every other task is
/// expected to observe. [`TaskGroup::wait`] returns that first error, or
/// `Ok(())` if every task exited cleanly.
pub struct TaskGroup {
    cancel: CancellationToken,
    tasks: JoinSet<(String, Result<(), AutomountError>)>,
}

impl TaskGroup {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tasks: JoinSet::new(),
        }
    }

    /// Token shared by every task in the group.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = Result<(), AutomountError>> + Send + 'static,
    {
        let name = name.into();
        tracing::debug!(task = %name, "Starting task");
        self.tasks.spawn(async move { (name, task.await) });
    }

    /// Wait for every task to exit.
    pub async fn wait(mut self) -> Result<(), AutomountError> {
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            let (name, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => (
                    "<unknown>".to_string(),
                    Err(AutomountError::TaskFailed(e.to_string())),
                ),
            };

            match result {
                Ok(()) => tracing::debug!(task = %name, "Task exited"),
                Err(e) if first_error.is_none() => {
                    tracing::error!(task = %name, error = %e, "Task failed, cancelling group");
                    self.cancel.cancel();
                    first_error = Some(e);
                }
                Err(e) => {
                    tracing::debug!(task = %name, error = %e, "Task failed after group cancellation");
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
