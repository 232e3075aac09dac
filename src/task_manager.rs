//! Named background tasks with cancellation and bounded shutdown.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long a task may take to wind down after being cancelled.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A background service the application starts through the [`TaskManager`].
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Tracks the daemon's background tasks.
///
/// Every task gets a child of the global cancellation token, so it can be
/// stopped on its own with [`TaskManager::cancel`] or together with all
/// others by [`TaskManager::shutdown_all`].
pub struct TaskManager {
    tasks: HashMap<String, TaskInfo>,
    global_token: CancellationToken,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            global_token: CancellationToken::new(),
        }
    }

    /// Spawns `task_fn` under `name`, replacing nothing: a second task with a
    /// name already in use is refused.
    pub async fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        if self.tasks.contains_key(&name) {
            anyhow::bail!("Task '{name}' is already running");
        }

        let task_token = self.global_token.child_token();
        let task_token_clone = task_token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {task_name}");
            match task_fn(task_token_clone).await {
                Ok(()) => {
                    info!("Task '{task_name}' completed");
                    Ok(())
                }
                Err(e) => {
                    error!("Task '{task_name}' failed: {e:#}");
                    Err(e)
                }
            }
        });

        self.tasks.insert(
            name,
            TaskInfo {
                handle,
                cancel_token: task_token,
            },
        );
        Ok(())
    }

    /// Cancels one task and waits for it to finish.
    pub async fn cancel(&mut self, name: &str) -> Result<()> {
        let task = self
            .tasks
            .remove(name)
            .with_context(|| format!("No task named '{name}'"))?;
        task.cancel_token.cancel();
        join(name, task.handle).await
    }

    /// Cancels every task and waits for all of them. Returns the first
    /// failure, after every task has been joined.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());
        self.global_token.cancel();

        let mut first_error = None;
        for (name, task) in self.tasks.drain() {
            if let Err(e) = join(&name, task.handle).await {
                warn!("{e:#}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e).context("One or more tasks failed during shutdown"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks
            .get(name)
            .is_some_and(|task| !task.handle.is_finished())
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

struct TaskInfo {
    handle: JoinHandle<Result<()>>,
    cancel_token: CancellationToken,
}

async fn join(name: &str, handle: JoinHandle<Result<()>>) -> Result<()> {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
        Ok(Ok(result)) => result.with_context(|| format!("Task '{name}' failed")),
        Ok(Err(e)) => Err(anyhow::anyhow!("Task '{name}' panicked: {e}")),
        Err(_) => Err(anyhow::anyhow!("Task '{name}' did not stop in time")),
    }
}
