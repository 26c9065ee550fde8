//! Scheduler task handler backed by engine tabs.

use std::sync::Arc;

use async_trait::async_trait;
use tabpilot_workqueue::{QueryTask, TaskHandler, TaskOutput};
use tracing::{debug, error};

use crate::manager::TabManager;

/// Runs a claimed task in the engine's tab.
pub struct EngineTaskHandler {
    manager: Arc<TabManager>,
}

impl EngineTaskHandler {
    pub fn new(manager: Arc<TabManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<TabManager> {
        &self.manager
    }
}

#[async_trait]
impl TaskHandler for EngineTaskHandler {
    async fn handle(&self, task: &QueryTask) -> Result<TaskOutput, String> {
        let tab = self
            .manager
            .get_or_create_engine_tab(&task.engine)
            .await
            .map_err(|e| {
                error!("No tab for task {} ({}): {}", task.id, task.engine, e);
                e.to_string()
            })?;

        let result = self
            .manager
            .execute_task_in_tab(&tab, task)
            .await
            .map_err(|e| {
                error!("Task {} failed in tab {}: {}", task.id, tab, e);
                e.to_string()
            })?;

        debug!("Task {} returned from tab {} (success={})", task.id, tab, result.success);
        result.into_output()
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
