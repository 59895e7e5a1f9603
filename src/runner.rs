use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::notify::RunContext;
use crate::pipeline::Coordinator;

/// Detaches pipeline runs from the accepting request so submission returns
/// immediately. Handles are retained per request id; there is no cancellation
/// surface, but a future one would attach here.
pub struct BackgroundRunner {
    coordinator: Arc<Coordinator>,
    tasks: DashMap<String, JoinHandle<()>>,
}

impl BackgroundRunner {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        BackgroundRunner {
            coordinator,
            tasks: DashMap::new(),
        }
    }

    /// Spawns the run for an accepted request. Request ids are generated
    /// fresh per submission, so each id has at most one run. Failures inside
    /// the task never escape; the coordinator records them in the registry.
    pub fn submit(&self, ctx: RunContext, user_input: String) {
        let coordinator = self.coordinator.clone();
        let request_id = ctx.request_id.clone();
        let handle = tokio::spawn(async move {
            coordinator.execute(ctx, user_input).await;
        });
        self.tasks.insert(request_id, handle);
    }

    /// Whether the run for this id is still executing.
    pub fn is_running(&self, request_id: &str) -> bool {
        self.tasks
            .get(request_id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}
