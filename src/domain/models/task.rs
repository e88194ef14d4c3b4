use serde::Deserialize;

/// Status of a server-side background job as reported by
/// `GET /pools/default/tasks`. Unknown statuses are preserved rather than
/// rejected; the task list carries entries the driver never looks at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    #[serde(other)]
    Other,
}

/// One observed entry of the cluster task list.
///
/// Never created or mutated by the driver; its presence in the task list is
/// the signal that an orchestration call was accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterTask {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

impl ClusterTask {
    pub fn is_rebalance(&self) -> bool {
        self.task_type == "rebalance"
    }

    pub fn is_running(&self) -> bool {
        self.status == Some(TaskStatus::Running)
    }
}
