//! TaskStore - Task レコードの型付きビュー（`tasks` bucket）

use std::sync::Arc;

use crate::codec;
use crate::domain::{Result, Task, TaskId};
use crate::ports::RecordStore;

pub const TASKS_BUCKET: &str = "tasks";

#[derive(Clone)]
pub struct TaskStore {
    records: Arc<dyn RecordStore>,
}

impl TaskStore {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    pub async fn load(&self, id: &TaskId) -> Result<Option<Task>> {
        match self.records.get(TASKS_BUCKET, id.as_str()).await? {
            Some(bytes) => Ok(Some(codec::decode(&bytes, "task")?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, task: &Task) -> Result<()> {
        let bytes = codec::encode(task)?;
        self.records
            .put(TASKS_BUCKET, task.task_id.as_str(), &bytes)
            .await
    }

    /// Every readable task, in id order.
    pub async fn list(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for id in self.records.list(TASKS_BUCKET).await? {
            let Some(bytes) = self.records.get(TASKS_BUCKET, &id).await? else {
                continue;
            };
            match codec::decode::<Task>(&bytes, "task") {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!(task_id = %id, error = %e, "skipping unreadable task"),
            }
        }
        Ok(tasks)
    }

    /// The most recently updated open task restating `intent` within `project`.
    ///
    /// Completed and failed tasks never match; a repeated intent after either
    /// is new work.
    pub async fn find_by_intent(
        &self,
        intent: &str,
        project: Option<&str>,
    ) -> Result<Option<Task>> {
        let wanted = Task::normalized_intent(intent);
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|t| !t.state.is_terminal())
            .filter(|t| t.project.as_deref() == project)
            .filter(|t| Task::normalized_intent(&t.intent) == wanted)
            .max_by_key(|t| t.last_update))
    }
}
