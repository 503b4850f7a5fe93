//! Task views and their refresh logic.
//!
//! State lives behind a `tokio::sync::Mutex` that is only held to mark a view as
//! loading and to apply a response, never while a request is in flight. Each view has
//! its own generation counter: a response is applied only if no newer request for the
//! same view started in the meantime.

use chrono::{DateTime, Utc};
use mmr_api_client::ApiClient;
use mmr_core::models::BackgroundTask;
use mmr_core::AdminResult;
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tokio::sync::Mutex;

/// A list of tasks as last fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskListView {
    pub tasks: Vec<BackgroundTask>,
    pub loading: bool,
    /// Message of the last failed fetch; cleared by the next successful one.
    pub error: Option<String>,
    pub last_refreshed: Option<DateTime<Utc>>,
}

/// The currently selected task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDetailView {
    pub task_id: i64,
    pub task: Option<BackgroundTask>,
    pub loading: bool,
    pub error: Option<String>,
}

impl TaskDetailView {
    fn empty(task_id: i64) -> Self {
        Self {
            task_id,
            task: None,
            loading: false,
            error: None,
        }
    }
}

/// Immutable copy of every view at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskMonitorSnapshot {
    pub all: TaskListView,
    pub unfinished: TaskListView,
    pub selected: Option<TaskDetailView>,
    pub taken_at: DateTime<Utc>,
}

/// Which views a refresh re-issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskViews {
    pub all: bool,
    pub unfinished: bool,
    pub selected: bool,
}

impl TaskViews {
    pub const LISTS: TaskViews = TaskViews {
        all: true,
        unfinished: true,
        selected: false,
    };

    pub const EVERYTHING: TaskViews = TaskViews {
        all: true,
        unfinished: true,
        selected: true,
    };
}

impl Default for TaskViews {
    fn default() -> Self {
        TaskViews::EVERYTHING
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    All,
    Unfinished,
}

impl Display for ListKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ListKind::All => write!(f, "all"),
            ListKind::Unfinished => write!(f, "unfinished"),
        }
    }
}

#[derive(Default)]
struct MonitorState {
    all: TaskListView,
    unfinished: TaskListView,
    selected: Option<TaskDetailView>,
    all_generation: u64,
    unfinished_generation: u64,
    detail_generation: u64,
}

impl MonitorState {
    fn list_mut(&mut self, kind: ListKind) -> (&mut TaskListView, &mut u64) {
        match kind {
            ListKind::All => (&mut self.all, &mut self.all_generation),
            ListKind::Unfinished => (&mut self.unfinished, &mut self.unfinished_generation),
        }
    }
}

pub struct TaskMonitor {
    client: ApiClient,
    state: Mutex<MonitorState>,
}

impl TaskMonitor {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Replace the "all tasks" view with a fresh listing.
    pub async fn list_all(&self) -> AdminResult<Vec<BackgroundTask>> {
        self.load_list(ListKind::All).await
    }

    /// Replace the "unfinished tasks" view with a fresh listing.
    pub async fn list_unfinished(&self) -> AdminResult<Vec<BackgroundTask>> {
        self.load_list(ListKind::Unfinished).await
    }

    /// Select `task_id` and fetch it. Selecting another task drops the previous detail.
    pub async fn get_detail(&self, task_id: i64) -> AdminResult<BackgroundTask> {
        let generation = self.begin_detail(task_id).await;
        let result = self.client.task_detail(task_id).await;
        if let Err(err) = &result {
            tracing::warn!(task_id, error = %err, "Task detail fetch failed");
        }
        self.finish_detail(task_id, generation, &result).await;
        result
    }

    pub async fn clear_selection(&self) {
        let mut state = self.state.lock().await;
        state.detail_generation += 1;
        state.selected = None;
    }

    pub async fn selected_task_id(&self) -> Option<i64> {
        self.state.lock().await.selected.as_ref().map(|v| v.task_id)
    }

    /// Re-issue the requested views concurrently. Failures are recorded on their views.
    pub async fn refresh(&self, views: TaskViews) {
        let selected = if views.selected {
            self.selected_task_id().await
        } else {
            None
        };

        let all = async {
            if views.all {
                let _ = self.list_all().await;
            }
        };
        let unfinished = async {
            if views.unfinished {
                let _ = self.list_unfinished().await;
            }
        };
        let detail = async {
            if let Some(task_id) = selected {
                let _ = self.get_detail(task_id).await;
            }
        };

        tokio::join!(all, unfinished, detail);
    }

    pub async fn snapshot(&self) -> TaskMonitorSnapshot {
        let state = self.state.lock().await;
        TaskMonitorSnapshot {
            all: state.all.clone(),
            unfinished: state.unfinished.clone(),
            selected: state.selected.clone(),
            taken_at: Utc::now(),
        }
    }

    async fn load_list(&self, kind: ListKind) -> AdminResult<Vec<BackgroundTask>> {
        let generation = self.begin_list(kind).await;
        let result = match kind {
            ListKind::All => self.client.list_all_tasks().await,
            ListKind::Unfinished => self.client.list_unfinished_tasks().await,
        };
        if let Err(err) = &result {
            tracing::warn!(view = %kind, error = %err, "Task list fetch failed");
        }
        self.finish_list(kind, generation, &result).await;
        result
    }

    async fn begin_list(&self, kind: ListKind) -> u64 {
        let mut state = self.state.lock().await;
        let (view, generation) = state.list_mut(kind);
        *generation += 1;
        view.loading = true;
        *generation
    }

    /// Returns false when the response was superseded and dropped.
    async fn finish_list(
        &self,
        kind: ListKind,
        generation: u64,
        result: &AdminResult<Vec<BackgroundTask>>,
    ) -> bool {
        let mut state = self.state.lock().await;
        let (view, current) = state.list_mut(kind);
        if *current != generation {
            tracing::debug!(view = %kind, generation, current = *current, "Discarding superseded task list");
            return false;
        }

        view.loading = false;
        match result {
            Ok(tasks) => {
                view.tasks = tasks.clone();
                view.error = None;
                view.last_refreshed = Some(Utc::now());
            }
            Err(err) => view.error = Some(err.message()),
        }
        true
    }

    async fn begin_detail(&self, task_id: i64) -> u64 {
        let mut state = self.state.lock().await;
        state.detail_generation += 1;
        let reselect = state.selected.as_ref().map(|v| v.task_id) != Some(task_id);
        if reselect {
            state.selected = Some(TaskDetailView::empty(task_id));
        }
        if let Some(view) = state.selected.as_mut() {
            view.loading = true;
        }
        state.detail_generation
    }

    async fn finish_detail(
        &self,
        task_id: i64,
        generation: u64,
        result: &AdminResult<BackgroundTask>,
    ) -> bool {
        let mut state = self.state.lock().await;
        if state.detail_generation != generation {
            tracing::debug!(task_id, generation, "Discarding superseded task detail");
            return false;
        }

        let Some(view) = state.selected.as_mut().filter(|v| v.task_id == task_id) else {
            return false;
        };
        view.loading = false;
        match result {
            Ok(task) => {
                view.task = Some(task.clone());
                view.error = None;
            }
            Err(err) => view.error = Some(err.message()),
        }
        true
    }
}
