//! Task registration and dependency-ordered execution.
//!
//! Tasks are registered with a name, an optional list of prerequisite task
//! names, and an action closure. Prerequisites must already be registered,
//! which makes dependency cycles unrepresentable: a task can only name tasks
//! that existed before it. Running a task runs its prerequisites first, in
//! declared order, each time they are named (the same prerequisite listed by
//! two tasks in a chain runs twice).
//!
//! Execution is sequential and fail-fast: the first failing task stops the
//! run, and the requested task reports which prerequisite sank it.

use std::collections::HashMap;
use std::error::Error;

use crate::reload::ReloadMessage;

/// What a task produced, beyond side effects on disk.
#[derive(Debug, Default)]
pub struct TaskOutcome {
    /// Reload to push to attached browsers, if any
    pub reload: Option<ReloadMessage>,
    /// One-line summary for the console
    pub summary: String,
}

impl TaskOutcome {
    pub fn new(summary: impl Into<String>) -> Self {
        Self { reload: None, summary: summary.into() }
    }

    pub fn with_reload(mut self, reload: ReloadMessage) -> Self {
        self.reload = Some(reload);
        self
    }
}

/// Action result; the boxed error keeps task bodies decoupled from any one
/// error enum.
pub type TaskResult = Result<TaskOutcome, Box<dyn Error + Send + Sync>>;

/// A task body.
pub type TaskAction = Box<dyn Fn() -> TaskResult>;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task `{0}` is already registered")]
    DuplicateTask(String),

    #[error("task `{task}` names unknown prerequisite `{prerequisite}`")]
    UnknownPrerequisite { task: String, prerequisite: String },

    #[error("no task named `{0}`")]
    UnknownTask(String),

    #[error("task `{task}` failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("task `{task}` aborted: prerequisite `{failed}` failed: {reason}")]
    DependencyFailed { task: String, failed: String, reason: String },
}

struct Task {
    name: String,
    prerequisites: Vec<String>,
    watchable: bool,
    action: TaskAction,
}

/// What a run did.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Task names in execution order, prerequisites included
    pub executed: Vec<String>,
    /// Reload messages produced by executed tasks, in order
    pub reloads: Vec<ReloadMessage>,
}

/// Registry and runner for named tasks.
#[derive(Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Prerequisites must name already-registered tasks.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        prerequisites: &[&str],
        watchable: bool,
        action: TaskAction,
    ) -> Result<(), TaskError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(TaskError::DuplicateTask(name));
        }
        for prerequisite in prerequisites {
            if !self.index.contains_key(*prerequisite) {
                return Err(TaskError::UnknownPrerequisite {
                    task: name,
                    prerequisite: (*prerequisite).to_string(),
                });
            }
        }

        self.index.insert(name.clone(), self.tasks.len());
        self.tasks.push(Task {
            name,
            prerequisites: prerequisites.iter().map(|p| (*p).to_string()).collect(),
            watchable,
            action,
        });
        Ok(())
    }

    /// Whether a task exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Whether a task accepts watch-triggered runs.
    pub fn is_watchable(&self, name: &str) -> bool {
        self.index.get(name).map(|&i| self.tasks[i].watchable).unwrap_or(false)
    }

    /// Registered task names, in registration order.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    /// Full execution order for a task: prerequisites first, declared order,
    /// repeats preserved, the task itself last.
    pub fn execution_order(&self, name: &str) -> Result<Vec<String>, TaskError> {
        let &index = self
            .index
            .get(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;
        let mut order = Vec::new();
        self.expand(index, &mut order);
        Ok(order)
    }

    fn expand(&self, index: usize, order: &mut Vec<String>) {
        let task = &self.tasks[index];
        for prerequisite in &task.prerequisites {
            // registration guarantees the name resolves
            if let Some(&i) = self.index.get(prerequisite) {
                self.expand(i, order);
            }
        }
        order.push(task.name.clone());
    }

    /// Run a task and everything it depends on. Fail-fast: the first failing
    /// step ends the run, as [`TaskError::TaskFailed`] when the requested
    /// task itself failed, [`TaskError::DependencyFailed`] otherwise.
    pub fn run(&self, name: &str) -> Result<RunReport, TaskError> {
        let order = self.execution_order(name)?;
        let mut report = RunReport::default();

        for step in order {
            let &index = self
                .index
                .get(&step)
                .ok_or_else(|| TaskError::UnknownTask(step.clone()))?;
            let task = &self.tasks[index];

            tracing::debug!("running task `{}`", task.name);
            match (task.action)() {
                Ok(outcome) => {
                    if !outcome.summary.is_empty() {
                        tracing::info!("{}: {}", task.name, outcome.summary);
                    }
                    if let Some(reload) = outcome.reload {
                        report.reloads.push(reload);
                    }
                    report.executed.push(step);
                }
                Err(e) => {
                    if step == name {
                        return Err(TaskError::TaskFailed {
                            task: step,
                            reason: e.to_string(),
                        });
                    }
                    return Err(TaskError::DependencyFailed {
                        task: name.to_string(),
                        failed: step,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}
