use std::fmt;

use chrono::{NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// GTD bucket a task lives in. A task is in exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Inbox,
    Next,
    Waiting,
    Scheduled,
    Someday,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::Inbox,
        Self::Next,
        Self::Waiting,
        Self::Scheduled,
        Self::Someday,
    ];

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "inbox" => Ok(Self::Inbox),
            "next" => Ok(Self::Next),
            "waiting" => Ok(Self::Waiting),
            "scheduled" => Ok(Self::Scheduled),
            "someday" => Ok(Self::Someday),
            _ => anyhow::bail!(
                "invalid category '{s}': must be inbox, next, waiting, scheduled, or someday"
            ),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Next => "next",
            Self::Waiting => "waiting",
            Self::Scheduled => "scheduled",
            Self::Someday => "someday",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Inbox => "Inbox",
            Self::Next => "Next",
            Self::Waiting => "Waiting",
            Self::Scheduled => "Scheduled",
            Self::Someday => "Someday",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => anyhow::bail!("invalid priority '{s}': must be low, medium, or high"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Sort weight: high=3, medium=2, low=1.
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn text_column<T>(value: ValueRef<'_>, parse: fn(&str) -> anyhow::Result<T>) -> FromSqlResult<T> {
    let s = value.as_str()?;
    parse(s).map_err(|e| FromSqlError::Other(e.into()))
}

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value, Self::parse)
    }
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value, Self::parse)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub focused: bool,
    pub position: i64,
    pub time_estimate: Option<String>,
    pub energy_level: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    /// Returns display icon: x=completed, !=focused, .=open
    pub fn icon(&self) -> &'static str {
        if self.completed {
            "x"
        } else if self.focused {
            "!"
        } else {
            "."
        }
    }
}

/// Body of `POST /api/tasks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub focused: Option<bool>,
    #[serde(default)]
    pub time_estimate: Option<String>,
    #[serde(default)]
    pub energy_level: Option<String>,
}

/// Body of `PUT /api/tasks/{id}`: every mutable field is replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReplace {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: Category,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub focused: Option<bool>,
    #[serde(default)]
    pub time_estimate: Option<String>,
    #[serde(default)]
    pub energy_level: Option<String>,
}

impl From<&Task> for TaskReplace {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            category: task.category,
            priority: Some(task.priority),
            due_date: task.due_date,
            completed: Some(task.completed),
            focused: Some(task.focused),
            time_estimate: task.time_estimate.clone(),
            energy_level: task.energy_level.clone(),
        }
    }
}

/// Body of `PUT /api/tasks/{id}/position`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub position: i64,
    pub category: Category,
}

/// Body of `PUT /api/tasks/{id}/focus`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FocusUpdate {
    pub focused: bool,
}

/// Kind of change carried by a [`TaskEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const TASK_UPDATE: &str = "task_update";

/// Push message sent to every connected client after a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub action: Action,
    pub task: Task,
    pub timestamp: String,
}

impl TaskEvent {
    pub fn new(action: Action, task: Task) -> Self {
        Self {
            kind: TASK_UPDATE.to_string(),
            action,
            task,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
