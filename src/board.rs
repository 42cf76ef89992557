//! Board view of the task list: one column per category plus a "focused"
//! column, ordered the way a person works through them.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::model::{Category, Task, TaskEvent};

/// Completed tasks shown per column.
pub const RECENT_DONE_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Category(Category),
    Focused,
}

impl Column {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        if s == "focused" {
            return Ok(Self::Focused);
        }
        Category::parse(s).map(Self::Category)
    }

    /// The five categories in GTD order, then the focused column.
    pub fn all() -> Vec<Column> {
        let mut columns: Vec<Column> = Category::ALL.into_iter().map(Self::Category).collect();
        columns.push(Self::Focused);
        columns
    }

    fn contains(self, task: &Task) -> bool {
        match self {
            Self::Category(c) => task.category == c,
            Self::Focused => task.focused,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category(c) => f.write_str(c.title()),
            Self::Focused => f.write_str("Focus"),
        }
    }
}

/// Focused first, then priority high to low, then earliest due date (undated
/// last), then oldest first.
pub fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    b.focused
        .cmp(&a.focused)
        .then_with(|| b.priority.rank().cmp(&a.priority.rank()))
        .then_with(|| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.created_at.cmp(&b.created_at))
}

fn updated_at(task: &Task) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&task.updated_at)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[derive(Debug)]
pub struct ColumnView<'a> {
    pub column: Column,
    pub total: usize,
    pub active: Vec<&'a Task>,
    pub recent_done: Vec<&'a Task>,
}

pub fn build_column(tasks: &[Task], column: Column, now: DateTime<Utc>) -> ColumnView<'_> {
    let members: Vec<&Task> = tasks.iter().filter(|t| column.contains(t)).collect();

    let mut active: Vec<&Task> = members.iter().copied().filter(|t| !t.completed).collect();
    active.sort_by(|a, b| compare_tasks(a, b));

    // updated_at stands in for the completion time.
    let cutoff = now - Duration::hours(24);
    let mut recent_done: Vec<&Task> = members
        .iter()
        .copied()
        .filter(|t| t.completed && updated_at(t).is_some_and(|u| u >= cutoff))
        .take(RECENT_DONE_LIMIT)
        .collect();
    recent_done.sort_by(|a, b| compare_tasks(a, b));

    ColumnView {
        column,
        total: members.len(),
        active,
        recent_done,
    }
}

/// Tasks completed whose last update falls on `today`.
pub fn completed_today(tasks: &[Task], today: NaiveDate) -> usize {
    let today = today.to_string();
    tasks
        .iter()
        .filter(|t| t.completed && t.updated_at.split('T').next() == Some(today.as_str()))
        .count()
}

fn format_line(task: &Task) -> String {
    let mut line = format!("{} #{} [{}] {}", task.icon(), task.id, task.priority, task.title);
    if let Some(due) = task.due_date {
        line.push_str(&format!("  (due {due})"));
    }
    if let Some(ref t) = task.time_estimate {
        line.push_str(&format!("  ~{t}"));
    }
    if let Some(ref e) = task.energy_level {
        line.push_str(&format!("  energy:{e}"));
    }
    line
}

pub fn format_task_list(tasks: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        out.push_str(&format!("{:<10} {}\n", task.category.as_str(), format_line(task)));
    }
    out
}

pub fn format_board(tasks: &[Task], columns: &[Column], now: DateTime<Utc>) -> String {
    let mut out = format!("Completed today: {}\n", completed_today(tasks, now.date_naive()));
    for &column in columns {
        let view = build_column(tasks, column, now);
        out.push('\n');
        out.push_str(&format!("== {} ({}) ==\n", view.column, view.total));
        for task in &view.active {
            out.push_str(&format!("  {}\n", format_line(task)));
        }
        if !view.recent_done.is_empty() {
            out.push_str("  -- done --\n");
            for task in &view.recent_done {
                out.push_str(&format!("  {}\n", format_line(task)));
            }
        }
    }
    out
}

pub fn format_event(event: &TaskEvent) -> String {
    format!(
        "[{}] {:<6} {}",
        event.timestamp,
        event.action.as_str(),
        format_line(&event.task)
    )
}
