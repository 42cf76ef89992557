use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

use crate::model::{Category, NewTask, PositionUpdate, Task, TaskReplace};

const TASK_COLUMNS: &str = "id, title, description, category, priority, due_date, completed, \
     focused, position, time_estimate, energy_level, created_at, updated_at";

fn read_task_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        priority: row.get(4)?,
        due_date: row.get(5)?,
        completed: row.get(6)?,
        focused: row.get(7)?,
        position: row.get(8)?,
        time_estimate: row.get(9)?,
        energy_level: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Empty advisory tags are stored as NULL.
fn tag(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Position is computed in the same statement as the insert, so two concurrent
/// creates in one category cannot both read the same max.
fn insert_task_sql() -> String {
    format!(
        "INSERT INTO tasks (title, description, category, priority, due_date, focused,
                   time_estimate, energy_level, position)
SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, COALESCE(MAX(position), 0) + 1
FROM tasks WHERE category = ?3
RETURNING {TASK_COLUMNS}"
    )
}

fn replace_task_sql() -> String {
    format!(
        "UPDATE tasks
SET title = ?1, description = ?2, category = ?3, priority = ?4, due_date = ?5,
    completed = ?6, focused = ?7, time_estimate = ?8, energy_level = ?9,
    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
WHERE id = ?10
RETURNING {TASK_COLUMNS}"
    )
}

fn set_position_sql() -> String {
    format!(
        "UPDATE tasks
SET position = ?1, category = ?2,
    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
WHERE id = ?3
RETURNING {TASK_COLUMNS}"
    )
}

fn set_focus_sql() -> String {
    format!(
        "UPDATE tasks
SET focused = ?1,
    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
WHERE id = ?2
RETURNING {TASK_COLUMNS}"
    )
}

/// Leaves `updated_at` alone: the sweep is not a user edit.
fn sweep_sql() -> String {
    format!(
        "UPDATE tasks
SET focused = 1
WHERE due_date <= ?1 AND focused = 0 AND completed = 0
RETURNING {TASK_COLUMNS}"
    )
}

/// All tasks, optionally restricted to one category, ordered by position then age.
pub fn list_tasks(conn: &Connection, category: Option<Category>) -> Result<Vec<Task>> {
    let rows = match category {
        Some(c) => {
            let query = format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE category = ?1 \
                 ORDER BY position ASC, created_at ASC, id ASC"
            );
            let mut stmt = conn.prepare_cached(&query)?;
            let rows = stmt.query_map([c], read_task_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let query = format!(
                "SELECT {TASK_COLUMNS} FROM tasks ORDER BY position ASC, created_at ASC, id ASC"
            );
            let mut stmt = conn.prepare_cached(&query)?;
            let rows = stmt.query_map([], read_task_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(rows)
}

pub fn get_task(conn: &Connection, id: i64) -> Result<Option<Task>> {
    let query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    let task = conn.query_row(&query, [id], read_task_row).optional()?;
    Ok(task)
}

/// Insert a task at the end of its category. A task due `today` or earlier is
/// focused regardless of the requested flag.
pub fn create_task(conn: &Connection, new: &NewTask, today: NaiveDate) -> Result<Task> {
    let category = new.category.unwrap_or_default();
    let priority = new.priority.unwrap_or_default();
    let focused = new.focused.unwrap_or(false) || new.due_date.is_some_and(|d| d <= today);
    let task = conn.query_row(
        &insert_task_sql(),
        rusqlite::params![
            new.title,
            new.description,
            category,
            priority,
            new.due_date,
            focused,
            tag(&new.time_estimate),
            tag(&new.energy_level),
        ],
        read_task_row,
    )?;
    Ok(task)
}

/// Full replace. Auto-focus only applies to incomplete tasks here.
/// Returns `None` if no task has this id.
pub fn replace_task(
    conn: &Connection,
    id: i64,
    body: &TaskReplace,
    today: NaiveDate,
) -> Result<Option<Task>> {
    let completed = body.completed.unwrap_or(false);
    let focused =
        body.focused.unwrap_or(false) || (body.due_date.is_some_and(|d| d <= today) && !completed);
    let task = conn
        .query_row(
            &replace_task_sql(),
            rusqlite::params![
                body.title,
                body.description,
                body.category,
                body.priority.unwrap_or_default(),
                body.due_date,
                completed,
                focused,
                tag(&body.time_estimate),
                tag(&body.energy_level),
                id,
            ],
            read_task_row,
        )
        .optional()?;
    Ok(task)
}

pub fn set_position(conn: &Connection, id: i64, update: PositionUpdate) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &set_position_sql(),
            rusqlite::params![update.position, update.category, id],
            read_task_row,
        )
        .optional()?;
    Ok(task)
}

pub fn set_focus(conn: &Connection, id: i64, focused: bool) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &set_focus_sql(),
            rusqlite::params![focused, id],
            read_task_row,
        )
        .optional()?;
    Ok(task)
}

/// Delete and return the removed row so it can be broadcast.
pub fn delete_task(conn: &Connection, id: i64) -> Result<Option<Task>> {
    let query = format!("DELETE FROM tasks WHERE id = ?1 RETURNING {TASK_COLUMNS}");
    let task = conn.query_row(&query, [id], read_task_row).optional()?;
    Ok(task)
}

/// Focus every incomplete, unfocused task due on or before `today`.
/// Returns only the rows this call changed.
///
/// A task the user un-focused is picked up again while it is still due and
/// incomplete; the condition is date based.
pub fn sweep_overdue(conn: &Connection, today: NaiveDate) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare_cached(&sweep_sql())?;
    let rows = stmt.query_map([today], read_task_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::Priority;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        day(2026, 10, 17)
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn new_in(title: &str, category: Category) -> NewTask {
        NewTask {
            category: Some(category),
            ..new_task(title)
        }
    }

    #[test]
    fn create_defaults_to_inbox_medium_position_one() {
        let conn = db::open_memory().unwrap();
        let task = create_task(&conn, &new_task("X"), today()).unwrap();
        assert_eq!(task.title, "X");
        assert_eq!(task.category, Category::Inbox);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.position, 1);
        assert!(!task.focused);
        assert!(!task.completed);
        assert!(task.due_date.is_none());
    }

    #[test]
    fn create_appends_to_end_of_category() {
        let conn = db::open_memory().unwrap();
        create_task(&conn, &new_task("a"), today()).unwrap();
        create_task(&conn, &new_task("b"), today()).unwrap();
        let other = create_task(&conn, &new_in("n", Category::Next), today()).unwrap();
        let c = create_task(&conn, &new_task("c"), today()).unwrap();
        assert_eq!(other.position, 1);
        assert_eq!(c.position, 3);
    }

    #[test]
    fn create_position_follows_max_not_count() {
        let conn = db::open_memory().unwrap();
        let a = create_task(&conn, &new_task("a"), today()).unwrap();
        set_position(
            &conn,
            a.id,
            PositionUpdate {
                position: 10,
                category: Category::Inbox,
            },
        )
        .unwrap();
        let b = create_task(&conn, &new_task("b"), today()).unwrap();
        assert_eq!(b.position, 11);
    }

    #[test]
    fn create_due_today_is_focused() {
        let conn = db::open_memory().unwrap();
        let body = NewTask {
            due_date: Some(today()),
            focused: Some(false),
            ..new_task("due")
        };
        let task = create_task(&conn, &body, today()).unwrap();
        assert!(task.focused);
    }

    #[test]
    fn create_due_tomorrow_is_not_focused() {
        let conn = db::open_memory().unwrap();
        let body = NewTask {
            due_date: Some(day(2026, 10, 18)),
            ..new_task("later")
        };
        let task = create_task(&conn, &body, today()).unwrap();
        assert!(!task.focused);
    }

    #[test]
    fn create_stores_empty_tags_as_null() {
        let conn = db::open_memory().unwrap();
        let body = NewTask {
            time_estimate: Some(String::new()),
            energy_level: Some("high".into()),
            ..new_task("t")
        };
        let task = create_task(&conn, &body, today()).unwrap();
        assert!(task.time_estimate.is_none());
        assert_eq!(task.energy_level.as_deref(), Some("high"));
    }

    #[test]
    fn create_rejects_empty_title() {
        let conn = db::open_memory().unwrap();
        assert!(create_task(&conn, &new_task(""), today()).is_err());
    }

    #[test]
    fn list_filters_by_category_in_position_order() {
        let conn = db::open_memory().unwrap();
        let first = create_task(&conn, &new_in("first", Category::Next), today()).unwrap();
        create_task(&conn, &new_in("second", Category::Next), today()).unwrap();
        create_task(&conn, &new_task("inbox"), today()).unwrap();
        set_position(
            &conn,
            first.id,
            PositionUpdate {
                position: 5,
                category: Category::Next,
            },
        )
        .unwrap();

        let next = list_tasks(&conn, Some(Category::Next)).unwrap();
        let titles: Vec<_> = next.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);
        assert!(next.iter().all(|t| t.category == Category::Next));

        let all = list_tasks(&conn, None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn list_ties_break_on_creation_order() {
        let conn = db::open_memory().unwrap();
        create_task(&conn, &new_task("a"), today()).unwrap();
        create_task(&conn, &new_in("b", Category::Someday), today()).unwrap();
        let all = list_tasks(&conn, None).unwrap();
        assert_eq!(all[0].title, "a");
        assert_eq!(all[1].title, "b");
    }

    #[test]
    fn replace_updates_all_fields() {
        let conn = db::open_memory().unwrap();
        let task = create_task(&conn, &new_task("old"), today()).unwrap();
        let body = TaskReplace {
            title: "new".into(),
            description: Some("desc".into()),
            category: Category::Waiting,
            priority: Some(Priority::High),
            due_date: Some(day(2026, 12, 1)),
            completed: Some(false),
            focused: Some(false),
            time_estimate: Some("15m".into()),
            energy_level: Some(String::new()),
        };
        let updated = replace_task(&conn, task.id, &body, today()).unwrap().unwrap();
        assert_eq!(updated.title, "new");
        assert_eq!(updated.description.as_deref(), Some("desc"));
        assert_eq!(updated.category, Category::Waiting);
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.time_estimate.as_deref(), Some("15m"));
        assert!(updated.energy_level.is_none());
        assert!(!updated.focused);
        assert_eq!(updated.position, task.position);
    }

    #[test]
    fn replace_overdue_incomplete_is_focused() {
        let conn = db::open_memory().unwrap();
        let task = create_task(&conn, &new_task("t"), today()).unwrap();
        let mut body = TaskReplace::from(&task);
        body.due_date = Some(day(2026, 10, 1));
        let updated = replace_task(&conn, task.id, &body, today()).unwrap().unwrap();
        assert!(updated.focused);
    }

    #[test]
    fn replace_overdue_completed_is_not_auto_focused() {
        let conn = db::open_memory().unwrap();
        let task = create_task(&conn, &new_task("t"), today()).unwrap();
        let mut body = TaskReplace::from(&task);
        body.due_date = Some(day(2026, 10, 1));
        body.completed = Some(true);
        body.focused = Some(false);
        let updated = replace_task(&conn, task.id, &body, today()).unwrap().unwrap();
        assert!(updated.completed);
        assert!(!updated.focused);
    }

    #[test]
    fn replace_missing_returns_none() {
        let conn = db::open_memory().unwrap();
        let task = create_task(&conn, &new_task("t"), today()).unwrap();
        let body = TaskReplace::from(&task);
        assert!(replace_task(&conn, 999, &body, today()).unwrap().is_none());
    }

    #[test]
    fn set_position_moves_category() {
        let conn = db::open_memory().unwrap();
        let task = create_task(&conn, &new_task("t"), today()).unwrap();
        let moved = set_position(
            &conn,
            task.id,
            PositionUpdate {
                position: 3,
                category: Category::Scheduled,
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(moved.category, Category::Scheduled);
        assert_eq!(moved.position, 3);
        assert!(set_position(
            &conn,
            999,
            PositionUpdate {
                position: 1,
                category: Category::Inbox,
            }
        )
        .unwrap()
        .is_none());
    }

    #[test]
    fn set_focus_toggles_only_focus() {
        let conn = db::open_memory().unwrap();
        let task = create_task(&conn, &new_task("t"), today()).unwrap();
        let focused = set_focus(&conn, task.id, true).unwrap().unwrap();
        assert!(focused.focused);
        assert_eq!(focused.title, "t");
        let unfocused = set_focus(&conn, task.id, false).unwrap().unwrap();
        assert!(!unfocused.focused);
        assert!(set_focus(&conn, 42, true).unwrap().is_none());
    }

    #[test]
    fn delete_returns_removed_row() {
        let conn = db::open_memory().unwrap();
        let task = create_task(&conn, &new_task("t"), today()).unwrap();
        let removed = delete_task(&conn, task.id).unwrap().unwrap();
        assert_eq!(removed.id, task.id);
        assert!(get_task(&conn, task.id).unwrap().is_none());
        assert!(delete_task(&conn, task.id).unwrap().is_none());
    }

    #[test]
    fn sweep_focuses_due_incomplete_tasks() {
        let conn = db::open_memory().unwrap();
        // Created before it was due, so not focused yet.
        let body = NewTask {
            due_date: Some(today()),
            ..new_task("due")
        };
        let due = create_task(&conn, &body, day(2026, 10, 10)).unwrap();
        let overdue = create_task(
            &conn,
            &NewTask {
                due_date: Some(day(2026, 9, 1)),
                ..new_task("overdue")
            },
            day(2026, 8, 1),
        )
        .unwrap();
        let future = create_task(
            &conn,
            &NewTask {
                due_date: Some(day(2026, 11, 1)),
                ..new_task("future")
            },
            today(),
        )
        .unwrap();
        let undated = create_task(&conn, &new_task("undated"), today()).unwrap();
        assert!(!due.focused && !overdue.focused);

        let swept = sweep_overdue(&conn, today()).unwrap();
        let mut ids: Vec<_> = swept.iter().map(|t| t.id).collect();
        ids.sort();
        assert_eq!(ids, vec![due.id, overdue.id]);
        assert!(swept.iter().all(|t| t.focused));

        assert!(!get_task(&conn, future.id).unwrap().unwrap().focused);
        assert!(!get_task(&conn, undated.id).unwrap().unwrap().focused);
    }

    #[test]
    fn sweep_skips_completed_tasks() {
        let conn = db::open_memory().unwrap();
        let task = create_task(&conn, &new_task("t"), today()).unwrap();
        let mut body = TaskReplace::from(&task);
        body.due_date = Some(day(2026, 1, 1));
        body.completed = Some(true);
        replace_task(&conn, task.id, &body, today()).unwrap();

        assert!(sweep_overdue(&conn, today()).unwrap().is_empty());
        assert!(!get_task(&conn, task.id).unwrap().unwrap().focused);
    }

    #[test]
    fn sweep_is_idempotent() {
        let conn = db::open_memory().unwrap();
        create_task(
            &conn,
            &NewTask {
                due_date: Some(today()),
                ..new_task("t")
            },
            day(2026, 10, 1),
        )
        .unwrap();
        assert_eq!(sweep_overdue(&conn, today()).unwrap().len(), 1);
        assert!(sweep_overdue(&conn, today()).unwrap().is_empty());
    }

    #[test]
    fn sweep_refocuses_manually_unfocused_overdue_task() {
        let conn = db::open_memory().unwrap();
        let task = create_task(
            &conn,
            &NewTask {
                due_date: Some(today()),
                ..new_task("t")
            },
            today(),
        )
        .unwrap();
        assert!(task.focused);
        set_focus(&conn, task.id, false).unwrap();
        let swept = sweep_overdue(&conn, today()).unwrap();
        assert_eq!(swept.len(), 1);
        assert!(swept[0].focused);
    }

    #[test]
    fn sweep_leaves_updated_at_alone() {
        let conn = db::open_memory().unwrap();
        let task = create_task(
            &conn,
            &NewTask {
                due_date: Some(today()),
                ..new_task("t")
            },
            day(2026, 10, 1),
        )
        .unwrap();
        let swept = sweep_overdue(&conn, today()).unwrap();
        assert_eq!(swept[0].updated_at, task.updated_at);
    }
}
