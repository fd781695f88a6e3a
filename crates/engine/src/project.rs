//! View projection: pure filtering and ordering over a task snapshot.

use tp_core::{Task, TaskPriority, TaskStatus};

/// Display criteria. Unset fields match everything; `tags` is conjunctive
/// (a task must carry every listed tag); `search` is a case-insensitive
/// substring match over title and description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub tags: Vec<String>,
    pub search: Option<String>,
}

impl TaskFilter {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.tags.is_empty()
            && self.search.as_deref().is_none_or(|s| s.trim().is_empty())
    }
}

/// Compute the display list: filter, then float starred tasks to the top.
/// The sort is stable, so ties preserve the snapshot's delivery order.
/// Referentially transparent: identical inputs yield identical output.
pub fn project(tasks: &[Task], filter: &TaskFilter) -> Vec<Task> {
    let needle = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut out: Vec<Task> = tasks
        .iter()
        .filter(|task| matches(task, filter, needle.as_deref()))
        .cloned()
        .collect();
    out.sort_by_key(|task| !task.starred);
    out
}

fn matches(task: &Task, filter: &TaskFilter, needle: Option<&str>) -> bool {
    if filter.status.is_some_and(|s| task.status != s) {
        return false;
    }
    if filter.priority.is_some_and(|p| task.priority != p) {
        return false;
    }
    if !filter.tags.iter().all(|tag| task.tags.contains(tag)) {
        return false;
    }
    if let Some(needle) = needle {
        let haystack_hit = task.title.to_lowercase().contains(needle)
            || task.description.to_lowercase().contains(needle);
        if !haystack_hit {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str, starred: bool) -> Task {
        Task {
            id: title.to_lowercase(),
            title: title.into(),
            description: String::new(),
            due_date: "2026-09-01T00:00:00+00:00".into(),
            priority: TaskPriority::Medium,
            status: TaskStatus::NotStarted,
            tags: vec![],
            starred,
            created_at: "2026-08-01T00:00:00+00:00".into(),
            updated_at: "2026-08-01T00:00:00+00:00".into(),
            completed_at: None,
        }
    }

    #[test]
    fn starred_first_ties_keep_delivery_order() {
        let tasks = vec![task("A", false), task("B", true), task("C", false)];
        let out = project(&tasks, &TaskFilter::default());
        let titles: Vec<&str> = out.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["B", "A", "C"]);
    }

    #[test]
    fn projection_is_pure() {
        let tasks = vec![task("A", false), task("B", true)];
        let filter = TaskFilter {
            search: Some("a".into()),
            ..Default::default()
        };
        assert_eq!(project(&tasks, &filter), project(&tasks, &filter));
    }

    #[test]
    fn status_and_priority_are_exact_matches() {
        let mut done = task("Done", false);
        done.status = TaskStatus::Completed;
        let mut urgent = task("Urgent", false);
        urgent.priority = TaskPriority::High;
        let tasks = vec![task("Plain", false), done, urgent];

        let by_status = project(
            &tasks,
            &TaskFilter {
                status: Some(TaskStatus::Completed),
                ..Default::default()
            },
        );
        assert_eq!(by_status.len(), 1);
        assert_eq!(by_status[0].title, "Done");

        let by_priority = project(
            &tasks,
            &TaskFilter {
                priority: Some(TaskPriority::High),
                ..Default::default()
            },
        );
        assert_eq!(by_priority.len(), 1);
        assert_eq!(by_priority[0].title, "Urgent");
    }

    #[test]
    fn tag_filter_is_conjunctive() {
        let mut both = task("Both", false);
        both.tags = vec!["work".into(), "urgent".into()];
        let mut one = task("One", false);
        one.tags = vec!["work".into()];
        let tasks = vec![both, one];

        let filter = TaskFilter {
            tags: vec!["work".into(), "urgent".into()],
            ..Default::default()
        };
        let out = project(&tasks, &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Both");
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_description() {
        let mut by_desc = task("Meeting", false);
        by_desc.description = "Prepare the QUARTERLY report".into();
        let tasks = vec![task("Groceries", false), by_desc];

        let filter = TaskFilter {
            search: Some("quarterly".into()),
            ..Default::default()
        };
        let out = project(&tasks, &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Meeting");

        let filter = TaskFilter {
            search: Some("GROC".into()),
            ..Default::default()
        };
        assert_eq!(project(&tasks, &filter)[0].title, "Groceries");
    }

    #[test]
    fn blank_search_matches_everything() {
        let tasks = vec![task("A", false), task("B", false)];
        let filter = TaskFilter {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert!(filter.is_empty());
        assert_eq!(project(&tasks, &filter).len(), 2);
    }
}
