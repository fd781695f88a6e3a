use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Task enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Self::Low),
            "Medium" => Ok(Self::Medium),
            "High" => Ok(Self::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Wire strings match the document store exactly, spaces included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    Pending,
    #[serde(rename = "Almost Done")]
    AlmostDone,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::Pending => "Pending",
            Self::AlmostDone => "Almost Done",
            Self::Completed => "Completed",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Not Started" => Ok(Self::NotStarted),
            "Pending" => Ok(Self::Pending),
            "Almost Done" => Ok(Self::AlmostDone),
            "Completed" => Ok(Self::Completed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Task shapes
// ---------------------------------------------------------------------------

/// Backend-native task record. Timestamps stay `DateTime<Utc>` on this side
/// of the serialization boundary; only the stores and gateways touch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    /// Scoping key: the owning user's identity id.
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub tags: Vec<String>,
    pub starred: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Convert to the canonical consumer shape: every timestamp becomes an
    /// RFC 3339 string and the scoping key is dropped.
    pub fn to_task(&self) -> Task {
        Task {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            due_date: self.due_date.to_rfc3339(),
            priority: self.priority,
            status: self.status,
            tags: self.tags.clone(),
            starred: self.starred,
            created_at: self.created_at.to_rfc3339(),
            updated_at: self.updated_at.to_rfc3339(),
            completed_at: self.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Canonical task shape handed to consumers. No backend-native timestamp
/// type crosses this boundary: all dates are RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub due_date: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub tags: Vec<String>,
    pub starred: bool,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// Consumer input for task creation. The store assigns the id and the
/// gateway assigns scoping key and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// RFC 3339; parsed (and rejected) at the mutation gateway.
    pub due_date: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update from a consumer: only supplied fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// RFC 3339; parsed at the mutation gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.tags.is_none()
            && self.starred.is_none()
    }
}

/// Backend-native rendering of a patch, produced by the mutation gateway
/// after parsing consumer-side date strings. `updated_at` is always set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub tags: Option<Vec<String>>,
    pub starred: Option<bool>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    /// Apply to a record in place. Only supplied fields change.
    pub fn apply_to(&self, record: &mut TaskRecord) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(due_date) = self.due_date {
            record.due_date = due_date;
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(tags) = &self.tags {
            record.tags = tags.clone();
        }
        if let Some(starred) = self.starred {
            record.starred = starred;
        }
        if let Some(completed_at) = self.completed_at {
            record.completed_at = Some(completed_at);
        }
        if let Some(updated_at) = self.updated_at {
            record.updated_at = updated_at;
        }
    }
}

// ---------------------------------------------------------------------------
// Identity / profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

/// Per-user profile record, stored separately from the task collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

impl Profile {
    /// Fresh profile with first-signup defaults.
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            username: username.into(),
            email: email.into(),
            role: UserRole::User,
            is_active: true,
            is_verified: false,
            created_at: now,
            last_login: now,
        }
    }
}

/// Identity handle returned by the identity backend on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHandle {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    /// Whether the provider vouches for the email address. Carried into
    /// the profile when it is first created.
    pub email_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_wire_strings_round_trip() {
        for status in [
            TaskStatus::NotStarted,
            TaskStatus::Pending,
            TaskStatus::AlmostDone,
            TaskStatus::Completed,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Ok(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!(TaskStatus::from_str("NotStarted").is_err());
    }

    #[test]
    fn record_to_task_converts_timestamps() {
        let now = Utc::now();
        let record = TaskRecord {
            id: "t1".into(),
            user_id: "u1".into(),
            title: "Ship it".into(),
            description: String::new(),
            due_date: now,
            priority: TaskPriority::High,
            status: TaskStatus::Pending,
            tags: vec!["work".into()],
            starred: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let task = record.to_task();
        assert_eq!(task.due_date, now.to_rfc3339());
        assert_eq!(task.completed_at, None);
        assert_eq!(task.id, "t1");
    }

    #[test]
    fn patch_applies_only_supplied_fields() {
        let now = Utc::now();
        let mut record = TaskRecord {
            id: "t1".into(),
            user_id: "u1".into(),
            title: "Old".into(),
            description: "desc".into(),
            due_date: now,
            priority: TaskPriority::Low,
            status: TaskStatus::NotStarted,
            tags: vec![],
            starred: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let patch = RecordPatch {
            title: Some("New".into()),
            starred: Some(true),
            ..Default::default()
        };
        patch.apply_to(&mut record);
        assert_eq!(record.title, "New");
        assert!(record.starred);
        assert_eq!(record.description, "desc");
        assert_eq!(record.status, TaskStatus::NotStarted);
    }
}
