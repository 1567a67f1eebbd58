use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

time::serde::format_description!(
    wire_datetime,
    OffsetDateTime,
    "[year]-[month]-[day] [hour]:[minute]:[second]"
);

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CoreError {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: &'static str,
    },
}

impl CoreError {
    #[must_use]
    pub fn validation(field: &'static str, message: &'static str) -> Self {
        Self::Validation { field, message }
    }
}

pub const TITLE_MAX_CHARS: usize = 150;
pub const TASK_DESCRIPTION_MAX_CHARS: usize = 250;
pub const USERNAME_MAX_CHARS: usize = 150;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct UserId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CaseId(pub i64);

impl Display for CaseId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(pub i64);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    #[default]
    Open,
    Closed,
}

impl CaseStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OPEN" => Some(Self::Open),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Created,
    InProgress,
    Finished,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(Self::Created),
            "IN_PROGRESS" => Some(Self::InProgress),
            "FINISHED" => Some(Self::Finished),
            _ => None,
        }
    }
}

/// An authentication principal. Never serialized into API responses.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

/// A case with its tasks loaded in persisted insertion order.
///
/// Serializes as the wire body: `pk`, `title`, `status`, `tasks`. The owner
/// column never leaves the server.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CaseRecord {
    pub pk: CaseId,
    #[serde(skip_serializing)]
    pub owner: UserId,
    pub title: String,
    pub status: CaseStatus,
    pub tasks: Vec<TaskRecord>,
}

/// A unit of work belonging to exactly one case and one owner.
///
/// Wire datetimes are `YYYY-MM-DD HH:MM:SS` (UTC); `completed_date` stays null
/// until the first transition into `FINISHED` and is never cleared afterwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskRecord {
    pub pk: TaskId,
    #[serde(skip_serializing)]
    pub owner: UserId,
    pub case: CaseId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(with = "wire_datetime")]
    pub creation_date: OffsetDateTime,
    #[serde(with = "wire_datetime")]
    pub last_updated_date: OffsetDateTime,
    #[serde(with = "wire_datetime::option")]
    pub completed_date: Option<OffsetDateTime>,
}

/// Validate a case or task title: required, at most 150 characters.
///
/// # Errors
/// Returns [`CoreError::Validation`] scoped to the `title` field.
pub fn validate_title(title: &str) -> Result<(), CoreError> {
    if title.trim().is_empty() {
        return Err(CoreError::validation("title", "Title must not be blank."));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(CoreError::validation(
            "title",
            "Title must be at most 150 characters.",
        ));
    }
    Ok(())
}

/// Validate a task description: required, at most 250 characters.
///
/// # Errors
/// Returns [`CoreError::Validation`] scoped to the `description` field.
pub fn validate_description(description: &str) -> Result<(), CoreError> {
    if description.trim().is_empty() {
        return Err(CoreError::validation(
            "description",
            "Description must not be blank.",
        ));
    }
    if description.chars().count() > TASK_DESCRIPTION_MAX_CHARS {
        return Err(CoreError::validation(
            "description",
            "Description must be at most 250 characters.",
        ));
    }
    Ok(())
}

/// Validate a username for provisioning: required, at most 150 characters.
///
/// # Errors
/// Returns [`CoreError::Validation`] scoped to the `username` field.
pub fn validate_username(username: &str) -> Result<(), CoreError> {
    if username.trim().is_empty() {
        return Err(CoreError::validation(
            "username",
            "Username must not be blank.",
        ));
    }
    if username.chars().count() > USERNAME_MAX_CHARS {
        return Err(CoreError::validation(
            "username",
            "Username must be at most 150 characters.",
        ));
    }
    Ok(())
}

/// Reject any status change away from `FINISHED`.
///
/// Every other transition is accepted, including `FINISHED -> FINISHED` and any
/// transition into `FINISHED`.
///
/// # Errors
/// Returns [`CoreError::Validation`] scoped to the `status` field.
pub fn validate_status_transition(
    current: TaskStatus,
    proposed: TaskStatus,
) -> Result<(), CoreError> {
    if current == TaskStatus::Finished && proposed != TaskStatus::Finished {
        return Err(CoreError::validation(
            "status",
            "You cannot change the status of a finished task.",
        ));
    }
    Ok(())
}

/// Reject attaching a task to a case that is not `OPEN`.
///
/// Applied at task creation and whenever the case reference is re-submitted on
/// update; existing tasks are not retroactively invalidated when a case closes.
///
/// # Errors
/// Returns [`CoreError::Validation`] scoped to the `case` field.
pub fn validate_case_assignment(status: CaseStatus) -> Result<(), CoreError> {
    if status != CaseStatus::Open {
        return Err(CoreError::validation(
            "case",
            "You cannot add task to closed case.",
        ));
    }
    Ok(())
}

/// Decide the `completed_date` value for a pending status write.
///
/// Returns `now` on the first transition into `FINISHED` (a task created
/// directly as `FINISHED` counts, with `current_status = None`); otherwise
/// passes the existing value through unchanged. The field is never cleared,
/// even if the status were to move away from `FINISHED`.
#[must_use]
pub fn derive_completed_date(
    current_status: Option<TaskStatus>,
    completed_date: Option<OffsetDateTime>,
    proposed_status: TaskStatus,
    now: OffsetDateTime,
) -> Option<OffsetDateTime> {
    if proposed_status == TaskStatus::Finished && current_status != Some(TaskStatus::Finished) {
        return Some(now);
    }
    completed_date
}
