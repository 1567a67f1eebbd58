use std::path::PathBuf;

use casetrack_auth::password;
use casetrack_auth::token::{self, TokenKind};
pub use casetrack_auth::token::TokenPair;
use casetrack_core::{
    derive_completed_date, validate_case_assignment, validate_description,
    validate_status_transition, validate_title, validate_username, CaseId, CaseRecord, CaseStatus,
    CoreError, TaskId, TaskRecord, TaskStatus, UserId, UserRecord,
};
use casetrack_store_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

const INVALID_TOKEN_MESSAGE: &str = "Token is invalid or expired";
const INVALID_CREDENTIALS_MESSAGE: &str = "No active account found with the given credentials";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    /// Covers both "does not exist" and "owned by someone else"; the two are
    /// deliberately indistinguishable so record existence never leaks.
    #[error("not found")]
    NotFound,

    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: &'static str,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let CoreError::Validation { field, message } = err;
        Self::Validation { field, message }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// The authenticated caller, passed explicitly into every operation.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessTokenResponse {
    pub access: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCaseRequest {
    pub title: String,
    #[serde(default)]
    pub status: CaseStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCaseRequest {
    pub title: Option<String>,
    pub status: Option<CaseStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub case: CaseId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub case: Option<CaseId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone)]
pub struct CaseTrackApi {
    db_path: PathBuf,
    jwt_secret: String,
}

impl CaseTrackApi {
    #[must_use]
    pub fn new(db_path: PathBuf, jwt_secret: String) -> Self {
        Self { db_path, jwt_secret }
    }

    fn open_store(&self) -> ApiResult<SqliteStore> {
        let mut store = SqliteStore::open(&self.db_path)?;
        store.migrate()?;
        Ok(store)
    }

    /// Provision one user. Not exposed over HTTP; reached through the CLI.
    ///
    /// # Errors
    /// Returns a field-scoped validation error for a blank, oversized, or
    /// duplicate username.
    pub fn create_user(&self, username: &str, raw_password: &str) -> ApiResult<UserRecord> {
        validate_username(username)?;

        let mut store = self.open_store()?;
        if store.find_user_by_username(username)?.is_some() {
            return Err(ApiError::Validation {
                field: "username",
                message: "A user with that username already exists.",
            });
        }

        let password_hash = password::hash_password(raw_password)
            .map_err(|err| ApiError::Internal(anyhow::anyhow!(err)))?;
        let user = store.insert_user(username, &password_hash, OffsetDateTime::now_utc())?;

        info!(event = "user.created", user = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    /// Verify credentials and issue an access+refresh token pair.
    ///
    /// # Errors
    /// Returns [`ApiError::Unauthorized`] for an unknown username or a wrong
    /// password, with the same message for both.
    pub fn obtain_token_pair(&self, request: &TokenRequest) -> ApiResult<TokenPair> {
        let store = self.open_store()?;
        let user = store
            .find_user_by_username(&request.username)?
            .ok_or_else(|| ApiError::Unauthorized(INVALID_CREDENTIALS_MESSAGE.to_string()))?;

        let matches = password::verify_password(&request.password, &user.password_hash)
            .map_err(|err| ApiError::Internal(anyhow::anyhow!(err)))?;
        if !matches {
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS_MESSAGE.to_string()));
        }

        let pair = token::issue_token_pair(user.id, &user.username, &self.jwt_secret)
            .map_err(|err| ApiError::Internal(anyhow::anyhow!(err)))?;

        info!(event = "auth.token_issued", user = %user.id, "token pair issued");
        Ok(pair)
    }

    /// Exchange a refresh token for a fresh access token.
    ///
    /// # Errors
    /// Returns [`ApiError::Unauthorized`] for an expired, malformed, or
    /// non-refresh token.
    pub fn refresh_access_token(
        &self,
        request: &TokenRefreshRequest,
    ) -> ApiResult<AccessTokenResponse> {
        let claims = token::decode_token(&request.refresh, &self.jwt_secret, TokenKind::Refresh)
            .map_err(|_| ApiError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string()))?;
        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string()))?;

        let access = token::issue_token(TokenKind::Access, user_id, &claims.username, &self.jwt_secret)
            .map_err(|err| ApiError::Internal(anyhow::anyhow!(err)))?;
        Ok(AccessTokenResponse { access })
    }

    /// Verify a bearer access token and resolve the caller it names.
    ///
    /// Stateless: signature, expiry, and kind are checked without a database
    /// lookup.
    ///
    /// # Errors
    /// Returns [`ApiError::Unauthorized`] when the token does not verify.
    pub fn verify_access_token(&self, bearer_token: &str) -> ApiResult<Caller> {
        let claims = token::decode_token(bearer_token, &self.jwt_secret, TokenKind::Access)
            .map_err(|_| ApiError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string()))?;
        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string()))?;

        Ok(Caller { user_id, username: claims.username })
    }

    /// List the caller's cases in persisted insertion order.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn list_cases(&self, caller: &Caller) -> ApiResult<Vec<CaseRecord>> {
        let store = self.open_store()?;
        Ok(store.list_cases(caller.user_id)?)
    }

    /// Create a case owned by the caller.
    ///
    /// # Errors
    /// Returns a field-scoped validation error for a blank or oversized title.
    pub fn create_case(&self, caller: &Caller, request: CreateCaseRequest) -> ApiResult<CaseRecord> {
        validate_title(&request.title)?;

        let mut store = self.open_store()?;
        let case = store.insert_case(
            caller.user_id,
            &request.title,
            request.status,
            OffsetDateTime::now_utc(),
        )?;

        info!(event = "case.created", case = %case.pk, owner = %caller.user_id, "case created");
        Ok(case)
    }

    /// Retrieve one of the caller's cases.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] for a missing or foreign-owned case.
    pub fn get_case(&self, caller: &Caller, id: CaseId) -> ApiResult<CaseRecord> {
        let store = self.open_store()?;
        assert_case_accessible(&store, caller, id)
    }

    /// Apply a partial update to one of the caller's cases.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] for a missing or foreign-owned case and
    /// a validation error for a bad title.
    pub fn update_case(
        &self,
        caller: &Caller,
        id: CaseId,
        request: UpdateCaseRequest,
    ) -> ApiResult<CaseRecord> {
        let mut store = self.open_store()?;
        let mut case = assert_case_accessible(&store, caller, id)?;

        if let Some(title) = request.title {
            validate_title(&title)?;
            case.title = title;
        }
        if let Some(status) = request.status {
            case.status = status;
        }

        store.update_case(&case)?;
        info!(event = "case.updated", case = %case.pk, owner = %caller.user_id, "case updated");
        Ok(case)
    }

    /// Delete one of the caller's cases, cascading to its tasks.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] for a missing or foreign-owned case.
    pub fn delete_case(&self, caller: &Caller, id: CaseId) -> ApiResult<()> {
        let mut store = self.open_store()?;
        let case = assert_case_accessible(&store, caller, id)?;

        store.delete_case(case.pk)?;
        info!(event = "case.deleted", case = %case.pk, owner = %caller.user_id, "case deleted");
        Ok(())
    }

    /// List the caller's tasks in persisted insertion order.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn list_tasks(&self, caller: &Caller) -> ApiResult<Vec<TaskRecord>> {
        let store = self.open_store()?;
        Ok(store.list_tasks(caller.user_id)?)
    }

    /// Create a task owned by the caller against an open case.
    ///
    /// The referenced case is resolved without an ownership check; only the
    /// open-status rule gates the assignment.
    ///
    /// # Errors
    /// Returns field-scoped validation errors for bad title/description, a
    /// missing case, or a closed case.
    pub fn create_task(&self, caller: &Caller, request: CreateTaskRequest) -> ApiResult<TaskRecord> {
        validate_title(&request.title)?;
        validate_description(&request.description)?;

        let mut store = self.open_store()?;
        let case = resolve_case(&store, request.case)?;
        validate_case_assignment(case.status)?;

        let now = OffsetDateTime::now_utc();
        let completed_date = derive_completed_date(None, None, request.status, now);
        let task = store.insert_task(
            caller.user_id,
            case.pk,
            &request.title,
            &request.description,
            request.status,
            now,
            completed_date,
        )?;

        info!(
            event = "task.created",
            task = %task.pk,
            case = %task.case,
            owner = %caller.user_id,
            "task created"
        );
        Ok(task)
    }

    /// Retrieve one of the caller's tasks.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] for a missing or foreign-owned task.
    pub fn get_task(&self, caller: &Caller, id: TaskId) -> ApiResult<TaskRecord> {
        let store = self.open_store()?;
        assert_task_accessible(&store, caller, id)
    }

    /// Apply a partial update to one of the caller's tasks.
    ///
    /// A submitted `status` runs the finished-task transition rule and the
    /// completed-date derivation; a submitted `case` is re-validated against
    /// the open-status rule. Omitted fields stay untouched and unvalidated.
    /// `last_updated_date` refreshes on every successful write.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] for a missing or foreign-owned task and
    /// field-scoped validation errors per the rules above.
    pub fn update_task(
        &self,
        caller: &Caller,
        id: TaskId,
        request: UpdateTaskRequest,
    ) -> ApiResult<TaskRecord> {
        let mut store = self.open_store()?;
        let mut task = assert_task_accessible(&store, caller, id)?;

        if let Some(case_id) = request.case {
            let case = resolve_case(&store, case_id)?;
            validate_case_assignment(case.status)?;
            task.case = case.pk;
        }
        if let Some(title) = request.title {
            validate_title(&title)?;
            task.title = title;
        }
        if let Some(description) = request.description {
            validate_description(&description)?;
            task.description = description;
        }

        let now = OffsetDateTime::now_utc();
        if let Some(status) = request.status {
            validate_status_transition(task.status, status)?;
            task.completed_date =
                derive_completed_date(Some(task.status), task.completed_date, status, now);
            task.status = status;
        }
        task.last_updated_date = now;

        store.update_task(&task)?;
        info!(event = "task.updated", task = %task.pk, owner = %caller.user_id, "task updated");
        Ok(task)
    }

    /// Delete one of the caller's tasks.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] for a missing or foreign-owned task.
    pub fn delete_task(&self, caller: &Caller, id: TaskId) -> ApiResult<()> {
        let mut store = self.open_store()?;
        let task = assert_task_accessible(&store, caller, id)?;

        store.delete_task(task.pk)?;
        info!(event = "task.deleted", task = %task.pk, owner = %caller.user_id, "task deleted");
        Ok(())
    }
}

fn assert_case_accessible(
    store: &SqliteStore,
    caller: &Caller,
    id: CaseId,
) -> ApiResult<CaseRecord> {
    match store.get_case(id)? {
        Some(case) if case.owner == caller.user_id => Ok(case),
        _ => Err(ApiError::NotFound),
    }
}

fn assert_task_accessible(
    store: &SqliteStore,
    caller: &Caller,
    id: TaskId,
) -> ApiResult<TaskRecord> {
    match store.get_task(id)? {
        Some(task) if task.owner == caller.user_id => Ok(task),
        _ => Err(ApiError::NotFound),
    }
}

fn resolve_case(store: &SqliteStore, id: CaseId) -> ApiResult<CaseRecord> {
    store.get_case(id)?.ok_or(ApiError::Validation {
        field: "case",
        message: "Case does not exist.",
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    fn unique_temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("casetrack-api-{}.sqlite3", ulid::Ulid::new()))
    }

    fn test_api(db_path: &std::path::Path) -> CaseTrackApi {
        CaseTrackApi::new(db_path.to_path_buf(), "test-secret".to_string())
    }

    fn signup(api: &CaseTrackApi, username: &str) -> Result<Caller> {
        let user = api.create_user(username, "testpassword")?;
        Ok(Caller { user_id: user.id, username: user.username })
    }

    fn assert_field_error<T: std::fmt::Debug>(
        result: ApiResult<T>,
        expected_field: &str,
        expected_message: &str,
    ) {
        match result {
            Err(ApiError::Validation { field, message }) => {
                assert_eq!(field, expected_field);
                assert_eq!(message, expected_message);
            }
            other => panic!("expected validation error on `{expected_field}`, got {other:?}"),
        }
    }

    // Test IDs: TAPI-001
    #[test]
    fn users_cannot_reach_each_others_cases() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        let alice = signup(&api, "alice")?;
        let bob = signup(&api, "bob")?;

        let case = api.create_case(
            &alice,
            CreateCaseRequest { title: "Open test case 1".to_string(), status: CaseStatus::Open },
        )?;

        assert!(api.list_cases(&bob)?.is_empty());
        assert!(matches!(api.get_case(&bob, case.pk), Err(ApiError::NotFound)));
        assert!(matches!(
            api.update_case(&bob, case.pk, UpdateCaseRequest::default()),
            Err(ApiError::NotFound)
        ));
        assert!(matches!(api.delete_case(&bob, case.pk), Err(ApiError::NotFound)));

        let listed = api.list_cases(&alice)?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Open test case 1");
        assert_eq!(listed[0].status, CaseStatus::Open);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-002
    #[test]
    fn users_cannot_reach_each_others_tasks() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        let alice = signup(&api, "alice")?;
        let bob = signup(&api, "bob")?;

        let case = api.create_case(
            &alice,
            CreateCaseRequest { title: "Test case".to_string(), status: CaseStatus::Open },
        )?;
        let task = api.create_task(
            &alice,
            CreateTaskRequest {
                case: case.pk,
                title: "New test task 1".to_string(),
                description: "New test task description 1".to_string(),
                status: TaskStatus::Created,
            },
        )?;

        assert!(api.list_tasks(&bob)?.is_empty());
        assert!(matches!(api.get_task(&bob, task.pk), Err(ApiError::NotFound)));
        assert!(matches!(
            api.update_task(&bob, task.pk, UpdateTaskRequest::default()),
            Err(ApiError::NotFound)
        ));
        assert!(matches!(api.delete_task(&bob, task.pk), Err(ApiError::NotFound)));
        assert_eq!(api.list_tasks(&alice)?.len(), 1);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-003
    #[test]
    fn closed_case_rejects_new_tasks_and_creates_no_record() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        let caller = signup(&api, "testuser")?;

        let case = api.create_case(
            &caller,
            CreateCaseRequest { title: "Test case".to_string(), status: CaseStatus::Open },
        )?;
        api.create_task(
            &caller,
            CreateTaskRequest {
                case: case.pk,
                title: "T".to_string(),
                description: "D".to_string(),
                status: TaskStatus::Created,
            },
        )?;

        api.update_case(
            &caller,
            case.pk,
            UpdateCaseRequest { title: None, status: Some(CaseStatus::Closed) },
        )?;

        assert_field_error(
            api.create_task(
                &caller,
                CreateTaskRequest {
                    case: case.pk,
                    title: "Test task created for closed case".to_string(),
                    description: "This test task should not be created.".to_string(),
                    status: TaskStatus::Created,
                },
            ),
            "case",
            "You cannot add task to closed case.",
        );
        assert_eq!(api.list_tasks(&caller)?.len(), 1);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-004
    #[test]
    fn finished_task_status_cannot_change() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        let caller = signup(&api, "testuser")?;

        let case = api.create_case(
            &caller,
            CreateCaseRequest { title: "Test case".to_string(), status: CaseStatus::Open },
        )?;
        let task = api.create_task(
            &caller,
            CreateTaskRequest {
                case: case.pk,
                title: "New test task 1".to_string(),
                description: "New test task description 1".to_string(),
                status: TaskStatus::Created,
            },
        )?;

        let finished = api.update_task(
            &caller,
            task.pk,
            UpdateTaskRequest { status: Some(TaskStatus::Finished), ..UpdateTaskRequest::default() },
        )?;
        assert_eq!(finished.status, TaskStatus::Finished);

        assert_field_error(
            api.update_task(
                &caller,
                task.pk,
                UpdateTaskRequest {
                    status: Some(TaskStatus::Created),
                    ..UpdateTaskRequest::default()
                },
            ),
            "status",
            "You cannot change the status of a finished task.",
        );
        assert_eq!(api.get_task(&caller, task.pk)?.status, TaskStatus::Finished);

        // Title and description stay mutable after the lock engages.
        let renamed = api.update_task(
            &caller,
            task.pk,
            UpdateTaskRequest {
                title: Some("Renamed finished task".to_string()),
                ..UpdateTaskRequest::default()
            },
        )?;
        assert_eq!(renamed.title, "Renamed finished task");
        assert_eq!(renamed.status, TaskStatus::Finished);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-005
    #[test]
    fn completed_date_is_set_exactly_once() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        let caller = signup(&api, "testuser")?;

        let case = api.create_case(
            &caller,
            CreateCaseRequest { title: "Test case".to_string(), status: CaseStatus::Open },
        )?;
        let task = api.create_task(
            &caller,
            CreateTaskRequest {
                case: case.pk,
                title: "New test task 1".to_string(),
                description: "New test task description 1".to_string(),
                status: TaskStatus::Created,
            },
        )?;
        assert!(task.completed_date.is_none());

        let finished = api.update_task(
            &caller,
            task.pk,
            UpdateTaskRequest { status: Some(TaskStatus::Finished), ..UpdateTaskRequest::default() },
        )?;
        let completed_date = match finished.completed_date {
            Some(value) => value,
            None => panic!("first finish should set completed_date"),
        };

        let refreshed = api.update_task(
            &caller,
            task.pk,
            UpdateTaskRequest { status: Some(TaskStatus::Finished), ..UpdateTaskRequest::default() },
        )?;
        assert_eq!(refreshed.completed_date, Some(completed_date));

        // Created directly as FINISHED also counts as the first finish.
        let direct = api.create_task(
            &caller,
            CreateTaskRequest {
                case: case.pk,
                title: "Already finished".to_string(),
                description: "Done on arrival".to_string(),
                status: TaskStatus::Finished,
            },
        )?;
        assert!(direct.completed_date.is_some());

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-006
    #[test]
    fn deleting_a_case_deletes_its_tasks() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        let caller = signup(&api, "testuser")?;

        let case = api.create_case(
            &caller,
            CreateCaseRequest { title: "Test case".to_string(), status: CaseStatus::Open },
        )?;
        for n in 1..=2 {
            api.create_task(
                &caller,
                CreateTaskRequest {
                    case: case.pk,
                    title: format!("Task {n}"),
                    description: "cascade fixture".to_string(),
                    status: TaskStatus::Created,
                },
            )?;
        }
        assert_eq!(api.list_tasks(&caller)?.len(), 2);

        api.delete_case(&caller, case.pk)?;
        assert!(matches!(api.get_case(&caller, case.pk), Err(ApiError::NotFound)));
        assert!(api.list_tasks(&caller)?.is_empty());

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-007
    #[test]
    fn token_pair_flow_round_trips() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        let caller = signup(&api, "testuser")?;

        let pair = api.obtain_token_pair(&TokenRequest {
            username: "testuser".to_string(),
            password: "testpassword".to_string(),
        })?;

        let verified = api.verify_access_token(&pair.access)?;
        assert_eq!(verified.user_id, caller.user_id);
        assert_eq!(verified.username, "testuser");

        let refreshed =
            api.refresh_access_token(&TokenRefreshRequest { refresh: pair.refresh.clone() })?;
        assert_eq!(api.verify_access_token(&refreshed.access)?.user_id, caller.user_id);

        // A refresh token is not an access token, and vice versa.
        assert!(matches!(
            api.verify_access_token(&pair.refresh),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            api.refresh_access_token(&TokenRefreshRequest { refresh: pair.access }),
            Err(ApiError::Unauthorized(_))
        ));

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-008
    #[test]
    fn bad_credentials_are_rejected_uniformly() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        signup(&api, "testuser")?;

        for (username, password) in [("testuser", "wrong"), ("nosuchuser", "testpassword")] {
            match api.obtain_token_pair(&TokenRequest {
                username: username.to_string(),
                password: password.to_string(),
            }) {
                Err(ApiError::Unauthorized(message)) => {
                    assert_eq!(message, "No active account found with the given credentials");
                }
                other => panic!("expected unauthorized, got {other:?}"),
            }
        }

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-009
    #[test]
    fn duplicate_usernames_are_rejected() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        signup(&api, "testuser")?;

        assert_field_error(
            api.create_user("testuser", "anotherpassword"),
            "username",
            "A user with that username already exists.",
        );

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-010
    #[test]
    fn partial_task_update_leaves_omitted_fields_alone() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        let caller = signup(&api, "testuser")?;

        let case = api.create_case(
            &caller,
            CreateCaseRequest { title: "Test case".to_string(), status: CaseStatus::Open },
        )?;
        let task = api.create_task(
            &caller,
            CreateTaskRequest {
                case: case.pk,
                title: "New test task 1".to_string(),
                description: "New test task description 1".to_string(),
                status: TaskStatus::Created,
            },
        )?;

        let updated = api.update_task(
            &caller,
            task.pk,
            UpdateTaskRequest {
                description: Some("Updated description".to_string()),
                ..UpdateTaskRequest::default()
            },
        )?;
        assert_eq!(updated.description, "Updated description");
        assert_eq!(updated.title, "New test task 1");
        assert_eq!(updated.status, TaskStatus::Created);
        assert_eq!(updated.case, case.pk);
        assert_eq!(updated.creation_date, task.creation_date);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-011
    #[test]
    fn resubmitted_case_reference_is_revalidated() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        let caller = signup(&api, "testuser")?;

        let open_case = api.create_case(
            &caller,
            CreateCaseRequest { title: "Open case".to_string(), status: CaseStatus::Open },
        )?;
        let closed_case = api.create_case(
            &caller,
            CreateCaseRequest { title: "Closed case".to_string(), status: CaseStatus::Closed },
        )?;
        let task = api.create_task(
            &caller,
            CreateTaskRequest {
                case: open_case.pk,
                title: "Movable task".to_string(),
                description: "reassignment fixture".to_string(),
                status: TaskStatus::Created,
            },
        )?;

        assert_field_error(
            api.update_task(
                &caller,
                task.pk,
                UpdateTaskRequest { case: Some(closed_case.pk), ..UpdateTaskRequest::default() },
            ),
            "case",
            "You cannot add task to closed case.",
        );
        assert_field_error(
            api.update_task(
                &caller,
                task.pk,
                UpdateTaskRequest { case: Some(CaseId(999)), ..UpdateTaskRequest::default() },
            ),
            "case",
            "Case does not exist.",
        );

        // A write that omits the case field leaves it unchanged and unvalidated.
        let renamed = api.update_task(
            &caller,
            task.pk,
            UpdateTaskRequest {
                title: Some("Still attached".to_string()),
                ..UpdateTaskRequest::default()
            },
        )?;
        assert_eq!(renamed.case, open_case.pk);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-012
    #[test]
    fn blank_titles_are_rejected() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = test_api(&db_path);
        let caller = signup(&api, "testuser")?;

        assert_field_error(
            api.create_case(
                &caller,
                CreateCaseRequest { title: "  ".to_string(), status: CaseStatus::Open },
            ),
            "title",
            "Title must not be blank.",
        );
        assert!(api.list_cases(&caller)?.is_empty());

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }
}
