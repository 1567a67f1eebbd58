use std::path::Path;

use anyhow::{anyhow, Context, Result};
use casetrack_core::{
    CaseId, CaseRecord, CaseStatus, TaskId, TaskRecord, TaskStatus, UserId, UserRecord,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  username TEXT NOT NULL UNIQUE,
  password_hash TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cases (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  owner_id INTEGER NOT NULL,
  title TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('OPEN','CLOSED')),
  created_at TEXT NOT NULL,
  FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS tasks (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  owner_id INTEGER NOT NULL,
  case_id INTEGER NOT NULL,
  title TEXT NOT NULL,
  description TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('CREATED','IN_PROGRESS','FINISHED')),
  creation_date TEXT NOT NULL,
  last_updated_date TEXT NOT NULL,
  completed_date TEXT,
  FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE,
  FOREIGN KEY (case_id) REFERENCES cases(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cases_owner ON cases(owner_id);
CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner_id);
CREATE INDEX IF NOT EXISTS idx_tasks_case ON tasks(case_id);
";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

impl SqliteStore {
    /// Open a SQLite-backed record store and configure required runtime pragmas.
    ///
    /// `foreign_keys = ON` is what makes case deletion cascade to tasks.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be
    /// applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step
    /// fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version == 0 {
            self.apply_migration_1()?;
            version = current_schema_version(&self.conn)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    fn apply_migration_1(&mut self) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start migration v1 transaction")?;
        tx.execute_batch(MIGRATION_001_SQL).context("failed to create v1 tables")?;
        tx.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            params![1_i64, now_rfc3339()?],
        )
        .context("failed to record migration version 1")?;
        tx.commit().context("failed to commit migration v1")?;
        Ok(())
    }

    /// Insert one user row. The username column is UNIQUE; inserting a
    /// duplicate fails.
    ///
    /// # Errors
    /// Returns an error when the insert fails, including on a duplicate
    /// username.
    pub fn insert_user(
        &mut self,
        username: &str,
        password_hash: &str,
        created_at: OffsetDateTime,
    ) -> Result<UserRecord> {
        self.conn
            .execute(
                "INSERT INTO users(username, password_hash, created_at) VALUES (?1, ?2, ?3)",
                params![username, password_hash, rfc3339(created_at)?],
            )
            .context("failed to insert user")?;

        Ok(UserRecord {
            id: UserId(self.conn.last_insert_rowid()),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }

    /// Look up a user by username.
    ///
    /// # Errors
    /// Returns an error when the row cannot be read or decoded.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
        )?;
        let row = stmt
            .query_row(params![username], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .optional()?;

        match row {
            Some((id, username, password_hash, created_at)) => Ok(Some(UserRecord {
                id: UserId(id),
                username,
                password_hash,
                created_at: parse_rfc3339(&created_at)?,
            })),
            None => Ok(None),
        }
    }

    /// Load all users in insertion order.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_users(&self) -> Result<Vec<UserRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, password_hash, created_at FROM users ORDER BY id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();

        while let Some(row) = rows.next()? {
            let created_at: String = row.get(3)?;
            users.push(UserRecord {
                id: UserId(row.get(0)?),
                username: row.get(1)?,
                password_hash: row.get(2)?,
                created_at: parse_rfc3339(&created_at)?,
            });
        }

        Ok(users)
    }

    /// Insert one case row.
    ///
    /// # Errors
    /// Returns an error when the insert fails.
    pub fn insert_case(
        &mut self,
        owner: UserId,
        title: &str,
        status: CaseStatus,
        created_at: OffsetDateTime,
    ) -> Result<CaseRecord> {
        self.conn
            .execute(
                "INSERT INTO cases(owner_id, title, status, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![owner.0, title, status.as_str(), rfc3339(created_at)?],
            )
            .context("failed to insert case")?;

        Ok(CaseRecord {
            pk: CaseId(self.conn.last_insert_rowid()),
            owner,
            title: title.to_string(),
            status,
            tasks: Vec::new(),
        })
    }

    /// Load one case by id, with its tasks in insertion order.
    ///
    /// The lookup is identity-agnostic; ownership is enforced by the caller.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn get_case(&self, id: CaseId) -> Result<Option<CaseRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, owner_id, title, status FROM cases WHERE id = ?1")?;
        let row = stmt
            .query_row(params![id.0], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .optional()?;

        match row {
            Some((id, owner, title, status)) => {
                let pk = CaseId(id);
                Ok(Some(CaseRecord {
                    pk,
                    owner: UserId(owner),
                    title,
                    status: parse_case_status(&status)?,
                    tasks: self.tasks_for_case(pk)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Load all cases owned by one user, in persisted insertion order, each
    /// with its tasks loaded.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_cases(&self, owner: UserId) -> Result<Vec<CaseRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner_id, title, status FROM cases WHERE owner_id = ?1 ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![owner.0])?;
        let mut cases = Vec::new();

        while let Some(row) = rows.next()? {
            let pk = CaseId(row.get::<_, i64>(0)?);
            let status_raw: String = row.get(3)?;
            cases.push(CaseRecord {
                pk,
                owner: UserId(row.get(1)?),
                title: row.get(2)?,
                status: parse_case_status(&status_raw)?,
                tasks: self.tasks_for_case(pk)?,
            });
        }

        Ok(cases)
    }

    /// Persist a pre-validated case field set (title, status).
    ///
    /// # Errors
    /// Returns an error when the write fails.
    pub fn update_case(&mut self, case: &CaseRecord) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cases SET title = ?2, status = ?3 WHERE id = ?1",
                params![case.pk.0, case.title, case.status.as_str()],
            )
            .context("failed to update case")?;
        Ok(())
    }

    /// Delete one case; its tasks go with it via the cascading foreign key.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub fn delete_case(&mut self, id: CaseId) -> Result<()> {
        self.conn
            .execute("DELETE FROM cases WHERE id = ?1", params![id.0])
            .context("failed to delete case")?;
        Ok(())
    }

    /// Insert one task row. `last_updated_date` starts equal to
    /// `creation_date`.
    ///
    /// # Errors
    /// Returns an error when the insert fails, including when the referenced
    /// case does not exist.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_task(
        &mut self,
        owner: UserId,
        case: CaseId,
        title: &str,
        description: &str,
        status: TaskStatus,
        creation_date: OffsetDateTime,
        completed_date: Option<OffsetDateTime>,
    ) -> Result<TaskRecord> {
        self.conn
            .execute(
                "INSERT INTO tasks(
                    owner_id, case_id, title, description, status,
                    creation_date, last_updated_date, completed_date
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    owner.0,
                    case.0,
                    title,
                    description,
                    status.as_str(),
                    rfc3339(creation_date)?,
                    rfc3339(creation_date)?,
                    completed_date.map(rfc3339).transpose()?,
                ],
            )
            .context("failed to insert task")?;

        Ok(TaskRecord {
            pk: TaskId(self.conn.last_insert_rowid()),
            owner,
            case,
            title: title.to_string(),
            description: description.to_string(),
            status,
            creation_date,
            last_updated_date: creation_date,
            completed_date,
        })
    }

    /// Load one task by id. Identity-agnostic, like [`SqliteStore::get_case`].
    ///
    /// # Errors
    /// Returns an error when the row cannot be read or decoded.
    pub fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL} WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![id.0])?;

        match rows.next()? {
            Some(row) => Ok(Some(task_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Load all tasks owned by one user, in persisted insertion order.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_tasks(&self, owner: UserId) -> Result<Vec<TaskRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL} WHERE owner_id = ?1 ORDER BY id ASC"
        ))?;
        let mut rows = stmt.query(params![owner.0])?;
        let mut tasks = Vec::new();

        while let Some(row) = rows.next()? {
            tasks.push(task_from_row(row)?);
        }

        Ok(tasks)
    }

    /// Load all tasks attached to one case, in persisted insertion order.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn tasks_for_case(&self, case: CaseId) -> Result<Vec<TaskRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL} WHERE case_id = ?1 ORDER BY id ASC"
        ))?;
        let mut rows = stmt.query(params![case.0])?;
        let mut tasks = Vec::new();

        while let Some(row) = rows.next()? {
            tasks.push(task_from_row(row)?);
        }

        Ok(tasks)
    }

    /// Persist a pre-validated task field set (case, title, description,
    /// status, dates).
    ///
    /// # Errors
    /// Returns an error when the write fails.
    pub fn update_task(&mut self, task: &TaskRecord) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tasks SET
                    case_id = ?2, title = ?3, description = ?4, status = ?5,
                    last_updated_date = ?6, completed_date = ?7
                 WHERE id = ?1",
                params![
                    task.pk.0,
                    task.case.0,
                    task.title,
                    task.description,
                    task.status.as_str(),
                    rfc3339(task.last_updated_date)?,
                    task.completed_date.map(rfc3339).transpose()?,
                ],
            )
            .context("failed to update task")?;
        Ok(())
    }

    /// Delete one task row.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub fn delete_task(&mut self, id: TaskId) -> Result<()> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.0])
            .context("failed to delete task")?;
        Ok(())
    }
}

const TASK_SELECT_SQL: &str = "SELECT
    id, owner_id, case_id, title, description, status,
    creation_date, last_updated_date, completed_date
 FROM tasks";

fn task_from_row(row: &rusqlite::Row<'_>) -> Result<TaskRecord> {
    let status_raw: String = row.get(5)?;
    let creation_date: String = row.get(6)?;
    let last_updated_date: String = row.get(7)?;
    let completed_date: Option<String> = row.get(8)?;

    Ok(TaskRecord {
        pk: TaskId(row.get(0)?),
        owner: UserId(row.get(1)?),
        case: CaseId(row.get(2)?),
        title: row.get(3)?,
        description: row.get(4)?,
        status: parse_task_status(&status_raw)?,
        creation_date: parse_rfc3339(&creation_date)?,
        last_updated_date: parse_rfc3339(&last_updated_date)?,
        completed_date: completed_date.as_deref().map(parse_rfc3339).transpose()?,
    })
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .context("failed to read schema version")
}

fn parse_case_status(value: &str) -> Result<CaseStatus> {
    CaseStatus::parse(value).ok_or_else(|| anyhow!("unknown case status: {value}"))
}

fn parse_task_status(value: &str) -> Result<TaskStatus> {
    TaskStatus::parse(value).ok_or_else(|| anyhow!("unknown task status: {value}"))
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value.format(&Rfc3339).context("failed to format timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).with_context(|| format!("invalid timestamp: {value}"))
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}
