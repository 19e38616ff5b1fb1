//! The storage contract used by the RPC controller, and its SQLite backend.

use serde_json::Value;
use tracing::{info, instrument};

use tally_core::{Activity, NewActivity, NewProject, Project};

use crate::activities::ActivityRepo;
use crate::database::Database;
use crate::error::StoreError;
use crate::projects::ProjectRepo;
use crate::schema;

/// Result of [`Storage::start_activity`].
#[derive(Debug)]
pub enum StartOutcome {
    /// The new running activity, with its assigned id.
    Started(Activity),
    /// Another activity is running; nothing was inserted.
    AlreadyRunning,
    /// The insert did not happen.
    Failed(StoreError),
}

impl From<Result<Option<Activity>, StoreError>> for StartOutcome {
    fn from(result: Result<Option<Activity>, StoreError>) -> Self {
        match result {
            Ok(Some(activity)) => Self::Started(activity),
            Ok(None) => Self::AlreadyRunning,
            Err(e) => Self::Failed(e),
        }
    }
}

/// Result of [`Storage::stop_activity`].
#[derive(Debug)]
pub enum StopOutcome {
    /// The activity as stopped.
    Stopped(Activity),
    /// No activity was running; nothing was updated.
    NotRunning,
    /// The update did not apply.
    Failed(StoreError),
}

impl From<Result<Option<Activity>, StoreError>> for StopOutcome {
    fn from(result: Result<Option<Activity>, StoreError>) -> Self {
        match result {
            Ok(Some(activity)) => Self::Stopped(activity),
            Ok(None) => Self::NotRunning,
            Err(e) => Self::Failed(e),
        }
    }
}

/// Persistence of projects and activities.
///
/// Implementations guarantee that at most one activity is running at any
/// time. Filters passed to the select/remove operations are opaque.
pub trait Storage: Send + Sync {
    /// `0` before [`Storage::create_schema`] has run.
    fn schema_version(&self) -> Result<u32, StoreError>;

    /// Create tables and set the version marker. Safe to call repeatedly.
    fn create_schema(&self) -> Result<(), StoreError>;

    /// Delete every activity and project.
    fn empty_storage(&self) -> Result<(), StoreError>;

    /// The activity whose `Stopped` is unset, if any.
    fn running_activity(&self) -> Result<Option<Activity>, StoreError>;

    /// Whether [`Storage::running_activity`] finds one.
    fn is_running_activity(&self) -> Result<bool, StoreError> {
        Ok(self.running_activity()?.is_some())
    }

    /// Insert `draft` as the running activity unless one is already running.
    /// The check and the insert are atomic.
    fn start_activity(&self, draft: NewActivity) -> StartOutcome;

    /// Stop the running activity at the current time.
    fn stop_activity(&self) -> StopOutcome;

    /// Overwrite a stored activity by id.
    fn update_activity(&self, activity: &Activity) -> Result<Activity, StoreError>;

    /// Insert a project and return it with its id.
    fn insert_project(&self, draft: NewProject) -> Result<Project, StoreError>;

    /// Update name and description of a stored project.
    fn update_project(&self, project: &Project) -> Result<Project, StoreError>;

    /// Activities matching `filter`.
    fn select_activity(&self, filter: &Value) -> Result<Vec<Activity>, StoreError>;

    /// Projects matching `filter`.
    fn select_project(&self, filter: &Value) -> Result<Vec<Project>, StoreError>;

    /// Delete matching activities and return how many went.
    fn remove_activity(&self, filter: &Value, options: &Value) -> Result<usize, StoreError>;

    /// Delete matching projects and return how many went.
    fn remove_project(&self, filter: &Value, options: &Value) -> Result<usize, StoreError>;
}

/// [`Storage`] over a shared SQLite [`Database`] handle.
#[derive(Clone)]
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    /// Storage over `db`. Cheap; one per request is fine.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Direct access to the activity queries.
    pub fn activities(&self) -> ActivityRepo {
        ActivityRepo::new(self.db.clone())
    }

    /// Direct access to the project queries.
    pub fn projects(&self) -> ProjectRepo {
        ProjectRepo::new(self.db.clone())
    }
}

impl Storage for SqliteStorage {
    fn schema_version(&self) -> Result<u32, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
        })
    }

    #[instrument(skip(self))]
    fn create_schema(&self) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute_batch(schema::CREATE_TABLES)
                .map_err(|e| StoreError::Database(format!("schema: {e}")))?;
            conn.pragma_update(None, "user_version", schema::SCHEMA_VERSION)
                .map_err(|e| StoreError::Database(format!("schema version: {e}")))?;
            Ok(())
        })?;
        info!(version = schema::SCHEMA_VERSION, "schema ready");
        Ok(())
    }

    #[instrument(skip(self))]
    fn empty_storage(&self) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute_batch(schema::EMPTY_TABLES)?;
            Ok(())
        })
    }

    fn running_activity(&self) -> Result<Option<Activity>, StoreError> {
        self.activities().running()
    }

    fn start_activity(&self, draft: NewActivity) -> StartOutcome {
        self.activities().start(draft).into()
    }

    fn stop_activity(&self) -> StopOutcome {
        self.activities().stop().into()
    }

    fn update_activity(&self, activity: &Activity) -> Result<Activity, StoreError> {
        self.activities().update(activity)
    }

    fn insert_project(&self, draft: NewProject) -> Result<Project, StoreError> {
        self.projects().insert(draft)
    }

    fn update_project(&self, project: &Project) -> Result<Project, StoreError> {
        self.projects().update(project)
    }

    fn select_activity(&self, filter: &Value) -> Result<Vec<Activity>, StoreError> {
        self.activities().select(filter)
    }

    fn select_project(&self, filter: &Value) -> Result<Vec<Project>, StoreError> {
        self.projects().select(filter)
    }

    fn remove_activity(&self, filter: &Value, options: &Value) -> Result<usize, StoreError> {
        self.activities().remove(filter, options)
    }

    fn remove_project(&self, filter: &Value, options: &Value) -> Result<usize, StoreError> {
        self.projects().remove(filter, options)
    }
}
