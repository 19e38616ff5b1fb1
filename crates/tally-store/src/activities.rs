//! Activity rows and the running-activity lifecycle.

use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, info, instrument};

use tally_core::timestamp;
use tally_core::{Activity, NewActivity};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const COLUMNS: &str = "ActivityId, ProjectId, Name, Description, Tags, Started, Stopped";

/// Queries over the `Activities` table.
pub struct ActivityRepo {
    db: Database,
}

impl ActivityRepo {
    /// Repo over a shared database handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The activity whose `Stopped` is empty, if any.
    #[instrument(skip(self))]
    pub fn running(&self) -> Result<Option<Activity>, StoreError> {
        self.db.with_conn(running_in)
    }

    /// Insert a running activity unless one is already running.
    ///
    /// Returns `Ok(None)` when another activity is running. The check and the
    /// insert share one immediate transaction.
    #[instrument(skip(self, draft), fields(project_id = draft.project_id))]
    pub fn start(&self, draft: NewActivity) -> Result<Option<Activity>, StoreError> {
        self.db.with_transaction(|tx| {
            if let Some(running) = running_in(tx)? {
                debug!(activity_id = running.activity_id, "activity already running");
                return Ok(None);
            }

            let started = timestamp::now();
            let _ = tx.execute(
                "INSERT INTO Activities (ProjectId, Name, Description, Tags, Started, Stopped)
                 VALUES (?1, ?2, ?3, ?4, ?5, '')",
                rusqlite::params![
                    draft.project_id,
                    draft.name,
                    draft.description,
                    draft.tags,
                    timestamp::format(&started),
                ],
            )?;

            let activity = draft.into_activity(tx.last_insert_rowid(), started);
            info!(activity_id = activity.activity_id, "activity started");
            Ok(Some(activity))
        })
    }

    /// Stop the running activity. Returns `Ok(None)` when nothing is running.
    #[instrument(skip(self))]
    pub fn stop(&self) -> Result<Option<Activity>, StoreError> {
        self.db.with_transaction(|tx| {
            let Some(running) = running_in(tx)? else {
                return Ok(None);
            };

            let stopped = running.with_stopped(timestamp::now());
            update_in(tx, &stopped)?;
            info!(activity_id = stopped.activity_id, "activity stopped");
            Ok(Some(stopped))
        })
    }

    /// Persist every field of an existing activity.
    #[instrument(skip(self, activity), fields(activity_id = activity.activity_id))]
    pub fn update(&self, activity: &Activity) -> Result<Activity, StoreError> {
        self.db.with_conn(|conn| update_in(conn, activity))?;
        Ok(activity.clone())
    }

    /// Get an activity by ID.
    #[instrument(skip(self))]
    pub fn get(&self, activity_id: i64) -> Result<Activity, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM Activities WHERE ActivityId = ?1"))?;
            let mut rows = stmt.query([activity_id])?;
            match rows.next()? {
                Some(row) => row_to_activity(row),
                None => Err(StoreError::NotFound(format!("activity {activity_id}"))),
            }
        })
    }

    /// Number of activity rows, running or not.
    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM Activities", [], |row| row.get(0))?)
        })
    }

    // TODO: define a filter grammar (project, tag, date range) for select/remove.
    /// Rows matching `filter`. Filtering is not supported yet, so always empty.
    pub fn select(&self, filter: &Value) -> Result<Vec<Activity>, StoreError> {
        debug!(%filter, "activity filtering is not supported, returning no rows");
        Ok(Vec::new())
    }

    /// Delete rows matching `filter`. Not supported yet; removes nothing.
    pub fn remove(&self, filter: &Value, options: &Value) -> Result<usize, StoreError> {
        debug!(%filter, %options, "activity removal is not supported, nothing removed");
        Ok(0)
    }
}

fn running_in(conn: &Connection) -> Result<Option<Activity>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM Activities
         WHERE Stopped IS NULL OR Stopped = ''
         ORDER BY ActivityId DESC LIMIT 1"
    ))?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => row_to_activity(row).map(Some),
        None => Ok(None),
    }
}

fn update_in(conn: &Connection, activity: &Activity) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE Activities SET
            ProjectId = ?1,
            Name = ?2,
            Description = ?3,
            Tags = ?4,
            Started = ?5,
            Stopped = ?6
         WHERE ActivityId = ?7",
        rusqlite::params![
            activity.project_id,
            activity.name,
            activity.description,
            activity.tags,
            timestamp::format(&activity.started),
            activity.stopped.as_ref().map(timestamp::format).unwrap_or_default(),
            activity.activity_id,
        ],
    )?;

    if changed == 0 {
        return Err(StoreError::NotFound(format!("activity {}", activity.activity_id)));
    }
    Ok(())
}

fn row_to_activity(row: &rusqlite::Row<'_>) -> Result<Activity, StoreError> {
    let started: String = row_helpers::get(row, 5, "Activities", "Started")?;
    let stopped: Option<String> = row_helpers::get_opt(row, 6, "Activities", "Stopped")?;

    Ok(Activity {
        activity_id: row_helpers::get(row, 0, "Activities", "ActivityId")?,
        project_id: row_helpers::get(row, 1, "Activities", "ProjectId")?,
        name: row_helpers::get_opt::<String>(row, 2, "Activities", "Name")?.unwrap_or_default(),
        description: row_helpers::get_opt(row, 3, "Activities", "Description")?,
        tags: row_helpers::get_opt(row, 4, "Activities", "Tags")?,
        started: row_helpers::parse_timestamp(&started, "Activities", "Started")?,
        stopped: row_helpers::parse_optional_timestamp(stopped.as_deref(), "Activities", "Stopped")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn setup() -> ActivityRepo {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(schema::CREATE_TABLES)?;
            Ok(())
        })
        .unwrap();
        ActivityRepo::new(db)
    }

    fn draft() -> NewActivity {
        NewActivity::new(1, "Test activity")
            .with_description("Some description...")
            .with_tags("tag1,tag2,tag3")
    }

    #[test]
    fn nothing_running_initially() {
        let repo = setup();
        assert!(repo.running().unwrap().is_none());
    }

    #[test]
    fn start_inserts_running_activity() {
        let repo = setup();
        let activity = repo.start(draft()).unwrap().unwrap();
        assert!(activity.activity_id > 0);
        assert_eq!(activity.project_id, 1);
        assert_eq!(activity.name, "Test activity");
        assert_eq!(activity.description.as_deref(), Some("Some description..."));
        assert_eq!(activity.tags.as_deref(), Some("tag1,tag2,tag3"));
        assert!(activity.stopped.is_none());

        let running = repo.running().unwrap().unwrap();
        assert_eq!(running, activity);
    }

    #[test]
    fn start_while_running_inserts_nothing() {
        let repo = setup();
        let _ = repo.start(draft()).unwrap().unwrap();
        assert_eq!(repo.count().unwrap(), 1);

        let second = repo.start(NewActivity::new(2, "Other")).unwrap();
        assert!(second.is_none());
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn stop_without_running_is_none() {
        let repo = setup();
        assert!(repo.stop().unwrap().is_none());
    }

    #[test]
    fn stop_sets_stopped_after_started() {
        let repo = setup();
        let started = repo.start(draft()).unwrap().unwrap();
        let stopped = repo.stop().unwrap().unwrap();

        assert_eq!(stopped.activity_id, started.activity_id);
        assert_eq!(stopped.project_id, started.project_id);
        assert_eq!(stopped.name, started.name);
        assert_eq!(stopped.description, started.description);
        assert_eq!(stopped.tags, started.tags);
        assert_eq!(stopped.started, started.started);
        assert!(stopped.stopped.unwrap() > started.started);

        assert!(repo.running().unwrap().is_none());
        assert_eq!(repo.get(started.activity_id).unwrap(), stopped);
    }

    #[test]
    fn start_after_stop_succeeds() {
        let repo = setup();
        let _ = repo.start(draft()).unwrap().unwrap();
        let _ = repo.stop().unwrap().unwrap();
        let next = repo.start(NewActivity::new(1, "Next")).unwrap().unwrap();
        assert_eq!(repo.running().unwrap().unwrap().activity_id, next.activity_id);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn legacy_row_with_empty_stopped_is_running() {
        let repo = setup();
        repo.db
            .with_conn(|conn| {
                let _ = conn.execute(
                    "INSERT INTO Activities (ProjectId, Name, Started, Stopped)
                     VALUES (1, 'legacy', '2015-06-01T10:00:00+0200', '')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        let running = repo.running().unwrap().unwrap();
        assert_eq!(running.name, "legacy");
        assert!(running.description.is_none());
    }

    #[test]
    fn update_persists_fields() {
        let repo = setup();
        let started = repo.start(draft()).unwrap().unwrap();
        let mut edited = started.clone();
        edited.name = "Renamed".into();
        edited.tags = None;
        let _ = repo.update(&edited).unwrap();
        assert_eq!(repo.get(started.activity_id).unwrap(), edited);
    }

    #[test]
    fn update_missing_is_not_found() {
        let repo = setup();
        let ghost = draft().into_activity(99, timestamp::now());
        assert!(matches!(repo.update(&ghost), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn corrupt_started_is_reported() {
        let repo = setup();
        repo.db
            .with_conn(|conn| {
                let _ = conn.execute(
                    "INSERT INTO Activities (ProjectId, Name, Started) VALUES (1, 'bad', 'garbage')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        assert!(matches!(repo.running(), Err(StoreError::CorruptRow { column: "Started", .. })));
    }

    #[test]
    fn select_and_remove_are_empty() {
        let repo = setup();
        let _ = repo.start(draft()).unwrap().unwrap();
        let filter = serde_json::json!({"ProjectId": 1});
        assert!(repo.select(&filter).unwrap().is_empty());
        assert_eq!(repo.remove(&filter, &Value::Null).unwrap(), 0);
        assert_eq!(repo.count().unwrap(), 1);
    }
}
