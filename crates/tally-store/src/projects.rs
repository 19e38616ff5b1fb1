//! Project rows.

use serde_json::Value;
use tracing::{debug, instrument};

use tally_core::timestamp;
use tally_core::{NewProject, Project};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Queries over the `Projects` table.
pub struct ProjectRepo {
    db: Database,
}

impl ProjectRepo {
    /// Repo over a shared database handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a project. `Created` defaults to now when the draft has none.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub fn insert(&self, draft: NewProject) -> Result<Project, StoreError> {
        self.db.with_conn(|conn| {
            let created = draft.created.unwrap_or_else(timestamp::now);
            let _ = conn.execute(
                "INSERT INTO Projects (Name, Description, Created) VALUES (?1, ?2, ?3)",
                rusqlite::params![draft.name, draft.description, timestamp::format(&created)],
            )?;
            Ok(draft.into_project(conn.last_insert_rowid(), created))
        })
    }

    /// Update name and description. `Created` is never written.
    #[instrument(skip(self, project), fields(project_id = project.project_id))]
    pub fn update(&self, project: &Project) -> Result<Project, StoreError> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE Projects SET Name = ?1, Description = ?2 WHERE ProjectId = ?3",
                rusqlite::params![project.name, project.description, project.project_id],
            )?)
        })?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("project {}", project.project_id)));
        }
        self.get(project.project_id)
    }

    /// Get a project by ID.
    #[instrument(skip(self))]
    pub fn get(&self, project_id: i64) -> Result<Project, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ProjectId, Name, Description, Created FROM Projects WHERE ProjectId = ?1",
            )?;
            let mut rows = stmt.query([project_id])?;
            match rows.next()? {
                Some(row) => row_to_project(row),
                None => Err(StoreError::NotFound(format!("project {project_id}"))),
            }
        })
    }

    /// Rows matching `filter`. Filtering is not supported yet, so always empty.
    pub fn select(&self, filter: &Value) -> Result<Vec<Project>, StoreError> {
        debug!(%filter, "project filtering is not supported, returning no rows");
        Ok(Vec::new())
    }

    /// Delete rows matching `filter`. Not supported yet; removes nothing.
    pub fn remove(&self, filter: &Value, options: &Value) -> Result<usize, StoreError> {
        debug!(%filter, %options, "project removal is not supported, nothing removed");
        Ok(0)
    }
}

fn row_to_project(row: &rusqlite::Row<'_>) -> Result<Project, StoreError> {
    let created: String = row_helpers::get(row, 3, "Projects", "Created")?;

    Ok(Project {
        project_id: row_helpers::get(row, 0, "Projects", "ProjectId")?,
        name: row_helpers::get_opt::<String>(row, 1, "Projects", "Name")?.unwrap_or_default(),
        description: row_helpers::get_opt(row, 2, "Projects", "Description")?,
        created: row_helpers::parse_timestamp(&created, "Projects", "Created")?,
    })
}
