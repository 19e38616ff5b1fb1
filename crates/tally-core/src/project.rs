//! Projects group activities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp;

/// A project that activities are booked against.
///
/// `created` is set once on insert and never changes afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Project {
    /// Storage-assigned identifier.
    pub project_id: i64,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// When the project was inserted.
    #[serde(with = "timestamp::rfc3339")]
    pub created: DateTime<Utc>,
}

impl Project {
    /// Copy with new name and description. `created` is carried over.
    pub fn renamed(&self, name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            description,
            ..self.clone()
        }
    }
}

/// Draft of a project that has not been persisted yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewProject {
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Explicit creation time; storage uses the current time when absent.
    pub created: Option<DateTime<Utc>>,
}

impl NewProject {
    /// Draft with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Pin the creation time instead of using the insert time.
    pub fn created_at(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    /// Persisted project; `fallback_created` applies when no time was pinned.
    pub fn into_project(self, project_id: i64, fallback_created: DateTime<Utc>) -> Project {
        Project {
            project_id,
            name: self.name,
            description: self.description,
            created: self.created.unwrap_or(fallback_created),
        }
    }
}
