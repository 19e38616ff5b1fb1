//! Activities: time entries that run until stopped.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp;

/// A time entry belonging to a project.
///
/// `stopped == None` means the activity is still running. Records are
/// immutable; derived states are produced by the `with_*` builders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Activity {
    /// Storage-assigned identifier.
    pub activity_id: i64,
    /// Owning project. Not enforced to exist.
    pub project_id: i64,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Comma-separated tags.
    pub tags: Option<String>,
    /// When the activity was started.
    #[serde(with = "timestamp::rfc3339")]
    pub started: DateTime<Utc>,
    /// `None` while running.
    #[serde(with = "timestamp::rfc3339_opt")]
    pub stopped: Option<DateTime<Utc>>,
}

impl Activity {
    /// True until the activity is stopped.
    pub fn is_running(&self) -> bool {
        self.stopped.is_none()
    }

    /// Copy of this activity stopped at `at`.
    ///
    /// The stop instant is clamped to at least one microsecond after
    /// `started`, so a stopped activity never has a zero or negative span.
    pub fn with_stopped(&self, at: DateTime<Utc>) -> Self {
        let earliest = self.started + Duration::microseconds(1);
        Self {
            stopped: Some(at.max(earliest)),
            ..self.clone()
        }
    }

    /// Elapsed time between start and stop, or between start and `now`
    /// while the activity is running. Never negative.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        let end = self.stopped.unwrap_or(now);
        (end - self.started).max(Duration::zero())
    }

    /// Human-readable duration, e.g. `1 h 5 min 3 s` or `0 s`.
    pub fn duration_formatted(&self, now: DateTime<Utc>) -> String {
        format_duration(self.duration(now))
    }

    /// Individual tags with surrounding whitespace removed.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn format_duration(d: Duration) -> String {
    let total = d.num_seconds();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours} h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes} min"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds} s"));
    }
    parts.join(" ")
}

/// Draft of an activity that has not been persisted yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewActivity {
    /// Owning project.
    pub project_id: i64,
    /// Display name; required to be non-empty by the RPC layer.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Comma-separated tags.
    pub tags: Option<String>,
}

impl NewActivity {
    /// Draft with no description or tags.
    pub fn new(project_id: i64, name: impl Into<String>) -> Self {
        Self {
            project_id,
            name: name.into(),
            description: None,
            tags: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the comma-separated tags.
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    /// Running activity with the storage-assigned id.
    pub fn into_activity(self, activity_id: i64, started: DateTime<Utc>) -> Activity {
        Activity {
            activity_id,
            project_id: self.project_id,
            name: self.name,
            description: self.description,
            tags: self.tags,
            started,
            stopped: None,
        }
    }
}
