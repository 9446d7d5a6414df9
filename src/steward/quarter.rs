//! Quarter-dated archive buckets.
//!
//! Archived cards land in a list named `Live Q<quarter> <year>` on the archive
//! board. Lists are found by exact name and created on first use.
//!
//! Two concurrent runs that both miss the same quarter will each create a
//! list with that name; the board service has no upsert-by-name to close the
//! gap. Within one run the resolver caches ids so a quarter is looked up once.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use tracing::{debug, info, warn};

use crate::board::BoardService;
use crate::config::VisibilityPolicy;
use crate::error::BoardError;

/// Display position for new quarter lists, near the left of the board.
pub const QUARTER_LIST_POSITION: u32 = 2;

/// A calendar quarter of a given year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuarterLabel {
    pub year: i32,
    pub quarter: u8,
}

impl QuarterLabel {
    /// Quarter for a month (1-12) of a year.
    pub fn from_month(year: i32, month: u32) -> Self {
        let quarter = match month {
            0..=3 => 1,
            4..=6 => 2,
            7..=9 => 3,
            _ => 4,
        };
        Self { year, quarter }
    }

    /// Quarter containing `at`, as seen from `offset`.
    pub fn containing(at: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = at.with_timezone(&offset);
        Self::from_month(local.year(), local.month())
    }

    /// Name of the archive list for this quarter.
    pub fn list_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QuarterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Live Q{} {}", self.quarter, self.year)
    }
}

/// Finds or creates quarter lists on the archive board.
pub struct QuarterBucketResolver {
    archive_board_id: String,
    offset: FixedOffset,
    visibility: VisibilityPolicy,
    resolved: HashMap<QuarterLabel, String>,
}

impl QuarterBucketResolver {
    pub fn new(
        archive_board_id: impl Into<String>,
        offset: FixedOffset,
        visibility: VisibilityPolicy,
    ) -> Self {
        Self {
            archive_board_id: archive_board_id.into(),
            offset,
            visibility,
            resolved: HashMap::new(),
        }
    }

    /// Resolve the list for the quarter containing `at`, or `now` when absent.
    pub async fn resolve_for(
        &mut self,
        service: &dyn BoardService,
        at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<String, BoardError> {
        let label = QuarterLabel::containing(at.unwrap_or(now), self.offset);
        self.resolve(service, label).await
    }

    /// Resolve the list for a quarter, creating it when no open list matches.
    pub async fn resolve(
        &mut self,
        service: &dyn BoardService,
        label: QuarterLabel,
    ) -> Result<String, BoardError> {
        if let Some(id) = self.resolved.get(&label) {
            return Ok(id.clone());
        }

        let name = label.list_name();
        let id = match self.find(service, &name).await? {
            Some(id) => {
                debug!(list = %name, list_id = %id, "Found quarter list");
                id
            }
            None => self.create(service, &name).await?,
        };

        self.resolved.insert(label, id.clone());
        Ok(id)
    }

    async fn find(
        &self,
        service: &dyn BoardService,
        name: &str,
    ) -> Result<Option<String>, BoardError> {
        Ok(service
            .open_lists(&self.archive_board_id)
            .await?
            .into_iter()
            .find(|l| l.name == name)
            .map(|l| l.id))
    }

    /// Create the list, then poll until reads on the board can see it.
    async fn create(&self, service: &dyn BoardService, name: &str) -> Result<String, BoardError> {
        let created = service
            .create_list(&self.archive_board_id, name, QUARTER_LIST_POSITION)
            .await?;
        info!(list = %name, list_id = %created.id, "Created quarter list");

        for attempt in 1..=self.visibility.attempts {
            let visible = service
                .open_lists(&self.archive_board_id)
                .await?
                .iter()
                .any(|l| l.id == created.id);
            if visible {
                debug!(list = %name, attempt, "Quarter list visible");
                return Ok(created.id);
            }
            if attempt < self.visibility.attempts {
                tokio::time::sleep(self.visibility.delay).await;
            }
        }

        warn!(
            list = %name,
            list_id = %created.id,
            attempts = self.visibility.attempts,
            "Quarter list not yet visible; using it anyway"
        );
        Ok(created.id)
    }
}
