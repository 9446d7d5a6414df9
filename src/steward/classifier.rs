//! Staleness and due-date predicates.
//!
//! Pure functions of a card and an explicit `now`. A timestamp that cannot be
//! parsed fails only the predicate that needed it.

use chrono::{DateTime, FixedOffset, Utc};

use crate::board::Card;
use crate::error::TimestampError;

/// One week in seconds.
pub const ONE_WEEK_SECS: i64 = 604_800;

/// Returned by [`CardClock::seconds_past_due`] for cards without a due date.
pub const NO_DUE_DATE: i64 = -1;

/// Parse a board-service timestamp (RFC 3339, e.g. `2015-10-01T12:00:00.000Z`).
pub fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, TimestampError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TimestampError {
            field,
            value: value.to_string(),
        })
}

/// Evaluates time-based predicates against a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct CardClock {
    now: DateTime<Utc>,
    offset: FixedOffset,
}

impl CardClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self { now, offset }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn last_activity(&self, card: &Card) -> Result<DateTime<Utc>, TimestampError> {
        parse_timestamp("dateLastActivity", &card.date_last_activity)
    }

    /// Seconds since the card was last touched.
    pub fn age_secs(&self, card: &Card) -> Result<i64, TimestampError> {
        Ok((self.now - self.last_activity(card)?).num_seconds())
    }

    /// Inactive for more than a week.
    pub fn is_stale(&self, card: &Card) -> Result<bool, TimestampError> {
        Ok(self.age_secs(card)? > ONE_WEEK_SECS)
    }

    /// Inactive for more than two weeks.
    pub fn is_dormant_two_weeks(&self, card: &Card) -> Result<bool, TimestampError> {
        Ok(self.age_secs(card)? > 2 * ONE_WEEK_SECS)
    }

    /// Seconds elapsed since the due date, negative while it lies ahead.
    ///
    /// Cards without a due date report [`NO_DUE_DATE`]; use [`is_overdue`]
    /// rather than testing this value, since a due date exactly one second
    /// ahead reports the same number.
    ///
    /// [`is_overdue`]: Self::is_overdue
    pub fn seconds_past_due(&self, card: &Card) -> Result<i64, TimestampError> {
        match due_of(card) {
            None => Ok(NO_DUE_DATE),
            Some(raw) => Ok((self.now - parse_timestamp("due", raw)?).num_seconds()),
        }
    }

    /// Has a due date and it has passed.
    pub fn is_overdue(&self, card: &Card) -> Result<bool, TimestampError> {
        match due_of(card) {
            None => Ok(false),
            Some(raw) => Ok(self.now > parse_timestamp("due", raw)?),
        }
    }

    /// Last activity falls on the same calendar day as `now`.
    pub fn active_today(&self, card: &Card) -> Result<bool, TimestampError> {
        let last = self.last_activity(card)?.with_timezone(&self.offset);
        Ok(last.date_naive() == self.now.with_timezone(&self.offset).date_naive())
    }
}

/// The card's due date, treating an empty string like an absent one.
pub fn due_of(card: &Card) -> Option<&str> {
    card.due.as_deref().filter(|d| !d.trim().is_empty())
}
