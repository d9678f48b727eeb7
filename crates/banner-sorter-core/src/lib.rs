use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Why [`BannerFinder::current`] could not pick an item.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum SelectionError {
    #[error("nothing to display at {as_of} in {mode} mode")]
    NoCurrentItem { as_of: OffsetDateTime, mode: Mode },
}

/// Visibility rule set applied by [`BannerFinder`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Started and not yet ended.
    #[default]
    Production,
    /// Not yet ended; future items are previewable.
    Staging,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            _ => None,
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything with a display window: a start instant and an end instant.
pub trait TimeWindowed {
    fn starts_at(&self) -> OffsetDateTime;
    fn ends_at(&self) -> OffsetDateTime;
}

impl<T: TimeWindowed + ?Sized> TimeWindowed for &T {
    fn starts_at(&self) -> OffsetDateTime {
        (**self).starts_at()
    }

    fn ends_at(&self) -> OffsetDateTime {
        (**self).ends_at()
    }
}

/// An opaque payload paired with the window it should be shown in.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Scheduled<T> {
    payload: T,
    #[serde(with = "time::serde::rfc3339")]
    starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    ends_at: OffsetDateTime,
}

impl<T> Scheduled<T> {
    #[must_use]
    pub fn new(payload: T, starts_at: OffsetDateTime, ends_at: OffsetDateTime) -> Self {
        Self { payload, starts_at, ends_at }
    }

    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// `true` when the window opens strictly before it closes.
    ///
    /// Malformed windows are still accepted by the selector; this is only a
    /// diagnostic for callers that want to report them.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.starts_at < self.ends_at
    }
}

impl<T> TimeWindowed for Scheduled<T> {
    fn starts_at(&self) -> OffsetDateTime {
        self.starts_at
    }

    fn ends_at(&self) -> OffsetDateTime {
        self.ends_at
    }
}

/// Return the item with the smallest end time among those accepted by `is_valid`.
///
/// Items sharing the minimal end time resolve to the one that appears first in
/// `items`. Returns `None` when `items` is empty or nothing is accepted.
pub fn select_earliest_expiring<T, F>(items: &[T], mut is_valid: F) -> Option<&T>
where
    T: TimeWindowed,
    F: FnMut(&T) -> bool,
{
    // `min_by_key` keeps the first of several equal minima.
    items.iter().filter(|item| is_valid(*item)).min_by_key(|item| item.ends_at())
}

/// Lookup seam over anything able to report the banner to display right now.
pub trait CurrentBanner {
    type Item;

    /// # Errors
    /// Returns [`SelectionError::NoCurrentItem`] when no candidate is visible.
    fn current_banner(&self) -> Result<&Self::Item, SelectionError>;
}

/// Chooses the current item from a candidate list according to a [`Mode`]
/// and a fixed reference time.
#[derive(Debug)]
pub struct BannerFinder<'a, T> {
    items: &'a [T],
    as_of: OffsetDateTime,
    mode: Mode,
}

impl<'a, T: TimeWindowed> BannerFinder<'a, T> {
    /// Production finder evaluated against the current UTC time.
    #[must_use]
    pub fn new(items: &'a [T]) -> Self {
        Self::with_clock(items, OffsetDateTime::now_utc(), Mode::Production)
    }

    /// Staging finder evaluated against the current UTC time.
    #[must_use]
    pub fn staging(items: &'a [T]) -> Self {
        Self::with_clock(items, OffsetDateTime::now_utc(), Mode::Staging)
    }

    #[must_use]
    pub fn with_clock(items: &'a [T], as_of: OffsetDateTime, mode: Mode) -> Self {
        Self { items, as_of, mode }
    }

    #[must_use]
    pub fn as_of(&self) -> OffsetDateTime {
        self.as_of
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether `item` is eligible at the reference time.
    ///
    /// Both boundaries are inclusive: an item ending exactly at `as_of` has not
    /// expired, and one starting exactly at `as_of` has started.
    #[must_use]
    pub fn is_visible(&self, item: &T) -> bool {
        if item.ends_at() < self.as_of {
            return false;
        }

        if self.mode == Mode::Staging {
            return true;
        }

        item.starts_at() <= self.as_of
    }

    /// Select the visible item that expires first.
    ///
    /// # Errors
    /// Returns [`SelectionError::NoCurrentItem`] when the candidate list is
    /// empty or no candidate is visible at the reference time.
    pub fn current(&self) -> Result<&'a T, SelectionError> {
        tracing::debug!(
            mode = %self.mode,
            as_of = %self.as_of,
            candidates = self.items.len(),
            "selecting current banner"
        );

        select_earliest_expiring(self.items, |item| self.is_visible(item)).ok_or_else(|| {
            tracing::debug!(mode = %self.mode, as_of = %self.as_of, "no visible banner");
            SelectionError::NoCurrentItem { as_of: self.as_of, mode: self.mode }
        })
    }
}

impl<T: TimeWindowed> CurrentBanner for BannerFinder<'_, T> {
    type Item = T;

    fn current_banner(&self) -> Result<&T, SelectionError> {
        self.current()
    }
}
