//! Domain types of the rating and metadata services.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque identifier of an aggregatable subject (e.g., a movie).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

/// Kind of record being rated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordType(pub String);

impl RecordType {
    /// Record type used for movie ratings.
    pub const MOVIE: &'static str = "movie";

    /// Returns the movie record type.
    #[must_use]
    pub fn movie() -> Self {
        Self(Self::MOVIE.to_string())
    }
}

/// Identifier of the user who submitted a rating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(RecordId);
string_id!(RecordType);
string_id!(UserId);

// ---------------------------------------------------------------------------
// Rating
// ---------------------------------------------------------------------------

/// Numeric rating value. Valid ratings lie in `MIN_RATING..=MAX_RATING`.
pub type RatingValue = i32;

/// Lowest accepted rating value.
pub const MIN_RATING: RatingValue = 1;

/// Highest accepted rating value.
pub const MAX_RATING: RatingValue = 5;

/// A rating value fell outside `MIN_RATING..=MAX_RATING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rating value {value} outside valid range {}..={}", MIN_RATING, MAX_RATING)]
pub struct InvalidRating {
    pub value: RatingValue,
}

/// A single user's rating of a record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub user_id: UserId,
    pub value: RatingValue,
}

impl Rating {
    /// Creates a rating after checking the value range.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRating` if `value` is outside `MIN_RATING..=MAX_RATING`.
    pub fn new(user_id: impl Into<UserId>, value: RatingValue) -> Result<Self, InvalidRating> {
        let rating = Self {
            user_id: user_id.into(),
            value,
        };
        rating.validate()?;
        Ok(rating)
    }

    /// Checks the value range of a rating that was built field by field
    /// (e.g., decoded from the wire).
    ///
    /// # Errors
    ///
    /// Returns `InvalidRating` if the value is out of range.
    pub fn validate(&self) -> Result<(), InvalidRating> {
        if (MIN_RATING..=MAX_RATING).contains(&self.value) {
            Ok(())
        } else {
            Err(InvalidRating { value: self.value })
        }
    }
}

/// Arithmetic mean of the given ratings, or `None` when there are none.
///
/// A record without ratings has no aggregate; it never averages to zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_rating(ratings: &[Rating]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    let sum: f64 = ratings.iter().map(|r| f64::from(r.value)).sum();
    Some(sum / ratings.len() as f64)
}

// ---------------------------------------------------------------------------
// RatingEvent
// ---------------------------------------------------------------------------

/// Kind of change carried by a rating event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingEventType {
    #[default]
    Put,
}

/// External representation of a rating consumed from the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingEvent {
    pub record_id: RecordId,
    pub record_type: RecordType,
    pub user_id: UserId,
    pub value: RatingValue,
    #[serde(default)]
    pub event_type: RatingEventType,
}

impl RatingEvent {
    /// Creates a `Put` event.
    #[must_use]
    pub fn put(
        record_id: impl Into<RecordId>,
        record_type: impl Into<RecordType>,
        user_id: impl Into<UserId>,
        value: RatingValue,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            record_type: record_type.into(),
            user_id: user_id.into(),
            value,
            event_type: RatingEventType::Put,
        }
    }

    /// Decodes a JSON-encoded event as produced by the rating event stream.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload is not a valid event.
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Converts the event into the rating it describes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRating` if the event carries an out-of-range value.
    pub fn to_rating(&self) -> Result<Rating, InvalidRating> {
        Rating::new(self.user_id.clone(), self.value)
    }
}

// ---------------------------------------------------------------------------
// Metadata / MovieDetails
// ---------------------------------------------------------------------------

/// Descriptive metadata of a movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub id: String,
    pub title: String,
    pub description: String,
    pub director: String,
}

/// Composite view of a movie: metadata plus its aggregated rating, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieDetails {
    pub metadata: Metadata,
    pub rating: Option<f64>,
}
