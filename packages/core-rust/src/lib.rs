//! `cinemesh` Core: rating domain model and RPC message schemas.

pub mod messages;
pub mod types;

pub use messages::{decode, encode, operations, service_names, CodecError};
pub use types::{
    mean_rating, InvalidRating, Metadata, MovieDetails, Rating, RatingEvent, RatingEventType,
    RatingValue, RecordId, RecordType, UserId, MAX_RATING, MIN_RATING,
};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
