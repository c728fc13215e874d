//! Document-store layer for the UGC pipeline.
//!
//! Holds the typed collection documents (primary rows and derived
//! aggregates), the rating delta algebra, the [`store::UgcStore`] contract
//! the NoSQL ETL writes through, its MongoDB implementation and the
//! read-side queries served by the HTTP API.
//!
//! # Ownership
//!
//! Primary rows (`FilmUserRating`, `FilmReview`, `FilmReviewUserRating`,
//! `UserBookmark`) are owned by their `(subject, object)` pair. Derived
//! aggregates (`FilmRating`, `FilmReviewRating`) are owned by the object
//! and written only by the NoSQL ETL; nothing else may touch them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod documents;
pub mod read;
pub mod store;

pub use documents::{
    FilmRating, FilmReview, FilmReviewRating, FilmReviewUserRating, FilmUserRating, RatingSummary,
    UserBookmark,
};
pub use read::{ReviewWithRating, UgcReader};
pub use store::{MongoStore, StoreError, UgcStore};
