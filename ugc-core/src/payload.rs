//! Typed payload variants and field-level validation.
//!
//! The ingest API and the ETL consumers both validate raw payload objects
//! against the variant dictated by the event subtype. Validation never
//! panics and never stops at the first problem: every offending field is
//! reported, so the ingest can answer 422 with a machine-readable list.

use crate::envelope::{EventSubtype, EventType};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// A single field-level validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Name of the offending field.
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// A non-empty list of field-level validation failures.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[error("payload validation failed: {0} error(s)", .errors.len())]
pub struct ValidationErrors {
    /// The individual failures.
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Wrap a list of failures.
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// A single-failure list.
    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self::new(vec![FieldError::new(field, message)])
    }
}

/// A validated payload, one variant per subtype plus `click` and `visit`.
///
/// Serializes untagged: only the variant's fields appear on the wire, the
/// discriminant lives in the envelope's `event_type`/`event_subtype`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum Payload {
    Click { element_id: String, element_payload: String },
    Visit {},
    FullyWatched { film_id: Uuid },
    QualityChanged { film_id: Uuid, previous_quality: String, next_quality: String },
    CreateFilmRating { film_id: Uuid, value: u8 },
    UpdateFilmRating { film_id: Uuid, value: u8 },
    DeleteFilmRating { film_id: Uuid },
    CreateFilmReview { film_id: Uuid, value: String },
    UpdateFilmReview { review_id: Uuid, value: String },
    DeleteFilmReview { review_id: Uuid },
    CreateFilmReviewRating { review_id: Uuid, value: u8 },
    UpdateFilmReviewRating { review_id: Uuid, value: u8 },
    DeleteFilmReviewRating { review_id: Uuid },
    CreateBookmark { film_id: Uuid },
    DeleteBookmark { film_id: Uuid },
}

impl Payload {
    /// Validate a raw payload object against the schema for
    /// `(event_type, event_subtype)`.
    ///
    /// Returns `Ok(None)` only for `visit`, which carries no payload
    /// (an empty object or an absent payload are both accepted).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] listing every offending field when the
    /// payload does not match the variant schema, when a custom event lacks
    /// a subtype, or when a non-custom event carries one.
    pub fn decode(
        event_type: EventType,
        event_subtype: Option<EventSubtype>,
        raw: Option<&Value>,
    ) -> Result<Option<Self>, ValidationErrors> {
        match (event_type, event_subtype) {
            (EventType::Click, None) => {
                let fields = Fields::of(raw)?;
                let mut errors = Vec::new();
                let element_id = fields.string("element_id").map_err(|e| errors.extend(e.errors)).ok();
                let element_payload =
                    fields.string("element_payload").map_err(|e| errors.extend(e.errors)).ok();
                match (element_id, element_payload) {
                    (Some(element_id), Some(element_payload)) => {
                        Ok(Some(Self::Click { element_id, element_payload }))
                    }
                    _ => Err(ValidationErrors::new(errors)),
                }
            }
            (EventType::Visit, None) => match raw {
                None => Ok(None),
                Some(Value::Object(map)) if map.is_empty() => Ok(Some(Self::Visit {})),
                Some(Value::Object(_)) => {
                    Err(ValidationErrors::single("payload", "visit events carry no payload"))
                }
                Some(_) => Err(ValidationErrors::single("payload", "expected an object")),
            },
            (EventType::Custom, Some(subtype)) => Self::decode_custom(subtype, raw).map(Some),
            (EventType::Custom, None) => Err(ValidationErrors::single(
                "event_subtype",
                "custom events require a subtype",
            )),
            (_, Some(subtype)) => Err(ValidationErrors::single(
                "event_subtype",
                format!("{event_type} events do not accept subtype {subtype}"),
            )),
        }
    }

    fn decode_custom(subtype: EventSubtype, raw: Option<&Value>) -> Result<Self, ValidationErrors> {
        let fields = Fields::of(raw)?;
        match subtype {
            EventSubtype::FullyWatched => Ok(Self::FullyWatched { film_id: fields.uuid("film_id")? }),
            EventSubtype::QualityChanged => {
                // Collect across fields so a 422 reports everything at once.
                let mut errors = Vec::new();
                let film_id = fields.uuid("film_id").map_err(|e| errors.extend(e.errors)).ok();
                let previous = fields.string("previous_quality").map_err(|e| errors.extend(e.errors)).ok();
                let next = fields.string("next_quality").map_err(|e| errors.extend(e.errors)).ok();
                match (film_id, previous, next) {
                    (Some(film_id), Some(previous_quality), Some(next_quality)) => {
                        Ok(Self::QualityChanged { film_id, previous_quality, next_quality })
                    }
                    _ => Err(ValidationErrors::new(errors)),
                }
            }
            EventSubtype::CreateFilmRating => {
                let (film_id, value) = fields.id_and_value("film_id")?;
                Ok(Self::CreateFilmRating { film_id, value })
            }
            EventSubtype::UpdateFilmRating => {
                let (film_id, value) = fields.id_and_value("film_id")?;
                Ok(Self::UpdateFilmRating { film_id, value })
            }
            EventSubtype::DeleteFilmRating => Ok(Self::DeleteFilmRating { film_id: fields.uuid("film_id")? }),
            EventSubtype::CreateFilmReview => {
                let mut errors = Vec::new();
                let film_id = fields.uuid("film_id").map_err(|e| errors.extend(e.errors)).ok();
                let value = fields.string("value").map_err(|e| errors.extend(e.errors)).ok();
                match (film_id, value) {
                    (Some(film_id), Some(value)) => Ok(Self::CreateFilmReview { film_id, value }),
                    _ => Err(ValidationErrors::new(errors)),
                }
            }
            EventSubtype::UpdateFilmReview => {
                let mut errors = Vec::new();
                let review_id = fields.uuid("review_id").map_err(|e| errors.extend(e.errors)).ok();
                let value = fields.string("value").map_err(|e| errors.extend(e.errors)).ok();
                match (review_id, value) {
                    (Some(review_id), Some(value)) => Ok(Self::UpdateFilmReview { review_id, value }),
                    _ => Err(ValidationErrors::new(errors)),
                }
            }
            EventSubtype::DeleteFilmReview => {
                Ok(Self::DeleteFilmReview { review_id: fields.uuid("review_id")? })
            }
            EventSubtype::CreateFilmReviewRating => {
                let (review_id, value) = fields.id_and_value("review_id")?;
                Ok(Self::CreateFilmReviewRating { review_id, value })
            }
            EventSubtype::UpdateFilmReviewRating => {
                let (review_id, value) = fields.id_and_value("review_id")?;
                Ok(Self::UpdateFilmReviewRating { review_id, value })
            }
            EventSubtype::DeleteFilmReviewRating => {
                Ok(Self::DeleteFilmReviewRating { review_id: fields.uuid("review_id")? })
            }
            EventSubtype::CreateBookmark => Ok(Self::CreateBookmark { film_id: fields.uuid("film_id")? }),
            EventSubtype::DeleteBookmark => Ok(Self::DeleteBookmark { film_id: fields.uuid("film_id")? }),
        }
    }

    /// The owning object id for aggregate-affecting payloads.
    ///
    /// Film ratings, reviews and bookmarks belong to their film; review
    /// ratings and review edits belong to their review. Telemetry payloads
    /// (`click`, `visit`, `fully_watched`, `quality_changed`) own nothing
    /// and return `None`.
    #[must_use]
    pub const fn object_id(&self) -> Option<Uuid> {
        match self {
            Self::Click { .. }
            | Self::Visit {}
            | Self::FullyWatched { .. }
            | Self::QualityChanged { .. } => None,
            Self::CreateFilmRating { film_id, .. }
            | Self::UpdateFilmRating { film_id, .. }
            | Self::DeleteFilmRating { film_id }
            | Self::CreateFilmReview { film_id, .. }
            | Self::CreateBookmark { film_id }
            | Self::DeleteBookmark { film_id } => Some(*film_id),
            Self::UpdateFilmReview { review_id, .. }
            | Self::DeleteFilmReview { review_id }
            | Self::CreateFilmReviewRating { review_id, .. }
            | Self::UpdateFilmReviewRating { review_id, .. }
            | Self::DeleteFilmReviewRating { review_id } => Some(*review_id),
        }
    }

    /// The canonical JSON object for this payload.
    ///
    /// # Errors
    ///
    /// Returns the underlying serializer error; cannot fail for these
    /// variants in practice.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_value() {
            Ok(value) => write!(f, "{value}"),
            Err(_) => f.write_str("<unrepresentable payload>"),
        }
    }
}

/// Field accessors over a raw JSON object, each producing a [`FieldError`]
/// naming the offending field.
struct Fields<'a>(&'a serde_json::Map<String, Value>);

impl<'a> Fields<'a> {
    fn of(raw: Option<&'a Value>) -> Result<Self, ValidationErrors> {
        match raw {
            Some(Value::Object(map)) => Ok(Self(map)),
            Some(_) => Err(ValidationErrors::single("payload", "expected an object")),
            None => Err(ValidationErrors::single("payload", "payload is required")),
        }
    }

    fn string(&self, field: &str) -> Result<String, ValidationErrors> {
        match self.0.get(field) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(ValidationErrors::single(field, "expected a string")),
            None => Err(ValidationErrors::single(field, "field is required")),
        }
    }

    fn uuid(&self, field: &str) -> Result<Uuid, ValidationErrors> {
        match self.0.get(field) {
            Some(Value::String(s)) => Uuid::parse_str(s)
                .map_err(|_| ValidationErrors::single(field, "expected a UUID")),
            Some(_) => Err(ValidationErrors::single(field, "expected a UUID string")),
            None => Err(ValidationErrors::single(field, "field is required")),
        }
    }

    /// Rating value, range-checked to 0..=10.
    fn rating(&self) -> Result<u8, ValidationErrors> {
        match self.0.get("value") {
            Some(Value::Number(n)) => match n.as_u64() {
                Some(v) if v <= 10 => Ok(v as u8),
                _ => Err(ValidationErrors::single("value", "must be an integer in 0..=10")),
            },
            Some(_) => Err(ValidationErrors::single("value", "must be an integer in 0..=10")),
            None => Err(ValidationErrors::single("value", "field is required")),
        }
    }

    fn id_and_value(&self, id_field: &str) -> Result<(Uuid, u8), ValidationErrors> {
        let mut errors = Vec::new();
        let id = self.uuid(id_field).map_err(|e| errors.extend(e.errors)).ok();
        let value = self.rating().map_err(|e| errors.extend(e.errors)).ok();
        match (id, value) {
            (Some(id), Some(value)) => Ok((id, value)),
            _ => Err(ValidationErrors::new(errors)),
        }
    }
}
