use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{
    PartialSchema, ToSchema,
    openapi::{
        KnownFormat, ObjectBuilder, RefOr, Schema, SchemaFormat,
        schema::{AdditionalProperties, Type},
    },
};
use uuid::Uuid;

use crate::{error::ApiError, storage::StoredMedia};

// --- Entity Descriptors ---

/// Collection
///
/// The five content collections served by the portal. Each variant is a static descriptor:
/// URL slug, backing table, declared fields and the attachment rule applied on create.
/// Every CRUD handler is generic over this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    PastEvents,
    UpcomingEvents,
    GoverningTeam,
    Magazines,
    JourneyPhotos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// External link; stored with an explicit scheme.
    Link,
    /// Calendar date; stored as `YYYY-MM-DD`.
    Date,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub required: bool,
    pub kind: FieldKind,
}

const fn field(name: &'static str, required: bool, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        required,
        kind,
    }
}

const PAST_EVENT_FIELDS: &[FieldSpec] = &[
    field("clubName", true, FieldKind::Text),
    field("description", true, FieldKind::Text),
    field("link", false, FieldKind::Link),
];

const UPCOMING_EVENT_FIELDS: &[FieldSpec] = &[
    field("description", true, FieldKind::Text),
    field("link", false, FieldKind::Link),
    field("registration", false, FieldKind::Link),
    field("eventDate", false, FieldKind::Date),
];

const GOVERNING_TEAM_FIELDS: &[FieldSpec] = &[
    field("name", true, FieldKind::Text),
    field("designation", true, FieldKind::Text),
];

const MAGAZINE_FIELDS: &[FieldSpec] = &[
    field("description", true, FieldKind::Text),
    field("registrationLink", false, FieldKind::Link),
];

const JOURNEY_PHOTO_FIELDS: &[FieldSpec] = &[field("originalName", false, FieldKind::Text)];

/// Whether a write creates a record or patches an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::PastEvents,
        Collection::UpcomingEvents,
        Collection::GoverningTeam,
        Collection::Magazines,
        Collection::JourneyPhotos,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Collection::PastEvents => "past-events",
            Collection::UpcomingEvents => "upcoming-events",
            Collection::GoverningTeam => "governing-team",
            Collection::Magazines => "electromazine",
            Collection::JourneyPhotos => "our-team-journey",
        }
    }

    /// Backing table. Only ever one of these literals, so it is safe to splice into SQL.
    pub fn table(self) -> &'static str {
        match self {
            Collection::PastEvents => "past_events",
            Collection::UpcomingEvents => "upcoming_events",
            Collection::GoverningTeam => "governing_team",
            Collection::Magazines => "magazines",
            Collection::JourneyPhotos => "journey_photos",
        }
    }

    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            Collection::PastEvents => PAST_EVENT_FIELDS,
            Collection::UpcomingEvents => UPCOMING_EVENT_FIELDS,
            Collection::GoverningTeam => GOVERNING_TEAM_FIELDS,
            Collection::Magazines => MAGAZINE_FIELDS,
            Collection::JourneyPhotos => JOURNEY_PHOTO_FIELDS,
        }
    }

    pub fn requires_attachment(self) -> bool {
        !matches!(self, Collection::UpcomingEvents)
    }

    /// Field filled from the uploaded file's name when the form leaves it out.
    pub fn attachment_name_field(self) -> Option<&'static str> {
        match self {
            Collection::JourneyPhotos => Some("originalName"),
            _ => None,
        }
    }

    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|spec| spec.name == name)
    }

    /// validate
    ///
    /// Turns raw form text into the stored document fields.
    ///
    /// Undeclared fields are dropped. Text is trimmed, links get an `https://` scheme when they have none,
    /// dates are normalized to `YYYY-MM-DD`. On create every required field must be present and
    /// non-blank; on update a required field may be omitted but never blanked.
    pub fn validate(
        self,
        input: BTreeMap<String, String>,
        mode: WriteMode,
    ) -> Result<Map<String, Value>, ApiError> {
        let mut output = Map::new();

        for (name, raw) in input {
            let Some(spec) = self.field(&name) else {
                tracing::debug!(collection = %self, field = %name, "dropping undeclared field");
                continue;
            };
            let value = raw.trim();
            if value.is_empty() {
                if spec.required {
                    return Err(ApiError::Validation(format!("{name} must not be empty")));
                }
                output.insert(name, Value::String(String::new()));
                continue;
            }
            let normalized = match spec.kind {
                FieldKind::Text => value.to_string(),
                FieldKind::Link => normalize_link(value),
                FieldKind::Date => normalize_date(value)
                    .ok_or_else(|| ApiError::Validation(format!("{name} is not a valid date")))?,
            };
            output.insert(name, Value::String(normalized));
        }

        if mode == WriteMode::Create {
            if let Some(missing) = self
                .fields()
                .iter()
                .find(|spec| spec.required && !output.contains_key(spec.name))
            {
                return Err(ApiError::Validation(format!("{} is required", missing.name)));
            }
        }

        Ok(output)
    }

    /// Builds an equality filter from query parameters, ignoring anything that is not a declared field.
    pub fn filter_from_query(self, params: &HashMap<String, String>) -> RecordFilter {
        let mut equals: Vec<(String, String)> = params
            .iter()
            .filter(|(name, _)| self.field(name).is_some())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        equals.sort();
        RecordFilter { equals }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Collection {
    type Err = ApiError;

    fn from_str(slug: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|collection| collection.slug() == slug)
            .ok_or_else(|| ApiError::UnknownCollection(slug.to_string()))
    }
}

fn normalize_link(value: &str) -> String {
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        value.to_string()
    } else {
        format!("https://{value}")
    }
}

fn normalize_date(value: &str) -> Option<String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|datetime| datetime.date_naive())
        })
        .map(|date| date.format("%Y-%m-%d").to_string())
}

// --- Records ---

/// Record
///
/// One document of a collection. Serialized flat, e.g. for a past event:
/// `{ "_id": …, "url": …, "clubName": …, "description": …, "createdAt": …, "updatedAt": … }`.
/// The media object key is kept server-side only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip)]
    pub media_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

impl PartialSchema for Record {
    fn schema() -> RefOr<Schema> {
        ObjectBuilder::new()
            .property(
                "_id",
                ObjectBuilder::new()
                    .schema_type(Type::String)
                    .format(Some(SchemaFormat::KnownFormat(KnownFormat::Uuid))),
            )
            .required("_id")
            .property("url", ObjectBuilder::new().schema_type(Type::String))
            .property(
                "createdAt",
                ObjectBuilder::new()
                    .schema_type(Type::String)
                    .format(Some(SchemaFormat::KnownFormat(KnownFormat::DateTime))),
            )
            .property(
                "updatedAt",
                ObjectBuilder::new()
                    .schema_type(Type::String)
                    .format(Some(SchemaFormat::KnownFormat(KnownFormat::DateTime))),
            )
            .additional_properties(Some(AdditionalProperties::FreeForm(true)))
            .description(Some(
                "A collection document; the remaining keys are the collection's declared fields.",
            ))
            .into()
    }
}

impl ToSchema for Record {
    fn name() -> Cow<'static, str> {
        Cow::Borrowed("Record")
    }
}

/// Raw Database Row (Internal Use). Maps one row of any collection table.
#[derive(Debug, FromRow)]
pub struct RecordRow {
    pub id: Uuid,
    pub url: Option<String>,
    pub media_key: Option<String>,
    pub data: sqlx::types::Json<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            media_key: row.media_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
            fields: row.data.0,
        }
    }
}

/// Row returned by an update: the new state plus the media key it displaced.
#[derive(Debug, FromRow)]
pub struct UpdatedRecordRow {
    #[sqlx(flatten)]
    pub row: RecordRow,
    pub previous_media_key: Option<String>,
}

/// Validated input for a new record.
#[derive(Debug, Clone, Default)]
pub struct RecordDraft {
    pub fields: Map<String, Value>,
    pub media: Option<StoredMedia>,
}

/// Partial update: provided fields override, a new media reference replaces the old one.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub fields: Map<String, Value>,
    pub media: Option<StoredMedia>,
}

/// Outcome of an applied patch. `replaced_media_key` is the object the patch displaced, read in
/// the same write as the update, so the caller deletes exactly what it replaced.
#[derive(Debug, Clone)]
pub struct RecordUpdate {
    pub record: Record,
    pub replaced_media_key: Option<String>,
}

/// Equality filters over declared fields, all of which must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub equals: Vec<(String, String)>,
}

impl RecordFilter {
    pub fn field_equals(name: &str, value: &str) -> Self {
        Self {
            equals: vec![(name.to_string(), value.to_string())],
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.equals
            .iter()
            .all(|(name, value)| record.field_str(name) == Some(value.as_str()))
    }
}

// --- Response Envelopes ---

/// `{ data: [...] }`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordList {
    pub data: Vec<Record>,
}

/// `{ data: {...} }`, plus `message` on mutations.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordEnvelope {
    pub data: Record,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RecordEnvelope {
    pub fn new(data: Record) -> Self {
        Self {
            data,
            message: None,
        }
    }

    pub fn with_message(data: Record, message: impl Into<String>) -> Self {
        Self {
            data,
            message: Some(message.into()),
        }
    }
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub struct ErrorBody {
    pub message: String,
    /// Machine-readable reason, present on authorization failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: None,
        }
    }
}

// --- Accounts ---

/// User
///
/// An account able to log in. Only the admin role is meaningful to the gate today.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    #[schema(example = "admin")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LoginResponse {
    /// The signed credential to send as `Authorization: Bearer <token>`.
    pub token: String,
    /// Expiry, seconds since the Unix epoch.
    pub expires_at: i64,
    pub username: String,
    pub role: String,
}
