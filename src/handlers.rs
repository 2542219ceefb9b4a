use std::collections::{BTreeMap, HashMap};

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{self, Principal},
    error::ApiError,
    models::{
        Collection, LoginRequest, LoginResponse, RecordDraft, RecordEnvelope, RecordFilter,
        RecordList, RecordPatch, WriteMode,
    },
    storage::StoredMedia,
};

/// Multipart part names accepted as the image attachment.
const ATTACHMENT_FIELDS: [&str; 2] = ["image", "file"];

// --- Multipart Form ---

/// An image received from the dashboard, about to be forwarded to the media host.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// RecordForm
///
/// A create/update submission: text parts become candidate fields, the `image` part (or `file`)
/// becomes the attachment. An empty file part counts as no attachment.
#[derive(Debug, Clone, Default)]
pub struct RecordForm {
    pub fields: BTreeMap<String, String>,
    pub attachment: Option<Upload>,
}

impl RecordForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = RecordForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            if ATTACHMENT_FIELDS.contains(&name.as_str()) {
                let file_name = field.file_name().map(str::to_string);
                let declared = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }

                let content_type = declared
                    .filter(|ct| ct != "application/octet-stream")
                    .or_else(|| file_name.as_deref().and_then(guess_image_type).map(str::to_string))
                    .ok_or_else(|| ApiError::UnsupportedMedia("unknown".to_string()))?;
                if !content_type.starts_with("image/") {
                    return Err(ApiError::UnsupportedMedia(content_type));
                }

                form.attachment = Some(Upload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            } else {
                form.fields.insert(name, field.text().await?);
            }
        }

        Ok(form)
    }
}

fn guess_image_type(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "avif" => Some("image/avif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/avif" => "avif",
        "image/bmp" => "bmp",
        _ => "img",
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::Validation(format!("Invalid record id: {raw}")))
}

/// Forwards the attachment to the media host under `<collection>/<uuid>.<ext>`.
async fn upload_media(
    state: &AppState,
    collection: Collection,
    upload: Upload,
) -> Result<StoredMedia, ApiError> {
    let key = format!(
        "{}/{}.{}",
        collection.slug(),
        Uuid::new_v4(),
        extension_for(&upload.content_type)
    );
    Ok(state
        .storage
        .upload(&key, &upload.content_type, upload.bytes)
        .await?)
}

/// Removing media never fails the request; a leftover object is only logged.
async fn discard_media(state: &AppState, key: &str) {
    if let Err(err) = state.storage.delete(key).await {
        tracing::warn!(%key, error = %err, "failed to delete media object");
    }
}

// --- Handlers ---

/// login
///
/// [Public Route] Exchanges username and password for a signed credential carrying the user's role
/// and an expiry `JWT_TTL_SECS` in the future.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credential issued", body = LoginResponse),
        (status = 400, description = "Missing username or password", body = crate::models::ErrorBody),
        (status = 401, description = "Invalid username or password", body = crate::models::ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation(
            "username and password are required".to_string(),
        ));
    }

    let Some(user) = state.repo.find_user(username).await? else {
        tracing::warn!(%username, "login rejected: unknown user");
        return Err(ApiError::InvalidLogin);
    };
    if !auth::verify_password(payload.password, user.password_hash.clone()).await? {
        tracing::warn!(%username, "login rejected: wrong password");
        return Err(ApiError::InvalidLogin);
    }

    let (token, claims) = auth::issue_token(
        &user,
        &state.config.jwt_secret,
        jsonwebtoken::get_current_timestamp(),
        state.config.token_ttl_secs,
    )
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(user = %user.username, role = %user.role, "credential issued");
    Ok(Json(LoginResponse {
        token,
        expires_at: i64::try_from(claims.exp).unwrap_or(i64::MAX),
        username: user.username,
        role: user.role,
    }))
}

/// get_session
///
/// [Admin Route] Echoes the Principal the gate decoded from the credential.
#[utoipa::path(
    get,
    path = "/api/admin/session",
    responses(
        (status = 200, description = "Current principal", body = Principal),
        (status = 401, description = "Missing, invalid or expired credential", body = crate::models::ErrorBody),
        (status = 403, description = "Role not allowed", body = crate::models::ErrorBody)
    )
)]
pub async fn get_session(principal: Principal) -> Json<Principal> {
    Json(principal)
}

/// Shared by the generic list route and the fixed legacy aliases.
pub async fn list_collection(
    state: &AppState,
    collection: Collection,
    filter: RecordFilter,
) -> Result<Json<RecordList>, ApiError> {
    let data = state.repo.list(collection, &filter).await?;
    Ok(Json(RecordList { data }))
}

/// list_records
///
/// [Public + Admin Route] Lists a collection, newest first. Query parameters naming declared fields
/// are equality filters (e.g. `?clubName=Robotics`); anything else is ignored.
#[utoipa::path(
    get,
    path = "/api/{collection}",
    params(("collection" = String, Path, description = "Collection slug, e.g. past-events")),
    responses(
        (status = 200, description = "Collection contents", body = RecordList),
        (status = 404, description = "Unknown collection", body = crate::models::ErrorBody)
    )
)]
pub async fn list_records(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<RecordList>, ApiError> {
    let collection: Collection = slug.parse()?;
    let filter = collection.filter_from_query(&params);
    list_collection(&state, collection, filter).await
}

/// list_past_events_by_club
///
/// [Public Route] Past events organized by one club.
#[utoipa::path(
    get,
    path = "/api/getpast/club/{club}",
    params(("club" = String, Path, description = "Exact club name")),
    responses((status = 200, description = "Matching past events", body = RecordList))
)]
pub async fn list_past_events_by_club(
    State(state): State<AppState>,
    Path(club): Path<String>,
) -> Result<Json<RecordList>, ApiError> {
    list_collection(
        &state,
        Collection::PastEvents,
        RecordFilter::field_equals("clubName", &club),
    )
    .await
}

/// get_record
///
/// [Public + Admin Route] Fetches one record by id.
#[utoipa::path(
    get,
    path = "/api/{collection}/{id}",
    params(
        ("collection" = String, Path, description = "Collection slug"),
        ("id" = Uuid, Path, description = "Record id")
    ),
    responses(
        (status = 200, description = "Found", body = RecordEnvelope),
        (status = 400, description = "Malformed id", body = crate::models::ErrorBody),
        (status = 404, description = "Not found", body = crate::models::ErrorBody)
    )
)]
pub async fn get_record(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
) -> Result<Json<RecordEnvelope>, ApiError> {
    let collection: Collection = slug.parse()?;
    let id = parse_id(&id)?;
    let record = state
        .repo
        .get(collection, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(RecordEnvelope::new(record)))
}

/// create_record
///
/// [Admin Route] Creates a record from a multipart form. The form is validated before anything is
/// sent to the media host; if persisting fails afterwards the uploaded object is removed again.
#[utoipa::path(
    post,
    path = "/api/admin/{collection}",
    params(("collection" = String, Path, description = "Collection slug")),
    responses(
        (status = 201, description = "Created", body = RecordEnvelope),
        (status = 400, description = "Validation failed", body = crate::models::ErrorBody),
        (status = 401, description = "Missing, invalid or expired credential", body = crate::models::ErrorBody),
        (status = 403, description = "Role not allowed", body = crate::models::ErrorBody),
        (status = 415, description = "Attachment is not an image", body = crate::models::ErrorBody),
        (status = 502, description = "Media host failure", body = crate::models::ErrorBody)
    )
)]
pub async fn create_record(
    principal: Principal,
    State(state): State<AppState>,
    Path(slug): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<RecordEnvelope>), ApiError> {
    let collection: Collection = slug.parse()?;
    let form = RecordForm::read(multipart).await?;
    let mut fields = collection.validate(form.fields, WriteMode::Create)?;

    let media = match form.attachment {
        Some(upload) => {
            if let (Some(name_field), Some(file_name)) =
                (collection.attachment_name_field(), upload.file_name.as_deref())
            {
                let named = fields
                    .get(name_field)
                    .and_then(Value::as_str)
                    .is_some_and(|name| !name.is_empty());
                if !named {
                    fields.insert(name_field.to_string(), Value::String(file_name.to_string()));
                }
            }
            Some(upload_media(&state, collection, upload).await?)
        }
        None if collection.requires_attachment() => {
            return Err(ApiError::Validation("image is required".to_string()));
        }
        None => None,
    };

    let draft = RecordDraft {
        fields,
        media: media.clone(),
    };
    let record = match state.repo.insert(collection, draft).await {
        Ok(record) => record,
        Err(err) => {
            if let Some(media) = media {
                discard_media(&state, &media.key).await;
            }
            return Err(err.into());
        }
    };

    tracing::info!(%collection, id = %record.id, by = %principal.username, "record created");
    Ok((
        StatusCode::CREATED,
        Json(RecordEnvelope::with_message(record, "Record created")),
    ))
}

/// update_record
///
/// [Admin Route] Partially updates a record. A new attachment replaces the stored reference URL and
/// the previous object is deleted from the media host.
#[utoipa::path(
    put,
    path = "/api/admin/{collection}/{id}",
    params(
        ("collection" = String, Path, description = "Collection slug"),
        ("id" = Uuid, Path, description = "Record id")
    ),
    responses(
        (status = 200, description = "Updated", body = RecordEnvelope),
        (status = 400, description = "Validation failed", body = crate::models::ErrorBody),
        (status = 404, description = "Not found", body = crate::models::ErrorBody)
    )
)]
pub async fn update_record(
    principal: Principal,
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<Json<RecordEnvelope>, ApiError> {
    let collection: Collection = slug.parse()?;
    let id = parse_id(&id)?;
    // Fail before reading or uploading anything for a record that is not there.
    state
        .repo
        .get(collection, id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let form = RecordForm::read(multipart).await?;
    let fields = collection.validate(form.fields, WriteMode::Update)?;
    if fields.is_empty() && form.attachment.is_none() {
        return Err(ApiError::Validation("nothing to update".to_string()));
    }

    let media = match form.attachment {
        Some(upload) => Some(upload_media(&state, collection, upload).await?),
        None => None,
    };

    let patch = RecordPatch {
        fields,
        media: media.clone(),
    };
    let updated = match state.repo.update(collection, id, patch).await {
        Ok(Some(updated)) => updated,
        other => {
            if let Some(media) = &media {
                discard_media(&state, &media.key).await;
            }
            return Err(match other {
                Err(err) => err.into(),
                Ok(_) => ApiError::NotFound,
            });
        }
    };

    if let Some(old_key) = updated.replaced_media_key.as_deref() {
        discard_media(&state, old_key).await;
    }

    tracing::info!(%collection, %id, by = %principal.username, "record updated");
    Ok(Json(RecordEnvelope::with_message(updated.record, "Record updated")))
}

/// delete_record
///
/// [Admin Route] Deletes a record and its media object.
#[utoipa::path(
    delete,
    path = "/api/admin/{collection}/{id}",
    params(
        ("collection" = String, Path, description = "Collection slug"),
        ("id" = Uuid, Path, description = "Record id")
    ),
    responses(
        (status = 200, description = "Deleted", body = RecordEnvelope),
        (status = 404, description = "Not found", body = crate::models::ErrorBody)
    )
)]
pub async fn delete_record(
    principal: Principal,
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
) -> Result<Json<RecordEnvelope>, ApiError> {
    let collection: Collection = slug.parse()?;
    let id = parse_id(&id)?;
    let record = state
        .repo
        .delete(collection, id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if let Some(key) = record.media_key.as_deref() {
        discard_media(&state, key).await;
    }

    tracing::info!(%collection, %id, by = %principal.username, "record deleted");
    Ok(Json(RecordEnvelope::with_message(record, "Record deleted")))
}
