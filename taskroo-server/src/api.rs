//! HTTP surface over the task and tag stores.
//!
//! Authentication happens in front of this service: the fronting layer
//! forwards the caller's owner id in a trusted header (`x-owner-id` by
//! default) and every handler scopes its store call to that owner.
//!
//! | Method | Path                                    | Operation            |
//! |--------|-----------------------------------------|----------------------|
//! | GET    | `/tasks`                                | forest, or filtered  |
//! | POST   | `/tasks`                                | insert               |
//! | PUT    | `/tasks/{id}`                           | update               |
//! | DELETE | `/tasks/{id}`                           | remove subtree       |
//! | POST   | `/tasks/{id}`                           | move to top level    |
//! | POST   | `/tasks/{parent_id}/subtasks/{sub_id}`  | add subtask          |
//! | GET    | `/tags`                                 | list with task count |
//! | POST   | `/tags`                                 | create               |
//! | PUT    | `/tags/{id}`                            | update               |
//! | DELETE | `/tags/{id}`                            | remove               |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Json, Path, Query, State};
use axum::http::header::{InvalidHeaderName, LOCATION};
use axum::http::request::Parts;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskroo_domain::{OwnerId, Tag, TagDraft, TagId, Task, TaskDraft, TaskId, TaskTree};
use taskroo_store::{
    Collection, MemoryCollection, StoreError, TagInsert, TagStore, TagStoreError, TaskStore,
    TaskStoreError,
};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared state handed to every handler.
#[derive(Debug)]
pub struct AppState {
    tasks: TaskStore,
    owner_header: HeaderName,
}

impl AppState {
    /// Creates state over an existing task store.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHeaderName`] if `owner_header` is not a valid
    /// header name.
    pub fn new(tasks: TaskStore, owner_header: &str) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            tasks,
            owner_header: HeaderName::from_bytes(owner_header.as_bytes())?,
        })
    }

    /// Creates state backed by fresh in-memory collections.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHeaderName`] if `owner_header` is not a valid
    /// header name.
    pub fn in_memory(owner_header: &str) -> Result<Self, InvalidHeaderName> {
        let tasks: Arc<dyn Collection> = Arc::new(MemoryCollection::new());
        let tags = TagStore::new(Arc::new(MemoryCollection::new()), tasks.clone());
        Self::new(TaskStore::new(tasks, tags), owner_header)
    }

    fn tags(&self) -> &TagStore {
        self.tasks.tags()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed request, mapped onto an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The owner header is missing or empty.
    #[error("missing owner identity")]
    Unauthorized,
    /// The addressed resource does not exist for the caller.
    #[error("{0}")]
    NotFound(String),
    /// The request is structurally invalid.
    #[error("{0}")]
    BadRequest(String),
    /// A concurrent change prevented the request from completing.
    #[error("{0}")]
    Conflict(String),
    /// The store failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TaskStoreError> for ApiError {
    fn from(e: TaskStoreError) -> Self {
        match e {
            TaskStoreError::NotFound(id) => Self::NotFound(format!("task {id} not found")),
            TaskStoreError::Unsupported(msg) => Self::BadRequest(msg),
            TaskStoreError::ConcurrentModification(msg) => Self::Conflict(msg),
            TaskStoreError::Store(e) => e.into(),
        }
    }
}

impl From<TagStoreError> for ApiError {
    fn from(e: TagStoreError) -> Self {
        match e {
            TagStoreError::NotFound(id) => Self::NotFound(format!("tag {id} not found")),
            TagStoreError::NameConflict(name) => {
                Self::BadRequest(format!("tag with name {name} already exists"))
            }
            TagStoreError::Unsupported(msg) => Self::BadRequest(msg),
            TagStoreError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "request failed"),
            Self::BadRequest(_) | Self::Conflict(_) => {
                tracing::warn!(status = %status, error = %self, "request rejected");
            }
            Self::Unauthorized | Self::NotFound(_) => {
                tracing::debug!(status = %status, error = %self, "request rejected");
            }
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Extractors and wire types
// ---------------------------------------------------------------------------

/// The authenticated caller, read from the configured owner header.
#[derive(Debug, Clone)]
pub struct Owner(pub OwnerId);

impl FromRequestParts<Arc<AppState>> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(&state.owner_header)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| OwnerId::new(v).ok())
            .map(Self)
            .ok_or(ApiError::Unauthorized)
    }
}

fn task_id(raw: &str) -> Result<TaskId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("task {raw} not found")))
}

fn tag_id(raw: &str) -> Result<TagId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("tag {raw} not found")))
}

/// Filters accepted by `GET /tasks`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskQuery {
    finished: Option<bool>,
    closed_date_after: Option<DateTime<Utc>>,
    closed_date_before: Option<DateTime<Utc>>,
}

/// A tag as returned to clients; `size` is the number of unfinished tasks
/// carrying it and only appears in listings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TagView {
    id: TagId,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    visible_in_work_view: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
}

impl TagView {
    fn new(tag: Tag, size: Option<usize>) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            color: tag.color,
            visible_in_work_view: tag.visible_in_work_view,
            size,
        }
    }
}

// ---------------------------------------------------------------------------
// Task handlers
// ---------------------------------------------------------------------------

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Query(query): Query<TaskQuery>,
) -> Result<Json<Vec<TaskTree>>, ApiError> {
    let forest = match query.finished {
        None => state.tasks.find_all_by_owner(&owner)?,
        Some(false) => state.tasks.find_unfinished_by_owner(&owner)?,
        Some(true) => state.tasks.find_finished_closed_between(
            &owner,
            query.closed_date_after,
            query.closed_date_before,
        )?,
    };
    tracing::debug!(owner_id = %owner, tasks = forest.len(), "listing tasks");
    Ok(Json(forest.to_trees()))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Json(draft): Json<TaskDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.tasks.insert(&owner, draft)?;
    let location = format!("tasks/{}", task.id);
    Ok((StatusCode::CREATED, [(LOCATION, location)], Json(task)))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    Json(draft): Json<TaskDraft>,
) -> Result<Json<Task>, ApiError> {
    let id = task_id(&id)?;
    Ok(Json(state.tasks.update(&owner, &id, &draft)?))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = task_id(&id)?;
    state.tasks.remove(&owner, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_subtask(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path((parent_id, subtask_id)): Path<(String, String)>,
) -> Result<Json<TaskTree>, ApiError> {
    let parent_id = task_id(&parent_id)?;
    let subtask_id = task_id(&subtask_id)?;
    Ok(Json(state.tasks.add_subtask(&owner, &parent_id, &subtask_id)?))
}

async fn move_to_top_level(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<TaskTree>, ApiError> {
    let id = task_id(&id)?;
    Ok(Json(state.tasks.move_to_top_level(&owner, &id)?))
}

// ---------------------------------------------------------------------------
// Tag handlers
// ---------------------------------------------------------------------------

async fn list_tags(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
) -> Result<Json<Vec<TagView>>, ApiError> {
    let counts = state.tags().unfinished_task_counts(&owner)?;
    let tags = state
        .tags()
        .all_for_owner(&owner)?
        .into_iter()
        .map(|tag| {
            let size = counts.get(&tag.id).copied().unwrap_or_default();
            TagView::new(tag, Some(size))
        })
        .collect();
    Ok(Json(tags))
}

async fn create_tag(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Json(draft): Json<TagDraft>,
) -> Result<Response, ApiError> {
    let response = match state.tags().insert(&owner, &draft)? {
        TagInsert::Created(tag) => {
            let location = format!("tags/{}", tag.id);
            (
                StatusCode::CREATED,
                [(LOCATION, location)],
                Json(TagView::new(tag, None)),
            )
                .into_response()
        }
        TagInsert::AlreadyExists(tag) => Json(TagView::new(tag, None)).into_response(),
    };
    Ok(response)
}

async fn update_tag(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    Json(draft): Json<TagDraft>,
) -> Result<Json<TagView>, ApiError> {
    let id = tag_id(&id)?;
    let tag = state.tags().update(&owner, &id, &draft)?;
    Ok(Json(TagView::new(tag, None)))
}

async fn delete_tag(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = tag_id(&id)?;
    state.tags().remove(&owner, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Router and server
// ---------------------------------------------------------------------------

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            put(update_task).delete(delete_task).post(move_to_top_level),
        )
        .route("/tasks/{parent_id}/subtasks/{subtask_id}", post(add_subtask))
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/{id}", put(update_tag).delete(delete_tag))
        .with_state(state)
}

/// Starts the server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>>
{
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}
