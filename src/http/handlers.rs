//! Request handlers for the `/knowledge-base` routes.
//!
//! The store is synchronous, so every store call runs on the blocking pool.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use crate::models::{
    DocumentChunk, DocumentRemoval, EntryId, EntryListing, EntryUpdate, KnowledgeEntry, NewEntry,
    ProcessingJob, QueryLogEntry, QueryRequest, QueryResult, Scope, ScopeKey, ScopeKind,
    UsageContext,
};
use crate::services::{DocumentProcessor, KnowledgeBase, SupportedFormat, UploadRequest};
use crate::Error;

/// Shared handler state.
pub type AppState = Arc<KnowledgeBase>;

/// Query string of list routes.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Account owning global entries.
    pub account_id: Option<String>,
    /// Include deactivated entries.
    #[serde(default)]
    pub include_inactive: bool,
}

/// Query string of scope context routes.
#[derive(Debug, Default, Deserialize)]
pub struct ContextParams {
    /// Account owning global entries.
    pub account_id: Option<String>,
    /// Token budget; the configured default when absent.
    pub max_tokens: Option<usize>,
}

/// Query string of the combined context route.
#[derive(Debug, Default, Deserialize)]
pub struct CombinedParams {
    /// Account whose global entries are used.
    pub account_id: Option<String>,
    /// Conversation thread.
    pub thread_id: Option<String>,
    /// Agent, if any.
    pub agent_id: Option<String>,
    /// Token budget; the configured default when absent.
    pub max_tokens: Option<usize>,
}

/// Query string of processing job routes.
#[derive(Debug, Default, Deserialize)]
pub struct JobsParams {
    /// Account owning global jobs.
    pub account_id: Option<String>,
    /// Maximum number of jobs; 10 when absent.
    pub limit: Option<usize>,
}

/// Query string selecting a document scope.
#[derive(Debug, Default, Deserialize)]
pub struct DocumentParams {
    /// `global`, `thread` or `agent`; `global` when absent.
    pub kb_type: Option<String>,
    /// Owning account.
    pub account_id: Option<String>,
    /// Thread, for `kb_type=thread`.
    pub thread_id: Option<String>,
    /// Agent, for `kb_type=agent`.
    pub agent_id: Option<String>,
}

/// Query string of the document chunks route.
#[derive(Debug, Default, Deserialize)]
pub struct ChunkParams {
    /// `global`, `thread` or `agent`; `global` when absent.
    pub kb_type: Option<String>,
    /// Owning account.
    pub account_id: Option<String>,
    /// Thread, for `kb_type=thread`.
    pub thread_id: Option<String>,
    /// Agent, for `kb_type=agent`.
    pub agent_id: Option<String>,
    /// Keep only chunks containing a term of this text.
    pub query: Option<String>,
    /// Maximum number of chunks; 10 when absent.
    pub limit: Option<usize>,
}

/// Query string of the query log route.
#[derive(Debug, Default, Deserialize)]
pub struct QueryLogParams {
    /// Account whose queries are listed.
    pub account_id: Option<String>,
    /// Maximum number of queries; 20 when absent.
    pub limit: Option<usize>,
}

/// Body of create routes.
#[derive(Debug, Deserialize)]
pub struct CreateEntryBody {
    /// Owning account.
    pub account_id: Option<String>,
    /// Entry name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Entry text.
    pub content: String,
    /// `always`, `on_request` or `contextual`.
    pub usage_context: Option<String>,
}

/// Body of the update route. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEntryBody {
    /// New name.
    pub name: Option<String>,
    /// New description; an empty string clears it.
    pub description: Option<String>,
    /// New content.
    pub content: Option<String>,
    /// New usage context.
    pub usage_context: Option<String>,
    /// Activate or deactivate.
    pub is_active: Option<bool>,
}

/// Body of the query route.
#[derive(Debug, Deserialize)]
pub struct QueryBody {
    /// Query text.
    pub query: String,
    /// Account whose global entries are searched.
    pub account_id: String,
    /// Thread to search too.
    pub thread_id: Option<String>,
    /// Agent to search too.
    pub agent_id: Option<String>,
    /// Chunk limit; the configured default when absent.
    pub max_chunks: Option<usize>,
}

/// Response of scope context routes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScopeContextResponse {
    /// Rendered block, `null` when nothing fits.
    pub context: Option<String>,
    /// Budget used.
    pub max_tokens: usize,
    /// Scope kind.
    pub scope: ScopeKind,
    /// Account, thread or agent id.
    pub scope_id: String,
}

/// Response of the combined context route.
#[derive(Debug, Serialize, Deserialize)]
pub struct CombinedContextResponse {
    /// Joined scope blocks, empty when nothing fits.
    pub context: String,
    /// Budget used.
    pub max_tokens: usize,
}

/// Response of the upload route.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadAccepted {
    /// Human-readable summary.
    pub message: String,
    /// Job to poll.
    pub job_id: String,
    /// Always `pending`.
    pub status: String,
    /// Stored file name.
    pub filename: String,
}

/// Response of the document chunks route.
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentChunksResponse {
    /// Matching chunks, newest document first.
    pub chunks: Vec<DocumentChunk>,
    /// Number of chunks returned.
    pub total_count: usize,
    /// Scope kind.
    pub kb_type: ScopeKind,
    /// Account, thread or agent id.
    pub scope_id: String,
    /// Filter applied, if any.
    pub query: Option<String>,
}

/// Response of the supported formats route.
#[derive(Debug, Serialize)]
pub struct SupportedFormatsResponse {
    /// Formats with a dedicated extractor.
    pub supported_formats: &'static [SupportedFormat],
    /// Number of formats.
    pub total_formats: usize,
}

/// Default `limit` of the processing job routes.
const DEFAULT_JOB_LIMIT: usize = 10;

/// Default `limit` of the document chunks route.
const DEFAULT_CHUNK_LIMIT: usize = 10;

/// Default `limit` of the query log route.
const DEFAULT_QUERY_LOG_LIMIT: usize = 20;

/// Runs a store-backed call on the blocking pool.
async fn blocking<T, F>(state: &AppState, call: F) -> ApiResult<T>
where
    F: FnOnce(&KnowledgeBase) -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let kb = Arc::clone(state);
    tokio::task::spawn_blocking(move || call(&kb))
        .await
        .map_err(|e| Error::failed("spawn_blocking", e))?
        .map_err(ApiError::from)
}

fn required(value: Option<String>, field: &str) -> crate::Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::InvalidInput(format!("{field} is required")))
}

fn parse_usage(value: Option<&str>) -> crate::Result<Option<UsageContext>> {
    value
        .map(|v| {
            UsageContext::parse(v)
                .ok_or_else(|| Error::InvalidInput(format!("unknown usage context: {v}")))
        })
        .transpose()
}

/// Resolves a `kb_type` selector and its ids into a scope.
fn scope_from(
    kind: Option<String>,
    account_id: Option<String>,
    thread_id: Option<String>,
    agent_id: Option<String>,
) -> crate::Result<Scope> {
    let account_id = required(account_id, "account_id")?;
    let kind = kind
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| ScopeKind::Global.as_str().to_string());
    match ScopeKind::parse(&kind) {
        Some(ScopeKind::Global) => Ok(Scope::global(account_id)),
        Some(ScopeKind::Thread) => Ok(Scope::thread(account_id, required(thread_id, "thread_id")?)),
        Some(ScopeKind::Agent) => Ok(Scope::agent(account_id, required(agent_id, "agent_id")?)),
        None => Err(Error::InvalidInput(format!("unknown kb_type: {kind}"))),
    }
}

async fn create_in(
    state: &AppState,
    scope: Scope,
    body: CreateEntryBody,
) -> ApiResult<(StatusCode, Json<KnowledgeEntry>)> {
    let mut entry = NewEntry::new(scope, body.name, body.content);
    entry.description = body.description;
    if let Some(usage) = parse_usage(body.usage_context.as_deref())? {
        entry.usage_context = usage;
    }
    let created = blocking(state, move |kb| kb.entries().create(entry)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_in(state: &AppState, scope: ScopeKey, include_inactive: bool) -> ApiResult<Json<EntryListing>> {
    let listing = blocking(state, move |kb| kb.entries().list(&scope, include_inactive)).await?;
    Ok(Json(listing))
}

async fn scope_context(
    state: &AppState,
    scope: ScopeKey,
    max_tokens: Option<usize>,
) -> ApiResult<Json<ScopeContextResponse>> {
    let max_tokens = max_tokens.unwrap_or(state.config().context.default_max_tokens);
    let key = scope.clone();
    let context = blocking(state, move |kb| kb.context().scope_context(&key, max_tokens)).await?;
    Ok(Json(ScopeContextResponse {
        context,
        max_tokens,
        scope: scope.kind,
        scope_id: scope.id,
    }))
}

async fn jobs_in(state: &AppState, scope: ScopeKey, limit: Option<usize>) -> ApiResult<Json<Vec<ProcessingJob>>> {
    let limit = limit.unwrap_or(DEFAULT_JOB_LIMIT);
    let mut jobs = blocking(state, move |kb| kb.uploads().jobs(&scope)).await?;
    jobs.truncate(limit);
    Ok(Json(jobs))
}

/// `GET /global`
pub async fn list_global(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<EntryListing>> {
    let Query(params) = params?;
    let account_id = required(params.account_id, "account_id")?;
    list_in(&state, ScopeKey::global(account_id), params.include_inactive).await
}

/// `POST /global`
pub async fn create_global(
    State(state): State<AppState>,
    body: Result<Json<CreateEntryBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<KnowledgeEntry>)> {
    let Json(mut body) = body?;
    let account_id = required(body.account_id.take(), "account_id")?;
    create_in(&state, Scope::global(account_id), body).await
}

/// `GET /global/context`
pub async fn global_context(
    State(state): State<AppState>,
    params: Result<Query<ContextParams>, QueryRejection>,
) -> ApiResult<Json<ScopeContextResponse>> {
    let Query(params) = params?;
    let account_id = required(params.account_id, "account_id")?;
    scope_context(&state, ScopeKey::global(account_id), params.max_tokens).await
}

/// `GET /global/processing-jobs`
pub async fn global_jobs(
    State(state): State<AppState>,
    params: Result<Query<JobsParams>, QueryRejection>,
) -> ApiResult<Json<Vec<ProcessingJob>>> {
    let Query(params) = params?;
    let account_id = required(params.account_id, "account_id")?;
    jobs_in(&state, ScopeKey::global(account_id), params.limit).await
}

/// `GET /threads/{thread_id}`
pub async fn list_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<EntryListing>> {
    let Query(params) = params?;
    list_in(&state, ScopeKey::thread(thread_id), params.include_inactive).await
}

/// `POST /threads/{thread_id}`
pub async fn create_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    body: Result<Json<CreateEntryBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<KnowledgeEntry>)> {
    let Json(mut body) = body?;
    let account_id = required(body.account_id.take(), "account_id")?;
    create_in(&state, Scope::thread(account_id, thread_id), body).await
}

/// `GET /threads/{thread_id}/context`
pub async fn thread_context(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    params: Result<Query<ContextParams>, QueryRejection>,
) -> ApiResult<Json<ScopeContextResponse>> {
    let Query(params) = params?;
    scope_context(&state, ScopeKey::thread(thread_id), params.max_tokens).await
}

/// `GET /threads/{thread_id}/processing-jobs`
pub async fn thread_jobs(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    params: Result<Query<JobsParams>, QueryRejection>,
) -> ApiResult<Json<Vec<ProcessingJob>>> {
    let Query(params) = params?;
    jobs_in(&state, ScopeKey::thread(thread_id), params.limit).await
}

/// `GET /agents/{agent_id}`
pub async fn list_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<EntryListing>> {
    let Query(params) = params?;
    list_in(&state, ScopeKey::agent(agent_id), params.include_inactive).await
}

/// `POST /agents/{agent_id}`
pub async fn create_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    body: Result<Json<CreateEntryBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<KnowledgeEntry>)> {
    let Json(mut body) = body?;
    let account_id = required(body.account_id.take(), "account_id")?;
    create_in(&state, Scope::agent(account_id, agent_id), body).await
}

/// `GET /agents/{agent_id}/context`
pub async fn agent_context(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    params: Result<Query<ContextParams>, QueryRejection>,
) -> ApiResult<Json<ScopeContextResponse>> {
    let Query(params) = params?;
    scope_context(&state, ScopeKey::agent(agent_id), params.max_tokens).await
}

/// `GET /agents/{agent_id}/processing-jobs`
pub async fn agent_jobs(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    params: Result<Query<JobsParams>, QueryRejection>,
) -> ApiResult<Json<Vec<ProcessingJob>>> {
    let Query(params) = params?;
    jobs_in(&state, ScopeKey::agent(agent_id), params.limit).await
}

/// `GET /entries/{entry_id}`
pub async fn get_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> ApiResult<Json<KnowledgeEntry>> {
    let id = EntryId::new(entry_id);
    Ok(Json(blocking(&state, move |kb| kb.entries().get(&id)).await?))
}

/// `PUT /entries/{entry_id}`
pub async fn update_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    body: Result<Json<UpdateEntryBody>, JsonRejection>,
) -> ApiResult<Json<KnowledgeEntry>> {
    let Json(body) = body?;
    let update = EntryUpdate {
        usage_context: parse_usage(body.usage_context.as_deref())?,
        name: body.name,
        description: body.description,
        content: body.content,
        is_active: body.is_active,
    };
    let id = EntryId::new(entry_id);
    let entry = blocking(&state, move |kb| kb.entries().update(None, &id, update)).await?;
    Ok(Json(entry))
}

/// `DELETE /entries/{entry_id}`
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = EntryId::new(entry_id);
    blocking(&state, move |kb| kb.entries().delete(None, &id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /context`
pub async fn combined_context(
    State(state): State<AppState>,
    params: Result<Query<CombinedParams>, QueryRejection>,
) -> ApiResult<Json<CombinedContextResponse>> {
    let Query(params) = params?;
    let account_id = required(params.account_id, "account_id")?;
    let thread_id = required(params.thread_id, "thread_id")?;
    let agent_id = params.agent_id.filter(|a| !a.trim().is_empty());
    let max_tokens = params
        .max_tokens
        .unwrap_or(state.config().context.default_max_tokens);

    let context = blocking(&state, move |kb| {
        kb.context()
            .combined_context(&account_id, &thread_id, agent_id.as_deref(), max_tokens)
    })
    .await?;
    Ok(Json(CombinedContextResponse {
        context,
        max_tokens,
    }))
}

/// `POST /upload`
///
/// Multipart fields: `file`, `kb_type` (`global`, `thread` or `agent`),
/// `account_id`, `thread_id`, `agent_id`, `description`, `usage_context`.
/// Answers `202 Accepted` with the pending job; extraction continues in the
/// background.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadAccepted>)> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let mime_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?;
            file = Some((filename, mime_type, bytes.to_vec()));
        } else {
            let value = field.text().await?;
            fields.insert(name, value);
        }
    }

    let (filename, mime_type, bytes) =
        file.ok_or_else(|| Error::InvalidInput("file is required".to_string()))?;
    let scope = scope_from(
        fields.remove("kb_type"),
        fields.remove("account_id"),
        fields.remove("thread_id"),
        fields.remove("agent_id"),
    )?;

    let mut request = UploadRequest::new(scope, filename);
    request.mime_type = mime_type;
    request.description = fields.remove("description");
    if let Some(usage) = parse_usage(fields.remove("usage_context").as_deref())? {
        request.usage_context = usage;
    }

    let (job, request, bytes) = blocking(&state, move |kb| {
        let job = kb.uploads().enqueue(&request, &bytes)?;
        Ok((job, request, bytes))
    })
    .await?;
    let accepted = UploadAccepted {
        message: "Document uploaded successfully".to_string(),
        job_id: job.id.clone(),
        status: job.status.to_string(),
        filename: job.filename.clone(),
    };

    let background = Arc::clone(&state);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = background.uploads().process(&job, &request, &bytes) {
            tracing::error!(job_id = %job.id, error = %e, "Upload processing failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// `GET /documents/status/{job_id}`
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ProcessingJob>> {
    Ok(Json(blocking(&state, move |kb| kb.uploads().job_status(&job_id)).await?))
}

/// `DELETE /documents/{filename}`
///
/// Answers `200` with the removal counts, which are zero when nothing matched.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    params: Result<Query<DocumentParams>, QueryRejection>,
) -> ApiResult<Json<DocumentRemoval>> {
    let Query(params) = params?;
    let scope = scope_from(params.kb_type, params.account_id, params.thread_id, params.agent_id)?;
    let removal = blocking(&state, move |kb| kb.entries().delete_document(&scope, &filename)).await?;
    Ok(Json(removal))
}

/// `GET /documents/chunks`
pub async fn document_chunks(
    State(state): State<AppState>,
    params: Result<Query<ChunkParams>, QueryRejection>,
) -> ApiResult<Json<DocumentChunksResponse>> {
    let Query(params) = params?;
    let scope = scope_from(params.kb_type, params.account_id, params.thread_id, params.agent_id)?.key();
    let query = params.query.filter(|q| !q.trim().is_empty());
    let limit = params.limit.unwrap_or(DEFAULT_CHUNK_LIMIT);

    let key = scope.clone();
    let filter = query.clone();
    let chunks = blocking(&state, move |kb| {
        kb.query().document_chunks(&key, filter.as_deref(), limit)
    })
    .await?;
    Ok(Json(DocumentChunksResponse {
        total_count: chunks.len(),
        chunks,
        kb_type: scope.kind,
        scope_id: scope.id,
        query,
    }))
}

/// `GET /documents/supported-formats`
pub async fn supported_formats() -> Json<SupportedFormatsResponse> {
    let formats = DocumentProcessor::format_details();
    Json(SupportedFormatsResponse {
        supported_formats: formats,
        total_formats: formats.len(),
    })
}

/// `POST /query`
pub async fn query(
    State(state): State<AppState>,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> ApiResult<Json<QueryResult>> {
    let Json(body) = body?;
    let request = QueryRequest {
        query: body.query,
        account_id: body.account_id,
        thread_id: body.thread_id,
        agent_id: body.agent_id,
        max_chunks: body.max_chunks.unwrap_or(state.config().query.max_chunks),
    };
    Ok(Json(blocking(&state, move |kb| kb.query().query(&request)).await?))
}

/// `GET /query/logs`
pub async fn query_logs(
    State(state): State<AppState>,
    params: Result<Query<QueryLogParams>, QueryRejection>,
) -> ApiResult<Json<Vec<QueryLogEntry>>> {
    let Query(params) = params?;
    let account_id = required(params.account_id, "account_id")?;
    let limit = params.limit.unwrap_or(DEFAULT_QUERY_LOG_LIMIT);
    let logs = blocking(&state, move |kb| kb.query().recent_queries(&account_id, limit)).await?;
    Ok(Json(logs))
}
