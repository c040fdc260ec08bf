//! Blocking REST client for a remote kbase server.
//!
//! Listing calls degrade to an empty [`EntryListing`] when the server cannot
//! be reached or answers with an error, so a caller rendering a sidebar never
//! fails on a flaky backend. Every other call returns
//! [`Error::OperationFailed`] carrying the server's error message when one
//! could be read.
//!
//! Must not be called from inside an async runtime.

use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::API_PREFIX;
use crate::models::{
    DocumentRemoval, EntryId, EntryListing, EntryUpdate, KnowledgeEntry, NewEntry, ProcessingJob,
    QueryRequest, QueryResult, Scope, ScopeKey, ScopeKind,
};
use crate::{Error, Result};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Client for the `/knowledge-base` REST routes.
#[derive(Debug, Clone)]
pub struct KbClient {
    base: Url,
    http: Client,
}

impl KbClient {
    /// Creates a client for a server such as `http://127.0.0.1:8080`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `base_url` is not an absolute URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::InvalidInput(format!("invalid server URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidInput(format!(
                "invalid server URL '{base_url}'"
            )));
        }

        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!("Failed to build HTTP client: {err}");
                Client::new()
            });

        Ok(Self { base, http })
    }

    /// Lists global entries, or an empty listing on failure.
    #[must_use]
    pub fn list_global(&self, account_id: &str, include_inactive: bool) -> EntryListing {
        self.list(&ScopeKey::global(account_id), include_inactive)
    }

    /// Lists thread entries, or an empty listing on failure.
    #[must_use]
    pub fn list_thread(&self, thread_id: &str, include_inactive: bool) -> EntryListing {
        self.list(&ScopeKey::thread(thread_id), include_inactive)
    }

    /// Lists agent entries, or an empty listing on failure.
    #[must_use]
    pub fn list_agent(&self, agent_id: &str, include_inactive: bool) -> EntryListing {
        self.list(&ScopeKey::agent(agent_id), include_inactive)
    }

    /// Lists a scope's entries, or an empty listing on failure.
    #[must_use]
    pub fn list(&self, scope: &ScopeKey, include_inactive: bool) -> EntryListing {
        let result = self.scope_url(scope, &[]).and_then(|url| {
            let mut request = self
                .http
                .get(url)
                .query(&[("include_inactive", include_inactive)]);
            if scope.kind == ScopeKind::Global {
                request = request.query(&[("account_id", scope.id.as_str())]);
            }
            self.send(request, "list_entries")
        });

        result.unwrap_or_else(|e| {
            tracing::warn!(scope = %scope, error = %e, "Listing entries failed, returning none");
            EntryListing::default()
        })
    }

    /// Creates an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on network or server errors.
    pub fn create(&self, entry: &NewEntry) -> Result<KnowledgeEntry> {
        let url = self.scope_url(&entry.scope.key(), &[])?;
        let body = json!({
            "account_id": entry.scope.account_id(),
            "name": entry.name,
            "description": entry.description,
            "content": entry.content,
            "usage_context": entry.usage_context.as_str(),
        });
        self.send(self.http.post(url).json(&body), "create_entry")
    }

    /// Retrieves an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on network or server errors,
    /// including an unknown id.
    pub fn get(&self, id: &EntryId) -> Result<KnowledgeEntry> {
        let url = self.url(&["entries", id.as_str()])?;
        self.send(self.http.get(url), "get_entry")
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on network or server errors.
    pub fn update(&self, id: &EntryId, update: &EntryUpdate) -> Result<KnowledgeEntry> {
        let url = self.url(&["entries", id.as_str()])?;
        self.send(self.http.put(url).json(update), "update_entry")
    }

    /// Deletes an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on network or server errors.
    pub fn delete(&self, id: &EntryId) -> Result<()> {
        let url = self.url(&["entries", id.as_str()])?;
        let response = self
            .http
            .delete(url)
            .send()
            .map_err(|e| request_error("delete_entry", &e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error("delete_entry", response))
        }
    }

    /// Fetches one scope's context block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on network or server errors.
    pub fn scope_context(&self, scope: &ScopeKey, max_tokens: usize) -> Result<Option<String>> {
        #[derive(serde::Deserialize)]
        struct Body {
            context: Option<String>,
        }

        let url = self.scope_url(scope, &["context"])?;
        let mut request = self.http.get(url).query(&[("max_tokens", max_tokens)]);
        if scope.kind == ScopeKind::Global {
            request = request.query(&[("account_id", scope.id.as_str())]);
        }
        let body: Body = self.send(request, "scope_context")?;
        Ok(body.context)
    }

    /// Fetches the combined context of a conversation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on network or server errors.
    pub fn combined_context(
        &self,
        account_id: &str,
        thread_id: &str,
        agent_id: Option<&str>,
        max_tokens: usize,
    ) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct Body {
            context: String,
        }

        let url = self.url(&["context"])?;
        let mut request = self.http.get(url).query(&[
            ("account_id", account_id),
            ("thread_id", thread_id),
        ]);
        if let Some(agent_id) = agent_id {
            request = request.query(&[("agent_id", agent_id)]);
        }
        let request = request.query(&[("max_tokens", max_tokens)]);
        let body: Body = self.send(request, "combined_context")?;
        Ok(body.context)
    }

    /// Fetches an upload's processing job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on network or server errors.
    pub fn job_status(&self, job_id: &str) -> Result<ProcessingJob> {
        let url = self.url(&["documents", "status", job_id])?;
        self.send(self.http.get(url), "job_status")
    }

    /// Lists a scope's most recent upload jobs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on network or server errors.
    pub fn jobs(&self, scope: &ScopeKey, limit: usize) -> Result<Vec<ProcessingJob>> {
        let url = self.scope_url(scope, &["processing-jobs"])?;
        let mut request = self.http.get(url).query(&[("limit", limit)]);
        if scope.kind == ScopeKind::Global {
            request = request.query(&[("account_id", scope.id.as_str())]);
        }
        self.send(request, "list_jobs")
    }

    /// Deletes an uploaded document and its processing jobs from a scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on network or server errors.
    pub fn delete_document(&self, scope: &Scope, filename: &str) -> Result<DocumentRemoval> {
        let url = self.url(&["documents", filename])?;
        let mut request = self.http.delete(url).query(&[
            ("kb_type", scope.kind().as_str()),
            ("account_id", scope.account_id()),
        ]);
        match scope {
            Scope::Global { .. } => {},
            Scope::Thread { thread_id, .. } => {
                request = request.query(&[("thread_id", thread_id.as_str())]);
            },
            Scope::Agent { agent_id, .. } => {
                request = request.query(&[("agent_id", agent_id.as_str())]);
            },
        }
        self.send(request, "delete_document")
    }

    /// Runs a free-text query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on network or server errors.
    pub fn query(&self, request: &QueryRequest) -> Result<QueryResult> {
        let url = self.url(&["query"])?;
        self.send(self.http.post(url).json(request), "query")
    }

    fn scope_url(&self, scope: &ScopeKey, tail: &[&str]) -> Result<Url> {
        let mut segments: Vec<&str> = match scope.kind {
            ScopeKind::Global => vec!["global"],
            ScopeKind::Thread => vec!["threads", scope.id.as_str()],
            ScopeKind::Agent => vec!["agents", scope.id.as_str()],
        };
        segments.extend_from_slice(tail);
        self.url(&segments)
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidInput(format!("invalid server URL '{}'", self.base)))?
            .pop_if_empty()
            .push(API_PREFIX.trim_start_matches('/'))
            .extend(segments);
        Ok(url)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder, operation: &str) -> Result<T> {
        let response = request.send().map_err(|e| request_error(operation, &e))?;
        if !response.status().is_success() {
            return Err(status_error(operation, response));
        }
        response
            .json::<T>()
            .map_err(|e| Error::failed(operation, format!("invalid response body: {e}")))
    }
}

fn request_error(operation: &str, e: &reqwest::Error) -> Error {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else {
        "request"
    };
    tracing::debug!(operation, error = %e, kind, "HTTP request failed");
    Error::failed(operation, format!("{kind} error: {e}"))
}

fn status_error(operation: &str, response: reqwest::blocking::Response) -> Error {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    Error::failed(operation, format!("server returned {status}: {}", error_detail(&body)))
}

/// Best-effort extraction of the message from an error body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["error", "detail", "message"]
                .iter()
                .find_map(|key| v.get(key).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail() {
        assert_eq!(error_detail(r#"{"error":"entry not found: x"}"#), "entry not found: x");
        assert_eq!(error_detail(r#"{"detail":"Job not found"}"#), "Job not found");
        assert_eq!(error_detail("  plain text \n"), "plain text");
    }

    #[test]
    fn test_urls() {
        let client = KbClient::new("http://localhost:8080").unwrap();
        let url = client.scope_url(&ScopeKey::thread("t 1"), &["context"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/knowledge-base/threads/t%201/context");

        let url = client.url(&["entries", "abc"]).unwrap();
        assert_eq!(url.path(), "/knowledge-base/entries/abc");

        let url = client.url(&["documents", "q3 report.pdf"]).unwrap();
        assert_eq!(url.path(), "/knowledge-base/documents/q3%20report.pdf");
    }

    #[test]
    fn test_rejects_relative_url() {
        assert!(matches!(KbClient::new("not a url"), Err(Error::InvalidInput(_))));
        assert!(matches!(KbClient::new("mailto:a@b"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_unreachable_server_degrades_listing() {
        // Port 9 (discard) is closed on test machines; the connect fails fast.
        let client = KbClient::new("http://127.0.0.1:9").unwrap();
        let listing = client.list_global("acct", false);
        assert_eq!(listing, EntryListing::default());

        let err = client.get(&EntryId::new("abc")).unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }));
    }
}
