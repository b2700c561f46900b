// Search session: start a search with a POST, poll it with conditional GETs,
// restart it through the link the API hands out

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::client::{Client, FetchOutcome};
use crate::config::{DocumentKind, TapiConfig};
use crate::document::{Document, FetchOptions, Value};
use crate::errors::{Result, TapiError};
use crate::utils::{Param, Params};
use crate::validations::Validate;

const SEARCH: &str = "search";
const SEARCH_URL: &str = "search_url";
const RESTART_URL: &str = "restart_url";

// A search the API can run: where it is posted and what it sends
pub trait SearchQuery: Validate + Send + Sync {
    // Name used when reporting unknown fields on the session
    const NAME: &'static str;

    fn item_path(&self) -> &'static str;

    fn parameters(&self, config: &TapiConfig) -> Params;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Started,
    Refreshed,
    Restarted,
}

pub struct SearchSession<S> {
    client: Client,
    query: S,
    document: Option<Document>,
    resource_urls: Option<BTreeMap<String, String>>,
    etag: Option<String>,
    started_at: Option<DateTime<Utc>>,
    start_time: Option<Duration>,
    id: Option<String>,
    state: SessionState,
}

impl<S: SearchQuery> SearchSession<S> {
    pub fn new(client: Client, query: S) -> Self {
        Self {
            client,
            query,
            document: None,
            resource_urls: None,
            etag: None,
            started_at: None,
            start_time: None,
            id: None,
            state: SessionState::Unstarted,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn query(&self) -> &S {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut S {
        &mut self.query
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn resource_urls(&self) -> Option<&BTreeMap<String, String>> {
        self.resource_urls.as_ref()
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    // Latency of the starting POST
    pub fn start_time(&self) -> Option<Duration> {
        self.start_time
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn id(&self) -> Option<String> {
        self.id
            .clone()
            .or_else(|| self.document.as_ref().and_then(Document::id))
    }

    pub fn api_url(&self) -> String {
        self.client.config().api_url()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.client.config().key.as_deref()
    }

    pub fn post_url(&self) -> String {
        format!("{}/{}/searches.json", self.api_url(), self.query.item_path())
    }

    // GET `<api_url><path>.json` with the API key attached
    pub async fn get(&self, path: &str, params: Params) -> Result<Document> {
        let mut params = params;
        params.insert("key".to_string(), Param::from(self.api_key().map(str::to_string)));
        let url = format!("{}{}.json", self.api_url(), path);

        match self
            .client
            .new_from_get(&url, &params, DocumentKind::default(), None)
            .await?
        {
            FetchOutcome::Fetched { document, .. } => Ok(document),
            FetchOutcome::Unchanged { .. } => Err(TapiError::NotCached(url)),
        }
    }

    // Refuses invalid queries; nothing is sent in that case
    pub async fn start(&mut self) -> Result<()> {
        if !self.query.is_valid() {
            return Err(TapiError::InvalidSearch(self.query.errors().clone()));
        }

        let params = self.query.parameters(self.client.config());
        let post_url = self.post_url();

        let started_at = Utc::now();
        let timer = Instant::now();
        let root = self.client.new_from_post(&post_url, &params).await?;
        let start_time = timer.elapsed();
        let search = root.into_document(SEARCH)?;

        debug!(
            url = %post_url,
            latency_ms = start_time.as_millis() as u64,
            "{} started",
            S::NAME
        );

        self.resource_urls = Some(search.urls());
        self.document = Some(search);
        self.etag = None;
        self.started_at = Some(started_at);
        self.start_time = Some(start_time);
        self.state = SessionState::Started;
        Ok(())
    }

    // Polls the search link; the document is only replaced when the ETag moved
    pub async fn load_client(&mut self) -> Result<()> {
        let Some(url) = self.resource_url(SEARCH_URL) else {
            return Ok(());
        };

        let outcome = self
            .client
            .new_from_get(&url, &Params::new(), DocumentKind::default(), self.etag.as_deref())
            .await?;

        if let FetchOutcome::Fetched { document, etag } = outcome {
            if etag != self.etag {
                self.document = Some(document.into_document(SEARCH)?);
                self.etag = etag;
                self.state = SessionState::Refreshed;
            } else {
                debug!(url = %url, "Search unchanged.");
            }
        }
        Ok(())
    }

    pub async fn restart(&mut self) -> Result<()> {
        let Some(url) = self.resource_url(RESTART_URL) else {
            return Ok(());
        };

        self.client.new_from_post(&url, &Params::new()).await?;
        self.state = SessionState::Restarted;
        self.load_client().await
    }

    pub async fn reload(&mut self) -> Result<&mut Self> {
        self.load_client().await?;
        Ok(self)
    }

    fn resource_url(&self, name: &str) -> Option<String> {
        self.resource_urls
            .as_ref()
            .and_then(|urls| urls.get(name))
            .cloned()
    }

    fn not_found(&self, name: &str) -> TapiError {
        TapiError::method_not_found(name, S::NAME)
    }

    // Delegated to the search document; unknown names are reported against the session
    pub fn field(&self, name: &str) -> Result<&Value> {
        self.document
            .as_ref()
            .and_then(|document| document.get(name))
            .ok_or_else(|| self.not_found(name))
    }

    pub fn responds_to(&self, name: &str) -> bool {
        self.document
            .as_ref()
            .map_or(false, |document| document.responds_to(name))
    }

    pub async fn fetch_resource(&self, name: &str, options: FetchOptions) -> Result<Arc<Document>> {
        let document = self.document.as_ref().ok_or_else(|| self.not_found(name))?;

        document
            .fetch_resource(&self.client, name, options)
            .await
            .map_err(|err| match err {
                TapiError::MethodNotFound { name, .. } => self.not_found(&name),
                other => other,
            })
    }
}
