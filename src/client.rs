// Request execution for the travel API
// Turns GET/POST calls into documents and maps failing status codes to errors

use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::{DocumentKind, TapiConfig};
use crate::document::Document;
use crate::errors::{HttpFailure, Result, TapiError};
use crate::transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
use crate::utils::{append_query, form_fields, Params};

// Result of a conditional GET
#[derive(Debug)]
pub enum FetchOutcome {
    // The server sent back the ETag we already hold; the body was not parsed
    Unchanged { etag: String },
    Fetched {
        document: Document,
        etag: Option<String>,
    },
}

// Handle bundling the immutable configuration with a transport
#[derive(Clone)]
pub struct Client {
    config: Arc<TapiConfig>,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(config: TapiConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout_ms)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: TapiConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &TapiConfig {
        &self.config
    }

    pub fn http_authentication(&self) -> Option<String> {
        self.config.http_authentication()
    }

    pub async fn execute_request(
        &self,
        method: Method,
        url: &str,
        params: &Params,
        etag: Option<&str>,
    ) -> Result<(HttpResponse, Option<String>)> {
        let mut url = format!("{}{}", self.config.base_url, url);
        let mut form = Vec::new();
        match method {
            Method::Get => url = append_query(&url, params),
            Method::Post => form = form_fields(params),
        }

        let request = HttpRequest {
            method,
            url: url.clone(),
            form,
            basic_auth: self
                .config
                .basic_auth()
                .map(|(user, password)| (user.to_string(), password.to_string())),
            if_none_match: etag.map(str::to_string),
        };

        let started = Instant::now();
        let response = self.transport.execute(request).await?;
        let server_etag = response.etag();

        debug!(
            method = %method,
            duration_ms = started.elapsed().as_millis() as u64,
            url = %url,
            params = ?params,
            etag = ?etag,
            server_etag = ?server_etag,
            "TAPI request"
        );

        check_for_errors(&response)?;

        Ok((response, server_etag))
    }

    pub async fn new_from_post(&self, url: &str, params: &Params) -> Result<Document> {
        let (response, _) = self.execute_request(Method::Post, url, params, None).await?;
        Document::parse(
            &response.body,
            DocumentKind::default(),
            None,
            &self.config.class_mapping,
        )
    }

    pub async fn new_from_get(
        &self,
        url: &str,
        params: &Params,
        kind: DocumentKind,
        etag: Option<&str>,
    ) -> Result<FetchOutcome> {
        let (response, server_etag) = self.execute_request(Method::Get, url, params, etag).await?;

        match server_etag {
            Some(server_etag) if etag == Some(server_etag.as_str()) => {
                debug!(etag = %server_etag, "Known ETag.");
                Ok(FetchOutcome::Unchanged { etag: server_etag })
            }
            // A bare 304 carries no body to parse
            None if response.status == 304 && etag.is_some() => {
                let etag = etag.unwrap_or_default().to_string();
                debug!(etag = %etag, "Not modified.");
                Ok(FetchOutcome::Unchanged { etag })
            }
            server_etag => {
                debug!(etag = ?server_etag, "Unknown ETag.");
                let document = Document::parse(
                    &response.body,
                    kind,
                    server_etag.clone(),
                    &self.config.class_mapping,
                )?;
                Ok(FetchOutcome::Fetched {
                    document,
                    etag: server_etag,
                })
            }
        }
    }
}

// 401 maps to InternalServerError as the API has always reported it
pub fn check_for_errors(response: &HttpResponse) -> Result<()> {
    let failure = || HttpFailure {
        request_url: response.url.clone(),
        status_code: response.status,
        response_body: response.body.clone(),
    };

    match response.status {
        302 => Err(TapiError::Moved(failure())),
        205 => Err(TapiError::Expired(failure())),
        401 | 500 => Err(TapiError::InternalServerError(failure())),
        404 => Err(TapiError::NotFound(failure())),
        402..=599 => Err(TapiError::Http(failure())),
        _ => Ok(()),
    }
}
