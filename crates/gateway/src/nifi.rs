use std::time::Duration;

use nifi_auth::AccessToken;
use nifi_contracts::Stage;
use nifi_contracts::nifi::{
    ComponentSearchResult, MutationRequest, ProcessorEntity, ProcessorRef, SearchResultsEnvelope,
};
use reqwest::StatusCode;

use crate::config::{StartupError, TlsConfig};

const SEARCH_PATH: &str = "/flow/search-results";
const PROCESSORS_PATH: &str = "/processors";

#[derive(Debug)]
pub enum NifiError {
    NotFound {
        name: String,
    },
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },
    Status {
        stage: Stage,
        status: StatusCode,
        body: String,
    },
    Timeout {
        stage: Stage,
    },
    Transport {
        stage: Stage,
        source: reqwest::Error,
    },
    InvalidResponse {
        stage: Stage,
    },
}

impl NifiError {
    pub fn stage(&self) -> Stage {
        match self {
            NifiError::NotFound { .. } | NifiError::Ambiguous { .. } => Stage::Resolution,
            NifiError::Status { stage, .. }
            | NifiError::Timeout { stage }
            | NifiError::Transport { stage, .. }
            | NifiError::InvalidResponse { stage } => *stage,
        }
    }

    fn from_reqwest(stage: Stage) -> impl FnOnce(reqwest::Error) -> NifiError {
        move |source| {
            if source.is_timeout() {
                NifiError::Timeout { stage }
            } else {
                NifiError::Transport { stage, source }
            }
        }
    }
}

impl std::fmt::Display for NifiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NifiError::NotFound { name } => write!(f, "no processor matches name {:?}", name),
            NifiError::Ambiguous { name, candidates } => write!(
                f,
                "processor name {:?} is ambiguous ({} matches: {})",
                name,
                candidates.len(),
                candidates.join(", ")
            ),
            NifiError::Status {
                stage,
                status,
                body,
            } => write!(
                f,
                "NiFi returned status {} during {}: {}",
                status.as_u16(),
                stage,
                body
            ),
            NifiError::Timeout { stage } => write!(f, "NiFi request timed out during {}", stage),
            NifiError::Transport { stage, source } => {
                write!(f, "NiFi request failed during {}: {}", stage, source)
            }
            NifiError::InvalidResponse { stage } => {
                write!(f, "NiFi returned an invalid response during {}", stage)
            }
        }
    }
}

impl std::error::Error for NifiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NifiError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Builds the HTTP client shared by the token, resolution and mutation calls.
pub fn build_http_client(timeout_ms: u64, tls: &TlsConfig) -> Result<reqwest::Client, StartupError> {
    let mut builder = reqwest::Client::builder().use_rustls_tls();

    if timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(timeout_ms));
    }

    if let Some(path) = tls.ca_cert_path.as_ref() {
        let pem = std::fs::read(path).map_err(|_| StartupError {
            code: "ERR_TLS_CA_READ",
            message: format!("failed to read CA certificate at {}", path.display()),
        })?;
        let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|_| StartupError {
            code: "ERR_TLS_CA_PARSE",
            message: format!("CA certificate at {} is not valid PEM", path.display()),
        })?;
        if certs.is_empty() {
            return Err(StartupError {
                code: "ERR_TLS_CA_PARSE",
                message: format!("CA certificate at {} contains no certificates", path.display()),
            });
        }
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    if tls.insecure_skip_verify {
        tracing::warn!("TLS certificate verification for NiFi is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().map_err(|err| StartupError {
        code: "ERR_HTTP_CLIENT",
        message: format!("failed to initialize NiFi http client: {}", err),
    })
}

/// Resolves processors by name and applies updates to them.
#[derive(Clone)]
pub struct NifiClient {
    base_url: String,
    http: reqwest::Client,
}

impl NifiClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub async fn search(
        &self,
        name: &str,
        token: &AccessToken,
    ) -> Result<Vec<ComponentSearchResult>, NifiError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, SEARCH_PATH))
            .query(&[("q", name)])
            .header(reqwest::header::AUTHORIZATION, token.bearer_header())
            .send()
            .await
            .map_err(NifiError::from_reqwest(Stage::Resolution))?;

        let envelope = decode::<SearchResultsEnvelope>(resp, Stage::Resolution).await?;
        Ok(envelope.search_results.processor_results)
    }

    pub async fn fetch(&self, id: &str, token: &AccessToken) -> Result<ProcessorRef, NifiError> {
        let resp = self
            .http
            .get(self.processor_url(id))
            .header(reqwest::header::AUTHORIZATION, token.bearer_header())
            .send()
            .await
            .map_err(NifiError::from_reqwest(Stage::Resolution))?;

        let entity = decode::<ProcessorEntity>(resp, Stage::Resolution).await?;
        Ok(ProcessorRef::from(entity))
    }

    /// Search then fetch. Never fetches when the search is empty or ambiguous.
    pub async fn resolve(&self, name: &str, token: &AccessToken) -> Result<ProcessorRef, NifiError> {
        let results = self.search(name, token).await;
        crate::metrics::observe_remote_call("search", outcome(&results));
        let results = results?;

        let matched = select_processor(name, &results)?;
        tracing::debug!(
            processor_name = %name,
            processor_id = %matched.id,
            candidates = results.len(),
            "nifi.search matched processor"
        );

        let fetched = self.fetch(&matched.id, token).await;
        crate::metrics::observe_remote_call("fetch", outcome(&fetched));
        fetched
    }

    pub async fn apply_mutation(
        &self,
        target: &ProcessorRef,
        mutation: &MutationRequest,
        token: &AccessToken,
    ) -> Result<(), NifiError> {
        let result = self.put_mutation(target, mutation, token).await;
        crate::metrics::observe_remote_call("update", outcome(&result));
        result
    }

    async fn put_mutation(
        &self,
        target: &ProcessorRef,
        mutation: &MutationRequest,
        token: &AccessToken,
    ) -> Result<(), NifiError> {
        let resp = self
            .http
            .put(self.processor_url(&target.id))
            .header(reqwest::header::AUTHORIZATION, token.bearer_header())
            .json(&mutation.body_for(target))
            .send()
            .await
            .map_err(NifiError::from_reqwest(Stage::Mutation))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NifiError::Status {
                stage: Stage::Mutation,
                status,
                body: nifi_contracts::remote_error_text(&body),
            });
        }

        Ok(())
    }

    fn processor_url(&self, id: &str) -> String {
        format!("{}{}/{}", self.base_url, PROCESSORS_PATH, id)
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    stage: Stage,
) -> Result<T, NifiError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(NifiError::Status {
            stage,
            status,
            body: nifi_contracts::remote_error_text(&body),
        });
    }

    resp.json::<T>()
        .await
        .map_err(|_| NifiError::InvalidResponse { stage })
}

/// Picks the single processor a name refers to.
///
/// A lone search hit is taken as-is. With several hits, an exact name match
/// wins only if it is unique.
pub fn select_processor<'a>(
    name: &str,
    results: &'a [ComponentSearchResult],
) -> Result<&'a ComponentSearchResult, NifiError> {
    match results {
        [] => Err(NifiError::NotFound {
            name: name.to_string(),
        }),
        [only] => Ok(only),
        _ => {
            let mut exact = results
                .iter()
                .filter(|r| r.name.as_deref() == Some(name));
            match (exact.next(), exact.next()) {
                (Some(hit), None) => Ok(hit),
                _ => Err(NifiError::Ambiguous {
                    name: name.to_string(),
                    candidates: results.iter().map(|r| r.id.clone()).collect(),
                }),
            }
        }
    }
}

fn outcome<T>(result: &Result<T, NifiError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(NifiError::Status { .. }) => "remote_error",
        Err(NifiError::NotFound { .. }) => "not_found",
        Err(NifiError::Ambiguous { .. }) => "ambiguous",
        Err(NifiError::Timeout { .. }) => "timeout",
        Err(NifiError::Transport { .. }) | Err(NifiError::InvalidResponse { .. }) => "error",
    }
}
