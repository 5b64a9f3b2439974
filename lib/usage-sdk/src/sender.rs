use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use recloser::AsyncRecloser;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::RetryTransientMiddleware;
use retry_policies::policies::ExponentialBackoff;
use thiserror::Error;
use tracing::debug;

use crate::agent::report::{non_empty_string, Report};
use crate::circuit_breaker::{CircuitBreakerBuilder, CircuitBreakerError};

pub static DEFAULT_HIVE_USAGE_ENDPOINT: &str = "https://app.graphql-hive.com/usage";
pub static DEFAULT_CLIENT_NAME: &str = "hive-usage-cli";

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("unable to send report: unauthorized")]
    Unauthorized,
    #[error("unable to send report: no access")]
    Forbidden,
    #[error("unable to send report: rate limited")]
    RateLimited,
    #[error("missing token")]
    MissingToken,
    #[error("your access token requires providing a 'target_id' option.")]
    MissingTargetId,
    #[error("using 'target_id' with legacy tokens is not supported")]
    TargetIdWithLegacyToken,
    #[error("invalid token provided")]
    InvalidToken,
    #[error("invalid client name or version provided: {0}")]
    InvalidClientHeader(String),
    #[error("invalid target id provided: {0}, it should be either a slug like \"$organizationSlug/$projectSlug/$targetSlug\" or an UUID")]
    InvalidTargetId(String),
    #[error("unable to instantiate the http client for reports sending: {0}")]
    HTTPClientCreationError(reqwest::Error),
    #[error("unable to create circuit breaker: {0}")]
    CircuitBreakerCreationError(#[from] CircuitBreakerError),
    #[error("rejected by the circuit breaker")]
    CircuitBreakerRejected,
    #[error("unable to send report: {0}")]
    Unknown(String),
}

/// Delivers assembled reports.
#[async_trait]
pub trait SendReport: Send + Sync {
    async fn send(&self, report: Report) -> Result<(), AgentError>;
}

/// Adapts an async function to [`SendReport`].
pub struct SendFn<F>(F);

pub fn send_fn<F, Fut>(f: F) -> SendFn<F>
where
    F: Fn(Report) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AgentError>> + Send + 'static,
{
    SendFn(f)
}

#[async_trait]
impl<F, Fut> SendReport for SendFn<F>
where
    F: Fn(Report) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AgentError>> + Send + 'static,
{
    async fn send(&self, report: Report) -> Result<(), AgentError> {
        (self.0)(report).await
    }
}

/// Sends reports to the Hive usage-ingestion endpoint.
pub struct HiveSender {
    endpoint: String,
    client: ClientWithMiddleware,
    circuit_breaker: AsyncRecloser,
}

impl HiveSender {
    pub fn builder() -> HiveSenderBuilder {
        HiveSenderBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SendReport for HiveSender {
    async fn send(&self, report: Report) -> Result<(), AgentError> {
        if report.size == 0 {
            return Ok(());
        }
        let size = report.size;
        // Based on https://the-guild.dev/graphql/hive/docs/specs/usage-reports#data-structure
        let resp_fut = self.client.post(&self.endpoint).json(&report).send();

        let resp = self
            .circuit_breaker
            .call(resp_fut)
            .await
            .map_err(|e| match e {
                recloser::Error::Inner(e) => AgentError::Unknown(e.to_string()),
                recloser::Error::Rejected => AgentError::CircuitBreakerRejected,
            })?;

        match resp.status() {
            status if status.is_success() => {
                debug!("sent report with {} operations", size);
                Ok(())
            }
            reqwest::StatusCode::UNAUTHORIZED => Err(AgentError::Unauthorized),
            reqwest::StatusCode::FORBIDDEN => Err(AgentError::Forbidden),
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(AgentError::RateLimited),
            _ => Err(AgentError::Unknown(format!(
                "({}) {}",
                resp.status(),
                resp.text().await.unwrap_or_default()
            ))),
        }
    }
}

pub struct HiveSenderBuilder {
    token: Option<String>,
    endpoint: String,
    target_id: Option<String>,
    client_name: String,
    client_version: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    accept_invalid_certs: bool,
    retry_policy: ExponentialBackoff,
    circuit_breaker: CircuitBreakerBuilder,
}

impl Default for HiveSenderBuilder {
    fn default() -> Self {
        Self {
            token: None,
            endpoint: DEFAULT_HIVE_USAGE_ENDPOINT.to_string(),
            target_id: None,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
            accept_invalid_certs: false,
            retry_policy: ExponentialBackoff::builder().build_with_max_retries(3),
            circuit_breaker: CircuitBreakerBuilder::default(),
        }
    }
}

fn is_legacy_token(token: &str) -> bool {
    !token.starts_with("hvo1/") && !token.starts_with("hvu1/") && !token.starts_with("hvp1/")
}

impl HiveSenderBuilder {
    /// Your [Registry Access Token](https://the-guild.dev/graphql/hive/docs/management/targets#registry-access-tokens) with write permission.
    pub fn token(mut self, token: String) -> Self {
        if let Some(token) = non_empty_string(Some(token)) {
            self.token = Some(token);
        }
        self
    }
    /// For self-hosting, you can override `/usage` endpoint (defaults to `https://app.graphql-hive.com/usage`).
    pub fn endpoint(mut self, endpoint: String) -> Self {
        if let Some(endpoint) = non_empty_string(Some(endpoint)) {
            self.endpoint = endpoint;
        }
        self
    }
    /// A target ID, either a slug following the format "$organizationSlug/$projectSlug/$targetSlug" or an UUID.
    /// Required when the token is an organization access token.
    pub fn target_id(mut self, target_id: String) -> Self {
        if let Some(target_id) = non_empty_string(Some(target_id)) {
            self.target_id = Some(target_id);
        }
        self
    }
    /// Sent as `graphql-client-name` and as the User-Agent product.
    /// Default: hive-usage-cli
    pub fn client_name(mut self, client_name: String) -> Self {
        if let Some(client_name) = non_empty_string(Some(client_name)) {
            self.client_name = client_name;
        }
        self
    }
    /// Sent as `graphql-client-version` and as the User-Agent version.
    pub fn client_version(mut self, client_version: String) -> Self {
        if let Some(client_version) = non_empty_string(Some(client_version)) {
            self.client_version = client_version;
        }
        self
    }
    /// A timeout for only the connect phase of a request
    /// Default: 5 seconds
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
    /// A timeout for the entire request
    /// Default: 15 seconds
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
    /// Accepts invalid SSL certificates
    /// Default: false
    pub fn accept_invalid_certs(mut self, accept_invalid_certs: bool) -> Self {
        self.accept_invalid_certs = accept_invalid_certs;
        self
    }
    /// Retry policy for sending reports
    /// Default: ExponentialBackoff with max 3 retries
    pub fn retry_policy(mut self, retry_policy: ExponentialBackoff) -> Self {
        self.retry_policy = retry_policy;
        self
    }
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        self
    }
    pub fn circuit_breaker(mut self, circuit_breaker: CircuitBreakerBuilder) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn build(self) -> Result<HiveSender, AgentError> {
        let token = self.token.ok_or(AgentError::MissingToken)?;

        let mut default_headers = HeaderMap::new();

        default_headers.insert("X-Usage-API-Version", HeaderValue::from_static("2"));

        let mut authorization_header = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| AgentError::InvalidToken)?;

        authorization_header.set_sensitive(true);

        default_headers.insert(reqwest::header::AUTHORIZATION, authorization_header);
        default_headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );
        default_headers.insert(
            HeaderName::from_static("graphql-client-name"),
            client_header(&self.client_name)?,
        );
        default_headers.insert(
            HeaderName::from_static("graphql-client-version"),
            client_header(&self.client_version)?,
        );

        let reqwest_agent = reqwest::Client::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(format!("{}/{}", self.client_name, self.client_version))
            .default_headers(default_headers)
            .build()
            .map_err(AgentError::HTTPClientCreationError)?;
        let client = ClientBuilder::new(reqwest_agent)
            .with(RetryTransientMiddleware::new_with_policy(self.retry_policy))
            .build();

        let mut endpoint = self.endpoint;

        match self.target_id {
            Some(_) if is_legacy_token(&token) => return Err(AgentError::TargetIdWithLegacyToken),
            Some(target_id) => {
                let target_id = validate_target_id(&target_id)?;
                endpoint.push_str(&format!("/{}", target_id));
            }
            None if !is_legacy_token(&token) => return Err(AgentError::MissingTargetId),
            None => {}
        }

        let circuit_breaker = self.circuit_breaker.build_async()?;

        Ok(HiveSender {
            endpoint,
            client,
            circuit_breaker,
        })
    }
}

fn client_header(value: &str) -> Result<HeaderValue, AgentError> {
    HeaderValue::from_str(value).map_err(|_| AgentError::InvalidClientHeader(value.to_string()))
}

// Target ID regexp for validation: slug format
static SLUG_REGEX: Lazy<regex_automata::meta::Regex> = Lazy::new(|| {
    regex_automata::meta::Regex::new(r"^[a-zA-Z0-9-_]+\/[a-zA-Z0-9-_]+\/[a-zA-Z0-9-_]+$").unwrap()
});
// Target ID regexp for validation: UUID format
static UUID_REGEX: Lazy<regex_automata::meta::Regex> = Lazy::new(|| {
    regex_automata::meta::Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
    )
    .unwrap()
});

fn validate_target_id(target_id: &str) -> Result<&str, AgentError> {
    let trimmed = target_id.trim();
    if trimmed.is_empty() {
        return Err(AgentError::InvalidTargetId("<empty>".to_string()));
    }
    if SLUG_REGEX.is_match(trimmed) || UUID_REGEX.is_match(trimmed) {
        return Ok(trimmed);
    }
    Err(AgentError::InvalidTargetId(format!("'{}'", trimmed)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};

    use super::{validate_target_id, AgentError, HiveSender, SendReport};
    use crate::agent::report::{Execution, OperationMapRecord, Report, RequestOperation};

    fn report() -> Report {
        Report {
            size: 1,
            map: HashMap::from([(
                "abc".to_string(),
                OperationMapRecord {
                    operation: "mutation deleteProject{deleteProject{id}}".to_string(),
                    operation_name: Some("deleteProject".to_string()),
                    fields: vec!["Mutation.deleteProject".to_string()],
                },
            )]),
            operations: vec![RequestOperation {
                operation_map_key: "abc".to_string(),
                timestamp: 1625247600,
                execution: Execution {
                    ok: true,
                    duration: 20_000_000,
                    errors_total: 0,
                    errors: vec![],
                },
                metadata: None,
            }],
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn should_send_data_to_hive() -> Result<(), Box<dyn std::error::Error>> {
        let token = "Token";

        let mut server = mockito::Server::new_async().await;
        let server_url = server.url();

        let mock = server
            .mock("POST", "/200")
            .match_header(AUTHORIZATION, format!("Bearer {}", token).as_str())
            .match_header(CONTENT_TYPE, "application/json")
            .match_header(ACCEPT, "application/json")
            .match_header(USER_AGENT, "hive-usage-test/1.2.3")
            .match_header("X-Usage-API-Version", "2")
            .match_header("graphql-client-name", "hive-usage-test")
            .match_header("graphql-client-version", "1.2.3")
            .match_request(move |request| {
                let request_body = request.body().expect("Failed to extract body");
                let report: Report = serde_json::from_slice(request_body)
                    .expect("Failed to parse request body as JSON");
                assert_eq!(report.size, 1);
                let record = report.map.get("abc").expect("No operation record");
                assert_eq!(record.operation_name.as_deref(), Some("deleteProject"));
                assert_eq!(report.operations[0].operation_map_key, "abc");
                assert_eq!(report.operations[0].execution.duration, 20_000_000);
                true
            })
            .expect(1)
            .with_status(200)
            .create_async()
            .await;

        let sender = HiveSender::builder()
            .token(token.into())
            .endpoint(format!("{}/200", server_url))
            .client_name("hive-usage-test".into())
            .client_version("1.2.3".into())
            .build()?;

        sender.send(report()).await?;

        mock.assert_async().await;

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn skips_empty_reports() -> Result<(), Box<dyn std::error::Error>> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .expect(0)
            .create_async()
            .await;

        let sender = HiveSender::builder()
            .token("Token".into())
            .endpoint(server.url())
            .build()?;

        sender.send(Report::default()).await?;

        mock.assert_async().await;

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn maps_error_statuses() -> Result<(), Box<dyn std::error::Error>> {
        let mut server = mockito::Server::new_async().await;
        let server_url = server.url();

        let _unauthorized = server.mock("POST", "/401").with_status(401).create_async().await;
        let _forbidden = server.mock("POST", "/403").with_status(403).create_async().await;
        let _rate_limited = server.mock("POST", "/429").with_status(429).create_async().await;
        let _failure = server
            .mock("POST", "/400")
            .with_status(400)
            .with_body("bad report")
            .create_async()
            .await;

        let send_to = |path: &str| {
            HiveSender::builder()
                .token("Token".into())
                .endpoint(format!("{}{}", server_url, path))
                .max_retries(0)
                .build()
        };

        assert!(matches!(
            send_to("/401")?.send(report()).await,
            Err(AgentError::Unauthorized)
        ));
        assert!(matches!(
            send_to("/403")?.send(report()).await,
            Err(AgentError::Forbidden)
        ));
        assert!(matches!(
            send_to("/429")?.send(report()).await,
            Err(AgentError::RateLimited)
        ));
        match send_to("/400")?.send(report()).await {
            Err(AgentError::Unknown(message)) => assert!(message.contains("bad report")),
            other => panic!("unexpected result: {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn appends_target_id_for_organization_tokens() {
        let sender = HiveSender::builder()
            .token("hvo1/secret".into())
            .endpoint("http://localhost/usage".into())
            .target_id("the-guild/graphql-hive/staging".into())
            .build()
            .unwrap();

        assert_eq!(
            sender.endpoint(),
            "http://localhost/usage/the-guild/graphql-hive/staging"
        );
    }

    #[test]
    fn validates_token_and_target_id() {
        assert!(matches!(
            HiveSender::builder().build(),
            Err(AgentError::MissingToken)
        ));
        assert!(matches!(
            HiveSender::builder().token("hvo1/secret".into()).build(),
            Err(AgentError::MissingTargetId)
        ));
        assert!(matches!(
            HiveSender::builder()
                .token("legacy".into())
                .target_id("a0f4c605-6541-4350-8cfe-b31f21a4bf80".into())
                .build(),
            Err(AgentError::TargetIdWithLegacyToken)
        ));
        assert!(matches!(
            HiveSender::builder()
                .token("hvo1/secret".into())
                .target_id("not a target".into())
                .build(),
            Err(AgentError::InvalidTargetId(_))
        ));
    }

    #[test]
    fn accepts_slug_and_uuid_target_ids() {
        assert_eq!(
            validate_target_id(" the-guild/graphql-hive/staging ").ok(),
            Some("the-guild/graphql-hive/staging")
        );
        assert!(validate_target_id("a0f4c605-6541-4350-8cfe-b31f21a4bf80").is_ok());
        assert!(validate_target_id("the-guild/graphql-hive").is_err());
        assert!(validate_target_id("").is_err());
    }
}
