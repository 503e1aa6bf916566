// Tracker REST client: search, transitions, comments, field updates,
// attachment download. Blocking-call semantics from the caller's point of
// view: every method is one request with a fixed timeout and no retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use ticketd_core::tracker::{SharedSession, TrackerConnector, TrackerError, TrackerSession};
use ticketd_core::{AttachmentRef, Ticket};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the tracker REST API.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Base URL, e.g. "https://tracker.example.com".
    pub server: String,
    pub user: String,
    pub token: String,
    /// Per-request timeout; connection failures are retried on the next
    /// polling cycle, never here.
    pub timeout: Duration,
}

impl TrackerConfig {
    pub fn new(
        server: impl Into<String>,
        user: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            user: user.into(),
            token: token.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One authenticated session against the tracker.
#[derive(Debug)]
pub struct RestTracker {
    client: reqwest::Client,
    config: TrackerConfig,
}

impl RestTracker {
    /// Build a client and validate the credentials against the
    /// current-user endpoint. Refused connections, timeouts, and auth
    /// rejections all surface here.
    pub async fn connect(config: TrackerConfig) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| TrackerError::Connection(err.to_string()))?;

        let tracker = Self { client, config };
        let response = tracker.get("/rest/api/2/myself").await?;
        check_status(response).await?;

        debug!(server = %tracker.config.server, "tracker session established");
        Ok(tracker)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.server.trim_end_matches('/'), path)
    }

    async fn get(&self, path: &str) -> Result<Response, TrackerError> {
        self.client
            .get(self.url(path))
            .basic_auth(&self.config.user, Some(&self.config.token))
            .send()
            .await
            .map_err(request_error)
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &Value,
    ) -> Result<Response, TrackerError> {
        self.client
            .request(method, self.url(path))
            .basic_auth(&self.config.user, Some(&self.config.token))
            .json(body)
            .send()
            .await
            .map_err(request_error)
    }
}

#[async_trait]
impl TrackerSession for RestTracker {
    async fn search(&self, query: &str) -> Result<Vec<Ticket>, TrackerError> {
        let response = self
            .client
            .get(self.url("/rest/api/2/search"))
            .basic_auth(&self.config.user, Some(&self.config.token))
            .query(&[("jql", query)])
            .send()
            .await
            .map_err(request_error)?;

        let response = check_status(response).await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|err| TrackerError::Malformed(err.to_string()))?;

        Ok(body.issues.into_iter().map(Ticket::from).collect())
    }

    async fn transition(&self, ticket_key: &str, transition_id: u32) -> Result<(), TrackerError> {
        let body = json!({ "transition": { "id": transition_id.to_string() } });
        let response = self
            .send_json(
                reqwest::Method::POST,
                &format!("/rest/api/2/issue/{ticket_key}/transitions"),
                &body,
            )
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn comment(&self, ticket_key: &str, body: &str) -> Result<(), TrackerError> {
        let payload = json!({ "body": body });
        let response = self
            .send_json(
                reqwest::Method::POST,
                &format!("/rest/api/2/issue/{ticket_key}/comment"),
                &payload,
            )
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn update_fields(&self, ticket_key: &str, fields: Value) -> Result<(), TrackerError> {
        let payload = json!({ "fields": fields });
        let response = self
            .send_json(
                reqwest::Method::PUT,
                &format!("/rest/api/2/issue/{ticket_key}"),
                &payload,
            )
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, TrackerError> {
        let response = self
            .get(&format!("/rest/api/2/attachment/content/{}", attachment.id))
            .await?;
        let response = check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| TrackerError::Malformed(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Connector handed to the polling service: a fresh validated session per
/// cycle.
#[derive(Clone)]
pub struct RestConnector {
    config: TrackerConfig,
}

impl RestConnector {
    pub fn new(config: TrackerConfig) -> Self {
        info!(server = %config.server, user = %config.user, "tracker connector configured");
        Self { config }
    }
}

#[async_trait]
impl TrackerConnector for RestConnector {
    async fn connect(&self) -> Result<SharedSession, TrackerError> {
        let session = RestTracker::connect(self.config.clone()).await?;
        Ok(Arc::new(session))
    }
}

fn request_error(err: reqwest::Error) -> TrackerError {
    if err.is_timeout() || err.is_connect() {
        TrackerError::Connection(err.to_string())
    } else {
        TrackerError::Malformed(err.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, TrackerError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TrackerError::Auth),
        status => Err(TrackerError::Api {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        }),
    }
}

// ============================================
// Wire format
// ============================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    key: String,
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    attachment: Vec<AttachmentMeta>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AttachmentMeta {
    id: String,
    filename: String,
}

impl From<Issue> for Ticket {
    fn from(issue: Issue) -> Self {
        Ticket {
            key: issue.key,
            summary: issue.fields.summary,
            fields: issue.fields.extra,
            attachments: issue
                .fields
                .attachment
                .into_iter()
                .map(|a| AttachmentRef {
                    id: a.id,
                    filename: a.filename,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const USER: &str = "automation";
    const TOKEN: &str = "sekrit";

    async fn server_with_auth() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/myself"))
            .and(basic_auth(USER, TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": USER })))
            .mount(&server)
            .await;
        server
    }

    async fn connect(server: &MockServer) -> RestTracker {
        RestTracker::connect(TrackerConfig::new(server.uri(), USER, TOKEN))
            .await
            .expect("connects")
    }

    #[tokio::test]
    async fn connect_validates_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/myself"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = RestTracker::connect(TrackerConfig::new(server.uri(), USER, "wrong"))
            .await
            .expect_err("auth must fail");
        assert!(matches!(err, TrackerError::Auth));
    }

    #[tokio::test]
    async fn connect_maps_refused_connection() {
        // Nothing listens on this port.
        let err = RestTracker::connect(TrackerConfig::new("http://127.0.0.1:9", USER, TOKEN))
            .await
            .expect_err("must not connect");
        assert!(matches!(err, TrackerError::Connection(_)));
    }

    #[tokio::test]
    async fn search_maps_issues_to_tickets() {
        let server = server_with_auth().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("jql", "project = OPS AND status = Open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [
                    {
                        "key": "OPS-7",
                        "fields": {
                            "summary": "Credit hold request",
                            "customer_code": "C0042",
                            "attachment": [
                                { "id": "10001", "filename": "PRICELIST_2026.xlsx" }
                            ]
                        }
                    },
                    { "key": "OPS-8", "fields": { "summary": "Password reset" } }
                ]
            })))
            .mount(&server)
            .await;

        let tracker = connect(&server).await;
        let tickets = tracker
            .search("project = OPS AND status = Open")
            .await
            .expect("search succeeds");

        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].key, "OPS-7");
        assert_eq!(tickets[0].summary, "Credit hold request");
        assert_eq!(tickets[0].field_str("customer_code"), Some("C0042"));
        assert_eq!(
            tickets[0].first_attachment(),
            Some(&AttachmentRef {
                id: "10001".to_string(),
                filename: "PRICELIST_2026.xlsx".to_string(),
            })
        );
        assert_eq!(tickets[1].key, "OPS-8");
        assert!(tickets[1].attachments.is_empty());
    }

    #[tokio::test]
    async fn transition_posts_the_id_as_string() {
        let server = server_with_auth().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/2/issue/OPS-7/transitions"))
            .and(body_json(json!({ "transition": { "id": "101" } })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let tracker = connect(&server).await;
        tracker
            .transition("OPS-7", 101)
            .await
            .expect("transition succeeds");
    }

    #[tokio::test]
    async fn comment_failure_surfaces_status() {
        let server = server_with_auth().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/2/issue/OPS-7/comment"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let tracker = connect(&server).await;
        let err = tracker
            .comment("OPS-7", "done")
            .await
            .expect_err("comment must fail");
        assert!(matches!(err, TrackerError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn fetch_attachment_returns_raw_bytes() {
        let server = server_with_auth().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/attachment/content/10001"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
            .mount(&server)
            .await;

        let tracker = connect(&server).await;
        let attachment = AttachmentRef {
            id: "10001".to_string(),
            filename: "PRICELIST_2026.xlsx".to_string(),
        };
        let bytes = tracker
            .fetch_attachment(&attachment)
            .await
            .expect("download succeeds");
        assert_eq!(bytes, b"PK\x03\x04");
    }
}
