//! LiveKit implementation of the provider client.
//!
//! Talks to the LiveKit server API (Twirp over HTTP with JSON bodies). Every
//! request carries a short-lived HS256 access token signed with the API
//! secret and scoped to the grant the call needs.

use super::{
    AgentDispatch, AgentDispatchRequest, CreateRoomRequest, ProviderConnection, ProviderError,
    Room, RoomProvider,
};
use crate::error::DispatchError;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, time::Duration};
use tracing::{debug, instrument};

const ROOM_SERVICE: &str = "livekit.RoomService";
const DISPATCH_SERVICE: &str = "livekit.AgentDispatchService";
const TOKEN_TTL_SECS: i64 = 600;

/// Credentials for the LiveKit server API.
#[derive(Clone)]
pub struct LiveKitCredentials {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for LiveKitCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitCredentials")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct LiveKitClient {
    base_url: String,
    api_key: String,
    api_secret: String,
    request_timeout: Duration,
}

impl fmt::Debug for LiveKitClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl LiveKitClient {
    /// Creates a client. Blank credentials are a configuration error.
    pub fn new(credentials: LiveKitCredentials) -> Result<Self, DispatchError> {
        for (name, value) in [
            ("url", &credentials.url),
            ("API key", &credentials.api_key),
            ("API secret", &credentials.api_secret),
        ] {
            if value.trim().is_empty() {
                return Err(DispatchError::Configuration(format!(
                    "LiveKit {name} must not be empty"
                )));
            }
        }

        Ok(Self {
            base_url: http_base_url(&credentials.url),
            api_key: credentials.api_key,
            api_secret: credentials.api_secret,
            request_timeout: Duration::from_secs(30),
        })
    }

    /// Sets the HTTP-level timeout applied to each request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// LiveKit URLs are usually given as `wss://`; the server API lives on HTTPS.
fn http_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        url.to_string()
    }
}

#[async_trait]
impl RoomProvider for LiveKitClient {
    async fn connect(&self) -> Result<Box<dyn ProviderConnection>, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        debug!(base_url = %self.base_url, "Opened LiveKit connection");
        Ok(Box::new(LiveKitConnection {
            http: Some(http),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
        }))
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoGrant {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    room_create: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    room_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    room: Option<String>,
}

#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    nbf: i64,
    exp: i64,
    video: VideoGrant,
}

fn access_token(api_key: &str, api_secret: &str, grant: VideoGrant) -> Result<String, ProviderError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        iss: api_key.to_string(),
        nbf: now,
        exp: now + TOKEN_TTL_SECS,
        video: grant,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(api_secret.as_bytes()),
    )
    .map_err(|e| ProviderError::InvalidRequest(format!("failed to sign access token: {e}")))
}

/// Twirp errors look like `{"code": "...", "msg": "..."}`.
fn twirp_message(body: &str, status: reqwest::StatusCode) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("msg").and_then(|m| m.as_str()).map(str::to_string))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string())
}

struct LiveKitConnection {
    http: Option<reqwest::Client>,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl LiveKitConnection {
    async fn call<Req, Resp>(
        &self,
        service: &str,
        method: &str,
        body: &Req,
        grant: VideoGrant,
    ) -> Result<Resp, ProviderError>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        let http = self
            .http
            .as_ref()
            .ok_or_else(|| ProviderError::Transport("connection already closed".to_string()))?;
        let token = access_token(&self.api_key, &self.api_secret, grant)?;
        let url = format!("{}/twirp/{}/{}", self.base_url, service, method);

        let response = http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: twirp_message(&text, status),
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ProviderConnection for LiveKitConnection {
    #[instrument(skip_all, fields(room = %request.name))]
    async fn create_room(&mut self, request: &CreateRoomRequest) -> Result<Room, ProviderError> {
        let grant = VideoGrant {
            room_create: true,
            ..Default::default()
        };
        self.call(ROOM_SERVICE, "CreateRoom", request, grant).await
    }

    #[instrument(skip_all, fields(room = %request.room, agent = %request.agent_name))]
    async fn dispatch_agent(
        &mut self,
        request: &AgentDispatchRequest,
    ) -> Result<AgentDispatch, ProviderError> {
        let grant = VideoGrant {
            room_admin: true,
            room: Some(request.room.clone()),
            ..Default::default()
        };
        self.call(DISPATCH_SERVICE, "CreateDispatch", request, grant).await
    }

    async fn close(&mut self) {
        if self.http.take().is_some() {
            debug!(base_url = %self.base_url, "Closed LiveKit connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header_exists, method, path},
    };

    fn credentials(url: &str) -> LiveKitCredentials {
        LiveKitCredentials {
            url: url.to_string(),
            api_key: "APIkey123".to_string(),
            api_secret: "secret-that-is-long-enough".to_string(),
        }
    }

    fn room_request() -> CreateRoomRequest {
        CreateRoomRequest {
            name: "room-9876543210".into(),
            empty_timeout: 600,
            max_participants: 20,
        }
    }

    #[test]
    fn test_blank_credentials_are_a_configuration_error() {
        let mut creds = credentials("wss://example.livekit.cloud");
        creds.api_secret = "  ".into();

        match LiveKitClient::new(creds) {
            Err(DispatchError::Configuration(msg)) => assert!(msg.contains("API secret")),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_websocket_urls_are_rewritten() {
        assert_eq!(http_base_url("wss://x.livekit.cloud/"), "https://x.livekit.cloud");
        assert_eq!(http_base_url("ws://localhost:7880"), "http://localhost:7880");
        assert_eq!(http_base_url("http://localhost:7880"), "http://localhost:7880");
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let debug = format!("{:?}", credentials("wss://x"));
        assert!(!debug.contains("secret-that-is-long-enough"));
    }

    #[tokio::test]
    async fn test_create_room_sends_signed_twirp_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/twirp/livekit.RoomService/CreateRoom"))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({
                "name": "room-9876543210",
                "empty_timeout": 600,
                "max_participants": 20
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"sid": "RM_abc", "name": "room-9876543210"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = LiveKitClient::new(credentials(&server.uri())).unwrap();
        let mut connection = client.connect().await.unwrap();
        let room = connection.create_room(&room_request()).await.unwrap();
        connection.close().await;

        assert_eq!(room.sid, "RM_abc");
        assert_eq!(room.name, "room-9876543210");

        let requests = server.received_requests().await.unwrap();
        let header = requests[0]
            .headers
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let token = header.strip_prefix("Bearer ").unwrap();
        let claims = decode::<serde_json::Value>(
            token,
            &DecodingKey::from_secret(b"secret-that-is-long-enough"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap()
        .claims;
        assert_eq!(claims["iss"], "APIkey123");
        assert_eq!(claims["video"]["roomCreate"], true);
        assert!(claims["video"].get("roomAdmin").is_none());
    }

    #[tokio::test]
    async fn test_dispatch_agent_returns_dispatch_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/twirp/livekit.AgentDispatchService/CreateDispatch"))
            .and(body_partial_json(json!({
                "agent_name": "Voice_Agent_Riya",
                "room": "room-9876543210"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "AD_xyz",
                "agent_name": "Voice_Agent_Riya",
                "room": "room-9876543210",
                "metadata": "{}"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LiveKitClient::new(credentials(&server.uri())).unwrap();
        let mut connection = client.connect().await.unwrap();
        let dispatch = connection
            .dispatch_agent(&AgentDispatchRequest {
                agent_name: "Voice_Agent_Riya".into(),
                room: "room-9876543210".into(),
                metadata: "{}".into(),
            })
            .await
            .unwrap();
        connection.close().await;

        assert_eq!(dispatch.id, "AD_xyz");
        assert_eq!(dispatch.room, "room-9876543210");
    }

    #[tokio::test]
    async fn test_twirp_error_is_surfaced_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"code": "unauthenticated", "msg": "invalid API key"})),
            )
            .mount(&server)
            .await;

        let client = LiveKitClient::new(credentials(&server.uri())).unwrap();
        let mut connection = client.connect().await.unwrap();
        let err = connection.create_room(&room_request()).await.unwrap_err();

        assert_eq!(
            err,
            ProviderError::Rejected {
                status: 401,
                message: "invalid API key".into()
            }
        );
    }

    #[tokio::test]
    async fn test_closed_connection_refuses_calls() {
        let client = LiveKitClient::new(credentials("http://127.0.0.1:9")).unwrap();
        let mut connection = client.connect().await.unwrap();
        connection.close().await;
        connection.close().await;

        assert!(matches!(
            connection.create_room(&room_request()).await,
            Err(ProviderError::Transport(_))
        ));
    }
}
