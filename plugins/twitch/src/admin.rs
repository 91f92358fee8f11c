//! Local HTTP endpoints for poking at a running adapter.
//!
//! * `GET /auth` starts a device-code authorization and redirects to the verification page.
//! * `GET /channels` dumps the channel registry.
//! * `GET /tokens` shows the credential state. Token values are never included.

use crate::auth::{Auth, AuthState, DeviceCodeInfo};
use crate::channels::ChannelRegistry;
use bytes::Bytes;
use eyre::Context;
use http::{Method, StatusCode, header};
use http_body_util::Full;
use hyper::body;
use hyper::service::service_fn;
use hyper::{Request, Response};
use serde::Serialize;
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct AdminServer {
    auth: Auth,
    channels: ChannelRegistry,
    scopes: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct TokenReport {
    client_id: String,
    state: AuthState,
    valid: bool,
    login: String,
    user_id: String,
    scopes: BTreeSet<String>,
    device_code: Option<DeviceCodeInfo>,
    has_access_token: bool,
    has_refresh_token: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: u16,
    message: &'static str,
}

impl AdminServer {
    /// `scopes` are requested when `/auth` starts a new device-code authorization.
    pub fn new(auth: Auth, channels: ChannelRegistry, scopes: Vec<&'static str>) -> Self {
        Self {
            auth,
            channels,
            scopes,
        }
    }

    /// Serves on `127.0.0.1:port` until the returned task is aborted.
    pub async fn spawn(self, port: u16) -> eyre::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("bind admin server to port {port}"))?;
        let addr = listener.local_addr().context("get local address")?;
        tracing::info!(%addr, "admin server listening");

        let task = tokio::spawn(async move {
            loop {
                let conn = match listener.accept().await {
                    Ok((conn, _)) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "admin server failed to accept");
                        continue;
                    }
                };
                let server = self.clone();
                tokio::spawn(async move {
                    let conn = hyper_util::rt::TokioIo::new(conn);
                    let service = service_fn(move |req: Request<body::Incoming>| {
                        let server = server.clone();
                        async move {
                            Ok::<_, Infallible>(server.route(req.method(), req.uri().path()).await)
                        }
                    });
                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(conn, service)
                        .await
                    {
                        tracing::debug!(error = %e, "admin connection ended with error");
                    }
                });
            }
        });
        Ok((addr, task))
    }

    async fn route(&self, method: &Method, path: &str) -> Response<Full<Bytes>> {
        tracing::debug!(%method, path, "admin request");
        if method != Method::GET {
            return not_found();
        }
        match path {
            "/auth" => self.start_authorization().await,
            "/channels" => json(StatusCode::OK, &self.channels.snapshot().await),
            "/tokens" => json(StatusCode::OK, &self.token_report().await),
            _ => not_found(),
        }
    }

    async fn start_authorization(&self) -> Response<Full<Bytes>> {
        let Some(device) = self.auth.generate_device_code(&self.scopes).await else {
            return json(
                StatusCode::BAD_GATEWAY,
                &ErrorBody {
                    status: StatusCode::BAD_GATEWAY.as_u16(),
                    message: "Could not obtain a device code",
                },
            );
        };
        Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, device.verification_uri)
            .body(Full::default())
            .unwrap_or_else(|_| not_found())
    }

    async fn token_report(&self) -> TokenReport {
        let credential = self.auth.credential().await;
        let tokens = self.auth.tokens();
        TokenReport {
            client_id: credential.client_id,
            state: self.auth.state().await,
            valid: credential.valid,
            login: credential.login,
            user_id: credential.user_id,
            scopes: credential.scopes,
            device_code: self.auth.device_code_info().await,
            has_access_token: tokens.access_token().await.is_some(),
            has_refresh_token: tokens.refresh_token().await.is_some(),
        }
    }
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::from(body));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize admin response");
            let mut response = Response::new(Full::default());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn not_found() -> Response<Full<Bytes>> {
    json(
        StatusCode::NOT_FOUND,
        &ErrorBody {
            status: 404,
            message: "Not Found",
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::valid_auth;
    use crate::auth::tokens::TokenStore;
    use crate::config::Settings;
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_paths_are_404() {
        let admin = AdminServer::new(valid_auth(&[]).await, ChannelRegistry::new(), vec![]);
        let response = admin.route(&Method::GET, "/nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "status": 404, "message": "Not Found" })
        );

        let response = admin.route(&Method::POST, "/channels").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tokens_are_redacted() {
        let admin = AdminServer::new(
            valid_auth(&["chat:read"]).await,
            ChannelRegistry::new(),
            vec![],
        );
        let response = admin.route(&Method::GET, "/tokens").await;
        assert_eq!(response.status(), StatusCode::OK);

        let report = body_json(response).await;
        assert_eq!(report["valid"], true);
        assert_eq!(report["login"], "me");
        assert_eq!(report["scopes"], serde_json::json!(["chat:read"]));
        assert_eq!(report["has_access_token"], true);
        let text = report.to_string();
        assert!(!text.contains("\"token\""));
        assert!(!text.contains("refresh\""));
    }

    #[tokio::test]
    async fn channels_are_dumped() {
        let channels = ChannelRegistry::new();
        channels.rebuild("beta alpha:Alpha").await;
        let admin = AdminServer::new(valid_auth(&[]).await, channels, vec![]);

        let dump = body_json(admin.route(&Method::GET, "/channels").await).await;
        let names: Vec<_> = dump
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["username"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn auth_redirects_to_verification_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/device"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "device_code": "dc",
                "expires_in": 1800,
                "interval": 5,
                "user_code": "WXYZ",
                "verification_uri": "https://www.twitch.tv/activate?device-code=WXYZ"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let settings = Settings {
            identity_url: server.uri(),
            ..Settings::default()
        };
        let auth = Auth::new(&settings, TokenStore::in_memory("", "")).unwrap();
        let admin = AdminServer::new(auth.clone(), ChannelRegistry::new(), vec!["chat:read"]);

        let response = admin.route(&Method::GET, "/auth").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://www.twitch.tv/activate?device-code=WXYZ"
        );
        assert_eq!(auth.state().await, AuthState::AwaitingDeviceAuthorization);
        auth.destroy().await;
    }
}
