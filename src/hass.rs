use http_body_util::{BodyExt as _, Full};
use hyper::body::Bytes;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use log::info;

use crate::config;
use crate::messages::{StateReport, StateUpdate};

#[derive(thiserror::Error, Debug)]
pub enum HassError {
    #[error("invalid Home Assistant URL {0}: {1}")]
    InvalidUrl(String, String),
    #[error("failed to set up TLS: {0}")]
    Tls(#[from] rustls::Error),
    #[error("invalid Home Assistant token: {0}")]
    InvalidToken(#[from] hyper::header::InvalidHeaderValue),
    #[error("failed to serialize state: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("failed to read response: {0}")]
    Body(#[from] hyper::Error),
    #[error("failed to update state entity ({status}): {body}")]
    Status {
        status: hyper::StatusCode,
        body: String,
    },
}

/// Pushes occupancy to the Home Assistant REST API.
#[derive(Debug, Clone)]
pub struct HassClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    uri: hyper::Uri,
    authorization: hyper::header::HeaderValue,
}

impl HassClient {
    pub fn new(config: &config::HassConfig, entity: &str) -> Result<Self, HassError> {
        let url = state_url(&config.url, entity);
        let uri = url
            .parse::<hyper::Uri>()
            .map_err(|e| HassError::InvalidUrl(url.clone(), e.to_string()))?;
        match uri.scheme_str() {
            Some("http") | Some("https") if uri.host().is_some() => {}
            _ => {
                return Err(HassError::InvalidUrl(
                    url,
                    "expected an http:// or https:// address".to_string(),
                ));
            }
        }
        let mut authorization =
            hyper::header::HeaderValue::from_str(&format!("Bearer {}", config.token))?;
        authorization.set_sensitive(true);

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(hyper_util::rt::TokioExecutor::new()).build(connector);

        Ok(HassClient {
            client,
            uri,
            authorization,
        })
    }

    pub fn uri(&self) -> &hyper::Uri {
        &self.uri
    }

    pub async fn update_state(&self, report: &StateReport) -> Result<(), HassError> {
        let body = serde_json::to_vec(&StateUpdate::from(report))?;

        let mut request = hyper::Request::new(Full::new(Bytes::from(body)));
        *request.method_mut() = hyper::Method::POST;
        *request.uri_mut() = self.uri.clone();
        let headers = request.headers_mut();
        headers.insert(hyper::header::AUTHORIZATION, self.authorization.clone());
        headers.insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );

        let response = self.client.request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        if !status.is_success() {
            return Err(HassError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        info!("Updated {} to {}", self.uri, report.state);
        Ok(())
    }
}

fn state_url(base: &str, entity: &str) -> String {
    format!(
        "{}/api/states/{}.occupancy",
        base.trim_end_matches('/'),
        entity
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_url() {
        assert_eq!(
            state_url("http://homeassistant.local:8123/", "office"),
            "http://homeassistant.local:8123/api/states/office.occupancy"
        );
        assert_eq!(
            state_url("http://10.0.0.2:8123", "office"),
            "http://10.0.0.2:8123/api/states/office.occupancy"
        );
    }

    #[tokio::test]
    async fn test_new_client() {
        let config = config::HassConfig {
            url: "http://homeassistant.local:8123".to_string(),
            token: "token".to_string(),
        };
        let client = HassClient::new(&config, "office").unwrap();
        assert_eq!(client.uri().path(), "/api/states/office.occupancy");
        assert_eq!(client.uri().host(), Some("homeassistant.local"));

        let config = config::HassConfig {
            url: "not a url".to_string(),
            token: "token".to_string(),
        };
        assert!(matches!(
            HassClient::new(&config, "office"),
            Err(HassError::InvalidUrl(..))
        ));

        let config = config::HassConfig {
            url: "http://homeassistant.local:8123".to_string(),
            token: "line\nbreak".to_string(),
        };
        assert!(matches!(
            HassClient::new(&config, "office"),
            Err(HassError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_url_schemes() {
        let client = |url: &str| {
            HassClient::new(
                &config::HassConfig {
                    url: url.to_string(),
                    token: "token".to_string(),
                },
                "office",
            )
        };

        let https = client("https://homeassistant.example.com").unwrap();
        assert_eq!(https.uri().scheme_str(), Some("https"));

        assert!(matches!(
            client("ftp://homeassistant.local"),
            Err(HassError::InvalidUrl(..))
        ));
        assert!(matches!(
            client("homeassistant.local:8123"),
            Err(HassError::InvalidUrl(..))
        ));
    }

    #[derive(Debug)]
    struct Received {
        method: hyper::Method,
        path: String,
        authorization: Option<hyper::header::HeaderValue>,
        content_type: Option<hyper::header::HeaderValue>,
        body: Bytes,
    }

    /// Local stand-in for the Home Assistant API. Answers each request with
    /// the next status from `statuses`.
    async fn serve(
        statuses: Vec<hyper::StatusCode>,
    ) -> (
        std::net::SocketAddr,
        tokio::sync::mpsc::UnboundedReceiver<Received>,
    ) {
        use std::sync::{Arc, Mutex};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let statuses = Arc::new(Mutex::new(statuses.into_iter()));

        tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                let tx = tx.clone();
                let statuses = statuses.clone();
                tokio::spawn(async move {
                    let service = hyper::service::service_fn(
                        move |r: hyper::Request<hyper::body::Incoming>| {
                            let tx = tx.clone();
                            let statuses = statuses.clone();
                            async move {
                                let (parts, body) = r.into_parts();
                                let body = body.collect().await?.to_bytes();
                                let _ = tx.send(Received {
                                    method: parts.method,
                                    path: parts.uri.path().to_string(),
                                    authorization: parts
                                        .headers
                                        .get(hyper::header::AUTHORIZATION)
                                        .cloned(),
                                    content_type: parts
                                        .headers
                                        .get(hyper::header::CONTENT_TYPE)
                                        .cloned(),
                                    body,
                                });

                                let status = statuses
                                    .lock()
                                    .unwrap()
                                    .next()
                                    .unwrap_or(hyper::StatusCode::OK);
                                let mut response = hyper::Response::new(Full::new(
                                    Bytes::from(format!("{}", status)),
                                ));
                                *response.status_mut() = status;
                                Ok::<_, hyper::Error>(response)
                            }
                        },
                    );
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(hyper_util::rt::TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        (addr, rx)
    }

    #[tokio::test]
    async fn test_update_state_statuses() {
        use crate::messages::{OccupancyState, ReportTrigger};

        let (addr, mut received) =
            serve(vec![hyper::StatusCode::UNAUTHORIZED, hyper::StatusCode::OK]).await;
        let client = HassClient::new(
            &config::HassConfig {
                url: format!("http://{addr}"),
                token: "secret".to_string(),
            },
            "office",
        )
        .unwrap();

        let report = StateReport::new(OccupancyState::Active, ReportTrigger::Sweep);
        match client.update_state(&report).await {
            Err(HassError::Status { status, body }) => {
                assert_eq!(status, hyper::StatusCode::UNAUTHORIZED);
                assert!(body.contains("401"));
            }
            other => panic!("expected a status error, got {other:?}"),
        }

        let report = StateReport::new(OccupancyState::Inactive, ReportTrigger::Sweep);
        client.update_state(&report).await.unwrap();

        let first = received.recv().await.unwrap();
        assert_eq!(first.method, hyper::Method::POST);
        assert_eq!(first.path, "/api/states/office.occupancy");
        assert_eq!(
            first.authorization.as_ref().map(|v| v.as_bytes()),
            Some(&b"Bearer secret"[..])
        );
        assert_eq!(
            first.content_type.as_ref().map(|v| v.as_bytes()),
            Some(&b"application/json"[..])
        );
        let body: serde_json::Value = serde_json::from_slice(&first.body).unwrap();
        assert_eq!(body["state"], "active");
        assert_eq!(body["attributes"]["state"], "active");
        assert!(body["attributes"]["last_seen"].as_str().unwrap().ends_with('Z'));

        let second = received.recv().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&second.body).unwrap();
        assert_eq!(body["state"], "inactive");
    }

    #[tokio::test]
    async fn test_update_state_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HassClient::new(
            &config::HassConfig {
                url: format!("http://{addr}"),
                token: "secret".to_string(),
            },
            "office",
        )
        .unwrap();
        let report = StateReport::new(
            crate::messages::OccupancyState::Active,
            crate::messages::ReportTrigger::Sweep,
        );
        assert!(matches!(
            client.update_state(&report).await,
            Err(HassError::Transport(_))
        ));
    }
}
