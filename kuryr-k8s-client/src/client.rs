//! The Kubernetes client itself: GET, WATCH, and the optimistic-concurrency
//! ANNOTATE loop.

use std::collections::BTreeMap;

use bytes::Bytes;
use futures::Stream;
use http::{Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_timeout::TimeoutConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{bearer_header_value, TokenFile};
use crate::config::{AuthConfig, Config};
use crate::error::ClientError;
use crate::watch::{decode_watch_stream, WatchEvent};

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;
type Connector = TimeoutConnector<HttpsConnector>;

/// A minimal Kubernetes API client: GET a resource, WATCH a collection, and
/// ANNOTATE a resource under optimistic concurrency control.
///
/// Unlike a general-purpose client this does not model the full REST
/// surface (no typed `Api<K>`, no list/create/delete) because the
/// controller core only ever needs these three operations.
pub struct Client {
    /// Used for GET and ANNOTATE, timed out per `config.request_timeout`
    /// via a `TimeoutConnector` wrapped around the TLS connector.
    inner: HyperClient<Connector, Full<Bytes>>,
    /// Used for WATCH only: a read timeout would fire on every idle gap
    /// between events, so this connector only bounds the initial connect
    /// (Config doc: "[request_timeout] does not apply to the long-lived
    /// WATCH connection").
    watch_inner: HyperClient<Connector, Full<Bytes>>,
    config: Config,
    token: Option<TokenFile>,
}

impl Client {
    /// Builds a client from `config`, constructing the TLS connector and
    /// (for bearer auth) the lazily-refreshed token reader eagerly; no
    /// network I/O happens until the first request.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let https = build_https_connector(&config)?;

        let mut timed = TimeoutConnector::new(https.clone());
        timed.set_connect_timeout(Some(config.request_timeout));
        timed.set_read_timeout(Some(config.request_timeout));
        let inner = HyperClient::builder(TokioExecutor::new()).build(timed);

        let mut watch_timed = TimeoutConnector::new(https);
        watch_timed.set_connect_timeout(Some(config.request_timeout));
        let watch_inner = HyperClient::builder(TokioExecutor::new()).build(watch_timed);

        let token = match &config.auth {
            AuthConfig::Bearer { token_file } => Some(TokenFile::new(token_file.clone())),
            AuthConfig::ClientCertificate { .. } => None,
        };

        Ok(Self {
            inner,
            watch_inner,
            config,
            token,
        })
    }

    fn uri_for(&self, path: &str) -> Result<Uri, ClientError> {
        let mut parts = self.config.base_uri.clone().into_parts();
        parts.path_and_query = Some(path.parse().map_err(|e: http::uri::InvalidUri| {
            ClientError::Transport {
                path: path.to_string(),
                source: Box::new(e),
            }
        })?);
        Uri::from_parts(parts).map_err(|e| ClientError::Transport {
            path: path.to_string(),
            source: Box::new(e),
        })
    }

    async fn authorize(&self, builder: http::request::Builder) -> Result<http::request::Builder, ClientError> {
        match &self.token {
            Some(token_file) => {
                let token = token_file.get().await?;
                Ok(builder.header(http::header::AUTHORIZATION, bearer_header_value(&token)))
            }
            None => Ok(builder),
        }
    }

    /// Fetches and decodes the JSON object at `path`.
    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        let uri = self.uri_for(path)?;
        let builder = Request::get(uri).header(http::header::ACCEPT, "application/json");
        let builder = self.authorize(builder).await?;
        let req = builder
            .body(Full::new(Bytes::new()))
            .expect("request with empty body is always well-formed");

        let resp = self
            .inner
            .request(req)
            .await
            .map_err(|e| ClientError::Transport {
                path: path.to_string(),
                source: Box::new(e),
            })?;

        let status = resp.status();
        let body = collect_body(path, resp).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                method: "GET",
                path: path.to_string(),
                status,
                body: truncate(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| ClientError::Decode {
            path: path.to_string(),
            source: e,
        })
    }

    /// Opens a watch connection at `path` (a plain resource-collection
    /// path; this appends `watch=true` itself) and returns a stream of
    /// decoded events.
    ///
    /// Only the initial connect is timed out; once established, an idle
    /// watch has no read timeout (callers that want to bound an idle watch
    /// do so by racing this stream against a `CancellationToken`, as
    /// `kuryr-runtime`'s watcher does), since a live watch can legitimately
    /// sit quiet for long stretches between events.
    pub async fn watch(
        &self,
        path: &str,
    ) -> Result<impl Stream<Item = Result<WatchEvent, ClientError>>, ClientError> {
        let uri = self.uri_for(&watch_path(path))?;
        let builder = Request::get(uri).header(http::header::ACCEPT, "application/json");
        let builder = self.authorize(builder).await?;
        let req = builder
            .body(Full::new(Bytes::new()))
            .expect("request with empty body is always well-formed");

        let resp = self
            .watch_inner
            .request(req)
            .await
            .map_err(|e| ClientError::Transport {
                path: path.to_string(),
                source: Box::new(e),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = collect_body(path, resp).await?;
            return Err(ClientError::Status {
                method: "GET",
                path: path.to_string(),
                status,
                body: truncate(&body),
            });
        }

        let body_stream = crate::body::BodyDataStream::new(resp.into_body());
        Ok(decode_watch_stream(path.to_string(), body_stream))
    }

    /// Applies `annotations` to the resource at `path` under optimistic
    /// concurrency control, returning the resource's annotation map as it
    /// stood after the write succeeded.
    ///
    /// A `None` value means "remove this annotation" (encoded as JSON
    /// `null` in the merge patch, which is how
    /// `application/merge-patch+json` deletes a key). On a 409 Conflict the
    /// resource is re-fetched; if every annotation this call wants to set
    /// already holds that exact value, the write is treated as already
    /// applied and the loop succeeds; if any differs, a concurrent writer
    /// wanted something else and the call fails rather than clobbering it.
    /// Bounded by `config.annotate_max_attempts`, so a wedged reconciler
    /// has somewhere to surface rather than retrying forever.
    pub async fn annotate(
        &self,
        path: &str,
        annotations: &BTreeMap<String, Option<Value>>,
        resource_version: Option<&str>,
    ) -> Result<BTreeMap<String, Value>, ClientError> {
        let mut resource_version = resource_version.map(str::to_string);

        for attempt in 1..=self.config.annotate_max_attempts {
            let patch = build_merge_patch(annotations, resource_version.as_deref());
            let uri = self.uri_for(path)?;
            let builder = Request::patch(uri)
                .header(http::header::CONTENT_TYPE, "application/merge-patch+json")
                .header(http::header::ACCEPT, "application/json");
            let builder = self.authorize(builder).await?;
            let body = serde_json::to_vec(&patch).expect("patch body is always serializable");
            let req = builder
                .body(Full::new(Bytes::from(body)))
                .expect("request with JSON body is always well-formed");

            let resp = self
                .inner
                .request(req)
                .await
                .map_err(|e| ClientError::Transport {
                    path: path.to_string(),
                    source: Box::new(e),
                })?;

            let status = resp.status();
            let body = collect_body(path, resp).await?;

            if status.is_success() {
                let updated: Value = serde_json::from_str(&body).map_err(|e| ClientError::Decode {
                    path: path.to_string(),
                    source: e,
                })?;
                return Ok(extract_annotations(&updated));
            }

            if status != StatusCode::CONFLICT {
                return Err(ClientError::Status {
                    method: "PATCH",
                    path: path.to_string(),
                    status,
                    body: truncate(&body),
                });
            }

            debug!(path, attempt, "annotate: resourceVersion conflict, re-reading");
            let current = self.get(path).await?;
            let current_annotations = extract_annotations(&current);

            for (key, desired) in annotations {
                let live = current_annotations.get(key);
                let matches = match desired {
                    Some(v) => live == Some(v),
                    None => live.is_none(),
                };
                if !matches {
                    return Err(ClientError::AnnotateConflict {
                        path: path.to_string(),
                        key: key.clone(),
                    });
                }
            }

            let live_version = current
                .get("metadata")
                .and_then(|m| m.get("resourceVersion"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if live_version == resource_version {
                // Same resourceVersion but still a 409: nothing will change by
                // retrying immediately. Jitter briefly so a thundering herd
                // of controllers racing the same write doesn't retry in lockstep.
                let jitter_ms = rand::rng().random_range(10..100);
                tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;
            }
            resource_version = live_version;
        }

        warn!(path, attempts = self.config.annotate_max_attempts, "annotate did not converge");
        Err(ClientError::AnnotateDidNotConverge {
            path: path.to_string(),
            attempts: self.config.annotate_max_attempts,
        })
    }
}

fn build_merge_patch(annotations: &BTreeMap<String, Option<Value>>, resource_version: Option<&str>) -> Value {
    let mut ann = serde_json::Map::new();
    for (k, v) in annotations {
        ann.insert(k.clone(), v.clone().unwrap_or(Value::Null));
    }
    let mut metadata = serde_json::Map::new();
    metadata.insert("annotations".to_string(), Value::Object(ann));
    if let Some(rv) = resource_version {
        metadata.insert("resourceVersion".to_string(), Value::String(rv.to_string()));
    }
    let mut root = serde_json::Map::new();
    root.insert("metadata".to_string(), Value::Object(metadata));
    Value::Object(root)
}

fn extract_annotations(object: &Value) -> BTreeMap<String, Value> {
    object
        .get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

async fn collect_body(
    path: &str,
    resp: http::Response<hyper::body::Incoming>,
) -> Result<String, ClientError> {
    let bytes = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| ClientError::Transport {
            path: path.to_string(),
            source: Box::new(e),
        })?
        .to_bytes();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn truncate(body: &str) -> String {
    const MAX: usize = 2048;
    if body.len() > MAX {
        format!("{}... ({} bytes total)", &body[..MAX], body.len())
    } else {
        body.to_string()
    }
}

fn build_tls_config(config: &Config) -> Result<rustls::ClientConfig, ClientError> {
    let roots = load_root_store(config)?;
    let builder = rustls::ClientConfig::builder().with_root_certificates(roots);

    let mut tls_config = match &config.auth {
        AuthConfig::ClientCertificate { cert_path, key_path } => {
            let certs = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| ClientError::Credentials {
                    path: cert_path.display().to_string(),
                    source: Box::new(e),
                })?
        }
        AuthConfig::Bearer { .. } => builder.with_no_client_auth(),
    };

    if config.insecure_skip_tls_verify {
        tls_config
            .dangerous()
            .set_certificate_verifier(std::sync::Arc::new(NoCertificateVerification::new()));
    }

    Ok(tls_config)
}

/// Builds the (clonable) TLS-wrapped connector shared by both the timed
/// (GET/ANNOTATE) and untimed-read (WATCH) `hyper` clients.
fn build_https_connector(config: &Config) -> Result<HttpsConnector, ClientError> {
    let tls_config = build_tls_config(config)?;

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    // `https_or_http` (rather than `https_only`) so tests can point this
    // client at a plain-HTTP mock server; a real API server is always
    // reached over TLS in practice.
    Ok(HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http))
}

/// `path?watch=true`, preserving any query string `path` already carries.
fn watch_path(path: &str) -> String {
    match path.split_once('?') {
        Some((base, query)) if !query.is_empty() => format!("{base}?{query}&watch=true"),
        _ => format!("{}?watch=true", path.trim_end_matches('?')),
    }
}


/// A verifier that accepts any server certificate. Only installed when
/// [`Config::insecure_skip_tls_verify`] is set; signatures are still checked
/// against the payload, only the certificate chain itself goes unverified.
#[derive(Debug)]
struct NoCertificateVerification {
    provider: rustls::crypto::CryptoProvider,
}

impl NoCertificateVerification {
    fn new() -> Self {
        Self {
            provider: rustls::crypto::ring::default_provider(),
        }
    }
}

impl rustls::client::danger::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

fn load_root_store(config: &Config) -> Result<rustls::RootCertStore, ClientError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(ca_bundle) = &config.ca_bundle {
        let certs = load_certs(ca_bundle)?;
        for cert in certs {
            roots.add(cert).map_err(|e| ClientError::Credentials {
                path: ca_bundle.display().to_string(),
                source: Box::new(e),
            })?;
        }
    }

    Ok(roots)
}

fn load_certs(
    path: &std::path::Path,
) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, ClientError> {
    let bytes = std::fs::read(path).map_err(|e| ClientError::Credentials {
        path: path.display().to_string(),
        source: Box::new(e),
    })?;
    rustls_pemfile::certs(&mut bytes.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ClientError::Credentials {
            path: path.display().to_string(),
            source: Box::new(e),
        })
}

fn load_private_key(
    path: &std::path::Path,
) -> Result<rustls::pki_types::PrivateKeyDer<'static>, ClientError> {
    let bytes = std::fs::read(path).map_err(|e| ClientError::Credentials {
        path: path.display().to_string(),
        source: Box::new(e),
    })?;
    rustls_pemfile::private_key(&mut bytes.as_slice())
        .map_err(|e| ClientError::Credentials {
            path: path.display().to_string(),
            source: Box::new(e),
        })?
        .ok_or_else(|| ClientError::Credentials {
            path: path.display().to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "no private key found in file",
            )),
        })
}
