//! Asset Server - Route Dispatch in Front of an Application
//!
//! Four fixed, method-agnostic routes. Every other request goes to the
//! wrapped service untouched.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use std::borrow::Cow;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

use crate::assets::Assets;
use crate::bootstrap::{BootstrapIssuer, BootstrapOutcome, KeySource, OsKeySource};
use crate::config::{Config, ConfigBuilder, ConfigError};
use crate::{BOOTSTRAP_PATH, CLIENT_PATH, CONFIG_PATH, CORE_PATH, INSTALLED_COOKIE};

const JAVASCRIPT: &str = "text/javascript";
const JSON: &str = "application/json";

/// Shared, read-only state behind every Swerve route.
#[derive(Clone)]
pub struct Swerve {
    config: Arc<Config>,
    assets: Arc<Assets>,
    keys: Arc<dyn KeySource>,
}

impl Swerve {
    /// Serve `config` with the embedded scripts and the OS key source.
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            assets: Arc::new(Assets::default()),
            keys: Arc::new(OsKeySource),
        }
    }

    /// Build the config now; any failure aborts setup.
    pub fn from_builder(builder: &ConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self::new(builder.build()?))
    }

    pub fn with_assets(mut self, assets: Assets) -> Self {
        self.assets = Arc::new(assets);
        self
    }

    pub fn with_key_source<K: KeySource + 'static>(mut self, keys: K) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Put the Swerve routes in front of `inner`.
    pub fn wrap<S>(self, inner: S) -> Router
    where
        S: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Response: IntoResponse,
        S::Future: Send + 'static,
    {
        tracing::info!(
            title = %self.config.title,
            imports = self.config.imports.len(),
            known_hashes = self.config.known_hashes.len(),
            "swerve routes mounted"
        );
        Router::new()
            .route(CLIENT_PATH, any(client_script))
            .route(BOOTSTRAP_PATH, any(bootstrap_script))
            .route(CORE_PATH, any(core_script))
            .route(CONFIG_PATH, any(config_document))
            .fallback_service(inner)
            .with_state(self)
    }
}

async fn client_script(State(swerve): State<Swerve>) -> Response {
    tracing::debug!(path = CLIENT_PATH, "serving client script");
    javascript(swerve.assets.client.clone())
}

async fn core_script(State(swerve): State<Swerve>) -> Response {
    tracing::debug!(path = CORE_PATH, "serving core script");
    javascript(swerve.assets.core.clone())
}

async fn bootstrap_script(State(swerve): State<Swerve>, headers: HeaderMap) -> Response {
    let installed = has_cookie(&headers, INSTALLED_COOKIE);
    let issuer = BootstrapIssuer::new(&swerve.assets.bootstrap, swerve.keys.as_ref());
    match issuer.issue(installed) {
        BootstrapOutcome::Issued(body) => {
            tracing::debug!(path = BOOTSTRAP_PATH, "issued bootstrap key");
            javascript(Cow::Owned(body))
        }
        // The bootstrap script is served once per installation.
        BootstrapOutcome::AlreadyInstalled => {
            tracing::debug!(path = BOOTSTRAP_PATH, "refused bootstrap for installed client");
            StatusCode::NOT_FOUND.into_response()
        }
        BootstrapOutcome::KeyUnavailable => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn config_document(State(swerve): State<Swerve>) -> Response {
    match serde_json::to_vec(swerve.config.as_ref()) {
        Ok(mut body) => {
            body.push(b'\n');
            ([(header::CONTENT_TYPE, JSON)], body).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode config");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn javascript(body: Cow<'static, [u8]>) -> Response {
    ([(header::CONTENT_TYPE, JAVASCRIPT)], Body::from(body)).into_response()
}

/// Whether any `Cookie` header carries a cookie called `name`.
///
/// Matched on raw bytes: other cookies may hold non-ASCII values.
fn has_cookie(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .flat_map(|value| value.as_bytes().split(|b| *b == b';'))
        .filter_map(|pair| pair.split(|b| *b == b'=').next())
        .any(|cookie| cookie.trim_ascii() == name.as_bytes())
}
