//! Contract Invariant Tests
//!
//! These tests verify the guarantees of the key exchange, config composition
//! and route dispatch end to end.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::{service_fn, ServiceExt};

use swerve::{
    bootstrap::KEY_LEN, sri_hash, Assets, Config, ConfigBuilder, ConfigOption, HashVariant,
    Import, KeyError, KeyObject, KeySource, Swerve,
};

const TEMPLATE: &[u8] = b"const key = $$ENCRYPTION_KEY$$;\nexport default key;\n";

fn test_assets() -> Assets {
    Assets {
        client: b"client-payload".to_vec().into(),
        bootstrap: TEMPLATE.to_vec().into(),
        core: b"core-payload".to_vec().into(),
    }
}

/// Wrapped app that echoes method and path and tags its responses.
fn echo_app() -> Router {
    Router::new().fallback_service(service_fn(|req: Request<Body>| async move {
        let body = format!("{} {}", req.method(), req.uri().path());
        Ok::<_, Infallible>(
            Response::builder()
                .status(StatusCode::IM_A_TEAPOT)
                .header("x-wrapped", "yes")
                .body(Body::from(body))
                .unwrap(),
        )
    }))
}

fn create_server(config: Config) -> Router {
    Swerve::new(config).with_assets(test_assets()).wrap(echo_app())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, content_type, body)
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn extract_key(body: &[u8]) -> Vec<u8> {
    let text = std::str::from_utf8(body).unwrap();
    let start = text.find('{').unwrap();
    let end = text.rfind('}').unwrap();
    let key: KeyObject = serde_json::from_str(&text[start..=end]).unwrap();
    assert_eq!(key.alg, "A256GCM");
    assert!(key.ext);
    assert_eq!(key.key_ops, vec!["encrypt", "decrypt"]);
    assert_eq!(key.kty, "oct");
    URL_SAFE_NO_PAD.decode(key.k).unwrap()
}

#[tokio::test]
async fn invariant_bootstrap_issues_fresh_keys() {
    let app = create_server(Config::default());

    let (status, content_type, first) = send(&app, get("/swerve.bootstrap.js")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/javascript"));
    let (_, _, second) = send(&app, get("/swerve.bootstrap.js")).await;

    let k1 = extract_key(&first);
    let k2 = extract_key(&second);
    assert_eq!(k1.len(), KEY_LEN);
    assert_eq!(k2.len(), KEY_LEN);
    assert_ne!(k1, k2);

    let text = String::from_utf8(first).unwrap();
    assert!(text.starts_with("const key = {\"alg\":\"A256GCM\""));
    assert!(!text.contains("$$ENCRYPTION_KEY$$"));
}

#[tokio::test]
async fn invariant_installed_cookie_blocks_bootstrap() {
    let app = create_server(Config::default());

    for method in ["GET", "POST", "HEAD"] {
        let request = Request::builder()
            .method(method)
            .uri("/swerve.bootstrap.js")
            .header(header::COOKIE, "theme=dark; swerve.installed=true")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }
}

#[tokio::test]
async fn invariant_installed_cookie_found_beside_non_ascii_cookie() {
    let app = create_server(Config::default());

    let request = Request::builder()
        .uri("/swerve.bootstrap.js")
        .header(
            header::COOKIE,
            HeaderValue::from_bytes("swerve.installed=1; name=caf\u{e9}".as_bytes()).unwrap(),
        )
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());
}

struct NoEntropy;

impl KeySource for NoEntropy {
    fn fill_key(&self, _key: &mut [u8; KEY_LEN]) -> Result<(), KeyError> {
        Err(KeyError::RandomnessUnavailable("exhausted".into()))
    }
}

#[tokio::test]
async fn invariant_randomness_failure_is_request_scoped() {
    let app = Swerve::new(Config::default())
        .with_assets(test_assets())
        .with_key_source(NoEntropy)
        .wrap(echo_app());

    let (status, _, body) = send(&app, get("/swerve.bootstrap.js")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());

    // The server keeps serving.
    let (status, _, body) = send(&app, get("/swerve.core.js")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"core-payload");
}

#[tokio::test]
async fn invariant_static_scripts_verbatim() {
    let app = create_server(Config::default());

    let (status, content_type, body) = send(&app, get("/swerve.client.js")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/javascript"));
    assert_eq!(body, b"client-payload");

    let request = Request::builder()
        .method("DELETE")
        .uri("/swerve.core.js")
        .body(Body::empty())
        .unwrap();
    let (status, content_type, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/javascript"));
    assert_eq!(body, b"core-payload");
}

#[tokio::test]
async fn invariant_other_paths_reach_wrapped_app() {
    let app = create_server(Config::default());

    for (method, path) in [
        ("GET", "/"),
        ("POST", "/api/items"),
        ("GET", "/swerve.client.js.map"),
        ("GET", "/swerve.config.json/extra"),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(header::COOKIE, "swerve.installed=1")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()["x-wrapped"], "yes");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, format!("{method} {path}").as_bytes());
    }
}

#[tokio::test]
async fn invariant_known_hashes_from_files_served() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("A"), b"X").unwrap();

    let builder = ConfigBuilder::new().known_hashes_from_dir(dir.path(), &[HashVariant::Sha384]);
    let swerve = Swerve::from_builder(&builder).unwrap().with_assets(test_assets());
    assert_eq!(swerve.config().known_hashes.len(), 1);
    let app = swerve.wrap(echo_app());

    let (status, content_type, body) = send(&app, get("/swerve.config.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));

    let doc: Value = serde_json::from_slice(&body).unwrap();
    let expected = sri_hash(HashVariant::Sha384, b"X");
    assert_eq!(doc["knownHashes"][&expected], json!({"reason": "config"}));
}

#[tokio::test]
async fn invariant_config_document_shape() {
    let config = ConfigBuilder::new()
        .title("Notes")
        .imports([Import::path("/notes.js")])
        .claim_on_install(false)
        .build()
        .unwrap();
    let app = create_server(config);

    let (_, _, body) = send(&app, get("/swerve.config.json")).await;
    assert_eq!(body.last(), Some(&b'\n'));
    let doc: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(doc, json!({"title": "Notes", "imports": [{"path": "/notes.js"}]}));
}

fn sample_options() -> Vec<ConfigOption> {
    vec![
        ConfigOption::title("App"),
        ConfigOption::imports([
            Import::path("/a.js").with_option("defer", json!(true)),
            Import::code("self.ready = true"),
        ]),
        ConfigOption::known_hashes(["sha256-one", "sha384-two"]),
        ConfigOption::NoReloadOnInstall(true),
        ConfigOption::ClaimOnInstall(true),
        ConfigOption::KnownHashesFromContents {
            contents: vec![b"payload".to_vec()],
            variants: HashVariant::ALL.to_vec(),
        },
    ]
}

#[test]
fn invariant_composition_deterministic() {
    let c1 = Config::new(sample_options()).unwrap();
    let c2 = Config::new(sample_options()).unwrap();
    assert_eq!(c1, c2);
    assert_eq!(c1.to_json().unwrap(), c2.to_json().unwrap());
    assert_eq!(c1.known_hashes.len(), 5);
}

#[test]
fn invariant_deep_copy_isolated() {
    let source = Config::new(sample_options()).unwrap();
    let before = source.to_json().unwrap();

    let mut copy = source.deep_copy().unwrap();
    assert_eq!(copy, source);

    copy.title.push_str(" (copy)");
    copy.imports[0].path = "/changed.js".into();
    copy.imports[0].config.insert("defer".into(), json!(false));
    copy.imports.push(Import::path("/extra.js"));
    if let Some(meta) = copy.known_hashes.get_mut("sha256-one") {
        meta["reason"] = json!("tampered");
    }
    copy.known_hashes.insert("sha512-new".into(), json!({}));
    copy.claim_on_install = false;

    assert_eq!(source.to_json().unwrap(), before);
}

#[test]
fn invariant_known_hash_single_entry() {
    let config = Config::new([
        ConfigOption::known_hashes(["sha384-dup"]),
        ConfigOption::known_hashes(["sha384-dup", "sha384-dup"]),
    ])
    .unwrap();
    assert_eq!(config.known_hashes.len(), 1);
}

#[test]
fn invariant_builder_reusable_without_contamination() {
    let base = Config::new([ConfigOption::title("Shared")]).unwrap();
    let first = ConfigBuilder::from_base(base.clone())
        .known_hashes(["sha256-first"])
        .build()
        .unwrap();
    let second = ConfigBuilder::from_base(base.clone())
        .imports([Import::path("/second.js")])
        .build()
        .unwrap();

    assert!(second.known_hashes.is_empty());
    assert!(first.imports.is_empty());
    assert_eq!(base, Config::new([ConfigOption::title("Shared")]).unwrap());
}
