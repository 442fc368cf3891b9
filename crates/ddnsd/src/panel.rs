//! Embedded control panel
//!
//! Small JSON API over the running configuration. Every route requires HTTP
//! basic auth with the `web_panel` credentials. Mutations are written back to
//! the config file and handed to the manager as a reload request, which
//! restarts the generation (and this panel) with the new settings.
//!
//! ```text
//! GET    /api/v1/info
//! GET    /api/v1/domains
//! DELETE /api/v1/domains/{name}
//! GET    /api/v1/provider        PUT /api/v1/provider
//! GET    /api/v1/network         PUT /api/v1/network
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ddns_core::config::{Credentials, Domain, WebhookConfig};
use ddns_core::traits::{ControlPanel, IpSource, PanelContext};
use ddns_core::{Error, IpVersion, Settings};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Axum-based [`ControlPanel`]
pub struct WebPanel {
    default_addr: String,
}

impl WebPanel {
    /// `default_addr` is used when `web_panel.addr` is empty.
    pub fn new(default_addr: impl Into<String>) -> Self {
        Self {
            default_addr: default_addr.into(),
        }
    }
}

/// Turn Go-style `:9000` into a bindable `0.0.0.0:9000`.
pub fn normalize_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

#[async_trait]
impl ControlPanel for WebPanel {
    async fn serve(&self, ctx: PanelContext, cancel: CancellationToken) -> ddns_core::Result<()> {
        let panel = &ctx.settings.web_panel;
        if panel.username.is_empty() || panel.password.is_empty() {
            return Err(Error::config(
                "web panel requires web_panel.username and web_panel.password",
            ));
        }

        let addr = if panel.addr.trim().is_empty() {
            normalize_addr(&self.default_addr)
        } else {
            normalize_addr(&panel.addr)
        };
        let listener = TcpListener::bind(&addr).await?;
        info!("Control panel listening on {}", addr);

        serve_on(listener, ctx, cancel).await
    }
}

/// Serve the panel API on an already bound listener until `cancel` fires.
pub async fn serve_on(
    listener: TcpListener,
    ctx: PanelContext,
    cancel: CancellationToken,
) -> ddns_core::Result<()> {
    let state = Arc::new(PanelState {
        working: Mutex::new((*ctx.settings).clone()),
        ctx,
    });

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    info!("Control panel stopped");
    Ok(())
}

struct PanelState {
    ctx: PanelContext,
    /// Latest settings as edited through the panel during this generation
    working: Mutex<Settings>,
}

fn router(state: Arc<PanelState>) -> Router {
    Router::new()
        .route("/api/v1/info", get(get_info))
        .route("/api/v1/domains", get(get_domains))
        .route("/api/v1/domains/{name}", delete(delete_domain))
        .route("/api/v1/provider", get(get_provider).put(put_provider))
        .route("/api/v1/network", get(get_network).put(put_network))
        .layer(middleware::from_fn_with_state(state.clone(), basic_auth))
        .with_state(state)
}

/// Check an `Authorization: Basic ...` header against the expected pair.
fn authorized(headers: &HeaderMap, username: &str, password: &str) -> bool {
    let Some(encoded) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
    else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    matches!(decoded.split_once(':'), Some((u, p)) if u == username && p == password)
}

async fn basic_auth(
    State(state): State<Arc<PanelState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let panel = &state.ctx.settings.web_panel;
    if authorized(&headers, &panel.username, &panel.password) {
        return next.run(request).await;
    }
    tracing::debug!("Rejected panel request to {}", request.uri().path());
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"ddns\"")],
    )
        .into_response()
}

/// JSON error body with a status code
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct BasicInfo {
    version: &'static str,
    start_time: i64,
    domain_num: usize,
    sub_domain_num: usize,
    domains: Vec<Domain>,
    public_ip: String,
    ip_mode: &'static str,
    provider: String,
}

/// Shown until the first resolution completes.
const NOT_RESOLVED: &str = "not yet resolved";

/// Reads the cache only; a request never waits on IP discovery.
fn public_ip_label(source: &dyn IpSource) -> String {
    source
        .cached()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| NOT_RESOLVED.to_string())
}

async fn get_info(State(state): State<Arc<PanelState>>) -> Json<BasicInfo> {
    let settings = state.working.lock().await.clone();
    let public_ip = public_ip_label(state.ctx.ip_source.as_ref());

    Json(BasicInfo {
        version: env!("CARGO_PKG_VERSION"),
        start_time: state.ctx.started_at.timestamp(),
        domain_num: settings.domains.len(),
        sub_domain_num: settings.subdomain_count(),
        public_ip,
        ip_mode: settings.ip_type.as_str(),
        provider: settings.provider.clone(),
        domains: settings.domains,
    })
}

async fn get_domains(State(state): State<Arc<PanelState>>) -> Json<Vec<Domain>> {
    Json(state.working.lock().await.domains.clone())
}

async fn delete_domain(
    State(state): State<Arc<PanelState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Domain>>, ApiError> {
    let updated = commit(&state, |settings| {
        if remove_domain(settings, &name) {
            Ok(())
        } else {
            Err(ApiError(
                StatusCode::NOT_FOUND,
                format!("domain {name} is not configured"),
            ))
        }
    })
    .await?;
    Ok(Json(updated.domains))
}

/// Provider selection and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProviderInfo {
    provider: String,
    #[serde(flatten)]
    credentials: Credentials,
}

async fn get_provider(State(state): State<Arc<PanelState>>) -> Json<ProviderInfo> {
    let settings = state.working.lock().await;
    Json(ProviderInfo {
        provider: settings.provider.clone(),
        credentials: settings.credentials.clone(),
    })
}

async fn put_provider(
    State(state): State<Arc<PanelState>>,
    Json(body): Json<ProviderInfo>,
) -> Result<Json<ProviderInfo>, ApiError> {
    let updated = commit(&state, |settings| {
        settings.provider = body.provider.trim().to_string();
        settings.credentials = body.credentials.clone();
        Ok(())
    })
    .await?;
    Ok(Json(ProviderInfo {
        provider: updated.provider,
        credentials: updated.credentials,
    }))
}

/// Discovery and outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NetworkSettings {
    ip_mode: IpVersion,
    #[serde(default)]
    ip_urls: Vec<String>,
    #[serde(default)]
    ipv6_urls: Vec<String>,
    #[serde(default)]
    use_proxy: bool,
    #[serde(default)]
    skip_ssl_verify: bool,
    #[serde(default)]
    socks5_proxy: String,
    #[serde(default)]
    webhook: WebhookConfig,
    #[serde(default)]
    resolver: String,
    #[serde(default)]
    ip_interface: String,
}

impl NetworkSettings {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            ip_mode: settings.ip_type,
            ip_urls: settings.ip_urls.clone(),
            ipv6_urls: settings.ipv6_urls.clone(),
            use_proxy: settings.use_proxy,
            skip_ssl_verify: settings.skip_ssl_verify,
            socks5_proxy: settings.socks5_proxy.clone(),
            webhook: settings.webhook.clone(),
            resolver: settings.resolver.clone(),
            ip_interface: settings.ip_interface.clone(),
        }
    }

    fn apply(self, settings: &mut Settings) {
        settings.ip_type = self.ip_mode;
        settings.ip_urls = self.ip_urls;
        settings.ipv6_urls = self.ipv6_urls;
        settings.use_proxy = self.use_proxy;
        settings.skip_ssl_verify = self.skip_ssl_verify;
        settings.socks5_proxy = self.socks5_proxy;
        settings.webhook = self.webhook;
        settings.resolver = self.resolver;
        settings.ip_interface = self.ip_interface;
    }
}

async fn get_network(State(state): State<Arc<PanelState>>) -> Json<NetworkSettings> {
    Json(NetworkSettings::from_settings(&*state.working.lock().await))
}

async fn put_network(
    State(state): State<Arc<PanelState>>,
    Json(body): Json<NetworkSettings>,
) -> Result<Json<NetworkSettings>, ApiError> {
    let updated = commit(&state, |settings| {
        body.clone().apply(settings);
        Ok(())
    })
    .await?;
    Ok(Json(NetworkSettings::from_settings(&updated)))
}

fn remove_domain(settings: &mut Settings, name: &str) -> bool {
    let before = settings.domains.len();
    settings
        .domains
        .retain(|d| !d.domain_name.eq_ignore_ascii_case(name));
    settings.domains.len() != before
}

/// Edit a copy of the settings, validate, persist, then request a reload.
async fn commit<F>(state: &PanelState, edit: F) -> Result<Settings, ApiError>
where
    F: FnOnce(&mut Settings) -> Result<(), ApiError>,
{
    let Some(path) = state.ctx.config_path.as_deref() else {
        return Err(ApiError(
            StatusCode::CONFLICT,
            "configuration is read-only".to_string(),
        ));
    };

    let mut working = state.working.lock().await;
    let mut next = working.clone();
    edit(&mut next)?;
    next.validate()?;
    next.save(path)?;

    if let Err(e) = state.ctx.reload.request(next.clone()) {
        warn!("Saved configuration but could not request a reload: {}", e);
    }
    info!("Configuration updated from the control panel");
    *working = next.clone();
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn settings() -> Settings {
        let mut settings = Settings {
            provider: "DuckDNS".into(),
            domains: vec![
                Domain::new("example.com", ["www", "@"]),
                Domain::new("example.org", ["home"]),
            ],
            ..Settings::default()
        };
        settings.credentials.login_token = "tok".into();
        settings
    }

    /// Source with a cold cache that must never be asked to resolve
    struct ColdSource;

    #[async_trait]
    impl IpSource for ColdSource {
        async fn current(&self) -> Option<std::net::IpAddr> {
            panic!("info must not trigger a resolution");
        }

        fn cached(&self) -> Option<std::net::IpAddr> {
            None
        }
    }

    struct WarmSource;

    #[async_trait]
    impl IpSource for WarmSource {
        async fn current(&self) -> Option<std::net::IpAddr> {
            panic!("info must not trigger a resolution");
        }

        fn cached(&self) -> Option<std::net::IpAddr> {
            Some("203.0.113.7".parse().unwrap())
        }
    }

    #[test]
    fn public_ip_reads_only_the_cache() {
        assert_eq!(public_ip_label(&ColdSource), NOT_RESOLVED);
        assert_eq!(public_ip_label(&WarmSource), "203.0.113.7");
    }

    #[test]
    fn normalize_go_style_addr() {
        assert_eq!(normalize_addr(":9000"), "0.0.0.0:9000");
        assert_eq!(normalize_addr("127.0.0.1:8080"), "127.0.0.1:8080");
    }

    #[test]
    fn basic_auth_accepts_only_matching_pair() {
        let mut headers = HeaderMap::new();
        assert!(!authorized(&headers, "admin", "secret"));

        let good = format!("Basic {}", STANDARD.encode("admin:secret"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&good).unwrap());
        assert!(authorized(&headers, "admin", "secret"));
        assert!(!authorized(&headers, "admin", "other"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert!(!authorized(&headers, "admin", "secret"));
    }

    #[test]
    fn remove_domain_is_case_insensitive() {
        let mut settings = settings();
        assert!(remove_domain(&mut settings, "EXAMPLE.org"));
        assert_eq!(settings.domains.len(), 1);
        assert!(!remove_domain(&mut settings, "missing.net"));
    }

    #[test]
    fn network_settings_round_trip_through_settings() {
        let mut settings = settings();
        let mut network = NetworkSettings::from_settings(&settings);
        network.ip_mode = IpVersion::V6;
        network.resolver = "1.1.1.1".into();
        network.apply(&mut settings);

        assert_eq!(settings.ip_type, IpVersion::V6);
        assert_eq!(settings.resolver_address(), Some("1.1.1.1"));
    }

    #[test]
    fn provider_info_flattens_credentials() {
        let info = ProviderInfo {
            provider: "Cloudflare".into(),
            credentials: settings().credentials,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["provider"], "Cloudflare");
        assert_eq!(json["login_token"], "tok");
    }
}
