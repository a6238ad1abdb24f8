use axum::{
    Extension, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{DateTime, Local};
use handlebars::Handlebars;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::error::AppError;
use crate::graph::CHART_FILES;
use crate::login::{
    self, Argon2Hasher, CurrentUser, PasswordHashing, SessionStore, handle_login, handle_logout,
    handle_register, require_auth, serve_login_page, serve_register_page,
};
use crate::pipeline::{self, ChartRun};
use crate::users::{CredentialStore, JsonUserStore};

/// Shared application state handed to every handler
///
/// Built once at startup; nothing here is a process global, so tests can run
/// several independent applications side by side.
pub struct AppContext {
    pub config: Arc<Config>,
    pub users: Arc<dyn CredentialStore>,
    pub hasher: Arc<dyn PasswordHashing>,
    pub sessions: SessionStore,
    views: Handlebars<'static>,
}

pub type SharedContext = Arc<AppContext>;

/// One chart as shown on the dashboard
#[derive(Debug, Serialize)]
pub struct ChartEntry {
    pub title: &'static str,
    pub url: String,
    pub modified: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub regenerated: Option<u8>,
}

fn views() -> Result<Handlebars<'static>, handlebars::TemplateError> {
    let mut views = Handlebars::new();
    views.register_template_string("login", include_str!("./static/login.hbs"))?;
    views.register_template_string("register", include_str!("./static/register.hbs"))?;
    views.register_template_string("dashboard", include_str!("./static/dashboard.hbs"))?;
    Ok(views)
}

impl AppContext {
    pub fn new(
        config: Config,
        users: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHashing>,
    ) -> Result<SharedContext, handlebars::TemplateError> {
        let sessions = SessionStore::new(config.session_duration());
        Ok(Arc::new(Self {
            config: Arc::new(config),
            users,
            hasher,
            sessions,
            views: views()?,
        }))
    }

    /// Production wiring: JSON user store, default Argon2 cost, and the
    /// bootstrap admin account.
    pub fn from_config(config: Config) -> Result<SharedContext, Box<dyn std::error::Error>> {
        let users = Arc::new(JsonUserStore::open(&config.users_file)?);
        let hasher = Arc::new(Argon2Hasher::default());
        login::bootstrap_admin(users.as_ref(), hasher.as_ref(), config.admin_password.as_deref())?;

        Ok(Self::new(config, users, hasher)?)
    }

    /// Render a template, turning template failures into a 500.
    pub fn render_page(&self, status: StatusCode, name: &str, data: &serde_json::Value) -> Response {
        match self.views.render(name, data) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => AppError::from(e).into_response(),
        }
    }

    /// Charts currently present in the chart directory, in display order.
    pub fn chart_entries(&self) -> Vec<ChartEntry> {
        CHART_FILES
            .iter()
            .filter_map(|(file, title)| {
                let path = self.config.chart_dir.join(file);
                let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
                let version = modified
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or_default();

                Some(ChartEntry {
                    title,
                    url: format!("/charts/{}?v={}", file, version),
                    modified: DateTime::<Local>::from(modified)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string(),
                })
            })
            .collect()
    }
}

/// Run the chart pipeline off the async runtime.
pub async fn regenerate_charts_blocking(ctx: &SharedContext) -> Result<ChartRun, AppError> {
    let config = Arc::clone(&ctx.config);
    let run = tokio::task::spawn_blocking(move || pipeline::regenerate_charts(&config)).await??;
    Ok(run)
}

/// Serve the dashboard with the current charts
async fn serve_dashboard(
    State(ctx): State<SharedContext>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    let charts = ctx.chart_entries();
    ctx.render_page(
        StatusCode::OK,
        "dashboard",
        &json!({
            "username": user.username,
            "missing": charts.is_empty(),
            "charts": charts,
            "error": query.error,
            "regenerated": query.regenerated.is_some(),
        }),
    )
}

/// Regenerate the charts on request and go back to the dashboard
async fn handle_regenerate(
    State(ctx): State<SharedContext>,
    Extension(user): Extension<CurrentUser>,
) -> Redirect {
    match regenerate_charts_blocking(&ctx).await {
        Ok(run) => {
            info!(
                "{} regenerated {} charts at {}",
                user.username,
                run.files.len(),
                run.generated_at
            );
            Redirect::to("/dashboard?regenerated=1")
        }
        Err(e) => {
            warn!("chart regeneration requested by {} failed: {}", user.username, e);
            Redirect::to(&format!(
                "/dashboard?error={}",
                urlencoding::encode(&e.to_string())
            ))
        }
    }
}

/// Build the application router
pub fn router(ctx: SharedContext) -> Router {
    let protected = Router::new()
        .route("/dashboard", get(serve_dashboard))
        .route("/dashboard/regenerate", post(handle_regenerate))
        .route("/logout", get(handle_logout))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), require_auth));

    Router::new()
        .route("/", get(serve_login_page).post(handle_login))
        .route("/register", get(serve_register_page).post(handle_register))
        .merge(protected)
        .nest_service("/charts", ServeDir::new(&ctx.config.chart_dir))
        .with_state(ctx)
}

/// Start the web server and serve until the process is stopped
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = config.bind_addr.clone();
    let ctx = AppContext::from_config(config)?;
    let app = router(ctx);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
