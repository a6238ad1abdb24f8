#[cfg(feature = "web")]
use crate::app::{SharedContext, regenerate_charts_blocking};
use crate::error::{AuthError, HashError, RegistrationError};
use crate::users::{CredentialStore, UserRecord};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
#[cfg(feature = "web")]
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
#[cfg(feature = "web")]
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use log::{info, warn};
use serde::Deserialize;
#[cfg(feature = "web")]
use serde_json::json;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Name of the bootstrap administrator account
pub const ADMIN_USERNAME: &str = "admin";

/// Password used for the bootstrap account when the operator supplies none
pub const LEGACY_ADMIN_PASSWORD: &str = "admin";

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

/// One-way password hashing
///
/// `hash` produces a self-describing string (salt and parameters included);
/// `verify` checks a plaintext candidate against such a string.
pub trait PasswordHashing: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, HashError>;

    /// # Errors
    /// * `HashError::InvalidFormat` if `hash` is not a parseable hash string
    fn verify(&self, password: &str, hash: &str) -> Result<bool, HashError>;
}

/// Argon2id hasher with a random salt per password
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl Argon2Hasher {
    /// Hasher with explicit cost parameters
    ///
    /// # Arguments
    /// * `m_cost` - Memory size in KiB
    /// * `t_cost` - Number of iterations
    /// * `p_cost` - Degree of parallelism
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, HashError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| HashError::Hash(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl PasswordHashing for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| HashError::Hash(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, HashError> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| HashError::InvalidFormat(e.to_string()))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashError::Hash(e.to_string())),
        }
    }
}

/// Check a username/password pair against the credential store
///
/// Unknown users and wrong passwords are indistinguishable to the caller.
///
/// # Errors
/// * `AuthError::InvalidCredentials` if the pair does not match a user
/// * `AuthError::Store` / `AuthError::Hash` on storage or hash-format trouble
pub fn authenticate(
    store: &dyn CredentialStore,
    hasher: &dyn PasswordHashing,
    username: &str,
    password: &str,
) -> Result<UserRecord, AuthError> {
    let user = store
        .find_by_username(username)?
        .ok_or(AuthError::InvalidCredentials)?;

    if hasher.verify(password, &user.password_hash)? {
        Ok(user)
    } else {
        Err(AuthError::InvalidCredentials)
    }
}

/// Register a new user
///
/// The username is trimmed. A mismatched confirmation fails before the store
/// is consulted.
pub fn register(
    store: &dyn CredentialStore,
    hasher: &dyn PasswordHashing,
    username: &str,
    password: &str,
    password_confirm: &str,
) -> Result<UserRecord, RegistrationError> {
    if password != password_confirm {
        return Err(RegistrationError::PasswordMismatch);
    }

    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(RegistrationError::EmptyField);
    }

    let password_hash = hasher.hash(password)?;
    let user = store.insert(username, &password_hash)?;
    info!("registered user {} (id {})", user.username, user.id);
    Ok(user)
}

/// Make sure the `admin` account exists
///
/// Returns `true` if the account was created by this call. Without an
/// operator-supplied password the legacy fixed password is used.
pub fn bootstrap_admin(
    store: &dyn CredentialStore,
    hasher: &dyn PasswordHashing,
    password: Option<&str>,
) -> Result<bool, RegistrationError> {
    if store.find_by_username(ADMIN_USERNAME)?.is_some() {
        return Ok(false);
    }

    let password = match password {
        Some(p) if !p.is_empty() => p,
        _ => {
            warn!(
                "no admin_password configured; creating {:?} with the default password, change it",
                ADMIN_USERNAME
            );
            LEGACY_ADMIN_PASSWORD
        }
    };

    let password_hash = hasher.hash(password)?;
    match store.insert(ADMIN_USERNAME, &password_hash) {
        Ok(_) => {
            info!("bootstrap account {:?} created", ADMIN_USERNAME);
            Ok(true)
        }
        // created concurrently by someone else
        Err(crate::error::StoreError::DuplicateUsername(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    /// Username of the authenticated user
    pub username: String,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// Active sessions keyed by a random session id
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    lifetime: Duration,
}

impl SessionStore {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lifetime,
        }
    }

    /// Create a session for `username` and return its id.
    ///
    /// Sessions that have already expired are purged on the way.
    pub fn create(&self, username: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            username: username.to_string(),
            expires_at: SystemTime::now() + self.lifetime,
        };

        let now = SystemTime::now();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session_id.clone(), session);
        session_id
    }

    /// Username bound to `session_id`, if the session exists and is live.
    ///
    /// Expired sessions are dropped.
    pub fn validate(&self, session_id: &str) -> Option<String> {
        {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            match sessions.get(session_id) {
                Some(session) if session.expires_at > SystemTime::now() => {
                    return Some(session.username.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        self.remove(session_id);
        None
    }

    /// Invalidate a session. Returns whether it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Login form data
#[derive(Debug, Deserialize)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

/// Registration form data
#[derive(Debug, Deserialize)]
pub struct RegistrationForm {
    pub username: String,
    pub password: String,
    #[serde(alias = "password2")]
    pub password_confirm: String,
}

/// Query string of the login page
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub registered: Option<u8>,
}

/// Authenticated user, placed in request extensions by [`require_auth`]
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub username: String,
    pub session_id: String,
}

// Web handler functions below (only compiled with "web" feature)

/// Serve the login page
#[cfg(feature = "web")]
pub async fn serve_login_page(
    State(ctx): State<SharedContext>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let notice = query
        .registered
        .map(|_| "Account created, you can log in now.");
    ctx.render_page(StatusCode::OK, "login", &json!({ "notice": notice }))
}

/// Handle login form submissions
///
/// On success a session cookie is set and the charts are regenerated (when
/// `regenerate_on_login` is on) before redirecting to the dashboard. A chart
/// failure is logged and does not fail the login.
#[cfg(feature = "web")]
pub async fn handle_login(
    State(ctx): State<SharedContext>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    let auth_ctx = ctx.clone();
    let username = credentials.username.clone();
    let result = tokio::task::spawn_blocking(move || {
        authenticate(
            auth_ctx.users.as_ref(),
            auth_ctx.hasher.as_ref(),
            &credentials.username,
            &credentials.password,
        )
    })
    .await;

    let user = match result {
        Ok(Ok(user)) => user,
        Ok(Err(AuthError::InvalidCredentials)) => {
            info!("failed login for {:?}", username);
            return ctx.render_page(
                StatusCode::UNAUTHORIZED,
                "login",
                &json!({ "error": AuthError::InvalidCredentials.to_string(), "username": username }),
            );
        }
        Ok(Err(e)) => return crate::error::AppError::from(e).into_response(),
        Err(e) => return crate::error::AppError::from(e).into_response(),
    };

    let session_id = ctx.sessions.create(&user.username);
    info!("user {} logged in", user.username);

    if ctx.config.regenerate_on_login {
        if let Err(e) = regenerate_charts_blocking(&ctx).await {
            warn!("chart regeneration after login of {} failed: {}", user.username, e);
        }
    }

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), Redirect::to("/dashboard")).into_response()
}

/// Serve the registration page
#[cfg(feature = "web")]
pub async fn serve_register_page(State(ctx): State<SharedContext>) -> Response {
    ctx.render_page(StatusCode::OK, "register", &json!({}))
}

/// Handle registration form submissions
///
/// Redirects to the login page on success, re-renders the form with a
/// message otherwise.
#[cfg(feature = "web")]
pub async fn handle_register(
    State(ctx): State<SharedContext>,
    Form(form): Form<RegistrationForm>,
) -> Response {
    let reg_ctx = ctx.clone();
    let username = form.username.trim().to_string();
    let result = tokio::task::spawn_blocking(move || {
        register(
            reg_ctx.users.as_ref(),
            reg_ctx.hasher.as_ref(),
            &form.username,
            &form.password,
            &form.password_confirm,
        )
    })
    .await;

    let (status, message) = match result {
        Ok(Ok(_)) => return Redirect::to("/?registered=1").into_response(),
        Ok(Err(e @ (RegistrationError::PasswordMismatch | RegistrationError::EmptyField))) => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        Ok(Err(e @ RegistrationError::UsernameTaken(_))) => (StatusCode::CONFLICT, e.to_string()),
        Ok(Err(e)) => return crate::error::AppError::from(e).into_response(),
        Err(e) => return crate::error::AppError::from(e).into_response(),
    };

    ctx.render_page(
        status,
        "register",
        &json!({ "error": message, "username": username }),
    )
}

/// Handle user logout
///
/// Drops the session, clears the cookie and redirects to the login page.
#[cfg(feature = "web")]
pub async fn handle_logout(
    State(ctx): State<SharedContext>,
    jar: CookieJar,
    axum::Extension(user): axum::Extension<CurrentUser>,
) -> (CookieJar, Redirect) {
    ctx.sessions.remove(&user.session_id);
    info!("user {} logged out", user.username);

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/"))
}

/// Authentication middleware
///
/// Passes the request on with a [`CurrentUser`] extension when the session
/// cookie names a live session, redirects to the login page otherwise.
#[cfg(feature = "web")]
pub async fn require_auth(
    State(ctx): State<SharedContext>,
    jar: CookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if let Some(session_cookie) = jar.get(SESSION_COOKIE) {
        let session_id = session_cookie.value().to_string();
        if let Some(username) = ctx.sessions.validate(&session_id) {
            request
                .extensions_mut()
                .insert(CurrentUser {
                    username,
                    session_id,
                });
            return next.run(request).await;
        }
    }

    Redirect::to("/").into_response()
}
