use std::path::PathBuf;
use thiserror::Error as ThisError;

/// Failures of the credential store.
#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("username already exists: {0}")]
    DuplicateUsername(String),

    #[error("user store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("user store is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error("user store lock poisoned")]
    Poisoned,
}

#[derive(Debug, ThisError)]
pub enum HashError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("invalid password hash format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, ThisError)]
pub enum AuthError {
    #[error("Invalid username or password.")]
    InvalidCredentials,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

#[derive(Debug, ThisError)]
pub enum RegistrationError {
    #[error("Passwords do not match.")]
    PasswordMismatch,

    #[error("Username and password cannot be empty.")]
    EmptyField,

    #[error("A user named {0:?} already exists.")]
    UsernameTaken(String),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

impl From<StoreError> for RegistrationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateUsername(name) => RegistrationError::UsernameTaken(name),
            other => RegistrationError::Store(other),
        }
    }
}

/// Failures while slicing a table out of a spreadsheet.
#[derive(Debug, ThisError)]
pub enum ExtractError {
    #[error("source file missing: {0}")]
    SourceFileMissing(PathBuf),

    #[error("cannot open workbook {path}: {message}")]
    Workbook { path: PathBuf, message: String },

    #[error("sheet {sheet:?} not found in {path} (available: {available:?})")]
    SheetNotFound {
        path: PathBuf,
        sheet: String,
        available: Vec<String>,
    },

    #[error("window out of range in sheet {sheet:?}: {detail}")]
    SliceOutOfRange { sheet: String, detail: String },

    #[error("cell ({row}, {col}) in sheet {sheet:?} is not a number: {value}")]
    TypeCoercion {
        sheet: String,
        row: u32,
        col: u32,
        value: String,
    },
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum SeriesError {
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column {name:?} has {got} values, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
}

#[derive(Debug, ThisError)]
pub enum RenderError {
    #[error("output directory unavailable: {path}: {source}")]
    OutputDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("chart {file} has no data points")]
    EmptySeries { file: String },

    #[error("failed to draw {path}: {message}")]
    Draw { path: PathBuf, message: String },

    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// Anything that can stop a chart regeneration run.
#[derive(Debug, ThisError)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Figment(Box::new(e))
    }
}

/// Internal failures surfaced by HTTP handlers
///
/// User-facing problems (bad credentials, taken usernames) are rendered by
/// the handlers themselves. Everything that reaches this type is logged and
/// answered with a generic 500.
#[cfg(feature = "web")]
#[derive(Debug, ThisError)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("template error: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(feature = "web")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        log::error!("request failed: {}", self);
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "An internal server error occurred.",
        )
            .into_response()
    }
}
