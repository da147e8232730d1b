use serde::Serialize;
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::ops::Deref;

const UNCLASSIFIED_CODE: &str = "internal_error";
const UNCLASSIFIED_MESSAGE: &str = "Something went wrong";
const REDACTED_CAUSE: &str = "<redacted>";
const MAX_LOGGED_CAUSE_LEN: usize = 200;
const SENSITIVE_MARKERS: [&str; 4] = ["token", "password", "secret", "apikey"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorContextItem {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ErrorContextItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

/// Error carried across every crate boundary in the workspace.
///
/// `code` is a stable snake_case identifier for matching, `message` is short text fit to
/// show a user, `causes` is the underlying chain, outermost first.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct AppError(Box<AppErrorPayload>);

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self(Box::new(AppErrorPayload {
            code: code.into(),
            message: message.into(),
            context: Vec::new(),
            causes: Vec::new(),
        }))
    }

    pub fn with_code(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.0.code = code.into();
        self.0.message = message.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.context.push(ErrorContextItem {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Records `error` and its sources as causes, plus the source type for log triage.
    pub fn with_source<E>(mut self, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        if self.context_value("sourceType").is_none() {
            self = self.with_context("sourceType", std::any::type_name::<E>());
        }
        let mut current: Option<&(dyn StdError + 'static)> = Some(&error);
        while let Some(cause) = current {
            self.push_cause(cause.to_string());
            current = cause.source();
        }
        self
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.0
            .context
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }

    /// Causes safe to write to a shared log: anything that looks like a path or a secret
    /// is replaced, and long text is cut.
    pub fn redacted_causes(&self) -> Vec<String> {
        self.0.causes.iter().map(|cause| redact_cause(cause)).collect()
    }

    fn from_anyhow(error: anyhow::Error) -> Self {
        if let Some(app_error) = error.downcast_ref::<Self>() {
            return app_error.clone();
        }

        let mut converted = Self::new(UNCLASSIFIED_CODE, UNCLASSIFIED_MESSAGE);
        for cause in error.chain() {
            converted.push_cause(cause.to_string());
        }
        converted
    }

    fn push_cause(&mut self, cause: String) {
        let duplicate = self.0.causes.last().is_some_and(|last| last == &cause);
        if !cause.trim().is_empty() && !duplicate {
            self.0.causes.push(cause);
        }
    }
}

fn redact_cause(cause: &str) -> String {
    let flattened = cause.replace('\n', " ");
    let trimmed = flattened.trim();
    let lower = trimmed.to_ascii_lowercase();
    let sensitive = SENSITIVE_MARKERS.iter().any(|marker| lower.contains(marker));
    let looks_like_path = trimmed.contains('/') || trimmed.contains('\\');
    if trimmed.is_empty() || sensitive || looks_like_path {
        return REDACTED_CAUSE.to_string();
    }

    match trimmed.char_indices().nth(MAX_LOGGED_CAUSE_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

impl Deref for AppError {
    type Target = AppErrorPayload;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl StdError for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::from_anyhow(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::new("io_error", "I/O operation failed").with_source(value)
    }
}

/// Attaches a stable code or a context entry to any fallible result.
pub trait ResultExt<T> {
    fn with_code(self, code: impl Into<String>, message: impl Into<String>) -> AppResult<T>;
    fn with_ctx(self, key: impl Into<String>, value: impl Into<String>) -> AppResult<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn with_code(self, code: impl Into<String>, message: impl Into<String>) -> AppResult<T> {
        self.map_err(|error| AppError::from_anyhow(error.into()).with_code(code, message))
    }

    fn with_ctx(self, key: impl Into<String>, value: impl Into<String>) -> AppResult<T> {
        self.map_err(|error| AppError::from_anyhow(error.into()).with_context(key, value))
    }
}

#[cfg(test)]
#[path = "../tests/core/errors_tests.rs"]
mod tests;
