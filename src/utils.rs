use async_graphql::Context;
use log::error;
use rocket::tokio::task;

use crate::config::Config;
use crate::db::Pool;
use crate::types::{ApiError, ApiResult};
use crate::users::{User, Viewer};

pub trait ContextExt {
    fn pool(&self) -> &Pool;
    fn config(&self) -> &Config;
    fn viewer(&self) -> Option<&User>;

    /// Fails with `message` when the request is anonymous.
    fn require_viewer(&self, message: &'static str) -> ApiResult<&User> {
        self.viewer().ok_or(ApiError::Unauthenticated(message))
    }
}

impl ContextExt for Context<'_> {
    fn pool(&self) -> &Pool {
        self.data_unchecked()
    }

    fn config(&self) -> &Config {
        self.data_unchecked()
    }

    fn viewer(&self) -> Option<&User> {
        self.data_opt::<Viewer>().and_then(|viewer| viewer.0.as_ref())
    }
}

/// Runs CPU-bound or blocking work off the async executor.
pub async fn blocking<F, T>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(work).await.map_err(|e| {
        error!("blocking task failed: {}", e);
        ApiError::Internal
    })?
}

/// Drops values that are empty once trimmed.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Builds a `LIKE` pattern matching `term` anywhere, with its own wildcards
/// escaped.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("faker"), "%faker%");
        assert_eq!(like_pattern("100%_win"), "%100\\%\\_win%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn blank_strings_are_dropped() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" x ".into())), Some(" x ".into()));
    }
}
