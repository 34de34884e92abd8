//! Template filters
//!
//! - `dns_safe`: coerce a string into an RFC 1123 subdomain
//! - `env_safe`: coerce a string into an environment variable name
//! - `b64encode` / `b64decode`: base64 for Secret `data` payloads
//!
//! `dns_safe` and `env_safe` hand back the input itself (a borrowed `Cow`)
//! when it is already conformant, so callers can detect the no-op case.

use base64::{engine::general_purpose::STANDARD, Engine};
use minijinja::{Error, ErrorKind};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static DNS_SAFE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("DNS_SAFE pattern is a valid regex")
});

static DNS_UNSAFE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9.-]+").expect("DNS_UNSAFE_RUN pattern is a valid regex"));

static ENV_SAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("ENV_SAFE pattern is a valid regex"));

static NON_WORD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]+").expect("NON_WORD_RUN pattern is a valid regex"));

/// Make `input` usable as a Kubernetes resource name.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9.-]` into a
/// single `-`, then strips leading and trailing non-alphanumerics.
pub fn dns_safe(input: &str) -> Cow<'_, str> {
    if DNS_SAFE.is_match(input) {
        return Cow::Borrowed(input);
    }

    let lowered = input.to_lowercase();
    let collapsed = DNS_UNSAFE_RUN.replace_all(&lowered, "-");
    Cow::Owned(
        collapsed
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_string(),
    )
}

/// Make `input` usable as an environment variable name.
///
/// Uppercases, strips stray non-word characters at both ends, collapses every
/// interior run of non-word characters into a single `_` and prefixes a
/// leading digit with `_`. Existing underscores are left alone.
pub fn env_safe(input: &str) -> Cow<'_, str> {
    if ENV_SAFE.is_match(input) {
        return Cow::Borrowed(input);
    }

    let upper = input.to_uppercase();
    let trimmed = upper.trim_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '_'));
    let collapsed = NON_WORD_RUN.replace_all(trimmed, "_");

    if collapsed.starts_with(|c: char| c.is_ascii_digit()) {
        Cow::Owned(format!("_{collapsed}"))
    } else {
        Cow::Owned(collapsed.into_owned())
    }
}

pub(crate) fn dns_safe_filter(value: &str) -> String {
    dns_safe(value).into_owned()
}

pub(crate) fn env_safe_filter(value: &str) -> String {
    env_safe(value).into_owned()
}

/// Base64 encode filter
///
/// Usage: `{{ value | b64encode }}`
pub(crate) fn b64encode(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

/// Base64 decode filter
///
/// Usage: `{{ value | b64decode }}`
pub(crate) fn b64decode(value: &str) -> Result<String, Error> {
    let bytes = STANDARD.decode(value).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("base64 decode error: {e}"),
        )
    })?;
    String::from_utf8(bytes).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("base64 decode produced invalid UTF-8: {}", e.utf8_error()),
        )
    })
}
