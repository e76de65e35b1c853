//! Single sign-on redirect interception.
//!
//! A click on an SSO-flagged link is exchanged for a signed payload from the
//! token endpoint, which is then POSTed to the identity provider through a
//! synthetic form. Any failure falls back to the link's own navigation.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::SsoError;

pub mod http;
mod interceptor;

pub use http::HttpTokenSource;
pub use interceptor::{ClickOutcome, InterceptorState, SsoInterceptor};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PAYLOAD_FIELD: &str = "payload";

/// A navigable element and the metadata the interceptor needs from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoLink {
    pub href: String,
    /// `data-sso="true"` on the element
    pub sso: bool,
}

impl SsoLink {
    pub fn new(href: impl Into<String>, sso: bool) -> Self {
        Self {
            href: href.into(),
            sso,
        }
    }

    /// Whether the link points at the same host and port as `other`.
    /// Reported to collaborators only; it does not affect interception.
    pub fn is_same_host(&self, other: &Url) -> bool {
        Url::parse(&self.href).is_ok_and(|url| {
            url.host_str().is_some()
                && url.host_str() == other.host_str()
                && url.port_or_known_default() == other.port_or_known_default()
        })
    }
}

/// Signed token minted by the server for one click. Consumed by
/// [`SyntheticForm::with_payload`]; deliberately not `Clone`.
pub struct RedirectPayload(String);

impl RedirectPayload {
    pub fn new(body: String) -> Result<Self, SsoError> {
        if body.trim().is_empty() {
            return Err(SsoError::MalformedPayload);
        }
        Ok(Self(body))
    }

    /// Short digest for correlating logs without exposing the token.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..6])
    }

    fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for RedirectPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RedirectPayload").field(&self.fingerprint()).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HiddenField {
    pub name: String,
    pub value: String,
}

/// A form built on the fly to carry the payload to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntheticForm {
    pub method: &'static str,
    pub action: String,
    pub fields: Vec<HiddenField>,
}

impl SyntheticForm {
    pub fn with_payload(action: &Url, field: &str, payload: RedirectPayload) -> Self {
        Self {
            method: "POST",
            action: action.to_string(),
            fields: vec![HiddenField {
                name: field.to_string(),
                value: payload.into_inner(),
            }],
        }
    }

    /// Markup for hosts that render the form rather than submitting it directly.
    pub fn to_html(&self) -> String {
        let mut html = format!(
            "<form method=\"{}\" action=\"{}\">",
            self.method,
            escape_attr(&self.action)
        );
        for field in &self.fields {
            html.push_str(&format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
                escape_attr(&field.name),
                escape_attr(&field.value)
            ));
        }
        html.push_str("</form>");
        html
    }
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// The document the synthetic form is appended to and submitted from.
pub trait FormHost: Send + Sync {
    fn append_and_submit(&self, form: SyntheticForm);
}

/// In-memory document that records appended forms.
#[derive(Debug, Default)]
pub struct RecordingDocument {
    forms: Mutex<Vec<SyntheticForm>>,
}

impl RecordingDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forms(&self) -> Vec<SyntheticForm> {
        self.forms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl FormHost for RecordingDocument {
    fn append_and_submit(&self, form: SyntheticForm) {
        self.forms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(form);
    }
}

/// Source of redirect payloads, typically the site's token endpoint.
pub trait TokenSource: Send + Sync {
    fn fetch_payload(
        &self,
        destination: &str,
    ) -> impl Future<Output = Result<RedirectPayload, SsoError>> + Send;
}

#[derive(Debug, Clone)]
pub struct SsoConfig {
    /// Identity provider endpoint the synthetic form posts to
    pub provider_url: Url,
    pub timeout: Duration,
    pub payload_field: String,
}

impl SsoConfig {
    pub fn new(provider_url: Url) -> Self {
        Self {
            provider_url,
            timeout: DEFAULT_TIMEOUT,
            payload_field: DEFAULT_PAYLOAD_FIELD.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
