use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::{FormHost, SsoConfig, SsoLink, SyntheticForm, TokenSource};
use crate::error::SsoError;

/// Where the interceptor is in the click-to-navigation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptorState {
    Idle,
    /// Waiting on the token endpoint
    Requesting,
    /// Synthetic form submitted; the page is navigating away
    Submitting,
    /// Round trip failed; the link's own navigation was allowed
    Fallback,
}

/// What happened to a click.
#[derive(Debug)]
pub enum ClickOutcome {
    /// Not an SSO link; default navigation proceeds.
    NotIntercepted,
    /// Payload obtained and the synthetic form submitted.
    Submitted,
    /// Round trip failed; default navigation proceeds.
    FellBack(SsoError),
    /// Another click is in flight or already navigating; this one is dropped.
    Suppressed,
}

impl ClickOutcome {
    /// Whether the caller must prevent the link's default navigation.
    pub fn cancels_navigation(&self) -> bool {
        matches!(self, ClickOutcome::Submitted | ClickOutcome::Suppressed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClickOutcome::NotIntercepted => "not_intercepted",
            ClickOutcome::Submitted => "submitted",
            ClickOutcome::FellBack(_) => "fell_back",
            ClickOutcome::Suppressed => "suppressed",
        }
    }
}

/// Gates navigation on SSO-flagged links behind a token round trip.
///
/// At most one round trip is outstanding at a time; clicks that arrive
/// while one is pending, or after the synthetic form was submitted, are
/// suppressed rather than queued.
pub struct SsoInterceptor<T> {
    source: T,
    config: SsoConfig,
    state: Mutex<InterceptorState>,
}

impl<T: TokenSource> SsoInterceptor<T> {
    pub fn new(source: T, config: SsoConfig) -> Self {
        Self {
            source,
            config,
            state: Mutex::new(InterceptorState::Idle),
        }
    }

    pub fn state(&self) -> InterceptorState {
        *self.lock_state()
    }

    /// Return to `Idle`, e.g. when the page is restored from the history cache.
    pub fn reset(&self) {
        *self.lock_state() = InterceptorState::Idle;
    }

    pub async fn intercept_click<H: FormHost>(&self, link: &SsoLink, host: &H) -> ClickOutcome {
        {
            let mut state = self.lock_state();
            if matches!(
                *state,
                InterceptorState::Requesting | InterceptorState::Submitting
            ) {
                tracing::debug!(state = ?*state, href = %link.href, "click suppressed");
                return ClickOutcome::Suppressed;
            }
            if !link.sso {
                return ClickOutcome::NotIntercepted;
            }
            *state = InterceptorState::Requesting;
        }

        let click_id = Uuid::now_v7();
        let span = tracing::info_span!("sso_click", %click_id, href = %link.href);
        let mut pending = PendingRequest::new(&self.state);

        let result = match tokio::time::timeout(
            self.config.timeout,
            self.source.fetch_payload(&link.href),
        )
        .instrument(span.clone())
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SsoError::Timeout(self.config.timeout)),
        };

        let _entered = span.enter();
        match result {
            Ok(payload) => {
                tracing::info!(payload = %payload.fingerprint(), "submitting SSO redirect form");
                let form = SyntheticForm::with_payload(
                    &self.config.provider_url,
                    &self.config.payload_field,
                    payload,
                );
                pending.finish(InterceptorState::Submitting);
                host.append_and_submit(form);
                ClickOutcome::Submitted
            }
            Err(err) => {
                tracing::warn!(error = %err, code = err.code(), "SSO round trip failed; allowing default navigation");
                pending.finish(InterceptorState::Fallback);
                ClickOutcome::FellBack(err)
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, InterceptorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Returns the interceptor to `Idle` if a click future is dropped mid-request.
struct PendingRequest<'a> {
    state: &'a Mutex<InterceptorState>,
    finished: bool,
}

impl<'a> PendingRequest<'a> {
    fn new(state: &'a Mutex<InterceptorState>) -> Self {
        Self {
            state,
            finished: false,
        }
    }

    fn finish(&mut self, next: InterceptorState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
        self.finished = true;
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = InterceptorState::Idle;
        }
    }
}
