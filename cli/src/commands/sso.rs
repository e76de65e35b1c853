use std::time::Duration;

use clap::Args;
use formgate_core::sso::{
    ClickOutcome, DEFAULT_TIMEOUT, HttpTokenSource, RecordingDocument, SsoConfig, SsoInterceptor,
    SsoLink,
};
use serde_json::json;
use url::Url;

use crate::util::{StoredSettings, client, exit_error, print_json};

#[derive(Args)]
pub struct ClickArgs {
    /// Link target the user clicked
    #[arg(long)]
    pub href: String,

    /// Treat the link as SSO-flagged (data-sso="true")
    #[arg(long)]
    pub sso: bool,

    /// Redirect-token endpoint (defaults to /ssoout on the link's site)
    #[arg(long, env = "FORMGATE_TOKEN_ENDPOINT")]
    pub token_endpoint: Option<String>,

    /// Identity provider endpoint the payload is posted to
    #[arg(long, env = "FORMGATE_SSO_URL")]
    pub sso_url: Option<String>,

    /// Round-trip timeout in milliseconds
    #[arg(long, env = "FORMGATE_SSO_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Print the synthetic form as HTML instead of JSON
    #[arg(long)]
    pub html: bool,
}

fn parse_url(raw: &str, name: &str) -> Url {
    Url::parse(raw).unwrap_or_else(|e| exit_error(&format!("Invalid {name} '{raw}': {e}"), None))
}

fn require_url(flag: Option<String>, stored: Option<String>, name: &str, env: &str) -> Url {
    let Some(raw) = flag.or(stored) else {
        exit_error(
            &format!("{name} is required"),
            Some(&format!("Pass --{name}, set {env}, or add it to the settings file.")),
        );
    };
    parse_url(&raw, name)
}

/// Explicit endpoint if configured, otherwise the default route on the link's site.
fn token_source(
    flag: Option<String>,
    stored: Option<String>,
    href: &str,
    timeout: Duration,
) -> HttpTokenSource {
    let http = client(timeout);
    match flag.or(stored) {
        Some(raw) => HttpTokenSource::with_client(http, parse_url(&raw, "token-endpoint")),
        None => HttpTokenSource::for_site(http, &parse_url(href, "href"))
            .unwrap_or_else(|e| exit_error(&format!("Cannot derive token endpoint: {e}"), None)),
    }
}

/// Simulate a click on a link: perform the token round trip and print
/// what the page would do.
///
/// Exit codes: 0 = submitted or not intercepted, 3 = fell back to default
/// navigation, 4 = usage error.
pub async fn click(args: ClickArgs, settings: StoredSettings) -> i32 {
    let sso_url = require_url(args.sso_url, settings.sso_url, "sso-url", "FORMGATE_SSO_URL");
    let timeout = args
        .timeout_ms
        .or(settings.timeout_ms)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_TIMEOUT);

    // The interceptor enforces the timeout; the client limit is only a backstop.
    let source = token_source(
        args.token_endpoint,
        settings.token_endpoint,
        &args.href,
        timeout * 2,
    );
    let token_endpoint = source.endpoint().to_string();
    let document = RecordingDocument::new();
    let link = SsoLink::new(args.href, args.sso);
    let same_host = link.is_same_host(&sso_url);
    let interceptor = SsoInterceptor::new(source, SsoConfig::new(sso_url).with_timeout(timeout));

    let outcome = interceptor.intercept_click(&link, &document).await;
    let forms = document.forms();

    if args.html {
        for form in &forms {
            println!("{}", form.to_html());
        }
    } else {
        let mut out = json!({
            "outcome": outcome.label(),
            "cancel_default_navigation": outcome.cancels_navigation(),
            "state": interceptor.state(),
            "token_endpoint": token_endpoint,
            "same_host": same_host,
            "forms": forms,
        });
        if let ClickOutcome::FellBack(err) = &outcome {
            out["error"] = json!({ "code": err.code(), "message": err.to_string() });
            out["navigate_to"] = json!(link.href);
        }
        print_json(&out);
    }

    match outcome {
        ClickOutcome::FellBack(_) => 3,
        _ => 0,
    }
}
