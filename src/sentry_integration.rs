//! Optional Sentry error tracking integration.
//!
//! Upstream failures and cache store degradations are logged through
//! `tracing`; with this feature enabled the `sentry-tracing` layer turns
//! `error` events into Sentry events and `warn` events into breadcrumbs.
//! The returned guard must be held for the lifetime of the application.

pub fn init(
    dsn: &str,
    environment: Option<&str>,
    cache_backend: &'static str,
) -> sentry::ClientInitGuard {
    let parsed_dsn = match dsn.parse() {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!(error = %e, "invalid Sentry DSN, error tracking disabled");
            None
        }
    };

    let guard = sentry::init(sentry::ClientOptions {
        dsn: parsed_dsn,
        environment: environment.map(|e| e.to_string().into()),
        release: Some(env!("CARGO_PKG_VERSION").into()),
        attach_stacktrace: true,
        ..Default::default()
    });
    sentry::configure_scope(|scope| scope.set_tag("cache_backend", cache_backend));
    guard
}
