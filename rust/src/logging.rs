/// Host-app / test logging initialization: tracing-subscriber fmt to
/// stderr. `try_init` so repeated calls (one per test) are harmless.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kestrel_core=debug,info".into()),
        )
        .try_init();
}
