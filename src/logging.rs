use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

/// Installs a global `tracing` subscriber for test binaries.
///
/// The `#[traced_test]` decorator does not work well with integration tests
/// because each test module runs in its own crate and the decorator filters
/// out events from `bitcoind_harness`. Those tests call this instead, at
/// the start of each test.
///
/// `RUST_LOG` overrides the default filter.
pub fn tracing_logger() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bitcoind_harness=debug,reqwest=warn,hyper=warn"));
    let subscriber = FmtSubscriber::builder()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(env_filter)
        .with_thread_ids(true)
        .finish();

    // fails if a global default was already set, which happens whenever
    // several tests share a process. ignore it.
    let _result = tracing::subscriber::set_global_default(subscriber);
}
