use std::env;

use tracing_subscriber::EnvFilter;

const CRATES: [&str; 5] = [
    "folio_cli",
    "folio_core",
    "folio_engine",
    "folio_cache",
    "folio_scheduler",
];

/// Install a stderr subscriber
///
/// `FOLIO_LOG` wins over `RUST_LOG`; without either, `-v` raises the level of
/// the folio crates from `warn` to `info`, `debug` and `trace`.
pub fn init(verbosity: u8) {
    let filter = filter(env::var("FOLIO_LOG").ok(), env::var("RUST_LOG").ok(), verbosity);
    // A subscriber may already be installed when running inside tests
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn filter(folio_log: Option<String>, rust_log: Option<String>, verbosity: u8) -> EnvFilter {
    if let Some(folio_log) = folio_log {
        return EnvFilter::new(expand(&folio_log));
    }
    if let Some(rust_log) = rust_log {
        return EnvFilter::new(rust_log);
    }
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::new(expand(level))
}

/// `FOLIO_LOG=debug` becomes `warn,folio_cli=debug,folio_core=debug,...`
///
/// Values with directive syntax are used as-is.
fn expand(directive: &str) -> String {
    if directive.contains('=') || directive.contains(',') {
        return directive.to_string();
    }
    let mut filter = String::from("warn");
    for name in CRATES {
        filter.push_str(&format!(",{name}={directive}"));
    }
    filter
}
