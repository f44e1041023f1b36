use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CRATES: &[&str] = &[
    "sigorder",
    "sigorder_types",
    "sigorder_message",
    "sigorder_relay",
    "sigorder_ledger",
    "sigorder_confirm",
];

/// Install the fmt subscriber. `--verbose` enables debug for the workspace
/// crates; otherwise `RUST_LOG` applies, falling back to info.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(directives("debug", "info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives("info", "warn")))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn directives(own: &str, rest: &str) -> String {
    let mut parts: Vec<String> = CRATES.iter().map(|name| format!("{}={}", name, own)).collect();
    parts.push(rest.to_string());
    parts.join(",")
}
