use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing for the service.
///
/// `RUST_LOG` wins when set. Otherwise `level` (from `LOG_LEVEL`) applies to
/// our crates and dependencies stay at `warn`. Output goes to stderr so the
/// stdio transport keeps stdout for JSON-RPC.
pub fn init(service_name: &str, level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(default_directives(service_name, level))
            .map_err(|e| Error::Config(format!("invalid LOG_LEVEL {level:?}: {e}")))?,
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))?;

    Ok(())
}

fn default_directives(service_name: &str, level: &str) -> String {
    let level = level.trim().to_lowercase();
    let crates = [
        service_name,
        "ica_core",
        "ica_market",
        "ica_mcp",
        "ica_telegram",
    ];
    let mut out = String::from("warn");
    for c in crates {
        out.push_str(&format!(",{c}={level}"));
    }
    out
}
