use std::fmt;

use anyhow::Context as _;

pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

/// Display wrapper for user-controlled strings in log fields.
///
/// With redaction on, personal information is masked and the value is cut to
/// a bounded length. Use as `tracing::info!(title = %Redacted::new(t, on))`.
pub struct Redacted<'a> {
    value: &'a str,
    enabled: bool,
}

impl<'a> Redacted<'a> {
    pub fn new(value: &'a str, enabled: bool) -> Self {
        Self { value, enabled }
    }
}

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.enabled {
            f.write_str(&crate::safety::sanitize_for_logging(self.value))
        } else {
            f.write_str(self.value)
        }
    }
}
