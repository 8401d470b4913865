//! CLI configuration for the master binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser as Clap, ValueHint};
use color_eyre::eyre::WrapErr;
use loadfleet_api::TestSpec;

#[derive(Clap, Debug)]
#[clap(
    name = clap::crate_name!(),
    author,
    about,
    version,
    propagate_version = true,
)]
pub struct Config {
    /// Path to the TOML test specification submitted to every slave.
    #[clap(value_hint = ValueHint::FilePath)]
    pub spec: PathBuf,

    /// Slave nodes to coordinate, as comma-separated `host:port` pairs.
    ///
    /// The pair is also the slave's identity in progress reports.
    #[clap(long = "slaves", required = true, value_delimiter = ',', num_args = 1..)]
    pub slaves: Vec<String>,

    /// Address the master's HTTP endpoint listens on.
    #[clap(long, default_value = "127.0.0.1:8000")]
    pub listen: SocketAddr,

    /// Address the slaves use to reach this master.
    ///
    /// Defaults to the listen address; set it when the master binds a
    /// wildcard address or sits behind address translation.
    #[clap(long)]
    pub advertise: Option<String>,

    /// Liveness-probe cadence, as a humantime span such as `3s` or `1500ms`.
    ///
    /// A slave that fails to answer one probe within this period is marked
    /// failed and excluded from the rest of the run.
    #[clap(long = "ping-period", default_value = "3s", value_parser = humantime::parse_duration)]
    pub ping_period: Duration,

    /// Keep the master's HTTP endpoint alive after the test completes.
    #[clap(long)]
    pub stay_alive: bool,

    /// Log filter for the master's internal diagnostics.
    #[clap(long = "log", env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

impl Config {
    pub fn load_spec(&self) -> color_eyre::Result<TestSpec> {
        let raw = std::fs::read_to_string(&self.spec)
            .wrap_err_with(|| format!("failed to read {}", self.spec.display()))?;
        toml::from_str(&raw).wrap_err("invalid test specification")
    }

    pub fn trace_init(&self) -> color_eyre::Result<()> {
        let filter = tracing_subscriber::EnvFilter::try_new(&self.log_filter)?;
        tracing_subscriber::fmt().with_env_filter(filter).init();
        Ok(())
    }

    pub fn advertise_addr(&self) -> String {
        self.advertise
            .clone()
            .unwrap_or_else(|| self.listen.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slave_lists_and_durations() {
        let config = Config::parse_from([
            "loadfleet",
            "spec.toml",
            "--slaves",
            "10.0.0.5:8001,10.0.0.6:8001",
            "--ping-period",
            "1500ms",
        ]);
        assert_eq!(config.slaves.len(), 2);
        assert_eq!(config.ping_period, Duration::from_millis(1500));
        assert!(!config.stay_alive);
    }

    #[test]
    fn spec_files_decode_from_toml() {
        let spec: TestSpec = toml::from_str(
            r#"
                name = "checkout-smoke"
                generator = "http-get"
                concurrency = 8
                timeLimitMs = 60000
                reportIntervalMs = 1000
            "#,
        )
        .unwrap();
        assert_eq!(spec.name, "checkout-smoke");
        assert_eq!(spec.concurrency, 8);
        assert_eq!(spec.time_limit_ms, Some(60_000));
    }
}
