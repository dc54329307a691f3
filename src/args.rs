use std::{ffi::OsString, net::IpAddr, path::PathBuf};

use clap::Parser;
use ext_config::{Config, File, FileFormat};
use ipsec_exporter::{config::ExporterConfig, error::ExporterErrorKind};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(author, version, about = "Prometheus exporter for IPsec tunnels", long_about = None)]
pub struct Args {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to an optional TOML configuration file"
    )]
    pub config_path: Option<PathBuf>,
    #[arg(short = 'a', long = "address", help = "Address to expose the metrics on")]
    pub listen_address: Option<IpAddr>,
    #[arg(short = 'p', long = "port", help = "Port to expose the metrics on")]
    pub listen_port: Option<u16>,
    #[arg(short = 'i', long = "interval", help = "Seconds between two status polls")]
    pub poll_interval_secs: Option<u32>,
    #[arg(
        short = 'f',
        long = "log-file",
        help = "Path to the log file. If not set, logs are only written to stdout."
    )]
    pub log_file: Option<PathBuf>,
}

/// Single-dash long flags accepted for compatibility with existing deployments.
const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("-address", "--address"),
    ("-port", "--port"),
    ("-interval", "--interval"),
];

/// Builds the exporter configuration from the optional config file and the
/// command line overrides.
pub fn process_cli_args() -> Result<ExporterConfig, ExporterErrorKind> {
    let args = Args::parse_from(normalize_legacy_flags(std::env::args_os()));
    build_config(args)
}

/// Rewrites `-port 9754` style flags to their `--port` form. Clap would read
/// them as `-p ort`.
fn normalize_legacy_flags(argv: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    argv.into_iter()
        .map(|arg| {
            LEGACY_FLAGS
                .iter()
                .find(|(legacy, _)| arg == *legacy)
                .map_or(arg, |(_, long)| OsString::from(*long))
        })
        .collect()
}

fn build_config(args: Args) -> Result<ExporterConfig, ExporterErrorKind> {
    let mut builder = Config::builder();
    if let Some(path) = args.config_path.as_ref() {
        debug!("Loading configuration from {}", path.display());
        builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
    }

    let config = builder
        .set_override_option(
            "listen_address",
            args.listen_address.map(|address| address.to_string()),
        )?
        .set_override_option("listen_port", args.listen_port.map(i64::from))?
        .set_override_option("poll_interval_secs", args.poll_interval_secs.map(i64::from))?
        .set_override_option(
            "log_file",
            args.log_file
                .map(|path| path.to_string_lossy().into_owned()),
        )?
        .build()?
        .try_deserialize::<ExporterConfig>()?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::Write,
        net::{Ipv4Addr, SocketAddr},
        path::Path,
        time::Duration,
    };

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("ipsec_exporter").chain(argv.iter().copied()))
    }

    #[test]
    fn test_defaults_without_arguments() {
        let config = build_config(args(&[])).unwrap();
        assert_eq!(config, ExporterConfig::default());
    }

    #[test]
    fn test_cli_overrides() {
        let config = build_config(args(&[
            "-a",
            "127.0.0.1",
            "--port",
            "9999",
            "-i",
            "30",
            "-f",
            "/tmp/ipsec_exporter.log",
        ]))
        .unwrap();

        assert_eq!(
            config.monitoring_address(),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 9999))
        );
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.log_file(), Some(Path::new("/tmp/ipsec_exporter.log")));
    }

    #[test]
    fn test_single_dash_long_flags() {
        let argv = ["ipsec_exporter", "-address", "127.0.0.1", "-port", "9999", "-interval", "30"]
            .into_iter()
            .map(OsString::from);
        let config = build_config(Args::parse_from(normalize_legacy_flags(argv))).unwrap();

        assert_eq!(
            config.monitoring_address(),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 9999))
        );
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_normalize_leaves_other_arguments_alone() {
        let argv: Vec<OsString> = ["ipsec_exporter", "-p", "-port", "--port", "-f", "-address.log"]
            .into_iter()
            .map(OsString::from)
            .collect();
        assert_eq!(
            normalize_legacy_flags(argv),
            ["ipsec_exporter", "-p", "--port", "--port", "-f", "-address.log"]
                .map(OsString::from)
                .to_vec()
        );
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let result = build_config(args(&["--interval", "0"]));
        assert!(matches!(result, Err(ExporterErrorKind::Configuration(_))));
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let path = std::env::temp_dir().join(format!(
            "ipsec_exporter_args_{}.toml",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "listen_port = 9100\npoll_interval_secs = 60\nstatus_command = [\"ipsec\", \"statusall\"]"
        )
        .unwrap();

        let config = build_config(args(&["-c", path.to_str().unwrap(), "-p", "9200"])).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.monitoring_address().port(), 9200);
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.status_command(), ["ipsec", "statusall"]);
    }
}
