use clap::Parser;
use std::path::PathBuf;

use crate::config::{Config, ConnectorConfig};

/// playcast: client for line-protocol playout services
#[derive(Parser, Debug)]
#[command(name = "playcast")]
#[command(about = "Connect to playout services and serve their state over HTTP and WebSocket", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ./playcast.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind the HTTP server to, overriding the config file
    #[arg(long)]
    pub listen: Option<String>,

    /// Add a connector as NAME=ADDRESS (repeatable)
    #[arg(long = "connector", value_name = "NAME=ADDRESS", value_parser = parse_connector)]
    pub connectors: Vec<ConnectorConfig>,
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Layer command-line overrides on top of a loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }
        config.connectors.extend(self.connectors.iter().cloned());
    }
}

fn parse_connector(value: &str) -> Result<ConnectorConfig, String> {
    match value.split_once('=') {
        Some((name, address)) if !name.is_empty() && !address.is_empty() => Ok(ConnectorConfig {
            name: name.to_string(),
            address: address.to_string(),
        }),
        _ => Err(format!("expected NAME=ADDRESS, got '{}'", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["playcast"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.listen.is_none());
        assert!(cli.connectors.is_empty());
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::try_parse_from(["playcast", "--config", "/etc/playcast.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/playcast.toml")));
    }

    #[test]
    fn test_repeated_connectors() {
        let cli = Cli::try_parse_from([
            "playcast",
            "--connector",
            "channel0=127.0.0.1:1350",
            "--connector",
            "channel1=studio.local:1350",
        ])
        .unwrap();
        assert_eq!(cli.connectors.len(), 2);
        assert_eq!(cli.connectors[0].name, "channel0");
        assert_eq!(cli.connectors[1].address, "studio.local:1350");
    }

    #[test]
    fn test_invalid_connector_value() {
        assert!(Cli::try_parse_from(["playcast", "--connector", "channel0"]).is_err());
        assert!(Cli::try_parse_from(["playcast", "--connector", "=127.0.0.1:1350"]).is_err());
        assert!(Cli::try_parse_from(["playcast", "--connector", "channel0="]).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let cli = Cli::try_parse_from([
            "playcast",
            "--listen",
            "0.0.0.0:9000",
            "--connector",
            "extra=127.0.0.1:1351",
        ])
        .unwrap();

        let mut config = Config {
            connectors: vec![ConnectorConfig {
                name: "channel0".to_string(),
                address: "127.0.0.1:1350".to_string(),
            }],
            ..Config::default()
        };
        cli.apply(&mut config);

        assert_eq!(config.server.listen, "0.0.0.0:9000");
        let names: Vec<_> = config.connectors.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["channel0", "extra"]);
    }

    #[test]
    fn test_apply_keeps_config_listen() {
        let cli = Cli::try_parse_from(["playcast"]).unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.server.listen, "127.0.0.1:7890");
    }
}
