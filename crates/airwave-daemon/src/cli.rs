use airwave_config::DEFAULT_CONFIG_FILE;
use airwave_storage::BackendKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Airwave radio capture and archival")]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// 采集直播分片，非直播时段每天压缩一次
    Ingest {
        /// 只运行指定频道，默认运行全部频道
        #[arg(long)]
        channel: Option<String>,
    },

    /// 立即压缩一个频道的热存储
    Compact {
        #[arg(long)]
        channel: String,
    },

    /// 按期望对象表同步目标存储层
    Reconcile {
        /// 默认使用 `[reconcile].destination`
        #[arg(long)]
        destination: Option<BackendKind>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::parse_from(["airwave", "ingest"]);
        assert_eq!(cli.config, PathBuf::from("airwave.toml"));
        assert_eq!(cli.command, Command::Ingest { channel: None });
    }

    #[test]
    fn test_parse_compact_with_config() {
        let cli = Cli::parse_from(["airwave", "compact", "--channel", "vov1", "--config", "/etc/airwave.toml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/airwave.toml"));
        assert_eq!(
            cli.command,
            Command::Compact {
                channel: "vov1".to_string()
            }
        );
    }

    #[test]
    fn test_parse_reconcile_destination() {
        let cli = Cli::parse_from(["airwave", "reconcile", "--destination", "cold_b"]);
        assert_eq!(
            cli.command,
            Command::Reconcile {
                destination: Some(BackendKind::ColdB)
            }
        );

        assert!(Cli::try_parse_from(["airwave", "reconcile", "--destination", "gcs"]).is_err());
    }

    #[test]
    fn test_compact_requires_channel() {
        assert!(Cli::try_parse_from(["airwave", "compact"]).is_err());
    }
}
