use anyhow::{bail, Result};
use std::path::Path;
use veo3_batch_runner::models::BatchConfig;
use veo3_batch_runner::utils::logging;
use veo3_batch_runner::{App, Config};

/// 命令行参数：`veo3_batch_runner <batch.toml> [--max-concurrent N] [--dry-run]`
struct CliArgs {
    config_path: String,
    max_concurrent: Option<usize>,
    dry_run: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut config_path = None;
    let mut max_concurrent = None;
    let mut dry_run = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--max-concurrent" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--max-concurrent 需要一个数值参数"))?;
                max_concurrent = Some(value.parse()?);
            }
            "--dry-run" => dry_run = true,
            other if other.starts_with("--") => bail!("未知参数: {}", other),
            other => {
                if config_path.is_some() {
                    bail!("只能指定一个配置文件，多余参数: {}", other);
                }
                config_path = Some(other.to_string());
            }
        }
    }

    Ok(CliArgs {
        config_path: config_path
            .ok_or_else(|| anyhow::anyhow!("用法: veo3_batch_runner <batch.toml> [--max-concurrent N] [--dry-run]"))?,
        max_concurrent,
        dry_run,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    logging::init(config.verbose_logging);

    let cli = parse_args(std::env::args().skip(1))?;

    let mut batch = BatchConfig::from_path(Path::new(&cli.config_path))?;
    if let Some(n) = cli.max_concurrent {
        batch.max_concurrent = n.max(1);
    }

    let app = App::initialize(config, batch, cli.dry_run).await?;
    let summary = app.run().await?;

    // 全部条目完全成功才返回 0
    if !summary.all_successful() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(list: &'a [&'a str]) -> impl Iterator<Item = String> + 'a {
        list.iter().map(|s| s.to_string())
    }

    #[test]
    fn test_parse_minimal() {
        let cli = parse_args(args(&["batch.toml"])).unwrap();
        assert_eq!(cli.config_path, "batch.toml");
        assert_eq!(cli.max_concurrent, None);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_parse_full() {
        let cli =
            parse_args(args(&["batch.toml", "--max-concurrent", "4", "--dry-run"])).unwrap();
        assert_eq!(cli.max_concurrent, Some(4));
        assert!(cli.dry_run);
    }

    #[test]
    fn test_parse_rejects_unknown_flag() {
        assert!(parse_args(args(&["batch.toml", "--wat"])).is_err());
    }

    #[test]
    fn test_parse_requires_config_path() {
        assert!(parse_args(args(&["--dry-run"])).is_err());
    }
}
