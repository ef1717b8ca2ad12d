use std::net::SocketAddr;
use std::path::Path;

use anyhow::{bail, Context};
use blockgate_server::{BlockgateServer, ServerConfig};
use blockgate_tsdb::{gather_file_stats, verify_block, BlockHealth, VerifyOptions};
use blockgate_types::paths::META_FILENAME;
use blockgate_types::Meta;
use colored::Colorize;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Verify(args) => cmd_verify(args, &cli.format),
        Command::Config(args) => cmd_config(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(p) => Ok(ServerConfig::from_file(p)?),
        None => Ok(ServerConfig::default()),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(bind) = &args.bind {
        config.bind_addr = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid listen address {bind:?}"))?;
    }
    println!("{} blockgate on {}", "▶".green().bold(), config.bind_addr.to_string().bold());

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(BlockgateServer::new(config).serve())?;
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Outcome of checking a block directory.
struct VerifyReport {
    size_mismatches: Vec<String>,
    result: Result<BlockHealth, String>,
}

impl VerifyReport {
    fn ok(&self) -> bool {
        self.size_mismatches.is_empty() && self.result.is_ok()
    }
}

fn verify_dir(dir: &Path, verify_chunks: bool) -> anyhow::Result<VerifyReport> {
    let meta_path = dir.join(META_FILENAME);
    let data = std::fs::read(&meta_path).with_context(|| format!("reading {}", meta_path.display()))?;
    let meta = Meta::from_json(&data).with_context(|| format!("parsing {}", meta_path.display()))?;

    let on_disk = gather_file_stats(dir)?;
    let size_mismatches = meta
        .ext
        .files
        .iter()
        .filter(|f| !f.is_meta())
        .filter(|f| {
            on_disk
                .iter()
                .find(|d| d.rel_path == f.rel_path)
                .map_or(true, |d| d.size_bytes != f.size_bytes)
        })
        .map(|f| f.rel_path.clone())
        .collect();

    let opts = VerifyOptions {
        min_time: meta.min_time,
        max_time: meta.max_time,
        check_chunks: verify_chunks,
    };
    let result = verify_block(dir, &opts).map_err(|e| e.to_string());
    Ok(VerifyReport {
        size_mismatches,
        result,
    })
}

fn cmd_verify(args: VerifyArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let report = verify_dir(&args.dir, args.verify_chunks)?;

    match format {
        OutputFormat::Json => {
            let value = match &report.result {
                Ok(h) => json!({
                    "ok": report.ok(),
                    "size_mismatches": report.size_mismatches,
                    "series": h.num_series,
                    "chunks": h.num_chunks,
                    "segments_checked": h.segments_checked,
                }),
                Err(e) => json!({
                    "ok": false,
                    "size_mismatches": report.size_mismatches,
                    "error": e,
                }),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            for path in &report.size_mismatches {
                println!("  {} {}", "size mismatch:".red(), path);
            }
            match &report.result {
                Ok(h) => {
                    println!("  Series: {}", h.num_series.to_string().bold());
                    println!("  Chunks: {}", h.num_chunks.to_string().bold());
                    if args.verify_chunks {
                        println!("  Segments checked: {}", h.segments_checked.to_string().bold());
                    }
                }
                Err(e) => println!("  {} {}", "error:".red().bold(), e),
            }
            if report.ok() {
                println!("{} Block {} is valid", "✓".green().bold(), args.dir.display());
            }
        }
    }

    if !report.ok() {
        bail!("block {} failed verification", args.dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use blockgate_tsdb::{BlockWriter, Labels, Sample};

    use super::*;

    fn write_block(parent: &Path) -> std::path::PathBuf {
        let mut w = BlockWriter::new(0, 10 * 15_000);
        let samples = (0..10).map(|i| Sample { timestamp: i * 15_000, value: 1.0 }).collect();
        w.add_series(Labels::from_pairs(&[("job", "api")]), samples);
        w.write(parent).unwrap()
    }

    #[test]
    fn valid_block() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_block(tmp.path());
        let report = verify_dir(&dir, true).unwrap();
        assert!(report.ok());
        assert_eq!(report.result.unwrap().num_series, 1);
    }

    #[test]
    fn truncated_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_block(tmp.path());
        let index = dir.join("index");
        let data = std::fs::read(&index).unwrap();
        std::fs::write(&index, &data[..data.len() / 2]).unwrap();

        let report = verify_dir(&dir, false).unwrap();
        assert!(!report.ok());
        assert_eq!(report.size_mismatches, vec!["index".to_string()]);
        assert!(report.result.is_err());
    }

    #[test]
    fn missing_meta() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(verify_dir(tmp.path(), false).is_err());
    }
}
