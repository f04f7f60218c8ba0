//! fpmap - operator tool for fingerprint mappings

use anyhow::Context;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use fpmap_core::archive::{ArchiveConfig, DiskArchive};
use fpmap_core::{Fingerprint, FingerprintMapper, Metric, SeriesMap};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fpmap")]
#[command(version = fpmap_core::VERSION)]
#[command(about = "Inspect and resolve series fingerprint mappings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fingerprint of a label set, e.g. `job=api,instance=a:80`
    Fingerprint { labels: Metric },
    /// Show the persisted collision table and archive summary
    Inspect {
        /// Archive directory
        #[arg(long, default_value = "data/archive")]
        data_dir: PathBuf,
        /// Also list archived series
        #[arg(long)]
        archived: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a label set against the archive, persisting any new mapping
    Resolve {
        /// Archive directory
        #[arg(long, default_value = "data/archive")]
        data_dir: PathBuf,
        labels: Metric,
        /// Use this fingerprint instead of hashing the labels
        #[arg(long)]
        fingerprint: Option<Fingerprint>,
    },
}

#[derive(Debug, Serialize)]
struct InspectReport {
    highest_mapped: String,
    mappings: Vec<MappingRow>,
    archived_series: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    archived: Vec<ArchivedRow>,
}

#[derive(Debug, Serialize)]
struct MappingRow {
    original: String,
    metric: String,
    mapped: String,
}

#[derive(Debug, Serialize)]
struct ArchivedRow {
    fingerprint: String,
    metric: String,
    first_time: String,
    last_time: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fingerprint { labels } => {
            println!("{}", labels.fingerprint());
        }
        Commands::Inspect {
            data_dir,
            archived,
            json,
        } => {
            let report = inspect(data_dir, archived)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Resolve {
            data_dir,
            labels,
            fingerprint,
        } => {
            let mapper = open_mapper(data_dir)?;
            let original = fingerprint.unwrap_or_else(|| labels.fingerprint());
            let resolved = mapper
                .resolve(original, &labels)
                .with_context(|| format!("resolving {} {}", original, labels))?;
            println!("{} -> {}", original, resolved);
        }
    }

    Ok(())
}

fn open_mapper(data_dir: PathBuf) -> anyhow::Result<FingerprintMapper<SeriesMap, DiskArchive>> {
    info!("Opening archive in {:?}", data_dir);
    let archive = DiskArchive::open(ArchiveConfig::new(&data_dir))
        .with_context(|| format!("opening archive in {:?}", data_dir))?;
    let mapper = FingerprintMapper::new(SeriesMap::new(), archive)
        .context("loading fingerprint mappings")?;
    Ok(mapper)
}

fn inspect(data_dir: PathBuf, list_archived: bool) -> anyhow::Result<InspectReport> {
    let mapper = open_mapper(data_dir)?;
    let archive = mapper.archive();

    let mappings = mapper
        .mappings()
        .records_by_mapped()
        .into_iter()
        .map(|r| MappingRow {
            original: r.original.to_string(),
            metric: r.metric.to_string(),
            mapped: r.mapped.to_string(),
        })
        .collect();

    let archived = if list_archived {
        archive
            .archived_fingerprints()
            .into_iter()
            .filter_map(|fp| archive.archived_series(fp).map(|s| (fp, s)))
            .map(|(fp, s)| ArchivedRow {
                fingerprint: fp.to_string(),
                metric: s.metric.to_string(),
                first_time: format_nanos(s.first_time),
                last_time: format_nanos(s.last_time),
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(InspectReport {
        highest_mapped: mapper.highest_mapped().to_string(),
        mappings,
        archived_series: archive.len(),
        archived,
    })
}

fn format_nanos(ns: i64) -> String {
    Utc.timestamp_nanos(ns).to_rfc3339()
}

fn print_report(report: &InspectReport) {
    println!("highest mapped fingerprint: {}", report.highest_mapped);
    println!("archived series: {}", report.archived_series);
    println!("mappings: {}", report.mappings.len());
    if !report.mappings.is_empty() {
        println!("original\tmapped\tmetric");
        for row in &report.mappings {
            println!("{}\t{}\t{}", row.original, row.mapped, row.metric);
        }
    }
    if !report.archived.is_empty() {
        println!("fingerprint\tfirst\tlast\tmetric");
        for row in &report.archived {
            println!(
                "{}\t{}\t{}\t{}",
                row.fingerprint, row.first_time, row.last_time, row.metric
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpmap_core::MemorySeries;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["fpmap", "resolve", "job=api", "--fingerprint", "ff"]).unwrap();
        match cli.command {
            Commands::Resolve { labels, fingerprint, .. } => {
                assert_eq!(labels.get("job"), Some("api"));
                assert_eq!(fingerprint, Some(Fingerprint(255)));
            }
            _ => panic!("expected resolve"),
        }
        assert!(Cli::try_parse_from(["fpmap", "fingerprint", "job"]).is_err());
    }

    #[test]
    fn test_inspect_report() {
        let temp_dir = TempDir::new().unwrap();
        let fp = Fingerprint(1 << 40);
        let owner = Metric::new().with_label("job", "api");
        let other = Metric::new().with_label("job", "web");

        {
            let sm = Arc::new(SeriesMap::new());
            let archive = DiskArchive::open(ArchiveConfig::new(temp_dir.path())).unwrap();
            archive.archive_metric(fp, owner.clone(), 0, 1_000_000_000).unwrap();
            sm.put(Fingerprint(7), MemorySeries::new(owner));
            let mapper = FingerprintMapper::new(sm, archive).unwrap();
            assert_eq!(mapper.resolve(fp, &other).unwrap(), Fingerprint(1));
        }

        let report = inspect(temp_dir.path().to_path_buf(), true).unwrap();
        assert_eq!(report.highest_mapped, Fingerprint(1).to_string());
        assert_eq!(report.mappings.len(), 1);
        assert_eq!(report.mappings[0].original, fp.to_string());
        assert_eq!(report.archived_series, 1);
        assert_eq!(report.archived[0].last_time, "1970-01-01T00:00:01+00:00");
    }
}
