use std::fs::File;
use std::io::BufReader;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dt_analysis::{BestParamsParser, IngestReport, KMeans, KMeansConfig};
use dt_driver::cluster_report;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let k: usize = std::env::var("DELAY_TUNE_CLUSTERS")
        .unwrap_or_else(|_| "3".to_string())
        .parse()
        .context("invalid value for DELAY_TUNE_CLUSTERS")?;
    let seed: u64 = std::env::var("DELAY_TUNE_SEED")
        .unwrap_or_else(|_| "0".to_string())
        .parse()
        .context("invalid value for DELAY_TUNE_SEED")?;

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: dt-cluster <log>...");
    }

    let parser = BestParamsParser::default();
    let mut report = IngestReport::new();
    for path in &paths {
        let file = File::open(path).with_context(|| format!("failed to open {path}"))?;
        let ingested = parser
            .ingest_reader(path, BufReader::new(file))
            .with_context(|| format!("failed to read {path}"))?;
        report.merge(ingested);
    }
    info!(
        files = paths.len(),
        vectors = report.vectors.len(),
        unparsed = report.unparsed_count(),
        "ingested run logs"
    );

    let kmeans = KMeans::new(KMeansConfig::default().with_seed(seed));
    cluster_report(&report, &kmeans, k, &mut std::io::stdout(), &mut std::io::stderr())?;
    Ok(())
}
