//! Reporting side of `dt-cluster`: ingestion failures first, then the
//! cluster table.

use std::io::Write;

use anyhow::Context;

use dt_analysis::{ClusterResult, ClusterTable, IngestReport, KMeans};

/// Write every unparsed line to `diagnostics` and the unparsed count to
/// `out`, then cluster the recovered vectors and write the table to `out`.
///
/// The failures and count are written before clustering, so they are still
/// visible when too few vectors survive to form `k` clusters.
pub fn cluster_report<W, D>(
    report: &IngestReport,
    kmeans: &KMeans,
    k: usize,
    out: &mut W,
    diagnostics: &mut D,
) -> anyhow::Result<ClusterResult>
where
    W: Write + ?Sized,
    D: Write + ?Sized,
{
    for failure in &report.failures {
        writeln!(diagnostics, "unparsed {failure}")?;
    }
    writeln!(out, "unparsed lines: {}", report.unparsed_count())?;

    let result = kmeans
        .cluster(&report.values(), k)
        .with_context(|| format!("clustering {} vectors into {k} clusters", report.vectors.len()))?;
    write!(out, "{}", ClusterTable::from_result(&result))?;
    Ok(result)
}
