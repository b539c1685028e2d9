//! Tabular summaries for operators: cluster centres, per-stage circuit
//! metrics and estimated-vs-actual delay comparisons.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use dt_types::{CircuitKind, CircuitMetrics};

use crate::cluster::ClusterResult;

/// Metrics keyed by stage, then by circuit name.
///
/// Built once per parse pass through [`StageMetricsBuilder`]; read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageMetrics {
    kind: CircuitKind,
    stages: BTreeMap<usize, BTreeMap<String, CircuitMetrics>>,
}

impl StageMetrics {
    pub fn builder(kind: CircuitKind) -> StageMetricsBuilder {
        StageMetricsBuilder {
            kind,
            stages: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> CircuitKind {
        self.kind
    }

    pub fn stages(&self) -> impl Iterator<Item = usize> + '_ {
        self.stages.keys().copied()
    }

    pub fn stage(&self, stage: usize) -> Option<&BTreeMap<String, CircuitMetrics>> {
        self.stages.get(&stage)
    }

    pub fn get(&self, stage: usize, circuit: &str) -> Option<&CircuitMetrics> {
        self.stages.get(&stage)?.get(circuit)
    }

    /// Mapper delay against NLDM delay for every circuit present at `stage`,
    /// in the suite's canonical order.
    pub fn comparisons(&self, stage: usize) -> Vec<DelayComparison> {
        let Some(circuits) = self.stages.get(&stage) else {
            return Vec::new();
        };
        self.kind
            .circuits()
            .iter()
            .filter_map(|name| {
                circuits.get(*name).map(|m| DelayComparison {
                    circuit: name.to_string(),
                    estimated: m.delay,
                    actual: m.nldm_delay,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct StageMetricsBuilder {
    kind: CircuitKind,
    stages: BTreeMap<usize, BTreeMap<String, CircuitMetrics>>,
}

impl StageMetricsBuilder {
    /// Record metrics for a circuit; a later record for the same stage and
    /// circuit replaces the earlier one.
    pub fn insert(&mut self, stage: usize, circuit: impl Into<String>, metrics: CircuitMetrics) -> &mut Self {
        self.stages
            .entry(stage)
            .or_default()
            .insert(circuit.into(), metrics);
        self
    }

    pub fn build(self) -> StageMetrics {
        StageMetrics {
            kind: self.kind,
            stages: self.stages,
        }
    }
}

/// Estimated delay of one circuit next to the delay static timing measured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayComparison {
    pub circuit: String,
    pub estimated: f64,
    pub actual: f64,
}

impl DelayComparison {
    pub fn new(circuit: impl Into<String>, estimated: f64, actual: f64) -> Self {
        Self {
            circuit: circuit.into(),
            estimated,
            actual,
        }
    }

    /// Gap between actual and estimated delay as a percentage of the
    /// estimate. `None` when the estimate is zero.
    pub fn delta_percent(&self) -> Option<f64> {
        if self.estimated == 0.0 {
            return None;
        }
        Some((self.actual - self.estimated).abs() / self.estimated.abs() * 100.0)
    }
}

/// One row per cluster: label, member count and rounded centre.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterTable {
    pub rows: Vec<ClusterRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterRow {
    pub cluster: usize,
    pub size: usize,
    pub center: Vec<f64>,
    #[serde(skip)]
    precision: usize,
}

impl ClusterTable {
    pub fn from_result(result: &ClusterResult) -> Self {
        let sizes = result.cluster_sizes();
        let rows = result
            .report_centers()
            .into_iter()
            .enumerate()
            .map(|(cluster, center)| ClusterRow {
                cluster,
                size: sizes[cluster],
                center,
                precision: result.report_precision as usize,
            })
            .collect();
        Self { rows }
    }
}

impl fmt::Display for ClusterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cluster, size, center")?;
        for row in &self.rows {
            let center: Vec<String> = row
                .center
                .iter()
                .map(|v| format!("{v:.prec$}", prec = row.precision))
                .collect();
            writeln!(f, "{}, {}, [{}]", row.cluster, row.size, center.join(", "))?;
        }
        Ok(())
    }
}

/// Estimated vs. actual delay per circuit, ready for bar/scatter rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonTable {
    pub rows: Vec<DelayComparison>,
}

impl ComparisonTable {
    pub fn new(rows: Vec<DelayComparison>) -> Self {
        Self { rows }
    }

    /// Mean delta over rows with a defined delta.
    pub fn mean_delta_percent(&self) -> Option<f64> {
        let deltas: Vec<f64> = self.rows.iter().filter_map(|r| r.delta_percent()).collect();
        if deltas.is_empty() {
            return None;
        }
        Some(deltas.iter().sum::<f64>() / deltas.len() as f64)
    }
}

impl fmt::Display for ComparisonTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "circuit, estimated, actual, delta%")?;
        for row in &self.rows {
            match row.delta_percent() {
                Some(delta) => writeln!(
                    f,
                    "{}, {:.2}, {:.2}, {:.1}",
                    row.circuit, row.estimated, row.actual, delta
                )?,
                None => writeln!(
                    f,
                    "{}, {:.2}, {:.2}, n/a",
                    row.circuit, row.estimated, row.actual
                )?,
            }
        }
        Ok(())
    }
}

/// Every stage's metrics in canonical circuit order, absent circuits marked.
#[derive(Debug, Clone, Copy)]
pub struct StageTable<'a> {
    metrics: &'a StageMetrics,
}

impl<'a> StageTable<'a> {
    pub fn new(metrics: &'a StageMetrics) -> Self {
        Self { metrics }
    }
}

impl fmt::Display for StageTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.metrics.stages().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "stage {stage} ({})", self.metrics.kind())?;
            writeln!(f, " , #Gate, #Edge, #Level, #area, #delay, #NLDM Area, #NLDM Delay")?;
            for name in self.metrics.kind().circuits() {
                match self.metrics.get(stage, name) {
                    Some(m) => writeln!(
                        f,
                        "{name}, {}, {}, {}, {:.2}, {:.2}, {:.2}, {:.2}",
                        m.gates, m.edges, m.level, m.area, m.delay, m.nldm_area, m.nldm_delay
                    )?,
                    None => writeln!(f, "{name}, missing")?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::KMeans;
    use approx::assert_abs_diff_eq;

    fn metrics(delay: f64, nldm_delay: f64) -> CircuitMetrics {
        CircuitMetrics {
            gates: 120,
            edges: 240,
            level: 18,
            area: 1565.78,
            delay,
            nldm_area: 1570.0,
            nldm_delay,
        }
    }

    #[test]
    fn delta_percent_matches_reported_figures() {
        let rows = [
            ("adder", 2613.78, 3770.65, 44.0),
            ("bar", 152.96, 1114.9, 629.0),
            ("log2", 3891.66, 6797.77, 75.0),
            ("cavlc", 185.07, 93.2, 50.0),
            ("int2float", 174.27, 91.7, 47.0),
            ("ctrl", 98.53, 89.9, 9.0),
        ];
        for (name, estimated, actual, reported) in rows {
            let delta = DelayComparison::new(name, estimated, actual)
                .delta_percent()
                .unwrap();
            assert_abs_diff_eq!(delta.round(), reported, epsilon = 1.0);
        }
    }

    #[test]
    fn delta_undefined_for_zero_estimate() {
        assert_eq!(DelayComparison::new("x", 0.0, 10.0).delta_percent(), None);
    }

    #[test]
    fn stage_metrics_keyed_by_stage_and_circuit() {
        let mut builder = StageMetrics::builder(CircuitKind::Arithmetic);
        builder
            .insert(0, "adder", metrics(2613.78, 3770.65))
            .insert(1, "adder", metrics(2500.0, 3000.0))
            .insert(0, "bar", metrics(152.96, 1114.9));
        let stages = builder.build();

        assert_eq!(stages.stages().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(stages.get(1, "adder").unwrap().delay, 2500.0);
        assert!(stages.get(1, "bar").is_none());
        assert!(stages.get(5, "adder").is_none());

        // canonical order puts adder before bar
        let comparisons = stages.comparisons(0);
        let names: Vec<&str> = comparisons.iter().map(|c| c.circuit.as_str()).collect();
        assert_eq!(names, vec!["adder", "bar"]);
        assert!(stages.comparisons(9).is_empty());
    }

    #[test]
    fn later_insert_replaces_earlier() {
        let mut builder = StageMetrics::builder(CircuitKind::Control);
        builder
            .insert(0, "i2c", metrics(300.0, 222.5))
            .insert(0, "i2c", metrics(280.0, 222.5));
        let stages = builder.build();
        assert_eq!(stages.get(0, "i2c").unwrap().delay, 280.0);
    }

    #[test]
    fn comparison_table_renders_rows() {
        let table = ComparisonTable::new(vec![
            DelayComparison::new("adder", 2613.78, 3770.65),
            DelayComparison::new("zero", 0.0, 1.0),
        ]);
        let text = table.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "circuit, estimated, actual, delta%");
        assert_eq!(lines[1], "adder, 2613.78, 3770.65, 44.3");
        assert_eq!(lines[2], "zero, 0.00, 1.00, n/a");
        assert_abs_diff_eq!(table.mean_delta_percent().unwrap(), 44.26, epsilon = 0.01);
    }

    #[test]
    fn comparison_serializes_to_json() {
        let json = serde_json::to_value(DelayComparison::new("adder", 2613.78, 3770.65)).unwrap();
        assert_eq!(json["circuit"], "adder");
        assert_eq!(json["actual"], serde_json::json!(3770.65));
    }

    #[test]
    fn stage_table_marks_missing_circuits() {
        let mut builder = StageMetrics::builder(CircuitKind::Control);
        builder.insert(0, "cavlc", metrics(185.07, 93.2));
        let text = StageTable::new(&builder.build()).to_string();

        assert!(text.starts_with("stage 0 (control)\n"));
        assert!(text.contains("priority, missing"));
        assert!(text.contains("cavlc, 120, 240, 18, 1565.78, 185.07, 1570.00, 93.20"));
        assert_eq!(text.lines().count(), 2 + CircuitKind::Control.circuits().len());
    }

    #[test]
    fn cluster_table_uses_report_precision() {
        let vectors = vec![vec![0.1, 0.5], vec![0.12, 0.5], vec![0.9, 0.25]];
        let result = KMeans::default().cluster(&vectors, 2).unwrap();
        let table = ClusterTable::from_result(&result);
        let text = table.to_string();

        assert!(text.starts_with("cluster, size, center\n"));
        let low = result.labels[0];
        assert!(text.contains(&format!("{low}, 2, [0.11, 0.50]")));
        assert!(text.contains(&format!("{}, 1, [0.90, 0.25]", result.labels[2])));
    }
}
