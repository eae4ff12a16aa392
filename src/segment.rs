//! Quantile segmentation of CLTV scores

use std::fmt;

use polars::prelude::*;

use crate::error::CltvError;

/// Number of equal-frequency bins
pub const SEGMENT_COUNT: usize = 4;

/// Score column binned by [`assign_segments`]
pub const CLTV: &str = "cltv";
/// Segment label column of the output table
pub const SEGMENT: &str = "segment";

/// Output columns summarised per segment by [`summarize_segments`]
pub const SUMMARY_COLUMNS: [&str; 5] = ["total_transaction", "total_unit", "total_price", "profit_margin", CLTV];

/// Cut points between the four bins
const INNER_PROBS: [f64; SEGMENT_COUNT - 1] = [0.25, 0.5, 0.75];

/// Value segment, ordered from lowest (`D`) to highest (`A`) quartile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    D,
    C,
    B,
    A,
}

impl Segment {
    /// All segments in ascending value order
    pub const ALL: [Segment; SEGMENT_COUNT] = [Segment::D, Segment::C, Segment::B, Segment::A];

    pub fn rank(self) -> usize {
        self as usize
    }

    pub fn from_rank(rank: usize) -> Option<Self> {
        Self::ALL.get(rank).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Segment::D => "D",
            Segment::C => "C",
            Segment::B => "B",
            Segment::A => "A",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|segment| segment.label() == label)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bin boundaries: the 0, 25, 50, 75 and 100th percentiles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantileEdges(pub [f64; SEGMENT_COUNT + 1]);

impl QuantileEdges {
    /// Compute edges by linear interpolation between order statistics
    ///
    /// Fails unless there are at least four finite scores and all five
    /// edges, minimum and maximum included, are strictly increasing.
    pub fn from_scores(scores: &[f64]) -> crate::Result<Self> {
        if scores.len() < SEGMENT_COUNT {
            return Err(CltvError::segmentation(format!(
                "need at least {} customers, got {}",
                SEGMENT_COUNT,
                scores.len()
            )));
        }
        if let Some(bad) = scores.iter().find(|score| !score.is_finite()) {
            return Err(CltvError::segmentation(format!("cltv score {} is not finite", bad)));
        }

        let probs: Vec<f64> = (0..=SEGMENT_COUNT).map(|i| i as f64 / SEGMENT_COUNT as f64).collect();
        let quantiles = df!(CLTV => scores)?
            .lazy()
            .select(
                probs
                    .iter()
                    .enumerate()
                    .map(|(i, &p)| {
                        col(CLTV)
                            .quantile(lit(p), QuantileInterpolOptions::Linear)
                            .alias(&format!("q{}", i))
                    })
                    .collect::<Vec<_>>(),
            )
            .collect()?;

        let mut edges = [0.0; SEGMENT_COUNT + 1];
        for (i, edge) in edges.iter_mut().enumerate() {
            *edge = quantiles
                .column(&format!("q{}", i))?
                .f64()?
                .get(0)
                .ok_or_else(|| CltvError::segmentation("quantile of an empty score column"))?;
        }

        if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(CltvError::segmentation(format!(
                "quantile edges are not unique ({}); too many tied cltv scores",
                format_edges(&edges)
            )));
        }

        Ok(Self(edges))
    }
}

impl fmt::Display for QuantileEdges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_edges(&self.0))
    }
}

fn format_edges(edges: &[f64]) -> String {
    edges
        .iter()
        .map(|edge| format!("{:.5}", edge))
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_duplicate(err: &PolarsError) -> bool {
    match err {
        PolarsError::Duplicate(_) => true,
        PolarsError::Context { error, .. } => is_duplicate(error),
        _ => false,
    }
}

/// Assign every score to one of four equal-frequency segments
///
/// Bins are right-closed with the lowest edge included, so a score equal
/// to an inner edge lands in the lower segment.
///
/// # Arguments
/// * `scores` - CLTV scores of the whole population
///
/// # Returns
/// * One segment per score, in input order, and the edges used
pub fn assign_segments(scores: &[f64]) -> crate::Result<(Vec<Segment>, QuantileEdges)> {
    let edges = QuantileEdges::from_scores(scores)?;
    let labels: Vec<String> = Segment::ALL.iter().map(|s| s.label().to_string()).collect();

    let binned = df!(CLTV => scores)?
        .lazy()
        .select([col(CLTV)
            .qcut(INNER_PROBS.to_vec(), Some(labels), false, false, false)
            .cast(DataType::String)
            .alias(SEGMENT)])
        .collect()
        .map_err(|err| {
            if is_duplicate(&err) {
                CltvError::segmentation(err.to_string())
            } else {
                CltvError::from(err)
            }
        })?;

    let segments = binned
        .column(SEGMENT)?
        .str()?
        .into_iter()
        .map(|label| {
            label
                .and_then(Segment::from_label)
                .ok_or_else(|| CltvError::segmentation(format!("unexpected bin label {:?}", label)))
        })
        .collect::<crate::Result<Vec<Segment>>>()?;

    let sizes = segment_sizes(&segments);
    if let Some(empty) = Segment::ALL.iter().find(|segment| sizes[segment.rank()] == 0) {
        return Err(CltvError::segmentation(format!(
            "segment {} would be empty (edges {})",
            empty, edges
        )));
    }

    Ok((segments, edges))
}

/// Customer count per segment, indexed by rank
pub fn segment_sizes(segments: &[Segment]) -> [usize; SEGMENT_COUNT] {
    let mut sizes = [0; SEGMENT_COUNT];
    for segment in segments {
        sizes[segment.rank()] += 1;
    }
    sizes
}

/// Sum and mean of one column within a segment
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricSummary {
    pub sum: f64,
    pub mean: f64,
}

/// Per-segment count plus sum and mean of the headline columns
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub count: usize,
    pub total_transaction: MetricSummary,
    pub total_unit: MetricSummary,
    pub total_price: MetricSummary,
    pub profit_margin: MetricSummary,
    pub cltv: MetricSummary,
}

impl SegmentSummary {
    fn empty(segment: Segment) -> Self {
        Self {
            segment,
            count: 0,
            total_transaction: MetricSummary::default(),
            total_unit: MetricSummary::default(),
            total_price: MetricSummary::default(),
            profit_margin: MetricSummary::default(),
            cltv: MetricSummary::default(),
        }
    }

    fn metric_mut(&mut self, column: &str) -> Option<&mut MetricSummary> {
        match column {
            "total_transaction" => Some(&mut self.total_transaction),
            "total_unit" => Some(&mut self.total_unit),
            "total_price" => Some(&mut self.total_price),
            "profit_margin" => Some(&mut self.profit_margin),
            CLTV => Some(&mut self.cltv),
            _ => None,
        }
    }
}

/// Count, sum and mean per segment, from D to A
///
/// Segments with no customers are reported with zeros.
///
/// # Arguments
/// * `table` - A frame with a `segment` label column and every [`SUMMARY_COLUMNS`] column
pub fn summarize_segments(table: &DataFrame) -> crate::Result<Vec<SegmentSummary>> {
    let mut aggs = vec![len().cast(DataType::Int64).alias("count")];
    for name in SUMMARY_COLUMNS {
        let value = col(name).cast(DataType::Float64);
        aggs.push(value.clone().sum().alias(&format!("{}_sum", name)));
        aggs.push(value.mean().alias(&format!("{}_mean", name)));
    }

    let grouped = table.clone().lazy().group_by([col(SEGMENT)]).agg(aggs).collect()?;

    let mut summaries: Vec<SegmentSummary> = Segment::ALL.iter().map(|&s| SegmentSummary::empty(s)).collect();
    let labels = grouped.column(SEGMENT)?.str()?;
    let counts = grouped.column("count")?.i64()?;

    for (row, label) in labels.into_iter().enumerate() {
        let Some(segment) = label.and_then(Segment::from_label) else {
            continue;
        };
        let summary = &mut summaries[segment.rank()];
        summary.count = counts.get(row).unwrap_or(0) as usize;

        for name in SUMMARY_COLUMNS {
            let sum = grouped.column(&format!("{}_sum", name))?.f64()?.get(row).unwrap_or(0.0);
            let mean = grouped.column(&format!("{}_mean", name))?.f64()?.get(row).unwrap_or(0.0);
            if let Some(metric) = summary.metric_mut(name) {
                *metric = MetricSummary { sum, mean };
            }
        }
    }

    Ok(summaries)
}
