//! Record aggregation and statistics.
//!
//! Pure functions from record lists to domain summaries and per-entity
//! breakdowns. Every statistic is defined for an empty input.

use crate::models::{
    Domain, DomainRecord, FeedbackRecord, FeedbackStatus, FeedbackType, InventoryRecord,
    ProductionRecord, SalesRecord,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Sentinel for a date span with no dated records.
pub const NO_DATA: &str = "无数据";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionSummary {
    pub record_count: usize,
    pub total_quantity: i64,
    pub total_defects: i64,
    pub average_efficiency: f64,
    pub defect_rate_percent: f64,
    pub distinct_lines: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub record_count: usize,
    pub total_amount: f64,
    pub total_quantity: i64,
    pub average_margin: f64,
    pub distinct_regions: Vec<String>,
    pub distinct_channels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub record_count: usize,
    pub total_stock: i64,
    pub average_stock: f64,
    /// Items below their minimum stock level.
    pub low_stock_count: usize,
    /// Items above their maximum stock level.
    pub over_stock_count: usize,
    pub distinct_warehouses: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub total_count: usize,
    pub average_satisfaction: f64,
    pub complaint_count: usize,
    pub suggestion_count: usize,
    pub praise_count: usize,
    pub pending_count: usize,
}

/// Domain-level metrics over a record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "lowercase")]
pub enum AggregateSummary {
    Production(ProductionSummary),
    Sales(SalesSummary),
    Inventory(InventorySummary),
    Feedback(FeedbackSummary),
}

impl AggregateSummary {
    pub fn domain(&self) -> Domain {
        match self {
            AggregateSummary::Production(_) => Domain::Production,
            AggregateSummary::Sales(_) => Domain::Sales,
            AggregateSummary::Inventory(_) => Domain::Inventory,
            AggregateSummary::Feedback(_) => Domain::Feedback,
        }
    }

    /// Number of records the summary was computed from.
    pub fn record_count(&self) -> usize {
        match self {
            AggregateSummary::Production(s) => s.record_count,
            AggregateSummary::Sales(s) => s.record_count,
            AggregateSummary::Inventory(s) => s.record_count,
            AggregateSummary::Feedback(s) => s.total_count,
        }
    }

    /// Metric name/value pairs in display order.
    pub fn metrics(&self) -> Vec<(&'static str, String)> {
        match self {
            AggregateSummary::Production(s) => vec![
                ("totalQuantity", s.total_quantity.to_string()),
                ("totalDefects", s.total_defects.to_string()),
                ("averageEfficiency", format!("{:.2}", s.average_efficiency)),
                ("defectRatePercent", format!("{:.2}", s.defect_rate_percent)),
                ("distinctLines", list(&s.distinct_lines)),
            ],
            AggregateSummary::Sales(s) => vec![
                ("totalAmount", format!("{:.2}", s.total_amount)),
                ("totalQuantity", s.total_quantity.to_string()),
                ("averageMargin", format!("{:.2}", s.average_margin)),
                ("distinctRegions", list(&s.distinct_regions)),
                ("distinctChannels", list(&s.distinct_channels)),
            ],
            AggregateSummary::Inventory(s) => vec![
                ("totalStock", s.total_stock.to_string()),
                ("averageStock", format!("{:.2}", s.average_stock)),
                ("lowStockCount", s.low_stock_count.to_string()),
                ("overStockCount", s.over_stock_count.to_string()),
                ("distinctWarehouses", list(&s.distinct_warehouses)),
            ],
            AggregateSummary::Feedback(s) => vec![
                ("totalCount", s.total_count.to_string()),
                ("averageSatisfaction", format!("{:.2}", s.average_satisfaction)),
                ("complaintCount", s.complaint_count.to_string()),
                ("suggestionCount", s.suggestion_count.to_string()),
                ("praiseCount", s.praise_count.to_string()),
                ("pendingCount", s.pending_count.to_string()),
            ],
        }
    }
}

fn list(values: &[String]) -> String {
    format!("[{}]", values.join(", "))
}

impl fmt::Display for AggregateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body: Vec<String> = self
            .metrics()
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        write!(f, "{{{}}}", body.join(", "))
    }
}

/// Summary of the records sharing one entity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStats {
    pub entity: String,
    pub summary: AggregateSummary,
}

/// Per-entity summaries, in first-seen entity order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityBreakdown {
    pub domain: Domain,
    pub total_records: usize,
    /// `YYYY-MM-DD 至 YYYY-MM-DD`, or [`NO_DATA`].
    pub date_range: String,
    pub entities: Vec<EntityStats>,
}

impl EntityBreakdown {
    pub fn entity_keys(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.entity.as_str()).collect()
    }
}

impl fmt::Display for EntityBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats: Vec<String> = self
            .entities
            .iter()
            .map(|e| format!("{}={}", e.entity, e.summary))
            .collect();
        write!(
            f,
            "{{totalRecords={}, dateRange={}, entityStatistics={{{}}}}}",
            self.total_records,
            self.date_range,
            stats.join(", ")
        )
    }
}

/// Records that can be reduced to an [`AggregateSummary`].
pub trait Aggregate: DomainRecord {
    fn summarize(records: &[&Self]) -> AggregateSummary;
}

impl Aggregate for ProductionRecord {
    fn summarize(records: &[&Self]) -> AggregateSummary {
        AggregateSummary::Production(production_stats(records))
    }
}

impl Aggregate for SalesRecord {
    fn summarize(records: &[&Self]) -> AggregateSummary {
        AggregateSummary::Sales(sales_stats(records))
    }
}

impl Aggregate for InventoryRecord {
    fn summarize(records: &[&Self]) -> AggregateSummary {
        AggregateSummary::Inventory(inventory_stats(records))
    }
}

impl Aggregate for FeedbackRecord {
    fn summarize(records: &[&Self]) -> AggregateSummary {
        AggregateSummary::Feedback(feedback_stats(records))
    }
}

/// Summarize a record list of any domain.
pub fn summarize<R: Aggregate>(records: &[R]) -> AggregateSummary {
    let refs: Vec<&R> = records.iter().collect();
    R::summarize(&refs)
}

/// Group records by entity key (first-seen order) and summarize each group.
pub fn entity_breakdown<R: Aggregate>(records: &[R]) -> EntityBreakdown {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&R>> = HashMap::new();

    for record in records {
        let key = record.entity_key();
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(record);
    }

    let entities = order
        .into_iter()
        .map(|key| EntityStats {
            entity: key.to_string(),
            summary: R::summarize(groups.get(key).map(Vec::as_slice).unwrap_or_default()),
        })
        .collect();

    EntityBreakdown {
        domain: R::DOMAIN,
        total_records: records.len(),
        date_range: date_span(records.iter().map(|r| r.event_time())),
        entities,
    }
}

/// Span of the dated entries as `YYYY-MM-DD 至 YYYY-MM-DD`.
pub fn date_span<I>(times: I) -> String
where
    I: IntoIterator<Item = Option<NaiveDateTime>>,
{
    let (min, max) = times
        .into_iter()
        .flatten()
        .fold((None, None), |(min, max): (Option<NaiveDateTime>, Option<NaiveDateTime>), t| {
            (
                Some(min.map_or(t, |m| m.min(t))),
                Some(max.map_or(t, |m| m.max(t))),
            )
        });

    match (min, max) {
        (Some(min), Some(max)) => format!(
            "{} 至 {}",
            min.format("%Y-%m-%d"),
            max.format("%Y-%m-%d")
        ),
        _ => NO_DATA.to_string(),
    }
}

/// Production metrics; the defect rate is 0 when nothing was produced.
pub fn production_stats(records: &[&ProductionRecord]) -> ProductionSummary {
    let total_quantity: i64 = records.iter().map(|r| r.produced_qty).sum();
    let total_defects: i64 = records.iter().map(|r| r.defective_qty).sum();

    ProductionSummary {
        record_count: records.len(),
        total_quantity,
        total_defects,
        average_efficiency: mean(records.iter().map(|r| r.efficiency_rate)),
        defect_rate_percent: defect_rate(total_quantity, total_defects),
        distinct_lines: distinct(records.iter().map(|r| r.production_line.as_str())),
    }
}

pub fn sales_stats(records: &[&SalesRecord]) -> SalesSummary {
    SalesSummary {
        record_count: records.len(),
        total_amount: records.iter().map(|r| finite(r.sale_amount)).sum(),
        total_quantity: records.iter().map(|r| r.sold_qty).sum(),
        average_margin: mean(records.iter().map(|r| r.profit_margin)),
        distinct_regions: distinct(records.iter().map(|r| r.region.as_str())),
        distinct_channels: distinct(records.iter().map(|r| r.channel.as_str())),
    }
}

pub fn inventory_stats(records: &[&InventoryRecord]) -> InventorySummary {
    InventorySummary {
        record_count: records.len(),
        total_stock: records.iter().map(|r| r.current_stock).sum(),
        average_stock: mean(records.iter().map(|r| r.current_stock as f64)),
        low_stock_count: records
            .iter()
            .filter(|r| r.current_stock < r.min_stock_level)
            .count(),
        over_stock_count: records
            .iter()
            .filter(|r| r.current_stock > r.max_stock_level)
            .count(),
        distinct_warehouses: distinct(records.iter().map(|r| r.warehouse_location.as_str())),
    }
}

pub fn feedback_stats(records: &[&FeedbackRecord]) -> FeedbackSummary {
    let count_type = |kind: FeedbackType| records.iter().filter(|r| r.feedback_type == kind).count();

    FeedbackSummary {
        total_count: records.len(),
        average_satisfaction: mean(records.iter().map(|r| r.satisfaction_score as f64)),
        complaint_count: count_type(FeedbackType::Complaint),
        suggestion_count: count_type(FeedbackType::Suggestion),
        praise_count: count_type(FeedbackType::Praise),
        pending_count: records
            .iter()
            .filter(|r| r.status == FeedbackStatus::Pending)
            .count(),
    }
}

/// Defect rate in percent, 0.0 when nothing was produced.
pub fn defect_rate(total_quantity: i64, total_defects: i64) -> f64 {
    if total_quantity > 0 {
        total_defects as f64 / total_quantity as f64 * 100.0
    } else {
        0.0
    }
}

/// Non-finite values (NaN, infinities) count as 0.
fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Arithmetic mean, 0.0 for an empty input.
fn mean<I: Iterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + finite(v), count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Deduplicate, keeping first-seen order.
fn distinct<'a, I: Iterator<Item = &'a str>>(values: I) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for value in values {
        if !seen.iter().any(|s| s == value) {
            seen.push(value.to_string());
        }
    }
    seen
}
