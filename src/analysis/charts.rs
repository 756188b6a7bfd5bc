//! Chart series rendering.
//!
//! Entity series follow the breakdown's first-seen entity order. Store-level
//! series group all stored records by a non-entity field and are ranked by
//! value, largest first.

use crate::analysis::aggregator::{AggregateSummary, EntityBreakdown};
use crate::analysis::context::ContextBundle;
use crate::models::{
    Domain, FeedbackRecord, FeedbackType, InventoryRecord, Language, ProductionRecord,
    SalesRecord,
};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
}

/// Chart-ready category/value series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub kind: ChartKind,
    pub title: String,
    pub categories: Vec<String>,
    /// Parallel to `categories`.
    pub values: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axis_label: Option<String>,
}

impl ChartSeries {
    fn new(kind: ChartKind, title: &str, axis_label: Option<&str>) -> Self {
        Self {
            kind,
            title: title.to_string(),
            categories: Vec::new(),
            values: Vec::new(),
            axis_label: axis_label.map(String::from),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Category/value pairs in series order.
    pub fn points(&self) -> impl Iterator<Item = (&str, f64)> {
        self.categories
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

/// Series name → series.
pub type ChartSet = BTreeMap<String, ChartSeries>;

/// Chart title and axis label per series, per language.
fn caption(name: &str, language: Language) -> (&'static str, Option<&'static str>) {
    match (name, language) {
        ("productionEfficiency", Language::Zh) => ("各产品生产效率对比", Some("效率率 (%)")),
        ("productionEfficiency", Language::En) => {
            ("Production efficiency by product", Some("Efficiency (%)"))
        }
        ("defectRate", Language::Zh) => ("各产品缺陷率趋势", Some("缺陷率 (%)")),
        ("defectRate", Language::En) => ("Defect rate by product", Some("Defect rate (%)")),
        ("productionTrend", Language::Zh) => ("月度生产趋势", Some("生产数量")),
        ("productionTrend", Language::En) => ("Monthly production", Some("Produced quantity")),
        ("salesAmount", Language::Zh) => ("各产品销售额对比", Some("销售额")),
        ("salesAmount", Language::En) => ("Sales amount by product", Some("Sales amount")),
        ("profitMargin", Language::Zh) => ("各产品利润率分布", None),
        ("profitMargin", Language::En) => ("Profit margin by product", None),
        ("regionalSales", Language::Zh) => ("各地区销售表现", Some("销售额")),
        ("regionalSales", Language::En) => ("Sales by region", Some("Sales amount")),
        ("inventoryLevel", Language::Zh) => ("各产品库存水平", Some("库存数量")),
        ("inventoryLevel", Language::En) => ("Stock level by product", Some("Units in stock")),
        ("warehouseDistribution", Language::Zh) => ("各仓库库存分布", None),
        ("warehouseDistribution", Language::En) => ("Stock by warehouse", None),
        ("satisfactionScore", Language::Zh) => ("各产品客户满意度", Some("满意度评分")),
        ("satisfactionScore", Language::En) => {
            ("Customer satisfaction by product", Some("Satisfaction score"))
        }
        ("feedbackTypeDistribution", Language::Zh) => ("客户反馈类型分布", None),
        ("feedbackTypeDistribution", Language::En) => ("Feedback by type", None),
        _ => ("", None),
    }
}

/// Category label of a feedback type.
fn feedback_type_label(kind: &FeedbackType, language: Language) -> String {
    match (kind, language) {
        (FeedbackType::Complaint, Language::Zh) => "投诉".to_string(),
        (FeedbackType::Suggestion, Language::Zh) => "建议".to_string(),
        (FeedbackType::Praise, Language::Zh) => "表扬".to_string(),
        (FeedbackType::Other(s), Language::Zh) if s.is_empty() => "其他".to_string(),
        (other, _) => other.to_string(),
    }
}

/// Turns bundle breakdowns and store groupings into chart series.
pub struct ChartRenderer<'a> {
    store: &'a RecordStore,
    language: Language,
}

impl<'a> ChartRenderer<'a> {
    pub fn new(store: &'a RecordStore, language: Language) -> Self {
        Self { store, language }
    }

    /// Series for every domain that has a breakdown in the bundle.
    pub fn render(&self, bundle: &ContextBundle) -> ChartSet {
        let mut charts = ChartSet::new();

        for domain in bundle.domains() {
            let Some(breakdown) = bundle.breakdown(domain) else {
                continue;
            };
            match domain {
                Domain::Production => {
                    self.insert_entity(&mut charts, "productionEfficiency", ChartKind::Bar, breakdown, |s| {
                        match s {
                            AggregateSummary::Production(p) => Some(p.average_efficiency),
                            _ => None,
                        }
                    });
                    self.insert_entity(&mut charts, "defectRate", ChartKind::Line, breakdown, |s| match s {
                        AggregateSummary::Production(p) => Some(p.defect_rate_percent),
                        _ => None,
                    });
                    charts.insert("productionTrend".to_string(), self.production_trend());
                }
                Domain::Sales => {
                    self.insert_entity(&mut charts, "salesAmount", ChartKind::Bar, breakdown, |s| match s {
                        AggregateSummary::Sales(p) => Some(p.total_amount),
                        _ => None,
                    });
                    self.insert_entity(&mut charts, "profitMargin", ChartKind::Pie, breakdown, |s| match s {
                        AggregateSummary::Sales(p) => Some(p.average_margin),
                        _ => None,
                    });
                    charts.insert("regionalSales".to_string(), self.regional_sales());
                }
                Domain::Inventory => {
                    self.insert_entity(&mut charts, "inventoryLevel", ChartKind::Bar, breakdown, |s| match s {
                        AggregateSummary::Inventory(p) => Some(p.total_stock as f64),
                        _ => None,
                    });
                    charts.insert(
                        "warehouseDistribution".to_string(),
                        self.warehouse_distribution(),
                    );
                }
                Domain::Feedback => {
                    self.insert_entity(&mut charts, "satisfactionScore", ChartKind::Bar, breakdown, |s| {
                        match s {
                            AggregateSummary::Feedback(p) => Some(p.average_satisfaction),
                            _ => None,
                        }
                    });
                    charts.insert(
                        "feedbackTypeDistribution".to_string(),
                        self.feedback_type_distribution(),
                    );
                }
            }
        }

        charts
    }

    fn insert_entity<F>(
        &self,
        charts: &mut ChartSet,
        name: &str,
        kind: ChartKind,
        breakdown: &EntityBreakdown,
        metric: F,
    ) where
        F: Fn(&AggregateSummary) -> Option<f64>,
    {
        let (title, axis) = caption(name, self.language);
        charts.insert(name.to_string(), entity_series(breakdown, kind, title, axis, metric));
    }

    /// Produced quantity per `YYYY-MM` of production time.
    pub fn production_trend(&self) -> ChartSeries {
        let records = self.store.all_records::<ProductionRecord>();
        let (title, axis) = caption("productionTrend", self.language);
        ranked_series(
            ChartKind::Line,
            title,
            axis,
            records.iter().filter_map(|r| {
                r.produced_at
                    .map(|t| (t.format("%Y-%m").to_string(), r.produced_qty as f64))
            }),
        )
    }

    /// Sale amount per region.
    pub fn regional_sales(&self) -> ChartSeries {
        let records = self.store.all_records::<SalesRecord>();
        let (title, axis) = caption("regionalSales", self.language);
        ranked_series(
            ChartKind::Bar,
            title,
            axis,
            records.iter().map(|r| (r.region.clone(), r.sale_amount)),
        )
    }

    /// Current stock per warehouse.
    pub fn warehouse_distribution(&self) -> ChartSeries {
        let records = self.store.all_records::<InventoryRecord>();
        let (title, axis) = caption("warehouseDistribution", self.language);
        ranked_series(
            ChartKind::Pie,
            title,
            axis,
            records
                .iter()
                .map(|r| (r.warehouse_location.clone(), r.current_stock as f64)),
        )
    }

    /// Feedback count per feedback type.
    pub fn feedback_type_distribution(&self) -> ChartSeries {
        let records = self.store.all_records::<FeedbackRecord>();
        let (title, axis) = caption("feedbackTypeDistribution", self.language);
        ranked_series(
            ChartKind::Pie,
            title,
            axis,
            records
                .iter()
                .map(|r| (feedback_type_label(&r.feedback_type, self.language), 1.0)),
        )
    }
}

/// One point per entity, in breakdown order.
pub fn entity_series<F>(
    breakdown: &EntityBreakdown,
    kind: ChartKind,
    title: &str,
    axis_label: Option<&str>,
    metric: F,
) -> ChartSeries
where
    F: Fn(&AggregateSummary) -> Option<f64>,
{
    let mut series = ChartSeries::new(kind, title, axis_label);
    for stats in &breakdown.entities {
        series.categories.push(stats.entity.clone());
        series.values.push(metric(&stats.summary).unwrap_or(0.0));
    }
    series
}

/// Sum values per category, then order categories by total, largest first.
///
/// Ties keep first-seen order.
pub fn ranked_series<I>(kind: ChartKind, title: &str, axis_label: Option<&str>, points: I) -> ChartSeries
where
    I: IntoIterator<Item = (String, f64)>,
{
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, f64> = HashMap::new();

    for (category, value) in points {
        let value = if value.is_finite() { value } else { 0.0 };
        match totals.get_mut(&category) {
            Some(total) => *total += value,
            None => {
                totals.insert(category.clone(), value);
                order.push(category);
            }
        }
    }

    let mut ranked: Vec<(String, f64)> = order
        .into_iter()
        .map(|c| {
            let total = totals.get(&c).copied().unwrap_or(0.0);
            (c, total)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut series = ChartSeries::new(kind, title, axis_label);
    for (category, value) in ranked {
        series.categories.push(category);
        series.values.push(value);
    }
    series
}
