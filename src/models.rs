//! Data models for the operations analytics engine.
//!
//! This module contains the typed records for each business domain,
//! the feedback enums, and the batch bookkeeping used by the store.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four business data categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Production,
    Sales,
    Inventory,
    Feedback,
}

impl Domain {
    /// All domains in presentation order.
    pub const ALL: [Domain; 4] = [
        Domain::Production,
        Domain::Sales,
        Domain::Inventory,
        Domain::Feedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Production => "production",
            Domain::Sales => "sales",
            Domain::Inventory => "inventory",
            Domain::Feedback => "feedback",
        }
    }

    /// Native-language label, used by the Chinese prompt and file naming.
    pub fn native_label(&self) -> &'static str {
        match self {
            Domain::Production => "生产",
            Domain::Sales => "销售",
            Domain::Inventory => "库存",
            Domain::Feedback => "反馈",
        }
    }

    /// Context bundle key for the domain summary, e.g. `productionData`.
    pub fn summary_key(&self) -> String {
        format!("{}Data", self.as_str())
    }

    /// Context bundle key for the entity breakdown, e.g. `productionDataDetail`.
    pub fn detail_key(&self) -> String {
        format!("{}DataDetail", self.as_str())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Domain::ALL
            .into_iter()
            .find(|d| lower == d.as_str() || lower == d.native_label())
            .ok_or_else(|| format!("Unknown domain: {}", s))
    }
}

/// Output language for prompts, guidance messages and chart titles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Chinese (default)
    #[default]
    Zh,
    /// English
    En,
}

/// Kind of customer feedback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Complaint,
    Suggestion,
    Praise,
    /// Any other label, kept verbatim (e.g. inquiries).
    Other(String),
}

impl FeedbackType {
    /// Parse a Chinese or English label. Unknown labels are kept as `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "投诉" | "complaint" => FeedbackType::Complaint,
            "建议" | "suggestion" => FeedbackType::Suggestion,
            "表扬" | "praise" => FeedbackType::Praise,
            _ => FeedbackType::Other(label.trim().to_string()),
        }
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackType::Complaint => write!(f, "complaint"),
            FeedbackType::Suggestion => write!(f, "suggestion"),
            FeedbackType::Praise => write!(f, "praise"),
            FeedbackType::Other(s) if s.is_empty() => write!(f, "other"),
            FeedbackType::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Handling status of a feedback item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackStatus {
    #[default]
    Pending,
    InProgress,
    Resolved,
    /// Any other label (e.g. 已关闭), kept verbatim. Never counted as pending.
    Other(String),
}

impl FeedbackStatus {
    /// Parse a Chinese or English label. Blank labels mean `Pending`;
    /// unknown labels are kept as `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "" | "待处理" | "pending" => FeedbackStatus::Pending,
            "处理中" | "in-progress" | "in progress" | "in_progress" | "processing" => {
                FeedbackStatus::InProgress
            }
            "已解决" | "resolved" | "closed" => FeedbackStatus::Resolved,
            _ => FeedbackStatus::Other(label.trim().to_string()),
        }
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackStatus::Pending => write!(f, "pending"),
            FeedbackStatus::InProgress => write!(f, "in-progress"),
            FeedbackStatus::Resolved => write!(f, "resolved"),
            FeedbackStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Priority of a feedback item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Parse a Chinese or English label. Blank labels mean `Medium`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "高" | "high" => Some(Priority::High),
            "" | "中" | "medium" => Some(Priority::Medium),
            "低" | "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Shared shape of every stored record.
pub trait DomainRecord: Clone + Send + Sync + 'static {
    /// Domain every record of this type belongs to.
    const DOMAIN: Domain;

    /// Grouping key within the domain (the product name).
    fn entity_key(&self) -> &str;

    /// When the business event happened, if known.
    fn event_time(&self) -> Option<NaiveDateTime>;
}

/// One production run of a product on a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecord {
    pub id: u64,
    pub product_name: String,
    pub produced_qty: i64,
    /// Not enforced to be `<= produced_qty`.
    pub defective_qty: i64,
    pub production_line: String,
    pub unit_cost: f64,
    /// Efficiency as a percentage.
    pub efficiency_rate: f64,
    pub produced_at: Option<NaiveDateTime>,
    pub imported_at: NaiveDateTime,
}

/// One sale of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub id: u64,
    pub product_name: String,
    pub sold_qty: i64,
    pub sale_amount: f64,
    pub customer_id: String,
    pub region: String,
    pub channel: String,
    pub profit_margin: f64,
    pub sold_at: Option<NaiveDateTime>,
    pub imported_at: NaiveDateTime,
}

/// Stock position of a product in a warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: u64,
    pub product_name: String,
    pub current_stock: i64,
    pub min_stock_level: i64,
    pub max_stock_level: i64,
    pub warehouse_location: String,
    pub unit_cost: f64,
    pub supplier_id: String,
    pub last_updated: Option<NaiveDateTime>,
    pub imported_at: NaiveDateTime,
}

/// One customer feedback item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: u64,
    pub customer_id: String,
    pub product_name: String,
    pub feedback_type: FeedbackType,
    pub content: String,
    /// 1-5.
    pub satisfaction_score: i64,
    pub status: FeedbackStatus,
    pub priority: Priority,
    pub submitted_at: Option<NaiveDateTime>,
    pub imported_at: NaiveDateTime,
}

impl DomainRecord for ProductionRecord {
    const DOMAIN: Domain = Domain::Production;

    fn entity_key(&self) -> &str {
        &self.product_name
    }

    fn event_time(&self) -> Option<NaiveDateTime> {
        self.produced_at
    }
}

impl DomainRecord for SalesRecord {
    const DOMAIN: Domain = Domain::Sales;

    fn entity_key(&self) -> &str {
        &self.product_name
    }

    fn event_time(&self) -> Option<NaiveDateTime> {
        self.sold_at
    }
}

impl DomainRecord for InventoryRecord {
    const DOMAIN: Domain = Domain::Inventory;

    fn entity_key(&self) -> &str {
        &self.product_name
    }

    fn event_time(&self) -> Option<NaiveDateTime> {
        self.last_updated
    }
}

impl DomainRecord for FeedbackRecord {
    const DOMAIN: Domain = Domain::Feedback;

    fn entity_key(&self) -> &str {
        &self.product_name
    }

    fn event_time(&self) -> Option<NaiveDateTime> {
        self.submitted_at
    }
}

/// Identifier of one import operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchKey {
    pub domain: Domain,
    /// Store-wide monotonic sequence number; never repeats within a store.
    pub sequence: u64,
    pub imported_at: NaiveDateTime,
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.domain,
            self.imported_at.and_utc().timestamp_millis(),
            self.sequence
        )
    }
}

/// Records produced by one import operation. Immutable once stored.
#[derive(Debug, Clone)]
pub struct Batch<R> {
    pub key: BatchKey,
    pub records: Vec<R>,
}

/// Records of a single domain, as handed over by the import adapter.
#[derive(Debug, Clone)]
pub enum RecordBatch {
    Production(Vec<ProductionRecord>),
    Sales(Vec<SalesRecord>),
    Inventory(Vec<InventoryRecord>),
    Feedback(Vec<FeedbackRecord>),
}

impl From<Vec<ProductionRecord>> for RecordBatch {
    fn from(records: Vec<ProductionRecord>) -> Self {
        RecordBatch::Production(records)
    }
}

impl From<Vec<SalesRecord>> for RecordBatch {
    fn from(records: Vec<SalesRecord>) -> Self {
        RecordBatch::Sales(records)
    }
}

impl From<Vec<InventoryRecord>> for RecordBatch {
    fn from(records: Vec<InventoryRecord>) -> Self {
        RecordBatch::Inventory(records)
    }
}

impl From<Vec<FeedbackRecord>> for RecordBatch {
    fn from(records: Vec<FeedbackRecord>) -> Self {
        RecordBatch::Feedback(records)
    }
}

impl RecordBatch {
    pub fn domain(&self) -> Domain {
        match self {
            RecordBatch::Production(_) => Domain::Production,
            RecordBatch::Sales(_) => Domain::Sales,
            RecordBatch::Inventory(_) => Domain::Inventory,
            RecordBatch::Feedback(_) => Domain::Feedback,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecordBatch::Production(r) => r.len(),
            RecordBatch::Sales(r) => r.len(),
            RecordBatch::Inventory(r) => r.len(),
            RecordBatch::Feedback(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_domain_keys() {
        assert_eq!(Domain::Production.summary_key(), "productionData");
        assert_eq!(Domain::Feedback.detail_key(), "feedbackDataDetail");
    }

    #[test]
    fn test_domain_from_str() {
        assert_eq!("Sales".parse::<Domain>(), Ok(Domain::Sales));
        assert_eq!("库存".parse::<Domain>(), Ok(Domain::Inventory));
        assert!("weather".parse::<Domain>().is_err());
    }

    #[test]
    fn test_feedback_type_labels() {
        assert_eq!(FeedbackType::from_label("投诉"), FeedbackType::Complaint);
        assert_eq!(FeedbackType::from_label("Suggestion"), FeedbackType::Suggestion);
        assert_eq!(
            FeedbackType::from_label("咨询"),
            FeedbackType::Other("咨询".to_string())
        );
        assert_eq!(FeedbackType::Other(String::new()).to_string(), "other");
    }

    #[test]
    fn test_status_and_priority_labels() {
        assert_eq!(FeedbackStatus::from_label("待处理"), FeedbackStatus::Pending);
        assert_eq!(FeedbackStatus::from_label(""), FeedbackStatus::Pending);
        assert_eq!(
            FeedbackStatus::from_label("In Progress"),
            FeedbackStatus::InProgress
        );
        assert_eq!(
            FeedbackStatus::from_label(" 已关闭 "),
            FeedbackStatus::Other("已关闭".to_string())
        );
        assert_eq!(FeedbackStatus::Other("已关闭".to_string()).to_string(), "已关闭");
        assert_eq!(Priority::from_label("紧急"), None);
        assert_eq!(Priority::from_label("高"), Some(Priority::High));
        assert_eq!(Priority::from_label(""), Some(Priority::Medium));
        assert!(Priority::High > Priority::Low);
    }

    #[test]
    fn test_batch_key_display() {
        let imported_at = NaiveDate::from_ymd_opt(2025, 1, 2)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        let key = BatchKey {
            domain: Domain::Sales,
            sequence: 7,
            imported_at,
        };
        assert_eq!(key.to_string(), "sales_1735776000000_7");
    }
}
