//! JSON import adapter.
//!
//! A data file is a JSON array of rows. Each row is either an array of cells
//! in the domain's column order or an object keyed by field name. Cells are
//! loosely typed and coerced leniently; rows that cannot become a record are
//! logged and skipped.

use crate::error::{ImportError, RowError};
use crate::models::{
    BatchKey, Domain, FeedbackRecord, FeedbackStatus, FeedbackType, InventoryRecord, Priority,
    ProductionRecord, RecordBatch, SalesRecord,
};
use crate::service::AnalysisService;
use crate::store::Stored;
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info, warn};

/// Accepted date layouts, tried in order.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M",
];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Outcome of importing one file or row set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub batch_key: BatchKey,
    pub imported: usize,
    pub skipped: usize,
}

/// A record type that can be built from one loosely typed row.
pub trait FromRow: Stored {
    /// Field names in spreadsheet column order.
    const COLUMNS: &'static [&'static str];

    /// Index of a numeric column used to recognise a header row.
    const NUMERIC_COLUMN: usize;

    fn from_row(row: &Row<'_>, id: u64, imported_at: NaiveDateTime) -> Result<Self, String>;
}

/// One input row viewed through its domain's column layout.
pub struct Row<'a> {
    shape: RowShape<'a>,
    columns: &'static [&'static str],
}

enum RowShape<'a> {
    Cells(&'a [Value]),
    Fields(&'a Map<String, Value>),
}

impl<'a> Row<'a> {
    fn new(value: &'a Value, columns: &'static [&'static str]) -> Option<Self> {
        let shape = match value {
            Value::Array(cells) => RowShape::Cells(cells),
            Value::Object(fields) => RowShape::Fields(fields),
            _ => return None,
        };
        Some(Self { shape, columns })
    }

    /// Raw cell for a named column.
    pub fn cell(&self, name: &str) -> Option<&'a Value> {
        match self.shape {
            RowShape::Cells(cells) => self
                .columns
                .iter()
                .position(|c| *c == name)
                .and_then(|i| cells.get(i)),
            RowShape::Fields(fields) => fields
                .get(name)
                .or_else(|| fields.get(&snake_case(name))),
        }
    }

    pub fn text(&self, name: &str) -> String {
        coerce_text(self.cell(name))
    }

    pub fn int(&self, name: &str) -> i64 {
        coerce_int(self.cell(name))
    }

    pub fn float(&self, name: &str) -> f64 {
        coerce_float(self.cell(name))
    }

    /// Date cell, falling back to the import time.
    pub fn date(&self, name: &str, imported_at: NaiveDateTime) -> NaiveDateTime {
        let raw = self.text(name);
        match parse_date(&raw) {
            Some(at) => at,
            None => {
                warn!(
                    "Unparseable {} '{}', using import time",
                    name, raw
                );
                imported_at
            }
        }
    }

    /// Date cell that may legitimately be absent.
    pub fn optional_date(&self, name: &str, imported_at: NaiveDateTime) -> NaiveDateTime {
        if self.text(name).trim().is_empty() {
            imported_at
        } else {
            self.date(name, imported_at)
        }
    }

    fn looks_like_header(&self, numeric_column: usize) -> bool {
        match self.shape {
            RowShape::Cells(cells) => match cells.get(numeric_column) {
                Some(Value::String(s)) => {
                    let s = s.trim();
                    !s.is_empty() && s.parse::<f64>().is_err()
                }
                _ => false,
            },
            RowShape::Fields(_) => false,
        }
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub fn coerce_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub fn coerce_int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f as i64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

pub fn coerce_float(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).unwrap_or(0.0)
}

pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl FromRow for ProductionRecord {
    const COLUMNS: &'static [&'static str] = &[
        "productName",
        "producedQty",
        "defectiveQty",
        "productionDate",
        "productionLine",
        "unitCost",
        "efficiencyRate",
    ];
    const NUMERIC_COLUMN: usize = 1;

    fn from_row(row: &Row<'_>, id: u64, imported_at: NaiveDateTime) -> Result<Self, String> {
        Ok(ProductionRecord {
            id,
            product_name: row.text("productName"),
            produced_qty: row.int("producedQty"),
            defective_qty: row.int("defectiveQty"),
            production_line: row.text("productionLine"),
            unit_cost: row.float("unitCost"),
            efficiency_rate: row.float("efficiencyRate"),
            produced_at: Some(row.date("productionDate", imported_at)),
            imported_at,
        })
    }
}

impl FromRow for SalesRecord {
    const COLUMNS: &'static [&'static str] = &[
        "productName",
        "soldQty",
        "saleAmount",
        "saleDate",
        "customerId",
        "region",
        "channel",
        "profitMargin",
    ];
    const NUMERIC_COLUMN: usize = 1;

    fn from_row(row: &Row<'_>, id: u64, imported_at: NaiveDateTime) -> Result<Self, String> {
        Ok(SalesRecord {
            id,
            product_name: row.text("productName"),
            sold_qty: row.int("soldQty"),
            sale_amount: row.float("saleAmount"),
            customer_id: row.text("customerId"),
            region: row.text("region"),
            channel: row.text("channel"),
            profit_margin: row.float("profitMargin"),
            sold_at: Some(row.date("saleDate", imported_at)),
            imported_at,
        })
    }
}

impl FromRow for InventoryRecord {
    const COLUMNS: &'static [&'static str] = &[
        "productName",
        "currentStock",
        "minStockLevel",
        "maxStockLevel",
        "warehouseLocation",
        "unitCost",
        "supplierId",
        "lastUpdated",
    ];
    const NUMERIC_COLUMN: usize = 1;

    fn from_row(row: &Row<'_>, id: u64, imported_at: NaiveDateTime) -> Result<Self, String> {
        Ok(InventoryRecord {
            id,
            product_name: row.text("productName"),
            current_stock: row.int("currentStock"),
            min_stock_level: row.int("minStockLevel"),
            max_stock_level: row.int("maxStockLevel"),
            warehouse_location: row.text("warehouseLocation"),
            unit_cost: row.float("unitCost"),
            supplier_id: row.text("supplierId"),
            last_updated: Some(row.optional_date("lastUpdated", imported_at)),
            imported_at,
        })
    }
}

impl FromRow for FeedbackRecord {
    const COLUMNS: &'static [&'static str] = &[
        "customerId",
        "productName",
        "feedbackType",
        "content",
        "satisfactionScore",
        "feedbackDate",
        "status",
        "priority",
    ];
    const NUMERIC_COLUMN: usize = 4;

    fn from_row(row: &Row<'_>, id: u64, imported_at: NaiveDateTime) -> Result<Self, String> {
        let status = FeedbackStatus::from_label(&row.text("status"));
        if let FeedbackStatus::Other(ref label) = status {
            warn!("Unknown feedback status '{}' in row {}, kept as is", label, id);
        }
        let priority_label = row.text("priority");
        let priority = Priority::from_label(&priority_label).unwrap_or_else(|| {
            warn!(
                "Unknown feedback priority '{}' in row {}, using medium",
                priority_label, id
            );
            Priority::Medium
        });

        Ok(FeedbackRecord {
            id,
            customer_id: row.text("customerId"),
            product_name: row.text("productName"),
            feedback_type: FeedbackType::from_label(&row.text("feedbackType")),
            content: row.text("content"),
            satisfaction_score: row.int("satisfactionScore"),
            status,
            priority,
            submitted_at: Some(row.date("feedbackDate", imported_at)),
            imported_at,
        })
    }
}

/// Turn rows into records.
///
/// Record ids count data rows from 1, so a skipped header does not take an
/// id. Row errors report the 1-based position in `rows`.
pub fn parse_rows<R: FromRow>(rows: &[Value], imported_at: NaiveDateTime) -> (Vec<R>, Vec<RowError>) {
    let mut records = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();
    let mut header_skipped = false;

    for (index, value) in rows.iter().enumerate() {
        let row_number = index + 1;
        let Some(row) = Row::new(value, R::COLUMNS) else {
            errors.push(RowError {
                row: row_number,
                reason: "row must be an array or an object".to_string(),
            });
            continue;
        };

        if index == 0 && row.looks_like_header(R::NUMERIC_COLUMN) {
            debug!("Skipping header row");
            header_skipped = true;
            continue;
        }

        let id = (row_number - usize::from(header_skipped)) as u64;
        match R::from_row(&row, id, imported_at) {
            Ok(record) => records.push(record),
            Err(reason) => errors.push(RowError {
                row: row_number,
                reason,
            }),
        }
    }

    (records, errors)
}

/// Typed records of one row set, not yet handed to the store.
#[derive(Debug, Clone)]
pub struct ParsedBatch {
    pub batch: RecordBatch,
    pub errors: Vec<RowError>,
}

fn parse_typed<R: FromRow>(rows: &[Value], imported_at: NaiveDateTime) -> ParsedBatch
where
    RecordBatch: From<Vec<R>>,
{
    let (records, errors) = parse_rows::<R>(rows, imported_at);
    for e in &errors {
        warn!("Skipping {} row: {}", R::DOMAIN, e);
    }

    ParsedBatch {
        batch: RecordBatch::from(records),
        errors,
    }
}

/// Parse already-read rows as one batch of `domain`.
pub fn parse_batch(domain: Domain, rows: &[Value]) -> ParsedBatch {
    let imported_at = Local::now().naive_local();
    match domain {
        Domain::Production => parse_typed::<ProductionRecord>(rows, imported_at),
        Domain::Sales => parse_typed::<SalesRecord>(rows, imported_at),
        Domain::Inventory => parse_typed::<InventoryRecord>(rows, imported_at),
        Domain::Feedback => parse_typed::<FeedbackRecord>(rows, imported_at),
    }
}

/// Read the JSON row array from a file.
pub fn read_rows(path: &Path) -> Result<Vec<Value>, ImportError> {
    let content = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| ImportError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Array(rows) => Ok(rows),
        _ => Err(ImportError::NotAnArray {
            path: path.to_path_buf(),
        }),
    }
}

/// Read and parse one data file. Does not touch the store.
pub fn load_file(domain: Domain, path: &Path) -> Result<ParsedBatch, ImportError> {
    let rows = read_rows(path)?;
    let parsed = parse_batch(domain, &rows);
    debug!(
        "Parsed {} {} rows from {} ({} skipped)",
        parsed.batch.len(),
        domain,
        path.display(),
        parsed.errors.len()
    );
    Ok(parsed)
}

/// Hand a parsed batch to the service.
pub fn submit(service: &AnalysisService, parsed: ParsedBatch) -> ImportReport {
    let imported = parsed.batch.len();
    let batch_key = service.submit_batch(parsed.batch);
    ImportReport {
        batch_key,
        imported,
        skipped: parsed.errors.len(),
    }
}

/// Import one data file as a batch of `domain`.
pub fn import_file(
    service: &AnalysisService,
    domain: Domain,
    path: &Path,
) -> Result<ImportReport, ImportError> {
    let report = submit(service, load_file(domain, path)?);

    info!(
        "Imported {} {} records from {} ({} skipped)",
        report.imported,
        domain,
        path.display(),
        report.skipped
    );
    Ok(report)
}

/// Domain named by a file stem prefix, English or Chinese.
pub fn domain_from_path(path: &Path) -> Option<Domain> {
    let stem = path.file_stem()?.to_str()?.to_lowercase();
    Domain::ALL
        .into_iter()
        .find(|d| stem.starts_with(d.as_str()) || stem.starts_with(d.native_label()))
}

/// Import a file whose domain is inferred from its name.
pub fn import_detected(service: &AnalysisService, path: &Path) -> Result<ImportReport, ImportError> {
    let domain = domain_from_path(path).ok_or_else(|| ImportError::UnknownDomain {
        path: path.to_path_buf(),
    })?;
    import_file(service, domain, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_coercions() {
        assert_eq!(coerce_text(Some(&json!(42.0))), "42");
        assert_eq!(coerce_text(Some(&json!(2.5))), "2.5");
        assert_eq!(coerce_text(Some(&json!(true))), "true");
        assert_eq!(coerce_text(Some(&Value::Null)), "");
        assert_eq!(coerce_int(Some(&json!("12"))), 12);
        assert_eq!(coerce_int(Some(&json!(7.9))), 7);
        assert_eq!(coerce_int(Some(&json!("n/a"))), 0);
        assert_eq!(coerce_float(Some(&json!("3.5"))), 3.5);
        assert_eq!(coerce_float(None), 0.0);
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2024-03-01 08:30:00"), Some(at("2024-03-01 08:30:00")));
        assert_eq!(parse_date("2024/03/01 08:30:00"), Some(at("2024-03-01 08:30:00")));
        assert_eq!(parse_date("2024/03/01 08:30"), Some(at("2024-03-01 08:30:00")));
        assert_eq!(parse_date("2024-03-01 08:30"), Some(at("2024-03-01 08:30:00")));
        assert_eq!(parse_date("2024-03-01"), Some(at("2024-03-01 00:00:00")));
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date("  "), None);
    }

    #[test]
    fn test_production_rows_with_header() {
        let imported_at = at("2024-06-01 00:00:00");
        let rows = vec![
            json!(["产品名称", "生产数量", "缺陷数量", "生产日期", "生产线", "单位成本", "效率"]),
            json!(["Widget", 100, 5, "2024-05-20", "L1", 2.5, 92.0]),
            json!(["Gadget", "40", "x", "garbage", "L2", null, "88.5"]),
        ];

        let (records, errors) = parse_rows::<ProductionRecord>(&rows, imported_at);

        assert!(errors.is_empty());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[1].id, 2);
        assert_eq!(records[0].produced_qty, 100);
        assert_eq!(records[0].produced_at, Some(at("2024-05-20 00:00:00")));
        assert_eq!(records[1].defective_qty, 0);
        assert_eq!(records[1].unit_cost, 0.0);
        assert_eq!(records[1].efficiency_rate, 88.5);
        assert_eq!(records[1].produced_at, Some(imported_at));
    }

    #[test]
    fn test_object_rows_accept_camel_and_snake_keys() {
        let imported_at = at("2024-06-01 00:00:00");
        let rows = vec![
            json!({"productName": "A", "soldQty": 3, "saleAmount": 30.0, "region": "West"}),
            json!({"product_name": "B", "sold_qty": 1, "sale_amount": "9.5", "sale_date": "2024-05-01"}),
        ];

        let (records, errors) = parse_rows::<SalesRecord>(&rows, imported_at);

        assert!(errors.is_empty());
        assert_eq!(records[0].region, "West");
        assert_eq!(records[1].product_name, "B");
        assert_eq!(records[1].sale_amount, 9.5);
        assert_eq!(records[1].sold_at, Some(at("2024-05-01 00:00:00")));
    }

    #[test]
    fn test_inventory_without_last_updated_uses_import_time() {
        let imported_at = at("2024-06-01 12:00:00");
        let rows = vec![json!(["Bolt", 10, 5, 100, "WH-A", 0.2, "S1"])];

        let (records, _) = parse_rows::<InventoryRecord>(&rows, imported_at);
        assert_eq!(records[0].last_updated, Some(imported_at));
        assert_eq!(records[0].max_stock_level, 100);
    }

    #[test]
    fn test_feedback_unknown_labels_keep_row() {
        let imported_at = at("2024-06-01 00:00:00");
        let rows = vec![
            json!(["C1", "Widget", "投诉", "broken", 2, "2024-05-02", "待处理", "高"]),
            json!(["C2", "Widget", "投诉", "late", 1, "2024-05-03", "已关闭", "紧急"]),
            json!(["C3", "Widget", "praise", "great", 5, "2024-05-04", "", ""]),
            json!("not a row"),
        ];

        let (records, errors) = parse_rows::<FeedbackRecord>(&rows, imported_at);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].priority, Priority::High);
        assert_eq!(records[1].status, FeedbackStatus::Other("已关闭".to_string()));
        assert_eq!(records[1].priority, Priority::Medium);
        assert_eq!(records[2].status, FeedbackStatus::Pending);
        assert_eq!(records[2].priority, Priority::Medium);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row, 4);

        let stats = crate::analysis::aggregator::feedback_stats(&records.iter().collect::<Vec<_>>());
        assert_eq!(stats.complaint_count, 2);
        assert_eq!(stats.pending_count, 2);
    }

    #[test]
    fn test_ids_count_rows_without_header() {
        let rows = vec![
            json!(["A", 1, 0.0, "2024-05-01"]),
            json!(["B", 2, 0.0, "2024-05-01"]),
        ];
        let (records, _) = parse_rows::<SalesRecord>(&rows, at("2024-06-01 00:00:00"));
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_load_file_counts() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            json!([
                ["C1", "Widget", "建议", "more colours", 4, "2024-05-02", "resolved", "low"],
                ["C2", "Widget", "投诉", "late", 1, "2024-05-02", "unknown", "low"],
                42
            ])
        )
        .unwrap();

        let parsed = load_file(Domain::Feedback, file.path()).unwrap();

        assert_eq!(parsed.batch.domain(), Domain::Feedback);
        assert_eq!(parsed.batch.len(), 2);
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn test_load_file_errors() {
        let mut not_array = NamedTempFile::new().unwrap();
        write!(not_array, "{{\"rows\": []}}").unwrap();
        assert!(matches!(
            load_file(Domain::Sales, not_array.path()),
            Err(ImportError::NotAnArray { .. })
        ));

        let mut bad_json = NamedTempFile::new().unwrap();
        write!(bad_json, "[1, 2").unwrap();
        assert!(matches!(
            load_file(Domain::Sales, bad_json.path()),
            Err(ImportError::Json { .. })
        ));

        assert!(matches!(
            load_file(Domain::Sales, Path::new("/nonexistent/sales.json")),
            Err(ImportError::Io { .. })
        ));
    }

    #[test]
    fn test_domain_from_path() {
        assert_eq!(domain_from_path(Path::new("data/sales_q1.json")), Some(Domain::Sales));
        assert_eq!(domain_from_path(Path::new("Production.json")), Some(Domain::Production));
        assert_eq!(domain_from_path(Path::new("库存-六月.json")), Some(Domain::Inventory));
        assert_eq!(domain_from_path(Path::new("notes.json")), None);
    }
}
