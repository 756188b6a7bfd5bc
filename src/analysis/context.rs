//! Context bundle assembly and analysis prompt rendering.

use crate::analysis::aggregator::{entity_breakdown, summarize, Aggregate, AggregateSummary, EntityBreakdown};
use crate::analysis::classifier::TopicClassifier;
use crate::models::{
    Domain, FeedbackRecord, InventoryRecord, Language, ProductionRecord, SalesRecord,
};
use crate::store::{RecordStore, Stored};
use chrono::{Months, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// One bundle value: a windowed summary or an all-time breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ContextValue {
    Summary(AggregateSummary),
    Breakdown(EntityBreakdown),
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Summary(s) => write!(f, "{}", s),
            ContextValue::Breakdown(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    /// `<domain>Data` or `<domain>DataDetail`.
    pub key: String,
    pub domain: Domain,
    pub value: ContextValue,
}

/// Summaries and breakdowns selected for one question.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextBundle {
    pub entries: Vec<ContextEntry>,
    /// True when the question matched no keyword.
    pub fallback: bool,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    pub fn breakdown(&self, domain: Domain) -> Option<&EntityBreakdown> {
        match self.get(&domain.detail_key()) {
            Some(ContextValue::Breakdown(b)) => Some(b),
            _ => None,
        }
    }

    /// Domains present in the bundle, deduplicated.
    pub fn domains(&self) -> Vec<Domain> {
        let mut domains: Vec<Domain> = Vec::new();
        for entry in &self.entries {
            if !domains.contains(&entry.domain) {
                domains.push(entry.domain);
            }
        }
        domains
    }
}

/// Builds context bundles from the store for free-text questions.
pub struct ContextAssembler<'a> {
    store: &'a RecordStore,
    classifier: &'a TopicClassifier,
    window_months: u32,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(store: &'a RecordStore, classifier: &'a TopicClassifier, window_months: u32) -> Self {
        Self {
            store,
            classifier,
            window_months,
        }
    }

    /// Build the bundle for a question as of `now`.
    ///
    /// Summaries cover the trailing window ending at `now`; breakdowns cover
    /// all stored history. Domains without any stored record are left out.
    pub fn build_context(&self, question: &str, now: NaiveDateTime) -> ContextBundle {
        let selection = self.classifier.classify(question, self.store);
        let start = now
            .checked_sub_months(Months::new(self.window_months))
            .unwrap_or(NaiveDateTime::MIN);

        let mut bundle = ContextBundle {
            entries: Vec::new(),
            fallback: selection.fallback,
        };

        for domain in &selection.domains {
            match domain {
                Domain::Production => self.add_domain::<ProductionRecord>(&mut bundle, start, now),
                Domain::Sales => self.add_domain::<SalesRecord>(&mut bundle, start, now),
                Domain::Inventory => self.add_domain::<InventoryRecord>(&mut bundle, start, now),
                Domain::Feedback => self.add_domain::<FeedbackRecord>(&mut bundle, start, now),
            }
        }

        info!(
            "Context assembled: {} entries from {} selected domains{}",
            bundle.len(),
            selection.domains.len(),
            if bundle.fallback { " (fallback)" } else { "" }
        );
        bundle
    }

    fn add_domain<R: Stored + Aggregate>(
        &self,
        bundle: &mut ContextBundle,
        start: NaiveDateTime,
        now: NaiveDateTime,
    ) {
        let all = self.store.all_records::<R>();
        if all.is_empty() {
            debug!("No {} records stored, skipping", R::DOMAIN);
            return;
        }

        let windowed = self.store.records_in_range::<R>(start, now);
        let breakdown = entity_breakdown(&all);
        debug!("{} entities: {:?}", R::DOMAIN, breakdown.entity_keys());

        bundle.entries.push(ContextEntry {
            key: R::DOMAIN.summary_key(),
            domain: R::DOMAIN,
            value: ContextValue::Summary(summarize(&windowed)),
        });
        bundle.entries.push(ContextEntry {
            key: R::DOMAIN.detail_key(),
            domain: R::DOMAIN,
            value: ContextValue::Breakdown(breakdown),
        });
    }
}

const SYSTEM_PROMPT: &str = "You are a professional automotive industry operations data analyst. \
You need to analyze production, sales, inventory, customer feedback and other multi-dimensional data \
based on user questions, and provide professional analysis reports and suggestions. Please explain \
the meaning behind the data in simple and easy-to-understand language, and provide specific \
improvement suggestions.

You can analyze the following data dimensions:
1. Production data: production efficiency, defect rate, cost control, production line performance
2. Sales data: sales revenue, profit margin, regional distribution, sales channels, customer analysis
3. Inventory data: inventory levels, turnover rate, stockout risk, warehouse management
4. Customer feedback: satisfaction, complaint handling, product improvement suggestions, service quality

Please provide data-driven analysis reports based on users' specific questions. \
If no relevant data is available, please inform the user and suggest what data should be uploaded.";

struct PromptLabels {
    question: &'static str,
    data: &'static str,
    footer_intro: &'static str,
    footer: [&'static str; 6],
}

fn labels(language: Language) -> PromptLabels {
    match language {
        Language::Zh => PromptLabels {
            question: "用户问题",
            data: "相关数据",
            footer_intro: "请基于以上数据提供详细的分析报告，包括：",
            footer: [
                "数据概览和关键指标分析",
                "趋势分析和异常识别",
                "问题诊断和原因分析",
                "改进建议和行动计划",
                "风险预警和机会识别",
                "具体的数据支撑和计算过程",
            ],
        },
        Language::En => PromptLabels {
            question: "User question",
            data: "Relevant data",
            footer_intro: "Based on the data above, provide a detailed analysis report covering:",
            footer: [
                "Data overview and key metrics",
                "Trend analysis and anomaly detection",
                "Problem diagnosis and root causes",
                "Recommendations and action plan",
                "Risk warnings and opportunities",
                "Supporting figures and calculations",
            ],
        },
    }
}

/// Render the analysis prompt for a question and its bundle.
///
/// `system_prompt` replaces the built-in analyst preamble when given.
pub fn render_prompt(
    question: &str,
    bundle: &ContextBundle,
    language: Language,
    system_prompt: Option<&str>,
) -> String {
    let labels = labels(language);
    let mut prompt = String::new();

    prompt.push_str(system_prompt.unwrap_or(SYSTEM_PROMPT));
    prompt.push_str("\n\n");
    prompt.push_str(&format!("{}: {}\n\n", labels.question, question));
    prompt.push_str(&format!("{}:\n", labels.data));

    for entry in &bundle.entries {
        prompt.push_str(&format!("{}: {}\n", entry.key, entry.value));
    }

    prompt.push('\n');
    prompt.push_str(labels.footer_intro);
    prompt.push('\n');
    for (i, item) in labels.footer.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, item));
    }

    prompt
}

/// Guidance returned instead of an analysis when no data is relevant.
pub fn no_data_message(language: Language) -> &'static str {
    match language {
        Language::Zh => {
            "抱歉，目前没有找到相关的数据。请先上传相应的Excel数据文件，然后重新提问。\n\n\
您可以上传以下类型的数据：\n\
1. 生产数据 - 包含产品名称、生产数量、缺陷数量等信息\n\
2. 销售数据 - 包含销售数量、销售金额、客户信息等\n\
3. 库存数据 - 包含当前库存、最低库存、仓库位置等\n\
4. 客户反馈数据 - 包含反馈类型、满意度评分、处理状态等"
        }
        Language::En => {
            "Sorry, no relevant data was found. Please upload the matching data files first, then ask again.\n\n\
You can upload the following kinds of data:\n\
1. Production data - product name, produced quantity, defect quantity, ...\n\
2. Sales data - sold quantity, sale amount, customer information, ...\n\
3. Inventory data - current stock, minimum stock, warehouse location, ...\n\
4. Customer feedback data - feedback type, satisfaction score, handling status, ..."
        }
    }
}

/// Generic message shown when the generation call fails.
pub fn failure_message(language: Language) -> &'static str {
    match language {
        Language::Zh => "抱歉，分析过程中发生错误。请检查数据格式是否正确，或稍后重试。",
        Language::En => {
            "Sorry, the analysis failed. Please check that the data is well-formed, or retry later."
        }
    }
}
