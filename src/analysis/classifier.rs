//! Keyword-based topic classification.
//!
//! A question selects every domain whose keyword table has at least one
//! substring hit. Keyword tables are plain data so a new domain or language
//! only needs a new table row.

use crate::models::Domain;
use crate::store::RecordStore;
use serde::Serialize;
use tracing::debug;

/// Keywords that select one domain.
#[derive(Debug, Clone, Copy)]
pub struct KeywordTable {
    pub domain: Domain,
    pub keywords: &'static [&'static str],
}

/// Built-in bilingual keyword tables.
pub const DEFAULT_KEYWORDS: &[KeywordTable] = &[
    KeywordTable {
        domain: Domain::Production,
        keywords: &["生产", "效率", "缺陷", "production", "efficiency", "defect"],
    },
    KeywordTable {
        domain: Domain::Sales,
        keywords: &["销售", "收入", "利润", "sales", "revenue", "profit"],
    },
    KeywordTable {
        domain: Domain::Inventory,
        keywords: &["库存", "缺货", "周转", "inventory", "stockout", "turnover"],
    },
    KeywordTable {
        domain: Domain::Feedback,
        keywords: &["客户", "反馈", "满意", "customer", "feedback", "satisfaction"],
    },
];

/// Domains chosen for a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    /// Selected domains in [`Domain::ALL`] order.
    pub domains: Vec<Domain>,
    /// True when no keyword matched and every domain with data was taken.
    pub fallback: bool,
}

/// OR-of-substrings classifier over per-domain keyword tables.
#[derive(Debug, Clone)]
pub struct TopicClassifier {
    tables: Vec<(Domain, Vec<String>)>,
}

impl Default for TopicClassifier {
    fn default() -> Self {
        Self::with_tables(DEFAULT_KEYWORDS)
    }
}

impl TopicClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a classifier from custom keyword tables.
    pub fn with_tables(tables: &[KeywordTable]) -> Self {
        Self {
            tables: tables
                .iter()
                .map(|t| {
                    (
                        t.domain,
                        t.keywords.iter().map(|k| k.to_lowercase()).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Add extra keywords for a domain (e.g. from configuration).
    pub fn extend(&mut self, domain: Domain, keywords: &[String]) {
        let extra = keywords.iter().map(|k| k.to_lowercase()).filter(|k| !k.is_empty());
        match self.tables.iter_mut().find(|(d, _)| *d == domain) {
            Some((_, existing)) => existing.extend(extra),
            None => self.tables.push((domain, extra.collect())),
        }
    }

    /// Domains with at least one keyword hit, without fallback.
    pub fn matched_domains(&self, question: &str) -> Vec<Domain> {
        let lower = question.to_lowercase();

        Domain::ALL
            .into_iter()
            .filter(|domain| {
                self.tables
                    .iter()
                    .filter(|(d, _)| d == domain)
                    .flat_map(|(_, keywords)| keywords.iter())
                    .any(|k| lower.contains(k.as_str()))
            })
            .collect()
    }

    /// Select domains for a question, falling back to every domain with data.
    pub fn classify(&self, question: &str, store: &RecordStore) -> Selection {
        let matched = self.matched_domains(question);

        if !matched.is_empty() {
            debug!("Question matched domains: {:?}", matched);
            return Selection {
                domains: matched,
                fallback: false,
            };
        }

        let domains: Vec<Domain> = Domain::ALL
            .into_iter()
            .filter(|d| store.has_records(*d))
            .collect();
        debug!("No keyword matched, falling back to {:?}", domains);

        Selection {
            domains,
            fallback: true,
        }
    }
}
