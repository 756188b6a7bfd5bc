//! Caller-facing analysis service.
//!
//! Ties the store, classifier, aggregator, chart renderer and generation
//! collaborator together. Every public operation returns a typed outcome;
//! generation failures never escape as errors.

use crate::analysis::aggregator::{
    entity_breakdown, summarize, Aggregate, AggregateSummary, EntityBreakdown,
};
use crate::analysis::charts::{ChartRenderer, ChartSet};
use crate::analysis::classifier::TopicClassifier;
use crate::analysis::context::{
    failure_message, no_data_message, render_prompt, ContextAssembler, ContextBundle,
};
use crate::error::GenerationError;
use crate::llm::{ConversationMemory, Generator};
use crate::models::{
    BatchKey, FeedbackRecord, InventoryRecord, Language, ProductionRecord, RecordBatch,
    SalesRecord,
};
use crate::store::{RecordStore, Stored};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Caller id used when none is given.
pub const DEFAULT_USER: &str = "default_user";

/// Tunables for the service.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Trailing window for domain summaries.
    pub window_months: u32,
    pub language: Language,
    /// Deadline for a single generation attempt.
    pub deadline: Duration,
    /// Extra attempts after a failed generation.
    pub retries: usize,
    /// Replaces the built-in analyst preamble.
    pub system_prompt: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            window_months: 1,
            language: Language::Zh,
            deadline: Duration::from_secs(120),
            retries: 0,
            system_prompt: None,
        }
    }
}

/// Result of a plain analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Narrative(String),
    /// Nothing relevant is stored; the generator was not called.
    NoData(String),
    /// Generation failed; carries the generic guidance message.
    Failed(String),
}

/// Outcome of a plain analysis and the bundle its prompt was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub outcome: AnalysisOutcome,
    pub context: ContextBundle,
}

/// Narrative plus chart series and the bundle that fed them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartedAnalysis {
    pub narrative: String,
    pub charts: ChartSet,
    pub context: ContextBundle,
}

/// Result of an analysis with charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum ChartedOutcome {
    Complete(ChartedAnalysis),
    NoData(String),
    Failed(String),
}

/// Full-history summary and breakdown of one domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainDashboard {
    pub summary: AggregateSummary,
    pub breakdown: EntityBreakdown,
}

/// Unwindowed snapshot of every domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub production: DomainDashboard,
    pub sales: DomainDashboard,
    pub inventory: DomainDashboard,
    pub feedback: DomainDashboard,
    pub last_updated: NaiveDateTime,
}

/// The analysis engine.
pub struct AnalysisService {
    store: Arc<RecordStore>,
    classifier: TopicClassifier,
    generator: Arc<dyn Generator>,
    memory: ConversationMemory,
    settings: ServiceSettings,
    default_user: String,
}

impl AnalysisService {
    pub fn new(
        store: Arc<RecordStore>,
        generator: Arc<dyn Generator>,
        memory: ConversationMemory,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            classifier: TopicClassifier::new(),
            generator,
            memory,
            settings,
            default_user: DEFAULT_USER.to_string(),
        }
    }

    /// Caller id used by [`analyze`](Self::analyze) and
    /// [`analyze_with_charts`](Self::analyze_with_charts).
    pub fn with_default_user(mut self, user_id: impl Into<String>) -> Self {
        self.default_user = user_id.into();
        self
    }

    pub fn default_user(&self) -> &str {
        &self.default_user
    }

    /// Replace the topic classifier (e.g. with extra keywords).
    pub fn with_classifier(mut self, classifier: TopicClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// Hand a typed batch over to the store.
    pub fn submit_batch(&self, batch: RecordBatch) -> BatchKey {
        if batch.is_empty() {
            warn!("Submitting an empty {} batch", batch.domain());
        }
        self.store.submit(batch)
    }

    /// Context bundle for a question as of now.
    pub fn build_context(&self, question: &str) -> ContextBundle {
        ContextAssembler::new(&self.store, &self.classifier, self.settings.window_months)
            .build_context(question, Local::now().naive_local())
    }

    /// Answer a question for the default caller.
    pub async fn analyze(&self, question: &str) -> Analysis {
        self.analyze_as(&self.default_user, question).await
    }

    /// Answer a question, remembering the exchange under `user_id`.
    pub async fn analyze_as(&self, user_id: &str, question: &str) -> Analysis {
        info!("Starting analysis for {}: {}", user_id, question);

        let context = self.build_context(question);
        if context.is_empty() {
            info!("No relevant data for question");
            return Analysis {
                outcome: AnalysisOutcome::NoData(no_data_message(self.settings.language).to_string()),
                context,
            };
        }

        let outcome = match self.narrate(question, &context).await {
            Ok(narrative) => {
                self.memory.record(user_id, question, &narrative);
                AnalysisOutcome::Narrative(narrative)
            }
            Err(e) => {
                error!("Analysis failed: {}", e);
                AnalysisOutcome::Failed(failure_message(self.settings.language).to_string())
            }
        };
        Analysis { outcome, context }
    }

    /// Answer a question for the default caller and attach chart series.
    pub async fn analyze_with_charts(&self, question: &str) -> ChartedOutcome {
        self.analyze_with_charts_as(&self.default_user, question).await
    }

    pub async fn analyze_with_charts_as(&self, user_id: &str, question: &str) -> ChartedOutcome {
        info!("Starting charted analysis for {}: {}", user_id, question);

        let bundle = self.build_context(question);
        if bundle.is_empty() {
            info!("No relevant data for question");
            return ChartedOutcome::NoData(no_data_message(self.settings.language).to_string());
        }

        let charts = ChartRenderer::new(&self.store, self.settings.language).render(&bundle);

        match self.narrate(question, &bundle).await {
            Ok(narrative) => {
                self.memory.record(user_id, question, &narrative);
                ChartedOutcome::Complete(ChartedAnalysis {
                    narrative,
                    charts,
                    context: bundle,
                })
            }
            Err(e) => {
                error!("Analysis failed: {}", e);
                ChartedOutcome::Failed(failure_message(self.settings.language).to_string())
            }
        }
    }

    /// Full-history summaries and breakdowns for every domain.
    pub fn dashboard_snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            production: self.domain_dashboard::<ProductionRecord>(),
            sales: self.domain_dashboard::<SalesRecord>(),
            inventory: self.domain_dashboard::<InventoryRecord>(),
            feedback: self.domain_dashboard::<FeedbackRecord>(),
            last_updated: Local::now().naive_local(),
        }
    }

    /// Discard every stored batch. Conversation memory is kept.
    pub fn clear_all(&self) {
        self.store.clear_all();
    }

    fn domain_dashboard<R: Stored + Aggregate>(&self) -> DomainDashboard {
        let records = self.store.all_records::<R>();
        DomainDashboard {
            summary: summarize(&records),
            breakdown: entity_breakdown(&records),
        }
    }

    async fn narrate(&self, question: &str, bundle: &ContextBundle) -> Result<String, GenerationError> {
        let prompt = render_prompt(
            question,
            bundle,
            self.settings.language,
            self.settings.system_prompt.as_deref(),
        );
        info!(
            "Built analysis prompt from {} context entries",
            bundle.len()
        );
        self.generate_with_deadline(&prompt).await
    }

    /// Call the generator, bounding each attempt by the deadline.
    async fn generate_with_deadline(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut attempt = 0;

        loop {
            let result = match tokio::time::timeout(self.settings.deadline, self.generator.generate(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout {
                    seconds: self.settings.deadline.as_secs(),
                }),
            };
            let result = result.and_then(|text| {
                if text.trim().is_empty() {
                    Err(GenerationError::EmptyResponse)
                } else {
                    Ok(text)
                }
            });

            match result {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.settings.retries => {
                    attempt += 1;
                    warn!("Generation attempt {} failed: {}. Retrying...", attempt, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportError;
    use crate::import;
    use crate::models::Domain;
    use async_trait::async_trait;
    use serde_json::json;
    use std::io::Write;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    enum Behaviour {
        Echo,
        Fail,
        Empty,
        Stall,
        FailOnce,
    }

    struct ScriptedGenerator {
        behaviour: Behaviour,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());

            match self.behaviour {
                Behaviour::Echo => Ok("narrative".to_string()),
                Behaviour::Fail => Err(GenerationError::Http {
                    status: 500,
                    body: "boom".to_string(),
                }),
                Behaviour::Empty => Ok("   ".to_string()),
                Behaviour::Stall => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("too late".to_string())
                }
                Behaviour::FailOnce if call == 0 => Err(GenerationError::EmptyResponse),
                Behaviour::FailOnce => Ok("second try".to_string()),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn service(generator: Arc<ScriptedGenerator>, settings: ServiceSettings) -> AnalysisService {
        AnalysisService::new(
            Arc::new(RecordStore::new()),
            generator,
            ConversationMemory::default(),
            settings,
        )
    }

    fn recent_production(name: &str, qty: i64, defects: i64) -> ProductionRecord {
        let now = Local::now().naive_local();
        ProductionRecord {
            id: 1,
            product_name: name.to_string(),
            produced_qty: qty,
            defective_qty: defects,
            production_line: "L1".to_string(),
            unit_cost: 3.0,
            efficiency_rate: 88.0,
            produced_at: Some(now - chrono::Duration::days(1)),
            imported_at: now,
        }
    }

    #[tokio::test]
    async fn test_empty_store_returns_guidance_without_generating() {
        let generator = ScriptedGenerator::new(Behaviour::Echo);
        let service = service(generator.clone(), ServiceSettings::default());

        let outcome = service.analyze("How is production going?").await.outcome;

        assert_eq!(
            outcome,
            AnalysisOutcome::NoData(no_data_message(Language::Zh).to_string())
        );
        assert_eq!(generator.calls(), 0);
        assert_eq!(service.memory().info(DEFAULT_USER).message_count, 0);
    }

    #[tokio::test]
    async fn test_analyze_sends_prompt_and_remembers() {
        let generator = ScriptedGenerator::new(Behaviour::Echo);
        let service = service(generator.clone(), ServiceSettings::default());
        service.submit_batch(RecordBatch::Production(vec![recent_production("Widget", 100, 5)]));

        let analysis = service.analyze_as("alice", "defect rate?").await;

        assert_eq!(analysis.outcome, AnalysisOutcome::Narrative("narrative".to_string()));
        assert_eq!(analysis.context.domains(), vec![Domain::Production]);
        assert_eq!(generator.calls(), 1);
        let prompt = generator.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("defectRatePercent=5.00"));
        assert_eq!(service.memory().info("alice").message_count, 2);
    }

    #[tokio::test]
    async fn test_generation_failure_becomes_generic_message() {
        let generator = ScriptedGenerator::new(Behaviour::Fail);
        let service = service(
            generator.clone(),
            ServiceSettings {
                language: Language::En,
                ..ServiceSettings::default()
            },
        );
        service.submit_batch(RecordBatch::Production(vec![recent_production("A", 1, 0)]));

        let outcome = service.analyze("production").await.outcome;
        assert_eq!(
            outcome,
            AnalysisOutcome::Failed(failure_message(Language::En).to_string())
        );
        assert_eq!(service.memory().user_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_generation_is_a_failure() {
        let generator = ScriptedGenerator::new(Behaviour::Empty);
        let service = service(generator, ServiceSettings::default());
        service.submit_batch(RecordBatch::Production(vec![recent_production("A", 1, 0)]));

        assert!(matches!(
            service.analyze("production").await.outcome,
            AnalysisOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_stalled_generation_hits_deadline() {
        let generator = ScriptedGenerator::new(Behaviour::Stall);
        let service = service(
            generator,
            ServiceSettings {
                deadline: Duration::from_millis(50),
                ..ServiceSettings::default()
            },
        );
        service.submit_batch(RecordBatch::Production(vec![recent_production("A", 1, 0)]));

        assert!(matches!(
            service.analyze("production").await.outcome,
            AnalysisOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_one_failure() {
        let generator = ScriptedGenerator::new(Behaviour::FailOnce);
        let service = service(
            generator.clone(),
            ServiceSettings {
                retries: 1,
                ..ServiceSettings::default()
            },
        );
        service.submit_batch(RecordBatch::Production(vec![recent_production("A", 1, 0)]));

        assert_eq!(
            service.analyze("production").await.outcome,
            AnalysisOutcome::Narrative("second try".to_string())
        );
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_analyze_with_charts() {
        let generator = ScriptedGenerator::new(Behaviour::Echo);
        let service = service(generator, ServiceSettings::default());
        service.submit_batch(RecordBatch::Production(vec![
            recent_production("A", 50, 0),
            recent_production("B", 50, 10),
        ]));

        let ChartedOutcome::Complete(result) = service.analyze_with_charts("缺陷").await else {
            panic!("expected a complete analysis");
        };

        assert_eq!(result.narrative, "narrative");
        assert_eq!(result.charts["defectRate"].categories, vec!["A", "B"]);
        assert_eq!(result.charts["defectRate"].values, vec![0.0, 20.0]);
        assert!(result.context.get("productionDataDetail").is_some());
    }

    #[tokio::test]
    async fn test_charted_no_data() {
        let generator = ScriptedGenerator::new(Behaviour::Echo);
        let service = service(generator.clone(), ServiceSettings::default());

        assert!(matches!(
            service.analyze_with_charts("sales").await,
            ChartedOutcome::NoData(_)
        ));
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn test_dashboard_is_unwindowed() {
        let generator = ScriptedGenerator::new(Behaviour::Echo);
        let service = service(generator, ServiceSettings::default());
        let mut old = recent_production("Old", 10, 1);
        old.produced_at = Some(Local::now().naive_local() - chrono::Duration::days(400));
        service.submit_batch(RecordBatch::Production(vec![old, recent_production("New", 30, 0)]));

        let snapshot = service.dashboard_snapshot();
        let AggregateSummary::Production(summary) = &snapshot.production.summary else {
            panic!("expected production summary");
        };
        assert_eq!(summary.total_quantity, 40);
        assert_eq!(snapshot.production.breakdown.entity_keys(), vec!["Old", "New"]);
        assert_eq!(snapshot.sales.summary.record_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_all_then_no_data() {
        let generator = ScriptedGenerator::new(Behaviour::Echo);
        let service = service(generator, ServiceSettings::default());
        service.submit_batch(RecordBatch::Production(vec![recent_production("A", 1, 0)]));

        service.clear_all();

        assert!(service.build_context("production").is_empty());
        assert!(matches!(
            service.analyze("anything").await.outcome,
            AnalysisOutcome::NoData(_)
        ));
        assert_eq!(service.dashboard_snapshot().production.breakdown.total_records, 0);
    }

    #[tokio::test]
    async fn test_default_user_owns_memory() {
        let generator = ScriptedGenerator::new(Behaviour::Echo);
        let service =
            service(generator, ServiceSettings::default()).with_default_user("carol");
        service.submit_batch(RecordBatch::Production(vec![recent_production("A", 1, 0)]));

        service.analyze("production").await;
        service.analyze_with_charts("production").await;

        assert_eq!(service.default_user(), "carol");
        assert_eq!(service.memory().info("carol").message_count, 4);
        assert_eq!(service.memory().info(DEFAULT_USER).message_count, 0);
    }

    #[test]
    fn test_imported_file_is_submitted() {
        let generator = ScriptedGenerator::new(Behaviour::Echo);
        let service = service(generator, ServiceSettings::default());
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            json!([
                ["C1", "Widget", "投诉", "late", 1, "2024-05-02", "已关闭", "紧急"],
                ["C2", "Widget", "建议", "colours", 4, "2024-05-03", "resolved", "low"]
            ])
        )
        .unwrap();

        let report = import::import_file(&service, Domain::Feedback, file.path()).unwrap();

        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.batch_key.domain, Domain::Feedback);
        assert_eq!(service.store().record_count(Domain::Feedback), 2);
        assert!(matches!(
            import::import_detected(&service, Path::new("notes.json")),
            Err(ImportError::UnknownDomain { .. })
        ));
    }
}
