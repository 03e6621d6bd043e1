use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};

use crate::{
    codebook::Section,
    config::PipelineConfig,
    core::{
        errors::AppResult,
        types::{BatchDocument, BatchSummary, DocumentAnalysis},
    },
    db::{repositories::analyses, Database},
    engine::{prompts::section_prompt, ResultAssembler},
    providers::ModelClient,
};

#[derive(Clone)]
pub struct BatchExecutor {
    assembler: Arc<ResultAssembler>,
    client: Arc<dyn ModelClient>,
    config: PipelineConfig,
}

impl BatchExecutor {
    pub fn new(assembler: Arc<ResultAssembler>, client: Arc<dyn ModelClient>, config: PipelineConfig) -> Self {
        Self {
            assembler,
            client,
            config,
        }
    }

    /// One model call under the configured timeout, then the engine. A failed or
    /// timed-out call still yields a complete (defaulted) result.
    pub async fn analyze_document(
        &self,
        document_id: &str,
        document: &BatchDocument,
        section: &Section,
    ) -> DocumentAnalysis {
        let started = Instant::now();
        let prompt = section_prompt(section, &document.document);
        let answer = tokio::time::timeout(self.config.timeout, self.client.complete(&prompt)).await;

        let result = match answer {
            Ok(Ok(raw)) => self.assembler.assemble(section, Some(&raw), &document.document),
            Ok(Err(err)) => {
                let retryable = err.retryable();
                tracing::warn!(
                    %document_id,
                    section = %section.name(),
                    code = err.code(),
                    retryable,
                    "model call failed: {err}"
                );
                let reason = if retryable {
                    format!("{err} (retryable)")
                } else {
                    err.to_string()
                };
                self.assembler
                    .assemble_unavailable(section, &document.document, &reason)
            }
            Err(_) => {
                tracing::warn!(
                    %document_id,
                    section = %section.name(),
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "model call timed out"
                );
                self.assembler.assemble_unavailable(
                    section,
                    &document.document,
                    &format!("model call timed out after {:?}", self.config.timeout),
                )
            }
        };

        DocumentAnalysis {
            document_id: document_id.to_string(),
            section: section.name().to_string(),
            result,
            latency_ms: started.elapsed().as_millis() as i64,
        }
    }

    /// Analyses every document against every requested section (all sections when
    /// `sections` is empty). Results reach `on_result` as they complete.
    pub async fn run<F>(
        &self,
        db: Option<&Database>,
        run_id: String,
        documents: &[BatchDocument],
        sections: &[String],
        mut on_result: F,
    ) -> AppResult<BatchSummary>
    where
        F: FnMut(&DocumentAnalysis) + Send,
    {
        let codebook = self.assembler.codebook();
        let selected: Vec<&Section> = if sections.is_empty() {
            codebook.sections().collect()
        } else {
            sections
                .iter()
                .map(|name| codebook.require_section(name))
                .collect::<AppResult<_>>()?
        };

        if let Some(db) = db {
            analyses::create_run(db.pool(), &run_id, self.client.model_name()).await?;
        }

        let started = Instant::now();
        tracing::info!(
            %run_id,
            documents = documents.len(),
            sections = selected.len(),
            concurrency = self.config.concurrency,
            "batch started"
        );

        let jobs = documents.iter().flat_map(|document| {
            let document_id = document.document_id();
            selected
                .iter()
                .map(move |section| (document_id.clone(), document, *section))
        });
        let mut results = stream::iter(jobs)
            .map(|(document_id, document, section)| async move {
                self.analyze_document(&document_id, document, section).await
            })
            .buffer_unordered(self.config.concurrency.max(1));

        let mut section_count = 0usize;
        let mut error_count = 0usize;
        while let Some(analysis) = results.next().await {
            section_count += 1;
            error_count += analysis.result.errors.len();
            on_result(&analysis);
            if let Some(db) = db {
                if let Err(err) = analyses::save_analysis(db.pool(), &run_id, &analysis).await {
                    tracing::error!(%run_id, "persisting analysis failed: {err}");
                    analyses::fail_run(db.pool(), &run_id).await?;
                    return Err(err);
                }
            }
        }

        if let Some(db) = db {
            analyses::complete_run(db.pool(), &run_id).await?;
        }

        let summary = BatchSummary {
            run_id,
            document_count: documents.len(),
            section_count,
            error_count,
            total_latency_ms: started.elapsed().as_millis() as i64,
        };
        tracing::info!(
            run_id = %summary.run_id,
            sections = summary.section_count,
            issues = summary.error_count,
            latency_ms = summary.total_latency_ms,
            "batch finished"
        );
        Ok(summary)
    }
}
