use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use newscode_lib::{
    codebook::{load_codebook, Codebook, ConfigIssue},
    config::{EngineConfig, ModelSettings, PipelineConfig},
    core::{
        errors::{AppError, AppResult},
        types::{BatchDocument, SourceDocument},
    },
    db::Database,
    engine::{audit::audit_result, DependencyMap, ResultAssembler},
    init_tracing,
    pipeline::BatchExecutor,
    providers::{ollama::OllamaClient, ModelClient},
};

#[derive(Parser, Debug)]
#[command(name = "newscode", version, about = "Codebook-conformant news classification with a language model")]
struct Cli {
    #[arg(long, global = true, help = "Fail when any codebook entry is malformed")]
    strict_config: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a JSONL file of articles with the model.
    Analyze {
        #[arg(long)]
        codebook: PathBuf,
        #[arg(long, help = "JSONL input, one {\"id\"?, \"title\", \"body\"} per line")]
        input: PathBuf,
        #[arg(long = "section", help = "Section to analyse; repeat for several (default: all)")]
        sections: Vec<String>,
        #[arg(long, help = "SQLite result store")]
        db: Option<PathBuf>,
        #[arg(long, help = "JSONL output file (default: stdout)")]
        output: Option<PathBuf>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        ollama_url: Option<String>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[arg(long, default_value_t = false)]
        strict_evidence: bool,
    },
    /// Run the engine offline on a saved model answer.
    Validate {
        #[arg(long)]
        codebook: PathBuf,
        #[arg(long)]
        section: String,
        #[arg(long, help = "File holding the raw model answer")]
        answer: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body_file: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        strict_evidence: bool,
    },
    /// Load a codebook and print its sections and load issues.
    Codebook {
        #[arg(long)]
        codebook: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let payload = serde_json::to_string(&err).unwrap_or_else(|_| err.to_string());
            eprintln!("{payload}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    match cli.command {
        Commands::Analyze {
            codebook,
            input,
            sections,
            db,
            output,
            model,
            ollama_url,
            concurrency,
            timeout_secs,
            strict_evidence,
        } => {
            let (codebook, _) = open_codebook(&codebook, cli.strict_config)?;
            let assembler = Arc::new(build_assembler(codebook, strict_evidence)?);
            let documents = read_documents(&input).await?;
            let pipeline = PipelineConfig::from_env().with_overrides(concurrency, timeout_secs);
            let settings = ModelSettings::from_env().with_overrides(model, ollama_url);
            let client: Arc<dyn ModelClient> = Arc::new(OllamaClient::new(&settings, pipeline.timeout)?);
            let database = match db {
                Some(path) => Some(Database::open(&path).await?),
                None => None,
            };

            let mut sink: Box<dyn Write + Send> = match output.as_deref() {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(BufWriter::new(std::io::stdout())),
            };
            let mut write_error: Option<std::io::Error> = None;

            let executor = BatchExecutor::new(assembler, client, pipeline);
            let run_id = uuid::Uuid::new_v4().to_string();
            let summary = executor
                .run(database.as_ref(), run_id, &documents, &sections, |analysis| {
                    if write_error.is_some() {
                        return;
                    }
                    let line = json!({
                        "documentId": analysis.document_id,
                        "section": analysis.section,
                        "result": analysis.result,
                    });
                    if let Err(err) = writeln!(sink, "{line}") {
                        write_error = Some(err);
                    }
                })
                .await?;
            if let Some(err) = write_error {
                return Err(err.into());
            }
            sink.flush()?;
            if output.is_some() {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Ok(())
        }
        Commands::Validate {
            codebook,
            section,
            answer,
            title,
            body_file,
            strict_evidence,
        } => {
            let (codebook, _) = open_codebook(&codebook, cli.strict_config)?;
            let assembler = build_assembler(codebook, strict_evidence)?;
            let raw = tokio::fs::read_to_string(&answer).await?;
            let body = match body_file {
                Some(path) => tokio::fs::read_to_string(&path).await?,
                None => String::new(),
            };
            let document = SourceDocument::new(title, body);
            let result = assembler.analyze(&section, Some(&raw), &document)?;
            let audit = audit_result(
                assembler.codebook().require_section(&section)?,
                assembler.dependencies(),
                &document,
                &result,
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "result": result, "audit": audit }))?
            );
            Ok(())
        }
        Commands::Codebook { codebook } => {
            let (codebook, issues) = open_codebook(&codebook, cli.strict_config)?;
            let dependencies = DependencyMap::from_codebook_or_default(&codebook)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&describe_codebook(&codebook, &issues, &dependencies))?
            );
            Ok(())
        }
    }
}

fn open_codebook(path: &Path, strict: bool) -> AppResult<(Codebook, Vec<ConfigIssue>)> {
    let (codebook, issues) = load_codebook(path)?;
    if strict {
        if let Some(issue) = issues.first() {
            return Err(issue.clone().into_error());
        }
    }
    if codebook.is_empty() {
        return Err(AppError::ConfigMalformed(format!(
            "{} defines no classification sections",
            path.display()
        )));
    }
    Ok((codebook, issues))
}

fn build_assembler(codebook: Codebook, strict_evidence: bool) -> AppResult<ResultAssembler> {
    let dependencies = DependencyMap::from_codebook_or_default(&codebook)?;
    let mut config = EngineConfig::from_env();
    config.strict_evidence |= strict_evidence;
    Ok(ResultAssembler::new(
        Arc::new(codebook),
        Arc::new(dependencies),
        config,
    ))
}

async fn read_documents(path: &Path) -> AppResult<Vec<BatchDocument>> {
    let text = tokio::fs::read_to_string(path).await?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<BatchDocument>(line)
                .map_err(|err| AppError::InvalidInput(format!("{} line {}: {err}", path.display(), idx + 1)))
        })
        .collect()
}

fn describe_codebook(
    codebook: &Codebook,
    issues: &[ConfigIssue],
    dependencies: &DependencyMap,
) -> serde_json::Value {
    let sections: Vec<serde_json::Value> = codebook
        .sections()
        .map(|section| {
            let variables: Vec<serde_json::Value> = section
                .variables()
                .iter()
                .map(|variable| {
                    let (map, source) = section.lookup_with_source(variable);
                    json!({
                        "name": variable,
                        "source": source,
                        "freeText": section.is_free_text(variable),
                        "negativeCode": map.negative_code(),
                        "codes": map.entries().map(|(code, label)| json!([code, label])).collect::<Vec<_>>(),
                    })
                })
                .collect();
            json!({ "name": section.name(), "variables": variables })
        })
        .collect();
    json!({
        "sections": sections,
        "dependencies": dependencies.edges(),
        "issues": issues,
    })
}
