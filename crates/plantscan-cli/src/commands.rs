//! Command handlers

use crate::cli::{Cli, Commands, ObservationArgs};
use crate::output::{output_assessment, output_batch, output_chat, BatchEntry};
use indicatif::{ProgressBar, ProgressStyle};
use plantscan_app::app::AnalysisService;
use plantscan_app::config::Config;
use plantscan_app::scanner::{
    mime_type_for_path, observation_date_from_bytes, read_image, scan_directory,
};
use plantscan_types::{
    AnalysisRequest, ChatContext, Error, ImagePayload, OutputFormat, PlantAssessment, Result,
};
use plantscan_vision::Dialect;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub async fn execute(cli: Cli) -> Result<()> {
    if let Commands::Config {
        show,
        set_endpoint,
        set_model,
        set_key,
        set_dialect,
        set_region,
        set_output,
        set_confidence,
        reset,
    } = cli.command
    {
        return cmd_config(ConfigUpdate {
            show,
            endpoint: set_endpoint,
            model: set_model,
            api_key: set_key,
            dialect: set_dialect,
            region: set_region,
            output_format: set_output,
            include_confidence: set_confidence,
            reset,
        });
    }

    // Load config
    let mut config = Config::load()?;

    // Override from CLI args
    if let Some(ref model) = cli.model {
        config.model = model.clone();
    }
    if let Some(ref endpoint) = cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    let output_format = cli.format.unwrap_or(config.output_format);

    match cli.command {
        Commands::Analyze {
            image,
            observation,
            mime,
        } => cmd_analyze(&config, &image, &observation, mime, output_format).await,

        Commands::Batch {
            folder,
            observation,
            output,
            jobs,
        } => {
            // 0 or unset = auto CPU count
            let job_count = match jobs {
                Some(0) | None => num_cpus::get(),
                Some(n) => n,
            };
            cmd_batch(&config, &folder, &observation, output, job_count, output_format).await
        }

        Commands::Chat {
            question,
            species,
            region,
            invasive,
            role,
        } => {
            let context = if species.is_none() && region.is_none() && invasive.is_none() && role.is_none() {
                None
            } else {
                Some(ChatContext {
                    species,
                    region,
                    is_invasive: invasive,
                    role: role.unwrap_or_default(),
                })
            };
            cmd_chat(&config, &question, context, output_format).await
        }

        Commands::Config { .. } => Ok(()),
    }
}

/// Read an image and attach its observation context
fn build_request(path: &Path, observation: &ObservationArgs, mime: Option<String>) -> Result<AnalysisRequest> {
    let bytes = read_image(path)?;

    let date = observation.date.or_else(|| {
        if observation.no_exif {
            None
        } else {
            observation_date_from_bytes(&bytes)
        }
    });
    let mime = mime.or_else(|| mime_type_for_path(path));

    let mut request = AnalysisRequest::new(ImagePayload::Raw(bytes));
    if let Some(mime) = mime {
        request = request.with_mime_type(mime);
    }
    if let Some(ref region) = observation.region {
        request = request.with_region(region.clone());
    }
    if let Some(date) = date {
        debug!(path = %path.display(), %date, "observation date");
        request = request.with_date(date);
    }
    if let Some(season) = observation.season {
        request = request.with_season(season);
    }
    Ok(request)
}

/// `build_request` on the blocking pool; file reads and EXIF parsing stay off the async workers
async fn load_request(
    path: PathBuf,
    observation: Arc<ObservationArgs>,
    mime: Option<String>,
) -> Result<AnalysisRequest> {
    tokio::task::spawn_blocking(move || build_request(&path, &observation, mime))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

async fn cmd_analyze(
    config: &Config,
    image: &Path,
    observation: &ObservationArgs,
    mime: Option<String>,
    output_format: OutputFormat,
) -> Result<()> {
    let request = load_request(image.to_path_buf(), Arc::new(observation.clone()), mime).await?;
    let service = AnalysisService::from_config(config.clone())?;

    let assessment = service.analyze_image(request).await?;
    output_assessment(output_format, &assessment)
}

async fn analyze_path(
    service: &AnalysisService,
    path: &Path,
    observation: &Arc<ObservationArgs>,
) -> Result<PlantAssessment> {
    let request = load_request(path.to_path_buf(), Arc::clone(observation), None).await?;
    service.analyze_image(request).await
}

async fn cmd_batch(
    config: &Config,
    folder: &Path,
    observation: &ObservationArgs,
    output: Option<PathBuf>,
    jobs: usize,
    output_format: OutputFormat,
) -> Result<()> {
    // Fail once up front instead of once per image
    config.credentials()?;

    let images = scan_directory(folder)?;
    if images.is_empty() {
        return Err(Error::FileNotFound(format!(
            "No images found in {}",
            folder.display()
        )));
    }

    let total_images = images.len();
    debug!(total_images, jobs, "starting batch analysis");

    let pb = ProgressBar::new(total_images as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let service = Arc::new(AnalysisService::from_config(config.clone())?);
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let observation = Arc::new(observation.clone());

    let mut handles = Vec::with_capacity(total_images);
    for path in images {
        let service = Arc::clone(&service);
        let semaphore = Arc::clone(&semaphore);
        let observation = Arc::clone(&observation);
        let pb = pb.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                pb.set_message(name.to_string());
            }
            let result = analyze_path(&service, &path, &observation).await;
            pb.inc(1);
            (path, result)
        }));
    }

    let mut entries = Vec::with_capacity(total_images);
    for handle in handles {
        match handle.await {
            Ok((path, result)) => {
                let image = path.display().to_string();
                entries.push(match result {
                    Ok(assessment) => BatchEntry {
                        image,
                        assessment: Some(assessment),
                        error: None,
                    },
                    Err(e) => {
                        warn!(%image, error = %e, "image skipped");
                        BatchEntry {
                            image,
                            assessment: None,
                            error: Some(e.to_string()),
                        }
                    }
                });
            }
            Err(e) => warn!(error = %e, "analysis task failed"),
        }
    }

    pb.finish_with_message("Complete");

    if let Some(output) = output {
        let content = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&output, content)?;
        eprintln!("Results saved to: {}", output.display());
        if output_format == OutputFormat::Table {
            output_batch(output_format, &entries)?;
        }
        return Ok(());
    }

    output_batch(output_format, &entries)
}

async fn cmd_chat(
    config: &Config,
    question: &str,
    context: Option<ChatContext>,
    output_format: OutputFormat,
) -> Result<()> {
    let service = AnalysisService::from_config(config.clone())?;
    let reply = service.chat(question, context.as_ref()).await?;
    output_chat(output_format, question, &reply)
}

struct ConfigUpdate {
    show: bool,
    endpoint: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    dialect: Option<String>,
    region: Option<String>,
    output_format: Option<OutputFormat>,
    include_confidence: Option<bool>,
    reset: bool,
}

fn parse_dialect(value: &str) -> Result<Option<Dialect>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "auto" => Ok(None),
        "chat-completions" | "openai" => Ok(Some(Dialect::ChatCompletions)),
        "generate-content" | "gemini" => Ok(Some(Dialect::GenerateContent)),
        other => Err(Error::InvalidCallSpec(format!(
            "unknown dialect '{}' (expected chat-completions, generate-content or auto)",
            other
        ))),
    }
}

fn cmd_config(update: ConfigUpdate) -> Result<()> {
    let path = Config::config_path()?;

    if update.reset {
        let config = Config::default();
        config.save_to(&path)?;
        println!("Configuration reset to defaults");
        println!("\n{}", config);
        return Ok(());
    }

    // File contents only; environment overrides must not be persisted
    let mut config = Config::load_from(&path)?;
    let mut modified = false;

    if let Some(endpoint) = update.endpoint {
        config.endpoint = endpoint;
        modified = true;
    }

    if let Some(model) = update.model {
        config.model = model;
        modified = true;
    }

    if let Some(api_key) = update.api_key {
        config.api_key = Some(api_key).filter(|k| !k.trim().is_empty());
        modified = true;
    }

    if let Some(dialect) = update.dialect {
        config.dialect = parse_dialect(&dialect)?;
        modified = true;
    }

    if let Some(region) = update.region {
        config.default_region = region;
        modified = true;
    }

    if let Some(output_format) = update.output_format {
        config.output_format = output_format;
        modified = true;
    }

    if let Some(include_confidence) = update.include_confidence {
        config.include_confidence = include_confidence;
        modified = true;
    }

    if modified {
        config.save_to(&path)?;
        println!("Configuration updated");
    }

    if update.show || !modified {
        println!("{}", config);
    }

    Ok(())
}
