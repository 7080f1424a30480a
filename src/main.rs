use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use course_uploader::infrastructure::{http, storage};
use course_uploader::{
    FieldBinding, FormStateStore, HttpTransferSink, HttpUrlIssuer, InMemoryFormState,
    SelectionMode, TaskSnapshot, UploadCoordinator, UploadSource, UploadStatus, UploaderConfig,
    UrlIssuer,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Uploads course media to pre-signed storage URLs", long_about = None)]
struct Args {
    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Destination path prefix (e.g. "course-banner")
    #[arg(short, long)]
    prefix: String,

    /// Form field receiving the selection
    #[arg(long, default_value = "file")]
    field: String,

    /// Form field receiving the file name -> path mapping
    #[arg(long, default_value = "filePaths")]
    path_field: String,

    /// Select every file of the batch instead of only the first
    #[arg(short, long)]
    multiple: bool,

    /// Issue URLs through the platform API instead of signing directly
    #[arg(long)]
    via_api: bool,

    /// Print the final state as JSON instead of a human summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "course_uploader=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = UploaderConfig::from_env();
    info!(
        "🚀 Course uploader starting [{} file(s), prefix '{}']",
        args.files.len(),
        args.prefix
    );

    let issuer: Arc<dyn UrlIssuer> = if args.via_api {
        info!("🔗 Issuing upload URLs via {}", config.api_base_url);
        Arc::new(HttpUrlIssuer::new(
            http::issuer_client(&config)?,
            &config.api_base_url,
        ))
    } else {
        storage::setup_s3_issuer(&config).await?
    };

    let sink = Arc::new(HttpTransferSink::new(
        http::transfer_client(&config)?,
        &config.content_type,
    ));
    let form = Arc::new(InMemoryFormState::new());

    let mode = if args.multiple {
        SelectionMode::Multiple
    } else {
        SelectionMode::Single
    };
    let binding = FieldBinding::new(&args.field, &args.path_field, &args.prefix, mode);
    let coordinator = UploadCoordinator::new(binding, config, form.clone(), issuer, sink);

    let mut sources = Vec::new();
    for path in &args.files {
        sources.push(UploadSource::from_path(path.clone())?);
    }
    let file_names: Vec<String> = sources.iter().map(|s| s.file_name.clone()).collect();

    let renderer = ProgressRenderer::spawn(&coordinator, &file_names);

    tokio::select! {
        _ = async {
            coordinator.submit_batch(sources).await;
            coordinator.wait_idle().await;
        } => {}
        _ = shutdown_signal() => {
            warn!("🚫 Canceling {} active upload(s)...", coordinator.active_count());
            for name in &file_names {
                coordinator.cancel(name);
            }
            coordinator.wait_idle().await;
        }
    }

    renderer.finish(&coordinator);
    if args.json {
        print_json_report(&coordinator, form.as_ref())?;
    } else {
        print_summary(&coordinator, form.as_ref());
    }
    Ok(())
}

#[derive(Serialize)]
struct RunReport {
    tasks: Vec<TaskSnapshot>,
    paths: HashMap<String, String>,
}

fn print_json_report(
    coordinator: &UploadCoordinator,
    form: &InMemoryFormState,
) -> anyhow::Result<()> {
    let report = RunReport {
        tasks: coordinator.snapshot(),
        paths: form.path_map(&coordinator.binding().path_field),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

struct ProgressRenderer {
    multi: MultiProgress,
    bars: Arc<HashMap<String, ProgressBar>>,
    handle: tokio::task::JoinHandle<()>,
}

impl ProgressRenderer {
    fn spawn(coordinator: &UploadCoordinator, file_names: &[String]) -> Self {
        let multi = MultiProgress::new();
        let mut bars = HashMap::new();
        for name in file_names {
            let pb = multi.add(ProgressBar::new(100));
            pb.set_style(bar_style());
            pb.set_message(name.clone());
            bars.insert(name.clone(), pb);
        }
        let bars = Arc::new(bars);

        let coordinator = coordinator.clone();
        let render_bars = bars.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            loop {
                ticker.tick().await;
                for (name, pb) in render_bars.iter() {
                    if let Some(pct) = coordinator.progress_of(name) {
                        pb.set_position(pct as u64);
                    }
                }
            }
        });

        Self {
            multi,
            bars,
            handle,
        }
    }

    fn finish(self, coordinator: &UploadCoordinator) {
        self.handle.abort();
        for (name, pb) in self.bars.iter() {
            if let Some(pct) = coordinator.progress_of(name) {
                pb.set_position(pct as u64);
            }
            pb.finish();
        }
        self.multi.clear().ok();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg:24} [{bar:40}] {pos:>3}%")
        .unwrap()
        .progress_chars("=>-")
}

fn print_summary(coordinator: &UploadCoordinator, form: &InMemoryFormState) {
    let binding = coordinator.binding();
    let paths = form.path_map(&binding.path_field);

    let mut complete = 0usize;
    let mut failed = 0usize;
    let mut canceled = 0usize;

    println!();
    for task in coordinator.snapshot() {
        match task.status {
            UploadStatus::Complete => {
                complete += 1;
                if let Some(path) = paths.get(&task.file_name) {
                    println!("  ✅ {} -> {}", task.file_name, path);
                }
            }
            UploadStatus::Failed => {
                failed += 1;
                let reason = form
                    .error(&binding.field, &task.file_name)
                    .unwrap_or_else(|| "unknown error".to_string());
                println!("  ❌ {}: {}", task.file_name, reason);
            }
            UploadStatus::Canceled => {
                canceled += 1;
                println!("  🚫 {} (canceled)", task.file_name);
            }
            UploadStatus::InFlight => {
                println!("  ⏳ {} (still in flight)", task.file_name);
            }
        }
    }
    println!(
        "\nDone: {} complete, {} failed, {} canceled",
        complete, failed, canceled
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, canceling uploads...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, canceling uploads...");
        },
    }
}
