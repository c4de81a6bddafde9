// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use waste_detector::{
    api::{create_app, start_server, AppState},
    config::{check_input_geometry, ServerArgs},
    results::ResultStore,
    version,
    vision::{Annotator, ClassNames, DetectionPipeline, OnnxDetectionModel},
};

#[tokio::main]
async fn main() -> Result<()> {
    // .env values are picked up by clap's env fallbacks
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = ServerArgs::parse();
    args.validate()?;

    println!("🚀 Starting Waste Detector...\n");
    println!("📦 BUILD VERSION: {}", version::VERSION);
    println!("📅 Build Date: {}", version::BUILD_DATE);
    println!("🔧 Features: {}", version::FEATURES.join(", "));
    println!();
    info!("{}", version::get_version_string());

    // Model is loaded once; the process refuses to start without it
    println!("🧠 Loading detection model...");
    let model = OnnxDetectionModel::load(&args.model_path, &args.model_options())
        .context("Failed to load detection model")?;

    let stride = args.resolve_stride(model.metadata_stride());
    check_input_geometry(args.input_size, stride)?;

    let num_classes = model
        .warm_up(args.input_size)
        .context("Detection model warm-up failed")?;

    let class_names = ClassNames::resolve(
        args.labels.as_deref(),
        model.metadata_names(),
        num_classes,
    )
    .context("Failed to load class names")?;

    println!(
        "✅ Model ready on {} ({} classes, input {}, stride {})",
        model.device(),
        class_names.len(),
        args.input_size,
        stride
    );

    let store = ResultStore::open(&args.results_dir).with_context(|| {
        format!(
            "Failed to prepare results directory {}",
            args.results_dir.display()
        )
    })?;
    info!("Results directory: {}", store.dir().display());

    let annotator = Annotator::new().context("Failed to load label font")?;

    let pipeline = DetectionPipeline::new(Arc::new(model), class_names, annotator, store)
        .with_letterbox(args.letterbox_config(stride))
        .with_postprocess(args.postprocess_config());

    let app = create_app(AppState::new(pipeline, args.max_upload_bytes));

    println!("🌐 Serving on http://{}", args.socket_addr());
    start_server(args.socket_addr(), app).await
}
