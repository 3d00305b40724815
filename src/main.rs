use std::sync::Arc;

use delay_predictor::{
    config::{DeploymentConfig, ServerSettings},
    load_model,
    server::{self, AppState},
    Predictor, ReferenceStats,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let settings = ServerSettings::from_env()?;
    let cfg = DeploymentConfig::load(&settings.config_path)?;
    let stats = settings
        .stats_path
        .as_deref()
        .map(ReferenceStats::load)
        .transpose()?;

    let model = load_model(&settings.model_path, cfg.input_width())?;

    let predictor = Predictor::from_config(&cfg, model, stats)?;

    // Warmup to make sure the whole path works before taking traffic
    predictor.warmup()?;
    tracing::info!("warmup forward ok");

    tracing::info!(
        "loaded model {}; features[{}]: {:?}",
        predictor.model_name(),
        cfg.features.len(),
        cfg.features.keys()
    );

    let app = server::router(AppState {
        predictor: Arc::new(predictor),
        log_pred: settings.log_pred,
    });

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
