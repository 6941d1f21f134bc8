use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use yomicache::{FileServerConfigExt, file_router};
use yomiconfig::{Config, get_config};
use yomikomga::KomgaConfigExt;
use yomischeduler::Scheduler;
use yomisource::{Mirror, MirrorRegistry};

/// Installe le subscriber tracing
///
/// `RUST_LOG` est prioritaire ; sinon le niveau vient de `host.logger.min_level`.
fn init_logging(config: &Config) {
    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "INFO".to_string())
        .to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Configuration et cache ==========
    let config = get_config();
    init_logging(&config);
    info!(config_dir = %config.dir(), "📁 Configuration loaded");

    // sans racine de données, le cache refuse de démarrer : on s'arrête là
    let files = config.create_file_server()?;
    info!(folder = %files.folder().display(), "🗂️ File cache ready");

    // ========== PHASE 2 : Mirrors ==========
    info!("📚 Registering mirrors...");
    let registry = Arc::new(MirrorRegistry::new());

    match config.create_komga_mirror(Some(files.clone())) {
        Ok(komga) => registry.register(komga),
        Err(e) => warn!("⚠️ Failed to register Komga: {}", e),
    }

    let mirrors = registry.list();
    info!("✅ {} mirror(s) registered", mirrors.len());
    for mirror in &mirrors {
        info!("  - {} (enabled: {})", mirror.descriptor().display_name, mirror.is_enabled());
    }

    let scheduler = Arc::new(Scheduler::new(registry));

    // Préchargement en tâche de fond (mode headless)
    let prewarm = scheduler.clone();
    tokio::spawn(async move {
        prewarm.prewarm_recommendations().await;
    });

    // ========== PHASE 3 : Démarrage du serveur ==========
    let port = u16::try_from(config.get_http_port()?)?;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("🌐 Serving files at http://{}/files/", addr);
    info!("✅ Yomi is ready!");
    info!("Press Ctrl+C to stop...");

    axum::serve(listener, file_router(files).into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("⚠️ Cannot listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    info!("👋 Yomi stopped");
    Ok(())
}
