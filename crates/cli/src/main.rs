use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use armada_lock::cluster::kube_backed::KubeClusterApi;
use armada_lock::{LockCoordinator, LockConfig};
use armada_manifest::loader::load_documents_from_dir;

mod config;

use config::ArmadaConfig;

/// Armada orchestrator: resolves a bundle manifest and drives a release under an
/// exclusive cluster-backed lock. Carries no business logic beyond wiring the two
/// library crates together; the actual bundle installation is a stub collaborator.
#[derive(Parser, Debug)]
#[command(name = "armada", about = "Manifest-driven bundle orchestrator")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "armada.toml")]
    config: String,

    /// Override the manifest directory.
    #[arg(long)]
    manifests: Option<PathBuf>,

    /// Override the target manifest name.
    #[arg(long)]
    target: Option<String>,

    /// Name of the lock to acquire while releasing.
    #[arg(long, default_value = "armada-release")]
    lock_name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config: ArmadaConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        info!(path = %cli.config, "config file not found, using defaults");
        toml::from_str("")?
    };

    let manifest_dir = cli.manifests.unwrap_or_else(|| PathBuf::from(&config.manifest.directory));
    let target = cli.target.or(config.manifest.target.clone());

    let documents = load_documents_from_dir(&manifest_dir).await?;
    let resolved = armada_manifest::resolve(&documents, target.as_deref())?;
    info!(
        groups = resolved.group_documents().len(),
        bundles = resolved.bundle_documents().len(),
        release_prefix = resolved.release_prefix(),
        "manifest resolved"
    );

    let lock_config: LockConfig = config.lock.into();
    let client = kube::Client::try_default().await?;
    let cluster = Arc::new(KubeClusterApi::new(client));
    let coordinator = LockCoordinator::new(cluster, lock_config);

    let bundle_names: Vec<String> = resolved.bundles().iter().map(|b| b.name.clone()).collect();
    if bundle_names.is_empty() {
        warn!("resolved manifest has no bundles to install");
    }
    let release_prefix = resolved.release_prefix().to_string();

    let mut user_data = HashMap::new();
    user_data.insert("releasePrefix".to_string(), release_prefix.clone());

    let result = coordinator
        .run_with_lock(&cli.lock_name, user_data, move || async move {
            install_release(&release_prefix, &bundle_names).await
        })
        .await?;

    info!(installed = result, "release complete");
    Ok(())
}

/// Stub release-installation collaborator. The real release-installation engine is
/// out of scope (spec.md §1); this only demonstrates `run_with_lock`'s contract.
async fn install_release(release_prefix: &str, bundles: &[String]) -> usize {
    for bundle in bundles {
        info!(release_prefix, bundle, "would install bundle");
    }
    bundles.len()
}
