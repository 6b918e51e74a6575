use std::path::PathBuf;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use atomclad::config::RuntimeConfig;
use atomclad::persist::{PersistenceMode, Persistor};
use atomclad::runtime::Runtime;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "atomclad failed");
        std::process::exit(1);
    }
}

async fn run() -> atomclad::Result<()> {
    let config = RuntimeConfig::load()?;
    let runtime = Runtime::new(config.clone())?;

    let mut persistor = match &config.persistence {
        Some(path) => {
            let persistor = Persistor::new(&PersistenceMode::File(path.clone()))?;
            let restored = persistor.restore(&runtime.memory())?;
            info!(path = %path, atoms = restored, "restored from snapshot");
            Some(persistor)
        }
        None => None,
    };

    let maintenance = runtime.start_maintenance();
    let scripts: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if scripts.is_empty() {
        warn!("no script given, usage: atomclad <script.metta>...");
    }
    for script in &scripts {
        let text = std::fs::read_to_string(script)
            .map_err(|e| atomclad::AtomcladError::Config(format!("cannot read {}: {e}", script.display())))?;
        info!(script = %script.display(), "running");
        for results in runtime.run(&text)? {
            let shown: Vec<String> = results.iter().map(|r| r.to_string()).collect();
            println!("[{}]", shown.join(", "));
        }
    }
    maintenance.stop().await;

    if let Some(persistor) = persistor.as_mut() {
        let written = persistor.snapshot(&runtime.memory())?;
        info!(atoms = written, "snapshot written");
    }
    Ok(())
}
