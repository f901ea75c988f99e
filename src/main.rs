use instanced::control;
use instanced::logger::logs_tracing;
use instanced::parse::{parser, DEFAULT_CONFIG_PATH};
use instanced::shell::run_shell;
use std::path::Path;
use tokio::sync::mpsc;

// instanced [--no-shell] [config.yml]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut config_path = String::from(DEFAULT_CONFIG_PATH);
    let mut interactive = true;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--no-shell" => interactive = false,
            _ => config_path = arg,
        }
    }

    let cfg = parser(&config_path)?;
    let _guard = logs_tracing(&cfg.log_dir)?;
    tracing::info!(path = %config_path, services = cfg.services.len(), "instanced starting");

    let (requests, inbox) = mpsc::unbounded_channel();
    if interactive {
        let services: Vec<String> = cfg.services.keys().cloned().collect();
        let history = Path::new(&cfg.log_dir).join("history.txt");
        std::thread::spawn(move || {
            if let Err(err) = run_shell(requests, services, history) {
                eprintln!("shell error: {}", err);
            }
        });
    } else {
        drop(requests);
    }

    control::run(config_path, cfg, inbox).await
}
