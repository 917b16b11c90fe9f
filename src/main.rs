use anyhow::Result;
use cortex::{Config, Pipeline};
use std::io::{BufRead, Write};

/// Offline REPL driver: stdin turns in, replies out. The audio frontend
/// that normally feeds the pipeline is an external collaborator; this
/// binary stands in for it.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cortex=info".into()),
        )
        .init();
    tracing::info!("cortex pipeline booting");

    let mut config = Config::default();
    if let Ok(root) = std::env::var("CORTEX_FS_ROOT") {
        config.wall.fs_root = root.into();
    }
    std::fs::create_dir_all(&config.wall.fs_root)?;

    let pipeline = Pipeline::offline(config);
    let user = std::env::var("CORTEX_USER").unwrap_or_else(|_| "operator".to_string());
    let mut pending_token: Option<String> = None;

    tracing::info!("ready; empty line or Ctrl+D exits");
    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim().to_string();
        if line.is_empty() {
            break;
        }

        // "yes" after a confirmation prompt resends the parked token.
        let token = if line.eq_ignore_ascii_case("yes") {
            pending_token.take()
        } else {
            None
        };
        let utterance = if token.is_some() { "confirmed".to_string() } else { line };

        match pipeline.handle_turn(&user, &utterance, token.as_deref()).await {
            Ok(outcome) => {
                println!("cortex> {}", outcome.reply);
                pending_token = outcome.pending_token;
            }
            Err(e) => println!("cortex> (turn ended: {e})"),
        }
    }

    println!("bye");
    Ok(())
}
