use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use roomforge_server::config;
use roomforge_server::server::AppState;
use roomforge_server::websocket;

/// RoomForge -- realtime multi-room server for chat, drawing, Gobang, and
/// the LiveWar simulation.
#[derive(Parser, Debug)]
#[command(name = "roomforge-server")]
#[command(about = "A realtime multi-room WebSocket server")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config_security(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Map size: {}x{}", cfg.live_war.map_width, cfg.live_war.map_height);
                println!("  LiveWar tick: {}ms", cfg.live_war.tick_millis);
                println!("  CORS origins: {}", cfg.security.cors_origins);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    roomforge_server::logging::init_with_config(&cfg.logging);

    let port = cfg.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "Starting RoomForge server");

    let state = AppState::new(Arc::new(cfg));
    let app = websocket::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn default_parses_with_no_flags() {
        let cli = Cli::try_parse_from(["roomforge-server"]).unwrap();
        assert!(!cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn validate_and_print_config_conflict() {
        let result = Cli::try_parse_from(["roomforge-server", "--validate-config", "--print-config"]);
        assert!(result.is_err());
    }
}
