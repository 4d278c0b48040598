use log::{error, info};
use scheme_simulator::{Config, Outcome, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = Config::from_env()?;
    if let Some(address) = std::env::args().nth(1) {
        config = Config::new(address).with_grace_period(config.grace_period());
    }

    let server = Server::new(config);
    if let Err(e) = server.start(shutdown_signal()).await {
        error!("{}", e);
        return Err(e.into());
    }

    server.stop_requested().await;
    match server.stop().await {
        Outcome::Drained => info!("All connections finished"),
        Outcome::Escalated { cancelled } => info!("Cancelled {} connection(s)", cancelled),
        Outcome::AlreadyStopped => {}
    }
    Ok(())
}

/// Resolve on Ctrl-C, or on SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl-C; err = {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM; err = {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
