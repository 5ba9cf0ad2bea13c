/// Chainlink DID - resolution server
///
/// Serves `GET /resolve?did=` for chain-linked DIDs, falling back from a
/// remote resolver to a direct crawl of the spend chain.
use chainlink_did::{
    config::{LogFormat, ServerConfig},
    context::AppContext,
    error::DidResult,
    server,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> DidResult<()> {
    // Load configuration first so .env can carry RUST_LOG
    let config = ServerConfig::from_env()?;

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.logging.level.clone().into()),
    );
    match config.logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    print_banner();

    let ctx = AppContext::new(config)?;

    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   _____ _           _       _ _       _      ____ ___ ____
  / ____| |         (_)     | (_)     | |    |  _ \_ _|  _ \
 | |    | |__   __ _ _ _ __ | |_ _ __ | | __ | | | | || | | |
 | |    | '_ \ / _` | | '_ \| | | '_ \| |/ / | |_| | || |_| |
 | |____| | | | (_| | | | | | | | | | |   <  |____/___|____/
  \_____|_| |_|\__,_|_|_| |_|_|_|_| |_|_|\_\

        Chain-linked DID resolver v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
