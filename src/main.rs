/// Skytrade Core
///
/// Account security and reputation progression service for the Skytrade
/// economy simulation: login with brute-force lockout, password reset
/// and email verification tokens, and tiered reputation scoring.

mod account;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod geo;
mod mailer;
mod metrics;
mod rate_limit;
mod reputation;
mod server;
mod tokens;

use config::ServerConfig;
use context::AppContext;
use error::CoreResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> CoreResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skytrade_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    let config = ServerConfig::from_env()?;
    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   _____ __        __                __
  / ___// /____  _/ /_____________ _/ /__
  \__ \/ //_/ / / / __/ ___/ __ `/ / __ \
 ___/ / ,< / /_/ / /_/ /  / /_/ / / /_/ /
/____/_/|_|\__, /\__/_/   \__,_/_/\__,_/
          /____/

        Skytrade Core v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
