use chrono::Local;
use clap::Parser;
use tpdig::config::Config;
use tpdig::process::{update_notices, UpdateOutcome};
use tpdig::request::{HttpTransport, PostbackSession};
use tpdig::{info_time, logging, store, Error, Result};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();
    let config = Config::parse();
    let start_time = Local::now();

    let pool = store::connect(&config.database_url).await?;

    match config.command.update_options() {
        Some(options) => {
            let transport = HttpTransport::new(config.request_timeout(), &config.user_agent)?;
            let session = PostbackSession::new(transport, config.listing_url.clone());

            let update = update_notices(&session, &pool, options);
            let outcome = match config.run_timeout() {
                Some(limit) => tokio::time::timeout(limit, update)
                    .await
                    .unwrap_or_else(|_| UpdateOutcome::Error {
                        message: Error::Timeout(limit).to_string(),
                    }),
                None => update.await,
            };
            println!("{}", to_json(&outcome));
        }
        None => {
            let notices = store::list_notices(&pool).await?;
            println!("{}", to_json(&notices));
        }
    }

    pool.close().await;
    info_time!(start_time, "Full program time:");
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!(r#"{{"status":"error","message":"{e}"}}"#))
}
