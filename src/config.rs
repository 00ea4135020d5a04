use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::process::UpdateOptions;
use crate::LISTING_URL;

/// Scrapes the Taipei road-dig notice listing into SQLite.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Config {
    /// Listing page serving the paged notice grid.
    #[arg(long, env = "TPDIG_LISTING_URL", default_value = LISTING_URL)]
    pub listing_url: String,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://tpdig.db")]
    pub database_url: String,

    /// Timeout of each single HTTP request, in seconds.
    #[arg(long, env = "TPDIG_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Upper bound for a whole update run, in seconds.
    #[arg(long, env = "TPDIG_RUN_TIMEOUT_SECS")]
    pub run_timeout_secs: Option<u64>,

    #[arg(long, env = "TPDIG_USER_AGENT", default_value = concat!("tpdig/", env!("CARGO_PKG_VERSION")))]
    pub user_agent: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape the listing and save new notices.
    Update {
        /// Only walk the first N pages.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        max_pages: Option<u64>,

        /// Keep stored notices instead of clearing the table first.
        #[arg(long)]
        keep_existing: bool,
    },
    /// Print stored notices as JSON.
    List,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

impl Command {
    /// Options of an `update`, `None` for other commands.
    pub fn update_options(&self) -> Option<UpdateOptions> {
        match self {
            Self::Update {
                max_pages,
                keep_existing,
            } => Some(UpdateOptions {
                max_pages: max_pages.map(|n| n as usize),
                clear_existing: !keep_existing,
            }),
            Self::List => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_clears_by_default() {
        let config = Config::parse_from(["tpdig", "update"]);
        assert_eq!(config.command.update_options(), Some(UpdateOptions::default()));
        assert_eq!(config.listing_url, LISTING_URL);
    }

    #[test]
    fn update_flags() {
        let config = Config::parse_from(["tpdig", "update", "--max-pages", "2", "--keep-existing"]);
        assert_eq!(
            config.command.update_options(),
            Some(UpdateOptions {
                max_pages: Some(2),
                clear_existing: false,
            })
        );
    }

    #[test]
    fn zero_pages_is_rejected() {
        assert!(Config::try_parse_from(["tpdig", "update", "--max-pages", "0"]).is_err());
    }
}
