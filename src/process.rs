use chrono::Local;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::ScrapeError;
use crate::parse::{discover_page_count, parse_page, NoticeRecord};
use crate::request::{PostbackSession, PostbackTransport};
use crate::{info_time, store, Result};

/// Knobs of a single update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Stop after this many pages. `None` walks every page the pager reports.
    pub max_pages: Option<usize>,
    /// Wipe the table before saving.
    pub clear_existing: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            max_pages: None,
            clear_existing: true,
        }
    }
}

/// What callers of [`update_notices`] get back. Never an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UpdateOutcome {
    Success {
        scraped_count: usize,
        saved_count: u64,
    },
    Error {
        message: String,
    },
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<Result<(usize, u64)>> for UpdateOutcome {
    fn from(res: Result<(usize, u64)>) -> Self {
        match res {
            Ok((scraped_count, saved_count)) => Self::Success {
                scraped_count,
                saved_count,
            },
            Err(e) => Self::Error {
                message: e.to_string(),
            },
        }
    }
}

/// Scrapes the whole listing and saves what's new.
pub async fn update_notices<T: PostbackTransport>(
    session: &PostbackSession<T>,
    pool: &SqlitePool,
    options: UpdateOptions,
) -> UpdateOutcome {
    let res = run_update(session, pool, options).await;
    if let Err(e) = &res {
        tracing::error!(error = %e, "Notice update failed");
    }
    res.into()
}

async fn run_update<T: PostbackTransport>(
    session: &PostbackSession<T>,
    pool: &SqlitePool,
    options: UpdateOptions,
) -> Result<(usize, u64)> {
    let notices = walk(session, options.max_pages).await?;
    let saved = store::reconcile(pool, &notices, options.clear_existing).await?;
    Ok((notices.len(), saved))
}

/// Walks every page of the grid in order and returns all notices found.
/// A `max_pages` of zero counts as no limit.
///
/// Pages are requested one after another since each postback needs the form state of the
/// page before it. Any failure drops everything collected so far.
pub async fn walk<T: PostbackTransport>(
    session: &PostbackSession<T>,
    max_pages: Option<usize>,
) -> core::result::Result<Vec<NoticeRecord>, ScrapeError> {
    let start_time = Local::now();
    let (mut state, first_html) = session.initialize().await?;

    let discovered = discover_page_count(&first_html)?;
    let total_pages = match max_pages {
        Some(limit) if limit > 0 => discovered.min(limit),
        _ => discovered,
    };
    info_time!("Discovered {discovered} pages, walking {total_pages}");

    let mut notices = parse_page(&first_html)?;
    for page in 2..=total_pages {
        let page_time = Local::now();
        let (next_state, html) = session.advance(state, page).await?;
        state = next_state;

        let rows = parse_page(&html)?;
        info_time!(page_time, "Parsed page {page}: {} notices", rows.len());
        notices.extend(rows);
    }

    info_time!(
        start_time,
        "Finished walking {total_pages} pages, {} notices",
        notices.len()
    );
    Ok(notices)
}
