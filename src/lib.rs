//! Scraper for the Taipei road-dig construction notice listing.
//!
//! The listing is an ASP.NET grid paged through postbacks: page N+1 is only served in
//! response to a POST of the form state captured from page N. [`process::walk`] drives that
//! protocol, [`parse`] turns grid rows into notices and [`store::reconcile`] saves the ones
//! not seen before. [`process::update_notices`] ties it together for callers.

pub mod config;
mod error;
pub mod form;
pub mod logging;
mod macros;
pub mod parse;
pub mod process;
pub mod request;
pub mod store;

pub use error::{Error, Result, ScrapeError};

pub const LISTING_URL: &str = "https://dig.taipei/Tpdig/PWorkData.aspx";

/// Postback control the pager links target.
const GRID_EVENT_TARGET: &str = "GridView1";
const EVENT_TARGET_FIELD: &str = "__EVENTTARGET";
const EVENT_ARGUMENT_FIELD: &str = "__EVENTARGUMENT";
