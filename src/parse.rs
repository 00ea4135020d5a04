use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::error::ScrapeError;

/// One notice as scraped from a grid row, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoticeRecord {
    pub date_range: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub notice_type: Option<String>,
    pub unit: Option<String>,
    pub road: String,
    pub url: Option<String>,
}

/// Page index links of the grid pager, `__doPostBack('GridView1','Page$7')`.
pub(crate) const PAGE_LINK_SELECTOR: &str = r#"a[href*="Page$"]"#;

/// Parses a whole page and returns its notices in row order.
/// Rows that aren't notices (header, pager, layout, short rows) are skipped.
pub fn parse_page(html: &str) -> Result<Vec<NoticeRecord>, ScrapeError> {
    let doc = Html::parse_document(html);
    let row_selector = create_selector("tr")?;
    let parser = RowParser::new()?;

    let notices = doc
        .select(&row_selector)
        .filter_map(|row| parser.parse(row))
        .collect();
    Ok(notices)
}

/// Highest `Page$<n>` referenced by the pager. A listing without a pager has 1 page.
pub fn discover_page_count(html: &str) -> Result<usize, ScrapeError> {
    let doc = Html::parse_document(html);
    let link_selector = create_selector(PAGE_LINK_SELECTOR)?;
    let page_re = compile_regex(r"Page\$(\d+)")?;

    let max_page = doc
        .select(&link_selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| page_re.captures(href))
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .max();

    Ok(max_page.unwrap_or(1).max(1))
}

/// Turns a grid row into a [`NoticeRecord`].
pub struct RowParser {
    anchor_selector: Selector,
    table_selector: Selector,
    page_link_selector: Selector,
    open_re: Regex,
    paren_re: Regex,
}

impl RowParser {
    pub fn new() -> Result<Self, ScrapeError> {
        Ok(Self {
            anchor_selector: create_selector("a")?,
            table_selector: create_selector("table")?,
            page_link_selector: create_selector(PAGE_LINK_SELECTOR)?,
            // Looser than `window.open('...')`: extra arguments and `javascript:` hrefs match too.
            open_re: compile_regex(r"open\('([^']+)'")?,
            paren_re: compile_regex(r"\(([^)]+)\)")?,
        })
    }

    /// `None` for rows with fewer than 4 cells, an empty name cell, or pager/layout rows.
    pub fn parse(&self, row: ElementRef) -> Option<NoticeRecord> {
        if self.is_pager_or_layout_row(&row) {
            return None;
        }
        let cells = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "td")
            .collect::<Vec<_>>();
        if cells.len() < 4 {
            return None;
        }

        let name = cell_text(&cells[3]);
        if name.is_empty() {
            return None;
        }

        let url = self.extract_url(&cells[3]);
        let road = self.extract_road(&name);

        Some(NoticeRecord {
            date_range: non_empty(cell_text(&cells[0])),
            notice_type: non_empty(cell_text(&cells[1])),
            unit: non_empty(cell_text(&cells[2])),
            road,
            url,
            name,
        })
    }

    /// Argument of the `window.open('...')` attached to the name cell's link.
    fn extract_url(&self, cell: &ElementRef) -> Option<String> {
        let anchor = cell.select(&self.anchor_selector).next()?;
        ["onclick", "href"]
            .iter()
            .filter_map(|attr| anchor.value().attr(attr))
            .find_map(|action| self.open_re.captures(action))
            .map(|caps| caps[1].to_string())
    }

    /// The pager row holds a nested table of `Page$<n>` links, a layout row wraps the
    /// whole grid. Neither is a notice, but the grid's own rows inside a layout table are.
    fn is_pager_or_layout_row(&self, row: &ElementRef) -> bool {
        row.select(&self.table_selector).next().is_some()
            || row.select(&self.page_link_selector).next().is_some()
    }

    /// Text inside the first `(...)` of the name, or the whole name.
    pub fn extract_road(&self, name: &str) -> String {
        self.paren_re
            .captures(name)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| name.to_string())
    }
}

#[inline]
fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

#[inline]
fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

#[inline]
pub(crate) fn create_selector(sel_str: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(sel_str).map_err(|_| ScrapeError::Parse(format!("invalid selector: {sel_str}")))
}

#[inline]
fn compile_regex(pattern: &str) -> Result<Regex, ScrapeError> {
    Regex::new(pattern).map_err(|e| ScrapeError::Parse(format!("invalid pattern {pattern}: {e}")))
}
