//! Document parsers for the two kinds of sources.
//!
//! - Syndication feeds (`feed`)
//! - HTML listing pages (`html`)
//! - Date and time normalization shared by both (`dates`)
//!
//! Parsers never fail for a single bad entry or element; they skip it.
//! A returned error always concerns the whole document.

pub mod dates;
mod feed;
mod html;

use chrono::NaiveDate;
use url::Url;

use crate::error::Result;
use crate::models::{CandidateEvent, CleaningConfig, Config, ParsingConfig, SiteConfig, SourceKind};
use crate::utils::{grapheme_len, normalize_whitespace, resolve_url, truncate_graphemes};

pub use feed::parse_feed;
pub use html::parse_html;

/// Signature shared by the parsers.
pub type ParseFn = fn(&str, &ParseContext<'_>) -> Result<Vec<CandidateEvent>>;

/// Resolve the parser for a source kind.
pub fn parser_for(kind: SourceKind) -> ParseFn {
    match kind {
        SourceKind::Feed => parse_feed,
        SourceKind::Html => parse_html,
    }
}

/// Everything a parser needs besides the document itself.
#[derive(Debug, Clone)]
pub struct ParseContext<'a> {
    pub site: &'a SiteConfig,
    /// Reference day for year-less dates
    pub today: NaiveDate,
    pub parsing: &'a ParsingConfig,
    pub cleaning: &'a CleaningConfig,
    base: Url,
}

impl<'a> ParseContext<'a> {
    pub fn new(site: &'a SiteConfig, config: &'a Config, today: NaiveDate) -> Result<Self> {
        Ok(Self {
            site,
            today,
            parsing: &config.parsing,
            cleaning: &config.cleaning,
            base: Url::parse(&site.url)?,
        })
    }

    /// Absolute URL for a link found in the document; the site URL when absent.
    pub fn resolve(&self, href: &str) -> String {
        if href.trim().is_empty() {
            return self.site.url.clone();
        }
        resolve_url(&self.base, href)
    }

    /// Cleaned, non-empty title.
    pub fn title(&self, raw: &str) -> Option<String> {
        let title = self.cleaning.clean_title(raw);
        (!title.is_empty()).then_some(title)
    }

    /// Cleaned title within the plausible length.
    pub fn bounded_title(&self, raw: &str) -> Option<String> {
        self.title(raw)
            .filter(|t| grapheme_len(t) <= self.parsing.max_title_chars)
    }

    pub fn detail(&self, text: &str) -> Option<String> {
        let text = normalize_whitespace(text);
        (!text.is_empty()).then(|| truncate_graphemes(&text, self.parsing.max_detail_chars))
    }

    pub fn date(&self, text: &str) -> Option<NaiveDate> {
        dates::parse_date_on(&self.cleaning.clean_date(text), self.today)
    }

    /// A candidate with the site's identity filled in.
    pub fn candidate(&self, title: String, date: NaiveDate, href: Option<&str>) -> CandidateEvent {
        CandidateEvent::new(
            title,
            date,
            self.resolve(href.unwrap_or_default()),
            self.site.name.clone(),
            self.site.region.clone(),
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn config() -> Config {
        Config::default()
    }

    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    pub fn feed_site() -> SiteConfig {
        SiteConfig::new(
            "高森町役場",
            "https://www.town.example.jp/oshirase/rss.xml",
            "高森町",
            SourceKind::Feed,
        )
    }

    pub fn html_site() -> SiteConfig {
        SiteConfig::new(
            "下条村観光協会",
            "https://kanko.example.jp/news/index.html",
            "下条村",
            SourceKind::Html,
        )
    }
}
