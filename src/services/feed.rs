// src/services/feed.rs

//! RSS 2.0, RSS 1.0 (RDF) and Atom feed extraction.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;

use crate::error::{AppError, Result};
use crate::models::CandidateEvent;
use crate::services::ParseContext;
use crate::services::dates::{parse_iso_date_prefix, parse_time};
use crate::utils::strip_markup;

/// Extract candidate events from a feed document.
///
/// Entries without a title or a usable date are skipped.
pub fn parse_feed(xml: &str, ctx: &ParseContext<'_>) -> Result<Vec<CandidateEvent>> {
    let xml = scrub_html_entities_for_xml(xml);
    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;

    let mut root_seen = false;
    let mut entries = 0usize;
    let mut events = Vec::new();
    let mut entry: Option<RawEntry> = None;
    // Open text field and the depth of markup nested inside it
    let mut open: Option<(Field, usize)> = None;
    let mut buf = String::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) if entries > 0 => {
                log::warn!(
                    "[{}] Feed broken after {} entries: {}",
                    ctx.site.name,
                    entries,
                    e
                );
                break;
            }
            Err(e) => return Err(AppError::parse(format!("feed {}", ctx.site.url), e)),
        };

        match event {
            Event::Start(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                if !root_seen {
                    check_root(name)?;
                    root_seen = true;
                    continue;
                }
                if let Some((_, depth)) = open.as_mut() {
                    *depth += 1;
                    continue;
                }
                if entry.is_none() {
                    if is_entry(name) {
                        entry = Some(RawEntry::from_start(&e));
                    }
                } else if let Some(raw) = entry.as_mut() {
                    if raw.take_attributes(name, &e) {
                        continue;
                    }
                    if let Some(field) = Field::from_name(name) {
                        open = Some((field, 0));
                        buf.clear();
                    }
                }
            }
            Event::Empty(e) => {
                let name = e.local_name();
                if !root_seen {
                    check_root(name.as_ref())?;
                    root_seen = true;
                    continue;
                }
                if open.is_none() {
                    if let Some(raw) = entry.as_mut() {
                        raw.take_attributes(name.as_ref(), &e);
                    }
                }
            }
            Event::Text(t) => {
                if open.is_some() {
                    push_text(&mut buf, &text_of(&t));
                }
            }
            Event::CData(c) => {
                if open.is_some() {
                    push_text(&mut buf, &String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => {
                if let Some((field, depth)) = open.as_mut() {
                    if *depth > 0 {
                        *depth -= 1;
                        continue;
                    }
                    let field = *field;
                    open = None;
                    if let Some(raw) = entry.as_mut() {
                        raw.set(field, std::mem::take(&mut buf));
                    }
                    continue;
                }
                if is_entry(e.local_name().as_ref()) {
                    if let Some(raw) = entry.take() {
                        entries += 1;
                        match raw.into_candidate(ctx) {
                            Some(event) => events.push(event),
                            None => log::debug!("[{}] Skipped feed entry {}", ctx.site.name, entries),
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        return Err(AppError::parse(
            format!("feed {}", ctx.site.url),
            "empty document",
        ));
    }

    log::debug!(
        "[{}] {} of {} feed entries usable",
        ctx.site.name,
        events.len(),
        entries
    );
    Ok(events)
}

fn check_root(name: &[u8]) -> Result<()> {
    match name {
        b"rss" | b"RDF" | b"feed" => Ok(()),
        other => Err(AppError::parse(
            "feed",
            format!("unexpected root element <{}>", String::from_utf8_lossy(other)),
        )),
    }
}

fn is_entry(name: &[u8]) -> bool {
    matches!(name, b"item" | b"entry")
}

fn text_of(t: &BytesText<'_>) -> String {
    t.unescape()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(t).into_owned())
}

fn push_text(buf: &mut String, text: &str) {
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(text);
}

/// Attributes keyed by local name.
fn attributes(e: &BytesStart<'_>) -> HashMap<String, String> {
    e.attributes()
        .flatten()
        .filter_map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

/// HTML entities that XML parsers reject.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ensp;", " ")
        .replace("&emsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
        .replace("&middot;", "・")
        .replace("&copy;", "(c)")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
    DcDate,
    Updated,
    Published,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            // content:encoded and Atom content
            b"description" | b"summary" | b"content" | b"encoded" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            b"date" => Some(Field::DcDate),
            b"updated" => Some(Field::Updated),
            b"published" => Some(Field::Published),
            _ => None,
        }
    }
}

/// Raw values of one `<item>` or `<entry>`. The first value of a field wins.
#[derive(Debug, Default)]
struct RawEntry {
    title: Option<String>,
    link: Option<String>,
    /// `rdf:about` of an RSS 1.0 item
    about: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
    dc_date: Option<String>,
    updated: Option<String>,
    published: Option<String>,
    image: Option<String>,
}

impl RawEntry {
    fn from_start(e: &BytesStart<'_>) -> Self {
        Self {
            about: attributes(e).remove("about"),
            ..Self::default()
        }
    }

    fn set(&mut self, field: Field, value: String) {
        let value = value.trim().to_string();
        if value.is_empty() {
            return;
        }
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::PubDate => &mut self.pub_date,
            Field::DcDate => &mut self.dc_date,
            Field::Updated => &mut self.updated,
            Field::Published => &mut self.published,
        };
        slot.get_or_insert(value);
    }

    /// Consume attribute-only elements. Returns true when the element carries
    /// no text worth collecting.
    fn take_attributes(&mut self, name: &[u8], e: &BytesStart<'_>) -> bool {
        match name {
            b"link" => {
                let attrs = attributes(e);
                let Some(href) = attrs.get("href") else {
                    return false;
                };
                let rel = attrs.get("rel").map(String::as_str).unwrap_or("alternate");
                if rel == "alternate" && self.link.is_none() {
                    self.link = Some(href.clone());
                }
                true
            }
            b"enclosure" => {
                let attrs = attributes(e);
                let is_image = attrs.get("type").is_some_and(|t| t.starts_with("image/"));
                if is_image {
                    self.set_image(attrs.get("url"));
                }
                true
            }
            b"content" | b"thumbnail" => {
                let attrs = attributes(e);
                // Atom <content> carries text, media:* carries a url
                let Some(url) = attrs.get("url") else {
                    return false;
                };
                let is_image = name == b"thumbnail"
                    || attrs.get("medium").is_some_and(|m| m == "image")
                    || attrs.get("type").is_some_and(|t| t.starts_with("image/"))
                    || (!attrs.contains_key("medium") && !attrs.contains_key("type"));
                if is_image {
                    self.set_image(Some(url));
                }
                true
            }
            _ => false,
        }
    }

    fn set_image(&mut self, url: Option<&String>) {
        if self.image.is_none() {
            self.image = url.filter(|u| !u.trim().is_empty()).cloned();
        }
    }

    /// Structured dates first, then `pubDate`, then the entry's own text.
    fn event_date(&self, text: &str, ctx: &ParseContext<'_>) -> Option<NaiveDate> {
        [&self.dc_date, &self.updated, &self.published]
            .into_iter()
            .flatten()
            .find_map(|s| parse_structured_date(s))
            .or_else(|| self.pub_date.as_deref().and_then(parse_pub_date))
            .or_else(|| ctx.date(text))
    }

    fn into_candidate(self, ctx: &ParseContext<'_>) -> Option<CandidateEvent> {
        let title = ctx.title(self.title.as_deref()?)?;
        let description = self
            .description
            .as_deref()
            .map(strip_markup)
            .unwrap_or_default();
        let text = format!("{title} {description}");
        let date = self.event_date(&text, ctx)?;

        let link = self.link.as_deref().or(self.about.as_deref());
        let mut event = ctx.candidate(title, date, link);
        event.event_time = parse_time(&text);
        event.detail = ctx.detail(&description);
        event.image_url = self.image.as_deref().map(|u| ctx.resolve(u));
        Some(event)
    }
}

/// ISO 8601 value (`dc:date`, Atom dates): the literal calendar date.
fn parse_structured_date(s: &str) -> Option<NaiveDate> {
    parse_iso_date_prefix(s).or_else(|| {
        DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.date_naive())
    })
}

/// RFC 822 `pubDate`: the date in the timestamp's own offset.
fn parse_pub_date(s: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc2822(s.trim())
        .ok()
        .map(|dt| dt.date_naive())
        .or_else(|| parse_iso_date_prefix(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventTime;
    use crate::services::test_support::*;
    use chrono::NaiveTime;

    fn parse(xml: &str) -> Result<Vec<CandidateEvent>> {
        let config = config();
        let site = feed_site();
        let ctx = ParseContext::new(&site, &config, today()).unwrap();
        parse_feed(xml, &ctx)
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_rss2_items() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>高森町</title>
    <item>
      <title>秋まつり&nbsp;開催</title>
      <link>/event/1.html</link>
      <description><![CDATA[<p>時間：10:00～16:00</p><p>場所：町民広場</p>]]></description>
      <pubDate>Fri, 07 Nov 2025 23:30:00 +0900</pubDate>
      <enclosure url="https://img.example.jp/a.jpg" type="image/jpeg" length="1"/>
    </item>
    <item>
      <title></title>
      <pubDate>Fri, 07 Nov 2025 10:00:00 +0900</pubDate>
    </item>
    <item>
      <title>日付なし</title>
      <description>詳細は後日</description>
    </item>
  </channel>
</rss>"#;
        let events = parse(xml).unwrap();
        assert_eq!(events.len(), 1);

        let e = &events[0];
        assert_eq!(e.title, "秋まつり 開催");
        // Own offset: late evening JST stays on the 7th
        assert_eq!(e.event_date, d(2025, 11, 7));
        assert_eq!(e.source_url, "https://www.town.example.jp/event/1.html");
        assert_eq!(e.source_site, "高森町役場");
        assert_eq!(e.region, "高森町");
        assert_eq!(e.detail.as_deref(), Some("時間：10:00～16:00 場所：町民広場"));
        assert_eq!(
            e.event_time,
            Some(EventTime::Between(
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(16, 0, 0).unwrap()
            ))
        );
        assert_eq!(e.image_url.as_deref(), Some("https://img.example.jp/a.jpg"));
        assert!(e.is_new);
    }

    #[test]
    fn test_rdf_prefers_dc_date_literal() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://www.vill.example.jp/"><title>村</title></channel>
  <item rdf:about="https://www.vill.example.jp/news/10.html">
    <title>村民運動会</title>
    <dc:date>2025-11-14T00:00:00+09:00</dc:date>
    <pubDate>Thu, 13 Nov 2025 15:00:00 +0000</pubDate>
  </item>
</rdf:RDF>"#;
        let events = parse(xml).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_date, d(2025, 11, 14));
        assert_eq!(events[0].source_url, "https://www.vill.example.jp/news/10.html");
    }

    #[test]
    fn test_atom_entries() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>観光局</title>
  <entry>
    <title>星空ナイトツアー</title>
    <link rel="self" href="https://example.jp/self"/>
    <link href="news/42"/>
    <summary type="html">&lt;b&gt;20:00&lt;/b&gt;集合</summary>
    <updated>2025-08-22T09:00:00Z</updated>
  </entry>
  <entry>
    <title>本文中の日付</title>
    <link rel="alternate" href="https://example.jp/43"/>
    <content type="html">令和7年9月3日に開催します</content>
  </entry>
</feed>"#;
        let events = parse(xml).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_date, d(2025, 8, 22));
        assert_eq!(events[0].source_url, "https://www.town.example.jp/oshirase/news/42");
        assert_eq!(events[0].detail.as_deref(), Some("20:00 集合"));
        assert_eq!(events[1].event_date, d(2025, 9, 3));
        assert_eq!(events[1].source_url, "https://example.jp/43");
    }

    #[test]
    fn test_missing_link_uses_site_url() {
        let xml = r#"<rss><channel><item><title>催し</title><pubDate>Mon, 01 Sep 2025 00:00:00 +0900</pubDate></item></channel></rss>"#;
        let events = parse(xml).unwrap();
        assert_eq!(events[0].source_url, feed_site().url);
    }

    #[test]
    fn test_non_feed_root_is_error() {
        let err = parse("<html><body>maintenance</body></html>").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Parsing);
        assert!(!err.is_retryable());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_broken_tail_keeps_collected_entries() {
        let xml = r#"<rss><channel>
<item><title>前半</title><pubDate>Mon, 01 Sep 2025 00:00:00 +0900</pubDate></item>
<item><title>後半 &bogus; </title>"#;
        let events = parse(xml).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "前半");
    }
}
