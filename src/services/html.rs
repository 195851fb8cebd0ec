// src/services/html.rs

//! HTML listing extraction.
//!
//! Sources with a container selector use rule-based extraction; the rest go
//! through a heuristic scan of likely listing elements.

use std::collections::HashSet;

use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{CandidateEvent, FieldSelectors};
use crate::services::ParseContext;
use crate::services::dates::parse_time;
use crate::utils::normalize_whitespace;

/// Elements visited by the heuristic scan, in order.
const HEURISTIC_CONTAINERS: [&str; 3] = [
    "article",
    r#"[class*="event"], [class*="news"], [class*="post"]"#,
    "ul li",
];

const HEURISTIC_TITLE: &str = "h1, h2, h3, h4, h5, h6, strong, .title";

/// Extract candidate events from an HTML page.
pub fn parse_html(html: &str, ctx: &ParseContext<'_>) -> Result<Vec<CandidateEvent>> {
    let document = Html::parse_document(html);
    let common = CommonSelectors::compile()?;

    let candidates = match ctx.site.rules() {
        Some((container, fields)) => {
            let rules = Rules::compile(container, &fields)?;
            extract_with_rules(&document, &rules, &common, ctx)
        }
        None => extract_heuristic(&document, &common, ctx)?,
    };

    // Nested containers often repeat the same listing
    let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();
    let events: Vec<_> = candidates
        .into_iter()
        .filter(|e| seen.insert((e.title.clone(), e.event_date)))
        .collect();

    log::debug!("[{}] {} candidates from HTML", ctx.site.name, events.len());
    Ok(events)
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

struct CommonSelectors {
    anchor: Selector,
    image: Selector,
}

impl CommonSelectors {
    fn compile() -> Result<Self> {
        Ok(Self {
            anchor: parse_selector("a[href]")?,
            image: parse_selector("img[src]")?,
        })
    }

    fn first_href<'a>(&self, element: ElementRef<'a>) -> Option<&'a str> {
        element
            .select(&self.anchor)
            .find_map(|a| a.value().attr("href"))
    }

    fn first_image<'a>(&self, element: ElementRef<'a>) -> Option<&'a str> {
        element
            .select(&self.image)
            .find_map(|img| img.value().attr("src"))
            .filter(|src| !src.trim().is_empty())
    }
}

struct Rules {
    container: Selector,
    title: Option<Selector>,
    date: Option<Selector>,
    place: Option<Selector>,
    link: Option<Selector>,
}

impl Rules {
    fn compile(container: &str, fields: &FieldSelectors) -> Result<Self> {
        let optional = |s: &Option<String>| s.as_deref().map(parse_selector).transpose();
        Ok(Self {
            container: parse_selector(container)?,
            title: optional(&fields.title)?,
            date: optional(&fields.date)?,
            place: optional(&fields.place)?,
            link: optional(&fields.link)?,
        })
    }
}

/// Concatenated text of an element, whitespace-collapsed.
fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

/// Text of the first non-empty match of `selector` inside `element`.
fn field_text(element: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    element
        .select(selector?)
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn extract_with_rules(
    document: &Html,
    rules: &Rules,
    common: &CommonSelectors,
    ctx: &ParseContext<'_>,
) -> Vec<CandidateEvent> {
    document
        .select(&rules.container)
        .filter_map(|element| rule_candidate(element, rules, common, ctx))
        .collect()
}

fn rule_candidate(
    element: ElementRef<'_>,
    rules: &Rules,
    common: &CommonSelectors,
    ctx: &ParseContext<'_>,
) -> Option<CandidateEvent> {
    let container_text = element_text(element);

    let raw_title = field_text(element, rules.title.as_ref()).unwrap_or_else(|| container_text.clone());
    let title = ctx.bounded_title(&raw_title)?;

    let date_text = field_text(element, rules.date.as_ref()).unwrap_or_else(|| container_text.clone());
    let date = ctx.date(&date_text)?;

    let link = rules
        .link
        .as_ref()
        .and_then(|sel| {
            element.select(sel).find_map(|el| {
                el.value()
                    .attr("href")
                    .or_else(|| common.first_href(el))
            })
        })
        .or_else(|| common.first_href(element));

    let mut event = ctx.candidate(title, date, link);
    event.event_time = parse_time(&date_text);
    event.place = field_text(element, rules.place.as_ref());
    event.image_url = common.first_image(element).map(|src| ctx.resolve(src));
    Some(event)
}

fn extract_heuristic(
    document: &Html,
    common: &CommonSelectors,
    ctx: &ParseContext<'_>,
) -> Result<Vec<CandidateEvent>> {
    let title_sel = parse_selector(HEURISTIC_TITLE)?;
    let mut visited = HashSet::new();
    let mut events = Vec::new();

    for container in HEURISTIC_CONTAINERS {
        let selector = parse_selector(container)?;
        for element in document.select(&selector) {
            if !visited.insert(element.id()) {
                continue;
            }
            if let Some(event) = heuristic_candidate(element, &title_sel, common, ctx) {
                events.push(event);
            }
        }
    }
    Ok(events)
}

fn heuristic_candidate(
    element: ElementRef<'_>,
    title_sel: &Selector,
    common: &CommonSelectors,
    ctx: &ParseContext<'_>,
) -> Option<CandidateEvent> {
    let full_text = element_text(element);
    let raw_title = field_text(element, Some(title_sel))
        .or_else(|| field_text(element, Some(&common.anchor)))
        .unwrap_or_else(|| full_text.clone());
    let title = ctx.bounded_title(&raw_title)?;
    let date = ctx.date(&full_text)?;

    let mut event = ctx.candidate(title, date, common.first_href(element));
    event.event_time = parse_time(&full_text);
    event.image_url = common.first_image(element).map(|src| ctx.resolve(src));
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventTime, SiteConfig};
    use crate::services::test_support::*;
    use chrono::NaiveTime;

    fn parse_with(site: &SiteConfig, html: &str) -> Result<Vec<CandidateEvent>> {
        let config = config();
        let ctx = ParseContext::new(site, &config, today()).unwrap();
        parse_html(html, &ctx)
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rule_site() -> SiteConfig {
        html_site().with_rules(
            ".event-item",
            FieldSelectors {
                title: Some(".event-title".into()),
                date: Some(".event-date".into()),
                place: Some(".event-place".into()),
                link: Some("a".into()),
            },
        )
    }

    #[test]
    fn test_rule_based_extraction() {
        let html = r#"
<ul>
  <li class="event-item">
    <a href="/ev/1.html"><span class="event-title">天竜川花火大会</span></a>
    <span class="event-date">2025年8月15日 19:30～21:00</span>
    <span class="event-place">天竜川河川敷</span>
    <img src="img/hanabi.jpg">
  </li>
  <li class="event-item">
    <span class="event-title">日付不明の催し</span>
  </li>
  <li class="event-item">
    <a href="detail/3.html">8/20 りんご狩り体験</a>
  </li>
</ul>"#;
        let events = parse_with(&rule_site(), html).unwrap();
        assert_eq!(events.len(), 2);

        let first = &events[0];
        assert_eq!(first.title, "天竜川花火大会");
        assert_eq!(first.event_date, d(2025, 8, 15));
        assert_eq!(first.place.as_deref(), Some("天竜川河川敷"));
        assert_eq!(first.source_url, "https://kanko.example.jp/ev/1.html");
        assert_eq!(
            first.image_url.as_deref(),
            Some("https://kanko.example.jp/news/img/hanabi.jpg")
        );
        assert_eq!(
            first.event_time,
            Some(EventTime::Between(
                NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
                NaiveTime::from_hms_opt(21, 0, 0).unwrap()
            ))
        );

        // Misses fall back to the container's own text
        let second = &events[1];
        assert_eq!(second.title, "8/20 りんご狩り体験");
        assert_eq!(second.event_date, d(2025, 8, 20));
        assert_eq!(second.source_url, "https://kanko.example.jp/news/detail/3.html");
        assert!(second.place.is_none());
    }

    #[test]
    fn test_invalid_configured_selector_is_parse_error() {
        let site = html_site().with_rules("[[broken", FieldSelectors::default());
        let err = parse_with(&site, "<html></html>").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Parsing);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_heuristic_extraction() {
        let html = r#"
<html><body>
  <article>
    <h2>村民文化祭のお知らせ</h2>
    <p>令和7年11月3日（月・祝）9:00から</p>
    <a href="/bunkasai.html">詳しく</a>
  </article>
  <div class="news-list">
    <ul>
      <li><a href="/n/1">2025.07.01 広報誌を発行しました</a></li>
      <li>お知らせはありません</li>
    </ul>
  </div>
</body></html>"#;
        let events = parse_with(&html_site(), html).unwrap();

        let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
        assert!(titles.contains(&"村民文化祭のお知らせ"));
        assert!(titles.contains(&"2025.07.01 広報誌を発行しました"));

        let bunkasai = events
            .iter()
            .find(|e| e.title == "村民文化祭のお知らせ")
            .unwrap();
        assert_eq!(bunkasai.event_date, d(2025, 11, 3));
        assert_eq!(bunkasai.source_url, "https://kanko.example.jp/bunkasai.html");
        assert_eq!(
            bunkasai.event_time,
            Some(EventTime::At(NaiveTime::from_hms_opt(9, 0, 0).unwrap()))
        );

        // Each (title, date) pair is emitted once even when containers nest
        let mut keys: Vec<_> = events.iter().map(|e| (&e.title, e.event_date)).collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before);
    }

    #[test]
    fn test_overlong_titles_rejected() {
        let long = "あ".repeat(250);
        let html = format!("<article><p>{long} 2025年9月1日</p></article>");
        assert!(parse_with(&html_site(), &html).unwrap().is_empty());
    }

    #[test]
    fn test_plain_page_yields_nothing() {
        let events = parse_with(&html_site(), "<html><body><p>工事中</p></body></html>").unwrap();
        assert!(events.is_empty());
    }
}
