// src/models/site.rs

//! Per-source scraping parameters and the registry that holds them.

use std::collections::HashSet;

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// How a source publishes its listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// RSS 2.0, RDF or Atom syndication feed
    #[serde(rename = "rss")]
    Feed,
    /// Plain HTML page
    #[serde(rename = "html")]
    Html,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "rss",
            SourceKind::Html => "html",
        }
    }
}

/// CSS selectors evaluated inside each matched container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl FieldSelectors {
    fn all(&self) -> impl Iterator<Item = &str> {
        [&self.title, &self.date, &self.place, &self.link]
            .into_iter()
            .filter_map(|s| s.as_deref())
    }
}

/// One configured source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Unique display name, also stored as `source_site`
    pub name: String,

    /// Feed or page URL
    pub url: String,

    /// Region tag attached to every event from this source
    pub region: String,

    #[serde(rename = "type")]
    pub kind: SourceKind,

    /// Container selector; enables rule-based HTML extraction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldSelectors>,
}

impl SiteConfig {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        region: impl Into<String>,
        kind: SourceKind,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            region: region.into(),
            kind,
            selector: None,
            fields: None,
        }
    }

    /// Attach a container selector and field selectors.
    pub fn with_rules(mut self, selector: impl Into<String>, fields: FieldSelectors) -> Self {
        self.selector = Some(selector.into());
        self.fields = Some(fields);
        self
    }

    /// Container selector and field selectors, when rule-based extraction applies.
    pub fn rules(&self) -> Option<(&str, FieldSelectors)> {
        self.selector
            .as_deref()
            .map(|container| (container, self.fields.clone().unwrap_or_default()))
    }

    /// Check that the URL and any selectors parse.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("site name is empty"));
        }
        url::Url::parse(&self.url)?;

        if self.kind == SourceKind::Html {
            let selectors = self
                .selector
                .iter()
                .map(String::as_str)
                .chain(self.fields.iter().flat_map(FieldSelectors::all));
            for s in selectors {
                Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))?;
            }
        }
        Ok(())
    }
}

/// Immutable table of configured sources.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<SiteConfig>,
}

impl SiteRegistry {
    /// Build a registry, rejecting duplicate names and invalid entries.
    pub fn new(sites: Vec<SiteConfig>) -> Result<Self> {
        let mut names = HashSet::new();
        for site in &sites {
            site.validate()
                .map_err(|e| AppError::config(format!("site '{}': {e}", site.name)))?;
            if !names.insert(site.name.as_str()) {
                return Err(AppError::config(format!(
                    "duplicate site name '{}'",
                    site.name
                )));
            }
        }
        Ok(Self { sites })
    }

    pub fn get(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteConfig> {
        self.sites.iter()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Restrict the registry to the named sources. Unknown names are an error.
    pub fn filter(&self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self.clone());
        }
        let mut sites = Vec::with_capacity(names.len());
        for name in names {
            let site = self
                .get(name)
                .ok_or_else(|| AppError::config(format!("unknown site '{name}'")))?;
            sites.push(site.clone());
        }
        Ok(Self { sites })
    }

    pub fn count_by_kind(&self, kind: SourceKind) -> usize {
        self.sites.iter().filter(|s| s.kind == kind).count()
    }
}

impl<'a> IntoIterator for &'a SiteRegistry {
    type Item = &'a SiteConfig;
    type IntoIter = std::slice::Iter<'a, SiteConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.sites.iter()
    }
}

/// The sources of the Minami-Shinshu region.
pub(crate) fn default_sites() -> Vec<SiteConfig> {
    use SourceKind::{Feed, Html};

    let mut sites = vec![
        SiteConfig::new(
            "高森町役場",
            "https://www.town.nagano-takamori.lg.jp/oshirase/oshirase/rss.xml",
            "高森町",
            Feed,
        ),
        SiteConfig::new(
            "松川町役場",
            "https://www.town.matsukawa.lg.jp/cgi-bin/feed.php?new1=1",
            "松川町",
            Feed,
        ),
        SiteConfig::new(
            "阿智村役場",
            "https://www.vill.achi.lg.jp/rss/10/list1.xml",
            "阿智村",
            Feed,
        ),
        SiteConfig::new(
            "平谷村役場（新着情報）",
            "https://www.hirayamura.jp/files/rss/block1346.xml",
            "平谷村",
            Feed,
        ),
        SiteConfig::new(
            "平谷村役場（イベント）",
            "https://www.hirayamura.jp/files/rss/block1347.xml",
            "平谷村",
            Feed,
        ),
        SiteConfig::new(
            "泰阜村役場",
            "https://www.vill.yasuoka.nagano.jp/news/rss.xml",
            "泰阜村",
            Feed,
        ),
        SiteConfig::new(
            "喬木村役場",
            "https://www.vill.takagi.lg.jp/category/bunya/kanko/event/index.rss",
            "喬木村",
            Feed,
        ),
        SiteConfig::new(
            "飯田市役所",
            "https://www.city.iida.lg.jp/life/3/16/index-2.html",
            "飯田市",
            Html,
        )
        .with_rules(
            ".event-item",
            FieldSelectors {
                title: Some(".event-title".into()),
                date: Some(".event-date".into()),
                place: Some(".event-place".into()),
                link: Some("a".into()),
            },
        ),
        SiteConfig::new("南信州ナビ", "https://msnav.com/events/", "飯田市", Html).with_rules(
            ".event-list .event",
            FieldSelectors {
                title: Some(".title".into()),
                date: Some(".date".into()),
                place: None,
                link: Some("a".into()),
            },
        ),
    ];

    let generic: [(&str, &str, &str); 19] = [
        ("阿智誘客促進協議会", "http://info.sva.jp/news_cat/news/", "阿智村"),
        ("天空の楽園", "https://sva.jp/nightfes2025/news/", "阿智村"),
        (
            "阿智☆昼神観光局（地域のお知らせ）",
            "https://hirugamionsen.jp/",
            "阿智村",
        ),
        (
            "阿智☆昼神観光局（昼神観光局からのお知らせ）",
            "https://hirugamionsen.jp/news/",
            "阿智村",
        ),
        ("根羽村役場", "https://www.nebamura.jp/nebatopics/news/", "根羽村"),
        ("下条村観光協会", "https://shimojo-kanko.jp/news.html", "下条村"),
        ("売木村役場", "https://www.urugi.jp/latest_news/", "売木村"),
        ("売木村商工会", "https://urugisho.jp/information.html", "売木村"),
        (
            "天龍村役場（お知らせ）",
            "https://www.vill-tenryu.jp/category/notice/",
            "天龍村",
        ),
        (
            "天龍村役場（行政情報）",
            "https://www.vill-tenryu.jp/category/notice/administrative/government_info/",
            "天龍村",
        ),
        (
            "天龍村役場（くらしと手続き）",
            "https://www.vill-tenryu.jp/category/notice/administrative/living_info/",
            "天龍村",
        ),
        (
            "天龍村役場（健康・福祉）",
            "https://www.vill-tenryu.jp/category/notice/administrative/health_welfare/",
            "天龍村",
        ),
        (
            "天龍村役場（子育て・教育）",
            "https://www.vill-tenryu.jp/category/notice/administrative/education/",
            "天龍村",
        ),
        (
            "天龍村役場（観光情報）",
            "https://www.vill-tenryu.jp/category/tourism/tourism_info/",
            "天龍村",
        ),
        (
            "天龍村（イベント総合案内）",
            "https://www.vill-tenryu.jp/tourism/event/event/",
            "天龍村",
        ),
        ("豊丘村役場", "https://www.vill.nagano-toyooka.lg.jp/", "豊丘村"),
        (
            "豊丘村役場（とよおか祭り情報）",
            "https://www.vill.nagano-toyooka.lg.jp/02kankou/toyookamatsuri/",
            "豊丘村",
        ),
        (
            "大鹿村役場（お知らせ）",
            "http://www.vill.ooshika.nagano.jp/category/whatsnew/",
            "大鹿村",
        ),
        ("大鹿村環境協会", "https://ooshika-kanko.com/", "大鹿村"),
    ];

    sites.extend(
        generic
            .into_iter()
            .map(|(name, url, region)| SiteConfig::new(name, url, region, Html)),
    );
    sites
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_is_valid() {
        let registry = SiteRegistry::new(default_sites()).unwrap();
        assert_eq!(registry.len(), 28);
        assert_eq!(registry.count_by_kind(SourceKind::Feed), 7);
        assert_eq!(registry.count_by_kind(SourceKind::Html), 21);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let site = SiteConfig::new("A", "https://a.example/", "r", SourceKind::Html);
        assert!(SiteRegistry::new(vec![site.clone(), site]).is_err());
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let site = SiteConfig::new("A", "https://a.example/", "r", SourceKind::Html)
            .with_rules("[[invalid", FieldSelectors::default());
        assert!(SiteRegistry::new(vec![site]).is_err());
    }

    #[test]
    fn test_site_schema_roundtrip_from_toml() {
        let toml_src = r#"
            name = "南信州ナビ"
            url = "https://msnav.com/events/"
            region = "飯田市"
            type = "html"
            selector = ".event"
            [fields]
            title = ".title"
            date = ".date"
        "#;
        let site: SiteConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(site.kind, SourceKind::Html);
        let (container, fields) = site.rules().unwrap();
        assert_eq!(container, ".event");
        assert_eq!(fields.title.as_deref(), Some(".title"));
        assert!(fields.place.is_none());
    }

    #[test]
    fn test_filter_unknown_site() {
        let registry = SiteRegistry::new(default_sites()).unwrap();
        assert!(registry.filter(&["nope".to_string()]).is_err());
        let one = registry.filter(&["泰阜村役場".to_string()]).unwrap();
        assert_eq!(one.len(), 1);
    }
}
