//! Listing adapters: turn a news listing page into records and walk its pagination.

use std::time::Duration;

use fsumi_core::NewsRecord;
use fsumi_storage::{FetchError, HttpFetcher};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

pub const CRATE_NAME: &str = "fsumi-adapters";

pub const FS_UMI_LISTING_URL: &str = "https://www.fs-umi.ac.ma/index.php/actualites/";
pub const FS_UMI_ORIGIN: &str = "https://www.fs-umi.ac.ma";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
    #[error("invalid origin {origin:?}: {source}")]
    Origin {
        origin: String,
        #[source]
        source: url::ParseError,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// A paginated listing of news articles.
pub trait ListingAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// Page 1 is the listing itself; later pages live under `page/{n}/`.
    fn listing_url(&self, page: u32) -> String;

    fn parse_listing(&self, html: &str) -> Result<Vec<NewsRecord>, AdapterError>;
}

struct ArticleSelectors {
    article: Selector,
    title_link: Selector,
    date: Selector,
    image: Selector,
    category: Selector,
}

impl ArticleSelectors {
    fn neve_blog() -> Result<Self, AdapterError> {
        Ok(Self {
            article: selector("article")?,
            title_link: selector("h2.blog-entry-title a")?,
            date: selector("time.entry-date")?,
            image: selector(".nv-post-thumbnail-wrap img")?,
            category: selector(".meta.category a")?,
        })
    }
}

/// The FS-UMI faculty news listing (WordPress, Neve theme).
pub struct FsUmiNewsAdapter {
    listing_url: String,
    origin: String,
    origin_url: Url,
    selectors: ArticleSelectors,
}

impl std::fmt::Debug for FsUmiNewsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsUmiNewsAdapter")
            .field("listing_url", &self.listing_url)
            .field("origin", &self.origin)
            .finish()
    }
}

impl FsUmiNewsAdapter {
    pub fn new(listing_url: impl Into<String>, origin: &str) -> Result<Self, AdapterError> {
        let origin_url = Url::parse(origin).map_err(|source| AdapterError::Origin {
            origin: origin.to_string(),
            source,
        })?;
        let mut listing_url = listing_url.into();
        if !listing_url.ends_with('/') {
            listing_url.push('/');
        }
        Ok(Self {
            listing_url,
            origin: origin.trim_end_matches('/').to_string(),
            origin_url,
            selectors: ArticleSelectors::neve_blog()?,
        })
    }

    pub fn fs_umi() -> Result<Self, AdapterError> {
        Self::new(FS_UMI_LISTING_URL, FS_UMI_ORIGIN)
    }

    /// Absolute links pass through; root-relative ones are prefixed with the origin.
    pub fn absolutize(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            return link.to_string();
        }
        if link.starts_with('/') && !link.starts_with("//") {
            return format!("{}{link}", self.origin);
        }
        self.origin_url
            .join(link)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("{}/{link}", self.origin))
    }

    fn parse_article(&self, article: ElementRef<'_>) -> Option<NewsRecord> {
        let anchor = article.select(&self.selectors.title_link).next();
        let title = anchor.and_then(element_text)?;
        let link = anchor
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())?;

        let date = first_text(article, &self.selectors.date).unwrap_or_default();
        let image = first_attr(article, &self.selectors.image, "src").unwrap_or_default();
        let categories = all_texts(article, &self.selectors.category);

        Some(
            NewsRecord::new(title, self.absolutize(link))
                .with_date(date)
                .with_image_url(image)
                .with_categories(categories),
        )
    }
}

impl ListingAdapter for FsUmiNewsAdapter {
    fn source_id(&self) -> &'static str {
        "fs-umi-actualites"
    }

    fn listing_url(&self, page: u32) -> String {
        if page <= 1 {
            self.listing_url.clone()
        } else {
            format!("{}page/{page}/", self.listing_url)
        }
    }

    fn parse_listing(&self, html: &str) -> Result<Vec<NewsRecord>, AdapterError> {
        let document = Html::parse_document(html);
        let mut records = Vec::new();
        for (idx, article) in document.select(&self.selectors.article).enumerate() {
            match self.parse_article(article) {
                Some(record) => records.push(record),
                None => debug!(index = idx, "skipping article without title or link"),
            }
        }
        Ok(records)
    }
}

/// Outcome of fetching one listing page.
#[derive(Debug)]
pub struct PageFetch {
    pub page: u32,
    pub url: String,
    pub result: Result<Vec<NewsRecord>, AdapterError>,
}

pub async fn fetch_page(
    http: &HttpFetcher,
    adapter: &dyn ListingAdapter,
    url: &str,
) -> Result<Vec<NewsRecord>, AdapterError> {
    info!("fetching page: {url}");
    let resp = http.fetch_text(url).await?;
    let records = adapter.parse_listing(&resp.body)?;
    info!("found {} news items on page", records.len());
    Ok(records)
}

/// Fetches pages `1..=pages` in order, sleeping `delay` between consecutive pages.
/// A failed page is reported in its `PageFetch` and does not stop the walk.
pub async fn fetch_listing_pages(
    http: &HttpFetcher,
    adapter: &dyn ListingAdapter,
    pages: u32,
    delay: Duration,
) -> Vec<PageFetch> {
    let mut out = Vec::with_capacity(pages as usize);
    for page in 1..=pages {
        let url = adapter.listing_url(page);
        let result = fetch_page(http, adapter, &url).await;
        if let Err(err) = &result {
            error!("error fetching page {url}: {err}");
        }
        out.push(PageFetch { page, url, result });

        if page < pages && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    out
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    text_or_none(element.text().collect::<String>())
}

fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope.select(sel).next().and_then(element_text)
}

fn all_texts(scope: ElementRef<'_>, sel: &Selector) -> Vec<String> {
    scope.select(sel).filter_map(element_text).collect()
}

fn first_attr(scope: ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    scope
        .select(sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(|s| text_or_none(s.to_string()))
}
