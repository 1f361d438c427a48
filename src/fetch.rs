//! Source material from a web page.

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::error::{PipelineError, Result, ValidationError};

const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Extracted text shorter than this is treated as a failed extraction.
pub const MIN_CONTENT_CHARS: usize = 10;
/// A content container must hold more than this to win over the next one.
const MIN_CONTAINER_CHARS: usize = 100;

const CONTAINERS: &[&str] = &[
    "article",
    "[role=\"main\"]",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".content",
    "main",
    "#content",
    ".post",
];

const SKIPPED: &str = "script, style, noscript, nav, footer, header, aside, \
.sidebar, .ad, .advertisement, .comment, .comments, #comments";

/// Validate a user-supplied page address.
pub fn parse_url(raw: &str) -> std::result::Result<Url, ValidationError> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|_| ValidationError::InvalidUrl(raw.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ValidationError::InvalidUrl(raw.to_string())),
    }
}

/// Downloads a page and reduces it to readable text.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    http: Client,
}

impl SourceFetcher {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    pub async fn fetch(&self, raw_url: &str) -> Result<String> {
        let url = parse_url(raw_url)?;
        debug!(url = %url, "fetching source page");

        let resp = self
            .http
            .get(url.clone())
            .header(USER_AGENT, BROWSER_UA)
            .header(ACCEPT, ACCEPT_HTML)
            .send()
            .await
            .map_err(|source| PipelineError::Network {
                context: format!("Failed to fetch {}", url),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Http {
                status: status.as_u16(),
                message: format!("Failed to fetch page: HTTP {}", status.as_u16()),
            });
        }

        let html = resp.text().await.map_err(|source| PipelineError::Network {
            context: format!("Failed to read {}", url),
            source,
        })?;

        let content = extract_text(&html);
        let chars = content.chars().count();
        if chars < MIN_CONTENT_CHARS {
            return Err(PipelineError::Extraction(
                "No usable content could be extracted from the page".to_string(),
            ));
        }

        info!(url = %url, chars, "source page extracted");
        Ok(content)
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collect_text(element: ElementRef<'_>, skip: Option<&Selector>, out: &mut String) {
    for child in element.children() {
        if let Some(el) = ElementRef::wrap(child) {
            if skip.is_some_and(|s| s.matches(&el)) {
                continue;
            }
            collect_text(el, skip, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

fn visible_text(element: ElementRef<'_>, skip: Option<&Selector>) -> String {
    let mut raw = String::new();
    collect_text(element, skip, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(doc: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    let text = doc
        .select(&sel)
        .next()?
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Readable text of an HTML page, prefixed with its title as a heading.
///
/// Takes the first content container holding a meaningful amount of text and
/// falls back to `<body>`; navigation, ads and comment sections are skipped.
pub fn extract_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let skip = selector(SKIPPED);

    let title = first_text(&doc, "title").or_else(|| first_text(&doc, "h1"));

    let mut body = String::new();
    for css in CONTAINERS {
        let Some(sel) = selector(css) else {
            continue;
        };
        if let Some(node) = doc.select(&sel).next() {
            let text = visible_text(node, skip.as_ref());
            if text.chars().count() > MIN_CONTAINER_CHARS {
                body = text;
                break;
            }
        }
    }

    if body.is_empty() {
        body = selector("body")
            .and_then(|sel| doc.select(&sel).next())
            .map(|node| visible_text(node, skip.as_ref()))
            .unwrap_or_default();
    }

    match title {
        Some(title) if !body.is_empty() => format!("# {}\n\n{}", title, body),
        Some(title) => format!("# {}", title),
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn long(word: &str) -> String {
        vec![word; 40].join(" ")
    }

    #[test]
    fn test_parse_url() {
        assert!(parse_url(" https://example.com/post ").is_ok());
        assert_eq!(
            parse_url("not a url").unwrap_err(),
            ValidationError::InvalidUrl("not a url".into())
        );
        assert!(matches!(
            parse_url("ftp://example.com/file"),
            Err(ValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_prefers_article_and_skips_noise() {
        let html = format!(
            "<html><head><title>My Post</title><style>p {{}}</style></head><body>\
<nav>Home About</nav><article><p>{}</p><aside>Related</aside>\
<div class=\"comments\">Nice post!</div><script>track()</script></article>\
<footer>Copyright</footer></body></html>",
            long("story")
        );
        let text = extract_text(&html);
        assert_eq!(text, format!("# My Post\n\n{}", long("story")));
    }

    #[test]
    fn test_short_container_falls_through_to_body() {
        let html = "<html><body><article>tiny</article><p>Body text here</p>\
<footer>foot</footer></body></html>";
        assert_eq!(extract_text(html), "tiny Body text here");
    }

    #[test]
    fn test_h1_used_when_title_missing() {
        let html = "<html><body><h1>Heading</h1><p>Some words</p></body></html>";
        assert_eq!(extract_text(html), "# Heading\n\nHeading Some words");
    }

    #[tokio::test]
    async fn test_fetch_extracts_page() {
        let server = MockServer::start().await;
        let html = format!("<html><head><title>T</title></head><body><main>{}</main></body></html>", long("word"));
        Mock::given(method("GET"))
            .and(path("/post"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
            .mount(&server)
            .await;

        let fetcher = SourceFetcher::new(Client::new());
        let content = fetcher.fetch(&format!("{}/post", server.uri())).await.unwrap();
        assert_eq!(content, format!("# T\n\n{}", long("word")));
    }

    #[tokio::test]
    async fn test_fetch_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html><body>hi</body></html>", "text/html"))
            .mount(&server)
            .await;

        let fetcher = SourceFetcher::new(Client::new());
        let err = fetcher.fetch(&format!("{}/missing", server.uri())).await.unwrap_err();
        assert!(matches!(err, PipelineError::Http { status: 404, .. }));

        let err = fetcher.fetch(&format!("{}/empty", server.uri())).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));

        let err = fetcher.fetch("nope").await.unwrap_err();
        assert!(err.is_validation());
    }
}
