//! Turns uploaded files or a listing URL into model-ready artifacts.
//!
//! File mode base64-encodes every file as inline media. URL mode fetches the
//! page, strips boilerplate and produces a single plain-text artifact.

use std::sync::{Arc, LazyLock};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::AnalysisError;
use crate::schema::FileMetadata;

pub const UNKNOWN_DOCUMENT: &str = "Unknown Document";
pub const WEB_LISTING: &str = "Listing (Web)";
const TEXT_PLAIN: &str = "text/plain";
const OCTET_STREAM: &str = "application/octet-stream";

/// Character budget for scraped page text sent to the model.
const MAX_PAGE_CHARS: usize = 150_000;
/// Elements whose trimmed text is this short are navigation noise.
const MIN_ELEMENT_CHARS: usize = 20;

static BOILERPLATE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script, style, nav, footer").expect("valid selector"));
static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static META_DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[name="description"]"#).expect("valid selector")
});
static CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, p, li").expect("valid selector"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// A file as received from the uploader, with its label attached.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
    pub declared_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactPayload {
    /// Passed verbatim as a delimited text block.
    Text(String),
    /// Passed as inline media.
    Base64(String),
}

/// One normalized input unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub mime_type: String,
    pub payload: ArtifactPayload,
    pub declared_type: String,
}

/// Artifacts plus the metadata recorded on the stored project.
#[derive(Debug, Clone)]
pub struct NormalizedInput {
    pub artifacts: Vec<Artifact>,
    pub files: Vec<FileMetadata>,
    /// Page title in URL mode.
    pub title: Option<String>,
}

/// Fetches listing pages.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, AnalysisError>;
}

/// Fetches pages over HTTP with a browser-like user agent.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, AnalysisError> {
        let fetch_error = |status: Option<u16>, reason: String| AnalysisError::Fetch {
            url: url.to_string(),
            status,
            reason,
        };

        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| fetch_error(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(Some(status.as_u16()), format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| fetch_error(Some(status.as_u16()), e.to_string()))
    }
}

/// Produces artifacts from either input mode.
#[derive(Clone)]
pub struct Normalizer {
    fetcher: Arc<dyn PageFetcher>,
}

impl Normalizer {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// File mode: every file becomes a base64 inline-media artifact.
    pub fn from_files(&self, files: Vec<UploadedFile>) -> Result<NormalizedInput, AnalysisError> {
        if files.is_empty() {
            return Err(AnalysisError::input("No files provided"));
        }

        let mut artifacts = Vec::with_capacity(files.len());
        let mut metadata = Vec::with_capacity(files.len());

        for file in files {
            let mime_type = resolve_mime_type(&file.filename, file.mime_type.as_deref());
            let declared_type = file
                .declared_type
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNKNOWN_DOCUMENT.to_string());

            debug!(
                "Normalized file {} ({} bytes, {}) as {}",
                file.filename,
                file.bytes.len(),
                mime_type,
                declared_type
            );

            metadata.push(FileMetadata {
                id: fingerprint(&file.bytes),
                name: file.filename,
                size: file.bytes.len() as u64,
                mime_type: mime_type.clone(),
            });
            artifacts.push(Artifact {
                mime_type,
                payload: ArtifactPayload::Base64(BASE64.encode(&file.bytes)),
                declared_type,
            });
        }

        info!("Normalized {} uploaded files", artifacts.len());

        Ok(NormalizedInput {
            artifacts,
            files: metadata,
            title: None,
        })
    }

    /// URL mode: fetch, scrape and wrap the listing page as one text artifact.
    pub async fn from_url(&self, url: &str) -> Result<NormalizedInput, AnalysisError> {
        let url = parse_listing_url(url)?;
        info!("Fetching listing: {}", url);

        let html = self.fetcher.fetch(&url).await?;
        let listing = extract_listing(&html);
        let document = listing.to_document(url.as_str());

        info!(
            "Extracted {} elements ({} chars) from {}",
            listing.paragraphs.len(),
            document.len(),
            url
        );

        let name = if listing.title.is_empty() {
            url.to_string()
        } else {
            listing.title.clone()
        };

        Ok(NormalizedInput {
            files: vec![FileMetadata {
                id: fingerprint(document.as_bytes()),
                name,
                size: listing.content_len() as u64,
                mime_type: "url".to_string(),
            }],
            artifacts: vec![Artifact {
                mime_type: TEXT_PLAIN.to_string(),
                payload: ArtifactPayload::Text(document),
                declared_type: WEB_LISTING.to_string(),
            }],
            title: Some(listing.title).filter(|t| !t.is_empty()),
        })
    }
}

/// Text extracted from a listing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapedListing {
    pub title: String,
    pub description: String,
    /// Heading, paragraph and list-item texts in document order.
    pub paragraphs: Vec<String>,
}

impl ScrapedListing {
    pub fn content_len(&self) -> usize {
        self.paragraphs.iter().map(|p| p.len() + 1).sum()
    }

    /// Render as the plain-text document handed to the model.
    pub fn to_document(&self, url: &str) -> String {
        let mut content = String::new();
        for paragraph in &self.paragraphs {
            content.push_str(paragraph);
            content.push('\n');
        }
        let document = format!(
            "Title: {}\nURL: {}\nDescription: {}\n\nContent:\n{}",
            self.title, url, self.description, content
        );
        truncate_for_context(&document, MAX_PAGE_CHARS).to_string()
    }
}

/// Strip scripts, styles, navigation and footers, then collect the text.
pub fn extract_listing(html: &str) -> ScrapedListing {
    let mut document = Html::parse_document(html);

    let boilerplate: Vec<_> = document.select(&BOILERPLATE).map(|el| el.id()).collect();
    for id in boilerplate {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    // Detached subtrees stay in the arena; only walk what is still attached.
    let root = document.root_element();

    let title = root
        .select(&HEADING)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| root.select(&TITLE).next().map(element_text))
        .unwrap_or_default();

    let description = root
        .select(&META_DESCRIPTION)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .unwrap_or_default();

    let paragraphs = root
        .select(&CONTENT)
        .map(element_text)
        .filter(|text| text.chars().count() > MIN_ELEMENT_CHARS)
        .collect();

    ScrapedListing {
        title,
        description,
        paragraphs,
    }
}

/// Pair uploaded files with a positional list of labels, once, at the edge.
///
/// `None` means the uploader sent no labels at all, in which case each label
/// is guessed from the filename. Entries missing from a short list stay
/// unlabelled.
pub fn pair_declared_types(
    mut files: Vec<UploadedFile>,
    declared_types: Option<Vec<String>>,
) -> Vec<UploadedFile> {
    match declared_types {
        Some(types) => {
            let mut types = types.into_iter();
            for file in &mut files {
                file.declared_type = types.next();
            }
        }
        None => {
            for file in &mut files {
                file.declared_type = Some(infer_declared_type(&file.filename).to_string());
            }
        }
    }
    files
}

/// Guess the document category from a Danish filename.
pub fn infer_declared_type(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.contains("tilstand") {
        "Tilstandsrapport"
    } else if lower.contains("el") && lower.contains("rapport") {
        "Elinstallationsrapport"
    } else if lower.contains("energi") {
        "Energimærke"
    } else if lower.contains("salg") || lower.contains("opstilling") {
        "Salgsopstilling"
    } else if lower.contains("ejendomsdata") {
        "Ejendomsdatarapport"
    } else {
        UNKNOWN_DOCUMENT
    }
}

/// Keep the uploader's MIME type unless it is missing or generic.
fn resolve_mime_type(filename: &str, provided: Option<&str>) -> String {
    match provided.map(str::trim) {
        Some(m) if !m.is_empty() && m != OCTET_STREAM => m.to_string(),
        _ => mime_from_extension(filename).to_string(),
    }
}

fn mime_from_extension(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "txt" => TEXT_PLAIN,
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => OCTET_STREAM,
    }
}

fn parse_listing_url(raw: &str) -> Result<Url, AnalysisError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AnalysisError::input("URL is required"));
    }
    let url = Url::parse(raw).map_err(|e| AnalysisError::input(format!("Invalid URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(AnalysisError::input(format!(
            "Unsupported URL scheme '{}'",
            scheme
        ))),
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn truncate_for_context(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
