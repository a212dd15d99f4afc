use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

pub const OFF_API_BASE: &str = "https://world.openfoodfacts.org";
pub const OFF_PRODUCT_URL: &str = "https://world.openfoodfacts.org/product";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// The one failure kind of the feed: transport errors, non-success statuses and
/// undecodable bodies all collapse into a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self::new(format!("request failed with status {status}"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::new("request timed out");
        }
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("malformed response body: {err}"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    products_endpoint: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("openfoodfacts client user agent required");
        }

        let http = HttpClient::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .context("build openfoodfacts HTTP client")?;

        let base = config.base_url.as_deref().unwrap_or(OFF_API_BASE).trim();
        let mut base = Url::parse(base).with_context(|| format!("parse api base url {base:?}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let products_endpoint = base
            .join("products.json")
            .context("build products endpoint url")?;

        Ok(Client {
            http,
            user_agent: config.user_agent,
            products_endpoint,
        })
    }

    pub fn products_url(&self, page: u32, page_size: u32) -> Url {
        let mut url = self.products_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("page_size", &page_size.to_string());
        url
    }

    pub fn products(&self, page: u32, page_size: u32) -> Result<ProductPage, FetchError> {
        let url = self.products_url(page, page_size);
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(status));
        }

        let body = response.text()?;
        let page: ProductPage = serde_json::from_str(&body)?;
        Ok(page)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPage {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub count: Option<u64>,
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub image_front_small_url: Option<String>,
    #[serde(default, deserialize_with = "tags_or_empty")]
    pub categories_hierarchy: Vec<String>,
    #[serde(default, deserialize_with = "tags_or_empty")]
    pub ingredients_tags: Vec<String>,
    #[serde(default)]
    pub nutrition_grades: Option<String>,
}

impl Product {
    /// Name shown on the card. Empty names count as absent.
    pub fn display_name(&self) -> Option<&str> {
        self.product_name.as_deref().filter(|name| !name.is_empty())
    }

    pub fn identifier(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or(self.code.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn page_url(&self) -> Option<String> {
        let code = self
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .or_else(|| self.identifier())?;
        Some(format!("{}/{}", OFF_PRODUCT_URL, code))
    }
}

// The catalog occasionally sends `null` where a tag list is expected.
fn tags_or_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

// Counters arrive as numbers on some mirrors and as numeric strings on others.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(number)) => number.as_u64(),
        Some(serde_json::Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}
