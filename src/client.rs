//! HTTP transport for the drawer API: listing fetches and payload downloads.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::cookies::cookie_header;
use crate::model::ListingPage;

/// Browser-like headers the drawer API expects, as exported alongside the
/// session cookies.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/5.36";
const ACCEPT: &str = "application/json+javascript";

/// Seam between the pipeline and the remote service, so the crawler and
/// download pool can run against test doubles.
#[async_trait]
pub trait DrawerApi: Send + Sync {
    /// GET a listing page and parse it. Any transport or parse failure is
    /// an error; the caller decides whether it halts the run.
    async fn fetch_listing(&self, url: &str) -> Result<ListingPage>;

    /// GET one item's payload bytes.
    async fn fetch_payload(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct DrawerClient {
    http: Client,
    cookie_header: String,
}

impl fmt::Debug for DrawerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawerClient").finish_non_exhaustive()
    }
}

impl DrawerClient {
    pub fn new(cookies: &HashMap<String, String>) -> Self {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            cookie_header: cookie_header(cookies),
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header(header::ACCEPT, ACCEPT)
            .header(header::COOKIE, &self.cookie_header)
    }
}

/// Payload downloads go through the attachment form of the item URL.
fn attach_url(url: &str) -> String {
    format!("{}?attach", url)
}

#[async_trait]
impl DrawerApi for DrawerClient {
    async fn fetch_listing(&self, url: &str) -> Result<ListingPage> {
        let res = self
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to reach listing endpoint: {}", url))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("listing request failed ({}): {}", status, body));
        }
        let raw: Value = res
            .json()
            .await
            .context("listing response is not valid JSON")?;
        ListingPage::from_value(raw).context("listing response has malformed items")
    }

    async fn fetch_payload(&self, url: &str) -> Result<Vec<u8>> {
        let res = self
            .get(&attach_url(url))
            .send()
            .await
            .with_context(|| format!("failed to reach payload URL: {}", url))?;
        if !res.status().is_success() {
            return Err(anyhow!("payload request failed ({}): {}", res.status(), url));
        }
        let bytes = res
            .bytes()
            .await
            .with_context(|| format!("failed to read payload body: {}", url))?;
        Ok(bytes.to_vec())
    }
}
