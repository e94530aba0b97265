use newsdeck_core::{Item, ItemId, StoryList};
use reqwest::{Client, StatusCode};
use snafu::{OptionExt as _, ResultExt as _, Snafu};
use tracing::debug;
use url::Url;

pub const HN_API_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0/";
pub const DEFAULT_USER_AGENT: &str = concat!("newsdeck/", env!("CARGO_PKG_VERSION"));

const LOG_TARGET: &str = "newsdeck::source";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    #[snafu(display("Failed to build HTTP client"))]
    ClientBuild { source: reqwest::Error },
    #[snafu(display("Invalid URL"))]
    Url { source: url::ParseError },
    #[snafu(display("HTTP request failed"))]
    Http { source: reqwest::Error },
    #[snafu(display("Unexpected HTTP status: {status}"))]
    Status { status: StatusCode },
    #[snafu(display("Failed to decode response"))]
    Decode { source: serde_json::Error },
    #[snafu(display("Request timed out after {}ms", timeout.as_millis()))]
    Timeout { timeout: std::time::Duration },
    #[snafu(display("Item does not exist or was removed"))]
    Missing,
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Upstream provider of item id lists and item details
#[async_trait::async_trait]
pub trait ItemSource: Send + Sync {
    async fn fetch_id_list(&self, list: StoryList) -> SourceResult<Vec<ItemId>>;

    async fn fetch_item(&self, item_id: ItemId) -> SourceResult<Item>;
}

/// [`ItemSource`] backed by the public Hacker News Firebase API
#[derive(Debug, Clone)]
pub struct HnApiSource {
    client: Client,
    base_url: Url,
}

#[bon::bon]
impl HnApiSource {
    /// `base_url` defaults to [`HN_API_BASE_URL`]; a missing trailing `/` is
    /// added.
    #[builder]
    pub fn new(
        base_url: Option<Url>,
        #[builder(default = DEFAULT_USER_AGENT.to_owned())] user_agent: String,
    ) -> SourceResult<Self> {
        let mut base_url = match base_url {
            Some(url) => url,
            None => Url::parse(HN_API_BASE_URL).context(UrlSnafu)?,
        };
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn id_list_url(&self, list: StoryList) -> SourceResult<Url> {
        self.base_url.join(&list.endpoint()).context(UrlSnafu)
    }

    pub fn item_url(&self, item_id: ItemId) -> SourceResult<Url> {
        self.base_url
            .join(&format!("item/{item_id}.json"))
            .context(UrlSnafu)
    }

    async fn get_bytes(&self, url: Url) -> SourceResult<Vec<u8>> {
        debug!(target: LOG_TARGET, %url, "Requesting");

        let response = self.client.get(url).send().await.context(HttpSnafu)?;

        let status = response.status();
        if !status.is_success() {
            return StatusSnafu { status }.fail();
        }

        Ok(response.bytes().await.context(HttpSnafu)?.to_vec())
    }
}

/// Decode an item response body
///
/// The API answers `null` for ids it doesn't know. Deleted or killed items
/// are still valid answers and come back with [`Item::is_removed`] set.
pub fn decode_item(bytes: &[u8]) -> SourceResult<Item> {
    let item: Option<Item> = serde_json::from_slice(bytes).context(DecodeSnafu)?;

    item.context(MissingSnafu)
}

pub fn decode_id_list(bytes: &[u8]) -> SourceResult<Vec<ItemId>> {
    serde_json::from_slice(bytes).context(DecodeSnafu)
}

#[async_trait::async_trait]
impl ItemSource for HnApiSource {
    async fn fetch_id_list(&self, list: StoryList) -> SourceResult<Vec<ItemId>> {
        let bytes = self.get_bytes(self.id_list_url(list)?).await?;
        decode_id_list(&bytes)
    }

    async fn fetch_item(&self, item_id: ItemId) -> SourceResult<Item> {
        let bytes = self.get_bytes(self.item_url(item_id)?).await?;
        decode_item(&bytes)
    }
}
