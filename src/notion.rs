//! Notion REST adapter for the remote page store.

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};

use crate::chunk::MAX_BLOCKS_PER_APPEND;
use crate::error::RemoteError;
use crate::model::{Block, NewPage};

pub const DEFAULT_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

const TITLE_PROPERTY: &str = "Title";
const AUTHOR_PROPERTY: &str = "Author";
const COMPLETE_PROPERTY: &str = "Highlights";
const PAGE_ICON: &str = "📙";

/// Page collection holding one page per book.
///
/// Every call is a single request. Nothing here retries or throttles; the
/// caller sequences and spaces out the mutating calls.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn create_page(&self, page: &NewPage) -> Result<String, RemoteError>;

    /// Ids of pages whose title equals `title` exactly.
    async fn query_pages_by_title(&self, title: &str) -> Result<Vec<String>, RemoteError>;

    /// Same as `query_pages_by_title`, restricted to pages not yet marked complete.
    async fn query_incomplete_pages_by_title(&self, title: &str) -> Result<Vec<String>, RemoteError>;

    /// Appends children to a page. More than 100 blocks is rejected.
    async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<(), RemoteError>;

    async fn set_complete(&self, page_id: &str) -> Result<(), RemoteError>;
}

#[derive(Debug, Deserialize)]
struct PageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<PageRef>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

pub struct NotionClient {
    http: Client,
    api_base: String,
    token: String,
    database_id: String,
}

impl NotionClient {
    pub fn new(token: &str, database_id: &str, api_base: &str) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .user_agent(concat!("marginalia/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            database_id: database_id.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder, body: &JsonValue) -> Result<Response, RemoteError> {
        let response = request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn check_status(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.code, body.message),
            Err(_) => (String::new(), text),
        };
        Err(RemoteError::Api { status, code, message })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn query(&self, filter: JsonValue) -> Result<Vec<String>, RemoteError> {
        let url = self.url(&format!("databases/{}/query", self.database_id));
        let response = self.send(self.http.post(&url), &json!({ "filter": filter })).await?;
        let body: QueryResponse = Self::decode(response).await?;
        Ok(body.results.into_iter().map(|page| page.id).collect())
    }
}

#[async_trait]
impl RemoteStore for NotionClient {
    async fn create_page(&self, page: &NewPage) -> Result<String, RemoteError> {
        let body = create_page_body(&self.database_id, page);
        let response = self.send(self.http.post(self.url("pages")), &body).await?;
        let created: PageRef = Self::decode(response).await?;
        Ok(created.id)
    }

    async fn query_pages_by_title(&self, title: &str) -> Result<Vec<String>, RemoteError> {
        self.query(title_filter(title)).await
    }

    async fn query_incomplete_pages_by_title(&self, title: &str) -> Result<Vec<String>, RemoteError> {
        self.query(incomplete_title_filter(title)).await
    }

    async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<(), RemoteError> {
        if blocks.len() > MAX_BLOCKS_PER_APPEND.get() {
            return Err(RemoteError::TooManyBlocks {
                count: blocks.len(),
                limit: MAX_BLOCKS_PER_APPEND.get(),
            });
        }

        let children: Vec<JsonValue> = blocks.iter().map(Block::to_json).collect();
        let url = self.url(&format!("blocks/{}/children", page_id));
        self.send(self.http.patch(&url), &json!({ "children": children })).await?;
        Ok(())
    }

    async fn set_complete(&self, page_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&format!("pages/{}", page_id));
        let body = json!({ "properties": { COMPLETE_PROPERTY: { "checkbox": true } } });
        self.send(self.http.patch(&url), &body).await?;
        Ok(())
    }
}

fn create_page_body(database_id: &str, page: &NewPage) -> JsonValue {
    json!({
        "icon": { "type": "emoji", "emoji": PAGE_ICON },
        "parent": { "type": "database_id", "database_id": database_id },
        "properties": {
            TITLE_PROPERTY: { "title": [{ "text": { "content": page.title } }] },
            AUTHOR_PROPERTY: { "rich_text": [{ "text": { "content": page.author } }] },
        },
    })
}

fn title_filter(title: &str) -> JsonValue {
    json!({ "property": TITLE_PROPERTY, "title": { "equals": title } })
}

fn incomplete_title_filter(title: &str) -> JsonValue {
    json!({
        "and": [
            title_filter(title),
            { "property": COMPLETE_PROPERTY, "checkbox": { "equals": false } },
        ],
    })
}
