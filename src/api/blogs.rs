use super::{segment, ApiClient, ApiError, RequestConfig};
use crate::types::{Blog, BlogQuery, BlogUpdate, NewBlog, Page};

#[derive(Clone)]
pub struct BlogApi {
    client: ApiClient,
}

fn query_config(query: &BlogQuery) -> RequestConfig {
    let mut config = RequestConfig::default();
    if let Some(page) = query.page {
        config = config.query("page", page);
    }
    if let Some(limit) = query.limit {
        config = config.query("limit", limit);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        config = config.query("search", search);
    }
    if let Some(author) = query.author_id.as_deref() {
        config = config.query("author", author);
    }
    config
}

impl BlogApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &BlogQuery) -> Result<Page<Blog>, ApiError> {
        self.client.get_with("/blogs", query_config(query)).await
    }

    pub async fn get(&self, blog_id: &str) -> Result<Blog, ApiError> {
        self.client
            .get(&format!("/blogs/{}", segment(blog_id)?))
            .await
    }

    pub async fn create(&self, blog: &NewBlog) -> Result<Blog, ApiError> {
        self.client.post("/blogs", blog).await
    }

    pub async fn update(&self, blog_id: &str, update: &BlogUpdate) -> Result<Blog, ApiError> {
        self.client
            .put(&format!("/blogs/{}", segment(blog_id)?), update)
            .await
    }
}
