use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A purchasable catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier, e.g. "p1"
    pub id: String,
    pub name: String,
    /// Non-negative price in the store currency
    pub price: f64,
    /// Category, e.g. "phone", "headphones"
    pub category: String,
    /// Ordered feature list shown to shoppers and scored by the fallback
    #[serde(default)]
    pub features: Vec<String>,
}

/// A condensed web search result handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSnippet {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

/// A citation returned alongside a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Source {
    /// Human-readable title of the cited page
    pub title: String,
    /// URL of the cited page
    pub link: String,
}

impl From<&SearchSnippet> for Source {
    fn from(snippet: &SearchSnippet) -> Self {
        Self {
            title: snippet.title.clone(),
            link: snippet.link.clone(),
        }
    }
}

/// The sole response payload of a recommendation request.
///
/// `recommended_ids` is always present but is not guaranteed to reference
/// catalog entries; consumers filter against their catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecommendationResult {
    /// Catalog product ids, best match first
    pub recommended_ids: Vec<String>,
    /// One or two sentences explaining the choice
    pub reason: String,
    /// Pages that informed the choice
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub debug: Option<Value>,
}

/// Inbound body of `POST /api/recommend`. Both fields are optional on the
/// wire so a missing query can be reported as a client error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub products: Option<Vec<Product>>,
}
