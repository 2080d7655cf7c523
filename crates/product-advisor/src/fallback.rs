use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Product, RecommendationResult};

/// Reason attached to every heuristic recommendation.
pub const FALLBACK_REASON: &str =
    "The AI model did not return machine-readable output, so these picks come from a local \
keyword and price match against the catalog.";

const MAX_RECOMMENDATIONS: usize = 3;

static PRICE_CEILING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:under|below|<)\s*\$?\s*(\d{1,6})").expect("valid regex")
});

/// Parse a price ceiling such as "under $500", "below 300" or "<250" from a
/// lower-cased query.
pub fn max_price(query_lower: &str) -> Option<f64> {
    PRICE_CEILING
        .captures(query_lower)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn score(product: &Product, tokens: &[&str]) -> usize {
    let name = product.name.to_lowercase();
    let category = product.category.to_lowercase();
    let features = product
        .features
        .iter()
        .map(|f| f.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    tokens
        .iter()
        .filter(|t| name.contains(**t) || category.contains(**t) || features.contains(**t))
        .count()
}

/// Deterministic catalog-only recommendation used when the model reply
/// cannot be parsed. Sources are left empty for the caller to fill in.
pub fn fallback(query: &str, products: &[Product]) -> RecommendationResult {
    let query = query.to_lowercase();
    let ceiling = max_price(&query);
    let tokens: Vec<&str> = query.split_whitespace().collect();

    let mut scored: Vec<(usize, &Product)> = products
        .iter()
        .filter(|p| ceiling.is_none_or(|max| p.price <= max))
        .map(|p| (score(p, &tokens), p))
        .collect();
    // stable: equal scores keep catalog order
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    RecommendationResult {
        recommended_ids: scored
            .into_iter()
            .take(MAX_RECOMMENDATIONS)
            .map(|(_, p)| p.id.clone())
            .collect(),
        reason: FALLBACK_REASON.to_string(),
        sources: Vec::new(),
        debug: None,
    }
}
