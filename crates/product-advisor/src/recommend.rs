use advisor_common::gemini::GeminiClient;
use advisor_common::serpapi::{SearchResponse, SerpApiClient};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::extract::extract_recommendation;
use crate::fallback::fallback;
use crate::model::{Product, RecommendationResult, SearchSnippet, Source};

const MAX_SNIPPETS: usize = 5;
const MAX_DEBUG_FRAGMENTS: usize = 3;

/// Sequences search, prompt construction, generation, extraction and the
/// local fallback for a single request.
#[derive(Clone)]
pub struct Recommender {
    search: SerpApiClient,
    model: GeminiClient,
}

impl Recommender {
    pub fn new(search: SerpApiClient, model: GeminiClient) -> Self {
        Self { search, model }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let search = SerpApiClient::new(config.search.clone())?;
        let model = GeminiClient::new(config.gemini.clone())?;
        Ok(Self::new(search, model))
    }

    pub fn search_enabled(&self) -> bool {
        self.search.is_enabled()
    }

    pub fn model_configured(&self) -> bool {
        self.model.is_configured()
    }

    /// Produce a recommendation for `query`. Only a failed model call is an
    /// error; search failures and unparseable replies degrade instead.
    pub async fn recommend(
        &self,
        query: &str,
        products: &[Product],
    ) -> Result<RecommendationResult, AppError> {
        let snippets = self.gather_snippets(query).await;
        let prompt = build_prompt(query, products, &snippets)?;

        let response = self.model.generate(&prompt).await?;
        let fragments = candidate_fragments(&response);

        if let Some(result) = fragments.iter().find_map(|f| extract_recommendation(f)) {
            info!(
                ids = ?result.recommended_ids,
                fragments = fragments.len(),
                "model recommendation extracted"
            );
            return Ok(result);
        }

        warn!(
            fragments = fragments.len(),
            "model reply had no structured recommendation, using fallback"
        );
        let mut result = fallback(query, products);
        result.sources = snippets.iter().map(Source::from).collect();
        result.debug = Some(json!({
            "gemini_candidates_tried": fragments
                .iter()
                .take(MAX_DEBUG_FRAGMENTS)
                .collect::<Vec<_>>(),
        }));
        Ok(result)
    }

    async fn gather_snippets(&self, query: &str) -> Vec<SearchSnippet> {
        match self.search.search(query).await {
            Ok(response) => project_snippets(&response),
            Err(e) => {
                warn!(error = %e, "web search failed, continuing without results");
                vec![SearchSnippet {
                    title: "search-error".to_string(),
                    snippet: e.to_string(),
                    link: String::new(),
                }]
            }
        }
    }
}

/// Keep the first few organic results, falling back to `description` for
/// the text and `source` for the link.
pub fn project_snippets(response: &SearchResponse) -> Vec<SearchSnippet> {
    response
        .results()
        .iter()
        .take(MAX_SNIPPETS)
        .map(|r| SearchSnippet {
            title: r.title.clone().unwrap_or_default(),
            snippet: r
                .snippet
                .clone()
                .or_else(|| r.description.clone())
                .unwrap_or_default(),
            link: r
                .link
                .clone()
                .or_else(|| r.source.clone())
                .unwrap_or_default(),
        })
        .collect()
}

pub fn build_prompt(
    query: &str,
    products: &[Product],
    snippets: &[SearchSnippet],
) -> Result<String, AppError> {
    let catalog = serde_json::to_string_pretty(products)?;
    let search = serde_json::to_string_pretty(snippets)?;
    let schema = serde_json::to_string_pretty(&schemars::schema_for!(RecommendationResult))?;

    Ok(format!(
        "You are a shopping assistant. Recommend products from the catalog that best match \
the user's preference, using the web search results as supporting evidence.\n\n\
USER PREFERENCE:\n{query}\n\n\
CATALOG (JSON):\n{catalog}\n\n\
WEB SEARCH RESULTS (JSON):\n{search}\n\n\
Reply with exactly one fenced ```json code block and no other text. The JSON object must \
have the keys \"recommended_ids\" (array of catalog ids, best first), \"reason\" (short \
string) and \"sources\" (array of {{\"title\", \"link\"}} objects taken from the search \
results). It must validate against this JSON schema:\n{schema}\n"
    ))
}

type ShapeMatcher = fn(&Value) -> Vec<String>;

/// Known places where providers put generated text, tried in order.
const SHAPE_MATCHERS: &[ShapeMatcher] = &[candidate_parts, candidate_strings, legacy_output];

/// Every plausible text fragment of a provider response, in matcher order,
/// followed by the whole response serialized as a last resort.
pub fn candidate_fragments(response: &Value) -> Vec<String> {
    let mut fragments: Vec<String> = SHAPE_MATCHERS
        .iter()
        .flat_map(|matcher| matcher(response))
        .collect();
    fragments.push(match response {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    fragments
}

fn candidates(response: &Value) -> &[Value] {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn part_text(part: &Value) -> Option<String> {
    match part {
        Value::String(s) => Some(s.clone()),
        other => other.get("text").and_then(Value::as_str).map(str::to_string),
    }
}

/// `candidates[].content.parts[].text`, or `candidates[].content[]` as a bare
/// list of parts.
fn candidate_parts(response: &Value) -> Vec<String> {
    candidates(response)
        .iter()
        .filter_map(|c| c.get("content"))
        .flat_map(|content| {
            let parts = content
                .get("parts")
                .and_then(Value::as_array)
                .or_else(|| content.as_array());
            parts.into_iter().flatten().filter_map(part_text)
        })
        .collect()
}

/// `candidates[].content` or `candidates[].text` holding a single string.
fn candidate_strings(response: &Value) -> Vec<String> {
    candidates(response)
        .iter()
        .filter_map(|c| {
            c.get("content")
                .and_then(Value::as_str)
                .or_else(|| c.get("text").and_then(Value::as_str))
        })
        .map(str::to_string)
        .collect()
}

/// Older flat shape: `output` as a string, or a list of strings or
/// `{content}` / `{text}` objects.
fn legacy_output(response: &Value) -> Vec<String> {
    match response.get("output") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                other => other
                    .get("content")
                    .and_then(Value::as_str)
                    .or_else(|| other.get("text").and_then(Value::as_str))
                    .map(str::to_string),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use advisor_common::gemini::{GeminiClientConfig, ModelError};
    use advisor_common::serpapi::SerpApiConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::catalog::default_catalog;
    use crate::fallback::FALLBACK_REASON;

    fn gemini_reply(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    fn recommender(search: Option<&MockServer>, model: Option<&MockServer>) -> Recommender {
        let search_config = SerpApiConfig {
            api_key: search.map(|_| "serp-key".to_string()),
            base_url: search.map(|s| s.uri()).unwrap_or_default(),
            timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let model_config = GeminiClientConfig {
            api_key: model.map(|_| "gemini-key".to_string()),
            model: "gemini-test".to_string(),
            base_url: model.map(|s| s.uri()).unwrap_or_default(),
            timeout: Duration::from_millis(500),
            ..Default::default()
        };
        Recommender::new(
            SerpApiClient::new(search_config).unwrap(),
            GeminiClient::new(model_config).unwrap(),
        )
    }

    async fn mount_model(server: &MockServer, body: Value) {
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn mount_search(server: &MockServer, body: Value) {
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn from_config_reflects_provider_keys() {
        let config = Config::from_vars(|name| {
            (name == "GEMINI_API_KEY").then(|| "gem".to_string())
        })
        .unwrap();
        let recommender = Recommender::from_config(&config).unwrap();
        assert!(recommender.model_configured());
        assert!(!recommender.search_enabled());
    }

    #[test]
    fn fragments_from_parts_shape() {
        let response = json!({
            "candidates": [
                { "content": { "parts": [{ "text": "one" }, { "text": "two" }] } },
                { "content": { "parts": [{ "inlineData": {} }, { "text": "three" }] } }
            ]
        });
        let fragments = candidate_fragments(&response);
        assert_eq!(&fragments[..3], ["one", "two", "three"]);
        assert_eq!(fragments.len(), 4);
        assert_eq!(fragments[3], response.to_string());
    }

    #[test]
    fn fragments_from_string_and_list_content() {
        let response = json!({
            "candidates": [
                { "content": "whole string" },
                { "content": ["bare part", { "text": "object part" }] }
            ]
        });
        let fragments = candidate_fragments(&response);
        assert_eq!(&fragments[..3], ["bare part", "object part", "whole string"]);
    }

    #[test]
    fn fragments_from_legacy_output() {
        let response = json!({ "output": [{ "content": "legacy" }, "plain", { "other": 1 }] });
        let fragments = candidate_fragments(&response);
        assert_eq!(&fragments[..2], ["legacy", "plain"]);
        assert_eq!(fragments.len(), 3);

        let fragments = candidate_fragments(&json!({ "output": "flat" }));
        assert_eq!(fragments[0], "flat");
    }

    #[test]
    fn unknown_shape_still_yields_last_resort_fragment() {
        let fragments = candidate_fragments(&json!({ "error": { "message": "quota" } }));
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].contains("quota"));

        let fragments = candidate_fragments(&Value::String("raw text".to_string()));
        assert_eq!(fragments, vec!["raw text"]);
    }

    #[test]
    fn snippets_are_truncated_and_use_secondary_fields() {
        let response: SearchResponse = serde_json::from_value(json!({
            "organic_results": [
                { "title": "t0", "description": "d0", "source": "s0" },
                { "title": "t1", "snippet": "s1", "description": "ignored", "link": "l1" },
                { "title": "t2" }, { "title": "t3" }, { "title": "t4" }, { "title": "t5" }
            ]
        }))
        .unwrap();
        let snippets = project_snippets(&response);
        assert_eq!(snippets.len(), 5);
        assert_eq!(
            snippets[0],
            SearchSnippet {
                title: "t0".to_string(),
                snippet: "d0".to_string(),
                link: "s0".to_string()
            }
        );
        assert_eq!(snippets[1].snippet, "s1");
        assert_eq!(snippets[1].link, "l1");
        assert_eq!(snippets[2].snippet, "");
    }

    #[test]
    fn prompt_embeds_query_catalog_snippets_and_instruction() {
        let snippets = vec![SearchSnippet {
            title: "Phone review".to_string(),
            snippet: "great battery".to_string(),
            link: "https://review.example".to_string(),
        }];
        let prompt = build_prompt("a phone under $500", &default_catalog(), &snippets).unwrap();
        assert!(prompt.contains("a phone under $500"));
        assert!(prompt.contains("\"Moto G Power\""));
        assert!(prompt.contains("https://review.example"));
        assert!(prompt.contains("```json"));
        assert!(prompt.contains("\"recommended_ids\""));
        assert!(prompt.contains("\"sources\""));
    }

    #[tokio::test]
    async fn fenced_model_reply_is_returned() {
        let search = MockServer::start().await;
        let model = MockServer::start().await;
        mount_search(
            &search,
            json!({ "organic_results": [{ "title": "r", "snippet": "s", "link": "https://r.example" }] }),
        )
        .await;
        mount_model(
            &model,
            gemini_reply(
                "Sure! ```json\n{\"recommended_ids\":[\"p1\"],\"reason\":\"ok\",\"sources\":[{\"title\":\"m\",\"link\":\"https://m.example\"}]}\n```",
            ),
        )
        .await;

        let result = recommender(Some(&search), Some(&model))
            .recommend("phone", &default_catalog())
            .await
            .unwrap();
        assert_eq!(result.recommended_ids, vec!["p1"]);
        assert_eq!(result.reason, "ok");
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].link, "https://m.example");
        assert!(result.debug.is_none());
    }

    #[tokio::test]
    async fn prose_reply_falls_back_with_debug() {
        let search = MockServer::start().await;
        let model = MockServer::start().await;
        mount_search(
            &search,
            json!({ "organic_results": [{ "title": "Deals", "snippet": "cheap", "link": "https://deals.example" }] }),
        )
        .await;
        mount_model(&model, gemini_reply("I would go with the Pixel, honestly.")).await;

        let result = recommender(Some(&search), Some(&model))
            .recommend("I want a phone under $500", &default_catalog())
            .await
            .unwrap();
        assert_eq!(result.recommended_ids, vec!["p1", "p2", "p5"]);
        assert_eq!(result.reason, FALLBACK_REASON);
        assert_eq!(
            result.sources,
            vec![Source {
                title: "Deals".to_string(),
                link: "https://deals.example".to_string()
            }]
        );
        let tried = result.debug.unwrap()["gemini_candidates_tried"]
            .as_array()
            .unwrap()
            .clone();
        assert!(!tried.is_empty());
        assert!(tried.len() <= MAX_DEBUG_FRAGMENTS);
        assert_eq!(tried[0], "I would go with the Pixel, honestly.");
    }

    #[tokio::test]
    async fn search_failure_is_substituted() {
        let search = MockServer::start().await;
        let model = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&search)
            .await;
        mount_model(&model, gemini_reply("no idea")).await;

        let result = recommender(Some(&search), Some(&model))
            .recommend("phone", &default_catalog())
            .await
            .unwrap();
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].title, "search-error");
        assert_eq!(result.sources[0].link, "");
    }

    #[tokio::test]
    async fn search_error_message_reaches_the_prompt() {
        let search = MockServer::start().await;
        let model = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance window"))
            .mount(&search)
            .await;
        Mock::given(method("POST"))
            .and(wiremock::matchers::body_string_contains("maintenance window"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply(
                "```json\n{\"recommended_ids\": [\"p2\"], \"reason\": \"r\", \"sources\": []}\n```",
            )))
            .expect(1)
            .mount(&model)
            .await;

        let result = recommender(Some(&search), Some(&model))
            .recommend("phone", &default_catalog())
            .await
            .unwrap();
        assert_eq!(result.recommended_ids, vec!["p2"]);
    }

    #[tokio::test]
    async fn disabled_search_yields_no_sources_on_fallback() {
        let model = MockServer::start().await;
        mount_model(&model, json!({ "unexpected": true })).await;

        let result = recommender(None, Some(&model))
            .recommend("headphones", &default_catalog())
            .await
            .unwrap();
        assert_eq!(result.recommended_ids[0], "p6");
        assert!(result.sources.is_empty());
        let debug = result.debug.unwrap();
        assert_eq!(debug["gemini_candidates_tried"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn later_candidate_can_carry_the_answer() {
        let model = MockServer::start().await;
        mount_model(
            &model,
            json!({
                "candidates": [
                    { "content": { "parts": [{ "text": "thinking..." }] } },
                    { "content": { "parts": [{ "text": "{\"recommended_ids\": [\"p4\"]}" }] } }
                ]
            }),
        )
        .await;

        let result = recommender(None, Some(&model))
            .recommend("phone", &default_catalog())
            .await
            .unwrap();
        assert_eq!(result.recommended_ids, vec!["p4"]);
        assert_eq!(result.reason, "");
    }

    #[tokio::test]
    async fn missing_model_key_is_fatal() {
        let err = recommender(None, None)
            .recommend("phone", &default_catalog())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Model(ModelError::MissingApiKey)));
    }

    #[tokio::test]
    async fn model_timeout_is_fatal() {
        let model = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(gemini_reply("late"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&model)
            .await;

        let err = recommender(None, Some(&model))
            .recommend("phone", &default_catalog())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Model(ModelError::Timeout(_))));
    }
}
