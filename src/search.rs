//! Tavily web search
//!
//! Search is an optional enrichment. The client never returns an error to the
//! caller: without an API key it says so, and request failures degrade to a
//! fixed text the prompt assembler can include verbatim.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    include_answer: bool,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

pub struct SearchClient {
    client: Client,
    api_key: Option<String>,
}

impl SearchClient {
    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self { client, api_key }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Run a search and format the results for prompt inclusion
    pub async fn search(&self, query: &str) -> String {
        let Some(api_key) = &self.api_key else {
            return "Search functionality is not configured.".to_string();
        };

        let request = TavilyRequest {
            api_key,
            query,
            search_depth: "basic",
            include_answer: true,
            max_results: 3,
        };

        match self.fetch(&request).await {
            Ok(response) => format_results(query, &response),
            Err(e) => {
                log::error!("Web search failed for query \"{}\": {}", query, e);
                format!("Failed to perform search for \"{}\".", query)
            }
        }
    }

    async fn fetch(&self, request: &TavilyRequest<'_>) -> Result<TavilyResponse, String> {
        let response = self
            .client
            .post(TAVILY_ENDPOINT)
            .json(request)
            .send()
            .await
            .map_err(|e| format!("Tavily request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Tavily returned {}: {}", status, body));
        }

        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse Tavily response: {}", e))
    }
}

fn format_results(query: &str, response: &TavilyResponse) -> String {
    let mut out = String::new();

    if let Some(answer) = response.answer.as_deref().filter(|a| !a.trim().is_empty()) {
        out.push_str("Summary: ");
        out.push_str(answer.trim());
        out.push('\n');
    }

    for (i, result) in response.results.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}\n{}\nSource: {}\n",
            i + 1,
            result.title.trim(),
            result.content.trim(),
            result.url.trim()
        ));
    }

    if out.is_empty() {
        return format!("No search results found for \"{}\".", query);
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_client_reports_without_erroring() {
        let client = SearchClient::new(None);
        assert!(!client.is_configured());
        assert_eq!(
            client.search("precio del dólar").await,
            "Search functionality is not configured."
        );
    }

    #[test]
    fn formatting_includes_answer_and_numbered_results() {
        let response = TavilyResponse {
            answer: Some("El dólar cerró a 4.100 COP.".to_string()),
            results: vec![TavilyResult {
                title: "Dólar hoy".to_string(),
                content: "Cotización del día.".to_string(),
                url: "https://example.com/dolar".to_string(),
            }],
        };

        let text = format_results("precio del dólar", &response);
        assert!(text.starts_with("Summary: El dólar cerró"));
        assert!(text.contains("1. Dólar hoy"));
        assert!(text.contains("Source: https://example.com/dolar"));
    }

    #[test]
    fn empty_response_has_fallback_text() {
        let response = TavilyResponse {
            answer: None,
            results: vec![],
        };
        assert_eq!(
            format_results("nada", &response),
            "No search results found for \"nada\"."
        );
    }
}
