use async_trait::async_trait;
use tracing::{info, warn};

use super::{LlmProvider, LlmRequest};
use crate::digest::{LinkSummarizer, Summarizer};
use crate::model::Item;

/// Summarizes a group of items through an LLM, one short bullet per item.
/// Any provider failure or empty answer degrades to plain links.
pub struct LlmSummarizer<P: LlmProvider> {
    provider: P,
}

impl<P: LlmProvider> LlmSummarizer<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    async fn try_summarize(&self, items: &[Item]) -> anyhow::Result<Vec<String>> {
        let request = LlmRequest {
            prompt: build_prompt(items),
            max_tokens: None,
            temperature: Some(0.2),
            timeout_seconds: None,
        };
        let response = self.provider.generate(request).await?;
        info!(
            "LLM summarization: {} items, {} tokens ({})",
            items.len(),
            response.usage.total_tokens,
            response.model
        );
        Ok(parse_bullets(&response.content))
    }
}

#[async_trait]
impl<P: LlmProvider> Summarizer for LlmSummarizer<P> {
    async fn summarize(&self, items: &[Item]) -> anyhow::Result<Vec<String>> {
        match self.try_summarize(items).await {
            Ok(bullets) if !bullets.is_empty() => Ok(bullets),
            Ok(_) => {
                warn!("LLM returned no bullets, falling back to links");
                Ok(LinkSummarizer::bullets(items))
            }
            Err(e) => {
                warn!("LLM summarization failed: {}, falling back to links", e);
                Ok(LinkSummarizer::bullets(items))
            }
        }
    }
}

pub fn build_prompt(items: &[Item]) -> String {
    let lines: Vec<String> = items
        .iter()
        .map(|it| format!("- [{}]({})", it.title, it.url))
        .collect();
    format!(
        "Summarize each line to at most 20 words, keep one bullet per line. \
         Preserve links in [title](url) Markdown.\n\n{}",
        lines.join("\n")
    )
}

/// One bullet per non-blank line, list markers stripped.
pub fn parse_bullets(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, UsageMetadata};
    use crate::model::{Category, Source};

    struct Canned(anyhow::Result<String>);

    #[async_trait]
    impl LlmProvider for Canned {
        async fn generate(&self, _request: LlmRequest) -> anyhow::Result<LlmResponse> {
            match &self.0 {
                Ok(content) => Ok(LlmResponse {
                    content: content.clone(),
                    usage: UsageMetadata::default(),
                    model: "canned".to_string(),
                }),
                Err(e) => anyhow::bail!("{}", e),
            }
        }
    }

    fn items() -> Vec<Item> {
        let src = Source::feed("Acme", Category::Release, "https://acme.example/feed");
        vec![
            Item::new(&src, "v2.0", "https://acme.example/v2"),
            Item::new(&src, "v2.1", "https://acme.example/v2.1"),
        ]
    }

    #[test]
    fn prompt_lists_items_as_links() {
        let prompt = build_prompt(&items());
        assert!(prompt.contains("at most 20 words"));
        assert!(prompt.contains("- [v2.0](https://acme.example/v2)\n- [v2.1](https://acme.example/v2.1)"));
    }

    #[test]
    fn bullets_are_stripped_and_blank_lines_dropped() {
        let text = "- [v2.0](u) adds rockets\n\n  * [v2.1](v) fixes rockets  \n";
        assert_eq!(
            parse_bullets(text),
            vec!["[v2.0](u) adds rockets", "[v2.1](v) fixes rockets"]
        );
    }

    #[tokio::test]
    async fn uses_model_output() {
        let summarizer = LlmSummarizer::new(Canned(Ok("- one\n- two".to_string())));
        let bullets = summarizer.summarize(&items()).await.unwrap();
        assert_eq!(bullets, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn failure_and_empty_answer_fall_back_to_links() {
        let expected = LinkSummarizer::bullets(&items());

        let failing = LlmSummarizer::new(Canned(Err(anyhow::anyhow!("503"))));
        assert_eq!(failing.summarize(&items()).await.unwrap(), expected);

        let blank = LlmSummarizer::new(Canned(Ok("  \n ".to_string())));
        assert_eq!(blank.summarize(&items()).await.unwrap(), expected);
    }
}
