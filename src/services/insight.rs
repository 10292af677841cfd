use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        ChatCompletionResponseFormat, ChatCompletionResponseFormatType,
        CreateChatCompletionRequest, Role,
    },
    Client,
};
use async_trait::async_trait;

use crate::models::{ChartSpec, Table};
use crate::services::{chart, csv_ingest};

/// Upper bound on the number of table rows embedded in a prompt. Bounds
/// request size and cost regardless of how large the uploaded file is.
pub const PROMPT_ROW_LIMIT: usize = 100;

static JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid JSON block regex"));

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("model reply was not parseable JSON: {0}")]
    MalformedResponse(String),
    #[error("model reply violated the answer contract: {0}")]
    SchemaViolation(String),
    #[error("model transport failure: {0}")]
    TransportFailure(String),
}

/// A validated answer from the model. `truncated` records whether the table
/// was cut down to `PROMPT_ROW_LIMIT` rows before being sent.
#[derive(Debug)]
pub struct Insight {
    pub text: String,
    pub chart: Option<ChartSpec>,
    pub truncated: bool,
}

/// The external language model seam. Production uses `OpenAiModel`; tests
/// inject doubles.
#[async_trait]
pub trait InsightModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, QueryError>;
}

pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiModel {
    pub fn new(api_key: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[async_trait]
impl InsightModel for OpenAiModel {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, QueryError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: system_prompt.to_string(),
                name: None,
                role: Role::System,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(user_prompt.to_string()),
                name: None,
                role: Role::User,
            }),
        ];

        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(0.1),
            response_format: Some(ChatCompletionResponseFormat {
                r#type: ChatCompletionResponseFormatType::JsonObject,
            }),
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| QueryError::TransportFailure(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}

pub struct InsightService {
    model: Arc<dyn InsightModel>,
}

impl InsightService {
    pub fn new(model: Arc<dyn InsightModel>) -> Self {
        Self { model }
    }

    /// Asks the model one question about the table. The table is truncated
    /// to the first `PROMPT_ROW_LIMIT` rows, serialized back to CSV text and
    /// embedded in the prompt; the reply must satisfy the answer contract.
    /// No retries: every failure is surfaced once to the caller.
    pub async fn ask(&self, question: &str, table: &Table) -> Result<Insight, QueryError> {
        let truncated = table.rows.len() > PROMPT_ROW_LIMIT;
        if truncated {
            tracing::info!(
                total_rows = table.rows.len(),
                sent_rows = PROMPT_ROW_LIMIT,
                "table truncated for model prompt"
            );
        }

        let snippet = csv_ingest::serialize_table(table, PROMPT_ROW_LIMIT).map_err(|e| {
            QueryError::TransportFailure(format!("failed to serialize data snippet: {}", e))
        })?;

        let reply = self
            .model
            .complete(&system_prompt(), &user_prompt(&snippet, question))
            .await?;

        let (text, chart) = parse_reply(&reply)?;

        Ok(Insight {
            text,
            chart,
            truncated,
        })
    }
}

fn system_prompt() -> String {
    let current_date = Utc::now().format("%Y-%m-%d").to_string();

    format!(
        r#"You are an AI data analyst. You answer questions about a CSV data snippet supplied by the user.

The current date is {}.

YOU MUST ALWAYS return a single JSON object with the following structure:
{{
  "insight": "A concise, text-based answer to the user's question",
  "chart": null
}}

Rules for the "chart" field:
- If a visualization is appropriate, replace null with an object of the form:
  {{"kind": "bar" | "line" | "scatter", "points": [{{"x": ..., "y": ...}}], "xKey": "x", "yKey": "y"}}
- Every entry in "points" MUST have an "x" key for the x-axis and a "y" key for the y-axis. For scatter plots an entry may also carry a "z" key.
- "x" must be a string (even for numerical values). "y" and "z" must be numbers.
- "xKey" in your response must be "x", "yKey" must be "y", and "zKey" (only if "z" is used) must be "z".
- Only "bar", "line" and "scatter" charts exist. NEVER return any other kind.
- If a chart is not possible or relevant, keep "chart" as null."#,
        current_date
    )
}

fn user_prompt(snippet: &str, question: &str) -> String {
    format!(
        r#"Analyze the following CSV data snippet to answer the user's question.

CSV Data:
---
{}
---

User Question: "{}"

Provide a concise insight and, when a visualization helps, a chart that strictly follows the response structure."#,
        snippet, question
    )
}

fn parse_reply(reply: &str) -> Result<(String, Option<ChartSpec>), QueryError> {
    let json_str = JSON_BLOCK
        .find(reply)
        .ok_or_else(|| {
            QueryError::MalformedResponse(format!("no JSON object in model reply: {}", reply))
        })?
        .as_str();

    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| QueryError::MalformedResponse(e.to_string()))?;

    let text = value
        .get("insight")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| QueryError::SchemaViolation("missing or empty `insight` field".to_string()))?
        .to_string();

    let chart = chart::validate(value.get("chart").unwrap_or(&Value::Null))
        .map_err(|e| QueryError::SchemaViolation(e.to_string()))?;

    Ok((text, chart))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, ChartKind, Row};
    use parking_lot::Mutex;
    use tokio_test::block_on;

    struct CannedModel {
        reply: String,
    }

    #[async_trait]
    impl InsightModel for CannedModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, QueryError> {
            Ok(self.reply.clone())
        }
    }

    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
        reply: String,
    }

    #[async_trait]
    impl InsightModel for RecordingModel {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, QueryError> {
            self.prompts.lock().push(user.to_string());
            Ok(self.reply.clone())
        }
    }

    fn service(reply: &str) -> InsightService {
        InsightService::new(Arc::new(CannedModel {
            reply: reply.to_string(),
        }))
    }

    fn small_table() -> Table {
        let mut row = Row::new();
        row.insert("name".to_string(), CellValue::Text("Alice".to_string()));
        row.insert("age".to_string(), CellValue::Number(30.0));
        Table {
            headers: vec!["name".to_string(), "age".to_string()],
            rows: vec![row],
        }
    }

    fn numbered_table(rows: usize) -> Table {
        let rows = (0..rows)
            .map(|i| {
                let mut row = Row::new();
                row.insert("n".to_string(), CellValue::Number(i as f64));
                row
            })
            .collect();
        Table {
            headers: vec!["n".to_string()],
            rows,
        }
    }

    #[test]
    fn valid_reply_yields_insight_without_chart() {
        let answer = block_on(
            service(r#"{"insight":"Average age is 27.5","chart":null}"#)
                .ask("average age", &small_table()),
        )
        .unwrap();
        assert_eq!(answer.text, "Average age is 27.5");
        assert!(answer.chart.is_none());
        assert!(!answer.truncated);
    }

    #[test]
    fn valid_reply_with_chart_is_validated() {
        let reply = r#"{"insight":"Ages by name","chart":{"kind":"bar","points":[{"x":"Alice","y":30}],"xKey":"x","yKey":"y"}}"#;
        let answer = block_on(service(reply).ask("plot ages", &small_table())).unwrap();
        let chart = answer.chart.unwrap();
        assert_eq!(chart.kind, ChartKind::Bar);
        assert_eq!(chart.points.len(), 1);
    }

    #[test]
    fn fenced_json_is_still_extracted() {
        let reply = "```json\n{\"insight\":\"ok\",\"chart\":null}\n```";
        let answer = block_on(service(reply).ask("q", &small_table())).unwrap();
        assert_eq!(answer.text, "ok");
    }

    #[test]
    fn non_json_reply_is_malformed() {
        let err = block_on(service("not json").ask("q", &small_table())).unwrap_err();
        assert!(matches!(err, QueryError::MalformedResponse(_)));
    }

    #[test]
    fn missing_insight_is_schema_violation() {
        let err = block_on(service(r#"{"chart":null}"#).ask("q", &small_table())).unwrap_err();
        assert!(matches!(err, QueryError::SchemaViolation(_)));
    }

    #[test]
    fn invalid_chart_is_schema_violation() {
        let reply = r#"{"insight":"hm","chart":{"kind":"pie","points":[]}}"#;
        let err = block_on(service(reply).ask("q", &small_table())).unwrap_err();
        assert!(matches!(err, QueryError::SchemaViolation(_)));
    }

    #[test]
    fn large_tables_are_truncated_in_the_prompt() {
        let model = Arc::new(RecordingModel {
            prompts: Mutex::new(Vec::new()),
            reply: r#"{"insight":"ok","chart":null}"#.to_string(),
        });
        let service = InsightService::new(model.clone());

        let answer = block_on(service.ask("count", &numbered_table(150))).unwrap();
        assert!(answer.truncated);

        let prompts = model.prompts.lock();
        let data_lines = prompts[0]
            .lines()
            .filter(|line| line.chars().all(|c| c.is_ascii_digit()) && !line.is_empty())
            .count();
        assert_eq!(data_lines, PROMPT_ROW_LIMIT);
    }
}
