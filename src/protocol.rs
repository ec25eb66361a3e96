//! JSON wire types for the HTTP API and the `ask --json` output.

use crate::dispatch::Outcome;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/questions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsRequest {
    pub questions: Vec<String>,
}

/// One entry per submitted question, in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsResponse {
    pub responses: Vec<Response>,
}

impl QuestionsResponse {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        Self {
            responses: outcomes.iter().map(Response::from).collect(),
        }
    }
}

/// Result for a single question: exactly one of `answer` or `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// The model's answer, if successful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Error message, if the question failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Create a successful response with an answer.
    pub fn success(answer: String) -> Self {
        Self {
            answer: Some(answer),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            answer: None,
            error: Some(message.into()),
        }
    }
}

impl From<&Outcome> for Response {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Answer(text) => Response::success(text.clone()),
            Outcome::Failure(e) => Response::error(e.to_string()),
        }
    }
}

/// Body returned with any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use serde_json::json;

    #[test]
    fn test_response_success() {
        let resp = Response::success("4".to_string());
        assert_eq!(resp.answer, Some("4".to_string()));
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_response_error() {
        let resp = Response::error("Connection failed");
        assert!(resp.answer.is_none());
        assert_eq!(resp.error, Some("Connection failed".to_string()));
    }

    #[test]
    fn test_outcomes_encode_in_order_with_one_field_each() {
        let outcomes = vec![
            Outcome::Answer("Error: this is a real answer".to_string()),
            Outcome::Failure(CompletionError::EmptyResponse),
        ];
        let body = serde_json::to_value(QuestionsResponse::from_outcomes(&outcomes)).unwrap();
        assert_eq!(
            body,
            json!({
                "responses": [
                    { "answer": "Error: this is a real answer" },
                    { "error": "empty response from model" }
                ]
            })
        );
    }

    #[test]
    fn test_request_requires_questions_field() {
        let parsed: Result<QuestionsRequest, _> = serde_json::from_str(r#"{"question": ["a"]}"#);
        assert!(parsed.is_err());

        let parsed: QuestionsRequest = serde_json::from_str(r#"{"questions": ["a", ""]}"#).unwrap();
        assert_eq!(parsed.questions, vec!["a".to_string(), String::new()]);
    }
}
