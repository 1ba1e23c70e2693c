use bookvox_jobs::JobId;
use serde::Deserialize;
use serde_json::Value;

/// Response to a recording submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub status_url: String,
}

/// Response to a split request.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitResponse {
    pub sentences: Vec<String>,
}

/// Typed reading of the opaque guess payload a settled job carries.
///
/// The wire format is whatever the identification model produced; anything
/// that does not match a known shape is passed through untouched rather
/// than dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum BookGuess {
    Confident { title: String, author: String },
    NeedClarification { question: String },
    Unrecognized(Value),
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum WireGuess {
    Confident { title: String, author: String },
    NeedClarification { question: String },
}

impl BookGuess {
    pub fn from_value(value: &Value) -> Self {
        match serde_json::from_value::<WireGuess>(value.clone()) {
            Ok(WireGuess::Confident { title, author }) => BookGuess::Confident { title, author },
            Ok(WireGuess::NeedClarification { question }) => {
                BookGuess::NeedClarification { question }
            }
            Err(_) => BookGuess::Unrecognized(value.clone()),
        }
    }
}
