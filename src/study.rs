// src/study.rs
// Structured-output features: task generation, study material, answer evaluation

use crate::error::{Result, TutorError};
use crate::extract::extract_structured;
use crate::llm::{ChatStreamClient, StreamOutcome, Turn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Review topics kept from an evaluation
const MAX_REVIEW_TOPICS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Easy => write!(f, "Easy"),
            Self::Medium => write!(f, "Medium"),
            Self::Hard => write!(f, "Hard"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(TutorError::InvalidInput(format!("unknown difficulty '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
    pub subject: String,
    pub topic: String,
    pub subtopic: String,
    pub difficulty: Difficulty,
    /// Extra requirements typed by the student
    pub custom: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTask {
    pub task: String,
    pub requirements: String,
    pub timestamp: DateTime<Utc>,
    pub params: TaskParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialParams {
    pub subject: String,
    pub topic: String,
    pub subtopic: String,
    pub custom: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMaterial {
    pub material: String,
    pub timestamp: DateTime<Utc>,
    pub params: MaterialParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationParams {
    pub task: String,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub score: f64,
    pub comments: String,
    pub review_topics: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

fn or_none(custom: &str) -> &str {
    if custom.trim().is_empty() { "none" } else { custom }
}

pub fn task_prompt(params: &TaskParams) -> String {
    format!(
        "Create an exercise for the subject \"{}\" on the topic \"{}\" (subtopic: \"{}\") \
         with difficulty \"{}\". Additional requirements: {}. \
         Reply strictly in JSON format: {{\"task\": \"exercise text\"}}",
        params.subject,
        params.topic,
        params.subtopic,
        params.difficulty,
        or_none(&params.custom)
    )
}

pub fn material_prompt(params: &MaterialParams) -> String {
    let subtopic = if params.subtopic.trim().is_empty() {
        String::new()
    } else {
        format!(" (subtopic: \"{}\")", params.subtopic)
    };
    format!(
        "Write detailed study material for the subject \"{}\" on the topic \"{}\"{}. \
         The material must cover the topic fully and be structured and easy to follow. \
         Additional requirements: {}. \
         Reply strictly in JSON format: {{\"material\": \"material text\"}}",
        params.subject,
        params.topic,
        subtopic,
        or_none(&params.custom)
    )
}

pub fn evaluation_prompt(params: &EvaluationParams) -> String {
    let task = if params.task.trim().is_empty() {
        String::new()
    } else {
        format!("Task: {}\n\n", params.task)
    };
    format!(
        "Grade the student's answer to the question. Return JSON of the form: \
         {{\"score\": number from 1 to 5, \"comments\": \"string\", \"reviewTopics\": [\"string\", ...]}}.\
         \n\n{}Question: {}\n\nStudent answer: {}",
        task, params.question, params.answer
    )
}

pub fn lesson_prompt(lesson: &str, context: &str, question: &str) -> String {
    let extra = if context.trim().is_empty() {
        String::new()
    } else {
        format!(" Additional context: {}", context)
    };
    format!(
        "You are an AI assistant helping a student learn programming. \
         Lesson context: \"{}\".{}\n\nStudent question: {}",
        lesson, extra, question
    )
}

/// Runs structured prompts through the shared client.
///
/// Each call is a single user turn outside any conversation memory. It still
/// takes the client's in-flight slot, so it pre-empts (and is pre-empted by)
/// chat replies on the same client.
pub struct StudyGenerator {
    client: Arc<ChatStreamClient>,
}

impl StudyGenerator {
    pub fn new(client: Arc<ChatStreamClient>) -> Self {
        Self { client }
    }

    /// Send one prompt and extract the JSON object from the reply
    pub async fn ask_structured(&self, prompt: &str) -> Result<Value> {
        let turns = [Turn::user(prompt)];
        let outcome = self.client.send(&turns, |_| {}).await?;

        let text = match outcome {
            StreamOutcome::Completed(text) => text,
            StreamOutcome::Cancelled(_) => return Err(TutorError::Cancelled),
        };
        debug!(len = text.len(), "Structured reply received");
        extract_structured(&text)
    }

    pub async fn generate_task(&self, params: TaskParams) -> Result<GeneratedTask> {
        let value = self.ask_structured(&task_prompt(&params)).await?;
        let task = string_field(&value, "task");
        info!(subject = %params.subject, len = task.len(), "Task generated");

        Ok(GeneratedTask {
            task,
            requirements: params.custom.clone(),
            timestamp: Utc::now(),
            params,
        })
    }

    pub async fn generate_material(&self, params: MaterialParams) -> Result<GeneratedMaterial> {
        let value = self.ask_structured(&material_prompt(&params)).await?;
        let material = string_field(&value, "material");
        info!(subject = %params.subject, len = material.len(), "Material generated");

        Ok(GeneratedMaterial {
            material,
            timestamp: Utc::now(),
            params,
        })
    }

    /// Free-text answer to a question about one lesson, not streamed
    pub async fn ask_lesson(&self, lesson: &str, context: &str, question: &str) -> Result<String> {
        if question.trim().is_empty() {
            return Err(TutorError::InvalidInput("question is empty".into()));
        }

        let answer = self
            .client
            .generate(&lesson_prompt(lesson, context, question))
            .await?;
        if answer.trim().is_empty() {
            return Err(TutorError::MalformedStructuredOutput {
                message: "empty response".into(),
                raw: answer,
            });
        }

        info!(lesson = %lesson, len = answer.len(), "Lesson question answered");
        Ok(answer)
    }

    pub async fn evaluate_answer(&self, params: EvaluationParams) -> Result<EvaluationResult> {
        let value = self.ask_structured(&evaluation_prompt(&params)).await?;
        let result = evaluation_from_value(&value);
        info!(score = result.score, topics = result.review_topics.len(), "Answer evaluated");
        Ok(result)
    }
}

/// String field or empty string when missing / not a string
fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn evaluation_from_value(value: &Value) -> EvaluationResult {
    let score = match value.get("score") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };

    let review_topics = value
        .get("reviewTopics")
        .and_then(Value::as_array)
        .map(|topics| {
            topics
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .take(MAX_REVIEW_TOPICS)
                .collect()
        })
        .unwrap_or_default();

    EvaluationResult {
        score,
        comments: string_field(value, "comments"),
        review_topics,
        timestamp: Utc::now(),
    }
}
