//! Request bodies and the shapes the model is asked to produce.
//!
//! Model output is decoded in two steps: text to JSON (a failure is
//! [`Error::Parse`]), then JSON to the typed shape plus field validation (a
//! failure is [`Error::InvalidContent`]).

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::warn;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{Error, Result},
    utils::{extract_json, repair_truncated_json, strip_trailing_commas},
};

pub const DEFAULT_PRACTICE_COUNT: usize = 5;
pub const RECOMMENDATION_COUNT: usize = 3;
pub const QUESTIONNAIRE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LessonRequest {
    #[validate(length(min = 1))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub difficulty: String,
    #[validate(length(min = 1))]
    pub language: String,
    #[validate(length(min = 1))]
    pub learning_style: String,
}

fn default_count() -> usize {
    DEFAULT_PRACTICE_COUNT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
pub struct PracticeRequest {
    #[validate(length(min = 1))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub difficulty: String,
    #[validate(length(min = 1))]
    pub language: String,
    /// Number of questions to generate, 5 when omitted
    #[serde(default = "default_count")]
    #[validate(range(min = 1, max = 50))]
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
pub struct Concept {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub content: String,
    #[serde(default)]
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkedExample {
    pub scenario: String,
    pub solution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
pub struct ReviewQuestion {
    #[validate(length(min = 1))]
    pub question: String,
    pub answer: String,
}

/// A generated lesson
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
pub struct LessonContent {
    #[validate(length(min = 1))]
    pub title: String,
    #[serde(default)]
    pub introduction: String,
    #[validate(length(min = 1), nested)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub examples: Vec<WorkedExample>,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<ReviewQuestion>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum AnswerLetter {
    A,
    B,
    C,
    D,
}

impl AnswerLetter {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerLetter::A => "A",
            AnswerLetter::B => "B",
            AnswerLetter::C => "C",
            AnswerLetter::D => "D",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
pub struct AnswerOptions {
    #[serde(rename = "A")]
    #[validate(length(min = 1))]
    pub a: String,
    #[serde(rename = "B")]
    #[validate(length(min = 1))]
    pub b: String,
    #[serde(rename = "C")]
    #[validate(length(min = 1))]
    pub c: String,
    #[serde(rename = "D")]
    #[validate(length(min = 1))]
    pub d: String,
}

/// One multiple-choice question as produced by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
pub struct PracticeQuestion {
    #[validate(length(min = 1))]
    pub question: String,
    #[validate(nested)]
    pub options: AnswerOptions,
    pub correct_answer: AnswerLetter,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
pub struct Recommendation {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub difficulty: String,
    pub description: String,
    pub reason: String,
}

/// Lesson text a questionnaire is generated from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
pub struct QuestionnaireRequest {
    #[validate(length(min = 1))]
    pub lesson_name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    #[validate(length(min = 1))]
    pub question: String,
    #[validate(length(equal = 4))]
    pub options: Vec<String>,
    /// Index into `options`
    #[validate(range(max = 3))]
    pub correct_answer: u8,
    pub explanation: String,
}

/// The practice prompt asks for an array, but a lone object is accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

fn parse<T: DeserializeOwned>(json: &str) -> Result<T> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    serde_json::from_value(value).map_err(|e| Error::InvalidContent(e.to_string()))
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    parse(extract_json(text))
}

pub fn decode_lesson(text: &str) -> Result<LessonContent> {
    let lesson: LessonContent = decode(text)?;
    lesson.validate()?;
    Ok(lesson)
}

pub fn decode_practice(text: &str, expected: usize) -> Result<Vec<PracticeQuestion>> {
    let questions = decode::<OneOrMany<PracticeQuestion>>(text)?.into_vec();
    if questions.len() != expected {
        return Err(Error::InvalidContent(format!(
            "expected {expected} questions, got {}",
            questions.len()
        )));
    }
    for question in &questions {
        question.validate()?;
    }
    Ok(questions)
}

pub fn decode_recommendations(text: &str) -> Result<Vec<Recommendation>> {
    let recommendations: Vec<Recommendation> = decode(text)?;
    if recommendations.len() != RECOMMENDATION_COUNT {
        return Err(Error::InvalidContent(format!(
            "expected {RECOMMENDATION_COUNT} recommendations, got {}",
            recommendations.len()
        )));
    }
    for recommendation in &recommendations {
        recommendation.validate()?;
    }
    Ok(recommendations)
}

/// Questionnaires are long enough to be cut off by the token limit, so the
/// answer is closed up and cleaned of trailing commas before parsing.
pub fn decode_questionnaire(text: &str) -> Result<Vec<QuizQuestion>> {
    let (json, truncated) = repair_truncated_json(extract_json(text));
    if truncated {
        warn!("questionnaire answer was cut off, closed it before parsing");
    }
    let questions: Vec<QuizQuestion> = parse(&strip_trailing_commas(&json))?;
    if questions.is_empty() {
        return Err(Error::InvalidContent("no questions generated".to_string()));
    }
    for question in &questions {
        question.validate()?;
    }
    Ok(questions)
}
