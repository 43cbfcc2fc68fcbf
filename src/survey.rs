//! Pre-lesson survey: a fixed list of questions walked one at a time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::LessonRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionId {
    Proficiency,
    TimeCommitment,
    Goal,
    LearningStyle,
    Interest,
    PriorKnowledge,
    Motivation,
    Pace,
    AssessmentPreference,
    Background,
    Deadline,
}

impl QuestionId {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionId::Proficiency => "proficiency",
            QuestionId::TimeCommitment => "timeCommitment",
            QuestionId::Goal => "goal",
            QuestionId::LearningStyle => "learningStyle",
            QuestionId::Interest => "interest",
            QuestionId::PriorKnowledge => "priorKnowledge",
            QuestionId::Motivation => "motivation",
            QuestionId::Pace => "pace",
            QuestionId::AssessmentPreference => "assessmentPreference",
            QuestionId::Background => "background",
            QuestionId::Deadline => "deadline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurveyOption {
    pub value: &'static str,
    pub label: &'static str,
}

const fn opt(value: &'static str, label: &'static str) -> SurveyOption {
    SurveyOption { value, label }
}

#[derive(Debug)]
pub struct SurveyQuestion {
    pub id: QuestionId,
    /// May contain `{topic}`
    pub question: &'static str,
    pub options: &'static [SurveyOption],
}

impl SurveyQuestion {
    pub fn prompt(&self, topic: &str) -> String {
        self.question.replace("{topic}", topic)
    }

    pub fn accepts(&self, value: &str) -> bool {
        self.options.iter().any(|o| o.value == value)
    }
}

pub static QUESTIONS: [SurveyQuestion; 11] = [
    SurveyQuestion {
        id: QuestionId::Proficiency,
        question: "What is your current level of understanding for {topic}?",
        options: &[
            opt("beginner", "Beginner"),
            opt("intermediate", "Intermediate"),
            opt("advanced", "Advanced"),
        ],
    },
    SurveyQuestion {
        id: QuestionId::TimeCommitment,
        question: "How many hours per week can you dedicate?",
        options: &[
            opt("<2h", "< 2 hours"),
            opt("2-4h", "2 - 4 hours"),
            opt("5-7h", "5 - 7 hours"),
            opt("8h+", "8+ hours"),
        ],
    },
    SurveyQuestion {
        id: QuestionId::Goal,
        question: "What is your primary learning goal with {topic}?",
        options: &[
            opt("career", "Career advancement"),
            opt("academic", "Academic success"),
            opt("personal", "Personal growth"),
        ],
    },
    SurveyQuestion {
        id: QuestionId::LearningStyle,
        question: "What is your preferred learning style?",
        options: &[
            opt("visual", "Visual (diagrams, charts)"),
            opt("hands-on", "Hands-on (projects, practice)"),
            opt("reading", "Reading/Writing"),
            opt("auditory", "Auditory"),
        ],
    },
    SurveyQuestion {
        id: QuestionId::Interest,
        question: "Within {topic}, which area interests you the most?",
        options: &[
            opt("fundamentals", "Fundamentals"),
            opt("applications", "Practical applications"),
            opt("theory", "Theory & concepts"),
            opt("projects", "Projects & case studies"),
        ],
    },
    SurveyQuestion {
        id: QuestionId::PriorKnowledge,
        question: "Which prerequisite areas have you studied related to {topic}?",
        options: &[
            opt("none", "None"),
            opt("basics", "Basics in related subjects"),
            opt("math", "Mathematical/analytical background"),
            opt("coding", "Programming experience"),
        ],
    },
    SurveyQuestion {
        id: QuestionId::Motivation,
        question: "What best describes your motivation for learning {topic}?",
        options: &[
            opt("upskill", "Upskilling / reskilling"),
            opt("exam", "Exam or certification"),
            opt("project", "Specific project need"),
            opt("curiosity", "Curiosity / personal interest"),
        ],
    },
    SurveyQuestion {
        id: QuestionId::Pace,
        question: "What learning pace do you prefer for {topic}?",
        options: &[
            opt("slow", "Slow (step-by-step, more practice)"),
            opt("moderate", "Moderate (balanced)"),
            opt("fast", "Fast (condensed, advanced insights)"),
        ],
    },
    SurveyQuestion {
        id: QuestionId::AssessmentPreference,
        question: "How would you like to assess your understanding of {topic}?",
        options: &[
            opt("quizzes", "Short quizzes"),
            opt("assignments", "Hands-on assignments"),
            opt("projects", "Mini projects"),
            opt("reviews", "Review summaries"),
        ],
    },
    SurveyQuestion {
        id: QuestionId::Background,
        question: "What is your background most relevant to {topic}?",
        options: &[
            opt("student", "Student"),
            opt("professional", "Working professional"),
            opt("switcher", "Career switcher"),
            opt("hobbyist", "Hobbyist / Enthusiast"),
        ],
    },
    SurveyQuestion {
        id: QuestionId::Deadline,
        question: "Do you have a target timeline to get comfortable with {topic}?",
        options: &[
            opt("1-2w", "1-2 weeks"),
            opt("1m", "About 1 month"),
            opt("3m", "About 3 months"),
            opt("flexible", "Flexible / no deadline"),
        ],
    },
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SurveyError {
    #[error("{value:?} is not an option for {question}")]
    UnknownOption {
        question: &'static str,
        value: String,
    },
}

/// One answer per question; only a completed [`SurveyFlow`] produces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SurveyAnswers(BTreeMap<QuestionId, String>);

impl SurveyAnswers {
    pub fn get(&self, id: QuestionId) -> &str {
        self.0.get(&id).map(String::as_str).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuestionId, &str)> {
        self.0.iter().map(|(id, v)| (*id, v.as_str()))
    }

    /// Proficiency becomes the lesson difficulty.
    pub fn lesson_request(&self, subject: &str, language: &str) -> LessonRequest {
        LessonRequest {
            subject: subject.to_string(),
            difficulty: self.get(QuestionId::Proficiency).to_string(),
            language: language.to_string(),
            learning_style: self.get(QuestionId::LearningStyle).to_string(),
        }
    }
}

#[derive(Debug)]
pub enum Advance {
    Next(SurveyFlow),
    /// The current question has no answer yet
    Blocked(SurveyFlow),
    Complete(SurveyAnswers),
}

#[derive(Debug, Clone)]
pub struct SurveyFlow {
    topic: String,
    index: usize,
    answers: BTreeMap<QuestionId, String>,
}

impl SurveyFlow {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            index: 0,
            answers: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based position and total
    pub fn progress(&self) -> (usize, usize) {
        (self.index + 1, QUESTIONS.len())
    }

    pub fn current(&self) -> &'static SurveyQuestion {
        &QUESTIONS[self.index]
    }

    pub fn prompt(&self) -> String {
        self.current().prompt(&self.topic)
    }

    pub fn current_answer(&self) -> Option<&str> {
        self.answers.get(&self.current().id).map(String::as_str)
    }

    /// Records or overwrites the current question's answer without advancing.
    pub fn answer(&mut self, value: &str) -> Result<(), SurveyError> {
        let question = self.current();
        if !question.accepts(value) {
            return Err(SurveyError::UnknownOption {
                question: question.id.as_str(),
                value: value.to_string(),
            });
        }
        self.answers.insert(question.id, value.to_string());
        Ok(())
    }

    pub fn retreat(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    pub fn advance(mut self) -> Advance {
        if self.current_answer().is_none() {
            return Advance::Blocked(self);
        }
        if self.index + 1 < QUESTIONS.len() {
            self.index += 1;
            return Advance::Next(self);
        }
        // last question: finishing needs every answer
        if self.answers.len() == QUESTIONS.len() {
            Advance::Complete(SurveyAnswers(self.answers))
        } else {
            Advance::Blocked(self)
        }
    }
}
