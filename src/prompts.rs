use crate::{
    content::{
        LessonRequest, PracticeRequest, QUESTIONNAIRE_SIZE, QuestionnaireRequest,
        RECOMMENDATION_COUNT,
    },
    store::{ProfileRow, ProgressEntry},
};

pub const LESSON_INSTRUCTION: &str =
    "You are an expert educator. Create engaging, clear lessons. Always respond with valid JSON.";
pub const PRACTICE_INSTRUCTION: &str =
    "You are an expert educator. Create clear, educational questions. Always respond with valid JSON.";
pub const QUESTIONNAIRE_INSTRUCTION: &str =
    "You are an expert educator who writes fair multiple-choice tests. Always respond with valid JSON.";
pub const ADVISOR_INSTRUCTION: &str =
    "You are a helpful AI educational advisor. Always respond with valid JSON.";

pub fn lesson_prompt(req: &LessonRequest) -> String {
    let LessonRequest {
        subject,
        difficulty,
        language,
        learning_style,
    } = req;
    format!(
        "Generate a comprehensive {difficulty}-level lesson about {subject} in {language}.\n\n\
         The lesson should be optimized for {learning_style} learners.\n\n\
         Include:\n\
         1. Introduction (engaging hook)\n\
         2. Main Concepts (3-5 key points with examples)\n\
         3. Interactive Examples (2-3 practical examples)\n\
         4. Practice Questions (3 questions with answers)\n\
         5. Summary (key takeaways)\n\n\
         Format as JSON:\n\
         {{\n  \"title\": \"...\",\n  \"introduction\": \"...\",\n  \
         \"concepts\": [{{\"title\": \"...\", \"content\": \"...\", \"example\": \"...\"}}],\n  \
         \"examples\": [{{\"scenario\": \"...\", \"solution\": \"...\"}}],\n  \
         \"questions\": [{{\"question\": \"...\", \"answer\": \"...\"}}],\n  \
         \"summary\": \"...\"\n}}"
    )
}

pub fn practice_prompt(req: &PracticeRequest) -> String {
    let PracticeRequest {
        subject,
        difficulty,
        language,
        count,
    } = req;
    format!(
        "Generate {count} {difficulty}-level practice questions about {subject} in {language}.\n\n\
         For each question, provide:\n\
         - question text\n\
         - 4 multiple choice options (labeled A, B, C, D)\n\
         - correct answer (the letter)\n\
         - brief explanation\n\n\
         Format as JSON array:\n\
         [{{\n  \"question\": \"...\",\n  \
         \"options\": {{\"A\": \"...\", \"B\": \"...\", \"C\": \"...\", \"D\": \"...\"}},\n  \
         \"correct_answer\": \"A\",\n  \
         \"explanation\": \"...\"\n}}]"
    )
}

pub fn questionnaire_prompt(req: &QuestionnaireRequest) -> String {
    let QuestionnaireRequest {
        lesson_name,
        description,
    } = req;
    format!(
        "Create a questionnaire of {QUESTIONNAIRE_SIZE} basic multiple-choice questions for the lesson \"{lesson_name}\".\n\n\
         Lesson content:\n{description}\n\n\
         Each question must have exactly 4 options, the index (0-3) of the correct option \
         and a short explanation.\n\n\
         Return only a JSON array:\n\
         [{{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \
         \"correctAnswer\": 0, \"explanation\": \"...\"}}]"
    )
}

fn or_default<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
    value.filter(|v| !v.is_empty()).unwrap_or(default)
}

/// Missing profile fields and an empty history fall back to fixed wording.
pub fn recommendations_prompt(profile: Option<&ProfileRow>, progress: &[ProgressEntry]) -> String {
    let learning_style = or_default(profile.and_then(|p| p.learning_style.as_deref()), "visual");
    let proficiency = or_default(profile.and_then(|p| p.proficiency_level.as_deref()), "beginner");
    let language = or_default(profile.and_then(|p| p.preferred_language.as_deref()), "en");
    let subjects: Vec<&str> = progress.iter().filter_map(|p| p.subject.as_deref()).collect();
    let recent = if subjects.is_empty() {
        "none".to_string()
    } else {
        subjects.join(", ")
    };
    format!(
        "You are an AI tutor. Based on this learner profile:\n\
         - Learning Style: {learning_style}\n\
         - Proficiency Level: {proficiency}\n\
         - Preferred Language: {language}\n\
         - Recent Activity: {recent}\n\n\
         Generate {RECOMMENDATION_COUNT} personalized course recommendations. For each recommendation, provide:\n\
         1. Title\n\
         2. Subject area\n\
         3. Difficulty level (beginner/intermediate/advanced)\n\
         4. Brief description (2-3 sentences)\n\
         5. Why it's recommended for this user\n\n\
         Return as JSON array with format:\n\
         [{{\"title\": \"...\", \"subject\": \"...\", \"difficulty\": \"...\", \"description\": \"...\", \"reason\": \"...\"}}]"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(subject: Option<&str>) -> ProgressEntry {
        ProgressEntry {
            lesson_id: None,
            subject: subject.map(str::to_string),
            completed: false,
            completion_percentage: 0,
            last_accessed: time::OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn lesson_prompt_interpolates_fields() {
        let prompt = lesson_prompt(&LessonRequest {
            subject: "Algebra".to_string(),
            difficulty: "beginner".to_string(),
            language: "en".to_string(),
            learning_style: "visual".to_string(),
        });
        assert!(prompt.starts_with("Generate a comprehensive beginner-level lesson about Algebra in en."));
        assert!(prompt.contains("optimized for visual learners"));
        assert!(prompt.contains("\"concepts\": [{\"title\""));
    }

    #[test]
    fn practice_prompt_uses_count() {
        let prompt = practice_prompt(&PracticeRequest {
            subject: "Algebra".to_string(),
            difficulty: "beginner".to_string(),
            language: "en".to_string(),
            count: 7,
        });
        assert!(prompt.starts_with("Generate 7 beginner-level practice questions about Algebra in en."));
    }

    #[test]
    fn questionnaire_prompt_embeds_lesson() {
        let prompt = questionnaire_prompt(&QuestionnaireRequest {
            lesson_name: "Photosynthesis".to_string(),
            description: "Plants turn light into sugar.".to_string(),
        });
        assert!(prompt.starts_with(
            "Create a questionnaire of 10 basic multiple-choice questions for the lesson \"Photosynthesis\"."
        ));
        assert!(prompt.contains("Lesson content:\nPlants turn light into sugar.\n"));
        assert!(prompt.contains("\"correctAnswer\": 0"));
    }

    #[test]
    fn recommendations_prompt_defaults() {
        let prompt = recommendations_prompt(None, &[]);
        assert!(prompt.contains("- Learning Style: visual\n"));
        assert!(prompt.contains("- Proficiency Level: beginner\n"));
        assert!(prompt.contains("- Preferred Language: en\n"));
        assert!(prompt.contains("- Recent Activity: none\n"));
    }

    #[test]
    fn recommendations_prompt_uses_profile_and_subjects() {
        let profile = ProfileRow {
            id: "u1".to_string(),
            learning_style: Some("auditory".to_string()),
            proficiency_level: Some(String::new()),
            ..Default::default()
        };
        let history = [progress(Some("Algebra")), progress(None), progress(Some("Physics"))];
        let prompt = recommendations_prompt(Some(&profile), &history);
        assert!(prompt.contains("- Learning Style: auditory\n"));
        assert!(prompt.contains("- Proficiency Level: beginner\n"));
        assert!(prompt.contains("- Recent Activity: Algebra, Physics\n"));
    }
}
