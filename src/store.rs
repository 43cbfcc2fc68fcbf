use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    types::Json,
};
use time::{OffsetDateTime, UtcOffset};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::UserId,
    content::{AnswerLetter, AnswerOptions, LessonContent, LessonRequest, PracticeQuestion, PracticeRequest},
    error::{Error, Result},
    proctor::integrity::IntegrityReport,
    utils::now_utc,
};

/// Stored lesson as returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LessonRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub subject: String,
    pub difficulty: String,
    pub language: String,
    pub content: LessonContent,
    pub ai_generated: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PracticeQuestionRow {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub question: String,
    pub options: AnswerOptions,
    pub correct_answer: AnswerLetter,
    pub explanation: String,
    pub difficulty: String,
    pub language: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub learning_style: Option<String>,
    pub proficiency_level: Option<String>,
    pub preferred_language: Option<String>,
}

/// A progress record joined with the subject of its lesson
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProgressEntry {
    pub lesson_id: Option<String>,
    pub subject: Option<String>,
    pub completed: bool,
    pub completion_percentage: i64,
    pub last_accessed: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ProctorSession {
    pub id: String,
    pub user_id: String,
    pub test_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Set once the session is ended and its report generated
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct Store {
    pub database: SqlitePool,
}

impl Store {
    /// Open (creating if needed) and migrate the database at `url`.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // an in-memory database lives only as long as its single connection
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };
        sqlx::migrate!().run(&pool).await?;
        info!("database ready at {url}");
        Ok(Self { database: pool })
    }

    pub async fn in_memory() -> anyhow::Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn insert_lesson(
        &self,
        user: UserId,
        req: &LessonRequest,
        content: LessonContent,
    ) -> Result<LessonRow> {
        let row = LessonRow {
            id: Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            title: content.title.clone(),
            subject: req.subject.clone(),
            difficulty: req.difficulty.clone(),
            language: req.language.clone(),
            content,
            ai_generated: true,
            created_at: now_utc(),
        };
        sqlx::query(
            "insert into lessons (id, user_id, title, subject, difficulty, language, content, ai_generated, created_at) \
             values (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.title)
        .bind(&row.subject)
        .bind(&row.difficulty)
        .bind(&row.language)
        .bind(Json(&row.content))
        .bind(row.ai_generated)
        .bind(row.created_at)
        .execute(&self.database)
        .await?;
        Ok(row)
    }

    /// Insert a batch in one transaction: either every question is stored or none.
    pub async fn insert_practice_questions(
        &self,
        user: UserId,
        req: &PracticeRequest,
        questions: Vec<PracticeQuestion>,
    ) -> Result<Vec<PracticeQuestionRow>> {
        let created_at = now_utc();
        let rows: Vec<PracticeQuestionRow> = questions
            .into_iter()
            .map(|q| PracticeQuestionRow {
                id: Uuid::new_v4().to_string(),
                user_id: user.to_string(),
                subject: req.subject.clone(),
                question: q.question,
                options: q.options,
                correct_answer: q.correct_answer,
                explanation: q.explanation,
                difficulty: req.difficulty.clone(),
                language: req.language.clone(),
                created_at,
            })
            .collect();
        let mut tx = self.database.begin().await?;
        for row in &rows {
            sqlx::query(
                "insert into practice_questions \
                 (id, user_id, subject, question, options, correct_answer, explanation, difficulty, language, created_at) \
                 values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.id)
            .bind(&row.user_id)
            .bind(&row.subject)
            .bind(&row.question)
            .bind(Json(&row.options))
            .bind(row.correct_answer.as_str())
            .bind(&row.explanation)
            .bind(&row.difficulty)
            .bind(&row.language)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows)
    }

    pub async fn profile(&self, user: UserId) -> Result<Option<ProfileRow>> {
        let profile = sqlx::query_as::<_, ProfileRow>(
            "select id, full_name, bio, avatar_url, learning_style, proficiency_level, preferred_language \
             from profiles where id = ?",
        )
        .bind(user.to_string())
        .fetch_optional(&self.database)
        .await?;
        Ok(profile)
    }

    pub async fn upsert_profile(&self, profile: &ProfileRow) -> Result<()> {
        sqlx::query(
            "insert into profiles (id, full_name, bio, avatar_url, learning_style, proficiency_level, preferred_language, updated_at) \
             values (?, ?, ?, ?, ?, ?, ?, ?) \
             on conflict (id) do update set full_name = excluded.full_name, bio = excluded.bio, \
             avatar_url = excluded.avatar_url, learning_style = excluded.learning_style, \
             proficiency_level = excluded.proficiency_level, preferred_language = excluded.preferred_language, \
             updated_at = excluded.updated_at",
        )
        .bind(&profile.id)
        .bind(&profile.full_name)
        .bind(&profile.bio)
        .bind(&profile.avatar_url)
        .bind(&profile.learning_style)
        .bind(&profile.proficiency_level)
        .bind(&profile.preferred_language)
        .bind(now_utc())
        .execute(&self.database)
        .await?;
        Ok(())
    }

    /// Most recently accessed progress rows first.
    pub async fn recent_progress(&self, user: UserId, limit: i64) -> Result<Vec<ProgressEntry>> {
        let entries = sqlx::query_as::<_, ProgressEntry>(
            "select p.lesson_id, l.subject, p.completed, p.completion_percentage, p.last_accessed \
             from user_progress p left join lessons l on l.id = p.lesson_id \
             where p.user_id = ? order by p.last_accessed desc limit ?",
        )
        .bind(user.to_string())
        .bind(limit)
        .fetch_all(&self.database)
        .await?;
        Ok(entries)
    }

    /// `last_accessed` is stored in UTC so the text column orders by instant.
    pub async fn record_progress(
        &self,
        user: UserId,
        lesson_id: Option<&str>,
        completion_percentage: i64,
        last_accessed: OffsetDateTime,
    ) -> Result<()> {
        sqlx::query(
            "insert into user_progress (id, user_id, lesson_id, completed, completion_percentage, last_accessed) \
             values (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user.to_string())
        .bind(lesson_id)
        .bind(completion_percentage >= 100)
        .bind(completion_percentage)
        .bind(last_accessed.to_offset(UtcOffset::UTC))
        .execute(&self.database)
        .await?;
        Ok(())
    }

    /// Fails with [`Error::BadRequest`] when `id` is already taken.
    pub async fn start_proctor_session(
        &self,
        user: UserId,
        id: String,
        test_name: String,
    ) -> Result<ProctorSession> {
        let session = ProctorSession {
            id,
            user_id: user.to_string(),
            test_name,
            started_at: now_utc(),
            ended_at: None,
        };
        let inserted = sqlx::query(
            "insert into proctor_sessions (id, user_id, test_name, started_at) values (?, ?, ?, ?) \
             on conflict (id) do nothing",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.test_name)
        .bind(session.started_at)
        .execute(&self.database)
        .await?
        .rows_affected();
        if inserted == 0 {
            return Err(Error::BadRequest(format!("session {} already exists", session.id)));
        }
        Ok(session)
    }

    /// Ending twice moves `ended_at`; another learner's session is not found.
    pub async fn end_proctor_session(&self, user: UserId, id: &str) -> Result<ProctorSession> {
        sqlx::query_as::<_, ProctorSession>(
            "update proctor_sessions set ended_at = ? where id = ? and user_id = ? \
             returning id, user_id, test_name, started_at, ended_at",
        )
        .bind(now_utc())
        .bind(id)
        .bind(user.to_string())
        .fetch_optional(&self.database)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    /// A later report for the same session replaces the earlier one.
    pub async fn save_integrity_report(&self, report: &IntegrityReport) -> Result<()> {
        sqlx::query(
            "insert into integrity_reports (session_id, user_id, report, created_at) values (?, ?, ?, ?) \
             on conflict (session_id) do update set report = excluded.report, created_at = excluded.created_at",
        )
        .bind(&report.session_id)
        .bind(&report.user_id)
        .bind(Json(report))
        .bind(report.created_at.to_offset(UtcOffset::UTC))
        .execute(&self.database)
        .await?;
        Ok(())
    }

    pub async fn integrity_report(&self, session_id: &str) -> Result<Option<IntegrityReport>> {
        let report = sqlx::query_scalar::<_, Json<IntegrityReport>>(
            "select report from integrity_reports where session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.database)
        .await?;
        Ok(report.map(|r| r.0))
    }

    /// Total report count for `user` and the newest `limit` reports.
    pub async fn user_reports(&self, user: UserId, limit: i64) -> Result<(i64, Vec<IntegrityReport>)> {
        let user = user.to_string();
        let total = sqlx::query_scalar::<_, i64>("select count(*) from integrity_reports where user_id = ?")
            .bind(&user)
            .fetch_one(&self.database)
            .await?;
        let reports = sqlx::query_scalar::<_, Json<IntegrityReport>>(
            "select report from integrity_reports where user_id = ? order by created_at desc limit ?",
        )
        .bind(&user)
        .bind(limit)
        .fetch_all(&self.database)
        .await?;
        Ok((total, reports.into_iter().map(|r| r.0).collect()))
    }

    pub async fn count_rows(&self, table: Table) -> Result<i64> {
        let sql = format!("select count(*) from {}", table.name());
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.database)
            .await?;
        Ok(count)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Table {
    Lessons,
    PracticeQuestions,
    Profiles,
    UserProgress,
    ProctorSessions,
    IntegrityReports,
}

impl Table {
    fn name(&self) -> &'static str {
        match self {
            Table::Lessons => "lessons",
            Table::PracticeQuestions => "practice_questions",
            Table::Profiles => "profiles",
            Table::UserProgress => "user_progress",
            Table::ProctorSessions => "proctor_sessions",
            Table::IntegrityReports => "integrity_reports",
        }
    }
}
