//! End-of-session integrity reports.
//!
//! Like the live alerts, violations are simulated draws; only the scoring and
//! the recommendation thresholds are fixed.

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::store::ProctorSession;

/// Score of a session without a single flag
pub const CLEAN_SCORE: f64 = 0.95;
pub const SCORE_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Score lost per occurrence
    pub fn penalty(&self) -> f64 {
        match self {
            Severity::Critical => 0.15,
            Severity::Warning => 0.05,
            Severity::Info => 0.02,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct ViolationTemplate {
    pub message: &'static str,
    pub severity: Severity,
    pub probability: f64,
}

/// Entries are drawn independently, so a session can collect several.
pub static VIOLATION_TABLE: [ViolationTemplate; 6] = [
    ViolationTemplate {
        message: "Multiple faces detected",
        severity: Severity::Warning,
        probability: 0.15,
    },
    ViolationTemplate {
        message: "User looked away from screen",
        severity: Severity::Warning,
        probability: 0.25,
    },
    ViolationTemplate {
        message: "Background voice detected",
        severity: Severity::Info,
        probability: 0.20,
    },
    ViolationTemplate {
        message: "Tab switch detected",
        severity: Severity::Critical,
        probability: 0.10,
    },
    ViolationTemplate {
        message: "Poor lighting conditions",
        severity: Severity::Warning,
        probability: 0.15,
    },
    ViolationTemplate {
        message: "Mobile device in frame",
        severity: Severity::Info,
        probability: 0.10,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ViolationFlag {
    pub severity: Severity,
    pub message: String,
    pub count: u32,
    /// Wall clock `HH:MM:SS`
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IntegrityReport {
    pub session_id: String,
    pub user_id: String,
    pub test_name: String,
    pub integrity_score: f64,
    pub flags: Vec<ViolationFlag>,
    pub recommendation: String,
    /// Seconds
    pub test_duration: u32,
    pub face_detection_accuracy: f64,
    /// Seconds per question
    pub avg_response_time: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

pub fn simulate_violations(rng: &mut impl Rng, at: OffsetDateTime) -> Vec<ViolationFlag> {
    let timestamp = format!("{:02}:{:02}:{:02}", at.hour(), at.minute(), at.second());
    let mut flags = Vec::new();
    for v in &VIOLATION_TABLE {
        if rng.random::<f64>() < v.probability {
            flags.push(ViolationFlag {
                severity: v.severity,
                message: v.message.to_string(),
                count: rng.random_range(1..=4),
                timestamp: Some(timestamp.clone()),
            });
        }
    }
    flags
}

/// Each occurrence costs its severity's penalty; the result never drops below
/// [`SCORE_FLOOR`] and is rounded to two decimals.
pub fn integrity_score(flags: &[ViolationFlag]) -> f64 {
    if flags.is_empty() {
        return CLEAN_SCORE;
    }
    let penalty: f64 = flags
        .iter()
        .map(|f| f64::from(f.count) * f.severity.penalty())
        .sum();
    round_to((1.0 - penalty).max(SCORE_FLOOR), 2)
}

pub fn recommendation(score: f64) -> &'static str {
    if score >= 0.9 {
        "✅ High integrity - No review needed"
    } else if score >= 0.75 {
        "⚠️ Review recommended - Medium integrity risk"
    } else {
        "🚫 Manual review required - Low integrity"
    }
}

pub fn simulate_report(
    rng: &mut impl Rng,
    session: &ProctorSession,
    at: OffsetDateTime,
) -> IntegrityReport {
    let flags = simulate_violations(rng, at);
    let integrity_score = integrity_score(&flags);
    IntegrityReport {
        session_id: session.id.clone(),
        user_id: session.user_id.clone(),
        test_name: session.test_name.clone(),
        integrity_score,
        flags,
        recommendation: recommendation(integrity_score).to_string(),
        test_duration: rng.random_range(300..=3600),
        face_detection_accuracy: round_to(rng.random_range(0.92..=0.99), 2),
        avg_response_time: round_to(rng.random_range(1.5..=3.5), 1),
        created_at: at,
    }
}
