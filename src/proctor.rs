//! Decorative exam-proctoring alerts drawn from a fixed weighted table.
//!
//! Nothing here observes the learner: every alert is a random draw.

pub mod integrity;

use std::{collections::VecDeque, fmt, time::Duration};

use rand::{Rng, rng};
use time::OffsetDateTime;
use tokio::sync::mpsc::Sender;
use tracing::debug;

use crate::utils::now_utc;

pub const HISTORY_LIMIT: usize = 10;
pub const TICK_PERIOD: Duration = Duration::from_secs(5);
const START_MESSAGE: &str = "AI monitoring initialized";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Info,
    Success,
    Warning,
    Danger,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Info => "info",
            AlertKind::Success => "success",
            AlertKind::Warning => "warning",
            AlertKind::Danger => "danger",
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct AlertTemplate {
    pub message: &'static str,
    pub kind: AlertKind,
    pub weight: f64,
}

pub static ALERT_TABLE: [AlertTemplate; 6] = [
    AlertTemplate {
        message: "Multiple faces detected",
        kind: AlertKind::Warning,
        weight: 0.15,
    },
    AlertTemplate {
        message: "User looking away from screen",
        kind: AlertKind::Warning,
        weight: 0.20,
    },
    AlertTemplate {
        message: "Background voice detected",
        kind: AlertKind::Warning,
        weight: 0.15,
    },
    AlertTemplate {
        message: "User verified - Face match confirmed",
        kind: AlertKind::Success,
        weight: 0.25,
    },
    AlertTemplate {
        message: "Tab switch detected",
        kind: AlertKind::Danger,
        weight: 0.10,
    },
    AlertTemplate {
        message: "Maintaining focus",
        kind: AlertKind::Success,
        weight: 0.15,
    },
];

/// First entry whose cumulative weight reaches `draw`.
pub fn pick(draw: f64, table: &[AlertTemplate]) -> Option<&AlertTemplate> {
    let mut sum = 0.0;
    table.iter().find(|entry| {
        sum += entry.weight;
        draw <= sum
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: u64,
    pub message: &'static str,
    pub kind: AlertKind,
    pub at: OffsetDateTime,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

pub struct ProctorFeed {
    draw: Box<dyn FnMut() -> f64 + Send>,
    current: Option<Alert>,
    history: VecDeque<Alert>,
    next_id: u64,
}

impl ProctorFeed {
    /// `draw` must yield values in `[0, 1)`.
    pub fn new(draw: impl FnMut() -> f64 + Send + 'static) -> Self {
        Self {
            draw: Box::new(draw),
            current: None,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            next_id: 0,
        }
    }

    pub fn with_rng() -> Self {
        Self::new(|| rng().random::<f64>())
    }

    pub fn current(&self) -> Option<&Alert> {
        self.current.as_ref()
    }

    /// Oldest first
    pub fn history(&self) -> impl Iterator<Item = &Alert> {
        self.history.iter()
    }

    fn emit(&mut self, message: &'static str, kind: AlertKind) -> Alert {
        self.next_id += 1;
        let alert = Alert {
            id: self.next_id,
            message,
            kind,
            at: now_utc(),
        };
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(alert.clone());
        self.current = Some(alert.clone());
        alert
    }

    /// Clears the history and emits the start notice.
    pub fn start(&mut self) -> Alert {
        self.history.clear();
        self.emit(START_MESSAGE, AlertKind::Info)
    }

    pub fn tick(&mut self) -> Option<Alert> {
        let draw = (self.draw)();
        let template = pick(draw, &ALERT_TABLE)?;
        Some(self.emit(template.message, template.kind))
    }

    /// Emits the start notice, then one draw per `period` until `tx` closes.
    pub async fn run(mut self, period: Duration, tx: Sender<Alert>) -> Self {
        if tx.send(self.start()).await.is_err() {
            return self;
        }
        let mut interval = tokio::time::interval(period);
        // the first tick completes immediately
        interval.tick().await;
        while !tx.is_closed() {
            interval.tick().await;
            if let Some(alert) = self.tick() {
                debug!(id = alert.id, alert = alert.message, "proctor alert");
                if tx.send(alert).await.is_err() {
                    break;
                }
            }
        }
        self
    }
}
