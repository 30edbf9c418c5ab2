//! Follow-up reminders on a job.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Reminder cadence relative to the moment the reminder is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Day1,
    Day20,
    Day30,
}

impl Cadence {
    pub fn days(self) -> i64 {
        match self {
            Cadence::Day1 => 1,
            Cadence::Day20 => 20,
            Cadence::Day30 => 30,
        }
    }

    pub fn delay(self) -> Duration {
        Duration::days(self.days())
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Day1 => write!(f, "day1"),
            Cadence::Day20 => write!(f, "day20"),
            Cadence::Day30 => write!(f, "day30"),
        }
    }
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day1" => Ok(Cadence::Day1),
            "day20" => Ok(Cadence::Day20),
            "day30" => Ok(Cadence::Day30),
            other => Err(format!("invalid cadence: '{other}'")),
        }
    }
}

/// A scheduled reminder. `send_at` is fixed at creation; `sent_at` is write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub job_id: Uuid,
    pub cadence: Cadence,
    pub send_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    pub fn schedule(job_id: Uuid, cadence: Cadence, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            cadence,
            send_at: now + cadence.delay(),
            sent_at: None,
            created_at: now,
        }
    }

    pub fn is_sent(&self) -> bool {
        self.sent_at.is_some()
    }
}
