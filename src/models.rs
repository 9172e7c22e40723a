use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Completion entry for one topic of a subject. `(subject, topic)` is unique within a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub subject: String,
    pub topic: String,
    pub progress_percent: u8,
    pub recorded_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn matches(&self, subject: &str, topic: &str) -> bool {
        self.subject == subject && self.topic == topic
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Percentage points. The catalog is expected to sum to 100 but nothing enforces it.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCriterion {
    pub name: String,
    pub description: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: Uuid,
    pub group_id: String,
    pub project_id: Option<String>,
    pub assessed_student_id: String,
    pub assessor: String,
    /// Sparse: a criterion with no entry rates as 0.
    pub ratings: BTreeMap<Uuid, u8>,
    #[serde(default)]
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Assessment {
    pub fn rating_for(&self, criterion_id: Uuid) -> Option<u8> {
        self.ratings.get(&criterion_id).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssessment {
    pub group_id: String,
    pub project_id: Option<String>,
    pub assessed_student_id: String,
    pub assessor: String,
    pub ratings: BTreeMap<Uuid, u8>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    Study,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub subject: String,
    pub priority: Priority,
    pub message: String,
    pub action: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Caller-supplied recommendation, before an id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecommendation {
    pub kind: RecommendationKind,
    pub subject: String,
    pub priority: Priority,
    pub message: String,
    pub action: String,
}

impl NewRecommendation {
    pub fn into_recommendation(self) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            kind: self.kind,
            subject: self.subject,
            priority: self.priority,
            message: self.message,
            action: self.action,
            completed: false,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSummary {
    pub overall: u32,
    pub by_subject: Vec<(String, u32)>,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionStat {
    pub criterion_id: Uuid,
    pub criterion_name: String,
    pub average_rating: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatistics {
    pub student_id: String,
    pub total_assessments: usize,
    pub average_score: f64,
    pub criterion_stats: Vec<CriterionStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatistics {
    pub project_id: String,
    pub total_assessments: usize,
    pub assessed_students: usize,
    pub student_stats: Vec<StudentStatistics>,
}
