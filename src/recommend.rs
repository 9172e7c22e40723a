use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{NewRecommendation, Priority, ProgressRecord, Recommendation, RecommendationKind};
use crate::progress::subject_averages;
use crate::store::{Persistence, RecordStore, Staged, UnitOfWork, RECOMMENDATIONS_KEY};

pub const FOCUS_BELOW: u32 = 60;
pub const IMPROVE_BELOW: u32 = 80;
pub const OVERALL_BELOW: f64 = 70.0;
pub const ALL_SUBJECTS: &str = "All Subjects";

/// What happens to completion markers when the list is regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegenerationPolicy {
    /// Every regenerated item starts active again.
    #[default]
    Reset,
    /// Items matching a completed `(type, subject)` from the previous list stay completed.
    KeepCompleted,
}

pub fn default_curriculum() -> Vec<String> {
    [
        "Pemrograman Dasar",
        "Basis Data",
        "Jaringan Komputer",
        "Pemrograman Web",
        "Sistem Operasi",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn study(subject: &str, priority: Priority, message: String, action: &str) -> NewRecommendation {
    NewRecommendation {
        kind: RecommendationKind::Study,
        subject: subject.to_string(),
        priority,
        message,
        action: action.to_string(),
    }
}

/// Evaluates the rules against a ledger snapshot. Pure; nothing is persisted.
pub fn build(records: &[ProgressRecord], curriculum: &[String]) -> Vec<NewRecommendation> {
    let mut output = Vec::new();

    for (subject, average) in subject_averages(records) {
        if average < FOCUS_BELOW {
            output.push(study(
                &subject,
                Priority::High,
                format!("Focus on {subject}, progress is below {FOCUS_BELOW}%"),
                "Study the fundamentals and do extra practice",
            ));
        } else if average < IMPROVE_BELOW {
            output.push(study(
                &subject,
                Priority::Medium,
                format!("Improve your understanding of {subject}"),
                "Review the material and work through practice problems",
            ));
        }
    }

    if !records.is_empty() {
        let total: u32 = records.iter().map(|r| u32::from(r.progress_percent)).sum();
        let mean = f64::from(total) / records.len() as f64;
        if mean < OVERALL_BELOW {
            output.push(NewRecommendation {
                kind: RecommendationKind::General,
                subject: ALL_SUBJECTS.to_string(),
                priority: Priority::High,
                message: format!("Overall average is below {OVERALL_BELOW}%"),
                action: "Build a regular study schedule".to_string(),
            });
        }
    }

    for subject in curriculum {
        if !records.iter().any(|r| &r.subject == subject) {
            output.push(study(
                subject,
                Priority::High,
                format!("No progress recorded for {subject}"),
                "Start with the fundamentals",
            ));
        }
    }

    output
}

pub struct RecommendationEngine {
    store: RecordStore<Recommendation>,
    curriculum: Vec<String>,
    policy: RegenerationPolicy,
}

impl RecommendationEngine {
    pub fn load(
        backend: Arc<dyn Persistence>,
        curriculum: Vec<String>,
        policy: RegenerationPolicy,
    ) -> Result<Self> {
        Ok(Self {
            store: RecordStore::load(backend, RECOMMENDATIONS_KEY)?,
            curriculum,
            policy,
        })
    }

    pub fn curriculum(&self) -> &[String] {
        &self.curriculum
    }

    pub fn all(&self) -> &[Recommendation] {
        self.store.items()
    }

    pub fn get(&self, id: Uuid) -> Option<&Recommendation> {
        self.all().iter().find(|r| r.id == id)
    }

    fn regenerate(&self, records: &[ProgressRecord]) -> Vec<Recommendation> {
        build(records, &self.curriculum)
            .into_iter()
            .map(|input| {
                let mut recommendation = input.into_recommendation();
                if self.policy == RegenerationPolicy::KeepCompleted {
                    if let Some(previous) = self.all().iter().find(|r| {
                        r.completed && r.kind == recommendation.kind && r.subject == recommendation.subject
                    }) {
                        recommendation.completed = true;
                        recommendation.completed_at = previous.completed_at;
                    }
                }
                recommendation
            })
            .collect()
    }

    /// Replaces the whole collection with a fresh evaluation of the rules.
    pub fn generate(&mut self, records: &[ProgressRecord]) -> Result<usize> {
        let next = self.regenerate(records);
        let count = next.len();
        self.store.mutate(|items| *items = next)?;
        info!(count, policy = ?self.policy, "recommendations regenerated");
        Ok(count)
    }

    pub fn add(&mut self, input: NewRecommendation) -> Result<Recommendation> {
        let recommendation = input.into_recommendation();
        self.store.mutate(|items| items.push(recommendation.clone()))?;
        Ok(recommendation)
    }

    /// Removing an unknown id does nothing.
    pub fn remove(&mut self, id: Uuid) -> Result<()> {
        if self.get(id).is_none() {
            return Ok(());
        }
        self.store.mutate(|items| items.retain(|r| r.id != id))?;
        Ok(())
    }

    /// Completion is terminal; completing twice keeps the first timestamp.
    pub fn complete(&mut self, id: Uuid) -> Result<Recommendation> {
        let position = self
            .all()
            .iter()
            .position(|r| r.id == id)
            .ok_or(EngineError::NotFound { kind: "recommendation", id })?;
        if self.all()[position].completed {
            return Ok(self.all()[position].clone());
        }

        let now = Utc::now();
        self.store.mutate(|items| {
            let item = &mut items[position];
            item.completed = true;
            item.completed_at = Some(now);
            item.clone()
        })
        .map_err(EngineError::from)
    }

    pub fn by_priority(&self, priority: Priority) -> Vec<&Recommendation> {
        self.all()
            .iter()
            .filter(|r| r.priority == priority && !r.completed)
            .collect()
    }

    pub fn active(&self) -> Vec<&Recommendation> {
        self.all().iter().filter(|r| !r.completed).collect()
    }

    pub(crate) fn stage_generate(
        &self,
        uow: &mut UnitOfWork,
        records: &[ProgressRecord],
    ) -> Result<Staged<Recommendation>> {
        let next = self.regenerate(records);
        Ok(self.store.stage(uow, |items| *items = next)?)
    }

    pub(crate) fn apply(&mut self, staged: Staged<Recommendation>) {
        info!(count = staged.items().len(), "recommendations regenerated");
        self.store.apply(staged);
    }
}
