//! Wires the stores and engines together over one persistence backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::assessment::PeerAssessmentEngine;
use crate::config::Config;
use crate::error::Result;
use crate::import::ProgressRow;
use crate::models::{NewAssessment, ProgressRecord};
use crate::progress::{apply_remove, apply_upsert, validate_progress, ProgressLedger};
use crate::recommend::RecommendationEngine;
use crate::store::{Persistence, UnitOfWork};

pub struct Dashboard {
    backend: Arc<dyn Persistence>,
    progress: ProgressLedger,
    assessments: PeerAssessmentEngine,
    recommendations: RecommendationEngine,
}

impl Dashboard {
    pub fn open(backend: Arc<dyn Persistence>, config: &Config) -> Result<Self> {
        Ok(Self {
            progress: ProgressLedger::load(backend.clone())?,
            assessments: PeerAssessmentEngine::load(backend.clone())?,
            recommendations: RecommendationEngine::load(
                backend.clone(),
                config.curriculum.clone(),
                config.policy,
            )?,
            backend,
        })
    }

    pub fn progress(&self) -> &ProgressLedger {
        &self.progress
    }

    pub fn assessments(&self) -> &PeerAssessmentEngine {
        &self.assessments
    }

    pub fn assessments_mut(&mut self) -> &mut PeerAssessmentEngine {
        &mut self.assessments
    }

    pub fn recommendations(&self) -> &RecommendationEngine {
        &self.recommendations
    }

    pub fn recommendations_mut(&mut self) -> &mut RecommendationEngine {
        &mut self.recommendations
    }

    /// Upserts one record and regenerates recommendations; both collections change or neither.
    pub fn record_progress(&mut self, subject: &str, topic: &str, progress_percent: u8) -> Result<()> {
        validate_progress(progress_percent)?;
        self.apply_progress(|records| apply_upsert(records, subject, topic, progress_percent))
    }

    /// Removing a pair that is not recorded leaves both collections untouched.
    pub fn remove_progress(&mut self, subject: &str, topic: &str) -> Result<()> {
        if !self.progress.records().iter().any(|r| r.matches(subject, topic)) {
            return Ok(());
        }
        self.apply_progress(|records| apply_remove(records, subject, topic))
    }

    /// Applies every row, then regenerates once.
    pub fn import_progress(&mut self, rows: &[ProgressRow]) -> Result<usize> {
        for row in rows {
            validate_progress(row.progress_percent)?;
        }
        self.apply_progress(|records| {
            for row in rows {
                apply_upsert(records, &row.subject, &row.topic, row.progress_percent);
            }
        })?;
        info!(rows = rows.len(), "progress imported");
        Ok(rows.len())
    }

    pub fn generate_recommendations(&mut self) -> Result<usize> {
        self.recommendations.generate(self.progress.records())
    }

    fn apply_progress(
        &mut self,
        f: impl FnOnce(&mut Vec<ProgressRecord>),
    ) -> Result<()> {
        let mut uow = UnitOfWork::new(self.backend.clone());
        let progress = self.progress.stage(&mut uow, f)?;
        let recommendations = self
            .recommendations
            .stage_generate(&mut uow, progress.items())?;
        uow.commit()?;

        self.progress.apply(progress);
        self.recommendations.apply(recommendations);
        Ok(())
    }

    /// Deletes every assessment of a project in one write.
    pub fn delete_project_assessments(&mut self, project_id: &str) -> Result<usize> {
        let before = self.assessments.by_project(project_id).len();
        if before == 0 {
            return Ok(0);
        }
        let mut uow = UnitOfWork::new(self.backend.clone());
        let staged = self.assessments.stage_assessments(&mut uow, |items| {
            items.retain(|a| a.project_id.as_deref() != Some(project_id))
        })?;
        uow.commit()?;
        self.assessments.apply_assessments(staged);
        info!(project = project_id, removed = before, "project assessments deleted");
        Ok(before)
    }

    /// Loads a small demo dataset on top of whatever is already stored.
    pub fn seed(&mut self) -> Result<()> {
        let rows = [
            ("Pemrograman Dasar", "Percabangan", 92),
            ("Pemrograman Dasar", "Perulangan", 85),
            ("Basis Data", "Normalisasi", 55),
            ("Basis Data", "SQL Join", 68),
            ("Jaringan Komputer", "Subnetting", 30),
            ("Pemrograman Web", "HTML & CSS", 74),
        ]
        .into_iter()
        .map(|(subject, topic, progress_percent)| ProgressRow {
            subject: subject.to_string(),
            topic: topic.to_string(),
            progress_percent,
        })
        .collect::<Vec<_>>();
        self.import_progress(&rows)?;

        let criteria: Vec<_> = self.assessments.criteria().iter().map(|c| c.id).collect();
        let samples = [
            ("avery", "jules", [5, 4, 4, 5]),
            ("kiara", "jules", [4, 4, 3, 5]),
            ("jules", "avery", [3, 5, 4, 4]),
        ];
        for (assessor, student, scores) in samples {
            let ratings: BTreeMap<_, _> = criteria.iter().copied().zip(scores).collect();
            self.assessments.create_assessment(NewAssessment {
                group_id: "kelompok-1".to_string(),
                project_id: Some("portfolio-web".to_string()),
                assessed_student_id: student.to_string(),
                assessor: assessor.to_string(),
                ratings,
                comments: None,
            })?;
        }

        Ok(())
    }
}
