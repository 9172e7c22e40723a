use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{
    Assessment, Criterion, CriterionStat, NewAssessment, NewCriterion, ProjectStatistics,
    StudentStatistics,
};
use crate::store::{Persistence, RecordStore, Staged, UnitOfWork, ASSESSMENTS_KEY, CRITERIA_KEY};

pub const MAX_RATING: u8 = 5;
pub const WEIGHT_TOLERANCE: f64 = 0.001;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn find_criterion(criteria: &[Criterion], id: Uuid) -> Option<&Criterion> {
    criteria.iter().find(|c| c.id == id)
}

/// Sum of `rating * weight / 100` against the given catalog. Ratings whose criterion no longer
/// exists contribute nothing; criteria without a rating count as 0.
pub fn weighted_score(assessment: &Assessment, criteria: &[Criterion]) -> f64 {
    assessment
        .ratings
        .iter()
        .filter_map(|(id, rating)| {
            find_criterion(criteria, *id).map(|c| f64::from(*rating) * c.weight / 100.0)
        })
        .sum()
}

pub fn average_score<'a>(
    assessments: impl IntoIterator<Item = &'a Assessment>,
    criteria: &[Criterion],
) -> f64 {
    let (total, count) = assessments
        .into_iter()
        .fold((0.0, 0usize), |(total, count), assessment| {
            (total + weighted_score(assessment, criteria), count + 1)
        });

    if count == 0 {
        return 0.0;
    }
    round2(total / count as f64)
}

/// Mean raw rating over the assessments that rated `criterion_id`.
pub fn criterion_average<'a>(
    assessments: impl IntoIterator<Item = &'a Assessment>,
    criterion_id: Uuid,
) -> f64 {
    let (total, count) = assessments
        .into_iter()
        .filter_map(|a| a.rating_for(criterion_id))
        .fold((0u32, 0u32), |(total, count), rating| {
            (total + u32::from(rating), count + 1)
        });

    if count == 0 {
        return 0.0;
    }
    round2(f64::from(total) / f64::from(count))
}

pub fn default_criteria() -> Vec<Criterion> {
    [
        ("Teamwork", "Works well with group members"),
        ("Communication", "Shares ideas and updates clearly"),
        ("Contribution", "Delivers a fair share of the work"),
        ("Responsibility", "Meets deadlines and commitments"),
    ]
    .into_iter()
    .map(|(name, description)| Criterion {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: description.to_string(),
        weight: 25.0,
    })
    .collect()
}

fn validate_ratings(input: &NewAssessment) -> Result<()> {
    match input.ratings.iter().find(|(_, rating)| **rating > MAX_RATING) {
        Some((criterion_id, rating)) => Err(EngineError::InvalidRating {
            criterion_id: *criterion_id,
            rating: *rating,
        }),
        None => Ok(()),
    }
}

pub struct PeerAssessmentEngine {
    criteria: RecordStore<Criterion>,
    assessments: RecordStore<Assessment>,
}

impl PeerAssessmentEngine {
    /// Seeds the default catalog when no criteria were ever stored.
    pub fn load(backend: Arc<dyn Persistence>) -> Result<Self> {
        Ok(Self {
            criteria: RecordStore::load_or(backend.clone(), CRITERIA_KEY, default_criteria)?,
            assessments: RecordStore::load(backend, ASSESSMENTS_KEY)?,
        })
    }

    pub fn criteria(&self) -> &[Criterion] {
        self.criteria.items()
    }

    pub fn criterion(&self, id: Uuid) -> Option<&Criterion> {
        find_criterion(self.criteria(), id)
    }

    /// Not enforced anywhere; exposed so callers can warn when it is not 100.
    pub fn total_weight(&self) -> f64 {
        self.criteria().iter().map(|c| c.weight).sum()
    }

    pub fn weights_balanced(&self) -> bool {
        (self.total_weight() - 100.0).abs() < WEIGHT_TOLERANCE
    }

    pub fn create_criterion(&mut self, input: NewCriterion) -> Result<Criterion> {
        let criterion = Criterion {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            weight: input.weight,
        };
        self.criteria.mutate(|items| items.push(criterion.clone()))?;
        Ok(criterion)
    }

    pub fn update_criterion(&mut self, id: Uuid, input: NewCriterion) -> Result<Criterion> {
        let position = self
            .criteria()
            .iter()
            .position(|c| c.id == id)
            .ok_or(EngineError::NotFound { kind: "criterion", id })?;
        let updated = Criterion {
            id,
            name: input.name,
            description: input.description,
            weight: input.weight,
        };
        self.criteria
            .mutate(|items| items[position] = updated.clone())?;
        Ok(updated)
    }

    /// Assessments that rated this criterion keep their ratings; they just stop counting.
    pub fn delete_criterion(&mut self, id: Uuid) -> Result<()> {
        if self.criterion(id).is_none() {
            return Err(EngineError::NotFound { kind: "criterion", id });
        }
        self.criteria.mutate(|items| items.retain(|c| c.id != id))?;
        Ok(())
    }

    pub fn assessments(&self) -> &[Assessment] {
        self.assessments.items()
    }

    pub fn assessment(&self, id: Uuid) -> Option<&Assessment> {
        self.assessments().iter().find(|a| a.id == id)
    }

    pub fn create_assessment(&mut self, input: NewAssessment) -> Result<Assessment> {
        validate_ratings(&input)?;
        let assessment = Assessment {
            id: Uuid::new_v4(),
            group_id: input.group_id,
            project_id: input.project_id,
            assessed_student_id: input.assessed_student_id,
            assessor: input.assessor,
            ratings: input.ratings,
            comments: input.comments,
            created_at: Utc::now(),
        };
        self.assessments
            .mutate(|items| items.push(assessment.clone()))?;
        info!(
            assessment = %assessment.id,
            student = %assessment.assessed_student_id,
            "assessment recorded"
        );
        Ok(assessment)
    }

    pub fn update_assessment(&mut self, id: Uuid, input: NewAssessment) -> Result<Assessment> {
        validate_ratings(&input)?;
        let position = self
            .assessments()
            .iter()
            .position(|a| a.id == id)
            .ok_or(EngineError::NotFound { kind: "assessment", id })?;
        let updated = Assessment {
            id,
            group_id: input.group_id,
            project_id: input.project_id,
            assessed_student_id: input.assessed_student_id,
            assessor: input.assessor,
            ratings: input.ratings,
            comments: input.comments,
            created_at: self.assessments()[position].created_at,
        };
        self.assessments
            .mutate(|items| items[position] = updated.clone())?;
        Ok(updated)
    }

    pub fn delete_assessment(&mut self, id: Uuid) -> Result<()> {
        if self.assessment(id).is_none() {
            return Err(EngineError::NotFound { kind: "assessment", id });
        }
        self.assessments.mutate(|items| items.retain(|a| a.id != id))?;
        Ok(())
    }

    pub fn by_project(&self, project_id: &str) -> Vec<&Assessment> {
        self.assessments()
            .iter()
            .filter(|a| a.project_id.as_deref() == Some(project_id))
            .collect()
    }

    pub fn by_group(&self, group_id: &str) -> Vec<&Assessment> {
        self.assessments()
            .iter()
            .filter(|a| a.group_id == group_id)
            .collect()
    }

    pub fn by_assessed_student(&self, student_id: &str) -> Vec<&Assessment> {
        self.assessments()
            .iter()
            .filter(|a| a.assessed_student_id == student_id)
            .collect()
    }

    pub fn by_assessor(&self, assessor: &str) -> Vec<&Assessment> {
        self.assessments()
            .iter()
            .filter(|a| a.assessor == assessor)
            .collect()
    }

    /// Narrows by every filter that is set; `None` everywhere returns all assessments.
    pub fn search(
        &self,
        project_id: Option<&str>,
        student_id: Option<&str>,
        assessor: Option<&str>,
    ) -> Vec<&Assessment> {
        let mut matches: Vec<&Assessment> = match project_id {
            Some(project_id) => self.by_project(project_id),
            None => self.assessments().iter().collect(),
        };
        if let Some(student_id) = student_id {
            let allowed: Vec<Uuid> = self
                .by_assessed_student(student_id)
                .iter()
                .map(|a| a.id)
                .collect();
            matches.retain(|a| allowed.contains(&a.id));
        }
        if let Some(assessor) = assessor {
            let allowed: Vec<Uuid> = self.by_assessor(assessor).iter().map(|a| a.id).collect();
            matches.retain(|a| allowed.contains(&a.id));
        }
        matches
    }

    /// Evaluated against the current catalog, so later weight edits change old scores.
    pub fn weighted_score(&self, assessment: &Assessment) -> f64 {
        weighted_score(assessment, self.criteria())
    }

    pub fn average_score<'a>(&self, assessments: impl IntoIterator<Item = &'a Assessment>) -> f64 {
        average_score(assessments, self.criteria())
    }

    pub fn criterion_average<'a>(
        &self,
        assessments: impl IntoIterator<Item = &'a Assessment>,
        criterion_id: Uuid,
    ) -> f64 {
        criterion_average(assessments, criterion_id)
    }

    pub fn student_statistics(&self, project_id: &str, student_id: &str) -> StudentStatistics {
        let assessments: Vec<&Assessment> = self
            .by_project(project_id)
            .into_iter()
            .filter(|a| a.assessed_student_id == student_id)
            .collect();

        let criterion_stats = self
            .criteria()
            .iter()
            .map(|criterion| CriterionStat {
                criterion_id: criterion.id,
                criterion_name: criterion.name.clone(),
                average_rating: criterion_average(assessments.iter().copied(), criterion.id),
                weight: criterion.weight,
            })
            .collect();

        StudentStatistics {
            student_id: student_id.to_string(),
            total_assessments: assessments.len(),
            average_score: self.average_score(assessments.iter().copied()),
            criterion_stats,
        }
    }

    pub fn project_statistics(&self, project_id: &str) -> ProjectStatistics {
        let assessments = self.by_project(project_id);
        let mut students: Vec<&str> = Vec::new();
        for assessment in &assessments {
            if !students.contains(&assessment.assessed_student_id.as_str()) {
                students.push(&assessment.assessed_student_id);
            }
        }

        ProjectStatistics {
            project_id: project_id.to_string(),
            total_assessments: assessments.len(),
            assessed_students: students.len(),
            student_stats: students
                .into_iter()
                .map(|student| self.student_statistics(project_id, student))
                .collect(),
        }
    }

    pub(crate) fn stage_assessments(
        &self,
        uow: &mut UnitOfWork,
        f: impl FnOnce(&mut Vec<Assessment>),
    ) -> Result<Staged<Assessment>> {
        Ok(self.assessments.stage(uow, f)?)
    }

    pub(crate) fn apply_assessments(&mut self, staged: Staged<Assessment>) {
        self.assessments.apply(staged);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::store::MemoryStore;

    fn criterion(weight: f64) -> Criterion {
        Criterion {
            id: Uuid::new_v4(),
            name: format!("criterion {weight}"),
            description: String::new(),
            weight,
        }
    }

    fn new_assessment(project: &str, student: &str, ratings: &[(Uuid, u8)]) -> NewAssessment {
        NewAssessment {
            group_id: "group-1".to_string(),
            project_id: Some(project.to_string()),
            assessed_student_id: student.to_string(),
            assessor: "assessor-1".to_string(),
            ratings: ratings.iter().copied().collect::<BTreeMap<_, _>>(),
            comments: None,
        }
    }

    fn engine_with(weights: &[f64]) -> (PeerAssessmentEngine, Vec<Uuid>) {
        let mut engine = PeerAssessmentEngine::load(Arc::new(MemoryStore::new())).unwrap();
        for id in engine.criteria().iter().map(|c| c.id).collect::<Vec<_>>() {
            engine.delete_criterion(id).unwrap();
        }
        let ids = weights
            .iter()
            .map(|weight| {
                engine
                    .create_criterion(NewCriterion {
                        name: format!("criterion {weight}"),
                        description: String::new(),
                        weight: *weight,
                    })
                    .unwrap()
                    .id
            })
            .collect();
        (engine, ids)
    }

    #[test]
    fn default_catalog_sums_to_hundred() {
        let engine = PeerAssessmentEngine::load(Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(engine.criteria().len(), 4);
        assert!((engine.total_weight() - 100.0).abs() < 0.001);
    }

    #[test]
    fn weighted_score_scales_by_weight() {
        let (mut engine, ids) = engine_with(&[60.0, 40.0]);
        let assessment = engine
            .create_assessment(new_assessment("p1", "s1", &[(ids[0], 5), (ids[1], 0)]))
            .unwrap();
        assert!((engine.weighted_score(&assessment) - 3.0).abs() < 0.001);
    }

    #[test]
    fn missing_rating_contributes_zero() {
        let criteria = vec![criterion(50.0), criterion(50.0)];
        let assessment = Assessment {
            id: Uuid::new_v4(),
            group_id: "g".to_string(),
            project_id: None,
            assessed_student_id: "s".to_string(),
            assessor: "a".to_string(),
            ratings: [(criteria[0].id, 4)].into_iter().collect(),
            comments: None,
            created_at: Utc::now(),
        };
        assert!((weighted_score(&assessment, &criteria) - 2.0).abs() < 0.001);
    }

    #[test]
    fn deleted_criterion_is_ignored() {
        let (mut engine, ids) = engine_with(&[60.0, 40.0]);
        let assessment = engine
            .create_assessment(new_assessment("p1", "s1", &[(ids[0], 5), (ids[1], 4)]))
            .unwrap();
        assert!((engine.weighted_score(&assessment) - 4.6).abs() < 0.001);

        engine.delete_criterion(ids[1]).unwrap();
        assert!((engine.weighted_score(&assessment) - 3.0).abs() < 0.001);
        assert_eq!(engine.assessment(assessment.id).unwrap().ratings.len(), 2);
    }

    #[test]
    fn weights_not_summing_to_hundred_are_used_as_is() {
        let (mut engine, ids) = engine_with(&[80.0, 80.0]);
        let assessment = engine
            .create_assessment(new_assessment("p1", "s1", &[(ids[0], 5), (ids[1], 5)]))
            .unwrap();
        assert!((engine.total_weight() - 160.0).abs() < 0.001);
        assert!((engine.weighted_score(&assessment) - 8.0).abs() < 0.001);
    }

    #[test]
    fn editing_weights_changes_old_scores() {
        let (mut engine, ids) = engine_with(&[60.0, 40.0]);
        let assessment = engine
            .create_assessment(new_assessment("p1", "s1", &[(ids[0], 5), (ids[1], 0)]))
            .unwrap();
        engine
            .update_criterion(
                ids[0],
                NewCriterion {
                    name: "criterion 60".to_string(),
                    description: String::new(),
                    weight: 20.0,
                },
            )
            .unwrap();
        assert!((engine.weighted_score(&assessment) - 1.0).abs() < 0.001);
    }

    #[test]
    fn empty_lists_average_to_zero() {
        let (engine, ids) = engine_with(&[100.0]);
        assert_eq!(engine.average_score(&[] as &[Assessment]), 0.0);
        assert_eq!(engine.criterion_average(&[] as &[Assessment], ids[0]), 0.0);
    }

    #[test]
    fn criterion_average_skips_assessments_without_rating() {
        let (mut engine, ids) = engine_with(&[50.0, 50.0]);
        engine
            .create_assessment(new_assessment("p1", "s1", &[(ids[0], 4)]))
            .unwrap();
        engine
            .create_assessment(new_assessment("p1", "s1", &[(ids[0], 3), (ids[1], 5)]))
            .unwrap();

        let assessments = engine.by_project("p1");
        assert!((engine.criterion_average(assessments.iter().copied(), ids[0]) - 3.5).abs() < 0.001);
        assert!((engine.criterion_average(assessments.iter().copied(), ids[1]) - 5.0).abs() < 0.001);
        assert_eq!(engine.criterion_average(assessments.iter().copied(), Uuid::new_v4()), 0.0);
    }

    #[test]
    fn average_score_rounds_to_two_decimals() {
        let (mut engine, ids) = engine_with(&[100.0]);
        for rating in [1, 2, 2] {
            engine
                .create_assessment(new_assessment("p1", "s1", &[(ids[0], rating)]))
                .unwrap();
        }
        assert_eq!(engine.average_score(engine.assessments()), 1.67);
    }

    #[test]
    fn rejects_rating_above_five() {
        let (mut engine, ids) = engine_with(&[100.0]);
        let result = engine.create_assessment(new_assessment("p1", "s1", &[(ids[0], 6)]));
        assert!(matches!(result, Err(EngineError::InvalidRating { rating: 6, .. })));
        assert!(engine.assessments().is_empty());
    }

    #[test]
    fn project_statistics_folds_same_student() {
        let (mut engine, ids) = engine_with(&[60.0, 40.0]);
        engine
            .create_assessment(new_assessment("p1", "s1", &[(ids[0], 5), (ids[1], 0)]))
            .unwrap();
        engine
            .create_assessment(new_assessment("p1", "s1", &[(ids[0], 3), (ids[1], 5)]))
            .unwrap();
        engine
            .create_assessment(new_assessment("p2", "s2", &[(ids[0], 1)]))
            .unwrap();

        let stats = engine.project_statistics("p1");
        assert_eq!(stats.total_assessments, 2);
        assert_eq!(stats.assessed_students, 1);
        assert_eq!(stats.student_stats.len(), 1);

        let student = &stats.student_stats[0];
        assert_eq!(student.total_assessments, 2);
        // (3.0 + 3.8) / 2
        assert!((student.average_score - 3.4).abs() < 0.001);
        assert_eq!(student.criterion_stats.len(), 2);
        assert!((student.criterion_stats[0].average_rating - 4.0).abs() < 0.001);
    }

    #[test]
    fn project_statistics_keeps_first_appearance_order() {
        let (mut engine, ids) = engine_with(&[100.0]);
        for student in ["s2", "s1", "s2", "s3"] {
            engine
                .create_assessment(new_assessment("p1", student, &[(ids[0], 4)]))
                .unwrap();
        }
        let stats = engine.project_statistics("p1");
        let order: Vec<&str> = stats.student_stats.iter().map(|s| s.student_id.as_str()).collect();
        assert_eq!(order, ["s2", "s1", "s3"]);
    }

    #[test]
    fn filters_by_assessor_and_student() {
        let (mut engine, ids) = engine_with(&[100.0]);
        let mut input = new_assessment("p1", "s1", &[(ids[0], 4)]);
        input.assessor = "alice".to_string();
        engine.create_assessment(input).unwrap();
        engine
            .create_assessment(new_assessment("p1", "s2", &[(ids[0], 2)]))
            .unwrap();

        assert_eq!(engine.by_assessor("alice").len(), 1);
        assert_eq!(engine.by_assessed_student("s2").len(), 1);
        assert_eq!(engine.by_group("group-1").len(), 2);
    }

    #[test]
    fn search_combines_filters() {
        let (mut engine, ids) = engine_with(&[100.0]);
        let mut input = new_assessment("p1", "s1", &[(ids[0], 4)]);
        input.assessor = "alice".to_string();
        engine.create_assessment(input).unwrap();
        engine
            .create_assessment(new_assessment("p1", "s1", &[(ids[0], 3)]))
            .unwrap();
        engine
            .create_assessment(new_assessment("p2", "s1", &[(ids[0], 2)]))
            .unwrap();

        assert_eq!(engine.search(None, None, None).len(), 3);
        assert_eq!(engine.search(Some("p1"), None, None).len(), 2);
        assert_eq!(engine.search(None, Some("s1"), None).len(), 3);
        assert_eq!(engine.search(Some("p1"), Some("s1"), Some("alice")).len(), 1);
        assert!(engine.search(Some("p2"), None, Some("alice")).is_empty());
    }

    #[test]
    fn thirds_count_as_balanced_weights() {
        let (engine, _) = engine_with(&[33.33, 33.33, 33.34]);
        assert!(engine.weights_balanced());

        let (engine, _) = engine_with(&[60.0, 30.0]);
        assert!(!engine.weights_balanced());
    }

    #[test]
    fn update_and_delete_missing_assessment_report_not_found() {
        let (mut engine, ids) = engine_with(&[100.0]);
        let missing = Uuid::new_v4();
        assert!(matches!(
            engine.update_assessment(missing, new_assessment("p1", "s1", &[(ids[0], 1)])),
            Err(EngineError::NotFound { kind: "assessment", .. })
        ));
        assert!(matches!(
            engine.delete_assessment(missing),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn update_assessment_keeps_creation_time() {
        let (mut engine, ids) = engine_with(&[100.0]);
        let created = engine
            .create_assessment(new_assessment("p1", "s1", &[(ids[0], 1)]))
            .unwrap();
        let updated = engine
            .update_assessment(created.id, new_assessment("p1", "s1", &[(ids[0], 5)]))
            .unwrap();
        assert_eq!(updated.created_at, created.created_at);
        assert!((engine.weighted_score(&updated) - 5.0).abs() < 0.001);
    }
}
