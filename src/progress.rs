use std::sync::Arc;

use chrono::Utc;

use crate::error::{EngineError, Result};
use crate::models::{ProgressRecord, ProgressSummary};
use crate::store::{Persistence, RecordStore, Staged, UnitOfWork, PROGRESS_KEY};

/// Mean of all progress values rounded to the nearest integer; 0 when there are no records.
pub fn overall_average(records: &[ProgressRecord]) -> u32 {
    if records.is_empty() {
        return 0;
    }
    let total: u32 = records.iter().map(|r| u32::from(r.progress_percent)).sum();
    (f64::from(total) / records.len() as f64).round() as u32
}

/// Per-subject means, each rounded on its own, in order of first appearance.
pub fn subject_averages(records: &[ProgressRecord]) -> Vec<(String, u32)> {
    let mut groups: Vec<(String, u32, u32)> = Vec::new();

    for record in records {
        match groups.iter_mut().find(|(subject, _, _)| *subject == record.subject) {
            Some(entry) => {
                entry.1 += u32::from(record.progress_percent);
                entry.2 += 1;
            }
            None => groups.push((record.subject.clone(), u32::from(record.progress_percent), 1)),
        }
    }

    groups
        .into_iter()
        .map(|(subject, total, count)| {
            (subject, (f64::from(total) / f64::from(count)).round() as u32)
        })
        .collect()
}

pub(crate) fn apply_upsert(
    records: &mut Vec<ProgressRecord>,
    subject: &str,
    topic: &str,
    progress_percent: u8,
) {
    let now = Utc::now();
    match records.iter_mut().find(|r| r.matches(subject, topic)) {
        Some(existing) => {
            existing.progress_percent = progress_percent;
            existing.recorded_at = now;
        }
        None => records.push(ProgressRecord {
            subject: subject.to_string(),
            topic: topic.to_string(),
            progress_percent,
            recorded_at: now,
        }),
    }
}

pub(crate) fn apply_remove(records: &mut Vec<ProgressRecord>, subject: &str, topic: &str) {
    records.retain(|r| !r.matches(subject, topic));
}

pub(crate) fn validate_progress(progress_percent: u8) -> Result<()> {
    if progress_percent > 100 {
        return Err(EngineError::InvalidProgress(progress_percent));
    }
    Ok(())
}

pub struct ProgressLedger {
    store: RecordStore<ProgressRecord>,
}

impl ProgressLedger {
    pub fn load(backend: Arc<dyn Persistence>) -> Result<Self> {
        Ok(Self {
            store: RecordStore::load(backend, PROGRESS_KEY)?,
        })
    }

    pub fn records(&self) -> &[ProgressRecord] {
        self.store.items()
    }

    /// Inserts a record or replaces the percentage (and timestamp) of the existing one.
    pub fn upsert(&mut self, subject: &str, topic: &str, progress_percent: u8) -> Result<()> {
        validate_progress(progress_percent)?;
        self.store
            .mutate(|records| apply_upsert(records, subject, topic, progress_percent))?;
        Ok(())
    }

    /// Deleting a pair that is not present is not an error.
    pub fn remove(&mut self, subject: &str, topic: &str) -> Result<()> {
        if !self.records().iter().any(|r| r.matches(subject, topic)) {
            return Ok(());
        }
        self.store.mutate(|records| apply_remove(records, subject, topic))?;
        Ok(())
    }

    pub fn by_subject(&self, subject: &str) -> Vec<&ProgressRecord> {
        self.records().iter().filter(|r| r.subject == subject).collect()
    }

    pub fn subjects(&self) -> Vec<String> {
        subject_averages(self.records())
            .into_iter()
            .map(|(subject, _)| subject)
            .collect()
    }

    pub fn by_overall(&self) -> u32 {
        overall_average(self.records())
    }

    pub fn by_subject_summary(&self) -> Vec<(String, u32)> {
        subject_averages(self.records())
    }

    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            overall: self.by_overall(),
            by_subject: self.by_subject_summary(),
            record_count: self.records().len(),
        }
    }

    pub(crate) fn stage(
        &self,
        uow: &mut UnitOfWork,
        f: impl FnOnce(&mut Vec<ProgressRecord>),
    ) -> Result<Staged<ProgressRecord>> {
        Ok(self.store.stage(uow, f)?)
    }

    pub(crate) fn apply(&mut self, staged: Staged<ProgressRecord>) {
        self.store.apply(staged);
    }
}
