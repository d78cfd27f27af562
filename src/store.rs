use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::models::{
    Application, ApplicationStats, ApplicationStatus, Match, ScholarshipCriteria, StudentProfile,
};

#[async_trait]
pub trait StudentDirectory: Send + Sync {
    async fn get_student(&self, id: i32) -> anyhow::Result<Option<StudentProfile>>;
    async fn list_all_students(&self) -> anyhow::Result<Vec<StudentProfile>>;

    /// Profiles for the given ids in one lookup. Unknown ids are skipped.
    async fn get_students(&self, ids: &[i32]) -> anyhow::Result<Vec<StudentProfile>> {
        let wanted: BTreeSet<i32> = ids.iter().copied().collect();
        let mut students = self.list_all_students().await?;
        students.retain(|s| wanted.contains(&s.id));
        Ok(students)
    }
}

#[async_trait]
pub trait ScholarshipDirectory: Send + Sync {
    async fn get_scholarship(&self, id: i32) -> anyhow::Result<Option<ScholarshipCriteria>>;
    async fn list_all_scholarships(&self) -> anyhow::Result<Vec<ScholarshipCriteria>>;
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn delete_matches_for_student(&self, student_id: i32) -> anyhow::Result<()>;
    async fn save_match(&self, record: &Match) -> anyhow::Result<()>;
    /// Matches for one student, highest score first.
    async fn find_matches_for_student(&self, student_id: i32) -> anyhow::Result<Vec<Match>>;
    async fn find_matches_above_score(&self, min_score: f64) -> anyhow::Result<Vec<Match>>;
    async fn find_match(
        &self,
        student_id: i32,
        scholarship_id: i32,
    ) -> anyhow::Result<Option<Match>>;

    /// Supersedes every stored match of the student. Implementations backed by
    /// a database should make the delete and the inserts one transaction.
    async fn replace_matches_for_student(
        &self,
        student_id: i32,
        matches: &[Match],
    ) -> anyhow::Result<()> {
        self.delete_matches_for_student(student_id).await?;
        for record in matches {
            self.save_match(record).await?;
        }
        Ok(())
    }

    async fn replace_all_matches(&self, batches: &[(i32, Vec<Match>)]) -> anyhow::Result<()> {
        for (student_id, matches) in batches {
            self.replace_matches_for_student(*student_id, matches).await?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait ApplicationTracker: Send + Sync {
    async fn has_application(&self, student_id: i32, scholarship_id: i32) -> anyhow::Result<bool>;
    /// Records the application and takes one slot from the scholarship if any remain.
    async fn submit_application(&self, application: &Application) -> anyhow::Result<()>;
    async fn find_application(
        &self,
        student_id: i32,
        scholarship_id: i32,
    ) -> anyhow::Result<Option<Application>>;
    /// Stores the status, notes and reviewer of an application that is still
    /// pending. Errors if it was reviewed in the meantime.
    async fn record_review(&self, application: &Application) -> anyhow::Result<()>;
    async fn application_stats(&self) -> anyhow::Result<ApplicationStats>;
}

/// Everything the matching service needs from the outside world.
pub trait MatchingBackend: StudentDirectory + ScholarshipDirectory + MatchStore + ApplicationTracker {}

impl<T> MatchingBackend for T where
    T: StudentDirectory + ScholarshipDirectory + MatchStore + ApplicationTracker
{
}

#[derive(Debug, Default)]
struct MemoryState {
    students: BTreeMap<i32, StudentProfile>,
    scholarships: BTreeMap<i32, ScholarshipCriteria>,
    matches: Vec<Match>,
    applications: Vec<Application>,
}

/// Process-local backend used for tests and embedding without Postgres.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new(students: Vec<StudentProfile>, scholarships: Vec<ScholarshipCriteria>) -> Self {
        let state = MemoryState {
            students: students.into_iter().map(|s| (s.id, s)).collect(),
            scholarships: scholarships.into_iter().map(|s| (s.id, s)).collect(),
            ..MemoryState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn upsert_student(&self, student: StudentProfile) -> anyhow::Result<()> {
        self.lock()?.students.insert(student.id, student);
        Ok(())
    }

    pub fn upsert_scholarship(&self, scholarship: ScholarshipCriteria) -> anyhow::Result<()> {
        self.lock()?.scholarships.insert(scholarship.id, scholarship);
        Ok(())
    }

    pub fn all_matches(&self) -> anyhow::Result<Vec<Match>> {
        Ok(self.lock()?.matches.clone())
    }

    pub fn applications(&self) -> anyhow::Result<Vec<Application>> {
        Ok(self.lock()?.applications.clone())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

fn sort_by_score_desc(matches: &mut [Match]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.scholarship_id.cmp(&b.scholarship_id))
    });
}

#[async_trait]
impl StudentDirectory for InMemoryStore {
    async fn get_student(&self, id: i32) -> anyhow::Result<Option<StudentProfile>> {
        Ok(self.lock()?.students.get(&id).cloned())
    }

    async fn list_all_students(&self) -> anyhow::Result<Vec<StudentProfile>> {
        Ok(self.lock()?.students.values().cloned().collect())
    }
}

#[async_trait]
impl ScholarshipDirectory for InMemoryStore {
    async fn get_scholarship(&self, id: i32) -> anyhow::Result<Option<ScholarshipCriteria>> {
        Ok(self.lock()?.scholarships.get(&id).cloned())
    }

    async fn list_all_scholarships(&self) -> anyhow::Result<Vec<ScholarshipCriteria>> {
        Ok(self.lock()?.scholarships.values().cloned().collect())
    }
}

#[async_trait]
impl MatchStore for InMemoryStore {
    async fn delete_matches_for_student(&self, student_id: i32) -> anyhow::Result<()> {
        self.lock()?.matches.retain(|m| m.student_id != student_id);
        Ok(())
    }

    async fn save_match(&self, record: &Match) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        state.matches.retain(|m| {
            !(m.student_id == record.student_id && m.scholarship_id == record.scholarship_id)
        });
        let mut stored = record.clone();
        stored.has_application = false;
        state.matches.push(stored);
        Ok(())
    }

    async fn find_matches_for_student(&self, student_id: i32) -> anyhow::Result<Vec<Match>> {
        let mut matches: Vec<Match> = self
            .lock()?
            .matches
            .iter()
            .filter(|m| m.student_id == student_id)
            .cloned()
            .collect();
        sort_by_score_desc(&mut matches);
        Ok(matches)
    }

    async fn find_matches_above_score(&self, min_score: f64) -> anyhow::Result<Vec<Match>> {
        Ok(self
            .lock()?
            .matches
            .iter()
            .filter(|m| m.score >= min_score)
            .cloned()
            .collect())
    }

    async fn find_match(
        &self,
        student_id: i32,
        scholarship_id: i32,
    ) -> anyhow::Result<Option<Match>> {
        Ok(self
            .lock()?
            .matches
            .iter()
            .find(|m| m.student_id == student_id && m.scholarship_id == scholarship_id)
            .cloned())
    }

    async fn replace_matches_for_student(
        &self,
        student_id: i32,
        matches: &[Match],
    ) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        state.matches.retain(|m| m.student_id != student_id);
        state.matches.extend(matches.iter().cloned().map(|mut m| {
            m.has_application = false;
            m
        }));
        Ok(())
    }

    async fn replace_all_matches(&self, batches: &[(i32, Vec<Match>)]) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        for (student_id, matches) in batches {
            state.matches.retain(|m| m.student_id != *student_id);
            state.matches.extend(matches.iter().cloned().map(|mut m| {
                m.has_application = false;
                m
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl ApplicationTracker for InMemoryStore {
    async fn has_application(&self, student_id: i32, scholarship_id: i32) -> anyhow::Result<bool> {
        Ok(self
            .lock()?
            .applications
            .iter()
            .any(|a| a.student_id == student_id && a.scholarship_id == scholarship_id))
    }

    async fn submit_application(&self, application: &Application) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        let duplicate = state.applications.iter().any(|a| {
            a.student_id == application.student_id && a.scholarship_id == application.scholarship_id
        });
        if duplicate {
            anyhow::bail!(
                "student {} already applied to scholarship {}",
                application.student_id,
                application.scholarship_id
            );
        }

        state.applications.push(application.clone());
        if let Some(scholarship) = state.scholarships.get_mut(&application.scholarship_id) {
            if scholarship.available_slots > 0 {
                scholarship.available_slots -= 1;
            }
        }
        Ok(())
    }

    async fn find_application(
        &self,
        student_id: i32,
        scholarship_id: i32,
    ) -> anyhow::Result<Option<Application>> {
        Ok(self
            .lock()?
            .applications
            .iter()
            .find(|a| a.student_id == student_id && a.scholarship_id == scholarship_id)
            .cloned())
    }

    async fn record_review(&self, application: &Application) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        let stored = state
            .applications
            .iter_mut()
            .find(|a| a.id == application.id && a.status == ApplicationStatus::Pending)
            .ok_or_else(|| anyhow!("application {} is not pending", application.id))?;

        stored.status = application.status;
        stored.notes = application.notes.clone();
        stored.reviewer = application.reviewer.clone();
        stored.reviewed_at = application.reviewed_at;
        Ok(())
    }

    async fn application_stats(&self) -> anyhow::Result<ApplicationStats> {
        let state = self.lock()?;
        let mut stats = ApplicationStats::default();
        for application in &state.applications {
            match application.status {
                ApplicationStatus::Pending => stats.pending += 1,
                ApplicationStatus::Approved => stats.approved += 1,
                ApplicationStatus::Rejected => stats.rejected += 1,
            }
            stats.total += 1;
        }
        Ok(stats)
    }
}
