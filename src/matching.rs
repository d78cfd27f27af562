use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::MatchingConfig;
use crate::eligibility::{ineligibility_reason, is_eligible, Ineligibility};
use crate::groups;
use crate::models::{
    Application, ApplicationOutcome, ApplicationStats, ApplicationStatus, Match,
    RegenerationSummary, ReviewDecision, ReviewOutcome, ScholarshipCriteria, ScholarshipStatus,
    StudentGroup, StudentProfile,
};
use crate::scoring::compute_score;
use crate::store::MatchingBackend;

/// Scores a student against every scholarship and keeps the pairs that pass
/// eligibility and reach the configured floor.
pub fn compute_matches(
    student: &StudentProfile,
    scholarships: &[ScholarshipCriteria],
    config: &MatchingConfig,
    created_at: DateTime<Utc>,
) -> Vec<Match> {
    let mut matches = Vec::new();

    for scholarship in scholarships {
        if !is_eligible(student, scholarship) {
            continue;
        }

        let score = compute_score(student, scholarship, config);
        debug!(
            student_id = student.id,
            scholarship_id = scholarship.id,
            score,
            "calculated match score"
        );

        if score >= config.match_score_floor {
            matches.push(Match::new(student.id, scholarship.id, score, created_at));
        }
    }

    matches
}

pub struct MatchService<B> {
    backend: B,
    config: MatchingConfig,
}

impl<B: MatchingBackend> MatchService<B> {
    pub fn new(backend: B, config: MatchingConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Replaces the student's stored matches with a fresh computation. Unknown
    /// students produce no matches and leave the store untouched.
    pub async fn regenerate_matches_for_student(&self, student_id: i32) -> anyhow::Result<Vec<Match>> {
        let Some(student) = self.backend.get_student(student_id).await? else {
            info!(student_id, "student not found, skipping match generation");
            return Ok(Vec::new());
        };

        let scholarships = self.backend.list_all_scholarships().await?;
        let matches = compute_matches(&student, &scholarships, &self.config, Utc::now());
        self.backend
            .replace_matches_for_student(student.id, &matches)
            .await?;

        info!(
            student_id,
            scholarships = scholarships.len(),
            matches = matches.len(),
            "regenerated matches"
        );
        Ok(matches)
    }

    pub async fn regenerate_all_matches(&self) -> anyhow::Result<RegenerationSummary> {
        let students = self.backend.list_all_students().await?;
        let scholarships = self.backend.list_all_scholarships().await?;
        let now = Utc::now();

        let batches: Vec<(i32, Vec<Match>)> = students
            .iter()
            .map(|student| {
                (
                    student.id,
                    compute_matches(student, &scholarships, &self.config, now),
                )
            })
            .collect();

        self.backend.replace_all_matches(&batches).await?;

        let summary = RegenerationSummary {
            students: batches.len(),
            matches: batches.iter().map(|(_, matches)| matches.len()).sum(),
        };
        info!(
            students = summary.students,
            matches = summary.matches,
            "regenerated matches for all students"
        );
        Ok(summary)
    }

    /// Highest scoring matches for the student, generating them on first use.
    /// Each returned match is annotated with whether an application exists.
    pub async fn get_top_matches_for_student(
        &self,
        student_id: i32,
        limit: usize,
    ) -> anyhow::Result<Vec<Match>> {
        let mut matches = self.backend.find_matches_for_student(student_id).await?;

        if matches.is_empty() {
            info!(student_id, "no matches found, generating");
            self.regenerate_matches_for_student(student_id).await?;
            matches = self.backend.find_matches_for_student(student_id).await?;
        }

        matches.truncate(limit);
        for record in matches.iter_mut() {
            record.has_application = self
                .backend
                .has_application(student_id, record.scholarship_id)
                .await?;
        }

        Ok(matches)
    }

    pub async fn find_compatible_student_groups(
        &self,
        min_match_score: f64,
        min_common_scholarships: usize,
    ) -> anyhow::Result<Vec<StudentGroup>> {
        groups::find_compatible_student_groups(
            &self.backend,
            min_match_score,
            min_common_scholarships,
        )
        .await
    }

    pub async fn apply_for_scholarship(
        &self,
        student_id: i32,
        scholarship_id: i32,
    ) -> anyhow::Result<ApplicationOutcome> {
        let Some(student) = self.backend.get_student(student_id).await? else {
            return Ok(ApplicationOutcome::StudentNotFound);
        };
        let Some(scholarship) = self.backend.get_scholarship(scholarship_id).await? else {
            return Ok(ApplicationOutcome::ScholarshipNotFound);
        };

        if scholarship.status != ScholarshipStatus::Active {
            return Ok(ApplicationOutcome::ScholarshipClosed);
        }

        if self
            .backend
            .has_application(student_id, scholarship_id)
            .await?
        {
            info!(student_id, scholarship_id, "student already applied");
            return Ok(ApplicationOutcome::AlreadyApplied);
        }

        match ineligibility_reason(&student, &scholarship) {
            Some(
                Ineligibility::MissingGpa
                | Ineligibility::MissingMinimumGpa
                | Ineligibility::GpaBelowMinimum,
            ) => return Ok(ApplicationOutcome::GpaBelowMinimum),
            Some(
                Ineligibility::MissingYearOfStudy
                | Ineligibility::MissingMinimumYear
                | Ineligibility::YearBelowMinimum,
            ) => return Ok(ApplicationOutcome::YearBelowMinimum),
            Some(Ineligibility::ScholarshipClosed) => return Ok(ApplicationOutcome::ScholarshipClosed),
            None => {}
        }

        let match_score = self
            .backend
            .find_match(student_id, scholarship_id)
            .await?
            .map(|m| m.score);

        let application = Application::pending(student_id, scholarship_id, match_score, Utc::now());
        self.backend.submit_application(&application).await?;
        info!(student_id, scholarship_id, "application submitted");

        Ok(ApplicationOutcome::Submitted {
            scholarship_name: scholarship.name,
        })
    }

    /// Approves or rejects a pending application. Rejections need non-blank
    /// notes; approvals keep notes only when some are given.
    pub async fn review_application(
        &self,
        student_id: i32,
        scholarship_id: i32,
        decision: ReviewDecision,
        reviewer: &str,
        notes: Option<&str>,
    ) -> anyhow::Result<ReviewOutcome> {
        let Some(mut application) = self
            .backend
            .find_application(student_id, scholarship_id)
            .await?
        else {
            return Ok(ReviewOutcome::ApplicationNotFound);
        };

        if application.status != ApplicationStatus::Pending {
            return Ok(ReviewOutcome::NotPending {
                status: application.status,
            });
        }

        let notes = notes.map(str::trim).filter(|n| !n.is_empty());
        if decision == ReviewDecision::Reject && notes.is_none() {
            return Ok(ReviewOutcome::NotesRequired);
        }

        let status = decision.resulting_status();
        application.status = status;
        if let Some(notes) = notes {
            application.notes = Some(notes.to_string());
        }
        application.reviewer = Some(reviewer.to_string());
        application.reviewed_at = Some(Utc::now());

        self.backend.record_review(&application).await?;
        info!(student_id, scholarship_id, %status, reviewer, "application reviewed");

        Ok(ReviewOutcome::Reviewed { status })
    }

    pub async fn application_stats(&self) -> anyhow::Result<ApplicationStats> {
        self.backend.application_stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::fixtures::{scholarship, student};
    use crate::store::{ApplicationTracker, InMemoryStore, MatchStore, ScholarshipDirectory};

    fn strong_student(id: i32) -> StudentProfile {
        let mut s = student(id, 9.5, 3);
        s.financial_need_score = Some(8.0);
        s.community_service_hours = Some(100);
        s.leadership_score = Some(5.0);
        s
    }

    fn weighted_scholarship(id: i32, min_gpa: f64, min_year: i32) -> ScholarshipCriteria {
        let mut sch = scholarship(id, min_gpa, min_year);
        sch.academic_weight = Some(0.4);
        sch.financial_need_weight = Some(0.3);
        sch.extracurricular_weight = Some(0.3);
        sch
    }

    fn service(
        students: Vec<StudentProfile>,
        scholarships: Vec<ScholarshipCriteria>,
    ) -> MatchService<InMemoryStore> {
        MatchService::new(
            InMemoryStore::new(students, scholarships),
            MatchingConfig::default(),
        )
    }

    #[test]
    fn compute_matches_applies_filter_and_floor() {
        let config = MatchingConfig::default();
        let mut closed = weighted_scholarship(3, 5.0, 1);
        closed.status = ScholarshipStatus::Closed;
        let scholarships = vec![
            weighted_scholarship(1, 7.0, 1),
            weighted_scholarship(2, 9.8, 1),
            closed,
            weighted_scholarship(4, 5.0, 4),
            scholarship(5, 7.0, 1),
        ];

        let matches = compute_matches(&strong_student(1), &scholarships, &config, Utc::now());
        let ids: Vec<i32> = matches.iter().map(|m| m.scholarship_id).collect();
        // 2 fails GPA, 3 is closed, 4 fails year. 5 uses neutral sub-scores.
        assert_eq!(ids, vec![1, 5]);
        for m in &matches {
            assert!(m.score >= 60.0);
        }
    }

    #[test]
    fn worked_example_produces_no_match() {
        let config = MatchingConfig::default();
        let matches = compute_matches(
            &student(1, 9.0, 2),
            &[scholarship(1, 7.0, 1)],
            &config,
            Utc::now(),
        );
        assert!(matches.is_empty());
    }

    #[test]
    fn raised_floor_drops_matches_that_pass_at_sixty() {
        let s = strong_student(1);
        let scholarships = vec![weighted_scholarship(1, 7.0, 1)];
        let score = compute_score(&s, &scholarships[0], &MatchingConfig::default());
        assert!(score >= 60.0);

        let at_score = MatchingConfig {
            match_score_floor: score,
            ..MatchingConfig::default()
        };
        assert_eq!(compute_matches(&s, &scholarships, &at_score, Utc::now()).len(), 1);

        let above_score = MatchingConfig {
            match_score_floor: score + 0.01,
            ..MatchingConfig::default()
        };
        assert!(compute_matches(&s, &scholarships, &above_score, Utc::now()).is_empty());
    }

    #[tokio::test]
    async fn service_uses_its_configured_floor() {
        let strict = MatchingConfig {
            match_score_floor: 99.0,
            ..MatchingConfig::default()
        };
        let svc = MatchService::new(
            InMemoryStore::new(vec![strong_student(1)], vec![weighted_scholarship(1, 7.0, 1)]),
            strict,
        );

        assert!(svc.regenerate_matches_for_student(1).await.unwrap().is_empty());
        assert_eq!(svc.config().match_score_floor, 99.0);
    }

    #[tokio::test]
    async fn closing_a_scholarship_removes_it_on_regeneration() {
        let svc = service(
            vec![strong_student(1)],
            vec![weighted_scholarship(1, 7.0, 1), weighted_scholarship(2, 6.0, 1)],
        );
        assert_eq!(svc.regenerate_matches_for_student(1).await.unwrap().len(), 2);

        let mut closed = weighted_scholarship(2, 6.0, 1);
        closed.status = ScholarshipStatus::Closed;
        svc.backend().upsert_scholarship(closed).unwrap();

        let matches = svc.regenerate_matches_for_student(1).await.unwrap();
        let ids: Vec<i32> = matches.iter().map(|m| m.scholarship_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn regeneration_replaces_previous_matches() {
        let svc = service(vec![strong_student(1)], vec![weighted_scholarship(1, 7.0, 1)]);
        let now = Utc::now();
        svc.backend()
            .save_match(&Match::new(1, 99, 95.0, now))
            .await
            .unwrap();

        let matches = svc.regenerate_matches_for_student(1).await.unwrap();
        assert_eq!(matches.len(), 1);

        let stored = svc.backend().find_matches_for_student(1).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].scholarship_id, 1);
    }

    #[tokio::test]
    async fn regeneration_is_idempotent() {
        let svc = service(
            vec![strong_student(1)],
            vec![weighted_scholarship(1, 7.0, 1), weighted_scholarship(2, 8.0, 2)],
        );

        svc.regenerate_matches_for_student(1).await.unwrap();
        let first: Vec<(i32, f64)> = svc
            .backend()
            .find_matches_for_student(1)
            .await
            .unwrap()
            .iter()
            .map(|m| (m.scholarship_id, m.score))
            .collect();

        svc.regenerate_matches_for_student(1).await.unwrap();
        let second: Vec<(i32, f64)> = svc
            .backend()
            .find_matches_for_student(1)
            .await
            .unwrap()
            .iter()
            .map(|m| (m.scholarship_id, m.score))
            .collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn unknown_student_is_a_noop() {
        let svc = service(Vec::new(), vec![weighted_scholarship(1, 7.0, 1)]);
        assert!(svc.regenerate_matches_for_student(42).await.unwrap().is_empty());
        assert!(svc.get_top_matches_for_student(42, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn match_that_drops_below_floor_disappears() {
        let svc = service(vec![strong_student(1)], vec![weighted_scholarship(1, 7.0, 1)]);
        svc.regenerate_matches_for_student(1).await.unwrap();
        assert_eq!(svc.backend().all_matches().unwrap().len(), 1);

        let mut weaker = strong_student(1);
        weaker.gpa = Some(7.1);
        weaker.financial_need_score = None;
        weaker.community_service_hours = None;
        weaker.leadership_score = None;
        svc.backend().upsert_student(weaker).unwrap();

        svc.regenerate_matches_for_student(1).await.unwrap();
        assert!(svc.backend().all_matches().unwrap().is_empty());
    }

    #[tokio::test]
    async fn top_matches_generate_lazily_and_respect_limit() {
        let scholarships = (1..=4).map(|id| weighted_scholarship(id, 6.0 + f64::from(id) * 0.5, 1)).collect();
        let svc = service(vec![strong_student(1)], scholarships);

        let top = svc.get_top_matches_for_student(1, 2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert!(top[0].score >= top[1].score);

        let stored = svc.backend().find_matches_for_student(1).await.unwrap();
        assert_eq!(stored.len(), 4);

        let all = svc.get_top_matches_for_student(1, 10).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn top_matches_flag_existing_applications() {
        let svc = service(
            vec![strong_student(1)],
            vec![weighted_scholarship(1, 7.0, 1), weighted_scholarship(2, 6.0, 1)],
        );

        let outcome = svc.apply_for_scholarship(1, 2).await.unwrap();
        assert!(matches!(outcome, ApplicationOutcome::Submitted { .. }));

        let top = svc.get_top_matches_for_student(1, 5).await.unwrap();
        for m in &top {
            assert_eq!(m.has_application, m.scholarship_id == 2);
        }

        let stored = svc.backend().find_matches_for_student(1).await.unwrap();
        assert!(stored.iter().all(|m| !m.has_application));
    }

    #[tokio::test]
    async fn regenerate_all_covers_every_student() {
        let svc = service(
            vec![strong_student(1), strong_student(2), student(3, 5.0, 1)],
            vec![weighted_scholarship(1, 7.0, 1), weighted_scholarship(2, 8.0, 1)],
        );

        let summary = svc.regenerate_all_matches().await.unwrap();
        assert_eq!(summary.students, 3);
        assert_eq!(summary.matches, 4);
        assert!(svc.backend().find_matches_for_student(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn application_flow_checks_each_gate() {
        let mut closed = weighted_scholarship(3, 5.0, 1);
        closed.status = ScholarshipStatus::Closed;
        let mut one_slot = weighted_scholarship(1, 7.0, 1);
        one_slot.available_slots = 1;
        let svc = service(
            vec![strong_student(1), student(2, 6.0, 1)],
            vec![one_slot, weighted_scholarship(2, 5.0, 4), closed],
        );

        assert_eq!(svc.apply_for_scholarship(9, 1).await.unwrap(), ApplicationOutcome::StudentNotFound);
        assert_eq!(svc.apply_for_scholarship(1, 9).await.unwrap(), ApplicationOutcome::ScholarshipNotFound);
        assert_eq!(svc.apply_for_scholarship(1, 3).await.unwrap(), ApplicationOutcome::ScholarshipClosed);
        assert_eq!(svc.apply_for_scholarship(2, 1).await.unwrap(), ApplicationOutcome::GpaBelowMinimum);
        assert_eq!(svc.apply_for_scholarship(1, 2).await.unwrap(), ApplicationOutcome::YearBelowMinimum);

        svc.regenerate_matches_for_student(1).await.unwrap();
        let outcome = svc.apply_for_scholarship(1, 1).await.unwrap();
        assert_eq!(
            outcome,
            ApplicationOutcome::Submitted {
                scholarship_name: "Scholarship 1".to_string()
            }
        );
        assert_eq!(svc.apply_for_scholarship(1, 1).await.unwrap(), ApplicationOutcome::AlreadyApplied);

        let applications = svc.backend().applications().unwrap();
        assert_eq!(applications.len(), 1);
        assert!(applications[0].match_score.is_some());
        let scholarship = svc.backend().get_scholarship(1).await.unwrap().unwrap();
        assert_eq!(scholarship.available_slots, 0);
    }

    #[tokio::test]
    async fn review_only_touches_pending_applications() {
        let svc = service(
            vec![strong_student(1), strong_student(2)],
            vec![weighted_scholarship(1, 7.0, 1)],
        );
        svc.apply_for_scholarship(1, 1).await.unwrap();
        svc.apply_for_scholarship(2, 1).await.unwrap();

        assert_eq!(
            svc.review_application(3, 1, ReviewDecision::Approve, "registrar", None)
                .await
                .unwrap(),
            ReviewOutcome::ApplicationNotFound
        );

        let approved = svc
            .review_application(1, 1, ReviewDecision::Approve, "registrar", Some("  "))
            .await
            .unwrap();
        assert_eq!(
            approved,
            ReviewOutcome::Reviewed {
                status: ApplicationStatus::Approved
            }
        );
        let again = svc
            .review_application(1, 1, ReviewDecision::Reject, "registrar", Some("late"))
            .await
            .unwrap();
        assert_eq!(
            again,
            ReviewOutcome::NotPending {
                status: ApplicationStatus::Approved
            }
        );

        let stored = svc.backend().find_application(1, 1).await.unwrap().unwrap();
        assert_eq!(stored.notes, None);
        assert_eq!(stored.reviewer.as_deref(), Some("registrar"));
        assert!(stored.reviewed_at.is_some());
    }

    #[tokio::test]
    async fn rejection_requires_notes() {
        let svc = service(vec![strong_student(1)], vec![weighted_scholarship(1, 7.0, 1)]);
        svc.apply_for_scholarship(1, 1).await.unwrap();

        for notes in [None, Some(""), Some("   ")] {
            assert_eq!(
                svc.review_application(1, 1, ReviewDecision::Reject, "committee", notes)
                    .await
                    .unwrap(),
                ReviewOutcome::NotesRequired
            );
        }
        let pending = svc.backend().find_application(1, 1).await.unwrap().unwrap();
        assert_eq!(pending.status, ApplicationStatus::Pending);

        let rejected = svc
            .review_application(1, 1, ReviewDecision::Reject, "committee", Some(" incomplete transcript "))
            .await
            .unwrap();
        assert_eq!(
            rejected,
            ReviewOutcome::Reviewed {
                status: ApplicationStatus::Rejected
            }
        );
        let stored = svc.backend().find_application(1, 1).await.unwrap().unwrap();
        assert_eq!(stored.notes.as_deref(), Some("incomplete transcript"));

        let stats = svc.application_stats().await.unwrap();
        assert_eq!(
            stats,
            ApplicationStats {
                pending: 0,
                approved: 0,
                rejected: 1,
                total: 1,
            }
        );
    }
}
