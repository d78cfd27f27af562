use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub enrollment_number: String,
    pub gpa: Option<f64>,
    pub financial_need_score: Option<f64>,
    pub community_service_hours: Option<i32>,
    pub leadership_score: Option<f64>,
    pub year_of_study: Option<i32>,
    pub department_id: Option<i32>,
}

impl StudentProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScholarshipStatus {
    Active,
    Closed,
}

impl ScholarshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScholarshipStatus::Active => "ACTIVE",
            ScholarshipStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ScholarshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScholarshipStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(ScholarshipStatus::Active),
            "CLOSED" => Ok(ScholarshipStatus::Closed),
            other => anyhow::bail!("unknown scholarship status: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScholarshipCriteria {
    pub id: i32,
    pub name: String,
    pub amount: f64,
    pub status: ScholarshipStatus,
    pub min_gpa: Option<f64>,
    pub min_year_required: Option<i32>,
    pub academic_weight: Option<f64>,
    pub financial_need_weight: Option<f64>,
    pub extracurricular_weight: Option<f64>,
    pub available_slots: i32,
    pub deadline: Option<NaiveDate>,
    pub department_id: Option<i32>,
}

/// A scored (student, scholarship) pairing. `has_application` is filled in
/// at read time and is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub student_id: i32,
    pub scholarship_id: i32,
    pub score: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub has_application: bool,
}

impl Match {
    pub fn new(student_id: i32, scholarship_id: i32, score: f64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            scholarship_id,
            score,
            created_at,
            has_application: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "PENDING",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ApplicationStatus::Pending),
            "APPROVED" => Ok(ApplicationStatus::Approved),
            "REJECTED" => Ok(ApplicationStatus::Rejected),
            other => anyhow::bail!("unknown application status: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub student_id: i32,
    pub scholarship_id: i32,
    pub status: ApplicationStatus,
    pub match_score: Option<f64>,
    pub applied_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub reviewer: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn pending(
        student_id: i32,
        scholarship_id: i32,
        match_score: Option<f64>,
        applied_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            scholarship_id,
            status: ApplicationStatus::Pending,
            match_score,
            applied_at,
            notes: None,
            reviewer: None,
            reviewed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn resulting_status(self) -> ApplicationStatus {
        match self {
            ReviewDecision::Approve => ApplicationStatus::Approved,
            ReviewDecision::Reject => ApplicationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReviewOutcome {
    Reviewed { status: ApplicationStatus },
    ApplicationNotFound,
    NotPending { status: ApplicationStatus },
    /// Rejections must carry a reason.
    NotesRequired,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplicationStats {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub total: u64,
}

impl ApplicationStats {
    pub fn approved_percentage(&self) -> f64 {
        percentage(self.approved, self.total)
    }

    pub fn rejected_percentage(&self) -> f64 {
        percentage(self.rejected, self.total)
    }
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplicationOutcome {
    Submitted { scholarship_name: String },
    StudentNotFound,
    ScholarshipNotFound,
    ScholarshipClosed,
    AlreadyApplied,
    GpaBelowMinimum,
    YearBelowMinimum,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupMember {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub gpa: Option<f64>,
    pub year_of_study: Option<i32>,
    pub department_id: Option<i32>,
}

impl From<&StudentProfile> for GroupMember {
    fn from(student: &StudentProfile) -> Self {
        Self {
            id: student.id,
            first_name: student.first_name.clone(),
            last_name: student.last_name.clone(),
            gpa: student.gpa,
            year_of_study: student.year_of_study,
            department_id: student.department_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedScholarship {
    pub scholarship_id: i32,
    pub name: String,
    pub amount: f64,
    pub min_gpa: Option<f64>,
    pub average_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentGroup {
    pub group_id: usize,
    pub member_count: usize,
    pub members: Vec<GroupMember>,
    pub common_scholarships: Vec<SharedScholarship>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RegenerationSummary {
    pub students: usize,
    pub matches: usize,
}
