use std::fmt;

use crate::models::{ScholarshipCriteria, ScholarshipStatus, StudentProfile};

/// The gate that rejected a student/scholarship pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    ScholarshipClosed,
    MissingGpa,
    MissingMinimumGpa,
    GpaBelowMinimum,
    MissingYearOfStudy,
    MissingMinimumYear,
    YearBelowMinimum,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Ineligibility::ScholarshipClosed => "scholarship is not active",
            Ineligibility::MissingGpa => "student has no GPA on record",
            Ineligibility::MissingMinimumGpa => "scholarship has no minimum GPA",
            Ineligibility::GpaBelowMinimum => "GPA is below the scholarship minimum",
            Ineligibility::MissingYearOfStudy => "student has no year of study on record",
            Ineligibility::MissingMinimumYear => "scholarship has no minimum year",
            Ineligibility::YearBelowMinimum => "year of study is below the scholarship minimum",
        };
        f.write_str(text)
    }
}

/// Returns the first failing gate, checked in status, GPA, year order.
pub fn ineligibility_reason(
    student: &StudentProfile,
    scholarship: &ScholarshipCriteria,
) -> Option<Ineligibility> {
    if scholarship.status != ScholarshipStatus::Active {
        return Some(Ineligibility::ScholarshipClosed);
    }

    match (student.gpa, scholarship.min_gpa) {
        (None, _) => return Some(Ineligibility::MissingGpa),
        (_, None) => return Some(Ineligibility::MissingMinimumGpa),
        (Some(gpa), Some(min_gpa)) if gpa < min_gpa => {
            return Some(Ineligibility::GpaBelowMinimum)
        }
        _ => {}
    }

    match (student.year_of_study, scholarship.min_year_required) {
        (None, _) => Some(Ineligibility::MissingYearOfStudy),
        (_, None) => Some(Ineligibility::MissingMinimumYear),
        (Some(year), Some(min_year)) if year < min_year => Some(Ineligibility::YearBelowMinimum),
        _ => None,
    }
}

pub fn is_eligible(student: &StudentProfile, scholarship: &ScholarshipCriteria) -> bool {
    ineligibility_reason(student, scholarship).is_none()
}
