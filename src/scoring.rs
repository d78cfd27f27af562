use serde::Serialize;

use crate::config::MatchingConfig;
use crate::models::{ScholarshipCriteria, StudentProfile};

const NEUTRAL_SCORE: i32 = 50;
const VOLUNTEER_CAP: i32 = 50;
const LEADERSHIP_CAP: f64 = 50.0;

/// Sub-scores and the weights they were combined with for a single pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub academic: i32,
    pub financial: i32,
    pub extracurricular: i32,
    pub academic_weight: f64,
    pub financial_weight: f64,
    pub extracurricular_weight: f64,
    pub total: f64,
}

/// GPA interpolated between the scholarship minimum and the configured ceiling,
/// truncated toward zero.
pub fn academic_score(
    student: &StudentProfile,
    scholarship: &ScholarshipCriteria,
    config: &MatchingConfig,
) -> i32 {
    let Some(gpa) = student.gpa else {
        return 0;
    };
    if gpa >= config.gpa_ceiling {
        return 100;
    }

    let min_gpa = scholarship.min_gpa.unwrap_or(0.0);
    let ratio = (gpa - min_gpa) / (config.gpa_ceiling - min_gpa);
    ((ratio * 100.0) as i32).clamp(0, 100)
}

/// Step function over the 0-10 need scale. Neutral when the scholarship does
/// not weigh financial need.
pub fn financial_score(student: &StudentProfile, scholarship: &ScholarshipCriteria) -> i32 {
    if !is_weighted(scholarship.financial_need_weight) {
        return NEUTRAL_SCORE;
    }

    let Some(need) = student.financial_need_score else {
        return 0;
    };

    if need >= 8.0 {
        100
    } else if need >= 6.0 {
        80
    } else if need >= 4.0 {
        60
    } else if need >= 2.0 {
        40
    } else {
        20
    }
}

/// Volunteer hours and leadership points, each capped at 50.
pub fn extracurricular_score(student: &StudentProfile, scholarship: &ScholarshipCriteria) -> i32 {
    if !is_weighted(scholarship.extracurricular_weight) {
        return NEUTRAL_SCORE;
    }

    let hours = student.community_service_hours.unwrap_or(0).max(0);
    let leadership = student.leadership_score.unwrap_or(0.0);

    let volunteer_score = (hours / 2).min(VOLUNTEER_CAP);
    let leadership_score = (leadership * 10.0).clamp(0.0, LEADERSHIP_CAP) as i32;
    volunteer_score + leadership_score
}

pub fn score_breakdown(
    student: &StudentProfile,
    scholarship: &ScholarshipCriteria,
    config: &MatchingConfig,
) -> ScoreBreakdown {
    let academic = academic_score(student, scholarship, config);
    let financial = financial_score(student, scholarship);
    let extracurricular = extracurricular_score(student, scholarship);

    let academic_weight = scholarship
        .academic_weight
        .unwrap_or(config.default_academic_weight);
    let financial_weight = scholarship
        .financial_need_weight
        .unwrap_or(config.default_financial_weight);
    let extracurricular_weight = scholarship
        .extracurricular_weight
        .unwrap_or(config.default_extracurricular_weight);

    let weighted = f64::from(academic) * academic_weight
        + f64::from(financial) * financial_weight
        + f64::from(extracurricular) * extracurricular_weight;
    let total_weight = academic_weight + financial_weight + extracurricular_weight;

    let total = if total_weight > 0.0 {
        round_half_up(weighted / total_weight).clamp(0.0, 100.0)
    } else {
        0.0
    };

    ScoreBreakdown {
        academic,
        financial,
        extracurricular,
        academic_weight,
        financial_weight,
        extracurricular_weight,
        total,
    }
}

/// Compatibility of a student with a scholarship in [0, 100], two decimals.
pub fn compute_score(
    student: &StudentProfile,
    scholarship: &ScholarshipCriteria,
    config: &MatchingConfig,
) -> f64 {
    score_breakdown(student, scholarship, config).total
}

/// Rounds the shortest decimal form of `value` to two places, ties away from
/// zero. Working on the decimal text keeps `73.225` from rounding down to
/// `73.22` because of its binary representation.
pub fn round_half_up(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let text = value.abs().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let mut digits = fraction.chars().chain(std::iter::repeat('0'));
    let kept: String = whole.chars().chain(digits.by_ref().take(2)).collect();
    let Ok(mut hundredths) = kept.parse::<f64>() else {
        return value;
    };
    if digits.next().is_some_and(|d| d >= '5') {
        hundredths += 1.0;
    }
    (hundredths / 100.0).copysign(value)
}

fn is_weighted(weight: Option<f64>) -> bool {
    matches!(weight, Some(w) if w > 0.0)
}
