use std::collections::BTreeMap;
use std::fmt::Write;

use crate::models::{Match, ScholarshipCriteria, StudentGroup, StudentProfile};

pub fn build_match_report(
    student: &StudentProfile,
    matches: &[Match],
    scholarships: &BTreeMap<i32, ScholarshipCriteria>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Scholarship Matches");
    let _ = writeln!(
        output,
        "Generated for {} ({}), GPA {}, year {}",
        student.full_name(),
        student.enrollment_number,
        format_optional(student.gpa),
        student
            .year_of_study
            .map(|y| y.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    let _ = writeln!(output);

    if matches.is_empty() {
        let _ = writeln!(output, "No scholarships currently match this student.");
        return output;
    }

    for record in matches {
        let name = scholarships
            .get(&record.scholarship_id)
            .map(|s| s.name.as_str())
            .unwrap_or("unknown scholarship");
        let applied = if record.has_application {
            " (applied)"
        } else {
            ""
        };
        let _ = writeln!(
            output,
            "- {} [#{}] score {:.2}{}",
            name, record.scholarship_id, record.score, applied
        );
    }

    output
}

pub fn build_group_report(
    min_match_score: f64,
    min_common_scholarships: usize,
    groups: &[StudentGroup],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Compatible Student Groups");
    let _ = writeln!(
        output,
        "Students sharing at least {} scholarships scored {:.2} or higher",
        min_common_scholarships, min_match_score
    );
    let _ = writeln!(output);

    if groups.is_empty() {
        let _ = writeln!(output, "No compatible groups found.");
        return output;
    }

    for group in groups {
        let _ = writeln!(
            output,
            "## Group {} ({} students)",
            group.group_id, group.member_count
        );
        for member in &group.members {
            let _ = writeln!(
                output,
                "- {} {} (GPA {}, year {})",
                member.first_name,
                member.last_name,
                format_optional(member.gpa),
                member
                    .year_of_study
                    .map(|y| y.to_string())
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }

        let _ = writeln!(output);
        if group.common_scholarships.is_empty() {
            let _ = writeln!(output, "No scholarships shared by every member.");
        } else {
            let _ = writeln!(output, "Shared scholarships:");
            for shared in &group.common_scholarships {
                let _ = writeln!(
                    output,
                    "- {} ({:.2}) avg score {:.2}",
                    shared.name, shared.amount, shared.average_score
                );
            }
        }
        let _ = writeln!(output);
    }

    output
}

fn format_optional(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "n/a".to_string())
}
