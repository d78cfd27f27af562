use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::models::{
    Application, ApplicationStats, Match, ScholarshipCriteria, ScholarshipStatus, StudentProfile,
};
use crate::store::{ApplicationTracker, MatchStore, ScholarshipDirectory, StudentDirectory};

const STUDENT_COLUMNS: &str = "id, first_name, last_name, enrollment_number, \
     gpa::float8 AS gpa, financial_need_score::float8 AS financial_need_score, \
     community_service_hours, leadership_score::float8 AS leadership_score, \
     year_of_study, department_id";

const SCHOLARSHIP_COLUMNS: &str = "id, name, amount::float8 AS amount, status, \
     min_gpa::float8 AS min_gpa, min_year_required, \
     academic_weight::float8 AS academic_weight, \
     financial_need_weight::float8 AS financial_need_weight, \
     extracurricular_weight::float8 AS extracurricular_weight, \
     available_slots, deadline, department_id";

const MATCH_COLUMNS: &str =
    "id, student_id, scholarship_id, match_score::float8 AS match_score, created_at";

const APPLICATION_COLUMNS: &str = "id, student_id, scholarship_id, status, \
     match_score::float8 AS match_score, applied_at, notes, reviewer, reviewed_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed implementation of every collaborator the matcher needs.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn student_from_row(row: &PgRow) -> anyhow::Result<StudentProfile> {
    Ok(StudentProfile {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        enrollment_number: row.try_get("enrollment_number")?,
        gpa: row.try_get("gpa")?,
        financial_need_score: row.try_get("financial_need_score")?,
        community_service_hours: row.try_get("community_service_hours")?,
        leadership_score: row.try_get("leadership_score")?,
        year_of_study: row.try_get("year_of_study")?,
        department_id: row.try_get("department_id")?,
    })
}

fn scholarship_from_row(row: &PgRow) -> anyhow::Result<ScholarshipCriteria> {
    let status: String = row.try_get("status")?;
    Ok(ScholarshipCriteria {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        amount: row.try_get("amount")?,
        status: status.parse()?,
        min_gpa: row.try_get("min_gpa")?,
        min_year_required: row.try_get("min_year_required")?,
        academic_weight: row.try_get("academic_weight")?,
        financial_need_weight: row.try_get("financial_need_weight")?,
        extracurricular_weight: row.try_get("extracurricular_weight")?,
        available_slots: row.try_get("available_slots")?,
        deadline: row.try_get("deadline")?,
        department_id: row.try_get("department_id")?,
    })
}

fn match_from_row(row: &PgRow) -> anyhow::Result<Match> {
    Ok(Match {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        scholarship_id: row.try_get("scholarship_id")?,
        score: row.try_get("match_score")?,
        created_at: row.try_get("created_at")?,
        has_application: false,
    })
}

fn application_from_row(row: &PgRow) -> anyhow::Result<Application> {
    let status: String = row.try_get("status")?;
    Ok(Application {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        scholarship_id: row.try_get("scholarship_id")?,
        status: status.parse()?,
        match_score: row.try_get("match_score")?,
        applied_at: row.try_get("applied_at")?,
        notes: row.try_get("notes")?,
        reviewer: row.try_get("reviewer")?,
        reviewed_at: row.try_get("reviewed_at")?,
    })
}

async fn insert_matches(
    tx: &mut Transaction<'_, Postgres>,
    matches: &[Match],
) -> anyhow::Result<()> {
    for record in matches {
        sqlx::query(
            r#"
            INSERT INTO scholarship_matching.scholarship_matches
            (id, student_id, scholarship_id, match_score, created_at)
            VALUES ($1, $2, $3, $4::float8, $5)
            "#,
        )
        .bind(record.id)
        .bind(record.student_id)
        .bind(record.scholarship_id)
        .bind(record.score)
        .bind(record.created_at)
        .execute(&mut **tx)
        .await
        .with_context(|| {
            format!(
                "failed to insert match for student {} and scholarship {}",
                record.student_id, record.scholarship_id
            )
        })?;
    }
    Ok(())
}

async fn delete_student_matches(
    tx: &mut Transaction<'_, Postgres>,
    student_id: i32,
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM scholarship_matching.scholarship_matches WHERE student_id = $1")
        .bind(student_id)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("failed to delete matches for student {student_id}"))?;
    Ok(())
}

#[async_trait]
impl StudentDirectory for PgStore {
    async fn get_student(&self, id: i32) -> anyhow::Result<Option<StudentProfile>> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM scholarship_matching.students WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(student_from_row).transpose()
    }

    async fn list_all_students(&self) -> anyhow::Result<Vec<StudentProfile>> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM scholarship_matching.students ORDER BY id");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(student_from_row).collect()
    }

    async fn get_students(&self, ids: &[i32]) -> anyhow::Result<Vec<StudentProfile>> {
        let query = format!(
            "SELECT {STUDENT_COLUMNS} FROM scholarship_matching.students \
             WHERE id = ANY($1) ORDER BY id"
        );
        let rows = sqlx::query(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(student_from_row).collect()
    }
}

#[async_trait]
impl ScholarshipDirectory for PgStore {
    async fn get_scholarship(&self, id: i32) -> anyhow::Result<Option<ScholarshipCriteria>> {
        let query =
            format!("SELECT {SCHOLARSHIP_COLUMNS} FROM scholarship_matching.scholarships WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(scholarship_from_row).transpose()
    }

    async fn list_all_scholarships(&self) -> anyhow::Result<Vec<ScholarshipCriteria>> {
        let query =
            format!("SELECT {SCHOLARSHIP_COLUMNS} FROM scholarship_matching.scholarships ORDER BY id");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(scholarship_from_row).collect()
    }
}

#[async_trait]
impl MatchStore for PgStore {
    async fn delete_matches_for_student(&self, student_id: i32) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_student_matches(&mut tx, student_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_match(&self, record: &Match) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scholarship_matching.scholarship_matches
            (id, student_id, scholarship_id, match_score, created_at)
            VALUES ($1, $2, $3, $4::float8, $5)
            ON CONFLICT (student_id, scholarship_id) DO UPDATE
            SET match_score = EXCLUDED.match_score, created_at = EXCLUDED.created_at
            "#,
        )
        .bind(record.id)
        .bind(record.student_id)
        .bind(record.scholarship_id)
        .bind(record.score)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_matches_for_student(&self, student_id: i32) -> anyhow::Result<Vec<Match>> {
        let query = format!(
            "SELECT {MATCH_COLUMNS} FROM scholarship_matching.scholarship_matches \
             WHERE student_id = $1 ORDER BY match_score DESC, scholarship_id"
        );
        let rows = sqlx::query(&query)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn find_matches_above_score(&self, min_score: f64) -> anyhow::Result<Vec<Match>> {
        let query = format!(
            "SELECT {MATCH_COLUMNS} FROM scholarship_matching.scholarship_matches \
             WHERE match_score >= $1::float8"
        );
        let rows = sqlx::query(&query)
            .bind(min_score)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn find_match(
        &self,
        student_id: i32,
        scholarship_id: i32,
    ) -> anyhow::Result<Option<Match>> {
        let query = format!(
            "SELECT {MATCH_COLUMNS} FROM scholarship_matching.scholarship_matches \
             WHERE student_id = $1 AND scholarship_id = $2"
        );
        let row = sqlx::query(&query)
            .bind(student_id)
            .bind(scholarship_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    async fn replace_matches_for_student(
        &self,
        student_id: i32,
        matches: &[Match],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_student_matches(&mut tx, student_id).await?;
        insert_matches(&mut tx, matches).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_all_matches(&self, batches: &[(i32, Vec<Match>)]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for (student_id, matches) in batches {
            delete_student_matches(&mut tx, *student_id).await?;
            insert_matches(&mut tx, matches).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ApplicationTracker for PgStore {
    async fn has_application(&self, student_id: i32, scholarship_id: i32) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM scholarship_matching.applications
                WHERE student_id = $1 AND scholarship_id = $2
            ) AS present
            "#,
        )
        .bind(student_id)
        .bind(scholarship_id)
        .fetch_one(&self.pool)
        .await?
        .try_get("present")?;
        Ok(exists)
    }

    async fn submit_application(&self, application: &Application) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO scholarship_matching.applications
            (id, student_id, scholarship_id, status, match_score, applied_at)
            VALUES ($1, $2, $3, $4, $5::float8, $6)
            ON CONFLICT (student_id, scholarship_id) DO NOTHING
            "#,
        )
        .bind(application.id)
        .bind(application.student_id)
        .bind(application.scholarship_id)
        .bind(application.status.as_str())
        .bind(application.match_score)
        .bind(application.applied_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!(
                "student {} already applied to scholarship {}",
                application.student_id,
                application.scholarship_id
            );
        }

        sqlx::query(
            r#"
            UPDATE scholarship_matching.scholarships
            SET available_slots = available_slots - 1
            WHERE id = $1 AND available_slots > 0
            "#,
        )
        .bind(application.scholarship_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_application(
        &self,
        student_id: i32,
        scholarship_id: i32,
    ) -> anyhow::Result<Option<Application>> {
        let query = format!(
            "SELECT {APPLICATION_COLUMNS} FROM scholarship_matching.applications \
             WHERE student_id = $1 AND scholarship_id = $2"
        );
        let row = sqlx::query(&query)
            .bind(student_id)
            .bind(scholarship_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(application_from_row).transpose()
    }

    async fn record_review(&self, application: &Application) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scholarship_matching.applications
            SET status = $2, notes = $3, reviewer = $4, reviewed_at = $5
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(application.id)
        .bind(application.status.as_str())
        .bind(&application.notes)
        .bind(&application.reviewer)
        .bind(application.reviewed_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to review application {}", application.id))?;

        if result.rows_affected() == 0 {
            anyhow::bail!("application {} is not pending", application.id);
        }
        Ok(())
    }

    async fn application_stats(&self) -> anyhow::Result<ApplicationStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'PENDING') AS pending,
                COUNT(*) FILTER (WHERE status = 'APPROVED') AS approved,
                COUNT(*) FILTER (WHERE status = 'REJECTED') AS rejected,
                COUNT(*) AS total
            FROM scholarship_matching.applications
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> anyhow::Result<u64> {
            let value: i64 = row.try_get(column)?;
            Ok(u64::try_from(value)?)
        };
        Ok(ApplicationStats {
            pending: count("pending")?,
            approved: count("approved")?,
            rejected: count("rejected")?,
            total: count("total")?,
        })
    }
}

async fn upsert_department(pool: &PgPool, name: &str) -> anyhow::Result<i32> {
    let id: i32 = sqlx::query(
        r#"
        INSERT INTO scholarship_matching.departments (name)
        VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(id)
}

#[derive(Debug, serde::Deserialize)]
struct StudentCsvRow {
    first_name: String,
    last_name: String,
    enrollment_number: String,
    gpa: Option<f64>,
    financial_need_score: Option<f64>,
    community_service_hours: Option<i32>,
    leadership_score: Option<f64>,
    year_of_study: Option<i32>,
    department: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ScholarshipCsvRow {
    name: String,
    amount: f64,
    status: String,
    min_gpa: Option<f64>,
    min_year_required: Option<i32>,
    academic_weight: Option<f64>,
    financial_need_weight: Option<f64>,
    extracurricular_weight: Option<f64>,
    available_slots: i32,
    deadline: Option<NaiveDate>,
    department: Option<String>,
}

async fn upsert_student(pool: &PgPool, row: &StudentCsvRow) -> anyhow::Result<()> {
    let department_id = match row.department.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(name) => Some(upsert_department(pool, name.trim()).await?),
        None => None,
    };

    sqlx::query(
        r#"
        INSERT INTO scholarship_matching.students
        (first_name, last_name, enrollment_number, gpa, financial_need_score,
         community_service_hours, leadership_score, year_of_study, department_id)
        VALUES ($1, $2, $3, $4::float8, $5::float8, $6, $7::float8, $8, $9)
        ON CONFLICT (enrollment_number) DO UPDATE
        SET first_name = EXCLUDED.first_name,
            last_name = EXCLUDED.last_name,
            gpa = EXCLUDED.gpa,
            financial_need_score = EXCLUDED.financial_need_score,
            community_service_hours = EXCLUDED.community_service_hours,
            leadership_score = EXCLUDED.leadership_score,
            year_of_study = EXCLUDED.year_of_study,
            department_id = EXCLUDED.department_id
        "#,
    )
    .bind(&row.first_name)
    .bind(&row.last_name)
    .bind(&row.enrollment_number)
    .bind(row.gpa)
    .bind(row.financial_need_score)
    .bind(row.community_service_hours)
    .bind(row.leadership_score)
    .bind(row.year_of_study)
    .bind(department_id)
    .execute(pool)
    .await
    .with_context(|| format!("failed to upsert student {}", row.enrollment_number))?;
    Ok(())
}

async fn upsert_scholarship(pool: &PgPool, row: &ScholarshipCsvRow) -> anyhow::Result<()> {
    let status: ScholarshipStatus = row.status.parse()?;
    let department_id = match row.department.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(name) => Some(upsert_department(pool, name.trim()).await?),
        None => None,
    };

    sqlx::query(
        r#"
        INSERT INTO scholarship_matching.scholarships
        (name, amount, status, min_gpa, min_year_required, academic_weight,
         financial_need_weight, extracurricular_weight, available_slots, deadline, department_id)
        VALUES ($1, $2::float8, $3, $4::float8, $5, $6::float8, $7::float8, $8::float8, $9, $10, $11)
        ON CONFLICT (name) DO UPDATE
        SET amount = EXCLUDED.amount,
            status = EXCLUDED.status,
            min_gpa = EXCLUDED.min_gpa,
            min_year_required = EXCLUDED.min_year_required,
            academic_weight = EXCLUDED.academic_weight,
            financial_need_weight = EXCLUDED.financial_need_weight,
            extracurricular_weight = EXCLUDED.extracurricular_weight,
            available_slots = EXCLUDED.available_slots,
            deadline = EXCLUDED.deadline,
            department_id = EXCLUDED.department_id
        "#,
    )
    .bind(&row.name)
    .bind(row.amount)
    .bind(status.as_str())
    .bind(row.min_gpa)
    .bind(row.min_year_required)
    .bind(row.academic_weight)
    .bind(row.financial_need_weight)
    .bind(row.extracurricular_weight)
    .bind(row.available_slots)
    .bind(row.deadline)
    .bind(department_id)
    .execute(pool)
    .await
    .with_context(|| format!("failed to upsert scholarship {}", row.name))?;
    Ok(())
}

pub async fn import_students_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<StudentCsvRow>() {
        let row = result?;
        upsert_student(pool, &row).await?;
        imported += 1;
    }

    Ok(imported)
}

pub async fn import_scholarships_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<ScholarshipCsvRow>() {
        let row = result?;
        upsert_scholarship(pool, &row).await?;
        imported += 1;
    }

    Ok(imported)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("Avery", "Lee", "GS-2026-001", 9.40, 8.5, 120, 4.0, 3, "Computer Science"),
        ("Jules", "Moreno", "GS-2025-014", 8.75, 6.0, 60, 3.5, 4, "Computer Science"),
        ("Kiara", "Patel", "GS-2026-022", 9.10, 9.0, 90, 4.5, 2, "Biology"),
        ("Noah", "Okafor", "GS-2027-003", 7.20, 2.5, 10, 1.0, 1, "Biology"),
        ("Maya", "Lindqvist", "GS-2025-031", 8.90, 7.0, 150, 5.0, 4, "Economics"),
    ];

    for (first, last, enrollment, gpa, need, hours, leadership, year, department) in students {
        upsert_student(
            pool,
            &StudentCsvRow {
                first_name: first.to_string(),
                last_name: last.to_string(),
                enrollment_number: enrollment.to_string(),
                gpa: Some(gpa),
                financial_need_score: Some(need),
                community_service_hours: Some(hours),
                leadership_score: Some(leadership),
                year_of_study: Some(year),
                department: Some(department.to_string()),
            },
        )
        .await?;
    }

    let scholarships = vec![
        ("STEM Excellence Award", 5000.0, "ACTIVE", 8.0, 2, Some((0.6, 0.2, 0.2)), 3),
        ("Community Leaders Grant", 2500.0, "ACTIVE", 7.0, 1, Some((0.3, 0.2, 0.5)), 5),
        ("First Generation Fund", 3000.0, "ACTIVE", 7.5, 1, Some((0.3, 0.5, 0.2)), 4),
        ("General Merit Scholarship", 1500.0, "ACTIVE", 8.5, 1, None, 10),
        ("Legacy Research Fellowship", 8000.0, "CLOSED", 9.0, 3, Some((0.8, 0.1, 0.1)), 1),
    ];

    let deadline = NaiveDate::from_ymd_opt(2026, 12, 1).context("invalid date")?;
    for (name, amount, status, min_gpa, min_year, weights, slots) in scholarships {
        upsert_scholarship(
            pool,
            &ScholarshipCsvRow {
                name: name.to_string(),
                amount,
                status: status.to_string(),
                min_gpa: Some(min_gpa),
                min_year_required: Some(min_year),
                academic_weight: weights.map(|w| w.0),
                financial_need_weight: weights.map(|w| w.1),
                extracurricular_weight: weights.map(|w| w.2),
                available_slots: slots,
                deadline: Some(deadline),
                department: None,
            },
        )
        .await?;
    }

    Ok(())
}
