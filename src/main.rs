use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scholarship_matcher::db::{self, PgStore};
use scholarship_matcher::eligibility::ineligibility_reason;
use scholarship_matcher::models::{ApplicationOutcome, ReviewDecision, ReviewOutcome};
use scholarship_matcher::report;
use scholarship_matcher::scoring::score_breakdown;
use scholarship_matcher::store::{ScholarshipDirectory, StudentDirectory};
use scholarship_matcher::{MatchService, MatchingConfig};

#[derive(Parser)]
#[command(name = "scholarship-matcher")]
#[command(about = "Scholarship matching and compatible student grouping", long_about = None)]
struct Cli {
    /// TOML file overriding the default scoring and grouping constants
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import or update students from a CSV file
    ImportStudents {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import or update scholarships from a CSV file
    ImportScholarships {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show the top scholarship matches for a student
    Matches {
        #[arg(long)]
        student: i32,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Recompute stored matches for one student or for everyone
    Regenerate {
        #[arg(long)]
        student: Option<i32>,
    },
    /// Find groups of students eligible for the same scholarships
    Groups {
        #[arg(long)]
        min_score: Option<f64>,
        #[arg(long)]
        min_common: Option<usize>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Apply a student to a scholarship
    Apply {
        #[arg(long)]
        student: i32,
        #[arg(long)]
        scholarship: i32,
    },
    /// Approve or reject a pending application
    Review {
        #[arg(long)]
        student: i32,
        #[arg(long)]
        scholarship: i32,
        #[arg(long, value_enum)]
        decision: Decision,
        #[arg(long)]
        reviewer: String,
        /// Required when rejecting
        #[arg(long)]
        notes: Option<String>,
    },
    /// Count applications by review status
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Explain the score of one student/scholarship pair
    Score {
        #[arg(long)]
        student: i32,
        #[arg(long)]
        scholarship: i32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Decision {
    Approve,
    Reject,
}

impl From<Decision> for ReviewDecision {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approve => ReviewDecision::Approve,
            Decision::Reject => ReviewDecision::Reject,
        }
    }
}

fn init_logger(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("scholarship_matcher=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("scholarship_matcher=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let config = match &cli.config {
        Some(path) => MatchingConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => MatchingConfig::default(),
    };

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let service = MatchService::new(PgStore::new(pool.clone()), config);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportStudents { csv } => {
            let imported = db::import_students_csv(&pool, &csv).await?;
            println!("Imported {imported} students from {}.", csv.display());
        }
        Commands::ImportScholarships { csv } => {
            let imported = db::import_scholarships_csv(&pool, &csv).await?;
            println!("Imported {imported} scholarships from {}.", csv.display());
        }
        Commands::Matches {
            student,
            limit,
            json,
        } => {
            let Some(profile) = service.backend().get_student(student).await? else {
                println!("Student {student} not found.");
                return Ok(());
            };
            let limit = limit.unwrap_or(service.config().default_top_matches);
            let matches = service.get_top_matches_for_student(student, limit).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&matches)?);
            } else {
                let scholarships: BTreeMap<_, _> = service
                    .backend()
                    .list_all_scholarships()
                    .await?
                    .into_iter()
                    .map(|s| (s.id, s))
                    .collect();
                print!("{}", report::build_match_report(&profile, &matches, &scholarships));
            }
        }
        Commands::Regenerate { student } => match student {
            Some(student_id) => {
                let matches = service.regenerate_matches_for_student(student_id).await?;
                println!(
                    "Stored {} matches for student {student_id}.",
                    matches.len()
                );
            }
            None => {
                let summary = service.regenerate_all_matches().await?;
                println!(
                    "Stored {} matches across {} students.",
                    summary.matches, summary.students
                );
            }
        },
        Commands::Groups {
            min_score,
            min_common,
            out,
            json,
        } => {
            let min_score = min_score.unwrap_or(service.config().default_group_min_score);
            let min_common = min_common.unwrap_or(service.config().default_group_min_common);
            let groups = service
                .find_compatible_student_groups(min_score, min_common)
                .await?;

            let rendered = if json {
                serde_json::to_string_pretty(&groups)?
            } else {
                report::build_group_report(min_score, min_common, &groups)
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }
        }
        Commands::Apply {
            student,
            scholarship,
        } => {
            let message = match service.apply_for_scholarship(student, scholarship).await? {
                ApplicationOutcome::Submitted { scholarship_name } => {
                    format!("Applied to the {scholarship_name} scholarship.")
                }
                ApplicationOutcome::StudentNotFound => "Student not found.".to_string(),
                ApplicationOutcome::ScholarshipNotFound => "Scholarship not found.".to_string(),
                ApplicationOutcome::ScholarshipClosed => {
                    "Scholarship is no longer available.".to_string()
                }
                ApplicationOutcome::AlreadyApplied => {
                    "Student has already applied for this scholarship.".to_string()
                }
                ApplicationOutcome::GpaBelowMinimum => {
                    "Student does not meet the minimum GPA requirement.".to_string()
                }
                ApplicationOutcome::YearBelowMinimum => {
                    "Student does not meet the minimum year of study requirement.".to_string()
                }
            };
            println!("{message}");
        }
        Commands::Review {
            student,
            scholarship,
            decision,
            reviewer,
            notes,
        } => {
            let outcome = service
                .review_application(
                    student,
                    scholarship,
                    decision.into(),
                    &reviewer,
                    notes.as_deref(),
                )
                .await?;
            let message = match outcome {
                ReviewOutcome::Reviewed { status } => format!("Application is now {status}."),
                ReviewOutcome::ApplicationNotFound => "Application not found.".to_string(),
                ReviewOutcome::NotPending { status } => {
                    format!("Only pending applications can be reviewed; this one is {status}.")
                }
                ReviewOutcome::NotesRequired => "A rejection reason is required.".to_string(),
            };
            println!("{message}");
        }
        Commands::Stats { json } => {
            let stats = service.application_stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "{} applications: {} pending, {} approved ({:.1}%), {} rejected ({:.1}%)",
                    stats.total,
                    stats.pending,
                    stats.approved,
                    stats.approved_percentage(),
                    stats.rejected,
                    stats.rejected_percentage()
                );
            }
        }
        Commands::Score {
            student,
            scholarship,
        } => {
            let Some(profile) = service.backend().get_student(student).await? else {
                println!("Student {student} not found.");
                return Ok(());
            };
            let Some(criteria) = service.backend().get_scholarship(scholarship).await? else {
                println!("Scholarship {scholarship} not found.");
                return Ok(());
            };

            if let Some(reason) = ineligibility_reason(&profile, &criteria) {
                println!("Not eligible: {reason}.");
                return Ok(());
            }

            let breakdown = score_breakdown(&profile, &criteria, service.config());
            println!(
                "academic {} x {:.2}, financial {} x {:.2}, extracurricular {} x {:.2}",
                breakdown.academic,
                breakdown.academic_weight,
                breakdown.financial,
                breakdown.financial_weight,
                breakdown.extracurricular,
                breakdown.extracurricular_weight
            );
            let verdict = if breakdown.total >= service.config().match_score_floor {
                "match"
            } else {
                "below match floor"
            };
            println!("score {:.2} ({verdict})", breakdown.total);
        }
    }

    Ok(())
}
