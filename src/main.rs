use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod cache;
mod classify;
mod config;
mod db;
mod engine;
mod error;
mod invitations;
mod models;
mod paths;
mod recommend;
mod report;
mod roster;
mod subjects;

use crate::cache::MemoryAggregateCache;
use crate::classify::{Scheme, StatusTier};
use crate::config::Config;
use crate::db::Scope;
use crate::engine::{Analytics, RecommendationPlan};
use crate::error::LifecycleError;
use crate::invitations::{InvitationStats, InvitationStatus};
use crate::recommend::{Recommendation, RecommendationGenerator};
use crate::roster::{ClassStats, RosterQuery, SortKey};

#[derive(Parser)]
#[command(name = "classroom-insights")]
#[command(
    about = "Grade analytics, status tiers and study recommendations for classrooms",
    long_about = None
)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import graded assignments from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import school invitations from a CSV file
    ImportInvitations {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Aggregate grades for a classroom or a single student
    #[command(group(
        ArgGroup::new("scope")
            .args(["classroom", "student"])
            .required(true)
            .multiple(false)
    ))]
    Summary {
        #[arg(long)]
        classroom: Option<String>,
        #[arg(long)]
        student: Option<i64>,
        /// Recompute even when a fresh cached aggregate exists
        #[arg(long)]
        no_cache: bool,
    },
    /// List students with filtering and sorting
    Roster {
        #[arg(long)]
        classroom: String,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_enum)]
        status: Option<StatusTier>,
        #[arg(long, value_enum, default_value_t = SortKey::Name)]
        sort: SortKey,
    },
    /// Generate a markdown report for a classroom
    Report {
        #[arg(long)]
        classroom: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Show or generate study recommendations for a student
    Recommend {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        subject: String,
        /// Generate a new pair even if recommendations already exist
        #[arg(long)]
        refresh: bool,
    },
    /// Start an available recommendation
    Start {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        id: String,
    },
    /// Complete an in-progress recommendation
    Complete {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        id: String,
        #[arg(long)]
        score: Option<f64>,
    },
    /// Group a student's recommendations into learning paths
    Paths {
        #[arg(long)]
        student: i64,
    },
    /// Summarise invitations
    Invitations {
        #[arg(long, value_enum)]
        status: Option<InvitationStatus>,
    },
}

fn engine(config: &Config) -> anyhow::Result<Analytics<MemoryAggregateCache, recommend::UuidIds>> {
    Ok(Analytics::new(
        config,
        MemoryAggregateCache::new(),
        RecommendationGenerator::default(),
    )?)
}

fn print_recommendations(recommendations: &[Recommendation]) {
    for rec in recommendations {
        println!(
            "- [{}] {} ({}, {}, {} min, {} XP) {}",
            rec.status,
            rec.title,
            rec.kind.as_str(),
            rec.difficulty.as_str(),
            rec.estimated_minutes,
            rec.xp_reward,
            rec.id
        );
    }
}

async fn find_recommendation(
    pool: &sqlx::PgPool,
    student_id: i64,
    id: &str,
) -> anyhow::Result<Recommendation> {
    db::fetch_recommendations(pool, student_id, None)
        .await?
        .into_iter()
        .find(|rec| rec.id == id)
        .ok_or_else(|| {
            LifecycleError::NotFound {
                id: id.to_string(),
                student_id,
            }
            .into()
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let summary = db::import_grades_csv(&pool, &csv, &config.subject_keywords).await?;
            println!(
                "Inserted {} grades from {} ({} with inferred subjects).",
                summary.inserted,
                csv.display(),
                summary.inferred_subjects
            );
        }
        Commands::ImportInvitations { csv } => {
            let written = db::import_invitations_csv(&pool, &csv).await?;
            println!("Wrote {written} invitations from {}.", csv.display());
        }
        Commands::Summary {
            classroom,
            student,
            no_cache,
        } => {
            let mut analytics = engine(&config)?;
            if let Some(student_id) = student {
                let cached = if no_cache {
                    analytics.refresh(student_id);
                    db::invalidate_aggregate(&pool, student_id).await?;
                    None
                } else {
                    db::cached_aggregate(&pool, student_id, config.cache_policy()?).await?
                };
                let aggregate = match cached {
                    Some(aggregate) => aggregate,
                    None => {
                        let grades = db::fetch_grades(&pool, Scope::Student(student_id)).await?;
                        let aggregate = analytics.student_aggregate(student_id, &grades);
                        db::store_aggregate(&pool, &aggregate).await?;
                        aggregate
                    }
                };
                let status = analytics
                    .scheme()
                    .classify(aggregate.overall_average, Scheme::Status)?;
                let letter = analytics
                    .scheme()
                    .classify(aggregate.overall_average, Scheme::Letter)?;

                println!(
                    "Student {} overall {:.1}% ({}, {}) trend {} across {} grades ({} skipped)",
                    student_id,
                    aggregate.overall_average,
                    status,
                    letter,
                    aggregate.trend.as_str(),
                    aggregate.record_count,
                    aggregate.skipped
                );
                for (subject, avg) in &aggregate.subject_averages {
                    println!(
                        "- {}: {:.1}% over {} grades, trend {}",
                        subject,
                        avg.average,
                        avg.record_count,
                        avg.trend.as_str()
                    );
                }
            } else if let Some(classroom) = classroom {
                let grades = db::fetch_grades(&pool, Scope::Classroom(&classroom)).await?;
                let class = analytics.class_aggregate(&grades);
                println!(
                    "Classroom {} overall {:.1}% across {} students ({} malformed grades skipped)",
                    classroom,
                    class.overall_average,
                    class.students.len(),
                    class.skipped
                );
                for (subject, avg) in &class.subjects {
                    println!(
                        "- {}: {:.1}% from {} students",
                        subject, avg.average, avg.student_count
                    );
                }
            }
        }
        Commands::Roster {
            classroom,
            search,
            status,
            sort,
        } => {
            let students = db::fetch_students(&pool, Scope::Classroom(&classroom)).await?;
            let grades = db::fetch_grades(&pool, Scope::Classroom(&classroom)).await?;
            let overviews = engine(&config)?.overviews(&students, &grades)?;
            let listed = roster::filter_and_sort(&overviews, &RosterQuery { search, status, sort });
            let stats = ClassStats::from_overviews(&overviews);

            if listed.is_empty() {
                println!("No students match this query.");
            }
            for student in &listed {
                println!(
                    "- {} ({}) {:.1}% {} trend {}",
                    student.name,
                    student.email,
                    student.overall_average,
                    student.status,
                    student.trend.as_str()
                );
            }
            println!(
                "{} students, average {}%: {} excellent, {} good, \
                 {} needs attention, {} struggling",
                stats.total,
                stats.average_score,
                stats.excellent,
                stats.good,
                stats.needs_attention,
                stats.struggling
            );
        }
        Commands::Report { classroom, out } => {
            let students = db::fetch_students(&pool, Scope::Classroom(&classroom)).await?;
            let grades = db::fetch_grades(&pool, Scope::Classroom(&classroom)).await?;
            let mut analytics = engine(&config)?;
            let overviews = analytics.overviews(&students, &grades)?;
            let class = analytics.class_aggregate(&grades);
            let report = report::build_class_report(
                &format!("classroom {classroom}"),
                &class,
                &overviews,
                analytics.scheme(),
                &grades,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Recommend {
            student,
            subject,
            refresh,
        } => {
            let grades = db::fetch_grades(&pool, Scope::Student(student)).await?;
            let mut analytics = engine(&config)?;
            let subject = analytics.resolve_subject(student, &subject, &grades);
            let stored = db::fetch_recommendations(&pool, student, Some(subject.as_str())).await?;

            match RecommendationPlan::decide(stored, refresh) {
                RecommendationPlan::Reuse(existing) => {
                    println!("Existing recommendations for {subject}:");
                    print_recommendations(&existing);
                }
                RecommendationPlan::Generate => {
                    let generated = analytics.recommend(student, &subject, &grades)?;
                    db::insert_recommendations(&pool, &generated).await?;
                    println!("Generated recommendations for {subject}:");
                    print_recommendations(&generated);
                }
            }
        }
        Commands::Start { student, id } => {
            let mut rec = find_recommendation(&pool, student, &id).await?;
            rec.start()?;
            db::update_recommendation(&pool, &rec).await?;
            println!("Started {}.", rec.title);
        }
        Commands::Complete { student, id, score } => {
            let mut rec = find_recommendation(&pool, student, &id).await?;
            let awarded = rec.complete(score, Utc::now())?;
            let ledger = db::complete_recommendation(&pool, &rec, awarded).await?;
            println!(
                "Completed {} and earned {awarded} XP ({} XP over {} completions).",
                rec.title, ledger.total_xp, ledger.completions
            );
        }
        Commands::Paths { student } => {
            let recommendations = db::fetch_recommendations(&pool, student, None).await?;
            let learning_paths = paths::build_learning_paths(&recommendations);
            let ledger = db::fetch_xp(&pool, student).await?;
            println!(
                "Student {student}: {} XP from {} completed recommendations",
                ledger.total_xp, ledger.completions
            );
            if learning_paths.is_empty() {
                println!("No recommendations yet for student {student}.");
            }
            for path in learning_paths {
                println!(
                    "{} [{}] {}% ({}/{}) about {}",
                    path.title,
                    path.level.as_str(),
                    path.progress,
                    path.completed,
                    path.total,
                    path.estimated_completion
                );
                println!("  skills: {}", path.skills.join(", "));
                print_recommendations(&path.assignments);
            }
        }
        Commands::Invitations { status } => {
            let invitations = db::fetch_invitations(&pool).await?;
            let stats = InvitationStats::from_invitations(&invitations);
            println!(
                "{} invitations: {} pending, {} accepted, {} expired ({} teachers, {} students)",
                stats.total,
                stats.pending,
                stats.accepted,
                stats.expired,
                stats.teachers,
                stats.students
            );
            let listed = match status {
                Some(status) => invitations::filter_by_status(&invitations, status),
                None => invitations.iter().collect(),
            };
            for invitation in listed {
                println!(
                    "- {} ({}) invited {} {}",
                    invitation.email,
                    invitation.invitation_type.as_str(),
                    invitation.invited_date.date_naive(),
                    invitation.status().as_str()
                );
            }
        }
    }

    Ok(())
}
