use std::collections::BTreeSet;

use anyhow::{anyhow, Context};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CachePolicy, CachedAggregate};
use crate::invitations::{Invitation, InvitationType};
use crate::models::{GradeRecord, Student, StudentAggregate, StudentId, Subject, SubjectSource};
use crate::recommend::{
    Difficulty, Recommendation, RecommendationStatus, RecommendationType, XpLedger,
};
use crate::subjects::infer_subject;

#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    Classroom(&'a str),
    Student(StudentId),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportSummary {
    pub inserted: usize,
    pub inferred_subjects: usize,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_student(pool: &PgPool, student: &Student) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO classroom_insights.students (id, full_name, email, classroom)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET full_name = EXCLUDED.full_name, email = EXCLUDED.email, classroom = EXCLUDED.classroom
        "#,
    )
    .bind(student.id)
    .bind(&student.full_name)
    .bind(&student.email)
    .bind(&student.classroom)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_grade(
    pool: &PgPool,
    grade: &GradeRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO classroom_insights.grades
        (id, student_id, assignment_id, title, subject, subject_source, score, max_points,
         feedback, graded_at, graded_by, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(grade.id)
    .bind(grade.student_id)
    .bind(&grade.assignment_id)
    .bind(&grade.title)
    .bind(&grade.subject.name)
    .bind(grade.subject.source.as_str())
    .bind(grade.score)
    .bind(grade.max_points)
    .bind(&grade.feedback)
    .bind(grade.graded_at)
    .bind(&grade.graded_by)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_invitation(pool: &PgPool, invitation: &Invitation) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO classroom_insights.invitations
        (id, email, invitation_type, school_id, invited_date, is_used, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE
        SET is_used = EXCLUDED.is_used, is_active = EXCLUDED.is_active
        "#,
    )
    .bind(invitation.id)
    .bind(&invitation.email)
    .bind(invitation.invitation_type.as_str())
    .bind(invitation.school_id)
    .bind(invitation.invited_date)
    .bind(invitation.is_used)
    .bind(invitation.is_active)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (1001, "Avery Lee", "avery.lee@brainink.school", "7A"),
        (1002, "Jules Moreno", "jules.moreno@brainink.school", "7A"),
        (1003, "Kiara Patel", "kiara.patel@brainink.school", "7B"),
    ];

    for (id, name, email, classroom) in students {
        upsert_student(
            pool,
            &Student {
                id,
                full_name: name.to_string(),
                email: email.to_string(),
                classroom: classroom.to_string(),
            },
        )
        .await?;
    }

    let grades = vec![
        ("seed-001", 1001, "Mathematics", "Algebra quiz", 88.0, 100.0, "Clean working", 3),
        ("seed-002", 1001, "Mathematics", "Geometry test", 94.0, 100.0, "Excellent proofs", 10),
        ("seed-003", 1001, "English", "Essay draft", 17.0, 20.0, "Strong thesis", 12),
        ("seed-004", 1002, "Mathematics", "Algebra quiz", 64.0, 100.0, "Review factoring", 3),
        ("seed-005", 1002, "Science", "Lab report", 36.0, 50.0, "Missing conclusion", 8),
        ("seed-006", 1003, "History", "Source analysis", 71.0, 100.0, "Good context", 5),
        ("seed-007", 1003, "History", "Timeline project", 79.0, 100.0, "More detail needed", 14),
    ];

    for (source_key, student_id, subject, title, score, max_points, feedback, day) in grades {
        let graded_at = Utc
            .with_ymd_and_hms(2026, 2, day, 9, 0, 0)
            .single()
            .context("invalid seed date")?;
        let grade = GradeRecord {
            id: Uuid::new_v4(),
            student_id,
            assignment_id: source_key.to_string(),
            title: title.to_string(),
            subject: Subject::authoritative(subject),
            score,
            max_points,
            feedback: feedback.to_string(),
            graded_at,
            graded_by: "K.A.N.A.".to_string(),
        };
        insert_grade(pool, &grade, source_key).await?;
    }

    let invitations = vec![
        (1, "ms.okafor@brainink.school", InvitationType::Teacher, true, true),
        (2, "new.student@brainink.school", InvitationType::Student, false, true),
        (3, "late.reply@brainink.school", InvitationType::Student, false, false),
    ];

    for (id, email, invitation_type, is_used, is_active) in invitations {
        insert_invitation(
            pool,
            &Invitation {
                id,
                email: email.to_string(),
                invitation_type,
                school_id: 1,
                invited_date: Utc
                    .with_ymd_and_hms(2026, 1, 20, 8, 0, 0)
                    .single()
                    .context("invalid seed date")?,
                is_used,
                is_active,
            },
        )
        .await?;
    }

    Ok(())
}

pub async fn import_grades_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    subject_keywords: &[String],
) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: StudentId,
        full_name: String,
        email: String,
        classroom: String,
        assignment_id: String,
        title: String,
        subject: Option<String>,
        score: f64,
        max_points: f64,
        #[serde(default)]
        feedback: String,
        graded_at: DateTime<Utc>,
        graded_by: String,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut summary = ImportSummary::default();
    let mut touched = BTreeSet::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        upsert_student(
            pool,
            &Student {
                id: row.student_id,
                full_name: row.full_name,
                email: row.email,
                classroom: row.classroom,
            },
        )
        .await?;

        let subject = infer_subject(
            row.subject.as_deref(),
            &row.title,
            &row.feedback,
            subject_keywords,
        );
        let inferred = subject.source == SubjectSource::Inferred;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}-{}", row.student_id, row.assignment_id));

        let grade = GradeRecord {
            id: Uuid::new_v4(),
            student_id: row.student_id,
            assignment_id: row.assignment_id,
            title: row.title,
            subject,
            score: row.score,
            max_points: row.max_points,
            feedback: row.feedback,
            graded_at: row.graded_at,
            graded_by: row.graded_by,
        };

        if grade.percentage().is_none() {
            warn!(
                student_id = grade.student_id,
                assignment = %grade.assignment_id,
                score = grade.score,
                max_points = grade.max_points,
                "grade cannot produce a percentage within 0..=100 and will be skipped"
            );
        }

        if insert_grade(pool, &grade, &source_key).await? {
            summary.inserted += 1;
            if inferred {
                summary.inferred_subjects += 1;
            }
            touched.insert(grade.student_id);
        }
    }

    for student_id in touched {
        invalidate_aggregate(pool, student_id).await?;
    }

    info!(
        inserted = summary.inserted,
        inferred = summary.inferred_subjects,
        "grade import finished"
    );
    Ok(summary)
}

pub async fn import_invitations_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        id: i64,
        email: String,
        invitation_type: String,
        school_id: i64,
        invited_date: DateTime<Utc>,
        is_used: bool,
        is_active: bool,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut written = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let invitation_type = InvitationType::parse(&row.invitation_type).ok_or_else(|| {
            anyhow!(
                "unknown invitation type {:?} for {}",
                row.invitation_type,
                row.email
            )
        })?;
        let invitation = Invitation {
            id: row.id,
            email: row.email,
            invitation_type,
            school_id: row.school_id,
            invited_date: row.invited_date,
            is_used: row.is_used,
            is_active: row.is_active,
        };
        if insert_invitation(pool, &invitation).await? {
            written += 1;
        }
    }

    Ok(written)
}

pub async fn fetch_students(pool: &PgPool, scope: Scope<'_>) -> anyhow::Result<Vec<Student>> {
    let base = "SELECT id, full_name, email, classroom FROM classroom_insights.students";
    let rows = match scope {
        Scope::Classroom(classroom) => {
            sqlx::query(&format!("{base} WHERE classroom = $1 ORDER BY full_name"))
                .bind(classroom)
                .fetch_all(pool)
                .await?
        }
        Scope::Student(id) => {
            sqlx::query(&format!("{base} WHERE id = $1"))
                .bind(id)
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows
        .into_iter()
        .map(|row| Student {
            id: row.get("id"),
            full_name: row.get("full_name"),
            email: row.get("email"),
            classroom: row.get("classroom"),
        })
        .collect())
}

pub async fn fetch_grades(pool: &PgPool, scope: Scope<'_>) -> anyhow::Result<Vec<GradeRecord>> {
    let base = "SELECT g.id, g.student_id, g.assignment_id, g.title, g.subject, g.subject_source, \
                g.score, g.max_points, g.feedback, g.graded_at, g.graded_by \
                FROM classroom_insights.grades g \
                JOIN classroom_insights.students s ON s.id = g.student_id";

    let rows = match scope {
        Scope::Classroom(classroom) => {
            sqlx::query(&format!("{base} WHERE s.classroom = $1"))
                .bind(classroom)
                .fetch_all(pool)
                .await?
        }
        Scope::Student(id) => {
            sqlx::query(&format!("{base} WHERE g.student_id = $1"))
                .bind(id)
                .fetch_all(pool)
                .await?
        }
    };

    let mut grades = Vec::with_capacity(rows.len());
    for row in rows {
        let source: String = row.get("subject_source");
        grades.push(GradeRecord {
            id: row.get("id"),
            student_id: row.get("student_id"),
            assignment_id: row.get("assignment_id"),
            title: row.get("title"),
            subject: Subject {
                name: row.get("subject"),
                source: SubjectSource::parse(&source),
            },
            score: row.get("score"),
            max_points: row.get("max_points"),
            feedback: row.get("feedback"),
            graded_at: row.get("graded_at"),
            graded_by: row.get("graded_by"),
        });
    }

    debug!(count = grades.len(), "grades fetched");
    Ok(grades)
}

pub async fn fetch_recommendations(
    pool: &PgPool,
    student_id: StudentId,
    subject: Option<&str>,
) -> anyhow::Result<Vec<Recommendation>> {
    let mut query = String::from(
        "SELECT id, student_id, title, description, kind, subject, difficulty, estimated_minutes, \
         xp_reward, status, source_average, final_score, completed_at \
         FROM classroom_insights.recommendations WHERE student_id = $1",
    );
    if subject.is_some() {
        query.push_str(" AND lower(subject) = lower($2)");
    }
    query.push_str(" ORDER BY created_at, id");

    let mut rows = sqlx::query(&query).bind(student_id);
    if let Some(value) = subject {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut recommendations = Vec::with_capacity(records.len());

    for row in records {
        let id: String = row.get("id");
        let kind: String = row.get("kind");
        let difficulty: String = row.get("difficulty");
        let status: String = row.get("status");
        let estimated_minutes: i32 = row.get("estimated_minutes");
        let xp_reward: i32 = row.get("xp_reward");

        recommendations.push(Recommendation {
            kind: RecommendationType::parse(&kind)
                .ok_or_else(|| anyhow!("recommendation {id} has unknown type {kind:?}"))?,
            difficulty: Difficulty::parse(&difficulty).ok_or_else(|| {
                anyhow!("recommendation {id} has unknown difficulty {difficulty:?}")
            })?,
            status: RecommendationStatus::parse(&status)
                .ok_or_else(|| anyhow!("recommendation {id} has unknown status {status:?}"))?,
            student_id: row.get("student_id"),
            title: row.get("title"),
            description: row.get("description"),
            subject: row.get("subject"),
            estimated_minutes: u32::try_from(estimated_minutes)?,
            xp_reward: u32::try_from(xp_reward)?,
            source_average: row.get("source_average"),
            final_score: row.get("final_score"),
            completed_at: row.get("completed_at"),
            id,
        });
    }

    Ok(recommendations)
}

pub async fn insert_recommendations(
    pool: &PgPool,
    recommendations: &[Recommendation],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    for rec in recommendations {
        sqlx::query(
            r#"
            INSERT INTO classroom_insights.recommendations
            (id, student_id, title, description, kind, subject, difficulty,
             estimated_minutes, xp_reward, status, source_average)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&rec.id)
        .bind(rec.student_id)
        .bind(&rec.title)
        .bind(&rec.description)
        .bind(rec.kind.as_str())
        .bind(&rec.subject)
        .bind(rec.difficulty.as_str())
        .bind(i32::try_from(rec.estimated_minutes)?)
        .bind(i32::try_from(rec.xp_reward)?)
        .bind(rec.status.as_str())
        .bind(rec.source_average)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn update_recommendation(pool: &PgPool, rec: &Recommendation) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE classroom_insights.recommendations
        SET status = $1, final_score = $2, completed_at = $3
        WHERE id = $4 AND student_id = $5
        "#,
    )
    .bind(rec.status.as_str())
    .bind(rec.final_score)
    .bind(rec.completed_at)
    .bind(&rec.id)
    .bind(rec.student_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Stores a completed recommendation and credits its XP in one transaction.
/// Fails without crediting when the stored row is no longer in progress.
pub async fn complete_recommendation(
    pool: &PgPool,
    rec: &Recommendation,
    awarded: u32,
) -> anyhow::Result<XpLedger> {
    let mut tx = pool.begin().await?;
    let updated = sqlx::query(
        r#"
        UPDATE classroom_insights.recommendations
        SET status = $1, final_score = $2, completed_at = $3
        WHERE id = $4 AND student_id = $5 AND status = $6
        "#,
    )
    .bind(rec.status.as_str())
    .bind(rec.final_score)
    .bind(rec.completed_at)
    .bind(&rec.id)
    .bind(rec.student_id)
    .bind(RecommendationStatus::InProgress.as_str())
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() != 1 {
        return Err(anyhow!(
            "recommendation {} for student {} is no longer in progress",
            rec.id,
            rec.student_id
        ));
    }

    let row = sqlx::query(
        "SELECT total_xp, completions FROM classroom_insights.student_xp \
         WHERE student_id = $1 FOR UPDATE",
    )
    .bind(rec.student_id)
    .fetch_optional(&mut *tx)
    .await?;
    let mut ledger = match row {
        Some(row) => ledger_from_row(rec.student_id, &row)?,
        None => XpLedger::new(rec.student_id),
    };
    ledger.credit(awarded);

    sqlx::query(
        r#"
        INSERT INTO classroom_insights.student_xp (student_id, total_xp, completions, updated_at)
        VALUES ($1, $2, $3, now())
        ON CONFLICT (student_id) DO UPDATE
        SET total_xp = EXCLUDED.total_xp, completions = EXCLUDED.completions,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(ledger.student_id)
    .bind(i64::try_from(ledger.total_xp)?)
    .bind(i32::try_from(ledger.completions)?)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(
        student_id = ledger.student_id,
        awarded,
        total_xp = ledger.total_xp,
        "xp credited"
    );
    Ok(ledger)
}

fn ledger_from_row(student_id: StudentId, row: &sqlx::postgres::PgRow) -> anyhow::Result<XpLedger> {
    let total_xp: i64 = row.get("total_xp");
    let completions: i32 = row.get("completions");
    Ok(XpLedger {
        student_id,
        total_xp: u64::try_from(total_xp)?,
        completions: u32::try_from(completions)?,
    })
}

pub async fn fetch_xp(pool: &PgPool, student_id: StudentId) -> anyhow::Result<XpLedger> {
    let row = sqlx::query(
        "SELECT total_xp, completions FROM classroom_insights.student_xp WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => ledger_from_row(student_id, &row),
        None => Ok(XpLedger::new(student_id)),
    }
}

pub async fn fetch_invitations(pool: &PgPool) -> anyhow::Result<Vec<Invitation>> {
    let rows = sqlx::query(
        "SELECT id, email, invitation_type, school_id, invited_date, is_used, is_active \
         FROM classroom_insights.invitations ORDER BY invited_date DESC, id",
    )
    .fetch_all(pool)
    .await?;

    let mut invitations = Vec::with_capacity(rows.len());
    for row in rows {
        let email: String = row.get("email");
        let kind: String = row.get("invitation_type");
        invitations.push(Invitation {
            id: row.get("id"),
            invitation_type: InvitationType::parse(&kind)
                .ok_or_else(|| anyhow!("invitation for {email} has unknown type {kind:?}"))?,
            email,
            school_id: row.get("school_id"),
            invited_date: row.get("invited_date"),
            is_used: row.get("is_used"),
            is_active: row.get("is_active"),
        });
    }
    Ok(invitations)
}

/// Returns the stored aggregate only while it is still fresh under `policy`.
pub async fn cached_aggregate(
    pool: &PgPool,
    student_id: StudentId,
    policy: CachePolicy,
) -> anyhow::Result<Option<StudentAggregate>> {
    let row = sqlx::query(
        "SELECT payload, cached_at FROM classroom_insights.aggregate_cache WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let cached_at: DateTime<Utc> = row.get("cached_at");
    if !policy.is_fresh(cached_at, Utc::now()) {
        debug!(student_id, %cached_at, "stored aggregate expired");
        return Ok(None);
    }

    let Json(payload): Json<serde_json::Value> = row.try_get("payload")?;
    match CachedAggregate::decode(payload) {
        Ok(cached) => Ok(Some(cached.aggregate)),
        Err(err) => {
            warn!(student_id, %err, "discarding undecodable cached aggregate");
            invalidate_aggregate(pool, student_id).await?;
            Ok(None)
        }
    }
}

pub async fn store_aggregate(pool: &PgPool, aggregate: &StudentAggregate) -> anyhow::Result<()> {
    let cached = CachedAggregate {
        aggregate: aggregate.clone(),
        cached_at: Utc::now(),
    };
    sqlx::query(
        r#"
        INSERT INTO classroom_insights.aggregate_cache (student_id, payload, cached_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (student_id) DO UPDATE
        SET payload = EXCLUDED.payload, cached_at = EXCLUDED.cached_at
        "#,
    )
    .bind(aggregate.student_id)
    .bind(Json(&cached))
    .bind(cached.cached_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn invalidate_aggregate(pool: &PgPool, student_id: StudentId) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM classroom_insights.aggregate_cache WHERE student_id = $1")
        .bind(student_id)
        .execute(pool)
        .await?;
    Ok(())
}
