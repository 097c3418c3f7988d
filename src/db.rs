use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::error::{CoreError, CoreResult};
use crate::models::{
    JoinedRow, PlacementRecord, PlacementStatus, ProgrammingRecord, SoftSkillScore, Student,
};
use crate::predicate::{Comparison, Expr, Field, JoinKind, Literal, Table};
use crate::store::{DataStore, QueryRequest};

const SELECT_JOINED: &str = "SELECT s.student_id, s.name, s.age, s.gender, s.email, s.phone, \
     s.enrollment_year, s.course_batch, s.city, s.graduation_year, \
     prog.programming_id, prog.language, prog.problems_solved, prog.assessments_completed, \
     prog.mini_projects, prog.certifications_earned, prog.latest_project_score, \
     ss.soft_skill_id, ss.communication, ss.teamwork, ss.presentation, ss.leadership, \
     ss.critical_thinking, ss.interpersonal_skills, \
     p.placement_id, p.mock_interview_score, p.internships_completed, p.placement_status, \
     p.company_name, p.placement_package, p.interview_rounds_cleared, p.placement_date \
     FROM placement.students s";

const SOFT_SKILL_COLUMNS: &str = "ss.communication, ss.teamwork, ss.presentation, \
     ss.leadership, ss.critical_thinking, ss.interpersonal_skills";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres implementation of the store contract. Criteria values only ever
/// reach the server as bind parameters.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DataStore for PgStore {
    async fn query(&self, request: &QueryRequest) -> CoreResult<Vec<JoinedRow>> {
        let mut builder = build_query(request);
        tracing::debug!(sql = builder.sql(), "querying student join graph");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(joined_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(CoreError::from)
    }
}

fn build_query(request: &QueryRequest) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(SELECT_JOINED);

    for table in [Table::Programming, Table::SoftSkills, Table::Placements] {
        let join = match request.joins.kind(table) {
            JoinKind::Inner => " JOIN ",
            JoinKind::Left => " LEFT JOIN ",
        };
        let (name, alias) = table_source(table);
        builder
            .push(join)
            .push(name)
            .push(" ")
            .push(alias)
            .push(" ON ")
            .push(alias)
            .push(".student_id = s.student_id");
    }

    builder.push(" WHERE ");
    push_expr(&mut builder, &request.predicate);
    builder.push(
        " ORDER BY s.student_id, prog.programming_id, ss.soft_skill_id, p.placement_id",
    );
    builder
}

/// Qualified table name and alias for a joined table.
fn table_source(table: Table) -> (&'static str, &'static str) {
    match table {
        Table::Programming => ("placement.programming", "prog"),
        Table::SoftSkills => ("placement.soft_skills", "ss"),
        Table::Placements => ("placement.placements", "p"),
    }
}

fn column(field: Field) -> String {
    match (field, field.table()) {
        // NULL unless every skill is a valid score
        (Field::SoftSkillAverage, _) => format!(
            "(CASE WHEN LEAST({SOFT_SKILL_COLUMNS}) >= 0 AND GREATEST({SOFT_SKILL_COLUMNS}) <= 100 \
             THEN (ss.communication + ss.teamwork + ss.presentation + ss.leadership \
             + ss.critical_thinking + ss.interpersonal_skills) / 6.0 END)::float8"
        ),
        (_, Some(table)) => format!("{}.{}", table_source(table).1, field.name()),
        (_, None) => format!("s.{}", field.name()),
    }
}

fn push_expr(builder: &mut QueryBuilder<'static, Postgres>, expr: &Expr) {
    match expr {
        Expr::Always => {
            builder.push("TRUE");
        }
        Expr::Compare(comparison) => push_comparison(builder, comparison),
        Expr::All(parts) => {
            builder.push("(");
            for (index, part) in parts.iter().enumerate() {
                if index > 0 {
                    builder.push(" AND ");
                }
                push_expr(builder, part);
            }
            builder.push(")");
        }
    }
}

fn push_comparison(builder: &mut QueryBuilder<'static, Postgres>, comparison: &Comparison) {
    let column = column(comparison.field());
    match comparison {
        Comparison::Equals { value, .. } => {
            builder.push(&column).push(" = ");
            push_literal(builder, value);
        }
        Comparison::AtLeast { field, bound } => {
            builder.push("(").push(&column).push(" >= ");
            push_literal(builder, bound);
            if field.is_bounded_score() {
                builder.push(" AND ").push(&column).push(" <= 100");
            }
            builder.push(")");
        }
        Comparison::OneOf { values, .. } => {
            let values: Vec<String> = values.iter().map(literal_text).collect();
            builder.push(&column).push(" = ANY(").push_bind(values).push(")");
        }
    }
}

fn push_literal(builder: &mut QueryBuilder<'static, Postgres>, literal: &Literal) {
    match literal {
        Literal::Text(value) => builder.push_bind(value.clone()),
        Literal::Int(value) => builder.push_bind(*value),
        Literal::Number(value) => builder.push_bind(*value),
        Literal::Status(status) => builder.push_bind(status.as_str()),
    };
}

fn literal_text(literal: &Literal) -> String {
    match literal {
        Literal::Text(value) => value.clone(),
        Literal::Int(value) => value.to_string(),
        Literal::Number(value) => value.to_string(),
        Literal::Status(status) => status.as_str().to_string(),
    }
}

fn joined_row(row: &PgRow) -> Result<JoinedRow, sqlx::Error> {
    let student_id: i64 = row.try_get("student_id")?;
    let student = Student {
        id: student_id,
        name: row.try_get("name")?,
        age: row.try_get("age")?,
        gender: row.try_get("gender")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        enrollment_year: row.try_get("enrollment_year")?,
        course_batch: row.try_get("course_batch")?,
        city: row.try_get("city")?,
        graduation_year: row.try_get("graduation_year")?,
    };

    let programming = match row.try_get::<Option<i64>, _>("programming_id")? {
        Some(id) => Some(ProgrammingRecord {
            id,
            student_id,
            language: row.try_get("language")?,
            problems_solved: row.try_get("problems_solved")?,
            assessments_completed: row.try_get("assessments_completed")?,
            mini_projects: row.try_get("mini_projects")?,
            certifications_earned: row.try_get("certifications_earned")?,
            latest_project_score: row.try_get("latest_project_score")?,
        }),
        None => None,
    };

    let soft_skills = match row.try_get::<Option<i64>, _>("soft_skill_id")? {
        Some(id) => Some(SoftSkillScore {
            id,
            student_id,
            communication: row.try_get("communication")?,
            teamwork: row.try_get("teamwork")?,
            presentation: row.try_get("presentation")?,
            leadership: row.try_get("leadership")?,
            critical_thinking: row.try_get("critical_thinking")?,
            interpersonal_skills: row.try_get("interpersonal_skills")?,
        }),
        None => None,
    };

    let placement = match row.try_get::<Option<i64>, _>("placement_id")? {
        Some(id) => {
            let status: String = row.try_get("placement_status")?;
            Some(PlacementRecord {
                id,
                student_id,
                mock_interview_score: row.try_get("mock_interview_score")?,
                internships_completed: row.try_get("internships_completed")?,
                placement_status: status
                    .parse::<PlacementStatus>()
                    .map_err(|err| sqlx::Error::Decode(err.into()))?,
                company_name: row.try_get("company_name")?,
                placement_package: row.try_get("placement_package")?,
                interview_rounds_cleared: row.try_get("interview_rounds_cleared")?,
                placement_date: row.try_get("placement_date")?,
            })
        }
        None => None,
    };

    Ok(JoinedRow {
        student,
        programming,
        soft_skills,
        placement,
    })
}

struct SeedStudent {
    name: &'static str,
    email: &'static str,
    age: i32,
    gender: &'static str,
    batch: &'static str,
    city: &'static str,
    programming: &'static [(&'static str, i32, i32, i32, i32, i32)],
    soft_skills: Option<[i32; 6]>,
    placement: Option<(i32, i32, &'static str, Option<&'static str>, Option<i64>, i32)>,
}

const SEED_STUDENTS: &[SeedStudent] = &[
    SeedStudent {
        name: "Ananya Iyer",
        email: "ananya.iyer@example.com",
        age: 22,
        gender: "Female",
        batch: "DS_2024_A",
        city: "Bangalore",
        programming: &[("Python", 112, 9, 5, 3, 91), ("SQL", 64, 7, 3, 1, 84)],
        soft_skills: Some([86, 82, 79, 74, 88, 81]),
        placement: Some((88, 2, "Placed", Some("Freshworks"), Some(1_150_000), 4)),
    },
    SeedStudent {
        name: "Rohan Mehta",
        email: "rohan.mehta@example.com",
        age: 23,
        gender: "Male",
        batch: "DS_2024_A",
        city: "Mumbai",
        programming: &[("Java", 41, 5, 2, 1, 68)],
        soft_skills: Some([64, 71, 58, 55, 62, 66]),
        placement: Some((57, 1, "In Progress", None, None, 1)),
    },
    SeedStudent {
        name: "Meera Nair",
        email: "meera.nair@example.com",
        age: 21,
        gender: "Female",
        batch: "AIML_2024_A",
        city: "Chennai",
        programming: &[("Python", 76, 8, 4, 2, 79)],
        soft_skills: Some([78, 80, 75, 69, 77, 82]),
        placement: Some((74, 1, "Ready", None, None, 2)),
    },
    SeedStudent {
        name: "Kabir Singh",
        email: "kabir.singh@example.com",
        age: 24,
        gender: "Male",
        batch: "AIML_2024_A",
        city: "Delhi",
        programming: &[],
        soft_skills: Some([52, 60, 48, 45, 57, 59]),
        placement: Some((41, 0, "Not Ready", None, None, 0)),
    },
];

/// Year segment of a batch code such as `DS_2024_A`.
fn batch_year(batch: &str) -> Option<i32> {
    batch.rsplit('_').nth(1).and_then(|year| year.parse().ok())
}

/// Loads a small fixed cohort, including one student with no programming
/// record. Safe to run repeatedly.
pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let placement_date = NaiveDate::from_ymd_opt(2025, 6, 12).context("invalid date")?;

    for entry in SEED_STUDENTS {
        let enrollment_year =
            batch_year(entry.batch).context("seed batch must carry a year")?;

        let student_id: i64 = sqlx::query(
            r#"
            INSERT INTO placement.students
            (name, age, gender, email, enrollment_year, course_batch, city, graduation_year)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name, course_batch = EXCLUDED.course_batch, city = EXCLUDED.city
            RETURNING student_id
            "#,
        )
        .bind(entry.name)
        .bind(entry.age)
        .bind(entry.gender)
        .bind(entry.email)
        .bind(enrollment_year)
        .bind(entry.batch)
        .bind(entry.city)
        .bind(enrollment_year + 1)
        .fetch_one(pool)
        .await?
        .get("student_id");

        for (language, problems, assessments, projects, certifications, score) in entry.programming
        {
            sqlx::query(
                r#"
                INSERT INTO placement.programming
                (student_id, language, problems_solved, assessments_completed, mini_projects,
                 certifications_earned, latest_project_score)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (student_id, language) DO UPDATE
                SET problems_solved = EXCLUDED.problems_solved,
                    latest_project_score = EXCLUDED.latest_project_score
                "#,
            )
            .bind(student_id)
            .bind(*language)
            .bind(*problems)
            .bind(*assessments)
            .bind(*projects)
            .bind(*certifications)
            .bind(*score)
            .execute(pool)
            .await?;
        }

        if let Some(skills) = entry.soft_skills {
            sqlx::query(
                r#"
                INSERT INTO placement.soft_skills
                (student_id, communication, teamwork, presentation, leadership,
                 critical_thinking, interpersonal_skills)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (student_id) DO NOTHING
                "#,
            )
            .bind(student_id)
            .bind(skills[0])
            .bind(skills[1])
            .bind(skills[2])
            .bind(skills[3])
            .bind(skills[4])
            .bind(skills[5])
            .execute(pool)
            .await?;
        }

        if let Some((mock, internships, status, company, package, rounds)) = entry.placement {
            let date = (status == "Placed").then_some(placement_date);
            sqlx::query(
                r#"
                INSERT INTO placement.placements
                (student_id, mock_interview_score, internships_completed, placement_status,
                 company_name, placement_package, interview_rounds_cleared, placement_date)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (student_id) DO NOTHING
                "#,
            )
            .bind(student_id)
            .bind(mock)
            .bind(internships)
            .bind(status)
            .bind(company)
            .bind(package)
            .bind(rounds)
            .bind(date)
            .execute(pool)
            .await?;
        }
    }

    Ok(SEED_STUDENTS.len())
}
