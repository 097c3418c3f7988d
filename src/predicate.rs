//! Predicate Builder: turns `Criteria` into a typed conjunction of
//! comparisons plus the set of non-root tables that must be inner-joined.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::criteria::Criteria;
use crate::error::CoreResult;
use crate::models::{score_in_range, JoinedRow, PlacementStatus};

/// Tables joined onto the student root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Table {
    Programming,
    SoftSkills,
    Placements,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Field {
    CourseBatch,
    City,
    Language,
    ProblemsSolved,
    ProjectScore,
    SoftSkillAverage,
    MockInterviewScore,
    InternshipsCompleted,
    PlacementStatus,
}

impl Field {
    /// The joined table the field lives on; `None` for student columns.
    pub fn table(self) -> Option<Table> {
        match self {
            Field::CourseBatch | Field::City => None,
            Field::Language | Field::ProblemsSolved | Field::ProjectScore => {
                Some(Table::Programming)
            }
            Field::SoftSkillAverage => Some(Table::SoftSkills),
            Field::MockInterviewScore | Field::InternshipsCompleted | Field::PlacementStatus => {
                Some(Table::Placements)
            }
        }
    }

    /// Column name on the field's table; `soft_skill_avg` is computed.
    pub fn name(self) -> &'static str {
        match self {
            Field::CourseBatch => "course_batch",
            Field::City => "city",
            Field::Language => "language",
            Field::ProblemsSolved => "problems_solved",
            Field::ProjectScore => "latest_project_score",
            Field::SoftSkillAverage => "soft_skill_avg",
            Field::MockInterviewScore => "mock_interview_score",
            Field::InternshipsCompleted => "internships_completed",
            Field::PlacementStatus => "placement_status",
        }
    }

    /// Fields holding a 0..=100 score.
    pub fn is_bounded_score(self) -> bool {
        matches!(
            self,
            Field::ProjectScore | Field::SoftSkillAverage | Field::MockInterviewScore
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Text(String),
    Int(i64),
    Number(f64),
    Status(PlacementStatus),
}

impl Literal {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(value) => Some(*value as f64),
            Literal::Number(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Comparison {
    Equals { field: Field, value: Literal },
    AtLeast { field: Field, bound: Literal },
    OneOf { field: Field, values: Vec<Literal> },
}

impl Comparison {
    pub fn field(&self) -> Field {
        match self {
            Comparison::Equals { field, .. }
            | Comparison::AtLeast { field, .. }
            | Comparison::OneOf { field, .. } => *field,
        }
    }

    /// Absent values and out-of-range scores never match.
    pub fn matches(&self, row: &JoinedRow) -> bool {
        let Some(actual) = field_value(self.field(), row) else {
            return false;
        };
        match self {
            Comparison::Equals { value, .. } => actual.equals(value),
            Comparison::AtLeast { bound, .. } => match (actual.as_f64(), bound.as_f64()) {
                (Some(actual), Some(bound)) => actual >= bound,
                _ => false,
            },
            Comparison::OneOf { values, .. } => values.iter().any(|value| actual.equals(value)),
        }
    }

    fn sort_key(&self) -> (Field, String) {
        (self.field(), format!("{self:?}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Always,
    Compare(Comparison),
    All(Vec<Expr>),
}

impl Expr {
    /// Normalized conjunction: nested conjunctions are flattened, `Always`
    /// is dropped and comparisons are sorted by field, so the result does
    /// not depend on the order of `parts`.
    pub fn all(parts: Vec<Expr>) -> Expr {
        let mut comparisons = Vec::new();
        flatten(parts, &mut comparisons);
        comparisons.sort_by_key(Comparison::sort_key);
        comparisons.dedup();

        match comparisons.len() {
            0 => Expr::Always,
            1 => Expr::Compare(comparisons.remove(0)),
            _ => Expr::All(comparisons.into_iter().map(Expr::Compare).collect()),
        }
    }

    pub fn conjuncts(&self) -> Vec<&Comparison> {
        match self {
            Expr::Always => Vec::new(),
            Expr::Compare(comparison) => vec![comparison],
            Expr::All(parts) => parts.iter().flat_map(Expr::conjuncts).collect(),
        }
    }

    pub fn matches(&self, row: &JoinedRow) -> bool {
        match self {
            Expr::Always => true,
            Expr::Compare(comparison) => comparison.matches(row),
            Expr::All(parts) => parts.iter().all(|part| part.matches(row)),
        }
    }
}

fn flatten(parts: Vec<Expr>, out: &mut Vec<Comparison>) {
    for part in parts {
        match part {
            Expr::Always => {}
            Expr::Compare(comparison) => out.push(comparison),
            Expr::All(nested) => flatten(nested, out),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JoinKind {
    Inner,
    Left,
}

/// How each non-root table is joined onto students.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JoinPlan {
    pub programming: JoinKind,
    pub soft_skills: JoinKind,
    pub placements: JoinKind,
}

impl JoinPlan {
    /// Every table left-joined: no student is lost for a missing sub-record.
    pub fn outer() -> Self {
        JoinPlan {
            programming: JoinKind::Left,
            soft_skills: JoinKind::Left,
            placements: JoinKind::Left,
        }
    }

    /// Inner joins for tables a filter needs, left joins for the rest.
    pub fn requiring(tables: &BTreeSet<Table>) -> Self {
        let kind = |table| {
            if tables.contains(&table) {
                JoinKind::Inner
            } else {
                JoinKind::Left
            }
        };
        JoinPlan {
            programming: kind(Table::Programming),
            soft_skills: kind(Table::SoftSkills),
            placements: kind(Table::Placements),
        }
    }

    pub fn kind(&self, table: Table) -> JoinKind {
        match table {
            Table::Programming => self.programming,
            Table::SoftSkills => self.soft_skills,
            Table::Placements => self.placements,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub expr: Expr,
    /// Minimal set of tables the active criteria touch.
    pub tables: BTreeSet<Table>,
}

impl Predicate {
    pub fn join_plan(&self) -> JoinPlan {
        JoinPlan::requiring(&self.tables)
    }
}

pub fn build(criteria: &Criteria) -> CoreResult<Predicate> {
    criteria.validate()?;

    let mut comparisons = Vec::new();
    let text = |field, value: &Option<String>| {
        value.as_ref().map(|value| Comparison::Equals {
            field,
            value: Literal::Text(value.trim().to_string()),
        })
    };

    comparisons.extend(text(Field::CourseBatch, &criteria.course_batch));
    comparisons.extend(text(Field::City, &criteria.city));
    comparisons.extend(text(Field::Language, &criteria.language));

    for (field, bound) in [
        (Field::ProblemsSolved, criteria.min_problems_solved.map(Literal::Int)),
        (Field::ProjectScore, criteria.min_project_score.map(Literal::Number)),
        (Field::SoftSkillAverage, criteria.min_soft_skill_avg.map(Literal::Number)),
        (
            Field::MockInterviewScore,
            criteria.min_mock_interview_score.map(Literal::Number),
        ),
        (Field::InternshipsCompleted, criteria.min_internships.map(Literal::Int)),
    ] {
        if let Some(bound) = bound {
            comparisons.push(Comparison::AtLeast { field, bound });
        }
    }

    let mut statuses = criteria.placement_status.clone();
    statuses.sort();
    statuses.dedup();
    match statuses.as_slice() {
        [] => {}
        [status] => comparisons.push(Comparison::Equals {
            field: Field::PlacementStatus,
            value: Literal::Status(*status),
        }),
        _ => comparisons.push(Comparison::OneOf {
            field: Field::PlacementStatus,
            values: statuses.into_iter().map(Literal::Status).collect(),
        }),
    }

    let tables = comparisons.iter().filter_map(|c| c.field().table()).collect();
    let expr = Expr::all(comparisons.into_iter().map(Expr::Compare).collect());

    Ok(Predicate { expr, tables })
}

enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
    Status(PlacementStatus),
}

impl FieldValue<'_> {
    fn equals(&self, literal: &Literal) -> bool {
        match (self, literal) {
            (FieldValue::Text(actual), Literal::Text(expected)) => *actual == expected.as_str(),
            (FieldValue::Status(actual), Literal::Status(expected)) => actual == expected,
            (FieldValue::Number(actual), _) => literal.as_f64() == Some(*actual),
            _ => false,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

fn count(value: i32) -> Option<FieldValue<'static>> {
    (value >= 0).then_some(FieldValue::Number(value as f64))
}

fn score(value: i32) -> Option<FieldValue<'static>> {
    score_in_range(value).then_some(FieldValue::Number(value as f64))
}

fn field_value(field: Field, row: &JoinedRow) -> Option<FieldValue<'_>> {
    match field {
        Field::CourseBatch => Some(FieldValue::Text(&row.student.course_batch)),
        Field::City => Some(FieldValue::Text(&row.student.city)),
        Field::Language => row
            .programming
            .as_ref()
            .map(|p| FieldValue::Text(&p.language)),
        Field::ProblemsSolved => row.programming.as_ref().and_then(|p| count(p.problems_solved)),
        Field::ProjectScore => row
            .programming
            .as_ref()
            .and_then(|p| score(p.latest_project_score)),
        Field::SoftSkillAverage => row
            .soft_skills
            .as_ref()
            .and_then(|s| s.average())
            .map(FieldValue::Number),
        Field::MockInterviewScore => row
            .placement
            .as_ref()
            .and_then(|p| score(p.mock_interview_score)),
        Field::InternshipsCompleted => row
            .placement
            .as_ref()
            .and_then(|p| count(p.internships_completed)),
        Field::PlacementStatus => row
            .placement
            .as_ref()
            .map(|p| FieldValue::Status(p.placement_status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::models::{PlacementRecord, ProgrammingRecord, SoftSkillScore, Student};

    fn row() -> JoinedRow {
        JoinedRow {
            student: Student {
                id: 1,
                name: "Asha Rao".to_string(),
                age: Some(23),
                gender: Some("Female".to_string()),
                email: "asha.rao@example.com".to_string(),
                phone: None,
                enrollment_year: Some(2024),
                course_batch: "DS_2024_A".to_string(),
                city: "Pune".to_string(),
                graduation_year: Some(2025),
            },
            programming: Some(ProgrammingRecord {
                id: 10,
                student_id: 1,
                language: "Python".to_string(),
                problems_solved: 80,
                assessments_completed: 6,
                mini_projects: 3,
                certifications_earned: 2,
                latest_project_score: 88,
            }),
            soft_skills: Some(SoftSkillScore {
                id: 20,
                student_id: 1,
                communication: 70,
                teamwork: 70,
                presentation: 70,
                leadership: 70,
                critical_thinking: 70,
                interpersonal_skills: 70,
            }),
            placement: Some(PlacementRecord {
                id: 30,
                student_id: 1,
                mock_interview_score: 75,
                internships_completed: 1,
                placement_status: PlacementStatus::Ready,
                company_name: None,
                placement_package: None,
                interview_rounds_cleared: 2,
                placement_date: None,
            }),
        }
    }

    #[test]
    fn empty_criteria_build_always_without_joins() {
        let predicate = build(&Criteria::default()).expect("empty criteria are valid");
        assert_eq!(predicate.expr, Expr::Always);
        assert!(predicate.tables.is_empty());
        assert_eq!(predicate.join_plan(), JoinPlan::outer());
    }

    #[test]
    fn criteria_force_only_their_tables() {
        let criteria = Criteria {
            city: Some("Pune".to_string()),
            min_mock_interview_score: Some(60.0),
            ..Criteria::default()
        };
        let predicate = build(&criteria).expect("valid criteria");

        assert_eq!(predicate.tables, BTreeSet::from([Table::Placements]));
        let plan = predicate.join_plan();
        assert_eq!(plan.kind(Table::Placements), JoinKind::Inner);
        assert_eq!(plan.kind(Table::Programming), JoinKind::Left);
        assert_eq!(plan.kind(Table::SoftSkills), JoinKind::Left);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let forward = Criteria::from_pairs([
            ("language", "Python"),
            ("min_internships", "1"),
            ("city", "Pune"),
        ])
        .and_then(|c| build(&c))
        .expect("valid");
        let backward = Criteria::from_pairs([
            ("city", "Pune"),
            ("min_internships", "1"),
            ("language", "Python"),
        ])
        .and_then(|c| build(&c))
        .expect("valid");

        assert_eq!(forward, backward);

        let a = Comparison::Equals {
            field: Field::City,
            value: Literal::Text("Pune".to_string()),
        };
        let b = Comparison::AtLeast {
            field: Field::ProblemsSolved,
            bound: Literal::Int(5),
        };
        assert_eq!(
            Expr::all(vec![Expr::Compare(a.clone()), Expr::Compare(b.clone())]),
            Expr::all(vec![Expr::Compare(b), Expr::Always, Expr::Compare(a)])
        );
    }

    #[test]
    fn extra_criterion_only_adds_conjuncts() {
        let base = Criteria {
            min_problems_solved: Some(30),
            ..Criteria::default()
        };
        let narrower = Criteria {
            min_soft_skill_avg: Some(65.0),
            ..base.clone()
        };

        let base = build(&base).expect("valid");
        let narrower = build(&narrower).expect("valid");

        for conjunct in base.expr.conjuncts() {
            assert!(narrower.expr.conjuncts().contains(&conjunct));
        }
        assert!(narrower.tables.is_superset(&base.tables));
        assert_eq!(narrower.expr.conjuncts().len(), base.expr.conjuncts().len() + 1);
    }

    #[test]
    fn evaluates_against_joined_rows() {
        let criteria = Criteria {
            language: Some(" Python ".to_string()),
            min_soft_skill_avg: Some(70.0),
            placement_status: vec![PlacementStatus::Placed, PlacementStatus::Ready],
            ..Criteria::default()
        };
        let predicate = build(&criteria).expect("valid");
        assert!(predicate.expr.matches(&row()));

        let strict = Criteria {
            min_soft_skill_avg: Some(70.5),
            ..Criteria::default()
        };
        assert!(!build(&strict).expect("valid").expr.matches(&row()));
    }

    #[test]
    fn absent_and_out_of_range_values_never_match() {
        let predicate = build(&Criteria {
            min_problems_solved: Some(0),
            min_project_score: Some(0.0),
            ..Criteria::default()
        })
        .expect("valid");

        let mut missing = row();
        missing.programming = None;
        assert!(!predicate.expr.matches(&missing));

        let mut out_of_range = row();
        if let Some(programming) = out_of_range.programming.as_mut() {
            programming.latest_project_score = 130;
        }
        assert!(!predicate.expr.matches(&out_of_range));
        assert!(predicate.expr.matches(&row()));
    }

    #[test]
    fn invalid_criteria_are_rejected() {
        let err = build(&Criteria {
            language: Some("  ".to_string()),
            ..Criteria::default()
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCriterion(_)));

        let err = build(&Criteria {
            min_soft_skill_avg: Some(f64::NAN),
            ..Criteria::default()
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCriterion(_)));
    }
}
