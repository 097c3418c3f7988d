use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::predicate::{JoinKind, JoinPlan};
use crate::ranking::round2;

pub const SCORE_MIN: i32 = 0;
pub const SCORE_MAX: i32 = 100;

pub fn score_in_range(value: i32) -> bool {
    (SCORE_MIN..=SCORE_MAX).contains(&value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlacementStatus {
    #[serde(rename = "Ready")]
    Ready,
    #[serde(rename = "Not Ready")]
    NotReady,
    #[serde(rename = "Placed")]
    Placed,
    #[serde(rename = "In Progress")]
    InProgress,
}

impl PlacementStatus {
    pub const ALL: [PlacementStatus; 4] = [
        PlacementStatus::Ready,
        PlacementStatus::NotReady,
        PlacementStatus::Placed,
        PlacementStatus::InProgress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlacementStatus::Ready => "Ready",
            PlacementStatus::NotReady => "Not Ready",
            PlacementStatus::Placed => "Placed",
            PlacementStatus::InProgress => "In Progress",
        }
    }
}

impl fmt::Display for PlacementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlacementStatus {
    type Err = String;

    /// Accepts the stored spelling plus snake/kebab case, case-insensitively.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "ready" => Ok(PlacementStatus::Ready),
            "not ready" => Ok(PlacementStatus::NotReady),
            "placed" => Ok(PlacementStatus::Placed),
            "in progress" => Ok(PlacementStatus::InProgress),
            _ => Err(format!("unknown placement status '{}'", value.trim())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub enrollment_year: Option<i32>,
    pub course_batch: String,
    pub city: String,
    pub graduation_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgrammingRecord {
    pub id: i64,
    pub student_id: i64,
    pub language: String,
    pub problems_solved: i32,
    pub assessments_completed: i32,
    pub mini_projects: i32,
    pub certifications_earned: i32,
    pub latest_project_score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftSkillScore {
    pub id: i64,
    pub student_id: i64,
    pub communication: i32,
    pub teamwork: i32,
    pub presentation: i32,
    pub leadership: i32,
    pub critical_thinking: i32,
    pub interpersonal_skills: i32,
}

impl SoftSkillScore {
    pub const SKILLS: [&'static str; 6] = [
        "communication",
        "critical_thinking",
        "interpersonal_skills",
        "leadership",
        "presentation",
        "teamwork",
    ];

    /// Skill values keyed by name, in `SKILLS` order.
    pub fn skills(&self) -> [(&'static str, i32); 6] {
        [
            ("communication", self.communication),
            ("critical_thinking", self.critical_thinking),
            ("interpersonal_skills", self.interpersonal_skills),
            ("leadership", self.leadership),
            ("presentation", self.presentation),
            ("teamwork", self.teamwork),
        ]
    }

    /// Mean of the six skills. `None` when any skill is outside 0..=100.
    pub fn average(&self) -> Option<f64> {
        let skills = self.skills();
        if skills.iter().any(|(_, value)| !score_in_range(*value)) {
            return None;
        }
        let total: i32 = skills.iter().map(|(_, value)| value).sum();
        Some(total as f64 / skills.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub id: i64,
    pub student_id: i64,
    pub mock_interview_score: i32,
    pub internships_completed: i32,
    pub placement_status: PlacementStatus,
    pub company_name: Option<String>,
    pub placement_package: Option<i64>,
    pub interview_rounds_cleared: i32,
    pub placement_date: Option<NaiveDate>,
}

impl PlacementRecord {
    pub fn is_placed(&self) -> bool {
        self.placement_status == PlacementStatus::Placed
    }
}

/// One row of the student join graph. Non-root tables are `None` when the
/// join was outer and no matching row exists.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub student: Student,
    pub programming: Option<ProgrammingRecord>,
    pub soft_skills: Option<SoftSkillScore>,
    pub placement: Option<PlacementRecord>,
}

/// A student flattened to one record: the representative programming row
/// (highest programming id among the rows that survived filtering), every
/// language seen in those rows, and the student's soft skills and placement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentProfile {
    pub student: Student,
    pub programming: Option<ProgrammingRecord>,
    pub languages: Vec<String>,
    pub soft_skills: Option<SoftSkillScore>,
    pub placement: Option<PlacementRecord>,
}

impl StudentProfile {
    /// Groups joined rows by student, so fan-out from several programming
    /// rows never yields duplicate students. Output is ordered by student id.
    pub fn collapse<I>(rows: I) -> Vec<StudentProfile>
    where
        I: IntoIterator<Item = JoinedRow>,
    {
        let mut grouped: BTreeMap<i64, (StudentProfile, BTreeSet<String>)> = BTreeMap::new();

        for row in rows {
            let (profile, languages) = grouped.entry(row.student.id).or_insert_with(|| {
                (
                    StudentProfile {
                        student: row.student.clone(),
                        programming: None,
                        languages: Vec::new(),
                        soft_skills: None,
                        placement: None,
                    },
                    BTreeSet::new(),
                )
            });

            if let Some(programming) = row.programming {
                languages.insert(programming.language.clone());
                if profile
                    .programming
                    .as_ref()
                    .map_or(true, |current| programming.id > current.id)
                {
                    profile.programming = Some(programming);
                }
            }
            if let Some(soft_skills) = row.soft_skills {
                if profile
                    .soft_skills
                    .as_ref()
                    .map_or(true, |current| soft_skills.id > current.id)
                {
                    profile.soft_skills = Some(soft_skills);
                }
            }
            if let Some(placement) = row.placement {
                if profile
                    .placement
                    .as_ref()
                    .map_or(true, |current| placement.id > current.id)
                {
                    profile.placement = Some(placement);
                }
            }
        }

        grouped
            .into_values()
            .map(|(mut profile, languages)| {
                profile.languages = languages.into_iter().collect();
                profile
            })
            .collect()
    }

    pub fn student_id(&self) -> i64 {
        self.student.id
    }

    pub fn problems_solved(&self) -> Option<i32> {
        self.programming.as_ref().map(|p| p.problems_solved)
    }

    pub fn project_score(&self) -> Option<i32> {
        self.programming.as_ref().map(|p| p.latest_project_score)
    }

    pub fn certifications_earned(&self) -> Option<i32> {
        self.programming.as_ref().map(|p| p.certifications_earned)
    }

    pub fn soft_skill_average(&self) -> Option<f64> {
        self.soft_skills.as_ref().and_then(SoftSkillScore::average)
    }

    pub fn mock_interview_score(&self) -> Option<i32> {
        self.placement.as_ref().map(|p| p.mock_interview_score)
    }

    pub fn internships_completed(&self) -> Option<i32> {
        self.placement.as_ref().map(|p| p.internships_completed)
    }

    pub fn placement_status(&self) -> Option<PlacementStatus> {
        self.placement.as_ref().map(|p| p.placement_status)
    }

    pub fn is_placed(&self) -> bool {
        self.placement.as_ref().is_some_and(PlacementRecord::is_placed)
    }
}

/// Everything known about one student, without any row selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentDetail {
    pub student: Student,
    pub programming: Vec<ProgrammingRecord>,
    pub soft_skills: Option<SoftSkillScore>,
    pub placement: Option<PlacementRecord>,
}

/// Distinct values available to each filter, sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub course_batches: Vec<String>,
    pub cities: Vec<String>,
    pub languages: Vec<String>,
    pub placement_statuses: Vec<PlacementStatus>,
    pub companies: Vec<String>,
}

/// Headline counts across the whole dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub students: usize,
    pub programming_records: usize,
    /// Placement records per status; every status is present, zero included.
    pub placement_status: BTreeMap<PlacementStatus, usize>,
    pub avg_problems_solved: Option<f64>,
    pub avg_project_score: Option<f64>,
}

/// The four tables, as read from a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub students: Vec<Student>,
    #[serde(default)]
    pub programming: Vec<ProgrammingRecord>,
    #[serde(default)]
    pub soft_skills: Vec<SoftSkillScore>,
    #[serde(default)]
    pub placements: Vec<PlacementRecord>,
}

impl Dataset {
    /// Rebuilds the tables from joined rows, dropping fan-out duplicates.
    pub fn from_rows<I>(rows: I) -> Dataset
    where
        I: IntoIterator<Item = JoinedRow>,
    {
        let mut students = BTreeMap::new();
        let mut programming = BTreeMap::new();
        let mut soft_skills = BTreeMap::new();
        let mut placements = BTreeMap::new();

        for row in rows {
            if let Some(record) = row.programming {
                programming.insert(record.id, record);
            }
            if let Some(record) = row.soft_skills {
                soft_skills.insert(record.id, record);
            }
            if let Some(record) = row.placement {
                placements.insert(record.id, record);
            }
            students.insert(row.student.id, row.student);
        }

        Dataset {
            students: students.into_values().collect(),
            programming: programming.into_values().collect(),
            soft_skills: soft_skills.into_values().collect(),
            placements: placements.into_values().collect(),
        }
    }

    /// Evaluates the join graph with the given join kinds. Students are
    /// visited in id order and sub-records in id order.
    pub fn join(&self, plan: &JoinPlan) -> Vec<JoinedRow> {
        let programming = group_by_student(&self.programming, |r| (r.student_id, r.id));
        let soft_skills = group_by_student(&self.soft_skills, |r| (r.student_id, r.id));
        let placements = group_by_student(&self.placements, |r| (r.student_id, r.id));

        let mut students: Vec<&Student> = self.students.iter().collect();
        students.sort_by_key(|s| s.id);

        let mut rows = Vec::new();
        for student in students {
            let Some(prog_rows) = join_side(programming.get(&student.id), plan.programming)
            else {
                continue;
            };
            let Some(soft_rows) = join_side(soft_skills.get(&student.id), plan.soft_skills)
            else {
                continue;
            };
            let Some(placement_rows) = join_side(placements.get(&student.id), plan.placements)
            else {
                continue;
            };

            for prog in &prog_rows {
                for soft in &soft_rows {
                    for placement in &placement_rows {
                        rows.push(JoinedRow {
                            student: student.clone(),
                            programming: prog.cloned(),
                            soft_skills: soft.cloned(),
                            placement: placement.cloned(),
                        });
                    }
                }
            }
        }
        rows
    }

    /// One profile per student over outer joins.
    pub fn profiles(&self) -> Vec<StudentProfile> {
        StudentProfile::collapse(self.join(&JoinPlan::outer()))
    }

    pub fn detail(&self, student_id: i64) -> Option<StudentDetail> {
        let student = self.students.iter().find(|s| s.id == student_id)?.clone();
        let mut programming: Vec<ProgrammingRecord> = self
            .programming
            .iter()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect();
        programming.sort_by_key(|r| r.id);
        let soft_skills = self
            .soft_skills
            .iter()
            .filter(|r| r.student_id == student_id)
            .max_by_key(|r| r.id)
            .cloned();
        let placement = self
            .placements
            .iter()
            .filter(|r| r.student_id == student_id)
            .max_by_key(|r| r.id)
            .cloned();

        Some(StudentDetail {
            student,
            programming,
            soft_skills,
            placement,
        })
    }

    pub fn filter_options(&self) -> FilterOptions {
        let course_batches: BTreeSet<&str> =
            self.students.iter().map(|s| s.course_batch.as_str()).collect();
        let cities: BTreeSet<&str> = self.students.iter().map(|s| s.city.as_str()).collect();
        let languages: BTreeSet<&str> =
            self.programming.iter().map(|r| r.language.as_str()).collect();
        let placement_statuses: BTreeSet<PlacementStatus> =
            self.placements.iter().map(|r| r.placement_status).collect();
        let companies: BTreeSet<&str> = self
            .placements
            .iter()
            .filter_map(|r| r.company_name.as_deref())
            .collect();

        FilterOptions {
            course_batches: course_batches.into_iter().map(str::to_string).collect(),
            cities: cities.into_iter().map(str::to_string).collect(),
            languages: languages.into_iter().map(str::to_string).collect(),
            placement_statuses: placement_statuses.into_iter().collect(),
            companies: companies.into_iter().map(str::to_string).collect(),
        }
    }

    /// Averages skip negative counts and out-of-range scores.
    pub fn summary(&self) -> DatasetSummary {
        let mut placement_status: BTreeMap<PlacementStatus, usize> =
            PlacementStatus::ALL.into_iter().map(|status| (status, 0)).collect();
        for record in &self.placements {
            *placement_status.entry(record.placement_status).or_default() += 1;
        }

        let average = |values: Vec<i32>| {
            (!values.is_empty()).then(|| {
                let sum: f64 = values.iter().map(|v| f64::from(*v)).sum();
                round2(sum / values.len() as f64)
            })
        };
        let problems: Vec<i32> = self
            .programming
            .iter()
            .map(|r| r.problems_solved)
            .filter(|count| *count >= 0)
            .collect();
        let project_scores: Vec<i32> = self
            .programming
            .iter()
            .map(|r| r.latest_project_score)
            .filter(|score| score_in_range(*score))
            .collect();

        DatasetSummary {
            students: self.students.len(),
            programming_records: self.programming.len(),
            placement_status,
            avg_problems_solved: average(problems),
            avg_project_score: average(project_scores),
        }
    }
}

fn group_by_student<T, F>(records: &[T], key: F) -> BTreeMap<i64, Vec<&T>>
where
    F: Fn(&T) -> (i64, i64),
{
    let mut grouped: BTreeMap<i64, Vec<&T>> = BTreeMap::new();
    for record in records {
        grouped.entry(key(record).0).or_default().push(record);
    }
    for group in grouped.values_mut() {
        group.sort_by_key(|r| key(*r).1);
    }
    grouped
}

/// Candidate rows for one side of a join; `None` drops the student.
fn join_side<'a, T>(matches: Option<&Vec<&'a T>>, kind: JoinKind) -> Option<Vec<Option<&'a T>>> {
    match matches {
        Some(rows) if !rows.is_empty() => Some(rows.iter().map(|r| Some(*r)).collect()),
        _ => match kind {
            JoinKind::Inner => None,
            JoinKind::Left => Some(vec![None]),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: i64) -> Student {
        Student {
            id,
            name: format!("Student {id}"),
            age: Some(22),
            gender: None,
            email: format!("student{id}@example.com"),
            phone: None,
            enrollment_year: Some(2023),
            course_batch: "DS_2023_A".to_string(),
            city: "Pune".to_string(),
            graduation_year: Some(2024),
        }
    }

    fn programming(id: i64, student_id: i64, language: &str, problems: i32) -> ProgrammingRecord {
        ProgrammingRecord {
            id,
            student_id,
            language: language.to_string(),
            problems_solved: problems,
            assessments_completed: 4,
            mini_projects: 2,
            certifications_earned: 1,
            latest_project_score: 70,
        }
    }

    #[test]
    fn status_parses_loose_spellings() {
        assert_eq!("not_ready".parse::<PlacementStatus>(), Ok(PlacementStatus::NotReady));
        assert_eq!(" In-Progress ".parse::<PlacementStatus>(), Ok(PlacementStatus::InProgress));
        assert!("hired".parse::<PlacementStatus>().is_err());
    }

    #[test]
    fn soft_skill_average_rejects_out_of_range() {
        let mut skills = SoftSkillScore {
            id: 1,
            student_id: 1,
            communication: 60,
            teamwork: 70,
            presentation: 80,
            leadership: 50,
            critical_thinking: 90,
            interpersonal_skills: 70,
        };
        assert_eq!(skills.average(), Some(70.0));
        skills.leadership = 140;
        assert_eq!(skills.average(), None);
    }

    #[test]
    fn collapse_keeps_highest_programming_id() {
        let dataset = Dataset {
            students: vec![student(1)],
            programming: vec![programming(7, 1, "SQL", 40), programming(3, 1, "Python", 90)],
            ..Dataset::default()
        };

        let profiles = dataset.profiles();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].programming.as_ref().map(|p| p.id), Some(7));
        assert_eq!(profiles[0].languages, vec!["Python", "SQL"]);
    }

    #[test]
    fn inner_join_drops_students_without_rows() {
        let dataset = Dataset {
            students: vec![student(1), student(2)],
            programming: vec![programming(1, 1, "SQL", 40)],
            ..Dataset::default()
        };
        let plan = JoinPlan {
            programming: JoinKind::Inner,
            ..JoinPlan::outer()
        };

        let rows = dataset.join(&plan);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student.id, 1);
        assert_eq!(dataset.join(&JoinPlan::outer()).len(), 2);
    }

    #[test]
    fn from_rows_undoes_fan_out() {
        let dataset = Dataset {
            students: vec![student(1), student(2)],
            programming: vec![programming(1, 1, "SQL", 40), programming(2, 1, "R", 10)],
            ..Dataset::default()
        };

        let rebuilt = Dataset::from_rows(dataset.join(&JoinPlan::outer()));
        assert_eq!(rebuilt, dataset);
    }

    #[test]
    fn detail_lists_every_programming_row() {
        let dataset = Dataset {
            students: vec![student(1)],
            programming: vec![programming(5, 1, "SQL", 40), programming(2, 1, "R", 10)],
            ..Dataset::default()
        };

        let detail = dataset.detail(1).expect("student exists");
        assert_eq!(detail.programming.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 5]);
        assert!(dataset.detail(9).is_none());
    }

    #[test]
    fn summary_counts_every_status() {
        let mut outlier = programming(3, 2, "Go", -5);
        outlier.latest_project_score = 130;
        let dataset = Dataset {
            students: vec![student(1), student(2)],
            programming: vec![programming(1, 1, "SQL", 40), programming(2, 1, "R", 11), outlier],
            placements: vec![PlacementRecord {
                id: 1,
                student_id: 1,
                mock_interview_score: 70,
                internships_completed: 1,
                placement_status: PlacementStatus::Placed,
                company_name: Some("Infosys".to_string()),
                placement_package: Some(450_000),
                interview_rounds_cleared: 3,
                placement_date: None,
            }],
            ..Dataset::default()
        };

        let summary = dataset.summary();
        assert_eq!(summary.students, 2);
        assert_eq!(summary.programming_records, 3);
        assert_eq!(summary.placement_status.len(), PlacementStatus::ALL.len());
        assert_eq!(summary.placement_status[&PlacementStatus::Placed], 1);
        assert_eq!(summary.placement_status[&PlacementStatus::Ready], 0);
        assert_eq!(summary.avg_problems_solved, Some(25.5));
        assert_eq!(summary.avg_project_score, Some(70.0));

        let json = serde_json::to_value(&summary).expect("json");
        assert_eq!(json["placement_status"]["Not Ready"], 0);

        let empty = Dataset::default().summary();
        assert_eq!(empty.avg_problems_solved, None);
        assert!(empty.placement_status.values().all(|count| *count == 0));
    }
}
