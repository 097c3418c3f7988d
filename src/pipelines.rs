//! Analytics Pipeline Catalog: ten fixed aggregations over the whole
//! dataset. Every pipeline is a pure function of the `Dataset` it is given
//! and recomputes from the source tables, so pipelines can run in any order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::models::{
    score_in_range, Dataset, PlacementRecord, PlacementStatus, SoftSkillScore, StudentProfile,
};
use crate::ranking::{self, descending, round2, Component, Weights};

/// Composite score below which a student gets a recommendation.
pub const IMPROVEMENT_THRESHOLD: f64 = 50.0;

pub const HIGH_PACKAGE: i64 = 1_000_000;
pub const MEDIUM_PACKAGE: i64 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PipelineName {
    TopPlacementReady,
    ProgrammingPerformanceByBatch,
    SoftSkillsDistribution,
    PlacementSuccessByLocation,
    CompanyHiringPatterns,
    ProgrammingLanguageImpact,
    InternshipCorrelation,
    ImprovementRecommendations,
    SkillsGapAnalysis,
    ProgramEffectiveness,
}

impl PipelineName {
    pub const ALL: [PipelineName; 10] = [
        PipelineName::TopPlacementReady,
        PipelineName::ProgrammingPerformanceByBatch,
        PipelineName::SoftSkillsDistribution,
        PipelineName::PlacementSuccessByLocation,
        PipelineName::CompanyHiringPatterns,
        PipelineName::ProgrammingLanguageImpact,
        PipelineName::InternshipCorrelation,
        PipelineName::ImprovementRecommendations,
        PipelineName::SkillsGapAnalysis,
        PipelineName::ProgramEffectiveness,
    ];

    /// Catalog number, starting at 1.
    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn title(self) -> &'static str {
        match self {
            PipelineName::TopPlacementReady => "Top Placement Ready",
            PipelineName::ProgrammingPerformanceByBatch => "Programming Performance by Batch",
            PipelineName::SoftSkillsDistribution => "Soft Skills Distribution",
            PipelineName::PlacementSuccessByLocation => "Placement Success by Location",
            PipelineName::CompanyHiringPatterns => "Company Hiring Patterns",
            PipelineName::ProgrammingLanguageImpact => "Programming Language Impact",
            PipelineName::InternshipCorrelation => "Internship Correlation",
            PipelineName::ImprovementRecommendations => "Improvement Recommendations",
            PipelineName::SkillsGapAnalysis => "Skills Gap Analysis",
            PipelineName::ProgramEffectiveness => "Program Effectiveness",
        }
    }

    pub fn slug(self) -> String {
        self.title().to_ascii_lowercase().replace(' ', "-")
    }
}

impl fmt::Display for PipelineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for PipelineName {
    type Err = CoreError;

    /// Accepts the title, a kebab or snake case slug, or the catalog number.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        PipelineName::ALL
            .into_iter()
            .find(|name| name.slug() == wanted || name.number().to_string() == wanted)
            .ok_or_else(|| CoreError::UnknownField(format!("pipeline '{}'", value.trim())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Int(value) => write!(f, "{value}"),
            Cell::Float(value) => write!(f, "{value:.2}"),
            Cell::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::Int(value.into())
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Cell::Int(value as i64)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<PlacementStatus> for Cell {
    fn from(value: PlacementStatus) -> Self {
        Cell::Text(value.to_string())
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Cell::Null, Into::into)
    }
}

/// Tabular pipeline output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub pipeline: PipelineName,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Cell> {
        let index = self.columns.iter().position(|c| *c == column)?;
        self.rows.get(row)?.get(index)
    }
}

pub trait TableRow {
    const COLUMNS: &'static [&'static str];

    fn cells(&self) -> Vec<Cell>;
}

fn into_table<R: TableRow>(pipeline: PipelineName, rows: &[R]) -> Table {
    Table {
        pipeline,
        columns: R::COLUMNS.to_vec(),
        rows: rows.iter().map(TableRow::cells).collect(),
    }
}

pub fn run_pipeline(name: PipelineName, dataset: &Dataset) -> CoreResult<Table> {
    let table = match name {
        PipelineName::TopPlacementReady => into_table(name, &top_placement_ready(dataset)?),
        PipelineName::ProgrammingPerformanceByBatch => {
            into_table(name, &programming_performance_by_batch(dataset))
        }
        PipelineName::SoftSkillsDistribution => {
            into_table(name, &soft_skills_distribution(dataset))
        }
        PipelineName::PlacementSuccessByLocation => {
            into_table(name, &placement_success_by_location(dataset))
        }
        PipelineName::CompanyHiringPatterns => into_table(name, &company_hiring_patterns(dataset)),
        PipelineName::ProgrammingLanguageImpact => {
            into_table(name, &programming_language_impact(dataset))
        }
        PipelineName::InternshipCorrelation => into_table(name, &internship_correlation(dataset)),
        PipelineName::ImprovementRecommendations => {
            into_table(name, &improvement_recommendations(dataset)?)
        }
        PipelineName::SkillsGapAnalysis => into_table(name, &skills_gap_analysis(dataset)),
        PipelineName::ProgramEffectiveness => {
            into_table(name, std::slice::from_ref(&program_effectiveness(dataset)))
        }
    };
    tracing::debug!(pipeline = %name, rows = table.len(), "pipeline finished");
    Ok(table)
}

fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| round2(sum / count as f64))
}

/// `matching / total`, and 0 for an empty group.
pub fn rate(matching: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        matching as f64 / total as f64
    }
}

/// Values inside the 0..=100 score range.
fn scores<I>(values: I) -> impl Iterator<Item = f64>
where
    I: IntoIterator<Item = i32>,
{
    values
        .into_iter()
        .filter(|v| score_in_range(*v))
        .map(f64::from)
}

/// Students who have a placement record, tallied for rate measures.
#[derive(Default)]
struct PlacementTally<'a> {
    placements: Vec<&'a PlacementRecord>,
    soft_skill_averages: Vec<f64>,
}

impl<'a> PlacementTally<'a> {
    fn add(&mut self, profile: &'a StudentProfile) {
        if let Some(placement) = profile.placement.as_ref() {
            self.placements.push(placement);
            self.soft_skill_averages.extend(profile.soft_skill_average());
        }
    }

    fn students(&self) -> usize {
        self.placements.len()
    }

    fn placed(&self) -> usize {
        self.placements.iter().filter(|p| p.is_placed()).count()
    }

    fn rate(&self) -> f64 {
        rate(self.placed(), self.students())
    }

    fn avg_package(&self) -> Option<f64> {
        mean(
            self.placements
                .iter()
                .filter(|p| p.is_placed())
                .filter_map(|p| p.placement_package)
                .map(|package| package as f64),
        )
    }

    fn avg_mock_interview(&self) -> Option<f64> {
        mean(scores(self.placements.iter().map(|p| p.mock_interview_score)))
    }

    fn avg_soft_skills(&self) -> Option<f64> {
        mean(self.soft_skill_averages.iter().copied())
    }
}

// 1. Top Placement Ready

#[derive(Debug, Clone, PartialEq)]
pub struct TopReadyRow {
    pub rank: usize,
    pub student_id: i64,
    pub name: String,
    pub course_batch: String,
    pub city: String,
    pub placement_status: Option<PlacementStatus>,
    pub mock_interview_score: Option<i32>,
    pub soft_skill_avg: Option<f64>,
    pub problems_solved: Option<i32>,
    pub score: f64,
}

impl TableRow for TopReadyRow {
    const COLUMNS: &'static [&'static str] = &[
        "rank",
        "student_id",
        "name",
        "course_batch",
        "city",
        "placement_status",
        "mock_interview_score",
        "soft_skill_avg",
        "problems_solved",
        "score",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.rank.into(),
            self.student_id.into(),
            self.name.as_str().into(),
            self.course_batch.as_str().into(),
            self.city.as_str().into(),
            self.placement_status.into(),
            self.mock_interview_score.into(),
            self.soft_skill_avg.map(round2).into(),
            self.problems_solved.into(),
            self.score.into(),
        ]
    }
}

/// Ready or placed students ranked with the default weights.
pub fn top_placement_ready(dataset: &Dataset) -> CoreResult<Vec<TopReadyRow>> {
    let candidates: Vec<StudentProfile> = dataset
        .profiles()
        .into_iter()
        .filter(|p| {
            matches!(
                p.placement_status(),
                Some(PlacementStatus::Ready | PlacementStatus::Placed)
            )
        })
        .collect();

    Ok(ranking::rank(&candidates, &Weights::default())?
        .into_iter()
        .map(|ranked| TopReadyRow {
            rank: ranked.rank,
            student_id: ranked.profile.student_id(),
            placement_status: ranked.profile.placement_status(),
            mock_interview_score: ranked.profile.mock_interview_score(),
            soft_skill_avg: ranked.profile.soft_skill_average(),
            problems_solved: ranked.profile.problems_solved(),
            score: ranked.score,
            name: ranked.profile.student.name,
            course_batch: ranked.profile.student.course_batch,
            city: ranked.profile.student.city,
        })
        .collect())
}

// 2. Programming Performance by Batch

#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgrammingRow {
    pub course_batch: String,
    pub students: usize,
    pub programming_records: usize,
    pub avg_problems_solved: Option<f64>,
    pub avg_project_score: Option<f64>,
    pub avg_assessments: Option<f64>,
    pub avg_mini_projects: Option<f64>,
    pub min_problems_solved: Option<i32>,
    pub max_problems_solved: Option<i32>,
}

impl TableRow for BatchProgrammingRow {
    const COLUMNS: &'static [&'static str] = &[
        "course_batch",
        "students",
        "programming_records",
        "avg_problems_solved",
        "avg_project_score",
        "avg_assessments",
        "avg_mini_projects",
        "min_problems_solved",
        "max_problems_solved",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.course_batch.as_str().into(),
            self.students.into(),
            self.programming_records.into(),
            self.avg_problems_solved.into(),
            self.avg_project_score.into(),
            self.avg_assessments.into(),
            self.avg_mini_projects.into(),
            self.min_problems_solved.into(),
            self.max_problems_solved.into(),
        ]
    }
}

/// Averages over every programming record of the batch's students.
pub fn programming_performance_by_batch(dataset: &Dataset) -> Vec<BatchProgrammingRow> {
    let batch_of: HashMap<i64, &str> = dataset
        .students
        .iter()
        .map(|s| (s.id, s.course_batch.as_str()))
        .collect();

    let mut students: BTreeMap<&str, usize> = BTreeMap::new();
    for student in &dataset.students {
        *students.entry(student.course_batch.as_str()).or_default() += 1;
    }

    let mut records: BTreeMap<&str, Vec<_>> = BTreeMap::new();
    for record in &dataset.programming {
        if let Some(batch) = batch_of.get(&record.student_id) {
            records.entry(*batch).or_default().push(record);
        }
    }

    students
        .into_iter()
        .map(|(batch, count)| {
            let rows = records.get(batch).map(Vec::as_slice).unwrap_or_default();
            let problems = || rows.iter().map(|r| r.problems_solved).filter(|v| *v >= 0);
            BatchProgrammingRow {
                course_batch: batch.to_string(),
                students: count,
                programming_records: rows.len(),
                avg_problems_solved: mean(problems().map(f64::from)),
                avg_project_score: mean(scores(rows.iter().map(|r| r.latest_project_score))),
                avg_assessments: mean(rows.iter().map(|r| f64::from(r.assessments_completed))),
                avg_mini_projects: mean(rows.iter().map(|r| f64::from(r.mini_projects))),
                min_problems_solved: problems().min(),
                max_problems_solved: problems().max(),
            }
        })
        .collect()
}

// 3. Soft Skills Distribution

pub const ALL_BATCHES: &str = "All";

#[derive(Debug, Clone, PartialEq)]
pub struct SoftSkillRow {
    /// `ALL_BATCHES` for the global rows, otherwise a course batch.
    pub scope: String,
    pub skill: &'static str,
    pub average: f64,
    pub students: usize,
}

impl TableRow for SoftSkillRow {
    const COLUMNS: &'static [&'static str] = &["scope", "skill", "average", "students"];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.scope.as_str().into(),
            self.skill.into(),
            self.average.into(),
            self.students.into(),
        ]
    }
}

/// Per-skill averages, globally and per batch, in skill name order.
pub fn soft_skills_distribution(dataset: &Dataset) -> Vec<SoftSkillRow> {
    let profiles = dataset.profiles();
    let mut scopes: BTreeMap<&str, Vec<&SoftSkillScore>> = BTreeMap::new();
    let mut global = Vec::new();

    for profile in &profiles {
        if let Some(skills) = profile.soft_skills.as_ref() {
            global.push(skills);
            scopes
                .entry(profile.student.course_batch.as_str())
                .or_default()
                .push(skills);
        }
    }

    let mut rows = Vec::new();
    let groups = std::iter::once((ALL_BATCHES, global)).chain(scopes);
    for (scope, group) in groups {
        if group.is_empty() {
            continue;
        }
        for (index, skill) in SoftSkillScore::SKILLS.into_iter().enumerate() {
            let values: Vec<f64> = scores(group.iter().map(|s| s.skills()[index].1)).collect();
            if let Some(average) = mean(values.iter().copied()) {
                rows.push(SoftSkillRow {
                    scope: scope.to_string(),
                    skill,
                    average,
                    students: values.len(),
                });
            }
        }
    }
    rows
}

// 4. Placement Success by Location

#[derive(Debug, Clone, PartialEq)]
pub struct LocationRow {
    pub city: String,
    pub students: usize,
    pub placed: usize,
    pub placement_rate: f64,
    pub avg_package: Option<f64>,
    pub avg_mock_interview: Option<f64>,
}

impl TableRow for LocationRow {
    const COLUMNS: &'static [&'static str] = &[
        "city",
        "students",
        "placed",
        "placement_rate",
        "avg_package",
        "avg_mock_interview",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.city.as_str().into(),
            self.students.into(),
            self.placed.into(),
            self.placement_rate.into(),
            self.avg_package.into(),
            self.avg_mock_interview.into(),
        ]
    }
}

pub fn placement_success_by_location(dataset: &Dataset) -> Vec<LocationRow> {
    let profiles = dataset.profiles();
    let mut cities: BTreeMap<&str, PlacementTally> = BTreeMap::new();
    for profile in profiles.iter().filter(|p| p.placement.is_some()) {
        cities
            .entry(profile.student.city.as_str())
            .or_default()
            .add(profile);
    }

    let mut rows: Vec<LocationRow> = cities
        .into_iter()
        .map(|(city, tally)| LocationRow {
            city: city.to_string(),
            students: tally.students(),
            placed: tally.placed(),
            placement_rate: tally.rate(),
            avg_package: tally.avg_package(),
            avg_mock_interview: tally.avg_mock_interview(),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.placement_rate
            .total_cmp(&a.placement_rate)
            .then_with(|| descending(a.avg_package, b.avg_package))
            .then_with(|| a.city.cmp(&b.city))
    });
    rows
}

// 5. Company Hiring Patterns

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyRow {
    pub company: String,
    pub hires: usize,
    pub avg_package: Option<f64>,
    pub min_package: Option<i64>,
    pub max_package: Option<i64>,
    pub avg_mock_interview: Option<f64>,
    pub avg_rounds_cleared: Option<f64>,
    pub avg_soft_skills: Option<f64>,
}

impl TableRow for CompanyRow {
    const COLUMNS: &'static [&'static str] = &[
        "company",
        "hires",
        "avg_package",
        "min_package",
        "max_package",
        "avg_mock_interview",
        "avg_rounds_cleared",
        "avg_soft_skills",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.company.as_str().into(),
            self.hires.into(),
            self.avg_package.into(),
            self.min_package.into(),
            self.max_package.into(),
            self.avg_mock_interview.into(),
            self.avg_rounds_cleared.into(),
            self.avg_soft_skills.into(),
        ]
    }
}

/// Placed students grouped by employer.
pub fn company_hiring_patterns(dataset: &Dataset) -> Vec<CompanyRow> {
    let profiles = dataset.profiles();
    let mut companies: BTreeMap<&str, Vec<&StudentProfile>> = BTreeMap::new();
    for profile in &profiles {
        let Some(placement) = profile.placement.as_ref().filter(|p| p.is_placed()) else {
            continue;
        };
        if let Some(company) = placement.company_name.as_deref().map(str::trim) {
            if !company.is_empty() {
                companies.entry(company).or_default().push(profile);
            }
        }
    }

    let mut rows: Vec<CompanyRow> = companies
        .into_iter()
        .map(|(company, hires)| {
            let placements: Vec<&PlacementRecord> =
                hires.iter().filter_map(|p| p.placement.as_ref()).collect();
            let packages = || placements.iter().filter_map(|p| p.placement_package);
            CompanyRow {
                company: company.to_string(),
                hires: hires.len(),
                avg_package: mean(packages().map(|v| v as f64)),
                min_package: packages().min(),
                max_package: packages().max(),
                avg_mock_interview: mean(scores(placements.iter().map(|p| p.mock_interview_score))),
                avg_rounds_cleared: mean(
                    placements
                        .iter()
                        .map(|p| p.interview_rounds_cleared)
                        .filter(|v| *v >= 0)
                        .map(f64::from),
                ),
                avg_soft_skills: mean(hires.iter().filter_map(|p| p.soft_skill_average())),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.hires
            .cmp(&a.hires)
            .then_with(|| descending(a.avg_package, b.avg_package))
            .then_with(|| a.company.cmp(&b.company))
    });
    rows
}

// 6. Programming Language Impact

#[derive(Debug, Clone, PartialEq)]
pub struct LanguageRow {
    pub language: String,
    pub students: usize,
    pub placed: usize,
    pub placement_rate: f64,
    pub avg_problems_solved: Option<f64>,
    pub avg_project_score: Option<f64>,
    pub avg_package: Option<f64>,
}

impl TableRow for LanguageRow {
    const COLUMNS: &'static [&'static str] = &[
        "language",
        "students",
        "placed",
        "placement_rate",
        "avg_problems_solved",
        "avg_project_score",
        "avg_package",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.language.as_str().into(),
            self.students.into(),
            self.placed.into(),
            self.placement_rate.into(),
            self.avg_problems_solved.into(),
            self.avg_project_score.into(),
            self.avg_package.into(),
        ]
    }
}

/// Placement rate among students (with a placement record) who have a
/// programming record in each language.
pub fn programming_language_impact(dataset: &Dataset) -> Vec<LanguageRow> {
    let profiles = dataset.profiles();
    let placement_of: HashMap<i64, &PlacementRecord> = profiles
        .iter()
        .filter_map(|p| p.placement.as_ref().map(|placement| (p.student_id(), placement)))
        .collect();

    let mut languages: BTreeMap<&str, (BTreeSet<i64>, Vec<_>)> = BTreeMap::new();
    for record in &dataset.programming {
        if placement_of.contains_key(&record.student_id) {
            let (students, records) = languages.entry(record.language.as_str()).or_default();
            students.insert(record.student_id);
            records.push(record);
        }
    }

    let mut rows: Vec<LanguageRow> = languages
        .into_iter()
        .map(|(language, (students, records))| {
            let placed: Vec<&PlacementRecord> = students
                .iter()
                .filter_map(|id| placement_of.get(id).copied())
                .filter(|p| p.is_placed())
                .collect();
            LanguageRow {
                language: language.to_string(),
                students: students.len(),
                placed: placed.len(),
                placement_rate: rate(placed.len(), students.len()),
                avg_problems_solved: mean(
                    records
                        .iter()
                        .map(|r| r.problems_solved)
                        .filter(|v| *v >= 0)
                        .map(f64::from),
                ),
                avg_project_score: mean(scores(records.iter().map(|r| r.latest_project_score))),
                avg_package: mean(
                    placed
                        .iter()
                        .filter_map(|p| p.placement_package)
                        .map(|v| v as f64),
                ),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.placement_rate
            .total_cmp(&a.placement_rate)
            .then_with(|| a.language.cmp(&b.language))
    });
    rows
}

// 7. Internship Correlation

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum InternshipBucket {
    None,
    One,
    Two,
    ThreeOrMore,
}

impl InternshipBucket {
    pub fn of(internships: i32) -> Option<InternshipBucket> {
        match internships {
            0 => Some(InternshipBucket::None),
            1 => Some(InternshipBucket::One),
            2 => Some(InternshipBucket::Two),
            n if n >= 3 => Some(InternshipBucket::ThreeOrMore),
            _ => None,
        }
    }
}

impl fmt::Display for InternshipBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InternshipBucket::None => "0",
            InternshipBucket::One => "1",
            InternshipBucket::Two => "2",
            InternshipBucket::ThreeOrMore => "3+",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InternshipRow {
    pub bucket: InternshipBucket,
    pub students: usize,
    pub placed: usize,
    pub placement_rate: f64,
    pub avg_mock_interview: Option<f64>,
    pub avg_package: Option<f64>,
    pub avg_soft_skills: Option<f64>,
}

impl TableRow for InternshipRow {
    const COLUMNS: &'static [&'static str] = &[
        "internships",
        "students",
        "placed",
        "placement_rate",
        "avg_mock_interview",
        "avg_package",
        "avg_soft_skills",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.bucket.to_string().into(),
            self.students.into(),
            self.placed.into(),
            self.placement_rate.into(),
            self.avg_mock_interview.into(),
            self.avg_package.into(),
            self.avg_soft_skills.into(),
        ]
    }
}

pub fn internship_correlation(dataset: &Dataset) -> Vec<InternshipRow> {
    let profiles = dataset.profiles();
    let mut buckets: BTreeMap<InternshipBucket, PlacementTally> = BTreeMap::new();
    for profile in &profiles {
        if let Some(bucket) = profile.internships_completed().and_then(InternshipBucket::of) {
            buckets.entry(bucket).or_default().add(profile);
        }
    }

    buckets
        .into_iter()
        .map(|(bucket, tally)| InternshipRow {
            bucket,
            students: tally.students(),
            placed: tally.placed(),
            placement_rate: tally.rate(),
            avg_mock_interview: tally.avg_mock_interview(),
            avg_package: tally.avg_package(),
            avg_soft_skills: tally.avg_soft_skills(),
        })
        .collect()
}

// 8. Improvement Recommendations

#[derive(Debug, Clone, PartialEq)]
pub struct ImprovementRow {
    pub student_id: i64,
    pub name: String,
    pub course_batch: String,
    pub placement_status: Option<PlacementStatus>,
    pub score: f64,
    pub weakest_component: Option<Component>,
    pub weakest_value: Option<f64>,
    pub improvement_area: &'static str,
}

impl TableRow for ImprovementRow {
    const COLUMNS: &'static [&'static str] = &[
        "student_id",
        "name",
        "course_batch",
        "placement_status",
        "score",
        "weakest_component",
        "weakest_value",
        "improvement_area",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.student_id.into(),
            self.name.as_str().into(),
            self.course_batch.as_str().into(),
            self.placement_status.into(),
            self.score.into(),
            self.weakest_component.map(Component::name).into(),
            self.weakest_value.map(round2).into(),
            self.improvement_area.into(),
        ]
    }
}

/// Students whose default-weight composite is under
/// `IMPROVEMENT_THRESHOLD`, with the component dragging them down most.
pub fn improvement_recommendations(dataset: &Dataset) -> CoreResult<Vec<ImprovementRow>> {
    let ranked = ranking::rank(&dataset.profiles(), &Weights::default())?;

    let mut rows: Vec<ImprovementRow> = ranked
        .into_iter()
        .filter(|r| r.score < IMPROVEMENT_THRESHOLD)
        .map(|r| {
            let weakest = r.components.weakest();
            ImprovementRow {
                student_id: r.profile.student_id(),
                placement_status: r.profile.placement_status(),
                score: r.score,
                weakest_component: weakest.map(|(component, _)| component),
                weakest_value: weakest.map(|(_, value)| value),
                improvement_area: weakest
                    .map_or("Incomplete Profile", |(component, _)| component.improvement_area()),
                name: r.profile.student.name,
                course_batch: r.profile.student.course_batch,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });
    Ok(rows)
}

// 9. Skills Gap Analysis

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PackageBand {
    Entry,
    Medium,
    High,
}

impl PackageBand {
    pub fn of(package: i64) -> Option<PackageBand> {
        match package {
            p if p < 0 => None,
            p if p < MEDIUM_PACKAGE => Some(PackageBand::Entry),
            p if p < HIGH_PACKAGE => Some(PackageBand::Medium),
            _ => Some(PackageBand::High),
        }
    }
}

impl fmt::Display for PackageBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PackageBand::Entry => "Entry Package (<5L)",
            PackageBand::Medium => "Medium Package (5-10L)",
            PackageBand::High => "High Package (10L+)",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkillsGapRow {
    pub band: PackageBand,
    pub students: usize,
    /// Averages in `SoftSkillScore::SKILLS` order.
    pub skills: [Option<f64>; 6],
    pub avg_mock_interview: Option<f64>,
    pub avg_problems_solved: Option<f64>,
    pub avg_project_score: Option<f64>,
    pub avg_rounds_cleared: Option<f64>,
}

impl TableRow for SkillsGapRow {
    const COLUMNS: &'static [&'static str] = &[
        "package_band",
        "students",
        "avg_communication",
        "avg_critical_thinking",
        "avg_interpersonal_skills",
        "avg_leadership",
        "avg_presentation",
        "avg_teamwork",
        "avg_mock_interview",
        "avg_problems_solved",
        "avg_project_score",
        "avg_rounds_cleared",
    ];

    fn cells(&self) -> Vec<Cell> {
        let mut cells: Vec<Cell> = vec![self.band.to_string().into(), self.students.into()];
        cells.extend(self.skills.iter().map(|value| Cell::from(*value)));
        cells.extend([
            Cell::from(self.avg_mock_interview),
            Cell::from(self.avg_problems_solved),
            Cell::from(self.avg_project_score),
            Cell::from(self.avg_rounds_cleared),
        ]);
        cells
    }
}

/// Skill profile of placed students per package band.
pub fn skills_gap_analysis(dataset: &Dataset) -> Vec<SkillsGapRow> {
    let profiles = dataset.profiles();
    let mut bands: BTreeMap<PackageBand, Vec<&StudentProfile>> = BTreeMap::new();
    for profile in &profiles {
        let band = profile
            .placement
            .as_ref()
            .filter(|p| p.is_placed())
            .and_then(|p| p.placement_package)
            .and_then(PackageBand::of);
        if let Some(band) = band {
            bands.entry(band).or_default().push(profile);
        }
    }

    bands
        .into_iter()
        .map(|(band, group)| {
            let soft: Vec<&SoftSkillScore> =
                group.iter().filter_map(|p| p.soft_skills.as_ref()).collect();
            let mut skills = [None; 6];
            for (index, slot) in skills.iter_mut().enumerate() {
                *slot = mean(scores(soft.iter().map(|s| s.skills()[index].1)));
            }
            SkillsGapRow {
                band,
                students: group.len(),
                skills,
                avg_mock_interview: mean(scores(group.iter().filter_map(|p| p.mock_interview_score()))),
                avg_problems_solved: mean(
                    group
                        .iter()
                        .filter_map(|p| p.problems_solved())
                        .filter(|v| *v >= 0)
                        .map(f64::from),
                ),
                avg_project_score: mean(scores(group.iter().filter_map(|p| p.project_score()))),
                avg_rounds_cleared: mean(
                    group
                        .iter()
                        .filter_map(|p| p.placement.as_ref())
                        .map(|p| p.interview_rounds_cleared)
                        .filter(|v| *v >= 0)
                        .map(f64::from),
                ),
            }
        })
        .collect()
}

// 10. Program Effectiveness

#[derive(Debug, Clone, PartialEq)]
pub struct EffectivenessRow {
    pub students: usize,
    pub students_with_placement: usize,
    pub placed: usize,
    pub placement_rate: f64,
    pub avg_package: Option<f64>,
    pub avg_mock_interview: Option<f64>,
    pub avg_soft_skills: Option<f64>,
    pub avg_problems_solved: Option<f64>,
    pub avg_project_score: Option<f64>,
    pub hiring_companies: usize,
    pub best_batch: Option<String>,
    pub top_company: Option<String>,
}

impl TableRow for EffectivenessRow {
    const COLUMNS: &'static [&'static str] = &[
        "students",
        "students_with_placement",
        "placed",
        "placement_rate",
        "avg_package",
        "avg_mock_interview",
        "avg_soft_skills",
        "avg_problems_solved",
        "avg_project_score",
        "hiring_companies",
        "best_batch",
        "top_company",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.students.into(),
            self.students_with_placement.into(),
            self.placed.into(),
            self.placement_rate.into(),
            self.avg_package.into(),
            self.avg_mock_interview.into(),
            self.avg_soft_skills.into(),
            self.avg_problems_solved.into(),
            self.avg_project_score.into(),
            self.hiring_companies.into(),
            self.best_batch.clone().into(),
            self.top_company.clone().into(),
        ]
    }
}

/// Single summary row. An empty dataset yields zero counts and rate 0.
pub fn program_effectiveness(dataset: &Dataset) -> EffectivenessRow {
    let profiles = dataset.profiles();
    let mut overall = PlacementTally::default();
    let mut batches: BTreeMap<&str, PlacementTally> = BTreeMap::new();
    for profile in &profiles {
        overall.add(profile);
        if profile.placement.is_some() {
            batches
                .entry(profile.student.course_batch.as_str())
                .or_default()
                .add(profile);
        }
    }

    // BTreeMap order makes the earliest batch win a tie
    let best_batch = batches
        .iter()
        .fold(None::<(&str, f64)>, |best, (batch, tally)| match best {
            Some((_, best_rate)) if best_rate >= tally.rate() => best,
            _ => Some((*batch, tally.rate())),
        })
        .map(|(batch, _)| batch.to_string());

    let companies = company_hiring_patterns(dataset);
    let student_ids: BTreeSet<i64> = dataset.students.iter().map(|s| s.id).collect();
    let programming: Vec<_> = dataset
        .programming
        .iter()
        .filter(|r| student_ids.contains(&r.student_id))
        .collect();

    EffectivenessRow {
        students: profiles.len(),
        students_with_placement: overall.students(),
        placed: overall.placed(),
        placement_rate: overall.rate(),
        avg_package: overall.avg_package(),
        avg_mock_interview: overall.avg_mock_interview(),
        avg_soft_skills: mean(profiles.iter().filter_map(StudentProfile::soft_skill_average)),
        avg_problems_solved: mean(
            programming
                .iter()
                .map(|r| r.problems_solved)
                .filter(|v| *v >= 0)
                .map(f64::from),
        ),
        avg_project_score: mean(scores(programming.iter().map(|r| r.latest_project_score))),
        hiring_companies: companies.len(),
        top_company: companies.first().map(|row| row.company.clone()),
        best_batch,
    }
}
