use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::models::{score_in_range, StudentProfile};

/// Allowed distance of the weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Component {
    ProblemsSolved,
    ProjectScore,
    SoftSkillAverage,
    MockInterviewScore,
    InternshipsCompleted,
    CertificationsEarned,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::ProblemsSolved,
        Component::ProjectScore,
        Component::SoftSkillAverage,
        Component::MockInterviewScore,
        Component::InternshipsCompleted,
        Component::CertificationsEarned,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Component::ProblemsSolved => "problems_solved",
            Component::ProjectScore => "project_score",
            Component::SoftSkillAverage => "soft_skill_avg",
            Component::MockInterviewScore => "mock_interview_score",
            Component::InternshipsCompleted => "internships_completed",
            Component::CertificationsEarned => "certifications_earned",
        }
    }

    pub fn from_name(name: &str) -> Option<Component> {
        Component::ALL.into_iter().find(|c| c.name() == name.trim())
    }

    /// Count components are min-max normalized across the ranked set;
    /// the others are already 0-100 scores.
    pub fn is_count(self) -> bool {
        matches!(
            self,
            Component::ProblemsSolved
                | Component::InternshipsCompleted
                | Component::CertificationsEarned
        )
    }

    pub fn improvement_area(self) -> &'static str {
        match self {
            Component::ProblemsSolved => "Programming Practice",
            Component::ProjectScore => "Project Work",
            Component::SoftSkillAverage => "Soft Skills",
            Component::MockInterviewScore => "Interview Skills",
            Component::InternshipsCompleted => "Practical Experience",
            Component::CertificationsEarned => "Certifications",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Raw value, or `None` when absent, negative or (for scores) above 100.
    fn raw(self, profile: &StudentProfile) -> Option<f64> {
        let count = |value: Option<i32>| value.filter(|v| *v >= 0).map(f64::from);
        let score = |value: Option<i32>| value.filter(|v| score_in_range(*v)).map(f64::from);
        match self {
            Component::ProblemsSolved => count(profile.problems_solved()),
            Component::ProjectScore => score(profile.project_score()),
            Component::SoftSkillAverage => profile.soft_skill_average(),
            Component::MockInterviewScore => score(profile.mock_interview_score()),
            Component::InternshipsCompleted => count(profile.internships_completed()),
            Component::CertificationsEarned => count(profile.certifications_earned()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weights {
    pub problems_solved: f64,
    pub project_score: f64,
    pub soft_skill_avg: f64,
    pub mock_interview_score: f64,
    pub internships_completed: f64,
    pub certifications_earned: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Weights {
            problems_solved: 0.15,
            project_score: 0.15,
            soft_skill_avg: 0.20,
            mock_interview_score: 0.25,
            internships_completed: 0.15,
            certifications_earned: 0.10,
        }
    }
}

impl Weights {
    pub fn zero() -> Self {
        Weights {
            problems_solved: 0.0,
            project_score: 0.0,
            soft_skill_avg: 0.0,
            mock_interview_score: 0.0,
            internships_completed: 0.0,
            certifications_earned: 0.0,
        }
    }

    pub fn get(&self, component: Component) -> f64 {
        match component {
            Component::ProblemsSolved => self.problems_solved,
            Component::ProjectScore => self.project_score,
            Component::SoftSkillAverage => self.soft_skill_avg,
            Component::MockInterviewScore => self.mock_interview_score,
            Component::InternshipsCompleted => self.internships_completed,
            Component::CertificationsEarned => self.certifications_earned,
        }
    }

    fn set(&mut self, component: Component, weight: f64) {
        match component {
            Component::ProblemsSolved => self.problems_solved = weight,
            Component::ProjectScore => self.project_score = weight,
            Component::SoftSkillAverage => self.soft_skill_avg = weight,
            Component::MockInterviewScore => self.mock_interview_score = weight,
            Component::InternshipsCompleted => self.internships_completed = weight,
            Component::CertificationsEarned => self.certifications_earned = weight,
        }
    }

    /// Named weights; components not mentioned weigh nothing.
    pub fn from_pairs<I, K>(pairs: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut weights = Weights::zero();
        for (name, weight) in pairs {
            let component = Component::from_name(name.as_ref()).ok_or_else(|| {
                CoreError::InvalidWeights(format!("unknown component '{}'", name.as_ref()))
            })?;
            weights.set(component, weight);
        }
        weights.validate()?;
        Ok(weights)
    }

    pub fn from_json(value: &Value) -> CoreResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            CoreError::InvalidWeights("weights must be a JSON object".to_string())
        })?;
        let pairs = object
            .iter()
            .map(|(name, weight)| {
                weight.as_f64().map(|w| (name.as_str(), w)).ok_or_else(|| {
                    CoreError::InvalidWeights(format!("weight for '{name}' must be a number"))
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Weights::from_pairs(pairs)
    }

    pub fn validate(&self) -> CoreResult<()> {
        for component in Component::ALL {
            let weight = self.get(component);
            if !weight.is_finite() || weight < 0.0 {
                return Err(CoreError::InvalidWeights(format!(
                    "{} must be a non-negative number (got {weight})",
                    component.name()
                )));
            }
        }

        let sum: f64 = Component::ALL.iter().map(|c| self.get(*c)).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(CoreError::InvalidWeights(format!(
                "weights must sum to 1.0 (got {sum})"
            )));
        }
        Ok(())
    }
}

/// Normalized 0-100 value per component; `None` where the student has no
/// usable value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComponentScores([Option<f64>; 6]);

impl ComponentScores {
    pub fn get(&self, component: Component) -> Option<f64> {
        self.0[component.index()]
    }

    /// Lowest present component; ties go to the earlier component.
    pub fn weakest(&self) -> Option<(Component, f64)> {
        Component::ALL
            .into_iter()
            .filter_map(|c| self.get(c).map(|value| (c, value)))
            .fold(None, |weakest, (c, value)| match weakest {
                Some((_, lowest)) if lowest <= value => weakest,
                _ => Some((c, value)),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStudent {
    pub rank: usize,
    pub profile: StudentProfile,
    pub score: f64,
    pub components: ComponentScores,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Descending order with absent values last.
pub fn descending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Ranks students by weighted readiness. Pure: the same students and weights
/// always produce the same ordering and scores.
///
/// Count components are min-max normalized over `students`; when every
/// present value is equal (including a single student) they normalize to
/// 100. Components a student lacks are left out and the remaining weights
/// are rescaled to sum to one; with nothing weighted left the score is 0.
/// Ties are broken by mock interview score (descending) and student id.
pub fn rank(students: &[StudentProfile], weights: &Weights) -> CoreResult<Vec<RankedStudent>> {
    weights.validate()?;

    let mut ranges: [Option<(f64, f64)>; 6] = [None; 6];
    for component in Component::ALL.into_iter().filter(|c| c.is_count()) {
        ranges[component.index()] = students
            .iter()
            .filter_map(|s| component.raw(s))
            .fold(None, |range, value| match range {
                None => Some((value, value)),
                Some((min, max)) => Some((f64::min(min, value), f64::max(max, value))),
            });
    }

    let mut ranked: Vec<RankedStudent> = students
        .iter()
        .map(|profile| {
            let mut components = ComponentScores::default();
            let mut weighted = 0.0;
            let mut total_weight = 0.0;

            for component in Component::ALL {
                let Some(raw) = component.raw(profile) else {
                    continue;
                };
                let normalized = if component.is_count() {
                    match ranges[component.index()] {
                        Some((min, max)) if max > min => (raw - min) / (max - min) * 100.0,
                        _ => 100.0,
                    }
                } else {
                    raw
                };
                components.0[component.index()] = Some(normalized);

                let weight = weights.get(component);
                weighted += weight * normalized;
                total_weight += weight;
            }

            let score = if total_weight > 0.0 {
                round2(weighted / total_weight)
            } else {
                0.0
            };

            RankedStudent {
                rank: 0,
                profile: profile.clone(),
                score,
                components,
            }
        })
        .collect();

    ranked.sort_by(compare_ranked);
    for (index, entry) in ranked.iter_mut().enumerate() {
        entry.rank = index + 1;
    }

    tracing::debug!(students = ranked.len(), "ranked students");
    Ok(ranked)
}

fn compare_ranked(a: &RankedStudent, b: &RankedStudent) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            descending(
                Component::MockInterviewScore.raw(&a.profile),
                Component::MockInterviewScore.raw(&b.profile),
            )
        })
        .then_with(|| a.profile.student_id().cmp(&b.profile.student_id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlacementRecord, PlacementStatus, ProgrammingRecord, SoftSkillScore, Student};

    fn profile(id: i64, problems: Option<i32>, mock: Option<i32>) -> StudentProfile {
        StudentProfile {
            student: Student {
                id,
                name: format!("Student {id}"),
                age: None,
                gender: None,
                email: format!("s{id}@example.com"),
                phone: None,
                enrollment_year: None,
                course_batch: "DS_2023_B".to_string(),
                city: "Kolkata".to_string(),
                graduation_year: None,
            },
            programming: problems.map(|problems_solved| ProgrammingRecord {
                id: id * 10,
                student_id: id,
                language: "Python".to_string(),
                problems_solved,
                assessments_completed: 5,
                mini_projects: 2,
                certifications_earned: 1,
                latest_project_score: 70,
            }),
            languages: vec!["Python".to_string()],
            soft_skills: None,
            placement: mock.map(|mock_interview_score| PlacementRecord {
                id: id * 100,
                student_id: id,
                mock_interview_score,
                internships_completed: 1,
                placement_status: PlacementStatus::Ready,
                company_name: None,
                placement_package: None,
                interview_rounds_cleared: 1,
                placement_date: None,
            }),
        }
    }

    fn only(component: &str) -> Weights {
        Weights::from_pairs([(component, 1.0)]).expect("single weight is valid")
    }

    #[test]
    fn default_weights_are_valid() {
        assert!(Weights::default().validate().is_ok());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = Weights::from_pairs([("problems_solved", 0.5), ("project_score", 0.4)])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidWeights(_)));

        let err = Weights::from_pairs([("problems_solved", 1.5), ("project_score", -0.5)])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidWeights(_)));

        let err = Weights::from_pairs([("gpa", 1.0)]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidWeights(_)));
    }

    #[test]
    fn count_components_are_min_max_normalized() {
        let students = vec![profile(1, Some(10), Some(50)), profile(2, Some(90), Some(50))];
        let ranked = rank(&students, &only("problems_solved")).expect("rank");

        assert_eq!(ranked[0].profile.student_id(), 2);
        assert_eq!(ranked[0].score, 100.0);
        assert_eq!(ranked[1].score, 0.0);
        assert_eq!(ranked[1].components.get(Component::ProblemsSolved), Some(0.0));
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn single_student_normalizes_to_top() {
        let ranked = rank(&[profile(1, Some(42), Some(70))], &Weights::default()).expect("rank");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].components.get(Component::ProblemsSolved), Some(100.0));
        assert!(rank(&[], &Weights::default()).expect("rank").is_empty());
    }

    #[test]
    fn ties_break_on_mock_score_then_id() {
        let students = vec![
            profile(3, Some(20), Some(60)),
            profile(1, Some(20), Some(60)),
            profile(2, Some(20), Some(80)),
        ];
        let ranked = rank(&students, &only("problems_solved")).expect("rank");
        let ids: Vec<i64> = ranked.iter().map(|r| r.profile.student_id()).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn out_of_range_mock_score_does_not_win_ties() {
        let students = vec![profile(2, Some(20), Some(140)), profile(1, Some(20), Some(100))];
        let ranked = rank(&students, &only("problems_solved")).expect("rank");
        let order: Vec<(i64, f64)> = ranked
            .iter()
            .map(|r| (r.profile.student_id(), r.score))
            .collect();
        assert_eq!(order, vec![(1, 100.0), (2, 100.0)]);
    }

    #[test]
    fn missing_components_redistribute_weight() {
        let weights = Weights::from_pairs([("mock_interview_score", 0.5), ("soft_skill_avg", 0.5)])
            .expect("valid");
        let ranked = rank(&[profile(1, None, Some(80))], &weights).expect("rank");
        assert_eq!(ranked[0].score, 80.0);
        assert_eq!(ranked[0].components.get(Component::SoftSkillAverage), None);

        let mut with_skills = profile(2, None, Some(80));
        with_skills.soft_skills = Some(SoftSkillScore {
            id: 1,
            student_id: 2,
            communication: 40,
            teamwork: 40,
            presentation: 40,
            leadership: 40,
            critical_thinking: 40,
            interpersonal_skills: 40,
        });
        let ranked = rank(&[with_skills], &weights).expect("rank");
        assert_eq!(ranked[0].score, 60.0);
    }

    #[test]
    fn nothing_weighted_scores_zero() {
        let ranked = rank(&[profile(1, None, None)], &Weights::default()).expect("rank");
        assert_eq!(ranked[0].score, 0.0);
        assert_eq!(ranked[0].components.weakest(), None);
    }

    #[test]
    fn out_of_range_scores_are_ignored() {
        let ranked = rank(&[profile(1, None, Some(140))], &only("mock_interview_score"))
            .expect("rank");
        assert_eq!(ranked[0].score, 0.0);
        assert_eq!(ranked[0].components.get(Component::MockInterviewScore), None);
    }

    #[test]
    fn weakest_component_prefers_lowest_value() {
        let students = vec![profile(1, Some(10), Some(45)), profile(2, Some(90), Some(95))];
        let ranked = rank(&students, &Weights::default()).expect("rank");
        let low = ranked.iter().find(|r| r.profile.student_id() == 1).expect("present");
        assert_eq!(low.components.weakest(), Some((Component::ProblemsSolved, 0.0)));
        assert_eq!(Component::ProblemsSolved.improvement_area(), "Programming Practice");
    }

    #[test]
    fn ranking_is_repeatable() {
        let students = vec![
            profile(1, Some(33), Some(61)),
            profile(2, Some(71), None),
            profile(3, None, Some(88)),
        ];
        let first = rank(&students, &Weights::default()).expect("rank");
        let second = rank(&students, &Weights::default()).expect("rank");
        assert_eq!(first, second);
        assert_eq!(first.len(), students.len());
    }
}
