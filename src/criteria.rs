use serde::Serialize;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::models::PlacementStatus;

/// Recognized criterion keys.
pub const CRITERION_KEYS: [&str; 9] = [
    "course_batch",
    "city",
    "language",
    "min_problems_solved",
    "min_project_score",
    "min_soft_skill_avg",
    "min_mock_interview_score",
    "min_internships",
    "placement_status",
];

/// Optional eligibility filters. `None` (or an empty status set) means the
/// criterion is unset and contributes nothing to the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Criteria {
    pub course_batch: Option<String>,
    pub city: Option<String>,
    pub language: Option<String>,
    pub min_problems_solved: Option<i64>,
    pub min_project_score: Option<f64>,
    pub min_soft_skill_avg: Option<f64>,
    pub min_mock_interview_score: Option<f64>,
    pub min_internships: Option<i64>,
    pub placement_status: Vec<PlacementStatus>,
}

impl Criteria {
    /// Parses `key=value` style input. Later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut criteria = Criteria::default();
        for (key, value) in pairs {
            criteria.set(key.as_ref(), value.as_ref())?;
        }
        Ok(criteria)
    }

    /// Parses a JSON object of criteria. Arrays are accepted for
    /// `placement_status`; `null` leaves a criterion unset.
    pub fn from_json(value: &Value) -> CoreResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            CoreError::InvalidCriterion("criteria must be a JSON object".to_string())
        })?;

        let mut criteria = Criteria::default();
        for (key, value) in object {
            let canonical = canonical_key(key)?;
            let text = match value {
                Value::Null => continue,
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Array(items) if canonical == "placement_status" => items
                    .iter()
                    .map(|item| match item {
                        Value::String(text) => Ok(text.clone()),
                        other => Err(CoreError::InvalidCriterion(format!(
                            "{key}: expected a list of strings, got {other}"
                        ))),
                    })
                    .collect::<CoreResult<Vec<_>>>()?
                    .join(","),
                Value::Array(_) => {
                    return Err(CoreError::InvalidCriterion(format!(
                        "{key} takes a single value, not a list"
                    )))
                }
                other => {
                    return Err(CoreError::InvalidCriterion(format!(
                        "{key}: unsupported value {other}"
                    )))
                }
            };
            criteria.set(key, &text)?;
        }
        Ok(criteria)
    }

    pub fn set(&mut self, key: &str, value: &str) -> CoreResult<()> {
        let key = canonical_key(key)?;
        match key {
            "course_batch" => self.course_batch = Some(value.to_string()),
            "city" => self.city = Some(value.to_string()),
            "language" => self.language = Some(value.to_string()),
            "min_problems_solved" => self.min_problems_solved = Some(parse_count(key, value)?),
            "min_project_score" => self.min_project_score = Some(parse_number(key, value)?),
            "min_soft_skill_avg" => self.min_soft_skill_avg = Some(parse_number(key, value)?),
            "min_mock_interview_score" => {
                self.min_mock_interview_score = Some(parse_number(key, value)?)
            }
            "min_internships" => self.min_internships = Some(parse_count(key, value)?),
            "placement_status" => self.placement_status = parse_statuses(value)?,
            _ => return Err(CoreError::UnknownField(key.to_string())),
        }
        Ok(())
    }

    /// Rejects negative or non-finite bounds and blank strings.
    pub fn validate(&self) -> CoreResult<()> {
        for (key, value) in [
            ("course_batch", &self.course_batch),
            ("city", &self.city),
            ("language", &self.language),
        ] {
            if let Some(value) = value {
                if value.trim().is_empty() {
                    return Err(CoreError::InvalidCriterion(format!("{key} must not be empty")));
                }
            }
        }

        for (key, bound) in [
            ("min_problems_solved", self.min_problems_solved.map(|v| v as f64)),
            ("min_project_score", self.min_project_score),
            ("min_soft_skill_avg", self.min_soft_skill_avg),
            ("min_mock_interview_score", self.min_mock_interview_score),
            ("min_internships", self.min_internships.map(|v| v as f64)),
        ] {
            if let Some(bound) = bound {
                check_bound(key, bound)?;
            }
        }

        Ok(())
    }

    pub fn active_count(&self) -> usize {
        [
            self.course_batch.is_some(),
            self.city.is_some(),
            self.language.is_some(),
            self.min_problems_solved.is_some(),
            self.min_project_score.is_some(),
            self.min_soft_skill_avg.is_some(),
            self.min_mock_interview_score.is_some(),
            self.min_internships.is_some(),
            !self.placement_status.is_empty(),
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }
}

/// Maps a key (or one of the dashboard's legacy names) onto `CRITERION_KEYS`.
fn canonical_key(key: &str) -> CoreResult<&'static str> {
    let key = key.trim();
    let canonical = match key {
        "programming_language" => "language",
        "min_soft_skills_avg" => "min_soft_skill_avg",
        "min_mock_interview" => "min_mock_interview_score",
        other => other,
    };
    CRITERION_KEYS
        .iter()
        .find(|known| **known == canonical)
        .copied()
        .ok_or_else(|| CoreError::UnknownField(key.to_string()))
}

fn check_bound(key: &str, bound: f64) -> CoreResult<()> {
    if !bound.is_finite() {
        return Err(CoreError::InvalidCriterion(format!("{key} must be a finite number")));
    }
    if bound < 0.0 {
        return Err(CoreError::InvalidCriterion(format!(
            "{key} must not be negative (got {bound})"
        )));
    }
    Ok(())
}

fn parse_count(key: &str, value: &str) -> CoreResult<i64> {
    let parsed = value.trim().parse::<i64>().map_err(|_| {
        CoreError::InvalidCriterion(format!("{key} expects a whole number, got '{value}'"))
    })?;
    check_bound(key, parsed as f64)?;
    Ok(parsed)
}

fn parse_number(key: &str, value: &str) -> CoreResult<f64> {
    let parsed = value.trim().parse::<f64>().map_err(|_| {
        CoreError::InvalidCriterion(format!("{key} expects a number, got '{value}'"))
    })?;
    check_bound(key, parsed)?;
    Ok(parsed)
}

fn parse_statuses(value: &str) -> CoreResult<Vec<PlacementStatus>> {
    let mut statuses = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<PlacementStatus>().map_err(CoreError::InvalidCriterion))
        .collect::<CoreResult<Vec<_>>>()?;

    if statuses.is_empty() {
        return Err(CoreError::InvalidCriterion(
            "placement_status must not be empty".to_string(),
        ));
    }
    statuses.sort();
    statuses.dedup();
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_recognized_pairs() {
        let criteria = Criteria::from_pairs([
            ("course_batch", "DS_2024_A"),
            ("min_problems_solved", "50"),
            ("min_soft_skill_avg", "72.5"),
            ("placement_status", "Ready, Placed"),
        ])
        .expect("valid criteria");

        assert_eq!(criteria.course_batch.as_deref(), Some("DS_2024_A"));
        assert_eq!(criteria.min_problems_solved, Some(50));
        assert_eq!(criteria.min_soft_skill_avg, Some(72.5));
        assert_eq!(
            criteria.placement_status,
            vec![PlacementStatus::Ready, PlacementStatus::Placed]
        );
        assert_eq!(criteria.active_count(), 4);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = Criteria::from_pairs([("min_gpa", "3")]).unwrap_err();
        assert!(matches!(err, CoreError::UnknownField(field) if field == "min_gpa"));
    }

    #[test]
    fn legacy_keys_are_aliases() {
        let criteria = Criteria::from_pairs([
            ("programming_language", "Python"),
            ("min_mock_interview", "60"),
        ])
        .expect("aliases accepted");
        assert_eq!(criteria.language.as_deref(), Some("Python"));
        assert_eq!(criteria.min_mock_interview_score, Some(60.0));
    }

    #[test]
    fn negative_bounds_are_invalid() {
        let err = Criteria::from_pairs([("min_internships", "-1")]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCriterion(_)));

        let criteria = Criteria {
            min_project_score: Some(-0.5),
            ..Criteria::default()
        };
        assert!(matches!(criteria.validate(), Err(CoreError::InvalidCriterion(_))));
    }

    #[test]
    fn blank_strings_are_invalid() {
        let criteria = Criteria::from_pairs([("city", "   ")]).expect("parsing keeps raw text");
        assert!(matches!(criteria.validate(), Err(CoreError::InvalidCriterion(_))));

        let err = Criteria::from_pairs([("placement_status", " , ")]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCriterion(_)));
    }

    #[test]
    fn non_numeric_bound_is_invalid() {
        let err = Criteria::from_pairs([("min_problems_solved", "lots")]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCriterion(_)));
    }

    #[test]
    fn json_object_is_accepted() {
        let criteria = Criteria::from_json(&json!({
            "city": "Chennai",
            "min_internships": 2,
            "placement_status": ["Placed", "In Progress"],
            "language": null
        }))
        .expect("valid json criteria");

        assert_eq!(criteria.city.as_deref(), Some("Chennai"));
        assert_eq!(criteria.min_internships, Some(2));
        assert_eq!(criteria.language, None);
        assert_eq!(
            criteria.placement_status,
            vec![PlacementStatus::Placed, PlacementStatus::InProgress]
        );

        let err = Criteria::from_json(&json!({ "salary": null })).unwrap_err();
        assert!(matches!(err, CoreError::UnknownField(_)));
    }

    #[test]
    fn json_unknown_key_wins_over_value_type() {
        for value in [json!({ "salary": true }), json!({ "salary": { "min": 1 } })] {
            let err = Criteria::from_json(&value).unwrap_err();
            assert!(matches!(err, CoreError::UnknownField(field) if field == "salary"));
        }
    }

    #[test]
    fn json_lists_only_for_placement_status() {
        let err = Criteria::from_json(&json!({ "city": ["Pune", "Delhi"] })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCriterion(_)));

        let err = Criteria::from_json(&json!({ "min_problems_solved": [10, 20] })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCriterion(_)));
    }
}
