use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

pub const TERMS: [i64; 3] = [1, 2, 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive bands, checked in order. Anything that falls outside every band
/// (negative, above 100, or between two integer bands like 79.5) is an F.
pub const GRADING_SCALE: [(Grade, f64, f64); 5] = [
    (Grade::A, 80.0, 100.0),
    (Grade::B, 70.0, 79.0),
    (Grade::C, 60.0, 69.0),
    (Grade::D, 50.0, 59.0),
    (Grade::F, 0.0, 49.0),
];

pub fn calculate_grade(score: f64) -> Grade {
    for (grade, min_score, max_score) in GRADING_SCALE {
        if min_score <= score && score <= max_score {
            return grade;
        }
    }
    Grade::F
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_term(term: i64) -> Self {
        Self::new("invalid_argument", "term must be 1, 2 or 3")
            .with_details(serde_json::json!({ "term": term }))
    }
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CalcError {}

pub fn check_term(term: i64) -> Result<i64, CalcError> {
    if TERMS.contains(&term) {
        Ok(term)
    } else {
        Err(CalcError::invalid_term(term))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStudent {
    pub id: String,
    pub name: String,
}

/// Read-only access to stored marks and class rosters.
///
/// Every call is an independent read. The calculators below make two or three
/// calls for one cumulative average and never open a transaction themselves,
/// so a caller that needs a consistent snapshot under concurrent writers must
/// scope one around the whole computation.
pub trait ScoreSource {
    /// Mean of `total` over the student's marks for exactly `term`, `None`
    /// when the student has no marks in that term.
    fn average_total(&self, student_id: &str, term: i64) -> Result<Option<f64>, CalcError>;

    fn students_in_class(&self, class_name: &str) -> Result<Vec<RosterStudent>, CalcError>;
}

pub fn get_term_average<S: ScoreSource>(
    source: &S,
    student_id: &str,
    term: i64,
) -> Result<f64, CalcError> {
    Ok(source.average_total(student_id, term)?.unwrap_or(0.0))
}

/// Term 1 is the raw term average, term 2 the mean of terms 1 and 2, and
/// term 3 the mean of the term-2 cumulative and term 3 (so 25/25/50).
pub fn calculate_cumulative_average<S: ScoreSource>(
    source: &S,
    student_id: &str,
    current_term: i64,
) -> Result<f64, CalcError> {
    match current_term {
        1 => get_term_average(source, student_id, 1),
        2 => {
            let term1_avg = get_term_average(source, student_id, 1)?;
            let term2_avg = get_term_average(source, student_id, 2)?;
            Ok((term1_avg + term2_avg) / 2.0)
        }
        3 => {
            let prev_cumulative = calculate_cumulative_average(source, student_id, 2)?;
            let term3_avg = get_term_average(source, student_id, 3)?;
            Ok((prev_cumulative + term3_avg) / 2.0)
        }
        other => Err(CalcError::invalid_term(other)),
    }
}

/// The value a student is ranked by: the raw average in term 1, the
/// cumulative average in terms 2 and 3.
pub fn ranking_average<S: ScoreSource>(
    source: &S,
    student_id: &str,
    term: i64,
) -> Result<f64, CalcError> {
    match check_term(term)? {
        1 => get_term_average(source, student_id, 1),
        t => calculate_cumulative_average(source, student_id, t),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAverage {
    pub student_id: String,
    pub average: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub student_id: String,
    pub display_name: Option<String>,
    pub average: f64,
    pub position: usize,
}

/// Stable sort by average, highest first. A run of equal averages shares the
/// 1-based index of its first member and the next distinct average takes its
/// own index, so [90, 90, 80] ranks as [1, 1, 3].
pub fn rank_by_average(mut averages: Vec<StudentAverage>) -> Vec<RankedStudent> {
    averages.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));

    let mut ranked: Vec<RankedStudent> = Vec::with_capacity(averages.len());
    let mut current_position = 1;
    for (i, s) in averages.into_iter().enumerate() {
        let tied = ranked
            .last()
            .map(|prev| prev.average == s.average)
            .unwrap_or(false);
        if !tied {
            current_position = i + 1;
        }
        ranked.push(RankedStudent {
            student_id: s.student_id,
            display_name: s.display_name,
            average: s.average,
            position: current_position,
        });
    }
    ranked
}

pub fn class_ranking<S: ScoreSource>(
    source: &S,
    term: i64,
    class_name: &str,
) -> Result<Vec<RankedStudent>, CalcError> {
    let term = check_term(term)?;
    let mut averages: Vec<StudentAverage> = Vec::new();
    for student in source.students_in_class(class_name)? {
        let average = ranking_average(source, &student.id, term)?;
        averages.push(StudentAverage {
            student_id: student.id,
            average,
            display_name: Some(student.name),
        });
    }
    Ok(rank_by_average(averages))
}

pub fn calculate_class_positions<S: ScoreSource>(
    source: &S,
    term: i64,
    class_name: &str,
) -> Result<HashMap<String, usize>, CalcError> {
    Ok(class_ranking(source, term, class_name)?
        .into_iter()
        .map(|r| (r.student_id, r.position))
        .collect())
}
