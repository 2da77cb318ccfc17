use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// One grade entry as it participates in a weighted mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeEntry {
    pub value: f64,
    pub weight: f64,
}

/// Weighted mean over grade entries. Defined as 0.0 for an empty list or
/// a zero total weight so callers never divide by zero.
/// Negative weights are accepted as-is; see DESIGN.md.
pub fn weighted_average<I>(entries: I) -> f64
where
    I: IntoIterator<Item = GradeEntry>,
{
    let (total_weight, total_points) = grade_totals(entries);
    if total_weight == 0.0 {
        0.0
    } else {
        total_points / total_weight
    }
}

/// (total weight, total weighted points) over the entries.
pub fn grade_totals<I>(entries: I) -> (f64, f64)
where
    I: IntoIterator<Item = GradeEntry>,
{
    let mut total_weight = 0.0_f64;
    let mut total_points = 0.0_f64;
    for e in entries {
        total_weight += e.weight;
        total_points += e.value * e.weight;
    }
    (total_weight, total_points)
}

pub const DEFAULT_PASSING_GRADE: f64 = 7.0;
pub const DEFAULT_MAX_ABSENCES: i64 = 15;
pub const DEFAULT_TOTAL_SEMESTERS: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceRisk {
    Ok,
    Warning,
    Danger,
}

impl AttendanceRisk {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceRisk::Ok => "ok",
            AttendanceRisk::Warning => "warning",
            AttendanceRisk::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub passed: bool,
    pub attendance_risk: AttendanceRisk,
}

/// Pass/fail against the passing grade plus the absence-ratio risk bucket.
/// A non-positive absence ceiling yields Ok rather than a NaN ratio.
pub fn classify(
    average: f64,
    passing_grade: Option<f64>,
    current_absences: i64,
    max_absences: i64,
) -> Classification {
    let target = passing_grade.unwrap_or(DEFAULT_PASSING_GRADE);
    let passed = average >= target;
    let attendance_risk = if max_absences <= 0 {
        AttendanceRisk::Ok
    } else {
        let ratio = current_absences as f64 / max_absences as f64;
        if ratio >= 0.8 {
            AttendanceRisk::Danger
        } else if ratio >= 0.5 {
            AttendanceRisk::Warning
        } else {
            AttendanceRisk::Ok
        }
    };
    Classification {
        passed,
        attendance_risk,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLight {
    Good,
    Warning,
    Danger,
}

impl StatusLight {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusLight::Good => "good",
            StatusLight::Warning => "warning",
            StatusLight::Danger => "danger",
        }
    }
}

/// Combined card indicator: absence danger or a failing average (only once
/// any weighted grades exist) dominates, absence warning comes next.
pub fn status_light(
    average: f64,
    total_weight: f64,
    passing_grade: Option<f64>,
    current_absences: i64,
    max_absences: i64,
) -> StatusLight {
    let c = classify(average, passing_grade, current_absences, max_absences);
    let failing_by_grades = total_weight > 0.0 && !c.passed;
    if c.attendance_risk == AttendanceRisk::Danger || failing_by_grades {
        StatusLight::Danger
    } else if c.attendance_risk == AttendanceRisk::Warning {
        StatusLight::Warning
    } else {
        StatusLight::Good
    }
}

/// Completion percentage of one period: share of subjects passing, rounded.
/// An empty period is 0.
pub fn period_progress(passed_flags: &[bool]) -> i64 {
    if passed_flags.is_empty() {
        return 0;
    }
    let passed = passed_flags.iter().filter(|p| **p).count();
    ((passed as f64 / passed_flags.len() as f64) * 100.0).round() as i64
}

/// Mean over the expected period list. Periods with no subjects arrive as 0
/// and pull the mean down; that reads as "behind" before later semesters
/// start, but it is the dashboard behavior users know. Kept on purpose;
/// see DESIGN.md.
pub fn global_progress(period_percents: &[i64]) -> i64 {
    if period_percents.is_empty() {
        return 0;
    }
    let sum: i64 = period_percents.iter().sum();
    (sum as f64 / period_percents.len() as f64).round() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyBucket {
    Overdue,
    Today,
    Soon,
    Normal,
}

impl UrgencyBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            UrgencyBucket::Overdue => "overdue",
            UrgencyBucket::Today => "today",
            UrgencyBucket::Soon => "soon",
            UrgencyBucket::Normal => "normal",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Urgency {
    pub bucket: UrgencyBucket,
    pub days_left: Option<i64>,
    pub label: String,
}

/// Buckets a due timestamp relative to now, for display styling only.
/// "Soon" counts calendar days as ceil(hours/24), so three days and one
/// minute out already rounds up to four days and falls back to normal.
pub fn urgency(due_at: NaiveDateTime, now: NaiveDateTime) -> Urgency {
    let delta = due_at - now;
    if delta < chrono::Duration::zero() {
        return Urgency {
            bucket: UrgencyBucket::Overdue,
            days_left: None,
            label: "overdue".to_string(),
        };
    }
    let hours = delta.num_seconds() as f64 / 3600.0;
    if hours < 24.0 {
        return Urgency {
            bucket: UrgencyBucket::Today,
            days_left: None,
            label: "today".to_string(),
        };
    }
    let days = (hours / 24.0).ceil() as i64;
    if days <= 3 {
        return Urgency {
            bucket: UrgencyBucket::Soon,
            days_left: Some(days),
            label: format!("in {} days", days),
        };
    }
    Urgency {
        bucket: UrgencyBucket::Normal,
        days_left: None,
        label: due_at.format("%Y-%m-%d").to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetOutlook {
    /// Already at or above the target even if the next entry scores 0.
    Secured,
    /// Reachable: the score needed on the next entry.
    Score(f64),
    /// Would take more than a 10 on the next entry.
    OutOfReach,
}

impl TargetOutlook {
    pub fn as_json_parts(self) -> (&'static str, Option<f64>) {
        match self {
            TargetOutlook::Secured => ("secured", None),
            TargetOutlook::Score(v) => ("score", Some(v)),
            TargetOutlook::OutOfReach => ("outOfReach", None),
        }
    }
}

/// Score needed on a hypothetical next weight-1 entry to close at `target`.
pub fn needed_on_next(target: f64, total_weight: f64, total_points: f64) -> TargetOutlook {
    let next_weight = 1.0_f64;
    let needed = (target * (total_weight + next_weight) - total_points) / next_weight;
    if needed <= 0.0 {
        TargetOutlook::Secured
    } else if needed > 10.0 {
        TargetOutlook::OutOfReach
    } else {
        TargetOutlook::Score(needed)
    }
}

/// Course completion percentage; a zero module total counts as 1 so a
/// malformed course renders 0% instead of dividing by zero.
pub fn course_progress(completed_modules: i64, total_modules: i64) -> i64 {
    let total = total_modules.max(1);
    ((completed_modules as f64 / total as f64) * 100.0).round() as i64
}

/// Short uppercase label for chart axes. Connective words are skipped;
/// single-word names keep their first four letters.
pub fn acronym(name: &str) -> String {
    const SKIP: [&str; 6] = ["de", "da", "do", "e", "para", "com"];
    let words: Vec<&str> = name
        .split_whitespace()
        .filter(|w| !SKIP.contains(&w.to_lowercase().as_str()))
        .collect();
    if words.is_empty() {
        return "?".to_string();
    }
    if words.len() == 1 {
        return words[0].chars().take(4).collect::<String>().to_uppercase();
    }
    words
        .iter()
        .filter_map(|w| w.chars().next())
        .take(4)
        .collect::<String>()
        .to_uppercase()
}

/// Parses "HH:MM" into minutes since midnight.
pub fn parse_hhmm(raw: &str) -> Option<u32> {
    let (h, m) = raw.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Whether a weekly slot covers the given weekday and minute of day.
/// The end minute is exclusive so back-to-back slots never both light up.
pub fn is_happening_now(
    day_of_week: i64,
    start_time: &str,
    end_time: &str,
    now_day: i64,
    now_minutes: u32,
) -> bool {
    if day_of_week != now_day {
        return false;
    }
    let (Some(start), Some(end)) = (parse_hhmm(start_time), parse_hhmm(end_time)) else {
        return false;
    };
    now_minutes >= start && now_minutes < end
}

/// Period labels as the dashboard shows them; slot 0 is "Period 1".
pub fn period_label(index: usize) -> String {
    format!("Period {}", index + 1)
}

pub const EXTRAS_PERIOD: &str = "Extras";

#[allow(dead_code)]
pub fn date_at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .expect("valid date")
        .and_hms_opt(h, mi, 0)
        .expect("valid time")
}
