//! Report rows and the teacher CSV export.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use classroom_core::ClassId;

/// Number of daily rows returned by usage and funnel reports.
pub const DAILY_REPORT_LIMIT: usize = 30;
/// Maximum number of rows in a teacher export.
pub const EXPORT_ROW_LIMIT: usize = 1000;

pub const EXPORT_HEADER: &str = "class_name,student_email,score,submitted_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherOverviewRow {
    pub class_id: ClassId,
    pub class_name: String,
    pub roster_count: i64,
}

/// Daily usage rollup for one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRollup {
    pub metric_date: NaiveDate,
    pub active_teachers: i32,
    pub active_students: i32,
    pub completion_rate: f64,
}

/// Daily global engagement funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelRow {
    pub metric_date: NaiveDate,
    pub total_joins: i32,
    pub total_starts: i32,
    pub total_finishes: i32,
    pub retention_d7: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub class_name: String,
    pub student_email: String,
    pub score: Option<f64>,
    pub submitted_at: DateTime<Utc>,
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Render export rows as CSV. Every field is quoted; a missing score is an empty field.
pub fn render_teacher_csv(rows: &[ExportRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(EXPORT_HEADER.to_string());
    for row in rows {
        let score = row.score.map(|s| s.to_string()).unwrap_or_default();
        let submitted = row.submitted_at.to_rfc3339();
        lines.push(
            [
                quote(&row.class_name),
                quote(&row.student_email),
                quote(&score),
                quote(&submitted),
            ]
            .join(","),
        );
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_export_is_header_only() {
        assert_eq!(render_teacher_csv(&[]), EXPORT_HEADER);
    }

    #[test]
    fn fields_are_quoted_and_quotes_doubled() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let rows = vec![
            ExportRow {
                class_name: "Ethics \"A\"".into(),
                student_email: "kid@school.test".into(),
                score: Some(87.5),
                submitted_at: at,
            },
            ExportRow {
                class_name: "Civics, B".into(),
                student_email: "other@school.test".into(),
                score: None,
                submitted_at: at,
            },
        ];
        let csv = render_teacher_csv(&rows);
        let lines: Vec<&str> = csv.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "\"Ethics \"\"A\"\"\",\"kid@school.test\",\"87.5\",\"2026-03-01T09:30:00+00:00\""
        );
        assert!(lines[2].starts_with("\"Civics, B\",\"other@school.test\",\"\","));
    }
}
