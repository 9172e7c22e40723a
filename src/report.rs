use std::fmt::Write;

use crate::dashboard::Dashboard;
use crate::models::Priority;

pub fn build_report(dashboard: &Dashboard, project_id: Option<&str>) -> String {
    let summary = dashboard.progress().summary();
    let mut output = String::new();

    let _ = writeln!(output, "# Student Portfolio Report");
    let _ = writeln!(
        output,
        "Overall progress {}% across {} topics",
        summary.overall, summary.record_count
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Progress by Subject");

    if summary.by_subject.is_empty() {
        let _ = writeln!(output, "No progress recorded yet.");
    } else {
        for (subject, average) in &summary.by_subject {
            let _ = writeln!(output, "- {subject}: {average}%");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Open Recommendations");

    let recommendations = dashboard.recommendations();
    if recommendations.active().is_empty() {
        let _ = writeln!(output, "Nothing to follow up on.");
    } else {
        for priority in [Priority::High, Priority::Medium, Priority::Low] {
            for item in recommendations.by_priority(priority) {
                let _ = writeln!(
                    output,
                    "- [{}] {}: {} ({})",
                    priority, item.subject, item.message, item.action
                );
            }
        }
    }

    if let Some(project_id) = project_id {
        let assessments = dashboard.assessments();
        let stats = assessments.project_statistics(project_id);
        let _ = writeln!(output);
        let _ = writeln!(output, "## Peer Assessment: {project_id}");

        if stats.total_assessments == 0 {
            let _ = writeln!(output, "No assessments recorded for this project.");
        } else {
            let _ = writeln!(
                output,
                "{} assessments covering {} students",
                stats.total_assessments, stats.assessed_students
            );
            for student in &stats.student_stats {
                let _ = writeln!(
                    output,
                    "- {} score {:.2} across {} assessments",
                    student.student_id, student.average_score, student.total_assessments
                );
                for criterion in &student.criterion_stats {
                    let _ = writeln!(
                        output,
                        "  - {} ({}%): {:.2}",
                        criterion.criterion_name, criterion.weight, criterion.average_rating
                    );
                }
            }
        }

        if !assessments.weights_balanced() {
            let _ = writeln!(
                output,
                "Note: criteria weights sum to {}, not 100.",
                assessments.total_weight()
            );
        }
    }

    output
}
