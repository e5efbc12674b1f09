//! Class analytics and individual student reports.
//!
//! Every percentage is computed from configured max marks. When those are
//! missing the value is `None` and reported as insufficient data.

use crate::config::ReportThresholds;
use crate::entry::question_schema;
use crate::model::{AssessmentTool, Course, MarkRecord, Student, ToolType};
use serde::Serialize;
use std::collections::HashSet;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn percent(obtained: u64, max: u64) -> Option<f64> {
    (max > 0).then(|| round2(100.0 * obtained as f64 / max as f64))
}

/// Non-improvement tools, first occurrence of each name only.
fn standard_tools(course: &Course) -> Vec<&AssessmentTool> {
    let mut seen = HashSet::new();
    course
        .assessment_tools
        .iter()
        .filter(|t| seen.insert(t.name.as_str()))
        .filter(|t| t.tool_type != ToolType::ImprovementTest)
        .collect()
}

fn find_record<'a>(
    marks: &'a [MarkRecord],
    student_id: &str,
    assessment: &str,
) -> Option<&'a MarkRecord> {
    marks
        .iter()
        .find(|m| m.student_id == student_id && m.assessment == assessment)
}

fn tool_score(record: Option<&MarkRecord>, tool: &AssessmentTool) -> u64 {
    record
        .map(|r| question_schema(tool).total_of(&r.scores))
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformance {
    pub student_id: String,
    pub usn: String,
    pub name: String,
    pub obtained: u64,
    pub max: u64,
    pub records: usize,
    pub percentage: Option<f64>,
    pub passed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    pub name: String,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoAttainment {
    pub co_id: String,
    pub class_average: Option<f64>,
    pub students_at_target: Option<f64>,
    pub target: u32,
    pub attained: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseReport {
    pub course_id: String,
    pub students: Vec<StudentPerformance>,
    pub distribution: Vec<Band>,
    pub insufficient_data: usize,
    pub co_attainment: Vec<CoAttainment>,
}

pub fn course_report(
    course: &Course,
    students: &[Student],
    marks: &[MarkRecord],
    th: &ReportThresholds,
) -> CourseReport {
    let tools = standard_tools(course);
    let max: u64 = tools.iter().map(|t| u64::from(question_schema(t).total)).sum();

    let performance: Vec<StudentPerformance> = students
        .iter()
        .map(|s| {
            let mut obtained = 0;
            let mut records = 0;
            for tool in &tools {
                let rec = find_record(marks, &s.id, &tool.name);
                records += usize::from(rec.is_some());
                obtained += tool_score(rec, tool);
            }
            let percentage = if records == 0 {
                None
            } else {
                percent(obtained, max)
            };
            StudentPerformance {
                student_id: s.id.clone(),
                usn: s.usn.clone(),
                name: s.name.clone(),
                obtained,
                max,
                records,
                percentage,
                passed: percentage.map(|p| p >= th.course_pass_percent),
            }
        })
        .collect();

    let mut distribution = vec![
        Band {
            name: format!("Distinction (≥{}%)", th.distinction_percent),
            value: 0,
        },
        Band {
            name: format!(
                "First Class ({}-{}%)",
                th.first_class_percent, th.distinction_percent
            ),
            value: 0,
        },
        Band {
            name: format!(
                "Pass ({}-{}%)",
                th.course_pass_percent, th.first_class_percent
            ),
            value: 0,
        },
        Band {
            name: format!("Fail (<{}%)", th.course_pass_percent),
            value: 0,
        },
    ];
    let mut insufficient_data = 0;
    for p in &performance {
        let Some(pct) = p.percentage else {
            insufficient_data += 1;
            continue;
        };
        let idx = if pct >= th.distinction_percent {
            0
        } else if pct >= th.first_class_percent {
            1
        } else if pct >= th.course_pass_percent {
            2
        } else {
            3
        };
        distribution[idx].value += 1;
    }

    let target = course.settings.target_threshold;
    let co_attainment = course
        .cos
        .iter()
        .map(|co| {
            let mut class_obtained = 0;
            let mut class_possible = 0;
            let mut assessed = 0usize;
            let mut at_target = 0usize;
            for s in students {
                let mut obtained = 0;
                let mut possible = 0;
                for tool in &tools {
                    let Some(allotted) = tool.co_distribution.get(&co.id) else {
                        continue;
                    };
                    let Some(rec) = find_record(marks, &s.id, &tool.name) else {
                        continue;
                    };
                    obtained += u64::from(rec.scores.get(&co.id).copied().unwrap_or(0));
                    possible += u64::from(*allotted);
                }
                if let Some(pct) = percent(obtained, possible) {
                    assessed += 1;
                    at_target += usize::from(pct >= f64::from(target));
                }
                class_obtained += obtained;
                class_possible += possible;
            }
            let class_average = percent(class_obtained, class_possible);
            CoAttainment {
                co_id: co.id.clone(),
                class_average,
                students_at_target: (assessed > 0)
                    .then(|| round2(100.0 * at_target as f64 / assessed as f64)),
                target,
                attained: class_average.map(|avg| avg >= f64::from(target)),
            }
        })
        .collect();

    CourseReport {
        course_id: course.id.clone(),
        students: performance,
        distribution,
        insufficient_data,
        co_attainment,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRow {
    pub name: String,
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub obtained: u64,
    pub original: u64,
    /// Shown for reference. An override is a separate, manual action.
    pub improvement: Option<u64>,
    pub max: u64,
    pub percentage: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student: Student,
    pub course_id: String,
    pub course_code: String,
    pub course_name: String,
    pub assessments: Vec<AssessmentRow>,
    pub total_obtained: u64,
    pub total_max: u64,
    pub overall_percentage: Option<f64>,
    pub passed: Option<bool>,
    pub class_band: Option<&'static str>,
    pub attempted: usize,
}

pub fn student_report(
    course: &Course,
    student: &Student,
    marks: &[MarkRecord],
    th: &ReportThresholds,
) -> StudentReport {
    let tools = standard_tools(course);
    let mut assessments = Vec::with_capacity(tools.len());
    let mut total_obtained = 0;
    let mut total_max = 0;

    for tool in tools {
        let original = tool_score(find_record(marks, &student.id, &tool.name), tool);
        let improvement = marks
            .iter()
            .find(|m| {
                m.student_id == student.id
                    && m.assessment.starts_with("Improvement")
                    && m.improvement_target.as_deref() == Some(tool.name.as_str())
            })
            .map(|rec| tool_score(Some(rec), tool));
        let max = u64::from(question_schema(tool).total);
        let percentage = percent(original, max);
        assessments.push(AssessmentRow {
            name: tool.name.clone(),
            tool_type: tool.tool_type,
            obtained: original,
            original,
            improvement,
            max,
            percentage,
            passed: percentage.is_some_and(|p| p >= th.row_pass_percent),
        });
        total_obtained += original;
        total_max += max;
    }

    let overall_percentage = percent(total_obtained, total_max);
    let class_band = overall_percentage.map(|p| {
        if p >= th.distinction_percent {
            "Distinction"
        } else if p >= th.first_class_percent {
            "First Class"
        } else {
            "Second Class"
        }
    });
    StudentReport {
        student: student.clone(),
        course_id: course.id.clone(),
        course_code: course.code.clone(),
        course_name: course.name.clone(),
        attempted: assessments.iter().filter(|a| a.obtained > 0).count(),
        assessments,
        total_obtained,
        total_max,
        passed: overall_percentage.map(|p| p >= th.row_pass_percent),
        overall_percentage,
        class_band,
    }
}
