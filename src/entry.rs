//! Marks-entry session for one course and one assessment tool.
//!
//! The question schema is derived from the tool alone. Rows hold the scores
//! being edited; nothing is written until [`EntrySession::save_plan`] is
//! turned into store operations by the caller.

use crate::error::ObeError;
use crate::model::{AssessmentTool, Course, MarkMap, MarkRecord, Student, ToolType};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    #[serde(rename = "q")]
    pub key: String,
    pub co: String,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSchema {
    pub total: u32,
    pub is_external: bool,
    pub is_improvement: bool,
    pub questions: Vec<Question>,
}

impl QuestionSchema {
    pub fn question(&self, key: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.key == key)
    }

    /// Sum of a row over this schema's questions. Keys outside the schema are ignored.
    pub fn total_of(&self, scores: &MarkMap) -> u64 {
        self.questions
            .iter()
            .filter_map(|q| scores.get(&q.key))
            .map(|v| u64::from(*v))
            .sum()
    }
}

/// Out-of for an external exam whose max marks were never filled in.
const DEFAULT_SEE_MAX: u32 = 100;

fn see_max(tool: &AssessmentTool) -> u32 {
    if tool.max_marks == 0 {
        DEFAULT_SEE_MAX
    } else {
        tool.max_marks
    }
}

pub fn question_schema(tool: &AssessmentTool) -> QuestionSchema {
    let questions = match tool.tool_type {
        ToolType::SemesterEndExam => vec![Question {
            key: "External".to_string(),
            co: String::new(),
            max: see_max(tool),
        }],
        ToolType::Activity => vec![Question {
            key: "Score".to_string(),
            co: "-".to_string(),
            max: tool.max_marks,
        }],
        _ => tool
            .co_distribution
            .iter()
            .map(|(co, marks)| Question {
                key: co.clone(),
                co: co.clone(),
                max: *marks,
            })
            .collect(),
    };
    QuestionSchema {
        total: match tool.tool_type {
            ToolType::SemesterEndExam => see_max(tool),
            _ => tool.max_marks,
        },
        is_external: tool.tool_type == ToolType::SemesterEndExam,
        is_improvement: tool.tool_type == ToolType::ImprovementTest,
        questions,
    }
}

/// Id given to records created from the entry grid.
pub fn mark_id(course_id: &str, student_id: &str, assessment: &str) -> String {
    let compact: String = assessment.chars().filter(|c| !c.is_whitespace()).collect();
    format!("M_{course_id}_{student_id}_{compact}")
}

/// Integer prefix of `s`, the way an entry cell reads "12abc" as 12.
pub fn parse_int_lenient(s: &str) -> Option<i64> {
    let t = s.trim_start();
    let (sign, digits) = match t.as_bytes().first() {
        Some(b'-') => (-1, &t[1..]),
        Some(b'+') => (1, &t[1..]),
        _ => (1, t),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|v| sign * v)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreInput {
    Empty,
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparedQuestion {
    #[serde(rename = "q")]
    pub key: String,
    pub max: u32,
    pub original: Option<u32>,
    pub improvement: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub student_id: String,
    pub improvement_assessment: String,
    pub questions: Vec<ComparedQuestion>,
    pub original_total: u64,
    pub improvement_total: u64,
    pub improvement_better: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOp {
    Create(MarkRecord),
    Patch {
        mark_id: String,
        student_id: String,
        scores: MarkMap,
    },
    Delete {
        mark_id: String,
        student_id: String,
    },
}

impl SaveOp {
    pub fn student_id(&self) -> &str {
        match self {
            SaveOp::Create(rec) => &rec.student_id,
            SaveOp::Patch { student_id, .. } | SaveOp::Delete { student_id, .. } => student_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowView<'a> {
    pub student_id: &'a str,
    pub usn: &'a str,
    pub name: &'a str,
    pub scores: &'a MarkMap,
    pub total: u64,
    pub locked: bool,
    pub has_record: bool,
    pub has_improvement: bool,
}

#[derive(Debug, Clone)]
pub struct EntrySession {
    pub course_id: String,
    pub course_code: String,
    pub tool: AssessmentTool,
    pub schema: QuestionSchema,
    /// Improvement test linked to this assessment, if any.
    pub improvement_tool: Option<String>,
    roster: Vec<Student>,
    rows: HashMap<String, MarkMap>,
    existing: HashMap<String, MarkRecord>,
    improvement: HashMap<String, MarkMap>,
    unlocked: HashSet<String>,
    compared: HashSet<String>,
}

impl EntrySession {
    pub fn open(course: &Course, assessment: &str) -> Result<Self, ObeError> {
        let tool = course
            .tool_by_name(assessment)
            .cloned()
            .ok_or_else(|| ObeError::not_found("assessment", assessment))?;
        let improvement_tool = course
            .assessment_tools
            .iter()
            .find(|t| t.tool_type == ToolType::ImprovementTest && t.linked_assessment == tool.name)
            .map(|t| t.name.clone());
        Ok(Self {
            course_id: course.id.clone(),
            course_code: course.code.clone(),
            schema: question_schema(&tool),
            tool,
            improvement_tool,
            roster: Vec::new(),
            rows: HashMap::new(),
            existing: HashMap::new(),
            improvement: HashMap::new(),
            unlocked: HashSet::new(),
            compared: HashSet::new(),
        })
    }

    pub fn is_improvement(&self) -> bool {
        self.schema.is_improvement
    }

    /// Replace all session data with a fresh read of the store.
    pub fn load(
        &mut self,
        roster: Vec<Student>,
        records: Vec<MarkRecord>,
        improvement_records: Vec<MarkRecord>,
    ) {
        self.rows.clear();
        self.existing.clear();
        self.improvement.clear();
        self.unlocked.clear();
        self.compared.clear();

        for rec in records {
            self.rows.insert(rec.student_id.clone(), rec.scores.clone());
            self.existing.insert(rec.student_id.clone(), rec);
        }
        for rec in improvement_records {
            self.improvement.insert(rec.student_id, rec.scores);
        }
        if !self.is_improvement() {
            for s in &roster {
                if !self.rows.contains_key(&s.id) {
                    self.rows.insert(s.id.clone(), MarkMap::new());
                    self.unlocked.insert(s.id.clone());
                }
            }
        }
        self.roster = roster;
    }

    pub fn roster(&self) -> &[Student] {
        &self.roster
    }

    /// Students shown in the grid: the roster, or only mapped students for
    /// an improvement test.
    pub fn displayed(&self) -> Vec<&Student> {
        self.roster
            .iter()
            .filter(|s| !self.is_improvement() || self.rows.contains_key(&s.id))
            .collect()
    }

    pub fn row(&self, student_id: &str) -> Option<&MarkMap> {
        self.rows.get(student_id)
    }

    pub fn is_locked(&self, student_id: &str) -> bool {
        self.existing.contains_key(student_id) && !self.unlocked.contains(student_id)
    }

    pub fn total(&self, student_id: &str) -> u64 {
        self.rows
            .get(student_id)
            .map(|r| self.schema.total_of(r))
            .unwrap_or(0)
    }

    pub fn rows_view(&self) -> Vec<RowView<'_>> {
        self.displayed()
            .into_iter()
            .filter_map(|s| {
                let scores = self.rows.get(&s.id)?;
                Some(RowView {
                    student_id: &s.id,
                    usn: &s.usn,
                    name: &s.name,
                    scores,
                    total: self.schema.total_of(scores),
                    locked: self.is_locked(&s.id),
                    has_record: self.existing.contains_key(&s.id),
                    has_improvement: self.improvement.contains_key(&s.id),
                })
            })
            .collect()
    }

    fn editable_row(&mut self, student_id: &str) -> Result<&mut MarkMap, ObeError> {
        if !self.roster.iter().any(|s| s.id == student_id) {
            return Err(ObeError::not_found("student", student_id));
        }
        if self.is_locked(student_id) {
            return Err(ObeError::RowLocked(student_id.to_string()));
        }
        self.rows
            .get_mut(student_id)
            .ok_or_else(|| ObeError::NotMapped(student_id.to_string()))
    }

    /// Apply one cell edit. Returns the stored value, `None` when the cell is
    /// now empty or the input was not a number.
    pub fn set_score(
        &mut self,
        student_id: &str,
        key: &str,
        input: ScoreInput,
    ) -> Result<Option<u32>, ObeError> {
        let max = self
            .schema
            .question(key)
            .map(|q| q.max)
            .ok_or_else(|| ObeError::BadParams(format!("unknown question: {key}")))?;
        let row = self.editable_row(student_id)?;

        let value = match input {
            ScoreInput::Empty => None,
            ScoreInput::Number(v) => Some(v),
            ScoreInput::Text(s) if s.trim().is_empty() => None,
            ScoreInput::Text(s) => match parse_int_lenient(&s) {
                Some(v) => Some(v),
                None => return Ok(row.get(key).copied()),
            },
        };
        match value {
            None => {
                row.shift_remove(key);
                Ok(None)
            }
            Some(v) => {
                // max is a u32, so the clamped value always fits.
                let clamped = v.clamp(0, i64::from(max)) as u32;
                row.insert(key.to_string(), clamped);
                Ok(Some(clamped))
            }
        }
    }

    /// Write an imported cell, bypassing the row lock. Returns false when the
    /// student may not receive marks in this session.
    pub fn import_score(&mut self, student_id: &str, key: &str, value: u32) -> bool {
        if self.is_improvement() && !self.rows.contains_key(student_id) {
            return false;
        }
        self.rows
            .entry(student_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
        true
    }

    /// Lock or unlock a row that already has a stored record. Returns the new
    /// locked state.
    pub fn toggle_edit(&mut self, student_id: &str) -> Result<bool, ObeError> {
        if !self.rows.contains_key(student_id) {
            return Err(ObeError::not_found("row", student_id));
        }
        if !self.unlocked.remove(student_id) {
            self.unlocked.insert(student_id.to_string());
        }
        Ok(self.is_locked(student_id))
    }

    /// Replace the set of students mapped to an improvement test.
    pub fn map_students(&mut self, selected: &[String]) -> Result<(), ObeError> {
        if !self.is_improvement() {
            return Err(ObeError::BadParams(
                "student mapping only applies to improvement tests".into(),
            ));
        }
        if let Some(unknown) = selected
            .iter()
            .find(|id| !self.roster.iter().any(|s| &s.id == *id))
        {
            return Err(ObeError::not_found("student", unknown.clone()));
        }
        let keep: HashSet<&String> = selected.iter().collect();
        for id in selected {
            if !self.rows.contains_key(id) {
                self.rows.insert(id.clone(), MarkMap::new());
                self.unlocked.insert(id.clone());
            }
        }
        self.rows.retain(|id, _| keep.contains(id));
        self.unlocked.retain(|id| keep.contains(id));
        Ok(())
    }

    /// Side-by-side view of a student's original and improvement scores.
    pub fn compare(&mut self, student_id: &str) -> Result<Comparison, ObeError> {
        let improvement_assessment = self
            .improvement_tool
            .clone()
            .ok_or_else(|| ObeError::NoImprovement(student_id.to_string()))?;
        let imp = self
            .improvement
            .get(student_id)
            .ok_or_else(|| ObeError::NoImprovement(student_id.to_string()))?;
        let empty = MarkMap::new();
        let orig = self.rows.get(student_id).unwrap_or(&empty);

        let questions = self
            .schema
            .questions
            .iter()
            .map(|q| ComparedQuestion {
                key: q.key.clone(),
                max: q.max,
                original: orig.get(&q.key).copied(),
                improvement: imp.get(&q.key).copied(),
            })
            .collect();
        let original_total = self.schema.total_of(orig);
        let improvement_total = self.schema.total_of(imp);
        let cmp = Comparison {
            student_id: student_id.to_string(),
            improvement_assessment,
            questions,
            original_total,
            improvement_total,
            improvement_better: improvement_total > original_total,
        };
        self.compared.insert(student_id.to_string());
        Ok(cmp)
    }

    /// Replace the student's scores with their improvement-test scores.
    /// Only allowed once the grader has looked at the comparison.
    pub fn override_with_improvement(&mut self, student_id: &str) -> Result<(), ObeError> {
        if !self.compared.contains(student_id) {
            return Err(ObeError::CompareFirst(student_id.to_string()));
        }
        let imp = self
            .improvement
            .get(student_id)
            .cloned()
            .ok_or_else(|| ObeError::NoImprovement(student_id.to_string()))?;
        self.rows.insert(student_id.to_string(), imp);
        self.unlocked.insert(student_id.to_string());
        Ok(())
    }

    /// Independent store operations for the current rows, one per student.
    pub fn save_plan(&self) -> Vec<SaveOp> {
        let mut ops = Vec::new();
        for s in self.displayed() {
            let Some(scores) = self.rows.get(&s.id) else {
                continue;
            };
            match self.existing.get(&s.id) {
                Some(rec) if rec.scores == *scores => {}
                Some(rec) => ops.push(SaveOp::Patch {
                    mark_id: rec.id.clone(),
                    student_id: s.id.clone(),
                    scores: scores.clone(),
                }),
                None if scores.is_empty() && !self.is_improvement() => {}
                None => ops.push(SaveOp::Create(MarkRecord {
                    id: mark_id(&self.course_id, &s.id, &self.tool.name),
                    student_id: s.id.clone(),
                    course_id: self.course_id.clone(),
                    assessment: self.tool.name.clone(),
                    scores: scores.clone(),
                    improvement_target: Some(self.tool.linked_assessment.clone())
                        .filter(|t| self.is_improvement() && !t.is_empty()),
                    updated_at: None,
                })),
            }
        }
        if self.is_improvement() {
            let mut dropped: Vec<&MarkRecord> = self
                .existing
                .values()
                .filter(|rec| !self.rows.contains_key(&rec.student_id))
                .collect();
            dropped.sort_by(|a, b| a.student_id.cmp(&b.student_id));
            ops.extend(dropped.into_iter().map(|rec| SaveOp::Delete {
                mark_id: rec.id.clone(),
                student_id: rec.student_id.clone(),
            }));
        }
        ops
    }
}
