//! In-memory configuration draft for one course: COs, settings and tools.
//!
//! The draft is opened from the stored course, edited through the methods
//! below, validated, and handed back to the store wholesale on save.

use crate::assessment::{self, ToolEdit};
use crate::error::ObeError;
use crate::model::{AssessmentTool, Course, CourseOutcome, CourseSettings, CourseType, KLevel};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct ConfigDraft {
    pub course_id: String,
    pub course_code: String,
    /// Stored revision the draft was opened at.
    pub revision: i64,
    pub cos: Vec<CourseOutcome>,
    pub settings: CourseSettings,
    pub tools: Vec<AssessmentTool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoField {
    Id(String),
    Description(String),
    Modules(String),
    KLevel(KLevel),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolView<'a> {
    #[serde(flatten)]
    pub tool: &'a AssessmentTool,
    pub uses_co_mapping: bool,
    pub allocated: u64,
    pub balanced: bool,
}

impl ConfigDraft {
    pub fn open(course: &Course) -> Self {
        Self {
            course_id: course.id.clone(),
            course_code: course.code.clone(),
            revision: course.revision,
            cos: course.cos.clone(),
            settings: course.settings,
            tools: course.assessment_tools.clone(),
        }
    }

    pub fn add_co(&mut self) -> &CourseOutcome {
        let mut n = self.cos.len() + 1;
        while self.cos.iter().any(|c| c.id == format!("CO{n}")) {
            n += 1;
        }
        self.cos.push(CourseOutcome {
            id: format!("CO{n}"),
            description: String::new(),
            modules: String::new(),
            k_level: KLevel::K1,
        });
        &self.cos[self.cos.len() - 1]
    }

    pub fn update_co(&mut self, co_id: &str, field: CoField) -> Result<(), ObeError> {
        let idx = self
            .cos
            .iter()
            .position(|c| c.id == co_id)
            .ok_or_else(|| ObeError::UnknownCo(co_id.to_string()))?;
        match field {
            CoField::Id(new_id) => {
                let new_id = new_id.trim().to_string();
                if new_id == co_id {
                    return Ok(());
                }
                if new_id.is_empty() {
                    return Err(ObeError::BadParams("CO id must not be empty".into()));
                }
                if self.cos.iter().any(|c| c.id == new_id) {
                    return Err(ObeError::DuplicateCo(new_id));
                }
                for tool in &mut self.tools {
                    if let Some((i, _, marks)) = tool.co_distribution.shift_remove_full(co_id) {
                        tool.co_distribution.shift_insert(i, new_id.clone(), marks);
                    }
                }
                self.cos[idx].id = new_id;
            }
            CoField::Description(v) => self.cos[idx].description = v,
            CoField::Modules(v) => self.cos[idx].modules = v,
            CoField::KLevel(v) => self.cos[idx].k_level = v,
        }
        Ok(())
    }

    /// Delete a CO and drop its key from every tool's distribution.
    pub fn remove_co(&mut self, co_id: &str) -> Result<(), ObeError> {
        let before = self.cos.len();
        self.cos.retain(|c| c.id != co_id);
        if self.cos.len() == before {
            return Err(ObeError::UnknownCo(co_id.to_string()));
        }
        for tool in &mut self.tools {
            tool.co_distribution.shift_remove(co_id);
        }
        Ok(())
    }

    pub fn update_settings(
        &mut self,
        target_threshold: Option<u32>,
        course_type: Option<CourseType>,
    ) -> Result<(), ObeError> {
        if let Some(t) = target_threshold {
            if t > 100 {
                return Err(ObeError::BadParams(
                    "targetThreshold must be between 0 and 100".into(),
                ));
            }
            self.settings.target_threshold = t;
        }
        if let Some(ct) = course_type {
            self.settings.course_type = ct;
        }
        Ok(())
    }

    pub fn add_tool(&mut self) -> &AssessmentTool {
        self.tools.push(assessment::new_tool());
        &self.tools[self.tools.len() - 1]
    }

    pub fn remove_tool(&mut self, tool_id: &str) -> Result<AssessmentTool, ObeError> {
        let idx = self
            .tools
            .iter()
            .position(|t| t.id == tool_id)
            .ok_or_else(|| ObeError::not_found("assessment tool", tool_id))?;
        Ok(self.tools.remove(idx))
    }

    pub fn edit_tool(&mut self, tool_id: &str, edit: ToolEdit) -> Result<(), ObeError> {
        assessment::apply_edit(&mut self.tools, tool_id, edit)
    }

    pub fn set_co_mark(&mut self, tool_id: &str, co_id: &str, marks: u32) -> Result<(), ObeError> {
        if !self.cos.iter().any(|c| c.id == co_id) {
            return Err(ObeError::UnknownCo(co_id.to_string()));
        }
        let tool = self
            .tools
            .iter_mut()
            .find(|t| t.id == tool_id)
            .ok_or_else(|| ObeError::not_found("assessment tool", tool_id))?;
        assessment::set_co_mark(tool, co_id, marks)
    }

    pub fn tool(&self, tool_id: &str) -> Option<&AssessmentTool> {
        self.tools.iter().find(|t| t.id == tool_id)
    }

    pub fn improvement_targets(&self, tool_id: &str) -> Vec<&AssessmentTool> {
        assessment::improvement_targets(&self.tools, tool_id)
    }

    pub fn tool_views(&self) -> Vec<ToolView<'_>> {
        self.tools
            .iter()
            .map(|tool| ToolView {
                tool,
                uses_co_mapping: tool.tool_type.uses_co_mapping(),
                allocated: assessment::allocated(tool),
                balanced: assessment::is_balanced(tool),
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        assessment::tool_warnings(&self.tools)
    }

    /// Save gate: every violation is collected, none is fixed silently.
    pub fn validate(&self) -> Result<(), ObeError> {
        let errors = assessment::validate_tools(&self.tools);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ObeError::Validation(errors))
        }
    }
}
