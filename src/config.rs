use crate::model::{CourseSettings, CourseType};
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILE: &str = "obed.toml";

/// Workspace settings read from `obed.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ObeConfig {
    pub course: CourseDefaults,
    pub reports: ReportThresholds,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CourseDefaults {
    pub target_threshold: u32,
    pub course_type: String,
}

impl Default for CourseDefaults {
    fn default() -> Self {
        Self {
            target_threshold: 60,
            course_type: "Theory".to_string(),
        }
    }
}

/// Percent boundaries used by the report screens.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReportThresholds {
    /// Pass mark for a single assessment row and the overall individual result.
    pub row_pass_percent: f64,
    /// Pass mark in the class-wide student table.
    pub course_pass_percent: f64,
    pub distinction_percent: f64,
    pub first_class_percent: f64,
}

impl Default for ReportThresholds {
    fn default() -> Self {
        Self {
            row_pass_percent: 40.0,
            course_pass_percent: 50.0,
            distinction_percent: 75.0,
            first_class_percent: 60.0,
        }
    }
}

impl ObeConfig {
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let cfg: ObeConfig = toml::from_str(&text)?;
        cfg.check()?;
        Ok(cfg)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.course.target_threshold > 100 {
            anyhow::bail!("course.target_threshold must be between 0 and 100");
        }
        if CourseType::parse(&self.course.course_type).is_none() {
            anyhow::bail!(
                "course.course_type must be one of: Theory, Integrated, Lab (got {})",
                self.course.course_type
            );
        }
        let r = &self.reports;
        if r.first_class_percent > r.distinction_percent {
            anyhow::bail!("reports.first_class_percent must not exceed distinction_percent");
        }
        Ok(())
    }

    /// Settings for a course that has none stored yet.
    pub fn default_settings(&self) -> CourseSettings {
        CourseSettings {
            target_threshold: self.course.target_threshold,
            course_type: CourseType::parse(&self.course.course_type).unwrap_or_default(),
        }
    }
}
