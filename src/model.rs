use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Per-CO mark allotment of a tool, or per-question scores of a mark record.
/// Insertion order is significant: it is the question order in marks entry.
pub type MarkMap = IndexMap<String, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KLevel {
    #[default]
    K1,
    K2,
    K3,
    K4,
    K5,
    K6,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutcome {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub modules: String,
    #[serde(default)]
    pub k_level: KLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CourseType {
    #[default]
    Theory,
    Integrated,
    Lab,
}

impl CourseType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Theory" => Some(CourseType::Theory),
            "Integrated" => Some(CourseType::Integrated),
            "Lab" => Some(CourseType::Lab),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSettings {
    pub target_threshold: u32,
    pub course_type: CourseType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolType {
    #[serde(rename = "Internal Assessment")]
    InternalAssessment,
    #[serde(rename = "Assignment")]
    Assignment,
    #[serde(rename = "Semester End Exam")]
    SemesterEndExam,
    #[serde(rename = "Activity")]
    Activity,
    #[serde(rename = "Improvement Test")]
    ImprovementTest,
}

impl ToolType {
    pub const ALL: [ToolType; 5] = [
        ToolType::InternalAssessment,
        ToolType::Assignment,
        ToolType::SemesterEndExam,
        ToolType::Activity,
        ToolType::ImprovementTest,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ToolType::InternalAssessment => "Internal Assessment",
            ToolType::Assignment => "Assignment",
            ToolType::SemesterEndExam => "Semester End Exam",
            ToolType::Activity => "Activity",
            ToolType::ImprovementTest => "Improvement Test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == s)
    }

    /// SEE and Activity are scored as a single number, without a CO breakdown.
    pub fn uses_co_mapping(self) -> bool {
        !matches!(self, ToolType::SemesterEndExam | ToolType::Activity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubType {
    One,
    Two,
    Three,
    Other,
}

impl SubType {
    pub const ALL: [SubType; 4] = [SubType::One, SubType::Two, SubType::Three, SubType::Other];

    pub fn label(self) -> &'static str {
        match self {
            SubType::One => "1",
            SubType::Two => "2",
            SubType::Three => "3",
            SubType::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == s)
    }
}

/// `subType` travels as a plain string where `""` means "no subtype".
mod sub_type_field {
    use super::SubType;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<SubType>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(v.map(SubType::label).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SubType>, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        if raw.is_empty() {
            return Ok(None);
        }
        SubType::parse(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown subType: {raw}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentTool {
    pub id: String,
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    #[serde(default, with = "sub_type_field")]
    pub sub_type: Option<SubType>,
    #[serde(default)]
    pub custom_name: String,
    #[serde(default)]
    pub linked_assessment: String,
    pub name: String,
    #[serde(default)]
    pub max_marks: u32,
    #[serde(default)]
    pub weightage: u32,
    #[serde(default)]
    pub co_distribution: MarkMap,
}

/// Tool as found in a stored course document. Older documents carry only the
/// derived `name`; the structured fields are then recovered from it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTool {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub tool_type: Option<ToolType>,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub linked_assessment: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub max_marks: u32,
    #[serde(default)]
    pub weightage: u32,
    #[serde(default)]
    pub co_distribution: MarkMap,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub code: String,
    pub name: String,
    pub semester: i64,
    pub department_id: Option<String>,
    pub assigned_faculty_id: Option<String>,
    pub cos: Vec<CourseOutcome>,
    pub settings: CourseSettings,
    pub assessment_tools: Vec<AssessmentTool>,
    pub revision: i64,
}

impl Course {
    pub fn tool_by_name(&self, name: &str) -> Option<&AssessmentTool> {
        self.assessment_tools.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Faculty,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Faculty => "faculty",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "faculty" => Some(Role::Faculty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub usn: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub assessment: String,
    pub scores: MarkMap,
    pub improvement_target: Option<String>,
    pub updated_at: Option<String>,
}
