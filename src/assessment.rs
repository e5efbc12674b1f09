use crate::error::ObeError;
use crate::model::{AssessmentTool, MarkMap, StoredTool, SubType, ToolType};
use uuid::Uuid;

pub const INCOMPLETE_TOOL_MESSAGE: &str =
    "An assessment tool is incomplete. Please check Activity Names or Improvement Targets.";

/// Canonical tool name. Rules are applied in priority order; an unset subtype
/// renders as "1", the editor's default selection.
pub fn derive_name(
    tool_type: ToolType,
    sub_type: Option<SubType>,
    custom_name: &str,
    linked_assessment: &str,
) -> String {
    match tool_type {
        ToolType::SemesterEndExam => "Semester End Exam".to_string(),
        ToolType::Activity if custom_name.is_empty() => "Activity".to_string(),
        ToolType::Activity => format!("Activity - {custom_name}"),
        ToolType::ImprovementTest if linked_assessment.is_empty() => {
            "Improvement Test".to_string()
        }
        ToolType::ImprovementTest => format!("Improvement Test ({linked_assessment})"),
        _ => match sub_type {
            Some(SubType::Other) => custom_name.to_string(),
            other => format!(
                "{} {}",
                tool_type.label(),
                other.unwrap_or(SubType::One).label()
            ),
        },
    }
}

pub fn tool_name(tool: &AssessmentTool) -> String {
    derive_name(
        tool.tool_type,
        tool.sub_type,
        &tool.custom_name,
        &tool.linked_assessment,
    )
}

pub fn new_tool() -> AssessmentTool {
    let mut tool = AssessmentTool {
        id: Uuid::new_v4().to_string(),
        tool_type: ToolType::InternalAssessment,
        sub_type: Some(SubType::One),
        custom_name: String::new(),
        linked_assessment: String::new(),
        name: String::new(),
        max_marks: 0,
        weightage: 0,
        co_distribution: MarkMap::new(),
    };
    tool.name = tool_name(&tool);
    tool
}

/// Rebuild the structured fields of a stored tool. Documents written by this
/// daemon carry `type`; older ones only have the derived name.
pub fn from_stored(raw: StoredTool) -> AssessmentTool {
    let id = raw
        .id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (tool_type, sub_type, custom_name, linked_assessment) = match raw.tool_type {
        Some(t) => (
            t,
            raw.sub_type.as_deref().and_then(SubType::parse),
            raw.custom_name.unwrap_or_default(),
            raw.linked_assessment.unwrap_or_default(),
        ),
        None => parse_name(&raw.name),
    };

    let mut co_distribution = raw.co_distribution;
    co_distribution.retain(|_, v| *v > 0);

    let mut tool = AssessmentTool {
        id,
        tool_type,
        sub_type,
        custom_name,
        linked_assessment,
        name: String::new(),
        max_marks: raw.max_marks,
        weightage: raw.weightage,
        co_distribution,
    };
    tool.name = tool_name(&tool);
    tool
}

fn parse_name(name: &str) -> (ToolType, Option<SubType>, String, String) {
    if name == "Semester End Exam" {
        return (ToolType::SemesterEndExam, None, String::new(), String::new());
    }
    if name.starts_with("Improvement Test") {
        let linked = name
            .split_once('(')
            .and_then(|(_, rest)| rest.split_once(')'))
            .map(|(inner, _)| inner.to_string())
            .unwrap_or_default();
        return (ToolType::ImprovementTest, Some(SubType::Other), String::new(), linked);
    }
    if let Some(rest) = name.strip_prefix("Activity") {
        let custom = rest.strip_prefix(" - ").unwrap_or(rest).trim().to_string();
        return (ToolType::Activity, Some(SubType::Other), custom, String::new());
    }
    for tool_type in [ToolType::InternalAssessment, ToolType::Assignment] {
        let Some(part) = name
            .strip_prefix(tool_type.label())
            .and_then(|r| r.strip_prefix(' '))
        else {
            continue;
        };
        if let Some(sub) = SubType::parse(part).filter(|s| *s != SubType::Other) {
            return (tool_type, Some(sub), String::new(), String::new());
        }
        return (tool_type, Some(SubType::Other), name.to_string(), String::new());
    }
    (
        ToolType::InternalAssessment,
        Some(SubType::Other),
        name.to_string(),
        String::new(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolEdit {
    Type(ToolType),
    SubType(Option<SubType>),
    CustomName(String),
    LinkedAssessment(String),
    MaxMarks(u32),
    Weightage(u32),
}

impl ToolEdit {
    fn touches_name(&self) -> bool {
        !matches!(self, ToolEdit::MaxMarks(_) | ToolEdit::Weightage(_))
    }
}

pub fn allocated(tool: &AssessmentTool) -> u64 {
    tool.co_distribution.values().map(|v| u64::from(*v)).sum()
}

pub fn is_balanced(tool: &AssessmentTool) -> bool {
    !tool.tool_type.uses_co_mapping() || allocated(tool) == u64::from(tool.max_marks)
}

/// Tools an improvement test may remediate: internal assessments other than itself.
pub fn improvement_targets<'a>(
    tools: &'a [AssessmentTool],
    tool_id: &str,
) -> Vec<&'a AssessmentTool> {
    tools
        .iter()
        .filter(|t| t.id != tool_id && t.tool_type == ToolType::InternalAssessment)
        .collect()
}

/// Apply one field edit to the tool with `tool_id`, re-deriving its name.
pub fn apply_edit(
    tools: &mut [AssessmentTool],
    tool_id: &str,
    edit: ToolEdit,
) -> Result<(), ObeError> {
    let idx = tools
        .iter()
        .position(|t| t.id == tool_id)
        .ok_or_else(|| ObeError::not_found("assessment tool", tool_id))?;

    // Linking copies from the current list, so resolve the source first.
    let copied = match &edit {
        ToolEdit::LinkedAssessment(target) => {
            if tools[idx].tool_type != ToolType::ImprovementTest {
                return Err(ObeError::BadParams(format!(
                    "{} is not an improvement test",
                    tools[idx].name
                )));
            }
            if target.is_empty() {
                None
            } else {
                let source = improvement_targets(tools, tool_id)
                    .into_iter()
                    .find(|t| t.name == *target)
                    .ok_or_else(|| ObeError::BadTarget(target.clone()))?;
                Some((source.max_marks, source.weightage, source.co_distribution.clone()))
            }
        }
        _ => None,
    };

    let tool = &mut tools[idx];
    let touches_name = edit.touches_name();
    match edit {
        ToolEdit::Type(t) => {
            tool.tool_type = t;
            if !t.uses_co_mapping() {
                tool.co_distribution.clear();
            }
        }
        ToolEdit::SubType(s) => tool.sub_type = s,
        ToolEdit::CustomName(s) => tool.custom_name = s.trim().to_string(),
        ToolEdit::LinkedAssessment(s) => tool.linked_assessment = s,
        ToolEdit::MaxMarks(v) => tool.max_marks = v,
        ToolEdit::Weightage(v) => tool.weightage = v,
    }
    if let Some((max_marks, weightage, distribution)) = copied {
        tool.max_marks = max_marks;
        tool.weightage = weightage;
        tool.co_distribution = distribution;
    }
    if touches_name {
        tool.name = tool_name(tool);
    }
    Ok(())
}

/// Set the marks a tool allots to one CO. Zero removes the entry.
pub fn set_co_mark(tool: &mut AssessmentTool, co_id: &str, marks: u32) -> Result<(), ObeError> {
    if !tool.tool_type.uses_co_mapping() {
        return Err(ObeError::MappingNotApplicable(tool.name.clone()));
    }
    if marks > 0 {
        tool.co_distribution.insert(co_id.to_string(), marks);
    } else {
        tool.co_distribution.shift_remove(co_id);
    }
    Ok(())
}

pub fn is_incomplete_name(name: &str) -> bool {
    name.is_empty() || name == "Activity" || name == "Improvement Test"
}

/// Blocking problems that prevent a configuration save, in tool order.
pub fn validate_tools(tools: &[AssessmentTool]) -> Vec<String> {
    let mut errors = Vec::new();
    for tool in tools {
        if !is_balanced(tool) {
            errors.push(format!(
                "{}: Allocated {} marks, but Max Marks is {}",
                tool.name,
                allocated(tool),
                tool.max_marks
            ));
        }
        if is_incomplete_name(&tool.name) {
            errors.push(INCOMPLETE_TOOL_MESSAGE.to_string());
        }
    }

    let mut seen = std::collections::HashSet::new();
    for tool in tools {
        if is_incomplete_name(&tool.name) {
            continue;
        }
        if !seen.insert(tool.name.as_str()) {
            let msg = format!("Duplicate assessment name: {}", tool.name);
            if !errors.contains(&msg) {
                errors.push(msg);
            }
        }
    }
    errors
}

/// Non-blocking notes shown while editing.
pub fn tool_warnings(tools: &[AssessmentTool]) -> Vec<String> {
    let mut warnings = Vec::new();
    for tool in tools {
        if !is_balanced(tool) {
            warnings.push(format!(
                "{}: {} / {} marks allocated",
                tool.name,
                allocated(tool),
                tool.max_marks
            ));
        }
        if tool.tool_type == ToolType::ImprovementTest
            && !tool.linked_assessment.is_empty()
            && !tools.iter().any(|t| t.name == tool.linked_assessment)
        {
            warnings.push(format!(
                "{}: linked assessment no longer exists",
                tool.name
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(id: &str, tool_type: ToolType, sub: Option<SubType>) -> AssessmentTool {
        let mut t = new_tool();
        t.id = id.to_string();
        t.tool_type = tool_type;
        t.sub_type = sub;
        t.name = tool_name(&t);
        t
    }

    fn dist(pairs: &[(&str, u32)]) -> MarkMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn name_rules_follow_priority() {
        assert_eq!(
            derive_name(ToolType::SemesterEndExam, Some(SubType::Other), "x", "y"),
            "Semester End Exam"
        );
        assert_eq!(derive_name(ToolType::Activity, None, "", ""), "Activity");
        assert_eq!(
            derive_name(ToolType::Activity, Some(SubType::Two), "Quiz 1", "IA1"),
            "Activity - Quiz 1"
        );
        assert_eq!(
            derive_name(ToolType::ImprovementTest, Some(SubType::Other), "x", ""),
            "Improvement Test"
        );
        assert_eq!(
            derive_name(
                ToolType::ImprovementTest,
                None,
                "",
                "Internal Assessment 1"
            ),
            "Improvement Test (Internal Assessment 1)"
        );
        assert_eq!(
            derive_name(ToolType::Assignment, Some(SubType::Other), "Lab Test 1", ""),
            "Lab Test 1"
        );
        assert_eq!(
            derive_name(ToolType::InternalAssessment, Some(SubType::Three), "", ""),
            "Internal Assessment 3"
        );
        assert_eq!(
            derive_name(ToolType::Assignment, None, "", ""),
            "Assignment 1"
        );
    }

    #[test]
    fn name_does_not_depend_on_edit_order() {
        let mut a = vec![tool("a", ToolType::InternalAssessment, Some(SubType::One))];
        let mut b = a.clone();

        apply_edit(&mut a, "a", ToolEdit::SubType(Some(SubType::Other))).unwrap();
        apply_edit(&mut a, "a", ToolEdit::CustomName("Lab".into())).unwrap();
        apply_edit(&mut a, "a", ToolEdit::Type(ToolType::Assignment)).unwrap();

        apply_edit(&mut b, "a", ToolEdit::Type(ToolType::Assignment)).unwrap();
        apply_edit(&mut b, "a", ToolEdit::CustomName("Lab".into())).unwrap();
        apply_edit(&mut b, "a", ToolEdit::SubType(Some(SubType::Other))).unwrap();

        assert_eq!(a[0].name, "Lab");
        assert_eq!(a[0].name, b[0].name);
    }

    #[test]
    fn custom_name_is_trimmed() {
        let mut tools = vec![tool("a", ToolType::Assignment, Some(SubType::Other))];
        apply_edit(&mut tools, "a", ToolEdit::CustomName("  Lab ".into())).unwrap();
        assert_eq!(tools[0].custom_name, "Lab");
        assert_eq!(tools[0].name, "Lab");
    }

    #[test]
    fn switching_to_unmapped_types_clears_distribution() {
        for target in [ToolType::SemesterEndExam, ToolType::Activity] {
            let mut tools = vec![tool("a", ToolType::InternalAssessment, Some(SubType::One))];
            tools[0].co_distribution = dist(&[("CO1", 10), ("CO2", 5)]);
            apply_edit(&mut tools, "a", ToolEdit::Type(target)).unwrap();
            assert!(tools[0].co_distribution.is_empty());
        }

        let mut tools = vec![tool("a", ToolType::InternalAssessment, Some(SubType::One))];
        tools[0].co_distribution = dist(&[("CO1", 10)]);
        apply_edit(&mut tools, "a", ToolEdit::Type(ToolType::Assignment)).unwrap();
        assert_eq!(tools[0].co_distribution, dist(&[("CO1", 10)]));
    }

    #[test]
    fn linking_copies_then_diverges() {
        let mut source = tool("ia1", ToolType::InternalAssessment, Some(SubType::One));
        source.max_marks = 30;
        source.weightage = 15;
        source.co_distribution = dist(&[("CO1", 20), ("CO2", 10)]);
        let improvement = tool("imp", ToolType::ImprovementTest, None);
        let mut tools = vec![source, improvement];

        apply_edit(
            &mut tools,
            "imp",
            ToolEdit::LinkedAssessment("Internal Assessment 1".into()),
        )
        .unwrap();
        assert_eq!(tools[1].name, "Improvement Test (Internal Assessment 1)");
        assert_eq!(tools[1].max_marks, 30);
        assert_eq!(tools[1].weightage, 15);
        assert_eq!(tools[1].co_distribution, dist(&[("CO1", 20), ("CO2", 10)]));

        set_co_mark(&mut tools[0], "CO1", 5).unwrap();
        apply_edit(&mut tools, "ia1", ToolEdit::MaxMarks(50)).unwrap();
        assert_eq!(tools[1].max_marks, 30);
        assert_eq!(tools[1].co_distribution.get("CO1"), Some(&20));
    }

    #[test]
    fn linking_rejects_other_types_and_self() {
        let assignment = tool("as1", ToolType::Assignment, Some(SubType::One));
        let improvement = tool("imp", ToolType::ImprovementTest, None);
        let mut tools = vec![assignment, improvement];

        let err = apply_edit(
            &mut tools,
            "imp",
            ToolEdit::LinkedAssessment("Assignment 1".into()),
        )
        .unwrap_err();
        assert_eq!(err.code(), "bad_target");

        let err = apply_edit(
            &mut tools,
            "imp",
            ToolEdit::LinkedAssessment("Improvement Test".into()),
        )
        .unwrap_err();
        assert_eq!(err.code(), "bad_target");

        let err = apply_edit(
            &mut tools,
            "as1",
            ToolEdit::LinkedAssessment("Assignment 1".into()),
        )
        .unwrap_err();
        assert_eq!(err.code(), "bad_params");
    }

    #[test]
    fn zero_co_mark_removes_key() {
        let mut t = tool("a", ToolType::InternalAssessment, Some(SubType::One));
        set_co_mark(&mut t, "CO1", 10).unwrap();
        set_co_mark(&mut t, "CO2", 5).unwrap();
        set_co_mark(&mut t, "CO1", 0).unwrap();
        assert_eq!(t.co_distribution, dist(&[("CO2", 5)]));

        let mut see = tool("s", ToolType::SemesterEndExam, None);
        assert_eq!(
            set_co_mark(&mut see, "CO1", 10).unwrap_err().code(),
            "mapping_not_applicable"
        );
    }

    #[test]
    fn allocation_sums_past_u32_range() {
        let mut t = tool("a", ToolType::InternalAssessment, Some(SubType::One));
        t.max_marks = u32::MAX;
        set_co_mark(&mut t, "CO1", 3_000_000_000).unwrap();
        set_co_mark(&mut t, "CO2", 3_000_000_000).unwrap();
        assert_eq!(allocated(&t), 6_000_000_000);
        assert!(!is_balanced(&t));
    }

    #[test]
    fn validation_reports_unbalanced_and_incomplete_tools() {
        let mut ia1 = tool("a", ToolType::InternalAssessment, Some(SubType::Other));
        ia1.custom_name = "IA1".into();
        ia1.name = tool_name(&ia1);
        ia1.max_marks = 30;
        ia1.co_distribution = dist(&[("CO1", 15), ("CO2", 10)]);

        let activity = tool("b", ToolType::Activity, None);
        let mut see = tool("c", ToolType::SemesterEndExam, None);
        see.max_marks = 100;

        let errors = validate_tools(&[ia1, activity, see]);
        assert_eq!(
            errors,
            vec![
                "IA1: Allocated 25 marks, but Max Marks is 30".to_string(),
                INCOMPLETE_TOOL_MESSAGE.to_string(),
            ]
        );
    }

    #[test]
    fn validation_flags_duplicate_names_once() {
        let a = tool("a", ToolType::Assignment, Some(SubType::Two));
        let b = tool("b", ToolType::Assignment, Some(SubType::Two));
        let c = tool("c", ToolType::Assignment, Some(SubType::Two));
        assert_eq!(
            validate_tools(&[a, b, c]),
            vec!["Duplicate assessment name: Assignment 2".to_string()]
        );
    }

    #[test]
    fn stored_names_are_parsed_back_into_fields() {
        let parsed = |name: &str| {
            from_stored(StoredTool {
                name: name.to_string(),
                ..StoredTool::default()
            })
        };

        let t = parsed("Internal Assessment 2");
        assert_eq!(t.tool_type, ToolType::InternalAssessment);
        assert_eq!(t.sub_type, Some(SubType::Two));
        assert_eq!(t.name, "Internal Assessment 2");

        let t = parsed("Improvement Test (Internal Assessment 1)");
        assert_eq!(t.tool_type, ToolType::ImprovementTest);
        assert_eq!(t.linked_assessment, "Internal Assessment 1");
        assert_eq!(t.name, "Improvement Test (Internal Assessment 1)");

        let t = parsed("Activity - Quiz 1");
        assert_eq!(t.tool_type, ToolType::Activity);
        assert_eq!(t.custom_name, "Quiz 1");

        let t = parsed("Semester End Exam");
        assert_eq!(t.tool_type, ToolType::SemesterEndExam);
        assert_eq!(t.sub_type, None);

        let t = parsed("Lab Record");
        assert_eq!(t.tool_type, ToolType::InternalAssessment);
        assert_eq!(t.sub_type, Some(SubType::Other));
        assert_eq!(t.name, "Lab Record");

        let t = parsed("Assignment Viva");
        assert_eq!(t.tool_type, ToolType::Assignment);
        assert_eq!(t.name, "Assignment Viva");
    }
}
