use crate::entry::{parse_int_lenient, EntrySession};
use crate::error::ObeError;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvTemplate {
    pub file_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Cells written into the grid.
    pub updated: usize,
    /// Data rows that matched no writable student or had too few fields.
    pub skipped_rows: usize,
}

fn quote_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Split one line into fields. Double quotes group a field and `""` inside
/// a quoted field is a literal quote.
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    fields.push(cur);
    fields
}

/// Split text into records, keeping newlines that sit inside quotes.
fn split_records(text: &str) -> Vec<&str> {
    let mut records = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => {
                records.push(text[start..i].trim_end_matches('\r'));
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < text.len() {
        records.push(text[start..].trim_end_matches('\r'));
    }
    records
}

pub fn export_template(session: &EntrySession) -> Result<CsvTemplate, ObeError> {
    let students = session.displayed();
    if students.is_empty() {
        return Err(ObeError::NoStudents);
    }

    let mut header = vec!["USN".to_string(), "Name".to_string()];
    header.extend(
        session
            .schema
            .questions
            .iter()
            .map(|q| quote_field(&format!("{} ({})", q.key, q.max))),
    );
    let mut lines = vec![header.join(",")];

    for s in students {
        let mut row = vec![quote_field(&s.usn), quote_field(&s.name)];
        let scores = session.row(&s.id);
        for q in &session.schema.questions {
            row.push(
                scores
                    .and_then(|r| r.get(&q.key))
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        lines.push(row.join(","));
    }

    Ok(CsvTemplate {
        file_name: format!("{}_{}_Template.csv", session.course_code, session.tool.name),
        content: lines.join("\n"),
    })
}

/// Merge a filled template into the grid. Cells that are blank, not a number
/// or outside `0..=max` are left alone.
pub fn import_marks(session: &mut EntrySession, text: &str) -> ImportSummary {
    let mut summary = ImportSummary::default();
    let questions = session.schema.questions.clone();

    for line in split_records(text).into_iter().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line);
        if fields.len() < 3 {
            summary.skipped_rows += 1;
            continue;
        }
        let usn = fields[0].trim();
        let Some(student_id) = session
            .roster()
            .iter()
            .find(|s| s.usn == usn)
            .map(|s| s.id.clone())
        else {
            summary.skipped_rows += 1;
            continue;
        };
        if session.is_improvement() && session.row(&student_id).is_none() {
            summary.skipped_rows += 1;
            continue;
        }

        for (idx, q) in questions.iter().enumerate() {
            let Some(cell) = fields.get(idx + 2) else {
                continue;
            };
            let Some(v) = parse_int_lenient(cell) else {
                continue;
            };
            if v < 0 || v > i64::from(q.max) {
                continue;
            }
            if session.import_score(&student_id, &q.key, v as u32) {
                summary.updated += 1;
            }
        }
    }
    summary
}
