use crate::assessment;
use crate::model::{
    AssessmentTool, Course, CourseOutcome, CourseSettings, MarkMap, MarkRecord, Role, StoredTool,
    Student, User,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

pub const DB_FILE: &str = "obed.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            department_id TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_role_department ON users(role, department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            semester INTEGER NOT NULL DEFAULT 0,
            department_id TEXT,
            assigned_faculty_id TEXT,
            cos_json TEXT NOT NULL DEFAULT '[]',
            settings_json TEXT,
            tools_json TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY(assigned_faculty_id) REFERENCES users(id)
        )",
        [],
    )?;
    ensure_courses_revision(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_faculty ON courses(assigned_faculty_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            usn TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrolments(
            course_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(course_id, student_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrolments_student ON enrolments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            assessment TEXT NOT NULL,
            scores_json TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    ensure_marks_improvement_target(&conn)?;
    ensure_marks_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_course_assessment ON marks(course_id, assessment)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON marks(student_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_courses_revision(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "courses", "revision")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE courses ADD COLUMN revision INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    conn.execute("ALTER TABLE courses ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn ensure_marks_improvement_target(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "marks", "improvement_target")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE marks ADD COLUMN improvement_target TEXT", [])?;
    Ok(())
}

fn ensure_marks_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "marks", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE marks ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

// --- courses ---

const COURSE_COLUMNS: &str = "id, code, name, semester, department_id, assigned_faculty_id,
     cos_json, settings_json, tools_json, revision";

struct CourseRow {
    id: String,
    code: String,
    name: String,
    semester: i64,
    department_id: Option<String>,
    assigned_faculty_id: Option<String>,
    cos_json: String,
    settings_json: Option<String>,
    tools_json: String,
    revision: i64,
}

fn course_row(r: &Row<'_>) -> rusqlite::Result<CourseRow> {
    Ok(CourseRow {
        id: r.get(0)?,
        code: r.get(1)?,
        name: r.get(2)?,
        semester: r.get(3)?,
        department_id: r.get(4)?,
        assigned_faculty_id: r.get(5)?,
        cos_json: r.get(6)?,
        settings_json: r.get(7)?,
        tools_json: r.get(8)?,
        revision: r.get(9)?,
    })
}

fn course_from_row(row: CourseRow, defaults: CourseSettings) -> anyhow::Result<Course> {
    let cos: Vec<CourseOutcome> = serde_json::from_str(&row.cos_json)?;
    let settings = match row.settings_json.as_deref() {
        Some(s) => serde_json::from_str(s)?,
        None => defaults,
    };
    let stored: Vec<StoredTool> = serde_json::from_str(&row.tools_json)?;
    let assessment_tools = stored.into_iter().map(assessment::from_stored).collect();
    Ok(Course {
        id: row.id,
        code: row.code,
        name: row.name,
        semester: row.semester,
        department_id: row.department_id,
        assigned_faculty_id: row.assigned_faculty_id,
        cos,
        settings,
        assessment_tools,
        revision: row.revision,
    })
}

pub fn list_courses(
    conn: &Connection,
    faculty_id: Option<&str>,
    defaults: CourseSettings,
) -> anyhow::Result<Vec<Course>> {
    let (sql, values) = match faculty_id {
        Some(f) => (
            format!(
                "SELECT {COURSE_COLUMNS} FROM courses WHERE assigned_faculty_id = ?
                 ORDER BY semester, code"
            ),
            vec![Value::Text(f.to_string())],
        ),
        None => (
            format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY semester, code"),
            Vec::new(),
        ),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), course_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|r| course_from_row(r, defaults))
        .collect()
}

pub fn get_course(
    conn: &Connection,
    course_id: &str,
    defaults: CourseSettings,
) -> anyhow::Result<Option<Course>> {
    let row = conn
        .query_row(
            &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"),
            [course_id],
            course_row,
        )
        .optional()?;
    row.map(|r| course_from_row(r, defaults)).transpose()
}

pub struct NewCourse<'a> {
    pub id: &'a str,
    pub code: &'a str,
    pub name: &'a str,
    pub semester: i64,
    pub department_id: Option<&'a str>,
}

pub fn create_course(conn: &Connection, c: &NewCourse<'_>) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO courses(id, code, name, semester, department_id, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (c.id, c.code, c.name, c.semester, c.department_id, now_stamp()),
    )?;
    Ok(())
}

/// Returns false when the course does not exist.
pub fn assign_course(
    conn: &Connection,
    course_id: &str,
    faculty_id: Option<&str>,
) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE courses SET assigned_faculty_id = ?, updated_at = ? WHERE id = ?",
        (faculty_id, now_stamp(), course_id),
    )?;
    Ok(n > 0)
}

#[derive(Debug, PartialEq)]
pub enum ConfigSave {
    Saved { revision: i64 },
    Stale { current: i64 },
    Missing,
}

/// Replace a course's configuration document. With `expected_revision` the
/// write only happens if nobody saved in between.
pub fn save_course_config(
    conn: &Connection,
    course_id: &str,
    expected_revision: Option<i64>,
    cos: &[CourseOutcome],
    settings: &CourseSettings,
    tools: &[AssessmentTool],
) -> anyhow::Result<ConfigSave> {
    let cos_json = serde_json::to_string(cos)?;
    let settings_json = serde_json::to_string(settings)?;
    let tools_json = serde_json::to_string(tools)?;

    let n = match expected_revision {
        Some(rev) => conn.execute(
            "UPDATE courses
             SET cos_json = ?, settings_json = ?, tools_json = ?, revision = revision + 1, updated_at = ?
             WHERE id = ? AND revision = ?",
            (&cos_json, &settings_json, &tools_json, now_stamp(), course_id, rev),
        )?,
        None => conn.execute(
            "UPDATE courses
             SET cos_json = ?, settings_json = ?, tools_json = ?, revision = revision + 1, updated_at = ?
             WHERE id = ?",
            (&cos_json, &settings_json, &tools_json, now_stamp(), course_id),
        )?,
    };

    let current: Option<i64> = conn
        .query_row(
            "SELECT revision FROM courses WHERE id = ?",
            [course_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(match (n, current) {
        (_, None) => ConfigSave::Missing,
        (0, Some(current)) => ConfigSave::Stale { current },
        (_, Some(revision)) => ConfigSave::Saved { revision },
    })
}

// --- users ---

fn user_row(r: &Row<'_>) -> rusqlite::Result<(String, String, String, String, Option<String>)> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
}

fn user_from_parts(
    (id, name, email, role, department_id): (String, String, String, String, Option<String>),
) -> anyhow::Result<User> {
    let role = Role::parse(&role).ok_or_else(|| anyhow::anyhow!("unknown role {role} for {id}"))?;
    Ok(User {
        id,
        name,
        email,
        role,
        department_id,
    })
}

pub fn list_users(
    conn: &Connection,
    role: Option<Role>,
    department_id: Option<&str>,
) -> anyhow::Result<Vec<User>> {
    let mut sql = "SELECT id, name, email, role, department_id FROM users WHERE 1 = 1".to_string();
    let mut values: Vec<Value> = Vec::new();
    if let Some(r) = role {
        sql.push_str(" AND role = ?");
        values.push(Value::Text(r.as_str().to_string()));
    }
    if let Some(d) = department_id {
        sql.push_str(" AND department_id = ?");
        values.push(Value::Text(d.to_string()));
    }
    sql.push_str(" ORDER BY name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), user_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(user_from_parts).collect()
}

pub fn get_user(conn: &Connection, user_id: &str) -> anyhow::Result<Option<User>> {
    let row = conn
        .query_row(
            "SELECT id, name, email, role, department_id FROM users WHERE id = ?",
            [user_id],
            user_row,
        )
        .optional()?;
    row.map(user_from_parts).transpose()
}

pub fn create_user(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users(id, name, email, role, department_id) VALUES(?, ?, ?, ?, ?)",
        (
            &user.id,
            &user.name,
            &user.email,
            user.role.as_str(),
            &user.department_id,
        ),
    )?;
    Ok(())
}

// --- students ---

pub fn create_student(conn: &Connection, student: &Student) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO students(id, usn, name) VALUES(?, ?, ?)",
        (&student.id, &student.usn, &student.name),
    )?;
    Ok(())
}

pub fn student_exists(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

/// Students of a course ordered by USN, or every student when no course is given.
pub fn list_students(conn: &Connection, course_id: Option<&str>) -> anyhow::Result<Vec<Student>> {
    let map = |r: &Row<'_>| {
        Ok(Student {
            id: r.get(0)?,
            usn: r.get(1)?,
            name: r.get(2)?,
        })
    };
    let rows = match course_id {
        Some(cid) => {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.usn, s.name
                 FROM students s JOIN enrolments e ON e.student_id = s.id
                 WHERE e.course_id = ?
                 ORDER BY s.usn",
            )?;
            let rows = stmt.query_map([cid], map)?.collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare("SELECT id, usn, name FROM students ORDER BY usn")?;
            let rows = stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

/// Returns how many new enrolments were added.
pub fn enroll(conn: &Connection, course_id: &str, student_ids: &[String]) -> anyhow::Result<usize> {
    let mut added = 0;
    for sid in student_ids {
        added += conn.execute(
            "INSERT OR IGNORE INTO enrolments(course_id, student_id) VALUES(?, ?)",
            (course_id, sid),
        )?;
    }
    Ok(added)
}

// --- marks ---

#[derive(Debug, Default)]
pub struct MarksFilter<'a> {
    pub course_id: Option<&'a str>,
    pub assessment: Option<&'a str>,
    pub student_id: Option<&'a str>,
}

pub fn list_marks(conn: &Connection, f: &MarksFilter<'_>) -> anyhow::Result<Vec<MarkRecord>> {
    let mut sql = "SELECT id, course_id, student_id, assessment, scores_json, improvement_target, updated_at
                   FROM marks WHERE 1 = 1"
        .to_string();
    let mut values: Vec<Value> = Vec::new();
    for (col, v) in [
        ("course_id", f.course_id),
        ("assessment", f.assessment),
        ("student_id", f.student_id),
    ] {
        if let Some(v) = v {
            sql.push_str(&format!(" AND {col} = ?"));
            values.push(Value::Text(v.to_string()));
        }
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, Option<String>>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(id, course_id, student_id, assessment, scores_json, improvement_target, updated_at)| {
                let scores: MarkMap = serde_json::from_str(&scores_json)?;
                Ok(MarkRecord {
                    id,
                    student_id,
                    course_id,
                    assessment,
                    scores,
                    improvement_target,
                    updated_at,
                })
            },
        )
        .collect()
}

pub fn insert_mark(conn: &Connection, rec: &MarkRecord) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO marks(id, course_id, student_id, assessment, scores_json, improvement_target, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &rec.id,
            &rec.course_id,
            &rec.student_id,
            &rec.assessment,
            serde_json::to_string(&rec.scores)?,
            &rec.improvement_target,
            now_stamp(),
        ),
    )?;
    Ok(())
}

pub fn update_mark_scores(conn: &Connection, mark_id: &str, scores: &MarkMap) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE marks SET scores_json = ?, updated_at = ? WHERE id = ?",
        (serde_json::to_string(scores)?, now_stamp(), mark_id),
    )?;
    Ok(n > 0)
}

pub fn delete_mark(conn: &Connection, mark_id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM marks WHERE id = ?", [mark_id])?;
    Ok(n > 0)
}
