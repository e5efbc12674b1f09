use crate::db::{self, MarksFilter};
use crate::ipc::helpers::{db_conn, db_err, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Course, MarkRecord, Student};
use crate::reports;
use rusqlite::Connection;
use serde_json::json;

struct CourseData {
    course: Course,
    students: Vec<Student>,
    marks: Vec<MarkRecord>,
}

fn course_data(state: &AppState, course_id: &str) -> Result<CourseData, HandlerErr> {
    let conn: &Connection = db_conn(state)?;
    let course = db::get_course(conn, course_id, state.config.default_settings())
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::new("not_found", format!("course not found: {course_id}")))?;
    let students = db::list_students(conn, Some(course_id)).map_err(db_err("db_query_failed"))?;
    let marks = db::list_marks(
        conn,
        &MarksFilter {
            course_id: Some(course_id),
            ..Default::default()
        },
    )
    .map_err(db_err("db_query_failed"))?;
    Ok(CourseData {
        course,
        students,
        marks,
    })
}

fn handle_course(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let course_id = required_str(req, "courseId")?;
    let data = course_data(state, &course_id)?;
    let report = reports::course_report(
        &data.course,
        &data.students,
        &data.marks,
        &state.config.reports,
    );
    Ok(json!({
        "courseCode": data.course.code,
        "courseName": data.course.name,
        "report": report,
    }))
}

fn handle_student(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let course_id = required_str(req, "courseId")?;
    let student_id = required_str(req, "studentId")?;
    let data = course_data(state, &course_id)?;
    let student = data
        .students
        .iter()
        .find(|s| s.id == student_id)
        .ok_or_else(|| {
            HandlerErr::new(
                "not_found",
                format!("student {student_id} is not enrolled in {}", data.course.code),
            )
        })?;
    let report = reports::student_report(&data.course, student, &data.marks, &state.config.reports);
    Ok(json!({ "report": report }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.course" => handle_course(state, req),
        "reports.student" => handle_student(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
