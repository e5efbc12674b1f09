use crate::db::{self, MarksFilter, NewCourse};
use crate::ipc::helpers::{
    db_conn, db_err, optional_str, required_str, respond, string_list, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Role, Student, User};
use serde_json::json;

fn handle_courses_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let faculty_id = optional_str(req, "facultyId")?;
    let courses = db::list_courses(conn, faculty_id.as_deref(), state.config.default_settings())
        .map_err(db_err("db_query_failed"))?;
    Ok(json!({ "courses": courses }))
}

fn handle_courses_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let code = required_str(req, "code")?;
    let name = required_str(req, "name")?;
    let semester = req
        .params
        .get("semester")
        .and_then(|v| v.as_i64())
        .filter(|s| *s > 0)
        .ok_or_else(|| HandlerErr::bad_params("semester must be a positive integer"))?;
    let department_id = optional_str(req, "departmentId")?;

    let id = uuid::Uuid::new_v4().to_string();
    db::create_course(
        conn,
        &NewCourse {
            id: &id,
            code: &code,
            name: &name,
            semester,
            department_id: department_id.as_deref(),
        },
    )
    .map_err(db_err("db_insert_failed"))?;
    let course = db::get_course(conn, &id, state.config.default_settings())
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::new("not_found", "course vanished after insert"))?;
    tracing::info!(course = %code, "course created");
    Ok(json!({ "course": course }))
}

fn handle_courses_assign(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = required_str(req, "courseId")?;
    let faculty_id = optional_str(req, "facultyId")?;

    if let Some(fid) = faculty_id.as_deref() {
        let user = db::get_user(conn, fid)
            .map_err(db_err("db_query_failed"))?
            .ok_or_else(|| HandlerErr::new("not_found", format!("user not found: {fid}")))?;
        if user.role != Role::Faculty {
            return Err(HandlerErr::bad_params(format!(
                "{} is not a faculty member",
                user.name
            )));
        }
    }

    let found = db::assign_course(conn, &course_id, faculty_id.as_deref())
        .map_err(db_err("db_insert_failed"))?;
    if !found {
        return Err(HandlerErr::new(
            "not_found",
            format!("course not found: {course_id}"),
        ));
    }
    Ok(json!({ "courseId": course_id, "assignedFacultyId": faculty_id }))
}

fn handle_users_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = match optional_str(req, "role")? {
        Some(r) => Some(
            Role::parse(&r)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {r}")))?,
        ),
        None => None,
    };
    let department_id = optional_str(req, "departmentId")?;
    let users = db::list_users(conn, role, department_id.as_deref())
        .map_err(db_err("db_query_failed"))?;
    Ok(json!({ "users": users }))
}

fn handle_users_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role_raw = required_str(req, "role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {role_raw}")))?;
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: required_str(req, "name")?,
        email: required_str(req, "email")?,
        role,
        department_id: optional_str(req, "departmentId")?,
    };
    db::create_user(conn, &user).map_err(db_err("db_insert_failed"))?;
    Ok(json!({ "user": user }))
}

fn handle_students_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student = Student {
        id: uuid::Uuid::new_v4().to_string(),
        usn: required_str(req, "usn")?,
        name: required_str(req, "name")?,
    };
    db::create_student(conn, &student).map_err(db_err("db_insert_failed"))?;
    Ok(json!({ "student": student }))
}

fn handle_students_enroll(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = required_str(req, "courseId")?;
    let student_ids = string_list(req, "studentIds")?;

    if db::get_course(conn, &course_id, state.config.default_settings())
        .map_err(db_err("db_query_failed"))?
        .is_none()
    {
        return Err(HandlerErr::new(
            "not_found",
            format!("course not found: {course_id}"),
        ));
    }
    for sid in &student_ids {
        if !db::student_exists(conn, sid).map_err(db_err("db_query_failed"))? {
            return Err(HandlerErr::new("not_found", format!("student not found: {sid}")));
        }
    }
    let added = db::enroll(conn, &course_id, &student_ids).map_err(db_err("db_insert_failed"))?;
    Ok(json!({ "courseId": course_id, "added": added }))
}

fn handle_students_list(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = optional_str(req, "courseId")?;
    let students =
        db::list_students(conn, course_id.as_deref()).map_err(db_err("db_query_failed"))?;
    Ok(json!({ "students": students }))
}

fn handle_marks_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = required_str(req, "courseId")?;
    let assessment = optional_str(req, "assessment")?;
    let student_id = optional_str(req, "studentId")?;
    let marks = db::list_marks(
        conn,
        &MarksFilter {
            course_id: Some(&course_id),
            assessment: assessment.as_deref(),
            student_id: student_id.as_deref(),
        },
    )
    .map_err(db_err("db_query_failed"))?;
    Ok(json!({ "marks": marks }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.list" => handle_courses_list(state, req),
        "courses.create" => handle_courses_create(state, req),
        "courses.assign" => handle_courses_assign(state, req),
        "users.list" => handle_users_list(state, req),
        "users.create" => handle_users_create(state, req),
        "students.create" => handle_students_create(state, req),
        "students.enroll" => handle_students_enroll(state, req),
        "students.list" => handle_students_list(state, req),
        "marks.list" => handle_marks_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
