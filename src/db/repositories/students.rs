use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::parse_datetime,
    models::{NewStudent, PeCourse, Student},
};
use crate::error::{Error, Result};

fn row_to_student(row: &Row) -> Result<Student> {
    let registered_at: String = row.get("registered_at")?;
    let pe_course: String = row.get("pe_course")?;

    Ok(Student {
        id: row.get("id")?,
        student_no: row.get("student_no")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        pe_course: PeCourse::parse(&pe_course)?,
        block_section: row.get("block_section")?,
        rfid: row.get("rfid")?,
        registered_at: parse_datetime(&registered_at, "registered_at")?,
        is_active: row.get("is_active")?,
    })
}

const STUDENT_COLUMNS: &str =
    "id, student_no, first_name, last_name, pe_course, block_section, rfid, registered_at, is_active";

/// Inserts a validated registration. Uniqueness of the student number and the
/// RFID tag is checked up front so callers get a typed conflict instead of a
/// raw constraint violation.
pub(crate) fn insert_student(
    conn: &Connection,
    new: &NewStudent,
    registered_at: DateTime<Utc>,
) -> Result<Student> {
    if find_student_by_no(conn, &new.student_no)?.is_some() {
        return Err(Error::DuplicateStudentNo(new.student_no.clone()));
    }
    if let Some(rfid) = &new.rfid {
        if find_student_by_rfid(conn, rfid)?.is_some() {
            return Err(Error::DuplicateRfid(rfid.clone()));
        }
    }

    conn.execute(
        "INSERT INTO gym_students (student_no, first_name, last_name, pe_course, block_section, rfid, registered_at, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
        params![
            new.student_no,
            new.first_name,
            new.last_name,
            new.pe_course.as_str(),
            new.block_section,
            new.rfid,
            registered_at.to_rfc3339(),
        ],
    )?;

    Ok(Student {
        id: conn.last_insert_rowid(),
        student_no: new.student_no.clone(),
        first_name: new.first_name.clone(),
        last_name: new.last_name.clone(),
        pe_course: new.pe_course,
        block_section: new.block_section.clone(),
        rfid: new.rfid.clone(),
        registered_at,
        is_active: true,
    })
}

pub(crate) fn find_student_by_no(conn: &Connection, student_no: &str) -> Result<Option<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM gym_students WHERE student_no = ?1"
    ))?;
    let mut rows = stmt.query(params![student_no])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_student(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn find_student_by_rfid(conn: &Connection, rfid: &str) -> Result<Option<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM gym_students WHERE rfid = ?1"
    ))?;
    let mut rows = stmt.query(params![rfid])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_student(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn find_student_by_id(conn: &Connection, id: i64) -> Result<Option<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM gym_students WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_student(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn list_students(conn: &Connection) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM gym_students ORDER BY last_name, first_name"
    ))?;
    let mut rows = stmt.query([])?;
    let mut students = Vec::new();
    while let Some(row) = rows.next()? {
        students.push(row_to_student(row)?);
    }
    Ok(students)
}

pub(crate) fn update_student_profile(
    conn: &Connection,
    id: i64,
    pe_course: PeCourse,
    block_section: &str,
    rfid: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE gym_students
         SET pe_course = ?1,
             block_section = ?2,
             rfid = ?3
         WHERE id = ?4",
        params![pe_course.as_str(), block_section, rfid, id],
    )?;
    Ok(())
}

pub(crate) fn delete_student(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM gym_students WHERE id = ?1", params![id])?;
    Ok(())
}

impl Database {
    pub async fn register_student(&self, new: NewStudent) -> Result<Student> {
        let new = new.validated()?;
        self.execute(move |conn| insert_student(conn, &new, Utc::now()))
            .await
    }

    pub async fn get_student_by_no(&self, student_no: &str) -> Result<Student> {
        let student_no = student_no.to_string();
        self.execute(move |conn| {
            find_student_by_no(conn, &student_no)?
                .ok_or_else(|| Error::StudentNotFound(student_no.clone()))
        })
        .await
    }

    pub async fn get_student_by_rfid(&self, rfid: &str) -> Result<Student> {
        let rfid = rfid.to_string();
        self.execute(move |conn| {
            find_student_by_rfid(conn, &rfid)?.ok_or_else(|| Error::RfidNotFound(rfid.clone()))
        })
        .await
    }

    /// Binds an RFID tag to a registered student.
    pub async fn assign_rfid(&self, student_no: &str, rfid: &str) -> Result<Student> {
        let student_no = student_no.to_string();
        let rfid = rfid.to_string();
        self.execute(move |conn| {
            let student = find_student_by_no(conn, &student_no)?
                .ok_or_else(|| Error::StudentNotFound(student_no.clone()))?;
            if let Some(existing) = find_student_by_rfid(conn, &rfid)? {
                if existing.id != student.id {
                    return Err(Error::DuplicateRfid(rfid.clone()));
                }
            }
            conn.execute(
                "UPDATE gym_students SET rfid = ?1 WHERE id = ?2",
                params![rfid, student.id],
            )?;
            Ok(Student {
                rfid: Some(rfid),
                ..student
            })
        })
        .await
    }

    pub async fn list_students(&self) -> Result<Vec<Student>> {
        self.execute(|conn| list_students(conn)).await
    }
}
