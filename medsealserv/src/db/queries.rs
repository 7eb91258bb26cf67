// Database query functions for users and patients
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use crate::db::{DbPool, DbResult, NewPatient, NewUser, Patient, PatientChanges, User, schema::*};

// ==================== USER QUERIES ====================

pub fn find_user_by_email(db: &DbPool, email: &str) -> DbResult<Option<User>> {
    let mut conn = db.lock().map_err(|_| "database mutex poisoned")?;
    let result = users::table
        .filter(users::email.eq(email))
        .first::<User>(&mut *conn)
        .optional()?;

    Ok(result)
}

/// Insert a user and return the stored row (with its assigned id).
/// `None` when the email is already taken.
pub fn insert_user(db: &DbPool, user: NewUser<'_>) -> DbResult<Option<User>> {
    use diesel::insert_into;

    let mut conn = db.lock().map_err(|_| "database mutex poisoned")?;
    let inserted = conn.transaction(|conn| {
        insert_into(users::table)
            .values(&user)
            .execute(conn)?;

        users::table
            .filter(users::email.eq(user.email))
            .first::<User>(conn)
    });

    match inserted {
        Ok(user) => Ok(Some(user)),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ==================== PATIENT QUERIES ====================

pub fn list_patients(db: &DbPool) -> DbResult<Vec<Patient>> {
    let mut conn = db.lock().map_err(|_| "database mutex poisoned")?;
    let result = patients::table
        .order(patients::id.asc())
        .load::<Patient>(&mut *conn)?;

    Ok(result)
}

pub fn get_patient(db: &DbPool, patient_id: i32) -> DbResult<Option<Patient>> {
    let mut conn = db.lock().map_err(|_| "database mutex poisoned")?;
    let result = patients::table
        .find(patient_id)
        .first::<Patient>(&mut *conn)
        .optional()?;

    Ok(result)
}

/// Insert a patient and return the stored row (with its assigned id)
pub fn insert_patient(db: &DbPool, patient: NewPatient<'_>) -> DbResult<Patient> {
    use diesel::insert_into;

    let mut conn = db.lock().map_err(|_| "database mutex poisoned")?;
    conn.transaction(|conn| {
        insert_into(patients::table)
            .values(&patient)
            .execute(conn)?;

        patients::table
            .order(patients::id.desc())
            .first::<Patient>(conn)
    })
    .map_err(Into::into)
}

/// Returns false when no patient has that id
pub fn update_patient(db: &DbPool, patient_id: i32, changes: PatientChanges<'_>) -> DbResult<bool> {
    use diesel::update;

    let mut conn = db.lock().map_err(|_| "database mutex poisoned")?;
    let updated = update(patients::table.find(patient_id))
        .set(&changes)
        .execute(&mut *conn)?;

    Ok(updated > 0)
}

/// Returns false when no patient has that id
pub fn delete_patient(db: &DbPool, patient_id: i32) -> DbResult<bool> {
    use diesel::delete;

    let mut conn = db.lock().map_err(|_| "database mutex poisoned")?;
    let deleted = delete(patients::table.find(patient_id)).execute(&mut *conn)?;

    Ok(deleted > 0)
}
