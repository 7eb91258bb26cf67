// Database initialization and connection management
use chrono::{NaiveDate, NaiveDateTime};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use std::sync::{Arc, Mutex};

use medseal::server::password::hash_password;

use super::models::{NewPatient, NewUser};

pub type DbPool = Arc<Mutex<SqliteConnection>>;
pub type DbResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Open (or create) the SQLite database at `database_url`
pub fn init_db(database_url: &str) -> DbResult<DbPool> {
    Ok(Arc::new(Mutex::new(SqliteConnection::establish(database_url)?)))
}

/// Create tables and indexes if they are missing
pub fn run_migrations(db: &DbPool) -> DbResult<()> {
    use diesel::sql_query;
    use diesel::RunQueryDsl;

    let mut conn = db.lock().map_err(|_| "database mutex poisoned")?;

    let statements = [
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            user_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'Patient'
        )",

        "CREATE TABLE IF NOT EXISTS patients (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            date_of_birth TIMESTAMP NOT NULL,
            email TEXT NOT NULL,
            medical_record TEXT,
            password_hash TEXT
        )",

        "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
        "CREATE INDEX IF NOT EXISTS idx_patients_email ON patients(email)",
    ];

    for statement in statements {
        sql_query(statement).execute(&mut *conn)?;
    }
    tracing::debug!("✅ Tables and indexes created/verified");

    Ok(())
}

const DEMO_USERS: [(&str, &str, &str, &str); 4] = [
    ("admin", "admin@healthcare.com", "Admin123!", "Admin"),
    ("doctor1", "doctor1@healthcare.com", "Doctor123!", "Doctor"),
    ("patient1", "patient1@healthcare.com", "Patient123!", "Patient"),
    ("patient2", "patient2@healthcare.com", "Patient123!", "Patient"),
];

/// Insert the demo accounts and patients, each table only when it is empty
pub fn seed_demo_data(db: &DbPool) -> DbResult<()> {
    use diesel::insert_into;
    use diesel::prelude::*;
    use super::schema::{patients, users};

    let mut conn = db.lock().map_err(|_| "database mutex poisoned")?;

    let user_count: i64 = users::table.count().get_result(&mut *conn)?;
    if user_count == 0 {
        for (user_name, email, password, role) in DEMO_USERS {
            let password_hash = hash_password(password)?;
            insert_into(users::table)
                .values(&NewUser { user_name, email, password_hash: &password_hash, role })
                .execute(&mut *conn)?;
        }
        tracing::info!("Seeded {} demo accounts", DEMO_USERS.len());
    }

    let patient_count: i64 = patients::table.count().get_result(&mut *conn)?;
    if patient_count == 0 {
        let demo_patients = [
            NewPatient {
                first_name: "John",
                last_name: "Doe",
                date_of_birth: midnight(1990, 5, 14)?,
                email: "patient1@healthcare.com",
                medical_record: Some("Record1"),
                password_hash: None,
            },
            NewPatient {
                first_name: "Jane",
                last_name: "Smith",
                date_of_birth: midnight(1985, 3, 22)?,
                email: "patient2@healthcare.com",
                medical_record: Some("Record2"),
                password_hash: None,
            },
        ];
        insert_into(patients::table)
            .values(&demo_patients[..])
            .execute(&mut *conn)?;
        tracing::info!("Seeded {} demo patients", demo_patients.len());
    }

    Ok(())
}

fn midnight(year: i32, month: u32, day: u32) -> DbResult<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("invalid date {}-{}-{}", year, month, day).into())
}
