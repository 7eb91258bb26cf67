// Database models for medseal
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use medseal::server::login::StoredCredential;
use medseal::server::token::Role;
use medseal::ServerError;

use super::schema::*;

#[derive(Queryable, Clone, Debug)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub user_name: String,
    pub email: String,                 // login identity
    pub password_hash: String,         // Argon2id PHC string
    pub role: String,                  // "Admin", "Doctor" or "Patient"
}

impl User {
    pub fn into_credential(self) -> Result<StoredCredential, ServerError> {
        let role = self
            .role
            .parse::<Role>()
            .map_err(|_| ServerError::Store(format!("user {} has unknown role '{}'", self.id, self.role)))?;

        Ok(StoredCredential {
            user_id: i64::from(self.id),
            identity: self.email,
            password_hash: self.password_hash,
            role,
        })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub user_name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
}

#[derive(Queryable, Clone, Debug)]
#[diesel(table_name = patients)]
pub struct Patient {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDateTime,
    pub email: String,
    pub medical_record: Option<String>,
    pub password_hash: Option<String>,  // Argon2id PHC string, never sent out
}

#[derive(Insertable, Debug)]
#[diesel(table_name = patients)]
pub struct NewPatient<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub date_of_birth: NaiveDateTime,
    pub email: &'a str,
    pub medical_record: Option<&'a str>,
    pub password_hash: Option<&'a str>,
}

/// Fields a patient update may touch. `medical_record: None` leaves the
/// stored record alone; `Some(None)` clears it.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = patients)]
pub struct PatientChanges<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub medical_record: Option<Option<&'a str>>,
}

/// Outbound patient record, sealed before it leaves the server.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PatientDto {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDateTime,
    pub email: String,
    pub medical_record: String,
}

impl PatientDto {
    /// Blank out the medical record unless `include_record` is set.
    pub fn from_patient(patient: Patient, include_record: bool) -> Self {
        let dto = Self::from(patient);
        if include_record {
            dto
        } else {
            Self { medical_record: String::new(), ..dto }
        }
    }
}

impl From<Patient> for PatientDto {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            first_name: patient.first_name,
            last_name: patient.last_name,
            date_of_birth: patient.date_of_birth,
            email: patient.email,
            medical_record: patient.medical_record.unwrap_or_default(),
        }
    }
}
