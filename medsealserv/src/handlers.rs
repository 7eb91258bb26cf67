use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use medseal::server::cipher::open_wrapped;
use medseal::server::context::ServerContext;
use medseal::server::envelope::{seal_json, WrappedEnvelope};
use medseal::server::login::LoginOrchestrator;
use medseal::server::password::hash_password;
use medseal::server::token::Role;
use medseal::ServerError;

use crate::auth::{optional_claims, require_role};
use crate::config::Config;
use crate::db::{self, DbCredentialStore, DbPool, NewPatient, NewUser, PatientChanges, PatientDto};

const MIN_PASSWORD_LEN: usize = 8;
const NAME_LEN: std::ops::RangeInclusive<usize> = 2..=50;
const PATIENT_WRITERS: &[Role] = &[Role::Doctor, Role::Admin];

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Log the failure and answer with its generic text; the detail only goes
/// out in development mode.
fn error_response(e: &ServerError, config: &Config) -> HttpResponse {
    e.log_security_event();
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(ErrorBody {
        error: e.public_message(),
        details: config.is_development().then(|| e.to_string()),
    })
}

fn store_error(e: Box<dyn std::error::Error + Send + Sync>) -> ServerError {
    ServerError::Store(e.to_string())
}

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn check_password(password: &str) -> Result<(), ServerError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServerError::MalformedPayload(format!("password shorter than {} characters", MIN_PASSWORD_LEN)));
    }
    Ok(())
}

fn not_found(what: &'static str) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorBody { error: what, details: None })
}

async fn run_blocking<T, F>(work: F) -> Result<T, ServerError>
where
    F: FnOnce() -> Result<T, ServerError> + Send + 'static,
    T: Send + 'static,
{
    web::block(work).await.map_err(|e| {
        tracing::error!("Blocking task failed: {}", e);
        ServerError::WorkerFailed
    })?
}

pub async fn public_key(
    ctx: web::Data<ServerContext>,
    config: web::Data<Config>,
) -> HttpResponse {
    match ctx.keys().public_key_pem() {
        Ok(pem) => HttpResponse::Ok().json(serde_json::json!({ "publicKey": pem })),
        Err(e) => {
            tracing::error!("Public key requested before the key store was loaded");
            error_response(&e, &config)
        }
    }
}

pub async fn login(
    ctx: web::Data<ServerContext>,
    db: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Bytes,
) -> HttpResponse {
    let envelope = match serde_json::from_slice::<WrappedEnvelope>(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Failed to deserialize login envelope");
            return error_response(&ServerError::MalformedPayload(format!("login envelope: {}", e)), &config);
        }
    };

    let login = LoginOrchestrator::new(ctx.into_inner(), DbCredentialStore::new(db.get_ref().clone()));
    match login.run(envelope).await.into_result() {
        Ok(sealed) => {
            tracing::info!("✅ Login succeeded, token sealed for delivery");
            HttpResponse::Ok().json(sealed)
        }
        Err(e) => error_response(&e, &config),
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(alias = "Email")]
    email: String,
    #[serde(alias = "Password", alias = "PasswordHash", alias = "passwordHash")]
    password: String,
    #[serde(default, alias = "UserName", alias = "userName")]
    user_name: Option<String>,
    #[serde(default, alias = "Role")]
    role: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RegisteredUser {
    id: i32,
    email: String,
    role: String,
}

/// Create an account. Anyone may register as a patient; any other role
/// needs an admin token.
pub async fn register(
    req: HttpRequest,
    ctx: web::Data<ServerContext>,
    db: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Bytes,
) -> HttpResponse {
    let request = match serde_json::from_slice::<RegisterRequest>(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&ServerError::MalformedPayload(format!("register body: {}", e)), &config),
    };

    let email = request.email.trim().to_string();
    if !is_email(&email) {
        return error_response(&ServerError::MalformedPayload("email is not an address".to_string()), &config);
    }
    if let Err(e) = check_password(&request.password) {
        return error_response(&e, &config);
    }

    let role = match request.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        None => Role::Patient,
        Some(raw) => match raw.parse::<Role>() {
            Ok(role) => role,
            Err(e) => return error_response(&e, &config),
        },
    };

    if role != Role::Patient {
        match optional_claims(&req, ctx.tokens()) {
            Ok(Some(claims)) if claims.role == Role::Admin => {}
            Ok(_) => return error_response(&ServerError::Forbidden, &config),
            Err(e) => return error_response(&e, &config),
        }
    }

    let user_name = request
        .user_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
    let password = request.password;
    let db = db.get_ref().clone();

    let result = run_blocking(move || {
        if db::find_user_by_email(&db, &email).map_err(store_error)?.is_some() {
            return Ok(None);
        }
        let password_hash = hash_password(&password)?;
        // a concurrent registration can still win the race; the UNIQUE index decides
        db::insert_user(&db, NewUser {
            user_name: &user_name,
            email: &email,
            password_hash: &password_hash,
            role: role.as_str(),
        })
        .map_err(store_error)
    })
    .await;

    match result {
        Ok(Some(user)) => {
            tracing::info!("Registered user {} with role {}", user.id, user.role);
            HttpResponse::Ok().json(RegisteredUser { id: user.id, email: user.email, role: user.role })
        }
        Ok(None) => {
            tracing::info!("Rejected registration: email already in use");
            HttpResponse::BadRequest().json(ErrorBody { error: "User already exists", details: None })
        }
        Err(e) => error_response(&e, &config),
    }
}

pub async fn list_patients(
    req: HttpRequest,
    ctx: web::Data<ServerContext>,
    db: web::Data<DbPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let claims = match require_role(&req, ctx.tokens(), &[Role::Doctor]) {
        Ok(claims) => claims,
        Err(e) => return error_response(&e, &config),
    };

    let db = db.get_ref().clone();
    let result = run_blocking(move || {
        let patients: Vec<PatientDto> = db::list_patients(&db)
            .map_err(store_error)?
            .into_iter()
            .map(PatientDto::from)
            .collect();
        seal_json(&patients)
    })
    .await;

    match result {
        Ok(sealed) => {
            tracing::info!("Patient list sent to user {}", claims.user_id);
            HttpResponse::Ok().json(sealed)
        }
        Err(e) => error_response(&e, &config),
    }
}

#[derive(Deserialize)]
struct PatientLookup {
    #[serde(alias = "Id")]
    id: i32,
}

/// The patient id travels encrypted in the query string
/// (`encryptedData`, `encryptedKey`, `iv`).
pub async fn get_patient(
    req: HttpRequest,
    path: web::Path<String>,
    ctx: web::Data<ServerContext>,
    db: web::Data<DbPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let claims = match require_role(&req, ctx.tokens(), &[Role::Patient]) {
        Ok(claims) => claims,
        Err(e) => return error_response(&e, &config),
    };

    let envelope = match web::Query::<WrappedEnvelope>::from_query(req.query_string()) {
        Ok(query) => query.into_inner(),
        Err(e) => return error_response(&ServerError::MalformedPayload(format!("patient query: {}", e)), &config),
    };

    let context = ctx.into_inner();
    let lookup = run_blocking(move || {
        let plaintext = open_wrapped(context.keys(), &envelope)?;
        serde_json::from_slice::<PatientLookup>(&plaintext)
            .map_err(|e| ServerError::MalformedPayload(format!("patient id: {}", e)))
    })
    .await;

    let patient_id = match lookup {
        Ok(lookup) => lookup.id,
        Err(e) => return error_response(&e, &config),
    };

    if let Ok(path_id) = path.parse::<i32>() {
        if path_id != patient_id {
            return error_response(&ServerError::MalformedPayload("path and payload ids differ".to_string()), &config);
        }
    }

    let include_record = config.is_development();
    let db = db.get_ref().clone();
    let result = run_blocking(move || match db::get_patient(&db, patient_id).map_err(store_error)? {
        Some(patient) => seal_json(&PatientDto::from_patient(patient, include_record)).map(Some),
        None => Ok(None),
    })
    .await;

    match result {
        Ok(Some(sealed)) => {
            tracing::info!("Patient record {} sent to user {}", patient_id, claims.user_id);
            HttpResponse::Ok().json(sealed)
        }
        Ok(None) => not_found("Patient not found"),
        Err(e) => error_response(&e, &config),
    }
}

/// Plain JSON body of the patient write endpoints.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PatientRequest {
    #[serde(default, alias = "id")]
    id: Option<i32>,
    #[serde(alias = "firstName")]
    first_name: String,
    #[serde(alias = "lastName")]
    last_name: String,
    #[serde(default, alias = "dateOfBirth")]
    date_of_birth: Option<String>,
    #[serde(alias = "email")]
    email: String,
    #[serde(default, alias = "password")]
    password: Option<String>,
    #[serde(default, alias = "medicalRecord")]
    medical_record: Option<String>,
}

struct PatientFields {
    first_name: String,
    last_name: String,
    email: String,
}

impl PatientRequest {
    /// Trimmed names and email, checked against the patient field rules.
    fn checked_fields(&self) -> Result<PatientFields, ServerError> {
        let first_name = self.first_name.trim();
        let last_name = self.last_name.trim();
        let email = self.email.trim();

        for (field, value) in [("first name", first_name), ("last name", last_name)] {
            if !NAME_LEN.contains(&value.chars().count()) {
                return Err(ServerError::MalformedPayload(format!(
                    "{} must be {} to {} characters",
                    field,
                    NAME_LEN.start(),
                    NAME_LEN.end()
                )));
            }
        }
        if !is_email(email) {
            return Err(ServerError::MalformedPayload("email is not an address".to_string()));
        }

        Ok(PatientFields {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
        })
    }
}

/// Accepts `1990-05-14T00:00:00` (fractional seconds allowed) or `1990-05-14`.
fn parse_date_of_birth(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0))
}

fn parse_patient_request(body: &[u8]) -> Result<PatientRequest, ServerError> {
    serde_json::from_slice::<PatientRequest>(body)
        .map_err(|e| ServerError::MalformedPayload(format!("patient body: {}", e)))
}

/// Create a patient. The password is always stored as an Argon2id hash; the
/// medical record only comes back in development mode.
pub async fn create_patient(
    req: HttpRequest,
    ctx: web::Data<ServerContext>,
    db: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Bytes,
) -> HttpResponse {
    let claims = match require_role(&req, ctx.tokens(), PATIENT_WRITERS) {
        Ok(claims) => claims,
        Err(e) => return error_response(&e, &config),
    };

    let request = match parse_patient_request(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e, &config),
    };
    let fields = match request.checked_fields() {
        Ok(fields) => fields,
        Err(e) => return error_response(&e, &config),
    };
    let password = request.password.unwrap_or_default();
    if let Err(e) = check_password(&password) {
        return error_response(&e, &config);
    }
    let Some(date_of_birth) = request.date_of_birth.as_deref().and_then(parse_date_of_birth) else {
        return error_response(&ServerError::MalformedPayload("date of birth missing or not a date".to_string()), &config);
    };

    let medical_record = request.medical_record;
    let include_record = config.is_development();
    let db = db.get_ref().clone();
    let result = run_blocking(move || {
        let password_hash = hash_password(&password)?;
        let patient = db::insert_patient(&db, NewPatient {
            first_name: &fields.first_name,
            last_name: &fields.last_name,
            date_of_birth,
            email: &fields.email,
            medical_record: medical_record.as_deref(),
            password_hash: Some(&password_hash),
        })
        .map_err(store_error)?;
        let id = patient.id;
        seal_json(&PatientDto::from_patient(patient, include_record)).map(|sealed| (id, sealed))
    })
    .await;

    match result {
        Ok((id, sealed)) => {
            tracing::info!("Patient {} created by user {}", id, claims.user_id);
            HttpResponse::Created()
                .insert_header(("Location", format!("/api/patients/{}", id)))
                .json(sealed)
        }
        Err(e) => error_response(&e, &config),
    }
}

/// Update names and email. The body must carry the path's id; the medical
/// record is only writable in development mode.
pub async fn update_patient(
    req: HttpRequest,
    path: web::Path<i32>,
    ctx: web::Data<ServerContext>,
    db: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Bytes,
) -> HttpResponse {
    let claims = match require_role(&req, ctx.tokens(), PATIENT_WRITERS) {
        Ok(claims) => claims,
        Err(e) => return error_response(&e, &config),
    };

    let patient_id = path.into_inner();
    let request = match parse_patient_request(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e, &config),
    };
    if request.id != Some(patient_id) {
        return error_response(&ServerError::MalformedPayload("path and body ids differ".to_string()), &config);
    }
    let fields = match request.checked_fields() {
        Ok(fields) => fields,
        Err(e) => return error_response(&e, &config),
    };

    let medical_record = config.is_development().then_some(request.medical_record);
    let db = db.get_ref().clone();
    let result = run_blocking(move || {
        db::update_patient(&db, patient_id, PatientChanges {
            first_name: &fields.first_name,
            last_name: &fields.last_name,
            email: &fields.email,
            medical_record: medical_record.as_ref().map(Option::as_deref),
        })
        .map_err(store_error)
    })
    .await;

    match result {
        Ok(true) => {
            tracing::info!("Patient {} updated by user {}", patient_id, claims.user_id);
            HttpResponse::NoContent().finish()
        }
        Ok(false) => not_found("Patient not found"),
        Err(e) => error_response(&e, &config),
    }
}

pub async fn delete_patient(
    req: HttpRequest,
    path: web::Path<i32>,
    ctx: web::Data<ServerContext>,
    db: web::Data<DbPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let claims = match require_role(&req, ctx.tokens(), PATIENT_WRITERS) {
        Ok(claims) => claims,
        Err(e) => return error_response(&e, &config),
    };

    let patient_id = path.into_inner();
    let db = db.get_ref().clone();
    match run_blocking(move || db::delete_patient(&db, patient_id).map_err(store_error)).await {
        Ok(true) => {
            tracing::info!("Patient {} deleted by user {}", patient_id, claims.user_id);
            HttpResponse::NoContent().finish()
        }
        Ok(false) => not_found("Patient not found"),
        Err(e) => error_response(&e, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use clap::Parser;
    use medseal::client::crypto::{open_raw, seal_for_server};
    use medseal::server::envelope::RawEnvelope;
    use medseal::server::keystore::KeyStore;
    use medseal::server::token::TokenIssuer;

    const SERVER_KEY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../medseal/tests/fixtures/server_key_pkcs8.pem"));

    struct Harness {
        _dir: tempfile::TempDir,
        ctx: web::Data<ServerContext>,
        db: web::Data<DbPool>,
        config: web::Data<Config>,
    }

    fn harness(mode: &str) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handlers.db");
        let db = db::init::init_db(path.to_str().unwrap()).unwrap();
        db::init::run_migrations(&db).unwrap();
        db::init::seed_demo_data(&db).unwrap();

        let keys = KeyStore::new();
        keys.load(&serde_json::json!({ "PKCS": SERVER_KEY }).to_string()).unwrap();
        let tokens = TokenIssuer::new(b"handler-test-signing-secret", "medseal", "medseal-ui").unwrap();
        let config = Config::parse_from(["medsealserv", "--database-url", path.to_str().unwrap(), "--mode", mode]);

        Harness {
            _dir: dir,
            ctx: web::Data::new(ServerContext::new(keys, tokens).unwrap()),
            db: web::Data::new(db),
            config: web::Data::new(config),
        }
    }

    macro_rules! app {
        ($h:expr) => {
            test::init_service(
                App::new()
                    .app_data($h.ctx.clone())
                    .app_data($h.db.clone())
                    .app_data($h.config.clone())
                    .configure(crate::configure_routes),
            )
            .await
        };
    }

    fn login_body(h: &Harness, email: &str, password: &str) -> WrappedEnvelope {
        let pem = h.ctx.keys().public_key_pem().unwrap();
        seal_for_server(&serde_json::json!({ "email": email, "password": password }), pem).unwrap()
    }

    fn bearer(h: &Harness, email: &str, role: Role, user_id: i64) -> (&'static str, String) {
        let token = h.ctx.tokens().issue(email, role, user_id).unwrap();
        ("Authorization", format!("Bearer {}", token))
    }

    fn query_escape(value: &str) -> String {
        value.replace('+', "%2B").replace('/', "%2F").replace('=', "%3D")
    }

    #[actix_web::test]
    async fn serves_public_key_on_both_prefixes() {
        let h = harness("secure");
        let app = app!(h);

        for uri in ["/auth/public-key", "/api/auth/get-public-key"] {
            let body: serde_json::Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri(uri).to_request()).await;
            let pem = body["publicKey"].as_str().unwrap();
            assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----\n"));
            assert!(pem.ends_with("-----END PUBLIC KEY-----\n"));
        }
    }

    #[actix_web::test]
    async fn doctor_login_returns_sealed_token() {
        let h = harness("secure");
        let app = app!(h);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(login_body(&h, "doctor1@healthcare.com", "Doctor123!"))
            .to_request();
        let sealed: RawEnvelope = test::call_and_read_body_json(&app, req).await;

        let token = open_raw(&sealed).unwrap();
        let claims = h.ctx.tokens().validate(std::str::from_utf8(&token).unwrap()).unwrap();
        assert_eq!(claims.role, Role::Doctor);
        assert_eq!(claims.sub, "doctor1@healthcare.com");
    }

    #[actix_web::test]
    async fn failed_login_hides_details_in_secure_mode() {
        let h = harness("secure");
        let app = app!(h);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(login_body(&h, "doctor1@healthcare.com", "wrong-password"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, serde_json::json!({ "error": "Invalid credentials" }));
    }

    #[actix_web::test]
    async fn development_mode_adds_details() {
        let h = harness("development");
        let app = app!(h);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_payload(r#"{"EncryptedData":"AAAA"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid request data format");
        assert!(body["details"].as_str().unwrap().contains("EncryptedKey"));
    }

    #[actix_web::test]
    async fn patient_list_is_doctor_only() {
        let h = harness("secure");
        let app = app!(h);

        let anonymous = test::call_service(&app, test::TestRequest::get().uri("/patients").to_request()).await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let as_patient = test::TestRequest::get()
            .uri("/patients")
            .insert_header(bearer(&h, "patient1@healthcare.com", Role::Patient, 3))
            .to_request();
        assert_eq!(test::call_service(&app, as_patient).await.status(), StatusCode::FORBIDDEN);

        let as_doctor = test::TestRequest::get()
            .uri("/api/patients")
            .insert_header(bearer(&h, "doctor1@healthcare.com", Role::Doctor, 2))
            .to_request();
        let sealed: RawEnvelope = test::call_and_read_body_json(&app, as_doctor).await;
        let patients: serde_json::Value = serde_json::from_slice(&open_raw(&sealed).unwrap()).unwrap();
        assert_eq!(patients.as_array().unwrap().len(), 2);
        assert_eq!(patients[0]["FirstName"], "John");
        assert_eq!(patients[0]["DateOfBirth"], "1990-05-14T00:00:00");
        assert_eq!(patients[1]["MedicalRecord"], "Record2");
    }

    fn lookup_uri(h: &Harness, id: i32) -> String {
        let pem = h.ctx.keys().public_key_pem().unwrap();
        let envelope = seal_for_server(&serde_json::json!({ "id": id }), pem).unwrap();
        format!(
            "/patients/{}?encryptedData={}&encryptedKey={}&iv={}",
            id,
            query_escape(&envelope.encrypted_data),
            query_escape(&envelope.encrypted_key),
            query_escape(&envelope.iv),
        )
    }

    async fn open_json<B: actix_web::body::MessageBody>(resp: actix_web::dev::ServiceResponse<B>) -> serde_json::Value {
        let sealed: RawEnvelope = test::read_body_json(resp).await;
        serde_json::from_slice(&open_raw(&sealed).unwrap()).unwrap()
    }

    #[actix_web::test]
    async fn patient_fetches_record_by_encrypted_id() {
        let h = harness("secure");
        let app = app!(h);

        let found = test::TestRequest::get()
            .uri(&lookup_uri(&h, 2))
            .insert_header(bearer(&h, "patient2@healthcare.com", Role::Patient, 4))
            .to_request();
        let patient = open_json(test::call_service(&app, found).await).await;
        assert_eq!(patient["Id"], 2);
        assert_eq!(patient["LastName"], "Smith");
        assert_eq!(patient["MedicalRecord"], "");

        let missing = test::TestRequest::get()
            .uri(&lookup_uri(&h, 99))
            .insert_header(bearer(&h, "patient2@healthcare.com", Role::Patient, 4))
            .to_request();
        assert_eq!(test::call_service(&app, missing).await.status(), StatusCode::NOT_FOUND);

        let garbage_key = test::TestRequest::get()
            .uri(&format!("/patients/1?encryptedData=AAAA&encryptedKey={}&iv=AAAA", query_escape(&BASE64.encode([1u8; 256]))))
            .insert_header(bearer(&h, "patient1@healthcare.com", Role::Patient, 3))
            .to_request();
        assert_eq!(test::call_service(&app, garbage_key).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn development_mode_returns_medical_record_by_id() {
        let h = harness("development");
        let app = app!(h);

        let req = test::TestRequest::get()
            .uri(&lookup_uri(&h, 2))
            .insert_header(bearer(&h, "patient2@healthcare.com", Role::Patient, 4))
            .to_request();
        let patient = open_json(test::call_service(&app, req).await).await;
        assert_eq!(patient["MedicalRecord"], "Record2");
    }

    fn new_patient_body() -> serde_json::Value {
        serde_json::json!({
            "FirstName": "Alan",
            "LastName": "Turing",
            "DateOfBirth": "1912-06-23",
            "Email": "alan@healthcare.com",
            "Password": "Enigma1912!",
            "MedicalRecord": "Record3",
        })
    }

    #[actix_web::test]
    async fn doctor_creates_updates_and_deletes_a_patient() {
        let h = harness("secure");
        let app = app!(h);
        let doctor = || bearer(&h, "doctor1@healthcare.com", Role::Doctor, 2);

        let req = test::TestRequest::post()
            .uri("/api/patients")
            .insert_header(doctor())
            .set_json(new_patient_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers().get("Location").unwrap(), "/api/patients/3");
        let created = open_json(resp).await;
        assert_eq!(created["Id"], 3);
        assert_eq!(created["DateOfBirth"], "1912-06-23T00:00:00");
        assert_eq!(created["MedicalRecord"], "");
        assert!(created.get("Password").is_none());

        let stored = db::get_patient(&h.db, 3).unwrap().unwrap();
        assert_eq!(stored.medical_record.as_deref(), Some("Record3"));
        assert!(stored.password_hash.unwrap().starts_with("$argon2id$"));

        let update = serde_json::json!({
            "Id": 3,
            "FirstName": "Alan",
            "LastName": "Mathison",
            "Email": "alan@healthcare.com",
            "MedicalRecord": "overwritten",
        });
        let req = test::TestRequest::put().uri("/patients/3").insert_header(doctor()).set_json(&update).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        let stored = db::get_patient(&h.db, 3).unwrap().unwrap();
        assert_eq!(stored.last_name, "Mathison");
        assert_eq!(stored.medical_record.as_deref(), Some("Record3"));

        let req = test::TestRequest::put().uri("/patients/4").insert_header(doctor()).set_json(&update).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::delete().uri("/patients/3").insert_header(doctor()).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        let req = test::TestRequest::delete().uri("/patients/3").insert_header(doctor()).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::put().uri("/patients/3").insert_header(doctor()).set_json(&update).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn development_mode_writes_and_returns_medical_record() {
        let h = harness("development");
        let app = app!(h);
        let admin = || bearer(&h, "admin@healthcare.com", Role::Admin, 1);

        let req = test::TestRequest::post().uri("/patients").insert_header(admin()).set_json(new_patient_body()).to_request();
        let created = open_json(test::call_service(&app, req).await).await;
        assert_eq!(created["MedicalRecord"], "Record3");

        let update = serde_json::json!({
            "id": 3,
            "firstName": "Alan",
            "lastName": "Turing",
            "email": "alan@healthcare.com",
            "medicalRecord": "Record3b",
        });
        let req = test::TestRequest::put().uri("/patients/3").insert_header(admin()).set_json(&update).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        assert_eq!(db::get_patient(&h.db, 3).unwrap().unwrap().medical_record.as_deref(), Some("Record3b"));
    }

    #[actix_web::test]
    async fn patient_writes_check_role_and_fields() {
        let h = harness("secure");
        let app = app!(h);

        let anonymous = test::TestRequest::post().uri("/patients").set_json(new_patient_body()).to_request();
        assert_eq!(test::call_service(&app, anonymous).await.status(), StatusCode::UNAUTHORIZED);

        let as_patient = test::TestRequest::delete()
            .uri("/patients/1")
            .insert_header(bearer(&h, "patient1@healthcare.com", Role::Patient, 3))
            .to_request();
        assert_eq!(test::call_service(&app, as_patient).await.status(), StatusCode::FORBIDDEN);

        let invalid = [
            ("FirstName", serde_json::json!("A")),
            ("LastName", serde_json::json!("x".repeat(51))),
            ("Email", serde_json::json!("not-an-address")),
            ("Password", serde_json::json!("short")),
            ("DateOfBirth", serde_json::json!("23/06/1912")),
        ];
        for (field, value) in invalid {
            let mut body = new_patient_body();
            body[field] = value;
            let req = test::TestRequest::post()
                .uri("/patients")
                .insert_header(bearer(&h, "doctor1@healthcare.com", Role::Doctor, 2))
                .set_json(&body)
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST, "{}", field);
        }
        assert_eq!(db::list_patients(&h.db).unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn registration_defaults_to_patient_and_rejects_duplicates() {
        let h = harness("secure");
        let app = app!(h);
        let body = serde_json::json!({ "email": "patient3@healthcare.com", "password": "Patient123!" });

        let req = test::TestRequest::post().uri("/api/auth/register").set_json(&body).to_request();
        let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(created["Email"], "patient3@healthcare.com");
        assert_eq!(created["Role"], "Patient");

        let again = test::TestRequest::post().uri("/api/auth/register").set_json(&body).to_request();
        assert_eq!(test::call_service(&app, again).await.status(), StatusCode::BAD_REQUEST);

        let doctor = serde_json::json!({ "email": "doctor2@healthcare.com", "password": "Doctor123!", "role": "Doctor" });
        let req = test::TestRequest::post().uri("/auth/register").set_json(&doctor).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .insert_header(bearer(&h, "admin@healthcare.com", Role::Admin, 1))
            .set_json(&doctor)
            .to_request();
        let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(created["Role"], "Doctor");
    }
}
