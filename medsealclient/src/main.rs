mod modules {
    pub mod auth;
    pub mod patients;
}

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "medsealclient", version, about = "medseal encrypted login and patient record client")]
struct Args {
    /// Server base URL
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "MEDSEAL_SERVER")]
    server: String,

    #[arg(long, default_value = "doctor1@healthcare.com", env = "MEDSEAL_EMAIL")]
    email: String,

    #[arg(long, env = "MEDSEAL_PASSWORD")]
    password: String,

    /// Fetch one record (patient accounts) instead of the full list (doctor accounts)
    #[arg(long)]
    patient_id: Option<i32>,
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%Y-%m-%dT%H:%M:%S".to_string());

    if std::env::var("SERVER_LOG").unwrap_or_default() == "true" {
        let file_appender = tracing_appender::rolling::RollingFileAppender::new(
            tracing_appender::rolling::Rotation::DAILY,
            "./logs",
            "medseal-client.log"
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::writer::MakeWriterExt::and(non_blocking, std::io::stdout))
            .with_target(false)
            .with_env_filter("info")
            .with_timer(timer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_env_filter("info")
            .with_timer(timer)
            .init();

        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = init_tracing();
    let base_url = args.server.trim_end_matches('/');

    tracing::info!("Starting medseal client against {}\n", base_url);
    let client = reqwest::Client::new();

    tracing::info!("Step 1: Fetching server public key...");
    let public_key = modules::auth::fetch_public_key(&client, base_url).await?;
    tracing::info!("✅ Received {}-byte PEM public key\n", public_key.len());

    tracing::info!("Step 2: Encrypted login...");
    let token = modules::auth::login(&client, base_url, &public_key, &args.email, &args.password).await?;
    tracing::info!("✅ Logged in, token: {}...\n", token_preview(&token));

    match args.patient_id {
        Some(patient_id) => {
            tracing::info!("Step 3: Fetching patient {} with an encrypted id...", patient_id);
            let patient = modules::patients::get(&client, base_url, &token, &public_key, patient_id).await?;
            tracing::info!(
                "✅ {} {} <{}> born {} record: {}",
                patient.first_name, patient.last_name, patient.email, patient.date_of_birth, patient.medical_record
            );
        }
        None => {
            tracing::info!("Step 3: Fetching patient list...");
            let patients = modules::patients::list(&client, base_url, &token).await?;
            tracing::info!("✅ Decrypted {} patient records", patients.len());
            for patient in &patients {
                tracing::info!("  #{} {} {} <{}>", patient.id, patient.first_name, patient.last_name, patient.email);
            }
        }
    }

    Ok(())
}

/// First 30 characters; the token is server-supplied and may not be ASCII.
fn token_preview(token: &str) -> String {
    token.chars().take(30).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_preview_respects_char_boundaries() {
        assert_eq!(token_preview("short"), "short");
        assert_eq!(token_preview(&"a".repeat(40)).len(), 30);
        let multibyte = "é".repeat(40);
        assert_eq!(token_preview(&multibyte).chars().count(), 30);
    }
}
