use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use medseal::secrets::{EnvSecretProvider, FileSecretProvider, SecretProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Clients only see generic error text.
    Secure,
    /// Error bodies also carry the diagnostic detail.
    Development,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "medsealserv", version, about = "medseal encrypted login and patient record server")]
pub struct Config {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "MEDSEAL_HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "MEDSEAL_PORT")]
    pub port: u16,

    /// SQLite database file
    #[arg(long, default_value = "database.db", env = "MEDSEAL_DATABASE_URL")]
    pub database_url: String,

    /// `iss` claim of issued tokens
    #[arg(long, default_value = "medseal", env = "JWT_ISSUER")]
    pub jwt_issuer: String,

    /// `aud` claim of issued tokens
    #[arg(long, default_value = "medseal-ui", env = "JWT_AUDIENCE")]
    pub jwt_audience: String,

    /// Read startup secrets from files in this directory instead of the environment
    #[arg(long, env = "MEDSEAL_SECRETS_DIR")]
    pub secrets_dir: Option<PathBuf>,

    /// Environment variable prefix for startup secrets (`<prefix>SCP`, `<prefix>PKCS_SECRET_KEY`)
    #[arg(long, default_value = "MEDSEAL_", env = "MEDSEAL_SECRET_PREFIX")]
    pub secret_prefix: String,

    /// Browser origin allowed by the CORS policy
    #[arg(long, default_value = "http://localhost:4200", env = "MEDSEAL_CORS_ORIGIN")]
    pub cors_origin: String,

    #[arg(long, value_enum, default_value_t = Mode::Secure, env = "MEDSEAL_MODE")]
    pub mode: Mode,

    /// Insert the demo accounts and patients into an empty database
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "MEDSEAL_SEED")]
    pub seed: bool,
}

impl Config {
    pub fn secret_provider(&self) -> Box<dyn SecretProvider> {
        match &self.secrets_dir {
            Some(dir) => Box::new(FileSecretProvider::new(dir)),
            None => Box::new(EnvSecretProvider::new(self.secret_prefix.clone())),
        }
    }

    pub fn is_development(&self) -> bool {
        self.mode == Mode::Development
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_and_seed_flags() {
        let config = Config::parse_from([
            "medsealserv",
            "--database-url", "test.db",
            "--mode", "development",
            "--seed", "false",
        ]);
        assert_eq!(config.database_url, "test.db");
        assert!(config.is_development());
        assert!(!config.seed);
        assert_eq!(config.cors_origin, "http://localhost:4200");
    }
}
