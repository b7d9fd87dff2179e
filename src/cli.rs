//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::{Database, NewUser};
use crate::jwt::{DEFAULT_ACCESS_TOKEN_TTL_MINUTES, parse_algorithm};
use crate::password::{hash_password, validate_password, validate_username};
use crate::session::{DEFAULT_REFRESH_TOKEN_TTL_DAYS, MIN_REFRESH_TOKEN_NBYTES};
use clap::Parser;
use jsonwebtoken::Algorithm;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// One year.
const MAX_ACCESS_TOKEN_TTL_MINUTES: i64 = 525_600;
/// About a century.
const MAX_REFRESH_TOKEN_TTL_DAYS: i64 = 36_500;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rotor",
    about = "JWT authentication service with rotating refresh tokens"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Path to SQLite database file (":memory:" for a throwaway database)
    #[arg(short, long, env = "DATABASE_PATH", default_value = "rotor.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Signing algorithm for access tokens
    #[arg(long, env = "JWT_ALGORITHM", default_value = "HS256", value_parser = parse_algorithm)]
    pub jwt_algorithm: Algorithm,

    /// Access token lifetime in minutes
    #[arg(long, env = "ACCESS_TOKEN_TTL_MINUTES", default_value_t = DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
        value_parser = clap::value_parser!(i64).range(1..=MAX_ACCESS_TOKEN_TTL_MINUTES))]
    pub access_token_ttl_minutes: i64,

    /// Refresh session lifetime in days
    #[arg(long, env = "REFRESH_TOKEN_TTL_DAYS", default_value_t = DEFAULT_REFRESH_TOKEN_TTL_DAYS,
        value_parser = clap::value_parser!(i64).range(1..=MAX_REFRESH_TOKEN_TTL_DAYS))]
    pub refresh_token_ttl_days: i64,

    /// Random bytes per refresh token
    #[arg(long, env = "REFRESH_TOKEN_NBYTES", default_value = "32", value_parser = parse_refresh_token_nbytes)]
    pub refresh_token_nbytes: usize,

    /// Number of trusted reverse proxies that append to X-Forwarded-For
    #[arg(long, env = "NUM_PROXIES", default_value = "0")]
    pub num_proxies: usize,

    /// Create (or promote) a superuser with this username on startup. The
    /// password is read from SUPERUSER_PASSWORD
    #[arg(long, value_name = "USERNAME")]
    pub create_superuser: Option<String>,

    /// Email for the superuser created by --create-superuser
    #[arg(long, env = "SUPERUSER_EMAIL")]
    pub superuser_email: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Log level filter, e.g. "info" or "rotor=debug,sqlx=warn"
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

fn parse_refresh_token_nbytes(s: &str) -> Result<usize, String> {
    let nbytes: usize = s
        .parse()
        .map_err(|_| format!("Not a byte count: {}", s))?;

    if nbytes < MIN_REFRESH_TOKEN_NBYTES {
        return Err(format!(
            "Refresh tokens need at least {} random bytes",
            MIN_REFRESH_TOKEN_NBYTES
        ));
    }

    Ok(nbytes)
}

/// Initialize logging based on the specified format and level filter.
pub fn init_logging(format: &LogFormat, level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Handle the --create-superuser flag: create the account, or promote it if
/// the username is already taken.
pub async fn handle_create_superuser(db: &Database, username: &str, email: Option<&str>) {
    let password = match std::env::var("SUPERUSER_PASSWORD") {
        Ok(password) => {
            // SAFETY: single-threaded startup, same as JWT_SECRET
            unsafe { std::env::remove_var("SUPERUSER_PASSWORD") };
            password
        }
        Err(_) => {
            error!("SUPERUSER_PASSWORD must be set when using --create-superuser");
            std::process::exit(1);
        }
    };

    match db.users().get_by_username(username).await {
        Ok(Some(existing)) => {
            if let Err(e) = db.users().set_flags(existing.id, true, true).await {
                error!(error = %e, "Failed to promote user");
                std::process::exit(1);
            }
            info!(user_id = existing.id, username = %existing.username, "Existing user promoted to superuser");
        }
        Ok(None) => {
            if let Err(msg) =
                validate_username(username).and_then(|()| validate_password(&password, username))
            {
                error!("Cannot create superuser: {}", msg);
                std::process::exit(1);
            }

            let password_hash = match hash_password(&password) {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Failed to hash superuser password");
                    std::process::exit(1);
                }
            };

            let default_email = format!("{}@localhost", username);
            let user = NewUser {
                username,
                email: email.unwrap_or(default_email.as_str()),
                first_name: "",
                last_name: "",
                password_hash: &password_hash,
                is_staff: true,
                is_superuser: true,
            };

            match db.users().create(&user).await {
                Ok(created) => {
                    info!(user_id = created.id, username = %created.username, "Superuser created");
                }
                Err(e) => {
                    error!(error = %e, "Failed to create superuser");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing user");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    let mut config = ServerConfig::new(db, jwt_secret.into_bytes());
    config.jwt_algorithm = args.jwt_algorithm;
    config.access_token_ttl = chrono::Duration::minutes(args.access_token_ttl_minutes);
    config.refresh_token_ttl = chrono::Duration::days(args.refresh_token_ttl_days);
    config.refresh_token_nbytes = args.refresh_token_nbytes;
    config.num_proxies = args.num_proxies;
    config
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["rotor"]).unwrap();
        assert_eq!(args.port, 8000);
        assert_eq!(args.jwt_algorithm, Algorithm::HS256);
        assert_eq!(args.access_token_ttl_minutes, 15);
        assert_eq!(args.refresh_token_ttl_days, 30);
        assert_eq!(args.refresh_token_nbytes, 32);
        assert_eq!(args.num_proxies, 0);
    }

    #[test]
    fn test_rejects_short_refresh_tokens() {
        assert!(Args::try_parse_from(["rotor", "--refresh-token-nbytes", "16"]).is_err());
        let args = Args::try_parse_from(["rotor", "--refresh-token-nbytes", "48"]).unwrap();
        assert_eq!(args.refresh_token_nbytes, 48);
    }

    #[test]
    fn test_rejects_asymmetric_algorithm() {
        assert!(Args::try_parse_from(["rotor", "--jwt-algorithm", "RS256"]).is_err());
        let args = Args::try_parse_from(["rotor", "--jwt-algorithm", "HS384"]).unwrap();
        assert_eq!(args.jwt_algorithm, Algorithm::HS384);
    }

    #[test]
    fn test_rejects_zero_ttl() {
        assert!(Args::try_parse_from(["rotor", "--access-token-ttl-minutes", "0"]).is_err());
    }

    #[test]
    fn test_rejects_unbounded_ttl() {
        let huge = i64::MAX.to_string();
        let huge = huge.as_str();
        assert!(Args::try_parse_from(["rotor", "--access-token-ttl-minutes", huge]).is_err());
        assert!(Args::try_parse_from(["rotor", "--refresh-token-ttl-days", huge]).is_err());
        assert!(Args::try_parse_from(["rotor", "--refresh-token-ttl-days", "36501"]).is_err());

        let args = Args::try_parse_from([
            "rotor",
            "--access-token-ttl-minutes",
            "525600",
            "--refresh-token-ttl-days",
            "36500",
        ])
        .unwrap();
        assert_eq!(args.access_token_ttl_minutes, 525_600);
        assert_eq!(args.refresh_token_ttl_days, 36_500);
    }
}
