use dotenv::dotenv;
use std::env;
use std::num::ParseIntError;

error_chain! {
    foreign_links {
        Var(env::VarError);
        ParseInt(ParseIntError);
    }

    errors {
        InvalidValue(key: &'static str, value: String) {
            description("invalid configuration value")
            display("invalid value for {}: {:?}", key, value)
        }
    }
}

pub const MAX_JWT_TTL_DAYS: i64 = 3650;

const DEFAULT_ORIGINS: &str = "http://localhost:4173,http://localhost:5173,http://localhost:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_pool_size: u32,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_ttl_days: i64,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        dotenv().ok();
        Config::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source, so tests don't
    /// have to touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => bail!("{} must be set", key),
            }
        };

        let jwt_ttl_days = parse_or(&lookup, "JWT_TTL_DAYS", 7i64)?;
        if !(1..=MAX_JWT_TTL_DAYS).contains(&jwt_ttl_days) {
            return Err(ErrorKind::InvalidValue("JWT_TTL_DAYS", jwt_ttl_days.to_string()).into());
        }

        let database_pool_size = parse_or(&lookup, "DATABASE_POOL_SIZE", 10u32)?;
        if database_pool_size == 0 {
            return Err(ErrorKind::InvalidValue("DATABASE_POOL_SIZE", "0".into()).into());
        }

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            database_pool_size,
            jwt_secret: required("JWT_SECRET")?,
            jwt_issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "lolify".to_string()),
            jwt_ttl_days,
            port: parse_or(&lookup, "PORT", 4000u16)?,
            cors_origins,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr<Err = ParseIntError>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .chain_err(|| ErrorKind::InvalidValue(key, value.clone())),
        None => Ok(default),
    }
}
