use clap::{Parser, Subcommand, command};
use serde::{Deserialize, Serialize};

/**
 * Command-line arguments for the application.
 */
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct ApplicationArguments {
    /**
     * Path to the configuration file.
     */
    #[arg(short, long)]
    pub config_file: String,
    /**
     * Optional batch command. When absent the HTTP server is started.
     */
    #[command(subcommand)]
    pub command: Option<BatchCommand>,
}

/**
 * Batch commands which run against the database and exit instead of
 * starting the server.
 */
#[derive(Subcommand, Debug)]
pub enum BatchCommand {
    /**
     * Wipes and reloads all domain tables from the CSV datasets.
     */
    LoadData {
        /**
         * Directory containing countries.csv, artists.csv, charts.csv and clusters.csv.
         */
        #[arg(short, long, default_value = "datasets")]
        datasets_dir: String,
    },
    /**
     * Wipes all users and seeds an admin, managers and artist logins.
     */
    SeedUsers {
        /**
         * Number of manager accounts to create.
         */
        #[arg(short, long, default_value_t = 50)]
        managers: u32,
        /**
         * Password assigned to every seeded account.
         */
        #[arg(short, long, default_value = "password")]
        password: String,
    },
}

/**
 * Represents the configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /**
     * Logging configuration for the application.
     */
    pub logging: LoggingConfig,
    /**
     * Token authentication configuration for the application.
     */
    pub auth: AuthConfig,
    /**
     * Server configuration for the application.
     */
    pub server: Server,
    /**
     * Database configuration for the application.
     */
    pub database: Database,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /**
     * Whether to log the target of the log message.
     */
    pub target: bool,
    /**
     * Whether to log thread IDs .
     */
    pub thread_ids: bool,
    /**
     * Whether to log thread names.
     */
    pub thread_names: bool,
    /**
     * Whether to log line numbers.
     */
    pub line_number: bool,
    /**
     * Whether to log the log level.
     */
    pub level: bool,
    /**
     * Whether to use ANSI colors in logs.
     */
    pub ansi: bool,
    /**
     * Additional directives for logging configuration.
     */
    pub directives: Vec<String>,
}

impl LoggingConfig {
    #[allow(dead_code)]
    pub fn default() -> Self {
        LoggingConfig { target: true, thread_ids: true, thread_names: true, line_number: true, level: true, ansi: true, directives: vec![] }
    }
}

/**
 * Token authentication configuration.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /**
     * Shared secret used for signing and verifying tokens (HS256).
     */
    pub secret: String,
    /**
     * Lifetime of issued access tokens in seconds.
     */
    pub access_token_lifetime_secs: i64,
    /**
     * Lifetime of issued refresh tokens in seconds.
     */
    pub refresh_token_lifetime_secs: i64,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /**
     * Type of the database (e.g., `PostgreSQL`).
     */
    pub db_type: DatabaseType,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatabaseType {
    /**
     * `PostgreSQL` database type.
     */
    #[serde(rename_all = "camelCase")]
    Postgresql { connection_string: String, max_connections: u32, min_connections: u32, acquire_timeout: u64, acquire_slow_threshold: u64, idle_timeout: u64, max_lifetime: u64 },
}

/**
 * Represents the server configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /**
     * Number of worker threads for the server.
     */
    pub workers: usize,
    /**
     * HTTP port for the server.
     */
    pub http_port: Option<u16>,
    /**
     * HTTPS configuration for the server.
     */
    pub https_config: Option<HttpsConfig>,
}

/**
 * Represents the HTTPS configuration for the server.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpsConfig {
    /**
     * Port for the HTTPS server.
     */
    pub port: u16,
    /**
     * Path to the certificate file.
     */
    pub certificate_file: String,
    /**
     * Path to the private key file.
     */
    pub private_key_file: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config {
            logging: LoggingConfig::default(),
            auth: AuthConfig { secret: "change-me".to_string(), access_token_lifetime_secs: 300, refresh_token_lifetime_secs: 86400 },
            database: Database {
                db_type: DatabaseType::Postgresql {
                    connection_string: "postgres://localhost/chartflow".to_string(),
                    max_connections: 5,
                    min_connections: 1,
                    acquire_timeout: 30,
                    acquire_slow_threshold: 60,
                    idle_timeout: 300,
                    max_lifetime: 3600,
                },
            },
            server: Server { workers: 4, http_port: Some(8080), https_config: None },
        };
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config.logging.target, deserialized.logging.target);
        assert_eq!(config.logging.thread_ids, deserialized.logging.thread_ids);
        assert_eq!(config.logging.line_number, deserialized.logging.line_number);
        assert_eq!(config.logging.level, deserialized.logging.level);
        assert_eq!(config.logging.ansi, deserialized.logging.ansi);
        assert_eq!(config.logging.directives, deserialized.logging.directives);
        assert_eq!(config.auth.secret, deserialized.auth.secret);
        assert_eq!(config.auth.access_token_lifetime_secs, deserialized.auth.access_token_lifetime_secs);
        assert_eq!(config.auth.refresh_token_lifetime_secs, deserialized.auth.refresh_token_lifetime_secs);
        assert_eq!(config.server.workers, deserialized.server.workers);
        assert_eq!(config.server.http_port, deserialized.server.http_port);
        assert!(deserialized.server.https_config.is_none());
        let DatabaseType::Postgresql { connection_string, max_connections, .. } = deserialized.database.db_type;
        assert_eq!(connection_string, "postgres://localhost/chartflow");
        assert_eq!(max_connections, 5);
    }

    #[test]
    fn test_arguments_batch_command() {
        let args = ApplicationArguments::parse_from(["chartflow_api", "--config-file", "config.toml", "load-data", "--datasets-dir", "/tmp/datasets"]);
        assert_eq!(args.config_file, "config.toml");
        match args.command {
            Some(BatchCommand::LoadData { datasets_dir }) => assert_eq!(datasets_dir, "/tmp/datasets"),
            _ => panic!("Expected load-data command"),
        }
    }

    #[test]
    fn test_arguments_server_default() {
        let args = ApplicationArguments::parse_from(["chartflow_api", "--config-file", "config.toml"]);
        assert!(args.command.is_none());
    }
}
