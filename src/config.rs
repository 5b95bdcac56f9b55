//! Command line and environment configuration.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// vidhub - video platform API server
#[derive(Parser, Debug, Clone)]
#[command(name = "vidhub")]
#[command(about = "Video platform API backend over an embedded sled database")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Directory of the sled database
    #[arg(long, env = "DATABASE_PATH", default_value = "vidhub.db")]
    pub database_path: PathBuf,

    /// Use a throwaway database that is deleted on exit
    #[arg(long, env = "TEMPORARY_DATABASE", default_value = "false")]
    pub temporary_database: bool,

    /// Where uploaded media is stored
    #[arg(long, env = "MEDIA_DIR", default_value = "media")]
    pub media_dir: PathBuf,

    /// Public URL prefix of MEDIA_DIR
    #[arg(long, env = "MEDIA_BASE_URL", default_value = "http://127.0.0.1:8080/media")]
    pub media_base_url: String,

    /// Key signing the identity cookie, at least 32 bytes
    #[arg(long, env = "SESSION_KEY")]
    pub session_key: String,

    /// Only send the identity cookie over https
    #[arg(long, env = "SECURE_COOKIES", default_value = "false")]
    pub secure_cookies: bool,

    /// bcrypt work factor for new passwords
    #[arg(long, env = "BCRYPT_COST", default_value = "12")]
    pub bcrypt_cost: u32,

    /// Log filter, as understood by env_logger
    #[arg(long, env = "RUST_LOG", default_value = "vidhub=debug,actix_web=info")]
    pub log_level: String,
}

impl Args {
    pub fn open_database(&self) -> sled::Result<sled::Db> {
        if self.temporary_database {
            sled::Config::new().temporary(true).open()
        } else {
            sled::Config::new().path(&self.database_path).open()
        }
    }
}
