pub mod config {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, Clone)]
    pub struct Config {
        pub db_url: String,
        #[serde(default = "default_port")]
        pub port: u16,
        pub jwt_secret: String,
        /// Token that turns a sign-up into an admin account. Admin sign-up is disabled when unset.
        #[serde(default)]
        pub admin_invite_token: Option<String>,
        /// Origin of the single-page frontend allowed to make credentialed requests.
        #[serde(default)]
        pub front_end_url: Option<String>,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            let settings = config::Config::builder()
                .add_source(config::Environment::default())
                .build()?;

            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }
    }

    fn default_port() -> u16 {
        8080
    }
}

pub mod auth;
pub mod entities;
pub mod report;
pub mod task;
pub mod user;
pub mod web;
