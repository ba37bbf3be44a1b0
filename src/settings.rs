use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub bind: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Cinetpay {
    pub url: String,
    pub api_key: String,
    pub site_id: String,
    pub notify_url: String,
    pub return_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Identity {
    pub url: String,
    pub api_key: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Payout {
    /// UTC hour of day (0-23) the daily accrual cycle starts at.
    #[serde(default)]
    pub hour_utc: u32,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page_size() -> i64 {
    200
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub postgres: Postgres,
    pub server: Server,
    pub cinetpay: Cinetpay,
    pub identity: Identity,
    pub payout: Payout,
}

impl Settings {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn parses_full_config() {
        let raw = r#"
            [postgres]
            url = "postgres://localhost/allocations"

            [server]
            bind = "127.0.0.1:8080"

            [cinetpay]
            url = "https://api-checkout.cinetpay.com"
            api_key = "key"
            site_id = "site"
            notify_url = "https://example.com/notify"
            return_url = "https://example.com/return"

            [identity]
            url = "https://identity.example.com"
            api_key = "key"

            [payout]
            hour_utc = 3
            page_size = 50
        "#;

        let settings: Settings = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server.bind, "127.0.0.1:8080");
        assert_eq!(settings.payout.hour_utc, 3);
        assert_eq!(settings.payout.page_size, 50);
    }

    #[test]
    fn payout_section_defaults() {
        let raw = r#"
            [postgres]
            url = "postgres://localhost/allocations"

            [server]
            bind = "127.0.0.1:8080"

            [cinetpay]
            url = "u"
            api_key = "k"
            site_id = "s"
            notify_url = "n"
            return_url = "r"

            [identity]
            url = "u"
            api_key = "k"

            [payout]
        "#;

        let settings: Settings = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.payout.hour_utc, 0);
        assert_eq!(settings.payout.page_size, 200);
    }
}
