#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::time::Duration;

use figment::Jail;
use pretty_assertions::assert_eq;

use robolink_config::{ConfigError, Settings, load_settings, save_settings};

const FILE: &str = "robolink.toml";

fn load(jail: &Jail) -> figment::error::Result<Settings> {
    let path = jail.directory().join(FILE);
    load_settings(Some(&path)).map_err(|e| e.to_string().into())
}

#[test]
fn missing_file_yields_defaults() {
    Jail::expect_with(|jail| {
        assert_eq!(load(jail)?, Settings::default());
        Ok(())
    });
}

#[test]
fn file_overrides_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            FILE,
            r#"
                api_url = "http://robot.lan:5000"
                max_queue_len = 10
                background_poll_ms = 60000
            "#,
        )?;

        let settings = load(jail)?;
        assert_eq!(settings.api_url, "http://robot.lan:5000");
        assert_eq!(settings.max_queue_len, 10);
        assert_eq!(settings.background_poll_ms, 60_000);
        assert_eq!(settings.max_retries, 3);
        Ok(())
    });
}

#[test]
fn environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file(FILE, "max_retries = 4\nreconnect_base_ms = 500")?;
        jail.set_env("ROBOLINK_MAX_RETRIES", "7");
        jail.set_env("ROBOLINK_CHANNEL_URL", "wss://robot.lan/ws");
        jail.set_env("ROBOLINK_RECONNECT_CAP_MS", "4000");

        let config = load(jail)?
            .into_sync_config()
            .map_err(|e| e.to_string())?;
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.channel_url.as_str(), "wss://robot.lan/ws");
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(500));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(4));
        Ok(())
    });
}

#[test]
fn malformed_file_is_a_figment_error() {
    Jail::expect_with(|jail| {
        jail.create_file(FILE, "max_retries = \"many\"")?;
        let path = jail.directory().join(FILE);
        let err = load_settings(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Figment(_)));
        Ok(())
    });
}

fn validation_field(settings: Settings) -> String {
    match settings.into_sync_config() {
        Err(ConfigError::Validation { field, .. }) => field,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn validation_rejects_bad_values() {
    assert_eq!(
        validation_field(Settings {
            reconnect_base_ms: 2_000,
            reconnect_cap_ms: 1_000,
            ..Settings::default()
        }),
        "reconnect_cap_ms"
    );
    assert_eq!(
        validation_field(Settings {
            channel_url: "http://robot.lan/ws".into(),
            ..Settings::default()
        }),
        "channel_url"
    );
    assert_eq!(
        validation_field(Settings {
            api_url: "not a url".into(),
            ..Settings::default()
        }),
        "api_url"
    );
    assert_eq!(
        validation_field(Settings {
            request_timeout_ms: 0,
            ..Settings::default()
        }),
        "request_timeout_ms"
    );
    assert_eq!(
        validation_field(Settings {
            max_queue_len: 0,
            ..Settings::default()
        }),
        "max_queue_len"
    );
    assert_eq!(
        validation_field(Settings {
            low_battery_threshold: 101,
            ..Settings::default()
        }),
        "low_battery_threshold"
    );
}

#[test]
fn saved_settings_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let settings = Settings {
        api_url: "http://10.0.0.7:5000".into(),
        ping_interval_ms: 15_000,
        ..Settings::default()
    };

    let written = save_settings(&settings, Some(&path)).unwrap();
    assert_eq!(written, path);
    assert!(Path::new(&written).exists());

    let text = std::fs::read_to_string(&written).unwrap();
    let back: Settings = toml::from_str(&text).unwrap();
    assert_eq!(back, settings);
}
