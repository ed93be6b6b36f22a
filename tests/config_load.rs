//! Configuration loading, defaults and validation.
use microlink::config::Config;

#[tokio::test]
async fn create_default_then_load_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    let path = path.to_str().unwrap();

    Config::create_default(path).await.expect("create default");
    let config = Config::load(path).await.expect("load");
    assert_eq!(config.ups.baud_rate, 9600);
    assert_eq!(config.link.poll_interval_ms, 250);
    assert_eq!(config.logging.level, "info");
}

#[tokio::test]
async fn minimal_config_fills_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    tokio::fs::write(&path, "[ups]\nport = \"/dev/ttyUSB0\"\n")
        .await
        .unwrap();
    let config = Config::load(path.to_str().unwrap()).await.expect("load");
    assert_eq!(config.ups.port, "/dev/ttyUSB0");
    assert_eq!(config.link.liveness_timeout_ms, 5000);
    assert!(config.logging.file.is_none());
}

#[test]
fn validation_rejects_bad_values() {
    let mut config = Config::default();
    config.link.poll_interval_ms = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.link.liveness_timeout_ms = config.link.poll_interval_ms;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.logging.level = "loud".to_string();
    assert!(config.validate().is_err());

    assert!(Config::default().validate().is_ok());
}
