use std::{env, fs, time::Duration};

use sitegate_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("sitegate.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081

[logging]
level = "debug"

[auth]
issuer = "https://accounts.example.com"

[auth.tokens]
short_duration = "15m"
long_duration = "7d"

[auth.signing]
algorithm = "HS256"
secret = "0123456789abcdef0123456789abcdef"

[auth.broker]
allowed_schemes = ["myapp://", "https://www.example.com/"]
api_hostname = "https://api.example.com/"

[auth.broker.providers.google]
client_id = "google-client"
client_secret = "google-secret"

[[bootstrap.accounts]]
username = "Ada@Example.com"
password = "hunter22"
fname = "Ada"
lname = "Lovelace"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.auth.issuer, "https://accounts.example.com");
    assert_eq!(cfg.auth.tokens.short_duration, Duration::from_secs(15 * 60));
    assert_eq!(cfg.auth.tokens.long_secs(), 7 * 24 * 3600);
    assert_eq!(cfg.auth.broker.fallback_scheme(), "https://www.example.com/");
    assert_eq!(
        cfg.auth.broker.response_url(),
        "https://api.example.com/account/oauth-response/"
    );
    assert_eq!(cfg.auth.broker.providers.google.client_id, "google-client");
    assert_eq!(cfg.bootstrap.accounts.len(), 1);

    // 2) Env override should win over file
    unsafe {
        env::set_var("SITEGATE__AUTH__TOKENS__SHORT_DURATION", "30m");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.auth.tokens.short_secs(), 30 * 60);
    unsafe {
        env::remove_var("SITEGATE__AUTH__TOKENS__SHORT_DURATION");
    }

    // 3) A short HS256 secret fails auth validation
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[auth.signing]
secret = "too-short"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("auth config error"));

    // 4) Unknown log level
    let bad_level = dir.path().join("bad_level.toml");
    fs::write(&bad_level, "[logging]\nlevel = \"loud\"\n").expect("write toml");
    let err = load_config(bad_level.to_str()).expect_err("expected validation error");
    assert!(err.contains("logging.level"));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let err = load_config(path.to_str()).expect_err("explicit path must exist");
    assert!(err.contains("config build error"));
    assert!(err.contains("absent.toml"));
}

#[test]
fn no_path_without_default_file_uses_defaults() {
    // the crate directory carries no sitegate.toml
    let cfg = load_config(None).expect("defaults are valid");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.auth.signing.algorithm, "HS256");
    assert!(cfg.bootstrap.accounts.is_empty());
}
