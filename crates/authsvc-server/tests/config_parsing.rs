use std::{env, fs, time::Duration};

use authsvc_server::ServerBuilder;
use authsvc_server::config::loader::load_config;

const SECRET_B64: &str = "YXV0aHN2Yy10ZXN0LXNlY3JldC0wMTIzNDU2Nzg5YWI=";

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("authsvc.toml");

    let toml_content = format!(
        r#"
[server]
host = "127.0.0.1"
port = 8091
request_timeout_ms = 5000

[logging]
level = "debug"

[introspection]
max_token_bytes = 4096
max_cache_ttl = "2m"
negative_cache_ttl = "15s"
verification_timeout = "500ms"

[introspection.cache]
capacity = 512
shards = 8
sweep_interval = "10s"

[[trust.keys]]
kid = "2024-10"
issuer = "https://auth.example.com"
algorithm = "HS256"
secret = "{SECRET_B64}"
"#
    );
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8091);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.introspection.max_token_bytes, 4096);
    assert_eq!(cfg.introspection.max_cache_ttl, Duration::from_secs(120));
    assert_eq!(cfg.introspection.negative_cache_ttl, Duration::from_secs(15));
    assert_eq!(cfg.introspection.expired_cache_ttl, Duration::from_secs(10));
    assert_eq!(cfg.introspection.verification_timeout, Duration::from_millis(500));
    assert_eq!(cfg.introspection.cache.capacity, 512);
    assert_eq!(cfg.introspection.cache.shards, 8);
    assert_eq!(cfg.trust.keys.len(), 1);
    assert_eq!(cfg.trust.keys[0].kid, "2024-10");

    // The loaded config is enough to assemble a server.
    let server = ServerBuilder::new()
        .with_config(cfg)
        .build()
        .expect("server builds from config");
    assert!(server.state().engine.ready());

    // 2) Env override should win over file
    unsafe {
        env::set_var("AUTHSVC__SERVER__PORT", "9191");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.server.port, 9191);
    unsafe {
        env::remove_var("AUTHSVC__SERVER__PORT");
    }

    // 3) Invalid values are rejected by validation
    let invalid = r#"
[logging]
level = "loud"
"#;
    fs::write(&path, invalid).expect("write toml");
    let err = load_config(path.to_str()).expect_err("invalid level must fail");
    assert!(err.contains("logging.level"), "{err}");

    let invalid = r#"
[introspection]
max_cache_ttl = "10s"
negative_cache_ttl = "1m"
"#;
    fs::write(&path, invalid).expect("write toml");
    let err = load_config(path.to_str()).expect_err("negative ttl above max must fail");
    assert!(err.contains("introspection"), "{err}");

    let invalid = r#"
[[trust.keys]]
kid = "k1"
issuer = "https://auth.example.com"
algorithm = "HS256"
"#;
    fs::write(&path, invalid).expect("write toml");
    let err = load_config(path.to_str()).expect_err("key without material must fail");
    assert!(err.contains("trust"), "{err}");
}

#[test]
fn missing_explicit_config_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");
    let err = load_config(path.to_str()).expect_err("missing file");
    assert!(err.contains("not found"), "{err}");
}

#[test]
fn server_refuses_to_start_without_keys() {
    let err = ServerBuilder::new()
        .build()
        .err()
        .expect("no keys configured");
    assert!(err.to_string().contains("no verification keys"), "{err}");
}

#[test]
fn jwks_file_section_parses() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let jwks_path = dir.path().join("jwks.json");
    fs::write(
        &jwks_path,
        r#"{"keys":[{"kty":"oct","kid":"hs-1","k":"YXV0aHN2Yy10ZXN0LXNlY3JldC0wMTIzNDU2Nzg5YWI"}]}"#,
    )
    .expect("write jwks");

    let path = dir.path().join("authsvc.toml");
    let toml_content = format!(
        r#"
[trust.jwks_file]
path = "{}"
issuer = "https://auth.example.com"
watch = true
"#,
        jwks_path.display()
    );
    fs::write(&path, toml_content).expect("write toml");

    let cfg = load_config(path.to_str()).expect("should parse config");
    let jwks = cfg.trust.jwks_file.as_ref().expect("jwks section");
    assert!(jwks.watch);
    assert_eq!(jwks.path, jwks_path);

    let server = ServerBuilder::new().with_config(cfg).build().expect("builds");
    assert_eq!(server.state().engine.keys().snapshot().kids(), vec!["hs-1"]);
}
