//! Unit tests for global configuration parsing.

use std::path::Path;

use channel_pilot::{AppError, GlobalConfig};

#[test]
fn defaults_apply_when_fields_are_missing() {
    let config = GlobalConfig::from_toml_str("").expect("parse");
    assert_eq!(config.http_port, 3000);
    assert_eq!(config.storage_path, Path::new("accounts.json"));
    assert_eq!(config.mention.text, "@唐诗修仙");
    assert!(config.mention.entity_ref.is_some());
}

#[test]
fn explicit_values_override_defaults() {
    let config = GlobalConfig::from_toml_str(
        r#"
http_port = 8800
storage_path = "/var/lib/pilot/accounts.json"

[mention]
text = "@bot"
"#,
    )
    .expect("parse");

    assert_eq!(config.http_port, 8800);
    assert_eq!(config.storage_path, Path::new("/var/lib/pilot/accounts.json"));
    assert_eq!(config.mention.text, "@bot");
}

#[test]
fn empty_mention_text_is_rejected() {
    let err = GlobalConfig::from_toml_str(
        r#"
[mention]
text = ""
"#,
    )
    .expect_err("empty mention must fail validation");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = GlobalConfig::from_toml_str("http_port = ]").expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn mention_token_carries_the_entity_ref() {
    let config = GlobalConfig::from_toml_str("").expect("parse");
    let token = config.mention_token();
    assert_eq!(token.text, config.mention.text);
    assert_eq!(token.entity_ref, config.mention.entity_ref);
}
