//! Configuration loading, validation, and compilation tests.

use super::*;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
smtp:
  host: smtp.example.com
  port: 587
  username: mailer@example.com
  password: app-token
  tls: starttls
  tls_verify: true
  timeout: 15s
sender:
  address: no-reply@example.com
  display_name: "Campaign Team"
message:
  subject: "Hello {{Name}}"
  body: "<p>Hi {{Name}}, your code is {{Code}}</p>"
recipients:
  csv: recipients.csv
  recipient_column: email
mapping:
  Name: full_name
  Code: otp
delivery:
  workers: 5
  retries: 2
  backoff_base: 1s
  backoff_max: 30s
metrics:
  enabled: true
  port: 9191
"#;

const MINIMAL_CONFIG: &str = r#"
smtp:
  host: smtp.example.com
  port: 587
sender:
  address: no-reply@example.com
message:
  body: "<p>Hello {{email}}</p>"
recipients:
  addresses: "a@example.com, b@example.com"
"#;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

fn load(yaml: &str) -> Config {
    let file = write_config(yaml);
    Config::load(file.path()).unwrap()
}

#[test]
fn load_full_config() {
    let config = load(FULL_CONFIG);

    assert_eq!(config.smtp.host, "smtp.example.com");
    assert_eq!(config.smtp.port, 587);
    assert_eq!(config.smtp.tls, TlsMode::Starttls);
    assert_eq!(config.smtp.timeout, Duration::from_secs(15));
    assert_eq!(config.sender.display_name, "Campaign Team");
    assert_eq!(config.message.subject, "Hello {{Name}}");
    assert_eq!(config.recipients.recipient_column, "email");
    assert_eq!(config.mapping.get("Name").unwrap(), "full_name");
    assert_eq!(config.delivery.workers, 5);
    assert_eq!(config.delivery.retries, 2);
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.port, 9191);

    assert!(config.validate().is_ok());
}

#[test]
fn load_minimal_config_applies_defaults() {
    let config = load(MINIMAL_CONFIG);

    assert_eq!(config.smtp.tls, TlsMode::Starttls);
    assert!(config.smtp.tls_verify);
    assert_eq!(config.smtp.timeout, Duration::from_secs(10));
    assert_eq!(config.sender.display_name, "Bulk Sender App");
    assert_eq!(config.message.subject, "Your Personalized Message");
    assert_eq!(config.recipients.recipient_column, "email");
    assert!(config.mapping.is_empty());
    assert_eq!(config.delivery.workers, 3);
    assert_eq!(config.delivery.retries, 3);
    assert_eq!(config.delivery.backoff_base, Duration::from_secs(5));
    assert_eq!(config.delivery.backoff_max, Duration::from_secs(60));
    assert!(!config.metrics.enabled);

    assert!(config.validate().is_ok());
}

#[test]
fn load_missing_file_fails() {
    let result = Config::load(&PathBuf::from("/nonexistent/mailblast.yaml"));
    assert!(matches!(result, Err(crate::error::ConfigError::LoadError(_))));
}

#[test]
fn load_invalid_yaml_fails() {
    let file = write_config("smtp: [not, a, mapping");
    assert!(Config::load(file.path()).is_err());
}

#[test]
fn validate_collects_multiple_errors() {
    let mut config = load(FULL_CONFIG);
    config.smtp.host = "".to_string();
    config.sender.address = "not-an-address".to_string();
    config.delivery.workers = 0;

    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 3);
}

#[test]
fn validate_rejects_worker_count_out_of_bounds() {
    let mut config = load(FULL_CONFIG);

    config.delivery.workers = 0;
    assert!(config.validate().is_err());

    config.delivery.workers = MAX_WORKERS + 1;
    assert!(config.validate().is_err());

    config.delivery.workers = MAX_WORKERS;
    assert!(config.validate().is_ok());
}

#[test]
fn validate_rejects_excessive_retries() {
    let mut config = load(FULL_CONFIG);
    config.delivery.retries = MAX_RETRIES + 1;

    let errors = config.validate().unwrap_err();
    assert!(errors[0].to_string().contains("retries"));
}

#[test]
fn validate_allows_zero_retries() {
    let mut config = load(FULL_CONFIG);
    config.delivery.retries = 0;
    assert!(config.validate().is_ok());
}

#[test]
fn validate_rejects_username_without_password() {
    let mut config = load(FULL_CONFIG);
    config.smtp.password = None;

    let errors = config.validate().unwrap_err();
    assert!(errors[0].to_string().contains("password required"));
}

#[test]
fn validate_rejects_bad_placeholder_name() {
    let mut config = load(FULL_CONFIG);
    config
        .mapping
        .insert("has space".to_string(), "col".to_string());

    let errors = config.validate().unwrap_err();
    assert!(errors[0].to_string().contains("has space"));
}

#[test]
fn validate_rejects_missing_body() {
    let mut config = load(FULL_CONFIG);
    config.message.body = None;
    config.message.body_file = None;

    let errors = config.validate().unwrap_err();
    assert!(errors[0].to_string().contains("body"));
}

#[test]
fn validate_rejects_missing_recipient_source() {
    let mut config = load(FULL_CONFIG);
    config.recipients.csv = None;
    config.recipients.addresses = None;

    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_backoff_max_below_base() {
    let mut config = load(FULL_CONFIG);
    config.delivery.backoff_base = Duration::from_secs(30);
    config.delivery.backoff_max = Duration::from_secs(5);

    let errors = config.validate().unwrap_err();
    assert!(errors[0].to_string().contains("backoff_max"));
}

#[test]
fn compile_produces_run_bundle() {
    let config = load(FULL_CONFIG);
    let runtime = config.compile(&PathBuf::from(".")).unwrap();

    assert_eq!(runtime.smtp.host, "smtp.example.com");
    assert_eq!(runtime.smtp.username.as_deref(), Some("mailer@example.com"));
    assert_eq!(
        runtime.smtp.password.as_ref().map(SecretString::expose),
        Some("app-token")
    );
    let from = runtime.run.from.to_string();
    assert!(from.contains("Campaign Team"));
    assert!(from.contains("no-reply@example.com"));
    assert_eq!(runtime.run.subject_template, "Hello {{Name}}");
    assert_eq!(runtime.run.recipient_column, "email");
    assert_eq!(runtime.run.workers, 5);
    assert_eq!(runtime.run.retries, 2);
}

#[test]
#[serial]
fn compile_resolves_env_vars_in_credentials() {
    temp_env::with_vars(
        [
            ("TEST_CFG_SMTP_USER", Some("env-user")),
            ("TEST_CFG_SMTP_PASS", Some("env-pass")),
        ],
        || {
            let mut config = load(FULL_CONFIG);
            config.smtp.username = Some("${TEST_CFG_SMTP_USER}".to_string());
            config.smtp.password =
                Some(SecretString::new("${TEST_CFG_SMTP_PASS}".to_string()));

            let runtime = config.compile(&PathBuf::from(".")).unwrap();
            assert_eq!(runtime.smtp.username.as_deref(), Some("env-user"));
            assert_eq!(
                runtime.smtp.password.as_ref().map(SecretString::expose),
                Some("env-pass")
            );
        },
    );
}

#[test]
#[serial]
fn compile_fails_on_undefined_env_var() {
    temp_env::with_var("TEST_CFG_UNDEFINED", None::<&str>, || {
        let mut config = load(FULL_CONFIG);
        config.smtp.password = Some(SecretString::new("${TEST_CFG_UNDEFINED}".to_string()));

        let err = config.compile(&PathBuf::from(".")).unwrap_err();
        assert!(err.to_string().contains("TEST_CFG_UNDEFINED"));
    });
}

#[test]
fn compile_reads_body_file_relative_to_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("body.html"), "<p>{{Name}}</p>").unwrap();

    let mut config = load(FULL_CONFIG);
    config.message.body = None;
    config.message.body_file = Some("body.html".to_string());

    let runtime = config.compile(dir.path()).unwrap();
    assert_eq!(runtime.run.body_template, "<p>{{Name}}</p>");
}

#[test]
fn compiled_run_config_is_detached_from_source() {
    // Captured by value: editing the Config after compile must not
    // change the bundle an engine was given.
    let mut config = load(FULL_CONFIG);
    let runtime = config.compile(&PathBuf::from(".")).unwrap();

    config.message.subject = "edited later".to_string();
    config.delivery.workers = 1;

    assert_eq!(runtime.run.subject_template, "Hello {{Name}}");
    assert_eq!(runtime.run.workers, 5);
}
