//! Tests for settings loading.

use braid_cli::Settings;
use std::{collections::HashMap, io::Write};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

const REQUIRED: [(&str, &str); 3] = [
    ("BRAID_BASE_URL", "https://api.siliconflow.cn/v1"),
    ("BRAID_API_KEY", "sk-test"),
    ("BRAID_MODEL", "Qwen/Qwen3-32B"),
];

#[test]
fn reads_required_variables() {
    let settings = Settings::from_env(env(&REQUIRED)).unwrap();
    assert_eq!(settings.provider.model, "Qwen/Qwen3-32B");
    assert_eq!(settings.provider.api_key, "sk-test");
    assert_eq!(settings.provider.temperature, None);
    assert_eq!(settings.provider.timeout_secs, 60);
    assert_eq!(settings.fast_model(), "Qwen/Qwen3-32B");
    assert_eq!(settings.router_model(), "Qwen/Qwen3-32B");
}

#[test]
fn reads_optional_variables() {
    let mut vars = REQUIRED.to_vec();
    vars.extend([
        ("BRAID_TEMPERATURE", "0.2"),
        ("BRAID_MAX_TOKENS", "5000"),
        ("BRAID_TIMEOUT_SECS", "30"),
        ("BRAID_FAST_MODEL", "THUDM/GLM-4-9B"),
        ("BRAID_STRUCTURED_OUTPUT", "true"),
    ]);
    let settings = Settings::from_env(env(&vars)).unwrap();
    assert_eq!(settings.provider.temperature, Some(0.2));
    assert_eq!(settings.provider.max_tokens, Some(5000));
    assert_eq!(settings.provider.timeout_secs, 30);
    assert!(settings.provider.structured_output);
    assert_eq!(settings.fast_model(), "THUDM/GLM-4-9B");
    assert_eq!(settings.router_model(), "THUDM/GLM-4-9B");
}

#[test]
fn missing_variable_is_named() {
    let err = Settings::from_env(env(&REQUIRED[..2])).unwrap_err();
    assert!(err.to_string().contains("BRAID_MODEL"), "{err}");

    let mut vars = REQUIRED.to_vec();
    vars[1] = ("BRAID_API_KEY", "  ");
    let err = Settings::from_env(env(&vars)).unwrap_err();
    assert!(err.to_string().contains("BRAID_API_KEY"), "{err}");
}

#[test]
fn invalid_values_are_rejected() {
    for (name, value) in [
        ("BRAID_TEMPERATURE", "warm"),
        ("BRAID_TEMPERATURE", "3.5"),
        ("BRAID_MAX_TOKENS", "0"),
        ("BRAID_TIMEOUT_SECS", "-1"),
        ("BRAID_BASE_URL", "not a url"),
    ] {
        let mut vars = REQUIRED.to_vec();
        vars.retain(|(k, _)| *k != name);
        vars.push((name, value));
        assert!(Settings::from_env(env(&vars)).is_err(), "{name}={value}");
    }
}

#[test]
fn parses_toml() {
    let settings = Settings::from_toml(
        r#"
        model = "deepseek-ai/DeepSeek-V3"
        base_url = "https://api.siliconflow.cn/v1"
        api_key = "${BRAID_TEST_UNSET_KEY}"
        temperature = 0.7
        fast_model = "THUDM/GLM-4-9B"
        "#,
    )
    .unwrap();
    assert_eq!(settings.provider.model, "deepseek-ai/DeepSeek-V3");
    assert_eq!(settings.provider.api_key, "");
    assert_eq!(settings.provider.temperature, Some(0.7));
    assert_eq!(settings.fast_model(), "THUDM/GLM-4-9B");
}

#[test]
fn invalid_toml_is_rejected() {
    assert!(Settings::from_toml("model = \"\"").is_err());
    assert!(Settings::from_toml("model = \"m\"\nfast_model = \"\"").is_err());
    assert!(Settings::from_toml("model = ").is_err());
}

#[test]
fn loads_an_explicit_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "model = \"m\"\nbase_url = \"http://localhost:11434/v1\"").unwrap();
    let settings = Settings::load(Some(file.path())).unwrap();
    assert_eq!(settings.provider.model, "m");

    let missing = file.path().with_extension("missing");
    assert!(Settings::load(Some(&missing)).is_err());
}
