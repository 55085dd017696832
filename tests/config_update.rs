// tests/config_update.rs
//
// Watchlist file loading: explicit paths, the env-var override, the
// `config/` fallbacks and the built-in seed. The env/cwd tests are serial
// because both mutate process-global state.

use std::{env, fs};

use defense_intel_monitor::config::{WatchConfig, ENV_CONFIG_PATH};

#[test]
fn toml_watchlist_loads_with_defaults_applied() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let p = tmp.path().join("watchlist.toml");
    fs::write(
        &p,
        r#"
keywords = ["Hypersonic", "hypersonic", " Radar "]

[[sources]]
id = "alpha"
name = "Alpha Feed"
category = "TEST"
url = "https://alpha.test/feed"

[[sources]]
id = "bravo"
name = "Bravo Feed"
category = "TEST"
url = "https://bravo.test/feed"
enabled = false
"#,
    )
    .expect("write toml");

    let cfg = WatchConfig::load_from(&p).expect("load toml watchlist");
    assert_eq!(
        cfg.keywords,
        vec!["Hypersonic".to_string(), "Radar".to_string()],
        "keywords are trimmed and deduped, order preserved"
    );
    assert!(cfg.sources[0].enabled, "enabled defaults to true");
    assert!(!cfg.sources[1].enabled);
}

#[test]
fn json_watchlist_loads() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let p = tmp.path().join("watchlist.json");
    fs::write(
        &p,
        r#"{"keywords":["Radar"],"sources":[{"id":"x","name":"X","category":"TEST","url":"https://x.test/feed"}]}"#,
    )
    .expect("write json");

    let cfg = WatchConfig::load_from(&p).expect("load json watchlist");
    assert_eq!(cfg.keywords, vec!["Radar".to_string()]);
    assert_eq!(cfg.sources.len(), 1);
    assert!(cfg.sources[0].enabled);
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_config_dir_then_seed() {
    let old_cwd = env::current_dir().expect("cwd");
    let tmp = tempfile::tempdir().expect("tempdir");
    env::set_current_dir(tmp.path()).expect("chdir into tempdir");
    env::remove_var(ENV_CONFIG_PATH);

    // Nothing on disk: the built-in seed applies.
    let v = WatchConfig::load_default().expect("load default");
    assert_eq!(v, WatchConfig::default_seed());

    // A config/ fallback beats the seed.
    fs::create_dir_all("config").expect("mkdir config");
    fs::write("config/watchlist.toml", r#"keywords = ["Fallback"]"#).expect("write fallback");
    let v = WatchConfig::load_default().expect("load fallback");
    assert_eq!(v.keywords, vec!["Fallback".to_string()]);

    // The env var beats both.
    let p = tmp.path().join("override.json");
    fs::write(&p, r#"{"keywords":["FromEnv"]}"#).expect("write override");
    env::set_var(ENV_CONFIG_PATH, p.display().to_string());
    let v = WatchConfig::load_default().expect("load via env");
    assert_eq!(v.keywords, vec!["FromEnv".to_string()]);

    env::remove_var(ENV_CONFIG_PATH);
    env::set_current_dir(&old_cwd).expect("restore cwd");
}

#[serial_test::serial]
#[test]
fn env_pointing_at_a_missing_file_is_an_error() {
    env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/watchlist.toml");
    let err = WatchConfig::load_default().expect_err("missing env path must fail loudly");
    assert!(err.to_string().contains("WATCHLIST_CONFIG_PATH"));
    env::remove_var(ENV_CONFIG_PATH);
}
