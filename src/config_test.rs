use super::*;

#[test]
fn env_parse_missing_returns_default() {
    let val: u64 = env_parse("__TEST_CFG_NONEXISTENT_KEY__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__TEST_CFG_VALID__", "99") };
    let val: u32 = env_parse("__TEST_CFG_VALID__", 0);
    assert_eq!(val, 99);
    unsafe { std::env::remove_var("__TEST_CFG_VALID__") };
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__TEST_CFG_INVALID__", "ten minutes") };
    let val: u64 = env_parse("__TEST_CFG_INVALID__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__TEST_CFG_INVALID__") };
}

#[test]
fn parse_origins_trims_and_drops_empty() {
    let origins = parse_origins(" https://a.example , ,https://*.vercel.app,");
    assert_eq!(origins, vec!["https://a.example", "https://*.vercel.app"]);
}

#[test]
fn default_config_runs_without_persistence() {
    let config = Config::default();
    assert!(config.database_url.is_none());
    assert!(config.reset_token.is_empty());
    assert_eq!(config.code_ttl, Duration::from_millis(600_000));
    assert_eq!(config.default_room_id, "default");
    assert_eq!(config.allowed_origins, vec!["*"]);
}
