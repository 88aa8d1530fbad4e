use super::*;

#[test]
fn exact_origin_matches_only_itself() {
    assert!(origin_matches("https://board.example.com", "https://board.example.com"));
    assert!(!origin_matches("https://board.example.com", "https://board.example.com.evil.io"));
    assert!(!origin_matches("https://board.example.com", "http://board.example.com"));
}

#[test]
fn wildcard_subdomain_pattern() {
    let pattern = "https://*.vercel.app";
    assert!(origin_matches(pattern, "https://my-board-git-main.vercel.app"));
    assert!(!origin_matches(pattern, "https://vercel.app.evil.io"));
    assert!(!origin_matches(pattern, "http://x.vercel.app"));
}

#[test]
fn bare_star_matches_anything() {
    assert!(origin_matches("*", "http://localhost:5173"));
}

#[test]
fn multiple_wildcards() {
    assert!(origin_matches("http://*:*", "http://localhost:5173"));
    assert!(!origin_matches("http://*:*", "http://localhost"));
}

#[test]
fn wildcard_does_not_reuse_head_characters() {
    assert!(!origin_matches("a*a", "a"));
    assert!(origin_matches("a*a", "aa"));
}

#[tokio::test]
async fn router_builds_with_restricted_origins() {
    let config = crate::config::Config {
        allowed_origins: vec!["https://*.vercel.app".into(), "http://localhost:5173".into()],
        ..crate::config::Config::default()
    };
    let state = crate::state::test_helpers::test_app_state_with_config(config);
    let _router = app(state);
}
