//! HTTP clients for the services the worker talks to.

pub mod github;
pub mod raw;
pub mod scheduler;

pub use github::GitHubStatusClient;
pub use raw::RawConfigFetcher;
pub use scheduler::SchedulerClient;

use std::time::Duration;

const USER_AGENT: &str = "hookgraph";

fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Join `segments` onto `base`, keeping any path `base` already has.
fn endpoint(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(segment);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        assert_eq!(
            endpoint("https://github.example.test/api/v3/", &["repos", "acme", "widgets"]),
            "https://github.example.test/api/v3/repos/acme/widgets"
        );
        assert_eq!(
            endpoint("https://api.github.com", &["repos"]),
            "https://api.github.com/repos"
        );
    }
}
