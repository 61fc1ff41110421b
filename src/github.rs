//! Resolving GitHub repository URLs to README text.
//!
//! Tries raw.githubusercontent.com across the common README filenames on
//! the `main` and `master` branches, then falls back to the GitHub API.

use std::time::Duration;

use reqwest::header;

use crate::error::{Error, Result};

const README_CANDIDATES: &[&str] = &[
    "README.md",
    "readme.md",
    "README.MD",
    "Readme.md",
    "README",
    "readme",
];
const BRANCHES: &[&str] = &["main", "master"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// True when `url` points at a GitHub repository (owner + repo present).
pub fn is_valid_github_url(url: &str) -> bool {
    parse_repo(url).is_ok()
}

/// Extract `(owner, repo)` from a GitHub repository URL.
pub(crate) fn parse_repo(url: &str) -> Result<(String, String)> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|_| Error::validation(format!("not a valid URL: {url}")))?;

    if parsed.host_str() != Some("github.com") {
        return Err(Error::validation(
            "expected a GitHub URL like https://github.com/owner/repo",
        ));
    }

    let mut segments = parsed
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty());
    let owner = segments
        .next()
        .ok_or_else(|| Error::validation("GitHub URL is missing the repository owner"))?;
    let repo = segments
        .next()
        .ok_or_else(|| Error::validation("GitHub URL is missing the repository name"))?;

    Ok((owner.to_string(), repo.trim_end_matches(".git").to_string()))
}

/// Fetch the README of the repository behind `url`.
pub async fn fetch_readme(url: &str) -> Result<String> {
    let (owner, repo) = parse_repo(url)?;

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout: {}", e);
            reqwest::Client::new()
        });

    for filename in README_CANDIDATES {
        for branch in BRANCHES {
            let raw_url =
                format!("https://raw.githubusercontent.com/{owner}/{repo}/{branch}/{filename}");
            match client.get(&raw_url).send().await {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.text().await?);
                }
                _ => continue,
            }
        }
    }

    // Raw lookups missed (non-default branch, unusual casing); ask the API.
    let api_url = format!("https://api.github.com/repos/{owner}/{repo}/readme");
    if let Ok(response) = client
        .get(&api_url)
        .header(header::ACCEPT, "application/vnd.github.raw+json")
        .header(header::USER_AGENT, "reelforge")
        .send()
        .await
    {
        if response.status().is_success() {
            return Ok(response.text().await?);
        }
    }

    Err(Error::validation(format!(
        "could not find a README for {owner}/{repo}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repo_accepts_repository_urls() {
        assert_eq!(
            parse_repo("https://github.com/rust-lang/rust").unwrap(),
            ("rust-lang".to_string(), "rust".to_string())
        );
        assert_eq!(
            parse_repo("https://github.com/owner/repo.git").unwrap(),
            ("owner".to_string(), "repo".to_string())
        );
        assert_eq!(
            parse_repo("https://github.com/owner/repo/tree/main/src").unwrap(),
            ("owner".to_string(), "repo".to_string())
        );
    }

    #[test]
    fn parse_repo_rejects_non_repository_urls() {
        assert!(parse_repo("https://gitlab.com/owner/repo").is_err());
        assert!(parse_repo("https://github.com/only-owner").is_err());
        assert!(parse_repo("not a url").is_err());
    }

    #[test]
    fn is_valid_github_url_matches_parse() {
        assert!(is_valid_github_url("https://github.com/owner/repo"));
        assert!(!is_valid_github_url("https://example.com/owner/repo"));
        assert!(!is_valid_github_url(""));
    }
}
