//! Blocking HTTP helpers shared by `download`, `install` and self-update.
use std::io::Write;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};

/// Total transfer timeout.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

/// TCP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn agent(follow_redirects: bool) -> ureq::Agent {
    let mut config = ureq::Agent::config_builder()
        .user_agent(format!("dotbot/{}", crate::VERSION))
        .timeout_global(Some(TRANSFER_TIMEOUT))
        .timeout_connect(Some(CONNECT_TIMEOUT))
        .http_status_as_error(false);
    if !follow_redirects {
        config = config.max_redirects(0).max_redirects_will_error(false);
    }
    ureq::Agent::new_with_config(config.build())
}

fn check_status(url: &str, status: ureq::http::StatusCode) -> Result<()> {
    if !status.is_success() {
        bail!("GET {url}: HTTP {}", status.as_u16());
    }
    Ok(())
}

/// Stream the body of `url` into `out`. Returns the number of bytes written.
///
/// # Errors
///
/// Returns an error on connection failure, a non-2xx status, or a write
/// failure.
pub fn download_to(url: &str, out: &mut dyn Write) -> Result<u64> {
    let mut response = agent(true)
        .get(url)
        .call()
        .with_context(|| format!("GET {url}"))?;
    check_status(url, response.status())?;
    let mut reader = response.body_mut().as_reader();
    std::io::copy(&mut reader, out).with_context(|| format!("reading {url}"))
}

/// Fetch `url` as text.
///
/// # Errors
///
/// Returns an error on connection failure or a non-2xx status.
pub fn get_string(url: &str) -> Result<String> {
    let mut response = agent(true)
        .get(url)
        .call()
        .with_context(|| format!("GET {url}"))?;
    check_status(url, response.status())?;
    response
        .body_mut()
        .read_to_string()
        .with_context(|| format!("reading {url}"))
}

/// `HEAD url`: `Ok(true)` on success, `Ok(false)` on 404.
///
/// # Errors
///
/// Returns an error on connection failure or any other status.
pub fn exists(url: &str) -> Result<bool> {
    let response = agent(true)
        .head(url)
        .call()
        .with_context(|| format!("HEAD {url}"))?;
    match response.status().as_u16() {
        200..=299 => Ok(true),
        404 => Ok(false),
        code => bail!("HEAD {url}: HTTP {code}"),
    }
}

/// Latest release tag of a GitHub repository, without a leading `v`.
///
/// Reads the redirect target of `<repo>/releases/latest` instead of calling
/// the API, which is not rate limited.
///
/// # Errors
///
/// Returns an error if the request fails or does not redirect to a tag.
pub fn latest_release(repo_url: &str) -> Result<String> {
    let url = format!("{}/releases/latest", repo_url.trim_end_matches('/'));
    let response = agent(false)
        .head(&url)
        .call()
        .with_context(|| format!("HEAD {url}"))?;
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .with_context(|| format!("HEAD {url}: no release redirect (HTTP {})", response.status().as_u16()))?;
    tag_from_location(location).with_context(|| format!("HEAD {url}: unexpected redirect to {location}"))
}

/// `.../releases/tag/v1.2.3` becomes `1.2.3`.
#[must_use]
pub fn tag_from_location(location: &str) -> Option<String> {
    let tag = location.trim_end_matches('/').rsplit('/').next()?;
    let version = tag.strip_prefix('v').unwrap_or(tag);
    (!version.is_empty() && tag != "releases" && tag != "latest").then(|| version.to_string())
}

/// Last path segment of `url`, without query or fragment.
#[must_use]
pub fn url_basename(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url.get(..end)
        .unwrap_or(url)
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn tag_from_location_strips_v() {
        assert_eq!(
            tag_from_location("https://github.com/a/b/releases/tag/v1.2.3"),
            Some("1.2.3".to_string())
        );
        assert_eq!(
            tag_from_location("https://github.com/a/b/releases/tag/2024.01"),
            Some("2024.01".to_string())
        );
    }

    #[test]
    fn tag_from_location_rejects_non_tags() {
        assert_eq!(tag_from_location("https://github.com/a/b/releases"), None);
        assert_eq!(tag_from_location("https://github.com/a/b/releases/latest"), None);
    }

    #[test]
    fn url_basename_ignores_query() {
        assert_eq!(url_basename("https://x.io/dl/tool.tar.gz?raw=1"), "tool.tar.gz");
        assert_eq!(url_basename("https://x.io/dl/tool/"), "tool");
        assert_eq!(url_basename("tool.zip"), "tool.zip");
    }
}
