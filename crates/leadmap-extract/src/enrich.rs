//! Best-effort e-mail discovery for extracted businesses.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

const EMAIL_PATTERN: &str = r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b";

/// Hosts that show up in page markup but are never a business contact.
const BLOCKED_DOMAINS: [&str; 12] = [
    "google.com",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "linkedin.com",
    "youtube.com",
    "tiktok.com",
    "pinterest.com",
    "example.com",
    "test.com",
    "mailto.com",
    "email.com",
];

const PREFERRED_PREFIXES: [&str; 4] = ["info@", "contact@", "admin@", "sales@"];

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("e-mail pattern is valid"))
}

/// Scans markup or text for a plausible business contact address,
/// skipping social/placeholder domains and image-named false positives,
/// and preferring role addresses like `info@` over personal ones.
pub fn email_from_html(html: &str) -> Option<String> {
    let mut fallback: Option<String> = None;
    for found in email_regex().find_iter(html) {
        let email = found.as_str().to_lowercase();
        if BLOCKED_DOMAINS.iter().any(|d| email.ends_with(d)) {
            continue;
        }
        if [".png", ".jpg", ".jpeg", ".gif", ".webp"]
            .iter()
            .any(|ext| email.ends_with(ext))
        {
            continue;
        }
        if PREFERRED_PREFIXES.iter().any(|p| email.starts_with(p)) {
            return Some(email);
        }
        fallback.get_or_insert(email);
    }
    fallback
}

/// Fetches a business website and scans the body for a contact address.
/// Failures are silent: enrichment never fails an extraction.
pub async fn fetch_email(client: &reqwest::Client, website_url: &str) -> Option<String> {
    if !website_url.starts_with("http") {
        return None;
    }
    let response = match client.get(website_url).send().await {
        Ok(resp) => resp,
        Err(err) => {
            debug!(%website_url, %err, "website e-mail lookup failed");
            return None;
        }
    };
    if !response.status().is_success() {
        return None;
    }
    match response.text().await {
        Ok(body) => email_from_html(&body),
        Err(err) => {
            debug!(%website_url, %err, "website body read failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn prefers_role_addresses() {
        let html = "reach bob.smith@alnoor.example or info@alnoor.example today";
        assert_eq!(email_from_html(html).as_deref(), Some("info@alnoor.example"));
    }

    #[test]
    fn falls_back_to_first_plain_address() {
        let html = "<a href='mailto:owner@palmhw.example'>mail us</a>";
        assert_eq!(email_from_html(html).as_deref(), Some("owner@palmhw.example"));
    }

    #[test]
    fn skips_social_and_image_lookalikes() {
        let html = "share@facebook.com hero@2x.png nothing else";
        assert_eq!(email_from_html(html), None);
    }

    #[test]
    fn rejects_non_http_urls_without_a_request() {
        let client = reqwest::Client::new();
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert_eq!(rt.block_on(fetch_email(&client, "ftp://x.example")), None);
    }

    #[tokio::test]
    async fn fetches_and_scans_a_live_body() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let body = "<html>write to sales@alnoor.example</html>";
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        let client = reqwest::Client::new();
        let url = format!("http://{addr}/");
        assert_eq!(
            fetch_email(&client, &url).await.as_deref(),
            Some("sales@alnoor.example")
        );
    }
}
