use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use rand::seq::IndexedRandom;
use reqwest::redirect;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 OPR/106.0.0.0",
];

// Accept-Encoding is left to reqwest so that it still decodes gzip/br bodies.
const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
    ("Cache-Control", "max-age=0"),
    ("Referer", "https://www.google.com/"),
];

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Ok(String),
    HttpError(u16),
    TransportError(String),
}

/// A single GET with no retries of its own.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> FetchOutcome;
}

/// Browser-like request identity, drawn fresh for every attempt.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub user_agent: &'static str,
    pub cookies: Vec<(&'static str, String)>,
}

impl ClientIdentity {
    pub fn random() -> Self {
        let mut rng = rand::rng();
        let user_agent = USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]);
        let cookies = vec![
            (
                "session-id",
                rng.random_range(100_000_000u32..=999_999_999).to_string(),
            ),
            ("session-id-time", Utc::now().timestamp().to_string()),
            ("i18n-prefs", "USD".to_string()),
            (
                "sp-cdn",
                format!("L5Z9:{}", rng.random_range(100_000u32..=999_999)),
            ),
        ];
        Self { user_agent, cookies }
    }

    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn build_client(&self) -> Result<reqwest::blocking::Client, reqwest::Error> {
        let custom_redirect_policy = redirect::Policy::custom(|attempt| {
            if attempt.previous().len() > MAX_REDIRECTS {
                attempt.error(format!("Too many redirects (>{MAX_REDIRECTS})"))
            } else {
                attempt.follow()
            }
        });

        reqwest::blocking::Client::builder()
            .redirect(custom_redirect_policy)
            .timeout(self.timeout)
            .build()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> FetchOutcome {
        // New client per call so no connection or cookie state leaks between attempts.
        let client = match self.build_client() {
            Ok(client) => client,
            Err(e) => return FetchOutcome::TransportError(e.to_string()),
        };
        let identity = ClientIdentity::random();

        let mut request = client
            .get(url)
            .header("User-Agent", identity.user_agent)
            .header("Cookie", identity.cookie_header());
        for (name, value) in BROWSER_HEADERS {
            request = request.header(*name, *value);
        }

        let response = match request.send() {
            Ok(response) => response,
            Err(e) => return FetchOutcome::TransportError(e.to_string()),
        };

        let status = response.status().as_u16();
        if status != 200 {
            return FetchOutcome::HttpError(status);
        }

        match response.text() {
            Ok(body) => FetchOutcome::Ok(body),
            Err(e) => FetchOutcome::TransportError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serves each canned response to one connection and sends back the
    /// request head it read, lowercased.
    fn serve(responses: Vec<String>) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                tx.send(String::from_utf8_lossy(&head).to_lowercase()).unwrap();
                stream.write_all(response.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
        });

        (format!("http://{addr}/dp/B001"), rx)
    }

    fn response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn cookie_line(request: &str) -> String {
        request
            .lines()
            .find(|line| line.starts_with("cookie:"))
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn classifies_status_and_sends_browser_identity() {
        let (url, requests) = serve(vec![
            response("503 Service Unavailable", ""),
            response("200 OK", "<html>kettle</html>"),
        ]);
        let fetcher = HttpFetcher::new(Duration::from_secs(5));

        assert_eq!(fetcher.fetch(&url), FetchOutcome::HttpError(503));
        assert_eq!(
            fetcher.fetch(&url),
            FetchOutcome::Ok("<html>kettle</html>".to_string())
        );

        let first = requests.recv().unwrap();
        let second = requests.recv().unwrap();
        for request in [&first, &second] {
            assert!(request.starts_with("get /dp/b001 http/1.1"));
            assert!(request.contains("\r\nuser-agent: mozilla/5.0"));
            assert!(request.contains("\r\nreferer: https://www.google.com/"));
            assert!(request.contains("\r\nsec-fetch-mode: navigate"));
            assert!(request.contains("\r\naccept-language: en-us,en;q=0.5"));
            assert!(cookie_line(request).starts_with("cookie: session-id="));
            assert!(cookie_line(request).contains("sp-cdn=l5z9:"));
        }
        // Fresh random session id per call.
        assert_ne!(cookie_line(&first), cookie_line(&second));
    }

    #[test]
    fn identity_draws_from_pool() {
        let identity = ClientIdentity::random();
        assert!(USER_AGENTS.contains(&identity.user_agent));
        assert!(USER_AGENTS.len() >= 5);
    }

    #[test]
    fn identity_cookies_look_like_a_session() {
        let identity = ClientIdentity::random();
        let names: Vec<_> = identity.cookies.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["session-id", "session-id-time", "i18n-prefs", "sp-cdn"]);

        let session_id = &identity.cookies[0].1;
        assert_eq!(session_id.len(), 9);
        assert!(session_id.chars().all(|c| c.is_ascii_digit()));
        assert!(identity.cookies[3].1.starts_with("L5Z9:"));

        let header = identity.cookie_header();
        assert!(header.contains("i18n-prefs=USD"));
        assert_eq!(header.matches("; ").count(), 3);
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2));
        let outcome = fetcher.fetch("http://127.0.0.1:9/dp/B001");
        assert!(matches!(outcome, FetchOutcome::TransportError(_)));
    }
}
