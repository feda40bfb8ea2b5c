//! Network retrieval of raw tile payloads

use crate::{Config, Result, TileError, TileKey};

/// Source of raw vector tile bytes.
///
/// Implementations run on background tasks and must not touch the cache; the returned bytes
/// are decoded by the task that requested them.
pub trait TileFetcher: Send + Sync + 'static {
    fn fetch(&self, key: TileKey) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Tile URL with `{z}`, `{x}` and `{y}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    /// Validate a template, rejecting it if any placeholder is missing
    pub fn parse(template: &str) -> Result<Self> {
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !template.contains(placeholder) {
                return Err(TileError::InvalidUrlTemplate(format!(
                    "{template:?} is missing {placeholder}"
                )));
            }
        }
        Ok(Self(template.to_string()))
    }

    pub fn url_for(&self, key: TileKey) -> String {
        self.0
            .replace("{z}", &key.zoom.to_string())
            .replace("{x}", &key.column.to_string())
            .replace("{y}", &key.row.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Fetches tiles over HTTP(S) with a shared connection pool
#[derive(Debug, Clone)]
pub struct HttpTileFetcher {
    client: reqwest::Client,
    template: UrlTemplate,
}

impl HttpTileFetcher {
    /// Build a fetcher from the URL, user agent and timeout in `config`
    pub fn new(config: &Config) -> Result<Self> {
        let template = UrlTemplate::parse(&config.tile_url)?;
        let client = client_builder(config).build()?;
        Ok(Self::with_client(client, template))
    }

    /// Use an existing client, e.g. to share its connection pool
    pub fn with_client(client: reqwest::Client, template: UrlTemplate) -> Self {
        Self { client, template }
    }

    pub fn template(&self) -> &UrlTemplate {
        &self.template
    }
}

/// Client settings shared by every tile request.
///
/// reqwest follows redirects by default; the gzip feature adds `Accept-Encoding`.
fn client_builder(config: &Config) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout)
        .gzip(true)
}

impl TileFetcher for HttpTileFetcher {
    async fn fetch(&self, key: TileKey) -> Result<Vec<u8>> {
        let url = self.template.url_for(key);
        tracing::debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(TileError::HttpStatus(status.as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    /// Read one request from `stream`, answer with a canned response and return the request
    fn respond(stream: &mut TcpStream, status_line: &str, headers: &str, body: &[u8]) -> String {
        let mut buffer = [0u8; 4096];
        let bytes_read = stream.read(&mut buffer).unwrap_or(0);
        let request = String::from_utf8_lossy(&buffer[..bytes_read]).into_owned();

        let header = format!(
            "HTTP/1.1 {}\r\n{}Content-Type: application/x-protobuf\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status_line,
            headers,
            body.len()
        );
        let _ = stream.write_all(header.as_bytes());
        let _ = stream.write_all(body);
        let _ = stream.flush();
        request
    }

    /// Serve one canned HTTP response on a local port and return the request
    fn serve_once(
        status_line: &'static str,
        body: &'static [u8],
    ) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            respond(&mut stream, status_line, "", body)
        });

        (format!("http://{address}/tiles/{{z}}/{{x}}/{{y}}.pbf"), handle)
    }

    /// Answer the first request with a redirect to `/moved.pbf`, then serve `body` there.
    /// Returns both requests.
    fn serve_redirect(body: &'static [u8]) -> (String, std::thread::JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let location = format!("Location: http://{address}/moved.pbf\r\n");
            let first = respond(&mut stream, "302 Found", &location, b"");
            drop(stream);

            let (mut stream, _) = listener.accept().unwrap();
            let second = respond(&mut stream, "200 OK", "", body);
            (first, second)
        });

        (format!("http://{address}/tiles/{{z}}/{{x}}/{{y}}.pbf"), handle)
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    fn config_for(url: String) -> Config {
        Config {
            tile_url: url,
            user_agent: "basemap-test/1.0".to_string(),
            request_timeout: Duration::from_secs(5),
            ..Config::default()
        }
    }

    /// Same client settings as `HttpTileFetcher::new`, but never routed through a proxy
    fn local_fetcher(config: &Config) -> HttpTileFetcher {
        let client = client_builder(config).no_proxy().build().unwrap();
        HttpTileFetcher::with_client(client, UrlTemplate::parse(&config.tile_url).unwrap())
    }

    #[test]
    fn test_url_template() {
        let template = UrlTemplate::parse("https://example.com/{z}/{x}/{y}.pbf").unwrap();
        assert_eq!(
            template.url_for(TileKey::new(14, 8190, 5447)),
            "https://example.com/14/8190/5447.pbf"
        );
    }

    #[test]
    fn test_url_template_missing_placeholder() {
        let result = UrlTemplate::parse("https://example.com/{z}/{x}.pbf");
        assert!(matches!(result, Err(TileError::InvalidUrlTemplate(_))));
    }

    #[test]
    fn test_fetch_success() {
        let (url, server) = serve_once("200 OK", b"\x1a\x00");
        let fetcher = local_fetcher(&config_for(url));

        let body = runtime().block_on(fetcher.fetch(TileKey::new(3, 4, 5))).unwrap();
        assert_eq!(body, b"\x1a\x00");

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /tiles/3/4/5.pbf "));
        assert!(request.to_ascii_lowercase().contains("user-agent: basemap-test/1.0"));
    }

    #[test]
    fn test_fetch_follows_redirect_with_gzip_accepted() {
        let (url, server) = serve_redirect(b"\x1a\x02\x0a\x00");
        let fetcher = local_fetcher(&config_for(url));

        let body = runtime().block_on(fetcher.fetch(TileKey::new(6, 33, 21))).unwrap();
        assert_eq!(body, b"\x1a\x02\x0a\x00");

        let (first, second) = server.join().unwrap();
        assert!(first.starts_with("GET /tiles/6/33/21.pbf "));
        assert!(second.starts_with("GET /moved.pbf "));
        for request in [first, second] {
            let request = request.to_ascii_lowercase();
            assert!(request.contains("accept-encoding: gzip"));
            assert!(request.contains("user-agent: basemap-test/1.0"));
        }
    }

    #[test]
    fn test_fetch_non_200_is_error() {
        let (url, server) = serve_once("404 Not Found", b"");
        let fetcher = local_fetcher(&config_for(url));

        let result = runtime().block_on(fetcher.fetch(TileKey::new(0, 0, 0)));
        assert!(matches!(result, Err(TileError::HttpStatus(404))));
        server.join().unwrap();
    }

    #[test]
    fn test_fetch_connection_refused_is_transport_error() {
        // Bind then drop to get a port with nothing listening
        let address = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let config = config_for(format!("http://{address}/{{z}}/{{x}}/{{y}}"));
        let fetcher = local_fetcher(&config);

        let result = runtime().block_on(fetcher.fetch(TileKey::new(0, 0, 0)));
        assert!(matches!(result, Err(TileError::Transport(_))));
    }

    #[test]
    fn test_new_rejects_bad_template() {
        let config = config_for("https://example.com/tiles".to_string());
        assert!(HttpTileFetcher::new(&config).is_err());
    }
}
