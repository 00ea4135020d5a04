use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::ScrapeError;
use crate::form::FormState;
use crate::info_time;

/// Moves HTML between the scraper and the listing site.
#[async_trait]
pub trait PostbackTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, ScrapeError>;

    /// POSTs `fields` as an `application/x-www-form-urlencoded` body.
    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<String, ScrapeError>;
}

#[async_trait]
impl<'a, T: PostbackTransport + ?Sized> PostbackTransport for &'a T {
    async fn get(&self, url: &str) -> Result<String, ScrapeError> {
        (**self).get(url).await
    }

    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<String, ScrapeError> {
        (**self).post_form(url, fields).await
    }
}

/// `reqwest` backed transport. All requests go through one `Client` with a cookie store,
/// so the server sees a single session for the whole walk.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PostbackTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String, ScrapeError> {
        let res = self.client.get(url).send().await?;
        read_html(url, res).await
    }

    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<String, ScrapeError> {
        let res = self.client.post(url).form(fields).send().await?;
        read_html(url, res).await
    }
}

/// The listing is always UTF-8, whatever the headers claim.
async fn read_html(url: &str, res: reqwest::Response) -> Result<String, ScrapeError> {
    let status = res.status();
    if !status.is_success() {
        return Err(ScrapeError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let bytes = res.bytes().await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Drives the grid's postback protocol: one GET, then one POST per further page,
/// each carrying the form state captured from the response before it.
pub struct PostbackSession<T> {
    transport: T,
    url: String,
}

impl<T: PostbackTransport> PostbackSession<T> {
    pub fn new(transport: T, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }

    /// Loads the first page.
    pub async fn initialize(&self) -> Result<(FormState, String), ScrapeError> {
        info_time!("Requesting first page: {}", self.url);
        let html = self.transport.get(&self.url).await?;
        let state = FormState::from_html(&html)?;
        Ok((state, html))
    }

    /// Posts `state` back with the pager fields pointing at `target_page`.
    /// `state` is consumed, the returned state belongs to the new page.
    pub async fn advance(
        &self,
        state: FormState,
        target_page: usize,
    ) -> Result<(FormState, String), ScrapeError> {
        info_time!("Requesting page {target_page}");
        let body = state.for_page(target_page).to_pairs();
        let html = self.transport.post_form(&self.url, &body).await?;
        let next = FormState::from_html(&html)?;
        Ok((next, html))
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{listing_page, FakeSite, Request};
    use super::*;

    #[tokio::test]
    async fn advance_replays_previous_view_state() {
        let site = FakeSite::new(vec![
            listing_page(1, 2, &[]),
            listing_page(2, 2, &[]),
        ]);
        let session = PostbackSession::new(&site, "http://fake/PWorkData.aspx");

        let (state, _) = session.initialize().await.unwrap();
        assert_eq!(state.get("__VIEWSTATE"), Some("state-1"));

        let (next, _) = session.advance(state, 2).await.unwrap();
        assert_eq!(next.get("__VIEWSTATE"), Some("state-2"));

        let requests = site.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], Request::Get);
        let Request::Post(body) = &requests[1] else {
            panic!("expected a postback, got {:?}", requests[1]);
        };
        assert_eq!(body["__VIEWSTATE"], "state-1");
        assert_eq!(body["__EVENTTARGET"], "GridView1");
        assert_eq!(body["__EVENTARGUMENT"], "Page$2");
    }

    mod local_server {
        use std::collections::HashMap;
        use std::sync::{Arc, Mutex};

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};

        #[derive(Debug, Clone)]
        pub struct Received {
            pub method: String,
            pub headers: HashMap<String, String>,
            pub body: String,
        }

        pub type Reply = (u16, Vec<(&'static str, String)>, Vec<u8>);

        /// Minimal HTTP/1.1 server answering every request with `handler`, one request per connection.
        pub async fn serve<F>(handler: F) -> (String, Arc<Mutex<Vec<Received>>>)
        where
            F: Fn(&Received) -> Reply + Send + Sync + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let log = Arc::new(Mutex::new(Vec::new()));
            let seen = log.clone();

            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let Some(req) = read_request(&mut stream).await else {
                        continue;
                    };
                    let (status, headers, body) = handler(&req);
                    seen.lock().unwrap().push(req);

                    let mut head = format!(
                        "HTTP/1.1 {status} Test\r\nContent-Length: {}\r\nConnection: close\r\n",
                        body.len()
                    );
                    for (name, value) in headers {
                        head.push_str(&format!("{name}: {value}\r\n"));
                    }
                    head.push_str("\r\n");
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(&body).await;
                    let _ = stream.shutdown().await;
                }
            });

            (format!("http://{addr}/Tpdig/PWorkData.aspx"), log)
        }

        async fn read_request(stream: &mut TcpStream) -> Option<Received> {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let head_end = loop {
                if let Some(i) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break i + 4;
                }
                let n = stream.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                buf.extend_from_slice(&chunk[..n]);
            };

            let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
            let mut lines = head.lines();
            let method = lines.next()?.split(' ').next()?.to_string();
            let headers: HashMap<String, String> = lines
                .filter_map(|line| line.split_once(':'))
                .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
                .collect();

            let len: usize = headers
                .get("content-length")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            while buf.len() < head_end + len {
                let n = stream.read(&mut chunk).await.ok()?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let body = String::from_utf8_lossy(&buf[head_end..]).into_owned();

            Some(Received {
                method,
                headers,
                body,
            })
        }
    }

    fn http_transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5), "tpdig-test").unwrap()
    }

    #[tokio::test]
    async fn server_error_is_an_http_status() {
        let (url, _) = local_server::serve(|_| (500, vec![], b"Runtime Error".to_vec())).await;

        let err = http_transport().get(&url).await.unwrap_err();

        assert!(err.is_transport());
        assert!(
            matches!(err, ScrapeError::HttpStatus { status: 500, .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn body_is_utf8_whatever_the_charset_header() {
        let (url, _) = local_server::serve(|_| {
            (
                200,
                vec![("Content-Type", "text/html; charset=big5".to_string())],
                "<p>道路挖掘 臺北市</p>".as_bytes().to_vec(),
            )
        })
        .await;

        let html = http_transport().get(&url).await.unwrap();

        assert_eq!(html, "<p>道路挖掘 臺北市</p>");
    }

    #[tokio::test]
    async fn session_cookie_is_sent_with_postback() {
        let (url, log) = local_server::serve(|req| {
            let mut headers = vec![("Content-Type", "text/html; charset=utf-8".to_string())];
            let page = if req.method == "GET" {
                headers.push((
                    "Set-Cookie",
                    "ASP.NET_SessionId=abc123; path=/; HttpOnly".to_string(),
                ));
                1
            } else {
                2
            };
            (200, headers, listing_page(page, 2, &[]).into_bytes())
        })
        .await;
        let session = PostbackSession::new(http_transport(), url);

        let (state, _) = session.initialize().await.unwrap();
        let (next, _) = session.advance(state, 2).await.unwrap();
        assert_eq!(next.get("__VIEWSTATE"), Some("state-2"));

        let received = log.lock().unwrap().clone();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].method, "GET");
        assert!(!received[0].headers.contains_key("cookie"));

        let post = &received[1];
        assert_eq!(post.method, "POST");
        assert!(post.headers["cookie"].contains("ASP.NET_SessionId=abc123"));
        assert!(post.headers["content-type"].starts_with("application/x-www-form-urlencoded"));
        assert!(post.body.contains("__EVENTTARGET=GridView1"), "{}", post.body);
        assert!(post.body.contains("__EVENTARGUMENT=Page%242"), "{}", post.body);
        assert!(post.body.contains("__VIEWSTATE=state-1"), "{}", post.body);
    }
}
