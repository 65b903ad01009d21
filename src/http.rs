use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{RagError, RagResult};

#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

struct AttemptError {
    error: RagError,
    retryable: bool,
}

impl JsonEndpoint {
    pub fn new(
        url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> RagResult<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RagError::configuration("model endpoint URL must not be empty"));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|err| RagError::configuration(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
            model: model.to_string(),
            api_key,
            timeout,
        })
    }

    /// POST `body` and decode the JSON reply, retrying once on connect
    /// errors, 429 and 5xx. Timeouts are returned immediately.
    pub fn post_json<B, R>(&self, body: &B) -> RagResult<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        match self.attempt(body) {
            Ok(reply) => Ok(reply),
            Err(AttemptError {
                error,
                retryable: true,
            }) => {
                warn!(
                    model = %self.model,
                    url = %self.url,
                    error = %error,
                    "model request failed, retrying once"
                );
                self.attempt(body).map_err(|failure| failure.error)
            }
            Err(failure) => Err(failure.error),
        }
    }

    fn attempt<B, R>(&self, body: &B) -> Result<R, AttemptError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(&self.url).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().map_err(|err| self.classify(err))?;
        let status = response.status();
        if !status.is_success() {
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            return Err(AttemptError {
                error: RagError::model_unavailable(&self.model, format!("HTTP {status}")),
                retryable,
            });
        }

        response.json::<R>().map_err(|err| {
            if err.is_timeout() {
                self.classify(err)
            } else {
                AttemptError {
                    error: RagError::model_unavailable(
                        &self.model,
                        format!("unreadable response: {err}"),
                    ),
                    retryable: false,
                }
            }
        })
    }

    fn classify(&self, err: reqwest::Error) -> AttemptError {
        if err.is_timeout() {
            return AttemptError {
                error: RagError::ModelTimeout {
                    model: self.model.clone(),
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                },
                retryable: false,
            };
        }

        AttemptError {
            error: RagError::model_unavailable(&self.model, err.to_string()),
            retryable: err.is_connect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    pub struct CannedServer {
        pub url: String,
        pub hits: Arc<AtomicUsize>,
    }

    pub fn serve(replies: Vec<(u16, String)>) -> CannedServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/v1/endpoint", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        thread::spawn(move || {
            for (status, body) in replies {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                respond(stream, status, &body);
            }
        });

        CannedServer { url, hits }
    }

    pub fn silent() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/v1/endpoint", listener.local_addr().unwrap());
        (listener, url)
    }

    fn respond(stream: TcpStream, status: u16, body: &str) {
        let mut reader = BufReader::new(stream);
        let mut content_length = 0_usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            let header = line.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
        let mut request_body = vec![0_u8; content_length];
        let _ = reader.read_exact(&mut request_body);

        let mut stream = reader.into_inner();
        let reply = format!(
            "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(reply.as_bytes());
        let _ = stream.flush();
    }
}
