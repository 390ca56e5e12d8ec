use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;

use super::{FetchOptions, HttpFetcher, HttpResponse};
use crate::error::TransportError;

const MAX_REDIRECTS: usize = 5;

/// Plain `reqwest` GET. A client is built per call because TLS and redirect
/// behaviour are part of the per-request options.
#[derive(Default)]
pub struct ReqwestFetcher;

impl ReqwestFetcher {
    fn client(options: &FetchOptions) -> Result<reqwest::Client, TransportError> {
        let redirects = if options.follow_redirects {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };

        Ok(reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout.min(Duration::from_secs(2)))
            .danger_accept_invalid_certs(options.allow_insecure_tls)
            .redirect(redirects)
            .build()?)
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, options: &FetchOptions) -> Result<HttpResponse, TransportError> {
        let client = Self::client(options)?;
        let response = client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let options = FetchOptions {
            timeout: Duration::from_millis(500),
            ..FetchOptions::default()
        };
        let result = ReqwestFetcher.get("http://127.0.0.1:1/", &options).await;
        assert!(matches!(result, Err(TransportError::Http(_))));
    }
}
