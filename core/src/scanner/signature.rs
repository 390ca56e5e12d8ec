//! HTTP service signature probe.

use tracing::{debug, trace};

use super::SignatureSettings;
use crate::network::{HttpFetcher, HttpResponse};

/// Tries each candidate URL in order and stops at the first page whose status is
/// 2xx-ok or a redirect and whose body contains one of the markers.
pub async fn detect(http: &dyn HttpFetcher, address: &str, settings: &SignatureSettings) -> bool {
    for candidate in &settings.candidates {
        let url = candidate.url_for(address);
        match http.get(&url, &settings.fetch).await {
            Ok(response) if matches_signature(&response, &settings.markers) => {
                debug!("Signature matched at {url}");
                return true;
            }
            Ok(response) => trace!("{url} answered {} without a marker", response.status),
            Err(e) => trace!("{url}: {e}"),
        }
    }
    false
}

fn matches_signature(response: &HttpResponse, markers: &[String]) -> bool {
    let accepted = response.status == 200 || (300..400).contains(&response.status);
    accepted && markers.iter().any(|marker| response.body.contains(marker.as_str()))
}
