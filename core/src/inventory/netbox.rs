//! NetBox REST adapter.

use std::time::Duration;

use async_trait::async_trait;
use infrasync_common::config::Endpoint;
use reqwest::{Client, Method, StatusCode, header};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Fields, Filter, Inventory, ObjectKind, Record};
use crate::error::InventoryError;

const STATUS_PATH: &str = "/api/status/";

impl ObjectKind {
    /// Collection path of this kind in the NetBox API.
    pub fn api_path(self) -> &'static str {
        match self {
            ObjectKind::ClusterType => "/api/virtualization/cluster-types/",
            ObjectKind::Cluster => "/api/virtualization/clusters/",
            ObjectKind::Device => "/api/dcim/devices/",
            ObjectKind::VirtualMachine => "/api/virtualization/virtual-machines/",
            ObjectKind::VmInterface => "/api/virtualization/interfaces/",
            ObjectKind::DeviceInterface => "/api/dcim/interfaces/",
            ObjectKind::IpAddress => "/api/ipam/ip-addresses/",
            ObjectKind::CustomField => "/api/extras/custom-fields/",
        }
    }
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    count: Option<u64>,
    results: Vec<Value>,
}

pub struct NetboxClient {
    client: Client,
    base_url: String,
    token: String,
}

impl NetboxClient {
    pub fn new(endpoint: &Endpoint, timeout: Duration) -> Result<Self, InventoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InventoryError::Request {
                path: endpoint.url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: endpoint.url.trim_end_matches('/').to_string(),
            token: endpoint.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Fields>,
    ) -> Result<Value, InventoryError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(header::AUTHORIZATION, format!("Token {}", self.token))
            .header(header::ACCEPT, "application/json")
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!("{method} {path}");
        let response = request.send().await.map_err(|e| InventoryError::Request {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        self.handle_response(path, response).await
    }

    async fn handle_response(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<Value, InventoryError> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| InventoryError::Decode {
                path: path.to_string(),
                reason: e.to_string(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(InventoryError::Status {
            path: path.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    fn into_record(path: &str, value: Value) -> Result<Record, InventoryError> {
        Record::from_json(value).ok_or_else(|| InventoryError::Decode {
            path: path.to_string(),
            reason: "object without a numeric id".to_string(),
        })
    }
}

#[async_trait]
impl Inventory for NetboxClient {
    async fn status(&self) -> Result<Value, InventoryError> {
        self.send(Method::GET, STATUS_PATH, &[], None).await
    }

    async fn get(&self, kind: ObjectKind, filter: &Filter) -> Result<Option<Record>, InventoryError> {
        let path = kind.api_path();
        let mut query = filter.pairs().to_vec();
        query.push(("limit".to_string(), "2".to_string()));

        let value = self.send(Method::GET, path, &query, None).await?;
        let page: Page = serde_json::from_value(value).map_err(|e| InventoryError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let total = page.count.unwrap_or(page.results.len() as u64);
        if total > 1 {
            warn!("{total} {kind} objects match {filter}, using the first");
        }

        page.results
            .into_iter()
            .next()
            .map(|value| Self::into_record(path, value))
            .transpose()
    }

    async fn create(&self, kind: ObjectKind, fields: Fields) -> Result<Record, InventoryError> {
        let path = kind.api_path();
        let value = self
            .send(Method::POST, path, &[], Some(&fields))
            .await
            .map_err(|e| reject(kind, e))?;
        Self::into_record(path, value)
    }

    async fn update(&self, kind: ObjectKind, id: u64, changes: Fields) -> Result<Record, InventoryError> {
        let path = format!("{}{id}/", kind.api_path());
        let value = self
            .send(Method::PATCH, &path, &[], Some(&changes))
            .await
            .map_err(|e| match e {
                InventoryError::Status { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
                    InventoryError::Missing { kind, id }
                }
                other => reject(kind, other),
            })?;
        Self::into_record(&path, value)
    }
}

/// Validation failures come back as HTTP 400 with a field-keyed JSON body.
fn reject(kind: ObjectKind, err: InventoryError) -> InventoryError {
    match err {
        InventoryError::Status { status, body, .. } if status == StatusCode::BAD_REQUEST.as_u16() => {
            InventoryError::Rejected { kind, reason: body }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_paths_are_collection_urls() {
        for kind in [
            ObjectKind::ClusterType,
            ObjectKind::Cluster,
            ObjectKind::Device,
            ObjectKind::VirtualMachine,
            ObjectKind::VmInterface,
            ObjectKind::DeviceInterface,
            ObjectKind::IpAddress,
            ObjectKind::CustomField,
        ] {
            let path = kind.api_path();
            assert!(path.starts_with("/api/"));
            assert!(path.ends_with('/'));
        }
        assert_eq!(ObjectKind::VmInterface.api_path(), "/api/virtualization/interfaces/");
    }

    #[test]
    fn bad_request_becomes_rejection() {
        let err = InventoryError::Status {
            path: "/api/ipam/ip-addresses/".into(),
            status: 400,
            body: r#"{"address":["Duplicate IP address"]}"#.into(),
        };
        let mapped = reject(ObjectKind::IpAddress, err);
        assert!(matches!(mapped, InventoryError::Rejected { kind: ObjectKind::IpAddress, .. }));
    }

    #[test]
    fn server_errors_pass_through() {
        let err = InventoryError::Status {
            path: "/api/dcim/devices/".into(),
            status: 503,
            body: String::new(),
        };
        assert!(matches!(
            reject(ObjectKind::Device, err),
            InventoryError::Status { status: 503, .. }
        ));
    }

    #[test]
    fn base_url_loses_trailing_slash() {
        let endpoint = Endpoint {
            url: "https://netbox.lan/".into(),
            token: "0123456789abcdef".into(),
        };
        let client = NetboxClient::new(&endpoint, Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "https://netbox.lan");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_request_error() {
        let endpoint = Endpoint {
            url: "http://127.0.0.1:1".into(),
            token: "token".into(),
        };
        let client = NetboxClient::new(&endpoint, Duration::from_millis(500)).unwrap();
        let result = client.status().await;
        assert!(matches!(result, Err(InventoryError::Request { .. })));
    }
}
