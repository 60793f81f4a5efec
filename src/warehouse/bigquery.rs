//! BigQuery streaming inserts over the REST `tabledata.insertAll` API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{RowError, Warehouse, WarehouseError};
use crate::models::TelemetryRow;

/// Token endpoint of the GCE/Cloud Run metadata server.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

// ---

/// A parsed `project.dataset.table` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    /// Parse `project.dataset.table` or the legacy `project:dataset.table`.
    ///
    /// Domain-scoped projects (`example.com:proj`) are accepted in both forms.
    pub fn parse(table_id: &str) -> Result<Self, WarehouseError> {
        // ---
        let invalid = || WarehouseError::InvalidTable(table_id.to_string());

        let (head, table) = table_id.rsplit_once('.').ok_or_else(invalid)?;
        let (project, dataset) = match head.rsplit_once(':') {
            Some((project, dataset)) if !dataset.contains('.') => (project, dataset),
            _ => head.rsplit_once('.').ok_or_else(invalid)?,
        };

        let bad_project = project.contains('.') && !project.contains(':');
        if project.is_empty() || dataset.is_empty() || table.is_empty() || bad_project {
            return Err(invalid());
        }

        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }
}

/// Where bearer tokens for the BigQuery API come from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Fixed token, e.g. from `gcloud auth print-access-token` in local runs.
    Static(String),
    /// Service-account token from the metadata server.
    Metadata { url: String },
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

impl TokenSource {
    async fn token(&self, client: &Client) -> Result<String, WarehouseError> {
        // ---
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Metadata { url } => {
                let response = client
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| WarehouseError::Auth(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(WarehouseError::Auth(format!(
                        "metadata server returned HTTP {}",
                        response.status()
                    )));
                }

                let token: MetadataToken = response
                    .json()
                    .await
                    .map_err(|e| WarehouseError::Auth(e.to_string()))?;
                Ok(token.access_token)
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest<'a> {
    skip_invalid_rows: bool,
    rows: Vec<InsertRow<'a>>,
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    json: &'a TelemetryRow,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertError>,
}

#[derive(Debug, Deserialize)]
struct InsertError {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    message: String,
}

/// Writes rows with `tabledata.insertAll`.
#[derive(Debug, Clone)]
pub struct BigQueryWarehouse {
    // ---
    client: Client,
    base_url: String,
    tokens: TokenSource,
}

impl BigQueryWarehouse {
    pub fn new(client: Client, base_url: &str, tokens: TokenSource) -> Self {
        // ---
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Build a writer with its own client. The timeout also bounds the
    /// metadata-server token fetch, which shares the client.
    pub fn with_timeout(
        base_url: &str,
        tokens: TokenSource,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        // ---
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client, base_url, tokens))
    }

    fn insert_all_url(&self, table: &TableRef) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
            self.base_url, table.project, table.dataset, table.table
        )
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn insert_rows(
        &self,
        table_id: &str,
        rows: &[TelemetryRow],
    ) -> Result<Vec<RowError>, WarehouseError> {
        // ---
        let table = TableRef::parse(table_id)?;
        let token = self.tokens.token(&self.client).await?;

        let request = InsertAllRequest {
            skip_invalid_rows: false,
            rows: rows.iter().map(|row| InsertRow { json: row }).collect(),
        };

        debug!(table_id, rows = rows.len(), "Streaming rows to BigQuery");

        let response = self
            .client
            .post(self.insert_all_url(&table))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "BigQuery insertAll failed: {}", body);
            return Err(WarehouseError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: InsertAllResponse = response.json().await?;
        Ok(body
            .insert_errors
            .into_iter()
            .map(|e| RowError {
                index: e.index,
                reason: e
                    .errors
                    .iter()
                    .map(|p| format!("{} ({}): {}", p.reason, p.location, p.message))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{DeviceTelemetry, WeatherSnapshot};
    use axum::{extract::Path, http::HeaderMap, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_server(app: Router) -> String {
        // ---
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn row() -> TelemetryRow {
        // ---
        TelemetryRow::normalize(
            "plant-01",
            "2025-03-26T18:45:00Z",
            &DeviceTelemetry {
                moisture_pct: 40.0,
                moisture_value: 1500.0,
            },
            &WeatherSnapshot::unavailable(),
        )
    }

    const INSERT_ALL: &str =
        "/bigquery/v2/projects/{project}/datasets/{dataset}/tables/{table}/insertAll";

    #[test]
    fn test_table_ref_parse() {
        // ---
        let table = TableRef::parse("fresh-replica-355617.plantmon.telemetry").unwrap();
        assert_eq!(table.project, "fresh-replica-355617");
        assert_eq!(table.dataset, "plantmon");
        assert_eq!(table.table, "telemetry");

        let legacy = TableRef::parse("fresh-replica-355617:plantmon.telemetry").unwrap();
        assert_eq!(legacy, table);

        let domain = TableRef::parse("example.com:proj.plantmon.telemetry").unwrap();
        assert_eq!(domain.project, "example.com:proj");
        assert_eq!(domain.dataset, "plantmon");

        let domain_legacy = TableRef::parse("example.com:proj:plantmon.telemetry").unwrap();
        assert_eq!(domain_legacy, domain);
    }

    #[test]
    fn test_table_ref_rejects_partial_ids() {
        // ---
        for id in ["", "telemetry", "plantmon.telemetry", "p..t", "p.d.t.x", ":d.t"] {
            assert!(TableRef::parse(id).is_err(), "accepted {id:?}");
        }
    }

    #[tokio::test]
    async fn test_insert_all_success() {
        // ---
        let app = Router::new().route(
            INSERT_ALL,
            post(
                |Path((project, dataset, table)): Path<(String, String, String)>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    assert_eq!((project.as_str(), dataset.as_str(), table.as_str()), ("p", "d", "t"));
                    assert_eq!(
                        headers.get("authorization").unwrap().to_str().unwrap(),
                        "Bearer secret"
                    );
                    assert_eq!(body["rows"][0]["json"]["device_id"], "plant-01");
                    Json(json!({"kind": "bigquery#tableDataInsertAllResponse"}))
                },
            ),
        );
        let base = spawn_server(app).await;
        let warehouse =
            BigQueryWarehouse::new(Client::new(), &base, TokenSource::Static("secret".into()));

        let errors = warehouse.insert_rows("p.d.t", &[row()]).await.unwrap();
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_insert_errors_are_reported_per_row() {
        // ---
        let app = Router::new().route(
            INSERT_ALL,
            post(|| async {
                Json(json!({
                    "insertErrors": [{
                        "index": 0,
                        "errors": [{"reason": "invalid", "location": "soil_ph", "message": "no such field."}]
                    }]
                }))
            }),
        );
        let base = spawn_server(app).await;
        let warehouse =
            BigQueryWarehouse::new(Client::new(), &base, TokenSource::Static("secret".into()));

        let errors = warehouse.insert_rows("p.d.t", &[row()]).await.unwrap();
        assert_eq!(
            errors,
            vec![RowError {
                index: 0,
                reason: "invalid (soil_ph): no such field.".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_metadata_token_is_used() {
        // ---
        let app = Router::new()
            .route(
                "/token",
                axum::routing::get(|headers: HeaderMap| async move {
                    assert_eq!(headers.get("metadata-flavor").unwrap(), "Google");
                    Json(json!({"access_token": "from-metadata", "expires_in": 3599, "token_type": "Bearer"}))
                }),
            )
            .route(
                INSERT_ALL,
                post(|headers: HeaderMap| async move {
                    assert_eq!(
                        headers.get("authorization").unwrap().to_str().unwrap(),
                        "Bearer from-metadata"
                    );
                    Json(json!({}))
                }),
            );
        let base = spawn_server(app).await;
        let tokens = TokenSource::Metadata {
            url: format!("{}/token", base),
        };
        let warehouse = BigQueryWarehouse::new(Client::new(), &base, tokens);

        let errors = warehouse.insert_rows("p.d.t", &[row()]).await.unwrap();
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_hung_insert_all_times_out() {
        // ---
        let app = Router::new().route(
            INSERT_ALL,
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let base = spawn_server(app).await;
        let warehouse = BigQueryWarehouse::with_timeout(
            &base,
            TokenSource::Static("secret".into()),
            Duration::from_millis(200),
        )
        .unwrap();

        let err = warehouse.insert_rows("p.d.t", &[row()]).await.unwrap_err();
        assert!(
            matches!(&err, WarehouseError::Http(e) if e.is_timeout()),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_hung_metadata_server_times_out() {
        // ---
        let app = Router::new().route(
            "/token",
            axum::routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"access_token": "late"}))
            }),
        );
        let base = spawn_server(app).await;
        let tokens = TokenSource::Metadata {
            url: format!("{}/token", base),
        };
        let warehouse =
            BigQueryWarehouse::with_timeout(&base, tokens, Duration::from_millis(200)).unwrap();

        let err = warehouse.insert_rows("p.d.t", &[row()]).await.unwrap_err();
        assert!(matches!(err, WarehouseError::Auth(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_api_error_status() {
        // ---
        let app = Router::new().route(
            INSERT_ALL,
            post(|| async { (axum::http::StatusCode::FORBIDDEN, "access denied") }),
        );
        let base = spawn_server(app).await;
        let warehouse =
            BigQueryWarehouse::new(Client::new(), &base, TokenSource::Static("secret".into()));

        let err = warehouse.insert_rows("p.d.t", &[row()]).await.unwrap_err();
        assert!(matches!(err, WarehouseError::Api { status: 403, .. }));
    }
}
