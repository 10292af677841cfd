use axum::{extract::State, routing::post, Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{error::AppError, routes::cors_layer, services::csv_ingest, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/csv/upload", post(upload_csv))
        .layer(cors_layer())
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    file_name: Option<String>,
    /// Inline CSV text. Wins over `signed_url` when both are given.
    content: Option<String>,
    signed_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ColumnPreview {
    name: String,
    data_type: String,
    sample_values: Vec<String>,
    null_count: usize,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    file_name: String,
    headers: Vec<String>,
    row_count: usize,
    column_count: usize,
    sample_data: Vec<Vec<String>>,
    columns: Vec<ColumnPreview>,
}

#[axum::debug_handler]
async fn upload_csv(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    let start = std::time::Instant::now();
    let file_name = request.file_name.unwrap_or_else(|| "upload.csv".to_string());
    tracing::info!("Parsing uploaded file \"{}\"", file_name);

    let bytes: Bytes = match (request.content, request.signed_url) {
        (Some(content), _) => Bytes::from(content),
        (None, Some(url)) => csv_ingest::load_file_from_url(&url).await?,
        (None, None) => {
            return Err(AppError::InvalidInput(
                "Provide either `content` or `signed_url`".to_string(),
            ))
        }
    };

    if bytes.len() > state.config.max_file_size {
        return Err(AppError::InvalidInput(format!(
            "File exceeds the maximum size of {} bytes",
            state.config.max_file_size
        )));
    }

    let table = match csv_ingest::parse(&bytes) {
        Ok(table) => table,
        Err(err) => {
            tracing::warn!(error = %err, "CSV parse failed");
            state.conversation.parse_failed(&err.message);
            return Err(AppError::CsvParse(err.message));
        }
    };

    let response = UploadResponse {
        file_name: file_name.clone(),
        headers: table.headers.clone(),
        row_count: table.rows.len(),
        column_count: table.headers.len(),
        sample_data: csv_ingest::sample_rows(&table),
        columns: csv_ingest::summarize_columns(&table)
            .into_iter()
            .map(|summary| ColumnPreview {
                name: summary.name,
                data_type: summary.data_type,
                sample_values: summary.sample_values.to_vec(),
                null_count: summary.null_count,
            })
            .collect(),
    };

    state.conversation.load_table(table, &file_name);
    tracing::info!(
        "Loaded \"{}\": {} rows, {} columns in {:?}",
        file_name,
        response.row_count,
        response.column_count,
        start.elapsed()
    );

    Ok(Json(response))
}
