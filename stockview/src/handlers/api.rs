use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use stockview_core::views::{self, TableData};

use crate::AppState;

pub enum ApiErrors {
	LanguageNotFound,
	LanguageNotSupported,
	TableNotFound(String),
	QueryFailed(String),
	ServerError(String),
}

impl IntoResponse for ApiErrors {
	fn into_response(self) -> Response {
		let (status, message) = match self {
			ApiErrors::LanguageNotFound => {
				(StatusCode::NOT_FOUND, "Language not found".to_string())
			}
			ApiErrors::LanguageNotSupported => {
				(StatusCode::BAD_REQUEST, "Language not supported".to_string())
			}
			ApiErrors::TableNotFound(name) => {
				(StatusCode::NOT_FOUND, format!("Table not found: {}", name))
			}
			ApiErrors::QueryFailed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
			ApiErrors::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
		};

		(status, Json(json!({ "error": message }))).into_response()
	}
}

pub async fn translations(
	State(state): State<AppState>,
	Path(lang): Path<String>,
) -> Result<Json<Value>, ApiErrors> {
	state.translations.document(&lang).cloned().map(Json).ok_or(ApiErrors::LanguageNotFound)
}

#[derive(Debug, Deserialize)]
pub struct TableParams {
	limit: Option<usize>,
	offset: Option<usize>,
}

/// Raw rows of one exposed table as JSON.
pub async fn table(
	State(state): State<AppState>,
	Path(name): Path<String>,
	Query(params): Query<TableParams>,
) -> Result<Json<TableData>, ApiErrors> {
	if let Some(offset) = params.offset {
		log::debug!("Ignoring offset {} for {}", offset, name);
	}

	let snapshot = state.snapshot.load();
	let route =
		snapshot.routes.find_table(&name).ok_or_else(|| ApiErrors::TableNotFound(name.clone()))?;

	views::table_data(&state.db, route, params.limit).await.map(Json).map_err(|e| {
		log::error!("API error for {}: {}", name, e);
		ApiErrors::QueryFailed(e.to_string())
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::handlers::testing;

	#[tokio::test]
	async fn test_table_api_returns_rows() -> Result<(), Box<dyn std::error::Error>> {
		let (_root, state) = testing::state().await?;

		let params = TableParams { limit: Some(1), offset: Some(50) };
		let name = Path("RUN_MISSIONI".to_string());
		let Json(data) = table(State(state.clone()), name, Query(params))
			.await
			.map_err(|_| "table api failed")?;
		assert_eq!(data.columns, ["MISSION_ID", "ORDER_STATUS", "QTY", "CREATED"]);
		assert_eq!(data.count, 1);
		assert_eq!(data.data[0]["MISSION_ID"], json!(2));

		let params = TableParams { limit: None, offset: None };
		let missing = table(State(state), Path("sysdiagrams".to_string()), Query(params)).await;
		let status = missing.err().ok_or("expected not found")?.into_response().status();
		assert_eq!(status, StatusCode::NOT_FOUND);
		Ok(())
	}

	#[tokio::test]
	async fn test_translation_documents() -> Result<(), Box<dyn std::error::Error>> {
		let (_root, state) = testing::state().await?;

		let Json(doc) = translations(State(state.clone()), Path("en".to_string()))
			.await
			.map_err(|_| "missing en")?;
		assert_eq!(doc["meta"]["language_name"], "English");

		let missing = translations(State(state), Path("fr".to_string())).await;
		let status = missing.err().ok_or("expected not found")?.into_response().status();
		assert_eq!(status, StatusCode::NOT_FOUND);
		Ok(())
	}
}
