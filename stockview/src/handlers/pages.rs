use std::collections::HashMap;

use axum::{
	extract::{Path, Query, State},
	http::{header, HeaderMap, StatusCode, Uri},
	response::{Html, IntoResponse, Redirect, Response},
};
use minijinja::context;
use stockview_core::{
	views::{self, CustomRoute, TableRoute},
	PageParams, RouteTarget, Snapshot,
};

use crate::{
	handlers::{api::ApiErrors, request_language, LANG_COOKIE},
	AppState,
};

/// Rendered error page with its status.
#[derive(Debug)]
pub struct PageError {
	status: StatusCode,
	body: String,
}

impl PageError {
	fn new(
		state: &AppState,
		lang: &str,
		status: StatusCode,
		title_key: &str,
		message: &str,
	) -> Self {
		let body = state.renderer.error_page(lang, status.as_u16(), title_key, message);
		Self { status, body }
	}

	fn render(state: &AppState, lang: &str, e: minijinja::Error) -> Self {
		log::error!("Template error: {:#}", e);
		Self::new(state, lang, StatusCode::INTERNAL_SERVER_ERROR, "errors.view", "")
	}
}

impl IntoResponse for PageError {
	fn into_response(self) -> Response {
		(self.status, Html(self.body)).into_response()
	}
}

pub async fn index(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Html<String>, PageError> {
	let lang = request_language(&headers, &state.translations);
	let snapshot = state.snapshot.load();

	let views: Vec<minijinja::Value> = snapshot
		.routes
		.iter()
		.filter_map(|(path, target)| match target {
			RouteTarget::Custom(view) => Some(context! {
				route => path,
				display_name => view.config.display_name.as_deref().unwrap_or(&view.name),
			}),
			RouteTarget::Table(_) => None,
		})
		.collect();

	state
		.renderer
		.render("menu.html", &lang, context! { menu => &snapshot.menu, views })
		.map(Html)
		.map_err(|e| PageError::render(&state, &lang, e))
}

/// Every path not claimed by a fixed route goes through the route table of
/// the current snapshot.
pub async fn dispatch(
	State(state): State<AppState>,
	uri: Uri,
	headers: HeaderMap,
	Query(query): Query<HashMap<String, String>>,
) -> Result<Html<String>, PageError> {
	let lang = request_language(&headers, &state.translations);
	let snapshot = state.snapshot.load();

	match snapshot.routes.resolve(uri.path()) {
		Some(RouteTarget::Table(route)) => {
			table_page(&state, &snapshot, route, &query, &lang).await
		}
		Some(RouteTarget::Custom(route)) => {
			custom_page(&state, &snapshot, route, &query, &lang).await
		}
		None => {
			let status = StatusCode::NOT_FOUND;
			Err(PageError::new(&state, &lang, status, "errors.not_found", uri.path()))
		}
	}
}

pub fn page_params(query: &HashMap<String, String>) -> PageParams {
	PageParams {
		limit: query.get("limit").and_then(|v| v.parse().ok()).filter(|limit| *limit > 0),
		page: query.get("page").and_then(|v| v.parse().ok()).filter(|page| *page > 0).unwrap_or(1),
	}
}

async fn table_page(
	state: &AppState,
	snapshot: &Snapshot,
	route: &TableRoute,
	query: &HashMap<String, String>,
	lang: &str,
) -> Result<Html<String>, PageError> {
	let colors = snapshot.routes.status_colors();
	let page =
		views::render_table(&state.db, route, colors, page_params(query)).await.map_err(|e| {
			log::error!("Error rendering table {}: {}", route.name, e);
			let status = StatusCode::INTERNAL_SERVER_ERROR;
			PageError::new(state, lang, status, "errors.table", &e.to_string())
		})?;

	state
		.renderer
		.render(views::TABLE_TEMPLATE, lang, context! { page })
		.map(Html)
		.map_err(|e| PageError::render(state, lang, e))
}

async fn custom_page(
	state: &AppState,
	snapshot: &Snapshot,
	route: &CustomRoute,
	query: &HashMap<String, String>,
	lang: &str,
) -> Result<Html<String>, PageError> {
	let colors = snapshot.routes.status_colors();
	let page = views::render_custom(&state.db, route, colors, query).await.map_err(|e| {
		log::error!("Error in custom view {}: {}", route.name, e);
		let status = StatusCode::INTERNAL_SERVER_ERROR;
		PageError::new(state, lang, status, "errors.view", &e.to_string())
	})?;

	let template = page.template.clone();
	state
		.renderer
		.render(&template, lang, context! { formatted => page.rows.is_formatted(), page })
		.map(Html)
		.map_err(|e| PageError::render(state, lang, e))
}

/// Stores the language in a cookie and sends the user back where they came
/// from, as long as that is a path on this server.
pub async fn set_language(
	State(state): State<AppState>,
	Path(lang): Path<String>,
	headers: HeaderMap,
) -> Result<Response, ApiErrors> {
	if !state.translations.supports(&lang) {
		return Err(ApiErrors::LanguageNotSupported);
	}

	let target = headers
		.get(header::REFERER)
		.and_then(|value| value.to_str().ok())
		.and_then(local_path)
		.unwrap_or("/");
	let cookie = format!("{}={}; Path=/; Max-Age=31536000; SameSite=Lax", LANG_COOKIE, lang);

	Ok(([(header::SET_COOKIE, cookie)], Redirect::to(target)).into_response())
}

/// Path (and query) of a referer URL, refusing anything that would leave
/// this host.
fn local_path(referer: &str) -> Option<&str> {
	let path = match referer.find("://") {
		Some(scheme_end) => {
			let rest = &referer[scheme_end + 3..];
			&rest[rest.find('/')?..]
		}
		None => referer,
	};
	(path.starts_with('/') && !path.starts_with("//")).then_some(path)
}

#[cfg(test)]
mod tests {
	use axum::http::HeaderValue;

	use super::*;
	use crate::handlers::testing;

	async fn get(
		state: &AppState,
		path: &'static str,
		query: HashMap<String, String>,
	) -> Result<Html<String>, PageError> {
		dispatch(State(state.clone()), Uri::from_static(path), HeaderMap::new(), Query(query)).await
	}

	#[tokio::test]
	async fn test_table_route_renders_formatted_rows() -> Result<(), Box<dyn std::error::Error>> {
		let (_root, state) = testing::state().await?;

		let query = HashMap::from([("limit".to_string(), "1".to_string())]);
		let Html(body) = get(&state, "/table/run_missioni", query)
			.await
			.map_err(|e| format!("unexpected {}", e.status))?;

		assert!(body.contains("RUN_MISSIONI"));
		assert!(body.contains("status-badge status-red"));
		assert!(!body.contains("status-badge status-green"));
		assert!(body.contains("2024-03-01 08:15:00"));
		assert!(!body.contains("2024-02-29"));
		Ok(())
	}

	#[tokio::test]
	async fn test_custom_view_and_index() -> Result<(), Box<dyn std::error::Error>> {
		let (_root, state) = testing::state().await?;

		let Html(body) = get(&state, "/reports/missions", HashMap::new())
			.await
			.map_err(|e| format!("unexpected {}", e.status))?;
		assert!(body.contains("Mission count"));
		assert!(body.contains("<td>2</td>"));

		let mut headers = HeaderMap::new();
		headers.insert(header::COOKIE, HeaderValue::from_static("lang=en"));
		let Html(body) =
			index(State(state), headers).await.map_err(|e| format!("unexpected {}", e.status))?;
		assert!(body.contains("run_missioni"));
		assert!(body.contains("reports"));
		assert!(body.contains("Custom views"));
		Ok(())
	}

	#[tokio::test]
	async fn test_unknown_path_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
		let (_root, state) = testing::state().await?;

		let err = get(&state, "/table/nowhere", HashMap::new())
			.await
			.err()
			.ok_or("expected an error page")?;
		assert_eq!(err.status, StatusCode::NOT_FOUND);
		assert!(err.body.contains("Pagina non trovata"));
		Ok(())
	}

	#[tokio::test]
	async fn test_set_language_redirects_back() -> Result<(), Box<dyn std::error::Error>> {
		let (_root, state) = testing::state().await?;

		let mut headers = HeaderMap::new();
		let referer = HeaderValue::from_static("http://localhost:5000/table/run_missioni?limit=5");
		headers.insert(header::REFERER, referer);
		let response = set_language(State(state.clone()), Path("en".to_string()), headers)
			.await
			.map_err(|_| "language rejected")?;
		assert_eq!(response.status(), StatusCode::SEE_OTHER);
		assert_eq!(response.headers()[header::LOCATION], "/table/run_missioni?limit=5");
		assert!(response.headers()[header::SET_COOKIE].to_str()?.starts_with("lang=en;"));

		let rejected = set_language(State(state), Path("fr".to_string()), HeaderMap::new()).await;
		let status = rejected.err().ok_or("expected rejection")?.into_response().status();
		assert_eq!(status, StatusCode::BAD_REQUEST);
		Ok(())
	}

	#[test]
	fn referer_must_stay_on_this_host() {
		assert_eq!(local_path("http://localhost:5000/a?b=1"), Some("/a?b=1"));
		assert_eq!(local_path("/relative"), Some("/relative"));
		assert_eq!(local_path("http://localhost:5000"), None);
		assert_eq!(local_path("//evil.example/x"), None);
		assert_eq!(local_path("javascript:alert(1)"), None);
	}

	#[test]
	fn page_params_ignore_garbage() {
		let query = |limit: &str, page: &str| {
			let limit = ("limit".to_string(), limit.to_string());
			HashMap::from([limit, ("page".to_string(), page.to_string())])
		};
		assert_eq!(page_params(&query("abc", "0")), PageParams::default());
		assert_eq!(page_params(&query("25", "3")), PageParams { limit: Some(25), page: 3 });
	}
}
