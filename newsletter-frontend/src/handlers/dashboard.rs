use crate::middleware::gate::{ApprovedContext, HxRequest};
use crate::services::NewsletterApi;
use crate::views::dashboard::{
    delete_config, Confirmation, Dashboard, DashboardEntry, DeleteOutcome,
};
use askama::Template;
use axum::{
    extract::Path,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Template)]
#[template(path = "pages/dashboard.html")]
pub struct DashboardTemplate {
    pub email: String,
    pub entries: Vec<DashboardEntry>,
    pub error: Option<String>,
}

/// Confirmation step for browsers without htmx; htmx callers confirm in place.
#[derive(Template)]
#[template(path = "pages/confirm_delete.html")]
pub struct ConfirmDeleteTemplate {
    pub email: String,
    pub entry: DashboardEntry,
}

#[derive(Template)]
#[template(path = "partials/error.html")]
pub struct ErrorFragment {
    pub message: String,
}

#[derive(Deserialize)]
pub struct DeleteForm {
    #[serde(default)]
    pub confirmed: Option<String>,
}

fn render(approved: &ApprovedContext, dashboard: Dashboard) -> DashboardTemplate {
    DashboardTemplate {
        email: approved.email(),
        entries: dashboard.entries,
        error: dashboard.error,
    }
}

pub async fn dashboard_page(approved: ApprovedContext) -> impl IntoResponse {
    let dashboard = Dashboard::load(&approved.context().newsletters).await;
    render(&approved, dashboard)
}

pub async fn confirm_delete_page(approved: ApprovedContext, Path(id): Path<Uuid>) -> Response {
    match approved.context().newsletters.get(id).await {
        Ok(config) => ConfirmDeleteTemplate {
            email: approved.email(),
            entry: DashboardEntry::from(&config),
        }
        .into_response(),
        Err(e) => {
            let mut dashboard = Dashboard::load(&approved.context().newsletters).await;
            dashboard.error = Some(e.to_string());
            render(&approved, dashboard).into_response()
        }
    }
}

/// Delete one listed newsletter. Nothing is deleted without `confirmed`.
///
/// htmx callers get an empty body (their row is swapped out) or an error
/// retargeted at the page's error slot; plain form posts are redirected to the
/// dashboard, or shown it with the error when the delete failed.
pub async fn delete_newsletter(
    approved: ApprovedContext,
    hx: HxRequest,
    Path(id): Path<Uuid>,
    Form(form): Form<DeleteForm>,
) -> Response {
    let confirmation = Confirmation::from_field(form.confirmed.as_deref());
    let newsletters = &approved.context().newsletters;

    if !hx.0 {
        let mut dashboard = Dashboard::load(newsletters).await;
        return match dashboard.delete(newsletters, id, confirmation).await {
            DeleteOutcome::Failed(_) => render(&approved, dashboard).into_response(),
            DeleteOutcome::Deleted | DeleteOutcome::Cancelled => {
                Redirect::to("/dashboard").into_response()
            }
        };
    }

    match delete_config(newsletters, id, confirmation).await {
        DeleteOutcome::Deleted => Html(String::new()).into_response(),
        DeleteOutcome::Cancelled => StatusCode::NO_CONTENT.into_response(),
        DeleteOutcome::Failed(message) => {
            let mut headers = HeaderMap::new();
            headers.insert("HX-Retarget", HeaderValue::from_static("#dashboard-error"));
            headers.insert("HX-Reswap", HeaderValue::from_static("innerHTML"));
            (headers, ErrorFragment { message }).into_response()
        }
    }
}
