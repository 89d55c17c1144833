use crate::middleware::gate::ApprovedContext;
use crate::services::newsletter_client::NewsletterApi;
use crate::views::editor::{
    self, EditorFields, EditorForm, EditorMode, FeatureRow, LENGTHS, TONES,
};
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use uuid::Uuid;

pub struct Choice {
    pub value: &'static str,
    pub selected: bool,
}

fn choices(values: &[&'static str], current: &str) -> Vec<Choice> {
    values
        .iter()
        .map(|&value| Choice {
            value,
            selected: value == current,
        })
        .collect()
}

#[derive(Template)]
#[template(path = "pages/editor.html")]
pub struct EditorTemplate {
    pub email: String,
    pub id: Option<Uuid>,
    pub form: EditorForm,
    pub fields: EditorFields,
    pub features: Vec<FeatureRow>,
    pub tones: Vec<Choice>,
    pub lengths: Vec<Choice>,
    pub error: Option<String>,
    pub notice: Option<String>,
}

impl EditorTemplate {
    fn new(
        approved: &ApprovedContext,
        mode: EditorMode,
        form: EditorForm,
        fields: EditorFields,
    ) -> Self {
        Self {
            email: approved.email(),
            id: mode.id(),
            features: form.feature_rows(),
            tones: choices(&TONES, &form.tone),
            lengths: choices(&LENGTHS, &form.length),
            form,
            fields,
            error: None,
            notice: None,
        }
    }

    fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    pub fn heading(&self) -> &'static str {
        if self.id.is_some() {
            "Edit newsletter"
        } else {
            "New newsletter"
        }
    }

    pub fn action(&self) -> String {
        match self.id {
            Some(id) => format!("/newsletters/{}", id),
            None => "/newsletters".to_string(),
        }
    }
}

pub async fn new_newsletter_page(
    State(state): State<AppState>,
    approved: ApprovedContext,
) -> impl IntoResponse {
    let email = approved.context().sessions.current_user_email().await;
    let form = EditorForm::default().with_delivery_email_prefill(email);
    EditorTemplate::new(&approved, EditorMode::Create, form, state.editor_fields.clone())
}

pub async fn edit_newsletter_page(
    State(state): State<AppState>,
    approved: ApprovedContext,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let mode = EditorMode::Edit(id);
    let fields = state.editor_fields.clone();
    match approved.context().newsletters.get(id).await {
        Ok(config) => {
            EditorTemplate::new(&approved, mode, EditorForm::from_config(&config), fields)
        }
        Err(e) => EditorTemplate::new(&approved, mode, EditorForm::default(), fields)
            .with_error(e.to_string()),
    }
}

pub async fn create_newsletter(
    State(state): State<AppState>,
    approved: ApprovedContext,
    Form(submission): Form<Vec<(String, String)>>,
) -> Response {
    save(&state, &approved, EditorMode::Create, &submission).await
}

pub async fn update_newsletter(
    State(state): State<AppState>,
    approved: ApprovedContext,
    Path(id): Path<Uuid>,
    Form(submission): Form<Vec<(String, String)>>,
) -> Response {
    save(&state, &approved, EditorMode::Edit(id), &submission).await
}

async fn save(
    state: &AppState,
    approved: &ApprovedContext,
    mode: EditorMode,
    submission: &[(String, String)],
) -> Response {
    let form = EditorForm::from_submission(submission);
    let fields = state.editor_fields.clone();

    if let Err(message) = form.validate() {
        let page = EditorTemplate::new(approved, mode, form, fields).with_error(message);
        return (StatusCode::UNPROCESSABLE_ENTITY, page).into_response();
    }

    match editor::submit(&approved.context().newsletters, mode, &form, &fields).await {
        Ok(_) => Redirect::to("/dashboard").into_response(),
        Err(e) => EditorTemplate::new(approved, mode, form, fields)
            .with_error(e.to_string())
            .into_response(),
    }
}

/// Send a sample of a stored newsletter, keeping the submitted (possibly unsaved)
/// form on screen.
pub async fn send_sample(
    State(state): State<AppState>,
    approved: ApprovedContext,
    Path(id): Path<Uuid>,
    Form(submission): Form<Vec<(String, String)>>,
) -> impl IntoResponse {
    let form = EditorForm::from_submission(&submission);
    let result =
        editor::send_sample(&approved.context().newsletters, id, &form.delivery_email).await;

    let fields = state.editor_fields.clone();
    let page = EditorTemplate::new(&approved, EditorMode::Edit(id), form, fields);
    match result {
        Ok(message) => EditorTemplate {
            notice: Some(message),
            ..page
        },
        Err(e) => page.with_error(e.to_string()),
    }
}
