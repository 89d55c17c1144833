use crate::middleware::gate::{ClientHandle, HxRequest};
use crate::services::access_gate::GateView;
use crate::services::identity_client::AuthAction;
use crate::services::session_manager::SignUpResult;
use askama::Template;
use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;

/// Where a fresh sign-in lands.
const AFTER_SIGN_IN: &str = "/newsletters/new";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    #[default]
    SignIn,
    SignUp,
}

impl AuthMode {
    pub fn from_query(mode: Option<&str>) -> Self {
        match mode {
            Some("sign-up") => AuthMode::SignUp,
            _ => AuthMode::SignIn,
        }
    }

    pub fn is_sign_up(&self) -> bool {
        *self == AuthMode::SignUp
    }

    pub fn action(&self) -> &'static str {
        match self {
            AuthMode::SignIn => "/auth/sign-in",
            AuthMode::SignUp => "/auth/sign-up",
        }
    }

    pub fn submit_label(&self) -> &'static str {
        match self {
            AuthMode::SignIn => "Sign in",
            AuthMode::SignUp => "Sign up",
        }
    }

    pub fn toggle_href(&self) -> &'static str {
        match self {
            AuthMode::SignIn => "/dashboard?mode=sign-up",
            AuthMode::SignUp => "/dashboard",
        }
    }

    pub fn toggle_label(&self) -> &'static str {
        match self {
            AuthMode::SignIn => "Need an account? Sign up",
            AuthMode::SignUp => "Already have an account? Sign in",
        }
    }
}

#[derive(Template)]
#[template(path = "pages/sign_in.html")]
pub struct SignInTemplate {
    pub mode: AuthMode,
    pub email: String,
    pub error: Option<String>,
    pub notice: Option<String>,
}

impl SignInTemplate {
    fn new(mode: AuthMode) -> Self {
        Self {
            mode,
            email: String::new(),
            error: None,
            notice: None,
        }
    }
}

#[derive(Template)]
#[template(path = "pages/pending.html")]
pub struct PendingTemplate {
    pub email: String,
}

#[derive(Template)]
#[template(path = "pages/loading.html")]
pub struct LoadingTemplate {
    pub poll_path: String,
}

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Page for a gate state other than `Approved`.
pub fn gate_response(view: GateView, mode: AuthMode, path: &str) -> Response {
    match view {
        GateView::Loading => LoadingTemplate {
            poll_path: path.to_string(),
        }
        .into_response(),
        GateView::SignIn => SignInTemplate::new(mode).into_response(),
        GateView::PendingApproval { session } => PendingTemplate {
            email: session.email.clone().unwrap_or_default(),
        }
        .into_response(),
        GateView::Approved { .. } => Redirect::to(path).into_response(),
    }
}

fn redirect(to: &'static str, hx: HxRequest) -> Response {
    if hx.0 {
        let mut headers = HeaderMap::new();
        headers.insert("HX-Redirect", HeaderValue::from_static(to));
        (StatusCode::OK, headers).into_response()
    } else {
        Redirect::to(to).into_response()
    }
}

fn rejected(mode: AuthMode, email: String, message: String) -> Response {
    let page = SignInTemplate {
        email,
        error: Some(message),
        ..SignInTemplate::new(mode)
    };
    (StatusCode::UNPROCESSABLE_ENTITY, page).into_response()
}

pub async fn sign_in_handler(
    client: ClientHandle,
    hx: HxRequest,
    Form(credentials): Form<Credentials>,
) -> Response {
    let email = credentials.email.trim().to_string();
    match client
        .context
        .sessions
        .sign_in(&email, &credentials.password)
        .await
    {
        Ok(_) => {
            client.persist().await;
            redirect(AFTER_SIGN_IN, hx)
        }
        Err(e) => rejected(AuthMode::SignIn, email, e.user_message(AuthAction::SignIn)),
    }
}

pub async fn sign_up_handler(
    client: ClientHandle,
    hx: HxRequest,
    Form(credentials): Form<Credentials>,
) -> Response {
    let email = credentials.email.trim().to_string();
    match client
        .context
        .sessions
        .sign_up(&email, &credentials.password)
        .await
    {
        Ok(SignUpResult::SignedIn(_)) => {
            client.persist().await;
            redirect(AFTER_SIGN_IN, hx)
        }
        Ok(SignUpResult::ConfirmationRequired { email: confirmed }) => {
            let address = confirmed.unwrap_or_else(|| email.clone());
            SignInTemplate {
                email,
                notice: Some(format!(
                    "Check {} for a confirmation link, then sign in.",
                    address
                )),
                ..SignInTemplate::new(AuthMode::SignIn)
            }
            .into_response()
        }
        Err(e) => rejected(AuthMode::SignUp, email, e.user_message(AuthAction::SignUp)),
    }
}

pub async fn sign_out_handler(client: ClientHandle, hx: HxRequest) -> Response {
    client.context.sessions.sign_out().await;
    client.persist().await;
    redirect("/dashboard", hx)
}
