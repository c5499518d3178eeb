use axum::{
    Form,
    extract::{Path, State, rejection::FormRejection},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::{
    AppState,
    auth::LOGIN_PATH,
    error::{AppError, AppResult},
    models::{SnippetCreateForm, UserLoginForm, UserSignupForm},
    render::{Page, PageContext, render},
    session,
    validator::{self, EMAIL_RX},
};

/// Decodes a url-encoded form, answering 400 for anything undecodable.
fn decode<T>(form: Result<Form<T>, FormRejection>) -> AppResult<T> {
    form.map(|Form(value)| value).map_err(|rejection| {
        tracing::debug!(%rejection, "undecodable form submission");
        AppError::BadRequest
    })
}

// --- Snippet Handlers ---

/// home
///
/// [Protected Route] Lists the latest non-expired snippets.
pub async fn home(State(state): State<AppState>, ctx: PageContext) -> AppResult<Response> {
    let snippets = state.repo.latest_snippets().await?;
    let data = ctx.template_data().await?;
    render(state.renderer.as_ref(), StatusCode::OK, Page::Home(&snippets), &data)
}

/// snippet_view
///
/// [Protected Route] Shows one snippet. Ids below 1 and expired or unknown
/// snippets all answer 404.
pub async fn snippet_view(
    State(state): State<AppState>,
    ctx: PageContext,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = id
        .parse::<i64>()
        .ok()
        .filter(|id| *id >= 1)
        .ok_or(AppError::NotFound)?;

    let snippet = state.repo.get_snippet(id).await?.ok_or(AppError::NotFound)?;
    let data = ctx.template_data().await?;
    render(state.renderer.as_ref(), StatusCode::OK, Page::View(&snippet), &data)
}

pub async fn snippet_create(State(state): State<AppState>, ctx: PageContext) -> AppResult<Response> {
    let form = SnippetCreateForm::default();
    let data = ctx.template_data().await?;
    render(state.renderer.as_ref(), StatusCode::OK, Page::Create(&form), &data)
}

/// snippet_create_post
///
/// [Protected Route] Validates and stores a new snippet, then redirects to it.
/// Invalid submissions re-render the form with 422 and keep the user's input.
pub async fn snippet_create_post(
    State(state): State<AppState>,
    ctx: PageContext,
    form: Result<Form<SnippetCreateForm>, FormRejection>,
) -> AppResult<Response> {
    let mut form = decode(form)?;

    let v = &mut form.validator;
    v.check_field(validator::not_blank(&form.title), "title", "This field cannot be blank");
    v.check_field(
        validator::max_chars(&form.title, 100),
        "title",
        "This field cannot be more than 100 characters long",
    );
    v.check_field(validator::not_blank(&form.content), "content", "This field cannot be blank");
    v.check_field(
        validator::min_chars(&form.content, 10),
        "content",
        "This field must be at least 10 characters long",
    );
    v.check_field(
        validator::min_word_count(&form.content, 5),
        "content",
        "This field must contain at least 5 words",
    );
    v.check_field(
        validator::max_chars(&form.content, 1000),
        "content",
        "This field must be less than 1000 characters long",
    );
    v.check_field(
        validator::permitted_value(form.expires, &[1, 7, 365]),
        "expires",
        "This field must equal 1, 7 or 365",
    );

    if !form.validator.valid() {
        let data = ctx.template_data().await?;
        return render(
            state.renderer.as_ref(),
            StatusCode::UNPROCESSABLE_ENTITY,
            Page::Create(&form),
            &data,
        );
    }

    let id = state
        .repo
        .insert_snippet(&form.title, &form.content, form.expires)
        .await?;
    session::put_flash(&ctx.session, "Snippet successfully created!").await?;

    Ok(Redirect::to(&format!("/snippet/view/{id}")).into_response())
}

// --- User Handlers ---

pub async fn user_signup(State(state): State<AppState>, ctx: PageContext) -> AppResult<Response> {
    let form = UserSignupForm::default();
    let data = ctx.template_data().await?;
    render(state.renderer.as_ref(), StatusCode::OK, Page::Signup(&form), &data)
}

/// user_signup_post
///
/// [Public Route] Creates an account. A taken email address is reported on the
/// email field rather than as an error page.
pub async fn user_signup_post(
    State(state): State<AppState>,
    ctx: PageContext,
    form: Result<Form<UserSignupForm>, FormRejection>,
) -> AppResult<Response> {
    let mut form = decode(form)?;

    let v = &mut form.validator;
    v.check_field(validator::not_blank(&form.name), "name", "This field cannot be blank");
    v.check_field(validator::not_blank(&form.email), "email", "This field cannot be blank");
    v.check_field(
        validator::matches(&form.email, &EMAIL_RX),
        "email",
        "This field must be a valid email address",
    );
    v.check_field(validator::not_blank(&form.password), "password", "This field cannot be blank");
    v.check_field(
        validator::min_chars(&form.password, 8),
        "password",
        "This field must be at least 8 characters long",
    );

    if form.validator.valid() {
        match state
            .repo
            .insert_user(&form.name, &form.email, &form.password)
            .await
        {
            Ok(()) => {
                session::put_flash(&ctx.session, "Your signup was successful. Please log in.")
                    .await?;
                return Ok(Redirect::to(LOGIN_PATH).into_response());
            }
            Err(AppError::DuplicateEmail) => form
                .validator
                .add_field_error("email", "Email address is already in use"),
            Err(e) => return Err(e),
        }
    }

    let data = ctx.template_data().await?;
    render(
        state.renderer.as_ref(),
        StatusCode::UNPROCESSABLE_ENTITY,
        Page::Signup(&form),
        &data,
    )
}

pub async fn user_login(State(state): State<AppState>, ctx: PageContext) -> AppResult<Response> {
    let form = UserLoginForm::default();
    let data = ctx.template_data().await?;
    render(state.renderer.as_ref(), StatusCode::OK, Page::Login(&form), &data)
}

/// user_login_post
///
/// [Public Route] Checks credentials and, on success, renews the session token
/// before storing the identity (see `session::login`).
pub async fn user_login_post(
    State(state): State<AppState>,
    ctx: PageContext,
    form: Result<Form<UserLoginForm>, FormRejection>,
) -> AppResult<Response> {
    let mut form = decode(form)?;

    let v = &mut form.validator;
    v.check_field(validator::not_blank(&form.email), "email", "This field cannot be blank");
    v.check_field(
        validator::matches(&form.email, &EMAIL_RX),
        "email",
        "This field must be a valid email address",
    );
    v.check_field(validator::not_blank(&form.password), "password", "This field cannot be blank");

    if form.validator.valid() {
        match state.repo.authenticate(&form.email, &form.password).await? {
            Some(id) => {
                session::login(&ctx.session, id).await?;
                return Ok(Redirect::to("/").into_response());
            }
            None => form
                .validator
                .add_non_field_error("Email or password is incorrect"),
        }
    }

    // The password is never echoed back into the form.
    form.password.clear();
    let data = ctx.template_data().await?;
    render(
        state.renderer.as_ref(),
        StatusCode::UNPROCESSABLE_ENTITY,
        Page::Login(&form),
        &data,
    )
}

/// user_logout_post
///
/// [Protected Route] Renews the session token and drops the identity.
pub async fn user_logout_post(session: Session) -> AppResult<Response> {
    session::logout(&session).await?;
    session::put_flash(&session, "You've been logged out successfully!").await?;
    Ok(Redirect::to(LOGIN_PATH).into_response())
}

/// account_view
///
/// [Protected Route] Shows the signed-in user's profile.
pub async fn account_view(State(state): State<AppState>, ctx: PageContext) -> AppResult<Response> {
    let Some(id) = session::authenticated_user_id(&ctx.session).await? else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };

    let Some(user) = state.repo.get_user(id).await? else {
        session::put_flash(&ctx.session, "User not found").await?;
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };

    let data = ctx.template_data().await?;
    render(state.renderer.as_ref(), StatusCode::OK, Page::Account(&user), &data)
}

pub async fn ping() -> &'static str {
    "OK"
}
