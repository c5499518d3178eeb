//! HTML rendering.
//!
//! Handlers describe *what* to show with a `Page` and the per-request
//! `TemplateData`; a `Renderer` turns that into markup. `HtmlRenderer` writes
//! plain server-side HTML with every dynamic value escaped.

use std::{
    fmt::{self, Write},
    sync::Arc,
};

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{Html, IntoResponse, Response},
};
use chrono::{Datelike, Utc};
use tower_sessions::Session;

use crate::{
    auth::Authentication,
    csrf::{CSRF_FORM_FIELD, CsrfToken},
    error::AppResult,
    models::{Snippet, SnippetCreateForm, User, UserLoginForm, UserSignupForm},
    session,
    validator::Validator,
};

/// Data every page needs, independent of what the page shows.
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub csrf_token: String,
}

pub enum Page<'a> {
    Home(&'a [Snippet]),
    View(&'a Snippet),
    Create(&'a SnippetCreateForm),
    Signup(&'a UserSignupForm),
    Login(&'a UserLoginForm),
    Account(&'a User),
}

impl Page<'_> {
    fn title(&self) -> &'static str {
        match self {
            Page::Home(_) => "Home",
            Page::View(_) => "Snippet",
            Page::Create(_) => "Create a New Snippet",
            Page::Signup(_) => "Signup",
            Page::Login(_) => "Login",
            Page::Account(_) => "Your Account",
        }
    }
}

pub trait Renderer: Send + Sync {
    fn render(&self, page: &Page<'_>, data: &TemplateData) -> AppResult<String>;
}

pub type RendererState = Arc<dyn Renderer>;

/// render
///
/// Renders a full page with the given status. A renderer failure becomes a server
/// error instead of a half-written body.
pub fn render(
    renderer: &dyn Renderer,
    status: StatusCode,
    page: Page<'_>,
    data: &TemplateData,
) -> AppResult<Response> {
    let body = renderer.render(&page, data)?;
    Ok((status, Html(body)).into_response())
}

/// PageContext
///
/// Everything a rendering handler pulls from the request pipeline: the session,
/// the resolved authentication flag and the CSRF token.
pub struct PageContext {
    pub session: Session,
    pub auth: Authentication,
    pub csrf: CsrfToken,
}

impl PageContext {
    /// Builds the template data. Pops the pending flash message, so only call this
    /// when a page is actually going to be rendered.
    pub async fn template_data(&self) -> AppResult<TemplateData> {
        Ok(TemplateData {
            current_year: Utc::now().year(),
            flash: session::pop_flash(&self.session).await?,
            is_authenticated: self.auth.is_authenticated(),
            csrf_token: self.csrf.as_str().to_string(),
        })
    }
}

impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let Ok(auth) = Authentication::from_request_parts(parts, state).await;
        let csrf = CsrfToken::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        Ok(Self {
            session,
            auth,
            csrf,
        })
    }
}

pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn render(&self, page: &Page<'_>, data: &TemplateData) -> AppResult<String> {
        let mut html = String::new();
        write_page(&mut html, page, data)?;
        Ok(html)
    }
}

/// Writes the layout around the page body into any `fmt::Write` sink.
pub fn write_page(html: &mut impl Write, page: &Page<'_>, data: &TemplateData) -> fmt::Result {
    write!(
        html,
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{} - Snippetbox</title>\n\
         <link rel=\"stylesheet\" href=\"/static/css/main.css\">\n</head>\n<body>\n",
        page.title()
    )?;
    nav(html, data)?;
    if let Some(flash) = &data.flash {
        writeln!(html, "<div class=\"flash\">{}</div>", escape(flash))?;
    }
    html.write_str("<main>\n")?;
    match page {
        Page::Home(snippets) => home(html, snippets)?,
        Page::View(snippet) => view(html, snippet)?,
        Page::Create(form) => create(html, form, data)?,
        Page::Signup(form) => signup(html, form, data)?,
        Page::Login(form) => login(html, form, data)?,
        Page::Account(user) => account(html, user)?,
    }
    write!(
        html,
        "</main>\n<footer>Powered by Rust in {}</footer>\n</body>\n</html>\n",
        data.current_year
    )
}

fn nav(html: &mut impl Write, data: &TemplateData) -> fmt::Result {
    html.write_str("<nav>\n<a href=\"/\">Home</a>\n")?;
    if data.is_authenticated {
        html.write_str("<a href=\"/snippet/create\">Create snippet</a>\n")?;
        html.write_str("<a href=\"/user/account/view\">Account</a>\n")?;
        html.write_str("<form action=\"/user/logout\" method=\"POST\">")?;
        csrf_field(html, data)?;
        html.write_str("<button>Logout</button></form>\n")?;
    } else {
        html.write_str("<a href=\"/user/signup\">Signup</a>\n<a href=\"/user/login\">Login</a>\n")?;
    }
    html.write_str("</nav>\n")
}

fn csrf_field(html: &mut impl Write, data: &TemplateData) -> fmt::Result {
    write!(
        html,
        "<input type=\"hidden\" name=\"{CSRF_FORM_FIELD}\" value=\"{}\">",
        escape(&data.csrf_token)
    )
}

fn field_error(html: &mut impl Write, validator: &Validator, key: &str) -> fmt::Result {
    match validator.field_error(key) {
        Some(error) => writeln!(html, "<label class=\"error\">{}</label>", escape(error)),
        None => Ok(()),
    }
}

fn non_field_errors(html: &mut impl Write, validator: &Validator) -> fmt::Result {
    for error in &validator.non_field_errors {
        writeln!(html, "<div class=\"error\">{}</div>", escape(error))?;
    }
    Ok(())
}

fn home(html: &mut impl Write, snippets: &[Snippet]) -> fmt::Result {
    html.write_str("<h2>Latest Snippets</h2>\n")?;
    if snippets.is_empty() {
        return html.write_str("<p>There's nothing to see here... yet!</p>\n");
    }
    html.write_str("<table>\n<tr><th>Title</th><th>Created</th><th>ID</th></tr>\n")?;
    for snippet in snippets {
        writeln!(
            html,
            "<tr><td><a href=\"/snippet/view/{id}\">{title}</a></td><td>{created}</td><td>#{id}</td></tr>",
            id = snippet.id,
            title = escape(&snippet.title),
            created = snippet.created.format("%d %b %Y at %H:%M"),
        )?;
    }
    html.write_str("</table>\n")
}

fn view(html: &mut impl Write, snippet: &Snippet) -> fmt::Result {
    write!(
        html,
        "<div class=\"snippet\">\n<div class=\"metadata\"><strong>{title}</strong><span>#{id}</span></div>\n\
         <pre><code>{content}</code></pre>\n\
         <div class=\"metadata\"><time>Created: {created}</time><time>Expires: {expires}</time></div>\n</div>\n",
        title = escape(&snippet.title),
        id = snippet.id,
        content = escape(&snippet.content),
        created = snippet.created.format("%d %b %Y at %H:%M"),
        expires = snippet.expires.format("%d %b %Y at %H:%M"),
    )
}

fn create(html: &mut impl Write, form: &SnippetCreateForm, data: &TemplateData) -> fmt::Result {
    html.write_str("<form action=\"/snippet/create\" method=\"POST\">\n")?;
    csrf_field(html, data)?;
    html.write_str("\n<div><label>Title:</label>\n")?;
    field_error(html, &form.validator, "title")?;
    writeln!(
        html,
        "<input type=\"text\" name=\"title\" value=\"{}\"></div>",
        escape(&form.title)
    )?;
    html.write_str("<div><label>Content:</label>\n")?;
    field_error(html, &form.validator, "content")?;
    writeln!(html, "<textarea name=\"content\">{}</textarea></div>", escape(&form.content))?;
    html.write_str("<div><label>Delete in:</label>\n")?;
    field_error(html, &form.validator, "expires")?;
    for (days, label) in [(365, "One Year"), (7, "One Week"), (1, "One Day")] {
        let checked = if form.expires == days { " checked" } else { "" };
        writeln!(
            html,
            "<input type=\"radio\" name=\"expires\" value=\"{days}\"{checked}> {label}"
        )?;
    }
    html.write_str("</div>\n<div><input type=\"submit\" value=\"Publish snippet\"></div>\n</form>\n")
}

fn signup(html: &mut impl Write, form: &UserSignupForm, data: &TemplateData) -> fmt::Result {
    html.write_str("<form action=\"/user/signup\" method=\"POST\" novalidate>\n")?;
    csrf_field(html, data)?;
    html.write_str("\n<div><label>Name:</label>\n")?;
    field_error(html, &form.validator, "name")?;
    writeln!(html, "<input type=\"text\" name=\"name\" value=\"{}\"></div>", escape(&form.name))?;
    html.write_str("<div><label>Email:</label>\n")?;
    field_error(html, &form.validator, "email")?;
    writeln!(html, "<input type=\"email\" name=\"email\" value=\"{}\"></div>", escape(&form.email))?;
    html.write_str("<div><label>Password:</label>\n")?;
    field_error(html, &form.validator, "password")?;
    html.write_str("<input type=\"password\" name=\"password\"></div>\n")?;
    html.write_str("<div><input type=\"submit\" value=\"Signup\"></div>\n</form>\n")
}

fn login(html: &mut impl Write, form: &UserLoginForm, data: &TemplateData) -> fmt::Result {
    html.write_str("<form action=\"/user/login\" method=\"POST\" novalidate>\n")?;
    csrf_field(html, data)?;
    html.write_char('\n')?;
    non_field_errors(html, &form.validator)?;
    html.write_str("<div><label>Email:</label>\n")?;
    field_error(html, &form.validator, "email")?;
    writeln!(html, "<input type=\"email\" name=\"email\" value=\"{}\"></div>", escape(&form.email))?;
    html.write_str("<div><label>Password:</label>\n")?;
    field_error(html, &form.validator, "password")?;
    html.write_str("<input type=\"password\" name=\"password\"></div>\n")?;
    html.write_str("<div><input type=\"submit\" value=\"Login\"></div>\n</form>\n")
}

fn account(html: &mut impl Write, user: &User) -> fmt::Result {
    write!(
        html,
        "<h2>Your Account</h2>\n<table>\n<tr><th>Name</th><td>{}</td></tr>\n\
         <tr><th>Email</th><td>{}</td></tr>\n<tr><th>Joined</th><td>{}</td></tr>\n</table>\n",
        escape(&user.name),
        escape(&user.email),
        user.created.format("%d %b %Y at %H:%M"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_neutralises_markup() {
        assert_eq!(
            escape("<script>alert(\"x\" & 'y')</script>"),
            "&lt;script&gt;alert(&quot;x&quot; &amp; &#39;y&#39;)&lt;/script&gt;"
        );
    }

    #[test]
    fn forms_carry_the_csrf_token() {
        let data = TemplateData {
            csrf_token: "tok123".to_string(),
            ..TemplateData::default()
        };
        let form = UserLoginForm::default();

        let html = HtmlRenderer.render(&Page::Login(&form), &data).unwrap();

        assert!(html.contains("name=\"csrf_token\" value=\"tok123\""));
    }

    #[test]
    fn flash_and_field_errors_are_rendered() {
        let data = TemplateData {
            flash: Some("Snippet successfully created!".to_string()),
            ..TemplateData::default()
        };
        let mut form = SnippetCreateForm::default();
        form.validator.add_field_error("title", "This field cannot be blank");

        let html = HtmlRenderer.render(&Page::Create(&form), &data).unwrap();

        assert!(html.contains("<div class=\"flash\">Snippet successfully created!</div>"));
        assert!(html.contains("This field cannot be blank."));
        assert!(html.contains("value=\"7\" checked"));
    }

    /// A sink that refuses every write.
    struct Refusing;

    impl Write for Refusing {
        fn write_str(&mut self, _: &str) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    #[test]
    fn sink_failure_stops_the_page() {
        let form = UserLoginForm::default();

        let result = write_page(&mut Refusing, &Page::Login(&form), &TemplateData::default());

        assert_eq!(result, Err(fmt::Error));
    }

    #[test]
    fn write_failure_becomes_a_render_error() {
        let err = crate::error::AppError::from(fmt::Error);

        assert!(matches!(err, crate::error::AppError::Render(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
