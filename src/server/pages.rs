//! HTML pages served to the browser.
//!
//! Every page shares one layout: a banner linking to the root URL, an
//! authentication box (logged in as whom, with a login or logout link), the
//! page content and a footer. Values interpolated into markup go through
//! [`escape_html`].

use crate::identity::{IdentityUrls, PublicIdentity};

const STYLE: &str = "\
body { margin: 0; color: black; background-color: #FFB; }
div#header { background-color: #FFC; height: 3em; border-bottom: 2px solid black; padding: 0.2em 0.2em 0.2em 1em; }
div#footer { background-color: #FFC; border-top: 1px solid black; border-bottom: 1px solid black; padding: 0.2em; font: 70% sans-serif; }
p#banner { width: 60%; float: left; }
div#auth-info { float: right; background-color: #BCF; border: 1px solid #88A; padding: 0.3em 0.5em; width: 30%; font: 70% sans-serif; text-align: right; }
div#content { padding: 0.5em 0.5em 3em 0.5em; }
";

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

/// Who is looking at the page, and where the shared links point.
pub struct PageContext<'a> {
    pub urls: &'a IdentityUrls,
    pub auth_entry: Option<&'a PublicIdentity>,
}

pub struct Page {
    pub title: String,
    /// Markup placed in `<head>` after the stylesheet.
    pub head: String,
    pub content: String,
}

impl Page {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { title: title.into(), head: String::new(), content: content.into() }
    }

    pub fn render(&self, ctx: &PageContext<'_>) -> String {
        let title = escape_html(&self.title);
        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n<title>{title}</title>\n\
             <style type=\"text/css\">\n{STYLE}</style>\n{head}\n</head>\n<body>\n\
             <div id=\"header\">\n<p id=\"banner\"><a href=\"{root}\">Gracie</a></p>\n{auth}</div>\n\
             <div id=\"content\">\n<h1 id=\"title\">{title}</h1>\n{content}\n</div>\n\
             <div id=\"footer\">\n<p>Gracie {version}; running on {root}</p>\n</div>\n</body>\n</html>\n",
            head = self.head,
            root = escape_html(&ctx.urls.root_url()),
            auth = auth_section(ctx),
            content = self.content,
            version = env!("CARGO_PKG_VERSION"),
        )
    }
}

fn auth_section(ctx: &PageContext<'_>) -> String {
    match ctx.auth_entry {
        Some(entry) => {
            let identity = escape_html(&ctx.urls.identity_url_for(&entry.name));
            format!(
                "<div id=\"auth-info\">\n<p><em>Status:</em> You are logged in.</p>\n\
                 <p><a href=\"{identity}\">{identity}</a> ({name})</p>\n\
                 <p>You may <a href=\"{logout}\">log out now</a>.</p>\n</div>\n",
                name = escape_html(entry.display_name()),
                logout = escape_html(&ctx.urls.logout_url()),
            )
        }
        None => format!(
            "<div id=\"auth-info\">\n<p><em>Status:</em> You are not logged in.</p>\n\
             <p>You may <a href=\"{login}\">log in now</a>.</p>\n</div>\n",
            login = escape_html(&ctx.urls.login_url()),
        ),
    }
}

fn login_form(message: &str, username: &str) -> String {
    format!(
        "<p class=\"message\">{message}</p>\n\
         <form id=\"login\" action=\"login\" method=\"POST\">\n\
         <p><label for=\"username\">Username</label>\n\
         <input name=\"username\" type=\"text\" value=\"{username}\" /></p>\n\
         <p><label for=\"password\">Password</label>\n\
         <input name=\"password\" type=\"password\" /></p>\n\
         <p><input type=\"submit\" name=\"submit\" value=\"Sign in\" />\n\
         <input type=\"submit\" name=\"cancel\" value=\"Cancel\" /></p>\n\
         </form>",
        username = escape_html(username),
    )
}

pub fn about_site() -> Page {
    Page::new(
        "About this site",
        "<p>This is Gracie, an <a href=\"http://openid.net/\">OpenID</a> provider.</p>\n\
         <p>It provides OpenID identities for local accounts.</p>",
    )
}

pub fn identity_view(entry: &PublicIdentity, identity_url: &str, server_url: &str) -> Page {
    let identity_url = escape_html(identity_url);
    let mut page = Page::new(
        format!("Identity page for {}", entry.display_name()),
        format!(
            "<div id=\"identity-info\">\n<table>\n\
             <tr><th>OpenID</th><td><a href=\"{identity_url}\">{identity_url}</a></td></tr>\n\
             <tr><th>User ID</th><td>{id}</td></tr>\n\
             <tr><th>Name</th><td>{name}</td></tr>\n\
             <tr><th>Full name</th><td>{fullname}</td></tr>\n\
             </table>\n</div>",
            id = entry.id,
            name = escape_html(&entry.name),
            fullname = escape_html(&entry.fullname),
        ),
    );
    page.head = format!("<link rel=\"openid.server\" href=\"{}\" />", escape_html(server_url));
    page
}

pub fn user_not_found(name: &str) -> Page {
    Page::new(
        "User Not Found",
        format!("<p>The requested user name does not exist: {}</p>", escape_html(name)),
    )
}

pub fn url_not_found(path: &str) -> Page {
    Page::new(
        "Resource Not Found",
        format!("<p>The requested resource was not found: {}</p>", escape_html(path)),
    )
}

pub fn login_view(username: &str) -> Page {
    Page::new("Login", login_form("", username))
}

pub fn login_failed(username: &str) -> Page {
    Page::new("Login Failed", login_form("The login details were incorrect.", username))
}

/// Shown when the action needs a session authenticated as `required_identity`.
pub fn wrong_authentication(required_identity: &str, want_username: Option<&str>) -> Page {
    let id = escape_html(required_identity);
    let message = format!(
        "The requested action can only be performed if you log in as the identity <a href=\"{id}\">{id}</a>"
    );
    Page::new("Authentication Required", login_form(&message, want_username.unwrap_or("")))
}

pub fn consent_prompt(identity: &str, trust_root: &str, consent_url: &str) -> Page {
    let identity = escape_html(identity);
    let trust_root = escape_html(trust_root);
    Page::new(
        "Approve Site",
        format!(
            "<p>The site <strong>{trust_root}</strong> wants to confirm that you are \
             <a href=\"{identity}\">{identity}</a>.</p>\n\
             <form id=\"consent\" action=\"{action}\" method=\"POST\">\n\
             <input type=\"hidden\" name=\"identity\" value=\"{identity}\" />\n\
             <input type=\"hidden\" name=\"trust_root\" value=\"{trust_root}\" />\n\
             <p><input type=\"submit\" name=\"approve\" value=\"Approve\" />\n\
             <input type=\"submit\" name=\"deny\" value=\"Deny\" /></p>\n\
             </form>",
            action = escape_html(consent_url),
        ),
    )
}

pub fn protocol_error(message: &str) -> Page {
    Page::new(
        "Protocol Error",
        format!(
            "<p>The request did not conform to the expected protocol. The message was:</p>\n<pre>{}</pre>",
            escape_html(message)
        ),
    )
}

pub fn internal_error(message: &str) -> Page {
    Page::new(
        "Internal Server Error",
        format!(
            "<p>The server encountered an error trying to serve the request. The message was:</p>\n<pre>{}</pre>",
            escape_html(message)
        ),
    )
}
