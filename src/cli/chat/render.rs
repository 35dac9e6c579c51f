use color_print::cformat;

use super::auth::AuthMode;
use super::conversation_state::{Message, Role};
use super::sidebar::SidebarState;

pub const APP_TITLE: &str = "کاف کی کہانی";

/// Right-to-left mark. Terminals that honour bidi use it to lay Urdu lines
/// out right to left.
const RLM: char = '\u{200F}';

pub fn header(logged_in: bool) -> String {
    let account = if logged_in {
        cformat!("<yellow>AI</> <dim>(/logout)</>")
    } else {
        cformat!("<dim>Log in (/login)</>  <bold>Sign up free</> <dim>(/signup)</>")
    };
    cformat!("<bold><yellow>{}</></>    {}", APP_TITLE, account)
}

pub fn label(role: Role) -> String {
    match role {
        Role::Ai => cformat!("<bold><yellow>{}</></>", role.label()),
        Role::User => cformat!("<bold><cyan>{}</></>", role.label()),
    }
}

pub fn content(message: &Message) -> String {
    if message.is_urdu {
        format!("{RLM}{}", message.content)
    } else {
        message.content.clone()
    }
}

pub fn message(message: &Message) -> String {
    format!("{}\n{}\n", label(message.role), content(message))
}

pub fn message_from_user(text: &str) -> String {
    message(&Message {
        role: Role::User,
        content: text.to_string(),
        is_urdu: true,
    })
}

/// The start of a streamed reply: the prompt the story continues from.
pub fn content_start(prompt: &str) -> String {
    format!("{RLM}{prompt}")
}

pub fn sidebar(sidebar: &SidebarState, logged_in: bool) -> String {
    let mut out = String::new();
    out.push_str(&cformat!("<bold>+ New Story</> <dim>(/new)</>\n\n"));
    out.push_str(&cformat!("<dim><bold>HISTORY</></>\n"));
    for entry in sidebar.history() {
        out.push_str(&format!("  {entry}\n"));
    }
    if !logged_in {
        out.push('\n');
        out.push_str(&cformat!("<dim>Log in (/login)</>\n"));
        out.push_str(&cformat!("<bold>Sign up free</> <dim>(/signup)</>\n"));
    }
    out
}

pub fn auth_dialog(mode: AuthMode) -> String {
    cformat!(
        "<bold>{}</>\n<dim>{} (/switch), /cancel to close</>\n",
        mode.title(),
        mode.switch_hint()
    )
}

pub fn typing_indicator() -> String {
    cformat!("<yellow>...</>")
}

pub fn error_text(text: &str) -> String {
    cformat!("<red>{}{}</>", RLM, text)
}
