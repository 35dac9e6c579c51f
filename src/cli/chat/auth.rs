use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Signup,
}

impl AuthMode {
    pub fn title(self) -> &'static str {
        match self {
            AuthMode::Login => "Welcome Back",
            AuthMode::Signup => "Create Account",
        }
    }

    pub fn submit_label(self) -> &'static str {
        match self {
            AuthMode::Login => "Sign In",
            AuthMode::Signup => "Create Account",
        }
    }

    /// The hint shown under the form for switching to the other mode.
    pub fn switch_hint(self) -> &'static str {
        match self {
            AuthMode::Login => "Don't have an account? Sign up free",
            AuthMode::Signup => "Already have an account? Log in",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            AuthMode::Login => AuthMode::Signup,
            AuthMode::Signup => AuthMode::Login,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("the sign-in dialog is not open")]
    NotOpen,
}

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

fn looks_like_email(value: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| match Regex::new(EMAIL_PATTERN) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                error!("invalid email pattern: {e}");
                None
            }
        })
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(value))
}

/// Sign-in dialog state. Submitting a well-formed form is all it takes to be
/// logged in; nothing is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    open: bool,
    mode: AuthMode,
    logged_in: bool,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            open: false,
            mode: AuthMode::Login,
            logged_in: false,
        }
    }

    pub fn open(&mut self, mode: AuthMode) {
        self.mode = mode;
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.toggled();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn submit(&mut self, form: &AuthForm) -> Result<(), AuthError> {
        if !self.open {
            return Err(AuthError::NotOpen);
        }

        if self.mode == AuthMode::Signup && form.full_name.trim().is_empty() {
            return Err(AuthError::MissingField("Full Name"));
        }
        if form.email.trim().is_empty() {
            return Err(AuthError::MissingField("Email Address"));
        }
        if !looks_like_email(form.email.trim()) {
            return Err(AuthError::InvalidEmail(form.email.trim().to_string()));
        }
        if form.password.is_empty() {
            return Err(AuthError::MissingField("Password"));
        }

        info!(mode = ?self.mode, "signed in");
        self.logged_in = true;
        self.close();
        Ok(())
    }

    pub fn logout(&mut self) {
        self.logged_in = false;
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}
