use rustyline::{Config, Editor, Result};

/// Shown on the input line, like the placeholder of the story box.
pub const INPUT_PLACEHOLDER: &str = "شروع کریں...";

pub fn generate_prompt(custom_prompt: Option<&str>) -> String {
    custom_prompt.unwrap_or("> ").to_string()
}

pub fn field_prompt(field: &str) -> String {
    format!("{field}: ")
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(false)
        .build();
    Editor::with_config(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts() {
        assert_eq!(generate_prompt(None), "> ");
        assert_eq!(generate_prompt(Some("AI > ")), "AI > ");
        assert_eq!(field_prompt("Email Address"), "Email Address: ");
    }
}
