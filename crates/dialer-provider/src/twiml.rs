//! Voice script synthesis

/// Spoken when a request carries no message
const DEFAULT_MESSAGE: &str = "This is an automated call. Goodbye.";

/// Build the TwiML document that reads `message` aloud and hangs up
pub fn say(message: Option<&str>) -> String {
    let text = message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MESSAGE);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Say voice="alice">{}</Say><Hangup/></Response>"#,
        escape(text)
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if c.is_control() && c != '\n' && c != '\t' => {}
            c => out.push(c),
        }
    }
    out
}
