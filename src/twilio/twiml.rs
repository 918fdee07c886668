//! TwiML builders for voice webhook responses.
//!
//! Twilio expects a complete XML document on every voice webhook, including
//! the failure paths, so both builders always emit a full <Response>
//! envelope.

/// TwiML connecting the call's media to a WebSocket stream, with custom
/// parameters passed through to the receiving end.
pub fn connect_stream(url: &str, parameters: &[(&str, &str)]) -> String {
    let params: String = parameters
        .iter()
        .map(|(name, value)| {
            format!(
                "\n            <Parameter name=\"{}\" value=\"{}\" />",
                escape(name),
                escape(value)
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Connect>
        <Stream url="{}">{}
        </Stream>
    </Connect>
</Response>"#,
        escape(url),
        params
    )
}

/// TwiML speaking a message and hanging up. Used when no agent can take the
/// call; carriers get valid instructions instead of an error status.
pub fn say_hangup(message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Say>{}</Say>
    <Hangup/>
</Response>"#,
        escape(message)
    )
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
