/// Encode text for use inside a double-quoted HTML attribute
pub fn encode_html_attribute(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => encoded.push_str("&quot;"),
            '\'' => encoded.push_str("&#x27;"),
            '&' => encoded.push_str("&amp;"),
            '<' => encoded.push_str("&lt;"),
            '>' => encoded.push_str("&gt;"),
            _ => encoded.push(c),
        }
    }
    encoded
}

/// Self-closing hidden input carrying a form token
pub fn hidden_input(field_name: &str, form_token: &str) -> String {
    format!(
        r#"<input name="{}" type="hidden" value="{}" />"#,
        encode_html_attribute(field_name),
        encode_html_attribute(form_token)
    )
}
