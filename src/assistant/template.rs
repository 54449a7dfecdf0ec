//! Placeholder substitution for outgoing text.
//!
//! Templates come from chat members, so rendering never fails: tokens that
//! are not recognised stay in the output verbatim.

/// Named token replaced by the member's mention or name.
pub const USERNAME_TOKEN: &str = "$username";
/// Named token replaced by the chat title.
pub const TITLE_TOKEN: &str = "$title";
/// Positional slot used by canned replies and congratulation templates.
pub const MENTION_SLOT: &str = "{}";

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}

/// Clickable reference to a user.
pub fn mention(user_id: i64, display_name: &str) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user_id,
        escape_html(display_name)
    )
}

/// Replace `$username` and then `$title` everywhere in `template`.
///
/// `$username` goes first so a title containing the text `$username` is not
/// expanded a second time.
pub fn render(template: &str, username: &str, title: &str) -> String {
    template
        .replace(USERNAME_TOKEN, username)
        .replace(TITLE_TOKEN, title)
}

/// Fill the positional slot of a canned reply.
pub fn fill_slot(template: &str, value: &str) -> String {
    template.replace(MENTION_SLOT, value)
}
