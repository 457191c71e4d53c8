//! Plain-text rendering of the session header and the to-do list.

use client_core::Messages;
use shared::domain::{SessionUser, Todo};

pub fn render_session(user: Option<&SessionUser>) -> String {
    match user {
        Some(user) => format!("signed in as {}", user.label()),
        None => "not signed in".to_string(),
    }
}

/// `items` is `None` when the list must not be shown at all.
pub fn render_list(items: Option<&[Todo]>, loading: bool, messages: &Messages) -> String {
    let Some(items) = items else {
        return messages.sign_in_to_view();
    };
    if loading {
        return messages.loading();
    }
    if items.is_empty() {
        return messages.empty_list();
    }

    items
        .iter()
        .enumerate()
        .map(|(index, todo)| {
            let mark = if todo.completed { "x" } else { " " };
            format!("{:>3}. [{mark}] {}  ({})", index + 1, todo.title, todo.id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
