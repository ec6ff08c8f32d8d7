use std::future::Future;

use teloxide::{
    payloads::SendMessageSetters,
    requests::{Request, Requester},
    sugar::request::RequestLinkPreviewExt,
    types::{Message, ParseMode, Recipient, ThreadId, User},
    Bot, RequestError,
};

use crate::retry::retry_on_server_error;

pub trait MessageStuff {
    /// Text of the message, or its caption if it's a media message.
    fn text_full(&self) -> Option<&str>;
}

impl MessageStuff for Message {
    fn text_full(&self) -> Option<&str> {
        self.text().or_else(|| self.caption())
    }
}

/// Tries to print the user in the prettiest way possible, with either `@username` or full name.
#[must_use]
pub fn user_display_name(user: &User) -> String {
    if let Some(username) = &user.username {
        format!("@{username}")
    } else {
        user.full_name()
    }
}

pub trait BotStuff {
    /// Opinionated method to send an HTML message without link previews,
    /// retrying on flood waits and server errors.
    fn send_html(
        &self,
        to_where: impl Into<Recipient> + Send,
        text: impl Into<String> + Send,
        thread: Option<ThreadId>,
    ) -> impl Future<Output = Result<Message, RequestError>> + Send;
}

impl BotStuff for Bot {
    async fn send_html(
        &self,
        to_where: impl Into<Recipient> + Send,
        text: impl Into<String> + Send,
        thread: Option<ThreadId>,
    ) -> Result<Message, RequestError> {
        let to_where: Recipient = to_where.into();
        let text: String = text.into();

        retry_on_server_error("send html message", || {
            let mut request = self
                .send_message(to_where.clone(), text.clone())
                .parse_mode(ParseMode::Html)
                .disable_link_preview(true);
            if let Some(thread) = thread {
                request = request.message_thread_id(thread);
            }
            request.send()
        })
        .await
    }
}
