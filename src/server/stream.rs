//! Server-Sent Events relay for session channels.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};

use crate::session::{StreamEvent, Subscription};

/// Relay every event received on `rx` as one SSE frame.
///
/// The stream ends when the session's channel goes away. Dropping the
/// response drops the subscription with it.
pub fn sse_response<T: StreamEvent>(
    rx: Subscription<T>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(to_sse(&event)), rx))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

pub fn to_sse<T: StreamEvent>(event: &T) -> Event {
    Event::default()
        .event(event.name())
        .data(normalize_newlines(&event.payload()))
}

/// SSE frames cannot carry a bare carriage return.
fn normalize_newlines(text: &str) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\r\nb\rc\n"), "a\nb\nc\n");
        assert_eq!(normalize_newlines("plain"), "plain");
    }

    #[test]
    fn test_progress_bar_output_does_not_panic() {
        let event = crate::session::SessionEvent::Log("10%\r20%\r30%\r\n".into());
        let _ = to_sse(&event);
    }

    #[tokio::test]
    async fn test_backlog_is_relayed_in_full() {
        use crate::session::{Broadcaster, SessionEvent};
        use axum::response::IntoResponse;
        use http_body_util::BodyExt;

        let logs = Broadcaster::new();
        let rx = logs.subscribe();
        for i in 0..5_000 {
            logs.publish(SessionEvent::Log(format!("line {i}")));
        }
        logs.publish(SessionEvent::Close { exit_code: Some(0) });
        drop(logs);

        let body = sse_response(rx)
            .into_response()
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes();
        let text = String::from_utf8_lossy(&body);
        assert_eq!(text.matches("event: log\n").count(), 5_000);
        assert!(text.contains("data: line 0\n"));
        assert!(text.contains("data: line 4999\n"));
        assert!(text.ends_with("event: close\ndata: 0\n\n"));
    }
}
