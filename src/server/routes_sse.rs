use crate::server::AppContext;
use crate::store::WorkflowRecord;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, BoxStream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

pub fn status_routes() -> Router<AppContext> {
    Router::new().route("/status/:id", get(status_stream))
}

/// Live status stream for one workflow.
///
/// Pushes the current snapshot immediately, then every subsequent snapshot
/// as the pipeline writes transitions. The stream ends right after a
/// terminal-status event; a client disconnect drops the receiver, which is
/// the unsubscribe path on that side.
pub async fn status_stream(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Sse<BoxStream<'static, Result<Event, Infallible>>>, StatusCode> {
    // Snapshot and subscription are taken under one store lock, so no
    // transition can slip between them.
    let Some((snapshot, rx)) = ctx.store.watch(id) else {
        return Err(StatusCode::NOT_FOUND);
    };

    let terminal = snapshot.status.is_terminal();
    let initial = stream::once(async move { Ok::<_, Infallible>(record_event(&snapshot)) });

    let stream: BoxStream<'static, Result<Event, Infallible>> = if terminal {
        // Already done: one snapshot and the stream closes.
        initial.boxed()
    } else {
        let updates = stream::unfold(Some(rx), |state| async move {
            let mut rx = state?;
            loop {
                match rx.recv().await {
                    Ok(record) => {
                        let done = record.status.is_terminal();
                        let item: Result<Event, Infallible> = Ok(record_event(&record));
                        return Some((item, if done { None } else { Some(rx) }));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Snapshots are full records, so the client catches
                        // up on the next one.
                        tracing::warn!(skipped, "slow status subscriber");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        initial.chain(updates).boxed()
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

fn record_event(record: &WorkflowRecord) -> Event {
    let data = serde_json::to_string(record)
        .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {}"}}"#, e));
    Event::default().data(data)
}
