use actix_web::web::Bytes;
use actix_web::{get, web, HttpRequest, HttpResponse};
use actix_ws::{CloseReason, Message, Session};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Debug;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::job::JobService;
use crate::events::{ProgressEvent, SubscriberHandle};
use crate::jobs::JobId;

/// Interval between server pings
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A client silent for this long is considered gone
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound frame on a progress stream
#[derive(Debug, Clone, PartialEq)]
enum Frame {
    Text(String),
    Ping(Bytes),
    Pong(Bytes),
}

/// Why a progress stream ended
#[derive(Debug, PartialEq)]
enum StreamEnd {
    /// The hub dropped the subscription
    HubClosed,
    /// The client closed, errored or went away
    ClientClosed(Option<CloseReason>),
    /// Writing to the client failed
    SendFailed,
    /// No client traffic within `CLIENT_TIMEOUT`
    TimedOut,
}

/// Progress events for every job
#[get("/ws")]
async fn global_stream(
    req: HttpRequest,
    body: web::Payload,
    service: web::Data<JobService>,
) -> Result<HttpResponse, actix_web::Error> {
    open_stream(req, body, service, None).await
}

/// Progress events for one job; 404 when the id is unknown
#[get("/ws/{video_id}")]
async fn job_stream(
    req: HttpRequest,
    body: web::Payload,
    service: web::Data<JobService>,
    path: web::Path<String>,
) -> Result<HttpResponse, actix_web::Error> {
    open_stream(req, body, service, Some(JobId::from(path.into_inner()))).await
}

async fn open_stream(
    req: HttpRequest,
    body: web::Payload,
    service: web::Data<JobService>,
    job_id: Option<JobId>,
) -> Result<HttpResponse, actix_web::Error> {
    let (handle, events) = service.subscribe(job_id.clone()).await?;

    let (response, session, messages) = match actix_ws::handle(&req, body) {
        Ok(upgrade) => upgrade,
        Err(e) => {
            service.unsubscribe(handle).await;
            return Err(e);
        }
    };

    info!(
        subscriber = ?handle,
        job_id = ?job_id,
        subscribers = service.hub().subscriber_count().await,
        "WebSocket connected"
    );

    actix_web::rt::spawn(async move {
        let frames = Box::pin(futures_util::sink::unfold(
            session.clone(),
            |mut session: Session, frame: Frame| async move {
                match frame {
                    Frame::Text(text) => session.text(text).await?,
                    Frame::Ping(bytes) => session.ping(&bytes).await?,
                    Frame::Pong(bytes) => session.pong(&bytes).await?,
                }
                Ok::<_, actix_ws::Closed>(session)
            },
        ));

        let reason = match stream_events(service, handle, events, frames, messages).await {
            StreamEnd::ClientClosed(reason) => reason,
            _ => None,
        };
        let _ = session.close(reason).await;
    });

    Ok(response)
}

/// Forward hub events to a client until either side goes away, then
/// unsubscribe.
///
/// The hub never waits on this task: a slow client only backs up this
/// subscriber's own queue.
async fn stream_events<S, M, E>(
    service: web::Data<JobService>,
    handle: SubscriberHandle,
    mut events: mpsc::Receiver<ProgressEvent>,
    mut frames: S,
    mut messages: M,
) -> StreamEnd
where
    S: Sink<Frame> + Unpin,
    S::Error: Debug,
    M: Stream<Item = Result<Message, E>> + Unpin,
    E: Debug,
{
    let end = pump(handle, &mut events, &mut frames, &mut messages).await;
    service.unsubscribe(handle).await;
    info!(subscriber = ?handle, end = ?end, "WebSocket disconnected");
    end
}

async fn pump<S, M, E>(
    handle: SubscriberHandle,
    events: &mut mpsc::Receiver<ProgressEvent>,
    frames: &mut S,
    messages: &mut M,
) -> StreamEnd
where
    S: Sink<Frame> + Unpin,
    S::Error: Debug,
    M: Stream<Item = Result<Message, E>> + Unpin,
    E: Debug,
{
    let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    debug!(subscriber = ?handle, "Hub closed subscription");
                    return StreamEnd::HubClosed;
                };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(subscriber = ?handle, "Failed to serialize progress event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = frames.send(Frame::Text(payload)).await {
                    debug!(subscriber = ?handle, "WebSocket send failed: {:?}", e);
                    return StreamEnd::SendFailed;
                }
            }
            message = messages.next() => {
                last_seen = Instant::now();
                match message {
                    Some(Ok(Message::Ping(bytes))) => {
                        if frames.send(Frame::Pong(bytes)).await.is_err() {
                            return StreamEnd::SendFailed;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => trace!(subscriber = ?handle, "Pong received"),
                    Some(Ok(Message::Close(reason))) => return StreamEnd::ClientClosed(reason),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(subscriber = ?handle, "WebSocket receive error: {:?}", e);
                        return StreamEnd::ClientClosed(None);
                    }
                    None => return StreamEnd::ClientClosed(None),
                }
            }
            _ = heartbeat.tick() => {
                if last_seen.elapsed() > CLIENT_TIMEOUT {
                    warn!(subscriber = ?handle, "WebSocket client timed out");
                    return StreamEnd::TimedOut;
                }
                if frames.send(Frame::Ping(Bytes::new())).await.is_err() {
                    return StreamEnd::SendFailed;
                }
            }
        }
    }
}

pub fn ws_config(config: &mut web::ServiceConfig) {
    config.service(global_stream).service(job_stream);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::job::VideoRequest;
    use crate::events::ObserverHub;
    use crate::jobs::JobRegistry;
    use crate::pipeline::{Pipeline, PipelineExecutor};
    use crate::render::SimulatedRenderer;
    use actix_web::{http::StatusCode, test, App};
    use futures_util::stream;
    use std::convert::Infallible;
    use std::sync::Arc;

    type ClientMessages = mpsc::UnboundedSender<Result<Message, Infallible>>;

    fn service(output: &std::path::Path) -> web::Data<JobService> {
        let registry = Arc::new(JobRegistry::new());
        let hub = Arc::new(ObserverHub::default());
        let executor = Arc::new(PipelineExecutor::new(
            registry.clone(),
            hub.clone(),
            Arc::new(SimulatedRenderer::new(output.to_path_buf(), 1, 0.0)),
            Pipeline::video_generation(0.0).unwrap(),
            Duration::from_millis(100),
        ));
        web::Data::new(JobService::new(registry, hub, executor))
    }

    /// A client connection: frames the server wrote, and a sender for client messages
    fn client() -> (
        impl Sink<Frame, Error = Infallible> + Unpin,
        mpsc::UnboundedReceiver<Frame>,
        impl Stream<Item = Result<Message, Infallible>> + Unpin,
        ClientMessages,
    ) {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let frames = Box::pin(futures_util::sink::unfold(
            frames_tx,
            |tx: mpsc::UnboundedSender<Frame>, frame: Frame| async move {
                let _ = tx.send(frame);
                Ok::<_, Infallible>(tx)
            },
        ));

        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let messages = Box::pin(stream::unfold(messages_rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        }));

        (frames, frames_rx, messages, messages_tx)
    }

    #[actix_web::test]
    async fn unknown_job_stream_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let app = test::init_service(App::new().app_data(service.clone()).configure(ws_config)).await;

        let req = test::TestRequest::get().uri("/ws/unknown").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(service.hub().subscriber_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn job_events_arrive_as_json_frames() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let (frames, mut written, messages, client_tx) = client();

        let (handle, events) = service.subscribe(None).await.unwrap();
        let stream = tokio::spawn(stream_events(service.clone(), handle, events, frames, messages));

        let request: VideoRequest = serde_json::from_str(r#"{"text": "Hello there. Goodbye."}"#).unwrap();
        let job = service.create_job(request).await.unwrap();

        let mut received = Vec::new();
        while let Some(frame) = written.recv().await {
            let Frame::Text(text) = frame else { continue };
            let event: serde_json::Value = serde_json::from_str(&text).unwrap();
            let status = event["status"].as_str().unwrap().to_string();
            received.push(event);
            if status == "completed" || status == "failed" {
                break;
            }
        }

        assert!(received.len() >= 2);
        for event in &received {
            assert_eq!(event["jobId"], job.id.to_string());
            assert!(event["progress"].is_u64());
            assert!(event["stage"].is_string());
        }
        let last = received.last().unwrap();
        assert_eq!(last["status"], "completed");
        assert_eq!(last["progress"], 100);
        assert_eq!(last["artifactRef"], format!("/download/{}", job.id));

        client_tx.send(Ok(Message::Close(None))).unwrap();
        assert_eq!(stream.await.unwrap(), StreamEnd::ClientClosed(None));
        assert_eq!(service.hub().subscriber_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_hub_ends_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let (frames, _written, messages, _client_tx) = client();

        let (handle, events) = service.subscribe(None).await.unwrap();
        let stream = tokio::spawn(stream_events(service.clone(), handle, events, frames, messages));
        service.hub().close_all().await;

        assert_eq!(stream.await.unwrap(), StreamEnd::HubClosed);
        assert_eq!(service.hub().subscriber_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_is_pinged_then_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let (frames, mut written, messages, client_tx) = client();

        let (handle, events) = service.subscribe(None).await.unwrap();
        client_tx.send(Ok(Message::Ping(Bytes::from_static(b"hi")))).unwrap();
        let end = stream_events(service.clone(), handle, events, frames, messages).await;

        assert_eq!(end, StreamEnd::TimedOut);
        assert_eq!(service.hub().subscriber_count().await, 0);

        assert_eq!(written.recv().await, Some(Frame::Pong(Bytes::from_static(b"hi"))));
        assert_eq!(written.recv().await, Some(Frame::Ping(Bytes::new())));
        drop(client_tx);
    }
}
