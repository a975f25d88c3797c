//! Upload/poll controller. Owns the single in-flight job: submit the artifact,
//! obtain a job id, poll at a fixed interval until a terminal status, hand the
//! payload off. A new submission preempts whatever was polling; the stale
//! job's responses are ignored rather than aborted mid-flight.

use crate::api::{self, Api};
use crate::auth::ApiKey;
use crate::cache::{Artifact, ArtifactIdentity};
use crate::transport::{
    Body, Direction, ProgressFn, Request, Response, TransferProgress, Transport, TransportError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_millis(300);

/// User-facing status line.
#[derive(Clone, Copy, Debug, PartialEq, strum::Display)]
pub enum Status {
    #[strum(serialize = "Upload started!")]
    UploadStarted,
    #[strum(serialize = "Uploading executable...")]
    Uploading,
    #[strum(serialize = "Waiting for report...")]
    WaitingForReport,
    #[strum(serialize = "Downloading report...")]
    DownloadingReport,
    #[strum(serialize = "Ready!")]
    Ready,
}

#[derive(Clone, Debug)]
pub enum Event {
    Status(Status),
    Progress(Direction, TransferProgress),
}

#[derive(Clone, Copy, Debug, PartialEq, strum::Display)]
pub enum JobState {
    Idle,
    Submitting,
    Polling,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("upload failed: {0}")]
    TransportFailure(TransportError),
    /// HTTP 403: the credential is no longer accepted. The caller must
    /// re-authenticate before resubmitting.
    #[error("credential rejected, re-authentication required")]
    AuthRejected,
    #[error("upload response did not contain a job id")]
    MalformedResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("poll failed: {0}")]
    TransportFailure(TransportError),
    /// Covers both unparseable responses and `success: false`, surfaced
    /// generically.
    #[error("failed to get report")]
    MalformedResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Poll(#[from] PollError),
}

/// Terminal poll result: the raw response body (the cache unit) together with
/// the payload extracted for rendering and the artifact it belongs to.
#[derive(Debug)]
pub struct Delivery {
    pub identity: ArtifactIdentity,
    pub raw: Vec<u8>,
    pub payload: serde_json::Value,
}

#[derive(Debug)]
pub enum Outcome {
    Delivered(Delivery),
    /// A newer submission took over; nothing is delivered for this job.
    Superseded,
}

pub struct UploadPoll<T> {
    pub(crate) transport: T,
    api: Api,
    events: flume::Sender<Event>,
    poll_interval: Duration,
    state: Mutex<JobState>,
    // bumped by every submission; a job acts only while it holds the latest
    generation: AtomicU64,
}

impl<T: Transport> UploadPoll<T> {
    pub fn new(transport: T, api: Api, events: flume::Sender<Event>) -> Self {
        Self {
            transport,
            api,
            events,
            poll_interval: POLL_INTERVAL,
            state: Mutex::new(JobState::Idle),
            generation: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> JobState {
        *self.state.lock().unwrap()
    }

    fn status(&self, status: Status) {
        debug!("[status] {}", status);
        let _ = self.events.send(Event::Status(status));
    }

    fn superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    /// State transitions belong to the job holding the latest generation; a
    /// superseded job must not clobber its successor's state.
    fn transition_if_current(&self, generation: u64, state: JobState) {
        if !self.superseded(generation) {
            *self.state.lock().unwrap() = state;
        }
    }

    /// Runs one full submit/poll cycle for `artifact`. Serialized polling:
    /// the next poll is only scheduled once the previous response (or its
    /// failure) has been observed.
    pub async fn analyze(
        &self,
        artifact: &Artifact,
        key: &ApiKey,
    ) -> Result<Outcome, JobError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.transition_if_current(generation, JobState::Submitting);
        self.status(Status::UploadStarted);
        info!(
            "[upload] file: {} ({} bytes)",
            artifact.file_name,
            artifact.bytes.len()
        );

        let uuid = match self.submit(artifact, key).await {
            Ok(uuid) => uuid,
            Err(err) => {
                self.transition_if_current(generation, JobState::Idle);
                return Err(err.into());
            }
        };
        if self.superseded(generation) {
            debug!("[upload] job {} superseded before polling", uuid);
            return Ok(Outcome::Superseded);
        }

        info!("[upload] job id: {}", uuid);
        self.transition_if_current(generation, JobState::Polling);
        self.status(Status::WaitingForReport);

        loop {
            tokio::time::sleep(self.poll_interval).await;
            if self.superseded(generation) {
                // no poll is ever sent for a stale job id
                debug!("[poll] job {} superseded, abandoning", uuid);
                return Ok(Outcome::Superseded);
            }

            let response = match self.poll_once(&uuid, key).await {
                Ok(response) => response,
                Err(err) => {
                    if self.superseded(generation) {
                        return Ok(Outcome::Superseded);
                    }
                    warn!("[poll] error: {}", err);
                    self.transition_if_current(generation, JobState::Idle);
                    return Err(err.into());
                }
            };
            if self.superseded(generation) {
                // response for a stale job, ignore it
                return Ok(Outcome::Superseded);
            }

            let root = match api::parse_root(&response.body) {
                Some(root) if api::success(&root) => root,
                _ => {
                    self.transition_if_current(generation, JobState::Idle);
                    return Err(PollError::MalformedResponse.into());
                }
            };

            match api::poll_status(&root) {
                Some("pending") => {
                    // schedule exactly one more poll after the interval
                    debug!("[poll] {} still pending", uuid);
                }
                Some(terminal) => {
                    // any non-pending status ends polling, whatever its value
                    info!("[poll] {} terminal: {}", uuid, terminal);
                    self.transition_if_current(generation, JobState::Idle);
                    self.status(Status::Ready);
                    return Ok(Outcome::Delivered(Delivery {
                        identity: artifact.identity.clone(),
                        payload: api::report_data(&root).clone(),
                        raw: response.body,
                    }));
                }
                None => {
                    self.transition_if_current(generation, JobState::Idle);
                    return Err(PollError::MalformedResponse.into());
                }
            }
        }
    }

    async fn submit(&self, artifact: &Artifact, key: &ApiKey) -> Result<String, SubmitError> {
        let headers = [
            ("apiKey", key.0.clone()),
            ("X-No-Poll", "true".to_string()),
            ("User-Agent", api::USER_AGENT.to_string()),
        ];

        let events = self.events.clone();
        let progress: ProgressFn = Arc::new(move |direction, progress| {
            if direction == Direction::Upload
                && matches!(progress, TransferProgress::Bytes { .. })
            {
                let _ = events.send(Event::Status(Status::Uploading));
            }
            let _ = events.send(Event::Progress(direction, progress));
        });

        let response = self
            .transport
            .post(
                Request {
                    url: self.api.upload_url(),
                    headers: &headers,
                    body: Body::Multipart {
                        field: "filename1",
                        file_name: artifact.file_name.clone(),
                        data: artifact.bytes.clone(),
                    },
                },
                progress,
            )
            .await
            .map_err(SubmitError::TransportFailure)?;

        match response.status {
            403 => Err(SubmitError::AuthRejected),
            status if !(200..400).contains(&status) => Err(SubmitError::TransportFailure(
                TransportError(format!("HTTP {status}")),
            )),
            _ => {
                let root =
                    api::parse_root(&response.body).ok_or(SubmitError::MalformedResponse)?;
                api::upload_uuid(&root)
                    .map(str::to_string)
                    .ok_or(SubmitError::MalformedResponse)
            }
        }
    }

    async fn poll_once(&self, uuid: &str, key: &ApiKey) -> Result<Response, PollError> {
        debug!("[poll] {}", uuid);
        let headers = [
            ("apiKey", key.0.clone()),
            ("User-Agent", api::USER_AGENT.to_string()),
        ];

        let events = self.events.clone();
        let progress: ProgressFn = Arc::new(move |direction, progress| {
            if direction == Direction::Download
                && matches!(progress, TransferProgress::Bytes { .. })
            {
                let _ = events.send(Event::Status(Status::DownloadingReport));
            }
            let _ = events.send(Event::Progress(direction, progress));
        });

        let response = self
            .transport
            .post(
                Request {
                    url: self.api.status_url(),
                    headers: &headers,
                    body: Body::Form(api::status_body(uuid)),
                },
                progress,
            )
            .await
            .map_err(PollError::TransportFailure)?;

        if !response.ok() {
            return Err(PollError::TransportFailure(TransportError(format!(
                "HTTP {}",
                response.status
            ))));
        }
        Ok(response)
    }
}
