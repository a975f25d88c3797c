//! Injected HTTP capability. The controller and auth client only ever see
//! this trait; the real implementation lives in [`http`], tests script their
//! own responses.

pub mod http;

use std::future::Future;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Direction {
    Upload,
    Download,
}

/// Byte progress of one transfer leg. A transfer whose total is unknown, or
/// which has already moved all its bytes (the remote processing time after
/// that is unknown), reports `Busy` instead of a completed percentage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransferProgress {
    Busy,
    Bytes { done: u64, total: u64 },
}

impl TransferProgress {
    pub fn from_counts(done: u64, total: Option<u64>) -> Self {
        match total {
            Some(total) if done < total => TransferProgress::Bytes { done, total },
            _ => TransferProgress::Busy,
        }
    }
}

pub type ProgressFn = Arc<dyn Fn(Direction, TransferProgress) + Send + Sync>;

/// Callback that drops all progress on the floor.
pub fn no_progress() -> ProgressFn {
    Arc::new(|_, _| {})
}

pub enum Body {
    /// `application/x-www-form-urlencoded`
    Form(String),
    /// `application/json`
    Json(serde_json::Value),
    /// `multipart/form-data` with a single file field
    Multipart {
        field: &'static str,
        file_name: String,
        data: Vec<u8>,
    },
}

pub struct Request<'a> {
    pub url: String,
    pub headers: &'a [(&'a str, String)],
    pub body: Body,
}

pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

pub trait Transport {
    fn post(
        &self,
        req: Request<'_>,
        progress: ProgressFn,
    ) -> impl Future<Output = Result<Response, TransportError>>;
}
