//! reqwest-backed [`Transport`]. Upload progress comes from chunking the body
//! into a counted stream, download progress from draining the response chunk
//! by chunk.

use super::{
    Body, Direction, ProgressFn, Request, Response, TransferProgress, Transport, TransportError,
};
use futures::StreamExt;

const UPLOAD_CHUNK: usize = 64 * 1024;

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn post(
        &self,
        req: Request<'_>,
        progress: ProgressFn,
    ) -> Result<Response, TransportError> {
        let mut builder = self.client.post(&req.url);
        for (name, value) in req.headers {
            builder = builder.header(*name, value);
        }

        builder = match req.body {
            Body::Form(form) => builder
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(form),
            Body::Json(json) => builder.json(&json),
            Body::Multipart {
                field,
                file_name,
                data,
            } => {
                let total = data.len() as u64;
                let chunks: Vec<Vec<u8>> =
                    data.chunks(UPLOAD_CHUNK).map(|c| c.to_vec()).collect();

                // count bytes as hyper pulls them off the stream
                let cb = progress.clone();
                let mut sent = 0u64;
                let stream = futures::stream::iter(chunks).map(move |chunk| {
                    sent += chunk.len() as u64;
                    cb(Direction::Upload, TransferProgress::from_counts(sent, Some(total)));
                    Ok::<_, std::io::Error>(chunk)
                });

                let part = reqwest::multipart::Part::stream_with_length(
                    reqwest::Body::wrap_stream(stream),
                    total,
                )
                .file_name(file_name);
                builder.multipart(reqwest::multipart::Form::new().part(field, part))
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let total = response.content_length();

        let mut body = Vec::new();
        let mut response = response;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError(e.to_string()))?
        {
            body.extend_from_slice(&chunk);
            progress(
                Direction::Download,
                TransferProgress::from_counts(body.len() as u64, total),
            );
        }

        Ok(Response { status, body })
    }
}
