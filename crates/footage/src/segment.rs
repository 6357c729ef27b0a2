// Segment streaming.
//
// Downloads the initialization segment and then every 2-second data segment
// of a task's window, appending each to the output sink in strict index
// order. The sink is append-only; a later segment is never written before an
// earlier one.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::EngineError;
use crate::manifest::Manifest;
use crate::session::MediaSession;
use crate::task::TaskWindow;

/// Emit a progress line every this many segments (~10 minutes of footage).
const PROGRESS_LOG_INTERVAL: u64 = 300;

/// Seam for fetching media bytes, so tests can run the download loop without
/// a camera on the network.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, uri: &str, cookie: &str) -> Result<Bytes, EngineError>;
}

/// Production fetcher backed by the shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpMediaFetcher {
    api: ApiClient,
}

impl HttpMediaFetcher {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, uri: &str, cookie: &str) -> Result<Bytes, EngineError> {
        self.api.get_bytes(uri, cookie).await
    }
}

/// Drives the ordered segment download loop for one stream.
pub struct SegmentStream<F: MediaFetcher + ?Sized> {
    fetcher: std::sync::Arc<F>,
}

impl<F: MediaFetcher + ?Sized> SegmentStream<F> {
    pub fn new(fetcher: std::sync::Arc<F>) -> Self {
        Self { fetcher }
    }

    /// Download the stream described by `manifest` into `sink`, returning the
    /// number of bytes written.
    ///
    /// Any fetch failure aborts the remaining loop; whatever was already
    /// appended stays in the sink (cleanup is the caller's concern).
    pub async fn download<W>(
        &self,
        manifest: &Manifest,
        window: &TaskWindow,
        session: &MediaSession,
        sink: &mut W,
    ) -> Result<u64, EngineError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let cookie = session.cookie_value();
        let mut bytes_written = 0u64;

        let init_uri = manifest.init_segment_uri()?;
        debug!(uri = %init_uri, "fetching init segment");
        let init = self.fetcher.fetch(&init_uri, &cookie).await?;
        sink.write_all(&init).await?;
        sink.flush().await?;
        bytes_written += init.len() as u64;

        let count = window.segment_count();
        for i in 0..count {
            let uri = manifest.segment_uri(i)?;
            let data = match self.fetcher.fetch(&uri, &cookie).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(uri = %uri, segment = i, error = %e, "segment fetch failed, aborting stream");
                    return Err(e);
                }
            };
            sink.write_all(&data).await?;
            sink.flush().await?;
            bytes_written += data.len() as u64;

            if i > 0 && i % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    from = %window_timestamp(window.start_time + ((i - PROGRESS_LOG_INTERVAL) * 2) as i64),
                    to = %window_timestamp(window.start_time + (i * 2) as i64),
                    "segments written"
                );
            }
        }

        info!(
            from = %window_timestamp(window.start_time),
            to = %window_timestamp(window.start_time + window.duration.max(0)),
            bytes = bytes_written,
            "stream download complete"
        );
        Ok(bytes_written)
    }
}

fn window_timestamp(epoch_seconds: i64) -> String {
    DateTime::from_timestamp(epoch_seconds, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_seconds.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    fn manifest() -> Manifest {
        Manifest {
            mpd_uri: "https://cam.local/vod/clip.mpd".to_owned(),
            info: mpd::MpdInfo {
                init_name: "seg_init.mp4".to_owned(),
                segment_pattern: "seg_$Number$.m4v".to_owned(),
                start_index: 1,
            },
        }
    }

    /// Serves canned bytes per URI and records the request order.
    struct FakeFetcher {
        responses: HashMap<String, Bytes>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(responses: HashMap<String, Bytes>) -> Self {
            Self {
                responses,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn fetch(&self, uri: &str, _cookie: &str) -> Result<Bytes, EngineError> {
            self.requested.lock().unwrap().push(uri.to_owned());
            self.responses
                .get(uri)
                .cloned()
                .ok_or_else(|| EngineError::segment_fetch(uri, "not found"))
        }
    }

    fn canned(count: u64) -> HashMap<String, Bytes> {
        let mut responses = HashMap::new();
        responses.insert(
            "https://cam.local/vod/seg_init.mp4".to_owned(),
            Bytes::from_static(b"INIT"),
        );
        for i in 0..count {
            responses.insert(
                format!("https://cam.local/vod/seg_{}.m4v", i + 1),
                Bytes::from(format!("S{i}")),
            );
        }
        responses
    }

    #[tokio::test]
    async fn downloads_init_then_segments_in_order() {
        let fetcher = Arc::new(FakeFetcher::new(canned(3)));
        let stream = SegmentStream::new(fetcher.clone());
        let window = TaskWindow {
            start_time: 0,
            duration: 6,
        };
        let mut sink = Cursor::new(Vec::new());

        let written = stream
            .download(&manifest(), &window, &MediaSession::for_tests("t"), &mut sink)
            .await
            .unwrap();

        assert_eq!(sink.into_inner(), b"INITS0S1S2");
        assert_eq!(written, 10);
        let requested = fetcher.requested.lock().unwrap().clone();
        assert_eq!(
            requested,
            vec![
                "https://cam.local/vod/seg_init.mp4",
                "https://cam.local/vod/seg_1.m4v",
                "https://cam.local/vod/seg_2.m4v",
                "https://cam.local/vod/seg_3.m4v",
            ]
        );
    }

    #[tokio::test]
    async fn segment_count_is_duration_over_two() {
        let fetcher = Arc::new(FakeFetcher::new(canned(5)));
        let stream = SegmentStream::new(fetcher.clone());
        // 11 seconds: the trailing odd second is dropped, 5 whole segments.
        let window = TaskWindow {
            start_time: 0,
            duration: 11,
        };
        let mut sink = Cursor::new(Vec::new());
        stream
            .download(&manifest(), &window, &MediaSession::for_tests("t"), &mut sink)
            .await
            .unwrap();
        // init + 5 segments
        assert_eq!(fetcher.requested.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_but_keeps_partial_output() {
        // Only two of four segments are available.
        let fetcher = Arc::new(FakeFetcher::new(canned(2)));
        let stream = SegmentStream::new(fetcher.clone());
        let window = TaskWindow {
            start_time: 0,
            duration: 8,
        };
        let mut sink = Cursor::new(Vec::new());

        let result = stream
            .download(&manifest(), &window, &MediaSession::for_tests("t"), &mut sink)
            .await;

        assert!(matches!(result, Err(EngineError::SegmentFetch { .. })));
        assert_eq!(sink.into_inner(), b"INITS0S1");
        // init + 2 good segments + 1 failed attempt, nothing after the failure
        assert_eq!(fetcher.requested.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn non_positive_window_downloads_only_init() {
        let fetcher = Arc::new(FakeFetcher::new(canned(0)));
        let stream = SegmentStream::new(fetcher.clone());
        let window = TaskWindow {
            start_time: 940,
            duration: -810,
        };
        let mut sink = Cursor::new(Vec::new());
        stream
            .download(&manifest(), &window, &MediaSession::for_tests("t"), &mut sink)
            .await
            .unwrap();
        assert_eq!(sink.into_inner(), b"INIT");
    }
}
