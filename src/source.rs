//! Pose inputs. The detector itself lives outside this crate; sources only hand
//! over whatever keypoints it produced for the current frame.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::{watch, Mutex};

use crate::error::MonitorError;
use crate::pose::Pose;

#[async_trait]
pub trait PoseSource: Send + Sync {
    /// Poses detected in the most recent frame. An empty vector means nobody
    /// was detected; `Ok(None)` means the source has ended.
    async fn latest_poses(&self) -> Result<Option<Vec<Pose>>, MonitorError>;
}

/// Replays a recorded detector stream: one JSON array of poses per line.
pub struct ReplaySource {
    lines: Mutex<Lines<BufReader<File>>>,
}

impl ReplaySource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| MonitorError::Source(format!("open {}: {e}", path.display())))?;
        Ok(Self {
            lines: Mutex::new(BufReader::new(file).lines()),
        })
    }
}

#[async_trait]
impl PoseSource for ReplaySource {
    async fn latest_poses(&self) -> Result<Option<Vec<Pose>>, MonitorError> {
        let mut lines = self.lines.lock().await;
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| MonitorError::Source(e.to_string()))?;
            let Some(line) = line else {
                return Ok(None);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            return match serde_json::from_str::<Vec<Pose>>(line) {
                Ok(poses) => Ok(Some(poses)),
                Err(e) => {
                    // A corrupt frame reads as an empty one.
                    tracing::warn!(error = %e, "unparseable frame in replay");
                    Ok(Some(Vec::new()))
                }
            };
        }
    }
}

/// Source fed by an in-process detector through a watch channel. Each read sees
/// the newest frame; frames published between ticks are skipped.
pub struct LiveSource {
    rx: watch::Receiver<Option<Vec<Pose>>>,
}

/// Publishing half of a [`LiveSource`]. Dropping it ends the source.
#[derive(Clone)]
pub struct LiveFeed {
    tx: watch::Sender<Option<Vec<Pose>>>,
}

impl LiveFeed {
    pub fn publish(&self, poses: Vec<Pose>) {
        self.tx.send_replace(Some(poses));
    }
}

impl LiveSource {
    pub fn channel() -> (LiveFeed, LiveSource) {
        let (tx, rx) = watch::channel(Some(Vec::new()));
        (LiveFeed { tx }, LiveSource { rx })
    }
}

#[async_trait]
impl PoseSource for LiveSource {
    async fn latest_poses(&self) -> Result<Option<Vec<Pose>>, MonitorError> {
        if self.rx.has_changed().is_err() {
            return Ok(None);
        }
        let latest = self.rx.borrow().clone();
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::pose::{Keypoint, KeypointName};

    #[tokio::test]
    async fn replay_yields_one_frame_per_line_then_ends() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"[{{"score":0.9,"keypoints":[{{"name":"nose","x":1.0,"y":2.0,"score":0.8}}]}}]"#
        )
        .expect("write");
        writeln!(file).expect("write");
        writeln!(file, "[]").expect("write");
        writeln!(file, "not json").expect("write");

        let source = ReplaySource::open(file.path()).await.expect("open");

        let first = source.latest_poses().await.expect("read").expect("frame");
        assert_eq!(first.len(), 1);
        assert!(first[0].keypoint(KeypointName::Nose).is_some());

        assert_eq!(source.latest_poses().await.expect("read"), Some(Vec::new()));
        assert_eq!(source.latest_poses().await.expect("read"), Some(Vec::new()));
        assert_eq!(source.latest_poses().await.expect("read"), None);
        assert_eq!(source.latest_poses().await.expect("read"), None);
    }

    #[tokio::test]
    async fn replay_missing_file_is_a_source_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = ReplaySource::open(dir.path().join("absent.jsonl")).await;
        assert!(matches!(result, Err(MonitorError::Source(_))));
    }

    #[tokio::test]
    async fn live_source_returns_newest_frame_until_feed_drops() {
        let (feed, source) = LiveSource::channel();
        assert_eq!(source.latest_poses().await.expect("read"), Some(Vec::new()));

        let pose = Pose::new(0.7).with_keypoint(Keypoint::new(KeypointName::Nose, 0.0, 0.0, 0.9));
        feed.publish(vec![Pose::new(0.1)]);
        feed.publish(vec![pose.clone()]);
        assert_eq!(source.latest_poses().await.expect("read"), Some(vec![pose]));

        drop(feed);
        assert_eq!(source.latest_poses().await.expect("read"), None);
    }
}
