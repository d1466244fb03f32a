//! Media cleanup for deleted rows.
//!
//! Deleted farmer and report rows can leave files behind in object storage.
//! Each public URL is parsed back into its bucket and object path, then
//! removed through the `ObjectRemover` seam. Removals run bounded and
//! resolve to per-URL outcomes, in the same shape as alert fan-out.

use std::sync::Arc;

use futures::{stream, StreamExt};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::traits::ObjectRemover;

/// Path marker shared by public object URLs. Everything after it reads as
/// `{bucket}/{object path}`.
const PUBLIC_OBJECT_MARKER: &str = "/storage/v1/object/public/";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupOutcome {
    pub url: String,
    #[serde(flatten)]
    pub status: CleanupStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupStatus {
    Removed,
    InvalidFormat,
    Failed { reason: String },
}

pub struct MediaCleaner {
    remover: Arc<dyn ObjectRemover>,
    concurrency: usize,
}

impl MediaCleaner {
    pub fn new(remover: Arc<dyn ObjectRemover>, concurrency: usize) -> Self {
        Self {
            remover,
            concurrency: concurrency.max(1),
        }
    }

    /// Removes every referenced object and collects an outcome per URL.
    /// URLs that do not parse are reported as `InvalidFormat`, not errors.
    pub async fn remove_all(&self, urls: &[String]) -> Vec<CleanupOutcome> {
        // Each future owns its URL so the batch stays Send.
        let removals = urls.iter().cloned().map(|raw| async move {
            let Some((bucket, path)) = parse_object_url(&raw) else {
                warn!(url = %raw, "Skipping media URL with unrecognized format");
                return CleanupOutcome {
                    url: raw,
                    status: CleanupStatus::InvalidFormat,
                };
            };

            match self.remover.remove(&bucket, &path).await {
                Ok(()) => {
                    info!(bucket = %bucket, path = %path, "Removed stored object");
                    CleanupOutcome {
                        url: raw,
                        status: CleanupStatus::Removed,
                    }
                }
                Err(e) => {
                    warn!(bucket = %bucket, path = %path, error = %e, "Object removal failed");
                    CleanupOutcome {
                        url: raw,
                        status: CleanupStatus::Failed {
                            reason: e.to_string(),
                        },
                    }
                }
            }
        });

        stream::iter(removals)
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

/// Splits a public object URL into `(bucket, object path)`.
fn parse_object_url(raw: &str) -> Option<(String, String)> {
    let parsed = Url::parse(raw).ok()?;
    let (_, rest) = parsed.path().split_once(PUBLIC_OBJECT_MARKER)?;
    let (bucket, path) = rest.split_once('/')?;
    if bucket.is_empty() || path.is_empty() {
        return None;
    }
    Some((bucket.to_string(), path.to_string()))
}

/// Collects every media URL a deleted row referenced: the single photo
/// column plus the image array, with empty entries dropped.
pub fn media_urls(photo_url: Option<&str>, image_urls: &[String]) -> Vec<String> {
    photo_url
        .into_iter()
        .map(str::to_string)
        .chain(image_urls.iter().cloned())
        .filter(|u| !u.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRemover;

    #[test]
    fn parses_bucket_and_nested_path() {
        let url = "https://abc.supabase.co/storage/v1/object/public/avatars/user-1/photo.png";
        let (bucket, path) = parse_object_url(url).unwrap();
        assert_eq!(bucket, "avatars");
        assert_eq!(path, "user-1/photo.png");
    }

    #[test]
    fn rejects_url_without_public_object_marker() {
        assert_eq!(
            parse_object_url("https://abc.supabase.co/rest/v1/posts/42"),
            None
        );
    }

    #[test]
    fn rejects_bucket_with_no_object_path() {
        assert_eq!(
            parse_object_url("https://abc.supabase.co/storage/v1/object/public/avatars"),
            None
        );
        assert_eq!(
            parse_object_url("https://abc.supabase.co/storage/v1/object/public/avatars/"),
            None
        );
    }

    #[test]
    fn rejects_strings_that_are_not_urls() {
        assert_eq!(parse_object_url("not a url at all"), None);
    }

    #[test]
    fn media_urls_merges_photo_and_images_and_drops_empties() {
        let images = vec![
            "https://abc/storage/v1/object/public/posts/a.png".to_string(),
            String::new(),
        ];
        let urls = media_urls(Some("https://abc/storage/v1/object/public/avatars/p.png"), &images);
        assert_eq!(urls.len(), 2);
        assert!(urls[0].contains("avatars"));
        assert!(urls[1].contains("posts"));

        assert!(media_urls(None, &[]).is_empty());
        assert!(media_urls(Some(""), &[]).is_empty());
    }

    #[tokio::test]
    async fn mixed_batch_reports_each_url_independently() {
        let remover = MockRemover::new().failing_for("broken.png");
        let cleaner = MediaCleaner::new(Arc::new(remover), 2);
        let urls = vec![
            "https://abc.supabase.co/storage/v1/object/public/avatars/ok.png".to_string(),
            "not a url".to_string(),
            "https://abc.supabase.co/storage/v1/object/public/posts/broken.png".to_string(),
        ];

        let mut outcomes = cleaner.remove_all(&urls).await;
        outcomes.sort_by(|a, b| a.url.cmp(&b.url));

        assert_eq!(outcomes.len(), 3);
        let by_url = |needle: &str| {
            outcomes
                .iter()
                .find(|o| o.url.contains(needle))
                .unwrap()
                .status
                .clone()
        };
        assert_eq!(by_url("ok.png"), CleanupStatus::Removed);
        assert_eq!(by_url("not a url"), CleanupStatus::InvalidFormat);
        assert!(matches!(by_url("broken.png"), CleanupStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn cleanup_completes_from_a_spawned_task() {
        let remover = Arc::new(MockRemover::new());
        let cleaner = MediaCleaner::new(remover.clone(), 2);
        let urls =
            vec!["https://abc.supabase.co/storage/v1/object/public/avatars/ok.png".to_string()];

        // spawn only accepts Send futures, the same bound the web
        // handlers put on the cleanup.
        let outcomes = tokio::spawn(async move { cleaner.remove_all(&urls).await })
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, CleanupStatus::Removed);
        assert_eq!(remover.removed_count(), 1);
    }
}
