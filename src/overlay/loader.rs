use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{OverlayError, OverlayResult};
use crate::overlay::traits::DataSource;
use crate::overlay::types::DetectionRecord;

/// Resolves `http://` / `https://` locations over HTTP and everything else
/// (optionally `file://`-prefixed) as a local path.
pub struct DefaultDataSource {
    client: reqwest::Client,
}

impl DefaultDataSource {
    pub fn new(timeout_secs: u64) -> OverlayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DataSource for DefaultDataSource {
    async fn fetch(&self, location: &str) -> OverlayResult<Vec<u8>> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let resp = self.client.get(location).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(OverlayError::DataSource(format!(
                    "GET {location} returned {status}"
                )));
            }
            let bytes = resp.bytes().await?;
            tracing::debug!(
                location = %location,
                bytes = bytes.len(),
                "detection document downloaded"
            );
            return Ok(bytes.to_vec());
        }

        let path = location.strip_prefix("file://").unwrap_or(location);
        let bytes = tokio::fs::read(path).await?;
        tracing::debug!(path = %path, bytes = bytes.len(), "detection document read");
        Ok(bytes)
    }
}

/// Parse a detection document: a JSON array of records.
///
/// Entries that are not objects are skipped with a warning; the rest of the
/// document still loads.
pub fn parse_records(bytes: &[u8]) -> OverlayResult<Vec<DetectionRecord>> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let serde_json::Value::Array(entries) = value else {
        return Err(OverlayError::Decode(
            "detection document must be a JSON array of records".into(),
        ));
    };

    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        if !entry.is_object() {
            tracing::warn!(index, entry = %entry, "skipping non-object detection entry");
            continue;
        }
        match serde_json::from_value::<DetectionRecord>(entry) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(index, error = %e, "skipping undecodable detection entry"),
        }
    }
    Ok(records)
}

/// Fetch and parse in one step.
pub async fn load_records(
    source: &dyn DataSource,
    location: &str,
) -> OverlayResult<Vec<DetectionRecord>> {
    let bytes = source.fetch(location).await?;
    parse_records(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("{name}-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn parses_record_array() {
        let records = parse_records(
            br#"[{"frame":0,"id":1,"class":"car","confidence":0.5,"bbox":[0,0,10,10]},
                 {"frame":1,"id":2,"class":"person","confidence":0.7,"bbox":[5,5,8,9]}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].class, "person");
    }

    #[test]
    fn rejects_non_array_document() {
        let err = parse_records(br#"{"frame":0}"#).unwrap_err();
        assert!(matches!(err, OverlayError::Decode(_)));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = parse_records(b"[{").unwrap_err();
        assert!(matches!(err, OverlayError::Json(_)));
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let records = parse_records(
            br#"[{"frame":0,"id":1,"class":"car","confidence":0.9,"bbox":[0,0,10,10]},
                 null, 7, "x", [1, 2],
                 {"frame":1,"id":2,"class":"person","confidence":0.4,"bbox":[1,1,4,4]}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "1");
        assert!(records[0].is_on_frame(0));
        assert_eq!(records[1].id, "2");
    }

    #[test]
    fn all_entries_malformed_yields_no_records() {
        assert!(parse_records(b"[null, 1, true]").unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_local_file_and_file_url() {
        let path = temp_path("detections");
        let document = br#"[{"frame":2,"id":"a","class":"car","confidence":1,"bbox":[1,2,3,4]}]"#;
        tokio::fs::write(&path, document).await.unwrap();

        let source = DefaultDataSource::new(5).unwrap();
        let plain = load_records(&source, path.to_str().unwrap()).await.unwrap();
        let url = format!("file://{}", path.display());
        let prefixed = load_records(&source, &url).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].frame, Some(2));
        assert_eq!(prefixed[0].id, "a");
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let source = DefaultDataSource::new(5).unwrap();
        let err = load_records(&source, temp_path("absent").to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, OverlayError::Io(_)));
    }
}
