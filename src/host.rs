/// Line-delimited JSON host protocol.
///
/// A player front-end (webview, test harness, shell pipe) writes one command
/// per line; the overlay answers with one `OverlayUpdate` per line.
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::errors::OverlayResult;
use crate::overlay::engine::{OverlayEvent, OverlayHandle, OverlayUpdate};
use crate::overlay::types::{Rect, VideoMetrics};
use crate::overlay::video::{MeasuredVideo, StaticContainer};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    /// Build the overlay for `container`. Without `video` the container is
    /// treated as holding no video element.
    Init {
        container: String,
        #[serde(default)]
        video: Option<VideoMetrics>,
    },
    /// New measurement of the current video.
    VideoMetrics {
        rendered: Rect,
        native_width: f64,
        native_height: f64,
    },
    DataFileChanged {
        location: String,
    },
    Frame {
        frame: u64,
    },
    Resize,
    ExportSvg,
    Shutdown,
}

/// Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> OverlayResult<Option<HostCommand>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

/// Translates host commands into engine events.
pub struct Host {
    handle: OverlayHandle,
    video: Option<Arc<MeasuredVideo>>,
}

impl Host {
    pub fn new(handle: OverlayHandle) -> Self {
        Self { handle, video: None }
    }

    /// Returns `false` once the host asked to shut down.
    pub async fn dispatch(&mut self, command: HostCommand) -> OverlayResult<bool> {
        match command {
            HostCommand::Init { container, video } => {
                let video = video.map(|m| Arc::new(MeasuredVideo::with_metrics(m)));
                self.video = video.clone();
                self.handle
                    .initialize(Arc::new(StaticContainer::new(container, video)))
                    .await?;
            }
            HostCommand::VideoMetrics {
                rendered,
                native_width,
                native_height,
            } => match &self.video {
                // The renderer's observer picks this up as a geometry change.
                Some(video) => video.set_metrics(VideoMetrics {
                    rendered,
                    native_width,
                    native_height,
                }),
                None => tracing::warn!("video_metrics received before init; ignored"),
            },
            HostCommand::DataFileChanged { location } => self.handle.load(location).await?,
            HostCommand::Frame { frame } => self.handle.frame(frame).await?,
            HostCommand::Resize => self.handle.send(OverlayEvent::WindowResized).await?,
            HostCommand::ExportSvg => self.handle.send(OverlayEvent::ExportSvg).await?,
            HostCommand::Shutdown => {
                self.handle.shutdown().await?;
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Pump commands from `reader` into the engine and updates from the engine
/// into `writer`. Returns the writer once the engine has stopped and its
/// last update is written.
///
/// If writing fails the update stream is closed, so the engine keeps
/// handling commands (its updates are dropped) until input ends; the write
/// error is returned then.
pub async fn serve<R, W>(
    reader: R,
    mut writer: W,
    handle: OverlayHandle,
    mut updates: mpsc::Receiver<OverlayUpdate>,
) -> OverlayResult<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let read_commands = async move {
        let mut host = Host::new(handle);
        let mut lines = reader.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read host input");
                    break;
                }
            };
            let command = match parse_command(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, line = %line, "skipping malformed host command");
                    continue;
                }
            };
            match host.dispatch(command).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    tracing::error!(error = %e, "overlay engine unavailable");
                    return;
                }
            }
        }
        // Dropping the handle lets the engine drain pending loads and stop.
        tracing::info!("host input closed");
    };

    let write_updates = async {
        let written = async {
            while let Some(update) = updates.recv().await {
                let mut line = serde_json::to_string(&update)?;
                line.push('\n');
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            OverlayResult::Ok(())
        }
        .await;
        if let Err(e) = &written {
            tracing::error!(error = %e, "failed to write overlay update; closing update stream");
            updates.close();
        }
        written
    };

    let ((), written) = tokio::join!(read_commands, write_updates);
    written?;
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::io::BufReader;

    use super::*;
    use crate::config::AppConfig;
    use crate::errors::OverlayError;
    use crate::overlay::engine::OverlayEngine;
    use crate::overlay::loader::DefaultDataSource;

    const INIT_PLAYER: &str = concat!(
        r#"{"type":"init","container":"player","#,
        r#""video":{"rendered":{"x":0,"y":0,"width":800,"height":600},"#,
        r#""native_width":1920,"native_height":1080}}"#,
    );

    /// Output whose reader has gone away.
    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "host went away")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn start_engine(
        updates: usize,
    ) -> (OverlayHandle, mpsc::Receiver<OverlayUpdate>, tokio::task::JoinHandle<()>) {
        let mut cfg = AppConfig::default();
        cfg.classes.insert("car".into(), "#f00".into());
        let (update_tx, update_rx) = mpsc::channel(updates);
        let source = Arc::new(DefaultDataSource::new(5).unwrap());
        let (mut engine, handle) = OverlayEngine::new(&cfg, source, update_tx);
        let engine_task = tokio::spawn(async move { engine.run_loop().await });
        (handle, update_rx, engine_task)
    }

    #[test]
    fn parses_every_command_shape() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(
            parse_command(r#"{"type":"frame","frame":42}"#).unwrap(),
            Some(HostCommand::Frame { frame: 42 })
        );
        assert_eq!(parse_command(r#"{"type":"resize"}"#).unwrap(), Some(HostCommand::Resize));
        assert_eq!(
            parse_command(r#"{"type":"data_file_changed","location":"a.json"}"#).unwrap(),
            Some(HostCommand::DataFileChanged { location: "a.json".into() })
        );
        let init = parse_command(INIT_PLAYER).unwrap().unwrap();
        match init {
            HostCommand::Init { container, video } => {
                assert_eq!(container, "player");
                assert_eq!(video.unwrap().native_width, 1920.0);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(
            parse_command(r#"{"type":"init","container":"bare"}"#).unwrap(),
            Some(HostCommand::Init { container: "bare".into(), video: None })
        );
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(parse_command(r#"{"type":"explode"}"#).is_err());
        assert!(parse_command("not json").is_err());
    }

    #[tokio::test]
    async fn serves_a_session_over_line_json() {
        let path = std::env::temp_dir()
            .join(format!("host-session-{}.json", uuid::Uuid::new_v4()));
        let document = br#"[{"frame":0,"id":1,"class":"car","confidence":0.9,"bbox":[0,0,10,10]}]"#;
        tokio::fs::write(&path, document).await.unwrap();

        let (handle, update_rx, engine_task) = start_engine(32);
        let input = format!(
            "{INIT_PLAYER}\nthis line is garbage\n\n{}\n",
            serde_json::json!({"type": "data_file_changed", "location": path.to_str().unwrap()}),
        );

        let output = serve(input.as_bytes(), Vec::new(), handle, update_rx).await.unwrap();
        engine_task.await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        let text = String::from_utf8(output).unwrap();
        let kinds: Vec<String> = text
            .lines()
            .map(|l| {
                let update: serde_json::Value = serde_json::from_str(l).unwrap();
                update["type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(kinds.first().map(String::as_str), Some("surface_created"));
        assert!(kinds.iter().any(|k| k == "data_loaded"), "got {kinds:?}");
    }

    #[tokio::test]
    async fn broken_output_does_not_stall_input() {
        let (handle, update_rx, engine_task) = start_engine(1);
        let (mut client, server) = tokio::io::duplex(256);
        let serving = tokio::spawn(serve(BufReader::new(server), BrokenPipe, handle, update_rx));

        // Every init produces updates nobody can write; input must keep flowing.
        let feed = async {
            for _ in 0..200 {
                client.write_all(INIT_PLAYER.as_bytes()).await.unwrap();
                client.write_all(b"\n").await.unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(5), feed)
            .await
            .expect("host input stalled behind a failed writer");
        drop(client);

        let result = tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .expect("serve did not finish")
            .unwrap();
        assert!(matches!(result, Err(OverlayError::Io(_))));
        tokio::time::timeout(Duration::from_secs(5), engine_task)
            .await
            .expect("engine kept running")
            .unwrap();
    }
}
