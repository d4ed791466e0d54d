//! Per-message processing: download, optional preprocessing, one gateway call,
//! text reply, optional voice reply, cleanup.
//!
//! Every step returns a [`PipelineError`] instead of bubbling up; the public
//! `handle_*` entry points turn failures into a visible chat message, so a
//! failed update never takes the dispatcher down.

pub mod transport;

use std::io;
use std::sync::Arc;

use teloxide::types::UserId;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::llm::{AiGateway, GatewayError};
use crate::media::{preprocess_image, PreparedImage, TempFileStore, TempMediaFile};
use crate::session::SessionStore;

pub use transport::{ChatTransport, TransportError};

pub const TEXT_ERROR_PREFIX: &str = "❌ Error";
pub const VOICE_ERROR_PREFIX: &str = "Voice processing error";
pub const IMAGE_ERROR_PREFIX: &str = "Image processing error";
pub const VOICE_REPLY_ERROR_PREFIX: &str = "Voice reply error";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("download failed: {0}")]
    Download(#[source] TransportError),
    #[error("file system error: {0}")]
    FileSystem(#[from] io::Error),
    #[error("{0}")]
    Gateway(#[from] GatewayError),
    #[error("could not send reply: {0}")]
    Delivery(#[source] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Start,
    Downloaded,
    Preprocessed,
    GatewayCalled,
    Replied,
    VoiceSynthesized,
    Cleaned,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Last stage reached; on failure, the stage the pipeline failed after.
    pub stage: PipelineStage,
    pub error: Option<String>,
    pub reply: Option<String>,
    pub voice_sent: bool,
}

impl PipelineReport {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

struct Progress {
    kind: &'static str,
    stage: PipelineStage,
    reply: Option<String>,
    voice_sent: bool,
}

impl Progress {
    fn new(kind: &'static str) -> Self {
        Progress {
            kind,
            stage: PipelineStage::Start,
            reply: None,
            voice_sent: false,
        }
    }

    fn advance(&mut self, stage: PipelineStage) {
        debug!("{} pipeline: {:?} -> {:?}", self.kind, self.stage, stage);
        self.stage = stage;
    }

    fn finish(mut self) -> PipelineReport {
        self.advance(PipelineStage::Done);
        PipelineReport {
            stage: self.stage,
            error: None,
            reply: self.reply,
            voice_sent: self.voice_sent,
        }
    }

    fn fail(self, err: &PipelineError) -> PipelineReport {
        PipelineReport {
            stage: self.stage,
            error: Some(err.to_string()),
            reply: self.reply,
            voice_sent: self.voice_sent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub image_prompt: String,
    pub enhance_images: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        PipelineOptions {
            image_prompt: config.image_prompt.clone(),
            enhance_images: config.enable_image_enhancement,
        }
    }
}

#[derive(Clone)]
pub struct MediaPipeline {
    sessions: SessionStore,
    gateway: Arc<dyn AiGateway>,
    temp_store: TempFileStore,
    options: PipelineOptions,
}

fn release_quietly(file: TempMediaFile) {
    let path = file.path().to_path_buf();
    if let Err(err) = file.release() {
        warn!("Failed to release temp media file {}: {err}", path.display());
    }
}

impl MediaPipeline {
    pub fn new(
        sessions: SessionStore,
        gateway: Arc<dyn AiGateway>,
        temp_store: TempFileStore,
        options: PipelineOptions,
    ) -> Self {
        MediaPipeline {
            sessions,
            gateway,
            temp_store,
            options,
        }
    }

    #[cfg(test)]
    fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Runs the completion path for a typed (or transcribed) message.
    pub async fn handle_text(
        &self,
        user: UserId,
        text: &str,
        transport: &dyn ChatTransport,
    ) -> PipelineReport {
        let mut progress = Progress::new("text");
        match self.run_text(user, text, transport, &mut progress).await {
            Ok(()) => progress.finish(),
            Err(err) => self.report_failure(TEXT_ERROR_PREFIX, err, progress, transport).await,
        }
    }

    pub async fn handle_voice(
        &self,
        user: UserId,
        file_id: &str,
        transport: &dyn ChatTransport,
    ) -> PipelineReport {
        let mut progress = Progress::new("voice");
        match self.run_voice(file_id, transport, &mut progress).await {
            Ok(transcript) => {
                info!(
                    "Voice message from user {} transcribed ({} chars)",
                    user.0,
                    transcript.chars().count()
                );
                self.handle_text(user, &transcript, transport).await
            }
            Err(err) => self.report_failure(VOICE_ERROR_PREFIX, err, progress, transport).await,
        }
    }

    pub async fn handle_photo(
        &self,
        user: UserId,
        file_id: &str,
        transport: &dyn ChatTransport,
    ) -> PipelineReport {
        let mut progress = Progress::new("photo");
        match self.run_photo(user, file_id, transport, &mut progress).await {
            Ok(()) => progress.finish(),
            Err(err) => self.report_failure(IMAGE_ERROR_PREFIX, err, progress, transport).await,
        }
    }

    async fn run_text(
        &self,
        user: UserId,
        text: &str,
        transport: &dyn ChatTransport,
        progress: &mut Progress,
    ) -> Result<(), PipelineError> {
        self.sessions.append_user_turn(user, text);
        let history = self.sessions.history(user);

        let reply = self.gateway.complete_chat(&history).await?;
        progress.advance(PipelineStage::GatewayCalled);
        self.sessions.append_assistant_turn(user, &reply);

        transport
            .send_text(&reply)
            .await
            .map_err(PipelineError::Delivery)?;
        progress.reply = Some(reply.clone());
        progress.advance(PipelineStage::Replied);

        self.send_voice_reply(user, &reply, transport, progress).await
    }

    async fn run_voice(
        &self,
        file_id: &str,
        transport: &dyn ChatTransport,
        progress: &mut Progress,
    ) -> Result<String, PipelineError> {
        let file = self.temp_store.acquire("voice-", ".ogg").await?;
        transport
            .download(file_id, file.path())
            .await
            .map_err(PipelineError::Download)?;
        progress.advance(PipelineStage::Downloaded);

        let audio = file.read_all().await?;
        let transcript = self.gateway.transcribe(audio, &file.file_name()).await;
        release_quietly(file);
        let transcript = transcript?;
        progress.advance(PipelineStage::GatewayCalled);

        transport
            .send_text(&format!("🎙 Recognized: {transcript}"))
            .await
            .map_err(PipelineError::Delivery)?;
        progress.advance(PipelineStage::Cleaned);
        Ok(transcript)
    }

    async fn run_photo(
        &self,
        user: UserId,
        file_id: &str,
        transport: &dyn ChatTransport,
        progress: &mut Progress,
    ) -> Result<(), PipelineError> {
        let file = self.temp_store.acquire("photo-", ".jpg").await?;
        transport
            .download(file_id, file.path())
            .await
            .map_err(PipelineError::Download)?;
        progress.advance(PipelineStage::Downloaded);

        let original = file.read_all().await?;
        let image = if self.options.enhance_images {
            let prepared = self.prepare_image(original, &file).await?;
            if prepared.enhanced {
                progress.advance(PipelineStage::Preprocessed);
            }
            prepared.bytes
        } else {
            original
        };

        let description = self
            .gateway
            .describe_image(&self.options.image_prompt, image)
            .await?;
        progress.advance(PipelineStage::GatewayCalled);

        let reply = format!("🖼 {description}");
        transport
            .send_text(&reply)
            .await
            .map_err(PipelineError::Delivery)?;
        progress.reply = Some(reply);
        progress.advance(PipelineStage::Replied);

        self.send_voice_reply(user, &description, transport, progress)
            .await?;

        release_quietly(file);
        progress.advance(PipelineStage::Cleaned);
        Ok(())
    }

    async fn prepare_image(
        &self,
        bytes: Vec<u8>,
        file: &TempMediaFile,
    ) -> Result<PreparedImage, PipelineError> {
        match tokio::task::spawn_blocking(move || preprocess_image(bytes)).await {
            Ok(prepared) => Ok(prepared),
            Err(err) => {
                warn!("Image preprocessing task failed, using original bytes: {err}");
                Ok(PreparedImage {
                    bytes: file.read_all().await?,
                    enhanced: false,
                })
            }
        }
    }

    async fn send_voice_reply(
        &self,
        user: UserId,
        text: &str,
        transport: &dyn ChatTransport,
        progress: &mut Progress,
    ) -> Result<(), PipelineError> {
        if !self.sessions.is_voice_enabled(user) {
            return Ok(());
        }

        let audio = self.gateway.synthesize_speech(text).await?;
        let file = self.temp_store.acquire("reply-", ".ogg").await?;
        file.write_all(&audio).await?;
        progress.advance(PipelineStage::VoiceSynthesized);

        transport
            .send_voice(file.path())
            .await
            .map_err(PipelineError::Delivery)?;
        progress.voice_sent = true;
        release_quietly(file);
        Ok(())
    }

    async fn report_failure(
        &self,
        prefix: &str,
        err: PipelineError,
        progress: Progress,
        transport: &dyn ChatTransport,
    ) -> PipelineReport {
        // The text reply is already out; only the voice step failed.
        let prefix = if progress.stage >= PipelineStage::Replied {
            VOICE_REPLY_ERROR_PREFIX
        } else {
            prefix
        };
        error!(
            "{} pipeline failed after {:?}: {err}",
            progress.kind, progress.stage
        );
        if let Err(send_err) = transport.send_text(&format!("{prefix}: {err}")).await {
            error!("Failed to report pipeline error to user: {send_err}");
        }
        progress.fail(&err)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::session::ChatTurn;

    const USER: UserId = UserId(7);

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Text(String),
        Voice(Vec<u8>),
    }

    #[derive(Default)]
    struct RecordingTransport {
        attachment: Option<Vec<u8>>,
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingTransport {
        fn with_attachment(bytes: &[u8]) -> Self {
            RecordingTransport {
                attachment: Some(bytes.to_vec()),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|item| match item {
                    Sent::Text(text) => Some(text),
                    Sent::Voice(_) => None,
                })
                .collect()
        }

        fn voice_count(&self) -> usize {
            self.sent()
                .iter()
                .filter(|item| matches!(item, Sent::Voice(_)))
                .count()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn download(&self, _file_id: &str, destination: &Path) -> Result<(), TransportError> {
            match &self.attachment {
                Some(bytes) => Ok(tokio::fs::write(destination, bytes).await?),
                None => Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    "file is gone",
                ))),
            }
        }

        async fn send_text(&self, text: &str) -> Result<(), TransportError> {
            self.sent.lock().push(Sent::Text(text.to_string()));
            Ok(())
        }

        async fn send_voice(&self, audio: &Path) -> Result<(), TransportError> {
            let bytes = tokio::fs::read(audio).await?;
            self.sent.lock().push(Sent::Voice(bytes));
            Ok(())
        }
    }

    fn api_error(operation: &'static str) -> GatewayError {
        GatewayError::Api {
            operation,
            status: 500,
            message: "upstream exploded".to_string(),
        }
    }

    #[derive(Default)]
    struct ScriptedGateway {
        transcript: Option<String>,
        fail_chat: bool,
        fail_vision: bool,
        fail_speech: bool,
        histories: Mutex<Vec<Vec<ChatTurn>>>,
        images: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl AiGateway for ScriptedGateway {
        async fn complete_chat(&self, history: &[ChatTurn]) -> Result<String, GatewayError> {
            self.histories.lock().push(history.to_vec());
            if self.fail_chat {
                return Err(api_error("chat completion"));
            }
            let last = history.last().map(|turn| turn.content.as_str()).unwrap_or("");
            Ok(format!("echo: {last}"))
        }

        async fn transcribe(&self, _audio: Vec<u8>, _file_name: &str) -> Result<String, GatewayError> {
            self.transcript
                .clone()
                .ok_or_else(|| api_error("transcription"))
        }

        async fn describe_image(&self, prompt: &str, image: Vec<u8>) -> Result<String, GatewayError> {
            self.images.lock().push(image);
            if self.fail_vision {
                return Err(api_error("image analysis"));
            }
            Ok(format!("a picture ({prompt})"))
        }

        async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, GatewayError> {
            if self.fail_speech {
                return Err(api_error("speech synthesis"));
            }
            Ok(format!("OggS:{text}").into_bytes())
        }
    }

    struct Harness {
        pipeline: MediaPipeline,
        gateway: Arc<ScriptedGateway>,
        temp_dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(gateway: ScriptedGateway) -> Self {
            Self::with_options(gateway, true)
        }

        fn with_options(gateway: ScriptedGateway, enhance_images: bool) -> Self {
            let temp_dir = tempfile::tempdir().unwrap();
            let gateway = Arc::new(gateway);
            let pipeline = MediaPipeline::new(
                SessionStore::new(),
                gateway.clone(),
                TempFileStore::new(temp_dir.path()),
                PipelineOptions {
                    image_prompt: "Describe this image".to_string(),
                    enhance_images,
                },
            );
            Harness {
                pipeline,
                gateway,
                temp_dir,
            }
        }

        fn leftover_files(&self) -> usize {
            std::fs::read_dir(self.temp_dir.path()).unwrap().count()
        }
    }

    #[tokio::test]
    async fn text_round_trip_records_both_turns() {
        let harness = Harness::new(ScriptedGateway::default());
        harness.pipeline.sessions().set_voice_enabled(USER, false);
        let transport = RecordingTransport::default();

        let report = harness.pipeline.handle_text(USER, "hello", &transport).await;

        assert_eq!(report.stage, PipelineStage::Done);
        assert_eq!(report.reply.as_deref(), Some("echo: hello"));
        assert_eq!(
            harness.pipeline.sessions().history(USER),
            vec![ChatTurn::user("hello"), ChatTurn::assistant("echo: hello")]
        );
        assert_eq!(transport.sent(), vec![Sent::Text("echo: hello".to_string())]);
    }

    #[tokio::test]
    async fn completion_sees_bounded_history_including_new_turn() {
        let harness = Harness::new(ScriptedGateway::default());
        harness.pipeline.sessions().set_voice_enabled(USER, false);
        let transport = RecordingTransport::default();

        for index in 0..8 {
            harness
                .pipeline
                .handle_text(USER, &format!("m{index}"), &transport)
                .await;
        }

        let histories = harness.gateway.histories.lock().clone();
        let last = histories.last().unwrap();
        assert_eq!(last.len(), 10);
        assert_eq!(last.last(), Some(&ChatTurn::user("m7")));
        assert_eq!(harness.pipeline.sessions().history(USER).len(), 10);
    }

    #[tokio::test]
    async fn voice_toggle_controls_voice_reply() {
        let harness = Harness::new(ScriptedGateway::default());
        let transport = RecordingTransport::default();

        harness.pipeline.sessions().set_voice_enabled(USER, false);
        let report = harness.pipeline.handle_text(USER, "quiet", &transport).await;
        assert!(!report.voice_sent);
        assert_eq!(transport.voice_count(), 0);

        harness.pipeline.sessions().set_voice_enabled(USER, true);
        let report = harness.pipeline.handle_text(USER, "loud", &transport).await;
        assert!(report.voice_sent);
        assert_eq!(
            transport.sent()[1..],
            [
                Sent::Text("echo: loud".to_string()),
                Sent::Voice(b"OggS:echo: loud".to_vec()),
            ]
        );
        assert_eq!(harness.leftover_files(), 0);
    }

    #[tokio::test]
    async fn failing_completion_reports_error_and_keeps_user_turn() {
        let harness = Harness::new(ScriptedGateway {
            fail_chat: true,
            ..Default::default()
        });
        let transport = RecordingTransport::default();

        let report = harness.pipeline.handle_text(USER, "hello", &transport).await;

        assert!(report.is_failed());
        assert_eq!(report.stage, PipelineStage::Start);
        assert_eq!(
            transport.texts(),
            vec!["❌ Error: chat completion failed with status 500: upstream exploded".to_string()]
        );
        assert_eq!(transport.voice_count(), 0);
        assert_eq!(
            harness.pipeline.sessions().history(USER),
            vec![ChatTurn::user("hello")]
        );
    }

    #[tokio::test]
    async fn transcribed_voice_matches_typed_message() {
        let typed = Harness::new(ScriptedGateway::default());
        let typed_transport = RecordingTransport::default();
        typed.pipeline.handle_text(USER, "test", &typed_transport).await;

        let spoken = Harness::new(ScriptedGateway {
            transcript: Some("test".to_string()),
            ..Default::default()
        });
        let spoken_transport = RecordingTransport::with_attachment(b"OggS voice");
        let report = spoken
            .pipeline
            .handle_voice(USER, "voice-file", &spoken_transport)
            .await;

        assert_eq!(report.stage, PipelineStage::Done);
        assert!(report.voice_sent);
        assert_eq!(
            spoken.pipeline.sessions().history(USER),
            typed.pipeline.sessions().history(USER)
        );
        assert_eq!(
            spoken_transport.texts(),
            vec!["🎙 Recognized: test".to_string(), "echo: test".to_string()]
        );
        assert_eq!(spoken.leftover_files(), 0);
    }

    #[tokio::test]
    async fn failed_transcription_cleans_up_and_reports() {
        let harness = Harness::new(ScriptedGateway::default());
        let transport = RecordingTransport::with_attachment(b"OggS voice");

        let report = harness
            .pipeline
            .handle_voice(USER, "voice-file", &transport)
            .await;

        assert!(report.is_failed());
        assert_eq!(report.stage, PipelineStage::Downloaded);
        assert_eq!(
            transport.texts(),
            vec![
                "Voice processing error: transcription failed with status 500: upstream exploded"
                    .to_string()
            ]
        );
        assert!(harness.pipeline.sessions().history(USER).is_empty());
        assert_eq!(harness.leftover_files(), 0);
    }

    #[tokio::test]
    async fn download_failure_is_reported() {
        let harness = Harness::new(ScriptedGateway::default());
        let transport = RecordingTransport::default();

        let report = harness
            .pipeline
            .handle_photo(USER, "photo-file", &transport)
            .await;

        assert_eq!(report.stage, PipelineStage::Start);
        assert_eq!(
            transport.texts(),
            vec!["Image processing error: download failed: file is gone".to_string()]
        );
        assert!(harness.gateway.images.lock().is_empty());
        assert_eq!(harness.leftover_files(), 0);
    }

    #[tokio::test]
    async fn failing_image_analysis_leaves_no_temp_files() {
        let harness = Harness::new(ScriptedGateway {
            fail_vision: true,
            ..Default::default()
        });
        let transport = RecordingTransport::with_attachment(
            &crate::media::preprocess::tests::sample_png(),
        );

        let report = harness
            .pipeline
            .handle_photo(USER, "photo-file", &transport)
            .await;

        assert!(report.is_failed());
        assert_eq!(report.stage, PipelineStage::Preprocessed);
        assert_eq!(
            transport.texts(),
            vec![
                "Image processing error: image analysis failed with status 500: upstream exploded"
                    .to_string()
            ]
        );
        assert_eq!(harness.leftover_files(), 0);
    }

    #[tokio::test]
    async fn photo_reply_uses_enhanced_image_and_speaks_description() {
        let harness = Harness::new(ScriptedGateway::default());
        let png = crate::media::preprocess::tests::sample_png();
        let transport = RecordingTransport::with_attachment(&png);

        let report = harness
            .pipeline
            .handle_photo(USER, "photo-file", &transport)
            .await;

        assert_eq!(report.stage, PipelineStage::Done);
        assert_eq!(
            report.reply.as_deref(),
            Some("🖼 a picture (Describe this image)")
        );
        assert!(report.voice_sent);
        let images = harness.gateway.images.lock().clone();
        assert_eq!(
            image::guess_format(&images[0]).unwrap(),
            image::ImageFormat::Jpeg
        );
        assert_eq!(
            transport.sent()[1],
            Sent::Voice(b"OggS:a picture (Describe this image)".to_vec())
        );
        assert!(harness.pipeline.sessions().history(USER).is_empty());
        assert_eq!(harness.leftover_files(), 0);
    }

    #[tokio::test]
    async fn undecodable_photo_is_sent_unmodified() {
        let harness = Harness::new(ScriptedGateway::default());
        harness.pipeline.sessions().set_voice_enabled(USER, false);
        let transport = RecordingTransport::with_attachment(b"not really a jpeg");

        let report = harness
            .pipeline
            .handle_photo(USER, "photo-file", &transport)
            .await;

        assert_eq!(report.stage, PipelineStage::Done);
        assert_eq!(
            harness.gateway.images.lock().clone(),
            vec![b"not really a jpeg".to_vec()]
        );
    }

    #[tokio::test]
    async fn enhancement_can_be_disabled() {
        let harness = Harness::with_options(ScriptedGateway::default(), false);
        harness.pipeline.sessions().set_voice_enabled(USER, false);
        let png = crate::media::preprocess::tests::sample_png();
        let transport = RecordingTransport::with_attachment(&png);

        harness
            .pipeline
            .handle_photo(USER, "photo-file", &transport)
            .await;

        assert_eq!(harness.gateway.images.lock().clone(), vec![png]);
    }

    #[tokio::test]
    async fn speech_failure_after_text_reply_is_reported_separately() {
        let harness = Harness::new(ScriptedGateway {
            fail_speech: true,
            ..Default::default()
        });
        let transport = RecordingTransport::default();

        let report = harness.pipeline.handle_text(USER, "hello", &transport).await;

        assert!(report.is_failed());
        assert_eq!(report.stage, PipelineStage::Replied);
        assert_eq!(report.reply.as_deref(), Some("echo: hello"));
        assert_eq!(
            transport.texts(),
            vec![
                "echo: hello".to_string(),
                "Voice reply error: speech synthesis failed with status 500: upstream exploded"
                    .to_string()
            ]
        );
        assert_eq!(harness.pipeline.sessions().history(USER).len(), 2);
        assert_eq!(harness.leftover_files(), 0);
    }
}
