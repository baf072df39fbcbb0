//! Per-speaker pause-based segmentation (spec §4.2).
//!
//! One `Chunker` instance per (call_id, speaker_id). `feed` accumulates
//! voiced PCM and closes an utterance once a pause of at least `pause_ms`
//! is observed, or once `max_utterance_ms` is reached, whichever comes
//! first. `flush` closes whatever is buffered, for end-of-stream (spec
//! §4.2 `flush`) without waiting out the pause.

use relay_config::PipelineConfig;
use relay_core::{Language, PcmBytes, Utterance};

use crate::speech_detector::is_voiced;

/// Segmentation state for one speaker within one call.
pub struct Chunker {
    call_id: String,
    speaker_id: String,
    source_lang: Language,
    config: PipelineConfig,

    buffer: Option<PcmBytes>,
    utterance_start_ms: u64,
    last_voiced_ms: u64,
}

/// Output of a single `feed`/`flush` call: a ready-to-recognize utterance,
/// plus whether voice activity transitioned (for `Frame::VoiceStart` /
/// `Frame::VoiceEnd` emission by the caller).
#[derive(Debug, Default)]
pub struct ChunkerOutput {
    pub utterance: Option<Utterance>,
    pub voice_started: bool,
    pub voice_ended: Option<u64>,
}

impl Chunker {
    pub fn new(
        call_id: impl Into<String>,
        speaker_id: impl Into<String>,
        source_lang: Language,
        config: PipelineConfig,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            speaker_id: speaker_id.into(),
            source_lang,
            config,
            buffer: None,
            utterance_start_ms: 0,
            last_voiced_ms: 0,
        }
    }

    /// Feed one incoming frame, timestamped at its arrival offset in
    /// milliseconds since stream start.
    pub fn feed(&mut self, pcm: PcmBytes, frame_ts_ms: u64) -> ChunkerOutput {
        let mut out = ChunkerOutput::default();
        let frame_duration_ms = pcm.duration_ms();
        let voiced = is_voiced(&pcm, self.config.rms_silence_threshold);

        if voiced {
            if self.buffer.is_some() {
                // Would this frame push the buffered span at or past the
                // max-length boundary? If so it belongs to the *next*
                // utterance: close out what's accumulated so far first,
                // then start fresh with this frame (spec §4.2 "the
                // triggering frame is retained as the first frame of the
                // next utterance"; also the tie-break that a same-frame
                // max-length boundary takes priority over a pause boundary).
                let projected_ms = (frame_ts_ms + frame_duration_ms).saturating_sub(self.utterance_start_ms);
                if projected_ms >= self.config.max_utterance_ms {
                    out.utterance = self.close(self.last_voiced_ms);
                    out.voice_ended = Some(0);
                }
            }

            if self.buffer.is_none() {
                self.buffer = Some(pcm);
                self.utterance_start_ms = frame_ts_ms;
                out.voice_started = true;
            } else {
                self.buffer.as_mut().unwrap().append(&pcm);
            }
            self.last_voiced_ms = frame_ts_ms + frame_duration_ms;
            return out;
        }

        // Silent frame: only matters if we're mid-utterance. The silent
        // span covered by this frame has already fully elapsed by the time
        // we observe it, so "now" for the pause check is the frame's end,
        // not its arrival offset.
        if self.buffer.is_some() {
            let now_ms = frame_ts_ms + frame_duration_ms;
            let pause_so_far = now_ms.saturating_sub(self.last_voiced_ms);
            if pause_so_far >= self.config.pause_ms {
                out.utterance = self.close(self.last_voiced_ms);
                out.voice_ended = Some(pause_so_far);
            }
        }
        out
    }

    /// Close out any buffered utterance regardless of pause (spec §4.2
    /// `flush`, called on session end / leave).
    pub fn flush(&mut self) -> Option<Utterance> {
        if self.buffer.is_none() {
            return None;
        }
        self.close(self.last_voiced_ms)
    }

    fn close(&mut self, end_ts_ms: u64) -> Option<Utterance> {
        let pcm = self.buffer.take()?;
        let duration_ms = end_ts_ms.saturating_sub(self.utterance_start_ms);
        if duration_ms < self.config.min_utterance_ms {
            // Too short to bother recognizing; drop silently (spec §4.2
            // "Minimum utterance length").
            return None;
        }
        Some(Utterance {
            utterance_id: uuid::Uuid::new_v4().to_string(),
            call_id: self.call_id.clone(),
            speaker_id: self.speaker_id.clone(),
            source_lang: self.source_lang.clone(),
            pcm_bytes: pcm,
            start_ts_ms: self.utterance_start_ms,
            end_ts_ms,
        })
    }
}
