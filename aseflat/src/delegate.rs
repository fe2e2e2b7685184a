//! The callback protocol a [`ContainerDecoder`](crate::decode::ContainerDecoder) reports through.

use crate::doc::Sprite;

/// Receives diagnostics and the finished [`Sprite`] from a [`ContainerDecoder`](crate::decode::ContainerDecoder).
///
/// A decoder calls [`error`](Self::error) and [`incompatibility_error`](Self::incompatibility_error) any number of
/// times, [`decode_one_frame`](Self::decode_one_frame) before parsing each frame, and finally
/// [`on_sprite`](Self::on_sprite) exactly once with the parsed document.
pub trait DecodeDelegate {
    /// A problem with the input. When followed by a failed decode it describes the fatal error.
    fn error(&mut self, msg: &str);

    /// Something in the input this decoder cannot represent faithfully, which is otherwise skipped.
    fn incompatibility_error(&mut self, msg: &str);

    /// Whether the decoder should parse another frame. Returning `false` ends decoding early but still produces a
    /// sprite containing the frames parsed so far.
    fn decode_one_frame(&mut self) -> bool {
        true
    }

    /// Take ownership of the parsed document.
    fn on_sprite(&mut self, sprite: Sprite);

    /// Hand the document received by [`on_sprite`](Self::on_sprite) over to the caller.
    fn take_sprite(&mut self) -> Option<Sprite>;
}

/// Where a [`SpriteDelegate`] is in the decode protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DelegateState {
    /// No callback received yet.
    #[default]
    Idle,
    /// At least one frame was requested.
    Parsing,
    /// The sprite arrived and has not been taken.
    DocumentReady,
    /// A callback arrived out of order. Any sprite was dropped.
    Failed,
    /// The sprite was taken.
    Done,
}

/// A diagnostic recorded by a [`SpriteDelegate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// Reported through [`DecodeDelegate::error`].
    Error(String),
    /// Reported through [`DecodeDelegate::incompatibility_error`].
    Incompatibility(String),
}

/// The default [`DecodeDelegate`]: stores the sprite and the diagnostics, optionally stopping after some frames.
#[derive(Debug, Default)]
pub struct SpriteDelegate {
    state: DelegateState,
    sprite: Option<Sprite>,
    diagnostics: Vec<Diagnostic>,
    frame_limit: Option<u32>,
    frames_started: u32,
}

//
// SpriteDelegate impls
//

impl SpriteDelegate {
    /// A delegate which decodes every frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// A delegate which stops decoding once `frame_limit` frames have been parsed.
    pub fn with_frame_limit(frame_limit: u32) -> Self {
        Self { frame_limit: Some(frame_limit), ..Self::default() }
    }

    /// The current protocol state.
    pub fn state(&self) -> DelegateState {
        self.state
    }

    /// Every diagnostic received so far, in order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn fail(&mut self, reason: &str) {
        log::error!("decode delegate: {reason} in state {:?}", self.state);
        self.state = DelegateState::Failed;
        self.sprite = None;
    }
}

impl DecodeDelegate for SpriteDelegate {
    fn error(&mut self, msg: &str) {
        log::warn!("decode error: {msg}");
        self.diagnostics.push(Diagnostic::Error(msg.to_string()));
    }

    fn incompatibility_error(&mut self, msg: &str) {
        log::warn!("incompatible input: {msg}");
        self.diagnostics.push(Diagnostic::Incompatibility(msg.to_string()));
    }

    fn decode_one_frame(&mut self) -> bool {
        match self.state {
            DelegateState::Idle | DelegateState::Parsing => self.state = DelegateState::Parsing,
            DelegateState::DocumentReady | DelegateState::Done => {
                self.fail("frame requested after the document arrived");
                return false;
            }
            DelegateState::Failed => return false,
        }
        if self.frame_limit.is_some_and(|limit| self.frames_started >= limit) {
            log::debug!("frame limit of {} reached", self.frames_started);
            return false;
        }
        self.frames_started += 1;
        true
    }

    fn on_sprite(&mut self, sprite: Sprite) {
        match self.state {
            DelegateState::Idle | DelegateState::Parsing => {
                self.sprite = Some(sprite);
                self.state = DelegateState::DocumentReady;
            }
            DelegateState::DocumentReady | DelegateState::Done => self.fail("second document received"),
            DelegateState::Failed => (),
        }
    }

    fn take_sprite(&mut self) -> Option<Sprite> {
        match self.state {
            DelegateState::DocumentReady => {
                self.state = DelegateState::Done;
                self.sprite.take()
            }
            _ => None,
        }
    }
}
