use parlance_foundation::VadError;

/// A frame classifier.
///
/// Implementations score one canonical frame at a time and are free to keep
/// internal state (recurrent models, adaptive floors). They run in-process;
/// a network call has no business here.
pub trait VadEngine: Send {
    /// Probability in [0, 1] that the frame contains speech.
    fn speech_probability(&mut self, frame: &[i16]) -> Result<f32, VadError>;

    fn reset(&mut self);

    fn required_sample_rate(&self) -> u32;

    fn required_frame_size(&self) -> usize;
}
