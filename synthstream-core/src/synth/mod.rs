//! Synthesis source abstraction.
//!
//! `SynthSource` is what the producer loop calls once per pacing period. It
//! replaces a raw callback + opaque context pointer: whatever state the
//! synthesizer needs lives in the implementor (or the closure's captures).

pub mod sine;

pub use sine::SineSource;

/// Contract for anything that can render interleaved f32 audio.
pub trait SynthSource: Send + 'static {
    /// Render one producer chunk.
    ///
    /// `buffer.len() == frames * channels`; samples are interleaved (one per
    /// channel per frame, channels adjacent). Implementations must overwrite
    /// the whole buffer on every call: it is reused and holds the previous
    /// chunk on entry.
    fn render(&mut self, buffer: &mut [f32], frames: usize, channels: u16);
}

impl<F> SynthSource for F
where
    F: FnMut(&mut [f32], usize, u16) + Send + 'static,
{
    fn render(&mut self, buffer: &mut [f32], frames: usize, channels: u16) {
        self(buffer, frames, channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_sources() {
        let mut calls = 0u32;
        let mut source = move |buffer: &mut [f32], frames: usize, channels: u16| {
            calls += 1;
            assert_eq!(buffer.len(), frames * channels as usize);
            buffer.fill(calls as f32);
        };

        let mut buffer = [0.0f32; 8];
        source.render(&mut buffer, 4, 2);
        source.render(&mut buffer, 4, 2);
        assert_eq!(buffer, [2.0; 8]);
    }

    #[test]
    fn boxed_sources_render_through_the_trait_object() {
        let mut boxed: Box<dyn SynthSource> =
            Box::new(|buffer: &mut [f32], _: usize, _: u16| buffer.fill(0.5));
        let mut buffer = [0.0f32; 4];
        boxed.render(&mut buffer, 2, 2);
        assert_eq!(buffer, [0.5; 4]);
    }
}
