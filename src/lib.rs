//! Impulcifer turns sine sweep recordings, made with microphones in the
//! listener's ears and played through a loudspeaker rig, into personalized
//! head-related impulse responses (HRIRs) for binaural playback on
//! headphones.
//!
//! The processing is an offline batch over fully buffered signals:
//!
//! 1. [splitter]: slice the multitrack recording into one sweep per speaker
//!    and ear, and lay the sweeps out in the canonical 14 channel order.
//! 2. [deconvolve]: recover an impulse response from every sweep.
//! 3. [head]: align each left/right pair on its first arrival, keeping the
//!    interaural time difference and the speaker's propagation delay.
//! 4. [decay]: find where every response has decayed into noise, and cut
//!    all of them at the latest such point.
//! 5. [normalize]: scale the whole set to a common peak level.
//! 6. [headphones]: optionally equalize the headphones the HRIRs will be
//!    listened with.
//! 7. [export]: write the set in the canonical and HeSuVi channel orders.
//!
//! [pipeline::Pipeline] runs all of the above from a
//! [config::PipelineConfig].

#![warn(missing_docs)]
pub mod args;
pub mod channel;
pub mod config;
pub mod decay;
pub mod deconvolve;
pub mod error;
pub mod export;
pub mod frequency_response;
pub mod head;
pub mod headphones;
pub mod normalize;
pub mod pipeline;
pub mod signal;
pub mod spectral;
pub mod splitter;
pub mod stage;
pub mod sweep;
pub mod wav;

pub use error::{ImpulciferError, Result};

/// An iterator that walks several iterators in lock step, yielding one
/// `Vec` per step with an element from each, based on
/// [this StackOverflow answer](https://stackoverflow.com/a/75477884/17443903).
/// Iteration stops as soon as any inner iterator runs dry, or immediately
/// when there are no inner iterators.
pub struct TransposeIter<I>
where
    I: IntoIterator,
{
    iterators: Vec<I::IntoIter>,
}

/// Turns an iterator of iterators (e.g. tracks of samples) into an iterator
/// of `Vec`s (e.g. frames).
pub trait TransposableIter: IntoIterator + Sized
where
    Self::Item: IntoIterator,
{
    #[allow(missing_docs)]
    fn transpose(self) -> TransposeIter<Self::Item> {
        let iterators: Vec<_> = self.into_iter().map(|i| i.into_iter()).collect();
        TransposeIter { iterators }
    }
}

impl<I> Iterator for TransposeIter<I>
where
    I: IntoIterator,
{
    type Item = Vec<I::Item>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.iterators.is_empty() {
            return None;
        }
        self.iterators.iter_mut().map(|iter| iter.next()).collect()
    }
}

impl<Any> TransposableIter for Any
where
    Any: IntoIterator,
    Any::Item: IntoIterator,
{
}
