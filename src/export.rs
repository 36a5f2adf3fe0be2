//! Lays out the finished impulse responses in the channel orders playback
//! software expects.

use crate::channel::ChannelOrder;
use crate::error::{ImpulciferError, Result};
use crate::signal::TrackSet;
use crate::stage::Stage;

use std::fmt;

/// Picks the tracks of a set in a given channel order.
#[derive(Debug, Clone)]
pub struct Exporter {
    order: ChannelOrder,
}

impl Exporter {
    #[allow(missing_docs)]
    pub fn new(order: ChannelOrder) -> Self {
        Self { order }
    }
}

impl Stage for Exporter {
    type InData = TrackSet;
    type OutData = TrackSet;

    /// Fails with [ImpulciferError::UnsupportedChannel] if the order names a
    /// label the set does not have.
    fn convert(&self, input: TrackSet) -> Result<TrackSet> {
        let tracks = self
            .order
            .labels()
            .iter()
            .map(|&label| {
                input.get(label).cloned().ok_or_else(|| {
                    ImpulciferError::UnsupportedChannel(format!(
                        "no track for {label} in the exported set"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TrackSet::new(input.sample_rate(), tracks))
    }
}

impl fmt::Display for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exporter ({} channels)", self.order.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Track;

    /// Every canonical track holds its own index as a constant.
    fn indexed_set() -> TrackSet {
        let tracks = ChannelOrder::canonical()
            .labels()
            .iter()
            .enumerate()
            .map(|(i, &label)| Track::new(label, vec![i as f64 / 100.0; 4]))
            .collect();
        TrackSet::new(48000, tracks)
    }

    #[test]
    fn hesuvi_layout() {
        let out = Exporter::new(ChannelOrder::hesuvi())
            .convert(indexed_set())
            .unwrap();
        let labels: Vec<String> = out.tracks().iter().map(|t| t.label.to_string()).collect();
        assert_eq!(
            labels,
            [
                "FL-left", "FL-right", "SL-left", "SL-right", "BL-left", "BL-right", "FC-left",
                "FR-right", "FR-left", "SR-right", "SR-left", "BR-right", "BR-left", "FC-right"
            ]
        );
        // FR-right is canonical index 3
        assert_eq!(out.tracks()[7].samples[0], 0.03);
    }

    #[test]
    fn missing_label_is_unsupported() {
        let set = TrackSet::new(48000, indexed_set().into_tracks().into_iter().skip(1).collect());
        assert!(matches!(
            Exporter::new(ChannelOrder::canonical()).convert(set),
            Err(ImpulciferError::UnsupportedChannel(_))
        ));
    }
}
