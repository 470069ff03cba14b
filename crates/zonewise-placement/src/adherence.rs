//! Write-quorum windows and zone-spread classification
//!
//! An ensemble is written in windows of `write_quorum` members. These helpers
//! cut an ensemble into windows and classify each window by how many distinct
//! zones it spans.

use std::collections::HashSet;
use zonewise_common::{Error, PlacementPolicyAdherence, Result, WindowMode};

/// Zone thresholds captured from the placement configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneThresholds {
    /// Zones needed for `MeetsStrict`
    pub desired: usize,
    /// Zones needed for `MeetsSoft`
    pub min: usize,
}

impl ZoneThresholds {
    /// Classify a window spanning `zones` distinct zones
    #[must_use]
    pub const fn classify(self, zones: usize) -> PlacementPolicyAdherence {
        PlacementPolicyAdherence::classify(zones, self.desired, self.min)
    }
}

/// Write-quorum windows over an ensemble of a given length
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Windows {
    len: usize,
    size: usize,
    mode: WindowMode,
}

impl Windows {
    /// Windowing for an ensemble about to be evaluated.
    ///
    /// A zero write quorum is an error. `Ok(None)` means the ensemble cannot
    /// be cut into whole windows (empty, negative quorum, or a remainder) and
    /// must be classified as `Fail`.
    pub fn for_evaluation(len: usize, write_quorum: i32, mode: WindowMode) -> Result<Option<Self>> {
        if write_quorum == 0 {
            return Err(Error::DivisionByZero("write quorum size"));
        }
        if len == 0 {
            return Ok(None);
        }
        let Ok(size) = usize::try_from(write_quorum) else {
            return Ok(None);
        };
        if len % size != 0 {
            return Ok(None);
        }
        Ok(Some(Self { len, size, mode }))
    }

    /// Windowing for an ensemble already known to decompose
    #[must_use]
    pub(crate) const fn new(len: usize, size: usize, mode: WindowMode) -> Self {
        Self { len, size, mode }
    }

    /// Number of windows
    #[must_use]
    pub const fn count(&self) -> usize {
        match self.mode {
            WindowMode::Contiguous => self.len / self.size,
            WindowMode::Rotating => self.len,
        }
    }

    /// First position of every window
    pub fn starts(&self) -> impl Iterator<Item = usize> + '_ {
        let step = match self.mode {
            WindowMode::Contiguous => self.size,
            WindowMode::Rotating => 1,
        };
        (0..self.len).step_by(step)
    }

    /// Positions covered by the window starting at `start`
    pub fn members(&self, start: usize) -> impl Iterator<Item = usize> + '_ {
        (start..start + self.size).map(move |i| i % self.len)
    }

    /// Starts of every window containing `position`
    pub fn containing(&self, position: usize) -> Vec<usize> {
        match self.mode {
            WindowMode::Contiguous => vec![position - position % self.size],
            WindowMode::Rotating => (0..self.size)
                .map(|back| (position + self.len - back) % self.len)
                .collect(),
        }
    }

    /// Worst classification across the windows starting at `starts`, given
    /// the zone of each ensemble position (`None` for the unknown domain).
    pub fn classify<I>(&self, zones: &[Option<&str>], starts: I, thresholds: ZoneThresholds) -> PlacementPolicyAdherence
    where
        I: IntoIterator<Item = usize>,
    {
        starts
            .into_iter()
            .map(|start| thresholds.classify(self.distinct_zones(zones, start)))
            .min()
            .unwrap_or(PlacementPolicyAdherence::Fail)
    }

    /// Worst classification across all windows
    #[must_use]
    pub fn classify_all(&self, zones: &[Option<&str>], thresholds: ZoneThresholds) -> PlacementPolicyAdherence {
        self.classify(zones, self.starts(), thresholds)
    }

    /// Distinct zones in the window starting at `start`. The unknown domain
    /// counts as one zone.
    #[must_use]
    pub fn distinct_zones(&self, zones: &[Option<&str>], start: usize) -> usize {
        self.members(start)
            .map(|i| zones[i])
            .collect::<HashSet<_>>()
            .len()
    }
}
