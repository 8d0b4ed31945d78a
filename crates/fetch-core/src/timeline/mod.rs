mod reconcile;

pub use reconcile::{reconcile_fragment_times, ProposedTimes};

use serde::{Deserialize, Serialize};

/// One discrete, sequentially numbered chunk of a media stream.
///
/// PTS/DTS fields start out unset and are populated exclusively by
/// [`reconcile_fragment_times`], which the sequencing collaborator must call
/// in nondecreasing sequence-number order. `duration` is always derived from
/// the reconciled PTS bounds, never set independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub sequence_number: i64,
    /// Position on the continuous media timeline.
    pub start: f64,
    pub duration: f64,
    pub start_pts: Option<f64>,
    pub end_pts: Option<f64>,
    pub start_dts: Option<f64>,
    pub end_dts: Option<f64>,
    /// Latest of several tracks' start times, kept apart from the generally
    /// smaller reconciled start for boundary alignment where tracks disagree.
    pub max_start_pts: Option<f64>,
    /// Spread between the tracks' start estimates for this fragment.
    pub delta_pts: Option<f64>,
}

impl Fragment {
    pub fn new(sequence_number: i64) -> Self {
        Self {
            sequence_number,
            ..Self::default()
        }
    }

    /// Whether a prior reconciliation pass already assigned PTS/DTS bounds.
    pub fn has_reconciled_times(&self) -> bool {
        self.start_pts.is_some()
    }
}

/// Playlist-level view of one quality variant, read-only input to
/// reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelDetails {
    pub fragments: Vec<Fragment>,
    pub start_sequence_number: i64,
    pub end_sequence_number: i64,
    pub is_live: bool,
}

impl LevelDetails {
    pub fn contains_sequence(&self, sequence_number: i64) -> bool {
        (self.start_sequence_number..=self.end_sequence_number).contains(&sequence_number)
    }

    /// Whether `sequence_number` is the last fragment of a finite,
    /// on-demand stream.
    pub fn is_final_fragment(&self, sequence_number: i64) -> bool {
        !self.is_live && sequence_number == self.end_sequence_number
    }
}
