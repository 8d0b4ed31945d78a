use tracing::trace;

use super::{Fragment, LevelDetails};

/// Freshly demuxed PTS/DTS bounds for one fragment, as measured by one track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposedTimes {
    pub start_pts: f64,
    pub end_pts: f64,
    pub start_dts: f64,
    pub end_dts: f64,
}

impl ProposedTimes {
    pub fn new(start_pts: f64, end_pts: f64, start_dts: f64, end_dts: f64) -> Self {
        Self {
            start_pts,
            end_pts,
            start_dts,
            end_dts,
        }
    }
}

/// Reconciles a fragment's newly measured PTS/DTS against previously known
/// values, writing corrected boundaries back into `frag`, and returns the
/// timeline drift (0 when not applicable).
///
/// When the fragment already carries bounds from an earlier track, the
/// reconciled range is the intersection of both estimates, or their union
/// when they are disjoint. On the last fragment of a finite stream an
/// overlapping estimate never extends past the previously established end:
/// the known total duration boundary is trusted over a fresh measurement.
pub fn reconcile_fragment_times(
    details: Option<&LevelDetails>,
    frag: &mut Fragment,
    proposed: ProposedTimes,
) -> f64 {
    // Timeline position before this call's write-back; drift is measured
    // against it.
    let previous_start = frag.start;

    match (frag.start_pts, frag.end_pts, frag.start_dts, frag.end_dts) {
        (Some(cur_start_pts), Some(cur_end_pts), Some(cur_start_dts), Some(cur_end_dts)) => {
            let delta_pts = (cur_start_pts - proposed.start_pts).abs();
            let max_start_pts = cur_start_pts.max(proposed.start_pts);

            let intersect_start = cur_start_pts.max(proposed.start_pts);
            let intersect_end = cur_end_pts.min(proposed.end_pts);

            let (start_pts, mut end_pts, start_dts, mut end_dts) = if intersect_start <= intersect_end
            {
                (
                    intersect_start,
                    intersect_end,
                    cur_start_dts.max(proposed.start_dts),
                    cur_end_dts.min(proposed.end_dts),
                )
            } else {
                (
                    cur_start_pts.min(proposed.start_pts),
                    cur_end_pts.max(proposed.end_pts),
                    cur_start_dts.min(proposed.start_dts),
                    cur_end_dts.max(proposed.end_dts),
                )
            };

            if intersect_start <= intersect_end {
                if let Some(details) = details {
                    if details.is_final_fragment(frag.sequence_number) {
                        end_pts = cur_end_pts;
                        end_dts = cur_end_dts;
                    }
                }
            }

            frag.start = start_pts;
            frag.start_pts = Some(start_pts);
            frag.end_pts = Some(end_pts);
            frag.start_dts = Some(start_dts);
            frag.end_dts = Some(end_dts);
            frag.duration = end_pts - start_pts;
            frag.max_start_pts = Some(max_start_pts);
            frag.delta_pts = Some(delta_pts);
        }
        _ => {
            frag.start = proposed.start_pts;
            frag.start_pts = Some(proposed.start_pts);
            frag.end_pts = Some(proposed.end_pts);
            frag.start_dts = Some(proposed.start_dts);
            frag.end_dts = Some(proposed.end_dts);
            frag.duration = proposed.end_pts - proposed.start_pts;
            frag.max_start_pts = Some(proposed.start_pts);
            frag.delta_pts = None;
        }
    }

    let Some(details) = details else {
        return 0.0;
    };
    if !details.contains_sequence(frag.sequence_number) {
        return 0.0;
    }
    let drift = proposed.start_pts - previous_start;
    trace!(
        sequence_number = frag.sequence_number,
        drift,
        "Fragment timeline drift"
    );
    drift
}
