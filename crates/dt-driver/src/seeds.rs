//! Known-good points in the delay parameter space, used to warm-start runs.

use dt_types::Candidate;

/// Hand-tuned values the delay model shipped with before any tuning.
pub const EXPERT_DESIGN: [f64; 10] = [0.5, 0.3, 0.1, 0.5, 1.0, 0.3, 0.1, 0.25, 1.0, 0.5];

const GOOD_PARAMS: [[f64; 10]; 4] = [
    [0.042, 0.041, 0.261, 0.755, 0.589, 0.189, 0.035, 0.026, 1.836, 0.731],
    [0.139, 0.022, 0.040, 0.174, 1.424, 0.324, 0.298, 0.138, 1.989, 0.631],
    [0.348, 0.061, 0.017, 0.146, 1.832, 0.411, 0.260, 0.050, 1.954, 0.782],
    [0.905, 0.243, 0.114, 0.205, 1.363, 0.120, 0.384, 0.780, 1.407, 0.044],
];

/// Best vectors found by earlier tuning campaigns.
pub fn expert_seeds() -> Vec<Candidate> {
    GOOD_PARAMS.iter().map(|p| p.to_vec()).collect()
}

pub fn expert_design() -> Candidate {
    EXPERT_DESIGN.to_vec()
}
