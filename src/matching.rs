//! Donor ranking engine
//!
//! `rank` is a pure function of its inputs: same request, pool and weights
//! always produce the same ordered result, tie-breaks included. Results are
//! recomputed on demand and never cached across donor-availability changes.
use crate::donor::DonorCandidate;
use crate::request::OrganRequest;

/// Scoring weights, a configuration input rather than hard-coded business
/// logic. The defaults sum to 100 so the composite lands in 0-100.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchWeights {
    pub blood: f64,
    pub size: f64,
    pub tissue: f64,
    pub age: f64,
    pub health: f64,
    pub urgency: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            blood: 30.0,
            size: 10.0,
            tissue: 15.0,
            age: 10.0,
            health: 20.0,
            urgency: 15.0,
        }
    }
}

/// The four boolean sub-factors behind a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchFactors {
    pub blood_type: bool,
    pub size: bool,
    pub tissue: bool,
    pub age: bool,
}

/// One ranked (request, donor) pairing. Immutable once computed.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub request_id: String,
    pub donor_id: String,
    pub compatibility_score: u8,
    pub factors: MatchFactors,
    /// Urgency weight derived from the request's criticality, 10-100.
    pub urgency_weight: u8,
    pub health_score: u8,
}

// Donors outside these bands still rank, just lower. Bands never filter.
const SIZE_BAND: std::ops::RangeInclusive<u8> = 16..=70;
const AGE_BAND: std::ops::RangeInclusive<u8> = 18..=60;

fn factors_for(request: &OrganRequest, donor: &DonorCandidate) -> MatchFactors {
    MatchFactors {
        blood_type: donor.blood_type == request.blood_type,
        size: SIZE_BAND.contains(&donor.age),
        // Placeholder until HLA typing data is available: ABO group equality
        // ignoring the Rh factor.
        tissue: donor.blood_type.abo_group() == request.blood_type.abo_group(),
        age: AGE_BAND.contains(&donor.age),
    }
}

fn composite_score(request: &OrganRequest, donor: &DonorCandidate, weights: &MatchWeights) -> u8 {
    let factors = factors_for(request, donor);
    let bool_weight = |matched: bool, weight: f64| if matched { weight } else { 0.0 };

    let score = bool_weight(factors.blood_type, weights.blood)
        + bool_weight(factors.size, weights.size)
        + bool_weight(factors.tissue, weights.tissue)
        + bool_weight(factors.age, weights.age)
        + weights.health * f64::from(donor.health_score) / 100.0
        + weights.urgency * f64::from(request.criticality) / 10.0;

    score.round().clamp(0.0, 100.0) as u8
}

/// Score and order the eligible slice of `pool` against `request`.
///
/// Eligibility filters on availability, pledge and blood compatibility only;
/// criticality affects weighting, never filtering. An empty eligible pool is
/// an empty list, not an error. Order: composite score descending, donor
/// health descending, donor id ascending.
pub fn rank(
    request: &OrganRequest,
    pool: &[DonorCandidate],
    weights: &MatchWeights,
) -> Vec<MatchResult> {
    let mut results: Vec<MatchResult> = pool
        .iter()
        .filter(|donor| donor.is_eligible_for(request.organ, request.blood_type))
        .map(|donor| MatchResult {
            request_id: request.request_id.clone(),
            donor_id: donor.donor_id.clone(),
            compatibility_score: composite_score(request, donor, weights),
            factors: factors_for(request, donor),
            urgency_weight: request.criticality * 10,
            health_score: donor.health_score,
        })
        .collect();

    results.sort_by(|a, b| {
        b.compatibility_score
            .cmp(&a.compatibility_score)
            .then(b.health_score.cmp(&a.health_score))
            .then(a.donor_id.cmp(&b.donor_id))
    });

    results
}
