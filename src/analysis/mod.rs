/// Pure computations over provider series for the reef monitoring service.
///
/// Submodules:
/// - `reducers`: min/max/mean and nearest-point selection.
/// - `degree_heating`: 84-day heat stress accumulation with DHW fallback.

pub mod degree_heating;
pub mod reducers;
