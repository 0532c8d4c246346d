/// Heat-stress alerting for the reef monitoring service.
///
/// Submodules:
/// - `bleaching`: NOAA Coral Reef Watch style bleaching alert levels.

pub mod bleaching;
