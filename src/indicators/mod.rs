// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the core technical indicators used
// by the indicator engine. Every public function returns `Option<T>` (or an
// empty `Vec`) so callers are forced to handle insufficient-data and
// numerical-edge-case scenarios.

pub mod atr;
pub mod bundle;
pub mod fvg;
pub mod mfi;
pub mod order_block;
pub mod rsi;
pub mod smc;
pub mod stochastic;
pub mod support_resistance;
pub mod volume_profile;
