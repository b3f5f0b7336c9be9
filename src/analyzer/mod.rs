// Analyzer module: pure derivations over an ordered observation series.
// Nothing in here touches storage; the recompute orchestrator owns all writes.

pub mod change;
pub mod streak;
pub mod yoy;

pub use change::compute_change;
pub use streak::compute_streak;
pub use yoy::enrich_yoy;
