// Pure algorithms: no store access, no logging side effects.
pub mod echo_chamber;
pub mod range_calculator;
pub mod session_state;
pub mod swing_classifier;

pub use echo_chamber::EchoChamber;
pub use range_calculator::RangeCalculator;
pub use session_state::{SessionStateMachine, Transition};
pub use swing_classifier::{SwingClassifier, SwingPoint};
