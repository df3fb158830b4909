mod era;
mod fanout;
mod round;
pub mod share;
pub mod strategy;
mod types;

pub use era::EraComputer;
pub use fanout::try_map;
pub use round::RoundComputer;
pub use share::Share;
pub use types::CollatorPayout;
pub use types::ComputeError;
pub use types::DelegatorPayout;
pub use types::EraPayout;
pub use types::NominatorPayout;
pub use types::RoundPayout;
pub use types::ValidatorPayout;
