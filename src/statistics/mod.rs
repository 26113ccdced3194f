mod accumulator;
mod schedule;
mod weights;

pub use accumulator::Statistics;
pub use schedule::Schedule;
