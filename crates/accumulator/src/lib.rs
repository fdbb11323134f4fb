pub mod accumulator;
pub mod batch;
pub mod channel;
pub mod cycle;
pub mod error;
pub mod policy;
pub mod sink;
pub mod state;
pub mod stats;
pub mod traits;

pub use accumulator::{AccumulatorBuilder, BatchAccumulator};
pub use batch::Batch;
pub use channel::{ChannelEndpoint, ChannelSource};
pub use cycle::{BatchCycle, CycleReport};
pub use error::{BatchError, CycleError, Phase};
pub use policy::{BatchPolicy, FillExit};
pub use sink::{FnSink, InstrumentedSink, RetrySink};
pub use state::RunState;
pub use stats::AccumulatorStats;
pub use traits::{FailureReporter, LoggingFailureReporter, Sink, Source, SourceProvider};
