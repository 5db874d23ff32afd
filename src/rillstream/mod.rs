pub mod error;
pub mod runtime;
pub mod serialization;
pub mod state;
pub mod stream;
pub mod table;
pub mod test_harness;
pub mod topic;
pub mod topology;
pub mod types;
pub mod window;
