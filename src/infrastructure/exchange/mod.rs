pub mod mock;

pub use mock::MockExchangeClient;
