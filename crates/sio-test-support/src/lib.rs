mod frame;
mod harness;
mod mock_client_engine;
mod mock_engine;

pub use harness::{connected_pair, connected_pair_with_config, wait_for_namespace, Harness};
pub use mock_client_engine::MockClientEngine;
pub use mock_engine::MockEngine;
