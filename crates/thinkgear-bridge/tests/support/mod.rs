pub mod mock_bridge;
